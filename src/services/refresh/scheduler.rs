use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use super::{RefreshOrchestrator, RefreshOutcome};
use crate::utils::time::duration_until;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// 每日定时刷新任务
///
/// 首次在下一个本地 `update_time` 触发，之后每 24 小时一次；
/// `shutdown` 变为 true 时退出。
pub fn spawn_scheduler(
    orchestrator: Arc<RefreshOrchestrator>,
    update_time: NaiveTime,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let first = duration_until(Local::now().naive_local(), update_time);
        let mut next = Instant::now() + first;
        info!(
            "Daily refresh scheduled at {} (first run in {}s)",
            update_time.format("%H:%M"),
            first.as_secs()
        );

        loop {
            tokio::select! {
                _ = sleep_until(next) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Refresh scheduler stopped");
                        return;
                    }
                    continue;
                }
            }

            let fired = Instant::now();
            info!("Scheduled refresh starting");
            if let RefreshOutcome::Skipped = orchestrator.refresh_or_exit(false).await {
                info!("Scheduled refresh skipped, another refresh is running");
            }
            next = fired + DAY;
        }
    })
}
