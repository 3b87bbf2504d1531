use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::runtime::AppContext;

/// 关闭超时时间（秒）
const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// 单个任务超时时间（秒）
const TASK_TIMEOUT_SECS: u64 = 10;

/// 等待 Ctrl+C
pub async fn wait_for_signal() {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, stopping...");
        }
        Err(e) => {
            warn!(
                "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
                e
            );
        }
    }
}

/// 通知后台任务退出并释放存储
pub async fn shutdown(
    app: &AppContext,
    shutdown_tx: &watch::Sender<bool>,
    scheduler: Option<JoinHandle<()>>,
) {
    let shutdown_result = timeout(
        Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        perform_shutdown_tasks(app, shutdown_tx, scheduler),
    )
    .await;

    match shutdown_result {
        Ok(()) => {
            info!("All shutdown tasks completed successfully");
        }
        Err(_) => {
            error!(
                "Shutdown tasks timed out after {} seconds! Forcing exit.",
                SHUTDOWN_TIMEOUT_SECS
            );
            std::process::exit(1);
        }
    }
}

async fn perform_shutdown_tasks(
    app: &AppContext,
    shutdown_tx: &watch::Sender<bool>,
    scheduler: Option<JoinHandle<()>>,
) {
    // 接收端可能已退出
    let _ = shutdown_tx.send(true);

    if let Some(handle) = scheduler {
        match timeout(Duration::from_secs(TASK_TIMEOUT_SECS), handle).await {
            Ok(Ok(())) => info!("Refresh scheduler stopped"),
            Ok(Err(e)) => error!("Refresh scheduler task failed: {}", e),
            Err(_) => warn!(
                "Refresh scheduler did not stop within {} seconds",
                TASK_TIMEOUT_SECS
            ),
        }
    }

    if app.orchestrator.state() == crate::services::RefreshState::Running {
        warn!("Shutting down while a refresh is running; the new generation will not be published");
    }

    match timeout(Duration::from_secs(TASK_TIMEOUT_SECS), app.shutdown()).await {
        Ok(()) => {}
        Err(_) => error!("Closing storage timed out after {} seconds", TASK_TIMEOUT_SECS),
    }
}
