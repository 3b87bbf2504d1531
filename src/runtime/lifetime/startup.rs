use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::runtime::AppContext;
use crate::services::refresh::spawn_scheduler;

pub struct StartupContext {
    pub app: AppContext,
    pub shutdown_tx: watch::Sender<bool>,
    pub scheduler: Option<JoinHandle<()>>,
}

/// 准备服务器启动的上下文
/// 包括存储、初始加载与定时刷新
pub async fn prepare_server_startup(config: AppConfig) -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    let update_time = config
        .refresh
        .update_time()
        .context("Invalid refresh.update_time")?;

    let app = AppContext::build(config)
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", app.registry.backend_name());

    finish_startup(app, update_time, start_time).await
}

/// 从已组装的上下文继续启动
pub async fn finish_startup(
    app: AppContext,
    update_time: Option<chrono::NaiveTime>,
    start_time: std::time::Instant,
) -> Result<StartupContext> {
    // 有从未加载过的组合时立即在后台刷新一次，HTTP 服务不等待
    if app
        .orchestrator
        .needs_initial_load()
        .await
        .context("Failed to read dataset generations")?
    {
        info!("Some datasets have never been loaded, starting initial refresh");
        if !app.orchestrator.spawn_refresh(false) {
            warn!("Initial refresh not started, another refresh is running");
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = match update_time {
        Some(time) => Some(spawn_scheduler(
            app.orchestrator.clone(),
            time,
            shutdown_rx,
        )),
        None => {
            info!("refresh.update_time not set, daily refresh disabled");
            None
        }
    };

    debug!(
        "Pre-startup processing completed in {} ms",
        start_time.elapsed().as_millis()
    );

    Ok(StartupContext {
        app,
        shutdown_tx,
        scheduler,
    })
}
