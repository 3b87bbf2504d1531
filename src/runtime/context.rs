use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::services::{Fetcher, HttpFetcher, RefreshOrchestrator, Resolver};
use crate::storage::{StoreFactory, StoreRegistry};

/// 各运行模式共享的组件
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub registry: Arc<StoreRegistry>,
    pub resolver: Arc<Resolver>,
    pub orchestrator: Arc<RefreshOrchestrator>,
}

impl AppContext {
    /// 按配置打开存储，使用 HTTP 下载器
    pub async fn build(config: AppConfig) -> Result<Self> {
        let registry = StoreFactory::create(&config).await?;
        let fetcher = Arc::new(HttpFetcher::new(config.datasets.download_dir.clone()));
        Self::with_parts(config, registry, fetcher)
    }

    /// 由现成的存储与下载器组装
    pub fn with_parts(
        config: AppConfig,
        registry: StoreRegistry,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let registry = Arc::new(registry);
        let orchestrator = Arc::new(RefreshOrchestrator::new(
            registry.clone(),
            fetcher,
            &config,
        )?);
        let resolver = Arc::new(Resolver::new(registry.clone()));

        info!(
            "Application context ready (backend: {}, datasets: {})",
            registry.backend_name(),
            registry.keys().len()
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            resolver,
            orchestrator,
        })
    }

    pub async fn shutdown(&self) {
        self.registry.close().await;
    }
}
