//! Dataset refresh orchestration
//!
//! For every configured (dataset, IP version) pair, in country → city → asn
//! order: ask the fetcher whether the source changed, stream the file into a
//! new generation, then commit it and retire the old one. Only one refresh
//! runs at a time; a request that arrives while one is running is dropped.

mod scheduler;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::errors::{IpLocateError, Result};
use crate::services::fetch::{Fetcher, SourceEntry, decompressed_path, find_source};
use crate::services::transform::RecordTransformer;
use crate::storage::StoreRegistry;
use crate::storage::models::{DatasetType, StoreKey};
use crate::storage::traits::RangeStore;

pub use scheduler::spawn_scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    Idle,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PairOutcome {
    Loaded {
        records: u64,
        skipped: u64,
        generation: i64,
    },
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairReport {
    pub dataset: DatasetType,
    pub ip_version: u8,
    pub source: &'static str,
    #[serde(flatten)]
    pub outcome: PairOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub forced: bool,
    pub pairs: Vec<PairReport>,
}

impl RefreshReport {
    pub fn loaded_count(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| matches!(p.outcome, PairOutcome::Loaded { .. }))
            .count()
    }
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// 已有刷新在运行，本次请求被丢弃
    Skipped,
    Completed(RefreshReport),
}

/// 持有期间状态为 Running，释放时恢复 Idle
pub struct RefreshPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for RefreshPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct RefreshOrchestrator {
    registry: Arc<StoreRegistry>,
    fetcher: Arc<dyn Fetcher>,
    sources: HashMap<DatasetType, &'static SourceEntry>,
    batch_size: usize,
    log_interval: u64,
    running: Arc<AtomicBool>,
    last_report: RwLock<Option<RefreshReport>>,
}

impl RefreshOrchestrator {
    pub fn new(
        registry: Arc<StoreRegistry>,
        fetcher: Arc<dyn Fetcher>,
        config: &AppConfig,
    ) -> Result<Self> {
        let mut sources = HashMap::new();
        for dataset in DatasetType::all() {
            let Some(name) = config.datasets.source_for(dataset) else {
                continue;
            };
            let source = find_source(name).ok_or_else(|| {
                IpLocateError::config(format!("'{}' is not a valid {} option", name, dataset))
            })?;
            sources.insert(dataset, source);
        }

        Ok(Self {
            registry,
            fetcher,
            sources,
            batch_size: config.refresh.batch_size.max(1),
            log_interval: config.refresh.log_interval.max(1),
            running: Arc::new(AtomicBool::new(false)),
            last_report: RwLock::new(None),
        })
    }

    pub fn state(&self) -> RefreshState {
        if self.running.load(Ordering::Acquire) {
            RefreshState::Running
        } else {
            RefreshState::Idle
        }
    }

    pub fn last_report(&self) -> Option<RefreshReport> {
        self.last_report.read().clone()
    }

    /// Idle → Running；已在运行时返回 None
    pub fn try_acquire(&self) -> Option<RefreshPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshPermit {
                flag: self.running.clone(),
            })
    }

    /// 是否存在从未成功加载的组合
    pub async fn needs_initial_load(&self) -> Result<bool> {
        for key in self.registry.keys() {
            if !self.sources.contains_key(&key.dataset) {
                continue;
            }
            if let Some(store) = self.registry.get(key)
                && store.current_generation().await? == 0
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 执行一次刷新；`force` 为 true 时即使来源未变化也重新加载
    pub async fn refresh(&self, force: bool) -> Result<RefreshOutcome> {
        let Some(permit) = self.try_acquire() else {
            info!("Refresh already running, request dropped");
            return Ok(RefreshOutcome::Skipped);
        };
        self.run(permit, force).await.map(RefreshOutcome::Completed)
    }

    /// 后台启动刷新；已在运行时返回 false
    ///
    /// 刷新中的任何存储错误都会终止进程。
    pub fn spawn_refresh(self: &Arc<Self>, force: bool) -> bool {
        let Some(permit) = self.try_acquire() else {
            return false;
        };
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run(permit, force).await {
                exit_on_refresh_error(&e);
            }
        });
        true
    }

    /// 前台刷新，失败即退出进程（启动与定时刷新使用）
    pub async fn refresh_or_exit(&self, force: bool) -> RefreshOutcome {
        match self.refresh(force).await {
            Ok(outcome) => outcome,
            Err(e) => exit_on_refresh_error(&e),
        }
    }

    async fn run(&self, _permit: RefreshPermit, force: bool) -> Result<RefreshReport> {
        let started_at = Utc::now();
        info!("Checking for new data (forced: {})", force);

        let mut pairs = Vec::new();
        for key in self.registry.keys() {
            let (Some(store), Some(source)) =
                (self.registry.get(key), self.sources.get(&key.dataset).copied())
            else {
                continue;
            };
            let outcome = self.refresh_pair(key, store, source, force).await?;
            pairs.push(PairReport {
                dataset: key.dataset,
                ip_version: key.version.number(),
                source: source.name,
                outcome,
            });
        }

        let finished_at = Utc::now();
        let report = RefreshReport {
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            forced: force,
            pairs,
        };
        info!(
            "Refresh finished in {} ms ({} of {} datasets reloaded)",
            report.duration_ms,
            report.loaded_count(),
            report.pairs.len()
        );
        *self.last_report.write() = Some(report.clone());
        Ok(report)
    }

    async fn refresh_pair(
        &self,
        key: StoreKey,
        store: Arc<dyn RangeStore>,
        source: &'static SourceEntry,
        force: bool,
    ) -> Result<PairOutcome> {
        let url = source.url_for(key.version);
        let fetched = self.fetcher.fetch(&url).await?;
        let current = store.current_generation().await?;

        let load_path = if fetched.changed {
            if source.is_compressed() {
                self.fetcher.decompress(&fetched.path).await?
            } else {
                fetched.path
            }
        } else if current == 0 || force {
            // 来源未变化但数据尚未加载（或强制），复用本地文件
            self.reuse_local(&fetched.path, source).await?
        } else {
            debug!("{}: source unchanged, keeping generation {}", key, current);
            return Ok(PairOutcome::Unchanged);
        };

        self.load_file(key, store, load_path, current + 1).await
    }

    async fn reuse_local(&self, path: &Path, source: &SourceEntry) -> Result<PathBuf> {
        if !source.is_compressed() {
            return Ok(path.to_path_buf());
        }
        let plain = decompressed_path(path);
        if plain.exists() {
            Ok(plain)
        } else {
            self.fetcher.decompress(path).await
        }
    }

    async fn load_file(
        &self,
        key: StoreKey,
        store: Arc<dyn RangeStore>,
        path: PathBuf,
        generation: i64,
    ) -> Result<PairOutcome> {
        info!(
            "Rebuilding {} from {} (generation {})",
            key,
            path.display(),
            generation
        );
        store.begin_generation(generation).await?;

        let (mut batches, reader) =
            RecordTransformer::new(key, generation).stream_file(path, self.batch_size);

        let mut saved: u64 = 0;
        let mut last_log: u64 = 0;
        while let Some(batch) = batches.recv().await {
            store.append_batch(&batch, generation).await?;
            saved += batch.len() as u64;
            if saved >= last_log + self.log_interval {
                info!("{}: saved {} entries", key, saved);
                last_log = saved;
            }
        }

        let stats = reader
            .await
            .map_err(|e| IpLocateError::file_operation(format!("reader task failed: {}", e)))??;
        info!("{}: saved {} entries", key, saved);
        if stats.skipped > 0 {
            warn!("{}: {} invalid rows skipped", key, stats.skipped);
        }

        // 全部写入成功后才提交并淘汰旧代
        store.retire_older_than(generation).await?;

        Ok(PairOutcome::Loaded {
            records: stats.records,
            skipped: stats.skipped,
            generation,
        })
    }
}

fn exit_on_refresh_error(e: &IpLocateError) -> ! {
    error!("Refresh failed, shutting down: {}", e);
    eprintln!("{}", e.format_colored());
    std::process::exit(1);
}
