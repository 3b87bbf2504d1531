//! Range storage
//!
//! One `RangeStore` per configured (dataset type, IP version) pair. The
//! backend is picked once at startup from `database.backend` and held by the
//! `StoreRegistry` for the life of the process.

pub mod backend;
pub mod models;
pub mod traits;
pub mod trie_file;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::{IpLocateError, Result};
use models::StoreKey;
use traits::RangeStore;

pub use backend::SeaOrmRangeStore;
pub use trie_file::TrieFileStore;

/// 规范化后端名称
pub fn normalize_backend_name(name: &str) -> Result<&'static str> {
    match name.trim().to_lowercase().as_str() {
        "sql" | "sqlite" | "mysql" | "mariadb" | "postgres" | "postgresql" | "database" => {
            Ok("sql")
        }
        "trie" | "mmdb" | "file" => Ok("trie"),
        other => Err(IpLocateError::config(format!(
            "未知的存储后端: {}. 支持: sql, trie",
            other
        ))),
    }
}

/// 已打开的全部存储
pub struct StoreRegistry {
    stores: HashMap<StoreKey, Arc<dyn RangeStore>>,
    backend_name: &'static str,
    db: Option<DatabaseConnection>,
}

impl StoreRegistry {
    /// 由现成的存储构建（测试或嵌入场景）
    pub fn from_stores(stores: Vec<Arc<dyn RangeStore>>) -> Self {
        let backend_name = stores.first().map(|s| s.backend_name()).unwrap_or("none");
        Self {
            stores: stores.into_iter().map(|s| (s.key(), s)).collect(),
            backend_name,
            db: None,
        }
    }

    pub fn get(&self, key: StoreKey) -> Option<Arc<dyn RangeStore>> {
        self.stores.get(&key).cloned()
    }

    /// 已配置的组合，按刷新顺序
    pub fn keys(&self) -> Vec<StoreKey> {
        StoreKey::all().filter(|k| self.stores.contains_key(k)).collect()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// 每个组合的当前代际
    pub async fn generations(&self) -> Result<Vec<(StoreKey, i64)>> {
        let mut result = Vec::with_capacity(self.stores.len());
        for key in self.keys() {
            if let Some(store) = self.stores.get(&key) {
                result.push((key, store.current_generation().await?));
            }
        }
        Ok(result)
    }

    /// 关闭数据库连接池
    pub async fn close(&self) {
        if let Some(db) = &self.db {
            if let Err(e) = db.clone().close().await {
                warn!("Failed to close database connection: {}", e);
            } else {
                info!("Database connection closed");
            }
        }
    }
}

/// 存储工厂
pub struct StoreFactory;

impl StoreFactory {
    pub async fn create(config: &AppConfig) -> Result<StoreRegistry> {
        let backend = normalize_backend_name(&config.database.backend)?;
        let keys: Vec<StoreKey> = StoreKey::all()
            .filter(|k| config.datasets.is_configured(k.dataset))
            .collect();

        if keys.is_empty() {
            warn!("No dataset configured; every lookup will come back empty");
        }

        let mut stores: Vec<Arc<dyn RangeStore>> = Vec::with_capacity(keys.len());
        let mut db = None;
        let backend_name;

        match backend {
            "trie" => {
                let trie_dir = Path::new(&config.datasets.trie_dir);
                std::fs::create_dir_all(trie_dir).map_err(|e| {
                    IpLocateError::file_operation(format!(
                        "无法创建目录 {}: {}",
                        trie_dir.display(),
                        e
                    ))
                })?;

                for key in keys {
                    let source = config.datasets.source_for(key.dataset).unwrap_or("unknown");
                    let path = TrieFileStore::path_for(trie_dir, source, key.version);
                    stores.push(Arc::new(TrieFileStore::open(key, path)?));
                }
                backend_name = "trie";
            }
            _ => {
                let (conn, name) =
                    backend::connect(&config.database.database_url, config.database.pool_size)
                        .await?;
                let retry_config = config.database.retry_config();
                for key in keys {
                    let store =
                        SeaOrmRangeStore::open(conn.clone(), key, name, retry_config).await?;
                    stores.push(Arc::new(store));
                }
                db = Some(conn);
                backend_name = name;
            }
        }

        info!(
            "Range storage ready: backend={}, stores={}",
            backend_name,
            stores.len()
        );

        Ok(StoreRegistry {
            stores: stores.into_iter().map(|s| (s.key(), s)).collect(),
            backend_name,
            db,
        })
    }
}
