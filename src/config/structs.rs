use std::path::Path;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::errors::{IpLocateError, Result};
use crate::services::fetch::catalog;
use crate::storage::backend::retry::RetryConfig;
use crate::storage::models::DatasetType;
use crate::storage::normalize_backend_name;
use crate::utils::time::parse_update_time;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含：
/// - server: 服务器地址、端口、CPU 数量
/// - database: 存储后端与数据库连接配置
/// - datasets: 数据源选择与下载目录
/// - refresh: 定时刷新与批量加载参数
/// - api: 共享密钥
/// - logging: 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub datasets: DatasetsConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：IPL，分隔符：__
    /// 示例：IPL__SERVER__PORT=9999
    pub fn load(path: &str) -> Result<Self> {
        use config::{Config, Environment, File};

        let builder = Config::builder()
            // 1. 从 TOML 文件加载（可选）
            .add_source(File::with_name(path).required(false))
            // 2. 从环境变量覆盖，前缀 IPL，分隔符 __
            .add_source(
                Environment::with_prefix("IPL")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings = builder
            .build()
            .map_err(|e| IpLocateError::config(format!("Failed to build config: {}", e)))?;
        let config = settings
            .try_deserialize::<AppConfig>()
            .map_err(|e| IpLocateError::config(format!("Failed to deserialize config: {}", e)))?;

        if Path::new(path).exists() {
            eprintln!("[INFO] Configuration loaded from: {}", path);
        }

        config.validate()?;
        Ok(config)
    }

    /// 校验配置，拒绝无法启动的组合
    pub fn validate(&self) -> Result<()> {
        normalize_backend_name(&self.database.backend)?;

        for dataset in DatasetType::all() {
            let Some(name) = self.datasets.source_for(dataset) else {
                continue;
            };
            match catalog::find_source(name) {
                Some(source) if source.dataset == dataset => {}
                Some(source) => {
                    return Err(IpLocateError::config(format!(
                        "'{}' is a {} source, not a valid {} option",
                        name, source.dataset, dataset
                    )));
                }
                None => {
                    return Err(IpLocateError::config(format!(
                        "'{}' is not a valid {} option",
                        name, dataset
                    )));
                }
            }
        }

        self.refresh.update_time()?;

        if self.refresh.batch_size == 0 {
            return Err(IpLocateError::config("refresh.batch_size must be > 0"));
        }
        if self.refresh.log_interval == 0 {
            return Err(IpLocateError::config("refresh.log_interval must be > 0"));
        }

        Ok(())
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let mut sample_config = Self::default();
        sample_config.datasets.country = Some("geolite2-country".to_string());
        sample_config.datasets.asn = Some("iptoasn-asn".to_string());
        sample_config.refresh.update_time = Some("04:30".to_string());
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| IpLocateError::serialization(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
}

/// 存储配置
///
/// `backend = "sql"` 使用关系数据库（从 URL 推断 SQLite / MySQL / PostgreSQL），
/// `backend = "trie"` 使用前缀树文件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl DatabaseConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry_count,
            base_delay_ms: self.retry_base_delay_ms,
            max_delay_ms: self.retry_max_delay_ms,
        }
    }
}

/// 数据源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetsConfig {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub asn: Option<String>,
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
    #[serde(default = "default_trie_dir")]
    pub trie_dir: String,
}

impl DatasetsConfig {
    /// 数据集对应的数据源名称，空字符串视为未配置
    pub fn source_for(&self, dataset: DatasetType) -> Option<&str> {
        let value = match dataset {
            DatasetType::Country => self.country.as_deref(),
            DatasetType::City => self.city.as_deref(),
            DatasetType::Asn => self.asn.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn is_configured(&self, dataset: DatasetType) -> bool {
        self.source_for(dataset).is_some()
    }
}

/// 刷新配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// 每日刷新时间（本地时间 HH:MM），未设置则不定时刷新
    #[serde(default)]
    pub update_time: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_log_interval")]
    pub log_interval: u64,
}

impl RefreshConfig {
    pub fn update_time(&self) -> Result<Option<NaiveTime>> {
        match self.update_time.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => parse_update_time(value).map(Some),
        }
    }
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ApiConfig {
    pub fn key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

// ============================================================
// Default value functions
// ============================================================

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_backend() -> String {
    "sql".to_string()
}

fn default_database_url() -> String {
    "sqlite://iplocate.db?mode=rwc".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_download_dir() -> String {
    "./downloads".to_string()
}

fn default_trie_dir() -> String {
    "./downloads".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_log_interval() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_file() -> Option<String> {
    None
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for DatasetsConfig {
    fn default() -> Self {
        Self {
            country: None,
            city: None,
            asn: None,
            download_dir: default_download_dir(),
            trie_dir: default_trie_dir(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            update_time: None,
            batch_size: default_batch_size(),
            log_interval: default_log_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: default_log_file(),
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}
