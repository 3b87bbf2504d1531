//! HTTP 下载实现
//!
//! HEAD 取 ETag 与本地 `{file}.etag` 比较，有变化（或本地文件缺失）才 GET。
//! ureq 为同步客户端，统一放在 spawn_blocking 中执行。

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use ureq::Agent;

use super::{FetchOutcome, Fetcher};
use crate::errors::{IpLocateError, Result};

/// 单次请求的整体超时（数据文件较大）
const HTTP_TIMEOUT_SECS: u64 = 600;

pub struct HttpFetcher {
    download_dir: PathBuf,
    agent: Agent,
}

impl HttpFetcher {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(HTTP_TIMEOUT_SECS)))
            .build()
            .into();
        Self {
            download_dir: download_dir.into(),
            agent,
        }
    }

    /// URL 最后一段作为本地文件名
    fn local_path(&self, url: &str) -> Result<PathBuf> {
        let parsed = url::Url::parse(url)
            .map_err(|e| IpLocateError::fetch(format!("invalid url {}: {}", url, e)))?;
        let name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| IpLocateError::fetch(format!("url has no file name: {}", url)))?;
        Ok(self.download_dir.join(name))
    }

    fn remote_etag(agent: &Agent, url: &str) -> Result<String> {
        let resp = agent
            .head(url)
            .call()
            .map_err(|e| IpLocateError::fetch(format!("HEAD {} failed: {}", url, e)))?;
        Ok(resp
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string())
    }

    fn download(agent: &Agent, url: &str, path: &Path) -> Result<u64> {
        let resp = agent
            .get(url)
            .call()
            .map_err(|e| IpLocateError::fetch(format!("GET {} failed: {}", url, e)))?;

        let partial = path.with_extension("part");
        let mut out = BufWriter::new(File::create(&partial)?);
        let mut body = resp.into_body().into_reader();
        let bytes = std::io::copy(&mut body, &mut out)
            .map_err(|e| IpLocateError::fetch(format!("reading {} failed: {}", url, e)))?;
        drop(out);
        std::fs::rename(&partial, path)?;
        Ok(bytes)
    }

    fn fetch_sync(agent: &Agent, url: &str, path: PathBuf) -> Result<FetchOutcome> {
        let etag_path = etag_path_for(&path);
        let current = std::fs::read_to_string(&etag_path)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        debug!("Checking ETag: {}", url);
        let remote = Self::remote_etag(agent, url)?;

        let changed = !remote.is_empty() && remote != current;
        if !changed && path.exists() {
            debug!("ETag unchanged, skipping {}", url);
            return Ok(FetchOutcome {
                changed: false,
                path,
            });
        }

        info!("Downloading data file: {}", url);
        let bytes = Self::download(agent, url, &path)?;
        // 下载完整写入后再记录 ETag，中断的下载下次会重试
        if !remote.is_empty() {
            std::fs::write(&etag_path, &remote)?;
        }
        info!("Downloaded {} ({} bytes)", path.display(), bytes);

        Ok(FetchOutcome {
            changed: true,
            path,
        })
    }
}

fn etag_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".etag");
    PathBuf::from(name)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome> {
        std::fs::create_dir_all(&self.download_dir).map_err(|e| {
            IpLocateError::file_operation(format!(
                "无法创建目录 {}: {}",
                self.download_dir.display(),
                e
            ))
        })?;

        let path = self.local_path(url)?;
        let agent = self.agent.clone();
        let url = url.to_string();

        tokio::task::spawn_blocking(move || Self::fetch_sync(&agent, &url, path))
            .await
            .map_err(|e| IpLocateError::fetch(format!("fetch task failed: {}", e)))?
    }
}
