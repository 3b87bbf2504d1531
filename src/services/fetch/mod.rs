//! Dataset fetching
//!
//! A `Fetcher` turns a source URL into a local file and tells the refresh
//! orchestrator whether the remote content changed since the last download.

pub mod catalog;
mod http;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use tracing::debug;

use crate::errors::{IpLocateError, Result};

pub use catalog::{SourceEntry, SourceFormat, find_source};
pub use http::HttpFetcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// 远端内容是否变化（本次是否重新下载）
    pub changed: bool,
    /// 本地文件路径
    pub path: PathBuf,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 下载 `url`（若有变化），返回本地路径
    async fn fetch(&self, url: &str) -> Result<FetchOutcome>;

    /// 解压 `.gz` 文件，返回解压后的路径
    async fn decompress(&self, path: &Path) -> Result<PathBuf> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || gunzip_file(&path))
            .await
            .map_err(|e| IpLocateError::file_operation(format!("decompress task failed: {}", e)))?
    }
}

/// `x.csv.gz` → `x.csv`，其余路径原样返回
pub fn decompressed_path(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "gz") {
        path.with_extension("")
    } else {
        path.to_path_buf()
    }
}

/// 同步解压到去掉 `.gz` 的同名文件
pub fn gunzip_file(path: &Path) -> Result<PathBuf> {
    let target = decompressed_path(path);
    if target == path {
        return Err(IpLocateError::file_operation(format!(
            "{} is not a .gz file",
            path.display()
        )));
    }

    let input = File::open(path).map_err(|e| {
        IpLocateError::file_operation(format!("无法打开 {}: {}", path.display(), e))
    })?;
    let mut decoder = GzDecoder::new(BufReader::new(input));
    let mut output = BufWriter::new(File::create(&target)?);
    let bytes = std::io::copy(&mut decoder, &mut output).map_err(|e| {
        IpLocateError::file_operation(format!("解压 {} 失败: {}", path.display(), e))
    })?;

    debug!("Decompressed {} ({} bytes)", target.display(), bytes);
    Ok(target)
}
