//! Prefix-trie file store
//!
//! The file format has no incremental update: `append_batch` only feeds an
//! in-memory builder, and `retire_older_than` writes a brand-new file and
//! swaps the open reader. The generation is whatever the open file's header
//! says, never a per-record tag.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{IpLocateError, Result};
use crate::storage::models::{IpRange, IpVersion, RangeRecord, RecordAttributes, StoreKey};
use crate::storage::traits::RangeStore;
use crate::trie::{TrieBuilder, TrieReader};

/// 每个区间在数据表中的负载
#[derive(Debug, Serialize, Deserialize)]
struct TriePayload {
    start: String,
    end: String,
    attributes: RecordAttributes,
}

struct PendingGeneration {
    generation: i64,
    builder: TrieBuilder,
}

pub struct TrieFileStore {
    key: StoreKey,
    path: PathBuf,
    reader: ArcSwapOption<TrieReader>,
    pending: Mutex<Option<PendingGeneration>>,
}

impl TrieFileStore {
    /// `{trie_dir}/{source}-ipv{4|6}.trie`
    pub fn path_for(trie_dir: &Path, source: &str, version: IpVersion) -> PathBuf {
        trie_dir.join(format!("{}-{}.trie", source, version))
    }

    /// 打开已有文件；文件不存在视为从未加载
    pub fn open(key: StoreKey, path: PathBuf) -> Result<Self> {
        let reader = if path.exists() {
            let reader = TrieReader::open(&path)?;
            if reader.ip_version() != key.version {
                return Err(IpLocateError::codec(format!(
                    "{} holds {} data, expected {}",
                    path.display(),
                    reader.ip_version(),
                    key.version
                )));
            }
            info!(
                "Opened {} (generation {}, {} ranges)",
                path.display(),
                reader.generation(),
                reader.len()
            );
            Some(Arc::new(reader))
        } else {
            debug!("{} does not exist yet", path.display());
            None
        };

        Ok(Self {
            key,
            path,
            reader: ArcSwapOption::new(reader),
            pending: Mutex::new(None),
        })
    }

    fn generation_of_reader(&self) -> i64 {
        self.reader
            .load()
            .as_deref()
            .map(|r| r.generation())
            .unwrap_or(0)
    }
}

/// 写临时文件、落盘后重命名，再重新打开
fn write_trie_file(path: &Path, bytes: Vec<u8>) -> Result<TrieReader> {
    use std::io::Write;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("trie.tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path).map_err(|e| {
        IpLocateError::file_operation(format!(
            "无法替换 {}: {}",
            path.display(),
            e
        ))
    })?;

    TrieReader::from_bytes(Bytes::from(bytes))
}

#[async_trait]
impl RangeStore for TrieFileStore {
    fn key(&self) -> StoreKey {
        self.key
    }

    async fn current_generation(&self) -> Result<i64> {
        Ok(self.generation_of_reader())
    }

    async fn begin_generation(&self, generation: i64) -> Result<()> {
        let mut pending = self.pending.lock();
        if let Some(old) = pending.as_ref() {
            warn!(
                "{}: discarding unfinished generation {}",
                self.key, old.generation
            );
        }
        *pending = Some(PendingGeneration {
            generation,
            builder: TrieBuilder::new(self.key.version),
        });
        Ok(())
    }

    async fn append_batch(&self, records: &[RangeRecord], generation: i64) -> Result<()> {
        let mut guard = self.pending.lock();
        let pending = guard.get_or_insert_with(|| PendingGeneration {
            generation,
            builder: TrieBuilder::new(self.key.version),
        });

        if pending.generation != generation {
            return Err(IpLocateError::codec(format!(
                "{}: batch for generation {} while building generation {}",
                self.key, generation, pending.generation
            )));
        }

        for record in records {
            if record.key() != self.key {
                return Err(IpLocateError::invalid_input(format!(
                    "record for {} cannot be stored in {}",
                    record.key(),
                    self.key
                )));
            }
            let payload = serde_json::to_vec(&TriePayload {
                start: record.range.start.clone(),
                end: record.range.end.clone(),
                attributes: record.attributes.clone(),
            })?;
            pending.builder.insert_range(
                record.range.start_number,
                record.range.end_number,
                payload,
            )?;
        }
        Ok(())
    }

    async fn retire_older_than(&self, generation: i64) -> Result<()> {
        let pending = self.pending.lock().take();
        let Some(pending) = pending else {
            if self.generation_of_reader() >= generation {
                return Ok(());
            }
            return Err(IpLocateError::codec(format!(
                "{}: nothing was loaded for generation {}",
                self.key, generation
            )));
        };

        if pending.generation != generation {
            return Err(IpLocateError::codec(format!(
                "{}: cannot commit generation {} while building generation {}",
                self.key, generation, pending.generation
            )));
        }

        let ranges = pending.builder.len();
        let path = self.path.clone();
        let reader = tokio::task::spawn_blocking(move || {
            write_trie_file(&path, pending.builder.finish(generation))
        })
        .await
        .map_err(|e| IpLocateError::file_operation(format!("trie writer task failed: {}", e)))??;

        // 旧 reader 在最后一个查询释放后自动关闭
        self.reader.store(Some(Arc::new(reader)));

        info!(
            "{}: generation {} written to {} ({} ranges)",
            self.key,
            generation,
            self.path.display(),
            ranges
        );
        Ok(())
    }

    async fn lookup(&self, ip: u128) -> Result<Option<RangeRecord>> {
        let guard = self.reader.load();
        let Some(reader) = guard.as_deref() else {
            return Ok(None);
        };
        let Some(raw) = reader.lookup(ip) else {
            return Ok(None);
        };

        let payload: TriePayload = serde_json::from_slice(raw)?;
        let range = IpRange::parse(&payload.start, &payload.end, self.key.version)
            .ok_or_else(|| {
                IpLocateError::codec(format!(
                    "{}: corrupt range {} - {}",
                    self.key, payload.start, payload.end
                ))
            })?;

        Ok(Some(RangeRecord {
            range,
            ip_version: self.key.version,
            generation: reader.generation(),
            attributes: payload.attributes,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "trie"
    }
}
