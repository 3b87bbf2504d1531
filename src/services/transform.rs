//! 原始 CSV 行 → RangeRecord
//!
//! 行格式（无表头）：
//! - country: `start,end,country_code`
//! - asn:     `start,end,as_number,as_organisation`
//! - city:    `start,end,country_code,state1,state2,city,postcode,lat,lon,timezone`
//!
//! 数值字段解析失败记为 0，不丢弃整行；起止地址无效的行跳过并计数。

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use csv::{ReaderBuilder, StringRecord};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{IpLocateError, Result};
use crate::storage::models::{DatasetType, IpRange, RangeRecord, RecordAttributes, StoreKey};

/// 单个文件转换的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub records: u64,
    pub skipped: u64,
}

/// 把一个 (数据集, IP 版本) 文件的行转换为指定代际的记录
#[derive(Debug, Clone, Copy)]
pub struct RecordTransformer {
    key: StoreKey,
    generation: i64,
}

fn field(row: &StringRecord, idx: usize) -> &str {
    row.get(idx).unwrap_or("")
}

fn lenient_i64(value: &str) -> i64 {
    value.trim().parse().unwrap_or(0)
}

fn lenient_f64(value: &str) -> f64 {
    value.trim().parse().unwrap_or(0.0)
}

impl RecordTransformer {
    pub fn new(key: StoreKey, generation: i64) -> Self {
        Self { key, generation }
    }

    /// 转换单行；起止地址无效、版本不符或 end < start 时返回 None
    pub fn transform_row(&self, row: &StringRecord) -> Option<RangeRecord> {
        let range = IpRange::parse(field(row, 0), field(row, 1), self.key.version)?;

        let attributes = match self.key.dataset {
            DatasetType::Country => RecordAttributes::Country {
                country_code: field(row, 2).to_string(),
            },
            DatasetType::Asn => RecordAttributes::Asn {
                as_number: lenient_i64(field(row, 2)),
                as_organisation: field(row, 3).to_string(),
            },
            DatasetType::City => RecordAttributes::City {
                country_code: field(row, 2).to_string(),
                region1: field(row, 3).to_string(),
                region2: field(row, 4).to_string(),
                city: field(row, 5).to_string(),
                postcode: field(row, 6).to_string(),
                lat: lenient_f64(field(row, 7)),
                lon: lenient_f64(field(row, 8)),
                timezone: field(row, 9).to_string(),
            },
        };

        Some(RangeRecord {
            range,
            ip_version: self.key.version,
            generation: self.generation,
            attributes,
        })
    }

    /// 同步读取全部行，按 `batch_size` 分批交给 `sink`
    ///
    /// `sink` 返回 false 时停止读取（接收方已关闭）。
    pub fn transform_reader<R, F>(
        &self,
        reader: R,
        batch_size: usize,
        mut sink: F,
    ) -> Result<TransformStats>
    where
        R: Read,
        F: FnMut(Vec<RangeRecord>) -> bool,
    {
        let batch_size = batch_size.max(1);
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut stats = TransformStats::default();
        let mut batch = Vec::with_capacity(batch_size);
        let mut row = StringRecord::new();
        let mut line: u64 = 0;

        loop {
            line += 1;
            match csv_reader.read_record(&mut row) {
                Ok(false) => break,
                Ok(true) => {}
                Err(e) if matches!(e.kind(), csv::ErrorKind::Utf8 { .. }) => {
                    warn!("{}: line {} is not valid UTF-8, skipped", self.key, line);
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let Some(record) = self.transform_row(&row) else {
                warn!(
                    "{}: line {} has an invalid range ({} - {}), skipped",
                    self.key,
                    line,
                    field(&row, 0),
                    field(&row, 1)
                );
                stats.skipped += 1;
                continue;
            };

            batch.push(record);
            stats.records += 1;
            if batch.len() >= batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                if !sink(full) {
                    return Ok(stats);
                }
            }
        }

        if !batch.is_empty() {
            sink(batch);
        }

        debug!(
            "{}: transformed {} records, skipped {}",
            self.key, stats.records, stats.skipped
        );
        Ok(stats)
    }

    /// 在阻塞线程中读取文件，通过有界通道逐批产出
    pub fn stream_file(
        self,
        path: PathBuf,
        batch_size: usize,
    ) -> (
        mpsc::Receiver<Vec<RangeRecord>>,
        JoinHandle<Result<TransformStats>>,
    ) {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::task::spawn_blocking(move || {
            let file = File::open(&path).map_err(|e| {
                IpLocateError::file_operation(format!("无法打开 {}: {}", path.display(), e))
            })?;
            self.transform_reader(BufReader::new(file), batch_size, |batch| {
                tx.blocking_send(batch).is_ok()
            })
        });
        (rx, handle)
    }
}
