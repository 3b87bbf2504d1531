//! IP 解析服务
//!
//! 依次查询 city → country（仅当 city 未命中）→ asn，合并为一条结果。
//! 只有非法 / 保留地址会返回错误；某个存储未命中或查询出错只会让对应
//! 的 found 标志保持 false。

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::errors::{IpLocateError, Result};
use crate::storage::StoreRegistry;
use crate::storage::models::{DatasetType, IpVersion, RangeRecord, RecordAttributes, StoreKey};
use crate::utils::ip::{ip_to_number, is_reserved, parse_ip};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub ip: String,
    pub ip_version: u8,
    pub found_country: bool,
    pub found_city: bool,
    pub found_asn: bool,
    pub country_code: Option<String>,
    #[serde(rename = "state")]
    pub region1: Option<String>,
    #[serde(rename = "state_2")]
    pub region2: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timezone: Option<String>,
    pub as_number: Option<i64>,
    pub as_organisation: Option<String>,
    pub ms_taken: u64,
    #[serde(rename = "μs_taken")]
    pub us_taken: u64,
}

impl ResolvedLocation {
    fn apply(&mut self, record: RangeRecord) {
        match record.attributes {
            RecordAttributes::City {
                country_code,
                region1,
                region2,
                city,
                postcode,
                lat,
                lon,
                timezone,
            } => {
                self.country_code = Some(country_code);
                self.region1 = Some(region1);
                self.region2 = Some(region2);
                self.city = Some(city);
                self.postcode = Some(postcode);
                self.lat = Some(lat);
                self.lon = Some(lon);
                self.timezone = Some(timezone);
                self.found_city = true;
                self.found_country = true;
            }
            RecordAttributes::Country { country_code } => {
                self.country_code = Some(country_code);
                self.found_country = true;
            }
            RecordAttributes::Asn {
                as_number,
                as_organisation,
            } => {
                self.as_number = Some(as_number);
                self.as_organisation = Some(as_organisation);
                self.found_asn = true;
            }
        }
    }
}

/// 校验地址：无法解析或属于私有 / 回环 / 保留网段时返回 InvalidInput
pub fn validate_ip(input: &str) -> Result<IpAddr> {
    match parse_ip(input) {
        Some(ip) if !is_reserved(&ip) => Ok(ip),
        _ => Err(IpLocateError::invalid_input(format!(
            "invalid IP address passed ({}); private / loopback IP ranges are not processed",
            input
        ))),
    }
}

pub struct Resolver {
    registry: Arc<StoreRegistry>,
}

impl Resolver {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    pub async fn resolve(&self, input: &str) -> Result<ResolvedLocation> {
        let started = Instant::now();
        let ip = validate_ip(input)?;
        let version = IpVersion::of(&ip);
        let number = ip_to_number(&ip);

        let mut location = ResolvedLocation {
            ip: input.trim().to_string(),
            ip_version: version.number(),
            ..Default::default()
        };

        if let Some(record) = self.lookup(DatasetType::City, version, number).await {
            location.apply(record);
        }
        if !location.found_country
            && let Some(record) = self.lookup(DatasetType::Country, version, number).await
        {
            location.apply(record);
        }
        if let Some(record) = self.lookup(DatasetType::Asn, version, number).await {
            location.apply(record);
        }

        let elapsed = started.elapsed();
        location.ms_taken = elapsed.as_millis() as u64;
        location.us_taken = elapsed.as_micros() as u64;

        trace!(
            "Resolved {} in {}μs (country={}, city={}, asn={})",
            location.ip,
            location.us_taken,
            location.found_country,
            location.found_city,
            location.found_asn
        );
        Ok(location)
    }

    /// 未配置的存储直接视为未命中；存储错误记录日志后同样视为未命中
    async fn lookup(&self, dataset: DatasetType, version: IpVersion, number: u128) -> Option<RangeRecord> {
        let key = StoreKey::new(dataset, version);
        let store = self.registry.get(key)?;
        match store.lookup(number).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Lookup in {} failed: {}", key, e);
                None
            }
        }
    }
}
