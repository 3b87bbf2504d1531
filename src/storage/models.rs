use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

use crate::utils::ip::{ip_to_number, parse_ip};

/// 数据集类型，迭代顺序即刷新顺序：country → city → asn
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, AsRefStr, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DatasetType {
    Country,
    City,
    Asn,
}

impl DatasetType {
    pub fn all() -> impl Iterator<Item = DatasetType> {
        DatasetType::iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IpVersion {
    #[serde(rename = "4")]
    V4,
    #[serde(rename = "6")]
    V6,
}

impl IpVersion {
    pub const ALL: [IpVersion; 2] = [IpVersion::V4, IpVersion::V6];

    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            4 => Some(IpVersion::V4),
            6 => Some(IpVersion::V6),
            _ => None,
        }
    }

    /// 地址位宽
    pub fn bits(self) -> u32 {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }

    /// 关系库中 ip_number_* 列的字节宽度
    pub fn byte_width(self) -> usize {
        (self.bits() / 8) as usize
    }

    pub fn max_number(self) -> u128 {
        match self {
            IpVersion::V4 => u32::MAX as u128,
            IpVersion::V6 => u128::MAX,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipv{}", self.number())
    }
}

/// (数据集类型, IP 版本) 组合，一个 RangeStore 对应一个
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub dataset: DatasetType,
    pub version: IpVersion,
}

impl StoreKey {
    pub fn new(dataset: DatasetType, version: IpVersion) -> Self {
        Self { dataset, version }
    }

    /// 关系库表名，如 `ipv4_country`
    pub fn table_name(&self) -> String {
        format!("{}_{}", self.version, self.dataset)
    }

    /// 所有组合，按刷新顺序排列
    pub fn all() -> impl Iterator<Item = StoreKey> {
        DatasetType::all()
            .flat_map(|dataset| IpVersion::ALL.into_iter().map(move |v| StoreKey::new(dataset, v)))
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dataset, self.version)
    }
}

/// 闭区间 [start, end]，同时保留原始文本和数值形式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRange {
    pub start: String,
    pub end: String,
    pub start_number: u128,
    pub end_number: u128,
}

impl IpRange {
    /// 解析起止地址；版本不符、无法解析或 end < start 时返回 None
    pub fn parse(start: &str, end: &str, version: IpVersion) -> Option<Self> {
        let start_ip = parse_ip(start)?;
        let end_ip = parse_ip(end)?;
        if IpVersion::of(&start_ip) != version || IpVersion::of(&end_ip) != version {
            return None;
        }

        let start_number = ip_to_number(&start_ip);
        let end_number = ip_to_number(&end_ip);
        if end_number < start_number {
            return None;
        }

        Some(Self {
            start: start.trim().to_string(),
            end: end.trim().to_string(),
            start_number,
            end_number,
        })
    }

    pub fn contains(&self, number: u128) -> bool {
        self.start_number <= number && number <= self.end_number
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordAttributes {
    Country {
        country_code: String,
    },
    City {
        country_code: String,
        region1: String,
        region2: String,
        city: String,
        postcode: String,
        lat: f64,
        lon: f64,
        timezone: String,
    },
    Asn {
        as_number: i64,
        as_organisation: String,
    },
}

impl RecordAttributes {
    pub fn dataset(&self) -> DatasetType {
        match self {
            RecordAttributes::Country { .. } => DatasetType::Country,
            RecordAttributes::City { .. } => DatasetType::City,
            RecordAttributes::Asn { .. } => DatasetType::Asn,
        }
    }
}

/// 一条 IP 段记录：区间 + 属性 + 所属代际
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRecord {
    pub range: IpRange,
    pub ip_version: IpVersion,
    pub generation: i64,
    pub attributes: RecordAttributes,
}

impl RangeRecord {
    pub fn dataset(&self) -> DatasetType {
        self.attributes.dataset()
    }

    pub fn key(&self) -> StoreKey {
        StoreKey::new(self.dataset(), self.ip_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        let names: Vec<String> = StoreKey::all().map(|k| k.table_name()).collect();
        assert_eq!(
            names,
            vec![
                "ipv4_country",
                "ipv6_country",
                "ipv4_city",
                "ipv6_city",
                "ipv4_asn",
                "ipv6_asn"
            ]
        );
    }

    #[test]
    fn test_range_parse() {
        let range = IpRange::parse("1.0.0.0", "1.0.0.255", IpVersion::V4).unwrap();
        assert_eq!(range.start_number, 0x0100_0000);
        assert_eq!(range.end_number, 0x0100_00ff);
        assert!(range.contains(0x0100_000a));
        assert!(!range.contains(0x0100_0100));
    }

    #[test]
    fn test_range_parse_rejects_version_mismatch() {
        assert!(IpRange::parse("1.0.0.0", "1.0.0.255", IpVersion::V6).is_none());
        assert!(IpRange::parse("2001:db8::", "2001:db8::ff", IpVersion::V4).is_none());
    }

    #[test]
    fn test_range_parse_rejects_inverted() {
        assert!(IpRange::parse("1.0.0.255", "1.0.0.0", IpVersion::V4).is_none());
        assert!(IpRange::parse("not-an-ip", "1.0.0.0", IpVersion::V4).is_none());
    }

    #[test]
    fn test_attributes_json_tagged() {
        let attrs = RecordAttributes::Asn {
            as_number: 13335,
            as_organisation: "CLOUDFLARENET".to_string(),
        };
        let json = serde_json::to_string(&attrs).unwrap();
        assert!(json.contains("\"type\":\"asn\""));
        let back: RecordAttributes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }
}
