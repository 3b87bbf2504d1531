//! RangeRecord ↔ 数据表行的转换
//!
//! 每种数据集一张表结构：公共列 + 各自的属性列。

use sea_orm::FromQueryResult;
use sea_orm::sea_query::{Alias, Expr, SimpleExpr};

use crate::errors::{IpLocateError, Result};
use crate::storage::models::{DatasetType, IpRange, IpVersion, RangeRecord, RecordAttributes};
use crate::utils::ip::{be_bytes_to_number, number_to_be_bytes};

pub const COL_IP_RANGE_START: &str = "ip_range_start";
pub const COL_IP_RANGE_END: &str = "ip_range_end";
pub const COL_IP_NUMBER_START: &str = "ip_number_start";
pub const COL_IP_NUMBER_END: &str = "ip_number_end";
pub const COL_IP_VERSION: &str = "ip_version";
pub const COL_GENERATION: &str = "generation";

const COMMON_COLUMNS: [&str; 6] = [
    COL_IP_RANGE_START,
    COL_IP_RANGE_END,
    COL_IP_NUMBER_START,
    COL_IP_NUMBER_END,
    COL_IP_VERSION,
    COL_GENERATION,
];

fn attribute_columns(dataset: DatasetType) -> &'static [&'static str] {
    match dataset {
        DatasetType::Country => &["country_code"],
        DatasetType::City => &[
            "country_code",
            "region1",
            "region2",
            "city",
            "postcode",
            "latitude",
            "longitude",
            "timezone",
        ],
        DatasetType::Asn => &["as_number", "as_organisation"],
    }
}

/// 数据集对应的全部列（公共列在前）
pub fn columns(dataset: DatasetType) -> Vec<Alias> {
    COMMON_COLUMNS
        .iter()
        .chain(attribute_columns(dataset))
        .map(|c| Alias::new(*c))
        .collect()
}

/// 与 `columns` 顺序一致的一行插入值
pub fn row_values(record: &RangeRecord, generation: i64) -> Vec<SimpleExpr> {
    let version = record.ip_version;
    let mut values: Vec<SimpleExpr> = vec![
        Expr::val(record.range.start.clone()).into(),
        Expr::val(record.range.end.clone()).into(),
        Expr::val(number_to_be_bytes(record.range.start_number, version)).into(),
        Expr::val(number_to_be_bytes(record.range.end_number, version)).into(),
        Expr::val(version.number() as i16).into(),
        Expr::val(generation).into(),
    ];

    match &record.attributes {
        RecordAttributes::Country { country_code } => {
            values.push(Expr::val(country_code.clone()).into());
        }
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
            values.push(Expr::val(country_code.clone()).into());
            values.push(Expr::val(region1.clone()).into());
            values.push(Expr::val(region2.clone()).into());
            values.push(Expr::val(city.clone()).into());
            values.push(Expr::val(postcode.clone()).into());
            values.push(Expr::val(*lat).into());
            values.push(Expr::val(*lon).into());
            values.push(Expr::val(timezone.clone()).into());
        }
        RecordAttributes::Asn {
            as_number,
            as_organisation,
        } => {
            values.push(Expr::val(*as_number).into());
            values.push(Expr::val(as_organisation.clone()).into());
        }
    }

    values
}

#[derive(Debug, FromQueryResult)]
pub struct CountryRow {
    pub ip_range_start: String,
    pub ip_range_end: String,
    pub ip_number_start: Vec<u8>,
    pub ip_number_end: Vec<u8>,
    pub generation: i64,
    pub country_code: String,
}

#[derive(Debug, FromQueryResult)]
pub struct CityRow {
    pub ip_range_start: String,
    pub ip_range_end: String,
    pub ip_number_start: Vec<u8>,
    pub ip_number_end: Vec<u8>,
    pub generation: i64,
    pub country_code: String,
    pub region1: String,
    pub region2: String,
    pub city: String,
    pub postcode: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
}

#[derive(Debug, FromQueryResult)]
pub struct AsnRow {
    pub ip_range_start: String,
    pub ip_range_end: String,
    pub ip_number_start: Vec<u8>,
    pub ip_number_end: Vec<u8>,
    pub generation: i64,
    pub as_number: i64,
    pub as_organisation: String,
}

/// 由行内的文本与定长字节还原区间
fn decode_range(
    start: String,
    end: String,
    start_bytes: &[u8],
    end_bytes: &[u8],
) -> Result<IpRange> {
    let start_number = be_bytes_to_number(start_bytes).ok_or_else(|| {
        IpLocateError::database_operation(format!(
            "损坏的 ip_number_start ({} bytes) for {}",
            start_bytes.len(),
            start
        ))
    })?;
    let end_number = be_bytes_to_number(end_bytes).ok_or_else(|| {
        IpLocateError::database_operation(format!(
            "损坏的 ip_number_end ({} bytes) for {}",
            end_bytes.len(),
            end
        ))
    })?;

    Ok(IpRange {
        start,
        end,
        start_number,
        end_number,
    })
}

impl CountryRow {
    pub fn into_record(self, version: IpVersion) -> Result<RangeRecord> {
        Ok(RangeRecord {
            range: decode_range(
                self.ip_range_start,
                self.ip_range_end,
                &self.ip_number_start,
                &self.ip_number_end,
            )?,
            ip_version: version,
            generation: self.generation,
            attributes: RecordAttributes::Country {
                country_code: self.country_code,
            },
        })
    }
}

impl CityRow {
    pub fn into_record(self, version: IpVersion) -> Result<RangeRecord> {
        Ok(RangeRecord {
            range: decode_range(
                self.ip_range_start,
                self.ip_range_end,
                &self.ip_number_start,
                &self.ip_number_end,
            )?,
            ip_version: version,
            generation: self.generation,
            attributes: RecordAttributes::City {
                country_code: self.country_code,
                region1: self.region1,
                region2: self.region2,
                city: self.city,
                postcode: self.postcode,
                lat: self.latitude,
                lon: self.longitude,
                timezone: self.timezone,
            },
        })
    }
}

impl AsnRow {
    pub fn into_record(self, version: IpVersion) -> Result<RangeRecord> {
        Ok(RangeRecord {
            range: decode_range(
                self.ip_range_start,
                self.ip_range_end,
                &self.ip_number_start,
                &self.ip_number_end,
            )?,
            ip_version: version,
            generation: self.generation,
            attributes: RecordAttributes::Asn {
                as_number: self.as_number,
                as_organisation: self.as_organisation,
            },
        })
    }
}
