//! 可用数据源目录

use crate::storage::models::{DatasetType, IpVersion};

const JSDELIVR: &str = "https://cdn.jsdelivr.net/npm/@ip-location-db/";
const UNPKG: &str = "https://unpkg.com/@ip-location-db/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Gzip,
}

impl SourceFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SourceFormat::Csv => "",
            SourceFormat::Gzip => ".gz",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: &'static str,
    pub dataset: DatasetType,
    pub format: SourceFormat,
    pub cdn: &'static str,
    pub licenses: &'static [&'static str],
}

impl SourceEntry {
    /// `{cdn}{name}/{name}-ipv{4|6}.csv[.gz]`
    pub fn url_for(&self, version: IpVersion) -> String {
        format!(
            "{}{}/{}-{}.csv{}",
            self.cdn,
            self.name,
            self.name,
            version,
            self.format.extension()
        )
    }

    pub fn is_compressed(&self) -> bool {
        self.format == SourceFormat::Gzip
    }
}

const fn entry(
    name: &'static str,
    dataset: DatasetType,
    format: SourceFormat,
    cdn: &'static str,
    licenses: &'static [&'static str],
) -> SourceEntry {
    SourceEntry {
        name,
        dataset,
        format,
        cdn,
        licenses,
    }
}

pub static SOURCES: &[SourceEntry] = &[
    entry("asn-country", DatasetType::Country, SourceFormat::Csv, JSDELIVR, &[]),
    entry("dbip-country", DatasetType::Country, SourceFormat::Csv, JSDELIVR, &["DBIP-LICENSE"]),
    entry("geo-asn-country", DatasetType::Country, SourceFormat::Csv, JSDELIVR, &[]),
    entry("geo-whois-asn-country", DatasetType::Country, SourceFormat::Csv, JSDELIVR, &[]),
    entry(
        "geolite2-country",
        DatasetType::Country,
        SourceFormat::Csv,
        JSDELIVR,
        &["GEOLITE2_LICENSE", "GEOLITE2_EULA"],
    ),
    entry("iptoasn-country", DatasetType::Country, SourceFormat::Csv, JSDELIVR, &[]),
    entry("webnet77-country", DatasetType::Country, SourceFormat::Csv, JSDELIVR, &["WEBNET77-LICENSE"]),
    entry("dbip-city", DatasetType::City, SourceFormat::Gzip, UNPKG, &["DBIP-LICENSE"]),
    entry(
        "geolite2-city",
        DatasetType::City,
        SourceFormat::Gzip,
        JSDELIVR,
        &["GEOLITE2_LICENSE", "GEOLITE2_EULA"],
    ),
    entry(
        "asn",
        DatasetType::Asn,
        SourceFormat::Csv,
        JSDELIVR,
        &["ROUTEVIEWS-LICENSE", "DBIP-LICENSE"],
    ),
    entry("dbip-asn", DatasetType::Asn, SourceFormat::Csv, JSDELIVR, &["DBIP-LICENSE"]),
    entry(
        "geolite2-asn",
        DatasetType::Asn,
        SourceFormat::Csv,
        JSDELIVR,
        &["GEOLITE2_LICENSE", "GEOLITE2_EULA"],
    ),
    entry("iptoasn-asn", DatasetType::Asn, SourceFormat::Csv, JSDELIVR, &[]),
];

pub fn find_source(name: &str) -> Option<&'static SourceEntry> {
    SOURCES.iter().find(|s| s.name == name)
}

/// 某类数据集的全部可选数据源
pub fn sources_for(dataset: DatasetType) -> impl Iterator<Item = &'static SourceEntry> {
    SOURCES.iter().filter(move |s| s.dataset == dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_csv() {
        let source = find_source("geolite2-country").unwrap();
        assert_eq!(
            source.url_for(IpVersion::V4),
            "https://cdn.jsdelivr.net/npm/@ip-location-db/geolite2-country/geolite2-country-ipv4.csv"
        );
    }

    #[test]
    fn test_url_for_gzip() {
        let source = find_source("dbip-city").unwrap();
        assert!(source.is_compressed());
        assert_eq!(
            source.url_for(IpVersion::V6),
            "https://unpkg.com/@ip-location-db/dbip-city/dbip-city-ipv6.csv.gz"
        );
    }

    #[test]
    fn test_catalog_counts() {
        assert_eq!(sources_for(DatasetType::Country).count(), 7);
        assert_eq!(sources_for(DatasetType::City).count(), 2);
        assert_eq!(sources_for(DatasetType::Asn).count(), 4);
        assert!(find_source("maxmind-everything").is_none());
    }
}
