//! Resolution across a generation switch, on both storage backends

use std::sync::Arc;

use iplocate::services::Resolver;
use iplocate::storage::backend::{self, retry::RetryConfig};
use iplocate::storage::models::{
    DatasetType, IpRange, IpVersion, RangeRecord, RecordAttributes, StoreKey,
};
use iplocate::storage::traits::RangeStore;
use iplocate::storage::{SeaOrmRangeStore, StoreRegistry, TrieFileStore};
use tempfile::TempDir;

const V4_COUNTRY: StoreKey = StoreKey {
    dataset: DatasetType::Country,
    version: IpVersion::V4,
};

fn country(start: &str, end: &str, code: &str) -> RangeRecord {
    RangeRecord {
        range: IpRange::parse(start, end, IpVersion::V4).unwrap(),
        ip_version: IpVersion::V4,
        generation: 0,
        attributes: RecordAttributes::Country {
            country_code: code.to_string(),
        },
    }
}

async fn load(store: &dyn RangeStore, generation: i64, records: &[RangeRecord]) {
    store.begin_generation(generation).await.unwrap();
    store.append_batch(records, generation).await.unwrap();
    store.retire_older_than(generation).await.unwrap();
}

/// 第 1 代 AU 覆盖 1.0.0.0/24，第 2 代 US 只覆盖前半段
async fn assert_newer_generation_wins(store: Arc<dyn RangeStore>) {
    let resolver = Resolver::new(Arc::new(StoreRegistry::from_stores(vec![store.clone()])));

    load(store.as_ref(), 1, &[country("1.0.0.0", "1.0.0.255", "AU")]).await;
    let before = resolver.resolve("1.0.0.200").await.unwrap();
    assert!(before.found_country);
    assert_eq!(before.country_code.as_deref(), Some("AU"));

    load(store.as_ref(), 2, &[country("1.0.0.0", "1.0.0.127", "US")]).await;

    let covered = resolver.resolve("1.0.0.10").await.unwrap();
    assert!(covered.found_country);
    assert_eq!(covered.country_code.as_deref(), Some("US"));
    assert!(!covered.found_city && !covered.found_asn);

    // 旧代已淘汰，不会回落到 AU
    let uncovered = resolver.resolve("1.0.0.200").await.unwrap();
    assert!(!uncovered.found_country);
    assert!(uncovered.country_code.is_none());
}

#[tokio::test]
async fn test_relational_store_serves_only_newest_generation() {
    let dir = TempDir::new().unwrap();
    let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("ranges.db").display());
    let (db, backend_name) = backend::connect(&db_url, 1).await.unwrap();
    let store = SeaOrmRangeStore::open(db, V4_COUNTRY, backend_name, RetryConfig::default())
        .await
        .unwrap();

    assert_newer_generation_wins(Arc::new(store)).await;
}

#[tokio::test]
async fn test_trie_store_serves_only_newest_generation() {
    let dir = TempDir::new().unwrap();
    let path = TrieFileStore::path_for(dir.path(), "geolite2-country", IpVersion::V4);
    let store = TrieFileStore::open(V4_COUNTRY, path).unwrap();

    assert_newer_generation_wins(Arc::new(store)).await;
}
