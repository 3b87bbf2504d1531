//! Relational range store tests
//!
//! Every test opens its own temporary SQLite database.

use iplocate::storage::SeaOrmRangeStore;
use iplocate::storage::backend::{self, retry::RetryConfig};
use iplocate::storage::models::{
    DatasetType, IpRange, IpVersion, RangeRecord, RecordAttributes, StoreKey,
};
use iplocate::storage::traits::RangeStore;
use iplocate::utils::ip::{ip_to_number, parse_ip};
use sea_orm::DatabaseConnection;
use tempfile::TempDir;

const V4_COUNTRY: StoreKey = StoreKey {
    dataset: DatasetType::Country,
    version: IpVersion::V4,
};

/// 创建临时 SQLite 数据库（已执行迁移）
async fn create_temp_db() -> (DatabaseConnection, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("ranges.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let (db, backend_name) = backend::connect(&db_url, 1)
        .await
        .expect("Failed to connect to SQLite");
    assert_eq!(backend_name, "sqlite");
    (db, temp_dir)
}

async fn open_store(db: &DatabaseConnection, key: StoreKey) -> SeaOrmRangeStore {
    SeaOrmRangeStore::open(db.clone(), key, "sqlite", RetryConfig::default())
        .await
        .expect("Failed to open store")
}

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

fn num(ip: &str) -> u128 {
    ip_to_number(&parse_ip(ip).unwrap())
}

async fn load(store: &SeaOrmRangeStore, generation: i64, records: &[RangeRecord]) {
    store.begin_generation(generation).await.unwrap();
    store.append_batch(records, generation).await.unwrap();
    store.retire_older_than(generation).await.unwrap();
}

fn country_code(record: &RangeRecord) -> &str {
    match &record.attributes {
        RecordAttributes::Country { country_code } => country_code,
        other => panic!("unexpected attributes {:?}", other),
    }
}

async fn code_at(store: &SeaOrmRangeStore, ip: &str) -> Option<String> {
    store
        .lookup(num(ip))
        .await
        .unwrap()
        .map(|record| country_code(&record).to_string())
}

// =============================================================================
// 代际生命周期
// =============================================================================

#[tokio::test]
async fn test_empty_store_finds_nothing() {
    let (db, _dir) = create_temp_db().await;
    let store = open_store(&db, V4_COUNTRY).await;

    assert_eq!(store.current_generation().await.unwrap(), 0);
    assert!(store.lookup(num("1.0.0.10")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_first_generation_is_queryable() {
    let (db, _dir) = create_temp_db().await;
    let store = open_store(&db, V4_COUNTRY).await;

    load(&store, 1, &[country("1.0.0.0", "1.0.0.255", "AU")]).await;

    assert_eq!(store.current_generation().await.unwrap(), 1);
    let record = store.lookup(num("1.0.0.10")).await.unwrap().unwrap();
    assert_eq!(country_code(&record), "AU");
    assert_eq!(record.generation, 1);
    assert_eq!(record.range.start, "1.0.0.0");
    assert_eq!(record.range.end, "1.0.0.255");

    // 区间之外
    assert!(store.lookup(num("1.0.1.0")).await.unwrap().is_none());
    assert!(store.lookup(num("0.255.255.255")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_new_generation_invisible_until_retire() {
    let (db, _dir) = create_temp_db().await;
    let store = open_store(&db, V4_COUNTRY).await;
    load(&store, 1, &[country("1.0.0.0", "1.0.0.255", "AU")]).await;

    store.begin_generation(2).await.unwrap();
    store
        .append_batch(&[country("1.0.0.0", "1.0.0.255", "US")], 2)
        .await
        .unwrap();

    // 旧代仍然完整可查
    let record = store.lookup(num("1.0.0.10")).await.unwrap().unwrap();
    assert_eq!(country_code(&record), "AU");
    assert_eq!(store.current_generation().await.unwrap(), 1);

    store.retire_older_than(2).await.unwrap();
    let record = store.lookup(num("1.0.0.10")).await.unwrap().unwrap();
    assert_eq!(country_code(&record), "US");
    assert_eq!(record.generation, 2);
}

#[tokio::test]
async fn test_retired_generation_never_returned() {
    let (db, _dir) = create_temp_db().await;
    let store = open_store(&db, V4_COUNTRY).await;

    load(&store, 1, &[country("1.0.0.0", "1.0.0.255", "AU")]).await;
    // 新代不再覆盖 1.0.0.0/24
    load(&store, 2, &[country("1.0.4.0", "1.0.7.255", "AU")]).await;

    assert!(store.lookup(num("1.0.0.10")).await.unwrap().is_none());
    let record = store.lookup(num("1.0.5.1")).await.unwrap().unwrap();
    assert_eq!(record.generation, 2);
}

#[tokio::test]
async fn test_generation_survives_reopen() {
    let (db, _dir) = create_temp_db().await;
    {
        let store = open_store(&db, V4_COUNTRY).await;
        load(&store, 1, &[country("1.0.0.0", "1.0.0.255", "AU")]).await;
        load(&store, 2, &[country("1.0.0.0", "1.0.0.255", "CN")]).await;
    }

    let reopened = open_store(&db, V4_COUNTRY).await;
    assert_eq!(reopened.current_generation().await.unwrap(), 2);
    let record = reopened.lookup(num("1.0.0.1")).await.unwrap().unwrap();
    assert_eq!(country_code(&record), "CN");
}

#[tokio::test]
async fn test_interrupted_load_is_discarded() {
    let (db, _dir) = create_temp_db().await;
    {
        let store = open_store(&db, V4_COUNTRY).await;
        load(&store, 1, &[country("1.0.0.0", "1.0.0.255", "AU")]).await;

        // 写入一半后进程退出
        store.begin_generation(2).await.unwrap();
        store
            .append_batch(&[country("1.0.0.0", "1.0.0.127", "XX")], 2)
            .await
            .unwrap();
    }

    let store = open_store(&db, V4_COUNTRY).await;
    assert_eq!(store.current_generation().await.unwrap(), 1);

    load(&store, 2, &[country("1.0.0.0", "1.0.0.255", "JP")]).await;
    let record = store.lookup(num("1.0.0.10")).await.unwrap().unwrap();
    assert_eq!(country_code(&record), "JP");
}

// =============================================================================
// 区间匹配
// =============================================================================

#[tokio::test]
async fn test_largest_start_wins() {
    let (db, _dir) = create_temp_db().await;
    let store = open_store(&db, V4_COUNTRY).await;

    load(
        &store,
        1,
        &[
            country("1.0.0.0", "1.0.0.255", "AU"),
            country("1.0.1.0", "1.0.3.255", "CN"),
            country("1.0.8.0", "1.0.15.255", "CN"),
            country("223.255.255.0", "223.255.255.255", "AU"),
        ],
    )
    .await;

    assert_eq!(code_at(&store, "1.0.0.0").await.as_deref(), Some("AU"));
    assert_eq!(code_at(&store, "1.0.0.255").await.as_deref(), Some("AU"));
    assert_eq!(code_at(&store, "1.0.1.0").await.as_deref(), Some("CN"));
    assert_eq!(code_at(&store, "1.0.3.255").await.as_deref(), Some("CN"));
    // 两个区间之间的空隙
    assert_eq!(code_at(&store, "1.0.4.1").await, None);
    assert_eq!(code_at(&store, "223.255.255.200").await.as_deref(), Some("AU"));
    assert_eq!(code_at(&store, "224.0.0.1").await, None);
}

#[tokio::test]
async fn test_byte_order_matches_numeric_order() {
    let (db, _dir) = create_temp_db().await;
    let store = open_store(&db, V4_COUNTRY).await;

    // 字符串比较会把 "9.x" 排在 "10.x" 之后
    load(
        &store,
        1,
        &[
            country("9.0.0.0", "9.255.255.255", "US"),
            country("11.0.0.0", "11.255.255.255", "US"),
            country("100.0.0.0", "100.0.0.255", "DE"),
        ],
    )
    .await;

    assert_eq!(
        country_code(&store.lookup(num("9.1.2.3")).await.unwrap().unwrap()),
        "US"
    );
    assert_eq!(
        country_code(&store.lookup(num("100.0.0.1")).await.unwrap().unwrap()),
        "DE"
    );
    assert!(store.lookup(num("10.0.0.1")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_ipv6_city_store() {
    let (db, _dir) = create_temp_db().await;
    let key = StoreKey::new(DatasetType::City, IpVersion::V6);
    let store = open_store(&db, key).await;

    let record = RangeRecord {
        range: IpRange::parse("2606:4700::", "2606:4700:ffff:ffff:ffff:ffff:ffff:ffff", IpVersion::V6)
            .unwrap(),
        ip_version: IpVersion::V6,
        generation: 0,
        attributes: RecordAttributes::City {
            country_code: "US".to_string(),
            region1: "California".to_string(),
            region2: String::new(),
            city: "San Francisco".to_string(),
            postcode: "94107".to_string(),
            lat: 37.7697,
            lon: -122.3933,
            timezone: "America/Los_Angeles".to_string(),
        },
    };
    load(&store, 1, &[record.clone()]).await;

    let found = store.lookup(num("2606:4700::1111")).await.unwrap().unwrap();
    assert_eq!(found.attributes, record.attributes);
    assert_eq!(found.ip_version, IpVersion::V6);
    assert!(store.lookup(num("2606:4701::1")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_asn_store_and_isolation() {
    let (db, _dir) = create_temp_db().await;
    let asn_store = open_store(&db, StoreKey::new(DatasetType::Asn, IpVersion::V4)).await;
    let country_store = open_store(&db, V4_COUNTRY).await;

    let asn = RangeRecord {
        range: IpRange::parse("1.1.1.0", "1.1.1.255", IpVersion::V4).unwrap(),
        ip_version: IpVersion::V4,
        generation: 0,
        attributes: RecordAttributes::Asn {
            as_number: 13335,
            as_organisation: "CLOUDFLARENET".to_string(),
        },
    };
    load(&asn_store, 1, &[asn]).await;

    let found = asn_store.lookup(num("1.1.1.1")).await.unwrap().unwrap();
    assert!(matches!(
        found.attributes,
        RecordAttributes::Asn { as_number: 13335, .. }
    ));
    // 其他表不受影响
    assert_eq!(country_store.current_generation().await.unwrap(), 0);
    assert!(country_store.lookup(num("1.1.1.1")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_mismatched_record_rejected() {
    let (db, _dir) = create_temp_db().await;
    let store = open_store(&db, StoreKey::new(DatasetType::Asn, IpVersion::V4)).await;

    store.begin_generation(1).await.unwrap();
    let err = store
        .append_batch(&[country("1.0.0.0", "1.0.0.255", "AU")], 1)
        .await
        .unwrap_err();
    assert!(err.message().contains("cannot be stored"));
}

#[tokio::test]
async fn test_concurrent_lookups_during_refresh() {
    let (db, _dir) = create_temp_db().await;
    let store = std::sync::Arc::new(open_store(&db, V4_COUNTRY).await);
    load(&store, 1, &[country("1.0.0.0", "1.0.0.255", "AU")]).await;

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let record = store.lookup(num("1.0.0.10")).await.unwrap().unwrap();
                let code = country_code(&record).to_string();
                assert!(code == "AU" || code == "NZ", "torn read: {}", code);
            }
        })
    };

    store.begin_generation(2).await.unwrap();
    store
        .append_batch(&[country("1.0.0.0", "1.0.0.255", "NZ")], 2)
        .await
        .unwrap();
    store.retire_older_than(2).await.unwrap();

    reader.await.unwrap();
    let record = store.lookup(num("1.0.0.10")).await.unwrap().unwrap();
    assert_eq!(country_code(&record), "NZ");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_covered_address_never_missed_across_generations() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    let (db, _dir) = create_temp_db().await;
    let store = Arc::new(open_store(&db, V4_COUNTRY).await);

    // 每代 100 条 /24，让删除旧代的耗时足以与查询交错
    let rows = |code: &str| -> Vec<RangeRecord> {
        (0..100)
            .map(|i| country(&format!("1.0.{}.0", i), &format!("1.0.{}.255", i), code))
            .collect()
    };
    load(&store, 1, &rows("AU")).await;

    let stop = Arc::new(AtomicBool::new(false));
    let lookups = Arc::new(AtomicU64::new(0));
    let misses = Arc::new(AtomicU64::new(0));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let stop = stop.clone();
            let lookups = lookups.clone();
            let misses = misses.clone();
            tokio::spawn(async move {
                loop {
                    if store.lookup(num("1.0.0.10")).await.unwrap().is_none() {
                        misses.fetch_add(1, Ordering::Relaxed);
                    }
                    lookups.fetch_add(1, Ordering::Relaxed);
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                }
            })
        })
        .collect();

    for generation in 2..=40 {
        let code = if generation % 2 == 0 { "NZ" } else { "AU" };
        load(&store, generation, &rows(code)).await;
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.await.unwrap();
    }

    assert!(lookups.load(Ordering::Relaxed) > 0);
    assert_eq!(misses.load(Ordering::Relaxed), 0);
    assert_eq!(store.current_generation().await.unwrap(), 40);
    assert_eq!(code_at(&store, "1.0.0.10").await.as_deref(), Some("NZ"));
}
