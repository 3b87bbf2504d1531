//! Refresh orchestrator tests
//!
//! A scripted fetcher stands in for the CDN; stores are trie files in a
//! temporary directory.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Notify;

use iplocate::config::AppConfig;
use iplocate::errors::Result;
use iplocate::services::refresh::PairOutcome;
use iplocate::services::{
    FetchOutcome, Fetcher, RefreshOrchestrator, RefreshOutcome, RefreshState, Resolver,
};
use iplocate::storage::models::{DatasetType, IpVersion, RecordAttributes, StoreKey};
use iplocate::storage::traits::RangeStore;
use iplocate::storage::{StoreRegistry, TrieFileStore};
use iplocate::utils::ip::{ip_to_number, parse_ip};

const COUNTRY_V4: &str = "1.0.0.0,1.0.0.255,AU\n1.0.1.0,1.0.3.255,CN\nnot-an-ip,1.0.4.0,XX\n";
const COUNTRY_V6: &str = "2606:4700::,2606:4700::ffff,US\n";
const CITY_V4: &str =
    "1.0.0.0,1.0.0.255,AU,Queensland,,South Brisbane,4101,-27.4748,153.017,Australia/Brisbane\n";
const CITY_V6: &str =
    "2400:cb00::,2400:cb00::ffff,US,California,,San Francisco,94107,37.7697,-122.3933,America/Los_Angeles\n";

/// 按 URL 文件名返回下载目录中的文件
struct ScriptedFetcher {
    dir: PathBuf,
    changed: AtomicBool,
    fetches: AtomicUsize,
    /// 第一次 fetch 在此等待，用于构造并发场景
    gate: Mutex<Option<Arc<Notify>>>,
    entered: Arc<Notify>,
}

impl ScriptedFetcher {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            changed: AtomicBool::new(true),
            fetches: AtomicUsize::new(0),
            gate: Mutex::new(None),
            entered: Arc::new(Notify::new()),
        }
    }

    fn set_changed(&self, changed: bool) {
        self.changed.store(changed, Ordering::SeqCst);
    }

    fn hold_first_fetch(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            self.entered.notify_one();
            gate.notified().await;
        }

        let name = url.rsplit('/').next().unwrap_or_default();
        Ok(FetchOutcome {
            changed: self.changed.load(Ordering::SeqCst),
            path: self.dir.join(name),
        })
    }
}

fn write_csv(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

fn write_gz(dir: &Path, name: &str, content: &str) {
    let file = std::fs::File::create(dir.join(name)).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

struct Fixture {
    _dir: TempDir,
    download_dir: PathBuf,
    fetcher: Arc<ScriptedFetcher>,
    registry: Arc<StoreRegistry>,
    orchestrator: Arc<RefreshOrchestrator>,
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.datasets.country = Some("geolite2-country".to_string());
    config.datasets.city = Some("dbip-city".to_string());
    config.refresh.batch_size = 2;
    config
}

fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    let download_dir = dir.path().join("downloads");
    let trie_dir = dir.path().join("trie");
    std::fs::create_dir_all(&download_dir).unwrap();

    write_csv(&download_dir, "geolite2-country-ipv4.csv", COUNTRY_V4);
    write_csv(&download_dir, "geolite2-country-ipv6.csv", COUNTRY_V6);
    write_gz(&download_dir, "dbip-city-ipv4.csv.gz", CITY_V4);
    write_gz(&download_dir, "dbip-city-ipv6.csv.gz", CITY_V6);

    let mut stores: Vec<Arc<dyn RangeStore>> = Vec::new();
    for (dataset, source) in [
        (DatasetType::Country, "geolite2-country"),
        (DatasetType::City, "dbip-city"),
    ] {
        for version in IpVersion::ALL {
            let key = StoreKey::new(dataset, version);
            let path = TrieFileStore::path_for(&trie_dir, source, version);
            stores.push(Arc::new(TrieFileStore::open(key, path).unwrap()));
        }
    }
    let registry = Arc::new(StoreRegistry::from_stores(stores));

    let fetcher = Arc::new(ScriptedFetcher::new(&download_dir));
    let orchestrator = Arc::new(
        RefreshOrchestrator::new(registry.clone(), fetcher.clone(), &test_config()).unwrap(),
    );

    Fixture {
        _dir: dir,
        download_dir,
        fetcher,
        registry,
        orchestrator,
    }
}

fn completed(outcome: RefreshOutcome) -> iplocate::services::RefreshReport {
    match outcome {
        RefreshOutcome::Completed(report) => report,
        RefreshOutcome::Skipped => panic!("refresh unexpectedly skipped"),
    }
}

async fn country_at(registry: &StoreRegistry, ip: &str) -> Option<String> {
    let ip = parse_ip(ip).unwrap();
    let key = StoreKey::new(DatasetType::Country, IpVersion::of(&ip));
    let record = registry.get(key)?.lookup(ip_to_number(&ip)).await.unwrap()?;
    match record.attributes {
        RecordAttributes::Country { country_code } => Some(country_code),
        other => panic!("unexpected attributes {:?}", other),
    }
}

#[tokio::test]
async fn test_initial_refresh_loads_every_pair() {
    let fx = setup();
    assert!(fx.orchestrator.needs_initial_load().await.unwrap());

    let report = completed(fx.orchestrator.refresh(false).await.unwrap());
    assert_eq!(report.pairs.len(), 4);
    assert_eq!(report.loaded_count(), 4);
    assert!(!report.forced);

    // 刷新顺序：country → city，每个数据集先 v4 后 v6
    let order: Vec<_> = report
        .pairs
        .iter()
        .map(|p| (p.dataset, p.ip_version))
        .collect();
    assert_eq!(
        order,
        vec![
            (DatasetType::Country, 4),
            (DatasetType::Country, 6),
            (DatasetType::City, 4),
            (DatasetType::City, 6),
        ]
    );

    assert_eq!(
        report.pairs[0].outcome,
        PairOutcome::Loaded {
            records: 2,
            skipped: 1,
            generation: 1
        }
    );

    assert!(!fx.orchestrator.needs_initial_load().await.unwrap());
    assert_eq!(fx.orchestrator.state(), RefreshState::Idle);
    assert!(fx.orchestrator.last_report().is_some());
    // gz 已解压到同名 .csv
    assert!(fx.download_dir.join("dbip-city-ipv4.csv").exists());

    let resolver = Resolver::new(fx.registry.clone());
    let location = resolver.resolve("1.0.0.10").await.unwrap();
    assert!(location.found_city && location.found_country);
    assert_eq!(location.city.as_deref(), Some("South Brisbane"));
    assert_eq!(location.region1.as_deref(), Some("Queensland"));
    assert_eq!(location.country_code.as_deref(), Some("AU"));

    let location = resolver.resolve("1.0.2.1").await.unwrap();
    assert!(!location.found_city);
    assert!(location.found_country);
    assert_eq!(location.country_code.as_deref(), Some("CN"));

    let location = resolver.resolve("2400:cb00::1").await.unwrap();
    assert_eq!(location.city.as_deref(), Some("San Francisco"));
    assert_eq!(location.ip_version, 6);
}

#[tokio::test]
async fn test_unchanged_sources_are_skipped() {
    let fx = setup();
    completed(fx.orchestrator.refresh(false).await.unwrap());

    fx.fetcher.set_changed(false);
    let report = completed(fx.orchestrator.refresh(false).await.unwrap());
    assert_eq!(report.loaded_count(), 0);
    assert!(
        report
            .pairs
            .iter()
            .all(|p| p.outcome == PairOutcome::Unchanged)
    );

    for (_, generation) in fx.registry.generations().await.unwrap() {
        assert_eq!(generation, 1);
    }
}

#[tokio::test]
async fn test_unchanged_but_never_loaded_reuses_local_file() {
    let fx = setup();
    fx.fetcher.set_changed(false);

    let report = completed(fx.orchestrator.refresh(false).await.unwrap());
    assert_eq!(report.loaded_count(), 4);
    assert_eq!(country_at(&fx.registry, "1.0.0.1").await.as_deref(), Some("AU"));
}

#[tokio::test]
async fn test_forced_refresh_reloads_local_files() {
    let fx = setup();
    completed(fx.orchestrator.refresh(false).await.unwrap());

    fx.fetcher.set_changed(false);
    write_csv(
        &fx.download_dir,
        "geolite2-country-ipv4.csv",
        "1.0.0.0,1.0.0.255,NZ\n",
    );

    let report = completed(fx.orchestrator.refresh(true).await.unwrap());
    assert!(report.forced);
    assert_eq!(report.loaded_count(), 4);
    for (_, generation) in fx.registry.generations().await.unwrap() {
        assert_eq!(generation, 2);
    }

    assert_eq!(country_at(&fx.registry, "1.0.0.1").await.as_deref(), Some("NZ"));
    // 新代不再包含 CN 段
    assert_eq!(country_at(&fx.registry, "1.0.2.1").await, None);
}

#[tokio::test]
async fn test_changed_source_publishes_next_generation() {
    let fx = setup();
    completed(fx.orchestrator.refresh(false).await.unwrap());

    write_csv(
        &fx.download_dir,
        "geolite2-country-ipv6.csv",
        "2606:4700::,2606:4700::ffff,CA\n",
    );
    let report = completed(fx.orchestrator.refresh(false).await.unwrap());
    assert_eq!(
        report.pairs[1].outcome,
        PairOutcome::Loaded {
            records: 1,
            skipped: 0,
            generation: 2
        }
    );
    assert_eq!(
        country_at(&fx.registry, "2606:4700::1").await.as_deref(),
        Some("CA")
    );
}

#[tokio::test]
async fn test_only_one_refresh_runs_at_a_time() {
    let fx = setup();
    let gate = fx.fetcher.hold_first_fetch();

    let running = {
        let orchestrator = fx.orchestrator.clone();
        tokio::spawn(async move { orchestrator.refresh(false).await })
    };

    fx.fetcher.entered.notified().await;
    assert_eq!(fx.orchestrator.state(), RefreshState::Running);

    // 运行期间的请求被直接丢弃
    assert!(matches!(
        fx.orchestrator.refresh(true).await.unwrap(),
        RefreshOutcome::Skipped
    ));
    assert!(!fx.orchestrator.spawn_refresh(false));
    assert!(fx.orchestrator.try_acquire().is_none());

    gate.notify_one();
    let report = completed(running.await.unwrap().unwrap());
    assert_eq!(report.loaded_count(), 4);
    assert_eq!(fx.orchestrator.state(), RefreshState::Idle);

    // 只有第一次刷新触发了下载
    assert_eq!(fx.fetcher.fetches.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_permit_released_on_drop() {
    let fx = setup();
    {
        let _permit = fx.orchestrator.try_acquire().unwrap();
        assert_eq!(fx.orchestrator.state(), RefreshState::Running);
    }
    assert_eq!(fx.orchestrator.state(), RefreshState::Idle);
}

#[tokio::test]
async fn test_unknown_source_rejected() {
    let registry = Arc::new(StoreRegistry::from_stores(Vec::new()));
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(dir.path()));

    let mut config = AppConfig::default();
    config.datasets.country = Some("no-such-source".to_string());
    assert!(RefreshOrchestrator::new(registry, fetcher, &config).is_err());
}
