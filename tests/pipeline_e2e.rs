use std::sync::{Arc, Mutex};
use std::time::Duration;
use stock_screener::config::TimingConfig;
use stock_screener::screener::{page_url, RegionStep};
use stock_screener::store::{GateState, LeaseToken, ManualClock};
use stock_screener::{
    Dataset, Locator, MemoryStore, PageDriver, Pipeline, RawTable, RecordStore, Result, ScreenerConfig, ScreenerError,
    ScriptedDriver,
};
use url::Url;

const SCREENER: &str = "https://finance.example.com/screener/new";
const RESULTS: &str = "https://finance.example.com/screener/unsaved/e2e";

fn config() -> ScreenerConfig {
    let mut config = ScreenerConfig::default();
    config.screener_url = SCREENER.to_string();
    config.timing = TimingConfig::immediate();
    config.cache.dataset_name = "screener-e2e".to_string();
    config.cache.max_wait_secs = 5;
    config
}

fn table(rows: &[(&str, &str)]) -> RawTable {
    rows.iter().fold(
        RawTable::new(vec!["Symbol".into(), "Name".into(), "Price (Intraday)".into()]),
        |t, (sym, price)| t.with_row([sym.to_string(), format!("{} Holdings", sym), price.to_string()]),
    )
}

/// A screener site whose result set spans `pages`, 250 rows per window
fn site(config: &ScreenerConfig, total: u64, pages: Vec<RawTable>) -> ScriptedDriver {
    let selectors = &config.selectors;
    let base = Url::parse(RESULTS).unwrap();
    let mut driver = RegionStep::SEQUENCE
        .iter()
        .fold(ScriptedDriver::new(), |d, step| d.with_element(step.locator(selectors).clone()))
        .with_click_redirect(selectors.find_button.clone(), RESULTS)
        .with_text(selectors.total_count.clone(), format!("1-250 of {} results", total));
    for (i, page) in pages.into_iter().enumerate() {
        let url = page_url(&base, (i * 250) as u64, 250);
        driver = driver.with_table_at(url.as_str(), selectors.results_table.clone(), page);
    }
    driver
}

fn prices(dataset: &Dataset) -> Vec<(String, f64)> {
    dataset
        .iter()
        .map(|(k, v)| {
            let record: serde_json::Value = serde_json::from_str(v).unwrap();
            (k.clone(), record["Price (Intraday)"].as_f64().unwrap())
        })
        .collect()
}

fn sorted(mut v: Vec<(String, f64)>) -> Vec<(String, f64)> {
    v.sort_by(|a, b| a.0.cmp(&b.0));
    v
}

#[test]
fn test_canada_two_pages_last_write_wins_then_expires() {
    let config = config();
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let pipeline = Pipeline::with_clock(config.clone(), store.clone(), clock.clone()).unwrap();
    let driver = site(&config, 300, vec![table(&[("AAA", "1"), ("BBB", "2")]), table(&[("BBB", "3"), ("CCC", "4")])]);

    let dataset = pipeline.run(&driver, Some("Canada")).unwrap();

    let expected = vec![("AAA".to_string(), 1.0), ("BBB".to_string(), 3.0), ("CCC".to_string(), 4.0)];
    assert_eq!(sorted(prices(&dataset)), expected);
    assert_eq!(driver.typed(), vec!["Canada".to_string()]);
    assert_eq!(
        driver.visited(),
        vec![
            SCREENER.to_string(),
            format!("{}?offset=0&count=250", RESULTS),
            format!("{}?offset=250&count=250", RESULTS),
        ]
    );

    clock.advance(Duration::from_secs(100));
    assert_eq!(store.read_all("screener-e2e").unwrap(), dataset);

    clock.advance(Duration::from_secs(93));
    assert!(store.read_all("screener-e2e").unwrap().is_empty());
}

#[test]
fn test_second_run_blocked_while_fresh() {
    let config = config();
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let pipeline = Pipeline::with_clock(config.clone(), store.clone(), clock.clone()).unwrap();

    let first = site(&config, 1, vec![table(&[("AAA", "1")])]);
    pipeline.run(&first, None).unwrap();

    let second = site(&config, 1, vec![table(&[("ZZZ", "9")])]);
    let err = pipeline.run(&second, Some("Brazil")).unwrap_err();

    assert!(matches!(err, ScreenerError::RunBlockedTimeout { .. }));
    assert!(second.interactions().is_empty(), "blocked run must not touch the page");
    let kept = store.read_all("screener-e2e").unwrap();
    assert!(kept.contains_key("AAA"));
    assert!(!kept.contains_key("ZZZ"));
}

#[test]
fn test_new_run_after_expiry_replaces_dataset() {
    let mut config = config();
    config.cache.max_wait_secs = 600;
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let pipeline = Pipeline::with_clock(config.clone(), store.clone(), clock.clone()).unwrap();

    pipeline.run(&site(&config, 2, vec![table(&[("OLD1", "1"), ("OLD2", "2")])]), None).unwrap();

    // Waits out the 193s TTL, then scrapes again
    let dataset = pipeline.run(&site(&config, 1, vec![table(&[("NEW", "5")])]), None).unwrap();

    assert!(clock.elapsed() >= Duration::from_secs(193));
    assert_eq!(dataset.keys().collect::<Vec<_>>(), vec!["NEW"]);
}

#[test]
fn test_empty_result_set_is_valid() {
    let config = config();
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let pipeline = Pipeline::with_clock(config.clone(), store.clone(), clock.clone()).unwrap();
    let driver = ScriptedDriver::new();
    let driver = RegionStep::SEQUENCE
        .iter()
        .fold(driver, |d, step| d.with_element(step.locator(&config.selectors).clone()))
        .with_text(config.selectors.total_count.clone(), "No results for this filter");

    let (dataset, report) = pipeline.run_with_report(&driver, Some("Atlantis")).unwrap();

    assert!(dataset.is_empty());
    assert_eq!(report.pages, 0);
    assert!(matches!(store.gate_state("screener-e2e").unwrap(), GateState::Fresh { .. }));
}

/// Page driver that tries to start a second run while the first is mid-scrape
struct Interloper<'a> {
    inner: ScriptedDriver,
    pipeline: &'a Pipeline,
    observed: Mutex<Option<Result<Dataset>>>,
}

impl PageDriver for Interloper<'_> {
    fn navigate(&self, url: &str) -> Result<()> {
        self.inner.navigate(url)
    }

    fn current_url(&self) -> Result<String> {
        self.inner.current_url()
    }

    fn wait_for(&self, target: &Locator, timeout: Duration) -> Result<()> {
        self.inner.wait_for(target, timeout)
    }

    fn click(&self, target: &Locator) -> Result<()> {
        self.inner.click(target)
    }

    fn type_text(&self, target: &Locator, text: &str) -> Result<()> {
        self.inner.type_text(target, text)
    }

    fn read_text(&self, target: &Locator) -> Result<String> {
        self.inner.read_text(target)
    }

    fn read_table(&self, target: &Locator) -> Result<stock_screener::RawTable> {
        let mut observed = self.observed.lock().unwrap();
        if observed.is_none() {
            *observed = Some(self.pipeline.run(&ScriptedDriver::new(), Some("Elsewhere")));
        }
        self.inner.read_table(target)
    }
}

#[test]
fn test_in_flight_run_blocks_overlapping_run() {
    let config = config();
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let pipeline = Pipeline::with_clock(config.clone(), store.clone(), clock.clone()).unwrap();
    let driver = Interloper {
        inner: site(&config, 1, vec![table(&[("AAA", "1")])]),
        pipeline: &pipeline,
        observed: Mutex::new(None),
    };

    let dataset = pipeline.run(&driver, Some("Canada")).unwrap();

    assert_eq!(dataset.len(), 1);
    let overlapping = driver.observed.lock().unwrap().take().unwrap();
    assert!(matches!(overlapping, Err(ScreenerError::RunBlockedTimeout { .. })));
}

/// Page driver that stalls past its run's lease, letting a second run
/// claim the dataset and finish before the first one resumes
struct Stalling<'a> {
    inner: ScriptedDriver,
    pipeline: &'a Pipeline,
    clock: &'a ManualClock,
    successor: ScriptedDriver,
    observed: Mutex<Option<Result<Dataset>>>,
}

impl PageDriver for Stalling<'_> {
    fn navigate(&self, url: &str) -> Result<()> {
        self.inner.navigate(url)
    }

    fn current_url(&self) -> Result<String> {
        self.inner.current_url()
    }

    fn wait_for(&self, target: &Locator, timeout: Duration) -> Result<()> {
        self.inner.wait_for(target, timeout)
    }

    fn click(&self, target: &Locator) -> Result<()> {
        self.inner.click(target)
    }

    fn type_text(&self, target: &Locator, text: &str) -> Result<()> {
        self.inner.type_text(target, text)
    }

    fn read_text(&self, target: &Locator) -> Result<String> {
        self.inner.read_text(target)
    }

    fn read_table(&self, target: &Locator) -> Result<RawTable> {
        let mut observed = self.observed.lock().unwrap();
        if observed.is_none() {
            self.clock.advance(Duration::from_secs(601));
            *observed = Some(self.pipeline.run(&self.successor, Some("Canada")));
        }
        self.inner.read_table(target)
    }
}

#[test]
fn test_lapsed_run_cannot_overwrite_successor() {
    let config = config();
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let pipeline = Pipeline::with_clock(config.clone(), store.clone(), clock.clone()).unwrap();
    let driver = Stalling {
        inner: site(&config, 1, vec![table(&[("STALE", "1")])]),
        pipeline: &pipeline,
        clock: clock.as_ref(),
        successor: site(&config, 1, vec![table(&[("FRESH", "2")])]),
        observed: Mutex::new(None),
    };

    let err = pipeline.run(&driver, Some("Canada")).unwrap_err();

    assert!(matches!(err, ScreenerError::LeaseLost(_)));
    let successor = driver.observed.lock().unwrap().take().unwrap().unwrap();
    assert_eq!(successor.keys().collect::<Vec<_>>(), vec!["FRESH"]);
    assert_eq!(store.read_all("screener-e2e").unwrap(), successor);
    assert!(matches!(store.gate_state("screener-e2e").unwrap(), GateState::Fresh { .. }));
}

/// Store whose writes fail after the gate is claimed
struct FlakyStore {
    inner: MemoryStore,
}

impl RecordStore for FlakyStore {
    fn gate_state(&self, name: &str) -> Result<GateState> {
        self.inner.gate_state(name)
    }

    fn try_claim(&self, name: &str, lease: Duration) -> Result<Option<LeaseToken>> {
        self.inner.try_claim(name, lease)
    }

    fn begin_run(&self, name: &str, token: &LeaseToken) -> Result<()> {
        self.inner.begin_run(name, token)
    }

    fn merge_batch(&self, _: &str, _: &LeaseToken, _: &stock_screener::PageBatch) -> Result<()> {
        Err(ScreenerError::StoreUnavailable("connection reset".to_string()))
    }

    fn finalize_run(&self, name: &str, token: &LeaseToken, ttl: Duration) -> Result<()> {
        self.inner.finalize_run(name, token, ttl)
    }

    fn abandon_run(&self, name: &str, token: &LeaseToken) -> Result<()> {
        self.inner.abandon_run(name, token)
    }

    fn read_all(&self, name: &str) -> Result<Dataset> {
        self.inner.read_all(name)
    }
}

#[test]
fn test_store_failure_surfaces_and_releases_gate() {
    let config = config();
    let store = Arc::new(FlakyStore { inner: MemoryStore::new() });
    let pipeline = Pipeline::new(config.clone(), store.clone()).unwrap();

    let err = pipeline.run(&site(&config, 1, vec![table(&[("AAA", "1")])]), None).unwrap_err();

    assert!(matches!(err, ScreenerError::StoreUnavailable(_)));
    assert_eq!(store.gate_state("screener-e2e").unwrap(), GateState::Open);
}
