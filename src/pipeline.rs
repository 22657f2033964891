//! Scrape run orchestration
//!
//! One [`Pipeline::run`] walks the stages
//! `WaitCache → SelectRegion → Paginate → Store → Finalize → Readback → Done`
//! and lands in `Failed` on the first error. Nothing is retried.

use crate::config::ScreenerConfig;
use crate::driver::PageDriver;
use crate::error::Result;
use crate::screener::{paginate, resolve_region, select_region};
use crate::store::{await_available, Clock, Dataset, LeaseToken, RecordStore, SystemClock};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    WaitCache,
    SelectRegion,
    Paginate,
    Store,
    Finalize,
    Readback,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::WaitCache => "wait-cache",
            Stage::SelectRegion => "select-region",
            Stage::Paginate => "paginate",
            Stage::Store => "store",
            Stage::Finalize => "finalize",
            Stage::Readback => "readback",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub region: String,
    /// Total result count the site reported
    pub total: u64,
    pub pages: usize,
    /// Rows merged, counting a key once per page it appeared on
    pub rows_merged: usize,
    pub rows_dropped: usize,
    /// Distinct symbols in the final dataset
    pub dataset_size: usize,
    pub elapsed: Duration,
}

/// Releases the gate if a run ends without finalizing, including on unwind
struct RunGuard<'a> {
    store: &'a dyn RecordStore,
    name: &'a str,
    token: LeaseToken,
    finalized: bool,
}

impl<'a> RunGuard<'a> {
    fn new(store: &'a dyn RecordStore, name: &'a str, token: LeaseToken) -> Self {
        Self { store, name, token, finalized: false }
    }

    fn token(&self) -> &LeaseToken {
        &self.token
    }

    fn disarm(&mut self) {
        self.finalized = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        log::warn!("Run on '{}' did not finalize, releasing the gate", self.name);
        if let Err(e) = self.store.abandon_run(self.name, &self.token) {
            log::error!("Failed to release gate on '{}': {}", self.name, e);
        }
    }
}

/// Runs scrapes against one dataset name
pub struct Pipeline {
    config: ScreenerConfig,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    /// Fails with `Config` when `config` does not validate
    pub fn new(config: ScreenerConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ScreenerConfig, store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, store, clock })
    }

    pub fn config(&self) -> &ScreenerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Scrape `region` (default region when absent or blank) and return the full dataset
    pub fn run<D: PageDriver + ?Sized>(&self, driver: &D, region: Option<&str>) -> Result<Dataset> {
        self.run_with_report(driver, region).map(|(dataset, _)| dataset)
    }

    /// Like [`Pipeline::run`], also returning run statistics
    pub fn run_with_report<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        region: Option<&str>,
    ) -> Result<(Dataset, RunReport)> {
        self.run_opening(|| Ok(driver), region)
    }

    /// Like [`Pipeline::run_with_report`], but the driver is only opened once
    /// the gate is claimed, so a blocked run never holds a browser.
    pub fn run_opening<B, D>(&self, open: impl FnOnce() -> Result<B>, region: Option<&str>) -> Result<(Dataset, RunReport)>
    where
        B: Deref<Target = D>,
        D: PageDriver + ?Sized,
    {
        let started = Instant::now();
        let region = resolve_region(region, &self.config.default_region);
        let mut stage = Stage::WaitCache;
        let mut report = RunReport { region: region.to_string(), ..Default::default() };

        match self.execute(open, region, &mut stage, &mut report) {
            Ok(dataset) => {
                report.dataset_size = dataset.len();
                report.elapsed = started.elapsed();
                log::info!(
                    "Run for '{}' done: {} symbols from {} page(s), {} row(s) dropped, {:?}",
                    report.region,
                    report.dataset_size,
                    report.pages,
                    report.rows_dropped,
                    report.elapsed
                );
                Ok((dataset, report))
            }
            Err(e) => {
                log::error!("Run for '{}' failed during {} ({}): {}", region, stage, e.kind(), e);
                enter(&mut stage, Stage::Failed);
                Err(e)
            }
        }
    }

    fn execute<B, D>(
        &self,
        open: impl FnOnce() -> Result<B>,
        region: &str,
        stage: &mut Stage,
        report: &mut RunReport,
    ) -> Result<Dataset>
    where
        B: Deref<Target = D>,
        D: PageDriver + ?Sized,
    {
        let name = self.config.cache.dataset_name.as_str();
        let timing = &self.config.timing;

        enter(stage, Stage::WaitCache);
        let token = await_available(self.store.as_ref(), name, &self.config.cache.wait_policy(), self.clock.as_ref())?;
        let mut guard = RunGuard::new(self.store.as_ref(), name, token);
        self.store.begin_run(name, guard.token())?;

        enter(stage, Stage::SelectRegion);
        let driver = open()?;
        let driver = &*driver;
        driver.navigate(&self.config.screener_url)?;
        select_region(driver, &self.config.selectors, timing, region)?;
        std::thread::sleep(timing.results_settle());
        let base_url = driver.current_url()?;

        enter(stage, Stage::Paginate);
        let pages = paginate(driver, &base_url, &self.config.selectors, &self.config.pagination, timing.element_timeout())?;
        report.total = pages.total();

        for page in pages {
            *stage = Stage::Paginate;
            let batch = page?;

            *stage = Stage::Store;
            self.store.merge_batch(name, guard.token(), &batch)?;
            report.pages += 1;
            report.rows_merged += batch.len();
            report.rows_dropped += batch.dropped;
            log::debug!("Merged page {} ({} rows) into '{}'", report.pages, batch.len(), name);
        }

        enter(stage, Stage::Finalize);
        self.store.finalize_run(name, guard.token(), self.config.cache.ttl())?;
        guard.disarm();

        enter(stage, Stage::Readback);
        let dataset = self.store.read_all(name)?;

        enter(stage, Stage::Done);
        Ok(dataset)
    }
}

fn enter(stage: &mut Stage, next: Stage) {
    log::debug!("Stage {} -> {}", stage, next);
    *stage = next;
}
