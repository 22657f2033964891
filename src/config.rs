//! Scraper configuration
//!
//! Every knob has a default matching the live screener site, so an empty JSON
//! object (or no file at all) is a valid configuration.

use crate::driver::Locator;
use crate::error::{Result, ScreenerError};
use crate::store::WaitPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SCREENER_URL: &str = "https://finance.yahoo.com/screener/new";
pub const DEFAULT_REGION: &str = "United States";
pub const DEFAULT_PAGE_SIZE: usize = 250;
pub const DEFAULT_TTL_SECS: u64 = 193;

/// Top-level configuration for one screener pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    /// Screener landing page where the region filter lives
    pub screener_url: String,

    /// Region used when a request names none
    pub default_region: String,

    pub selectors: SelectorConfig,

    pub timing: TimingConfig,

    pub pagination: PaginationConfig,

    pub cache: CacheConfig,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            screener_url: DEFAULT_SCREENER_URL.to_string(),
            default_region: DEFAULT_REGION.to_string(),
            selectors: SelectorConfig::default(),
            timing: TimingConfig::default(),
            pagination: PaginationConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ScreenerConfig {
    /// Load a JSON configuration file; missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScreenerError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ScreenerError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pagination.page_size == 0 {
            return Err(ScreenerError::Config("pagination.page_size must be greater than zero".to_string()));
        }
        if self.cache.dataset_name.trim().is_empty() {
            return Err(ScreenerError::Config("cache.dataset_name must not be empty".to_string()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ScreenerError::Config("cache.ttl_secs must be greater than zero".to_string()));
        }
        if self.cache.poll_interval_ms == 0 {
            return Err(ScreenerError::Config("cache.poll_interval_ms must be greater than zero".to_string()));
        }
        url::Url::parse(&self.screener_url)
            .map_err(|e| ScreenerError::Config(format!("screener_url '{}' is invalid: {}", self.screener_url, e)))?;
        Ok(())
    }
}

/// Element locators for the region filter, the result count and the table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Removes the pre-selected region chip
    pub dismiss_default: Locator,
    pub open_region_menu: Locator,
    pub region_input: Locator,
    /// First option row matching the typed region
    pub region_option: Locator,
    pub find_button: Locator,
    /// Element whose text carries the total result count ("1-25 of 5,432 results")
    pub total_count: Locator,
    pub results_table: Locator,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            dismiss_default: Locator::xpath(
                "//button[@class='Bd(0) Pb(8px) Pt(6px) Px(10px) M(0) D(ib) C($primaryColor) filterItem:h_C($primaryColor) Fz(s)']",
            ),
            open_region_menu: Locator::xpath(
                "//div[@class='D(ib) Pt(6px) Pb(7px) Pstart(6px) Pend(7px) C($tertiaryColor) Fz(s) Cur(p)']",
            ),
            region_input: Locator::xpath(
                "//input[@class='Bd(0) H(28px) Bgc($lv3BgColor) C($primaryColor) W(100%) Fz(s) Pstart(28px)']",
            ),
            region_option: Locator::xpath("//label[@class='Ta(c) Pos(r) Va(tb) Pend(10px)']"),
            find_button: Locator::xpath(
                "//button[@class='Bgc($linkColor) C(white) Fw(500) Px(20px) Py(9px) Bdrs(3px) Bd(0) Fz(s) D(ib) Whs(nw) Miw(110px) Bgc($linkActiveColor):h']",
            ),
            total_count: Locator::xpath("//span[@class='Mstart(15px) Fw(500) Fz(s)']/span"),
            results_table: Locator::css("table"),
        }
    }
}

/// Waits between UI interactions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Upper bound for each step's element to appear
    pub element_timeout_ms: u64,

    /// Pause after each region step while the page re-renders
    pub settle_delay_ms: u64,

    /// Pause after submitting the filter, before the result count is read
    pub results_settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { element_timeout_ms: 10_000, settle_delay_ms: 500, results_settle_ms: 1_000 }
    }
}

impl TimingConfig {
    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn results_settle(&self) -> Duration {
        Duration::from_millis(self.results_settle_ms)
    }

    /// No sleeping at all; for scripted sessions
    pub fn immediate() -> Self {
        Self { element_timeout_ms: 0, settle_delay_ms: 0, results_settle_ms: 0 }
    }
}

/// What to do when the total result count cannot be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountPolicy {
    /// Treat it as zero results and finish with an empty dataset
    #[default]
    Lenient,
    /// Fail the run with a count parse error
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Rows requested per page (`count` query parameter)
    pub page_size: usize,

    pub count_policy: CountPolicy,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { page_size: DEFAULT_PAGE_SIZE, count_policy: CountPolicy::default() }
    }
}

/// Dataset naming, freshness and gate polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store key the dataset lives under
    pub dataset_name: String,

    /// Freshness window after a run finalizes
    pub ttl_secs: u64,

    /// First delay between gate checks; doubles up to `max_poll_interval_ms`
    pub poll_interval_ms: u64,

    pub max_poll_interval_ms: u64,

    /// Give up waiting for the gate after this long
    pub max_wait_secs: u64,

    /// How long an unfinished run holds the gate before others may take over
    pub run_lease_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dataset_name: "stock-screener".to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
            poll_interval_ms: 250,
            max_poll_interval_ms: 2_000,
            max_wait_secs: 300,
            run_lease_secs: 600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_poll_interval: Duration::from_millis(self.max_poll_interval_ms.max(self.poll_interval_ms)),
            max_wait: Duration::from_secs(self.max_wait_secs),
            run_lease: Duration::from_secs(self.run_lease_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: ScreenerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.default_region, "United States");
        assert_eq!(config.pagination.page_size, 250);
        assert_eq!(config.pagination.count_policy, CountPolicy::Lenient);
        assert_eq!(config.cache.ttl(), Duration::from_secs(193));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let json = serde_json::json!({
            "default_region": "Brazil",
            "pagination": { "count_policy": "strict" },
            "selectors": { "results_table": { "css": "#screener-results table" } }
        });
        let config: ScreenerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.default_region, "Brazil");
        assert_eq!(config.pagination.count_policy, CountPolicy::Strict);
        assert_eq!(config.pagination.page_size, 250);
        assert_eq!(config.selectors.results_table, Locator::css("#screener-results table"));
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = ScreenerConfig::default();
        config.pagination.page_size = 0;
        assert!(matches!(config.validate(), Err(ScreenerError::Config(_))));
    }

    #[test]
    fn test_wait_policy_caps_never_below_initial() {
        let cache = CacheConfig { poll_interval_ms: 500, max_poll_interval_ms: 100, ..Default::default() };
        let policy = cache.wait_policy();
        assert_eq!(policy.max_poll_interval, Duration::from_millis(500));
    }
}
