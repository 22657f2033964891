use crate::config::{CountPolicy, PaginationConfig, SelectorConfig};
use crate::driver::{Locator, PageDriver};
use crate::error::{Result, ScreenerError};
use crate::screener::table::{extract_page, PageBatch};
use std::time::Duration;
use url::Url;

/// Parse the total result count out of summary text like `1-25 of 5,432 results`.
///
/// Takes the number after `of`; without an `of`, falls back to the third
/// whitespace-separated token. Thousands separators are ignored.
pub fn parse_total_count(text: &str) -> Option<u64> {
    let tokens: Vec<&str> = text.split_whitespace().collect();

    let candidate = tokens
        .iter()
        .position(|t| t.eq_ignore_ascii_case("of"))
        .and_then(|i| tokens.get(i + 1))
        .or_else(|| tokens.get(2))?;

    let digits: String = candidate.chars().filter(|c| *c != ',').collect();
    digits.parse().ok()
}

/// `base` with its `offset` and `count` query parameters set to the given window
pub fn page_url(base: &Url, offset: u64, count: usize) -> Url {
    let mut url = base.clone();
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| k != "offset" && k != "count")
        .collect();

    url.set_query(None);
    url.query_pairs_mut()
        .extend_pairs(retained)
        .append_pair("offset", &offset.to_string())
        .append_pair("count", &count.to_string());
    url
}

/// Walks the result set one page at a time.
///
/// Yields one [`PageBatch`] per window `[offset, offset + page_size)` while
/// `offset <= total`, so a partially filled last page is still fetched once.
/// A total of zero yields nothing. After an error the paginator is exhausted.
pub struct Paginator<'d, D: PageDriver + ?Sized> {
    driver: &'d D,
    base_url: Url,
    table: Locator,
    page_size: usize,
    element_timeout: Duration,
    total: u64,
    offset: u64,
    pages_fetched: usize,
    failed: bool,
}

impl<'d, D: PageDriver + ?Sized> Paginator<'d, D> {
    /// Fails with `Config` when `page_size` is zero
    pub fn new(
        driver: &'d D,
        base_url: Url,
        table: Locator,
        page_size: usize,
        element_timeout: Duration,
        total: u64,
    ) -> Result<Self> {
        if page_size == 0 {
            return Err(ScreenerError::Config("page size must be greater than zero".to_string()));
        }
        Ok(Self {
            driver,
            base_url,
            table,
            page_size,
            element_timeout,
            total,
            offset: 0,
            pages_fetched: 0,
            failed: false,
        })
    }

    /// Total result count read from the first results page
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Number of pages a full walk fetches
    pub fn page_count(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            self.total / self.page_size as u64 + 1
        }
    }

    /// Rewind to offset 0
    pub fn restart(&mut self) {
        self.offset = 0;
        self.pages_fetched = 0;
        self.failed = false;
    }

    fn fetch(&self) -> Result<PageBatch> {
        let url = page_url(&self.base_url, self.offset, self.page_size);
        log::debug!("Fetching page at offset {} of {}: {}", self.offset, self.total, url);
        self.driver.navigate(url.as_str())?;
        self.driver.wait_for(&self.table, self.element_timeout)?;
        extract_page(self.driver, &self.table)
    }
}

impl<D: PageDriver + ?Sized> Iterator for Paginator<'_, D> {
    type Item = Result<PageBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.total == 0 || self.offset > self.total {
            return None;
        }

        match self.fetch() {
            Ok(batch) => {
                self.offset += self.page_size as u64;
                self.pages_fetched += 1;
                Some(Ok(batch))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Read the total result count from the current page and build a [`Paginator`] over `base_url`
pub fn paginate<'d, D: PageDriver + ?Sized>(
    driver: &'d D,
    base_url: &str,
    selectors: &SelectorConfig,
    settings: &PaginationConfig,
    element_timeout: Duration,
) -> Result<Paginator<'d, D>> {
    if settings.page_size == 0 {
        return Err(ScreenerError::Config("pagination.page_size must be greater than zero".to_string()));
    }

    let base = Url::parse(base_url)
        .map_err(|e| ScreenerError::NavigationFailed(format!("Invalid results URL {}: {}", base_url, e)))?;

    let total = match read_total_count(driver, &selectors.total_count, element_timeout) {
        Ok(total) => total,
        Err(e) if settings.count_policy == CountPolicy::Lenient => {
            log::warn!("{}; treating the result set as empty", e);
            0
        }
        Err(e) => return Err(e),
    };

    log::info!("Result set has {} entries ({} per page)", total, settings.page_size);

    Paginator::new(driver, base, selectors.results_table.clone(), settings.page_size, element_timeout, total)
}

fn read_total_count<D: PageDriver + ?Sized>(driver: &D, target: &Locator, timeout: Duration) -> Result<u64> {
    let text = driver
        .wait_for(target, timeout)
        .and_then(|_| driver.read_text(target))
        .map_err(|e| ScreenerError::CountParse(format!("Count element '{}' unavailable: {}", target, e)))?;

    parse_total_count(&text).ok_or_else(|| ScreenerError::CountParse(format!("No count in '{}'", text.trim())))
}
