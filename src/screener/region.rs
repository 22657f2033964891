use crate::config::{SelectorConfig, TimingConfig};
use crate::driver::{Locator, PageDriver};
use crate::error::{Result, ScreenerError};
use std::fmt;

/// The five interactions that apply a region filter, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionStep {
    DismissDefault,
    OpenRegionMenu,
    TypeRegion,
    ChooseOption,
    FindStocks,
}

impl RegionStep {
    pub const SEQUENCE: [RegionStep; 5] = [
        RegionStep::DismissDefault,
        RegionStep::OpenRegionMenu,
        RegionStep::TypeRegion,
        RegionStep::ChooseOption,
        RegionStep::FindStocks,
    ];

    pub fn locator<'a>(&self, selectors: &'a SelectorConfig) -> &'a Locator {
        match self {
            RegionStep::DismissDefault => &selectors.dismiss_default,
            RegionStep::OpenRegionMenu => &selectors.open_region_menu,
            RegionStep::TypeRegion => &selectors.region_input,
            RegionStep::ChooseOption => &selectors.region_option,
            RegionStep::FindStocks => &selectors.find_button,
        }
    }
}

impl fmt::Display for RegionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegionStep::DismissDefault => "dismiss default region",
            RegionStep::OpenRegionMenu => "open region menu",
            RegionStep::TypeRegion => "type region",
            RegionStep::ChooseOption => "choose region option",
            RegionStep::FindStocks => "find stocks",
        };
        f.write_str(name)
    }
}

/// The region text to type: `region` unless it is absent or blank
pub fn resolve_region<'a>(region: Option<&'a str>, default_region: &'a str) -> &'a str {
    match region {
        Some(r) if !r.trim().is_empty() => r,
        _ => default_region,
    }
}

/// Filter the screener by `region` (already resolved).
///
/// Runs every [`RegionStep`] in order. Each step waits for its element up to
/// the element timeout, acts on it, then pauses for the settle delay. The
/// first failing step aborts the sequence.
pub fn select_region<D: PageDriver + ?Sized>(
    driver: &D,
    selectors: &SelectorConfig,
    timing: &TimingConfig,
    region: &str,
) -> Result<()> {
    log::info!("Selecting region '{}'", region);

    for step in RegionStep::SEQUENCE {
        let target = step.locator(selectors);

        driver
            .wait_for(target, timing.element_timeout())
            .and_then(|_| match step {
                RegionStep::TypeRegion => driver.type_text(target, region),
                _ => driver.click(target),
            })
            .map_err(|e| step_failed(step, e))?;

        log::debug!("Region step '{}' done", step);
        std::thread::sleep(timing.settle_delay());
    }

    Ok(())
}

fn step_failed(step: RegionStep, err: ScreenerError) -> ScreenerError {
    let reason = match err {
        ScreenerError::ElementNotFound { reason, .. } => reason,
        other => other.to_string(),
    };
    ScreenerError::ElementNotFound { step: step.to_string(), reason }
}
