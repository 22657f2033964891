use crate::driver::{Locator, PageDriver, RawTable};
use crate::error::{Result, ScreenerError};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One call made against a [`ScriptedDriver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Navigate(String),
    Wait(Locator),
    Click(Locator),
    Type(Locator, String),
    ReadText(Locator),
    ReadTable(Locator),
}

#[derive(Debug, Default)]
struct ScriptState {
    current_url: String,
    log: Vec<Interaction>,
}

/// Browser-free [`PageDriver`] that serves canned content.
///
/// Controls listed with [`ScriptedDriver::with_element`] are present on every
/// page. Text and tables are looked up by the current URL first, then by the
/// "any page" entries. Clicking a control registered with
/// [`ScriptedDriver::with_click_redirect`] moves the session to a new URL.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    elements: HashSet<Locator>,
    texts: HashMap<Locator, String>,
    tables: HashMap<(String, Locator), RawTable>,
    any_page_tables: HashMap<Locator, RawTable>,
    redirects: HashMap<Locator, String>,
    state: Mutex<ScriptState>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: mark an element as present
    pub fn with_element(mut self, target: Locator) -> Self {
        self.elements.insert(target);
        self
    }

    /// Builder method: give an element visible text (also marks it present)
    pub fn with_text(mut self, target: Locator, text: impl Into<String>) -> Self {
        self.elements.insert(target.clone());
        self.texts.insert(target, text.into());
        self
    }

    /// Builder method: serve `table` for `target` while the session is at `url`
    pub fn with_table_at(mut self, url: impl Into<String>, target: Locator, table: RawTable) -> Self {
        self.tables.insert((url.into(), target), table);
        self
    }

    /// Builder method: serve `table` for `target` on any page without a specific entry
    pub fn with_table(mut self, target: Locator, table: RawTable) -> Self {
        self.elements.insert(target.clone());
        self.any_page_tables.insert(target, table);
        self
    }

    /// Builder method: clicking `target` navigates to `url`
    pub fn with_click_redirect(mut self, target: Locator, url: impl Into<String>) -> Self {
        self.redirects.insert(target, url.into());
        self
    }

    /// Every interaction so far, in call order
    pub fn interactions(&self) -> Vec<Interaction> {
        self.state().map(|s| s.log.clone()).unwrap_or_default()
    }

    /// URLs passed to `navigate`, in call order
    pub fn visited(&self) -> Vec<String> {
        self.interactions()
            .into_iter()
            .filter_map(|i| match i {
                Interaction::Navigate(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    /// Texts passed to `type_text`, in call order
    pub fn typed(&self) -> Vec<String> {
        self.interactions()
            .into_iter()
            .filter_map(|i| match i {
                Interaction::Type(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> Result<MutexGuard<'_, ScriptState>> {
        self.state
            .lock()
            .map_err(|e| ScreenerError::TabOperationFailed(format!("Scripted session poisoned: {}", e)))
    }

    fn record(&self, interaction: Interaction) -> Result<()> {
        self.state()?.log.push(interaction);
        Ok(())
    }

    fn is_present(&self, target: &Locator, url: &str) -> bool {
        self.elements.contains(target) || self.tables.contains_key(&(url.to_string(), target.clone()))
    }

    fn require(&self, target: &Locator) -> Result<String> {
        let url = self.state()?.current_url.clone();
        if self.is_present(target, &url) {
            Ok(url)
        } else {
            Err(ScreenerError::ElementNotFound {
                step: "lookup".to_string(),
                reason: format!("Element '{}' not found on {}", target, url),
            })
        }
    }
}

impl PageDriver for ScriptedDriver {
    fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state()?;
        state.current_url = url.to_string();
        state.log.push(Interaction::Navigate(url.to_string()));
        Ok(())
    }

    fn current_url(&self) -> Result<String> {
        Ok(self.state()?.current_url.clone())
    }

    fn wait_for(&self, target: &Locator, _timeout: Duration) -> Result<()> {
        self.record(Interaction::Wait(target.clone()))?;
        self.require(target).map(|_| ())
    }

    fn click(&self, target: &Locator) -> Result<()> {
        self.require(target)?;
        let mut state = self.state()?;
        state.log.push(Interaction::Click(target.clone()));
        if let Some(url) = self.redirects.get(target) {
            state.current_url = url.clone();
        }
        Ok(())
    }

    fn type_text(&self, target: &Locator, text: &str) -> Result<()> {
        self.require(target)?;
        self.record(Interaction::Type(target.clone(), text.to_string()))
    }

    fn read_text(&self, target: &Locator) -> Result<String> {
        self.require(target)?;
        self.record(Interaction::ReadText(target.clone()))?;
        Ok(self.texts.get(target).cloned().unwrap_or_default())
    }

    fn read_table(&self, target: &Locator) -> Result<RawTable> {
        let url = self.require(target)?;
        self.record(Interaction::ReadTable(target.clone()))?;
        let table = self
            .tables
            .get(&(url, target.clone()))
            .or_else(|| self.any_page_tables.get(target))
            .cloned()
            .unwrap_or_default();
        Ok(table)
    }
}
