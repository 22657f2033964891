//! Page interaction capability used by the scraping core
//!
//! The region selector, table extractor and paginator only ever talk to a
//! [`PageDriver`]. [`crate::BrowserSession`] drives a real Chrome tab;
//! [`ScriptedDriver`] replays canned pages and records every interaction.

pub mod scripted;

pub use scripted::{Interaction, ScriptedDriver};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How to find an element on the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locator {
    /// CSS selector
    #[serde(rename = "css")]
    Css(String),
    /// XPath expression
    #[serde(rename = "xpath")]
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css:{}", s),
            Locator::XPath(s) => write!(f, "xpath:{}", s),
        }
    }
}

/// A rendered HTML table as plain text cells
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    /// Header cell texts, in column order
    pub headers: Vec<String>,

    /// Body rows, each a list of cell texts in column order
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self { headers, rows: Vec::new() }
    }

    /// Builder method: append a body row
    pub fn with_row<I, S>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
        self
    }

    /// Position of the column whose header matches `name`, ignoring case and surrounding whitespace
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
    }
}

/// A controllable browser session.
///
/// Every method acts on the session's single current page. Implementations
/// report a missing element as [`crate::ScreenerError::ElementNotFound`].
pub trait PageDriver {
    /// Navigate to `url` and wait for the load to finish
    fn navigate(&self, url: &str) -> Result<()>;

    /// URL of the current page
    fn current_url(&self) -> Result<String>;

    /// Block until `target` is present, or fail once `timeout` has elapsed
    fn wait_for(&self, target: &Locator, timeout: Duration) -> Result<()>;

    fn click(&self, target: &Locator) -> Result<()>;

    /// Type `text` into the element, key by key
    fn type_text(&self, target: &Locator, text: &str) -> Result<()>;

    /// Visible text of the element
    fn read_text(&self, target: &Locator) -> Result<String>;

    /// Header and body cells of the table element
    fn read_table(&self, target: &Locator) -> Result<RawTable>;
}
