use crate::driver::{Locator, PageDriver, RawTable};
use crate::error::{Result, ScreenerError};
use serde::{Deserialize, Serialize};

pub const SYMBOL_COLUMN: &str = "Symbol";
pub const NAME_COLUMN: &str = "Name";
pub const PRICE_COLUMN: &str = "Price (Intraday)";

/// One quote as shown in the screener table.
///
/// Serialises with the table's own column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(rename = "Symbol")]
    pub symbol: String,

    #[serde(rename = "Name")]
    pub name: String,

    /// Numeric when the cell parses cleanly, the raw text otherwise, null when absent
    #[serde(rename = "Price (Intraday)")]
    pub price: serde_json::Value,
}

impl Quote {
    /// Serialized form stored as the dataset value
    pub fn to_record(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ScreenerError::TableParseFailed(format!("Failed to serialize quote {}: {}", self.symbol, e)))
    }
}

/// One extracted table entry, keyed by symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: String,
    pub payload: Quote,
}

/// Rows read from one page of results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageBatch {
    /// Rows in displayed order
    pub rows: Vec<Row>,

    /// Rows skipped because they had no symbol
    pub dropped: usize,
}

impl PageBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read the results table on the current page
pub fn extract_page<D: PageDriver + ?Sized>(driver: &D, table: &Locator) -> Result<PageBatch> {
    let raw = driver.read_table(table)?;
    batch_from_table(&raw)
}

/// Turn raw table cells into a [`PageBatch`]
pub fn batch_from_table(raw: &RawTable) -> Result<PageBatch> {
    let symbol_col = raw
        .column(SYMBOL_COLUMN)
        .ok_or_else(|| ScreenerError::TableParseFailed(format!("No '{}' column in {:?}", SYMBOL_COLUMN, raw.headers)))?;
    let name_col = raw.column(NAME_COLUMN);
    let price_col = raw.column(PRICE_COLUMN);

    let mut batch = PageBatch::default();
    for cells in &raw.rows {
        let key = match cell(cells, Some(symbol_col)) {
            Some(k) if !k.is_empty() => k,
            _ => {
                batch.dropped += 1;
                continue;
            }
        };

        let payload = Quote {
            symbol: key.clone(),
            name: cell(cells, name_col).unwrap_or_default(),
            price: cell(cells, price_col).map(parse_price).unwrap_or(serde_json::Value::Null),
        };
        batch.rows.push(Row { key, payload });
    }

    if batch.dropped > 0 {
        log::warn!("Dropped {} row(s) without a symbol", batch.dropped);
    }

    Ok(batch)
}

fn cell(cells: &[String], col: Option<usize>) -> Option<String> {
    col.and_then(|i| cells.get(i)).map(|s| s.trim().to_string())
}

fn parse_price(text: String) -> serde_json::Value {
    let digits = text.replace(',', "");
    match digits.parse::<f64>() {
        Ok(n) => serde_json::Number::from_f64(n).map(serde_json::Value::Number).unwrap_or(serde_json::Value::String(text)),
        Err(_) if text.is_empty() => serde_json::Value::Null,
        Err(_) => serde_json::Value::String(text),
    }
}
