//! # stock-screener
//!
//! Scrapes a paginated stock-screener table through a Chrome session, stores
//! it as a symbol-keyed dataset in a TTL-bounded cache, and serves it over HTTP.
//! The cache doubles as the gate that keeps more than one scrape from running
//! against the same dataset at a time.
//!
//! ## Features
//!
//! - **Region filter**: drives the screener's region picker (dismiss, open, type, choose, find)
//! - **Pagination**: walks the result set in fixed windows using `offset`/`count` query parameters
//! - **Cache gate**: a fresh dataset or an in-flight run blocks new runs; waits back off and time out
//! - **Stores**: in-memory, or Redis with the `redis-backend` feature
//! - **HTTP server**: `GET /stocks?region=<name>` (requires the `server` feature)
//!
//! ## Running the server
//!
//! ```bash
//! # Headless Chrome, in-memory cache
//! cargo run --bin screener-server
//!
//! # Redis-backed cache, visible browser
//! cargo run --features redis-backend --bin screener-server -- --redis-url redis://localhost --headed
//! ```
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stock_screener::{BrowserSession, LaunchOptions, MemoryStore, Pipeline, ScreenerConfig};
//!
//! # fn main() -> stock_screener::Result<()> {
//! let pipeline = Pipeline::new(ScreenerConfig::default(), Arc::new(MemoryStore::new()))?;
//! let session = BrowserSession::launch(LaunchOptions::default())?;
//!
//! let dataset = pipeline.run(&session, Some("Canada"))?;
//! println!("Fetched {} symbols", dataset.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing without a browser
//!
//! Everything above the browser talks to the [`PageDriver`] trait.
//! [`ScriptedDriver`] serves canned pages and records each interaction:
//!
//! ```rust
//! use stock_screener::{Locator, RawTable, ScriptedDriver};
//!
//! let table = Locator::css("table");
//! let driver = ScriptedDriver::new()
//!     .with_table(table.clone(), RawTable::new(vec!["Symbol".into()]).with_row(["AAA"]));
//!
//! let batch = stock_screener::screener::extract_page(&driver, &table).unwrap();
//! assert_eq!(batch.rows[0].key, "AAA");
//! ```
//!
//! ## Module Overview
//!
//! - [`browser`]: Chrome session management
//! - [`driver`]: page interaction trait and the scripted driver
//! - [`screener`]: region selection, table extraction, pagination
//! - [`store`]: record stores, the cache gate, clocks
//! - [`pipeline`]: run orchestration
//! - [`config`]: configuration
//! - [`error`]: Error types and result aliases
//! - [`server`]: HTTP front end (requires the `server` feature)

pub mod browser;
pub mod config;
pub mod driver;
pub mod error;
pub mod pipeline;
pub mod screener;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

pub use browser::{BrowserSession, ConnectionOptions, LaunchOptions};
pub use config::{CountPolicy, ScreenerConfig};
pub use driver::{Interaction, Locator, PageDriver, RawTable, ScriptedDriver};
pub use error::{Result, ScreenerError};
pub use pipeline::{Pipeline, RunReport, Stage};
pub use screener::{PageBatch, Quote, Row};
pub use store::{Dataset, GateState, LeaseToken, MemoryStore, RecordStore};

#[cfg(feature = "redis-backend")]
pub use store::RedisStore;
