//! Screener page logic: region filter, table extraction and pagination

pub mod pagination;
pub mod region;
pub mod table;

pub use pagination::{page_url, paginate, parse_total_count, Paginator};
pub use region::{resolve_region, select_region, RegionStep};
pub use table::{extract_page, PageBatch, Quote, Row};
