//! Chrome session management
//!
//! [`BrowserSession`] launches or connects to a Chrome/Chromium instance and
//! exposes it to the scraper as a [`crate::driver::PageDriver`].

pub mod config;
pub mod session;

pub use config::{ConnectionOptions, LaunchOptions};
pub use session::BrowserSession;
