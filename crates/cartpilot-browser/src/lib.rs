//! [`cartpilot_core::PageDriver`] on a Chromium tab driven over CDP.

pub mod driver;
pub mod error;
pub mod scripts;

pub use driver::{BrowserSettings, ChromeDriver};
pub use error::BrowserError;
