pub mod config;
pub mod country;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use country::Country;
pub use error::{CrawlError, FetchError};
pub use types::*;
