//! Icon resolution services
//!
//! The resolver drives the fallback chain; each stage is a small service:
//!
//! - [`IconCache`]: per-domain icon cache and request counters
//! - [`PageIconLocator`]: icon declared by the page itself
//! - [`RootIconLocator`]: the conventional `/favicon.ico`
//! - [`ResponseValidator`]: decides whether a response is a usable icon

pub mod icon_cache;
pub mod page_locator;
pub mod resolver;
pub mod root_locator;
pub mod validator;

pub use icon_cache::{CachedValue, Counter, Counters, IconCache};
pub use page_locator::PageIconLocator;
pub use resolver::FaviconResolver;
pub use root_locator::RootIconLocator;
pub use validator::ResponseValidator;
