//! Centralized error handling for the favicon service
//!
//! Errors are split by layer so that each boundary can decide what to do
//! with a failure:
//!
//! - **Application Errors** ([`AppError`]): the only errors a caller of the
//!   resolver or a web handler ever sees
//! - **Fetch Errors** ([`FetchError`]): network failures and exhausted
//!   deadlines, absorbed by the icon locators
//! - **Cache Errors** ([`CacheError`]): cache backend failures, absorbed by
//!   the icon cache
//!
//! # Usage
//!
//! ```rust
//! use favicon_service::errors::{AppError, AppResult};
//!
//! fn example_function(url: &str) -> AppResult<String> {
//!     if url.is_empty() {
//!         return Err(AppError::malformed_url(url));
//!     }
//!     Ok(url.to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for fetcher Results
pub type FetchResult<T> = Result<T, FetchError>;

/// Convenience type alias for cache backend Results
pub type CacheResult<T> = Result<T, CacheError>;
