//! Helpers shared by the resolution services

pub mod deadline;
pub mod html;
pub mod http_client;
pub mod url;

pub use deadline::Deadline;
pub use http_client::{FetchKind, Fetcher, HttpFetcher, RawResponse};
pub use self::url::UrlUtils;
