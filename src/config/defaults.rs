/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

// Fetch defaults
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_REDIRECTS: usize = 10;
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024; // 2MB
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";

// Icon defaults
pub const DEFAULT_MIN_ICON_SIZE: usize = 64;
pub const DEFAULT_MAX_ICON_SIZE: usize = 100 * 1024; // 100KB
pub const DEFAULT_MIME_BLACKLIST: &[&str] = &["text/html", "text/plain"];
pub const DEFAULT_ICON_PATH: &str = "./static/default.ico";
pub const DEFAULT_ICON_TYPE: &str = "image/x-icon";

// Cache defaults
pub const DEFAULT_CACHE_HOST: &str = "127.0.0.1";
pub const DEFAULT_CACHE_PORT: u16 = 11211;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60; // 30 days
pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;
pub const DEFAULT_CACHE_IO_TIMEOUT_MILLIS: u64 = 1000;
