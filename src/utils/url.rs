//! URL utilities for turning user supplied targets into fetchable URLs
//!
//! These are small pure string transforms so that each rule can be tested
//! on its own: percent decoding, scheme normalisation, domain extraction and
//! relative reference resolution.

use url::Url;

/// URL utilities for consistent URL handling
pub struct UrlUtils;

impl UrlUtils {
    /// Decode every `%XX` octet (hex digits, either case) in `input`
    ///
    /// Sequences that are not followed by two hex digits are kept verbatim,
    /// and a decoded byte sequence that is not valid UTF-8 is repaired lossily.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use favicon_service::utils::url::UrlUtils;
    ///
    /// assert_eq!(UrlUtils::percent_decode("example.com%2Ftest"), "example.com/test");
    /// assert_eq!(UrlUtils::percent_decode("100%"), "100%");
    /// ```
    pub fn percent_decode(input: &str) -> String {
        let bytes = input.as_bytes();
        let mut decoded = Vec::with_capacity(bytes.len());
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] == b'%' && i + 2 < bytes.len() {
                if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    decoded.push(hi << 4 | lo);
                    i += 3;
                    continue;
                }
            }
            decoded.push(bytes[i]);
            i += 1;
        }

        String::from_utf8_lossy(&decoded).into_owned()
    }

    /// Normalize URL scheme by ensuring it has a proper HTTP/HTTPS prefix
    ///
    /// # Examples
    ///
    /// ```rust
    /// use favicon_service::utils::url::UrlUtils;
    ///
    /// assert_eq!(UrlUtils::normalize_scheme("example.com"), "http://example.com");
    /// assert_eq!(UrlUtils::normalize_scheme("https://example.com"), "https://example.com");
    /// assert_eq!(UrlUtils::normalize_scheme("HTTP://example.com"), "HTTP://example.com");
    /// ```
    pub fn normalize_scheme(url: &str) -> String {
        let trimmed = url.trim();
        let lower = trimmed.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        }
    }

    /// Extract the `scheme://host[:port]` part of an absolute URL
    ///
    /// Returns `None` when the URL does not parse or has no host. Default
    /// ports are dropped, explicit non-default ports are kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use favicon_service::utils::url::UrlUtils;
    ///
    /// assert_eq!(
    ///     UrlUtils::extract_domain("http://Example.com:8080/a/b?c").as_deref(),
    ///     Some("http://example.com:8080")
    /// );
    /// assert_eq!(UrlUtils::extract_domain("http://"), None);
    /// ```
    pub fn extract_domain(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str().filter(|h| !h.is_empty())?;

        Some(match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        })
    }

    /// Resolve a possibly relative reference against a base URL
    ///
    /// # Examples
    ///
    /// ```rust
    /// use favicon_service::utils::url::UrlUtils;
    ///
    /// assert_eq!(
    ///     UrlUtils::join("http://example.com/a/page.html", "../img/icon.png").unwrap(),
    ///     "http://example.com/img/icon.png"
    /// );
    /// ```
    pub fn join(base: &str, reference: &str) -> Result<String, url::ParseError> {
        let base_url = Url::parse(base)?;
        let joined = base_url.join(reference.trim())?;
        Ok(joined.to_string())
    }

    /// The conventional root icon location for a domain
    pub fn root_icon_url(domain: &str) -> String {
        format!("{}/favicon.ico", domain.trim_end_matches('/'))
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
