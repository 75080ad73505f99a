use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::utils::url::UrlUtils;

/// A user supplied URL made fetchable, plus the domain it is cached under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Decoded, scheme-prefixed page URL
    pub url: String,
    /// `scheme://host[:port]`
    pub domain: String,
}

impl Target {
    /// Decode `%XX` octets, default the scheme to `http://` and split off the domain
    ///
    /// Fails with [`AppError::MalformedUrl`] when no host can be found.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let decoded = UrlUtils::percent_decode(raw);
        let url = UrlUtils::normalize_scheme(&decoded);
        debug!("Decoded URL: {}", url);

        let domain = UrlUtils::extract_domain(&url).ok_or_else(|| AppError::malformed_url(raw))?;
        debug!("URL: {}, domain: {}", url, domain);

        Ok(Self { url, domain })
    }
}
