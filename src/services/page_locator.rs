//! Icons declared by the page itself
//!
//! The page is scanned for `<link rel="icon">` (or `shortcut` / `shortcut
//! icon`). When there is none, a single `<meta http-equiv="refresh">` hop is
//! followed and the scan repeated on the target page.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::Icon;
use crate::services::icon_cache::{CachedValue, IconCache};
use crate::services::validator::ResponseValidator;
use crate::utils::deadline::Deadline;
use crate::utils::html;
use crate::utils::http_client::{FetchKind, Fetcher, RawResponse};
use crate::utils::url::UrlUtils;

/// Meta-refresh hops the resolver allows per request
pub const MAX_REFRESH_HOPS: u8 = 1;

pub struct PageIconLocator {
    fetcher: Arc<dyn Fetcher>,
    validator: ResponseValidator,
    cache: Arc<IconCache>,
}

impl PageIconLocator {
    pub fn new(fetcher: Arc<dyn Fetcher>, validator: ResponseValidator, cache: Arc<IconCache>) -> Self {
        Self {
            fetcher,
            validator,
            cache,
        }
    }

    /// Find the icon `page_url` declares, following at most `refresh_hops`
    /// meta-refresh redirects
    ///
    /// A valid icon is cached under `domain` and returned with its resolved
    /// URL as location. Every failure yields `None`.
    pub async fn locate(
        &self,
        domain: &str,
        page_url: &str,
        deadline: Deadline,
        refresh_hops: u8,
    ) -> Option<Icon> {
        let mut page_url = page_url.to_string();
        let mut hops_left = refresh_hops;

        loop {
            let page = match self
                .fetcher
                .fetch(&page_url, deadline, &[], FetchKind::Page)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!("Failed to fetch page {}: {}", page_url, e);
                    return None;
                }
            };

            if page.status != 200 {
                info!("Page {} returned status {}", page_url, page.status);
                return None;
            }

            let markup = page.text();

            if let Some(link) = html::find_icon_link(&markup) {
                let Some(href) = link.href else {
                    info!("Icon link on {} has no href", page_url);
                    return None;
                };
                return self
                    .fetch_declared_icon(domain, &page_url, &href, &page, deadline)
                    .await;
            }

            if hops_left == 0 {
                debug!("No icon link on {} and no refresh hops left", page_url);
                return None;
            }

            let refresh = html::find_refresh_url(&markup)?;
            page_url = match UrlUtils::join(&page.final_url, &refresh) {
                Ok(next) => next,
                Err(e) => {
                    warn!("Unusable refresh target {} on {}: {}", refresh, page.final_url, e);
                    return None;
                }
            };
            info!("Following meta refresh to {}", page_url);
            hops_left -= 1;
        }
    }

    async fn fetch_declared_icon(
        &self,
        domain: &str,
        page_url: &str,
        href: &str,
        page: &RawResponse,
        deadline: Deadline,
    ) -> Option<Icon> {
        let icon_url = match UrlUtils::join(page_url, href) {
            Ok(url) => url,
            Err(e) => {
                warn!("Unusable icon href {} on {}: {}", href, page_url, e);
                return None;
            }
        };

        let headers: Vec<(String, String)> = page
            .cookie_header()
            .map(|cookies| vec![("Cookie".to_string(), cookies)])
            .unwrap_or_default();

        let response = match self
            .fetcher
            .fetch(&icon_url, deadline, &headers, FetchKind::Icon)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to fetch declared icon {}: {}", icon_url, e);
                return None;
            }
        };

        let icon = self.validator.validate(&response)?;
        info!("Found page icon for {} at {}", domain, icon_url);

        self.cache
            .put(domain, CachedValue::Icon(icon.data.clone()))
            .await;
        Some(icon.with_location(icon_url))
    }
}
