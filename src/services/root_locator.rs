//! `/favicon.ico` at the domain root

use std::sync::Arc;
use tracing::{info, warn};

use crate::models::Icon;
use crate::services::icon_cache::{CachedValue, IconCache};
use crate::services::validator::ResponseValidator;
use crate::utils::deadline::Deadline;
use crate::utils::http_client::{FetchKind, Fetcher};
use crate::utils::url::UrlUtils;

pub struct RootIconLocator {
    fetcher: Arc<dyn Fetcher>,
    validator: ResponseValidator,
    cache: Arc<IconCache>,
}

impl RootIconLocator {
    pub fn new(fetcher: Arc<dyn Fetcher>, validator: ResponseValidator, cache: Arc<IconCache>) -> Self {
        Self {
            fetcher,
            validator,
            cache,
        }
    }

    /// Try the conventional root icon, caching it under `domain` when valid
    pub async fn locate(&self, domain: &str, deadline: Deadline) -> Option<Icon> {
        let icon_url = UrlUtils::root_icon_url(domain);

        let response = match self
            .fetcher
            .fetch(&icon_url, deadline, &[], FetchKind::Icon)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to fetch root icon {}: {}", icon_url, e);
                return None;
            }
        };

        let icon = self.validator.validate(&response)?;
        info!("Found root icon for {} at {}", domain, icon_url);

        self.cache
            .put(domain, CachedValue::Icon(icon.data.clone()))
            .await;
        Some(icon.with_location(icon_url))
    }
}
