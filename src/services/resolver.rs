//! The icon fallback chain
//!
//! ```text
//! CheckCache -> TryPageIcon -> TryRootIcon -> UseDefault
//! ```
//!
//! Each stage either produces an icon or hands over to the next one. A single
//! [`Deadline`] started before the first stage bounds every fetch.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::errors::AppResult;
use crate::models::{Icon, IconSource, Resolution, Target};
use crate::services::icon_cache::{CachedValue, Counter, Counters, IconCache};
use crate::services::page_locator::{MAX_REFRESH_HOPS, PageIconLocator};
use crate::services::root_locator::RootIconLocator;
use crate::services::validator::ResponseValidator;
use crate::utils::deadline::Deadline;
use crate::utils::http_client::Fetcher;

#[derive(Debug)]
enum Stage {
    CheckCache,
    TryPageIcon,
    TryRootIcon,
    UseDefault,
    Done(Icon, IconSource),
}

pub struct FaviconResolver {
    cache: Arc<IconCache>,
    page_locator: PageIconLocator,
    root_locator: RootIconLocator,
    request_timeout: Duration,
}

impl FaviconResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: Arc<IconCache>, config: &Config) -> Self {
        let validator = ResponseValidator::new(&config.icon);
        Self {
            page_locator: PageIconLocator::new(fetcher.clone(), validator.clone(), cache.clone()),
            root_locator: RootIconLocator::new(fetcher, validator, cache.clone()),
            cache,
            request_timeout: config.fetch.request_timeout,
        }
    }

    /// Resolve the icon for a user supplied URL
    ///
    /// Only a URL without a usable host is an error; every other failure
    /// ends in the default icon.
    pub async fn resolve(&self, raw_url: &str, skip_cache: bool) -> AppResult<Resolution> {
        let deadline = Deadline::after(self.request_timeout);
        let target = Target::parse(raw_url)?;
        self.cache.increment(Counter::Requests).await;

        let mut stage = if skip_cache {
            Stage::TryPageIcon
        } else {
            Stage::CheckCache
        };

        let (icon, source) = loop {
            stage = match stage {
                Stage::CheckCache => match self.cache.get(&target.domain).await {
                    Some(icon) => Stage::Done(icon, IconSource::Cache),
                    None => Stage::TryPageIcon,
                },
                Stage::TryPageIcon => {
                    match self
                        .page_locator
                        .locate(&target.domain, &target.url, deadline, MAX_REFRESH_HOPS)
                        .await
                    {
                        Some(icon) => Stage::Done(icon, IconSource::Page),
                        None => Stage::TryRootIcon,
                    }
                }
                Stage::TryRootIcon => match self.root_locator.locate(&target.domain, deadline).await {
                    Some(icon) => Stage::Done(icon, IconSource::Root),
                    None => Stage::UseDefault,
                },
                Stage::UseDefault => {
                    info!("Using default icon for {}", target.domain);
                    self.cache.put(&target.domain, CachedValue::Default).await;
                    self.cache.increment(Counter::Defaults).await;
                    Stage::Done(self.cache.default_icon(), IconSource::Default)
                }
                Stage::Done(icon, source) => break (icon, source),
            };
        };

        info!(
            url = %target.url,
            domain = %target.domain,
            source = %source,
            bytes = icon.len(),
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "Resolved favicon"
        );

        Ok(Resolution {
            icon,
            source,
            domain: target.domain,
        })
    }

    /// Forget the cached icon for the domain of `raw_url`, returning that domain
    pub async fn invalidate(&self, raw_url: &str) -> AppResult<String> {
        let target = Target::parse(raw_url)?;
        self.cache.invalidate(&target.domain).await?;
        Ok(target.domain)
    }

    pub async fn counters(&self) -> Counters {
        self.cache.read_counters().await
    }

    /// How long resolved icons stay cached
    pub fn cache_ttl(&self) -> Duration {
        self.cache.ttl()
    }
}
