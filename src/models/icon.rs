use bytes::Bytes;
use serde::Serialize;
use std::path::Path;

use crate::errors::{AppError, AppResult};

/// MIME type assumed when an icon carries none
pub const FALLBACK_ICON_TYPE: &str = "image/x-icon";

/// A resolved icon image plus what we know about where it came from
///
/// Icons are immutable values. Cloning is cheap because the image bytes are
/// reference counted, which is how the default icon is shared by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub data: Bytes,
    pub location: Option<String>,
    pub mime_type: Option<String>,
}

impl Icon {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            location: None,
            mime_type: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Read the fallback icon served when resolution fails
    ///
    /// Called once at startup; an unreadable or empty file is fatal.
    pub async fn load_default(path: &Path, mime_type: &str) -> AppResult<Self> {
        let data = tokio::fs::read(path).await?;
        if data.is_empty() {
            return Err(AppError::configuration(format!(
                "Default icon {} is empty",
                path.display()
            )));
        }
        Ok(Self::new(data)
            .with_location(path.display().to_string())
            .with_mime_type(mime_type))
    }

    /// The MIME type to advertise when serving this icon
    pub fn content_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(FALLBACK_ICON_TYPE)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Which stage of the fallback chain produced an icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IconSource {
    Cache,
    Page,
    Root,
    Default,
}

/// Outcome of one resolution request
#[derive(Debug, Clone)]
pub struct Resolution {
    pub icon: Icon,
    pub source: IconSource,
    pub domain: String,
}

impl Resolution {
    /// Served without any network fetch
    pub fn is_cache_hit(&self) -> bool {
        self.source == IconSource::Cache
    }
}
