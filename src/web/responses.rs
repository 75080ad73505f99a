//! HTTP response types and utilities
//!
//! JSON endpoints share the [`ApiResponse`] envelope for errors. Icon
//! responses are raw bytes with caching headers derived from the cache TTL.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;

use crate::errors::AppError;
use crate::models::{IconSource, Resolution};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the operation was successful
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<Utc>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

/// Convert AppError to appropriate HTTP response
pub fn handle_error(error: AppError) -> Response {
    let (status, message) = match &error {
        AppError::MalformedUrl { url } => (StatusCode::BAD_REQUEST, format!("Malformed URL: {url}")),
        AppError::Configuration { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Configuration error: {message}"),
        ),
        AppError::Cache(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Cache operation failed".to_string(),
        ),
        AppError::Io(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "I/O operation failed".to_string(),
        ),
        AppError::Internal { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal error: {message}"),
        ),
    };

    if status.is_server_error() {
        error!("Request failed: {}", error);
    }

    (status, Json(ApiResponse::<()>::error(message))).into_response()
}

pub fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(message.to_string())),
    )
        .into_response()
}

pub fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error(message.to_string())),
    )
        .into_response()
}

/// Format a timestamp as an HTTP date (`Sun, 06 Nov 1994 08:49:37 GMT`)
pub fn http_date(at: chrono::DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Icon bytes with content type and client caching headers
///
/// Clients may keep the icon for as long as the server cache does.
/// Resolution outcome attached to icon responses for request logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconOutcome {
    pub domain: String,
    pub source: IconSource,
}

pub fn icon_response(resolution: Resolution, ttl: Duration) -> Response {
    let expires = Utc::now() + TimeDelta::from_std(ttl).unwrap_or(TimeDelta::zero());
    let content_type = HeaderValue::from_str(resolution.icon.content_type())
        .unwrap_or_else(|_| HeaderValue::from_static(crate::models::icon::FALLBACK_ICON_TYPE));

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_str(&format!("public, max-age={}", ttl.as_secs()))
                    .unwrap_or_else(|_| HeaderValue::from_static("public")),
            ),
        ],
        resolution.icon.data.clone(),
    )
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&http_date(expires)) {
        response.headers_mut().insert(header::EXPIRES, value);
    }
    if resolution.is_cache_hit() {
        response
            .headers_mut()
            .insert("X-Cache", HeaderValue::from_static("Hit"));
    }
    response.extensions_mut().insert(IconOutcome {
        domain: resolution.domain,
        source: resolution.source,
    });

    response
}
