//! Icon lookup and cache invalidation

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::web::{
    AppState,
    responses::{bad_request, handle_error, icon_response},
};

#[derive(Debug, Deserialize)]
pub struct FaviconQuery {
    pub url: Option<String>,
    #[serde(rename = "skipCache")]
    pub skip_cache: Option<String>,
}

impl FaviconQuery {
    /// `skipCache` is on only when it reads `true`, in any case
    pub fn skip_cache(&self) -> bool {
        self.skip_cache
            .as_deref()
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    }
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub url: Option<String>,
}

/// `GET /s?url=<target>&skipCache=<bool>`
pub async fn get_favicon(
    State(state): State<AppState>,
    Query(query): Query<FaviconQuery>,
) -> Response {
    let Some(url) = query.url.as_deref() else {
        return bad_request("Missing url parameter");
    };

    match state.resolver.resolve(url, query.skip_cache()).await {
        Ok(resolution) => icon_response(resolution, state.resolver.cache_ttl()),
        Err(e) => handle_error(e),
    }
}

/// `GET /clear?url=<target>`
pub async fn clear_cache(
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Response {
    let Some(url) = query.url.as_deref() else {
        return bad_request("Missing url parameter");
    };

    match state.resolver.invalidate(url).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => handle_error(e),
    }
}
