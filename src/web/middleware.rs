//! HTTP middleware

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};

use crate::web::responses::IconOutcome;

/// Request logging middleware
///
/// Runs each request inside a span carrying a fresh request id. Icon
/// responses additionally log the resolved domain, the stage that produced
/// the icon and whether it was a cache hit.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let span = info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %uuid::Uuid::new_v4(),
    );

    async move {
        let response = next.run(request).await;
        let status = response.status().as_u16();
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Some(outcome) = response.extensions().get::<IconOutcome>() {
            info!(
                status,
                duration_ms,
                domain = %outcome.domain,
                source = %outcome.source,
                cache = if response.headers().contains_key("X-Cache") { "hit" } else { "miss" },
                "Icon served"
            );
        } else if status >= 400 {
            warn!(status, duration_ms, "HTTP request completed with error");
        } else {
            info!(status, duration_ms, "HTTP request completed");
        }

        response
    }
    .instrument(span)
    .await
}
