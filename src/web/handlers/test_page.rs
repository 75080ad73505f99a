//! Diagnostic page rendering the icons of a list of sites

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

use crate::web::{AppState, responses::not_found};

struct SiteLink<'a> {
    name: &'a str,
    /// `name`, percent-encoded for the `/s?url=` query
    query: String,
}

#[derive(Template)]
#[template(path = "test_page.html")]
struct TestPageTemplate<'a> {
    sites: Vec<SiteLink<'a>>,
}

impl<'a> TestPageTemplate<'a> {
    /// One link per whitespace separated entry of a top sites list
    fn from_list(list: &'a str) -> Self {
        Self {
            sites: list
                .split_whitespace()
                .map(|name| SiteLink {
                    name,
                    query: urlencoding::encode(name).into_owned(),
                })
                .collect(),
        }
    }
}

/// `GET /test`: one `<img>` per site listed in `web.topsites_path`
pub async fn test_page(State(state): State<AppState>) -> Response {
    let Some(path) = state.config.web.topsites_path.as_ref() else {
        return not_found("No top sites list configured");
    };

    let list = match tokio::fs::read_to_string(path).await {
        Ok(list) => list,
        Err(e) => {
            error!("Failed to read top sites list {}: {}", path.display(), e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Top sites list unreadable").into_response();
        }
    };

    match TestPageTemplate::from_list(&list).render() {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            error!("Failed to render test page: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render test page").into_response()
        }
    }
}
