//! Bounded-time HTTP fetching
//!
//! Every fetch made while resolving an icon goes through the [`Fetcher`]
//! trait, which takes the resolution [`Deadline`] explicitly. No fetch is
//! started once the deadline has passed and no fetch may outlive it.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{
    Client, ClientBuilder, Response,
    header::{CONTENT_TYPE, SET_COOKIE},
    redirect::Policy,
};
use std::time::Duration;
use tracing::debug;

use crate::config::FetchConfig;
use crate::errors::{AppError, AppResult, FetchError, FetchResult};
use crate::utils::deadline::Deadline;

/// Raw outcome of one GET, before any icon policy is applied
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    /// URL after following redirects
    pub final_url: String,
    /// Lower-cased MIME essence of `Content-Type`, parameters stripped
    pub content_type: Option<String>,
    /// Raw `Set-Cookie` header values
    pub set_cookies: Vec<String>,
    pub body: Bytes,
}

impl RawResponse {
    /// Build a `Cookie` header value replaying the cookies this response set
    ///
    /// Only the leading `name=value` pair of each `Set-Cookie` is kept.
    pub fn cookie_header(&self) -> Option<String> {
        let pairs: Vec<&str> = self
            .set_cookies
            .iter()
            .filter_map(|cookie| cookie.split(';').next())
            .map(str::trim)
            .filter(|pair| pair.contains('='))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Strip parameters from a `Content-Type` value and lower-case it
pub fn mime_essence(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    if essence.is_empty() { None } else { Some(essence) }
}

/// What a fetch is for, which decides how its body is bounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FetchKind {
    /// HTML to scan: body capped at `fetch.max_body_size`, cookies kept
    /// across the redirect chain
    Page,
    /// Icon bytes: bounded only by the deadline
    Icon,
}

/// Something that can perform a single bounded-time GET
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, failing with [`FetchError::Timeout`] without any network
    /// activity when `deadline` has already passed
    async fn fetch(
        &self,
        url: &str,
        deadline: Deadline,
        headers: &[(String, String)],
        kind: FetchKind,
    ) -> FetchResult<RawResponse>;
}

/// reqwest backed [`Fetcher`]
///
/// Icon fetches share one client. Page fetches get a client of their own so
/// that its cookie store only lives for one redirect chain.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    connection_timeout: Duration,
    max_redirects: usize,
    max_body_size: usize,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> AppResult<Self> {
        let client = Self::client_builder(
            &config.user_agent,
            config.max_redirects,
            config.connection_timeout,
        )
        .build()
        .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            connection_timeout: config.connection_timeout,
            max_redirects: config.max_redirects,
            max_body_size: config.max_body_size,
            user_agent: config.user_agent.clone(),
        })
    }

    fn client_builder(
        user_agent: &str,
        max_redirects: usize,
        connect_timeout: Duration,
    ) -> ClientBuilder {
        Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::limited(max_redirects))
            .connect_timeout(connect_timeout)
    }

    fn client_for(&self, url: &str, kind: FetchKind) -> FetchResult<Client> {
        match kind {
            FetchKind::Icon => Ok(self.client.clone()),
            FetchKind::Page => Self::client_builder(
                &self.user_agent,
                self.max_redirects,
                self.connection_timeout,
            )
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::network(url, format!("Failed to create HTTP client: {e}"))),
        }
    }

    fn map_error(url: &str, deadline: Deadline, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                budget: deadline.budget(),
            }
        } else if error.is_builder() {
            FetchError::InvalidUrl {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else {
            FetchError::network(url, error.to_string())
        }
    }

    async fn read_body(
        &self,
        mut response: Response,
        url: &str,
        deadline: Deadline,
        limit: Option<usize>,
    ) -> FetchResult<Bytes> {
        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::map_error(url, deadline, e))?
        {
            if let Some(limit) = limit
                && body.len() + chunk.len() > limit
            {
                return Err(FetchError::BodyTooLarge {
                    url: url.to_string(),
                    limit,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        deadline: Deadline,
        headers: &[(String, String)],
        kind: FetchKind,
    ) -> FetchResult<RawResponse> {
        if deadline.is_expired() {
            return Err(FetchError::Timeout {
                url: url.to_string(),
                budget: deadline.budget(),
            });
        }

        let timeout = deadline.clamp(self.connection_timeout);
        debug!(url, %kind, timeout_ms = timeout.as_millis() as u64, "Fetching");

        let client = self.client_for(url, kind)?;
        let mut request = client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_error(url, deadline, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(mime_essence);
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(String::from)
            .collect();

        let limit = match kind {
            FetchKind::Page => Some(self.max_body_size),
            FetchKind::Icon => None,
        };
        let body = self.read_body(response, url, deadline, limit).await?;

        debug!(
            url,
            final_url = %final_url,
            status,
            bytes = body.len(),
            "Fetched"
        );

        Ok(RawResponse {
            status,
            final_url,
            content_type,
            set_cookies,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&FetchConfig::default()).expect("client should build")
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[rstest]
    #[case("image/png", Some("image/png"))]
    #[case("Image/X-Icon", Some("image/x-icon"))]
    #[case("text/html; charset=UTF-8", Some("text/html"))]
    #[case(" ; charset=utf-8", None)]
    #[case("", None)]
    fn test_mime_essence(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(mime_essence(input).as_deref(), expected);
    }

    #[test]
    fn test_cookie_header_keeps_name_value_pairs() {
        let response = RawResponse {
            set_cookies: vec![
                "session=abc123; Path=/; HttpOnly".to_string(),
                "theme=dark".to_string(),
                "garbage".to_string(),
            ],
            ..RawResponse::default()
        };
        assert_eq!(
            response.cookie_header().as_deref(),
            Some("session=abc123; theme=dark")
        );
    }

    #[test]
    fn test_cookie_header_absent_without_cookies() {
        assert_eq!(RawResponse::default().cookie_header(), None);
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_without_network() {
        let deadline = Deadline::after(Duration::ZERO);
        // Port 9 (discard) would hang or refuse; the deadline check must come first
        let result = fetcher().fetch("http://127.0.0.1:9/", deadline, &[], FetchKind::Page).await;
        assert!(matches!(result, Err(FetchError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_unparseable_url_is_not_a_timeout() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let result = fetcher().fetch("not a url", deadline, &[], FetchKind::Icon).await;
        assert!(matches!(result, Err(ref e) if !e.is_timeout()));
    }

    #[tokio::test]
    async fn test_shared_client_honours_each_request_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.ico"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/favicon.ico"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"icon".to_vec()))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let slow = fetcher
            .fetch(
                &format!("{}/slow.ico", server.uri()),
                Deadline::after(Duration::from_millis(200)),
                &[],
                FetchKind::Icon,
            )
            .await;
        assert!(matches!(slow, Err(FetchError::Timeout { .. })));

        let icon = fetcher
            .fetch(&format!("{}/favicon.ico", server.uri()), deadline(), &[], FetchKind::Icon)
            .await
            .unwrap();
        assert_eq!(icon.status, 200);
        assert_eq!(&icon.body[..], b"icon");
    }

    #[tokio::test]
    async fn test_redirect_cookies_replayed_for_pages_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "/landing")
                    .insert_header("Set-Cookie", "session=abc; Path=/"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .and(header("cookie", "session=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let url = format!("{}/start", server.uri());

        let page = fetcher.fetch(&url, deadline(), &[], FetchKind::Page).await.unwrap();
        assert_eq!(page.status, 200);
        assert!(page.final_url.ends_with("/landing"));

        let icon = fetcher.fetch(&url, deadline(), &[], FetchKind::Icon).await.unwrap();
        assert_eq!(icon.status, 404);
    }

    #[tokio::test]
    async fn test_body_cap_applies_to_pages_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&FetchConfig {
            max_body_size: 1024,
            ..FetchConfig::default()
        })
        .expect("client should build");
        let url = format!("{}/big", server.uri());

        let page = fetcher.fetch(&url, deadline(), &[], FetchKind::Page).await;
        assert!(matches!(page, Err(FetchError::BodyTooLarge { limit: 1024, .. })));

        let icon = fetcher.fetch(&url, deadline(), &[], FetchKind::Icon).await.unwrap();
        assert_eq!(icon.body.len(), 4096);
    }
}
