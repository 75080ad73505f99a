//! Icon response validation policy

use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::IconConfig;
use crate::models::Icon;
use crate::utils::http_client::RawResponse;

/// Classifies a fetched response as a usable icon or not
///
/// Rejections are expected outcomes, not errors: a non-200 status, a
/// blacklisted MIME type or an empty body all yield `None`. Sizes outside
/// the configured band only produce a warning.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    min_size: usize,
    max_size: usize,
    mime_blacklist: HashSet<String>,
}

impl ResponseValidator {
    pub fn new(config: &IconConfig) -> Self {
        Self {
            min_size: config.min_size,
            max_size: config.max_size,
            mime_blacklist: config
                .mime_blacklist
                .iter()
                .map(|mime| mime.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// The icon carried by `response`, without a location
    pub fn validate(&self, response: &RawResponse) -> Option<Icon> {
        if response.status != 200 {
            info!(
                "Non-success response: {} fetching url: {}",
                response.status, response.final_url
            );
            return None;
        }

        if let Some(content_type) = &response.content_type {
            if self.mime_blacklist.contains(content_type) {
                info!(
                    "Url: {} favicon content-type: {} blacklisted",
                    response.final_url, content_type
                );
                return None;
            }
        }

        let length = response.body.len();
        if length == 0 {
            info!("Url: {} null content length", response.final_url);
            return None;
        }

        if length < self.min_size || length > self.max_size {
            warn!(
                "Url: {} favicon size: {} out of bounds [{}, {}], accepting anyway",
                response.final_url, length, self.min_size, self.max_size
            );
        }

        let icon = Icon::new(response.body.clone());
        Some(match &response.content_type {
            Some(content_type) => icon.with_mime_type(content_type.clone()),
            None => icon,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rstest::rstest;
    use tracing_test::traced_test;

    fn validator() -> ResponseValidator {
        ResponseValidator::new(&IconConfig {
            min_size: 4,
            max_size: 16,
            mime_blacklist: vec!["text/html".to_string(), "Text/Plain".to_string()],
            ..IconConfig::default()
        })
    }

    fn response(status: u16, content_type: Option<&str>, body: &'static [u8]) -> RawResponse {
        RawResponse {
            status,
            final_url: "http://example.com/favicon.ico".to_string(),
            content_type: content_type.map(String::from),
            set_cookies: Vec::new(),
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn test_accepts_icon_within_band() {
        let icon = validator()
            .validate(&response(200, Some("image/png"), b"12345678"))
            .expect("icon should be accepted");

        assert_eq!(icon.data.as_ref(), b"12345678");
        assert_eq!(icon.mime_type.as_deref(), Some("image/png"));
        assert_eq!(icon.location, None);
    }

    #[rstest]
    #[case(404)]
    #[case(500)]
    #[case(204)]
    #[case(301)]
    fn test_rejects_non_200(#[case] status: u16) {
        assert!(validator()
            .validate(&response(status, Some("image/png"), b"12345678"))
            .is_none());
    }

    #[rstest]
    #[case("text/html")]
    #[case("text/plain")]
    fn test_rejects_blacklisted_mime(#[case] mime: &str) {
        assert!(validator()
            .validate(&response(200, Some(mime), b"12345678"))
            .is_none());
    }

    #[test]
    fn test_rejects_empty_body() {
        assert!(validator()
            .validate(&response(200, Some("image/x-icon"), b""))
            .is_none());
    }

    #[traced_test]
    #[test]
    fn test_out_of_band_sizes_are_accepted_with_warning() {
        let bodies: [&'static [u8]; 2] = [b"ab", b"0123456789abcdefXYZ"];
        for body in bodies {
            let icon = validator().validate(&response(200, Some("image/x-icon"), body));
            assert_eq!(icon.map(|i| i.len()), Some(body.len()));
        }
        assert!(logs_contain("out of bounds"));
    }

    #[test]
    fn test_missing_content_type_is_not_blacklisted() {
        let icon = validator()
            .validate(&response(200, None, b"12345678"))
            .expect("icon should be accepted");
        assert_eq!(icon.mime_type, None);
        assert_eq!(icon.content_type(), "image/x-icon");
    }
}
