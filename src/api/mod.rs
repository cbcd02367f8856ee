//! Remote lab API client.
//!
//! The lab is a plain JSON-over-HTTPS service authenticated with HTTP Basic
//! credentials. [`Transport`] is the seam the rest of the crate talks to;
//! [`ApiClient`] is the `ureq`-backed implementation used in production.

pub mod credentials;
pub mod records;
pub mod status;

use std::time::Duration;

use serde_json::Value;

pub use credentials::Credentials;
pub use records::{ChamberRecord, ExperimentRecord};
pub use status::{status_display, ChamberStatus, ExperimentStatus, Status, StyleHint};

use crate::error::LabError;

pub const DEFAULT_ENDPOINT: &str = "https://api.causalchamber.ai/v0";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated JSON requests against the lab API.
///
/// `path` is relative to the API endpoint, e.g. `experiments/<id>`.
pub trait Transport {
    /// The authenticated user.
    fn user_id(&self) -> &str;
    fn get(&self, path: &str) -> Result<Value, LabError>;
    fn post(&self, path: &str, body: &Value) -> Result<Value, LabError>;
}

/// `ureq`-backed [`Transport`].
#[derive(Clone)]
pub struct ApiClient {
    endpoint: String,
    credentials: Credentials,
    agent: ureq::Agent,
}

impl ApiClient {
    /// Build a client for `endpoint` (default [`DEFAULT_ENDPOINT`]).
    ///
    /// No request is made here.
    pub fn new(
        credentials: Credentials,
        endpoint: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LabError> {
        let endpoint = endpoint.unwrap_or(DEFAULT_ENDPOINT).trim();
        let parsed = url::Url::parse(endpoint).map_err(|source| LabError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            message: source.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LabError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                message: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
            agent: config.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.endpoint, path)
    }

    fn handle(
        &self,
        url: &str,
        result: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    ) -> Result<Value, LabError> {
        let mut response = result.map_err(|source| LabError::Transport {
            url: url.to_string(),
            message: source.to_string(),
        })?;
        let status = response.status().as_u16();

        if (200..300).contains(&status) {
            return response
                .body_mut()
                .read_json::<Value>()
                .map_err(|source| LabError::Json {
                    context: url.to_string(),
                    message: source.to_string(),
                });
        }

        let body = response.body_mut().read_to_string().unwrap_or_default();
        Err(LabError::Api {
            status,
            message: error_message(&body),
        })
    }
}

impl Transport for ApiClient {
    fn user_id(&self) -> &str {
        self.credentials.user()
    }

    fn get(&self, path: &str) -> Result<Value, LabError> {
        let url = self.url(path);
        log::debug!("GET {url}");
        let result = self
            .agent
            .get(&url)
            .header("Authorization", self.credentials.basic_auth())
            .call();
        self.handle(&url, result)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, LabError> {
        let url = self.url(path);
        log::debug!("POST {url}");
        let result = self
            .agent
            .post(&url)
            .header("Authorization", self.credentials.basic_auth())
            .send_json(body);
        self.handle(&url, result)
    }
}

fn join_url(endpoint: &str, path: &str) -> String {
    format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Human-readable message from an error response body.
fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let field = parsed.as_ref().and_then(|value| {
        ["message", "detail", "error"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
    });

    match field {
        Some(message) => message.to_string(),
        None if body.trim().is_empty() => "no response body".to_string(),
        None => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_joined_with_single_slash() {
        assert_eq!(
            join_url("https://custom.api.com/v1/", "/experiments/abc"),
            "https://custom.api.com/v1/experiments/abc"
        );
        assert_eq!(
            join_url("https://custom.api.com/v1", "chambers"),
            "https://custom.api.com/v1/chambers"
        );
    }

    #[test]
    fn custom_endpoint_is_kept() {
        let client = ApiClient::new(
            Credentials::new("user", "pass"),
            Some("https://custom.api.com/v1"),
            DEFAULT_TIMEOUT,
        )
        .expect("client");
        assert_eq!(client.endpoint(), "https://custom.api.com/v1");
        assert_eq!(client.user_id(), "user");
    }

    #[test]
    fn invalid_endpoints_are_rejected() {
        for endpoint in ["not a url", "ftp://example.org"] {
            let result = ApiClient::new(
                Credentials::new("user", "pass"),
                Some(endpoint),
                DEFAULT_TIMEOUT,
            );
            assert!(matches!(result, Err(LabError::InvalidEndpoint { .. })));
        }
    }

    #[test]
    fn error_messages_prefer_json_fields() {
        assert_eq!(
            error_message(r#"{"message": "Invalid credentials"}"#),
            "Invalid credentials"
        );
        assert_eq!(error_message(r#"{"detail": "no such chamber"}"#), "no such chamber");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(error_message(""), "no response body");
    }
}
