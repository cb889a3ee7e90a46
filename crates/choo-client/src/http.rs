//! Shared reqwest plumbing for the HTTP adapters.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::config::{ClientConfig, ConfigError};
use crate::error::ClientError;

/// Build the shared `reqwest::Client`: bearer auth, JSON content type and
/// the configured timeout on every request.
pub(crate) fn build_http(config: &ClientConfig) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers({
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&format!(
                    "Bearer {}",
                    config.api_token.as_str()
                ))
                .map_err(|_| ClientError::Config(ConfigError::MissingToken))?,
            );
            headers.insert(
                reqwest::header::CONTENT_TYPE,
                reqwest::header::HeaderValue::from_static("application/json"),
            );
            headers
        })
        .build()
        .map_err(|e| ClientError::Http {
            endpoint: "client_init".into(),
            source: e,
        })
}

/// Join `path` onto `base`, keeping any path prefix `base` already carries.
pub(crate) fn join(base: &url::Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turn a non-2xx response into [`ClientError::Api`].
pub(crate) async fn check_status(
    resp: reqwest::Response,
    endpoint: &str,
) -> Result<reqwest::Response, ClientError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Api {
        endpoint: endpoint.into(),
        status,
        body,
    })
}

/// Check the status, then decode the JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    resp: reqwest::Response,
    endpoint: &str,
) -> Result<T, ClientError> {
    let resp = check_status(resp, endpoint).await?;
    resp.json().await.map_err(|e| ClientError::Deserialization {
        endpoint: endpoint.into(),
        source: e,
    })
}

pub(crate) fn transport(endpoint: &str) -> impl FnOnce(reqwest::Error) -> ClientError + '_ {
    move |source| ClientError::Http {
        endpoint: endpoint.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_slashes() {
        let base = url::Url::parse("http://h:1/api/").unwrap();
        assert_eq!(join(&base, "/v1/x"), "http://h:1/api/v1/x");
        let bare = url::Url::parse("http://h:1").unwrap();
        assert_eq!(join(&bare, "v1/x"), "http://h:1/v1/x");
    }
}
