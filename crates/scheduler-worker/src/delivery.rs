//! Outbound HTTP delivery and the §7 error-taxonomy classification.

use std::time::Duration;

use scheduler_core::config::DeliveryConfig;
use scheduler_core::error::{Error, Result};
use serde_json::Value;

/// Builds the single shared `reqwest::Client` used for all deliveries:
/// connection pooling, bounded redirects, and a hard timeout, constructed
/// once and handed to every `DeliveryWorker` (§4.4, §5).
pub fn build_http_client(config: &DeliveryConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()
}

/// Performs a single outbound POST attempt. Does not retry; callers wrap
/// this in `with_retry` for the bounded exponential backoff of §4.4 step 5.
pub async fn post_once(
    client: &reqwest::Client,
    target: &str,
    payload: &Value,
    user_agent: &str,
) -> Result<()> {
    let response = client
        .post(target)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(reqwest::header::USER_AGENT, user_agent)
        .json(payload)
        .send()
        .await
        .map_err(classify_transport_error)?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() {
        Err(Error::upstream_server(status.as_u16(), status.to_string()))
    } else {
        Err(Error::upstream_client(status.as_u16(), status.to_string()))
    }
}

fn classify_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        Error::network(err.to_string())
    } else {
        Error::Unknown {
            message: err.to_string(),
        }
    }
}

/// Wraps a single delivery attempt in the Worker's inner retry (§4.4 step
/// 5): up to `max_attempts`, exponential backoff from `initial` capped at
/// `max`, retrying only retryable errors. A non-retryable error (or the
/// final retryable failure) is returned as-is.
pub async fn with_retry<F, Fut>(config: &DeliveryConfig, mut attempt: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut backoff = Duration::from_secs(config.initial_backoff_secs);
    let max_backoff = Duration::from_secs(config.max_backoff_secs);

    for n in 1..=config.max_attempts {
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && n < config.max_attempts => {
                tracing::debug!(attempt = n, error = %e, "retryable delivery failure, backing off");
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, max_backoff);
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("loop always returns on the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn default_config_builds_a_client() {
        let config = DeliveryConfig::default();
        assert!(build_http_client(&config).is_ok());
    }

    #[tokio::test]
    async fn post_once_succeeds_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = build_http_client(&DeliveryConfig::default()).unwrap();
        let target = format!("{}/hook", server.uri());
        let result = post_once(&client, &target, &serde_json::json!({"k": "v"}), "scheduler/1.0").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn post_once_classifies_5xx_as_upstream_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = build_http_client(&DeliveryConfig::default()).unwrap();
        let target = format!("{}/hook", server.uri());
        let err = post_once(&client, &target, &serde_json::json!({}), "scheduler/1.0")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamServer { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn post_once_classifies_4xx_as_upstream_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let client = build_http_client(&DeliveryConfig::default()).unwrap();
        let target = format!("{}/hook", server.uri());
        let err = post_once(&client, &target, &serde_json::json!({}), "scheduler/1.0")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamClient { status: 422, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn with_retry_stops_immediately_on_non_retryable() {
        let config = DeliveryConfig::default();
        let mut calls = 0;
        let result = with_retry(&config, || {
            calls += 1;
            async { Err::<(), _>(Error::upstream_client(404, "not found")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn with_retry_exhausts_attempts_on_retryable() {
        let mut config = DeliveryConfig::default();
        config.initial_backoff_secs = 0;
        config.max_backoff_secs = 0;
        let mut calls = 0;
        let result = with_retry(&config, || {
            calls += 1;
            async { Err::<(), _>(Error::network("connection refused")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, config.max_attempts);
    }

    #[tokio::test]
    async fn with_retry_succeeds_after_transient_failures() {
        let mut config = DeliveryConfig::default();
        config.initial_backoff_secs = 0;
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = with_retry(&config, || {
            let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::upstream_server(500, "unavailable"))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
    }
}
