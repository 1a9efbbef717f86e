//! Client for the external stream-retrieve service.
//!
//! Wraps the HTTP call with a circuit breaker (so an extended outage fails
//! fast instead of piling up timeouts) and a small jitter delay to de-burst
//! concurrent candidate resolutions against the same upstream.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use vclip_media::{CircuitBreaker, CircuitState};

use crate::error::{WorkerError, WorkerResult};

const RETRIEVE_TIMEOUT: Duration = Duration::from_secs(15);
const JITTER_MAX_MS: u64 = 500;

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    stream_url: String,
}

/// Resolves a streaming URL for a `source_video_id` via the retrieve API.
#[derive(Clone)]
pub struct RetrieveClient {
    http: reqwest::Client,
    base_url: String,
    breaker: CircuitBreaker,
}

impl RetrieveClient {
    pub fn new(base_url: impl Into<String>) -> WorkerResult<Self> {
        let http = reqwest::Client::builder().timeout(RETRIEVE_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            breaker: CircuitBreaker::default(),
        })
    }

    /// Resolves the stream URL for `source_video_id`, failing fast with
    /// `CandidateRetryable` if the circuit is open.
    pub async fn resolve(&self, source_video_id: &str) -> WorkerResult<String> {
        if !self.breaker.allow() {
            return Err(WorkerError::candidate_retryable("retrieve circuit open"));
        }

        let jitter_ms = rand::thread_rng().gen_range(0..=JITTER_MAX_MS);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

        let url = format!("{}/v1/retrieve/{}", self.base_url, source_video_id);
        let result = self.http.get(&url).send().await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                let body: RetrieveResponse = resp.json().await?;
                self.breaker.success();
                Ok(body.stream_url)
            }
            Ok(resp) if resp.status().is_client_error() => {
                self.breaker.success(); // a 4xx is not an upstream outage
                Err(WorkerError::candidate_permanent(format!(
                    "retrieve returned {}",
                    resp.status()
                )))
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "retrieve service returned server error");
                self.breaker.failure();
                Err(WorkerError::candidate_retryable(format!("retrieve returned {}", resp.status())))
            }
            Err(e) => {
                debug!(error = %e, "retrieve call failed");
                self.breaker.failure();
                Err(WorkerError::candidate_retryable(format!("retrieve request failed: {e}")))
            }
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn resolve_returns_stream_url_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/retrieve/vid123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "stream_url": "https://cdn.example.com/vid123.m3u8"
            })))
            .mount(&server)
            .await;

        let client = RetrieveClient::new(server.uri()).unwrap();
        let url = client.resolve("vid123").await.unwrap();
        assert_eq!(url, "https://cdn.example.com/vid123.m3u8");
        assert_eq!(client.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn resolve_returns_permanent_error_on_4xx_without_tripping_breaker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/retrieve/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = RetrieveClient::new(server.uri()).unwrap();
        let err = client.resolve("missing").await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(client.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn resolve_returns_retryable_error_on_5xx_and_records_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/retrieve/vid123"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = RetrieveClient::new(server.uri()).unwrap();
        let err = client.resolve("vid123").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
