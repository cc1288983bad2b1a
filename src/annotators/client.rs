//! Blocking JSON client for the NLP annotation services.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// Posts annotation requests to one service endpoint, retrying transient failures.
#[derive(Clone, Debug)]
pub struct NlpServiceClient {
    client: Client,
    endpoint: String,
    max_retries: usize,
}

impl NlpServiceClient {
    pub fn new(endpoint: &str, timeout: Duration, max_retries: usize) -> Result<Self> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(PipelineError::ConfigValidationError(format!(
                "Annotator endpoint must be an http(s) URL, got '{}'",
                endpoint
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(NlpServiceClient {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            max_retries: max_retries.max(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends `request` and decodes the JSON reply. Failures are reported against
    /// `document_id` so the operator can find the offending record.
    pub fn post_json<Req, Resp>(&self, document_id: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let mut attempt = 0usize;
        loop {
            debug!(document_id, endpoint = %self.endpoint, attempt, "Sending annotation request");
            match self.client.post(&self.endpoint).json(request).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<Resp>().map_err(|e| PipelineError::AnnotationError {
                            document_id: document_id.to_string(),
                            reason: format!("invalid response from {}: {}", self.endpoint, e),
                        });
                    }
                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(document_id, %status, attempt, "Annotation service busy, retrying");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(PipelineError::AnnotationError {
                        document_id: document_id.to_string(),
                        reason: format!("{} returned {}: {}", self.endpoint, status, body),
                    });
                }
                Err(err) => {
                    if (err.is_connect() || err.is_timeout()) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(document_id, error = %err, attempt, "Annotation request failed, retrying");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(250 * (1 << capped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_endpoint() {
        let result = NlpServiceClient::new("localhost:8501", Duration::from_secs(1), 1);
        assert!(matches!(result, Err(PipelineError::ConfigValidationError(_))));
    }

    #[test]
    fn test_trims_trailing_slash() {
        let client =
            NlpServiceClient::new("http://localhost:8501/annotate/", Duration::from_secs(1), 0)
                .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8501/annotate");
    }

    #[test]
    fn test_retry_policy() {
        assert!(should_retry(StatusCode::SERVICE_UNAVAILABLE));
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(!should_retry(StatusCode::BAD_REQUEST));
        assert!(retry_backoff(2) > retry_backoff(1));
        assert_eq!(retry_backoff(9), retry_backoff(5));
    }
}
