//! HTTP client abstraction used by the load driver.

use std::future::Future;
use std::time::Duration;

use reqwest::header::ACCEPT;
use tracing::debug;

use crate::error::VerifierError;

/// Sends one JSON POST and reports the response status.
///
/// Transport failures (connect, timeout, body read) are errors; any HTTP
/// status, including 5xx, is a successful probe.
pub trait HttpProbe: Send + Sync {
    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> impl Future<Output = Result<u16, VerifierError>> + Send;
}

/// Production probe backed by `reqwest`.
///
/// `timeout` bounds each wait separately: connecting, receiving the
/// response head, and every gap between body chunks. A streaming response
/// may take longer than `timeout` in total as long as it keeps sending.
#[derive(Debug, Clone)]
pub struct ReqwestProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestProbe {
    pub fn new(timeout: Duration) -> Result<Self, VerifierError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| VerifierError::Http(format!("failed to build http client: {e}")))?;
        Ok(Self { client, timeout })
    }
}

impl HttpProbe for ReqwestProbe {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16, VerifierError> {
        let response = self
            .client
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .json(body)
            .send();
        let mut response = tokio::time::timeout(self.timeout, response)
            .await
            .map_err(|_| {
                VerifierError::Http(format!("no response within {:?}", self.timeout))
            })?
            .map_err(|e| VerifierError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        // drain the stream so the request counts as complete
        let mut body_bytes = 0usize;
        loop {
            let chunk = tokio::time::timeout(self.timeout, response.chunk())
                .await
                .map_err(|_| {
                    VerifierError::Http(format!(
                        "response body stalled for {:?} after {body_bytes} bytes",
                        self.timeout
                    ))
                })?
                .map_err(|e| VerifierError::Http(format!("reading response body: {e}")))?;
            match chunk {
                Some(chunk) => body_bytes += chunk.len(),
                None => break,
            }
        }
        debug!(url, status, body_bytes, "request finished");
        Ok(status)
    }
}
