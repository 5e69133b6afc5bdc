//! Sequential HTTP load driver.
//!
//! Requests are sent one after another, never concurrently. Under the
//! strict policy (`min_success_ratio >= 1.0`) the first non-200 response or
//! transport failure ends the run with [`VerifierError::LoadRequest`].
//! Otherwise every request is sent and the success ratio is checked at the
//! end.

use std::time::Instant;

use metrics::counter;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use deploycheck_core::config::LoadConfig;
use deploycheck_core::metrics::{LABEL_RESULT, LOAD_REQUESTS_TOTAL};

use crate::error::VerifierError;
use crate::http::HttpProbe;

const EXPECTED_STATUS: u16 = 200;

/// How many requests to send and how many must succeed.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPolicy {
    pub requests: u32,
    pub min_success_ratio: f64,
}

impl LoadPolicy {
    pub fn from_config(config: &LoadConfig) -> Self {
        Self {
            requests: config.requests,
            min_success_ratio: config.min_success_ratio,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.min_success_ratio >= 1.0
    }
}

/// One failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    pub index: u32,
    pub detail: String,
}

/// Outcome of a completed load run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub sent: u32,
    pub succeeded: u32,
    pub failures: Vec<LoadFailure>,
    pub elapsed_ms: u64,
}

impl LoadReport {
    pub fn success_ratio(&self) -> f64 {
        if self.sent == 0 {
            1.0
        } else {
            f64::from(self.succeeded) / f64::from(self.sent)
        }
    }
}

/// Request body: `{"text": <prompt>}`.
pub fn request_body(prompt: &str) -> serde_json::Value {
    serde_json::json!({ "text": prompt })
}

/// Sends `policy.requests` sequential POSTs of `body` to `url`.
pub async fn run_load<P: HttpProbe>(
    probe: &P,
    url: &str,
    body: &serde_json::Value,
    policy: &LoadPolicy,
    cancel: &CancellationToken,
) -> Result<LoadReport, VerifierError> {
    let started = Instant::now();
    let mut succeeded = 0u32;
    let mut failures = Vec::new();

    info!(url, requests = policy.requests, strict = policy.is_strict(), "starting load");

    for index in 0..policy.requests {
        if cancel.is_cancelled() {
            return Err(VerifierError::Cancelled(format!(
                "load request {index} of {}",
                policy.requests
            )));
        }

        let detail = match probe.post_json(url, body).await {
            Ok(EXPECTED_STATUS) => None,
            Ok(status) => Some(format!("status {status}")),
            Err(e) => Some(e.to_string()),
        };

        match detail {
            None => {
                succeeded += 1;
                counter!(LOAD_REQUESTS_TOTAL, LABEL_RESULT => "success").increment(1);
            }
            Some(detail) => {
                counter!(LOAD_REQUESTS_TOTAL, LABEL_RESULT => "failure").increment(1);
                warn!(index, detail = %detail, "load request failed");
                if policy.is_strict() {
                    return Err(VerifierError::LoadRequest { index, detail });
                }
                failures.push(LoadFailure { index, detail });
            }
        }
    }

    let report = LoadReport {
        sent: policy.requests,
        succeeded,
        failures,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };

    if report.success_ratio() < policy.min_success_ratio {
        return Err(VerifierError::LoadThreshold {
            succeeded: report.succeeded,
            sent: report.sent,
            required: policy.min_success_ratio,
        });
    }

    info!(
        sent = report.sent,
        succeeded = report.succeeded,
        elapsed_ms = report.elapsed_ms,
        "load finished"
    );
    Ok(report)
}
