use crate::model::{FailureReason, ProbeResult, ProbeStatus, Target};
use async_trait::async_trait;
use chrono::Utc;
use std::time::{Duration, Instant};

const USER_AGENT: &str = "upwatch/0.1.0";

/// A probe strategy. The scheduler only sees this trait, so protocol
/// implementations and test doubles are interchangeable.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Perform one check. Never fails: every transport error is captured
    /// as a down result with a classified reason.
    async fn execute(&self, target: &Target) -> ProbeResult;
}

/// GET-based prober for http/https targets.
pub struct HttpProbe {
    client: reqwest::Client,
    slow_threshold_ms: u64,
}

impl HttpProbe {
    pub fn new(timeout: Duration, slow_threshold_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            slow_threshold_ms,
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn execute(&self, target: &Target) -> ProbeResult {
        let url = target.probe_url();
        let start = Instant::now();

        match self.client.get(&url).send().await {
            Ok(res) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let code = res.status().as_u16();
                ProbeResult {
                    status: classify(code, latency_ms, self.slow_threshold_ms),
                    latency_ms,
                    status_code: Some(code),
                    reason: None,
                    checked_at: Utc::now(),
                }
            }
            Err(e) => ProbeResult {
                status: ProbeStatus::Down,
                latency_ms: start.elapsed().as_millis() as u64,
                status_code: None,
                reason: Some(classify_failure(&e)),
                checked_at: Utc::now(),
            },
        }
    }
}

/// Classification for responses that made it to the protocol level.
/// Any status code is a valid response; the classification, not request
/// failure, encodes protocol-level problems. A slow response downgrades an
/// otherwise healthy result but never overrides down.
pub fn classify(status_code: u16, latency_ms: u64, slow_threshold_ms: u64) -> ProbeStatus {
    if status_code >= 500 {
        ProbeStatus::Down
    } else if status_code >= 400 {
        ProbeStatus::Degraded
    } else if latency_ms > slow_threshold_ms {
        ProbeStatus::Degraded
    } else {
        ProbeStatus::Up
    }
}

fn classify_failure(err: &reqwest::Error) -> FailureReason {
    if err.is_timeout() {
        return FailureReason::Timeout;
    }

    // reqwest wraps the interesting cause several layers deep.
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return FailureReason::ConnectionRefused,
                std::io::ErrorKind::TimedOut => return FailureReason::Timeout,
                _ => {}
            }
        }
        let text = inner.to_string();
        if text.contains("dns") || text.contains("lookup") || text.contains("resolve") {
            return FailureReason::NameResolution;
        }
        if text.contains("Connection refused") {
            return FailureReason::ConnectionRefused;
        }
        source = inner.source();
    }

    FailureReason::Other
}
