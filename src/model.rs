use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 50;
pub const MAX_URL_LEN: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Http,
    Https,
}

fn default_kind() -> ProbeKind {
    ProbeKind::Https
}

/// Outcome classification of a single probe. Never "unknown" — that state
/// belongs only to a target that has not been checked yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Up,
    Degraded,
    Down,
}

impl From<ProbeStatus> for HealthStatus {
    fn from(status: ProbeStatus) -> Self {
        match status {
            ProbeStatus::Up => HealthStatus::Up,
            ProbeStatus::Degraded => HealthStatus::Degraded,
            ProbeStatus::Down => HealthStatus::Down,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Up => "up",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Down => "down",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    NameResolution,
    ConnectionRefused,
    Other,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::Timeout => "timeout",
            FailureReason::NameResolution => "name resolution failed",
            FailureReason::ConnectionRefused => "connection refused",
            FailureReason::Other => "request failed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    #[serde(default = "generate_uuid")]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub url: String,
    #[serde(default = "default_kind")]
    pub kind: ProbeKind,
    #[serde(default = "default_interval")]
    pub interval_minutes: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_interval() -> u32 {
    5
}

fn default_active() -> bool {
    true
}

fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

impl Target {
    pub fn new(owner_id: &str, name: &str, url: &str, kind: ProbeKind, interval_minutes: u32) -> Self {
        Self {
            id: generate_uuid(),
            owner_id: owner_id.to_string(),
            name: name.trim().to_string(),
            url: url.trim().to_string(),
            kind,
            interval_minutes,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Address the probe actually requests: the configured url, prefixed
    /// with a scheme matching the probe kind when none is present.
    pub fn probe_url(&self) -> String {
        if self.url.contains("://") {
            return self.url.clone();
        }
        match self.kind {
            ProbeKind::Http => format!("http://{}", self.url),
            ProbeKind::Https => format!("https://{}", self.url),
        }
    }

    /// Rejects malformed definitions before they ever reach the scheduler.
    pub fn validate(&self) -> Result<(), TargetValidationError> {
        if self.name.trim().is_empty() {
            return Err(TargetValidationError::EmptyName);
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(TargetValidationError::NameTooLong);
        }
        if self.url.trim().is_empty() {
            return Err(TargetValidationError::EmptyUrl);
        }
        if self.url.len() > MAX_URL_LEN {
            return Err(TargetValidationError::UrlTooLong);
        }
        url::Url::parse(&self.probe_url()).map_err(TargetValidationError::InvalidUrl)?;
        if self.interval_minutes < 1 {
            return Err(TargetValidationError::IntervalTooShort);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TargetValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("name exceeds {MAX_NAME_LEN} characters")]
    NameTooLong,
    #[error("url must not be empty")]
    EmptyUrl,
    #[error("url exceeds {MAX_URL_LEN} characters")]
    UrlTooLong,
    #[error("invalid url: {0}")]
    InvalidUrl(url::ParseError),
    #[error("check interval must be at least one minute")]
    IntervalTooShort,
}

/// Outcome of one health check. Ephemeral: produced by the prober, folded
/// into `TargetStats` and returned to manual-check callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    /// Elapsed time of the attempt, recorded even on failure.
    pub latency_ms: u64,
    pub status_code: Option<u16>,
    pub reason: Option<FailureReason>,
    pub checked_at: DateTime<Utc>,
}

/// Compact persisted form of a probe result. The failure reason is dropped
/// to bound the size of stored history entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub checked_at: DateTime<Utc>,
    pub status: ProbeStatus,
    pub latency_ms: u64,
    pub status_code: Option<u16>,
}

impl From<&ProbeResult> for HistoryEntry {
    fn from(result: &ProbeResult) -> Self {
        Self {
            checked_at: result.checked_at,
            status: result.status,
            latency_ms: result.latency_ms,
            status_code: result.status_code,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlertConfig {
    pub enabled: bool,
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "generate_uuid")]
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub template: Option<String>,
    pub enabled: bool,
}
