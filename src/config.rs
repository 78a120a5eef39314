use crate::model::AlertConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunables of the monitoring engine. Every field has a serde default so a
/// hand-written config file only needs the values it wants to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_slow_threshold")]
    pub slow_threshold_ms: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_retention_sweep_interval")]
    pub retention_sweep_interval_secs: u64,
    #[serde(default = "default_flush_every")]
    pub flush_every: u32,
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_warmup_delay() -> u64 {
    10
}

fn default_batch_size() -> usize {
    3
}

fn default_batch_delay() -> u64 {
    2000
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_slow_threshold() -> u64 {
    5000
}

// 24 hours of history at the default 5 minute cadence.
fn default_history_capacity() -> usize {
    288
}

fn default_retention_days() -> i64 {
    30
}

// Weekly.
fn default_retention_sweep_interval() -> u64 {
    7 * 24 * 3600
}

fn default_flush_every() -> u32 {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            warmup_delay_secs: default_warmup_delay(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay(),
            probe_timeout_secs: default_probe_timeout(),
            slow_threshold_ms: default_slow_threshold(),
            history_capacity: default_history_capacity(),
            retention_days: default_retention_days(),
            retention_sweep_interval_secs: default_retention_sweep_interval(),
            flush_every: default_flush_every(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub alert: AlertConfig,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_store_path() -> String {
    "targets.json".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            store_path: default_store_path(),
            monitor: MonitorConfig::default(),
            alert: AlertConfig::default(),
        }
    }
}

pub fn load_config(path: &str) -> anyhow::Result<AppConfig> {
    if !Path::new(path).exists() {
        tracing::info!("Config file not found, creating default.");
        let defaults = AppConfig::default();
        save_config(path, &defaults)?;
        return Ok(defaults);
    }

    let content = fs::read_to_string(path).context("Failed to read config file")?;
    serde_json::from_str::<AppConfig>(&content).context("Failed to parse config file")
}

pub fn save_config(path: &str, config: &AppConfig) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    let tmp_file = format!("{}.tmp", path);
    fs::write(&tmp_file, content).context("Failed to write temp config file")?;
    fs::rename(&tmp_file, path).context("Failed to replace config file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_design_values() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.sweep_interval_secs, 300);
        assert_eq!(cfg.batch_size, 3);
        assert_eq!(cfg.batch_delay_ms, 2000);
        assert_eq!(cfg.probe_timeout_secs, 10);
        assert_eq!(cfg.slow_threshold_ms, 5000);
        assert_eq!(cfg.history_capacity, 288);
        assert_eq!(cfg.retention_days, 30);
        assert_eq!(cfg.retention_sweep_interval_secs, 604_800);
    }

    #[test]
    fn partial_config_files_fall_back_to_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{ "monitor": { "batch_size": 10 } }"#).unwrap();
        assert_eq!(cfg.monitor.batch_size, 10);
        assert_eq!(cfg.monitor.sweep_interval_secs, 300);
        assert_eq!(cfg.bind_addr, "0.0.0.0:3000");
        assert!(!cfg.alert.enabled);
    }

    #[test]
    fn load_creates_a_default_file_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let path = path.to_str().unwrap();

        let cfg = load_config(path).unwrap();
        assert_eq!(cfg.monitor.batch_size, 3);
        assert!(Path::new(path).exists());

        // A second load reads the file it just wrote.
        let reloaded = load_config(path).unwrap();
        assert_eq!(reloaded.store_path, cfg.store_path);
    }
}
