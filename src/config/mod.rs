// src/config/mod.rs
//! Service configuration: one TOML (or JSON) file, located via env var with
//! repo-local fallbacks, sanitized on load.

pub mod captions;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::harvest::RetryPolicy;
use crate::media::WatermarkPlacement;
use crate::source::http::TransportPolicy;

pub use captions::CaptionConfig;

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/relay.toml";
pub const DEFAULT_JSON_PATH: &str = "config/relay.json";

const DEFAULT_WINDOW_HOURS: i64 = 48;
const DEFAULT_INTERVAL_HOURS: u64 = 48;
/// Upper bound for both the window and the interval (ten years).
const MAX_HOURS: u64 = 24 * 365 * 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    pub dataset_root: PathBuf,
    pub accounts: Vec<String>,
    /// Trailing harvest window.
    pub window_hours: i64,
    /// Spacing between harvest cycles.
    pub interval_hours: u64,
    pub logo_path: PathBuf,
    pub bind_addr: String,
    /// Fixed seed for reproducible picks and jitter; random when absent.
    pub rng_seed: Option<u64>,
    pub retry: RetryConfig,
    pub source: SourceConfig,
    pub captions: CaptionConfig,
    pub host: HostConfig,
    pub watermark: WatermarkConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("instagram_posts"),
            accounts: vec!["uncover.ai".to_string()],
            window_hours: DEFAULT_WINDOW_HOURS,
            interval_hours: DEFAULT_INTERVAL_HOURS,
            logo_path: PathBuf::from("logos/logo.png"),
            bind_addr: "0.0.0.0:8000".to_string(),
            rng_seed: None,
            retry: RetryConfig::default(),
            source: SourceConfig::default(),
            captions: CaptionConfig::default(),
            host: HostConfig::default(),
            watermark: WatermarkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub pre_attempt_delay_secs: [u64; 2],
    pub backoff_delay_secs: [u64; 2],
    pub account_delay_secs: [u64; 2],
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            pre_attempt_delay_secs: [2, 5],
            backoff_delay_secs: [10, 30],
            account_delay_secs: [5, 10],
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let range = |[lo, hi]: [u64; 2]| Duration::from_secs(lo)..=Duration::from_secs(hi);
        RetryPolicy {
            max_attempts: self.max_attempts,
            pre_attempt_delay: range(self.pre_attempt_delay_secs),
            backoff_delay: range(self.backoff_delay_secs),
            account_delay: range(self.account_delay_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    #[serde(flatten)]
    pub transport: TransportPolicy,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            transport: TransportPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostConfig {
    pub upload_url: String,
    pub timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            upload_url: "https://tmpfiles.org/api/v1/upload".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatermarkConfig {
    pub size: u32,
    pub margin: u32,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            size: 200,
            margin: 10,
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
        }
    }
}

impl WatermarkConfig {
    pub fn placement(&self) -> WatermarkPlacement {
        WatermarkPlacement {
            size: self.size,
            margin: self.margin,
        }
    }
}

impl RelayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }

    /// Load from an explicit path. `.json` is parsed as JSON, anything else as TOML.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: RelayConfig = if ext == "json" {
            serde_json::from_str(&content).context("parsing json config")?
        } else {
            toml::from_str(&content).context("parsing toml config")?
        };
        cfg.finish()
    }

    /// Load using env var + fallbacks:
    /// 1) $RELAY_CONFIG_PATH
    /// 2) config/relay.toml
    /// 3) config/relay.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Self::default().finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.sanitize();
        self.captions = self.captions.resolved()?;
        Ok(self)
    }

    fn sanitize(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.accounts = std::mem::take(&mut self.accounts)
            .into_iter()
            .map(|a| a.trim().trim_start_matches('@').to_string())
            .filter(|a| !a.is_empty() && seen.insert(a.clone()))
            .collect();

        if self.window_hours <= 0 {
            self.window_hours = DEFAULT_WINDOW_HOURS;
        }
        self.window_hours = self.window_hours.min(MAX_HOURS as i64);
        if self.interval_hours == 0 {
            self.interval_hours = DEFAULT_INTERVAL_HOURS;
        }
        self.interval_hours = self.interval_hours.min(MAX_HOURS);
        if self.retry.max_attempts == 0 {
            self.retry.max_attempts = RetryConfig::default().max_attempts;
        }
        for r in [
            &mut self.retry.pre_attempt_delay_secs,
            &mut self.retry.backoff_delay_secs,
            &mut self.retry.account_delay_secs,
        ] {
            if r[0] > r[1] {
                r.swap(0, 1);
            }
        }
        if self.watermark.size == 0 {
            self.watermark.size = WatermarkConfig::default().size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_and_sanitizes() {
        let raw = r#"
accounts = [" @acctA ", "acctB", "", "acctA"]
window_hours = -3
interval_hours = 0

[retry]
max_attempts = 0
backoff_delay_secs = [30, 10]

[source]
base_url = "http://src.local"
proxy = "http://proxy.local:3128"
accept_invalid_certs = true

[watermark]
size = 150
"#;
        let mut cfg: RelayConfig = toml::from_str(raw).unwrap();
        cfg.sanitize();
        assert_eq!(cfg.accounts, vec!["acctA".to_string(), "acctB".to_string()]);
        assert_eq!(cfg.window_hours, 48);
        assert_eq!(cfg.interval_hours, 48);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.backoff_delay_secs, [10, 30]);
        assert_eq!(cfg.source.base_url, "http://src.local");
        assert_eq!(cfg.source.transport.proxy.as_deref(), Some("http://proxy.local:3128"));
        assert!(cfg.source.transport.accept_invalid_certs);
        assert_eq!(cfg.watermark.placement().size, 150);
        assert_eq!(cfg.watermark.placement().margin, 10);
    }

    #[test]
    fn oversized_hours_are_clamped() {
        let mut cfg = RelayConfig {
            window_hours: 100_000_000_000,
            interval_hours: u64::MAX,
            ..RelayConfig::default()
        };
        cfg.sanitize();
        assert_eq!(cfg.window_hours, MAX_HOURS as i64);
        assert_eq!(cfg.interval_hours, MAX_HOURS);
        assert_eq!(cfg.interval(), Duration::from_secs(MAX_HOURS * 3600));
    }

    #[test]
    fn retry_config_maps_to_policy() {
        let p = RetryConfig::default().policy();
        assert_eq!(p, RetryPolicy::default());
    }

    #[test]
    fn interval_is_hours() {
        let cfg = RelayConfig {
            interval_hours: 2,
            ..RelayConfig::default()
        };
        assert_eq!(cfg.interval(), Duration::from_secs(7200));
    }
}
