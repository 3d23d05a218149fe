//! Command-line and environment configuration.
//!
//! Every flag can also be set through a `BM_`-prefixed environment
//! variable. Durations use unit suffixes (`500ms`, `5s`, `2m`, `1h`,
//! `1m30s`); a malformed or zero duration aborts startup.

use crate::services::sync_engine::SyncConfig;
use crate::services::teamcity_client::TeamCityClientConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "build-monitor", version, about = "Mirror TeamCity state into a local store")]
pub struct Config {
    /// SQLite database file.
    #[arg(long, env = "BM_DB", default_value = "build-monitor.db")]
    pub db: PathBuf,

    /// TeamCity server URL.
    #[arg(long, env = "BM_TC_URL", default_value = "http://localhost:3031")]
    pub tc_url: String,

    /// TeamCity access token; guest access when unset.
    #[arg(long, env = "BM_TC_TOKEN", hide_env_values = true)]
    pub tc_token: Option<String>,

    /// Poll interval while no build is running.
    #[arg(long, env = "BM_TC_POLL_INTERVAL", default_value = "20s", value_parser = parse_duration)]
    pub tc_poll_interval: Duration,

    /// Poll interval while builds are running.
    #[arg(
        long,
        env = "BM_TC_RUNNING_BUILD_POLL_INTERVAL",
        default_value = "5s",
        value_parser = parse_duration
    )]
    pub tc_running_build_poll_interval: Duration,

    /// Timeout of a single TeamCity request.
    #[arg(long, env = "BM_TC_REQUEST_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub tc_request_timeout: Duration,
}

impl Config {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            idle_interval: self.tc_poll_interval,
            active_interval: self.tc_running_build_poll_interval,
        }
    }

    pub fn client_config(&self) -> TeamCityClientConfig {
        TeamCityClientConfig {
            base_url: self.tc_url.trim_end_matches('/').to_string(),
            token: self.tc_token.clone().filter(|t| !t.is_empty()),
            timeout: self.tc_request_timeout,
        }
    }
}

/// Parse a duration made of `<number><unit>` segments, e.g. `1m30s`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in duration: {}", s))?;
        if digits == 0 {
            return Err(format!("invalid number in duration: {}", s));
        }
        let num: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid number in duration: {}", s))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let segment = match &rest[..unit_len] {
            "ms" => Some(Duration::from_millis(num)),
            "s" => Some(Duration::from_secs(num)),
            "m" => num.checked_mul(60).map(Duration::from_secs),
            "h" => num.checked_mul(3600).map(Duration::from_secs),
            other => return Err(format!("unknown duration unit: {}", other)),
        };
        total = segment
            .and_then(|d| total.checked_add(d))
            .ok_or_else(|| format!("duration out of range: {}", s))?;
        rest = &rest[unit_len..];
    }

    if total.is_zero() {
        return Err(format!("duration must be positive: {}", s));
    }
    Ok(total)
}
