use std::{path::Path, str::FromStr};

use hifitime::prelude::Duration;
use serde::Deserialize;

use crate::error::Error;

/// Standard NTRIP caster port
pub const DEFAULT_PORT: u16 = 2101;

/// Default position report period, in seconds
pub const DEFAULT_UPLINK_PERIOD_S: f64 = 30.0;

/// Default TCP connection and caster response timeout, in seconds
pub const DEFAULT_CONNECT_TIMEOUT_S: f64 = 10.0;

/// Default silence tolerated on a streaming connection, in seconds
pub const DEFAULT_STREAM_TIMEOUT_S: f64 = 60.0;

/// [SessionConfig] is created once per session and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Caster host name or IP address
    pub host: String,

    /// Caster port
    pub port: u16,

    /// Mountpoint (correction feed)
    pub mountpoint: String,

    /// Caster user name
    pub username: String,

    /// Caster password
    pub password: String,

    /// Position report period
    pub uplink_period: Duration,

    /// Bounds TCP connection and caster response
    pub connect_timeout: Duration,

    /// Maximal silence on a streaming connection
    pub stream_timeout: Duration,

    /// User-Agent identifier
    pub user_agent: String,
}

/// JSON description of a [SessionConfig]. Durations are readable
/// text like `"30 s"` or `"1 min"`.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    host: String,
    port: Option<u16>,
    mountpoint: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    uplink_period: Option<String>,
    connect_timeout: Option<String>,
    stream_timeout: Option<String>,
    user_agent: Option<String>,
}

fn parse_duration(field: &str, value: Option<&str>, default_s: f64) -> Result<Duration, Error> {
    match value {
        Some(value) => Duration::from_str(value.trim())
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", field, e))),
        None => Ok(Duration::from_seconds(default_s)),
    }
}

impl SessionConfig {
    /// Builds a new [SessionConfig] with default port, timeouts,
    /// anonymous credentials and a 30s uplink period.
    pub fn new(host: &str, mountpoint: &str) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_PORT,
            mountpoint: mountpoint.to_string(),
            username: Default::default(),
            password: Default::default(),
            uplink_period: Duration::from_seconds(DEFAULT_UPLINK_PERIOD_S),
            connect_timeout: Duration::from_seconds(DEFAULT_CONNECT_TIMEOUT_S),
            stream_timeout: Duration::from_seconds(DEFAULT_STREAM_TIMEOUT_S),
            user_agent: format!(
                "NTRIP {}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ),
        }
    }

    /// Copies and returns [SessionConfig] with updated port
    pub fn with_port(&self, port: u16) -> Self {
        let mut s = self.clone();
        s.port = port;
        s
    }

    /// Copies and returns [SessionConfig] with caster credentials
    pub fn with_credentials(&self, username: &str, password: &str) -> Self {
        let mut s = self.clone();
        s.username = username.to_string();
        s.password = password.to_string();
        s
    }

    /// Copies and returns [SessionConfig] with updated uplink period
    pub fn with_uplink_period(&self, period: Duration) -> Self {
        let mut s = self.clone();
        s.uplink_period = period;
        s
    }

    /// Copies and returns [SessionConfig] with updated connection timeout
    pub fn with_connect_timeout(&self, timeout: Duration) -> Self {
        let mut s = self.clone();
        s.connect_timeout = timeout;
        s
    }

    /// Copies and returns [SessionConfig] with updated stream timeout
    pub fn with_stream_timeout(&self, timeout: Duration) -> Self {
        let mut s = self.clone();
        s.stream_timeout = timeout;
        s
    }

    /// Copies and returns [SessionConfig] with custom User-Agent
    pub fn with_user_agent(&self, user_agent: &str) -> Self {
        let mut s = self.clone();
        s.user_agent = user_agent.to_string();
        s
    }

    /// Verifies this [SessionConfig] may be used to deploy a session.
    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("empty host".to_string()));
        }

        if self.mountpoint.trim_start_matches('/').trim().is_empty() {
            return Err(Error::InvalidConfig("empty mountpoint".to_string()));
        }

        for (name, dt) in [
            ("uplink period", self.uplink_period),
            ("connection timeout", self.connect_timeout),
            ("stream timeout", self.stream_timeout),
        ] {
            if dt.total_nanoseconds() <= 0 {
                return Err(Error::InvalidConfig(format!("{} must be positive", name)));
            }
        }

        Ok(())
    }

    /// Parses a [SessionConfig] from JSON content.
    pub fn from_json(content: &str) -> Result<Self, Error> {
        let file: ConfigFile = serde_json::from_str(content)?;

        let mut cfg = Self::new(&file.host, &file.mountpoint)
            .with_port(file.port.unwrap_or(DEFAULT_PORT))
            .with_credentials(&file.username, &file.password);

        cfg.uplink_period = parse_duration(
            "uplink_period",
            file.uplink_period.as_deref(),
            DEFAULT_UPLINK_PERIOD_S,
        )?;

        cfg.connect_timeout = parse_duration(
            "connect_timeout",
            file.connect_timeout.as_deref(),
            DEFAULT_CONNECT_TIMEOUT_S,
        )?;

        cfg.stream_timeout = parse_duration(
            "stream_timeout",
            file.stream_timeout.as_deref(),
            DEFAULT_STREAM_TIMEOUT_S,
        )?;

        if let Some(user_agent) = &file.user_agent {
            cfg.user_agent = user_agent.to_string();
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads a [SessionConfig] from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
