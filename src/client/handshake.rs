use base64::{Engine as _, engine::general_purpose};

use crate::config::SessionConfig;

/// NTRIP (HTTP-style) stream request
#[derive(Debug, Clone, PartialEq)]
pub struct Request<'a> {
    mountpoint: &'a str,
    user_agent: &'a str,
    username: &'a str,
    password: &'a str,
}

impl<'a> Request<'a> {
    pub fn new(cfg: &'a SessionConfig) -> Self {
        Self {
            mountpoint: cfg.mountpoint.trim_start_matches('/'),
            user_agent: &cfg.user_agent,
            username: &cfg.username,
            password: &cfg.password,
        }
    }

    /// base64(username:password)
    pub fn authorization(&self) -> String {
        general_purpose::STANDARD.encode(format!("{}:{}", self.username, self.password))
    }
}

impl std::fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GET /{} HTTP/1.1\r\nUser-Agent: {}\r\nAuthorization: Basic {}\r\n\r\n",
            self.mountpoint,
            self.user_agent,
            self.authorization(),
        )
    }
}

/// True if caster status line holds the `200` status token.
/// Covers both `HTTP/1.x 200 OK` and `ICY 200 OK`. A source table
/// is returned on unknown mountpoints and is not a correction stream.
pub fn is_success(status: &str) -> bool {
    if status.trim_start().starts_with("SOURCETABLE") {
        return false;
    }
    status.split_whitespace().any(|token| token == "200")
}
