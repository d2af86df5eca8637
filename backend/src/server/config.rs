//! Environment-derived server configuration.

use std::env;

use crate::webhooks::worker::DEFAULT_MAX_ATTEMPTS;

/// Runtime knobs read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface the HTTP server binds to.
    pub bind_addr: String,
    /// TCP port (`PORT`, default 8080).
    pub port: u16,
    /// Webhook attempt cap before dead-lettering (`WEBHOOK_MAX_ATTEMPTS`).
    pub webhook_max_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_owned(),
            port: 8080,
            webhook_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_owned(),
            port: parse_port(env::var("PORT").ok()),
            webhook_max_attempts: parse_max_attempts(env::var("WEBHOOK_MAX_ATTEMPTS").ok()),
        }
    }
}

fn parse_port(value: Option<String>) -> u16 {
    value
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(8080)
}

fn parse_max_attempts(value: Option<String>) -> u32 {
    value
        .and_then(|raw| raw.trim().parse().ok())
        .filter(|parsed| *parsed > 0)
        .unwrap_or(DEFAULT_MAX_ATTEMPTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, 8080)]
    #[case(Some("9090".to_owned()), 9090)]
    #[case(Some("not-a-port".to_owned()), 8080)]
    fn port_parsing(#[case] value: Option<String>, #[case] expected: u16) {
        assert_eq!(parse_port(value), expected);
    }

    #[rstest]
    #[case(None, DEFAULT_MAX_ATTEMPTS)]
    #[case(Some("3".to_owned()), 3)]
    #[case(Some("0".to_owned()), DEFAULT_MAX_ATTEMPTS)]
    #[case(Some("lots".to_owned()), DEFAULT_MAX_ATTEMPTS)]
    fn attempt_cap_parsing(#[case] value: Option<String>, #[case] expected: u32) {
        assert_eq!(parse_max_attempts(value), expected);
    }
}
