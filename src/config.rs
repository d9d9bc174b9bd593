//! Service configuration.
//!
//! Configuration is loaded from a TOML file with serde defaults for every
//! field, so an empty (or missing) file yields a runnable development
//! configuration. Secrets can be supplied through the environment instead of
//! the file:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `HN_DIGEST_AI_TOKEN` | `ai.api_token` |
//! | `HN_DIGEST_SMTP_PASSWORD` | `email.smtp_password` |

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::session::SessionConfig;

// ============================================================================
// Constants
// ============================================================================

/// Environment variable overriding the AI gateway token.
pub const ENV_AI_TOKEN: &str = "HN_DIGEST_AI_TOKEN";

/// Environment variable overriding the SMTP password.
pub const ENV_SMTP_PASSWORD: &str = "HN_DIGEST_SMTP_PASSWORD";

// ============================================================================
// Config
// ============================================================================

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Browser endpoint and session lifecycle settings.
    pub browser: BrowserConfig,
    /// Scrape target settings.
    pub scrape: ScrapeConfig,
    /// AI completion gateway settings.
    pub ai: AiConfig,
    /// Email delivery settings.
    pub email: EmailConfig,
    /// Scheduled digest settings.
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Loads configuration from a TOML file, then applies environment
    /// overrides for secrets.
    ///
    /// A missing `path` yields the default configuration (environment
    /// overrides still apply).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("cannot read {}: {e}", path.display()))
                })?;
                toml::from_str(&contents)
                    .map_err(|e| Error::config(format!("cannot parse {}: {e}", path.display())))?
            }
            None => Self::default(),
        };

        config.apply_env();
        Ok(config)
    }

    /// Applies environment variable overrides for secrets.
    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(ENV_AI_TOKEN)
            && !token.is_empty()
        {
            self.ai.api_token = Some(token);
        }
        if let Ok(password) = std::env::var(ENV_SMTP_PASSWORD)
            && !password.is_empty()
        {
            self.email.smtp_password = Some(password);
        }
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8787)),
        }
    }
}

// ============================================================================
// BrowserConfig
// ============================================================================

/// Browser endpoint and session lifecycle settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Remote browser endpoint.
    ///
    /// Either a DevTools WebSocket URL (`ws://` / `wss://`) used directly, or
    /// an HTTP base (`http://host:9222`) whose `/json/version` reports the
    /// WebSocket debugger URL.
    pub endpoint: String,

    /// Maximum time to wait for a browser launch.
    pub launch_timeout_secs: u64,

    /// Maximum time to wait for a browser close.
    pub close_timeout_secs: u64,

    /// Maximum time a session is kept alive before the expiry ticker closes
    /// it.
    pub alive_budget_secs: u64,

    /// Interval between expiry ticks.
    pub tick_interval_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9222".to_string(),
            launch_timeout_secs: 30,
            close_timeout_secs: 10,
            alive_budget_secs: 60,
            tick_interval_secs: 10,
        }
    }
}

impl BrowserConfig {
    /// Returns the session lifecycle parameters derived from this config.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            alive_budget: Duration::from_secs(self.alive_budget_secs),
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            launch_timeout: Duration::from_secs(self.launch_timeout_secs),
            close_timeout: Duration::from_secs(self.close_timeout_secs),
        }
    }
}

// ============================================================================
// ScrapeConfig
// ============================================================================

/// Scrape target settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Page to scrape stories from.
    pub url: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            url: "https://news.ycombinator.com".to_string(),
        }
    }
}

// ============================================================================
// AiConfig
// ============================================================================

/// AI completion gateway settings.
///
/// With no `url` configured the completion client reports
/// [`Error::AiCompletion`] and callers fall back to plain output.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Completion endpoint URL. `None` disables AI commentary.
    pub url: Option<String>,

    /// Model identifier sent with each completion request.
    pub model: String,

    /// Bearer token for the gateway, if required.
    pub api_token: Option<String>,

    /// Gateway cache TTL in seconds, sent as a request header.
    pub cache_ttl_secs: u32,

    /// Request timeout.
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            url: None,
            model: "@cf/meta/llama-3.3-70b-instruct-fp8-fast".to_string(),
            api_token: None,
            cache_ttl_secs: 3360,
            request_timeout_secs: 60,
        }
    }
}

// ============================================================================
// EmailConfig
// ============================================================================

/// Email delivery settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// SMTP relay host.
    pub smtp_host: String,

    /// SMTP relay port (STARTTLS).
    pub smtp_port: u16,

    /// SMTP username, if the relay requires authentication.
    pub smtp_username: Option<String>,

    /// SMTP password, if the relay requires authentication.
    pub smtp_password: Option<String>,

    /// Sender mailbox, e.g. `HN Digest <digest@example.com>`.
    pub from: String,

    /// Recipient mailbox.
    pub to: String,

    /// Digest email subject line.
    pub subject: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "127.0.0.1".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from: "HN Digest <digest@localhost>".to_string(),
            to: "inbox@localhost".to_string(),
            subject: "Top 10 Hacker News Stories".to_string(),
        }
    }
}

// ============================================================================
// ScheduleConfig
// ============================================================================

/// Scheduled digest settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Whether the scheduled digest pipeline runs at all.
    pub enabled: bool,

    /// Seconds between scheduled digest runs.
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 86_400,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.browser.alive_budget_secs, 60);
        assert_eq!(config.browser.tick_interval_secs, 10);
        assert_eq!(config.scrape.url, "https://news.ycombinator.com");
        assert_eq!(config.ai.cache_ttl_secs, 3360);
        assert!(!config.schedule.enabled);
    }

    #[test]
    fn test_load_missing_path_yields_defaults() {
        let config = Config::load(None).expect("load");
        assert_eq!(config.email.subject, "Top 10 Hacker News Stories");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[browser]
endpoint = "ws://browser.internal:3000"
alive_budget_secs = 120

[schedule]
enabled = true
interval_secs = 3600
"#
        )
        .expect("write");

        let config = Config::load(Some(file.path())).expect("load");
        assert_eq!(config.browser.endpoint, "ws://browser.internal:3000");
        assert_eq!(config.browser.alive_budget_secs, 120);
        // Unset fields keep their defaults.
        assert_eq!(config.browser.tick_interval_secs, 10);
        assert!(config.schedule.enabled);
        assert_eq!(config.schedule.interval_secs, 3600);
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "not valid toml [[[").expect("write");

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_session_config_conversion() {
        let browser = BrowserConfig::default();
        let session = browser.session_config();
        assert_eq!(session.alive_budget, Duration::from_secs(60));
        assert_eq!(session.tick_interval, Duration::from_secs(10));
    }
}
