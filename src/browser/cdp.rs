//! Remote DevTools (CDP) implementation of the browser capability traits.
//!
//! The launcher connects to a remote browser endpoint (a hosted
//! browser-rendering service or a locally started headless browser). The
//! endpoint is either a DevTools WebSocket URL used directly, or an HTTP
//! base whose `/json/version` endpoint reports the WebSocket debugger URL.
//!
//! Pages are DevTools targets: `open_page` creates and attaches a target,
//! `close` tears the whole browser connection down.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::config::BrowserConfig;
use crate::error::{Error, Result};
use crate::transport::Connection;

use super::{BrowserHandle, Launcher, Page};

// ============================================================================
// Constants
// ============================================================================

/// Timeout for the `/json/version` discovery request.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a page load after navigation is accepted.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Wire Types
// ============================================================================

/// Relevant subset of the `/json/version` payload.
#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

// ============================================================================
// CdpLauncher
// ============================================================================

/// Launcher connecting to a remote DevTools endpoint.
pub struct CdpLauncher {
    /// Configured endpoint (`ws(s)://` or `http(s)://`).
    endpoint: Url,
    /// HTTP client used for WebSocket URL discovery.
    http: reqwest::Client,
}

impl CdpLauncher {
    /// Creates a launcher for the configured browser endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint is not a valid URL or the
    /// HTTP client cannot be built.
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| Error::config(format!("invalid browser endpoint: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(DISCOVERY_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self { endpoint, http })
    }

    /// Resolves the DevTools WebSocket URL for the configured endpoint.
    async fn resolve_ws_url(&self) -> Result<String> {
        match self.endpoint.scheme() {
            "ws" | "wss" => Ok(self.endpoint.to_string()),
            "http" | "https" => {
                let version_url = self
                    .endpoint
                    .join("/json/version")
                    .map_err(|e| Error::config(format!("invalid browser endpoint: {e}")))?;

                let info: VersionInfo = self
                    .http
                    .get(version_url.clone())
                    .send()
                    .await
                    .map_err(|e| Error::connection(e.to_string()))?
                    .error_for_status()
                    .map_err(|e| Error::connection(e.to_string()))?
                    .json()
                    .await
                    .map_err(|e| Error::connection(e.to_string()))?;

                debug!(url = %info.web_socket_debugger_url, "Discovered DevTools WebSocket URL");
                Ok(info.web_socket_debugger_url)
            }
            other => Err(Error::config(format!(
                "unsupported browser endpoint scheme: {other}"
            ))),
        }
    }
}

#[async_trait]
impl Launcher for CdpLauncher {
    type Handle = CdpBrowser;

    async fn launch(&self) -> Result<CdpBrowser> {
        let ws_url = self.resolve_ws_url().await?;
        let connection = Connection::connect(&ws_url).await?;

        Ok(CdpBrowser { connection })
    }
}

// ============================================================================
// CdpBrowser
// ============================================================================

/// A live connection to a remote browser instance.
pub struct CdpBrowser {
    connection: Connection,
}

#[async_trait]
impl BrowserHandle for CdpBrowser {
    type Page = CdpPage;

    fn is_alive(&self) -> bool {
        !self.connection.is_closed()
    }

    async fn open_page(&self) -> Result<CdpPage> {
        // Create a fresh target and attach to it in flat mode so page
        // commands can be addressed by session id.
        let created = self
            .connection
            .send(
                "Target.createTarget",
                Some(json!({"url": "about:blank"})),
                None,
            )
            .await?;
        let target_id = required_string(&created, "targetId")?;

        let attached = self
            .connection
            .send(
                "Target.attachToTarget",
                Some(json!({"targetId": target_id, "flatten": true})),
                None,
            )
            .await?;
        let session_id = required_string(&attached, "sessionId")?;

        self.connection
            .send("Page.enable", None, Some(&session_id))
            .await?;

        debug!(%target_id, %session_id, "Page opened");

        Ok(CdpPage {
            connection: self.connection.clone(),
            target_id,
            session_id,
        })
    }

    async fn close(&self) -> Result<()> {
        // Best-effort: ask the browser to close, then drop the transport.
        // The handle is considered gone regardless of the outcome.
        let result = self.connection.send("Browser.close", None, None).await;
        self.connection.shutdown();

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_connection_error() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// CdpPage
// ============================================================================

/// A single DevTools target treated as one page.
pub struct CdpPage {
    connection: Connection,
    target_id: String,
    session_id: String,
}

#[async_trait]
impl Page for CdpPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        // Watch for the load event before issuing the command so a fast
        // load cannot slip past the watcher.
        let load = self
            .connection
            .watch_event("Page.loadEventFired", Some(&self.session_id));

        let reply = self
            .connection
            .send(
                "Page.navigate",
                Some(json!({"url": url})),
                Some(&self.session_id),
            )
            .await
            .map_err(|e| match e {
                Error::Protocol { message } => Error::navigation(url, message),
                other => other,
            })?;

        if let Some(error_text) = reply.get("errorText").and_then(Value::as_str)
            && !error_text.is_empty()
        {
            return Err(Error::navigation(url, error_text));
        }

        match load.wait(NAVIGATION_TIMEOUT).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_timeout() => Err(Error::navigation(url, "page load timed out")),
            Err(e) => Err(e),
        }
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let reply = self
            .connection
            .send(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
                Some(&self.session_id),
            )
            .await?;

        if let Some(exception) = reply.get("exceptionDetails") {
            let text = exception
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or("script threw an exception");
            return Err(Error::extraction(text));
        }

        Ok(reply
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn close(&self) -> Result<()> {
        let result = self
            .connection
            .send(
                "Target.closeTarget",
                Some(json!({"targetId": self.target_id})),
                None,
            )
            .await;

        if let Err(e) = &result {
            warn!(target_id = %self.target_id, error = %e, "Page close failed");
        }

        result.map(|_| ())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Extracts a required string field from a command reply.
fn required_string(value: &Value, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::protocol(format!("reply missing {key}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher_for(endpoint: &str) -> Result<CdpLauncher> {
        let config = BrowserConfig {
            endpoint: endpoint.to_string(),
            ..BrowserConfig::default()
        };
        CdpLauncher::new(&config)
    }

    #[test]
    fn test_launcher_accepts_ws_and_http_endpoints() {
        assert!(launcher_for("ws://127.0.0.1:3000/devtools").is_ok());
        assert!(launcher_for("http://127.0.0.1:9222").is_ok());
    }

    #[test]
    fn test_launcher_rejects_bad_endpoint() {
        assert!(matches!(
            launcher_for("not a url"),
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_ws_url_passes_through_ws_scheme() {
        let launcher = launcher_for("ws://127.0.0.1:3000/devtools").expect("launcher");
        let url = launcher.resolve_ws_url().await.expect("resolve");
        assert_eq!(url, "ws://127.0.0.1:3000/devtools");
    }

    #[tokio::test]
    async fn test_resolve_ws_url_rejects_unknown_scheme() {
        let launcher = launcher_for("ftp://127.0.0.1").expect("launcher");
        let err = launcher.resolve_ws_url().await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_required_string() {
        let value = json!({"targetId": "T1"});
        assert_eq!(required_string(&value, "targetId").expect("field"), "T1");
        assert!(required_string(&value, "sessionId").is_err());
    }

    #[test]
    fn test_version_info_parse() {
        let info: VersionInfo = serde_json::from_str(
            r#"{"Browser": "Chrome/131.0", "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"}"#,
        )
        .expect("parse");
        assert!(info.web_socket_debugger_url.starts_with("ws://"));
    }
}
