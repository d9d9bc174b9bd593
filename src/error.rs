//! Error types for the digest service.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use hn_digest::{Result, Error};
//!
//! async fn example(page: &impl Page) -> Result<()> {
//!     page.navigate("https://news.ycombinator.com").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Session | [`Error::LaunchFailure`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::RequestTimeout`] |
//! | Pipeline | [`Error::Navigation`], [`Error::Extraction`] |
//! | Delivery | [`Error::AiCompletion`], [`Error::EmailSend`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! Only [`Error::AiCompletion`] and [`Error::EmailSend`] are absorbed by the
//! call paths that produce them (degrading to fallback output); everything
//! else propagates to the caller.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when service configuration is invalid or unreadable.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Browser launch failed.
    ///
    /// Returned by session acquisition when the underlying launch primitive
    /// errors. The session state reverts to absent so a later acquire retries.
    #[error("Browser launch failed: {source}")]
    LaunchFailure {
        /// The underlying cause of the failed launch.
        #[source]
        source: Box<Error>,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection to the browser endpoint failed.
    ///
    /// Returned when the DevTools WebSocket cannot be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt timed out.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed unexpectedly.
    ///
    /// Returned when the browser connection is lost during operation.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or command error from the browser.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Command request timeout.
    ///
    /// Returned when a browser command receives no response within its
    /// timeout.
    #[error("Request {method} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The command method that timed out.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Pipeline Errors
    // ========================================================================
    /// Page navigation failed.
    ///
    /// A hard navigation error, distinct from an extraction that matched
    /// nothing (an empty digest is valid).
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// The URL that failed to load.
        url: String,
        /// Error detail from the browser.
        message: String,
    },

    /// Story extraction failed.
    ///
    /// Returned when the in-page extraction script throws or returns a
    /// malformed shape.
    #[error("Extraction failed: {message}")]
    Extraction {
        /// Description of the extraction failure.
        message: String,
    },

    // ========================================================================
    // Delivery Errors
    // ========================================================================
    /// AI completion failed.
    ///
    /// Absorbed by callers: the page and email paths degrade to fixed
    /// fallback text instead of failing the request.
    #[error("AI completion failed: {message}")]
    AiCompletion {
        /// Description of the completion failure.
        message: String,
    },

    /// Email send failed.
    ///
    /// Absorbed by the scheduled path: logged, never propagated past the
    /// send call.
    #[error("Email send failed: {message}")]
    EmailSend {
        /// Description of the send failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a launch failure wrapping the underlying cause.
    #[inline]
    pub fn launch_failure(source: Error) -> Self {
        Self::LaunchFailure {
            source: Box::new(source),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates a navigation error.
    #[inline]
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an extraction error.
    #[inline]
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Creates an AI completion error.
    #[inline]
    pub fn ai_completion(message: impl Into<String>) -> Self {
        Self::AiCompletion {
            message: message.into(),
        }
    }

    /// Creates an email send error.
    #[inline]
    pub fn email_send(message: impl Into<String>) -> Self {
        Self::EmailSend {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a launch failure.
    #[inline]
    #[must_use]
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Self::LaunchFailure { .. })
    }

    /// Returns `true` if this error is absorbed rather than propagated.
    ///
    /// AI and email failures degrade to fallback output; everything else
    /// surfaces to the caller.
    #[inline]
    #[must_use]
    pub fn is_absorbed(&self) -> bool {
        matches!(self, Self::AiCompletion { .. } | Self::EmailSend { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_launch_failure_carries_cause() {
        let err = Error::launch_failure(Error::connection("connection refused"));
        assert!(err.is_launch_failure());
        assert_eq!(
            err.to_string(),
            "Browser launch failed: Connection failed: connection refused"
        );
    }

    #[test]
    fn test_navigation_display() {
        let err = Error::navigation("https://example.com", "net::ERR_FAILED");
        assert_eq!(
            err.to_string(),
            "Navigation to https://example.com failed: net::ERR_FAILED"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout("Page.navigate", 5000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        let conn_err = Error::connection("test");
        let timeout_err = Error::ConnectionTimeout { timeout_ms: 1000 };
        let closed_err = Error::ConnectionClosed;
        let other_err = Error::config("test");

        assert!(conn_err.is_connection_error());
        assert!(timeout_err.is_connection_error());
        assert!(closed_err.is_connection_error());
        assert!(!other_err.is_connection_error());
    }

    #[test]
    fn test_is_absorbed() {
        assert!(Error::ai_completion("test").is_absorbed());
        assert!(Error::email_send("test").is_absorbed());
        assert!(!Error::extraction("test").is_absorbed());
        assert!(!Error::launch_failure(Error::ConnectionClosed).is_absorbed());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
