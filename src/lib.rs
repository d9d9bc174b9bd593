//! HN Digest - Hacker News digest service.
//!
//! Periodically fetches the top stories from Hacker News through a managed
//! headless-browser session, optionally produces an AI persona commentary,
//! and delivers the result as a rendered web page or an emailed digest.
//!
//! # Architecture
//!
//! The core is the browser-session lifecycle manager; everything around it
//! is a collaborator reached through a capability-set trait:
//!
//! ```text
//! Caller (HTTP handler / scheduled job)
//!    │ acquire
//!    ▼
//! SessionManager ──► Launcher ──► BrowserHandle ──► Page
//!    │ tick/cleanup        (remote DevTools endpoint)
//!    ▼
//! Absent → Launching → Alive → (kept-alive | Expiring) → Closed
//! ```
//!
//! Sessions are lazily launched on first acquire, reused while alive, and
//! closed by a timer once a 60-second budget is exhausted (or immediately
//! via cleanup on the one-shot scheduled path).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`ai`] | Persona commentary and the completion client |
//! | [`app`] | Shared service state |
//! | [`browser`] | Browser capability traits and the CDP adapter |
//! | [`config`] | TOML configuration |
//! | [`digest`] | Story extraction and the digest data model |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`mail`] | Digest email delivery |
//! | [`scheduler`] | Scheduled digest pipeline |
//! | [`server`] | HTTP surface |
//! | [`session`] | Browser session lifecycle manager (the core) |
//! | [`transport`] | DevTools WebSocket transport (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Persona commentary and the completion client.
pub mod ai;

/// Shared service state.
pub mod app;

/// Browser capability traits and the CDP adapter.
pub mod browser;

/// Service configuration.
pub mod config;

/// Story extraction and the digest data model.
pub mod digest;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Digest email delivery.
pub mod mail;

/// Scheduled digest pipeline.
pub mod scheduler;

/// HTTP surface.
pub mod server;

/// Browser session lifecycle manager.
pub mod session;

/// DevTools WebSocket transport layer.
///
/// Internal module handling the browser connection.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Core session types
pub use session::{SessionConfig, SessionKey, SessionManager, StateKind};

// Browser capability traits
pub use browser::{BrowserHandle, CdpLauncher, Launcher, Page};

// Pipeline types
pub use ai::{AiClient, Completer, Tone};
pub use app::App;
pub use digest::{Digest, ExtractionRequest, MAX_STORIES, Story};
pub use mail::{EmailTransport, OutgoingEmail, SmtpMailer};

// Configuration
pub use config::Config;

// Error types
pub use error::{Error, Result};
