//! Shared service state.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::ai::Completer;
use crate::browser::Launcher;
use crate::config::Config;
use crate::digest::ExtractionRequest;
use crate::mail::EmailTransport;
use crate::session::{SessionKey, SessionManager};

// ============================================================================
// Constants
// ============================================================================

/// The session key shared by the HTTP and scheduled digest paths.
pub const DIGEST_SESSION_KEY: &str = "digest";

// ============================================================================
// App
// ============================================================================

/// Everything the digest pipelines need, cheap to clone.
///
/// Generic over the [`Launcher`] so tests drive the real pipelines against
/// an in-memory browser.
pub struct App<L: Launcher> {
    /// Browser session manager.
    pub sessions: SessionManager<L>,
    /// AI completion primitive.
    pub completer: Arc<dyn Completer>,
    /// Email transport primitive.
    pub mailer: Arc<dyn EmailTransport>,
    /// Service configuration.
    pub config: Arc<Config>,
}

impl<L: Launcher> Clone for App<L> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            completer: Arc::clone(&self.completer),
            mailer: Arc::clone(&self.mailer),
            config: Arc::clone(&self.config),
        }
    }
}

impl<L: Launcher> App<L> {
    /// Returns the session key used by both digest paths.
    #[must_use]
    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(DIGEST_SESSION_KEY)
    }

    /// Builds the top-stories extraction for the configured scrape URL.
    #[must_use]
    pub fn extraction(&self) -> ExtractionRequest {
        ExtractionRequest::top_stories(self.config.scrape.url.clone())
    }
}
