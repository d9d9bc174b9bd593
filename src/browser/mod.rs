//! Browser collaborator capability traits.
//!
//! The session manager and digest pipeline never talk to a concrete browser
//! client; they go through the capability set defined here:
//!
//! - [`Launcher`]: `launch() -> Handle`
//! - [`BrowserHandle`]: `is_alive`, `open_page`, `close`
//! - [`Page`]: `navigate`, `evaluate`, `close`
//!
//! Every operation returns a typed [`Result`]; there are no dynamic
//! pass-through values. The production implementation against a remote
//! DevTools endpoint lives in [`cdp`].

// ============================================================================
// Modules
// ============================================================================

/// Remote DevTools (CDP) implementation of the capability traits.
pub mod cdp;

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use cdp::{CdpBrowser, CdpLauncher, CdpPage};

// ============================================================================
// Launcher
// ============================================================================

/// Browser launch primitive.
///
/// The only path that may instantiate a new underlying browser connection.
/// Owned by the session manager; invoked lazily on first acquire for a key
/// and again after a session closes.
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    /// Handle type produced by a successful launch.
    type Handle: BrowserHandle;

    /// Establishes a new browser connection.
    async fn launch(&self) -> Result<Self::Handle>;
}

// ============================================================================
// BrowserHandle
// ============================================================================

/// A live connection to a browser instance capable of opening pages.
#[async_trait]
pub trait BrowserHandle: Send + Sync + 'static {
    /// Page type opened by this handle.
    type Page: Page;

    /// Returns `true` while the underlying connection is usable.
    ///
    /// A handle reporting `false` must be treated as gone; the session
    /// manager relaunches instead of reusing it.
    fn is_alive(&self) -> bool;

    /// Opens a fresh page on this browser.
    async fn open_page(&self) -> Result<Self::Page>;

    /// Closes the browser connection.
    ///
    /// Closure is best-effort: callers treat the handle as gone even when
    /// this returns an error.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Page
// ============================================================================

/// A single page on a browser handle.
///
/// Callers open a page, drive one extraction, and close it before
/// returning; the manager does not pool pages.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigates the page and waits for it to load.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Evaluates a script in the page and returns its value.
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    /// Closes the page.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Test Mocks
// ============================================================================

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory fakes for the capability traits, shared by the session,
    //! server, and scheduler tests.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::error::{Error, Result};

    use super::{BrowserHandle, Launcher, Page};

    /// Shared counters observed by assertions.
    #[derive(Debug, Default)]
    pub struct MockStats {
        /// Number of successful launches.
        pub launches: AtomicUsize,
        /// Number of launch attempts, successful or not.
        pub launch_attempts: AtomicUsize,
        /// Number of handle closes.
        pub closes: AtomicUsize,
    }

    /// Launcher producing [`MockHandle`]s backed by a canned page value.
    pub struct MockLauncher {
        pub stats: Arc<MockStats>,
        /// Number of leading launch attempts that fail.
        pub fail_first: AtomicUsize,
        /// Artificial launch latency, for racing-acquire tests.
        pub launch_delay: std::time::Duration,
        /// Value returned by every page evaluation.
        pub page_value: Value,
    }

    impl MockLauncher {
        pub fn new(page_value: Value) -> Self {
            Self {
                stats: Arc::new(MockStats::default()),
                fail_first: AtomicUsize::new(0),
                launch_delay: std::time::Duration::ZERO,
                page_value,
            }
        }

        pub fn failing_first(self, failures: usize) -> Self {
            self.fail_first.store(failures, Ordering::SeqCst);
            self
        }

        pub fn with_launch_delay(mut self, delay: std::time::Duration) -> Self {
            self.launch_delay = delay;
            self
        }
    }

    #[async_trait]
    impl Launcher for MockLauncher {
        type Handle = MockHandle;

        async fn launch(&self) -> Result<MockHandle> {
            self.stats.launch_attempts.fetch_add(1, Ordering::SeqCst);

            if !self.launch_delay.is_zero() {
                tokio::time::sleep(self.launch_delay).await;
            }

            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::connection("connection refused"));
            }

            self.stats.launches.fetch_add(1, Ordering::SeqCst);
            Ok(MockHandle {
                stats: Arc::clone(&self.stats),
                alive: AtomicBool::new(true),
                page_value: self.page_value.clone(),
            })
        }
    }

    /// Handle whose liveness flips to `false` on close.
    #[derive(Debug)]
    pub struct MockHandle {
        stats: Arc<MockStats>,
        alive: AtomicBool,
        page_value: Value,
    }

    #[async_trait]
    impl BrowserHandle for MockHandle {
        type Page = MockPage;

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn open_page(&self) -> Result<MockPage> {
            Ok(MockPage {
                value: self.page_value.clone(),
            })
        }

        async fn close(&self) -> Result<()> {
            self.alive.store(false, Ordering::SeqCst);
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Page returning a canned evaluation value.
    pub struct MockPage {
        value: Value,
    }

    #[async_trait]
    impl Page for MockPage {
        async fn navigate(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn evaluate(&self, _expression: &str) -> Result<Value> {
            Ok(self.value.clone())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }
}
