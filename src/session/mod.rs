//! Browser session lifecycle manager.
//!
//! Owns at most one browser handle per logical key, lazily creates it on
//! first use, tracks an alive-duration budget, and exposes idempotent
//! acquire/tick/cleanup operations.
//!
//! # State Machine
//!
//! ```text
//!            acquire (launch ok)
//! Absent ──► Launching ──► Alive ──► Expiring ──► Closed
//!    ▲           │           │  ▲                    │
//!    │  launch   │     tick  └──┘                    │
//!    └── failed ─┘   (< budget)      acquire ◄───────┘
//!                                  (treated as Absent)
//! ```
//!
//! `cleanup` jumps straight from `Alive` to `Closed`, bypassing `Expiring`.
//!
//! # Concurrency
//!
//! Acquire, tick, and cleanup are the only mutators and are serialized per
//! key by an async mutex on the slot. Two acquire calls racing while a
//! launch is in flight therefore never start a second launch: the second
//! caller blocks until the first launch resolves, then reuses its handle
//! (or observes the failure state and launches itself).
//!
//! # Known Race
//!
//! Expiry is purely timer-driven: the ticker closes the handle when the
//! budget is exhausted even if a caller is mid-extraction on it. The caller
//! observes `ConnectionClosed` on its next command. Expiry is deliberately
//! not deferred with reference counting; callers are expected to finish
//! well inside the budget.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{Instant, interval_at, timeout};
use tracing::{debug, info, warn};

use crate::browser::{BrowserHandle, Launcher};
use crate::error::{Error, Result};

// ============================================================================
// SessionConfig
// ============================================================================

/// Lifecycle parameters for managed sessions.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum time a session stays alive before the ticker closes it.
    pub alive_budget: Duration,
    /// Interval between expiry ticks.
    pub tick_interval: Duration,
    /// Maximum time to wait for the launch primitive.
    pub launch_timeout: Duration,
    /// Maximum time to wait for the close primitive.
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            alive_budget: Duration::from_secs(60),
            tick_interval: Duration::from_secs(10),
            launch_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(10),
        }
    }
}

// ============================================================================
// SessionKey
// ============================================================================

/// Logical key identifying one managed session.
///
/// Observed usage is a single constant key, but the manager supports any
/// number of keys, each with its own independent lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Creates a session key.
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

// ============================================================================
// StateKind
// ============================================================================

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// No session exists for the key.
    Absent,
    /// A launch is in flight.
    Launching,
    /// A live handle is held.
    Alive,
    /// The budget is exhausted; close is in flight.
    Expiring,
    /// Terminal. A later acquire treats this as [`StateKind::Absent`].
    Closed,
}

// ============================================================================
// SessionState
// ============================================================================

/// Tagged session state. Never inferred from nullable fields.
enum SessionState<H> {
    Absent,
    Launching,
    Alive {
        /// The managed handle. Lent to callers as an `Arc` clone; the
        /// manager keeps its own reference for the session's lifetime.
        handle: Arc<H>,
        /// Time accumulated by expiry ticks since launch.
        kept_alive: Duration,
    },
    Expiring,
    Closed,
}

impl<H> SessionState<H> {
    fn kind(&self) -> StateKind {
        match self {
            Self::Absent => StateKind::Absent,
            Self::Launching => StateKind::Launching,
            Self::Alive { .. } => StateKind::Alive,
            Self::Expiring => StateKind::Expiring,
            Self::Closed => StateKind::Closed,
        }
    }
}

// ============================================================================
// Slot
// ============================================================================

/// Per-key session storage.
struct Slot<H> {
    /// The state machine. The async mutex serializes all mutators for the
    /// key, including across the launch/close suspension points.
    state: AsyncMutex<SessionState<H>>,
    /// Mirror of the current state kind, readable without the async lock.
    kind: Mutex<StateKind>,
    /// Whether an expiry ticker task is running for this slot.
    ticker_armed: AtomicBool,
}

impl<H> Slot<H> {
    fn new() -> Self {
        Self {
            state: AsyncMutex::new(SessionState::Absent),
            kind: Mutex::new(StateKind::Absent),
            ticker_armed: AtomicBool::new(false),
        }
    }
}

/// Applies a state transition, keeping the observable mirror in sync.
fn transition<H>(slot: &Slot<H>, state: &mut SessionState<H>, next: SessionState<H>) {
    *slot.kind.lock() = next.kind();
    *state = next;
}

// ============================================================================
// SessionManager
// ============================================================================

/// Manages lazily-launched, bounded-lifetime browser sessions per key.
///
/// Cheap to clone; clones share the same session table.
pub struct SessionManager<L: Launcher> {
    inner: Arc<ManagerInner<L>>,
}

impl<L: Launcher> Clone for SessionManager<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Shared inner state for the manager.
struct ManagerInner<L: Launcher> {
    /// The browser launch primitive.
    launcher: L,
    /// Lifecycle parameters.
    config: SessionConfig,
    /// Session slots by key.
    slots: Mutex<FxHashMap<SessionKey, Arc<Slot<L::Handle>>>>,
}

impl<L: Launcher> SessionManager<L> {
    /// Creates a manager around a launch primitive.
    #[must_use]
    pub fn new(launcher: L, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                launcher,
                config,
                slots: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Returns a live handle for the key, launching one if necessary.
    ///
    /// Reuse does not reset the alive budget; only launch does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LaunchFailure`] if the launch primitive errors or
    /// exceeds its timeout. The session reverts to absent so a later
    /// acquire retries.
    pub async fn acquire(&self, key: &SessionKey) -> Result<Arc<L::Handle>> {
        let slot = self.slot(key);
        let mut state = slot.state.lock().await;

        if let SessionState::Alive { handle, .. } = &*state {
            if handle.is_alive() {
                debug!(%key, "Reusing live browser session");
                return Ok(Arc::clone(handle));
            }
            warn!(%key, "Session handle reports dead; relaunching");
        }

        transition(&slot, &mut state, SessionState::Launching);
        info!(%key, "Browser manager: starting new instance");

        let launch_timeout = self.inner.config.launch_timeout;
        let handle = match timeout(launch_timeout, self.inner.launcher.launch()).await {
            Ok(Ok(handle)) => Arc::new(handle),
            Ok(Err(e)) => {
                transition(&slot, &mut state, SessionState::Absent);
                warn!(%key, error = %e, "Browser manager: could not start browser instance");
                return Err(Error::launch_failure(e));
            }
            Err(_) => {
                transition(&slot, &mut state, SessionState::Absent);
                warn!(%key, timeout_ms = launch_timeout.as_millis() as u64, "Browser launch timed out");
                return Err(Error::launch_failure(Error::connection_timeout(
                    launch_timeout.as_millis() as u64,
                )));
            }
        };

        transition(
            &slot,
            &mut state,
            SessionState::Alive {
                handle: Arc::clone(&handle),
                kept_alive: Duration::ZERO,
            },
        );
        drop(state);

        self.arm_expiry(key, &slot);

        Ok(handle)
    }

    /// Advances the expiry clock for the key by one tick interval.
    ///
    /// While the accumulated time stays under the budget the session
    /// remains alive; once it reaches the budget the handle is closed
    /// (best-effort, bounded) and the session becomes [`StateKind::Closed`].
    ///
    /// This decision is purely timer-driven: it does not consult whether a
    /// caller currently holds the handle. See the module docs for the
    /// preserved race.
    ///
    /// Returns the state after the tick.
    pub async fn tick(&self, key: &SessionKey) -> StateKind {
        let Some(slot) = self.existing_slot(key) else {
            return StateKind::Absent;
        };
        let mut state = slot.state.lock().await;

        match std::mem::replace(&mut *state, SessionState::Closed) {
            SessionState::Alive { handle, kept_alive } => {
                let kept_alive = kept_alive + self.inner.config.tick_interval;

                if kept_alive < self.inner.config.alive_budget {
                    debug!(
                        %key,
                        kept_alive_secs = kept_alive.as_secs(),
                        "Session kept alive; extending lifespan"
                    );
                    transition(&slot, &mut state, SessionState::Alive { handle, kept_alive });
                } else {
                    info!(
                        %key,
                        budget_secs = self.inner.config.alive_budget.as_secs(),
                        "Session exceeded alive budget; closing browser"
                    );
                    transition(&slot, &mut state, SessionState::Expiring);
                    self.close_handle(key, &handle).await;
                    transition(&slot, &mut state, SessionState::Closed);
                }
            }
            other => {
                // Nothing to expire.
                transition(&slot, &mut state, other);
            }
        }

        state.kind()
    }

    /// Immediately closes the session for the key, bypassing expiry.
    ///
    /// Used by one-shot call paths that do not want to keep a connection
    /// warm. Idempotent: calling cleanup on an already-closed (or absent)
    /// session is a no-op.
    pub async fn cleanup(&self, key: &SessionKey) {
        let Some(slot) = self.existing_slot(key) else {
            return;
        };
        let mut state = slot.state.lock().await;

        match std::mem::replace(&mut *state, SessionState::Closed) {
            SessionState::Alive { handle, .. } => {
                info!(%key, "Cleanup: closing browser");
                self.close_handle(key, &handle).await;
                transition(&slot, &mut state, SessionState::Closed);
            }
            other => {
                transition(&slot, &mut state, other);
            }
        }
    }

    /// Returns the observable state for the key.
    #[must_use]
    pub fn state(&self, key: &SessionKey) -> StateKind {
        self.existing_slot(key)
            .map(|slot| *slot.kind.lock())
            .unwrap_or(StateKind::Absent)
    }

    /// Closes every live session. Used on process shutdown.
    pub async fn shutdown(&self) {
        let slots: Vec<(SessionKey, Arc<Slot<L::Handle>>)> = {
            let map = self.inner.slots.lock();
            map.iter()
                .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
                .collect()
        };

        info!(count = slots.len(), "Shutting down all sessions");

        for (key, slot) in slots {
            let mut state = slot.state.lock().await;
            if let SessionState::Alive { handle, .. } =
                std::mem::replace(&mut *state, SessionState::Closed)
            {
                self.close_handle(&key, &handle).await;
            }
            transition(&slot, &mut state, SessionState::Closed);
        }
    }
}

// ============================================================================
// SessionManager - Internal
// ============================================================================

impl<L: Launcher> SessionManager<L> {
    /// Returns the slot for a key, creating it on first use.
    fn slot(&self, key: &SessionKey) -> Arc<Slot<L::Handle>> {
        let mut slots = self.inner.slots.lock();
        Arc::clone(
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    /// Returns the slot for a key only if it already exists.
    fn existing_slot(&self, key: &SessionKey) -> Option<Arc<Slot<L::Handle>>> {
        self.inner.slots.lock().get(key).map(Arc::clone)
    }

    /// Spawns the expiry ticker for a slot, once per live session.
    ///
    /// The ticker re-arms itself every tick interval while the session
    /// stays alive and exits on any other state, so a relaunch after
    /// closure arms a fresh ticker.
    fn arm_expiry(&self, key: &SessionKey, slot: &Arc<Slot<L::Handle>>) {
        if slot.ticker_armed.swap(true, Ordering::SeqCst) {
            return;
        }

        let manager = self.clone();
        let key = key.clone();
        let slot = Arc::clone(slot);

        tokio::spawn(async move {
            let period = manager.inner.config.tick_interval;
            let mut ticks = interval_at(Instant::now() + period, period);

            loop {
                ticks.tick().await;
                if manager.tick(&key).await != StateKind::Alive {
                    break;
                }
            }

            slot.ticker_armed.store(false, Ordering::SeqCst);
            debug!(%key, "Expiry ticker stopped");
        });
    }

    /// Closes a handle, best-effort and bounded.
    ///
    /// The handle is considered gone afterward even if the close errored.
    async fn close_handle(&self, key: &SessionKey, handle: &L::Handle) {
        match timeout(self.inner.config.close_timeout, handle.close()).await {
            Ok(Ok(())) => debug!(%key, "Browser closed"),
            Ok(Err(e)) => warn!(%key, error = %e, "Browser close failed; handle treated as gone"),
            Err(_) => warn!(%key, "Browser close timed out; handle treated as gone"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
