//! Scheduled digest pipeline.
//!
//! On a fixed interval: acquire browser → scrape top 10 → AI-compose the
//! email body (plain-format fallback) → send email → cleanup. This path is
//! one-shot per run and does not keep the connection warm.
//!
//! Failure policy (per run): launch and extraction failures abort the run
//! with a log line and no email is sent. AI and email failures are
//! absorbed, so the run completes and the process keeps going.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info};

use crate::ai::compose_email_body;
use crate::app::App;
use crate::browser::Launcher;
use crate::digest::extract;
use crate::error::Result;
use crate::mail::OutgoingEmail;

// ============================================================================
// Digest Job
// ============================================================================

/// Runs one scheduled digest: scrape, compose, send, cleanup.
///
/// # Errors
///
/// Returns the launch or extraction failure that aborted the run. AI and
/// email failures are absorbed and never surface here.
pub async fn run_digest_job<L: Launcher>(app: &App<L>) -> Result<()> {
    let key = app.session_key();

    let handle = app.sessions.acquire(&key).await?;

    let digest = match extract(handle.as_ref(), &app.extraction()).await {
        Ok(digest) => digest,
        Err(e) => {
            // One-shot path: do not leave the connection warm after a
            // failed scrape either.
            app.sessions.cleanup(&key).await;
            return Err(e);
        }
    };

    info!(stories = digest.len(), "Scheduled digest scraped");

    let body = compose_email_body(app.completer.as_ref(), &digest).await;
    let email = OutgoingEmail {
        subject: app.config.email.subject.clone(),
        body,
    };

    if let Err(e) = app.mailer.send(email).await {
        error!(error = %e, "Failed to send digest email");
    }

    app.sessions.cleanup(&key).await;
    Ok(())
}

// ============================================================================
// Scheduler Loop
// ============================================================================

/// Runs the digest job every `period`, starting one full period from now.
///
/// Failed runs are logged and the loop waits for the next firing; nothing
/// propagates to the host.
pub async fn run<L: Launcher>(app: App<L>, period: Duration) {
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = period.as_secs(), "Scheduled digest enabled");

    loop {
        ticks.tick().await;

        match run_digest_job(&app).await {
            Ok(()) => info!("Scheduled digest run complete"),
            Err(e) => error!(error = %e, "Scheduled digest run aborted"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
