//! HTTP surface.
//!
//! One route: `GET /` renders the digest page, with `?tone=` selecting the
//! AI commentary persona. Launch and scrape failures surface as HTTP 500
//! with the error message; AI failures do not, and the page still renders
//! with the fallback analysis text.

// ============================================================================
// Modules
// ============================================================================

/// Digest page HTML rendering.
pub mod render;

// ============================================================================
// Imports
// ============================================================================

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tracing::{error, info};

use crate::ai::{Tone, analyze_stories};
use crate::app::App;
use crate::browser::Launcher;
use crate::digest::extract;
use crate::error::Result;

// ============================================================================
// Router
// ============================================================================

/// Builds the service router.
pub fn router<L: Launcher>(app: App<L>) -> Router {
    Router::new()
        .route("/", get(digest_page::<L>))
        .with_state(app)
}

// ============================================================================
// Handlers
// ============================================================================

/// Query parameters for the digest page.
#[derive(Debug, Deserialize)]
struct DigestQuery {
    /// Persona selector; unknown values (including `none`) disable
    /// commentary.
    tone: Option<String>,
}

/// `GET /`: scrape the top stories and render the digest page.
async fn digest_page<L: Launcher>(
    State(app): State<App<L>>,
    Query(query): Query<DigestQuery>,
) -> Response {
    let tone = query
        .tone
        .as_deref()
        .and_then(|value| value.parse::<Tone>().ok());

    match render_digest(&app, tone).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "Digest page failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error scraping Hacker News: {e}"),
            )
                .into_response()
        }
    }
}

/// Runs the page pipeline: acquire → extract → optional analysis → render.
async fn render_digest<L: Launcher>(app: &App<L>, tone: Option<Tone>) -> Result<String> {
    let key = app.session_key();

    let handle = app.sessions.acquire(&key).await?;
    let digest = extract(handle.as_ref(), &app.extraction()).await?;
    info!(stories = digest.len(), tone = ?tone, "Digest page scraped");

    let analysis = match tone {
        Some(tone) => Some((tone, analyze_stories(app.completer.as_ref(), &digest, tone).await)),
        None => None,
    };

    Ok(render::digest_page(
        &digest,
        analysis.as_ref().map(|(tone, text)| (*tone, text.as_str())),
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::ai::ANALYSIS_FALLBACK;
    use crate::ai::mock::MockCompleter;
    use crate::browser::mock::MockLauncher;
    use crate::config::Config;
    use crate::mail::mock::MockTransport;
    use crate::session::{SessionConfig, SessionManager};

    fn stories(count: usize) -> Value {
        Value::Array(
            (1..=count)
                .map(|n| json!({"title": format!("Story {n}"), "link": format!("https://example.com/{n}")}))
                .collect(),
        )
    }

    fn test_app(launcher: MockLauncher, completer: MockCompleter) -> App<MockLauncher> {
        App {
            sessions: SessionManager::new(launcher, SessionConfig::default()),
            completer: Arc::new(completer),
            mailer: Arc::new(MockTransport::default()),
            config: Arc::new(Config::default()),
        }
    }

    fn test_server(app: App<MockLauncher>) -> TestServer {
        TestServer::new(router(app)).expect("test server")
    }

    #[tokio::test]
    async fn test_digest_page_renders_stories() {
        let app = test_app(
            MockLauncher::new(stories(15)),
            MockCompleter::replying("unused"),
        );
        let server = test_server(app);

        let response = server.get("/").await;
        response.assert_status(StatusCode::OK);

        let body = response.text();
        assert!(body.contains("Story 1"));
        assert!(body.contains("Story 10"));
        // Capped at ten.
        assert!(!body.contains("Story 11"));
        // No tone selected: no analysis requested or rendered.
        assert!(!body.contains("ai-analysis"));
        assert!(!body.contains("unused"));
    }

    #[tokio::test]
    async fn test_tone_selects_persona_commentary() {
        let app = test_app(
            MockLauncher::new(stories(3)),
            MockCompleter::replying("Football is life!"),
        );
        let server = test_server(app);

        let response = server.get("/").add_query_param("tone", "tedlasso").await;
        response.assert_status(StatusCode::OK);

        let body = response.text();
        assert!(body.contains("Ted Lasso Analysis"));
        assert!(body.contains("Football is life!"));
    }

    #[tokio::test]
    async fn test_ai_failure_still_renders_page_with_fallback() {
        let app = test_app(MockLauncher::new(stories(3)), MockCompleter::failing());
        let server = test_server(app);

        let response = server.get("/").add_query_param("tone", "stephena").await;
        response.assert_status(StatusCode::OK);

        let body = response.text();
        assert!(body.contains("Story 1"));
        assert!(body.contains(ANALYSIS_FALLBACK));
    }

    #[tokio::test]
    async fn test_unknown_tone_renders_without_commentary() {
        let app = test_app(
            MockLauncher::new(stories(3)),
            MockCompleter::replying("unused"),
        );
        let server = test_server(app);

        let response = server.get("/").add_query_param("tone", "shakespeare").await;
        response.assert_status(StatusCode::OK);
        assert!(!response.text().contains("ai-analysis"));
    }

    #[tokio::test]
    async fn test_launch_failure_is_http_500() {
        let launcher = MockLauncher::new(stories(3)).failing_first(usize::MAX);
        let app = test_app(launcher, MockCompleter::replying("unused"));
        let server = test_server(app);

        let response = server.get("/").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.text().contains("Error scraping Hacker News"));
    }

    #[tokio::test]
    async fn test_extraction_failure_is_http_500() {
        // Script returns a non-array shape: a hard extraction error.
        let app = test_app(
            MockLauncher::new(json!({"unexpected": true})),
            MockCompleter::replying("unused"),
        );
        let server = test_server(app);

        let response = server.get("/").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_empty_digest_is_still_a_page() {
        let app = test_app(
            MockLauncher::new(json!([])),
            MockCompleter::replying("unused"),
        );
        let server = test_server(app);

        let response = server.get("/").await;
        response.assert_status(StatusCode::OK);
        assert!(response.text().contains("Top 10 Hacker News Stories"));
    }
}
