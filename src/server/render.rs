//! Digest page HTML rendering.
//!
//! One self-contained page: the story list, the persona buttons, and the
//! optional analysis block. All interpolated text is HTML-escaped here, at
//! the rendering boundary.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Write;

use crate::ai::Tone;
use crate::digest::Digest;

// ============================================================================
// Escaping
// ============================================================================

/// Escapes text for interpolation into HTML.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }

    escaped
}

// ============================================================================
// Page Rendering
// ============================================================================

const PAGE_STYLE: &str = r#"
@import url('https://fonts.googleapis.com/css2?family=Comic+Neue&display=swap');

* {
    margin: 0;
    padding: 0;
    box-sizing: border-box;
    font-family: 'Comic Neue', cursive;
}

body {
    min-height: 100vh;
    display: flex;
    flex-direction: column;
    background: linear-gradient(135deg, #1a1a2e, #16213e);
    color: #fff;
    padding: 20px;
}

.container {
    max-width: 800px;
    margin: 0 auto;
    padding: 20px;
}

.button-container {
    display: flex;
    gap: 20px;
    justify-content: center;
    margin: 30px 0;
}

.analysis-button {
    padding: 15px 30px;
    border: none;
    border-radius: 10px;
    font-size: 1.2em;
    cursor: pointer;
    transition: transform 0.3s, box-shadow 0.3s;
}

.ted-button {
    background: #AFC01C;
    color: white;
}

.stephen-button {
    background: #FF4D4D;
    color: white;
}

.analysis-button:hover {
    transform: translateY(-3px);
    box-shadow: 0 5px 15px rgba(0,255,149,0.3);
}

.stories-list {
    list-style: none;
    margin: 20px 0;
}

.stories-list li {
    background: rgba(255,255,255,0.1);
    margin: 10px 0;
    padding: 15px;
    border-radius: 8px;
}

.stories-list a {
    color: #00ff95;
    text-decoration: none;
}

.stories-list a:hover {
    text-decoration: underline;
}

.ai-analysis {
    background: rgba(255,255,255,0.1);
    padding: 20px;
    border-radius: 10px;
    margin-top: 30px;
    white-space: pre-wrap;
}
"#;

/// Renders the digest page.
///
/// `analysis` carries the persona and its generated (or fallback)
/// commentary; `None` renders the story list without an analysis block.
#[must_use]
pub fn digest_page(digest: &Digest, analysis: Option<(Tone, &str)>) -> String {
    let mut stories_html = String::new();
    for story in digest.stories() {
        let _ = write!(
            stories_html,
            r#"
                <li>
                    <a href="{}" target="_blank">{}</a>
                </li>"#,
            escape_html(&story.link),
            escape_html(&story.title),
        );
    }

    let analysis_html = match analysis {
        Some((tone, text)) => {
            let mut paragraphs = String::new();
            for line in text.lines() {
                let _ = write!(paragraphs, "<p>{}</p>", escape_html(line));
            }

            format!(
                r#"
            <div class="ai-analysis">
                <h2>🎭 {} Analysis</h2>
                <div>{paragraphs}</div>
            </div>"#,
                tone.display_name(),
            )
        }
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html>
    <head>
        <title>HN AI Analysis</title>
        <style>{PAGE_STYLE}</style>
    </head>
    <body>
        <div class="container">
            <h1>🤖 Top 10 Hacker News Stories</h1>
            <p>The top 10 Hacker News stories, scraped through a managed headless browser. Pick a tone to analyze them:</p>

            <ul class="stories-list">{stories_html}
            </ul>
            <div class="button-container">
                <button onclick="window.location.href='?tone=tedlasso'" class="analysis-button ted-button">
                    ⚽ Ted Lasso Analysis
                </button>
                <button onclick="window.location.href='?tone=stephena'" class="analysis-button stephen-button">
                    🎤 Stephen A. Smith Analysis
                </button>
            </div>
{analysis_html}
        </div>
    </body>
</html>"#
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn sample_digest() -> Digest {
        Digest::from_value(json!([
            {"title": "Rust 2.0 <announced>", "link": "https://example.com/rust?a=1&b=2"},
            {"title": "Second story", "link": "https://example.com/second"},
        ]))
        .expect("digest")
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"a" & 'b'</b>"#),
            "&lt;b&gt;&quot;a&quot; &amp; &#039;b&#039;&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_page_escapes_story_fields() {
        let page = digest_page(&sample_digest(), None);

        assert!(page.contains("Rust 2.0 &lt;announced&gt;"));
        assert!(page.contains("https://example.com/rust?a=1&amp;b=2"));
        assert!(!page.contains("<announced>"));
    }

    #[test]
    fn test_page_without_analysis_has_no_block() {
        let page = digest_page(&sample_digest(), None);
        assert!(!page.contains("ai-analysis"));
        assert!(page.contains("?tone=tedlasso"));
        assert!(page.contains("?tone=stephena"));
    }

    #[test]
    fn test_page_with_analysis_renders_paragraphs() {
        let page = digest_page(
            &sample_digest(),
            Some((Tone::TedLasso, "Line one\nLine two")),
        );

        assert!(page.contains("Ted Lasso Analysis"));
        assert!(page.contains("<p>Line one</p>"));
        assert!(page.contains("<p>Line two</p>"));
    }

    #[test]
    fn test_analysis_text_is_escaped() {
        let page = digest_page(
            &sample_digest(),
            Some((Tone::StephenA, "<script>alert(1)</script>")),
        );

        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("<script>alert"));
    }
}
