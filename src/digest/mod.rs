//! Digest data model and story extraction.
//!
//! A [`Digest`] is the ordered list of top stories produced by one
//! extraction pass: immutable once produced, capped at [`MAX_STORIES`],
//! consumed by the page-render and email paths. An extraction that matches
//! nothing yields a valid empty digest; only hard navigation/script
//! failures are errors.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::browser::{BrowserHandle, Page};
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of stories in a digest.
pub const MAX_STORIES: usize = 10;

/// In-page extraction script for the Hacker News front page.
///
/// Collects `(title, link)` pairs from `.athing` rows in document order and
/// caps the result in-page.
const TOP_STORIES_SCRIPT: &str = r#"
(() => {
  const stories = [];
  const storyElements = document.querySelectorAll('.athing');

  storyElements.forEach((story) => {
    const titleElement = story.querySelector('.titleline a');
    const title = titleElement ? titleElement.innerText.trim() : '';
    const link = titleElement ? titleElement.href : '';

    if (title && link) {
      stories.push({ title, link });
    }
  });

  return stories.slice(0, 10);
})()
"#;

// ============================================================================
// Story
// ============================================================================

/// One story: title plus link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// Story title.
    pub title: String,
    /// Story link.
    pub link: String,
}

// ============================================================================
// Digest
// ============================================================================

/// Ordered list of top stories, capped at [`MAX_STORIES`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digest {
    stories: Vec<Story>,
}

impl Digest {
    /// Builds a digest from stories, keeping the first [`MAX_STORIES`] in
    /// order.
    #[must_use]
    pub fn from_stories(stories: impl IntoIterator<Item = Story>) -> Self {
        Self {
            stories: stories.into_iter().take(MAX_STORIES).collect(),
        }
    }

    /// Parses the extraction script's return value.
    ///
    /// Entries missing a title or link are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] if the value is not an array.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Array(entries) = value else {
            return Err(Error::extraction(format!(
                "expected an array of stories, got {value}"
            )));
        };

        let stories = entries.into_iter().filter_map(|entry| {
            let title = entry.get("title")?.as_str()?.to_string();
            let link = entry.get("link")?.as_str()?.to_string();
            Some(Story { title, link })
        });

        Ok(Self::from_stories(stories))
    }

    /// Returns the stories in document order.
    #[inline]
    #[must_use]
    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    /// Returns the number of stories.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stories.len()
    }

    /// Returns `true` when the digest holds no stories.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    /// Renders the numbered plain-text form used by the email fallback.
    ///
    /// ```text
    /// 1. Story title
    ///    https://example.com
    /// ```
    #[must_use]
    pub fn plain_text(&self) -> String {
        self.stories
            .iter()
            .enumerate()
            .map(|(index, story)| format!("{}. {}\n   {}", index + 1, story.title, story.link))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Renders the numbered title list fed to the analysis prompt.
    #[must_use]
    pub fn numbered_titles(&self) -> String {
        self.stories
            .iter()
            .enumerate()
            .map(|(index, story)| format!("{}. {}", index + 1, story.title))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// ExtractionRequest
// ============================================================================

/// Ephemeral description of one extraction: target URL plus in-page script.
///
/// Owned by the calling collaborator for the duration of one operation;
/// never persisted.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Page to navigate to.
    pub url: String,
    /// Script evaluated in the page; must return an array of
    /// `{title, link}` objects.
    pub script: String,
}

impl ExtractionRequest {
    /// Builds the top-stories extraction for a Hacker News front page URL.
    #[must_use]
    pub fn top_stories(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            script: TOP_STORIES_SCRIPT.to_string(),
        }
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Runs one extraction on a browser handle.
///
/// Opens a page, navigates, evaluates the extraction script, and closes the
/// page again (best-effort on the error path too). The handle itself stays
/// open; its lifetime belongs to the session manager.
///
/// # Errors
///
/// - [`Error::Navigation`] if the page fails to load
/// - [`Error::Extraction`] if the script throws or returns a malformed shape
pub async fn extract<H: BrowserHandle>(handle: &H, request: &ExtractionRequest) -> Result<Digest> {
    let page = handle.open_page().await?;

    let result = run_extraction(&page, request).await;

    if let Err(e) = page.close().await {
        warn!(error = %e, "Page close failed after extraction");
    }

    result
}

async fn run_extraction<P: Page>(page: &P, request: &ExtractionRequest) -> Result<Digest> {
    page.navigate(&request.url).await?;
    let value = page.evaluate(&request.script).await?;
    let digest = Digest::from_value(value)?;

    debug!(stories = digest.len(), url = %request.url, "Extraction complete");
    Ok(digest)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    use crate::browser::Launcher;
    use crate::browser::mock::MockLauncher;

    fn story_value(n: usize) -> Value {
        json!({"title": format!("Story {n}"), "link": format!("https://example.com/{n}")})
    }

    #[test]
    fn test_from_value_caps_at_first_ten_in_order() {
        let entries: Vec<Value> = (1..=15).map(story_value).collect();
        let digest = Digest::from_value(Value::Array(entries)).expect("parse");

        assert_eq!(digest.len(), MAX_STORIES);
        assert_eq!(digest.stories()[0].title, "Story 1");
        assert_eq!(digest.stories()[9].title, "Story 10");
    }

    #[test]
    fn test_empty_extraction_is_valid() {
        let digest = Digest::from_value(json!([])).expect("parse");
        assert!(digest.is_empty());
    }

    #[test]
    fn test_non_array_is_extraction_error() {
        let err = Digest::from_value(json!({"oops": true})).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn test_entries_missing_fields_are_skipped() {
        let digest = Digest::from_value(json!([
            {"title": "Complete", "link": "https://example.com"},
            {"title": "No link"},
            {"link": "https://example.com/no-title"},
            42,
        ]))
        .expect("parse");

        assert_eq!(digest.len(), 1);
        assert_eq!(digest.stories()[0].title, "Complete");
    }

    #[test]
    fn test_plain_text_format() {
        let digest = Digest::from_value(json!([
            {"title": "First", "link": "https://a.example"},
            {"title": "Second", "link": "https://b.example"},
        ]))
        .expect("parse");

        assert_eq!(
            digest.plain_text(),
            "1. First\n   https://a.example\n\n2. Second\n   https://b.example"
        );
    }

    #[test]
    fn test_numbered_titles_format() {
        let digest = Digest::from_value(json!([
            {"title": "First", "link": "https://a.example"},
            {"title": "Second", "link": "https://b.example"},
        ]))
        .expect("parse");

        assert_eq!(digest.numbered_titles(), "1. First\n2. Second");
    }

    #[tokio::test]
    async fn test_extract_through_handle() {
        let entries: Vec<Value> = (1..=15).map(story_value).collect();
        let launcher = MockLauncher::new(Value::Array(entries));
        let handle = launcher.launch().await.expect("launch");

        let request = ExtractionRequest::top_stories("https://news.ycombinator.com");
        let digest = extract(&handle, &request).await.expect("extract");

        assert_eq!(digest.len(), MAX_STORIES);
        assert_eq!(digest.stories()[0].title, "Story 1");
    }

    proptest! {
        #[test]
        fn test_digest_never_exceeds_cap(
            stories in proptest::collection::vec((".*", ".*"), 0..40)
        ) {
            let digest = Digest::from_stories(
                stories
                    .into_iter()
                    .map(|(title, link)| Story { title, link }),
            );
            prop_assert!(digest.len() <= MAX_STORIES);
        }
    }
}
