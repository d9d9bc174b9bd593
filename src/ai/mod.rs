//! AI commentary: personas, completion client, and fallbacks.
//!
//! The completion primitive is reached through the [`Completer`] trait; the
//! production implementation is [`AiClient`], a thin JSON client for an AI
//! gateway. Completion failures never fail a digest: the page path degrades
//! to [`ANALYSIS_FALLBACK`] and the email path degrades to the plain
//! numbered story list.

// ============================================================================
// Imports
// ============================================================================

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::config::AiConfig;
use crate::digest::Digest;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Fallback shown on the page when analysis cannot be generated.
pub const ANALYSIS_FALLBACK: &str = "Analysis failed to generate.";

/// Token budget for both analysis and email composition.
const MAX_TOKENS: u32 = 2048;

/// Sampling temperature for page analysis.
const ANALYSIS_TEMPERATURE: f32 = 0.7;

/// Sampling temperature for email composition.
const EMAIL_TEMPERATURE: f32 = 0.5;

/// Gateway cache header carrying the configured TTL.
const CACHE_TTL_HEADER: &str = "cf-aig-cache-ttl";

const TED_LASSO_PROMPT: &str = "You are Ted Lasso, the optimistic football coach. \
With your characteristic warmth, folksy wisdom, and endless optimism, analyze these \
Hacker News stories. Use Ted Lasso-style metaphors, reference biscuits, football \
(soccer), and keep it believe-ingly positive!";

const STEPHEN_A_PROMPT: &str = "You are Stephen A. Smith, the passionate sports \
commentator. With your signature dramatic flair and strong opinions, analyze these \
Hacker News stories. Use your catchphrases, dramatic pauses (marked with ...), and \
bold declarations. Stay BLASPHEMOUS!";

const EMAIL_SYSTEM_PROMPT: &str = "You are a friendly assistant";

// ============================================================================
// Tone
// ============================================================================

/// Named AI commentary persona, selected via the `tone` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Relentlessly optimistic football-coach commentary.
    TedLasso,
    /// Dramatic sports-desk commentary.
    StephenA,
}

impl Tone {
    /// Returns the fixed system prompt for this persona.
    #[must_use]
    pub fn system_prompt(self) -> &'static str {
        match self {
            Self::TedLasso => TED_LASSO_PROMPT,
            Self::StephenA => STEPHEN_A_PROMPT,
        }
    }

    /// Returns the display name used in page headings.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::TedLasso => "Ted Lasso",
            Self::StephenA => "Stephen A. Smith",
        }
    }

    /// Returns the query-parameter value selecting this persona.
    #[must_use]
    pub fn query_value(self) -> &'static str {
        match self {
            Self::TedLasso => "tedlasso",
            Self::StephenA => "stephena",
        }
    }
}

impl FromStr for Tone {
    type Err = ();

    /// Parses a `tone` query value. Anything unrecognized (including
    /// `none`) selects no persona.
    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "tedlasso" => Ok(Self::TedLasso),
            "stephena" => Ok(Self::StephenA),
            _ => Err(()),
        }
    }
}

// ============================================================================
// CompletionRequest
// ============================================================================

/// One completion call: a system/user message pair plus sampling options.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt.
    pub system: String,
    /// User prompt.
    pub user: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Chat message in the gateway wire format.
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// ============================================================================
// Completer
// ============================================================================

/// AI completion primitive.
///
/// Returns the normalized completion text; the union-of-field-names shape
/// of the upstream response never leaks past the implementation.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Runs one completion.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

// ============================================================================
// AiClient
// ============================================================================

/// JSON client for an AI completion gateway.
pub struct AiClient {
    http: reqwest::Client,
    url: Option<String>,
    model: String,
    api_token: Option<String>,
    cache_ttl_secs: u32,
}

impl AiClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            model: config.model.clone(),
            api_token: config.api_token.clone(),
            cache_ttl_secs: config.cache_ttl_secs,
        })
    }
}

#[async_trait]
impl Completer for AiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let Some(url) = self.url.as_deref() else {
            return Err(Error::ai_completion("no completion endpoint configured"));
        };

        let messages = [
            ChatMessage {
                role: "system",
                content: &request.system,
            },
            ChatMessage {
                role: "user",
                content: &request.user,
            },
        ];

        let mut call = self
            .http
            .post(url)
            .header(CACHE_TTL_HEADER, self.cache_ttl_secs)
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "max_tokens": request.max_tokens,
                "temperature": request.temperature,
            }));

        if let Some(token) = &self.api_token {
            call = call.bearer_auth(token);
        }

        let body: Value = call
            .send()
            .await
            .map_err(|e| Error::ai_completion(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::ai_completion(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::ai_completion(e.to_string()))?;

        normalize_completion(&body)
            .ok_or_else(|| Error::ai_completion("unrecognized completion response shape"))
    }
}

// ============================================================================
// Response Normalization
// ============================================================================

/// Normalizes the gateway response to the completion text.
///
/// Upstream models disagree on the field carrying the text, so this is the
/// one place that knows the candidates. Checked in order (`text`,
/// `response`, `content`), first at the top level, then under `result`
/// (the envelope some gateways add).
#[must_use]
pub fn normalize_completion(body: &Value) -> Option<String> {
    const FIELDS: [&str; 3] = ["text", "response", "content"];

    for scope in [Some(body), body.get("result")] {
        let Some(scope) = scope else { continue };
        for field in FIELDS {
            if let Some(text) = scope.get(field).and_then(Value::as_str)
                && !text.is_empty()
            {
                return Some(text.to_string());
            }
        }
    }

    None
}

// ============================================================================
// Digest Commentary
// ============================================================================

/// Generates persona commentary for the digest page.
///
/// Failure is absorbed: the caller always gets displayable text, falling
/// back to [`ANALYSIS_FALLBACK`].
pub async fn analyze_stories(completer: &dyn Completer, digest: &Digest, tone: Tone) -> String {
    let request = CompletionRequest {
        system: tone.system_prompt().to_string(),
        user: format!(
            "Analyze these top Hacker News stories and provide a brief, engaging summary:\n\n{}",
            digest.numbered_titles()
        ),
        max_tokens: MAX_TOKENS,
        temperature: ANALYSIS_TEMPERATURE,
    };

    match completer.complete(request).await {
        Ok(text) => text,
        Err(e) => {
            warn!(tone = tone.query_value(), error = %e, "AI analysis failed; using fallback");
            ANALYSIS_FALLBACK.to_string()
        }
    }
}

/// Composes the digest email body.
///
/// Failure is absorbed: falls back to the plain numbered story list so the
/// email is still delivered.
pub async fn compose_email_body(completer: &dyn Completer, digest: &Digest) -> String {
    let plain = digest.plain_text();

    let request = CompletionRequest {
        system: EMAIL_SYSTEM_PROMPT.to_string(),
        user: format!(
            "Compose an email body explaining and analyzing the top 10 Hacker News stories. \
             Do not have a preamble or closing. Here are the stories: {plain}"
        ),
        max_tokens: MAX_TOKENS,
        temperature: EMAIL_TEMPERATURE,
    };

    match completer.complete(request).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "AI email composition failed; sending plain digest");
            plain
        }
    }
}

// ============================================================================
// Test Mocks
// ============================================================================

#[cfg(test)]
pub(crate) mod mock {
    //! Canned completer used by the server and scheduler tests.

    use async_trait::async_trait;

    use crate::error::{Error, Result};

    use super::{Completer, CompletionRequest};

    /// Completer returning a fixed reply, or failing every call.
    pub struct MockCompleter {
        reply: Option<String>,
    }

    impl MockCompleter {
        pub fn replying(text: impl Into<String>) -> Self {
            Self {
                reply: Some(text.into()),
            }
        }

        pub fn failing() -> Self {
            Self { reply: None }
        }
    }

    #[async_trait]
    impl Completer for MockCompleter {
        async fn complete(&self, _request: CompletionRequest) -> Result<String> {
            match &self.reply {
                Some(text) => Ok(text.clone()),
                None => Err(Error::ai_completion("simulated timeout")),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::digest::Digest;

    use super::mock::MockCompleter;

    fn sample_digest() -> Digest {
        Digest::from_value(json!([
            {"title": "First", "link": "https://a.example"},
            {"title": "Second", "link": "https://b.example"},
        ]))
        .expect("digest")
    }

    #[test]
    fn test_tone_parsing() {
        assert_eq!("tedlasso".parse(), Ok(Tone::TedLasso));
        assert_eq!("stephena".parse(), Ok(Tone::StephenA));
        assert!("none".parse::<Tone>().is_err());
        assert!("shakespeare".parse::<Tone>().is_err());
    }

    #[test]
    fn test_tone_round_trip() {
        for tone in [Tone::TedLasso, Tone::StephenA] {
            assert_eq!(tone.query_value().parse(), Ok(tone));
        }
    }

    #[test]
    fn test_normalize_prefers_text_field() {
        let body = json!({"text": "from text", "response": "from response"});
        assert_eq!(normalize_completion(&body).as_deref(), Some("from text"));
    }

    #[test]
    fn test_normalize_falls_through_field_chain() {
        assert_eq!(
            normalize_completion(&json!({"response": "r"})).as_deref(),
            Some("r")
        );
        assert_eq!(
            normalize_completion(&json!({"content": "c"})).as_deref(),
            Some("c")
        );
    }

    #[test]
    fn test_normalize_reads_result_envelope() {
        let body = json!({"success": true, "result": {"response": "wrapped"}});
        assert_eq!(normalize_completion(&body).as_deref(), Some("wrapped"));
    }

    #[test]
    fn test_normalize_rejects_unknown_shapes() {
        assert!(normalize_completion(&json!({"output": "nope"})).is_none());
        assert!(normalize_completion(&json!({"text": ""})).is_none());
        assert!(normalize_completion(&json!(null)).is_none());
    }

    #[tokio::test]
    async fn test_analyze_uses_completion() {
        let completer = MockCompleter::replying("Believe!");
        let text = analyze_stories(&completer, &sample_digest(), Tone::TedLasso).await;
        assert_eq!(text, "Believe!");
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_failure() {
        let completer = MockCompleter::failing();
        let text = analyze_stories(&completer, &sample_digest(), Tone::StephenA).await;
        assert_eq!(text, ANALYSIS_FALLBACK);
    }

    #[tokio::test]
    async fn test_email_body_falls_back_to_plain_digest() {
        let completer = MockCompleter::failing();
        let digest = sample_digest();
        let body = compose_email_body(&completer, &digest).await;
        assert_eq!(body, digest.plain_text());
    }

    #[tokio::test]
    async fn test_unconfigured_client_reports_completion_error() {
        let client = AiClient::from_config(&crate::config::AiConfig::default()).expect("client");
        let err = client
            .complete(CompletionRequest {
                system: "s".into(),
                user: "u".into(),
                max_tokens: 16,
                temperature: 0.0,
            })
            .await
            .unwrap_err();
        assert!(err.is_absorbed());
    }
}
