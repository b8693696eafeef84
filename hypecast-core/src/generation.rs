//! Content generation against a hosted chat-completions API.
//!
//! Provides a `ContentBackend` trait with an OpenAI-compatible implementation.
//! Transient failures (429, 5xx, timeouts, refused connections) are retried
//! with jittered exponential backoff; anything else is returned immediately.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::GenerationConfig;
use crate::models::{GeneratedPost, GenerationRequest};

pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Token cap for the connectivity check.
const CHECK_MAX_TOKENS: u32 = 5;

/// Lines shorter than this may be taken as visual text in headerless replies.
const SHORT_LINE_CHARS: usize = 100;

const VISUAL_HEADERS: [&str; 3] = ["visual text", "on-screen text", "asset text"];
const CAPTION_HEADERS: [&str; 3] = ["post caption", "caption", "description"];

// ============================================================================
// ContentBackend trait
// ============================================================================

#[async_trait]
pub trait ContentBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedPost, GenerationError>;

    /// Model identifier, for logs and exports.
    fn model(&self) -> &str;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// One cheap round trip proving the backend accepts our credentials.
    async fn check(&self) -> Result<(), GenerationError>;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Model returned an empty reply")]
    EmptyReply,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {retries} retries failed; last error: {last_error}")]
    RetryExhausted { retries: usize, last_error: String },
}

impl GenerationError {
    /// Worth another attempt: rate limits, server errors, timeouts and
    /// connection failures.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Api { code, .. } => *code == 429 || *code >= 500,
            GenerationError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Short explanation suitable for showing next to a failed post.
    pub fn user_message(&self) -> String {
        let code = match self {
            GenerationError::Api { code, .. } => Some(*code),
            _ => None,
        };
        let text = self.to_string().to_lowercase();
        let timed_out = matches!(self, GenerationError::Http(e) if e.is_timeout())
            || text.contains("timed out")
            || text.contains("timeout");
        let unreachable = matches!(self, GenerationError::Http(e) if e.is_connect())
            || text.contains("connection")
            || text.contains("network")
            || text.contains("error sending request");

        if text.contains("quota") || text.contains("billing") {
            "Billing or quota issue. Check the model API account status.".to_string()
        } else if code == Some(429) || text.contains("(429)") || text.contains("rate limit") || text.contains("rate_limit") {
            "Rate limit exceeded. Wait a moment and try again.".to_string()
        } else if matches!(self, GenerationError::MissingApiKey)
            || code == Some(401)
            || text.contains("(401)")
            || text.contains("invalid_api_key")
            || text.contains("incorrect api key")
            || text.contains("unauthorized")
        {
            "Invalid API key. Check OPENAI_API_KEY or generation.api_key.".to_string()
        } else if code == Some(404) || (text.contains("model") && text.contains("does not exist")) {
            "Model not available. Check the account's model access or configure a different model.".to_string()
        } else if timed_out {
            "Request timeout. The model API did not answer in time.".to_string()
        } else if unreachable {
            "Network connection error. The model API could not be reached.".to_string()
        } else if matches!(self, GenerationError::EmptyReply) {
            "The model returned an empty reply.".to_string()
        } else {
            format!("Model API error: {}", self)
        }
    }
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Uses `generation.api_key`, falling back to `OPENAI_API_KEY`.
    pub fn from_config(config: &GenerationConfig) -> Self {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
            timeout: Duration::from_secs(config.request_timeout_seconds),
        }
    }
}

// ============================================================================
// Chat completions API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// OpenAiContentClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiContentClient {
    client: Client,
    config: ClientConfig,
    base_url: String,
}

impl OpenAiContentClient {
    pub fn new(config: ClientConfig, base_url: impl Into<String>) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        Self::new(ClientConfig::from_config(config), config.api_base_url.clone())
    }

    /// Raw reply text, with transient failures retried.
    pub async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = RetryIf::spawn(
            retry_strategy,
            || self.complete_once(request),
            |e: &GenerationError| {
                let retry = e.is_transient();
                if retry {
                    tracing::warn!(event_id = %request.event_id, error = %e, "Transient generation failure, retrying");
                }
                retry
            },
        )
        .await;

        match result {
            Ok(text) => Ok(text),
            Err(e) if e.is_transient() => {
                tracing::error!(
                    retries = self.config.max_retries,
                    event_id = %request.event_id,
                    error = %e,
                    "All generation retries failed"
                );
                Err(GenerationError::RetryExhausted {
                    retries: self.config.max_retries,
                    last_error: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn complete_once(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.chat(&request.system_prompt, &request.user_prompt, self.config.max_tokens)
            .await
    }

    async fn chat(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "Model API error");

            return Err(GenerationError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let reply: ChatResponse = response.json().await?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(GenerationError::EmptyReply)
    }
}

#[async_trait]
impl ContentBackend for OpenAiContentClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedPost, GenerationError> {
        let text = self.complete(request).await?;
        let post = parse_dual_content(&text);

        if post.visual_text.is_empty() && post.caption.is_empty() {
            return Err(GenerationError::EmptyReply);
        }

        tracing::debug!(
            event_id = %request.event_id,
            platform = %request.platform,
            angle = %request.angle,
            "Generated post"
        );
        Ok(post)
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn name(&self) -> &str {
        "openai"
    }

    /// Single attempt, no retries; an empty reply still proves connectivity.
    async fn check(&self) -> Result<(), GenerationError> {
        match self
            .chat("You are a connectivity check.", "Reply with OK.", CHECK_MAX_TOKENS)
            .await
        {
            Ok(_) | Err(GenerationError::EmptyReply) => Ok(()),
            Err(e) => {
                tracing::warn!(model = %self.config.model, error = %e, "Model API check failed");
                Err(e)
            }
        }
    }
}

// ============================================================================
// Reply parsing
// ============================================================================

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Visual,
    Caption,
}

/// Split a model reply into visual text and caption.
///
/// Recognizes `VISUAL TEXT:` / `ON-SCREEN TEXT:` / `ASSET TEXT:` and
/// `CAPTION:` / `DESCRIPTION:` / `POST CAPTION:` headers (case-insensitive,
/// markdown emphasis ignored). Text after a header on the same line belongs
/// to that section. Without headers the first short line is the visual text
/// and everything else is caption.
pub fn parse_dual_content(reply: &str) -> GeneratedPost {
    let mut visual: Vec<String> = Vec::new();
    let mut caption: Vec<String> = Vec::new();
    let mut section: Option<Section> = None;

    for raw in reply.lines() {
        let line = raw.replace('*', "");
        let line = line.trim().trim_start_matches('#').trim();
        if line.is_empty() {
            continue;
        }

        if let Some((found, remainder)) = split_header(line) {
            section = Some(found);
            if !remainder.is_empty() {
                push_line(found, remainder, &mut visual, &mut caption);
            }
            continue;
        }

        match section {
            Some(s) => push_line(s, line, &mut visual, &mut caption),
            None if visual.is_empty() && line.chars().count() < SHORT_LINE_CHARS => {
                visual.push(line.to_string())
            }
            None => caption.push(line.to_string()),
        }
    }

    GeneratedPost {
        visual_text: visual.join(" "),
        caption: caption.join(" "),
    }
}

fn push_line(section: Section, line: &str, visual: &mut Vec<String>, caption: &mut Vec<String>) {
    match section {
        Section::Visual => visual.push(line.to_string()),
        Section::Caption => caption.push(line.to_string()),
    }
}

/// A header line starts with a known header name followed by `:`, optionally
/// with a parenthetical in between (`VISUAL TEXT (for the asset):`).
fn split_header(line: &str) -> Option<(Section, &str)> {
    let lower = line.to_ascii_lowercase();
    let candidates = VISUAL_HEADERS
        .iter()
        .map(|h| (Section::Visual, *h))
        .chain(CAPTION_HEADERS.iter().map(|h| (Section::Caption, *h)));

    for (section, header) in candidates {
        if !lower.starts_with(header) {
            continue;
        }
        let after = &lower[header.len()..];
        let after = after.trim_start();
        let colon = if after.starts_with('(') {
            after.find("):").map(|i| i + 1)
        } else if after.starts_with(':') {
            Some(0)
        } else {
            None
        };

        if let Some(colon) = colon {
            // `lower` and `line` share byte offsets for ASCII prefixes
            let consumed = line.len() - after.len() + colon + 1;
            return Some((section, line.get(consumed..).unwrap_or("").trim()));
        }
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentAngle, Platform};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: &str) -> ClientConfig {
        ClientConfig {
            api_key: api_key.to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 600,
            temperature: 0.7,
            max_retries: 3,
            retry_delay_ms: 1,
            timeout: Duration::from_secs(5),
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            event_id: "e1".to_string(),
            platform: Platform::TikTok,
            angle: ContentAngle::MajorSpike,
            system_prompt: "system rules".to_string(),
            user_prompt: "write a post".to_string(),
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    // ========================================================================
    // HTTP client
    // ========================================================================

    #[tokio::test]
    async fn test_generate_posts_chat_completion_and_parses_reply() {
        let server = MockServer::start().await;
        let client = OpenAiContentClient::new(test_config("test-key"), server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 600,
                "messages": [
                    { "role": "system", "content": "system rules" },
                    { "role": "user", "content": "write a post" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "VISUAL TEXT:\nLUNA VALE BREAKS RECORDS\n\nCAPTION:\nLuna Vale fans showed up.\n#livemusic",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let post = client.generate(&request()).await.unwrap();
        assert_eq!(post.visual_text, "LUNA VALE BREAKS RECORDS");
        assert_eq!(post.caption, "Luna Vale fans showed up. #livemusic");
    }

    #[tokio::test]
    async fn test_rate_limit_then_success_is_retried() {
        let server = MockServer::start().await;
        let client = OpenAiContentClient::new(test_config("test-key"), server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "message": "Rate limit reached for gpt-4o", "type": "requests" }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Short hook\nLonger caption line")))
            .mount(&server)
            .await;

        let post = client.generate(&request()).await.unwrap();
        assert_eq!(post.visual_text, "Short hook");
        assert_eq!(post.caption, "Longer caption line");
    }

    #[tokio::test]
    async fn test_persistent_server_error_exhausts_retries() {
        let server = MockServer::start().await;
        let client = OpenAiContentClient::new(test_config("test-key"), server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": { "message": "Internal server error" }
            })))
            .expect(4)
            .mount(&server)
            .await;

        match client.generate(&request()).await {
            Err(GenerationError::RetryExhausted { retries, last_error }) => {
                assert_eq!(retries, 3);
                assert!(last_error.contains("Internal server error"), "got {}", last_error);
            }
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        let client = OpenAiContentClient::new(test_config("bad-key"), server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "Incorrect API key provided", "code": "invalid_api_key" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Api { code: 401, .. }));
        assert!(err.user_message().starts_with("Invalid API key"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        let client = OpenAiContentClient::new(test_config("test-key"), server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyReply));
    }

    #[tokio::test]
    async fn test_check_sends_one_small_completion() {
        let server = MockServer::start().await;
        let client = OpenAiContentClient::new(test_config("test-key"), server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({ "max_tokens": CHECK_MAX_TOKENS })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("OK")))
            .expect(1)
            .mount(&server)
            .await;

        client.check().await.unwrap();
    }

    #[tokio::test]
    async fn test_check_does_not_retry() {
        let server = MockServer::start().await;
        let client = OpenAiContentClient::new(test_config("test-key"), server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": { "message": "The server is overloaded" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client.check().await.unwrap_err();
        assert!(matches!(err, GenerationError::Api { code: 503, .. }));
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let result = OpenAiContentClient::new(test_config("  "), DEFAULT_API_BASE_URL);
        assert!(matches!(result, Err(GenerationError::MissingApiKey)));
    }

    #[test]
    fn test_configured_key_wins_over_environment() {
        let config = GenerationConfig {
            api_key: Some("from-config".to_string()),
            model: "gpt-4o-mini".to_string(),
            request_timeout_seconds: 12,
            ..Default::default()
        };
        let client_config = ClientConfig::from_config(&config);
        assert_eq!(client_config.api_key, "from-config");
        assert_eq!(client_config.model, "gpt-4o-mini");
        assert_eq!(client_config.timeout, Duration::from_secs(12));
    }

    // ========================================================================
    // Error classification
    // ========================================================================

    #[test]
    fn test_user_message_classification() {
        let api = |code: u16, message: &str| GenerationError::Api {
            code,
            message: message.to_string(),
        };

        assert!(api(429, "You exceeded your current quota").user_message().starts_with("Billing or quota"));
        assert!(api(429, "Rate limit reached").user_message().starts_with("Rate limit"));
        assert!(api(401, "bad key").user_message().starts_with("Invalid API key"));
        assert!(api(404, "The model `gpt-9` does not exist").user_message().starts_with("Model not available"));
        assert!(GenerationError::MissingApiKey.user_message().starts_with("Invalid API key"));
        assert!(api(400, "context length").user_message().starts_with("Model API error"));

        let exhausted = GenerationError::RetryExhausted {
            retries: 3,
            last_error: "API error (429): slow down".to_string(),
        };
        assert!(exhausted.user_message().starts_with("Rate limit"));
    }

    #[test]
    fn test_transient_classification() {
        let api = |code: u16| GenerationError::Api {
            code,
            message: String::new(),
        };
        assert!(api(429).is_transient());
        assert!(api(503).is_transient());
        assert!(!api(400).is_transient());
        assert!(!api(401).is_transient());
        assert!(!GenerationError::EmptyReply.is_transient());
    }

    // ========================================================================
    // Reply parsing
    // ========================================================================

    #[test]
    fn test_parse_headed_reply_with_markdown() {
        let post = parse_dual_content(
            "**VISUAL TEXT (for the asset):**\n\"THE WHOLE WORLD FLEW IN\"\n\n**CAPTION:**\nLuna Vale in Lisbon.\nWhere did you fly from?",
        );
        assert_eq!(post.visual_text, "\"THE WHOLE WORLD FLEW IN\"");
        assert_eq!(post.caption, "Luna Vale in Lisbon. Where did you fly from?");
    }

    #[test]
    fn test_parse_keeps_text_after_header_on_same_line() {
        let post = parse_dual_content("On-screen text: SOLD OUT ENERGY\nPost caption: The Static take Austin");
        assert_eq!(post.visual_text, "SOLD OUT ENERGY");
        assert_eq!(post.caption, "The Static take Austin");
    }

    #[test]
    fn test_parse_headerless_reply() {
        let long = "x".repeat(120);
        let post = parse_dual_content(&format!("{}\nHook line\nmore caption", long));
        assert_eq!(post.visual_text, "Hook line");
        assert_eq!(post.caption, format!("{} more caption", long));
    }

    #[test]
    fn test_caption_word_inside_text_is_not_a_header() {
        let post = parse_dual_content("VISUAL TEXT:\nNo caption needed: just vibes");
        assert_eq!(post.visual_text, "No caption needed: just vibes");
        assert!(post.caption.is_empty());
    }
}
