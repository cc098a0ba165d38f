//! LLM backend trait and the two hosted providers radscope talks to.
//!
//! Backends:
//!   OpenAiBackend  — OpenAI chat completions (gpt-4o, gpt-4o-mini, …)
//!   GeminiBackend  — Google Gemini `generateContent` (gemini-1.5-flash, …)
//!
//! Both accept image attachments: OpenAI as `image_url` data URLs, Gemini as
//! `inline_data` parts.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
}

// ── Request / Response ────────────────────────────────────────────────────────

/// Base64 image attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePart {
    pub mime_type: String,
    pub data_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,   // "system" | "user" | "assistant"
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImagePart>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into(), images: Vec::new() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into(), images: Vec::new() }
    }

    pub fn with_image(mut self, mime_type: impl Into<String>, data_base64: impl Into<String>) -> Self {
        self.images.push(ImagePart { mime_type: mime_type.into(), data_base64: data_base64.into() });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LlmRequest {
    /// Single user prompt with backend defaults.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self { messages: vec![Message::user(text)], model: None, max_tokens: None, temperature: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
    /// Short provider name used in logs and the health endpoint.
    fn provider(&self) -> &'static str;
    fn max_output_tokens(&self) -> usize;
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

// ── Helper: OpenAI wire format ───────────────────────────────────────────────

pub(crate) fn openai_body(req: &LlmRequest, default_model: &str) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = req.messages.iter()
        .map(|m| {
            if m.images.is_empty() {
                return serde_json::json!({"role": m.role, "content": m.content});
            }
            let mut parts = vec![serde_json::json!({"type": "text", "text": m.content})];
            parts.extend(m.images.iter().map(|img| serde_json::json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{}", img.mime_type, img.data_base64) }
            })));
            serde_json::json!({"role": m.role, "content": parts})
        })
        .collect();

    serde_json::json!({
        "model":       req.model.as_deref().unwrap_or(default_model),
        "messages":    messages,
        "max_tokens":  req.max_tokens.unwrap_or(4096),
        "temperature": req.temperature.unwrap_or(0.1),
    })
}

pub(crate) fn parse_openai_response(json: &serde_json::Value, fallback_model: &str) -> LlmResponse {
    LlmResponse {
        content: json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        model: json["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string(),
        prompt_tokens:     json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    }
}

// ── Helper: Gemini wire format ───────────────────────────────────────────────

pub(crate) fn gemini_body(req: &LlmRequest) -> serde_json::Value {
    // System message → systemInstruction
    let system_text = req.messages.iter()
        .find(|m| m.role == "system")
        .map(|m| m.content.clone());

    let contents: Vec<serde_json::Value> = req.messages.iter()
        .filter(|m| m.role != "system")
        .map(|m| {
            let role = if m.role == "assistant" { "model" } else { "user" };
            let mut parts = vec![serde_json::json!({ "text": m.content })];
            parts.extend(m.images.iter().map(|img| serde_json::json!({
                "inline_data": { "mime_type": img.mime_type, "data": img.data_base64 }
            })));
            serde_json::json!({ "role": role, "parts": parts })
        })
        .collect();

    let mut body = serde_json::json!({
        "contents": contents,
        "generationConfig": {
            "maxOutputTokens": req.max_tokens.unwrap_or(4096),
            "temperature":     req.temperature.unwrap_or(0.1),
        }
    });
    if let Some(sys) = system_text {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{ "text": sys }]
        });
    }
    body
}

pub(crate) fn parse_gemini_response(json: &serde_json::Value, model: &str) -> LlmResponse {
    // Long replies can be split over several parts.
    let content = json["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect::<String>())
        .unwrap_or_default();

    LlmResponse {
        content,
        model: json["modelVersion"].as_str().unwrap_or(model).to_string(),
        prompt_tokens:     json["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
    }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    if status == 429 {
        return Err(LlmError::RateLimitExceeded);
    }
    if status >= 400 {
        let body: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
        let msg = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| if text.is_empty() { "unknown API error".to_string() } else { text.clone() });
        return Err(LlmError::ApiError { status, message: msg });
    }
    Ok(serde_json::from_str(&text)?)
}

// ── 1. OpenAI ─────────────────────────────────────────────────────────────────

pub struct OpenAiBackend {
    pub model: String,
    pub base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key,
            client: http_client(Duration::from_secs(60)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = openai_body(&req, &self.model);
        let resp = self.client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        Ok(parse_openai_response(&json, &self.model))
    }

    fn model_id(&self) -> &str { &self.model }
    fn provider(&self) -> &'static str { "openai" }
    fn max_output_tokens(&self) -> usize { 16_384 }
}

// ── 2. Google Gemini ──────────────────────────────────────────────────────────

pub struct GeminiBackend {
    pub model: String,
    pub base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            client: http_client(Duration::from_secs(60)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = req.model.as_deref().unwrap_or(&self.model);
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );
        let body = gemini_body(&req);
        let resp = self.client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        Ok(parse_gemini_response(&json, model))
    }

    fn model_id(&self) -> &str { &self.model }
    fn provider(&self) -> &'static str { "gemini" }
    fn max_output_tokens(&self) -> usize { 8_192 }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    fn key() -> SecretString {
        SecretString::from("sk-test")
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_backend_identity() {
        let b = OpenAiBackend::new(key(), "gpt-4o");
        assert_eq!(b.model_id(), "gpt-4o");
        assert_eq!(b.provider(), "openai");

        let g = GeminiBackend::new(key(), "gemini-1.5-flash");
        assert_eq!(g.provider(), "gemini");
        assert_eq!(g.max_output_tokens(), 8_192);
    }

    #[test]
    fn test_openai_body_uses_data_url_for_images() {
        let req = LlmRequest {
            messages: vec![
                Message::system("sys"),
                Message::user("look").with_image("image/jpeg", "QUJD"),
            ],
            model: None,
            max_tokens: Some(1000),
            temperature: Some(0.1),
        };
        let body = openai_body(&req, "gpt-4o");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["content"], "sys");
        assert_eq!(body["messages"][1]["content"][0]["type"], "text");
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,QUJD"
        );
    }

    #[test]
    fn test_gemini_body_moves_system_prompt() {
        let req = LlmRequest {
            messages: vec![
                Message::system("be brief"),
                Message::user("hi").with_image("image/png", "AAAA"),
            ],
            model: None,
            max_tokens: None,
            temperature: None,
        };
        let body = gemini_body(&req);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[test]
    fn test_parse_gemini_joins_parts() {
        let json = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "a" }, { "text": "b" }] } }],
            "usageMetadata": { "promptTokenCount": 3, "candidatesTokenCount": 2 }
        });
        let r = parse_gemini_response(&json, "gemini-1.5-flash");
        assert_eq!(r.content, "ab");
        assert_eq!(r.model, "gemini-1.5-flash");
        assert_eq!(r.prompt_tokens, 3);
    }

    #[tokio::test]
    async fn test_openai_round_trip_against_mock() {
        let app = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["model"], "gpt-4o");
                Json(serde_json::json!({
                    "model": "gpt-4o-2024",
                    "choices": [{ "message": { "content": "hello" } }],
                    "usage": { "prompt_tokens": 7, "completion_tokens": 1 }
                }))
            }),
        );
        let base = serve(app).await;
        let b = OpenAiBackend::new(key(), "gpt-4o").with_base_url(base);
        let r = b.complete(LlmRequest::prompt("hi")).await.unwrap();
        assert_eq!(r.content, "hello");
        assert_eq!(r.model, "gpt-4o-2024");
        assert_eq!(r.completion_tokens, 1);
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        use axum::http::StatusCode;
        let app = Router::new()
            .route(
                "/models/{model}",
                post(|| async {
                    (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": {"message": "bad key"}})))
                }),
            )
            .route("/chat/completions", post(|| async { StatusCode::TOO_MANY_REQUESTS }));
        let base = serve(app).await;

        let g = GeminiBackend::new(key(), "gemini-1.5-flash").with_base_url(base.clone());
        match g.complete(LlmRequest::prompt("x")).await {
            Err(LlmError::ApiError { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let o = OpenAiBackend::new(key(), "gpt-4o").with_base_url(base);
        assert!(matches!(o.complete(LlmRequest::prompt("x")).await, Err(LlmError::RateLimitExceeded)));
    }
}
