//! Google Gemini backend
//!
//! Speaks the `v1beta/models/{model}:generateContent` REST API. The full
//! conversation history is sent with every request; the system prompt is
//! carried as a priming exchange at the head of that history.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use call_agent_config::LlmSettings;
use call_agent_core::{
    BackendError, ChatRole, ChatTurn, ConversationBackend, ConversationHandle,
};

use crate::LlmError;

const STYLE_INSTRUCTION: &str =
    "Keep your replies short, natural and conversational. Do not open with a greeting, get straight to the point.";
const PRIMING_ACK: &str = "Understood.";

/// Gemini backend configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// API base URL
    pub endpoint: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            temperature: 0.7,
            max_tokens: 256,
            timeout: Duration::from_secs(10),
            max_retries: 1,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

impl From<&LlmSettings> for GeminiConfig {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            endpoint: settings.endpoint.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: Duration::from_millis(settings.timeout_ms),
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl From<&ChatTurn> for Content {
    fn from(turn: &ChatTurn) -> Self {
        let role = match turn.role {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        };
        Content {
            role: role.to_string(),
            parts: vec![Part {
                text: Some(turn.text.clone()),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, LlmError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::InvalidResponse(format!("Prompt blocked: {}", reason)));
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No candidates".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse(format!(
                "Empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }
}

/// Gemini conversational backend
pub struct GeminiBackend {
    client: Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn api_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            model
        )
    }

    fn build_request(&self, history: &[ChatTurn], utterance: &str) -> GenerateContentRequest {
        let mut contents: Vec<Content> = history.iter().map(Content::from).collect();
        contents.push(Content::from(&ChatTurn::user(utterance)));

        GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
            },
        }
    }

    /// Generate with retry logic for transient failures
    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<String, BackendError> {
        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    "Gemini request failed, retrying in {:?} (attempt {}/{})",
                    backoff,
                    attempt,
                    self.config.max_retries
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self
                .execute_request(model, request)
                .await
                .map_err(BackendError::from)
            {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| BackendError::Network("Max retries exceeded".to_string())))
    }

    async fn execute_request(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<String, LlmError> {
        let response = self
            .client
            .post(self.api_url(model))
            .header("x-goog-api-key", &self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        parsed.into_text()
    }
}

#[async_trait]
impl ConversationBackend for GeminiBackend {
    async fn start(
        &self,
        model: &str,
        system_prompt: &str,
    ) -> Result<ConversationHandle, BackendError> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::Configuration("Gemini API key is not set".to_string()).into());
        }
        if model.trim().is_empty() {
            return Err(LlmError::Configuration("Model name is empty".to_string()).into());
        }

        let mut handle = ConversationHandle::new(model);
        handle.history.push(ChatTurn::user(format!(
            "SYSTEM INSTRUCTION: {}\n\n{}",
            system_prompt, STYLE_INSTRUCTION
        )));
        handle.history.push(ChatTurn::model(PRIMING_ACK));

        Ok(handle)
    }

    async fn send(
        &self,
        handle: &mut ConversationHandle,
        utterance: &str,
    ) -> Result<String, BackendError> {
        let start = Instant::now();
        let request = self.build_request(&handle.history, utterance);

        let reply = self.generate(&handle.model, &request).await?;

        tracing::debug!(
            model = %handle.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Gemini reply received"
        );

        handle.record_exchange(utterance, reply.clone());
        Ok(reply)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn backend(endpoint: &str) -> GeminiBackend {
        GeminiBackend::new(GeminiConfig {
            api_key: "test-key".to_string(),
            endpoint: endpoint.to_string(),
            max_retries: 1,
            initial_backoff: Duration::from_millis(10),
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap()
    }

    /// Read a full HTTP request (headers plus Content-Length body)
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
            request
        });

        (format!("http://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_start_primes_history() {
        let handle = backend("http://localhost")
            .start("gemini-2.0-flash-exp", "You are a support agent.")
            .await
            .unwrap();

        assert_eq!(handle.model, "gemini-2.0-flash-exp");
        assert_eq!(handle.history.len(), 2);
        assert_eq!(handle.history[0].role, ChatRole::User);
        assert!(handle.history[0]
            .text
            .starts_with("SYSTEM INSTRUCTION: You are a support agent."));
        assert_eq!(handle.history[1], ChatTurn::model(PRIMING_ACK));
    }

    #[tokio::test]
    async fn test_start_without_api_key() {
        let backend = GeminiBackend::new(GeminiConfig::default()).unwrap();
        let result = backend.start("gemini-2.0-flash-exp", "prompt").await;
        assert!(matches!(result, Err(BackendError::Configuration(_))));
    }

    #[test]
    fn test_request_shape() {
        let backend = backend("http://localhost");
        let history = vec![ChatTurn::user("SYSTEM INSTRUCTION: x"), ChatTurn::model("Understood.")];
        let request = backend.build_request(&history, "merhaba");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["role"], "user");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "merhaba");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn test_api_url() {
        let backend = backend("https://generativelanguage.googleapis.com/");
        assert_eq!(
            backend.api_url("gemini-2.0-flash-exp"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-exp:generateContent"
        );
    }

    #[test]
    fn test_response_parsing() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Merhaba, " }, { "text": "buyurun." }] },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "Merhaba, buyurun.");

        let blocked: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        assert!(matches!(blocked.into_text(), Err(LlmError::InvalidResponse(_))));

        let empty: GenerateContentResponse =
            serde_json::from_value(serde_json::json!({ "candidates": [] })).unwrap();
        assert!(empty.into_text().is_err());
    }

    #[tokio::test]
    async fn test_send_records_exchange() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Size nasıl yardımcı olabilirim?"}]},"finishReason":"STOP"}]}"#,
        )
        .await;

        let backend = backend(&url);
        let mut handle = backend.start("gemini-2.0-flash-exp", "Be brief.").await.unwrap();
        let reply = backend.send(&mut handle, "merhaba").await.unwrap();

        assert_eq!(reply, "Size nasıl yardımcı olabilirim?");
        assert_eq!(handle.history.len(), 4);
        assert_eq!(handle.history[2], ChatTurn::user("merhaba"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1beta/models/gemini-2.0-flash-exp:generateContent"));
        assert!(request.to_lowercase().contains("x-goog-api-key: test-key"));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (url, _server) = serve_once(
            "HTTP/1.1 400 Bad Request",
            r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#,
        )
        .await;

        let backend = backend(&url);
        let mut handle = backend.start("gemini-2.0-flash-exp", "Be brief.").await.unwrap();
        let result = backend.send(&mut handle, "merhaba").await;

        match result {
            Err(BackendError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(handle.history.len(), 2);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (url, server) = serve_once(
            "HTTP/1.1 503 Service Unavailable",
            r#"{"error":{"code":503,"message":"overloaded","status":"UNAVAILABLE"}}"#,
        )
        .await;

        let backend = backend(&url);
        let mut handle = backend.start("gemini-2.0-flash-exp", "Be brief.").await.unwrap();
        let result = backend.send(&mut handle, "merhaba").await;
        server.await.unwrap();

        // The retry finds the one-shot server gone
        assert!(
            matches!(result, Err(BackendError::Network(_)) | Err(BackendError::Timeout)),
            "unexpected result: {:?}",
            result
        );
        assert_eq!(handle.history.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_leaves_history_untouched() {
        let backend = backend("http://127.0.0.1:1");
        let mut handle = backend.start("gemini-2.0-flash-exp", "Be brief.").await.unwrap();
        let result = backend.send(&mut handle, "merhaba").await;

        assert!(matches!(result, Err(BackendError::Network(_))));
        assert_eq!(handle.history.len(), 2);
    }
}
