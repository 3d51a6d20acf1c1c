//! Google Generative Language API (Gemini) backend.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, Role};
use crate::retry::{DEFAULT_MAX_RETRIES, send_with_retry, success_body};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

const PROVIDER: &str = "gemini";

#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
    temperature: f32,
    max_retries: u32,
}

impl fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    /// # Errors
    ///
    /// Returns `LlmError::InvalidConfig` when the API key is empty.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::InvalidConfig(
                "Gemini API key cannot be empty".into(),
            ));
        }
        Ok(Self {
            client: crate::http::default_client(crate::http::DEFAULT_TIMEOUT),
            api_key,
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: model.into(),
            embedding_model: embedding_model.into(),
            temperature: 0.1,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        self.base_url = base_url;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn model_url(&self, model: &str, action: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{model}:{action}", self.base_url)
    }

    async fn post_json<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<String, LlmError> {
        let response = send_with_retry(PROVIDER, self.max_retries, || {
            self.client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
        })
        .await?;
        success_body(PROVIDER, response).await
    }
}

impl LlmProvider for GeminiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let (system_instruction, contents) = convert_messages(messages);
        let body = GenerateRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        let url = self.model_url(&self.model, "generateContent");
        let text = self.post_json(&url, &body).await?;
        let resp: GenerateResponse = serde_json::from_str(&text)?;

        let answer: String = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if answer.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: PROVIDER.into(),
            });
        }
        Ok(answer)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_with_task(text, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_with_task(text, TaskType::RetrievalQuery).await
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        PROVIDER
    }
}

impl GeminiProvider {
    async fn embed_with_task(&self, text: &str, task: TaskType) -> Result<Vec<f32>, LlmError> {
        let model_name = self.embedding_model.strip_prefix("models/").unwrap_or(&self.embedding_model);
        let body = EmbedRequest {
            model: format!("models/{model_name}"),
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
            task_type: Some(task),
        };

        let url = self.model_url(&self.embedding_model, "embedContent");
        let text = self.post_json(&url, &body).await?;
        let resp: EmbedResponse = serde_json::from_str(&text)?;

        if resp.embedding.values.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: PROVIDER.into(),
            });
        }
        Ok(resp.embedding.values)
    }
}

/// System messages are merged into a single `systemInstruction`; Gemini calls the assistant `model`.
fn convert_messages(messages: &[Message]) -> (Option<Content<'_>>, Vec<Content<'_>>) {
    let system_parts: Vec<Part<'_>> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| Part { text: &m.content })
        .collect();

    let contents = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| Content {
            role: Some(match m.role {
                Role::Assistant => "model",
                _ => "user",
            }),
            parts: vec![Part { text: &m.content }],
        })
        .collect();

    let system = (!system_parts.is_empty()).then_some(Content {
        role: None,
        parts: system_parts,
    });
    (system, contents)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

/// Tells Gemini which side of a retrieval the embedding is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<TaskType>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider(server: &MockServer) -> GeminiProvider {
        GeminiProvider::new("test-key", DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL)
            .unwrap()
            .with_base_url(server.uri())
            .with_max_retries(0)
    }

    #[test]
    fn empty_api_key_rejected() {
        let result = GeminiProvider::new("  ", "m", "e");
        assert!(matches!(result, Err(LlmError::InvalidConfig(_))));
    }

    #[test]
    fn debug_redacts_key() {
        let p = GeminiProvider::new("super-secret", "m", "e").unwrap();
        let dbg = format!("{p:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn model_url_strips_models_prefix() {
        let p = GeminiProvider::new("k", "m", "e")
            .unwrap()
            .with_base_url("http://host/");
        assert_eq!(
            p.model_url("models/text-embedding-004", "embedContent"),
            "http://host/v1beta/models/text-embedding-004:embedContent"
        );
    }

    #[test]
    fn convert_messages_splits_system() {
        let msgs = vec![
            Message::system("be brief"),
            Message::user("hello"),
            Message::new(Role::Assistant, "hi"),
        ];
        let (system, contents) = convert_messages(&msgs);
        let system = system.unwrap();
        assert_eq!(system.parts.len(), 1);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role, Some("user"));
        assert_eq!(contents[1].role, Some("model"));
    }

    #[tokio::test]
    async fn chat_parses_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash-exp:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({"generationConfig": {"temperature": 0.1}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Hello"}, {"text": " there"}]}
                }]
            })))
            .mount(&server)
            .await;

        let answer = provider(&server)
            .chat(&[Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(answer, "Hello there");
    }

    #[tokio::test]
    async fn chat_without_candidates_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = provider(&server)
            .chat(&[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn embed_returns_values() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/text-embedding-004:embedContent"))
            .and(body_partial_json(json!({"model": "models/text-embedding-004"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embedding": {"values": [0.1, 0.2, 0.3]}
            })))
            .mount(&server)
            .await;

        let v = provider(&server).embed("text").await.unwrap();
        assert_eq!(v.len(), 3);
    }

    #[tokio::test]
    async fn embeddings_carry_retrieval_task_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"taskType": "RETRIEVAL_DOCUMENT"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embedding": {"values": [1.0]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"taskType": "RETRIEVAL_QUERY"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embedding": {"values": [2.0, 2.0]}
            })))
            .mount(&server)
            .await;

        let p = provider(&server);
        assert_eq!(p.embed("chunk").await.unwrap(), vec![1.0]);
        assert_eq!(p.embed_query("question?").await.unwrap(), vec![2.0, 2.0]);
    }

    #[tokio::test]
    async fn api_error_status_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "denied", "status": "PERMISSION_DENIED"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server).embed("text").await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 403, .. }));
    }
}
