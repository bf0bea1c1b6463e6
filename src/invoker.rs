//! # Backend Invoker Module
//!
//! Issues exactly one chat-completion request to one backend. The invoker
//! never retries; it classifies the outcome into [`InvokeError`] and leaves
//! the decision to the orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{Credentials, DEFAULT_TEMPERATURE};
use crate::errors::InvokeError;
use crate::registry::{BackendDescriptor, Provider};

const MAX_ERROR_BODY_CHARS: usize = 300;
const WEB_PLUGIN_MAX_RESULTS: u32 = 3;

pub const SYSTEM_INSTRUCTION: &str = "Ты — топовый эксперт по B2B продажам. Твоя цель — составить структуру \
убойного Коммерческого Предложения. Пиши уверенно, без воды. \
Используй маркетинговые триггеры. Цены придумывай реалистичные, если не указаны. \
Отвечай только JSON-объектом, без пояснений и без markdown.";

/// JSON schema of the proposal object requested from the models
pub fn proposal_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string", "description": "Цепляющий заголовок КП"},
            "executive_summary": {"type": "string", "description": "Краткая суть предложения (2-3 предложения)"},
            "client_pain_points": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Список из 3-4 болей клиента, которые мы решаем"
            },
            "solution_steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "step_name": {"type": "string"},
                        "description": {"type": "string"}
                    },
                    "required": ["step_name", "description"]
                },
                "description": "Этапы работы"
            },
            "budget_items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "item": {"type": "string", "description": "Название услуги"},
                        "price": {"type": "string", "description": "Стоимость (например '50 000 руб')"},
                        "time": {"type": "string", "description": "Срок (например '2 дня')"}
                    },
                    "required": ["item", "price", "time"]
                }
            },
            "why_us": {"type": "string", "description": "Блок 'Почему мы'"},
            "cta": {"type": "string", "description": "Призыв к действию (Call to Action)"}
        },
        "required": ["title", "executive_summary", "budget_items", "cta"]
    })
}

/// Input of one backend call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub brief: String,
    /// Optional grounding text; empty means none
    pub context: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl GenerationRequest {
    pub fn new(brief: impl Into<String>, context: impl Into<String>, timeout: Duration) -> Self {
        Self {
            brief: brief.into(),
            context: context.into(),
            temperature: DEFAULT_TEMPERATURE,
            timeout,
        }
    }
}

/// A single call to a single backend
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Return the generated text or a classified failure
    async fn invoke(
        &self,
        descriptor: &BackendDescriptor,
        request: &GenerationRequest,
    ) -> Result<String, InvokeError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

fn user_content(descriptor: &BackendDescriptor, request: &GenerationRequest) -> String {
    let mut content = request.brief.trim().to_string();

    if !request.context.trim().is_empty() {
        content.push_str("\n\nКонтекст для расчёта цен:\n");
        content.push_str(request.context.trim());
    }

    // Without native structured output the schema travels as plain text
    if !descriptor.capabilities.structured_output {
        content.push_str("\n\nВерни ответ строго одним JSON-объектом по этой схеме:\n");
        content.push_str(&proposal_schema().to_string());
    }

    content
}

/// Chat messages for `descriptor`, honouring its system-role support
pub fn build_messages(descriptor: &BackendDescriptor, request: &GenerationRequest) -> Vec<ChatMessage> {
    let user = user_content(descriptor, request);
    if descriptor.capabilities.system_role {
        vec![
            ChatMessage {
                role: "system",
                content: SYSTEM_INSTRUCTION.to_string(),
            },
            ChatMessage { role: "user", content: user },
        ]
    } else {
        vec![ChatMessage {
            role: "user",
            content: format!("{SYSTEM_INSTRUCTION}\n\n{user}"),
        }]
    }
}

/// Full request body for the chat-completions endpoint
pub fn build_body(descriptor: &BackendDescriptor, request: &GenerationRequest) -> Value {
    let mut body = json!({
        "model": descriptor.model,
        "messages": build_messages(descriptor, request),
        "temperature": request.temperature,
    });

    if descriptor.capabilities.structured_output {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {"name": "proposal", "schema": proposal_schema()}
        });
    }

    if descriptor.capabilities.web_grounding && descriptor.provider == Provider::OpenRouter {
        body["plugins"] = json!([{"id": "web", "max_results": WEB_PLUGIN_MAX_RESULTS}]);
    }

    body
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Classify an `error` object found in a response body
fn classify_error_body(error: &Value) -> InvokeError {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(truncate)
        .unwrap_or_else(|| truncate(&error.to_string()));

    let code = match error.get("code") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse::<u64>().ok(),
        _ => None,
    };

    match code {
        Some(code) => InvokeError::from_status(code.min(u16::MAX as u64) as u16, message),
        None => InvokeError::Unknown(message),
    }
}

/// Extract generated text from a successful response body
pub fn parse_completion(body: &str) -> Result<String, InvokeError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| InvokeError::Malformed(format!("response is not JSON: {e}")))?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return Err(classify_error_body(error));
    }

    let content = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    if content.is_empty() {
        return Err(InvokeError::Malformed("empty completion".to_string()));
    }

    Ok(content.to_string())
}

/// Invoker for OpenAI-compatible chat-completions endpoints
pub struct ChatCompletionsInvoker {
    client: reqwest::Client,
    credentials: Credentials,
}

impl ChatCompletionsInvoker {
    pub fn new(client: reqwest::Client, credentials: Credentials) -> Self {
        Self { client, credentials }
    }
}

#[async_trait]
impl GenerationBackend for ChatCompletionsInvoker {
    async fn invoke(
        &self,
        descriptor: &BackendDescriptor,
        request: &GenerationRequest,
    ) -> Result<String, InvokeError> {
        let api_key = self
            .credentials
            .key_for(descriptor.provider)
            .ok_or_else(|| {
                InvokeError::Unconfigured(format!("{} is not set", descriptor.provider.api_key_env()))
            })?;

        let body = build_body(descriptor, request);
        debug!(backend = %descriptor.id(), "Sending chat completion request");

        let mut builder = self
            .client
            .post(descriptor.provider.chat_completions_url())
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&body);

        if descriptor.provider == Provider::OpenRouter {
            builder = builder.header("X-Title", "Client Pilot");
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(InvokeError::from_status(status.as_u16(), truncate(&text)));
        }

        parse_completion(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Capabilities;

    fn request() -> GenerationRequest {
        GenerationRequest::new("Задача: сайт", "", Duration::from_secs(30))
    }

    #[test]
    fn test_structured_backend_gets_schema_in_response_format() {
        let descriptor = BackendDescriptor::new(Provider::Gemini, "gemini-2.0-flash", 1).with_capabilities(
            Capabilities {
                structured_output: true,
                web_grounding: false,
                system_role: true,
            },
        );
        let body = build_body(&descriptor, &request());

        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(!body["messages"][1]["content"].as_str().unwrap().contains("\"properties\""));
    }

    #[test]
    fn test_plain_backend_gets_schema_embedded_in_user_message() {
        let descriptor = BackendDescriptor::new(Provider::Groq, "llama", 1);
        let body = build_body(&descriptor, &request());

        assert!(body.get("response_format").is_none());
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("\"budget_items\""));
    }

    #[test]
    fn test_no_system_role_merges_instruction() {
        let descriptor = BackendDescriptor::new(Provider::OpenRouter, "google/gemma", 1).with_capabilities(
            Capabilities {
                system_role: false,
                ..Capabilities::PLAIN
            },
        );
        let messages = build_messages(&descriptor, &request());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
        assert!(messages[0].content.starts_with(SYSTEM_INSTRUCTION));
    }

    #[test]
    fn test_context_and_web_plugin() {
        let descriptor = BackendDescriptor::new(Provider::OpenRouter, "deepseek", 1).with_capabilities(
            Capabilities {
                web_grounding: true,
                ..Capabilities::PLAIN
            },
        );
        let request = GenerationRequest::new("Задача: котёл", "Мощность 18 кВт", Duration::from_secs(1));
        let body = build_body(&descriptor, &request);

        assert_eq!(body["plugins"][0]["id"], "web");
        assert!(body["messages"][1]["content"].as_str().unwrap().contains("Мощность 18 кВт"));
    }

    #[test]
    fn test_parse_completion_outcomes() {
        let ok = r#"{"choices":[{"message":{"content":" {\"title\":\"A\"} "}}]}"#;
        assert_eq!(parse_completion(ok).unwrap(), "{\"title\":\"A\"}");

        let empty = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert!(matches!(parse_completion(empty), Err(InvokeError::Malformed(_))));

        let limited = r#"{"error":{"code":429,"message":"Rate limit exceeded"}}"#;
        assert!(matches!(parse_completion(limited), Err(InvokeError::RateLimited(_))));

        let missing = r#"{"error":{"code":"404","message":"No endpoints found"}}"#;
        assert!(matches!(parse_completion(missing), Err(InvokeError::NotFound(_))));

        assert!(matches!(parse_completion("<html>"), Err(InvokeError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let invoker = ChatCompletionsInvoker::new(reqwest::Client::new(), Credentials::new());
        let descriptor = BackendDescriptor::new(Provider::Groq, "llama", 1);
        let result = invoker.invoke(&descriptor, &request()).await;
        assert!(matches!(result, Err(InvokeError::Unconfigured(_))));
    }
}
