use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};

use crate::config::{OpenAiConfig, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
use crate::error::{Result, RoutineOsError};
use crate::interfaces::providers::{ChatMessage, ChatRole, JsonSchemaFormat, LlmProvider};

const TRUNCATION_MARKERS: [&str; 3] = [
    "unexpected end of json",
    "unexpected end of input",
    "unexpected eof",
];

enum ChatCreateResult {
    Parsed(CreateChatCompletionResponse),
    Raw(Value),
}

fn is_truncation(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    TRUNCATION_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Chat completions against any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiProvider {
    model: String,
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let config = OpenAIConfig::new()
            .with_api_key(api_key.clone())
            .with_api_base(base_url.clone());
        Self {
            model,
            client: Client::with_config(config),
            http: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    /// `None` when no usable key is configured.
    pub fn from_config(config: &OpenAiConfig) -> Option<Self> {
        if !config.has_key() {
            return None;
        }
        let api_key = config.api_key.clone()?.trim().to_string();
        Some(Self::new(
            api_key,
            Some(config.model().to_string()),
            Some(config.base_url().to_string()),
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn raw_chat_completion(&self, request: &CreateChatCompletionRequest) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url);
        for attempt in 0..3 {
            let response = self
                .http
                .post(url.clone())
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await
                .map_err(|e| RoutineOsError::Http(format!("Chat completion transport failed: {e}")))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| RoutineOsError::Http(format!("Chat completion read failed: {e}")))?;

            if status == StatusCode::OK {
                return serde_json::from_str(&body).map_err(|e| {
                    RoutineOsError::Serialization(format!("Chat completion decode failed: {e}"))
                });
            }

            if status.is_server_error() && is_truncation(&body) && attempt < 2 {
                tokio::time::sleep(Duration::from_millis(150 * (attempt + 1) as u64)).await;
                continue;
            }

            return Err(RoutineOsError::Http(format!(
                "Chat completion failed ({status}): {body}"
            )));
        }

        Err(RoutineOsError::Http(
            "Chat completion failed after retries".to_string(),
        ))
    }

    /// Raw request first; a response still truncated after retries gets one
    /// more try through the typed client.
    async fn chat_create_with_fallback(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<ChatCreateResult> {
        match self.raw_chat_completion(&request).await {
            Ok(raw) => return Ok(ChatCreateResult::Raw(raw)),
            Err(RoutineOsError::Http(message)) if !is_truncation(&message) => {
                return Err(RoutineOsError::Http(message));
            }
            Err(err) => tracing::warn!(error = %err, "Retrying chat completion via typed client"),
        }

        self.client
            .chat()
            .create(request)
            .await
            .map(ChatCreateResult::Parsed)
            .map_err(|err| RoutineOsError::Http(err.to_string()))
    }

    fn extract_text_from_value(response: &Value) -> Option<String> {
        response
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|text| text.to_string())
    }

    fn extract_text_from_response(response: &CreateChatCompletionResponse) -> Option<String> {
        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
    }

    fn extract_text(result: ChatCreateResult) -> Option<String> {
        match result {
            ChatCreateResult::Parsed(parsed) => Self::extract_text_from_response(&parsed),
            ChatCreateResult::Raw(raw) => Self::extract_text_from_value(&raw),
        }
    }

    fn build_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
        let built = match message.role {
            ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.as_str())
                .build()
                .map(ChatCompletionRequestMessage::System),
            ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Text(
                    message.content.clone(),
                ))
                .build()
                .map(ChatCompletionRequestMessage::User),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.as_str())
                .build()
                .map(ChatCompletionRequestMessage::Assistant),
        };
        built.map_err(|e| RoutineOsError::Runtime(e.to_string()))
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
        response_format: Option<ResponseFormat>,
    ) -> Result<CreateChatCompletionRequest> {
        let messages = messages
            .iter()
            .map(Self::build_message)
            .collect::<Result<Vec<_>>>()?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(self.model.clone());
        builder.messages(messages);
        if let Some(temperature) = temperature {
            builder.temperature(temperature);
        }
        if let Some(response_format) = response_format {
            builder.response_format(response_format);
        }
        builder
            .build()
            .map_err(|e| RoutineOsError::Runtime(e.to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, messages: &[ChatMessage], temperature: Option<f32>) -> Result<String> {
        let request = self.build_request(messages, temperature, None)?;
        let response = self.chat_create_with_fallback(request).await?;
        Ok(Self::extract_text(response).unwrap_or_default())
    }

    async fn structured(
        &self,
        messages: &[ChatMessage],
        format: JsonSchemaFormat,
        temperature: Option<f32>,
    ) -> Result<Value> {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                name: format.name,
                description: format.description,
                schema: Some(format.schema),
                strict: Some(format.strict),
            },
        };
        let request = self.build_request(messages, temperature, Some(response_format))?;
        let response = self.chat_create_with_fallback(request).await?;
        let content = Self::extract_text(response)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| RoutineOsError::Serialization("Empty structured response".to_string()))?;
        serde_json::from_str(&content).map_err(|e| RoutineOsError::Serialization(e.to_string()))
    }
}
