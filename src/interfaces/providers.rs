use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A named JSON schema the model's reply must conform to.
#[derive(Debug, Clone)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub description: Option<String>,
    pub schema: Value,
    pub strict: bool,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Plain chat completion. An absent message content yields an empty
    /// string rather than an error.
    async fn chat(&self, messages: &[ChatMessage], temperature: Option<f32>) -> Result<String>;

    async fn structured(
        &self,
        messages: &[ChatMessage],
        format: JsonSchemaFormat,
        temperature: Option<f32>,
    ) -> Result<Value>;
}
