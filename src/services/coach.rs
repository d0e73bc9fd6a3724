use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RoutineOsError};
use crate::interfaces::providers::{ChatMessage, LlmProvider};

pub const COACH_SYSTEM_PROMPT: &str = "You are “Routine OS Coach”, the built-in AI assistant for the Routine OS app.
Routine OS is a system-based daily planner that turns routines into today's habits and simple analytics.

How the app works (for you as the AI):
- The user organizes their life into systems (for example: Intelligence, Body, Health & Wellness, Home, etc.).
- Each system contains habits and optional sub-habits.
- On the Today view, the user sees only today’s habits with a simple status: “Not completed” or “Completed”.
- The app is intentionally day-only: it does not show yesterday or tomorrow. This keeps the user focused on living in the present and being consistent today.
- The Analytics view shows high-level stats and trends for how consistent the user is being with their systems and habits. You may receive some of those stats as JSON context.

Your job:
- Be a supportive, practical habit coach focused on today only.
- Help the user interpret their daily + analytics data, notice patterns in their systems, and design tiny adjustments that make today’s habits easier to uphold.
- If structured JSON context is provided (today’s habits, statuses, or analytics numbers), use it in your answer and explain it in simple language.

Hard rules:
- You only talk about today’s habits and systems.
  - If the user asks about yesterday or tomorrow, gently explain that Routine OS is designed to keep them grounded in today, and redirect the conversation back to what they can do right now.
- Never shame the user. Be honest, but kind and matter-of-fact.
- Keep answers concise, with clear bullets or short paragraphs, unless the user asks for more detail.
- When suggesting changes, keep them small and realistic (micro-habits), and tie them back to the system they support (e.g., “This supports your Body system”).

Tone:
- Direct, encouraging, and a little bit “systems engineer” meets coach.
- You can say “we” as if you and the user are on the same team building a reliable routine.
- Emphasize consistency over perfection and “win today” as the core philosophy.";

pub const BREVITY_PROMPT: &str =
    "Keep answers short, focused, and under ~150 words unless the user explicitly asks for more detail.";
pub const CONTEXT_PREFIX: &str = "Here is today's Routine OS JSON context: ";
pub const EMPTY_REPLY: &str = "Sorry, I had trouble generating a response.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoachRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachReply {
    pub reply: String,
}

pub struct CoachService {
    provider: Option<Arc<dyn LlmProvider>>,
}

/// Fixed coach prompts, then the optional context, then the conversation.
pub fn build_messages(request: &CoachRequest) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage::system(COACH_SYSTEM_PROMPT),
        ChatMessage::system(BREVITY_PROMPT),
    ];
    if let Some(context) = request.context.as_ref().filter(|value| !value.is_null()) {
        messages.push(ChatMessage::system(format!("{CONTEXT_PREFIX}{context}")));
    }
    messages.extend(request.messages.iter().cloned());
    messages
}

impl CoachService {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { provider }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn reply(&self, request: &CoachRequest) -> Result<CoachReply> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| RoutineOsError::Config("AI provider is not configured".to_string()))?;
        let messages = build_messages(request);
        tracing::debug!(turns = request.messages.len(), "Requesting coach reply");

        let text = provider.chat(&messages, None).await.map_err(|err| {
            tracing::error!(error = %err, "Coach request failed");
            err
        })?;
        let reply = if text.trim().is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            text
        };
        Ok(CoachReply { reply })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::providers::{ChatRole, JsonSchemaFormat};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedProvider {
        reply: String,
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, messages: &[ChatMessage], _temperature: Option<f32>) -> Result<String> {
            *self.seen.lock().unwrap() = messages.to_vec();
            Ok(self.reply.clone())
        }

        async fn structured(
            &self,
            _messages: &[ChatMessage],
            _format: JsonSchemaFormat,
            _temperature: Option<f32>,
        ) -> Result<Value> {
            Err(RoutineOsError::Runtime("unused".to_string()))
        }
    }

    #[test]
    fn context_message_sits_between_prompts_and_conversation() {
        let request = CoachRequest {
            messages: vec![ChatMessage::user("How am I doing?")],
            context: Some(json!({"today": 2})),
        };
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, BREVITY_PROMPT);
        assert_eq!(
            messages[2].content,
            "Here is today's Routine OS JSON context: {\"today\":2}"
        );
        assert_eq!(messages[3].role, ChatRole::User);
    }

    #[test]
    fn missing_context_adds_no_message() {
        let messages = build_messages(&CoachRequest::default());
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn empty_reply_is_replaced() {
        let provider = Arc::new(ScriptedProvider {
            reply: "  ".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let service = CoachService::new(Some(provider.clone()));
        let reply = service
            .reply(&CoachRequest {
                messages: vec![ChatMessage::user("hi")],
                context: None,
            })
            .await
            .unwrap();
        assert_eq!(reply.reply, EMPTY_REPLY);
        assert_eq!(provider.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unconfigured_provider_is_an_error() {
        let service = CoachService::new(None);
        assert!(service.reply(&CoachRequest::default()).await.is_err());
    }
}
