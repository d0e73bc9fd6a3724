//! Completion-likelihood predictions.
//!
//! The model is asked for structured predictions; whenever it is missing,
//! fails, or answers with something unusable, a deterministic heuristic
//! takes over so callers always get an answer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, RoutineOsError};
use crate::interfaces::providers::{ChatMessage, JsonSchemaFormat, LlmProvider};

pub const MAX_CONTEXT_HABITS: usize = 40;
pub const FALLBACK_SAMPLE: usize = 3;
pub const DEFAULT_WINDOW_DAYS: u32 = 7;
pub const SCHEMA_NAME: &str = "habit_completion_likelihood";
pub const FALLBACK_SUMMARY: &str =
    "Showing heuristic estimates because the AI prediction service is not currently reachable.";
const REASONING_WITH_HISTORY: &str =
    "Estimated from recent completions because the AI service was unavailable.";
const REASONING_WITHOUT_HISTORY: &str =
    "Limited history available; showing a conservative fallback estimate.";
const REALISM_PROMPT: &str = "Likelihood values must be realistic (between 5 and 95 unless history is extremely certain) and reasoning must cite the provided data.";
const TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikelihoodRequest {
    #[serde(default)]
    pub habits: Option<Value>,
    #[serde(default)]
    pub window_days: Option<u32>,
}

/// The projection of a caller-supplied habit that is sent to the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_days: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed_on: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today_status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_history: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Value>,
}

impl HabitContext {
    fn from_value(value: &Value) -> Self {
        let pick = |key: &str| value.get(key).filter(|field| !field.is_null()).cloned();
        Self {
            id: pick("id"),
            name: pick("name"),
            system_name: pick("systemName"),
            purpose: pick("purpose"),
            frequency: pick("frequency"),
            days_of_week: pick("daysOfWeek"),
            interval_days: pick("intervalDays"),
            streak: pick("streak"),
            last_completed_on: pick("lastCompletedOn"),
            today_status: pick("todayStatus"),
            completion_history: pick("completionHistory"),
            status: pick("status"),
            notes: pick("notes"),
        }
    }

    fn text(value: &Option<Value>) -> Option<String> {
        match value {
            Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
            Some(Value::Number(number)) => Some(number.to_string()),
            _ => None,
        }
    }

    fn history_count(&self) -> usize {
        match &self.completion_history {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }

    fn streak_days(&self) -> f64 {
        self.streak.as_ref().and_then(Value::as_f64).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub habit_id: String,
    pub habit_name: String,
    pub system_name: String,
    pub likelihood: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikelihoodResponse {
    pub predictions: Vec<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "summary": {"type": "string", "description": "One paragraph summary of observed patterns."},
            "predictions": {
                "type": "array",
                "minItems": 1,
                "maxItems": 5,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["habitId", "habitName", "systemName", "likelihood", "reasoning"],
                    "properties": {
                        "habitId": {"type": "string", "description": "ID of the habit in Routine OS."},
                        "habitName": {"type": "string"},
                        "systemName": {"type": "string"},
                        "likelihood": {
                            "type": "number",
                            "description": "Chance (0-100) that the habit will be completed the next time it is scheduled."
                        },
                        "confidence": {
                            "type": "string",
                            "enum": ["low", "medium", "high"],
                            "description": "How confident the model is in this estimate."
                        },
                        "reasoning": {
                            "type": "string",
                            "description": "One-sentence explanation anchoring the percentage to history or context."
                        },
                        "guidance": {
                            "type": "string",
                            "description": "Optional short recommendation to improve likelihood."
                        }
                    }
                }
            }
        },
        "required": ["predictions"]
    })
}

/// Heuristic estimate for the first few habits.
pub fn fallback_predictions(habits: &[HabitContext]) -> LikelihoodResponse {
    let predictions = habits
        .iter()
        .take(FALLBACK_SAMPLE)
        .map(|habit| {
            let history = habit.history_count();
            let mut likelihood = 50.0;
            match HabitContext::text(&habit.today_status).as_deref() {
                Some("completed") => likelihood += 15.0,
                Some("skipped") => likelihood -= 20.0,
                _ => {}
            }
            likelihood += (history as f64 * 3.0).min(15.0);
            likelihood += (habit.streak_days() * 5.0).min(10.0);

            Prediction {
                habit_id: HabitContext::text(&habit.id)
                    .unwrap_or_else(|| crate::domains::generate_id("habit")),
                habit_name: HabitContext::text(&habit.name).unwrap_or_else(|| "Habit".to_string()),
                system_name: HabitContext::text(&habit.system_name)
                    .unwrap_or_else(|| "System".to_string()),
                likelihood: likelihood.round().clamp(5.0, 95.0),
                confidence: Some(if history > 4 {
                    Confidence::Medium
                } else {
                    Confidence::Low
                }),
                reasoning: if history > 0 {
                    REASONING_WITH_HISTORY
                } else {
                    REASONING_WITHOUT_HISTORY
                }
                .to_string(),
                guidance: None,
            }
        })
        .collect();

    LikelihoodResponse {
        predictions,
        summary: Some(FALLBACK_SUMMARY.to_string()),
        fallback: true,
    }
}

fn system_prompt(window_days: u32) -> String {
    format!(
        "You generate habit completion likelihoods for Routine OS users.\n\
         Estimate the probability (0-100) that each habit will be completed the next time it is scheduled within the next {window_days} days.\n\
         Focus on patterns from completion_history, streaks, and status recency.\n\
         Be honest about uncertainty if the history is sparse."
    )
}

pub struct LikelihoodService {
    provider: Option<Arc<dyn LlmProvider>>,
}

impl LikelihoodService {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { provider }
    }

    /// Validates the request and projects at most 40 habits for the model.
    pub fn context_payload(request: &LikelihoodRequest) -> Result<Vec<HabitContext>> {
        let habits = match &request.habits {
            Some(Value::Array(habits)) if !habits.is_empty() => habits,
            _ => return Err(RoutineOsError::Validation("No habits provided".to_string())),
        };
        Ok(habits
            .iter()
            .take(MAX_CONTEXT_HABITS)
            .map(HabitContext::from_value)
            .collect())
    }

    pub async fn predict(&self, request: &LikelihoodRequest) -> Result<LikelihoodResponse> {
        let habits = Self::context_payload(request)?;
        let Some(provider) = &self.provider else {
            tracing::info!("No AI provider configured; using heuristic likelihoods");
            return Ok(fallback_predictions(&habits));
        };

        let window_days = request
            .window_days
            .filter(|days| *days > 0)
            .unwrap_or(DEFAULT_WINDOW_DAYS);
        let payload = json!({
            "habits": habits,
            "windowDays": request.window_days.unwrap_or(DEFAULT_WINDOW_DAYS),
        });
        let messages = vec![
            ChatMessage::system(system_prompt(window_days)),
            ChatMessage::system(REALISM_PROMPT),
            ChatMessage::user(format!(
                "Analyze these habits and return 2-4 insightful predictions (never more than five entries total):\n{payload}"
            )),
        ];
        let format = JsonSchemaFormat {
            name: SCHEMA_NAME.to_string(),
            description: None,
            schema: response_schema(),
            strict: true,
        };

        let raw = match provider.structured(&messages, format, Some(TEMPERATURE)).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "Likelihood request failed; using heuristic");
                return Ok(fallback_predictions(&habits));
            }
        };
        match serde_json::from_value::<LikelihoodResponse>(raw) {
            Ok(parsed) => Ok(parsed),
            Err(err) => {
                tracing::warn!(error = %err, "Likelihood response unusable; using heuristic");
                Ok(fallback_predictions(&habits))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn habit(value: Value) -> HabitContext {
        HabitContext::from_value(&value)
    }

    #[test]
    fn fallback_scores_follow_the_heuristic() {
        let habits = vec![
            habit(json!({
                "id": "habit-1",
                "name": "Run",
                "systemName": "Body",
                "todayStatus": "completed",
                "completionHistory": ["a", "b", "c", "d", "e", "f"],
                "streak": 4
            })),
            habit(json!({"id": "habit-2", "todayStatus": "skipped"})),
            habit(json!({"id": "habit-3", "completionHistory": ["a"], "streak": 1})),
            habit(json!({"id": "habit-4"})),
        ];

        let response = fallback_predictions(&habits);
        assert!(response.fallback);
        assert_eq!(response.summary.as_deref(), Some(FALLBACK_SUMMARY));
        assert_eq!(response.predictions.len(), 3);

        let first = &response.predictions[0];
        // 50 + 15 + min(15, 18) + min(10, 20)
        assert_eq!(first.likelihood, 90.0);
        assert_eq!(first.confidence, Some(Confidence::Medium));
        assert_eq!(first.reasoning, REASONING_WITH_HISTORY);

        let second = &response.predictions[1];
        assert_eq!(second.likelihood, 30.0);
        assert_eq!(second.habit_name, "Habit");
        assert_eq!(second.system_name, "System");
        assert_eq!(second.confidence, Some(Confidence::Low));
        assert_eq!(second.reasoning, REASONING_WITHOUT_HISTORY);

        assert_eq!(response.predictions[2].likelihood, 58.0);
    }

    #[test]
    fn fallback_clamps_to_bounds() {
        let response = fallback_predictions(&[habit(json!({
            "todayStatus": "completed",
            "completionHistory": vec![1; 20],
            "streak": 50
        }))]);
        assert_eq!(response.predictions[0].likelihood, 90.0);
        assert!(response.predictions[0].habit_id.starts_with("habit-"));
    }

    #[test]
    fn empty_or_missing_habits_are_rejected() {
        for request in [
            LikelihoodRequest::default(),
            LikelihoodRequest {
                habits: Some(json!([])),
                window_days: None,
            },
            LikelihoodRequest {
                habits: Some(json!({"id": "x"})),
                window_days: None,
            },
        ] {
            assert!(matches!(
                LikelihoodService::context_payload(&request),
                Err(RoutineOsError::Validation(_))
            ));
        }
    }

    #[test]
    fn payload_is_trimmed_and_projected() {
        let habits: Vec<Value> = (0..45)
            .map(|idx| json!({"id": format!("habit-{idx}"), "name": "n", "secret": "drop me"}))
            .collect();
        let payload = LikelihoodService::context_payload(&LikelihoodRequest {
            habits: Some(Value::Array(habits)),
            window_days: Some(7),
        })
        .unwrap();
        assert_eq!(payload.len(), MAX_CONTEXT_HABITS);
        let value = serde_json::to_value(&payload[0]).unwrap();
        assert_eq!(value, json!({"id": "habit-0", "name": "n"}));
    }

    #[tokio::test]
    async fn no_provider_means_fallback() {
        let service = LikelihoodService::new(None);
        let response = service
            .predict(&LikelihoodRequest {
                habits: Some(json!([{"id": "habit-1"}])),
                window_days: None,
            })
            .await
            .unwrap();
        assert!(response.fallback);
        assert_eq!(response.predictions.len(), 1);
    }

    #[test]
    fn prompt_names_the_window() {
        assert!(system_prompt(14).contains("within the next 14 days"));
    }
}
