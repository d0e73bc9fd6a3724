use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};

use crate::adapter;
use crate::auth::Session;
use crate::domains::{CompletionEntry, Habit, HabitStatus, System};
use crate::error::{Result, RoutineOsError};
use crate::interfaces::store::HabitStore;

const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=minimal";

/// Hosted backend speaking PostgREST. Rows belong to the signed-in user
/// and pass through the adapter in both directions.
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: Option<Session>,
}

impl SupabaseStore {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>, session: Option<Session>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            session,
        }
    }

    fn user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.user.id.as_str())
    }

    /// Signed-in requests carry the user's access token; otherwise the anon
    /// key doubles as the bearer.
    fn unscoped(&self, method: Method, table: &str) -> RequestBuilder {
        let bearer = self
            .session
            .as_ref()
            .map(|session| session.access_token.as_str())
            .unwrap_or(&self.anon_key);
        self.client
            .request(method, format!("{}/rest/v1/{table}", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    /// Like [`Self::unscoped`] with a `user_id` filter when signed in.
    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let mut builder = self.unscoped(method, table);
        if let Some(user_id) = self.user_id() {
            builder = builder.query(&[("user_id", format!("eq.{user_id}"))]);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder, action: &str) -> Result<String> {
        let response = builder
            .send()
            .await
            .map_err(|e| RoutineOsError::Http(format!("{action} transport failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RoutineOsError::Http(format!("{action} read failed: {e}")))?;
        if status.is_success() {
            return Ok(body);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RoutineOsError::Auth(format!("{action} rejected ({status}): {body}")));
        }
        Err(RoutineOsError::Http(format!("{action} failed ({status}): {body}")))
    }

    async fn fetch_rows(&self, table: &str, order: &str) -> Result<Vec<Value>> {
        let builder = self
            .request(Method::GET, table)
            .query(&[("select", "*"), ("order", order)]);
        let body = self.send(builder, &format!("list {table}")).await?;
        let rows: Value = serde_json::from_str(&body)?;
        match rows {
            Value::Array(rows) => Ok(rows),
            other => Err(RoutineOsError::Serialization(format!(
                "expected an array of {table}, got {other}"
            ))),
        }
    }

    async fn upsert_row(&self, table: &str, row: Value) -> Result<()> {
        let builder = self
            .unscoped(Method::POST, table)
            .header("Prefer", UPSERT_PREFER)
            .json(&json!([row]));
        self.send(builder, &format!("upsert {table}")).await?;
        Ok(())
    }

    async fn delete_where(&self, table: &str, column: &str, value: &str) -> Result<()> {
        let builder = self
            .request(Method::DELETE, table)
            .query(&[(column, format!("eq.{value}"))]);
        self.send(builder, &format!("delete {table}")).await?;
        Ok(())
    }
}

#[async_trait]
impl HabitStore for SupabaseStore {
    async fn list_systems(&self) -> Result<Vec<System>> {
        self.fetch_rows("systems", "order_index.asc")
            .await?
            .iter()
            .map(adapter::system_from_value)
            .collect()
    }

    async fn upsert_system(&self, system: &System) -> Result<()> {
        self.upsert_row("systems", adapter::system_to_row_value(system, self.user_id()))
            .await
    }

    async fn delete_system(&self, id: &str) -> Result<()> {
        self.delete_where("systems", "id", id).await
    }

    async fn list_habits(&self) -> Result<Vec<Habit>> {
        let rows = self.fetch_rows("habits", "created_at.asc").await?;
        let mut habits = Vec::with_capacity(rows.len());
        for row in &rows {
            match adapter::habit_from_value(row) {
                Ok(habit) => habits.push(habit),
                Err(err) => tracing::warn!(error = %err, "Skipping unreadable habit row"),
            }
        }
        Ok(habits)
    }

    async fn upsert_habit(&self, habit: &Habit) -> Result<()> {
        self.upsert_row("habits", adapter::habit_to_row_value(habit, self.user_id()))
            .await
    }

    async fn delete_habit(&self, id: &str) -> Result<()> {
        self.delete_where("habits", "id", id).await
    }

    async fn delete_habits_for_system(&self, system_id: &str) -> Result<()> {
        self.delete_where("habits", "system_id", system_id).await
    }

    async fn update_habit_status(
        &self,
        habit_id: &str,
        status: HabitStatus,
        last_completed_on: Option<NaiveDate>,
        history: &[CompletionEntry],
    ) -> Result<()> {
        let patch = json!({
            "status": status.as_str(),
            "last_completed_on": last_completed_on,
            "completion_history": history,
        });
        let builder = self
            .request(Method::PATCH, "habits")
            .query(&[("id", format!("eq.{habit_id}"))])
            .json(&patch);
        self.send(builder, "update habit status").await?;
        Ok(())
    }
}
