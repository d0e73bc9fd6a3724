//! Email/password client for the hosted auth service (GoTrue-compatible).

use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, RoutineOsError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

pub struct AuthClient {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

fn require_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(RoutineOsError::Validation(
            "email and password are required".to_string(),
        ));
    }
    Ok(())
}

/// Pulls the most specific message the service gives for a failure.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    async fn read(&self, response: reqwest::Response, action: &str) -> Result<Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RoutineOsError::Http(format!("{action} read failed: {e}")))?;
        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&body)?);
        }
        let message = error_message(&body);
        if status == StatusCode::BAD_REQUEST
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::UNPROCESSABLE_ENTITY
        {
            return Err(RoutineOsError::Auth(message));
        }
        Err(RoutineOsError::Http(format!("{action} failed ({status}): {message}")))
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        require_credentials(email, password)?;
        let response = self
            .client
            .post(self.url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&json!({"email": email.trim(), "password": password}))
            .send()
            .await?;
        let body = self.read(response, "sign in").await?;
        let session: Session = serde_json::from_value(body)?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    /// Creates an account. Returns `None` when the service requires email
    /// confirmation before issuing a session.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        require_credentials(email, password)?;
        let response = self
            .client
            .post(self.url("signup"))
            .header("apikey", &self.anon_key)
            .json(&json!({"email": email.trim(), "password": password}))
            .send()
            .await?;
        let body = self.read(response, "sign up").await?;
        if body.get("access_token").is_some() {
            return Ok(Some(serde_json::from_value(body)?));
        }
        tracing::info!("Sign-up accepted; waiting for email confirmation");
        Ok(None)
    }

    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        let response = self
            .client
            .get(self.url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        let body = self.read(response, "get user").await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        self.read(response, "sign out").await?;
        Ok(())
    }
}

/// The signed-in session persisted between CLI runs.
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn at_default_location() -> Self {
        Self::new(crate::runtime_paths::default_session_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<Session> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                tracing::warn!(error = %err, "Ignoring unreadable session file");
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RoutineOsError::Storage(e.to_string()))?;
        }
        let body = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, body).map_err(|e| RoutineOsError::Storage(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| RoutineOsError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}
