use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutineOsError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

pub use crate::Result;

impl From<serde_json::Error> for RoutineOsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for RoutineOsError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
