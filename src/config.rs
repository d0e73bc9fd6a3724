use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, RoutineOsError};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PORT: u16 = 7878;
pub const DEFAULT_TREND_DAYS: usize = 7;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl OpenAiConfig {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL)
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn has_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SupabaseConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

impl SupabaseConfig {
    /// Both the project URL and the anon key, when configured.
    pub fn endpoint(&self) -> Option<(String, String)> {
        let url = self.url.as_deref()?.trim().trim_end_matches('/');
        let key = self.anon_key.as_deref()?.trim();
        if url.is_empty() || key.is_empty() {
            return None;
        }
        Some((url.to_string(), key.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Supabase,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    pub sqlite_path: Option<String>,
    pub preferences_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub openai: Option<OpenAiConfig>,
    pub supabase: Option<SupabaseConfig>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub trend_days: Option<usize>,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    pub fn convention_defaults(db_path: &str) -> Self {
        Self {
            openai: Some(OpenAiConfig {
                api_key: None,
                model: Some(DEFAULT_OPENAI_MODEL.to_string()),
                base_url: Some(DEFAULT_OPENAI_BASE_URL.to_string()),
            }),
            supabase: None,
            store: StoreConfig {
                backend: StoreBackend::Sqlite,
                sqlite_path: Some(db_path.to_string()),
                preferences_path: None,
            },
            server: ServerConfig::default(),
            trend_days: Some(DEFAULT_TREND_DAYS),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RoutineOsError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw).map_err(|e| RoutineOsError::Config(e.to_string()))
    }

    /// Reads `path`, writing the convention defaults there first when the
    /// file does not exist yet.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let defaults = Self::convention_defaults(&crate::runtime_paths::default_db_path());
            defaults.save(path)?;
            tracing::info!(path = %path.display(), "Wrote default config");
            return Ok(defaults);
        }
        Self::from_file(path)
    }

    /// Config file (or the default location), then environment, then vault.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let default_path = crate::runtime_paths::default_config_path();
        Self::load_or_init(path.unwrap_or(&default_path))?
            .apply_env_overrides()
            .resolve_vault()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RoutineOsError::Config(e.to_string()))?;
        }
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body).map_err(|e| RoutineOsError::Config(e.to_string()))
    }

    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(key) = env_value("OPENAI_API_KEY") {
            self.openai.get_or_insert_with(OpenAiConfig::default).api_key = Some(key);
        }
        if let Some(model) = env_value("ROUTINE_OS_OPENAI_MODEL") {
            self.openai.get_or_insert_with(OpenAiConfig::default).model = Some(model);
        }
        if let Some(base_url) = env_value("ROUTINE_OS_OPENAI_BASE_URL") {
            self.openai.get_or_insert_with(OpenAiConfig::default).base_url = Some(base_url);
        }
        if let Some(url) = env_value("SUPABASE_URL") {
            self.supabase.get_or_insert_with(SupabaseConfig::default).url = Some(url);
        }
        if let Some(key) = env_value("SUPABASE_ANON_KEY") {
            self.supabase.get_or_insert_with(SupabaseConfig::default).anon_key = Some(key);
        }
        self
    }

    pub fn resolve_vault(mut self) -> Result<Self> {
        if let Some(openai) = &mut self.openai {
            if openai.api_key.is_none() {
                if let Some(secret) = crate::vault::get_secret(crate::vault::OPENAI_API_KEY_NAME)? {
                    openai.api_key = Some(secret);
                }
            }
        }
        if let Some(supabase) = &mut self.supabase {
            if supabase.anon_key.is_none() {
                if let Some(secret) = crate::vault::get_secret(crate::vault::SUPABASE_ANON_KEY_NAME)? {
                    supabase.anon_key = Some(secret);
                }
            }
        }
        Ok(self)
    }

    pub fn openai(&self) -> OpenAiConfig {
        self.openai.clone().unwrap_or_default()
    }

    pub fn sqlite_path(&self) -> String {
        self.store
            .sqlite_path
            .clone()
            .unwrap_or_else(crate::runtime_paths::default_db_path)
    }

    pub fn preferences_path(&self) -> std::path::PathBuf {
        self.store
            .preferences_path
            .as_ref()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(crate::runtime_paths::default_prefs_path)
    }

    pub fn trend_days(&self) -> usize {
        self.trend_days.unwrap_or(DEFAULT_TREND_DAYS).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convention_defaults_point_at_local_store() {
        let config = Config::convention_defaults("/tmp/routine.db");
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.sqlite_path(), "/tmp/routine.db");
        assert_eq!(config.openai().model(), DEFAULT_OPENAI_MODEL);
        assert!(!config.openai().has_key());
        assert_eq!(config.trend_days(), 7);
    }

    #[test]
    fn partial_files_fill_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"openai": {"api_key": "sk-test", "base_url": "http://localhost:9/v1/"}, "store": {"backend": "supabase"}}"#,
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Supabase);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.openai().base_url(), "http://localhost:9/v1");
        assert!(config.openai().has_key());
    }

    #[test]
    fn load_or_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let first = Config::load_or_init(&path).unwrap();
        assert!(path.exists());

        let second = Config::load_or_init(&path).unwrap();
        assert_eq!(first.sqlite_path(), second.sqlite_path());
    }

    #[test]
    fn supabase_endpoint_requires_both_values() {
        let partial = SupabaseConfig {
            url: Some("https://x.supabase.co/".into()),
            anon_key: None,
        };
        assert!(partial.endpoint().is_none());

        let full = SupabaseConfig {
            anon_key: Some("anon".into()),
            ..partial
        };
        assert_eq!(
            full.endpoint(),
            Some(("https://x.supabase.co".to_string(), "anon".to_string()))
        );
    }
}
