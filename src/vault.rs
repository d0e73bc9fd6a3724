use crate::error::{Result, RoutineOsError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::SysRng;
use rand::TryRng;
use std::path::{Path, PathBuf};

const SERVICE: &str = "routine-os";
const TOKEN_ENV: &str = "ROUTINE_OS_TOKEN";
const DISABLE_KEYRING_ENV: &str = "ROUTINE_OS_DISABLE_KEYRING";
pub const DAEMON_TOKEN_NAME: &str = "daemon_auth_token";
pub const OPENAI_API_KEY_NAME: &str = "openai_api_key";
pub const SUPABASE_ANON_KEY_NAME: &str = "supabase_anon_key";

fn secret_fallback_file(name: &str) -> PathBuf {
    let encoded = URL_SAFE_NO_PAD.encode(name.as_bytes());
    crate::runtime_paths::app_root()
        .join("secrets")
        .join("fallback")
        .join(encoded)
}

fn read_trimmed(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let trimmed = raw.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn write_private_file(path: &Path, value: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RoutineOsError::Storage(e.to_string()))?;
    }
    std::fs::write(path, value).map_err(|e| RoutineOsError::Storage(e.to_string()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

fn keyring_backend_unavailable(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("dbus")
        || message.contains("secret service")
        || message.contains("keyring")
        || message.contains("no such interface")
        || message.contains("service unknown")
        || message.contains("backend not available")
        || message.contains("platform secure storage failure")
        || message.contains("keychain")
}

fn env_token() -> Option<String> {
    std::env::var(TOKEN_ENV).ok().and_then(|token| {
        let trimmed = token.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

fn keyring_disabled() -> bool {
    std::env::var(DISABLE_KEYRING_ENV)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

/// Stores a secret in the OS keyring, or in a private file under the app
/// root when the keyring is disabled or has no backend.
pub fn set_secret(name: &str, value: &str) -> Result<()> {
    if keyring_disabled() {
        return write_private_file(&secret_fallback_file(name), value);
    }
    let entry =
        keyring::Entry::new(SERVICE, name).map_err(|e| RoutineOsError::Runtime(e.to_string()))?;
    if let Err(err) = entry.set_password(value) {
        if keyring_backend_unavailable(&err.to_string()) {
            tracing::debug!(secret = name, "Keyring unavailable; using fallback file");
            return write_private_file(&secret_fallback_file(name), value);
        }
        return Err(RoutineOsError::Runtime(err.to_string()));
    }
    Ok(())
}

pub fn get_secret(name: &str) -> Result<Option<String>> {
    if keyring_disabled() {
        return Ok(read_trimmed(&secret_fallback_file(name)));
    }
    let entry =
        keyring::Entry::new(SERVICE, name).map_err(|e| RoutineOsError::Runtime(e.to_string()))?;
    match entry.get_password() {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value.trim().to_string())),
        Ok(_) | Err(keyring::Error::NoEntry) => Ok(read_trimmed(&secret_fallback_file(name))),
        Err(err) => {
            if keyring_backend_unavailable(&err.to_string()) {
                return Ok(read_trimmed(&secret_fallback_file(name)));
            }
            Err(RoutineOsError::Runtime(err.to_string()))
        }
    }
}

/// Removes a secret from both the keyring and the fallback file. Missing
/// entries are not an error.
pub fn delete_secret(name: &str) -> Result<()> {
    let fallback = secret_fallback_file(name);
    if fallback.exists() {
        std::fs::remove_file(&fallback).map_err(|e| RoutineOsError::Storage(e.to_string()))?;
    }
    if keyring_disabled() {
        return Ok(());
    }
    let entry =
        keyring::Entry::new(SERVICE, name).map_err(|e| RoutineOsError::Runtime(e.to_string()))?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(err) if keyring_backend_unavailable(&err.to_string()) => Ok(()),
        Err(err) => Err(RoutineOsError::Runtime(err.to_string())),
    }
}

/// Token guarding the daemon's CRUD routes: the environment wins, then a
/// stored token, otherwise a fresh random one is generated and stored.
pub fn ensure_daemon_auth_token() -> Result<String> {
    if let Some(token) = env_token() {
        return Ok(token);
    }

    if let Some(token) = get_secret(DAEMON_TOKEN_NAME)? {
        return Ok(token);
    }

    let mut bytes = [0u8; 32];
    let mut rng = SysRng;
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| RoutineOsError::Runtime(e.to_string()))?;
    let generated = URL_SAFE_NO_PAD.encode(bytes);
    set_secret(DAEMON_TOKEN_NAME, &generated)?;
    tracing::info!("Generated a new daemon auth token");
    Ok(generated)
}
