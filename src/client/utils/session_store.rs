use std::path::{Path, PathBuf};

use keyring::Entry;

use crate::client::models::session::Session;
use crate::common::config::ClientConfig;
use crate::common::error::SessionError;

const SERVICE: &str = "ticket_chat";
const USER: &str = "ticket_chat_session";

/// Persists the session in the OS keyring. A plaintext file fallback is only
/// used when explicitly enabled.
#[derive(Debug, Clone)]
pub struct SessionStore {
    service: String,
    account: String,
    fallback_path: Option<PathBuf>,
}

impl SessionStore {
    pub fn new(fallback_path: Option<PathBuf>) -> Self {
        Self {
            service: SERVICE.to_string(),
            account: USER.to_string(),
            fallback_path,
        }
    }

    pub fn from_config(cfg: &ClientConfig) -> Self {
        let fallback = cfg
            .keyring_fallback
            .then(|| Path::new("data").join("session.json"));
        Self::new(fallback)
    }

    fn entry(&self) -> Entry {
        Entry::new(&self.service, &self.account)
    }

    pub fn save_session(&self, session: &Session) -> Result<(), SessionError> {
        let json = serde_json::to_string(session)?;
        match self.entry().set_password(&json) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::debug!("[SESSION_STORE] Keyring write failed: {}", e);
                match &self.fallback_path {
                    Some(path) => {
                        write_fallback(path, &json)?;
                        // never log the token itself
                        log::warn!("[SESSION_STORE] Keyring unavailable, persisted session to fallback file");
                        Ok(())
                    }
                    None => Err(SessionError::KeyringUnavailable),
                }
            }
        }
    }

    pub fn load_session(&self) -> Option<Session> {
        let raw = match self.entry().get_password() {
            Ok(raw) => Some(raw),
            Err(_) => self.fallback_path.as_deref().and_then(read_fallback),
        }?;

        if raw.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                log::warn!("[SESSION_STORE] Ignoring corrupt stored session: {}", e);
                None
            }
        }
    }

    pub fn clear_session(&self) -> Result<(), SessionError> {
        let _ = self.entry().delete_password();
        if let Some(path) = &self.fallback_path {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

fn write_fallback(path: &Path, contents: &str) -> Result<(), SessionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

fn read_fallback(path: &Path) -> Option<String> {
    let s = std::fs::read_to_string(path).ok()?;
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}
