use std::collections::BTreeSet;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::common::error::SessionError;

/// Identity snapshot cached after login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// Holder of the single active session. Login replaces, logout destroys,
/// everything else only reads.
#[derive(Debug, Default)]
pub struct SessionState {
    current: RwLock<Option<Session>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self, session: Session) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = guard.as_ref() {
            log::info!("[SESSION] Replacing session of {}", previous.user.username);
        }
        *guard = Some(session);
    }

    pub fn logout(&self) -> Option<Session> {
        self.current.write().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn current(&self) -> Result<Session, SessionError> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(SessionError::Missing)
    }

    pub fn user(&self) -> Option<User> {
        self.current().ok().map(|s| s.user)
    }

    pub fn is_logged_in(&self) -> bool {
        self.current.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(token: &str) -> Session {
        Session {
            token: token.to_string(),
            user: User {
                id: "u1".to_string(),
                username: "anna".to_string(),
                permissions: BTreeSet::new(),
            },
        }
    }

    #[test]
    fn login_then_logout_clears_the_only_session() {
        let state = SessionState::new();
        assert!(matches!(state.current(), Err(SessionError::Missing)));

        state.login(session("t1"));
        state.login(session("t2"));
        assert_eq!(state.current().unwrap().token, "t2");

        let old = state.logout().unwrap();
        assert_eq!(old.token, "t2");
        assert!(!state.is_logged_in());
    }
}
