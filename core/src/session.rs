//! Observable session record shared between the auth manager and UI layers.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Opaque user record as returned by the backend.
///
/// The backend currently sends `{id, name, email}`, but callers should treat
/// the payload as open-ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Value);

impl UserProfile {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get("id").filter(|id| !id.is_null())
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Anonymous,
    Authenticated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    pub ready: bool,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        if self.is_authenticated() {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Anonymous
        }
    }
}

/// Shared handle to the session record.
///
/// Clones point at the same record. Every mutation publishes a snapshot to
/// subscribers obtained through [`SessionContext::subscribe`].
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<RwLock<Session>>,
    changes: Arc<watch::Sender<Session>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(RwLock::new(Session::default())),
            changes: Arc::new(changes),
        }
    }

    pub fn snapshot(&self) -> Session {
        self.inner.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.inner.read().user.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().ready
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().is_authenticated()
    }

    /// Receiver that observes every subsequent mutation.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.changes.subscribe()
    }

    pub fn adopt(&self, token: String, user: UserProfile) {
        self.update(|session| {
            session.token = Some(token);
            session.user = Some(user);
        });
    }

    pub fn set_token(&self, token: Option<String>) {
        self.update(|session| session.token = token);
    }

    /// Set `user` only while `token` is still the session token. Returns
    /// whether the profile was written.
    pub fn set_user_if_token(&self, token: &str, user: Option<UserProfile>) -> bool {
        let mut written = false;
        self.update(|session| {
            if session.token.as_deref() == Some(token) {
                session.user = user;
                written = true;
            }
        });
        written
    }

    /// Drop token and user. `ready` is left alone.
    pub fn clear(&self) {
        self.update(|session| {
            session.token = None;
            session.user = None;
        });
    }

    /// Flip the readiness latch. Returns `false` if it was already set.
    pub fn mark_ready(&self) -> bool {
        let mut flipped = false;
        self.update(|session| {
            if !session.ready {
                session.ready = true;
                flipped = true;
            }
        });
        flipped
    }

    fn update(&self, mutate: impl FnOnce(&mut Session)) {
        let snapshot = {
            let mut guard = self.inner.write();
            mutate(&mut *guard);
            guard.clone()
        };
        self.changes.send_replace(snapshot);
    }
}
