use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

pub use file_session_storage::FileSessionStorage;
pub use in_memory_session_storage::InMemorySessionStorage;

use crate::api::AuthResponse;

mod file_session_storage;
mod in_memory_session_storage;

const SESSION_EVENTS_CAPACITY: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
/// Authenticated identity of the client
pub struct Session {
    /// Account identity, the `sub` claim of the token or the e-mail used to log in
    pub user_id: String,
    pub display_name: String,
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: Option<String>,
    exp: Option<i64>,
}

impl Session {
    /// Builds a session out of a login or signup response.
    /// Claims are read without verifying the signature, they are only used for
    /// display and early expiry detection.
    pub fn from_auth_response(response: AuthResponse, login_email: &str) -> Self {
        let claims = decode_claims(&response.token);
        let user_id = claims
            .as_ref()
            .and_then(|claims| claims.sub.clone())
            .unwrap_or_else(|| login_email.to_string());
        let expires_at = claims
            .and_then(|claims| claims.exp)
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single());

        Self {
            user_id,
            display_name: response.name,
            token: response.token,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn first_name(&self) -> &str {
        self.display_name
            .split_whitespace()
            .next()
            .unwrap_or(&self.display_name)
    }
}

fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    match jsonwebtoken::decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => Some(data.claims),
        Err(err) => {
            tracing::debug!("Token is not a readable JWT: {}", err);
            None
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SessionStorageError {
    #[error("Failed to access session storage: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize session: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable place where the session survives restarts.
/// Access is synchronous so the session is known before the first navigation.
pub trait SessionStorage: Send + Sync {
    /// Returns the persisted session, None if nothing was stored
    fn load(&self) -> Result<Option<Session>, SessionStorageError>;
    fn save(&self, session: &Session) -> Result<(), SessionStorageError>;
    /// Removes the persisted session, succeeds if nothing was stored
    fn remove(&self) -> Result<(), SessionStorageError>;
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionEvent {
    SignedIn,
    /// Explicit logout
    SignedOut,
    /// The server rejected the session token
    Invalidated,
}

#[derive(Clone)]
/// Single source of truth for "who is logged in".
/// Cheap to clone, all clones share the same state.
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    current: Arc<watch::Sender<Option<Session>>>,
    events: broadcast::Sender<SessionEvent>,
    // Serializes writers so storage always ends up holding the current session
    write_lock: Arc<Mutex<()>>,
}

impl SessionStore {
    /// Restores the persisted session. A session that cannot be read is discarded.
    pub fn hydrate(storage: Arc<dyn SessionStorage>) -> Self {
        let persisted = match storage.load() {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!("Discarding unreadable persisted session: {}", err);
                if let Err(err) = storage.remove() {
                    tracing::warn!("Failed to remove unreadable session: {}", err);
                }
                None
            }
        };
        tracing::info!(restored = persisted.is_some(), "Session store hydrated");

        let (current, _) = watch::channel(persisted);
        let (events, _) = broadcast::channel(SESSION_EVENTS_CAPACITY);
        Self {
            storage,
            current: Arc::new(current),
            events,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::hydrate(Arc::new(InMemorySessionStorage::default()))
    }

    pub fn session(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current
            .borrow()
            .as_ref()
            .map(|session| session.token.clone())
    }

    /// True when a session is present and not past its expiry
    pub fn is_authenticated(&self) -> bool {
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|session| !session.is_expired())
    }

    pub fn set_session(&self, session: Session) -> Result<(), SessionStorageError> {
        let _guard = self.write_lock.lock();
        self.storage.save(&session)?;
        tracing::info!(user_id = %session.user_id, "Session started");
        self.current.send_replace(Some(session));
        let _ = self.events.send(SessionEvent::SignedIn);
        Ok(())
    }

    /// Logs out. The in-memory session is dropped even if storage fails.
    pub fn clear_session(&self) -> Result<(), SessionStorageError> {
        self.clear(SessionEvent::SignedOut)
    }

    /// Drops a session the server no longer accepts.
    /// Emits `SessionEvent::Invalidated` once, no matter how many calls race here.
    pub fn invalidate(&self) {
        if let Err(err) = self.clear(SessionEvent::Invalidated) {
            tracing::warn!("Failed to remove invalidated session: {}", err);
        }
    }

    /// Drops the session only if it still carries `token`.
    /// A rejection of a token that was already replaced by a newer login is ignored.
    /// Returns true when the session was dropped.
    pub fn invalidate_if_token(&self, token: &str) -> bool {
        let _guard = self.write_lock.lock();
        let cleared = self.current.send_if_modified(|current| {
            if current.as_ref().is_some_and(|session| session.token == token) {
                *current = None;
                true
            } else {
                false
            }
        });
        if !cleared {
            tracing::debug!("Rejected token is no longer the current one, session kept");
            return false;
        }

        if let Err(err) = self.storage.remove() {
            tracing::warn!("Failed to remove invalidated session: {}", err);
        }
        tracing::info!(event = ?SessionEvent::Invalidated, "Session cleared");
        let _ = self.events.send(SessionEvent::Invalidated);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }

    fn clear(&self, event: SessionEvent) -> Result<(), SessionStorageError> {
        let _guard = self.write_lock.lock();
        let previous = self.current.send_replace(None);
        let removed = self.storage.remove();
        if previous.is_some() {
            tracing::info!(?event, "Session cleared");
            let _ = self.events.send(event);
        }
        removed
    }
}
