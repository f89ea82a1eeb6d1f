use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::principal::{Principal, PrincipalPatch};
use crate::storage::{DurableSlot, StorageError};

/// Default slot key holding the full session snapshot
pub const DEFAULT_SNAPSHOT_KEY: &str = "minigame-admin-session";

/// Default slot key holding the bare bearer token
pub const DEFAULT_TOKEN_KEY: &str = "minigame-admin-token";

/// Which slot keys the store owns.
///
/// The snapshot key is what rehydration reads. The token key mirrors just
/// the bearer token for components that only need to authorize requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub snapshot: String,
    pub token: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            snapshot: DEFAULT_SNAPSHOT_KEY.to_string(),
            token: DEFAULT_TOKEN_KEY.to_string(),
        }
    }
}

/// In-memory session state. Fields are private so the authenticated flag
/// can only ever be the one derived from the principal/token pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionState {
    principal: Option<Principal>,
    token: Option<String>,
    authenticated: bool,
}

impl SessionState {
    fn signed_in(principal: Principal, token: String) -> Self {
        Self {
            principal: Some(principal),
            token: Some(token),
            authenticated: true,
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

/// What gets written to the snapshot key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub principal: Option<Principal>,
    pub token: Option<String>,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    fn capture(state: &SessionState) -> Self {
        Self {
            principal: state.principal.clone(),
            token: state.token.clone(),
            authenticated: state.authenticated,
            saved_at: Some(Utc::now()),
        }
    }

    /// Minutes since the snapshot was written, if it carries a timestamp
    pub fn age_minutes(&self) -> Option<i64> {
        self.saved_at.map(|at| (Utc::now() - at).num_minutes())
    }

    /// A snapshot without a timestamp never expires
    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.saved_at
            .map(|at| Utc::now() > at + max_age)
            .unwrap_or(false)
    }

    /// Turn the snapshot back into live state, refusing anything that would
    /// break the principal/token/flag invariant.
    fn into_state(self) -> Option<SessionState> {
        match (self.principal, self.token) {
            (Some(principal), Some(token)) if self.authenticated && !token.is_empty() => {
                Some(SessionState::signed_in(principal, token))
            }
            _ => None,
        }
    }
}

/// Authenticated admin session with a mirrored durable copy.
///
/// Memory is authoritative; the durable slot is written on every mutation
/// and read once, when the store is built. Mutations hold the state lock
/// across the durable write so the slot sees them in issue order.
pub struct SessionStore {
    slot: Arc<dyn DurableSlot>,
    keys: StorageKeys,
    persist_updates: bool,
    state: Mutex<SessionState>,
}

/// Options for building a `SessionStore`
pub struct SessionStoreBuilder {
    slot: Arc<dyn DurableSlot>,
    keys: StorageKeys,
    max_age: Option<Duration>,
    persist_updates: bool,
}

impl SessionStoreBuilder {
    pub fn keys(mut self, keys: StorageKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Discard persisted sessions older than this at startup
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Whether profile updates rewrite the durable snapshot (default: yes)
    pub fn persist_updates(mut self, persist: bool) -> Self {
        self.persist_updates = persist;
        self
    }

    pub fn build(self) -> SessionStore {
        let state = rehydrate(self.slot.as_ref(), &self.keys, self.max_age);
        SessionStore {
            slot: self.slot,
            keys: self.keys,
            persist_updates: self.persist_updates,
            state: Mutex::new(state),
        }
    }
}

fn rehydrate(slot: &dyn DurableSlot, keys: &StorageKeys, max_age: Option<Duration>) -> SessionState {
    let raw = match slot.get(&keys.snapshot) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!(backend = slot.name(), "No persisted session");
            return SessionState::default();
        }
        Err(e) => {
            log_storage_error("read", slot.name(), &e);
            return SessionState::default();
        }
    };

    let snapshot: SessionSnapshot = match serde_json::from_str(&raw) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            debug!(backend = slot.name(), error = %e, "Persisted session is unparsable, ignoring");
            return SessionState::default();
        }
    };

    if let Some(max_age) = max_age {
        if snapshot.is_expired(max_age) {
            debug!(age_minutes = ?snapshot.age_minutes(), "Persisted session expired");
            return SessionState::default();
        }
    }

    match snapshot.into_state() {
        Some(state) => {
            debug!(backend = slot.name(), "Session rehydrated");
            state
        }
        None => {
            debug!(backend = slot.name(), "Persisted session is inconsistent, ignoring");
            SessionState::default()
        }
    }
}

fn log_storage_error(op: &str, backend: &str, e: &StorageError) {
    if e.is_unavailable() {
        debug!(op, backend, error = %e, "Durable storage unavailable, skipping");
    } else {
        warn!(op, backend, error = %e, "Durable storage failed, continuing in memory");
    }
}

impl SessionStore {
    /// Build a store with default keys and rehydrate from `slot`.
    pub fn new(slot: Arc<dyn DurableSlot>) -> Self {
        Self::builder(slot).build()
    }

    pub fn builder(slot: Arc<dyn DurableSlot>) -> SessionStoreBuilder {
        SessionStoreBuilder {
            slot,
            keys: StorageKeys::default(),
            max_age: None,
            persist_updates: true,
        }
    }

    /// Store signed in as `principal` with `token`, replacing any previous
    /// session. An empty token is refused and leaves the state alone.
    pub fn set_session(&self, principal: Principal, token: impl Into<String>) {
        let token = token.into();
        if token.is_empty() {
            warn!(principal = %principal.id, "Refusing to store a session with an empty token");
            return;
        }

        let mut state = self.state.lock();
        info!(principal = %principal.id, "Session set");
        *state = SessionState::signed_in(principal, token);
        self.persist(&state);
    }

    /// Merge `patch` over the current principal. Without a principal this
    /// does nothing. Token and flag are never touched.
    pub fn update_session(&self, patch: PrincipalPatch) {
        let mut state = self.state.lock();
        let Some(principal) = state.principal.as_mut() else {
            debug!("No principal to update");
            return;
        };
        principal.apply(&patch);

        if self.persist_updates {
            self.write_snapshot(&state);
        }
    }

    /// Drop the session and its durable copy. Safe to call repeatedly.
    pub fn clear_session(&self) {
        let mut state = self.state.lock();
        if state.authenticated {
            info!("Session cleared");
        }
        *state = SessionState::default();

        for key in [&self.keys.snapshot, &self.keys.token] {
            if let Err(e) = self.slot.remove(key) {
                log_storage_error("remove", self.slot.name(), &e);
            }
        }
    }

    /// Copy of the whole current state
    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.state.lock().principal.clone()
    }

    /// Current bearer token, for attaching to outgoing requests
    pub fn token(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().authenticated
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    fn persist(&self, state: &SessionState) {
        self.write_snapshot(state);
        if let Some(ref token) = state.token {
            if let Err(e) = self.slot.set(&self.keys.token, token) {
                log_storage_error("write", self.slot.name(), &e);
            }
        }
    }

    fn write_snapshot(&self, state: &SessionState) {
        let contents = match serde_json::to_string(&SessionSnapshot::capture(state)) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(error = %e, "Failed to encode session snapshot");
                return;
            }
        };
        if let Err(e) = self.slot.set(&self.keys.snapshot, &contents) {
            log_storage_error("write", self.slot.name(), &e);
        }
    }
}
