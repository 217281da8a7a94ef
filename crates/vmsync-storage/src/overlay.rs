//! The identity overlay: client-side names and the current-session pointer.
//!
//! The overlay is best-effort. Read failures yield an empty overlay and write
//! failures are logged, never surfaced; losing a display name must not break
//! a session operation that already succeeded on the backend.

use std::sync::{Mutex, MutexGuard};

use vmsync_core::normalize::SessionNames;
use vmsync_core::SessionId;

use crate::error::StorageError;
use crate::memory::InMemoryStore;
use crate::traits::KeyValueStore;

/// Key under which the session-name map is stored as a JSON object.
pub const SESSION_NAMES_KEY: &str = "vmsync.session-names";
/// Key under which the current session id is stored as a plain string.
pub const CURRENT_SESSION_KEY: &str = "vmsync.current-session-id";

struct OverlayState {
    store: Box<dyn KeyValueStore>,
    names: SessionNames,
    current: Option<SessionId>,
}

/// Typed, thread-safe view over a [`KeyValueStore`].
///
/// The full overlay is loaded once on construction and kept in memory; every
/// mutation writes through to the store.
pub struct IdentityOverlay {
    state: Mutex<OverlayState>,
}

impl IdentityOverlay {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        let names = load_names(&store);
        let current = load_current(&store);
        IdentityOverlay {
            state: Mutex::new(OverlayState {
                store: Box::new(store),
                names,
                current,
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new())
    }

    fn lock(&self) -> MutexGuard<'_, OverlayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of every name override.
    pub fn names(&self) -> SessionNames {
        self.lock().names.clone()
    }

    pub fn name(&self, id: &SessionId) -> Option<String> {
        self.lock().names.get(id.as_str()).cloned()
    }

    /// Stores a trimmed override. A blank name removes the override.
    pub fn set_name(&self, id: &SessionId, name: &str) {
        let mut state = self.lock();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            state.names.remove(id.as_str());
        } else {
            state.names.insert(id.to_string(), trimmed.to_string());
        }
        persist_names(&mut state);
    }

    pub fn current(&self) -> Option<SessionId> {
        self.lock().current.clone()
    }

    pub fn set_current(&self, id: Option<&SessionId>) {
        let mut state = self.lock();
        state.current = id.cloned();
        persist_current(&mut state);
    }

    /// Drops every trace of a session: its override and, if it is current,
    /// the current pointer.
    pub fn forget(&self, id: &SessionId) {
        let mut state = self.lock();
        if state.names.remove(id.as_str()).is_some() {
            persist_names(&mut state);
        }
        if state.current.as_ref() == Some(id) {
            state.current = None;
            persist_current(&mut state);
        }
    }
}

fn load_names(store: &dyn KeyValueStore) -> SessionNames {
    let raw = match store.get(SESSION_NAMES_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return SessionNames::new(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read session names; starting empty");
            return SessionNames::new();
        }
    };
    match serde_json::from_str::<SessionNames>(&raw) {
        Ok(names) => names
            .into_iter()
            .filter(|(_, name)| !name.trim().is_empty())
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "session names are not a JSON object; ignoring");
            SessionNames::new()
        }
    }
}

fn load_current(store: &dyn KeyValueStore) -> Option<SessionId> {
    match store.get(CURRENT_SESSION_KEY) {
        Ok(value) => value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(SessionId::new),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read current session pointer");
            None
        }
    }
}

fn persist_names(state: &mut OverlayState) {
    let result: Result<(), StorageError> = serde_json::to_string(&state.names)
        .map_err(StorageError::from)
        .and_then(|json| state.store.set(SESSION_NAMES_KEY, &json));
    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to persist session names");
    }
}

fn persist_current(state: &mut OverlayState) {
    let result = match &state.current {
        Some(id) => state.store.set(CURRENT_SESSION_KEY, id.as_str()),
        None => state.store.remove(CURRENT_SESSION_KEY),
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to persist current session pointer");
    }
}
