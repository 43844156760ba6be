//! Session lookup.
//!
//! # Responsibilities
//! - `Session`: identifier plus string values, cheap to clone
//! - `SessionStore`: lookup by identifier, empty session on miss
//! - `MemorySessionStore`: concurrent in-process store
//!
//! # Design Decisions
//! - A miss is not an error; callers proceed with a fresh session

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

/// Session state attached to a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    id: Option<String>,
    values: HashMap<String, String>,
}

impl Session {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            values: HashMap::new(),
        }
    }

    /// `None` for a fresh, unsaved session.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

/// Session lookup used while resolving an upgraded connection's session.
pub trait SessionStore: Send + Sync + 'static {
    /// Find a session by id; returns an empty session on a miss.
    fn find_session(&self, id: &str) -> Session;
}

/// Thread-safe in-memory session store.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<DashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a session under its id. Sessions without an id are ignored.
    pub fn store(&self, session: Session) {
        if let Some(id) = session.id().map(str::to_string) {
            self.inner.insert(id, session);
        }
    }

    pub fn remove(&self, id: &str) -> Option<Session> {
        self.inner.remove(id).map(|(_, session)| session)
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }
}

impl SessionStore for MemorySessionStore {
    fn find_session(&self, id: &str) -> Session {
        self.inner
            .get(id)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }
}
