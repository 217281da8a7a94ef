//! Tagged query cache.
//!
//! Every entry is stored under a query key and carries a set of [`Tag`]s.
//! Reads hit by key; writes invalidate by tag, dropping every entry that
//! carries any of the given tags.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use vmsync_core::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Template,
    Session,
    Execution,
}

/// `(kind, id)`, where the id `LIST` marks the collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub kind: Kind,
    pub id: String,
}

pub const LIST: &str = "LIST";

impl Tag {
    pub fn list(kind: Kind) -> Self {
        Tag {
            kind,
            id: LIST.to_string(),
        }
    }

    pub fn entity(kind: Kind, id: impl fmt::Display) -> Self {
        Tag {
            kind,
            id: id.to_string(),
        }
    }

    /// The execution list of one session.
    pub fn session_executions(session_id: &SessionId) -> Self {
        Tag {
            kind: Kind::Execution,
            id: format!("{}-{}", LIST, session_id),
        }
    }
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    tags: Vec<Tag>,
}

#[derive(Default)]
pub struct QueryCache {
    entries: DashMap<String, Entry>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the entry under `key` if it holds a `T`.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        entry.value.downcast_ref::<T>().cloned()
    }

    pub fn insert<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T, tags: Vec<Tag>) {
        self.entries.insert(
            key.into(),
            Entry {
                value: Arc::new(value),
                tags,
            },
        );
    }

    /// Drops every entry carrying any of `tags`. Returns how many went.
    pub fn invalidate(&self, tags: &[Tag]) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.tags.iter().any(|t| tags.contains(t)));
        let dropped = before.saturating_sub(self.entries.len());
        if dropped > 0 {
            tracing::debug!(dropped, ?tags, "cache invalidated");
        }
        dropped
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
