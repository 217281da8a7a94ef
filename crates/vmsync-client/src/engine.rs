//! The engine handle and the state every component shares.
//!
//! [`Engine`] owns one [`Inner`]: the transport, the query cache, the identity
//! overlay and the local entity index. Components ([`TemplateRegistry`],
//! [`SessionDirectory`], [`ExecutionTracker`]) are cheap views borrowing it.
//!
//! The local index sits behind a tokio mutex that is only held between
//! network calls, never across one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;

use vmsync_core::normalize::{as_list, to_session};
use vmsync_core::wire::RawSession;
use vmsync_core::{Execution, ExecutionId, Session, SessionId, SessionStatus, Template, TemplateId};
use vmsync_storage::IdentityOverlay;

use crate::cache::{Kind, QueryCache, Tag};
use crate::config::ClientConfig;
use crate::directory::SessionDirectory;
use crate::error::EngineError;
use crate::registry::TemplateRegistry;
use crate::tracker::ExecutionTracker;
use crate::transport::{ApiRequest, Transport};

/// Name given to the session `initialize` creates when none exist.
pub const DEFAULT_SESSION_NAME: &str = "Default Session";

/// Local mirror of backend entities.
#[derive(Default)]
pub(crate) struct LocalStore {
    pub template_names: HashMap<TemplateId, String>,
    pub sessions: HashMap<SessionId, Session>,
    /// Per-session executions, ordered by start time.
    pub executions: HashMap<SessionId, Vec<Execution>>,
    pub execution_owner: HashMap<ExecutionId, SessionId>,
}

impl LocalStore {
    pub fn template_name(&self, id: &TemplateId) -> Option<&str> {
        self.template_names.get(id).map(String::as_str)
    }

    pub fn remove_session(&mut self, id: &SessionId) -> Option<Session> {
        if let Some(executions) = self.executions.remove(id) {
            for exec in executions {
                self.execution_owner.remove(&exec.id);
            }
        }
        self.sessions.remove(id)
    }

    /// Inserts or replaces an execution, keeping start-time order.
    pub fn upsert_execution(&mut self, execution: Execution) {
        self.execution_owner
            .insert(execution.id.clone(), execution.session_id.clone());
        let list = self
            .executions
            .entry(execution.session_id.clone())
            .or_default();
        list.retain(|e| e.id != execution.id);
        let at = list.partition_point(|e| e.started_at <= execution.started_at);
        list.insert(at, execution);
    }

    pub fn replace_executions(&mut self, session_id: &SessionId, executions: Vec<Execution>) {
        if let Some(old) = self.executions.remove(session_id) {
            for exec in old {
                self.execution_owner.remove(&exec.id);
            }
        }
        for exec in executions {
            self.upsert_execution(exec);
        }
        self.executions.entry(session_id.clone()).or_default();
    }

    pub fn execution_mut(&mut self, id: &ExecutionId) -> Option<&mut Execution> {
        let owner = self.execution_owner.get(id)?;
        self.executions
            .get_mut(owner)?
            .iter_mut()
            .find(|e| &e.id == id)
    }

    pub fn remove_execution(&mut self, id: &ExecutionId) -> Option<Execution> {
        let owner = self.execution_owner.remove(id)?;
        let list = self.executions.get_mut(&owner)?;
        let at = list.iter().position(|e| &e.id == id)?;
        Some(list.remove(at))
    }

    /// Ready sessions, newest first.
    pub fn ready_sessions(&self) -> Vec<&Session> {
        let mut ready: Vec<&Session> = self
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Ready)
            .collect();
        sort_newest_first(&mut ready);
        ready
    }
}

pub(crate) fn sort_newest_first<S: std::borrow::Borrow<Session>>(sessions: &mut [S]) {
    sessions.sort_by(|a, b| {
        let (a, b) = (a.borrow(), b.borrow());
        b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
    });
}

/// What `initialize` settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct InitSummary {
    pub templates: Vec<Template>,
    pub sessions: Vec<Session>,
    pub current: Option<Session>,
}

type InitFuture = Shared<BoxFuture<'static, Result<InitSummary, EngineError>>>;

#[derive(Default)]
struct InitSlot {
    generation: u64,
    in_flight: Option<(u64, InitFuture)>,
}

pub(crate) struct Inner {
    pub transport: Arc<dyn Transport>,
    pub config: ClientConfig,
    pub cache: QueryCache,
    pub overlay: IdentityOverlay,
    pub store: tokio::sync::Mutex<LocalStore>,
    init: Mutex<InitSlot>,
}

impl Inner {
    pub async fn call(&self, request: ApiRequest) -> Result<Option<Value>, EngineError> {
        Ok(self.transport.send(request).await?)
    }

    pub async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, EngineError> {
        let value = self.call(request).await?.unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| EngineError::Decode(e.to_string()))
    }

    /// Fetches a list; `null` or an empty body is an empty list.
    pub async fn fetch_list<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<Vec<T>, EngineError> {
        Ok(as_list(self.fetch::<Option<Vec<T>>>(request).await?))
    }

    /// Maps a raw session with the current overlay names.
    pub fn session_from_raw(&self, store: &LocalStore, raw: &RawSession) -> Session {
        let template_name = store.template_name(&TemplateId::new(raw.vm_id.clone()));
        to_session(raw, &self.overlay.names(), template_name)
    }

    /// Enforces the current-session invariant: the pointer resolves to a
    /// `ready` session in the index or is cleared. With `adopt`, the newest
    /// `ready` session becomes current when none is.
    pub fn reconcile_current(&self, store: &LocalStore, adopt: bool) {
        let current = self.overlay.current();
        let valid = current
            .as_ref()
            .and_then(|id| store.sessions.get(id))
            .is_some_and(|s| s.status == SessionStatus::Ready);
        if valid {
            return;
        }
        let next = if adopt {
            store.ready_sessions().first().map(|s| s.id.clone())
        } else {
            None
        };
        if next.is_some() || current.is_some() {
            self.overlay.set_current(next.as_ref());
        }
    }

    pub fn invalidate_session(&self, id: &SessionId) {
        self.cache.invalidate(&[
            Tag::entity(Kind::Session, id),
            Tag::list(Kind::Session),
            Tag::session_executions(id),
        ]);
    }

    /// Drops a session the backend no longer knows, along with its
    /// executions, its display name and the current pointer if it was current.
    pub async fn evict_session(&self, id: &SessionId) {
        let mut store = self.store.lock().await;
        store.remove_session(id);
        self.overlay.forget(id);
        self.reconcile_current(&store, false);
        drop(store);
        self.invalidate_session(id);
        tracing::info!(session_id = %id, "evicted session missing on backend");
    }

    pub async fn evict_execution(&self, id: &ExecutionId) {
        let removed = self.store.lock().await.remove_execution(id);
        if let Some(exec) = removed {
            self.cache.invalidate(&[
                Tag::entity(Kind::Execution, id),
                Tag::session_executions(&exec.session_id),
            ]);
        }
        tracing::info!(execution_id = %id, "evicted execution missing on backend");
    }

    /// Evicts whatever a not-found error refers to, then hands the error back.
    pub async fn observe_missing(
        &self,
        err: EngineError,
        session: Option<&SessionId>,
        execution: Option<&ExecutionId>,
    ) -> EngineError {
        if err.is_session_not_found() {
            if let Some(id) = session {
                self.evict_session(id).await;
            }
        } else if err.is_execution_not_found() {
            if let Some(id) = execution {
                self.evict_execution(id).await;
            }
        }
        err
    }
}

/// Handle to the synchronization engine. Cloning is cheap and clones share
/// all state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn new(transport: Arc<dyn Transport>, overlay: IdentityOverlay, config: ClientConfig) -> Self {
        Engine {
            inner: Arc::new(Inner {
                transport,
                config,
                cache: QueryCache::new(),
                overlay,
                store: tokio::sync::Mutex::new(LocalStore::default()),
                init: Mutex::new(InitSlot::default()),
            }),
        }
    }

    pub fn templates(&self) -> TemplateRegistry<'_> {
        TemplateRegistry::new(&self.inner)
    }

    pub fn sessions(&self) -> SessionDirectory<'_> {
        SessionDirectory::new(&self.inner)
    }

    pub fn executions(&self) -> ExecutionTracker<'_> {
        ExecutionTracker::new(&self.inner)
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    pub fn overlay(&self) -> &IdentityOverlay {
        &self.inner.overlay
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Loads templates (bootstrapping defaults on an empty backend) and
    /// sessions, creating a default session when there are none.
    ///
    /// Concurrent callers share one in-flight run and all receive its result.
    /// Once it settles the slot is cleared, so a later call runs again.
    pub async fn initialize(&self) -> Result<InitSummary, EngineError> {
        let (generation, future) = {
            let mut slot = self.inner.init.lock().unwrap_or_else(|p| p.into_inner());
            match &slot.in_flight {
                Some((generation, future)) => (*generation, future.clone()),
                None => {
                    slot.generation += 1;
                    let generation = slot.generation;
                    let inner = Arc::clone(&self.inner);
                    let future = async move { run_initialize(&inner).await }.boxed().shared();
                    slot.in_flight = Some((generation, future.clone()));
                    (generation, future)
                }
            }
        };

        let result = future.await;

        let mut slot = self.inner.init.lock().unwrap_or_else(|p| p.into_inner());
        if matches!(&slot.in_flight, Some((g, _)) if *g == generation) {
            slot.in_flight = None;
        }
        result
    }
}

async fn run_initialize(inner: &Inner) -> Result<InitSummary, EngineError> {
    let templates = TemplateRegistry::new(inner).list().await?;
    let directory = SessionDirectory::new(inner);
    let mut sessions = directory.list(None).await?;

    if sessions.is_empty() {
        let template = templates.first().ok_or(EngineError::NoTemplate)?;
        tracing::info!(template_id = %template.id, "no sessions; creating default session");
        let created = directory
            .create(&template.id, Some(DEFAULT_SESSION_NAME))
            .await?;
        sessions = vec![created];
    }

    Ok(InitSummary {
        templates,
        sessions,
        current: directory.current().await,
    })
}
