//! Session directory: creation, listing, the current-session pointer, names,
//! and close/delete.

use std::collections::HashSet;

use vmsync_core::wire::{CreateSessionRequest, RawSession};
use vmsync_core::{Session, SessionId, SessionStatus, TemplateId};

use crate::cache::{Kind, Tag};
use crate::engine::{sort_newest_first, Inner};
use crate::error::EngineError;
use crate::registry::TemplateRegistry;
use crate::transport::{encode_segment, ApiRequest};

fn list_key(status: Option<SessionStatus>) -> String {
    format!("sessions:{}", status.map_or("all", |s| s.as_str()))
}

fn session_key(id: &SessionId) -> String {
    format!("session:{}", id)
}

fn session_path(id: &SessionId) -> String {
    format!("/api/v1/sessions/{}", encode_segment(id.as_str()))
}

pub struct SessionDirectory<'a> {
    inner: &'a Inner,
}

impl<'a> SessionDirectory<'a> {
    pub(crate) fn new(inner: &'a Inner) -> Self {
        SessionDirectory { inner }
    }

    /// Creates a session from `template_id` with the configured workspace
    /// defaults. A non-blank `name` becomes its display name; a `ready`
    /// session becomes current.
    pub async fn create(&self, template_id: &TemplateId, name: Option<&str>) -> Result<Session, EngineError> {
        if template_id.as_str().trim().is_empty() {
            return Err(EngineError::MissingTemplateId);
        }
        let config = &self.inner.config;
        let body = CreateSessionRequest {
            template_id: template_id.to_string(),
            workspace_id: config.workspace_id.clone(),
            base_commit_oid: config.base_commit_oid.clone(),
            worktree_path: config.worktree_path.clone(),
        };
        let raw: RawSession = self
            .inner
            .fetch(ApiRequest::post("/api/v1/sessions").json(&body)?)
            .await?;
        let id = SessionId::new(raw.id.clone());
        self.learn_template_names(std::slice::from_ref(&raw)).await;

        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            self.inner.overlay.set_name(&id, name);
        }

        let mut store = self.inner.store.lock().await;
        let session = self.inner.session_from_raw(&store, &raw);
        store.sessions.insert(id.clone(), session.clone());
        if session.status == SessionStatus::Ready {
            self.inner.overlay.set_current(Some(&id));
        }
        drop(store);

        self.inner.cache.invalidate(&[Tag::list(Kind::Session)]);
        tracing::info!(session_id = %id, template_id = %template_id, "session created");
        Ok(session)
    }

    /// Lists sessions, newest first.
    ///
    /// An unfiltered list also prunes local entries the backend no longer
    /// reports. Either way the current pointer is re-validated afterwards.
    pub async fn list(&self, status: Option<SessionStatus>) -> Result<Vec<Session>, EngineError> {
        let key = list_key(status);
        if let Some(cached) = self.inner.cache.get::<Vec<Session>>(&key) {
            return Ok(cached);
        }

        let mut request = ApiRequest::get("/api/v1/sessions");
        if let Some(status) = status {
            request = request.query("status", status.as_str());
        }
        let raw: Vec<RawSession> = self.inner.fetch_list(request).await?;
        self.learn_template_names(&raw).await;

        let mut store = self.inner.store.lock().await;
        let mut sessions: Vec<Session> = raw
            .iter()
            .map(|r| self.inner.session_from_raw(&store, r))
            .collect();
        if status.is_none() {
            let reported: HashSet<&SessionId> = sessions.iter().map(|s| &s.id).collect();
            let gone: Vec<SessionId> = store
                .sessions
                .keys()
                .filter(|id| !reported.contains(id))
                .cloned()
                .collect();
            for id in &gone {
                store.remove_session(id);
            }
        }
        for session in &sessions {
            store.sessions.insert(session.id.clone(), session.clone());
        }
        self.inner.reconcile_current(&store, true);
        drop(store);

        sort_newest_first(&mut sessions);
        let mut tags: Vec<Tag> = sessions
            .iter()
            .map(|s| Tag::entity(Kind::Session, &s.id))
            .collect();
        tags.push(Tag::list(Kind::Session));
        self.inner.cache.insert(key, sessions.clone(), tags);
        Ok(sessions)
    }

    /// Drops cached session lists and lists again.
    pub async fn reload(&self, status: Option<SessionStatus>) -> Result<Vec<Session>, EngineError> {
        self.inner.cache.invalidate(&[Tag::list(Kind::Session)]);
        self.list(status).await
    }

    pub async fn get(&self, id: &SessionId) -> Result<Session, EngineError> {
        if let Some(cached) = self.inner.cache.get::<Session>(&session_key(id)) {
            return Ok(cached);
        }
        let raw: RawSession = match self.inner.fetch(ApiRequest::get(session_path(id))).await {
            Ok(raw) => raw,
            Err(err) => return Err(self.inner.observe_missing(err, Some(id), None).await),
        };
        let session = self.store_session(&raw).await;
        self.inner.cache.insert(
            session_key(id),
            session.clone(),
            vec![Tag::entity(Kind::Session, id)],
        );
        Ok(session)
    }

    async fn store_session(&self, raw: &RawSession) -> Session {
        self.learn_template_names(std::slice::from_ref(raw)).await;
        let mut store = self.inner.store.lock().await;
        let session = self.inner.session_from_raw(&store, raw);
        store.sessions.insert(session.id.clone(), session.clone());
        self.inner.reconcile_current(&store, false);
        session
    }

    /// Loads the names of templates the index has not seen, so a default
    /// display name is the same whether or not templates were listed first.
    /// A template that cannot be loaded leaves the generic name in place.
    async fn learn_template_names(&self, raws: &[RawSession]) {
        let mut unknown: Vec<TemplateId> = {
            let store = self.inner.store.lock().await;
            raws.iter()
                .filter(|r| !r.vm_id.trim().is_empty())
                .map(|r| TemplateId::new(r.vm_id.clone()))
                .filter(|id| store.template_name(id).is_none())
                .collect()
        };
        unknown.sort();
        unknown.dedup();

        let registry = TemplateRegistry::new(self.inner);
        for id in unknown {
            if let Err(err) = registry.get(&id).await {
                tracing::warn!(template_id = %id, error = %err, "failed to load template for session name");
            }
        }
    }

    /// The current session, if the pointer resolves to a `ready` session.
    pub async fn current(&self) -> Option<Session> {
        let id = self.inner.overlay.current()?;
        let store = self.inner.store.lock().await;
        store
            .sessions
            .get(&id)
            .filter(|s| s.status == SessionStatus::Ready)
            .cloned()
    }

    pub async fn set_current(&self, id: &SessionId) -> Result<Session, EngineError> {
        let store = self.inner.store.lock().await;
        let session = store
            .sessions
            .get(id)
            .ok_or_else(|| EngineError::UnknownSession(id.clone()))?;
        if session.status != SessionStatus::Ready {
            return Err(EngineError::SessionNotReady {
                id: id.clone(),
                status: session.status,
            });
        }
        self.inner.overlay.set_current(Some(id));
        Ok(session.clone())
    }

    /// Sets the display name; a blank name restores the default.
    pub async fn rename(&self, id: &SessionId, name: &str) -> Result<Session, EngineError> {
        let mut store = self.inner.store.lock().await;
        let Some(existing) = store.sessions.get(id) else {
            return Err(EngineError::UnknownSession(id.clone()));
        };
        let template_name = store.template_name(&existing.vm_id).map(str::to_string);

        self.inner.overlay.set_name(id, name);
        let display = self.inner.overlay.name(id).unwrap_or_else(|| {
            vmsync_core::normalize::default_session_name(template_name.as_deref(), id)
        });

        let session = match store.sessions.get_mut(id) {
            Some(session) => {
                session.name = display;
                session.clone()
            }
            None => return Err(EngineError::UnknownSession(id.clone())),
        };
        drop(store);
        self.inner.cache.invalidate(&[
            Tag::entity(Kind::Session, id),
            Tag::list(Kind::Session),
        ]);
        Ok(session)
    }

    pub async fn close(&self, id: &SessionId) -> Result<Session, EngineError> {
        let request = ApiRequest::post(format!("{}/close", session_path(id)));
        let raw: RawSession = match self.inner.fetch(request).await {
            Ok(raw) => raw,
            Err(err) => return Err(self.inner.observe_missing(err, Some(id), None).await),
        };
        let session = self.store_session(&raw).await;
        self.inner.invalidate_session(id);
        tracing::info!(session_id = %id, status = %session.status, "session closed");
        Ok(session)
    }

    pub async fn delete(&self, id: &SessionId) -> Result<(), EngineError> {
        if let Err(err) = self.inner.call(ApiRequest::delete(session_path(id))).await {
            return Err(self.inner.observe_missing(err, Some(id), None).await);
        }
        let mut store = self.inner.store.lock().await;
        store.remove_session(id);
        self.inner.overlay.forget(id);
        self.inner.reconcile_current(&store, false);
        drop(store);
        self.inner.invalidate_session(id);
        tracing::info!(session_id = %id, "session deleted");
        Ok(())
    }
}
