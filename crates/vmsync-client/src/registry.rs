//! Template registry: list with bootstrap, detail, create, and
//! module/library reconciliation.

use std::collections::HashSet;

use vmsync_core::normalize::to_template;
use vmsync_core::wire::{CreateTemplateRequest, NamedItemRequest, RawTemplate, RawTemplateDetail};
use vmsync_core::{Template, TemplateId};

use crate::cache::{Kind, Tag};
use crate::engine::Inner;
use crate::error::EngineError;
use crate::transport::{encode_segment, ApiRequest};

/// A template created on an empty backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultTemplate {
    pub name: &'static str,
    pub engine: &'static str,
    pub modules: &'static [&'static str],
    pub libraries: &'static [&'static str],
}

pub const DEFAULT_TEMPLATES: [DefaultTemplate; 3] = [
    DefaultTemplate {
        name: "Default JavaScript",
        engine: "goja",
        modules: &[],
        libraries: &[],
    },
    DefaultTemplate {
        name: "Utility Playground",
        engine: "goja",
        modules: &[],
        libraries: &["lodash"],
    },
    DefaultTemplate {
        name: "Library Sandbox",
        engine: "goja",
        modules: &[],
        libraries: &["dayjs", "ramda"],
    },
];

/// A per-template name set with its own sub-resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateResource {
    Modules,
    Libraries,
}

impl TemplateResource {
    fn segment(&self) -> &'static str {
        match self {
            TemplateResource::Modules => "modules",
            TemplateResource::Libraries => "libraries",
        }
    }

    fn collection_path(&self, template_id: &TemplateId) -> String {
        format!(
            "/api/v1/templates/{}/{}",
            encode_segment(template_id.as_str()),
            self.segment()
        )
    }

    fn item_path(&self, template_id: &TemplateId, name: &str) -> String {
        format!("{}/{}", self.collection_path(template_id), encode_segment(name))
    }
}

/// Additions and removals that turn `current` into `wanted`.
///
/// Additions keep `wanted` order, removals keep `current` order; duplicates
/// are ignored on both sides.
pub fn diff_names(current: &[String], wanted: &[String]) -> (Vec<String>, Vec<String>) {
    let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
    let wanted_set: HashSet<&str> = wanted.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let to_add = wanted
        .iter()
        .filter(|n| !current_set.contains(n.as_str()) && seen.insert(n.as_str()))
        .cloned()
        .collect();
    let mut seen = HashSet::new();
    let to_remove = current
        .iter()
        .filter(|n| !wanted_set.contains(n.as_str()) && seen.insert(n.as_str()))
        .cloned()
        .collect();
    (to_add, to_remove)
}

const LIST_KEY: &str = "templates";

fn detail_key(id: &TemplateId) -> String {
    format!("template:{}", id)
}

fn detail_path(id: &TemplateId) -> String {
    format!("/api/v1/templates/{}", encode_segment(id.as_str()))
}

pub struct TemplateRegistry<'a> {
    inner: &'a Inner,
}

impl<'a> TemplateRegistry<'a> {
    pub(crate) fn new(inner: &'a Inner) -> Self {
        TemplateRegistry { inner }
    }

    /// All templates with full detail, sorted by name case-insensitively.
    /// An empty backend is bootstrapped with [`DEFAULT_TEMPLATES`] first.
    pub async fn list(&self) -> Result<Vec<Template>, EngineError> {
        if let Some(cached) = self.inner.cache.get::<Vec<Template>>(LIST_KEY) {
            return Ok(cached);
        }

        let mut raw: Vec<RawTemplate> = self
            .inner
            .fetch_list(ApiRequest::get("/api/v1/templates"))
            .await?;
        if raw.is_empty() {
            raw = self.bootstrap().await?;
        }

        let mut templates = Vec::with_capacity(raw.len());
        for tpl in &raw {
            templates.push(self.fetch_detail(&TemplateId::new(tpl.id.clone())).await?);
        }
        templates.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });

        {
            let mut store = self.inner.store.lock().await;
            for t in &templates {
                store.template_names.insert(t.id.clone(), t.name.clone());
            }
        }

        let mut tags: Vec<Tag> = templates
            .iter()
            .map(|t| Tag::entity(Kind::Template, &t.id))
            .collect();
        tags.push(Tag::list(Kind::Template));
        self.inner.cache.insert(LIST_KEY, templates.clone(), tags);
        Ok(templates)
    }

    /// Creates every default template with its modules and libraries.
    /// The first failing request aborts the run.
    async fn bootstrap(&self) -> Result<Vec<RawTemplate>, EngineError> {
        tracing::info!("no templates on backend; creating defaults");
        let mut created = Vec::with_capacity(DEFAULT_TEMPLATES.len());
        for preset in DEFAULT_TEMPLATES {
            let tpl = self.create_raw(preset.name, preset.engine).await?;
            let id = TemplateId::new(tpl.id.clone());
            for module in preset.modules {
                self.add_name(&id, TemplateResource::Modules, module).await?;
            }
            for library in preset.libraries {
                self.add_name(&id, TemplateResource::Libraries, library).await?;
            }
            created.push(tpl);
        }
        Ok(created)
    }

    async fn fetch_detail(&self, id: &TemplateId) -> Result<Template, EngineError> {
        let raw: RawTemplateDetail = self.inner.fetch(ApiRequest::get(detail_path(id))).await?;
        let template = to_template(&raw);
        self.inner
            .store
            .lock()
            .await
            .template_names
            .insert(template.id.clone(), template.name.clone());
        self.inner.cache.insert(
            detail_key(id),
            template.clone(),
            vec![Tag::entity(Kind::Template, id)],
        );
        Ok(template)
    }

    pub async fn get(&self, id: &TemplateId) -> Result<Template, EngineError> {
        if let Some(cached) = self.inner.cache.get::<Template>(&detail_key(id)) {
            return Ok(cached);
        }
        self.fetch_detail(id).await
    }

    async fn create_raw(&self, name: &str, engine: &str) -> Result<RawTemplate, EngineError> {
        let body = CreateTemplateRequest {
            name: name.to_string(),
            engine: engine.to_string(),
        };
        let tpl: RawTemplate = self
            .inner
            .fetch(ApiRequest::post("/api/v1/templates").json(&body)?)
            .await?;
        tracing::info!(template_id = %tpl.id, name = %tpl.name, "template created");
        Ok(tpl)
    }

    /// Creates a template. Settings the create response does not carry are
    /// defaulted until the detail is fetched.
    pub async fn create(&self, name: &str, engine: &str) -> Result<Template, EngineError> {
        let raw = self.create_raw(name, engine).await?;
        self.inner.cache.invalidate(&[Tag::list(Kind::Template)]);
        let template = to_template(&RawTemplateDetail {
            template: raw,
            settings: None,
            capabilities: None,
            startup_files: None,
        });
        self.inner
            .store
            .lock()
            .await
            .template_names
            .insert(template.id.clone(), template.name.clone());
        Ok(template)
    }

    async fn add_name(
        &self,
        id: &TemplateId,
        resource: TemplateResource,
        name: &str,
    ) -> Result<(), EngineError> {
        let body = NamedItemRequest {
            name: name.to_string(),
        };
        self.inner
            .call(ApiRequest::post(resource.collection_path(id)).json(&body)?)
            .await?;
        Ok(())
    }

    async fn remove_name(
        &self,
        id: &TemplateId,
        resource: TemplateResource,
        name: &str,
    ) -> Result<(), EngineError> {
        self.inner
            .call(ApiRequest::delete(resource.item_path(id, name)))
            .await?;
        Ok(())
    }

    /// Brings a template's name set to `wanted`: fetch current, issue every
    /// addition then every removal one request at a time, re-fetch detail.
    ///
    /// The first failing request aborts; changes already applied stay.
    pub async fn reconcile(
        &self,
        id: &TemplateId,
        resource: TemplateResource,
        wanted: &[String],
    ) -> Result<Template, EngineError> {
        let result = self.reconcile_inner(id, resource, wanted).await;
        self.inner.cache.invalidate(&[
            Tag::entity(Kind::Template, id),
            Tag::list(Kind::Template),
        ]);
        let template = result?;
        self.inner.cache.insert(
            detail_key(id),
            template.clone(),
            vec![Tag::entity(Kind::Template, id)],
        );
        Ok(template)
    }

    async fn reconcile_inner(
        &self,
        id: &TemplateId,
        resource: TemplateResource,
        wanted: &[String],
    ) -> Result<Template, EngineError> {
        let current: Vec<String> = self
            .inner
            .fetch_list(ApiRequest::get(resource.collection_path(id)))
            .await?;
        let (to_add, to_remove) = diff_names(&current, wanted);
        tracing::debug!(
            template_id = %id,
            resource = resource.segment(),
            add = to_add.len(),
            remove = to_remove.len(),
            "reconciling template names"
        );
        for name in &to_add {
            self.add_name(id, resource, name).await?;
        }
        for name in &to_remove {
            self.remove_name(id, resource, name).await?;
        }
        let raw: RawTemplateDetail = self.inner.fetch(ApiRequest::get(detail_path(id))).await?;
        Ok(to_template(&raw))
    }

    pub async fn update_modules(&self, id: &TemplateId, wanted: &[String]) -> Result<Template, EngineError> {
        self.reconcile(id, TemplateResource::Modules, wanted).await
    }

    pub async fn update_libraries(
        &self,
        id: &TemplateId,
        wanted: &[String],
    ) -> Result<Template, EngineError> {
        self.reconcile(id, TemplateResource::Libraries, wanted).await
    }
}
