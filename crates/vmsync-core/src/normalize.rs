//! Pure mapping between wire records and domain records.
//!
//! Nothing here touches the network or storage. Template normalization never
//! fails on partial payloads: every missing or wrongly typed settings field
//! falls back to the documented default.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use crate::id::{ExecutionId, SessionId, TemplateId};
use crate::model::{
    Capability, Event, Execution, ExecutionKind, Limits, Resolver, RuntimeFlags, Session,
    StartupFile, Template, TemplateSettings,
};
use crate::wire::{
    RawCapability, RawEvent, RawExecution, RawExecutionKind, RawSession, RawSettings,
    RawStartupFile, RawTemplate, RawTemplateDetail,
};

/// User-assigned display names keyed by session id.
pub type SessionNames = BTreeMap<String, String>;

/// Treats an absent list as empty.
pub fn as_list<T>(value: Option<Vec<T>>) -> Vec<T> {
    value.unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn field<'a>(obj: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    obj.and_then(Value::as_object).and_then(|map| map.get(key))
}

fn number_or(obj: Option<&Value>, key: &str, fallback: f64) -> f64 {
    field(obj, key)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .unwrap_or(fallback)
}

fn bool_or(obj: Option<&Value>, key: &str, fallback: bool) -> bool {
    field(obj, key).and_then(Value::as_bool).unwrap_or(fallback)
}

fn strings_or(obj: Option<&Value>, key: &str, fallback: &[String]) -> Vec<String> {
    match field(obj, key).and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        None => fallback.to_vec(),
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

pub fn to_limits(raw: Option<&Value>) -> Limits {
    let d = Limits::default();
    Limits {
        cpu_ms: number_or(raw, "cpu_ms", d.cpu_ms),
        wall_ms: number_or(raw, "wall_ms", d.wall_ms),
        mem_mb: number_or(raw, "mem_mb", d.mem_mb),
        max_events: number_or(raw, "max_events", d.max_events),
        max_output_kb: number_or(raw, "max_output_kb", d.max_output_kb),
    }
}

pub fn to_resolver(raw: Option<&Value>) -> Resolver {
    let d = Resolver::default();
    Resolver {
        roots: strings_or(raw, "roots", &d.roots),
        extensions: strings_or(raw, "extensions", &d.extensions),
        allow_absolute_repo_imports: bool_or(
            raw,
            "allow_absolute_repo_imports",
            d.allow_absolute_repo_imports,
        ),
    }
}

pub fn to_runtime(raw: Option<&Value>) -> RuntimeFlags {
    let d = RuntimeFlags::default();
    RuntimeFlags {
        esm: bool_or(raw, "esm", d.esm),
        strict: bool_or(raw, "strict", d.strict),
        console: bool_or(raw, "console", d.console),
    }
}

pub fn to_settings(raw: Option<&RawSettings>) -> TemplateSettings {
    TemplateSettings {
        limits: to_limits(raw.and_then(|s| s.limits.as_ref())),
        resolver: to_resolver(raw.and_then(|s| s.resolver.as_ref())),
        runtime: to_runtime(raw.and_then(|s| s.runtime.as_ref())),
    }
}

fn to_capability(raw: &RawCapability) -> Capability {
    let config = match &raw.config {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    Capability {
        id: raw.id.clone(),
        kind: raw.kind.clone(),
        name: raw.name.clone(),
        enabled: raw.enabled,
        config,
    }
}

fn to_startup_file(raw: &RawStartupFile) -> StartupFile {
    StartupFile {
        id: raw.id.clone(),
        path: raw.path.clone(),
        order_index: raw.order_index,
        mode: raw.mode,
    }
}

/// Maps a full template detail payload to a [`Template`].
pub fn to_template(detail: &RawTemplateDetail) -> Template {
    let tpl = &detail.template;
    let mut startup_files: Vec<StartupFile> = detail
        .startup_files
        .iter()
        .flatten()
        .map(to_startup_file)
        .collect();
    startup_files.sort_by_key(|f| f.order_index);

    Template {
        id: TemplateId::new(tpl.id.clone()),
        name: tpl.name.clone(),
        engine: tpl.engine.clone(),
        is_active: tpl.is_active,
        created_at: tpl.created_at,
        exposed_modules: dedup(as_list(tpl.exposed_modules.clone())),
        libraries: dedup(as_list(tpl.libraries.clone())),
        settings: to_settings(detail.settings.as_ref()),
        capabilities: detail
            .capabilities
            .iter()
            .flatten()
            .map(to_capability)
            .collect(),
        startup_files,
    }
}

/// Write path: domain settings back to the loose wire shape.
pub fn to_raw_settings(settings: &TemplateSettings) -> RawSettings {
    // Serializing plain structs of numbers, strings and bools cannot fail.
    RawSettings {
        limits: serde_json::to_value(settings.limits).ok(),
        resolver: serde_json::to_value(&settings.resolver).ok(),
        runtime: serde_json::to_value(settings.runtime).ok(),
    }
}

pub fn to_raw_template(template: &Template) -> RawTemplate {
    RawTemplate {
        id: template.id.to_string(),
        name: template.name.clone(),
        engine: template.engine.clone(),
        is_active: template.is_active,
        exposed_modules: Some(template.exposed_modules.clone()),
        libraries: Some(template.libraries.clone()),
        created_at: template.created_at,
        updated_at: None,
    }
}

pub fn to_raw_detail(template: &Template) -> RawTemplateDetail {
    RawTemplateDetail {
        template: to_raw_template(template),
        settings: Some(to_raw_settings(&template.settings)),
        capabilities: Some(
            template
                .capabilities
                .iter()
                .map(|c| RawCapability {
                    id: c.id.clone(),
                    kind: c.kind.clone(),
                    name: c.name.clone(),
                    enabled: c.enabled,
                    config: Some(Value::Object(c.config.clone())),
                })
                .collect(),
        ),
        startup_files: Some(
            template
                .startup_files
                .iter()
                .map(|f| RawStartupFile {
                    id: f.id.clone(),
                    path: f.path.clone(),
                    order_index: f.order_index,
                    mode: f.mode,
                })
                .collect(),
        ),
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Display name used when the overlay has no override.
///
/// Depends only on the template name and the id prefix.
pub fn default_session_name(template_name: Option<&str>, id: &SessionId) -> String {
    match template_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{} · {}", name, id.short()),
        None => format!("Session {}", id.short()),
    }
}

pub fn to_session(
    raw: &RawSession,
    overrides: &SessionNames,
    template_name: Option<&str>,
) -> Session {
    let id = SessionId::new(raw.id.clone());
    let name = overrides
        .get(&raw.id)
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_session_name(template_name, &id));

    Session {
        vm_id: TemplateId::new(raw.vm_id.clone()),
        workspace_id: raw.workspace_id.clone(),
        base_commit_oid: raw.base_commit_oid.clone(),
        worktree_path: raw.worktree_path.clone(),
        status: raw.status,
        created_at: raw.created_at,
        closed_at: raw.closed_at,
        last_error: raw.last_error.clone().filter(|e| !e.is_empty()),
        last_activity_at: raw.last_activity_at.unwrap_or(raw.created_at),
        name,
        id,
    }
}

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

fn to_kind(kind: RawExecutionKind) -> ExecutionKind {
    match kind {
        RawExecutionKind::Repl => ExecutionKind::Repl,
        RawExecutionKind::RunFile => ExecutionKind::RunFile,
        RawExecutionKind::Startup => ExecutionKind::Startup,
    }
}

/// Unwraps `{"json": ...}` result wrappers; anything else passes through.
pub fn to_result(raw: Option<&Value>) -> Option<Value> {
    match raw {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.contains_key("json") => map.get("json").cloned(),
        Some(other) => Some(other.clone()),
    }
}

/// Flattens any error shape to a message string.
pub fn to_error_message(raw: Option<&Value>) -> Option<String> {
    match raw {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(map)) => match map.get("message").and_then(Value::as_str) {
            Some(message) => Some(message.to_string()),
            None => Some(Value::Object(map.clone()).to_string()),
        },
        Some(other) => Some(other.to_string()),
    }
}

pub fn to_events(raw: &[RawEvent]) -> Vec<Event> {
    raw.iter()
        .map(|e| Event {
            seq: e.seq,
            ts: e.ts,
            event_type: e.event_type,
            payload: e.payload.clone(),
        })
        .collect()
}

pub fn to_execution(raw: &RawExecution, events: Vec<Event>) -> Execution {
    Execution {
        id: ExecutionId::new(raw.id.clone()),
        session_id: SessionId::new(raw.session_id.clone()),
        kind: to_kind(raw.kind),
        input: raw.input.clone(),
        path: raw.path.clone(),
        status: raw.status,
        started_at: raw.started_at,
        ended_at: raw.ended_at,
        result: to_result(raw.result.as_ref()),
        error: to_error_message(raw.error.as_ref()),
        events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventType, ExecutionStatus, SessionStatus};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::json;

    fn raw_template(id: &str, name: &str) -> RawTemplate {
        RawTemplate {
            id: id.to_string(),
            name: name.to_string(),
            engine: "goja".to_string(),
            is_active: true,
            exposed_modules: None,
            libraries: Some(vec!["lodash".into(), "lodash".into(), "dayjs".into()]),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    fn raw_session(id: &str) -> RawSession {
        RawSession {
            id: id.to_string(),
            vm_id: "tpl-1".to_string(),
            workspace_id: "ws".to_string(),
            base_commit_oid: "web-ui".to_string(),
            worktree_path: "/tmp".to_string(),
            status: SessionStatus::Ready,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            closed_at: None,
            last_error: Some(String::new()),
            last_activity_at: None,
        }
    }

    fn raw_execution(result: Option<Value>, error: Option<Value>) -> RawExecution {
        RawExecution {
            id: "e-1".into(),
            session_id: "s-1".into(),
            kind: RawExecutionKind::RunFile,
            input: None,
            path: Some("main.js".into()),
            status: ExecutionStatus::Ok,
            started_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            ended_at: None,
            result,
            error,
        }
    }

    #[test]
    fn missing_settings_yield_defaults() {
        let detail = RawTemplateDetail {
            template: raw_template("t-1", "Alpha"),
            settings: None,
            capabilities: None,
            startup_files: None,
        };
        let tpl = to_template(&detail);
        assert_eq!(tpl.settings, TemplateSettings::default());
        assert!(tpl.exposed_modules.is_empty());
        assert!(tpl.capabilities.is_empty());
        assert!(tpl.startup_files.is_empty());
    }

    #[test]
    fn malformed_settings_fields_fall_back_individually() {
        let settings = RawSettings {
            limits: Some(json!({ "cpu_ms": "fast", "wall_ms": 900, "mem_mb": null })),
            resolver: Some(json!({ "roots": "nope", "extensions": [".ts", 7] })),
            runtime: Some(json!({ "esm": false, "strict": "yes" })),
        };
        let tpl = to_template(&RawTemplateDetail {
            template: raw_template("t-1", "Alpha"),
            settings: Some(settings),
            capabilities: None,
            startup_files: None,
        });
        assert_eq!(tpl.settings.limits.cpu_ms, 2000.0);
        assert_eq!(tpl.settings.limits.wall_ms, 900.0);
        assert_eq!(tpl.settings.limits.mem_mb, 128.0);
        assert_eq!(tpl.settings.resolver.roots, vec!["."]);
        assert_eq!(tpl.settings.resolver.extensions, vec![".ts"]);
        assert!(!tpl.settings.runtime.esm);
        assert!(tpl.settings.runtime.strict);
    }

    #[test]
    fn template_lists_are_deduplicated() {
        let tpl = to_template(&RawTemplateDetail {
            template: raw_template("t-1", "Alpha"),
            settings: None,
            capabilities: None,
            startup_files: None,
        });
        assert_eq!(tpl.libraries, vec!["lodash", "dayjs"]);
    }

    #[test]
    fn raw_detail_round_trips_settings() {
        let mut tpl = to_template(&RawTemplateDetail {
            template: raw_template("t-1", "Alpha"),
            settings: None,
            capabilities: None,
            startup_files: None,
        });
        tpl.settings.limits.max_events = 12.0;
        tpl.settings.runtime.console = false;
        let back = to_template(&to_raw_detail(&tpl));
        assert_eq!(back, tpl);
    }

    #[test]
    fn session_name_prefers_override() {
        let mut names = SessionNames::new();
        names.insert("abcdef123456".into(), "  Demo ".into());
        let session = to_session(&raw_session("abcdef123456"), &names, Some("Alpha"));
        assert_eq!(session.name, "Demo");
        assert!(session.last_error.is_none());
        assert_eq!(session.last_activity_at, session.created_at);
    }

    #[test]
    fn session_name_falls_back_to_template_and_prefix() {
        let session = to_session(&raw_session("abcdef123456"), &SessionNames::new(), Some("Alpha"));
        assert_eq!(session.name, "Alpha · abcdef12");
        let orphan = to_session(&raw_session("abcdef123456"), &SessionNames::new(), None);
        assert_eq!(orphan.name, "Session abcdef12");
    }

    #[test]
    fn execution_maps_kind_result_and_error() {
        let exec = to_execution(
            &raw_execution(Some(json!({ "type": "number", "json": 4 })), None),
            vec![],
        );
        assert_eq!(exec.kind, ExecutionKind::RunFile);
        assert_eq!(exec.result, Some(json!(4)));
        assert!(exec.error.is_none());

        let passthrough = to_execution(&raw_execution(Some(json!([1, 2])), None), vec![]);
        assert_eq!(passthrough.result, Some(json!([1, 2])));
    }

    #[test]
    fn error_shapes_flatten_to_strings() {
        assert_eq!(to_error_message(Some(&json!("boom"))), Some("boom".into()));
        assert_eq!(
            to_error_message(Some(&json!({ "message": "bad" }))),
            Some("bad".into())
        );
        assert_eq!(
            to_error_message(Some(&json!({ "code": 3 }))),
            Some("{\"code\":3}".into())
        );
        assert_eq!(to_error_message(Some(&json!(null))), None);
        assert_eq!(to_error_message(None), None);
    }

    #[test]
    fn events_keep_order() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let raw = vec![
            RawEvent { seq: 1, ts, event_type: EventType::InputEcho, payload: json!({}) },
            RawEvent { seq: 3, ts, event_type: EventType::Console, payload: json!({}) },
        ];
        let seqs: Vec<u64> = to_events(&raw).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 3]);
        assert!(as_list::<RawEvent>(None).is_empty());
    }

    proptest! {
        #[test]
        fn default_name_is_deterministic(template in "[A-Za-z ]{0,12}", id in "[a-z0-9-]{1,24}") {
            let sid = SessionId::new(id);
            let first = default_session_name(Some(&template), &sid);
            let second = default_session_name(Some(&template), &sid);
            prop_assert_eq!(&first, &second);
            prop_assert!(first.ends_with(sid.short()));
        }
    }
}
