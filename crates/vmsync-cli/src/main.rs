//! Command-line front end for the vmsync engine.
//!
//! Provides the `vmsync` binary. Every subcommand prints its result as JSON
//! on stdout; logs go to stderr. Connection settings come from the
//! `VMSYNC_*` environment variables and may be overridden by flags.
//!
//! Exit codes: 0 = success, 1 = rejected locally (unknown or non-ready
//! session, bad arguments), 2 = backend/transport failure, 3 = local state
//! database could not be opened.

use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use vmsync_client::{ClientConfig, Engine, EngineError, HttpTransport, DEFAULT_HISTORY_LIMIT};
use vmsync_core::{ExecutionId, SessionId, SessionStatus, TemplateId};
use vmsync_storage::{IdentityOverlay, SqliteStore};

/// Synchronize and drive VM sessions on an execution backend.
#[derive(Parser)]
#[command(name = "vmsync", about = "Template, session and REPL client for the VM execution backend")]
struct Cli {
    /// API base: absolute http(s) URL or a path prefix joined onto the origin.
    #[arg(long, global = true)]
    api_base_url: Option<String>,

    /// Origin used with a relative API base.
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Workspace id sent when creating sessions.
    #[arg(long, global = true)]
    workspace_id: Option<String>,

    /// SQLite file holding session names and the current session.
    #[arg(long, global = true)]
    state_db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load templates and sessions, creating defaults on an empty backend.
    Init,
    /// Template operations.
    Template {
        #[command(subcommand)]
        command: TemplateCommand,
    },
    /// Session operations.
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// Run REPL input in a session (default: the current session).
    Run {
        code: String,
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Recent executions of a session, oldest first.
    History {
        #[arg(short, long)]
        session: Option<String>,
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
    /// Events of an execution after a sequence number.
    Events {
        execution: String,
        #[arg(long, default_value_t = 0)]
        after_seq: u64,
    },
}

#[derive(Subcommand)]
enum TemplateCommand {
    List,
    Create {
        name: String,
        #[arg(long, default_value = "goja")]
        engine: String,
    },
    /// Replace the template's exposed modules with exactly these names.
    Modules { id: String, names: Vec<String> },
    /// Replace the template's libraries with exactly these names.
    Libraries { id: String, names: Vec<String> },
}

#[derive(Subcommand)]
enum SessionCommand {
    List {
        /// Only sessions with this status (starting, ready, crashed, closed).
        #[arg(long)]
        status: Option<String>,
    },
    Create {
        template: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Make a ready session current.
    Use { id: String },
    /// Set a display name; an empty name restores the default.
    Rename { id: String, name: String },
    Close { id: String },
    Delete { id: String },
}

/// Why a command failed, mapped onto the exit code.
enum Failure {
    Engine(EngineError),
    Usage(String),
    Storage(String),
}

impl Failure {
    fn exit_code(&self) -> i32 {
        match self {
            Failure::Engine(e) if e.is_domain() => 1,
            Failure::Engine(_) => 2,
            Failure::Usage(_) => 1,
            Failure::Storage(_) => 3,
        }
    }

    fn message(&self) -> String {
        match self {
            Failure::Engine(e) => e.to_string(),
            Failure::Usage(m) | Failure::Storage(m) => m.clone(),
        }
    }
}

impl From<EngineError> for Failure {
    fn from(err: EngineError) -> Self {
        Failure::Engine(err)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(failure) => {
            eprintln!("Error: {}", failure.message());
            failure.exit_code()
        }
    };
    process::exit(code);
}

fn config_from(cli: &Cli) -> ClientConfig {
    let mut config = ClientConfig::from_env();
    if let Some(base) = &cli.api_base_url {
        config.api_base_url = base.trim().trim_end_matches('/').to_string();
    }
    if let Some(origin) = &cli.origin {
        config.origin = origin.clone();
    }
    if let Some(workspace) = &cli.workspace_id {
        config.workspace_id = workspace.clone();
    }
    if let Some(db) = &cli.state_db {
        config.state_db = db.clone();
    }
    config
}

fn open_engine(config: ClientConfig) -> Result<Engine, Failure> {
    let store = SqliteStore::new(&config.state_db).map_err(|e| {
        Failure::Storage(format!(
            "failed to open state database '{}': {}",
            config.state_db, e
        ))
    })?;
    let transport = Arc::new(HttpTransport::new(&config));
    Ok(Engine::new(transport, IdentityOverlay::new(store), config))
}

async fn run(cli: Cli) -> Result<(), Failure> {
    let engine = open_engine(config_from(&cli))?;

    match cli.command {
        Commands::Init => {
            let summary = engine.initialize().await?;
            print_json(&json!({
                "templates": summary.templates,
                "sessions": summary.sessions,
                "current": summary.current,
            }));
        }
        Commands::Template { command } => run_template(&engine, command).await?,
        Commands::Session { command } => run_session(&engine, command).await?,
        Commands::Run { code, session } => {
            let id = resolve_session(&engine, session).await?;
            print_json(&engine.executions().run(&id, &code).await?);
        }
        Commands::History { session, limit } => {
            let id = resolve_session(&engine, session).await?;
            print_json(&engine.executions().list_for_session(&id, limit).await?);
        }
        Commands::Events {
            execution,
            after_seq,
        } => {
            let id = ExecutionId::new(execution);
            print_json(&engine.executions().events(&id, after_seq).await?);
        }
    }
    Ok(())
}

async fn run_template(engine: &Engine, command: TemplateCommand) -> Result<(), Failure> {
    let templates = engine.templates();
    match command {
        TemplateCommand::List => print_json(&templates.list().await?),
        TemplateCommand::Create { name, engine } => {
            print_json(&templates.create(&name, &engine).await?)
        }
        TemplateCommand::Modules { id, names } => {
            print_json(&templates.update_modules(&TemplateId::new(id), &names).await?)
        }
        TemplateCommand::Libraries { id, names } => {
            print_json(&templates.update_libraries(&TemplateId::new(id), &names).await?)
        }
    }
    Ok(())
}

async fn run_session(engine: &Engine, command: SessionCommand) -> Result<(), Failure> {
    let sessions = engine.sessions();
    match command {
        SessionCommand::List { status } => {
            let status = status
                .map(|s| s.parse::<SessionStatus>())
                .transpose()
                .map_err(|e| Failure::Usage(e.to_string()))?;
            print_json(&sessions.list(status).await?);
        }
        SessionCommand::Create { template, name } => {
            print_json(&sessions.create(&TemplateId::new(template), name.as_deref()).await?)
        }
        SessionCommand::Use { id } => {
            sessions.list(None).await?;
            print_json(&sessions.set_current(&SessionId::new(id)).await?);
        }
        SessionCommand::Rename { id, name } => {
            sessions.list(None).await?;
            print_json(&sessions.rename(&SessionId::new(id), &name).await?);
        }
        SessionCommand::Close { id } => print_json(&sessions.close(&SessionId::new(id)).await?),
        SessionCommand::Delete { id } => {
            sessions.delete(&SessionId::new(id.clone())).await?;
            print_json(&json!({ "deleted": id }));
        }
    }
    Ok(())
}

/// Loads the session index, then picks the named session or the current one.
async fn resolve_session(engine: &Engine, session: Option<String>) -> Result<SessionId, Failure> {
    engine.sessions().list(None).await?;
    match session {
        Some(id) => Ok(SessionId::new(id)),
        None => engine
            .sessions()
            .current()
            .await
            .map(|s| s.id)
            .ok_or_else(|| Failure::Usage("no current session; pass --session".to_string())),
    }
}

fn print_json<T: Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}
