mod commands;
mod present;

use clap::{Parser, Subcommand, ValueEnum};
use jot_api::{COMPLETED, DocumentStoreApi, Instant, NOTES, Priority, TASKS};
use jot_core::{ExitCode, JotError, JotResult};
use jot_fs::{
    DisplayConfig, WORKSPACE_DIR, WorkspacePaths, init_workspace, load_config, resolve_profile,
    resolve_workspace,
};
use jot_store::{StateStore, StoredSession};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "jot",
    version,
    about = "Offline-tolerant tasks and notes CLI",
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, global = true)]
    profile: Option<String>,

    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,

    #[arg(long, global = true)]
    server: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_color: bool,

    #[arg(long, global = true)]
    debug: bool,

    #[arg(long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Init,
    Doctor,
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    Completed {
        #[command(subcommand)]
        command: CompletedCommand,
    },
    Note {
        #[command(subcommand)]
        command: NoteCommand,
    },
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ProfileCommand {
    List,
    Use {
        name: String,
    },
    Set {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        server: String,
    },
}

#[derive(Debug, Subcommand)]
enum AuthCommand {
    Login {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    Status,
    Logout {
        /// Also drop this user's mirrored collections.
        #[arg(long)]
        purge: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SortKey {
    Due,
    Priority,
}

impl SortKey {
    fn from_config(display: &DisplayConfig) -> Option<Self> {
        match display.sort.as_deref()?.trim().to_ascii_lowercase().as_str() {
            "due" | "due_date" => Some(Self::Due),
            "priority" => Some(Self::Priority),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CollectionArg {
    Tasks,
    Completed,
    Notes,
}

impl CollectionArg {
    fn as_str(self) -> &'static str {
        match self {
            Self::Tasks => TASKS,
            Self::Completed => COMPLETED,
            Self::Notes => NOTES,
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
struct ListArgs {
    #[arg(long, value_enum)]
    sort: Option<SortKey>,
    #[arg(long)]
    desc: bool,
    /// Print the local mirror without contacting the server.
    #[arg(long)]
    cached: bool,
}

#[derive(Debug, Subcommand)]
enum TaskCommand {
    List(ListArgs),
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_due)]
        due: Option<Instant>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long = "subtask")]
        subtasks: Vec<String>,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_due)]
        due: Option<Instant>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long = "subtask")]
        subtasks: Vec<String>,
    },
    Complete {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum CompletedCommand {
    List(ListArgs),
}

#[derive(Debug, Subcommand)]
enum NoteCommand {
    List {
        #[arg(long)]
        cached: bool,
    },
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    Show {
        #[arg(value_enum)]
        collection: CollectionArg,
    },
    Clear {
        #[arg(value_enum)]
        collection: CollectionArg,
    },
}

#[derive(Debug, Clone)]
struct GlobalOptions {
    profile: Option<String>,
    workspace: Option<PathBuf>,
    server: Option<String>,
    json: bool,
    yes: bool,
}

#[derive(Debug)]
struct AuthContext {
    paths: WorkspacePaths,
    profile: String,
    server: String,
    display: DisplayConfig,
    api: DocumentStoreApi,
    state: StateStore,
}

/// An [`AuthContext`] with a signed-in session; `api` carries its token.
#[derive(Debug)]
struct SessionContext {
    auth: AuthContext,
    session: StoredSession,
}

impl SessionContext {
    fn user_id(&self) -> &str {
        &self.session.user_id
    }
}

#[derive(Debug, Serialize)]
struct InitOutput {
    workspace: String,
    created: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ProfileChangedOutput {
    profile: String,
    server: String,
}

fn main() {
    let cli = Cli::parse();
    configure_logging(cli.debug, cli.json, cli.no_color);

    let globals = GlobalOptions {
        profile: cli.profile,
        workspace: cli.workspace,
        server: cli.server,
        json: cli.json,
        yes: cli.yes,
    };

    let result = run_command(cli.command, &globals);

    let exit = match result {
        Ok(code) => code,
        Err(error) => {
            render_error(&error, globals.json);
            error.exit_code()
        }
    };

    std::process::exit(exit.as_i32());
}

fn configure_logging(debug: bool, json: bool, no_color: bool) {
    let default_filter = if debug { "debug" } else { "error" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(false)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(!no_color)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run_command(command: Command, globals: &GlobalOptions) -> JotResult<ExitCode> {
    match command {
        Command::Init => commands::profile::cmd_init(globals),
        Command::Doctor => commands::profile::cmd_doctor(globals),
        Command::Profile { command } => commands::profile::cmd_profile(command, globals),
        Command::Auth { command } => commands::auth::cmd_auth(command, globals),
        Command::Task { command } => commands::task::cmd_task(command, globals),
        Command::Completed { command } => commands::task::cmd_completed(command, globals),
        Command::Note { command } => commands::note::cmd_note(command, globals),
        Command::Cache { command } => commands::cache::cmd_cache(command, globals),
    }
}

fn with_auth_context<F>(globals: &GlobalOptions, run: F) -> JotResult<ExitCode>
where
    F: FnOnce(AuthContext) -> JotResult<ExitCode>,
{
    let target = workspace_target(globals)?;
    if !target.join(WORKSPACE_DIR).is_dir() {
        init_workspace(Some(&target), globals.server.as_deref())?;
    }

    let paths = resolve_workspace(Some(&target))?;
    let config = load_config(&paths)?;
    let resolved = resolve_profile(
        &config,
        globals.profile.as_deref(),
        globals.server.as_deref(),
    )?;
    let api = DocumentStoreApi::new(&resolved.server)?;
    let state = StateStore::from_workspace(&paths)?;

    run(AuthContext {
        paths,
        profile: resolved.name,
        server: resolved.server,
        display: config.display,
        api,
        state,
    })
}

fn with_session_context<F>(globals: &GlobalOptions, run: F) -> JotResult<ExitCode>
where
    F: FnOnce(SessionContext) -> JotResult<ExitCode>,
{
    with_auth_context(globals, |mut auth| {
        let session = auth.state.load_session(&auth.profile)?.ok_or_else(|| {
            JotError::auth(format!(
                "no active session for profile '{}'; run `jot auth login` first",
                auth.profile
            ))
        })?;

        auth.api = auth.api.with_id_token(session.id_token.clone());
        run(SessionContext { auth, session })
    })
}

fn workspace_target(globals: &GlobalOptions) -> JotResult<PathBuf> {
    match &globals.workspace {
        Some(path) => absolutize(path),
        None => current_dir(),
    }
}

fn current_dir() -> JotResult<PathBuf> {
    std::env::current_dir().map_err(|err| {
        JotError::io(format!(
            "failed to resolve current directory for default workspace: {err}"
        ))
    })
}

fn absolutize(path: &Path) -> JotResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    Ok(current_dir()?.join(path))
}

fn parse_due(input: &str) -> Result<Instant, String> {
    Instant::parse(input)
        .ok_or_else(|| format!("invalid date '{input}'; use YYYY-MM-DD or an RFC 3339 timestamp"))
}

fn parse_priority(input: &str) -> Result<Priority, String> {
    Priority::parse(input)
        .ok_or_else(|| format!("invalid priority '{input}'; use none, low, medium or high"))
}

fn render_error(error: &JotError, json_output: bool) {
    if json_output {
        let payload = json!({
            "ok": false,
            "error": {
                "kind": error.kind,
                "message": &error.message,
            }
        });
        let serialized = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| {
            "{\"ok\":false,\"error\":{\"kind\":\"io\",\"message\":\"failed to serialize error\"}}".to_string()
        });
        eprintln!("{serialized}");
    } else {
        eprintln!("error: {}", error.message);
    }
}

fn print_json<T: Serialize>(value: &T) -> JotResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| JotError::io(format!("failed to render JSON output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
