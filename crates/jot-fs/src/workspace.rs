use crate::config::{DEFAULT_SERVER_URL, WorkspaceConfig, load_config, save_config};
use jot_core::{JotError, JotResult};
use std::fs;
use std::path::{Path, PathBuf};

pub const WORKSPACE_DIR: &str = ".jot";

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub jot_dir: PathBuf,
    pub config_path: PathBuf,
    pub state_db_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WorkspaceInitResult {
    pub paths: WorkspacePaths,
    pub created: Vec<PathBuf>,
}

impl WorkspacePaths {
    pub fn from_root(root: PathBuf) -> Self {
        let jot_dir = root.join(WORKSPACE_DIR);

        Self {
            config_path: jot_dir.join("config.toml"),
            state_db_path: jot_dir.join("state.db"),
            root,
            jot_dir,
        }
    }
}

/// Creates the `.jot` layout under `target` (or the current directory).
///
/// Re-running on an existing workspace only fills in what is missing; an
/// existing `config.toml` is validated, never rewritten.
pub fn init_workspace(
    target: Option<&Path>,
    server: Option<&str>,
) -> JotResult<WorkspaceInitResult> {
    let root = match target {
        Some(path) => absolutize(path)?,
        None => current_dir("init")?,
    };

    let paths = WorkspacePaths::from_root(root);
    let mut created = Vec::new();

    for dir in [&paths.root, &paths.jot_dir] {
        if ensure_dir(dir)? {
            created.push(dir.clone());
        }
    }

    // SQLite accepts an empty file as a fresh database.
    if ensure_file(&paths.state_db_path)? {
        created.push(paths.state_db_path.clone());
    }

    if paths.config_path.exists() {
        load_config(&paths)?;
    } else {
        let config = WorkspaceConfig::with_default_server(server.unwrap_or(DEFAULT_SERVER_URL));
        save_config(&paths, &config)?;
        created.push(paths.config_path.clone());
    }

    Ok(WorkspaceInitResult { paths, created })
}

pub fn resolve_workspace(explicit: Option<&Path>) -> JotResult<WorkspacePaths> {
    let root = match explicit {
        Some(path) => absolutize(path)?,
        None => current_dir("workspace lookup")?,
    };

    let paths = WorkspacePaths::from_root(root);
    if !paths.jot_dir.is_dir() {
        let root_display = paths.root.display();
        return Err(JotError::usage(format!(
            "workspace is not initialized at '{root_display}'; run `jot init --workspace {root_display}` first"
        )));
    }

    Ok(paths)
}

fn current_dir(purpose: &str) -> JotResult<PathBuf> {
    std::env::current_dir().map_err(|err| {
        JotError::io(format!(
            "failed to resolve current directory for {purpose}: {err}"
        ))
    })
}

fn absolutize(path: &Path) -> JotResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    Ok(current_dir("path")?.join(path))
}

/// Returns whether the directory had to be created.
fn ensure_dir(path: &Path) -> JotResult<bool> {
    if path.exists() {
        if !path.is_dir() {
            return Err(JotError::io(format!(
                "expected '{}' to be a directory",
                path.display()
            )));
        }
        return Ok(false);
    }

    fs::create_dir_all(path).map_err(|err| {
        JotError::io(format!(
            "failed to create directory '{}': {}",
            path.display(),
            err
        ))
    })?;
    Ok(true)
}

fn ensure_file(path: &Path) -> JotResult<bool> {
    if path.exists() {
        if !path.is_file() {
            return Err(JotError::io(format!(
                "expected '{}' to be a file",
                path.display()
            )));
        }
        return Ok(false);
    }

    fs::write(path, []).map_err(|err| {
        JotError::io(format!(
            "failed to create file '{}': {}",
            path.display(),
            err
        ))
    })?;
    Ok(true)
}
