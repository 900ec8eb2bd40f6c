use crate::config::{load_config, resolve_profile};
use crate::workspace::WorkspacePaths;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub ok: bool,
    pub details: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub workspace: String,
    pub healthy: bool,
    pub checks: Vec<DoctorCheck>,
    pub active_profile: Option<String>,
    pub server: Option<String>,
}

impl DoctorReport {
    pub fn push(&mut self, name: &str, ok: bool, details: impl Into<String>) {
        self.checks.push(DoctorCheck {
            name: name.to_string(),
            ok,
            details: details.into(),
        });
        self.healthy = self.checks.iter().all(|check| check.ok);
    }
}

pub fn run_doctor(
    paths: &WorkspacePaths,
    profile_override: Option<&str>,
    server_override: Option<&str>,
) -> DoctorReport {
    let mut report = DoctorReport {
        workspace: paths.root.display().to_string(),
        healthy: true,
        checks: Vec::new(),
        active_profile: None,
        server: None,
    };

    path_check(&mut report, "workspace_root", &paths.root, Path::is_dir);
    path_check(&mut report, "jot_directory", &paths.jot_dir, Path::is_dir);
    path_check(&mut report, "state_db_file", &paths.state_db_path, Path::is_file);
    path_check(&mut report, "config_file", &paths.config_path, Path::is_file);

    if !paths.config_path.is_file() {
        return report;
    }

    let resolved = load_config(paths)
        .and_then(|config| resolve_profile(&config, profile_override, server_override));
    match resolved {
        Ok(resolved) => {
            report.push(
                "active_profile",
                true,
                format!("{} ({})", resolved.name, resolved.server),
            );
            report.active_profile = Some(resolved.name);
            report.server = Some(resolved.server);
        }
        Err(err) => report.push("active_profile", false, err.message),
    }

    report
}

fn path_check(report: &mut DoctorReport, name: &str, path: &Path, probe: fn(&Path) -> bool) {
    report.push(name, probe(path), path.display().to_string());
}
