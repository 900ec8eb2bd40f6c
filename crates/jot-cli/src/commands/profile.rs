use jot_core::{ExitCode, JotResult};
use jot_fs::{
    WORKSPACE_DIR, WorkspaceConfig, WorkspacePaths, init_workspace, list_profiles, load_config,
    resolve_profile, resolve_workspace, run_doctor, save_config, set_active_profile,
    set_profile_server,
};
use jot_store::{StateStore, resolve_env_credentials};
use serde_json::json;

use crate::{
    GlobalOptions, InitOutput, ProfileChangedOutput, ProfileCommand, print_json, workspace_target,
};

pub(crate) fn cmd_init(globals: &GlobalOptions) -> JotResult<ExitCode> {
    let root = workspace_target(globals)?;
    let initialized = init_workspace(Some(&root), globals.server.as_deref())?;

    // Opening the store creates the schema inside the fresh state.db.
    StateStore::from_workspace(&initialized.paths)?;

    let output = InitOutput {
        workspace: initialized.paths.root.display().to_string(),
        created: initialized
            .created
            .iter()
            .map(|created| created.display().to_string())
            .collect(),
    };

    if globals.json {
        return print_json(&json!({"ok": true, "result": output})).map(|()| ExitCode::Success);
    }

    println!("Initialized jot workspace at {}", output.workspace);
    for created in &output.created {
        println!("  created {created}");
    }
    if output.created.is_empty() {
        println!("  nothing new to create");
    }

    Ok(ExitCode::Success)
}

pub(crate) fn cmd_doctor(globals: &GlobalOptions) -> JotResult<ExitCode> {
    let root = workspace_target(globals)?;
    let paths = resolve_workspace(Some(&root))?;
    let report = run_doctor(&paths, globals.profile.as_deref(), globals.server.as_deref());

    let session = match report.active_profile.as_deref() {
        Some(profile) => StateStore::from_workspace(&paths)?.load_session(profile)?,
        None => None,
    };
    let has_credentials = resolve_env_credentials(&paths.root)?.is_some();
    let signed_in_as = session.map(|stored| stored.user_id);
    let auth_ready = has_credentials || signed_in_as.is_some();
    let ready = report.healthy && auth_ready;

    if globals.json {
        print_json(&json!({
            "ok": ready,
            "result": {
                "workspace": report.workspace,
                "healthy": report.healthy,
                "checks": report.checks,
                "active_profile": report.active_profile,
                "server": report.server,
                "auth": {
                    "credentials": has_credentials,
                    "session": signed_in_as.is_some(),
                    "user_id": signed_in_as,
                    "ready": auth_ready
                }
            }
        }))?;
    } else {
        println!(
            "{} ({})",
            report.workspace,
            if report.healthy { "healthy" } else { "degraded" }
        );
        for check in &report.checks {
            print_check(check.ok, &check.name, &check.details);
        }

        let credentials_detail = if has_credentials {
            "found JOT_EMAIL and JOT_PASSWORD"
        } else {
            "JOT_EMAIL and JOT_PASSWORD are not set"
        };
        print_check(has_credentials, "credentials", credentials_detail);

        match &signed_in_as {
            Some(user_id) => print_check(true, "session", &format!("signed in as {user_id}")),
            None => print_check(false, "session", "not signed in on this profile"),
        }
    }

    Ok(if ready { ExitCode::Success } else { ExitCode::Io })
}

pub(crate) fn cmd_profile(command: ProfileCommand, globals: &GlobalOptions) -> JotResult<ExitCode> {
    let root = workspace_target(globals)?;
    if !root.join(WORKSPACE_DIR).is_dir() {
        init_workspace(Some(&root), globals.server.as_deref())?;
    }

    let paths = resolve_workspace(Some(&root))?;
    let mut config = load_config(&paths)?;

    match command {
        ProfileCommand::List => {
            let profiles = list_profiles(&config);
            if globals.json {
                print_json(&json!({
                    "ok": true,
                    "result": {"active_profile": &config.active_profile, "profiles": profiles}
                }))?;
            } else {
                for entry in profiles {
                    let marker = if entry.active { '*' } else { ' ' };
                    println!("{marker} {:<12} {}", entry.name, entry.server);
                }
            }
        }
        ProfileCommand::Use { name } => {
            set_active_profile(&mut config, &name)?;
            let changed = persist_profile(&paths, &config, &name, globals.server.as_deref())?;
            report_profile_change(&changed, "now active", globals)?;
        }
        ProfileCommand::Set { name, server } => {
            let name = name.unwrap_or_else(|| config.active_profile.clone());
            set_profile_server(&mut config, &name, &server);
            let changed = persist_profile(&paths, &config, &name, None)?;
            report_profile_change(&changed, "server updated", globals)?;
        }
    }

    Ok(ExitCode::Success)
}

fn persist_profile(
    paths: &WorkspacePaths,
    config: &WorkspaceConfig,
    name: &str,
    server_override: Option<&str>,
) -> JotResult<ProfileChangedOutput> {
    save_config(paths, config)?;
    let resolved = resolve_profile(config, Some(name), server_override)?;
    Ok(ProfileChangedOutput {
        profile: resolved.name,
        server: resolved.server,
    })
}

fn report_profile_change(
    changed: &ProfileChangedOutput,
    what: &str,
    globals: &GlobalOptions,
) -> JotResult<()> {
    if globals.json {
        return print_json(&json!({"ok": true, "result": changed}));
    }

    println!("Profile '{}' {what}: {}", changed.profile, changed.server);
    Ok(())
}

fn print_check(ok: bool, name: &str, details: &str) {
    println!("  {} {name}: {details}", if ok { "ok  " } else { "fail" });
}
