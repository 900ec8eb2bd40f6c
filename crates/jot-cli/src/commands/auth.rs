use chrono::Utc;
use jot_api::{COMPLETED, NOTES, SignInRequest, TASKS};
use jot_core::{ExitCode, JotError, JotResult};
use jot_store::{StoredSession, resolve_env_credentials};
use jot_sync::SyncCache;
use serde_json::json;

use crate::{AuthCommand, AuthContext, GlobalOptions, print_json, with_auth_context};

const USER_COLLECTIONS: [&str; 3] = [TASKS, COMPLETED, NOTES];

pub(crate) fn cmd_auth(command: AuthCommand, globals: &GlobalOptions) -> JotResult<ExitCode> {
    with_auth_context(globals, |ctx| match command {
        AuthCommand::Login { email, password } => {
            let (email, password) = match (email, password) {
                (Some(email), Some(password)) => (email, password),
                (None, None) => {
                    let credentials = resolve_env_credentials(&ctx.paths.root)?.ok_or_else(|| {
                        JotError::auth(
                            "missing credentials; pass --email/--password or set JOT_EMAIL and JOT_PASSWORD in environment or .env",
                        )
                    })?;
                    (credentials.email, credentials.password)
                }
                _ => {
                    return Err(JotError::usage(
                        "--email and --password must be given together",
                    ));
                }
            };

            let previous = ctx.state.load_session(&ctx.profile)?;
            let stored = sign_in(&ctx, &email, &password)?;
            if let Some(previous) = previous
                && previous.user_id != stored.user_id
            {
                tracing::info!(
                    profile = %ctx.profile,
                    "signed-in user changed; cached data of the previous user is kept until logout --purge"
                );
            }
            ctx.state.save_session(&ctx.profile, &stored)?;

            if globals.json {
                print_json(&json!({
                    "ok": true,
                    "result": {
                        "profile": ctx.profile,
                        "server": ctx.server,
                        "user_id": stored.user_id,
                        "email": stored.email,
                        "expires_at": stored.expires_at,
                    }
                }))?;
            } else {
                println!("Authenticated with {}", ctx.server);
                println!("Profile: {}", ctx.profile);
                println!("User: {}", stored.user_id);
                if let Some(email) = &stored.email {
                    println!("Email: {email}");
                }
                println!("Session saved: {}", ctx.paths.state_db_path.display());
            }

            Ok(ExitCode::Success)
        }
        AuthCommand::Status => {
            let Some(stored) = ctx.state.load_session(&ctx.profile)? else {
                if globals.json {
                    print_json(&json!({
                        "ok": false,
                        "result": {
                            "profile": ctx.profile,
                            "server": ctx.server,
                            "authenticated": false,
                            "reason": "no stored session",
                        }
                    }))?;
                } else {
                    println!("Server: {}", ctx.server);
                    println!("Profile: {}", ctx.profile);
                    println!("Authenticated: no");
                    println!("Reason: no stored session");
                }
                return Ok(ExitCode::Auth);
            };

            let expired = stored
                .expires_at
                .is_some_and(|expires_at| expires_at <= Utc::now().timestamp());

            if globals.json {
                print_json(&json!({
                    "ok": true,
                    "result": {
                        "profile": ctx.profile,
                        "server": ctx.server,
                        "authenticated": true,
                        "user_id": stored.user_id,
                        "email": stored.email,
                        "authenticated_at": stored.authenticated_at,
                        "expires_at": stored.expires_at,
                        "expired": expired,
                    }
                }))?;
            } else {
                println!("Server: {}", ctx.server);
                println!("Profile: {}", ctx.profile);
                println!("Authenticated: yes");
                println!("User: {}", stored.user_id);
                if let Some(email) = &stored.email {
                    println!("Email: {email}");
                }
                println!("Signed in at: {}", stored.authenticated_at);
                if expired {
                    println!("Token expired; run `jot auth login` again");
                }
            }

            Ok(ExitCode::Success)
        }
        AuthCommand::Logout { purge } => {
            let stored = ctx.state.load_session(&ctx.profile)?;
            ctx.state.remove_session(&ctx.profile)?;

            let mut purged = 0usize;
            if purge && let Some(stored) = &stored {
                let mut cache = SyncCache::new(&ctx.api, &ctx.state);
                purged = cache.forget_user(&stored.user_id, &USER_COLLECTIONS)?;
            }

            if globals.json {
                print_json(&json!({
                    "ok": true,
                    "result": {
                        "profile": ctx.profile,
                        "server": ctx.server,
                        "had_session": stored.is_some(),
                        "purged_collections": purged,
                    }
                }))?;
            } else {
                println!("Local session removed for profile '{}'.", ctx.profile);
                if purge {
                    println!("Cleared {purged} cached collection(s).");
                }
            }

            Ok(ExitCode::Success)
        }
    })
}

fn sign_in(ctx: &AuthContext, email: &str, password: &str) -> JotResult<StoredSession> {
    let data = ctx.api.sign_in(&SignInRequest {
        email: email.trim().to_string(),
        password: password.to_string(),
    })?;

    Ok(StoredSession {
        profile: ctx.profile.clone(),
        server: ctx.server.clone(),
        user_id: data.user.uid,
        email: data.user.email.or_else(|| Some(email.trim().to_string())),
        id_token: data.id_token,
        refresh_token: data.refresh_token,
        expires_at: data.expires_at,
        authenticated_at: Utc::now().to_rfc3339(),
    })
}
