use jot_core::{ExitCode, JotError, JotResult};
use jot_sync::{SyncCache, mirror_key};
use serde_json::json;

use crate::present::{print_record_lines, views};
use crate::{CacheCommand, GlobalOptions, print_json, with_session_context};

pub(crate) fn cmd_cache(command: CacheCommand, globals: &GlobalOptions) -> JotResult<ExitCode> {
    with_session_context(globals, |ctx| {
        let mut cache = SyncCache::new(&ctx.auth.api, &ctx.auth.state);

        match command {
            CacheCommand::Show { collection } => {
                let collection = collection.as_str();
                let key = mirror_key(collection, ctx.user_id());
                let entry = ctx.auth.state.mirror_entry(&key)?;
                let records = cache.get_cached(ctx.user_id(), collection);

                if globals.json {
                    print_json(&json!({
                        "ok": true,
                        "result": {
                            "key": key,
                            "present": entry.is_some(),
                            "bytes": entry.as_ref().map(|entry| entry.bytes),
                            "updated_at": entry.as_ref().map(|entry| entry.updated_at.clone()),
                            "count": records.len(),
                            "items": views(&records),
                        }
                    }))?;
                } else {
                    match &entry {
                        Some(entry) => println!(
                            "{} ({} bytes, updated {})",
                            entry.key, entry.bytes, entry.updated_at
                        ),
                        None => println!("{key} (no snapshot)"),
                    }
                    print_record_lines(&records);
                }

                Ok(ExitCode::Success)
            }
            CacheCommand::Clear { collection } => {
                let collection = collection.as_str();
                if !globals.yes {
                    return Err(JotError::usage(format!(
                        "clearing the local copy of '{collection}' needs confirmation; re-run with --yes"
                    )));
                }

                let cleared = cache.forget_user(ctx.user_id(), &[collection])?;
                let key = mirror_key(collection, ctx.user_id());

                if globals.json {
                    print_json(&json!({
                        "ok": true,
                        "result": {"key": key, "cleared": cleared > 0}
                    }))?;
                } else {
                    println!("Cleared local copy '{key}'.");
                }

                Ok(ExitCode::Success)
            }
        }
    })
}
