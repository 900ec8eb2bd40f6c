use jot_api::{COMPLETED, DocumentStoreApi, Record, RecordPatch, TASKS};
use jot_core::{ExitCode, JotResult};
use jot_store::StateStore;
use jot_sync::{DataSource, RecordDraft, RefreshOutcome, SyncCache, validate_patch};
use serde_json::json;

use crate::present::{RecordView, print_record_lines, sort_records, views};
use crate::{
    CompletedCommand, GlobalOptions, ListArgs, SessionContext, SortKey, TaskCommand, print_json,
    with_session_context,
};

type Cache<'a> = SyncCache<&'a DocumentStoreApi, &'a StateStore>;

pub(crate) fn cmd_task(command: TaskCommand, globals: &GlobalOptions) -> JotResult<ExitCode> {
    with_session_context(globals, |ctx| {
        let mut cache = SyncCache::new(&ctx.auth.api, &ctx.auth.state);

        match command {
            TaskCommand::List(args) => list_collection(&ctx, &mut cache, TASKS, &args, globals),
            TaskCommand::Add {
                title,
                description,
                due,
                priority,
                subtasks,
            } => {
                let draft = RecordDraft {
                    title,
                    description: description.unwrap_or_default(),
                    due_date: due,
                    priority: priority.unwrap_or_default(),
                    subtasks,
                    ..RecordDraft::default()
                };
                let created = cache.create(ctx.user_id(), TASKS, draft)?;
                print_record_result("Task created", &created, globals)
            }
            TaskCommand::Edit {
                id,
                title,
                description,
                due,
                priority,
                subtasks,
            } => {
                let patch = RecordPatch {
                    title,
                    description,
                    due_date: due,
                    priority,
                    subtasks: (!subtasks.is_empty()).then_some(subtasks),
                    ..RecordPatch::default()
                };
                validate_patch(TASKS, &patch)?;
                ensure_known(&mut cache, ctx.user_id(), TASKS, &id);
                let updated = cache.update(ctx.user_id(), TASKS, &id, &patch)?;
                print_record_result("Task updated", &updated, globals)
            }
            TaskCommand::Complete { id } => {
                ensure_known(&mut cache, ctx.user_id(), TASKS, &id);
                let outcome = cache.complete_task(ctx.user_id(), &id)?;

                if globals.json {
                    print_json(&json!({"ok": true, "result": outcome}))?;
                } else {
                    println!(
                        "Task '{}' completed (now '{}' in {COMPLETED}).",
                        outcome.removed_id, outcome.new_id
                    );
                }
                Ok(ExitCode::Success)
            }
            TaskCommand::Delete { id } => {
                cache.delete(ctx.user_id(), TASKS, &id)?;
                print_deleted(TASKS, &id, globals)
            }
        }
    })
}

pub(crate) fn cmd_completed(
    command: CompletedCommand,
    globals: &GlobalOptions,
) -> JotResult<ExitCode> {
    with_session_context(globals, |ctx| {
        let mut cache = SyncCache::new(&ctx.auth.api, &ctx.auth.state);
        match command {
            CompletedCommand::List(args) => {
                list_collection(&ctx, &mut cache, COMPLETED, &args, globals)
            }
        }
    })
}

/// Refreshes (or, with `--cached`, only reads the mirror) and prints the
/// collection in presentation order.
pub(crate) fn list_collection(
    ctx: &SessionContext,
    cache: &mut Cache<'_>,
    collection: &str,
    args: &ListArgs,
    globals: &GlobalOptions,
) -> JotResult<ExitCode> {
    let (mut records, outcome) = if args.cached {
        (cache.get_cached(ctx.user_id(), collection), None)
    } else {
        let outcome = cache.refresh(ctx.user_id(), collection)?;
        (cache.items(collection).to_vec(), Some(outcome))
    };

    let display = &ctx.auth.display;
    let sort = args.sort.or_else(|| SortKey::from_config(display));
    let descending = args.desc || display.descending;
    sort_records(&mut records, sort, descending);

    print_listing(collection, &records, outcome.as_ref(), globals)
}

pub(crate) fn print_listing(
    collection: &str,
    records: &[Record],
    outcome: Option<&RefreshOutcome>,
    globals: &GlobalOptions,
) -> JotResult<ExitCode> {
    let source = match outcome.map(|outcome| outcome.source) {
        Some(DataSource::Remote) => "remote",
        Some(DataSource::Mirror) => "mirror",
        None => "cache",
    };
    let warning = outcome.and_then(|outcome| outcome.remote_error.clone());

    if globals.json {
        print_json(&json!({
            "ok": true,
            "result": {
                "collection": collection,
                "source": source,
                "count": records.len(),
                "warning": warning,
                "items": views(records),
            }
        }))?;
    } else {
        if let Some(warning) = &warning {
            eprintln!("warning: server unreachable, showing local copy ({warning})");
        }
        println!("{collection} ({} from {source})", records.len());
        print_record_lines(records);
    }

    Ok(ExitCode::Success)
}

pub(crate) fn print_record_result(
    label: &str,
    record: &Record,
    globals: &GlobalOptions,
) -> JotResult<ExitCode> {
    if globals.json {
        print_json(&json!({"ok": true, "result": RecordView::from(record)}))?;
    } else {
        println!("{label}: {}", record.id);
        print_record_lines(std::slice::from_ref(record));
    }
    Ok(ExitCode::Success)
}

pub(crate) fn print_deleted(collection: &str, id: &str, globals: &GlobalOptions) -> JotResult<ExitCode> {
    if globals.json {
        print_json(&json!({"ok": true, "result": {"collection": collection, "deleted": id}}))?;
    } else {
        println!("Deleted '{id}' from {collection}.");
    }
    Ok(ExitCode::Success)
}

/// Each CLI run starts with an empty controller; records the mirror has never
/// seen are fetched once so edits and moves can find them.
pub(crate) fn ensure_known(cache: &mut Cache<'_>, user_id: &str, collection: &str, id: &str) {
    let known = cache
        .get_cached(user_id, collection)
        .iter()
        .any(|record| record.id == id);
    if known {
        return;
    }

    if let Err(err) = cache.refresh(user_id, collection) {
        tracing::warn!(collection, error = %err, "refresh before edit failed");
    }
}
