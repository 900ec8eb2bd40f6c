use jot_api::{NOTES, RecordPatch};
use jot_core::{ExitCode, JotResult};
use jot_sync::{RecordDraft, SyncCache, validate_patch};

use crate::commands::task::{ensure_known, print_deleted, print_listing, print_record_result};
use crate::{GlobalOptions, NoteCommand, with_session_context};

pub(crate) fn cmd_note(command: NoteCommand, globals: &GlobalOptions) -> JotResult<ExitCode> {
    with_session_context(globals, |ctx| {
        let mut cache = SyncCache::new(&ctx.auth.api, &ctx.auth.state);

        match command {
            NoteCommand::List { cached } => {
                if cached {
                    let records = cache.get_cached(ctx.user_id(), NOTES);
                    return print_listing(NOTES, &records, None, globals);
                }

                let outcome = cache.refresh(ctx.user_id(), NOTES)?;
                print_listing(NOTES, cache.items(NOTES), Some(&outcome), globals)
            }
            NoteCommand::Add { title, content } => {
                let created =
                    cache.create(ctx.user_id(), NOTES, RecordDraft::note(title, content))?;
                print_record_result("Note created", &created, globals)
            }
            NoteCommand::Edit { id, title, content } => {
                let patch = RecordPatch {
                    title,
                    content,
                    ..RecordPatch::default()
                };
                validate_patch(NOTES, &patch)?;
                ensure_known(&mut cache, ctx.user_id(), NOTES, &id);
                let updated = cache.update(ctx.user_id(), NOTES, &id, &patch)?;
                print_record_result("Note updated", &updated, globals)
            }
            NoteCommand::Delete { id } => {
                cache.delete(ctx.user_id(), NOTES, &id)?;
                print_deleted(NOTES, &id, globals)
            }
        }
    })
}
