use jot_api::{
    COMPLETED, Instant, NOTES, Priority, Record, RecordFields, RecordPatch,
    RemoteCollectionSource, TASKS,
};
use jot_core::{ErrorKind, JotError, JotResult};
use jot_store::{MemoryMirror, MirrorStore};
use jot_sync::{DataSource, RecordDraft, SyncCache, SyncStatus, mirror_key};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

#[derive(Default)]
struct ScriptedRemote {
    documents: RefCell<BTreeMap<String, Vec<Record>>>,
    calls: RefCell<Vec<String>>,
    next_id: Cell<u32>,
    fail_query: Cell<bool>,
    fail_insert: Cell<bool>,
    fail_update: Cell<bool>,
    fail_delete: Cell<bool>,
}

impl ScriptedRemote {
    fn seed(&self, collection: &str, records: Vec<Record>) {
        self.documents
            .borrow_mut()
            .insert(collection.to_string(), records);
    }

    fn ids(&self, collection: &str) -> Vec<String> {
        self.documents
            .borrow()
            .get(collection)
            .map(|records| records.iter().map(|record| record.id.clone()).collect())
            .unwrap_or_default()
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    fn record_call(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl RemoteCollectionSource for ScriptedRemote {
    fn query(&self, collection: &str, owner_id: &str) -> JotResult<Vec<Record>> {
        self.record_call(format!("query {collection} {owner_id}"));
        if self.fail_query.get() {
            return Err(JotError::remote("network unreachable"));
        }

        Ok(self
            .documents
            .borrow()
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.owner_id() == owner_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert(&self, collection: &str, fields: &RecordFields) -> JotResult<String> {
        self.record_call(format!("insert {collection}"));
        if self.fail_insert.get() {
            return Err(JotError::remote("insert rejected [http_status=503]"));
        }

        let next = self.next_id.get() + 1;
        self.next_id.set(next);
        let id = format!("doc-{next}");
        self.documents
            .borrow_mut()
            .entry(collection.to_string())
            .or_default()
            .push(Record::new(id.clone(), fields.clone()));
        Ok(id)
    }

    fn update(&self, collection: &str, id: &str, patch: &RecordPatch) -> JotResult<()> {
        self.record_call(format!("update {collection} {id}"));
        if self.fail_update.get() {
            return Err(JotError::remote("permission denied"));
        }

        if let Some(records) = self.documents.borrow_mut().get_mut(collection) {
            for record in records.iter_mut().filter(|record| record.id == id) {
                patch.apply_to(&mut record.fields);
            }
        }
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> JotResult<()> {
        self.record_call(format!("delete {collection} {id}"));
        if self.fail_delete.get() {
            return Err(JotError::remote("delete timed out"));
        }

        if let Some(records) = self.documents.borrow_mut().get_mut(collection) {
            records.retain(|record| record.id != id);
        }
        Ok(())
    }
}

/// Records every key touched so tests can assert on mirror traffic.
#[derive(Default)]
struct RecordingMirror {
    inner: MemoryMirror,
    reads: RefCell<Vec<String>>,
    writes: RefCell<Vec<String>>,
    fail_writes: Cell<bool>,
    fail_reads: Cell<bool>,
}

impl RecordingMirror {
    fn snapshot(&self, key: &str) -> Option<Vec<Record>> {
        let raw = self.inner.get(key).expect("memory get")?;
        Some(serde_json::from_str(&raw).expect("decode snapshot"))
    }

    fn seed(&self, key: &str, records: &[Record]) {
        let raw = serde_json::to_string(records).expect("encode");
        self.inner.set(key, &raw).expect("seed");
    }

    fn write_count(&self) -> usize {
        self.writes.borrow().len()
    }

    fn touched(&self) -> Vec<String> {
        let mut keys = self.reads.borrow().clone();
        keys.extend(self.writes.borrow().iter().cloned());
        keys
    }
}

impl MirrorStore for RecordingMirror {
    fn get(&self, key: &str) -> JotResult<Option<String>> {
        self.reads.borrow_mut().push(key.to_string());
        if self.fail_reads.get() {
            return Err(JotError::io("storage unavailable"));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, snapshot: &str) -> JotResult<()> {
        self.writes.borrow_mut().push(key.to_string());
        if self.fail_writes.get() {
            return Err(JotError::io("quota exceeded"));
        }
        self.inner.set(key, snapshot)
    }

    fn clear(&self, key: &str) -> JotResult<()> {
        self.writes.borrow_mut().push(key.to_string());
        self.inner.clear(key)
    }
}

fn task(id: &str, owner: &str, title: &str) -> Record {
    Record::new(
        id,
        RecordFields {
            user_id: owner.to_string(),
            title: title.to_string(),
            ..RecordFields::default()
        },
    )
}

fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|record| record.id.as_str()).collect()
}

#[test]
fn refresh_writes_fetched_list_through_to_mirror() {
    let remote = ScriptedRemote::default();
    remote.seed(
        TASKS,
        vec![task("t1", "U1", "first"), task("t2", "U1", "second")],
    );
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);

    let outcome = cache.refresh("U1", TASKS).expect("refresh");

    assert_eq!(outcome.source, DataSource::Remote);
    assert_eq!(outcome.count, 2);
    assert!(outcome.mirror_written);
    assert_eq!(cache.status(TASKS), SyncStatus::Ready);
    assert_eq!(ids(cache.items(TASKS)), vec!["t1", "t2"]);
    assert_eq!(mirror.write_count(), 1);

    let snapshot = mirror.snapshot("tasks_U1").expect("snapshot");
    assert_eq!(snapshot, cache.items(TASKS));
}

#[test]
fn refresh_overwrites_stale_snapshot_without_merging() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("fresh", "U1", "fresh")]);
    let mirror = RecordingMirror::default();
    mirror.seed("tasks_U1", &[task("stale", "U1", "stale")]);
    let mut cache = SyncCache::new(&remote, &mirror);

    cache.refresh("U1", TASKS).expect("refresh");

    assert_eq!(ids(cache.items(TASKS)), vec!["fresh"]);
    assert_eq!(ids(&mirror.snapshot("tasks_U1").expect("snapshot")), vec!["fresh"]);
}

#[test]
fn refresh_falls_back_to_mirror_when_remote_fails() {
    let remote = ScriptedRemote::default();
    remote.fail_query.set(true);
    let mirror = RecordingMirror::default();
    mirror.seed("tasks_U1", &[task("t1", "U1", "stale")]);
    let mut cache = SyncCache::new(&remote, &mirror);

    let outcome = cache.refresh("U1", TASKS).expect("fallback refresh");

    assert_eq!(outcome.source, DataSource::Mirror);
    assert_eq!(outcome.remote_error.as_deref(), Some("network unreachable"));
    assert_eq!(cache.status(TASKS), SyncStatus::Ready);
    assert_eq!(cache.items(TASKS).len(), 1);
    assert_eq!(
        cache.state(TASKS).and_then(|state| state.source),
        Some(DataSource::Mirror)
    );
    assert_eq!(mirror.write_count(), 0);
}

#[test]
fn refresh_without_remote_or_snapshot_reports_error_state() {
    let remote = ScriptedRemote::default();
    remote.fail_query.set(true);
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);

    let err = cache.refresh("U1", TASKS).expect_err("no data anywhere");

    assert_eq!(err.kind, ErrorKind::Remote);
    assert_eq!(cache.status(TASKS), SyncStatus::Error);
    assert!(cache.items(TASKS).is_empty());
    assert_eq!(mirror.write_count(), 0);
}

#[test]
fn failed_remote_fetch_after_success_replaces_items_with_snapshot() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("t1", "U1", "one"), task("t2", "U1", "two")]);
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);
    cache.refresh("U1", TASKS).expect("first refresh");

    mirror.seed("tasks_U1", &[task("t1", "U1", "one")]);
    remote.fail_query.set(true);
    cache.refresh("U1", TASKS).expect("fallback refresh");

    assert_eq!(ids(cache.items(TASKS)), vec!["t1"]);
}

#[test]
fn unreadable_mirror_counts_as_cache_miss() {
    let remote = ScriptedRemote::default();
    remote.fail_query.set(true);
    let mirror = RecordingMirror::default();
    mirror.seed("tasks_U1", &[task("t1", "U1", "stale")]);
    mirror.fail_reads.set(true);
    let mut cache = SyncCache::new(&remote, &mirror);

    let err = cache.refresh("U1", TASKS).expect_err("mirror unreadable");
    assert_eq!(err.kind, ErrorKind::Remote);
    assert_eq!(cache.status(TASKS), SyncStatus::Error);
    assert!(cache.get_cached("U1", TASKS).is_empty());
}

#[test]
fn failed_mirror_write_does_not_fail_refresh() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("t1", "U1", "one")]);
    let mirror = RecordingMirror::default();
    mirror.fail_writes.set(true);
    let mut cache = SyncCache::new(&remote, &mirror);

    let outcome = cache.refresh("U1", TASKS).expect("refresh");
    assert!(!outcome.mirror_written);
    assert_eq!(cache.status(TASKS), SyncStatus::Ready);
    assert_eq!(cache.items(TASKS).len(), 1);
}

#[test]
fn refresh_only_touches_the_requesting_users_keys() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("a1", "A", "a"), task("b1", "B", "b")]);
    let mirror = RecordingMirror::default();
    mirror.seed("tasks_B", &[task("b1", "B", "b")]);
    let mut cache = SyncCache::new(&remote, &mirror);

    cache.refresh("A", TASKS).expect("refresh A");
    remote.fail_query.set(true);
    cache.refresh("A", TASKS).expect("fallback A");

    let touched = mirror.touched();
    assert!(!touched.is_empty());
    assert!(touched.iter().all(|key| key == "tasks_A"));
    assert_eq!(ids(cache.items(TASKS)), vec!["a1"]);
}

#[test]
fn create_with_empty_title_makes_no_calls() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("t1", "U1", "one")]);
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);
    cache.refresh("U1", TASKS).expect("refresh");
    let calls_before = remote.call_count();
    let writes_before = mirror.write_count();

    let err = cache
        .create("U1", TASKS, RecordDraft::task("  "))
        .expect_err("empty title");

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(remote.call_count(), calls_before);
    assert_eq!(mirror.write_count(), writes_before);
    assert_eq!(cache.items(TASKS).len(), 1);
}

#[test]
fn create_note_requires_content() {
    let remote = ScriptedRemote::default();
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);

    let err = cache
        .create("U1", NOTES, RecordDraft::note("Groceries", ""))
        .expect_err("missing content");
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(remote.call_count(), 0);
}

#[test]
fn create_appends_to_items_and_snapshot() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("t1", "U1", "one")]);
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);
    cache.refresh("U1", TASKS).expect("refresh");

    let draft = RecordDraft {
        title: "Call plumber".to_string(),
        priority: Priority::High,
        due_date: Instant::parse("2026-03-01"),
        subtasks: vec!["find number".to_string()],
        ..RecordDraft::default()
    };
    let created = cache.create("U1", TASKS, draft).expect("create");

    assert_eq!(created.id, "doc-1");
    assert_eq!(created.owner_id(), "U1");
    assert_eq!(ids(cache.items(TASKS)), vec!["t1", "doc-1"]);

    let snapshot = mirror.snapshot("tasks_U1").expect("snapshot");
    assert_eq!(ids(&snapshot), vec!["t1", "doc-1"]);
    assert_eq!(snapshot[1].fields.priority, Priority::High);
    assert_eq!(snapshot[1].fields.subtasks, vec!["find number".to_string()]);
}

#[test]
fn create_treats_corrupt_snapshot_as_empty() {
    let remote = ScriptedRemote::default();
    let mirror = RecordingMirror::default();
    mirror.inner.set("notes_U1", "not json").expect("seed");
    let mut cache = SyncCache::new(&remote, &mirror);

    let created = cache
        .create("U1", NOTES, RecordDraft::note("Idea", "write it down"))
        .expect("create note");

    assert!(created.fields.timestamp.is_some());
    assert_eq!(
        ids(&mirror.snapshot("notes_U1").expect("snapshot")),
        vec![created.id.as_str()]
    );
}

#[test]
fn failed_create_leaves_items_and_mirror_unchanged() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("t1", "U1", "one")]);
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);
    cache.refresh("U1", TASKS).expect("refresh");
    let snapshot_before = mirror.snapshot("tasks_U1").expect("snapshot");

    remote.fail_insert.set(true);
    let err = cache
        .create("U1", TASKS, RecordDraft::task("Will fail"))
        .expect_err("insert fails");

    assert_eq!(err.kind, ErrorKind::RemoteWrite);
    assert!(err.message.contains("[http_status=503]"));
    assert_eq!(cache.items(TASKS).len(), 1);
    assert_eq!(
        mirror.snapshot("tasks_U1").expect("snapshot").len(),
        snapshot_before.len()
    );
}

#[test]
fn delete_removes_record_from_items_and_snapshot() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("t1", "U1", "one"), task("t2", "U1", "two")]);
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);
    cache.refresh("U1", TASKS).expect("refresh");

    cache.delete("U1", TASKS, "t1").expect("delete");

    assert_eq!(ids(cache.items(TASKS)), vec!["t2"]);
    assert_eq!(ids(&mirror.snapshot("tasks_U1").expect("snapshot")), vec!["t2"]);
    assert_eq!(remote.ids(TASKS), vec!["t2".to_string()]);
}

#[test]
fn failed_delete_keeps_state() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("t1", "U1", "one")]);
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);
    cache.refresh("U1", TASKS).expect("refresh");

    remote.fail_delete.set(true);
    let err = cache.delete("U1", TASKS, "t1").expect_err("delete fails");

    assert_eq!(err.kind, ErrorKind::RemoteWrite);
    assert_eq!(ids(cache.items(TASKS)), vec!["t1"]);
    assert_eq!(ids(&mirror.snapshot("tasks_U1").expect("snapshot")), vec!["t1"]);
}

#[test]
fn update_patches_items_and_snapshot() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("t1", "U1", "before")]);
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);
    cache.refresh("U1", TASKS).expect("refresh");

    let patch = RecordPatch {
        title: Some("after".to_string()),
        priority: Some(Priority::Medium),
        ..RecordPatch::default()
    };
    let updated = cache.update("U1", TASKS, "t1", &patch).expect("update");

    assert_eq!(updated.fields.title, "after");
    assert_eq!(cache.items(TASKS)[0].fields.title, "after");
    let snapshot = mirror.snapshot("tasks_U1").expect("snapshot");
    assert_eq!(snapshot[0].fields.priority, Priority::Medium);
}

#[test]
fn update_uses_mirror_when_collection_not_loaded() {
    let remote = ScriptedRemote::default();
    let mirror = RecordingMirror::default();
    mirror.seed("notes_U1", &[task("n1", "U1", "note")]);
    let mut cache = SyncCache::new(&remote, &mirror);

    let patch = RecordPatch {
        content: Some("new body".to_string()),
        ..RecordPatch::default()
    };
    let updated = cache.update("U1", NOTES, "n1", &patch).expect("update");

    assert_eq!(updated.fields.content, "new body");
    assert_eq!(
        mirror.snapshot("notes_U1").expect("snapshot")[0].fields.content,
        "new body"
    );
}

#[test]
fn update_rejects_unknown_ids_and_blank_titles_before_io() {
    let remote = ScriptedRemote::default();
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);

    let unknown = RecordPatch {
        title: Some("x".to_string()),
        ..RecordPatch::default()
    };
    let err = cache
        .update("U1", TASKS, "missing", &unknown)
        .expect_err("unknown id");
    assert_eq!(err.kind, ErrorKind::Usage);

    let blank = RecordPatch {
        title: Some(String::new()),
        ..RecordPatch::default()
    };
    let err = cache.update("U1", TASKS, "t1", &blank).expect_err("blank");
    assert_eq!(err.kind, ErrorKind::Validation);

    assert_eq!(remote.call_count(), 0);
    assert_eq!(mirror.write_count(), 0);
}

#[test]
fn failed_update_leaves_record_untouched() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("t1", "U1", "before")]);
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);
    cache.refresh("U1", TASKS).expect("refresh");

    remote.fail_update.set(true);
    let patch = RecordPatch {
        title: Some("after".to_string()),
        ..RecordPatch::default()
    };
    let err = cache
        .update("U1", TASKS, "t1", &patch)
        .expect_err("update fails");

    assert_eq!(err.kind, ErrorKind::RemoteWrite);
    assert_eq!(cache.items(TASKS)[0].fields.title, "before");
    assert_eq!(
        mirror.snapshot("tasks_U1").expect("snapshot")[0].fields.title,
        "before"
    );
}

#[test]
fn complete_task_moves_record_between_collections() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("t1", "U1", "one"), task("t2", "U1", "two")]);
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);
    cache.refresh("U1", TASKS).expect("refresh tasks");
    cache.refresh("U1", COMPLETED).expect("refresh completed");

    let outcome = cache.complete_task("U1", "t1").expect("complete");

    assert_eq!(outcome.removed_id, "t1");
    assert_eq!(ids(cache.items(TASKS)), vec!["t2"]);
    assert_eq!(ids(cache.items(COMPLETED)), vec![outcome.new_id.as_str()]);
    assert_eq!(cache.items(COMPLETED)[0].fields.title, "one");
    assert_eq!(ids(&mirror.snapshot("tasks_U1").expect("tasks")), vec!["t2"]);
    assert_eq!(
        ids(&mirror.snapshot("completed_U1").expect("completed")),
        vec![outcome.new_id.as_str()]
    );
    assert_eq!(remote.ids(TASKS), vec!["t2".to_string()]);
    assert_eq!(remote.ids(COMPLETED), vec![outcome.new_id.clone()]);
}

#[test]
fn partial_move_duplicates_instead_of_losing() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("t1", "U1", "one")]);
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);
    cache.refresh("U1", TASKS).expect("refresh");

    remote.fail_delete.set(true);
    let err = cache.complete_task("U1", "t1").expect_err("delete step fails");

    assert_eq!(err.kind, ErrorKind::PartialMove);
    assert_eq!(ids(cache.items(TASKS)), vec!["t1"]);
    assert_eq!(cache.items(COMPLETED).len(), 1);
    assert_eq!(ids(&mirror.snapshot("tasks_U1").expect("tasks")), vec!["t1"]);
    assert_eq!(mirror.snapshot("completed_U1").expect("completed").len(), 1);
    assert_eq!(remote.ids(TASKS), vec!["t1".to_string()]);
    assert_eq!(remote.ids(COMPLETED).len(), 1);
}

#[test]
fn failed_move_insert_changes_nothing() {
    let remote = ScriptedRemote::default();
    remote.seed(TASKS, vec![task("t1", "U1", "one")]);
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);
    cache.refresh("U1", TASKS).expect("refresh");
    let writes_before = mirror.write_count();

    remote.fail_insert.set(true);
    let record = cache.items(TASKS)[0].clone();
    let err = cache
        .move_to_collection("U1", TASKS, COMPLETED, "t1", &record)
        .expect_err("insert fails");

    assert_eq!(err.kind, ErrorKind::RemoteWrite);
    assert_eq!(ids(cache.items(TASKS)), vec!["t1"]);
    assert!(cache.items(COMPLETED).is_empty());
    assert_eq!(mirror.write_count(), writes_before);
    assert!(!remote.calls.borrow().iter().any(|call| call.starts_with("delete")));
}

#[test]
fn moved_record_is_stamped_with_requesting_user() {
    let remote = ScriptedRemote::default();
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);

    let foreign = task("t9", "someone-else", "borrowed");
    let outcome = cache
        .move_to_collection("U1", TASKS, COMPLETED, "t9", &foreign)
        .expect("move");

    let moved = &cache.items(COMPLETED)[0];
    assert_eq!(moved.id, outcome.new_id);
    assert_eq!(moved.owner_id(), "U1");
}

#[test]
fn complete_unknown_task_is_a_usage_error() {
    let remote = ScriptedRemote::default();
    let mirror = RecordingMirror::default();
    let mut cache = SyncCache::new(&remote, &mirror);

    let err = cache.complete_task("U1", "nope").expect_err("unknown task");
    assert_eq!(err.kind, ErrorKind::Usage);
    assert_eq!(remote.call_count(), 0);
}

#[test]
fn get_cached_reads_only_the_mirror() {
    let remote = ScriptedRemote::default();
    let mirror = RecordingMirror::default();
    mirror.seed(&mirror_key(TASKS, "U1"), &[task("t1", "U1", "cached")]);
    let cache = SyncCache::new(&remote, &mirror);

    let cached = cache.get_cached("U1", TASKS);

    assert_eq!(ids(&cached), vec!["t1"]);
    assert_eq!(remote.call_count(), 0);
    assert!(cache.get_cached("U2", TASKS).is_empty());
}
