mod draft;

pub use draft::{RecordDraft, validate_draft, validate_patch};

use jot_api::{COMPLETED, Record, RecordPatch, RemoteCollectionSource, TASKS};
use jot_core::{JotError, JotResult};
use jot_store::MirrorStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Storage key of the mirror snapshot for one user's collection.
pub fn mirror_key(collection: &str, user_id: &str) -> String {
    format!("{collection}_{user_id}")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

/// Where the current items came from; `Mirror` is a degraded `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Remote,
    Mirror,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionState {
    pub items: Vec<Record>,
    pub status: SyncStatus,
    pub source: Option<DataSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshOutcome {
    pub collection: String,
    pub source: DataSource,
    pub count: usize,
    pub mirror_written: bool,
    /// Set when the remote fetch failed and the mirror snapshot was served.
    pub remote_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub new_id: String,
    pub removed_id: String,
}

/// Keeps per-collection item lists for one user in step with the remote
/// store, writing every confirmed change through to the local mirror.
///
/// Remote effects always happen first; local state only follows a remote
/// success. Mirror failures are logged and treated as cache misses.
///
/// Mirror updates after mutations are read-modify-write. Two controllers
/// mutating the same `(collection, user)` pair concurrently can lose an
/// update; callers keep a single writer per key.
#[derive(Debug)]
pub struct SyncCache<R, M> {
    remote: R,
    mirror: M,
    user_id: Option<String>,
    collections: BTreeMap<String, CollectionState>,
}

impl<R, M> SyncCache<R, M>
where
    R: RemoteCollectionSource,
    M: MirrorStore,
{
    pub fn new(remote: R, mirror: M) -> Self {
        Self {
            remote,
            mirror,
            user_id: None,
            collections: BTreeMap::new(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn items(&self, collection: &str) -> &[Record] {
        self.collections
            .get(collection)
            .map(|state| state.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn status(&self, collection: &str) -> SyncStatus {
        self.collections
            .get(collection)
            .map(|state| state.status)
            .unwrap_or_default()
    }

    pub fn state(&self, collection: &str) -> Option<&CollectionState> {
        self.collections.get(collection)
    }

    /// Fetches the user's records, falling back to the mirror snapshot when
    /// the remote store is unreachable.
    ///
    /// Returns `Err` only when the remote failed and no usable snapshot
    /// exists; the collection is then left empty in `Error` status.
    pub fn refresh(&mut self, user_id: &str, collection: &str) -> JotResult<RefreshOutcome> {
        self.enter_user(user_id)?;
        require_collection(collection)?;
        self.state_mut(collection).status = SyncStatus::Loading;

        let key = mirror_key(collection, user_id);
        match self.remote.query(collection, user_id) {
            Ok(fetched) => {
                let items = retain_owned(user_id, collection, fetched);
                let mirror_written = self.write_snapshot(&key, &items);
                let count = items.len();
                tracing::info!(collection, count, "refreshed from remote");

                *self.state_mut(collection) = CollectionState {
                    items,
                    status: SyncStatus::Ready,
                    source: Some(DataSource::Remote),
                };

                Ok(RefreshOutcome {
                    collection: collection.to_string(),
                    source: DataSource::Remote,
                    count,
                    mirror_written,
                    remote_error: None,
                })
            }
            Err(remote_error) => match self.read_snapshot(&key) {
                Some(items) => {
                    let count = items.len();
                    tracing::warn!(
                        collection,
                        count,
                        error = %remote_error,
                        "remote fetch failed; serving mirror snapshot"
                    );

                    *self.state_mut(collection) = CollectionState {
                        items,
                        status: SyncStatus::Ready,
                        source: Some(DataSource::Mirror),
                    };

                    Ok(RefreshOutcome {
                        collection: collection.to_string(),
                        source: DataSource::Mirror,
                        count,
                        mirror_written: false,
                        remote_error: Some(remote_error.message),
                    })
                }
                None => {
                    tracing::warn!(
                        collection,
                        error = %remote_error,
                        "remote fetch failed and no mirror snapshot is available"
                    );

                    *self.state_mut(collection) = CollectionState {
                        items: Vec::new(),
                        status: SyncStatus::Error,
                        source: None,
                    };
                    Err(remote_error)
                }
            },
        }
    }

    pub fn create(
        &mut self,
        user_id: &str,
        collection: &str,
        draft: RecordDraft,
    ) -> JotResult<Record> {
        self.enter_user(user_id)?;
        require_collection(collection)?;
        validate_draft(collection, &draft)?;

        let fields = draft.into_fields(user_id, collection);
        let id = self
            .remote
            .insert(collection, &fields)
            .map_err(|err| write_error("create record", collection, err))?;

        let record = Record::new(id, fields);
        tracing::info!(collection, id = %record.id, "record created");
        self.append_local(user_id, collection, record.clone());
        Ok(record)
    }

    /// Applies `patch` remotely, then to the in-memory and mirrored copies.
    ///
    /// The record must already be known locally (from a refresh or the
    /// mirror) so the patched record can be returned.
    pub fn update(
        &mut self,
        user_id: &str,
        collection: &str,
        record_id: &str,
        patch: &RecordPatch,
    ) -> JotResult<Record> {
        self.enter_user(user_id)?;
        require_collection(collection)?;
        require_record_id(record_id)?;
        validate_patch(collection, patch)?;

        let key = mirror_key(collection, user_id);
        let mut updated = self
            .find_record(collection, &key, record_id)
            .ok_or_else(|| not_found(collection, record_id))?;

        self.remote
            .update(collection, record_id, patch)
            .map_err(|err| write_error("update record", collection, err))?;

        patch.apply_to(&mut updated.fields);
        if let Some(state) = self.collections.get_mut(collection) {
            for item in state.items.iter_mut().filter(|item| item.id == record_id) {
                patch.apply_to(&mut item.fields);
            }
        }

        self.modify_snapshot(&key, |records| {
            for record in records.iter_mut().filter(|record| record.id == record_id) {
                *record = updated.clone();
            }
        });

        tracing::info!(collection, id = record_id, "record updated");
        Ok(updated)
    }

    pub fn delete(&mut self, user_id: &str, collection: &str, record_id: &str) -> JotResult<()> {
        self.enter_user(user_id)?;
        require_collection(collection)?;
        require_record_id(record_id)?;

        self.remote
            .delete(collection, record_id)
            .map_err(|err| write_error("delete record", collection, err))?;

        tracing::info!(collection, id = record_id, "record deleted");
        self.remove_local(user_id, collection, record_id);
        Ok(())
    }

    /// Copies `record` into `to`, then deletes `record_id` from `from`.
    ///
    /// If the delete fails after a successful insert, the record stays in
    /// both collections (locally and remotely) and a `PartialMove` error is
    /// returned. Completed remote steps are never rolled back.
    pub fn move_to_collection(
        &mut self,
        user_id: &str,
        from: &str,
        to: &str,
        record_id: &str,
        record: &Record,
    ) -> JotResult<MoveOutcome> {
        self.enter_user(user_id)?;
        require_collection(from)?;
        require_collection(to)?;
        require_record_id(record_id)?;
        if from == to {
            return Err(JotError::usage(format!(
                "cannot move a record from '{from}' into itself"
            )));
        }

        let mut fields = record.fields.clone();
        fields.user_id = user_id.to_string();

        let new_id = self
            .remote
            .insert(to, &fields)
            .map_err(|err| write_error("copy record", to, err))?;
        self.append_local(user_id, to, Record::new(new_id.clone(), fields));

        if let Err(err) = self.remote.delete(from, record_id) {
            tracing::warn!(
                from,
                to,
                id = record_id,
                new_id = %new_id,
                error = %err,
                "move left the record in both collections"
            );
            return Err(JotError::partial_move(format!(
                "record '{record_id}' was copied to '{to}' as '{new_id}' but could not be removed from '{from}': {}",
                err.message
            )));
        }

        self.remove_local(user_id, from, record_id);
        tracing::info!(from, to, id = record_id, new_id = %new_id, "record moved");

        Ok(MoveOutcome {
            new_id,
            removed_id: record_id.to_string(),
        })
    }

    /// Moves an active task into the completed collection.
    pub fn complete_task(&mut self, user_id: &str, record_id: &str) -> JotResult<MoveOutcome> {
        self.enter_user(user_id)?;
        require_record_id(record_id)?;

        let key = mirror_key(TASKS, user_id);
        let record = self
            .find_record(TASKS, &key, record_id)
            .ok_or_else(|| not_found(TASKS, record_id))?;

        self.move_to_collection(user_id, TASKS, COMPLETED, record_id, &record)
    }

    /// Mirror-only read for rendering before the first refresh resolves.
    pub fn get_cached(&self, user_id: &str, collection: &str) -> Vec<Record> {
        if user_id.trim().is_empty() || collection.trim().is_empty() {
            return Vec::new();
        }

        self.read_snapshot(&mirror_key(collection, user_id))
            .unwrap_or_default()
    }

    /// Drops the user's mirror snapshots for `collections` and, if the
    /// controller currently holds that user's data, its in-memory state.
    ///
    /// Returns how many snapshots existed and were removed.
    pub fn forget_user(&mut self, user_id: &str, collections: &[&str]) -> JotResult<usize> {
        if user_id.trim().is_empty() {
            return Err(JotError::usage("a user id is required to clear cached data"));
        }

        let mut cleared = 0usize;
        for collection in collections {
            let key = mirror_key(collection, user_id);
            let held = matches!(self.mirror.get(&key), Ok(Some(_)));
            match self.mirror.clear(&key) {
                Ok(()) if held => cleared += 1,
                Ok(()) => {}
                Err(err) => tracing::warn!(key = %key, error = %err, "failed to clear mirror entry"),
            }
        }

        if self.user_id.as_deref() == Some(user_id) {
            self.collections.clear();
            self.user_id = None;
        }

        Ok(cleared)
    }

    fn enter_user(&mut self, user_id: &str) -> JotResult<()> {
        if user_id.trim().is_empty() {
            return Err(JotError::usage(
                "no signed-in user; run `jot auth login` first",
            ));
        }

        if self.user_id.as_deref() != Some(user_id) {
            if self.user_id.is_some() {
                tracing::info!("user changed; discarding in-memory collections");
            }
            self.collections.clear();
            self.user_id = Some(user_id.to_string());
        }

        Ok(())
    }

    fn state_mut(&mut self, collection: &str) -> &mut CollectionState {
        self.collections.entry(collection.to_string()).or_default()
    }

    fn find_record(&self, collection: &str, key: &str, record_id: &str) -> Option<Record> {
        self.items(collection)
            .iter()
            .find(|record| record.id == record_id)
            .cloned()
            .or_else(|| {
                self.read_snapshot(key)?
                    .into_iter()
                    .find(|record| record.id == record_id)
            })
    }

    fn append_local(&mut self, user_id: &str, collection: &str, record: Record) {
        self.state_mut(collection).items.push(record.clone());
        self.modify_snapshot(&mirror_key(collection, user_id), |records| {
            records.retain(|existing| existing.id != record.id);
            records.push(record);
        });
    }

    fn remove_local(&mut self, user_id: &str, collection: &str, record_id: &str) {
        if let Some(state) = self.collections.get_mut(collection) {
            state.items.retain(|record| record.id != record_id);
        }
        self.modify_snapshot(&mirror_key(collection, user_id), |records| {
            records.retain(|record| record.id != record_id);
        });
    }

    fn read_snapshot(&self, key: &str) -> Option<Vec<Record>> {
        let raw = match self.mirror.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(key, error = %err, "mirror read failed; treating as cache miss");
                return None;
            }
        };

        match serde_json::from_str::<Vec<Record>>(&raw) {
            Ok(records) => Some(records),
            Err(err) => {
                tracing::warn!(key, error = %err, "mirror snapshot is undecodable; ignoring it");
                None
            }
        }
    }

    fn write_snapshot(&self, key: &str, records: &[Record]) -> bool {
        let encoded = match serde_json::to_string(records) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to encode mirror snapshot");
                return false;
            }
        };

        match self.mirror.set(key, &encoded) {
            Ok(()) => {
                tracing::debug!(key, records = records.len(), "mirror snapshot written");
                true
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "mirror write failed; snapshot left stale");
                false
            }
        }
    }

    /// A missing or undecodable snapshot is edited as an empty list.
    fn modify_snapshot(&self, key: &str, edit: impl FnOnce(&mut Vec<Record>)) -> bool {
        let mut records = self.read_snapshot(key).unwrap_or_default();
        edit(&mut records);
        self.write_snapshot(key, &records)
    }
}

fn retain_owned(user_id: &str, collection: &str, fetched: Vec<Record>) -> Vec<Record> {
    let total = fetched.len();
    let owned: Vec<Record> = fetched
        .into_iter()
        .filter(|record| record.owner_id() == user_id)
        .collect();

    if owned.len() != total {
        tracing::warn!(
            collection,
            dropped = total - owned.len(),
            "remote returned records owned by another user"
        );
    }

    owned
}

fn require_collection(collection: &str) -> JotResult<()> {
    if collection.trim().is_empty() {
        return Err(JotError::usage("collection name cannot be empty"));
    }
    Ok(())
}

fn require_record_id(record_id: &str) -> JotResult<()> {
    if record_id.trim().is_empty() {
        return Err(JotError::usage("record id cannot be empty"));
    }
    Ok(())
}

fn not_found(collection: &str, record_id: &str) -> JotError {
    JotError::usage(format!(
        "record '{record_id}' not found in '{collection}'; refresh the collection and retry"
    ))
}

fn write_error(action: &str, collection: &str, err: JotError) -> JotError {
    JotError::remote_write(format!(
        "failed to {action} in '{collection}': {}",
        err.message
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jot_api::{NOTES, RecordFields};
    use jot_core::ErrorKind;
    use jot_store::MemoryMirror;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingRemote {
        queries: Cell<usize>,
    }

    impl RemoteCollectionSource for CountingRemote {
        fn query(&self, _collection: &str, owner_id: &str) -> JotResult<Vec<Record>> {
            self.queries.set(self.queries.get() + 1);
            Ok(vec![
                record("a", owner_id, "mine"),
                record("b", "someone-else", "theirs"),
            ])
        }

        fn insert(&self, _collection: &str, _fields: &RecordFields) -> JotResult<String> {
            Ok("new".to_string())
        }

        fn update(&self, _collection: &str, _id: &str, _patch: &RecordPatch) -> JotResult<()> {
            Ok(())
        }

        fn delete(&self, _collection: &str, _id: &str) -> JotResult<()> {
            Ok(())
        }
    }

    fn record(id: &str, owner: &str, title: &str) -> Record {
        Record::new(
            id,
            RecordFields {
                user_id: owner.to_string(),
                title: title.to_string(),
                ..RecordFields::default()
            },
        )
    }

    #[test]
    fn mirror_key_is_collection_then_user() {
        assert_eq!(mirror_key(TASKS, "U1"), "tasks_U1");
        assert_eq!(mirror_key(NOTES, "abc"), "notes_abc");
    }

    #[test]
    fn empty_user_fails_before_any_io() {
        let remote = CountingRemote::default();
        let mirror = MemoryMirror::new();
        let mut cache = SyncCache::new(&remote, &mirror);

        let err = cache.refresh("", TASKS).expect_err("empty user");
        assert_eq!(err.kind, ErrorKind::Usage);
        assert_eq!(remote.queries.get(), 0);
        assert_eq!(cache.status(TASKS), SyncStatus::Idle);
        assert!(mirror.keys().is_empty());
    }

    #[test]
    fn foreign_records_are_dropped_on_refresh() {
        let remote = CountingRemote::default();
        let mirror = MemoryMirror::new();
        let mut cache = SyncCache::new(&remote, &mirror);

        let outcome = cache.refresh("U1", TASKS).expect("refresh");
        assert_eq!(outcome.count, 1);
        assert_eq!(cache.items(TASKS).len(), 1);
        assert_eq!(cache.items(TASKS)[0].id, "a");
    }

    #[test]
    fn switching_user_discards_in_memory_state() {
        let remote = CountingRemote::default();
        let mirror = MemoryMirror::new();
        let mut cache = SyncCache::new(&remote, &mirror);

        cache.refresh("U1", TASKS).expect("refresh U1");
        cache.refresh("U1", NOTES).expect("refresh U1 notes");
        assert_eq!(cache.user_id(), Some("U1"));

        cache.refresh("U2", TASKS).expect("refresh U2");
        assert_eq!(cache.user_id(), Some("U2"));
        assert!(cache.state(NOTES).is_none());
        assert_eq!(cache.items(TASKS)[0].owner_id(), "U2");
    }

    #[test]
    fn undecodable_snapshot_reads_as_empty() {
        let remote = CountingRemote::default();
        let mirror = MemoryMirror::new();
        mirror.set("tasks_U1", "{not json").expect("seed");
        let cache = SyncCache::new(&remote, &mirror);

        assert!(cache.get_cached("U1", TASKS).is_empty());
        assert!(cache.get_cached("", TASKS).is_empty());
    }

    #[test]
    fn snapshot_with_null_fields_survives_write_through() {
        let remote = CountingRemote::default();
        let mirror = MemoryMirror::new();
        mirror
            .set(
                "tasks_U1",
                r#"[{"id":"old","userId":"U1","title":"legacy","description":null,"priority":"low"},
                    {"id":"gone","userId":"U1","title":"drop me"}]"#,
            )
            .expect("seed");
        let mut cache = SyncCache::new(&remote, &mirror);

        assert_eq!(cache.get_cached("U1", TASKS).len(), 2);

        cache.delete("U1", TASKS, "gone").expect("delete");
        let remaining = cache.get_cached("U1", TASKS);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "old");
        assert_eq!(remaining[0].fields.priority, jot_api::Priority::Low);
    }

    #[test]
    fn forget_user_clears_snapshots_and_state() {
        let remote = CountingRemote::default();
        let mirror = MemoryMirror::new();
        let mut cache = SyncCache::new(&remote, &mirror);

        cache.refresh("U1", TASKS).expect("refresh");
        mirror.set("notes_U2", "[]").expect("seed other user");

        let cleared = cache.forget_user("U1", &[TASKS, NOTES]).expect("forget");
        assert_eq!(cleared, 1);
        assert!(cache.user_id().is_none());
        assert!(cache.items(TASKS).is_empty());
        assert_eq!(mirror.keys(), vec!["notes_U2".to_string()]);
    }
}
