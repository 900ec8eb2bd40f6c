use jot_core::{JotError, JotResult};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Durable string-keyed snapshot storage backing the local mirror.
///
/// A snapshot is always replaced wholesale; implementations never merge.
pub trait MirrorStore {
    fn get(&self, key: &str) -> JotResult<Option<String>>;

    fn set(&self, key: &str, snapshot: &str) -> JotResult<()>;

    fn clear(&self, key: &str) -> JotResult<()>;
}

impl<T: MirrorStore + ?Sized> MirrorStore for &T {
    fn get(&self, key: &str) -> JotResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, snapshot: &str) -> JotResult<()> {
        (**self).set(key, snapshot)
    }

    fn clear(&self, key: &str) -> JotResult<()> {
        (**self).clear(key)
    }
}

/// Process-local mirror; contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> JotResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| JotError::io("in-memory mirror lock poisoned"))
    }
}

impl MirrorStore for MemoryMirror {
    fn get(&self, key: &str) -> JotResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, snapshot: &str) -> JotResult<()> {
        self.lock()?.insert(key.to_string(), snapshot.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> JotResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
