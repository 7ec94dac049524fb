use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::de::DeserializeOwned;

use crate::error::Result;

/// Key/blob persistence used by the queue and the draft store.
/// Blobs are whole serialized snapshots; `save` replaces the previous blob.
pub trait Storage {
    fn load(&self, key: &str) -> Option<String>;
    fn save(&mut self, key: &str, blob: &str) -> Result<()>;
}

/// In-process storage. Clones share the same map, so the queue and the
/// draft store can each hold a handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn save(&mut self, key: &str, blob: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

/// Load the JSON array stored under `key`, one entry at a time.
///
/// A blob that is not an array is logged and read as empty. An entry that
/// does not fit `T` is logged and skipped; the rest of the array survives.
pub(crate) fn load_entries<T: DeserializeOwned>(storage: &impl Storage, key: &str, tag: &str) -> Vec<T> {
    let Some(blob) = storage.load(key) else {
        return Vec::new();
    };
    let raw: Vec<serde_json::Value> = match serde_json::from_str(&blob) {
        Ok(raw) => raw,
        Err(e) => {
            crate::console_warn!("[{}] discarding unreadable '{}' blob: {}", tag, key, e);
            return Vec::new();
        }
    };

    raw.into_iter()
        .enumerate()
        .filter_map(|(position, value)| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                crate::console_warn!("[{}] skipping unreadable entry {} in '{}': {}", tag, position, key, e);
                None
            }
        })
        .collect()
}

#[cfg(target_arch = "wasm32")]
pub use browser::LocalStorage;

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::Storage;
    use crate::error::{EngineError, Result};

    /// `window.localStorage`. A missing or blocked storage area behaves as
    /// empty on load and fails on save.
    #[derive(Debug, Clone, Default)]
    pub struct LocalStorage;

    impl LocalStorage {
        fn area() -> Option<web_sys::Storage> {
            web_sys::window()?.local_storage().ok().flatten()
        }
    }

    impl Storage for LocalStorage {
        fn load(&self, key: &str) -> Option<String> {
            Self::area()?.get_item(key).ok().flatten()
        }

        fn save(&mut self, key: &str, blob: &str) -> Result<()> {
            let storage_error = |reason: String| EngineError::Storage {
                key: key.to_string(),
                reason,
            };
            let area = Self::area().ok_or_else(|| storage_error("localStorage unavailable".into()))?;
            area.set_item(key, blob)
                .map_err(|e| storage_error(format!("{:?}", e)))
        }
    }
}

/// Storage backing the engine on the current target
#[cfg(target_arch = "wasm32")]
pub type PlatformStorage = LocalStorage;

#[cfg(not(target_arch = "wasm32"))]
pub type PlatformStorage = MemoryStorage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_shared_between_clones() {
        let mut a = MemoryStorage::new();
        let b = a.clone();
        assert_eq!(b.load("k"), None);
        a.save("k", "[1,2]").unwrap();
        assert_eq!(b.load("k").as_deref(), Some("[1,2]"));
        a.save("k", "[]").unwrap();
        assert_eq!(b.load("k").as_deref(), Some("[]"));
    }

    #[test]
    fn test_load_entries_skips_bad_entries() {
        let mut storage = MemoryStorage::new();
        storage.save("k", r#"[1, "two", 3]"#).unwrap();
        let entries: Vec<u32> = load_entries(&storage, "k", "test");
        assert_eq!(entries, vec![1, 3]);

        storage.save("k", "{").unwrap();
        assert!(load_entries::<u32>(&storage, "k", "test").is_empty());
        assert!(load_entries::<u32>(&storage, "missing", "test").is_empty());
    }
}
