use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One lock per file id, so duplicate checks and inserts for the same
/// file never interleave while different files proceed in parallel.
///
/// Entries live only while some caller holds or waits for them.
#[derive(Default)]
pub struct FileLocks {
    locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `file_id`.
    pub fn with_file<T>(&self, file_id: u64, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(file_id).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };

        // Clones are only taken under the map lock, so a count of two (map
        // plus ours) means nobody else is waiting on this file.
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&file_id);
        }

        result
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
