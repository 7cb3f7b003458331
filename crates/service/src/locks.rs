use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-record mutual exclusion for read/modify/write cycles.
///
/// The engines load a record, mutate a copy, and write it back; two
/// concurrent writers to the same id would otherwise race and drop stage
/// history or break the single-live-version chain. Locks are keyed by
/// record id so unrelated records never contend.
#[derive(Default)]
pub struct IdLocks {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(id).or_default())
        };
        lock.lock_owned().await
    }
}
