//! Per-key async locks serialising read-modify-write cycles.
//!
//! Concurrent ticks for the same broadcast must serialise at the
//! `update_config` boundary. Each backend holds one [`KeyLocks`] and takes
//! the key's lock for the full read-mutate-write cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A map of per-key async mutexes, created on first use.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    /// Acquire the lock for `key`, waiting if another task holds it.
    pub(crate) async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                locks
                    .entry(key.to_owned())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn same_key_serialises_different_keys_do_not() {
        let locks = Arc::new(KeyLocks::default());
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("3:Broadcast.a").await;
                // Non-atomic read-modify-write: only safe when serialised.
                let seen = counter.load(Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(seen.saturating_add(1), Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);

        // A different key must not deadlock against a held lock.
        let _held = locks.lock("3:Broadcast.a").await;
        let other = locks.lock("3:Broadcast.b").await;
        drop(other);
    }
}
