//! Per-key research locks.
//!
//! Concurrent research requests for the same report key are serialized so
//! only one assembly runs at a time per key; requests for different keys
//! proceed independently. Entries are held weakly and pruned once no request
//! holds or waits on them.

use polibrief_core::ReportKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

#[derive(Default)]
pub struct ResearchLocks {
    inner: Mutex<HashMap<ReportKey, Weak<tokio::sync::Mutex<()>>>>,
}

impl ResearchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. The lock is released when the
    /// returned guard is dropped.
    pub async fn acquire(&self, key: &ReportKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.retain(|_, weak| weak.strong_count() > 0);
            match map.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    map.insert(key.clone(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        if lock.try_lock().is_err() {
            debug!(key = %key, "Waiting for in-flight research");
        }
        lock.lock_owned().await
    }

    /// Keys with a live lock.
    pub fn active(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.values().filter(|w| w.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(ResearchLocks::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&ReportKey::new("Jane Doe", "Senator")).await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keys_are_case_insensitive_and_independent() {
        let locks = ResearchLocks::new();
        let _a = locks.acquire(&ReportKey::new("Jane Doe", "")).await;
        // A different key does not block.
        let _b = locks.acquire(&ReportKey::new("John Roe", "")).await;
        assert_eq!(locks.active(), 2);

        let same = ReportKey::new("JANE  doe", "");
        let waiting = tokio::time::timeout(Duration::from_millis(20), locks.acquire(&same)).await;
        assert!(waiting.is_err());
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = ResearchLocks::new();
        {
            let _guard = locks.acquire(&ReportKey::new("Jane Doe", "")).await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
        let _guard = locks.acquire(&ReportKey::new("John Roe", "")).await;
        assert_eq!(locks.inner.lock().unwrap().len(), 1);
    }
}
