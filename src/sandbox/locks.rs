//! Per-path mutual exclusion for handler invocations.
//!
//! Two requests touching the same resolved path run one after the other;
//! requests on disjoint paths run concurrently. Paths are locked in sorted
//! order with duplicates removed, so two multi-path invocations can never
//! wait on each other in a cycle.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one invocation; dropping releases every path.
pub struct PathGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until every path in `paths` is free, then holds them all.
    pub async fn acquire(&self, mut paths: Vec<PathBuf>) -> PathGuard {
        paths.sort();
        paths.dedup();

        let handles: Vec<Arc<AsyncMutex<()>>> = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Nobody but the map holds these: drop them.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            paths
                .into_iter()
                .map(|path| locks.entry(path).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        PathGuard { _guards: guards }
    }

    /// Number of paths currently tracked (held or awaited).
    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_path_is_serialized() {
        let locks = Arc::new(PathLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire(vec![PathBuf::from("/data/out.txt")]).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disjoint_paths_run_concurrently() {
        let locks = PathLocks::new();
        let _a = locks.acquire(vec![PathBuf::from("/a")]).await;
        let b = tokio::time::timeout(
            Duration::from_millis(200),
            locks.acquire(vec![PathBuf::from("/b")]),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_paths_do_not_self_deadlock() {
        let locks = PathLocks::new();
        let guard = tokio::time::timeout(
            Duration::from_millis(200),
            locks.acquire(vec![PathBuf::from("/a"), PathBuf::from("/a")]),
        )
        .await;
        assert!(guard.is_ok());
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = PathLocks::new();
        {
            let _guard = locks.acquire(vec![PathBuf::from("/a"), PathBuf::from("/b")]).await;
            assert_eq!(locks.tracked(), 2);
        }
        let _guard = locks.acquire(vec![PathBuf::from("/c")]).await;
        assert_eq!(locks.tracked(), 1);
    }
}
