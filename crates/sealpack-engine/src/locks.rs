//! Per-target serialization
//!
//! Two runs writing the same target tag would race on the loader. Runs for
//! the same tag take turns through a tag-scoped async mutex; runs for
//! different tags never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct TagLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held while a run owns its target tag
#[derive(Debug)]
pub struct TagGuard {
    _guard: OwnedMutexGuard<()>,
}

impl TagLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `tag`
    pub async fn lock(&self, tag: &str) -> TagGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(tag.to_string()).or_default().clone()
        };
        TagGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of tags currently held or awaited
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_tag_is_serialized() {
        let locks = Arc::new(TagLocks::new());
        let first = locks.lock("app:1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("app:1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_distinct_tags_do_not_block() {
        let locks = TagLocks::new();
        let _a = locks.lock("app:1").await;
        let _b = tokio::time::timeout(Duration::from_secs(5), locks.lock("app:2"))
            .await
            .unwrap();
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn test_released_tags_are_pruned() {
        let locks = TagLocks::new();
        drop(locks.lock("app:1").await);
        let _b = locks.lock("app:2").await;
        assert_eq!(locks.active(), 1);
        assert_eq!(locks.locks.lock().unwrap().len(), 1);
    }
}
