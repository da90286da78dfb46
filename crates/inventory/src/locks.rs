use std::collections::HashMap;
use std::sync::Arc;

use common::MaterialId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-material async mutexes.
///
/// Every operation that changes lot quantities of a material holds that
/// material's guard, so at most one writer walks its lots at a time.
#[derive(Clone, Default)]
pub struct MaterialLocks {
    locks: Arc<Mutex<HashMap<MaterialId, Arc<Mutex<()>>>>>,
}

impl MaterialLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `material_id`.
    ///
    /// Entries nobody holds or waits on are dropped on the way, so the map
    /// only tracks materials that are in use.
    pub async fn acquire(&self, material_id: MaterialId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(material_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_material_is_exclusive() {
        let locks = MaterialLocks::new();
        let material = MaterialId::new();

        let guard = locks.acquire(material).await;
        let contender = tokio::time::timeout(Duration::from_millis(50), locks.acquire(material));
        assert!(contender.await.is_err());

        drop(guard);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.acquire(material));
        assert!(again.await.is_ok());
    }

    #[tokio::test]
    async fn released_materials_are_forgotten() {
        let locks = MaterialLocks::new();
        for _ in 0..10 {
            drop(locks.acquire(MaterialId::new()).await);
        }
        assert_eq!(locks.tracked().await, 1);

        let held = MaterialId::new();
        let guard = locks.acquire(held).await;
        drop(locks.acquire(MaterialId::new()).await);
        assert_eq!(locks.tracked().await, 2);

        // the held entry survives pruning and still excludes
        let contender = tokio::time::timeout(Duration::from_millis(50), locks.acquire(held));
        assert!(contender.await.is_err());
        drop(guard);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.acquire(held));
        assert!(again.await.is_ok());
    }

    #[tokio::test]
    async fn different_materials_do_not_block() {
        let locks = MaterialLocks::new();
        let _a = locks.acquire(MaterialId::new()).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire(MaterialId::new()));
        assert!(b.await.is_ok());
    }
}
