use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};

use crate::types::OriginatorId;

pub(crate) struct InstanceState<V> {
    pub(crate) results: Vec<V>,
    /// Set once the finalizer has run. An update that was waiting on the lock
    /// at that point must not touch the instance any more.
    pub(crate) finished: bool,
}

/// One originator's conversation in progress. The accumulated results live
/// behind the instance lock and are only reachable through it.
pub struct Instance<V> {
    originator: OriginatorId,
    started_at: Instant,
    state: Mutex<InstanceState<V>>,
}

impl<V> Instance<V> {
    pub fn new(originator: OriginatorId) -> Self {
        Self {
            originator,
            started_at: Instant::now(),
            state: Mutex::new(InstanceState {
                results: vec![],
                finished: false,
            }),
        }
    }

    pub fn originator(&self) -> OriginatorId {
        self.originator
    }

    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Number of accepted steps. Waits for the instance lock.
    pub async fn progress(&self) -> usize {
        self.state.lock().await.results.len()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, InstanceState<V>> {
        self.state.lock().await
    }
}

/// Storage for in-progress conversations, one entry per originator.
///
/// Implementations must be safe to call from any number of tasks at once.
pub trait InstanceRegistry<V>: Send + Sync {
    fn get(&self, originator: OriginatorId) -> Option<Arc<Instance<V>>>;

    /// Returns the originator's instance, creating an empty one if there is
    /// none. The flag is true when this call created it. Two concurrent calls
    /// for the same originator must end up with the same instance.
    fn get_or_insert(&self, originator: OriginatorId) -> (Arc<Instance<V>>, bool);

    /// Removes the entry if it is still `instance`.
    fn remove(&self, originator: OriginatorId, instance: &Arc<Instance<V>>) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory registry behind a read/write lock. Entries are never expired.
pub struct MemoryRegistry<V> {
    instances: RwLock<HashMap<OriginatorId, Arc<Instance<V>>>>,
}

impl<V> MemoryRegistry<V> {
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Default for MemoryRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send + Sync> InstanceRegistry<V> for MemoryRegistry<V> {
    fn get(&self, originator: OriginatorId) -> Option<Arc<Instance<V>>> {
        self.instances.read().get(&originator).cloned()
    }

    fn get_or_insert(&self, originator: OriginatorId) -> (Arc<Instance<V>>, bool) {
        if let Some(instance) = self.get(originator) {
            return (instance, false);
        }

        let mut instances = self.instances.write();
        if let Some(instance) = instances.get(&originator) {
            return (Arc::clone(instance), false);
        }
        let instance = Arc::new(Instance::new(originator));
        instances.insert(originator, Arc::clone(&instance));
        (instance, true)
    }

    fn remove(&self, originator: OriginatorId, instance: &Arc<Instance<V>>) -> bool {
        let mut instances = self.instances.write();
        match instances.get(&originator) {
            Some(current) if Arc::ptr_eq(current, instance) => {
                instances.remove(&originator);
                true
            }
            _ => false,
        }
    }

    fn len(&self) -> usize {
        self.instances.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_insert_creates_once() {
        let registry = MemoryRegistry::<u32>::new();
        let (first, created) = registry.get_or_insert(OriginatorId(1));
        assert!(created);
        let (second, created) = registry.get_or_insert(OriginatorId(1));
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_ignores_replaced_instance() {
        let registry = MemoryRegistry::<u32>::new();
        let (old, _) = registry.get_or_insert(OriginatorId(1));
        assert!(registry.remove(OriginatorId(1), &old));

        let (fresh, created) = registry.get_or_insert(OriginatorId(1));
        assert!(created);
        assert!(!registry.remove(OriginatorId(1), &old));
        assert!(registry.get(OriginatorId(1)).is_some());
        assert!(registry.remove(OriginatorId(1), &fresh));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_new_instance_has_no_progress() {
        let instance = Instance::<u32>::new(OriginatorId(9));
        assert_eq!(instance.progress().await, 0);
        assert_eq!(instance.originator(), OriginatorId(9));
    }
}
