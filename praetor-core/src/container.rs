// Shared instance cache for singleton injectables

use crate::error::Result;
use crate::logging::{debug, trace};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

type Slot = Arc<OnceCell<Instance>>;

/// Map from injectable type to its one shared instance.
///
/// Entries are created on first resolution and never evicted. The map lock
/// is only held to fetch a slot; construction runs inside the slot's
/// `OnceCell`, so concurrent first resolutions build the instance once and
/// unrelated types never wait on each other.
#[derive(Clone, Default)]
pub struct SharedInstanceCache {
    slots: Arc<Mutex<HashMap<TypeId, Slot>>>,
}

impl SharedInstanceCache {
    pub fn new() -> Self {
        debug!("Creating shared instance cache");
        Self::default()
    }

    /// Pre-seed an instance. Returns `false` if `T` already has one.
    pub fn insert<T: Send + Sync + 'static>(&self, instance: Arc<T>) -> bool {
        let type_name = std::any::type_name::<T>();
        let inserted = self.slot(TypeId::of::<T>()).set(instance).is_ok();

        if inserted {
            debug!(injectable = type_name, "Shared instance seeded");
        } else {
            trace!(injectable = type_name, "Shared instance already present");
        }
        inserted
    }

    /// The shared instance of `T`, if one exists
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.peek(TypeId::of::<T>())
            .and_then(|instance| instance.downcast::<T>().ok())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.peek(TypeId::of::<T>()).is_some()
    }

    /// Number of initialized entries
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn peek(&self, type_id: TypeId) -> Option<Instance> {
        let slot = self.slots.lock().get(&type_id).cloned()?;
        slot.get().cloned()
    }

    /// Fetch or build the instance for `type_id`. A failed build leaves the
    /// slot empty so a later resolution can retry.
    pub(crate) fn get_or_try_init<F>(&self, type_id: TypeId, init: F) -> Result<Instance>
    where
        F: FnOnce() -> Result<Instance>,
    {
        let slot = self.slot(type_id);
        slot.get_or_try_init(init).cloned()
    }

    fn slot(&self, type_id: TypeId) -> Slot {
        self.slots.lock().entry(type_id).or_default().clone()
    }
}

impl std::fmt::Debug for SharedInstanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedInstanceCache")
            .field("instances", &self.len())
            .finish()
    }
}
