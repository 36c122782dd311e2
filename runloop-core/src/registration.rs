use std::sync::{Arc, Mutex, Weak};

use crate::run_loop::Shared;
use crate::sync::lock;

/// The run loop an entity is currently registered with, if any.
///
/// Only a weak reference is kept: the run loop's tables hold the entity, never the other way
/// around.
#[derive(Debug, Default)]
pub(crate) struct Registration {
    owner: Mutex<Option<Weak<Shared>>>,
}

impl Registration {
    /// The live run loop this entity is registered with.
    pub(crate) fn owner(&self) -> Option<Arc<Shared>> {
        lock(&self.owner).as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn is_owned_by(&self, shared: &Arc<Shared>) -> bool {
        lock(&self.owner).as_ref().is_some_and(|owner| Weak::ptr_eq(owner, &Arc::downgrade(shared)))
    }

    /// Record `shared` as the owner.
    ///
    /// Fails when the entity is registered with another run loop that is still alive.
    pub(crate) fn claim(&self, shared: &Arc<Shared>) -> bool {
        let mut owner = lock(&self.owner);
        match owner.as_ref() {
            Some(current) if current.strong_count() > 0 => {
                Weak::ptr_eq(current, &Arc::downgrade(shared))
            },
            _ => {
                *owner = Some(Arc::downgrade(shared));
                true
            },
        }
    }

    pub(crate) fn release(&self) {
        *lock(&self.owner) = None;
    }
}
