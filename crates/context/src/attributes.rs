use std::any::{Any, TypeId};
use std::collections::HashMap;

use parking_lot::RwLock;

/// A type-keyed heterogeneous bag attached to a request context.
///
/// One value per concrete type `T`; setting a new value of a type already
/// present replaces the old one.
#[derive(Default)]
pub struct AttributeMap {
    values: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Send + Sync + 'static>(&self, value: T) {
        self.values.write().insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.values
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.values.read().contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&self) -> bool {
        self.values.write().remove(&TypeId::of::<T>()).is_some()
    }
}
