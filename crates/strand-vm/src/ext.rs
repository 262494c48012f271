//! Typed extension slots for instructions and methods.
//!
//! Extensions are keyed by their Rust type, so a listener or a code
//! generator can attach its own data without scanning a list of
//! untyped attributes.

use core::any::{Any, TypeId};
use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

type Slot = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Default)]
pub struct Extensions {
    // Most instructions carry nothing; keep the empty case allocation-free.
    map: Option<Box<HashMap<TypeId, Slot>>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self { map: None }
    }

    /// Insert a value, replacing any previous value of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> bool {
        self.map
            .get_or_insert_with(Default::default)
            .insert(TypeId::of::<T>(), Arc::new(value))
            .is_some()
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.map
            .as_ref()?
            .get(&TypeId::of::<T>())
            .and_then(|slot| (**slot).downcast_ref::<T>())
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.map
            .as_ref()
            .map_or(false, |m| m.contains_key(&TypeId::of::<T>()))
    }

    pub fn remove<T: Any + Send + Sync>(&mut self) -> bool {
        let Some(map) = self.map.as_mut() else {
            return false;
        };
        let removed = map.remove(&TypeId::of::<T>()).is_some();
        if map.is_empty() {
            self.map = None;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extensions({})", self.len())
    }
}
