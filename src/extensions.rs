//! Typed plugin state attached to the simulation context
//!
//! Each type occupies at most one slot. Plugins store their own state here
//! instead of reaching into the context's fields.

use std::any::{Any, TypeId};
use std::collections::HashMap;

#[derive(Default)]
pub struct Extensions {
    slots: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the one it replaces.
    pub fn insert<T: Any + Send>(&mut self, value: T) -> Option<T> {
        self.slots
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.slots.get(&TypeId::of::<T>()).and_then(|b| b.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.slots.get_mut(&TypeId::of::<T>()).and_then(|b| b.downcast_mut::<T>())
    }

    pub fn remove<T: Any + Send>(&mut self) -> Option<T> {
        self.slots
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn contains<T: Any + Send>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions").field("slots", &self.slots.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    #[test]
    fn test_slots_are_per_type() {
        let mut ext = Extensions::new();
        assert!(ext.insert(Counter(1)).is_none());
        assert!(ext.insert(5u64).is_none());
        assert_eq!(ext.insert(Counter(2)), Some(Counter(1)));
        assert_eq!(ext.get::<Counter>(), Some(&Counter(2)));
        assert_eq!(ext.get::<u64>(), Some(&5));
        assert!(!ext.contains::<String>());
    }

    #[test]
    fn test_remove_empties_slot() {
        let mut ext = Extensions::new();
        ext.insert(Counter(3));
        if let Some(c) = ext.get_mut::<Counter>() {
            c.0 += 1;
        }
        assert_eq!(ext.remove::<Counter>(), Some(Counter(4)));
        assert!(ext.get_mut::<Counter>().is_none());
    }
}
