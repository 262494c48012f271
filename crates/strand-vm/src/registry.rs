//! Session-owned method table.

use std::sync::Arc;

use crate::method::{MethodId, MethodInfo};

/// Append-only table of registered methods, indexed by id.
///
/// Each `Program` owns one, so independent interpreter sessions never
/// share ids. Call stubs are never registered.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    methods: Vec<Arc<MethodInfo>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next id to `mi` and freeze it.
    pub fn register(&mut self, mut mi: MethodInfo) -> Arc<MethodInfo> {
        let id = MethodId(self.methods.len() as i32);
        mi.assign_id(id);
        let mi = Arc::new(mi);
        self.methods.push(Arc::clone(&mi));
        mi
    }

    #[inline]
    pub fn get(&self, id: MethodId) -> Option<&Arc<MethodInfo>> {
        self.methods.get(id.index()?)
    }

    pub fn number_of_loaded_methods(&self) -> usize {
        self.methods.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MethodInfo>> {
        self.methods.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_common_core::Modifiers;

    fn plain(name: &str) -> MethodInfo {
        MethodInfo::new(None, name, "()V", 0, 0, Modifiers::STATIC).unwrap()
    }

    #[test]
    fn test_ids_are_dense_and_per_registry() {
        let mut a = MethodRegistry::new();
        let mut b = MethodRegistry::new();
        let f = a.register(plain("f"));
        let g = a.register(plain("g"));
        let h = b.register(plain("h"));

        assert_eq!(f.global_id(), MethodId(0));
        assert_eq!(g.global_id(), MethodId(1));
        assert_eq!(h.global_id(), MethodId(0));
        assert_eq!(a.number_of_loaded_methods(), 2);
        assert_eq!(a.get(MethodId(1)).map(|m| m.name()), Some("g"));
        assert!(a.get(MethodId::DIRECT_CALL).is_none());
    }
}
