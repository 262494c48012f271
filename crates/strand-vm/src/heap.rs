//! Object storage.
//!
//! Objects live in an owned `Vec`; a reference is a 1-based index, so
//! restoring a snapshot simply replaces the vector and every object
//! allocated after it disappears with it.

use std::sync::Arc;

use strand_common_core::TypeCode;

use crate::bytecode::ClassId;
use crate::lock::LockState;
use crate::thread::ThreadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjRef(pub u32);

impl ObjRef {
    pub const NULL: Self = Self(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn from_slot(v: u64) -> Self {
        Self(v as u32)
    }

    #[inline]
    pub fn to_slot(self) -> u64 {
        self.0 as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Instance { fields: Vec<u64> },
    Array { elem: TypeCode, data: Vec<u64> },
    /// The class object of `of`, which also holds its static fields.
    Class { of: ClassId, statics: Vec<u64> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeapObject {
    pub class: ClassId,
    pub kind: ObjectKind,
    pub lock: LockState,
    pub creator: ThreadId,
    /// Reachable from more than one thread.
    pub shared: bool,
    /// Message of a throwable.
    pub detail: Option<Arc<str>>,
}

impl HeapObject {
    pub fn fields(&self) -> Option<&[u64]> {
        match &self.kind {
            ObjectKind::Instance { fields } => Some(fields),
            ObjectKind::Class { statics, .. } => Some(statics),
            ObjectKind::Array { .. } => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut Vec<u64>> {
        match &mut self.kind {
            ObjectKind::Instance { fields } => Some(fields),
            ObjectKind::Class { statics, .. } => Some(statics),
            ObjectKind::Array { .. } => None,
        }
    }

    pub fn array(&self) -> Option<&[u64]> {
        match &self.kind {
            ObjectKind::Array { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn array_mut(&mut self) -> Option<&mut Vec<u64>> {
        match &mut self.kind {
            ObjectKind::Array { data, .. } => Some(data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, obj: HeapObject) -> ObjRef {
        self.objects.push(obj);
        ObjRef(self.objects.len() as u32)
    }

    pub fn alloc_instance(&mut self, class: ClassId, field_count: usize, creator: ThreadId) -> ObjRef {
        self.push(HeapObject {
            class,
            kind: ObjectKind::Instance {
                fields: vec![0; field_count],
            },
            lock: LockState::default(),
            creator,
            shared: false,
            detail: None,
        })
    }

    pub fn alloc_array(&mut self, class: ClassId, elem: TypeCode, len: usize, creator: ThreadId) -> ObjRef {
        self.push(HeapObject {
            class,
            kind: ObjectKind::Array {
                elem,
                data: vec![0; len],
            },
            lock: LockState::default(),
            creator,
            shared: false,
            detail: None,
        })
    }

    /// Class objects are visible to every thread from the start.
    pub fn alloc_class_object(&mut self, class_class: ClassId, of: ClassId, statics: usize) -> ObjRef {
        self.push(HeapObject {
            class: class_class,
            kind: ObjectKind::Class {
                of,
                statics: vec![0; statics],
            },
            lock: LockState::default(),
            creator: ThreadId::MAIN,
            shared: true,
            detail: None,
        })
    }

    #[inline]
    pub fn get(&self, r: ObjRef) -> Option<&HeapObject> {
        if r.is_null() {
            return None;
        }
        self.objects.get(r.0 as usize - 1)
    }

    #[inline]
    pub fn get_mut(&mut self, r: ObjRef) -> Option<&mut HeapObject> {
        if r.is_null() {
            return None;
        }
        self.objects.get_mut(r.0 as usize - 1)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &HeapObject)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, o)| (ObjRef(i as u32 + 1), o))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_are_one_based() {
        let mut heap = Heap::new();
        let a = heap.alloc_instance(ClassId(0), 2, ThreadId::MAIN);
        let b = heap.alloc_array(ClassId(0), TypeCode::Int, 3, ThreadId(1));
        assert_eq!(a, ObjRef(1));
        assert_eq!(b, ObjRef(2));
        assert!(heap.get(ObjRef::NULL).is_none());
        assert_eq!(heap.get(a).and_then(|o| o.fields()).map(<[u64]>::len), Some(2));
        assert_eq!(heap.get(b).and_then(|o| o.array()).map(<[u64]>::len), Some(3));
        assert_eq!(heap.get(b).map(|o| o.creator), Some(ThreadId(1)));
        assert!(heap.get(ObjRef(3)).is_none());
    }

    #[test]
    fn test_class_objects_start_shared() {
        let mut heap = Heap::new();
        let c = heap.alloc_class_object(ClassId(1), ClassId(5), 1);
        let obj = heap.get(c).unwrap();
        assert!(obj.shared);
        assert!(matches!(obj.kind, ObjectKind::Class { of: ClassId(5), .. }));
    }
}
