//! The memory model collaborator: allocation, byte-addressed read/write, and
//! havoc (used when a write target can't be resolved precisely). A `State`
//! owns one `Memory` value and clones it wholesale on every branch, so reads
//! and writes never need to consult anything outside the clone.

mod object;

pub use object::{MemoryError, MemoryObject};

use crate::ir::ObjectId;
use crate::ir::Value;

/// Allocates and accesses memory objects. The reference implementation below
/// is byte-addressed and eager — every allocation is materialized
/// immediately, with no lazy/symbolic-size support.
pub trait MemoryModel {
    fn allocate(&mut self, size_bytes: u32, is_global: bool, zeroed: bool) -> ObjectId;
    fn read(&self, object: ObjectId, offset: u32, bytes: u32) -> Result<Value, MemoryError>;
    fn write(&mut self, object: ObjectId, offset: u32, bytes: u32, value: Value) -> Result<(), MemoryError>;
    /// Clears all recorded contents of `objects`, or of every live object
    /// when `objects` is empty — used when a write target can't be resolved
    /// to a single concrete object.
    fn havoc(&mut self, objects: &[ObjectId]);
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceMemory {
    objects: Vec<MemoryObject>,
}

impl ReferenceMemory {
    pub fn new() -> ReferenceMemory {
        ReferenceMemory::default()
    }

    fn object(&self, id: ObjectId) -> &MemoryObject {
        &self.objects[id.0 as usize]
    }

    fn object_mut(&mut self, id: ObjectId) -> &mut MemoryObject {
        &mut self.objects[id.0 as usize]
    }
}

impl MemoryModel for ReferenceMemory {
    fn allocate(&mut self, size_bytes: u32, is_global: bool, zeroed: bool) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(MemoryObject::new(id, size_bytes, is_global, zeroed));
        id
    }

    fn read(&self, object: ObjectId, offset: u32, bytes: u32) -> Result<Value, MemoryError> {
        self.object(object).read(offset, bytes)
    }

    fn write(&mut self, object: ObjectId, offset: u32, bytes: u32, value: Value) -> Result<(), MemoryError> {
        self.object_mut(object).write(offset, bytes, value)
    }

    fn havoc(&mut self, objects: &[ObjectId]) {
        if objects.is_empty() {
            for obj in &mut self.objects {
                obj.havoc();
            }
        } else {
            for id in objects {
                self.object_mut(*id).havoc();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_allocations_get_distinct_ids() {
        let mut mem = ReferenceMemory::new();
        let a = mem.allocate(8, false, true);
        let b = mem.allocate(8, false, true);
        assert_ne!(a, b);
    }

    #[test]
    fn havoc_of_one_object_does_not_affect_siblings() {
        let mut mem = ReferenceMemory::new();
        let a = mem.allocate(4, false, false);
        let b = mem.allocate(4, false, false);
        mem.write(a, 0, 4, Value::bv(1, 32)).unwrap();
        mem.write(b, 0, 4, Value::bv(2, 32)).unwrap();
        mem.havoc(&[a]);
        assert!(mem.read(a, 0, 4).is_err());
        assert_eq!(mem.read(b, 0, 4).unwrap(), Value::bv(2, 32));
    }
}
