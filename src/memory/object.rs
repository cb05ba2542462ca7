//! A single allocated memory object: a fixed-size byte range addressed by
//! object-relative offset. Writes are recorded as whole, non-decomposed
//! cells; a new write evicts any cell it overlaps (rather than splitting
//! into bytes and promoting to a byte-array, as the richer reference model
//! does) — the simplification is recorded in the project's design notes.

use crate::ir::{ObjectId, Value};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum MemoryError {
    #[error("out-of-bounds access: offset {offset} + {bytes} bytes exceeds object of size {size}")]
    OutOfBounds { offset: u32, bytes: u32, size: u32 },
    #[error("read of uninitialized memory at offset {offset}")]
    UninitRead { offset: u32 },
    #[error("unsupported memory operation: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Cell {
    offset: u32,
    width_bytes: u32,
    value: Value,
}

#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub id: ObjectId,
    pub size_bytes: u32,
    pub is_global: bool,
    zeroed: bool,
    cells: Vec<Cell>,
}

impl MemoryObject {
    pub fn new(id: ObjectId, size_bytes: u32, is_global: bool, zeroed: bool) -> MemoryObject {
        MemoryObject { id, size_bytes, is_global, zeroed, cells: Vec::new() }
    }

    pub fn write(&mut self, offset: u32, bytes: u32, value: Value) -> Result<(), MemoryError> {
        if offset.checked_add(bytes).map_or(true, |end| end > self.size_bytes) {
            return Err(MemoryError::OutOfBounds { offset, bytes, size: self.size_bytes });
        }
        let end = offset + bytes;
        self.cells.retain(|c| c.offset + c.width_bytes <= offset || c.offset >= end);
        let pos = self.cells.partition_point(|c| c.offset < offset);
        self.cells.insert(pos, Cell { offset, width_bytes: bytes, value });
        Ok(())
    }

    pub fn read(&self, offset: u32, bytes: u32) -> Result<Value, MemoryError> {
        if offset.checked_add(bytes).map_or(true, |end| end > self.size_bytes) {
            return Err(MemoryError::OutOfBounds { offset, bytes, size: self.size_bytes });
        }
        if let Some(cell) = self.cells.iter().find(|c| c.offset == offset && c.width_bytes == bytes) {
            return Ok(cell.value.clone());
        }
        if self.cells.iter().any(|c| c.offset < offset + bytes && c.offset + c.width_bytes > offset) {
            return Err(MemoryError::Unsupported(format!(
                "overlapping read at offset {offset} of {bytes} bytes from object {}",
                self.id.0
            )));
        }
        if self.zeroed {
            return Ok(Value::bv(0, bytes * 8));
        }
        Err(MemoryError::UninitRead { offset })
    }

    pub fn havoc(&mut self) {
        self.cells.clear();
        self.zeroed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_before_any_write_on_zeroed_object_is_zero() {
        let obj = MemoryObject::new(ObjectId(0), 8, false, true);
        assert_eq!(obj.read(0, 4).unwrap(), Value::bv(0, 32));
    }

    #[test]
    fn read_before_any_write_on_non_zeroed_object_is_uninit() {
        let obj = MemoryObject::new(ObjectId(0), 8, false, false);
        assert_eq!(obj.read(0, 4), Err(MemoryError::UninitRead { offset: 0 }));
    }

    #[test]
    fn write_then_read_same_offset_and_width_round_trips() {
        let mut obj = MemoryObject::new(ObjectId(0), 8, false, false);
        obj.write(0, 4, Value::bv(42, 32)).unwrap();
        assert_eq!(obj.read(0, 4).unwrap(), Value::bv(42, 32));
    }

    #[test]
    fn overlapping_write_evicts_prior_cell() {
        let mut obj = MemoryObject::new(ObjectId(0), 8, false, false);
        obj.write(0, 4, Value::bv(1, 32)).unwrap();
        obj.write(2, 4, Value::bv(2, 32)).unwrap();
        assert_eq!(obj.read(2, 4).unwrap(), Value::bv(2, 32));
        assert!(matches!(obj.read(0, 4), Err(MemoryError::Unsupported(_)) | Err(MemoryError::UninitRead { .. })));
    }

    #[test]
    fn out_of_bounds_write_is_rejected() {
        let mut obj = MemoryObject::new(ObjectId(0), 4, false, true);
        assert!(matches!(obj.write(2, 4, Value::bv(0, 32)), Err(MemoryError::OutOfBounds { .. })));
    }
}
