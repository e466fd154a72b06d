//! Constant pool: deduplicated, validated compile-time byte blobs.
//!
//! Every constant's memory is canonicalised before it becomes a dedup key:
//! padding bytes are zeroed, nullable pointers are nulled, and values the
//! pool cannot serialise (non-empty slices, non-null pointers, opaque
//! values, unions, invalid subtype tags) are rejected with a closed error
//! set. Canonicalisation makes the `(type, shallow bytes)` key stable, so
//! structurally equal constants always deduplicate.

use rustc_hash::FxHashMap;
use thiserror::Error;
use upp_util::{Identifier, IndexVec};

use crate::types::{Datatype, TypeId, TypeSystem};

upp_util::define_idx!(ConstantId);

/// A pooled constant: its type plus its slice of the byte arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UppConstant {
    pub type_id: TypeId,
    pub offset: usize,
    pub size: usize,
    pub constant_index: ConstantId,
    /// Set when the constant is an array of values rather than one element
    pub array_size: Option<u64>,
}

/// Pointer made during a deep copy; kept for serialisation.
#[derive(Clone, Copy, Debug)]
pub struct ConstantReference {
    pub constant: ConstantId,
    pub pointer_member_byte_offset: usize,
    pub points_to: ConstantId,
}

/// Function pointer stored inside a constant; kept for serialisation.
#[derive(Clone, Copy, Debug)]
pub struct ConstantFunctionReference {
    pub constant: ConstantId,
    pub offset_from_constant_start: usize,
    pub function_index: u32,
}

/// Closed set of constant-pool failure modes. The pool never panics on
/// user values.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConstantPoolError {
    #[error("memory is not readable as a value of this type")]
    NonReadableMemory,
    #[error("function index {index} is out of bounds")]
    InvalidFunctionIndex { index: u64 },
    #[error("non-null pointer values cannot be stored in constants")]
    NonNullPointer,
    #[error("non-empty slice values cannot be stored in constants")]
    NonEmptySlice,
    #[error("array type has no known element count")]
    UnknownCountArray,
    #[error("opaque values cannot be serialised into the constant pool")]
    AnyTypeValue,
    #[error("union values cannot be stored in constants")]
    UnionValue,
    #[error("invalid subtype tag {tag}")]
    InvalidSubtypeTag { tag: i32 },
}

#[derive(Default)]
pub struct ConstantPool {
    /// Byte arena; constants address it by offset
    memory: Vec<u8>,
    constants: IndexVec<ConstantId, UppConstant>,
    /// Dedup on (type, canonicalised shallow bytes)
    dedup: FxHashMap<(TypeId, Vec<u8>), ConstantId>,
    pub references: Vec<ConstantReference>,
    pub function_references: Vec<ConstantFunctionReference>,
    /// String constants carry the identifier-pool handle of their bytes
    strings: FxHashMap<ConstantId, Identifier>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(&self, id: ConstantId) -> UppConstant {
        self.constants[id]
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn bytes(&self, id: ConstantId) -> &[u8] {
        let constant = self.constants[id];
        &self.memory[constant.offset..constant.offset + constant.size]
    }

    /// Identifier-pool handle behind a string constant, if any.
    pub fn string_id(&self, id: ConstantId) -> Option<Identifier> {
        self.strings.get(&id).copied()
    }

    /// Add a constant after canonicalising its memory.
    ///
    /// `function_count` bounds-checks function-pointer payloads.
    pub fn add_constant(
        &mut self,
        types: &TypeSystem,
        function_count: usize,
        type_id: TypeId,
        bytes: &[u8],
    ) -> Result<ConstantId, ConstantPoolError> {
        let memory = types
            .memory_info(type_id)
            .ok_or(ConstantPoolError::NonReadableMemory)?;
        if bytes.len() as u64 != memory.size {
            return Err(ConstantPoolError::NonReadableMemory);
        }

        let mut canonical = bytes.to_vec();
        let mut covered = vec![false; canonical.len()];
        let mut function_offsets = Vec::new();
        self.canonicalise(
            types,
            function_count,
            type_id,
            0,
            &mut canonical,
            &mut covered,
            &mut function_offsets,
        )?;
        // Zero every byte not covered by a field of the value: padding,
        // unused union/subtype tails, unavailable optional payloads
        for (byte, is_covered) in canonical.iter_mut().zip(&covered) {
            if !is_covered {
                *byte = 0;
            }
        }

        let key = (type_id, canonical.clone());
        if let Some(&existing) = self.dedup.get(&key) {
            return Ok(existing);
        }

        let offset = self.allocate(canonical.len(), memory.alignment as usize);
        self.memory[offset..offset + canonical.len()].copy_from_slice(&canonical);
        let index = self.constants.next_index();
        let id = self.constants.push(UppConstant {
            type_id,
            offset,
            size: canonical.len(),
            constant_index: index,
            array_size: None,
        });
        self.dedup.insert(key, id);
        // Function pointers inside the value are kept for serialisation
        for (offset_from_constant_start, function_index) in function_offsets {
            self.function_references.push(ConstantFunctionReference {
                constant: id,
                offset_from_constant_start,
                function_index: function_index as u32,
            });
        }
        Ok(id)
    }

    /// Store a string constant. The pool keeps the identifier-pool handle
    /// so the bytes stay deduplicated with the pool's copy.
    pub fn add_string_constant(
        &mut self,
        type_id: TypeId,
        string: Identifier,
        byte_length: u64,
    ) -> ConstantId {
        let handle_bytes = string.as_u32().to_le_bytes().to_vec();
        let key = (type_id, handle_bytes.clone());
        if let Some(&existing) = self.dedup.get(&key) {
            return existing;
        }
        let offset = self.allocate(handle_bytes.len(), 4);
        self.memory[offset..offset + handle_bytes.len()].copy_from_slice(&handle_bytes);
        let index = self.constants.next_index();
        let id = self.constants.push(UppConstant {
            type_id,
            offset,
            size: handle_bytes.len(),
            constant_index: index,
            array_size: Some(byte_length),
        });
        self.dedup.insert(key, id);
        self.strings.insert(id, string);
        id
    }

    fn allocate(&mut self, size: usize, alignment: usize) -> usize {
        let alignment = alignment.max(1);
        let offset = self.memory.len().div_ceil(alignment) * alignment;
        self.memory.resize(offset + size, 0);
        offset
    }

    /// Walk the value once: validate it and mark covered bytes. Pointers
    /// that are allowed to exist (nullable) are nulled in place.
    fn canonicalise(
        &mut self,
        types: &TypeSystem,
        function_count: usize,
        type_id: TypeId,
        offset: usize,
        bytes: &mut [u8],
        covered: &mut [bool],
        function_refs: &mut Vec<(usize, u64)>,
    ) -> Result<(), ConstantPoolError> {
        let datatype = types.datatype(type_id).clone();
        match datatype {
            Datatype::Primitive { width, .. } => {
                cover(covered, offset, width as usize);
                Ok(())
            }
            Datatype::Pointer { optional, .. } => {
                let value = read_u64(bytes, offset)?;
                if value != 0 {
                    if optional {
                        write_u64(bytes, offset, 0);
                    } else {
                        return Err(ConstantPoolError::NonNullPointer);
                    }
                }
                cover(covered, offset, 8);
                Ok(())
            }
            Datatype::Optional {
                child,
                available_offset,
            } => {
                let flag_offset = offset + available_offset as usize;
                let available = *bytes
                    .get(flag_offset)
                    .ok_or(ConstantPoolError::NonReadableMemory)?
                    != 0;
                // Canonical flag is exactly 0 or 1
                bytes[flag_offset] = available as u8;
                cover(covered, flag_offset, 1);
                if available {
                    self.canonicalise(types, function_count, child, offset, bytes, covered, function_refs)?;
                }
                Ok(())
            }
            Datatype::Array {
                element,
                count_known,
                element_count,
            } => {
                if !count_known {
                    return Err(ConstantPoolError::UnknownCountArray);
                }
                let element_size = types
                    .memory_info(element)
                    .ok_or(ConstantPoolError::NonReadableMemory)?
                    .size as usize;
                for index in 0..element_count as usize {
                    self.canonicalise(
                        types,
                        function_count,
                        element,
                        offset + index * element_size,
                        bytes,
                        covered,
                        function_refs,
                    )?;
                }
                Ok(())
            }
            Datatype::Slice {
                pub_data_member,
                pub_size_member,
                ..
            } => {
                let data = read_u64(bytes, offset + pub_data_member.offset as usize)?;
                let size = read_u64(bytes, offset + pub_size_member.offset as usize)?;
                if data != 0 || size != 0 {
                    return Err(ConstantPoolError::NonEmptySlice);
                }
                cover(covered, offset + pub_data_member.offset as usize, 8);
                cover(covered, offset + pub_size_member.offset as usize, 8);
                Ok(())
            }
            Datatype::Constant { element } => {
                self.canonicalise(types, function_count, element, offset, bytes, covered, function_refs)
            }
            Datatype::FunctionPointer { optional, .. } => {
                let index = read_u64(bytes, offset)?;
                if index == 0 {
                    if !optional {
                        return Err(ConstantPoolError::InvalidFunctionIndex { index });
                    }
                } else if index as usize > function_count {
                    return Err(ConstantPoolError::InvalidFunctionIndex { index });
                } else {
                    function_refs.push((offset, index));
                }
                cover(covered, offset, 8);
                Ok(())
            }
            Datatype::Struct(struct_type) => {
                if struct_type.is_union {
                    return Err(ConstantPoolError::UnionValue);
                }
                for member in &struct_type.members {
                    self.canonicalise(
                        types,
                        function_count,
                        member.type_id,
                        offset + member.offset as usize,
                        bytes,
                        covered,
                        function_refs,
                    )?;
                }
                if !struct_type.subtypes.is_empty() {
                    let tag_member = struct_type
                        .tag_member
                        .as_ref()
                        .ok_or(ConstantPoolError::NonReadableMemory)?;
                    let tag_offset = offset + tag_member.offset as usize;
                    let tag = read_i32(bytes, tag_offset)?;
                    if tag < 1 || tag as usize > struct_type.subtypes.len() {
                        return Err(ConstantPoolError::InvalidSubtypeTag { tag });
                    }
                    cover(covered, tag_offset, 4);
                    // Only the active subtype's members are meaningful
                    let active = struct_type.subtypes[tag as usize - 1];
                    if let Some(active_struct) = types.struct_type(active) {
                        for member in active_struct.members.clone() {
                            self.canonicalise(
                                types,
                                function_count,
                                member.type_id,
                                offset + member.offset as usize,
                                bytes,
                                covered,
                                function_refs,
                            )?;
                        }
                    }
                }
                Ok(())
            }
            Datatype::Enum(_) => {
                cover(covered, offset, 4);
                Ok(())
            }
            Datatype::PatternVariable { .. }
            | Datatype::StructPattern { .. }
            | Datatype::Unknown
            | Datatype::Invalid => Err(ConstantPoolError::AnyTypeValue),
        }
    }

    // ------------------------------------------------------------------
    // Typed read helpers
    // ------------------------------------------------------------------

    pub fn read_i32(&self, id: ConstantId) -> Option<i32> {
        let bytes = self.bytes(id);
        Some(i32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?))
    }

    pub fn read_i64(&self, id: ConstantId) -> Option<i64> {
        let bytes = self.bytes(id);
        Some(i64::from_le_bytes(bytes.get(0..8)?.try_into().ok()?))
    }

    pub fn read_f32(&self, id: ConstantId) -> Option<f32> {
        let bytes = self.bytes(id);
        Some(f32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?))
    }

    pub fn read_f64(&self, id: ConstantId) -> Option<f64> {
        let bytes = self.bytes(id);
        Some(f64::from_le_bytes(bytes.get(0..8)?.try_into().ok()?))
    }

    pub fn read_bool(&self, id: ConstantId) -> Option<bool> {
        self.bytes(id).first().map(|&b| b != 0)
    }

    pub fn read_u32(&self, id: ConstantId) -> Option<u32> {
        let bytes = self.bytes(id);
        Some(u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?))
    }
}

fn cover(covered: &mut [bool], offset: usize, size: usize) {
    for flag in covered.iter_mut().skip(offset).take(size) {
        *flag = true;
    }
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64, ConstantPoolError> {
    bytes
        .get(offset..offset + 8)
        .and_then(|slice| slice.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or(ConstantPoolError::NonReadableMemory)
}

fn write_u64(bytes: &mut [u8], offset: usize, value: u64) {
    if let Some(slice) = bytes.get_mut(offset..offset + 8) {
        slice.copy_from_slice(&value.to_le_bytes());
    }
}

fn read_i32(bytes: &[u8], offset: usize) -> Result<i32, ConstantPoolError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|slice| slice.try_into().ok())
        .map(i32::from_le_bytes)
        .ok_or(ConstantPoolError::NonReadableMemory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_util::IdentifierPool;

    fn boot() -> (TypeSystem, IdentifierPool, ConstantPool) {
        let pool = IdentifierPool::new();
        let types = {
            let lock = pool.lock();
            TypeSystem::new(&pool, &lock)
        };
        (types, pool, ConstantPool::new())
    }

    #[test]
    fn primitive_constants_deduplicate() {
        let (types, _, mut constants) = boot();
        let i32_type = types.predefined.i32;
        let a = constants
            .add_constant(&types, 0, i32_type, &42i32.to_le_bytes())
            .unwrap();
        let b = constants
            .add_constant(&types, 0, i32_type, &42i32.to_le_bytes())
            .unwrap();
        let c = constants
            .add_constant(&types, 0, i32_type, &7i32.to_le_bytes())
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(constants.read_i32(a), Some(42));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let (types, _, mut constants) = boot();
        let i32_type = types.predefined.i32;
        assert_eq!(
            constants.add_constant(&types, 0, i32_type, &[0u8; 2]),
            Err(ConstantPoolError::NonReadableMemory)
        );
    }

    #[test]
    fn padding_is_zeroed_for_dedup() {
        let (mut types, pool, mut constants) = boot();
        let lock = pool.lock();
        let name = pool.add(&lock, "Padded");
        let id = types.make_struct_empty(name, false, None, None);
        let bool_type = types.predefined.bool_type;
        let i32_type = types.predefined.i32;
        types.struct_add_member(id, pool.add(&lock, "flag"), bool_type, None);
        types.struct_add_member(id, pool.add(&lock, "value"), i32_type, None);
        types.finish_struct(id, &pool, &lock);
        // size 8: flag at 0, 3 padding bytes, value at 4
        let mut with_garbage = vec![1u8, 0xAA, 0xBB, 0xCC, 5, 0, 0, 0];
        let clean = vec![1u8, 0, 0, 0, 5, 0, 0, 0];
        let a = constants
            .add_constant(&types, 0, id, &with_garbage)
            .unwrap();
        with_garbage[1] = 0x11;
        let b = constants
            .add_constant(&types, 0, id, &with_garbage)
            .unwrap();
        let c = constants.add_constant(&types, 0, id, &clean).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(constants.bytes(a), clean.as_slice());
    }

    #[test]
    fn non_null_pointer_rejected_nullable_nulled() {
        let (mut types, _, mut constants) = boot();
        let i32_type = types.predefined.i32;
        let pointer = types.make_pointer(i32_type, false);
        let nullable = types.make_pointer(i32_type, true);
        let non_null = 0xdeadbeefu64.to_le_bytes();
        assert_eq!(
            constants.add_constant(&types, 0, pointer, &non_null),
            Err(ConstantPoolError::NonNullPointer)
        );
        let id = constants
            .add_constant(&types, 0, nullable, &non_null)
            .unwrap();
        assert_eq!(constants.bytes(id), &[0u8; 8]);
    }

    #[test]
    fn non_empty_slice_rejected() {
        let (mut types, _, mut constants) = boot();
        let i32_type = types.predefined.i32;
        let slice = types.make_slice(i32_type);
        let mut bytes = [0u8; 16];
        bytes[8] = 3; // size = 3
        assert_eq!(
            constants.add_constant(&types, 0, slice, &bytes),
            Err(ConstantPoolError::NonEmptySlice)
        );
        assert!(constants.add_constant(&types, 0, slice, &[0u8; 16]).is_ok());
    }

    #[test]
    fn union_value_rejected() {
        let (mut types, pool, mut constants) = boot();
        let lock = pool.lock();
        let name = pool.add(&lock, "U");
        let id = types.make_struct_empty(name, true, None, None);
        let i32_type = types.predefined.i32;
        types.struct_add_member(id, pool.add(&lock, "a"), i32_type, None);
        types.finish_struct(id, &pool, &lock);
        assert_eq!(
            constants.add_constant(&types, 0, id, &[0u8; 4]),
            Err(ConstantPoolError::UnionValue)
        );
    }

    #[test]
    fn subtype_tag_validated() {
        let (mut types, pool, mut constants) = boot();
        let lock = pool.lock();
        let root = types.make_struct_empty(pool.add(&lock, "S"), false, None, None);
        let i32_type = types.predefined.i32;
        types.struct_add_member(root, pool.add(&lock, "x"), i32_type, None);
        let sub = types.make_struct_empty(pool.add(&lock, "A"), false, Some(root), None);
        types.struct_add_member(sub, pool.add(&lock, "y"), i32_type, None);
        types.finish_struct(root, &pool, &lock);
        let size = types.memory_info(root).unwrap().size as usize;
        let tag_offset = types
            .struct_type(root)
            .unwrap()
            .tag_member
            .as_ref()
            .unwrap()
            .offset as usize;

        let mut bytes = vec![0u8; size];
        bytes[tag_offset..tag_offset + 4].copy_from_slice(&9i32.to_le_bytes());
        assert_eq!(
            constants.add_constant(&types, 0, root, &bytes),
            Err(ConstantPoolError::InvalidSubtypeTag { tag: 9 })
        );
        bytes[tag_offset..tag_offset + 4].copy_from_slice(&1i32.to_le_bytes());
        assert!(constants.add_constant(&types, 0, root, &bytes).is_ok());
    }

    #[test]
    fn function_index_bounds_checked() {
        let (mut types, _, mut constants) = boot();
        let signature = types.register_signature(crate::types::CallSignature {
            parameters: vec![],
            return_type: None,
        });
        let fn_pointer = types.make_function_pointer(signature, false);
        let index = 3u64.to_le_bytes();
        assert_eq!(
            constants.add_constant(&types, 2, fn_pointer, &index),
            Err(ConstantPoolError::InvalidFunctionIndex { index: 3 })
        );
        assert!(constants.add_constant(&types, 5, fn_pointer, &index).is_ok());
    }

    #[test]
    fn unavailable_optional_payload_is_zeroed() {
        let (mut types, _, mut constants) = boot();
        let i32_type = types.predefined.i32;
        let optional = types.make_optional(i32_type);
        // payload garbage, is_available = 0
        let dirty = [7u8, 7, 7, 7, 0, 0, 0, 0];
        let id = constants.add_constant(&types, 0, optional, &dirty).unwrap();
        assert_eq!(constants.bytes(id), &[0u8; 8]);
    }

    #[test]
    fn string_constants_point_at_identifier_pool() {
        let (mut types, pool, mut constants) = boot();
        let text = {
            let lock = pool.lock();
            pool.add(&lock, "hello")
        };
        let u8_type = types.predefined.u8;
        let string_type = types.make_slice(u8_type);
        let a = constants.add_string_constant(string_type, text, 5);
        let b = constants.add_string_constant(string_type, text, 5);
        assert_eq!(a, b);
        assert_eq!(constants.string_id(a), Some(text));
    }

    #[test]
    fn canonical_bytes_are_stable_under_rewalk() {
        // Walking the stored memory again changes nothing (property 4)
        let (mut types, pool, mut constants) = boot();
        let lock = pool.lock();
        let name = pool.add(&lock, "P");
        let id = types.make_struct_empty(name, false, None, None);
        let bool_type = types.predefined.bool_type;
        let i64_type = types.predefined.i64;
        types.struct_add_member(id, pool.add(&lock, "f"), bool_type, None);
        types.struct_add_member(id, pool.add(&lock, "v"), i64_type, None);
        types.finish_struct(id, &pool, &lock);
        let mut dirty = vec![0xFFu8; 16];
        dirty[0] = 1;
        let first = constants.add_constant(&types, 0, id, &dirty).unwrap();
        let stored = constants.bytes(first).to_vec();
        let second = constants.add_constant(&types, 0, id, &stored).unwrap();
        assert_eq!(first, second);
        assert_eq!(constants.bytes(second), stored.as_slice());
    }
}
