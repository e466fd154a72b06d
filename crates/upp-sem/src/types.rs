//! Type system: construction, deduplication, size finishing, mirroring.
//!
//! All types live in one arena and are addressed by [`TypeId`]. Derived
//! types (pointer, optional, array, slice, constant, function pointer) are
//! structurally deduplicated: constructing the same shape twice yields the
//! same id, so type equality is id equality. Structs and enums are nominal;
//! every declaration allocates a fresh id.
//!
//! A type's `memory_info` may be unknown while its owning struct body is
//! still being analysed. Derived types built on top of an unfinished struct
//! register themselves on that struct's waiting list; `finish_struct`
//! computes the whole subtype tree's layout in one pass and then releases
//! every waiter, so no scheduler round-trip is needed per dependent type.

use upp_util::{
    ident, Identifier, IdentifierPool, IndexVec, PoolLock,
};
use rustc_hash::FxHashMap;

use crate::workload::WorkloadId;
use crate::NodeRef;

upp_util::define_idx!(TypeId);
upp_util::define_idx!(SignatureId);

/// Primitive type class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveClass {
    Int,
    Float,
    Bool,
    Address,
    TypeHandle,
}

/// Size, alignment and content flags of a finished type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryInfo {
    pub size: u64,
    pub alignment: u64,
    pub contains_padding_bytes: bool,
    pub contains_function_pointer: bool,
    pub contains_reference: bool,
}

impl MemoryInfo {
    pub fn plain(size: u64, alignment: u64) -> Self {
        Self {
            size,
            alignment,
            contains_padding_bytes: false,
            contains_function_pointer: false,
            contains_reference: false,
        }
    }
}

/// One struct member with its resolved offset.
#[derive(Clone, Debug)]
pub struct StructMember {
    pub id: Identifier,
    pub type_id: TypeId,
    pub offset: u64,
    pub declaring_struct: TypeId,
    pub definition_node: Option<NodeRef>,
}

/// Struct (or union) type. Subtypes form a tree that shares the root's
/// memory layout plus a single tag member.
#[derive(Clone, Debug)]
pub struct StructType {
    pub name: Identifier,
    pub is_union: bool,
    pub parent: Option<TypeId>,
    /// Index of this subtype in its parent's subtype list, 1-based as
    /// stored in the tag; 0 for the root
    pub subtype_index: u32,
    pub members: Vec<StructMember>,
    pub subtypes: Vec<TypeId>,
    pub tag_member: Option<StructMember>,
    pub tag_enum: Option<TypeId>,
    /// Body workload that will finish this struct, if analysis is pending
    pub body_workload: Option<WorkloadId>,
    pub finished: bool,
    /// Derived types waiting for this struct's size
    pub waiting_for_size_finish: Vec<TypeId>,
}

/// One enum member.
#[derive(Clone, Debug)]
pub struct EnumMemberDef {
    pub id: Identifier,
    pub value: i64,
}

#[derive(Clone, Debug)]
pub struct EnumType {
    pub name: Identifier,
    pub members: Vec<EnumMemberDef>,
    /// Member values form `start, start+1, ...`, enabling O(1) tag lookup
    pub values_are_sequential: bool,
    pub sequence_start_value: i64,
    pub finished: bool,
}

/// The type sum. Derived variants are deduplicated; struct/enum/pattern
/// variants are unique per declaration.
#[derive(Clone, Debug)]
pub enum Datatype {
    Primitive {
        name: Identifier,
        class: PrimitiveClass,
        signed: bool,
        /// Width in bytes
        width: u8,
    },
    Pointer {
        element: TypeId,
        optional: bool,
    },
    Optional {
        child: TypeId,
        /// Offset of the `is_available` flag; valid once finished
        available_offset: u64,
    },
    Array {
        element: TypeId,
        count_known: bool,
        element_count: u64,
    },
    Slice {
        element: TypeId,
        pub_data_member: StructMember,
        pub_size_member: StructMember,
    },
    Constant {
        element: TypeId,
    },
    FunctionPointer {
        signature: SignatureId,
        optional: bool,
    },
    Struct(StructType),
    Enum(EnumType),
    /// Polymorphic header binding. The first occurrence in a header defines
    /// the variable; `mirror` is the paired reference type used by later
    /// occurrences.
    PatternVariable {
        id: Identifier,
        is_reference: bool,
        mirror: TypeId,
    },
    /// Structural match against a polymorphic struct's base
    StructPattern {
        base_struct: TypeId,
    },
    Unknown,
    Invalid,
}

/// Parameter of a registered call signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SignatureParameter {
    pub name: Identifier,
    pub type_id: TypeId,
    pub required: bool,
    pub requires_named_addressing: bool,
    pub must_not_be_set: bool,
    pub default_value: Option<NodeRef>,
}

/// A deduplicated call signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallSignature {
    pub parameters: Vec<SignatureParameter>,
    pub return_type: Option<TypeId>,
}

/// Structural dedup key for derived types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum TypeKey {
    Pointer(TypeId, bool),
    Optional(TypeId),
    Array(TypeId, bool, u64),
    Slice(TypeId),
    Constant(TypeId),
    FunctionPointer(SignatureId, bool),
}

struct TypeEntry {
    datatype: Datatype,
    memory: Option<MemoryInfo>,
    /// Root struct whose finish will provide this type's memory info
    memory_source: Option<TypeId>,
    mirror_index: Option<u32>,
}

/// Internal (runtime-visible) mirror of one type, consumed by comptime
/// reflection. Layout contract: `{ type_handle: u32, size: i32,
/// alignment: i32, tag + subtype payload }`.
#[derive(Clone, Debug, PartialEq)]
pub struct InternalTypeInfo {
    pub type_handle: u32,
    pub size: i32,
    pub alignment: i32,
    pub payload: InternalTypePayload,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InternalTypePayload {
    Primitive { class: PrimitiveClass, signed: bool },
    Pointer { element: u32, optional: bool },
    Optional { child: u32 },
    Array { element: u32, element_count: u64 },
    Slice { element: u32 },
    Constant { element: u32 },
    FunctionPointer { optional: bool },
    Struct { member_count: u32, subtype_count: u32, is_union: bool },
    Enum { member_count: u32 },
    Other,
}

/// Handles to the types created at boot.
#[derive(Clone, Copy, Debug)]
pub struct PredefinedTypes {
    pub unknown: TypeId,
    pub invalid: TypeId,
    pub bool_type: TypeId,
    pub i8: TypeId,
    pub i16: TypeId,
    pub i32: TypeId,
    pub i64: TypeId,
    pub u8: TypeId,
    pub u16: TypeId,
    pub u32: TypeId,
    pub u64: TypeId,
    pub usize: TypeId,
    pub isize: TypeId,
    pub f32: TypeId,
    pub f64: TypeId,
    pub address: TypeId,
    pub type_handle: TypeId,
}

pub struct TypeSystem {
    entries: IndexVec<TypeId, TypeEntry>,
    dedup: FxHashMap<TypeKey, TypeId>,
    signatures: IndexVec<SignatureId, CallSignature>,
    signature_dedup: FxHashMap<CallSignature, SignatureId>,
    pub internal_infos: Vec<InternalTypeInfo>,
    pub predefined: PredefinedTypes,
}

const POINTER_SIZE: u64 = 8;

impl TypeSystem {
    pub fn new(pool: &IdentifierPool, lock: &PoolLock<'_>) -> Self {
        let mut system = Self {
            entries: IndexVec::new(),
            dedup: FxHashMap::default(),
            signatures: IndexVec::new(),
            signature_dedup: FxHashMap::default(),
            internal_infos: Vec::new(),
            predefined: PredefinedTypes {
                unknown: TypeId(0),
                invalid: TypeId(0),
                bool_type: TypeId(0),
                i8: TypeId(0),
                i16: TypeId(0),
                i32: TypeId(0),
                i64: TypeId(0),
                u8: TypeId(0),
                u16: TypeId(0),
                u32: TypeId(0),
                u64: TypeId(0),
                usize: TypeId(0),
                isize: TypeId(0),
                f32: TypeId(0),
                f64: TypeId(0),
                address: TypeId(0),
                type_handle: TypeId(0),
            },
        };

        let name = |text: &str| pool.add(lock, text);

        system.predefined.unknown = system.push_entry(Datatype::Unknown, Some(MemoryInfo::plain(0, 1)));
        system.predefined.invalid = system.push_entry(Datatype::Invalid, Some(MemoryInfo::plain(0, 1)));

        let mut primitive = |system: &mut TypeSystem,
                             text: &str,
                             class: PrimitiveClass,
                             signed: bool,
                             width: u8| {
            system.make_primitive(name(text), class, signed, width)
        };
        system.predefined.bool_type = primitive(&mut system, "bool", PrimitiveClass::Bool, false, 1);
        system.predefined.i8 = primitive(&mut system, "i8", PrimitiveClass::Int, true, 1);
        system.predefined.i16 = primitive(&mut system, "i16", PrimitiveClass::Int, true, 2);
        system.predefined.i32 = primitive(&mut system, "i32", PrimitiveClass::Int, true, 4);
        system.predefined.i64 = primitive(&mut system, "i64", PrimitiveClass::Int, true, 8);
        system.predefined.u8 = primitive(&mut system, "u8", PrimitiveClass::Int, false, 1);
        system.predefined.u16 = primitive(&mut system, "u16", PrimitiveClass::Int, false, 2);
        system.predefined.u32 = primitive(&mut system, "u32", PrimitiveClass::Int, false, 4);
        system.predefined.u64 = primitive(&mut system, "u64", PrimitiveClass::Int, false, 8);
        system.predefined.usize = primitive(&mut system, "usize", PrimitiveClass::Int, false, 8);
        system.predefined.isize = primitive(&mut system, "isize", PrimitiveClass::Int, true, 8);
        system.predefined.f32 = primitive(&mut system, "f32", PrimitiveClass::Float, true, 4);
        system.predefined.f64 = primitive(&mut system, "f64", PrimitiveClass::Float, true, 8);
        system.predefined.address =
            primitive(&mut system, "address", PrimitiveClass::Address, false, 8);
        system.predefined.type_handle =
            primitive(&mut system, "Type_Handle", PrimitiveClass::TypeHandle, false, 4);
        system
    }

    fn push_entry(&mut self, datatype: Datatype, memory: Option<MemoryInfo>) -> TypeId {
        let id = self.entries.push(TypeEntry {
            datatype,
            memory,
            memory_source: None,
            mirror_index: None,
        });
        self.mirror_type(id);
        id
    }

    pub fn datatype(&self, id: TypeId) -> &Datatype {
        &self.entries[id].datatype
    }

    pub fn memory_info(&self, id: TypeId) -> Option<MemoryInfo> {
        self.entries[id].memory
    }

    /// Root struct that will provide this type's memory info when finished.
    pub fn memory_source(&self, id: TypeId) -> Option<TypeId> {
        self.entries[id].memory_source
    }

    pub fn type_count(&self) -> usize {
        self.entries.len()
    }

    pub fn all_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.entries.indices()
    }

    pub fn signature(&self, id: SignatureId) -> &CallSignature {
        &self.signatures[id]
    }

    /// Strip one `Constant` layer.
    pub fn without_constant(&self, id: TypeId) -> TypeId {
        match self.datatype(id) {
            Datatype::Constant { element } => *element,
            _ => id,
        }
    }

    /// Base type after removing all pointer and constant layers.
    /// Returns (base, pointer_level).
    pub fn base_type(&self, id: TypeId) -> (TypeId, u32) {
        let mut current = self.without_constant(id);
        let mut level = 0;
        loop {
            match self.datatype(current) {
                Datatype::Pointer { element, .. } => {
                    level += 1;
                    current = self.without_constant(*element);
                }
                _ => return (current, level),
            }
        }
    }

    pub fn is_unknown(&self, id: TypeId) -> bool {
        matches!(self.datatype(id), Datatype::Unknown | Datatype::Invalid)
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Unique per call; used only during boot.
    pub fn make_primitive(
        &mut self,
        name: Identifier,
        class: PrimitiveClass,
        signed: bool,
        width: u8,
    ) -> TypeId {
        let memory = MemoryInfo::plain(width as u64, width as u64);
        self.push_entry(
            Datatype::Primitive {
                name,
                class,
                signed,
                width,
            },
            Some(memory),
        )
    }

    pub fn make_pointer(&mut self, element: TypeId, optional: bool) -> TypeId {
        let key = TypeKey::Pointer(element, optional);
        if let Some(&existing) = self.dedup.get(&key) {
            return existing;
        }
        let mut memory = MemoryInfo::plain(POINTER_SIZE, POINTER_SIZE);
        memory.contains_reference = true;
        let id = self.push_entry(Datatype::Pointer { element, optional }, Some(memory));
        self.dedup.insert(key, id);
        id
    }

    /// Optional of a pointer collapses into an optional pointer.
    pub fn make_optional(&mut self, child: TypeId) -> TypeId {
        if let Datatype::Pointer { element, .. } = *self.datatype(child) {
            return self.make_pointer(element, true);
        }
        let key = TypeKey::Optional(child);
        if let Some(&existing) = self.dedup.get(&key) {
            return existing;
        }
        let (memory, available_offset) = match self.memory_info(child) {
            Some(child_memory) => {
                let available_offset = child_memory.size;
                let size = round_up(available_offset + 1, child_memory.alignment.max(1));
                let mut memory = MemoryInfo::plain(size, child_memory.alignment.max(1));
                memory.contains_padding_bytes =
                    child_memory.contains_padding_bytes || size > available_offset + 1;
                memory.contains_function_pointer = child_memory.contains_function_pointer;
                memory.contains_reference = child_memory.contains_reference;
                (Some(memory), available_offset)
            }
            None => (None, 0),
        };
        let id = self.push_entry(
            Datatype::Optional {
                child,
                available_offset,
            },
            memory,
        );
        self.dedup.insert(key, id);
        if memory.is_none() {
            self.register_waiting(child, id);
        }
        id
    }

    /// Array of `Constant(T)` is stored as `Constant(Array(T))`.
    pub fn make_array(&mut self, element: TypeId, count_known: bool, element_count: u64) -> TypeId {
        if let Datatype::Constant { element: inner } = *self.datatype(element) {
            let array = self.make_array(inner, count_known, element_count);
            return self.make_constant(array);
        }
        let key = TypeKey::Array(element, count_known, element_count);
        if let Some(&existing) = self.dedup.get(&key) {
            return existing;
        }
        let memory = if !count_known {
            // Placeholder until a real length is known
            Some(MemoryInfo::plain(1, 1))
        } else {
            self.memory_info(element).map(|element_memory| {
                let mut memory = MemoryInfo::plain(
                    element_memory.size * element_count,
                    element_memory.alignment.max(1),
                );
                memory.contains_padding_bytes = element_memory.contains_padding_bytes;
                memory.contains_function_pointer = element_memory.contains_function_pointer;
                memory.contains_reference = element_memory.contains_reference;
                memory
            })
        };
        let id = self.push_entry(
            Datatype::Array {
                element,
                count_known,
                element_count,
            },
            memory,
        );
        self.dedup.insert(key, id);
        if count_known && memory.is_none() {
            self.register_waiting(element, id);
        }
        id
    }

    /// Slice layout is `{ data: *?element, size: usize }`.
    pub fn make_slice(&mut self, element: TypeId) -> TypeId {
        let key = TypeKey::Slice(element);
        if let Some(&existing) = self.dedup.get(&key) {
            return existing;
        }
        let data_pointer = self.make_pointer(element, true);
        let slice_id = self.entries.next_index();
        let data_member = StructMember {
            id: ident::ID_DATA,
            type_id: data_pointer,
            offset: 0,
            declaring_struct: slice_id,
            definition_node: None,
        };
        let size_member = StructMember {
            id: ident::ID_SIZE,
            type_id: self.predefined.usize,
            offset: POINTER_SIZE,
            declaring_struct: slice_id,
            definition_node: None,
        };
        let mut memory = MemoryInfo::plain(POINTER_SIZE * 2, POINTER_SIZE);
        memory.contains_reference = true;
        let id = self.push_entry(
            Datatype::Slice {
                element,
                pub_data_member: data_member,
                pub_size_member: size_member,
            },
            Some(memory),
        );
        debug_assert_eq!(id, slice_id);
        self.dedup.insert(key, id);
        id
    }

    /// Idempotent at the outer layer.
    pub fn make_constant(&mut self, element: TypeId) -> TypeId {
        if matches!(self.datatype(element), Datatype::Constant { .. }) {
            return element;
        }
        let key = TypeKey::Constant(element);
        if let Some(&existing) = self.dedup.get(&key) {
            return existing;
        }
        let memory = self.memory_info(element);
        let id = self.push_entry(Datatype::Constant { element }, memory);
        self.dedup.insert(key, id);
        if memory.is_none() {
            self.register_waiting(element, id);
        }
        id
    }

    pub fn make_function_pointer(&mut self, signature: SignatureId, optional: bool) -> TypeId {
        let key = TypeKey::FunctionPointer(signature, optional);
        if let Some(&existing) = self.dedup.get(&key) {
            return existing;
        }
        let mut memory = MemoryInfo::plain(POINTER_SIZE, POINTER_SIZE);
        memory.contains_function_pointer = true;
        let id = self.push_entry(
            Datatype::FunctionPointer {
                signature,
                optional,
            },
            Some(memory),
        );
        self.dedup.insert(key, id);
        id
    }

    /// Register (deduplicate) a call signature.
    pub fn register_signature(&mut self, signature: CallSignature) -> SignatureId {
        if let Some(&existing) = self.signature_dedup.get(&signature) {
            return existing;
        }
        let id = self.signatures.push(signature.clone());
        self.signature_dedup.insert(signature, id);
        id
    }

    /// Always fresh; structs are nominal.
    pub fn make_struct_empty(
        &mut self,
        name: Identifier,
        is_union: bool,
        parent: Option<TypeId>,
        body_workload: Option<WorkloadId>,
    ) -> TypeId {
        let subtype_index = match parent {
            Some(parent_id) => match &self.entries[parent_id].datatype {
                Datatype::Struct(parent_struct) => parent_struct.subtypes.len() as u32 + 1,
                _ => 0,
            },
            None => 0,
        };
        let id = self.push_entry(
            Datatype::Struct(StructType {
                name,
                is_union,
                parent,
                subtype_index,
                members: Vec::new(),
                subtypes: Vec::new(),
                tag_member: None,
                tag_enum: None,
                body_workload,
                finished: false,
                waiting_for_size_finish: Vec::new(),
            }),
            None,
        );
        if let Some(parent_id) = parent {
            if let Datatype::Struct(parent_struct) = &mut self.entries[parent_id].datatype {
                parent_struct.subtypes.push(id);
            }
        }
        id
    }

    /// Append a member. Forbidden after finish.
    pub fn struct_add_member(
        &mut self,
        struct_id: TypeId,
        id: Identifier,
        type_id: TypeId,
        definition_node: Option<NodeRef>,
    ) {
        let member = StructMember {
            id,
            type_id,
            offset: 0,
            declaring_struct: struct_id,
            definition_node,
        };
        match &mut self.entries[struct_id].datatype {
            Datatype::Struct(struct_type) => {
                assert!(
                    !struct_type.finished,
                    "struct_add_member after finish_struct"
                );
                struct_type.members.push(member);
            }
            _ => panic!("struct_add_member on non-struct type"),
        }
    }

    pub fn struct_type(&self, id: TypeId) -> Option<&StructType> {
        match self.datatype(id) {
            Datatype::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn enum_type(&self, id: TypeId) -> Option<&EnumType> {
        match self.datatype(id) {
            Datatype::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Mark a struct as owned by an analysis workload so size requests can
    /// await that workload.
    pub fn struct_body_workload(&self, id: TypeId) -> Option<WorkloadId> {
        self.struct_type(id).and_then(|s| s.body_workload)
    }

    pub fn set_struct_body_workload(&mut self, id: TypeId, workload: WorkloadId) {
        if let Datatype::Struct(struct_type) = &mut self.entries[id].datatype {
            struct_type.body_workload = Some(workload);
        }
    }

    fn register_waiting(&mut self, dependency: TypeId, waiter: TypeId) {
        // Find the root struct responsible for the dependency's size
        let source = match self.entries[dependency].memory_source {
            Some(source) => source,
            None => {
                let root = self.struct_root(dependency);
                match root {
                    Some(root) => root,
                    // Dependency has no pending owner; leave the waiter
                    // with unknown memory (it stays Invalid/Unknown-sized)
                    None => return,
                }
            }
        };
        self.entries[waiter].memory_source = Some(source);
        if let Datatype::Struct(struct_type) = &mut self.entries[source].datatype {
            struct_type.waiting_for_size_finish.push(waiter);
        }
    }

    /// Root of a struct's subtype tree, or the struct itself.
    pub fn struct_root(&self, id: TypeId) -> Option<TypeId> {
        let mut current = id;
        loop {
            match self.datatype(current) {
                Datatype::Struct(struct_type) => match struct_type.parent {
                    Some(parent) => current = parent,
                    None => return Some(current),
                },
                _ => return None,
            }
        }
    }

    // ------------------------------------------------------------------
    // Size finishing
    // ------------------------------------------------------------------

    /// Compute the layout of a whole struct tree in one pass: alignment,
    /// member offsets, subtype layout, tag enum, padding flags. The
    /// result is distributed to every subtype, then every queued derived
    /// type is finished and the tree is mirrored.
    pub fn finish_struct(&mut self, root: TypeId, pool: &IdentifierPool, lock: &PoolLock<'_>) {
        debug_assert!(
            self.struct_type(root)
                .map(|s| s.parent.is_none())
                .unwrap_or(false),
            "finish_struct takes the tree root"
        );

        let mut contains_padding = false;
        let mut contains_function_pointer = false;
        let mut contains_reference = false;

        let alignment = self.struct_tree_alignment(root).max(1);

        // Lay out the root's own members
        let (root_end, root_is_union) = {
            let struct_type = match self.struct_type(root) {
                Some(s) => s,
                None => return,
            };
            (0, struct_type.is_union)
        };
        let mut offset = self.layout_members(
            root,
            root_end,
            root_is_union,
            &mut contains_padding,
            &mut contains_function_pointer,
            &mut contains_reference,
        );

        // Lay out subtypes, all starting at the same aligned offset
        let subtypes = self
            .struct_type(root)
            .map(|s| s.subtypes.clone())
            .unwrap_or_default();
        let mut tag_member = None;
        let mut tag_enum = None;
        if !subtypes.is_empty() {
            let subtype_alignment = subtypes
                .iter()
                .map(|&sub| self.struct_tree_alignment(sub))
                .max()
                .unwrap_or(1)
                .max(1);
            let subtype_start = round_up(offset, subtype_alignment);
            if subtype_start > offset {
                contains_padding = true;
            }
            let mut tail = subtype_start;
            for &subtype in &subtypes {
                let is_union = self
                    .struct_type(subtype)
                    .map(|s| s.is_union)
                    .unwrap_or(false);
                let end = self.layout_members(
                    subtype,
                    subtype_start,
                    is_union,
                    &mut contains_padding,
                    &mut contains_function_pointer,
                    &mut contains_reference,
                );
                tail = tail.max(end);
            }
            if subtypes.iter().any(|&sub| {
                self.struct_type(sub)
                    .map(|s| !s.members.is_empty())
                    .unwrap_or(false)
            }) && subtypes.len() > 1
            {
                // Divergent subtype layouts leave unused tail bytes
                contains_padding = true;
            }

            // Tag enum member, values 1..=n, aligned after the subtypes
            let root_name = self.struct_type(root).map(|s| s.name);
            let members: Vec<EnumMemberDef> = subtypes
                .iter()
                .enumerate()
                .map(|(index, &sub)| EnumMemberDef {
                    id: self
                        .struct_type(sub)
                        .map(|s| s.name)
                        .unwrap_or(ident::ID_TAG),
                    value: index as i64 + 1,
                })
                .collect();
            let enum_id = self.make_enum(
                root_name.unwrap_or_else(|| pool.add(lock, "tag")),
                members,
            );
            let tag_memory = self.memory_info(enum_id).unwrap_or(MemoryInfo::plain(4, 4));
            let tag_offset = round_up(tail, tag_memory.alignment);
            if tag_offset > tail {
                contains_padding = true;
            }
            tag_member = Some(StructMember {
                id: ident::ID_TAG,
                type_id: enum_id,
                offset: tag_offset,
                declaring_struct: root,
                definition_node: None,
            });
            tag_enum = Some(enum_id);
            offset = tag_offset + tag_memory.size;
        }

        let size = round_up(offset, alignment);
        if size > offset {
            contains_padding = true;
        }
        // Empty struct: size 0, alignment 1
        let memory = MemoryInfo {
            size,
            alignment,
            contains_padding_bytes: contains_padding,
            contains_function_pointer,
            contains_reference,
        };

        // Distribute the result down the tree; subtypes share the layout
        let mut tree = vec![root];
        tree.extend(subtypes.iter().copied());
        for &member_id in &tree {
            self.entries[member_id].memory = Some(memory);
            self.entries[member_id].memory_source = None;
            if let Datatype::Struct(struct_type) = &mut self.entries[member_id].datatype {
                struct_type.finished = true;
                struct_type.body_workload = None;
                struct_type.tag_member = tag_member.clone();
                struct_type.tag_enum = tag_enum;
            }
        }

        // Release derived types queued on any subtype's waiting list
        let mut waiting = Vec::new();
        for &member_id in &tree {
            if let Datatype::Struct(struct_type) = &mut self.entries[member_id].datatype {
                waiting.append(&mut struct_type.waiting_for_size_finish);
            }
        }
        for waiter in waiting {
            self.finish_derived(waiter);
        }

        // Mirror the whole tree for comptime reflection
        for &member_id in &tree {
            self.mirror_type(member_id);
        }
    }

    /// Max alignment over a struct's member types and subtype trees.
    fn struct_tree_alignment(&self, id: TypeId) -> u64 {
        let struct_type = match self.struct_type(id) {
            Some(s) => s,
            None => return 1,
        };
        let mut alignment = 1;
        for member in &struct_type.members {
            if let Some(memory) = self.memory_info(member.type_id) {
                alignment = alignment.max(memory.alignment);
            }
        }
        for &subtype in &struct_type.subtypes {
            alignment = alignment.max(self.struct_tree_alignment(subtype));
        }
        alignment
    }

    /// Lay out one struct's members starting at `start`. Union members all
    /// sit at `start`; size widens to the largest member. Returns the end
    /// offset.
    fn layout_members(
        &mut self,
        id: TypeId,
        start: u64,
        is_union: bool,
        contains_padding: &mut bool,
        contains_function_pointer: &mut bool,
        contains_reference: &mut bool,
    ) -> u64 {
        let member_types: Vec<TypeId> = self
            .struct_type(id)
            .map(|s| s.members.iter().map(|m| m.type_id).collect())
            .unwrap_or_default();
        let mut offsets = Vec::with_capacity(member_types.len());
        let mut offset = start;
        let mut union_end = start;
        for type_id in &member_types {
            let memory = self
                .memory_info(*type_id)
                .unwrap_or(MemoryInfo::plain(0, 1));
            *contains_function_pointer |= memory.contains_function_pointer;
            *contains_reference |= memory.contains_reference;
            if memory.contains_padding_bytes {
                *contains_padding = true;
            }
            if is_union {
                offsets.push(start);
                union_end = union_end.max(start + memory.size);
            } else {
                let aligned = round_up(offset, memory.alignment.max(1));
                if aligned > offset {
                    *contains_padding = true;
                }
                offsets.push(aligned);
                offset = aligned + memory.size;
            }
        }
        if is_union && member_types.len() > 1 {
            // Widening smaller members leaves unused bytes
            *contains_padding = true;
        }
        if let Datatype::Struct(struct_type) = &mut self.entries[id].datatype {
            for (member, member_offset) in struct_type.members.iter_mut().zip(offsets) {
                member.offset = member_offset;
            }
        }
        if is_union {
            union_end
        } else {
            offset
        }
    }

    /// Finish one derived type (array, constant, optional) once its element
    /// type has memory info.
    fn finish_derived(&mut self, id: TypeId) {
        let datatype = self.entries[id].datatype.clone();
        match datatype {
            Datatype::Array {
                element,
                count_known: true,
                element_count,
            } => {
                if let Some(element_memory) = self.memory_info(element) {
                    let mut memory = MemoryInfo::plain(
                        element_memory.size * element_count,
                        element_memory.alignment.max(1),
                    );
                    memory.contains_padding_bytes = element_memory.contains_padding_bytes;
                    memory.contains_function_pointer = element_memory.contains_function_pointer;
                    memory.contains_reference = element_memory.contains_reference;
                    self.entries[id].memory = Some(memory);
                    self.entries[id].memory_source = None;
                }
            }
            Datatype::Constant { element } => {
                if let Some(memory) = self.memory_info(element) {
                    self.entries[id].memory = Some(memory);
                    self.entries[id].memory_source = None;
                }
            }
            Datatype::Optional { child, .. } => {
                if let Some(child_memory) = self.memory_info(child) {
                    let available_offset = child_memory.size;
                    let alignment = child_memory.alignment.max(1);
                    let size = round_up(available_offset + 1, alignment);
                    let mut memory = MemoryInfo::plain(size, alignment);
                    memory.contains_padding_bytes =
                        child_memory.contains_padding_bytes || size > available_offset + 1;
                    memory.contains_function_pointer = child_memory.contains_function_pointer;
                    memory.contains_reference = child_memory.contains_reference;
                    self.entries[id].memory = Some(memory);
                    self.entries[id].memory_source = None;
                    if let Datatype::Optional {
                        available_offset: stored,
                        ..
                    } = &mut self.entries[id].datatype
                    {
                        *stored = available_offset;
                    }
                }
            }
            _ => {}
        }
        self.mirror_type(id);
    }

    // ------------------------------------------------------------------
    // Enums
    // ------------------------------------------------------------------

    pub fn make_enum_empty(&mut self, name: Identifier) -> TypeId {
        self.push_entry(
            Datatype::Enum(EnumType {
                name,
                members: Vec::new(),
                values_are_sequential: false,
                sequence_start_value: 0,
                finished: false,
            }),
            None,
        )
    }

    pub fn enum_add_member(&mut self, enum_id: TypeId, id: Identifier, value: i64) {
        match &mut self.entries[enum_id].datatype {
            Datatype::Enum(enum_type) => {
                assert!(!enum_type.finished, "enum_add_member after finish_enum");
                enum_type.members.push(EnumMemberDef { id, value });
            }
            _ => panic!("enum_add_member on non-enum type"),
        }
    }

    /// Computes memory info and the sequential flag.
    pub fn finish_enum(&mut self, enum_id: TypeId) {
        match &mut self.entries[enum_id].datatype {
            Datatype::Enum(enum_type) => {
                let start = enum_type.members.first().map(|m| m.value).unwrap_or(0);
                enum_type.values_are_sequential = enum_type
                    .members
                    .iter()
                    .enumerate()
                    .all(|(index, member)| member.value == start + index as i64);
                enum_type.sequence_start_value = start;
                enum_type.finished = true;
            }
            _ => panic!("finish_enum on non-enum type"),
        }
        self.entries[enum_id].memory = Some(MemoryInfo::plain(4, 4));
        self.mirror_type(enum_id);
    }

    /// Create and finish an enum in one step.
    pub fn make_enum(&mut self, name: Identifier, members: Vec<EnumMemberDef>) -> TypeId {
        let id = self.make_enum_empty(name);
        for member in members {
            self.enum_add_member(id, member.id, member.value);
        }
        self.finish_enum(id);
        id
    }

    // ------------------------------------------------------------------
    // Pattern variables
    // ------------------------------------------------------------------

    /// Create a pattern variable and its paired reference mirror. The
    /// returned id is the defining occurrence; its `mirror` references.
    pub fn make_pattern_variable(&mut self, id: Identifier) -> TypeId {
        let defining = self.entries.next_index();
        let mirror = TypeId(defining.0 + 1);
        let defining_actual = self.push_entry(
            Datatype::PatternVariable {
                id,
                is_reference: false,
                mirror,
            },
            Some(MemoryInfo::plain(0, 1)),
        );
        let mirror_actual = self.push_entry(
            Datatype::PatternVariable {
                id,
                is_reference: true,
                mirror: defining_actual,
            },
            Some(MemoryInfo::plain(0, 1)),
        );
        debug_assert_eq!(defining, defining_actual);
        debug_assert_eq!(mirror, mirror_actual);
        defining_actual
    }

    pub fn make_struct_pattern(&mut self, base_struct: TypeId) -> TypeId {
        self.push_entry(
            Datatype::StructPattern { base_struct },
            Some(MemoryInfo::plain(0, 1)),
        )
    }

    // ------------------------------------------------------------------
    // Reflection mirror
    // ------------------------------------------------------------------

    /// Write or update the internal type-information mirror for one type.
    fn mirror_type(&mut self, id: TypeId) {
        let entry = &self.entries[id];
        let (size, alignment) = entry
            .memory
            .map(|m| (m.size as i32, m.alignment as i32))
            .unwrap_or((-1, -1));
        let payload = match &entry.datatype {
            Datatype::Primitive { class, signed, .. } => InternalTypePayload::Primitive {
                class: *class,
                signed: *signed,
            },
            Datatype::Pointer { element, optional } => InternalTypePayload::Pointer {
                element: element.0,
                optional: *optional,
            },
            Datatype::Optional { child, .. } => InternalTypePayload::Optional { child: child.0 },
            Datatype::Array {
                element,
                element_count,
                ..
            } => InternalTypePayload::Array {
                element: element.0,
                element_count: *element_count,
            },
            Datatype::Slice { element, .. } => {
                InternalTypePayload::Slice { element: element.0 }
            }
            Datatype::Constant { element } => {
                InternalTypePayload::Constant { element: element.0 }
            }
            Datatype::FunctionPointer { optional, .. } => {
                InternalTypePayload::FunctionPointer { optional: *optional }
            }
            Datatype::Struct(struct_type) => InternalTypePayload::Struct {
                member_count: struct_type.members.len() as u32,
                subtype_count: struct_type.subtypes.len() as u32,
                is_union: struct_type.is_union,
            },
            Datatype::Enum(enum_type) => InternalTypePayload::Enum {
                member_count: enum_type.members.len() as u32,
            },
            Datatype::PatternVariable { .. }
            | Datatype::StructPattern { .. }
            | Datatype::Unknown
            | Datatype::Invalid => InternalTypePayload::Other,
        };
        let info = InternalTypeInfo {
            type_handle: id.0,
            size,
            alignment,
            payload,
        };
        match self.entries[id].mirror_index {
            Some(index) => self.internal_infos[index as usize] = info,
            None => {
                let index = self.internal_infos.len() as u32;
                self.internal_infos.push(info);
                self.entries[id].mirror_index = Some(index);
            }
        }
    }
}

impl TypeSystem {
    /// Human-readable form of a type, used by diagnostics and dumps.
    pub fn format_type(&self, id: TypeId, pool: &IdentifierPool) -> String {
        match self.datatype(id) {
            Datatype::Primitive { name, .. } => pool.get(*name).to_string(),
            Datatype::Pointer { element, optional } => {
                let sigil = if *optional { "*?" } else { "*" };
                format!("{sigil}{}", self.format_type(*element, pool))
            }
            Datatype::Optional { child, .. } => {
                format!("?{}", self.format_type(*child, pool))
            }
            Datatype::Array {
                element,
                count_known,
                element_count,
            } => {
                if *count_known {
                    format!("[{element_count}]{}", self.format_type(*element, pool))
                } else {
                    format!("[?]{}", self.format_type(*element, pool))
                }
            }
            Datatype::Slice { element, .. } => {
                format!("[]{}", self.format_type(*element, pool))
            }
            Datatype::Constant { element } => self.format_type(*element, pool),
            Datatype::FunctionPointer { signature, .. } => {
                let signature = self.signature(*signature);
                let parameters: Vec<String> = signature
                    .parameters
                    .iter()
                    .map(|p| self.format_type(p.type_id, pool))
                    .collect();
                let return_text = signature
                    .return_type
                    .map(|r| self.format_type(r, pool))
                    .unwrap_or_else(|| "()".to_string());
                format!("({}) -> {return_text}", parameters.join(", "))
            }
            Datatype::Struct(struct_type) => pool.get(struct_type.name).to_string(),
            Datatype::Enum(enum_type) => pool.get(enum_type.name).to_string(),
            Datatype::PatternVariable { id, is_reference, .. } => {
                if *is_reference {
                    pool.get(*id).to_string()
                } else {
                    format!("${}", pool.get(*id))
                }
            }
            Datatype::StructPattern { base_struct } => self.format_type(*base_struct, pool),
            Datatype::Unknown => "<unknown>".to_string(),
            Datatype::Invalid => "<invalid>".to_string(),
        }
    }
}

fn round_up(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_util::IdentifierPool;

    fn boot() -> (TypeSystem, IdentifierPool) {
        let pool = IdentifierPool::new();
        let system = {
            let lock = pool.lock();
            TypeSystem::new(&pool, &lock)
        };
        (system, pool)
    }

    #[test]
    fn derived_types_are_deduplicated() {
        let (mut types, _) = boot();
        let i32_type = types.predefined.i32;
        assert_eq!(
            types.make_pointer(i32_type, false),
            types.make_pointer(i32_type, false)
        );
        assert_eq!(types.make_slice(i32_type), types.make_slice(i32_type));
        assert_eq!(
            types.make_array(i32_type, true, 4),
            types.make_array(i32_type, true, 4)
        );
        assert_ne!(
            types.make_pointer(i32_type, false),
            types.make_pointer(i32_type, true)
        );
    }

    #[test]
    fn constant_is_idempotent() {
        let (mut types, _) = boot();
        let i32_type = types.predefined.i32;
        let constant = types.make_constant(i32_type);
        assert_eq!(types.make_constant(constant), constant);
    }

    #[test]
    fn array_of_constant_is_constant_of_array() {
        let (mut types, _) = boot();
        let i32_type = types.predefined.i32;
        let constant = types.make_constant(i32_type);
        let array = types.make_array(constant, true, 3);
        match types.datatype(array) {
            Datatype::Constant { element } => {
                assert!(matches!(types.datatype(*element), Datatype::Array { .. }));
            }
            other => panic!("expected Constant(Array), got {other:?}"),
        }
    }

    #[test]
    fn optional_pointer_collapses() {
        let (mut types, _) = boot();
        let i32_type = types.predefined.i32;
        let pointer = types.make_pointer(i32_type, false);
        let optional = types.make_optional(pointer);
        assert_eq!(optional, types.make_pointer(i32_type, true));
    }

    #[test]
    fn pointer_levels_are_significant() {
        let (mut types, _) = boot();
        let i32_type = types.predefined.i32;
        let one = types.make_pointer(i32_type, false);
        let two = types.make_pointer(one, false);
        assert_ne!(one, two);
        let (base, level) = types.base_type(two);
        assert_eq!(base, i32_type);
        assert_eq!(level, 2);
    }

    #[test]
    fn optional_layout() {
        let (mut types, _) = boot();
        let i32_type = types.predefined.i32;
        let optional = types.make_optional(i32_type);
        let memory = types.memory_info(optional).unwrap();
        // { value: i32, is_available: bool } rounded to alignment 4
        assert_eq!(memory.size, 8);
        assert_eq!(memory.alignment, 4);
        assert!(memory.contains_padding_bytes);
        match types.datatype(optional) {
            Datatype::Optional {
                available_offset, ..
            } => assert_eq!(*available_offset, 4),
            _ => panic!(),
        }
    }

    #[test]
    fn slice_layout() {
        let (mut types, _) = boot();
        let i32_type = types.predefined.i32;
        let slice = types.make_slice(i32_type);
        let memory = types.memory_info(slice).unwrap();
        assert_eq!(memory.size, 16);
        assert_eq!(memory.alignment, 8);
        assert!(memory.contains_reference);
        match types.datatype(slice) {
            Datatype::Slice {
                pub_data_member,
                pub_size_member,
                ..
            } => {
                assert_eq!(pub_data_member.offset, 0);
                assert_eq!(pub_size_member.offset, 8);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn unknown_count_array_placeholder() {
        let (mut types, _) = boot();
        let i32_type = types.predefined.i32;
        let array = types.make_array(i32_type, false, 0);
        let memory = types.memory_info(array).unwrap();
        assert_eq!(memory.size, 1);
        assert_eq!(memory.alignment, 1);
    }

    #[test]
    fn empty_struct_layout() {
        let (mut types, pool) = boot();
        let lock = pool.lock();
        let name = pool.add(&lock, "Empty");
        let id = types.make_struct_empty(name, false, None, None);
        types.finish_struct(id, &pool, &lock);
        let memory = types.memory_info(id).unwrap();
        assert_eq!(memory.size, 0);
        assert_eq!(memory.alignment, 1);
    }

    #[test]
    fn struct_layout_with_padding() {
        let (mut types, pool) = boot();
        let lock = pool.lock();
        let name = pool.add(&lock, "Mixed");
        let a = pool.add(&lock, "a");
        let b = pool.add(&lock, "b");
        let id = types.make_struct_empty(name, false, None, None);
        let bool_type = types.predefined.bool_type;
        let i64_type = types.predefined.i64;
        types.struct_add_member(id, a, bool_type, None);
        types.struct_add_member(id, b, i64_type, None);
        types.finish_struct(id, &pool, &lock);
        let memory = types.memory_info(id).unwrap();
        assert_eq!(memory.alignment, 8);
        assert_eq!(memory.size, 16);
        assert!(memory.contains_padding_bytes);
        let struct_type = types.struct_type(id).unwrap();
        assert_eq!(struct_type.members[0].offset, 0);
        assert_eq!(struct_type.members[1].offset, 8);
    }

    #[test]
    fn union_members_share_offset() {
        let (mut types, pool) = boot();
        let lock = pool.lock();
        let name = pool.add(&lock, "Either");
        let a = pool.add(&lock, "a");
        let b = pool.add(&lock, "b");
        let id = types.make_struct_empty(name, true, None, None);
        let i32_type = types.predefined.i32;
        let i64_type = types.predefined.i64;
        types.struct_add_member(id, a, i32_type, None);
        types.struct_add_member(id, b, i64_type, None);
        types.finish_struct(id, &pool, &lock);
        let struct_type = types.struct_type(id).unwrap();
        assert_eq!(struct_type.members[0].offset, 0);
        assert_eq!(struct_type.members[1].offset, 0);
        assert_eq!(types.memory_info(id).unwrap().size, 8);
    }

    #[test]
    fn subtype_tree_shares_layout_and_tag() {
        let (mut types, pool) = boot();
        let lock = pool.lock();
        let shape = pool.add(&lock, "Shape");
        let circle = pool.add(&lock, "Circle");
        let rect = pool.add(&lock, "Rect");
        let field = pool.add(&lock, "x");

        let root = types.make_struct_empty(shape, false, None, None);
        let f32_type = types.predefined.f32;
        types.struct_add_member(root, field, f32_type, None);
        let sub_a = types.make_struct_empty(circle, false, Some(root), None);
        types.struct_add_member(sub_a, pool.add(&lock, "radius"), f32_type, None);
        let sub_b = types.make_struct_empty(rect, false, Some(root), None);
        types.struct_add_member(sub_b, pool.add(&lock, "w"), f32_type, None);
        types.struct_add_member(sub_b, pool.add(&lock, "h"), f32_type, None);

        types.finish_struct(root, &pool, &lock);

        let root_memory = types.memory_info(root).unwrap();
        // Every subtype shares the root's memory info
        assert_eq!(types.memory_info(sub_a), Some(root_memory));
        assert_eq!(types.memory_info(sub_b), Some(root_memory));

        let root_struct = types.struct_type(root).unwrap();
        let tag = root_struct.tag_member.clone().unwrap();
        // Tag fits inside the struct
        assert!(tag.offset + 4 <= root_memory.size);
        // Tag enum is sequential starting at 1
        let tag_enum = types.enum_type(root_struct.tag_enum.unwrap()).unwrap();
        assert!(tag_enum.values_are_sequential);
        assert_eq!(tag_enum.sequence_start_value, 1);
        assert_eq!(tag_enum.members.len(), 2);
        // Subtype members start after the root members, at a shared offset
        let a_struct = types.struct_type(sub_a).unwrap();
        let b_struct = types.struct_type(sub_b).unwrap();
        assert_eq!(a_struct.members[0].offset, 4);
        assert_eq!(b_struct.members[0].offset, 4);
        assert_eq!(b_struct.members[1].offset, 8);
        assert_eq!(root_memory.size % root_memory.alignment, 0);
    }

    #[test]
    fn waiting_types_finish_with_struct() {
        let (mut types, pool) = boot();
        let lock = pool.lock();
        let name = pool.add(&lock, "Late");
        let id = types.make_struct_empty(name, false, None, None);
        // Derived types built before the struct is finished
        let array = types.make_array(id, true, 2);
        let constant = types.make_constant(id);
        let optional = types.make_optional(id);
        assert!(types.memory_info(array).is_none());
        assert!(types.memory_info(constant).is_none());
        assert!(types.memory_info(optional).is_none());

        let i32_type = types.predefined.i32;
        types.struct_add_member(id, pool.add(&lock, "x"), i32_type, None);
        types.finish_struct(id, &pool, &lock);

        assert_eq!(types.memory_info(array).unwrap().size, 8);
        assert_eq!(types.memory_info(constant).unwrap().size, 4);
        assert_eq!(types.memory_info(optional).unwrap().size, 8);
    }

    #[test]
    fn enum_sequential_flag() {
        let (mut types, pool) = boot();
        let lock = pool.lock();
        let make_member = |pool: &IdentifierPool, lock: &upp_util::PoolLock<'_>, n: &str, v| {
            EnumMemberDef {
                id: pool.add(lock, n),
                value: v,
            }
        };
        let sequential = types.make_enum(
            pool.add(&lock, "Seq"),
            vec![
                make_member(&pool, &lock, "A", 3),
                make_member(&pool, &lock, "B", 4),
                make_member(&pool, &lock, "C", 5),
            ],
        );
        assert!(types.enum_type(sequential).unwrap().values_are_sequential);
        assert_eq!(
            types.enum_type(sequential).unwrap().sequence_start_value,
            3
        );
        let sparse = types.make_enum(
            pool.add(&lock, "Sparse"),
            vec![
                make_member(&pool, &lock, "A", 1),
                make_member(&pool, &lock, "B", 5),
            ],
        );
        assert!(!types.enum_type(sparse).unwrap().values_are_sequential);
    }

    #[test]
    fn pattern_variables_pair_with_mirror() {
        let (mut types, pool) = boot();
        let lock = pool.lock();
        let id = pool.add(&lock, "T");
        let defining = types.make_pattern_variable(id);
        let Datatype::PatternVariable {
            is_reference: false,
            mirror,
            ..
        } = *types.datatype(defining)
        else {
            panic!("expected defining pattern variable");
        };
        let Datatype::PatternVariable {
            is_reference: true,
            mirror: back,
            ..
        } = *types.datatype(mirror)
        else {
            panic!("expected mirror pattern variable");
        };
        assert_eq!(back, defining);
    }

    #[test]
    fn mirror_tracks_sizes() {
        let (mut types, pool) = boot();
        let lock = pool.lock();
        let name = pool.add(&lock, "M");
        let id = types.make_struct_empty(name, false, None, None);
        let i32_type = types.predefined.i32;
        types.struct_add_member(id, pool.add(&lock, "x"), i32_type, None);
        types.finish_struct(id, &pool, &lock);
        let info = types
            .internal_infos
            .iter()
            .find(|info| info.type_handle == id.0)
            .unwrap();
        assert_eq!(info.size, 4);
        assert_eq!(info.alignment, 4);
        assert!(matches!(
            info.payload,
            InternalTypePayload::Struct {
                member_count: 1,
                ..
            }
        ));
    }

    #[test]
    fn formats_types() {
        let (mut types, pool) = boot();
        let i32_type = types.predefined.i32;
        let pointer = types.make_pointer(i32_type, true);
        let slice = types.make_slice(pointer);
        assert_eq!(types.format_type(slice, &pool), "[]*?i32");
        let array = types.make_array(i32_type, true, 4);
        assert_eq!(types.format_type(array, &pool), "[4]i32");
    }

    #[test]
    fn signatures_deduplicate() {
        let (mut types, pool) = boot();
        let lock = pool.lock();
        let x = pool.add(&lock, "x");
        let i32_type = types.predefined.i32;
        let make = |types: &mut TypeSystem| {
            types.register_signature(CallSignature {
                parameters: vec![SignatureParameter {
                    name: x,
                    type_id: i32_type,
                    required: true,
                    requires_named_addressing: false,
                    must_not_be_set: false,
                    default_value: None,
                }],
                return_type: Some(i32_type),
            })
        };
        assert_eq!(make(&mut types), make(&mut types));
    }
}
