//! Program tree output: functions, globals, extern sources, exit codes,
//! and the hardcoded-function contract shared with every back-end.

use upp_util::{ident, Identifier, IndexVec};

use crate::symbols::{SymbolId, TableId};
use crate::types::{CallSignature, SignatureId, SignatureParameter, TypeId, TypeSystem};
use crate::NodeRef;

upp_util::define_idx!(FunctionId);
upp_util::define_idx!(GlobalId);

/// Fixed closed set of hardcoded functions, pre-bound in the builtin
/// module. Back-ends must implement every one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HardcodedKind {
    PrintBool,
    PrintI32,
    PrintF32,
    PrintString,
    PrintLine,
    ReadI32,
    ReadF32,
    ReadBool,
    MemoryCopy,
    MemoryZero,
    MemoryCompare,
    TypeOf,
    TypeInfo,
    Assert,
    Panic,
    SizeOf,
    AlignOf,
    ReturnType,
    StructTag,
    BitwiseNot,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseShiftLeft,
    BitwiseShiftRight,
}

impl HardcodedKind {
    pub const ALL: [HardcodedKind; 25] = [
        HardcodedKind::PrintBool,
        HardcodedKind::PrintI32,
        HardcodedKind::PrintF32,
        HardcodedKind::PrintString,
        HardcodedKind::PrintLine,
        HardcodedKind::ReadI32,
        HardcodedKind::ReadF32,
        HardcodedKind::ReadBool,
        HardcodedKind::MemoryCopy,
        HardcodedKind::MemoryZero,
        HardcodedKind::MemoryCompare,
        HardcodedKind::TypeOf,
        HardcodedKind::TypeInfo,
        HardcodedKind::Assert,
        HardcodedKind::Panic,
        HardcodedKind::SizeOf,
        HardcodedKind::AlignOf,
        HardcodedKind::ReturnType,
        HardcodedKind::StructTag,
        HardcodedKind::BitwiseNot,
        HardcodedKind::BitwiseAnd,
        HardcodedKind::BitwiseOr,
        HardcodedKind::BitwiseXor,
        HardcodedKind::BitwiseShiftLeft,
        HardcodedKind::BitwiseShiftRight,
    ];

    /// Identifier this function is bound to in the builtin module.
    pub fn identifier(self) -> Identifier {
        match self {
            HardcodedKind::PrintBool => ident::ID_PRINT_BOOL,
            HardcodedKind::PrintI32 => ident::ID_PRINT_I32,
            HardcodedKind::PrintF32 => ident::ID_PRINT_F32,
            HardcodedKind::PrintString => ident::ID_PRINT_STRING,
            HardcodedKind::PrintLine => ident::ID_PRINT_LINE,
            HardcodedKind::ReadI32 => ident::ID_READ_I32,
            HardcodedKind::ReadF32 => ident::ID_READ_F32,
            HardcodedKind::ReadBool => ident::ID_READ_BOOL,
            HardcodedKind::MemoryCopy => ident::ID_MEMORY_COPY,
            HardcodedKind::MemoryZero => ident::ID_MEMORY_ZERO,
            HardcodedKind::MemoryCompare => ident::ID_MEMORY_COMPARE,
            HardcodedKind::TypeOf => ident::ID_TYPE_OF,
            HardcodedKind::TypeInfo => ident::ID_TYPE_INFO,
            HardcodedKind::Assert => ident::ID_ASSERT,
            HardcodedKind::Panic => ident::ID_PANIC,
            HardcodedKind::SizeOf => ident::ID_SIZE_OF,
            HardcodedKind::AlignOf => ident::ID_ALIGN_OF,
            HardcodedKind::ReturnType => ident::ID_RETURN_TYPE,
            HardcodedKind::StructTag => ident::ID_STRUCT_TAG,
            HardcodedKind::BitwiseNot => ident::ID_BITWISE_NOT,
            HardcodedKind::BitwiseAnd => ident::ID_BITWISE_AND,
            HardcodedKind::BitwiseOr => ident::ID_BITWISE_OR,
            HardcodedKind::BitwiseXor => ident::ID_BITWISE_XOR,
            HardcodedKind::BitwiseShiftLeft => ident::ID_BITWISE_SHIFT_LEFT,
            HardcodedKind::BitwiseShiftRight => ident::ID_BITWISE_SHIFT_RIGHT,
        }
    }

    /// Fabricate this function's signature at start-up. `names` supplies
    /// the three generic parameter names (`x`, `y`, `z`).
    pub fn make_signature(self, types: &mut TypeSystem, names: [Identifier; 3]) -> SignatureId {
        let [x, y, z] = names;
        let p = types.predefined;
        let param = |name, type_id| SignatureParameter {
            name,
            type_id,
            required: true,
            requires_named_addressing: false,
            must_not_be_set: false,
            default_value: None,
        };
        let u8_slice = types.make_slice(p.u8);
        let address = p.address;
        let signature = match self {
            HardcodedKind::PrintBool => CallSignature {
                parameters: vec![param(x, p.bool_type)],
                return_type: None,
            },
            HardcodedKind::PrintI32 => CallSignature {
                parameters: vec![param(x, p.i32)],
                return_type: None,
            },
            HardcodedKind::PrintF32 => CallSignature {
                parameters: vec![param(x, p.f32)],
                return_type: None,
            },
            HardcodedKind::PrintString => CallSignature {
                parameters: vec![param(x, u8_slice)],
                return_type: None,
            },
            HardcodedKind::PrintLine => CallSignature {
                parameters: vec![],
                return_type: None,
            },
            HardcodedKind::ReadI32 => CallSignature {
                parameters: vec![],
                return_type: Some(p.i32),
            },
            HardcodedKind::ReadF32 => CallSignature {
                parameters: vec![],
                return_type: Some(p.f32),
            },
            HardcodedKind::ReadBool => CallSignature {
                parameters: vec![],
                return_type: Some(p.bool_type),
            },
            HardcodedKind::MemoryCopy => CallSignature {
                parameters: vec![param(x, address), param(y, address), param(z, p.usize)],
                return_type: None,
            },
            HardcodedKind::MemoryZero => CallSignature {
                parameters: vec![param(x, address), param(y, p.usize)],
                return_type: None,
            },
            HardcodedKind::MemoryCompare => CallSignature {
                parameters: vec![param(x, address), param(y, address)],
                return_type: Some(p.bool_type),
            },
            HardcodedKind::TypeOf | HardcodedKind::ReturnType => CallSignature {
                parameters: vec![param(x, p.type_handle)],
                return_type: Some(p.type_handle),
            },
            HardcodedKind::TypeInfo => CallSignature {
                parameters: vec![param(x, p.type_handle)],
                return_type: Some(address),
            },
            HardcodedKind::Assert => CallSignature {
                parameters: vec![param(x, p.bool_type)],
                return_type: None,
            },
            HardcodedKind::Panic => CallSignature {
                parameters: vec![param(x, u8_slice)],
                return_type: None,
            },
            HardcodedKind::SizeOf | HardcodedKind::AlignOf => CallSignature {
                parameters: vec![param(x, p.type_handle)],
                return_type: Some(p.usize),
            },
            HardcodedKind::StructTag => CallSignature {
                parameters: vec![param(x, address)],
                return_type: Some(p.i32),
            },
            HardcodedKind::BitwiseNot => CallSignature {
                parameters: vec![param(x, p.i32)],
                return_type: Some(p.i32),
            },
            HardcodedKind::BitwiseAnd
            | HardcodedKind::BitwiseOr
            | HardcodedKind::BitwiseXor
            | HardcodedKind::BitwiseShiftLeft
            | HardcodedKind::BitwiseShiftRight => CallSignature {
                parameters: vec![param(x, p.i32), param(y, p.i32)],
                return_type: Some(p.i32),
            },
        };
        types.register_signature(signature)
    }
}

/// Exit codes used by generated code. The enumeration is closed; values
/// are densely assigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    OutOfBounds = 1,
    StackOverflow = 2,
    ReturnValueOverflow = 3,
    ExternFunctionCallNotImplemented = 4,
    AssertionFailed = 5,
    CompilationFailed = 6,
    InstructionLimitReached = 7,
    CodeErrorOccured = 8,
    AnyCastInvalid = 9,
    InvalidSwitchCase = 10,
}

impl ExitCode {
    pub const COUNT: i32 = 11;

    pub fn is_valid(value: i32) -> bool {
        (0..Self::COUNT).contains(&value)
    }
}

/// Function kind in the program tree.
#[derive(Clone, Debug)]
pub enum FunctionKind {
    Normal {
        symbol: Option<SymbolId>,
        parameter_table: TableId,
    },
    Bake,
    Extern {
        definition: NodeRef,
    },
}

/// One function of the output program.
#[derive(Clone, Debug)]
pub struct ModTreeFunction {
    pub signature: SignatureId,
    /// Index into the back-end slot table
    pub slot_index: u32,
    pub name: Identifier,
    pub kind: FunctionKind,
    /// Errors inside this function's own body
    pub contains_errors: bool,
    /// This function and everything it calls analysed cleanly
    pub is_runnable: bool,
    pub calls: Vec<FunctionId>,
    pub called_from: Vec<FunctionId>,
}

/// One global of the output program.
#[derive(Clone, Debug)]
pub struct ModTreeGlobal {
    pub type_id: TypeId,
    pub symbol: Option<SymbolId>,
    pub is_extern: bool,
    pub init_expr: Option<NodeRef>,
    /// Back-end memory slot
    pub memory_slot: u32,
}

/// Back-end slot: a stable dense index per function.
#[derive(Clone, Copy, Debug)]
pub struct FunctionSlot {
    pub index: u32,
    pub function: Option<FunctionId>,
}

/// The final output handed to back-ends.
#[derive(Default)]
pub struct ModTreeProgram {
    pub functions: IndexVec<FunctionId, ModTreeFunction>,
    pub globals: IndexVec<GlobalId, ModTreeGlobal>,
    pub function_slots: Vec<FunctionSlot>,
    pub main_function: Option<FunctionId>,
}

impl ModTreeProgram {
    pub fn add_function(
        &mut self,
        signature: SignatureId,
        name: Identifier,
        kind: FunctionKind,
    ) -> FunctionId {
        let slot_index = self.function_slots.len() as u32;
        let id = self.functions.push(ModTreeFunction {
            signature,
            slot_index,
            name,
            kind,
            contains_errors: false,
            is_runnable: false,
            calls: Vec::new(),
            called_from: Vec::new(),
        });
        self.function_slots.push(FunctionSlot {
            index: slot_index,
            function: Some(id),
        });
        id
    }

    pub fn record_call(&mut self, caller: FunctionId, callee: FunctionId) {
        if !self.functions[caller].calls.contains(&callee) {
            self.functions[caller].calls.push(callee);
        }
        if !self.functions[callee].called_from.contains(&caller) {
            self.functions[callee].called_from.push(caller);
        }
    }

    /// A function is runnable iff it and every function it (transitively)
    /// calls analysed without errors. Computed as a fixpoint over the call
    /// graph so cycles (recursion) converge.
    pub fn propagate_runnability(&mut self) {
        for function in self.functions.iter_mut() {
            function.is_runnable = !function.contains_errors;
        }
        let mut changed = true;
        while changed {
            changed = false;
            for caller in self.functions.indices().collect::<Vec<_>>() {
                if !self.functions[caller].is_runnable {
                    continue;
                }
                let has_broken_callee = self.functions[caller]
                    .calls
                    .iter()
                    .any(|&callee| !self.functions[callee].is_runnable);
                if has_broken_callee {
                    self.functions[caller].is_runnable = false;
                    changed = true;
                }
            }
        }
    }
}

/// Extern requirements gathered during analysis, consumed opaquely by
/// back-ends.
#[derive(Default, Debug)]
pub struct ExternSources {
    pub extern_functions: Vec<(Identifier, SignatureId)>,
    pub headers_to_include: Vec<String>,
    pub source_files_to_compile: Vec<String>,
    pub libraries_to_link: Vec<String>,
    pub extern_type_signatures: Vec<SignatureId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_util::IdentifierPool;

    #[test]
    fn exit_codes_are_dense_and_closed() {
        assert!(ExitCode::is_valid(0));
        assert!(ExitCode::is_valid(10));
        assert!(!ExitCode::is_valid(11));
        assert!(!ExitCode::is_valid(-1));
        assert_eq!(ExitCode::InvalidSwitchCase as i32, ExitCode::COUNT - 1);
    }

    #[test]
    fn every_hardcoded_function_gets_a_signature() {
        let pool = IdentifierPool::new();
        let lock = pool.lock();
        let mut types = TypeSystem::new(&pool, &lock);
        let names = [
            pool.add(&lock, "x"),
            pool.add(&lock, "y"),
            pool.add(&lock, "z"),
        ];
        for kind in HardcodedKind::ALL {
            let signature = kind.make_signature(&mut types, names);
            let _ = types.signature(signature);
        }
    }

    #[test]
    fn runnability_propagates_over_cycles() {
        let pool = IdentifierPool::new();
        let lock = pool.lock();
        let mut types = TypeSystem::new(&pool, &lock);
        let name = pool.add(&lock, "f");
        let signature = types.register_signature(CallSignature {
            parameters: vec![],
            return_type: None,
        });
        let mut program = ModTreeProgram::default();
        let table = TableId(0);
        let make = |program: &mut ModTreeProgram| {
            program.add_function(
                signature,
                name,
                FunctionKind::Normal {
                    symbol: None,
                    parameter_table: table,
                },
            )
        };
        let a = make(&mut program);
        let b = make(&mut program);
        let c = make(&mut program);
        // a <-> b recursion, both call broken c
        program.record_call(a, b);
        program.record_call(b, a);
        program.record_call(b, c);
        program.functions[c].contains_errors = true;
        program.propagate_runnability();
        assert!(!program.functions[a].is_runnable);
        assert!(!program.functions[b].is_runnable);
        assert!(!program.functions[c].is_runnable);

        // Without the broken callee, the recursive pair is runnable
        let mut program2 = ModTreeProgram::default();
        let a2 = make(&mut program2);
        let b2 = make(&mut program2);
        program2.record_call(a2, b2);
        program2.record_call(b2, a2);
        program2.propagate_runnability();
        assert!(program2.functions[a2].is_runnable);
        assert!(program2.functions[b2].is_runnable);
    }
}
