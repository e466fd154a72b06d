//! Analysis passes and per-pass node information.
//!
//! One AST node can be analysed several times under different polymorphic
//! value sets; each attempt is an [`AnalysisPass`]. Results are stored in
//! a table keyed by `(node, pass)`, so instance analyses never clobber the
//! base analysis and the editor layer can query every pass of a node.

use rustc_hash::FxHashMap;
use upp_util::IndexVec;

use upp_par::NodeId;

use crate::comptime::BakeId;
use crate::constants::ConstantId;
use crate::operators::CastMode;
use crate::poly::PolyHeaderId;
use crate::program::{FunctionId, GlobalId, HardcodedKind};
use crate::symbols::{SymbolId, TableId};
use crate::types::{SignatureId, TypeId};
use crate::workload::WorkloadId;
use crate::NodeRef;

upp_util::define_idx!(PassId);

/// Identity of one analysis attempt on a subtree.
#[derive(Clone, Copy, Debug)]
pub struct AnalysisPass {
    pub origin_workload: WorkloadId,
}

/// The caller's expectation for an expression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExpressionContext {
    /// No information
    Unknown { due_to_error: bool },
    /// A value is wanted at pointer level 0 (member access bases etc.)
    AutoDereference,
    /// A specific type, with the strongest cast mode allowed to reach it
    SpecificType {
        expected: TypeId,
        cast_mode: CastMode,
    },
}

/// Kind of conversion applied to reach the context's expectation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastType {
    NoCast,
    IntegerWiden,
    IntegerToFloat,
    FloatWiden,
    PointerLevel,
    ToOptional,
    ArrayToSlice,
    FunctionToAddress,
    EnumToInt,
    Custom,
    Unknown,
    Invalid,
}

/// Implicit conversion applied to an expression; dereferences happen
/// before the cast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CastInfo {
    pub initial_type: TypeId,
    pub result_type: TypeId,
    /// Negative means address-of
    pub deref_count: i32,
    pub cast: CastType,
    pub custom_cast_function: Option<FunctionId>,
    /// Set exactly when the cast is invalid
    pub error: Option<&'static str>,
}

impl CastInfo {
    pub fn identity(type_id: TypeId) -> Self {
        Self {
            initial_type: type_id,
            result_type: type_id,
            deref_count: 0,
            cast: CastType::NoCast,
            custom_cast_function: None,
            error: None,
        }
    }
}

/// Pre-context result of an expression.
#[derive(Clone, Debug)]
pub enum ExpressionResult {
    Value {
        type_id: TypeId,
        is_temporary: bool,
    },
    Type(TypeId),
    Constant(ConstantId),
    Function(FunctionId),
    DotCall {
        first_argument: NodeRef,
        overloads: Vec<FunctionId>,
    },
    Hardcoded(HardcodedKind),
    PolymorphicFunction(PolyHeaderId),
    PolymorphicStruct(PolyHeaderId),
    Module(TableId),
    /// Calls of functions without a return value
    Nothing,
}

impl ExpressionResult {
    /// The value type of this result, before the context is applied.
    pub fn value_type(&self, unknown: TypeId) -> TypeId {
        match self {
            ExpressionResult::Value { type_id, .. } => *type_id,
            ExpressionResult::Type(_) => unknown,
            _ => unknown,
        }
    }
}

/// Side-table payload of special expression shapes.
#[derive(Clone, Debug, Default)]
pub enum ExpressionSpecifics {
    #[default]
    None,
    MemberAccess {
        member_index: u32,
        member_type: TypeId,
        struct_type: TypeId,
    },
    Overload {
        function: Option<FunctionId>,
        switch_left_and_right: bool,
    },
    BitwisePrimitive {
        type_id: TypeId,
    },
    OptionalPointerCheck,
}

#[derive(Clone, Debug)]
pub struct ExpressionInfo {
    pub result: ExpressionResult,
    pub context: ExpressionContext,
    pub cast_info: CastInfo,
    pub specifics: ExpressionSpecifics,
    /// Whether this expression itself (non-recursively) analysed cleanly
    pub is_valid: bool,
}

impl ExpressionInfo {
    /// Result type after the context's cast has been applied.
    pub fn result_type(&self) -> TypeId {
        self.cast_info.result_type
    }
}

/// How control leaves a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlFlow {
    /// A sequential path exists; some paths may stop or return
    Sequential,
    /// Execution never continues past this statement
    Stops,
    /// All paths return
    Returns,
}

/// Iterator functions bound to a foreach loop by a custom operator.
#[derive(Clone, Copy, Debug)]
pub struct IteratorFunctions {
    pub create: FunctionId,
    pub has_next: FunctionId,
    pub next: FunctionId,
    pub get_value: FunctionId,
}

#[derive(Clone, Debug, Default)]
pub enum StatementSpecifics {
    #[default]
    None,
    /// Deferred blocks emitted at this exit, innermost-first (LIFO)
    Return {
        deferred_blocks: Vec<NodeId>,
    },
    Break {
        deferred_blocks: Vec<NodeId>,
    },
    Continue {
        deferred_blocks: Vec<NodeId>,
    },
    ForeachLoop {
        symbol_table: TableId,
        loop_variable: SymbolId,
        index_variable: Option<SymbolId>,
        iterator: Option<IteratorFunctions>,
    },
    Switch {
        base_enum: Option<TypeId>,
    },
}

#[derive(Clone, Debug)]
pub struct StatementInfo {
    pub flow: ControlFlow,
    pub specifics: StatementSpecifics,
}

#[derive(Clone, Debug)]
pub struct CodeBlockInfo {
    pub symbol_table: TableId,
    pub flow: ControlFlow,
    /// Defer statements seen in this block, in source order
    pub deferred: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct CaseInfo {
    pub is_valid: bool,
    pub case_value: i64,
}

/// What a call expression resolved to.
#[derive(Clone, Copy, Debug)]
pub enum CallTarget {
    Function(FunctionId),
    FunctionPointer(SignatureId),
    Hardcoded(HardcodedKind),
    DotCall(FunctionId),
    PolymorphicFunction(PolyHeaderId),
    PolymorphicStruct(PolyHeaderId),
}

/// One parameter of a call being matched against its arguments.
#[derive(Clone, Debug)]
pub struct ParameterMatch {
    pub name: upp_util::Identifier,
    /// None while the parameter type depends on other parameters
    pub param_type: Option<TypeId>,
    pub required: bool,
    pub requires_named_addressing: bool,
    pub must_not_be_set: bool,
    pub argument: Option<NodeRef>,
    pub argument_type: Option<TypeId>,
    pub is_set: bool,
}

#[derive(Clone, Debug)]
pub struct ParameterMatchingInfo {
    pub matched: Vec<ParameterMatch>,
    pub target: CallTarget,
    pub has_return_value: bool,
    pub return_type: Option<TypeId>,
}

/// Per-pass analysis result of one node.
#[derive(Clone, Debug)]
pub enum AnalysisInfo {
    Expression(ExpressionInfo),
    Statement(StatementInfo),
    CodeBlock(CodeBlockInfo),
    Case(CaseInfo),
    ParameterMatching(ParameterMatchingInfo),
    Parameter { symbol: SymbolId },
    DefinitionSymbol { symbol: SymbolId },
    SymbolLookup { symbol: Option<SymbolId> },
    Module { table: TableId },
}

/// All pass-keyed analysis results, plus the creation memos that make
/// workload re-runs after a suspension idempotent.
#[derive(Default)]
pub struct AnalysisData {
    pub passes: IndexVec<PassId, AnalysisPass>,
    info: FxHashMap<(NodeRef, PassId), AnalysisInfo>,
    node_passes: FxHashMap<NodeRef, Vec<PassId>>,

    // Creation memos: a workload that re-runs after a suspension must
    // observe its earlier creations instead of repeating them
    pub functions_by_node: FxHashMap<(NodeRef, PassId), FunctionId>,
    pub globals_by_node: FxHashMap<(NodeRef, PassId), GlobalId>,
    pub structs_by_node: FxHashMap<(NodeRef, PassId), TypeId>,
    pub headers_by_node: FxHashMap<(NodeRef, PassId), PolyHeaderId>,
    pub bakes_by_node: FxHashMap<(NodeRef, PassId), BakeId>,
    pub module_tables_by_node: FxHashMap<NodeRef, TableId>,
    pub block_tables: FxHashMap<(NodeRef, PassId), TableId>,
    pub pattern_vars_by_node: FxHashMap<(NodeRef, PassId), TypeId>,
    pub header_workloads_by_function: FxHashMap<FunctionId, crate::workload::WorkloadId>,
    /// Struct instance type -> the header it instantiates
    pub instance_headers: FxHashMap<TypeId, PolyHeaderId>,
    /// Polymorphic base struct -> its header
    pub base_headers: FxHashMap<TypeId, PolyHeaderId>,
}

impl AnalysisData {
    pub fn create_pass(&mut self, origin_workload: WorkloadId) -> PassId {
        self.passes.push(AnalysisPass { origin_workload })
    }

    pub fn set_info(&mut self, node: NodeRef, pass: PassId, info: AnalysisInfo) {
        if self.info.insert((node, pass), info).is_none() {
            self.node_passes.entry(node).or_default().push(pass);
        }
    }

    pub fn info(&self, node: NodeRef, pass: PassId) -> Option<&AnalysisInfo> {
        self.info.get(&(node, pass))
    }

    pub fn expression_info(&self, node: NodeRef, pass: PassId) -> Option<&ExpressionInfo> {
        match self.info(node, pass) {
            Some(AnalysisInfo::Expression(info)) => Some(info),
            _ => None,
        }
    }

    pub fn statement_info(&self, node: NodeRef, pass: PassId) -> Option<&StatementInfo> {
        match self.info(node, pass) {
            Some(AnalysisInfo::Statement(info)) => Some(info),
            _ => None,
        }
    }

    /// Passes that analysed this node, in creation order.
    pub fn passes_of(&self, node: NodeRef) -> &[PassId] {
        self.node_passes
            .get(&node)
            .map(|passes| passes.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_util::UnitId;

    fn node(n: u32) -> NodeRef {
        NodeRef {
            unit: UnitId(0),
            node: NodeId(n),
        }
    }

    #[test]
    fn info_is_keyed_by_node_and_pass() {
        let mut data = AnalysisData::default();
        let pass_a = data.create_pass(WorkloadId(0));
        let pass_b = data.create_pass(WorkloadId(1));
        data.set_info(
            node(1),
            pass_a,
            AnalysisInfo::SymbolLookup { symbol: None },
        );
        data.set_info(
            node(1),
            pass_b,
            AnalysisInfo::Module { table: TableId(2) },
        );
        assert!(matches!(
            data.info(node(1), pass_a),
            Some(AnalysisInfo::SymbolLookup { .. })
        ));
        assert!(matches!(
            data.info(node(1), pass_b),
            Some(AnalysisInfo::Module { .. })
        ));
        assert_eq!(data.passes_of(node(1)), &[pass_a, pass_b]);
        assert!(data.info(node(2), pass_a).is_none());
    }

    #[test]
    fn overwriting_info_keeps_one_pass_entry() {
        let mut data = AnalysisData::default();
        let pass = data.create_pass(WorkloadId(0));
        data.set_info(node(1), pass, AnalysisInfo::SymbolLookup { symbol: None });
        data.set_info(node(1), pass, AnalysisInfo::SymbolLookup { symbol: None });
        assert_eq!(data.passes_of(node(1)).len(), 1);
    }
}
