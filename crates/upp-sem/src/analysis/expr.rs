//! Expression analysis: symbol lookups, calls, member accesses,
//! operators, casts, and the implicit-conversion ladder.

use upp_par::ast::{Binop, CastKeyword, ContextChangeKind, NodeKind, Unop};
use upp_util::{ident, Identifier};

use crate::analysis::{self, poly_inst};
use crate::comptime::evaluate_comptime;
use crate::errors::SemanticErrorKind;
use crate::operators::{CastMode, CustomOperator, CustomOperatorKey};
use crate::passes::{
    AnalysisInfo, CastInfo, CastType, ExpressionContext, ExpressionInfo, ExpressionResult,
    ExpressionSpecifics,
};
use crate::symbols::{SymbolAccessLevel, SymbolId, SymbolKind, SymbolQuery, TableId};
use crate::types::{Datatype, PrimitiveClass, TypeId};
use crate::workload::{Suspendable, WorkloadId, WorkloadKind};
use crate::{Compiler, NodeRef};

// ----------------------------------------------------------------------
// Path and symbol resolution
// ----------------------------------------------------------------------

/// Resolve `A::B::name` from a workload's current table. Suspends while a
/// containing module's symbols are still being discovered; returns `None`
/// for genuinely unresolved paths.
pub fn resolve_path(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    path: &[Identifier],
) -> Suspendable<Option<SymbolId>> {
    let mut table = comp.executer.workloads[wl].symbol_table;
    let access = comp.executer.workloads[wl].access_level;
    let mut symbol = None;

    for (index, &segment) in path.iter().enumerate() {
        let query = if index == 0 {
            SymbolQuery {
                access_level: access,
                import_kind: upp_par::ast::ImportKind::Symbols,
                search_parents: true,
            }
        } else {
            // Later segments look only inside the named module
            SymbolQuery {
                access_level: SymbolAccessLevel::Global,
                import_kind: upp_par::ast::ImportKind::Symbols,
                search_parents: false,
            }
        };

        let mut results = comp.symbols.query_id(table, segment, query);
        if results.is_empty() {
            // The module owning `table` (or some module at all) may still
            // be discovering symbols
            let ready = if index == 0 {
                comp.all_tables_ready
            } else {
                match comp.table_ready.get(&table) {
                    Some(&ready) => ready,
                    None => comp.all_tables_ready,
                }
            };
            let failed = comp.executer.wait_for_or_fail(wl, ready)?;
            if !failed {
                results = comp.symbols.query_id(table, segment, query);
            }
            if results.is_empty() {
                return Ok(None);
            }
        }
        let found = results[0];

        // A symbol whose definition is still in flight must finish before
        // we can classify it
        if let SymbolKind::DefinitionUnfinished { workload } = comp.symbols.symbol(found).kind {
            comp.executer.wait_for(wl, workload, false)?;
        }

        if index + 1 < path.len() {
            match comp.symbols.symbol(found).kind {
                SymbolKind::Module {
                    table: module_table,
                    ..
                } => {
                    table = module_table;
                    // The module's imports and aliases settle with its
                    // ready event
                    if let Some(&ready) = comp.table_ready.get(&module_table) {
                        let _ = comp.executer.wait_for_or_fail(wl, ready)?;
                    }
                }
                _ => {
                    return Ok(None);
                }
            }
        }
        symbol = Some(found);
    }

    if let Some(found) = symbol {
        comp.symbols.record_reference(found, node);
    }
    Ok(symbol)
}

/// Analyse a type-position expression; logs and returns `Unknown` when
/// the expression is not a type.
pub fn expect_type(comp: &mut Compiler, wl: WorkloadId, node: NodeRef) -> Suspendable<TypeId> {
    let info = analyse_expression(
        comp,
        wl,
        node,
        ExpressionContext::Unknown {
            due_to_error: false,
        },
    )?;
    match info.result {
        ExpressionResult::Type(type_id) => Ok(type_id),
        ExpressionResult::PolymorphicStruct(header) => {
            // A bare polymorphic struct name in type position is a
            // structural pattern against any of its instances
            let origin = comp.poly.header(header).origin;
            match origin {
                crate::poly::PolyOrigin::Struct { base_struct, .. } => {
                    Ok(comp.types.make_struct_pattern(base_struct))
                }
                _ => Ok(comp.types.predefined.unknown),
            }
        }
        ExpressionResult::Constant(constant) => {
            // A type-handle constant is a type value
            let entry = comp.constants.constant(constant);
            if entry.type_id == comp.types.predefined.type_handle {
                Ok(comp
                    .constants
                    .read_u32(constant)
                    .map(TypeId)
                    .unwrap_or(comp.types.predefined.unknown))
            } else {
                comp.log_semantic_error(wl, SemanticErrorKind::ExpectedTypeGotValue, node);
                Ok(comp.types.predefined.unknown)
            }
        }
        ExpressionResult::Value { type_id, .. } if comp.types.is_unknown(type_id) => {
            Ok(comp.types.predefined.unknown)
        }
        _ => {
            comp.log_semantic_error(wl, SemanticErrorKind::ExpectedTypeGotValue, node);
            Ok(comp.types.predefined.unknown)
        }
    }
}

// ----------------------------------------------------------------------
// Expression analysis
// ----------------------------------------------------------------------

/// Analyse one expression under the caller's context. The result (with
/// its cast info) is stored under the workload's pass.
pub fn analyse_expression(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    context: ExpressionContext,
) -> Suspendable<ExpressionInfo> {
    // Custom casts change what typed contexts accept, so pending cast
    // context changes must land before the ladder runs
    if matches!(context, ExpressionContext::SpecificType { .. }) {
        wait_for_pending_casts(comp, wl)?;
    }
    let (result, specifics, is_valid) = analyse_pre_context(comp, wl, node, context)?;
    let cast_info = apply_context(comp, wl, node, &result, context);
    let info = ExpressionInfo {
        result,
        context,
        cast_info,
        specifics,
        is_valid,
    };
    let pass = comp.executer.workloads[wl].pass;
    comp.analysis
        .set_info(node, pass, AnalysisInfo::Expression(info.clone()));
    Ok(info)
}

fn unknown_value(comp: &Compiler) -> ExpressionResult {
    ExpressionResult::Value {
        type_id: comp.types.predefined.unknown,
        is_temporary: true,
    }
}

fn analyse_pre_context(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    context: ExpressionContext,
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let kind = comp.node_kind(node);
    let ok = |result| Ok((result, ExpressionSpecifics::None, true));
    let fail = |comp: &Compiler| Ok((unknown_value(comp), ExpressionSpecifics::None, false));

    match kind {
        NodeKind::IntLiteral(value) => {
            // Literals adopt an expected integer type when the value fits;
            // they never silently become floats
            let mut type_id = comp.types.predefined.i32;
            if let ExpressionContext::SpecificType { expected, .. } = context {
                let stripped = comp.types.without_constant(expected);
                if let Datatype::Primitive {
                    class: PrimitiveClass::Int,
                    signed,
                    width,
                    ..
                } = *comp.types.datatype(stripped)
                {
                    if int_fits(value, signed, width) {
                        type_id = stripped;
                    }
                }
            }
            ok(ExpressionResult::Value {
                type_id,
                is_temporary: true,
            })
        }
        NodeKind::FloatLiteral(_) => {
            let mut type_id = comp.types.predefined.f32;
            if let ExpressionContext::SpecificType { expected, .. } = context {
                let stripped = comp.types.without_constant(expected);
                if stripped == comp.types.predefined.f64 {
                    type_id = stripped;
                }
            }
            ok(ExpressionResult::Value {
                type_id,
                is_temporary: true,
            })
        }
        NodeKind::BoolLiteral(_) => ok(ExpressionResult::Value {
            type_id: comp.types.predefined.bool_type,
            is_temporary: true,
        }),
        NodeKind::StringLiteral(id) => {
            let byte_length = comp.pool.get(id).len() as u64;
            let string_type = comp.string_type;
            let constant = comp
                .constants
                .add_string_constant(string_type, id, byte_length);
            ok(ExpressionResult::Constant(constant))
        }
        NodeKind::NullLiteral => {
            // Null adapts to an expected optional pointer; otherwise it is
            // a bare address
            let type_id = match context {
                ExpressionContext::SpecificType { expected, .. } => {
                    let stripped = comp.types.without_constant(expected);
                    match comp.types.datatype(stripped) {
                        Datatype::Pointer { optional: true, .. } => stripped,
                        _ => comp.types.predefined.address,
                    }
                }
                _ => comp.types.predefined.address,
            };
            ok(ExpressionResult::Value {
                type_id,
                is_temporary: true,
            })
        }
        NodeKind::PatternVariable { id } => {
            let pass = comp.executer.workloads[wl].pass;
            let defining = match comp.analysis.pattern_vars_by_node.get(&(node, pass)) {
                Some(&existing) => existing,
                None => {
                    let created = comp.types.make_pattern_variable(id);
                    comp.analysis
                        .pattern_vars_by_node
                        .insert((node, pass), created);
                    // Later plain uses of the name see the mirror
                    let mirror = match *comp.types.datatype(created) {
                        Datatype::PatternVariable { mirror, .. } => mirror,
                        _ => created,
                    };
                    let table = comp.executer.workloads[wl].symbol_table;
                    let text_index = comp.node_text_index(node);
                    comp.symbols.define_symbol(
                        table,
                        id,
                        SymbolKind::Type(mirror),
                        SymbolAccessLevel::Polymorphic,
                        Some(node),
                        text_index,
                    );
                    created
                }
            };
            ok(ExpressionResult::Type(defining))
        }
        NodeKind::SymbolLookup { path } => {
            let resolved = resolve_path(comp, wl, node, &path)?;
            let pass = comp.executer.workloads[wl].pass;
            comp.analysis
                .set_info(node, pass, AnalysisInfo::SymbolLookup { symbol: resolved });
            let Some(symbol) = resolved else {
                let id = *path.last().expect("path is non-empty");
                comp.log_semantic_error(wl, SemanticErrorKind::UnresolvedSymbol { id }, node);
                return fail(comp);
            };
            symbol_to_result(comp, wl, symbol, node)
        }
        NodeKind::Call { callee, arguments } => analyse_call(
            comp,
            wl,
            node,
            NodeRef::new(node.unit, callee),
            &arguments,
        ),
        NodeKind::Argument { value, .. } => {
            analyse_pre_context(comp, wl, NodeRef::new(node.unit, value), context)
        }
        NodeKind::MemberAccess { base, member } => {
            analyse_member_access(comp, wl, node, NodeRef::new(node.unit, base), member)
        }
        NodeKind::ArrayAccess { base, index } => analyse_array_access(
            comp,
            wl,
            node,
            NodeRef::new(node.unit, base),
            NodeRef::new(node.unit, index),
        ),
        NodeKind::Unary { op, operand } => {
            analyse_unary(comp, wl, node, op, NodeRef::new(node.unit, operand))
        }
        NodeKind::Binary { op, left, right } => analyse_binary(
            comp,
            wl,
            node,
            op,
            NodeRef::new(node.unit, left),
            NodeRef::new(node.unit, right),
        ),
        NodeKind::Cast {
            keyword,
            target,
            operand,
        } => analyse_cast(
            comp,
            wl,
            node,
            keyword,
            target.map(|t| NodeRef::new(node.unit, t)),
            NodeRef::new(node.unit, operand),
        ),
        NodeKind::Bake { .. } => analyse_bake(comp, wl, node),
        NodeKind::FunctionLiteral { body, .. } => {
            if body.is_some() {
                // Anonymous function (lambda)
                let pass = comp.executer.workloads[wl].pass;
                let table = comp.executer.workloads[wl].symbol_table;
                let context_id = comp.symbols.table(table).operator_context;
                let name = ident::ID_LAMBDA_FUNCTION;
                let ready = comp.all_tables_ready;
                let (function, header) = analysis::get_or_create_function(
                    comp, node, pass, name, table, context_id, ready,
                );
                comp.executer.wait_for(wl, header, false)?;
                ok(ExpressionResult::Function(function))
            } else {
                // `(params) -> R` without a body is a function type
                analyse_function_type(comp, wl, node)
            }
        }
        NodeKind::FunctionType { .. } => analyse_function_type(comp, wl, node),
        NodeKind::StructLiteral { parameters, .. } => {
            if !parameters.is_empty() {
                // Anonymous polymorphic structs would need their own
                // header analysis; reject for now
                comp.log_semantic_error(wl, SemanticErrorKind::GlobalTemplate, node);
                return fail(comp);
            }
            let pass = comp.executer.workloads[wl].pass;
            let table = comp.executer.workloads[wl].symbol_table;
            let name = comp.intern("struct");
            let struct_type =
                match comp.analysis.structs_by_node.get(&(node, pass)).copied() {
                    Some(existing) => existing,
                    None => {
                        let created = analysis_create_anonymous_struct(comp, node, pass, name, table);
                        created
                    }
                };
            ok(ExpressionResult::Type(struct_type))
        }
        NodeKind::EnumLiteral { .. } => {
            let enum_type = analysis::analyse_enum_literal(comp, wl, node)?;
            ok(ExpressionResult::Type(enum_type))
        }
        NodeKind::Module { .. } => {
            comp.log_semantic_error(wl, SemanticErrorKind::ExpectedValueGotType, node);
            fail(comp)
        }
        NodeKind::PointerType { element, optional } => {
            let element_type = expect_type(comp, wl, NodeRef::new(node.unit, element))?;
            ok(ExpressionResult::Type(
                comp.types.make_pointer(element_type, optional),
            ))
        }
        NodeKind::OptionalType { child } => {
            let child_type = expect_type(comp, wl, NodeRef::new(node.unit, child))?;
            ok(ExpressionResult::Type(comp.types.make_optional(child_type)))
        }
        NodeKind::SliceType { element } => {
            let element_type = expect_type(comp, wl, NodeRef::new(node.unit, element))?;
            ok(ExpressionResult::Type(comp.types.make_slice(element_type)))
        }
        NodeKind::ArrayType { count, element } => {
            let element_type = expect_type(comp, wl, NodeRef::new(node.unit, element))?;
            let pass = comp.executer.workloads[wl].pass;
            let (count_known, element_count) = match count {
                Some(count_node) => {
                    let count_ref = NodeRef::new(node.unit, count_node);
                    analyse_expression(
                        comp,
                        wl,
                        count_ref,
                        ExpressionContext::Unknown {
                            due_to_error: false,
                        },
                    )?;
                    match evaluate_comptime(comp, count_ref, pass).ok().and_then(|v| v.as_int()) {
                        Some(value) if value >= 0 => (true, value as u64),
                        _ => {
                            comp.log_semantic_error(
                                wl,
                                SemanticErrorKind::NonIntegerArraySize,
                                count_ref,
                            );
                            (false, 0)
                        }
                    }
                }
                None => (false, 0),
            };
            ok(ExpressionResult::Type(comp.types.make_array(
                element_type,
                count_known,
                element_count,
            )))
        }
        // Statements and declarations are not expressions
        _ => fail(comp),
    }
}

fn analysis_create_anonymous_struct(
    comp: &mut Compiler,
    node: NodeRef,
    pass: crate::passes::PassId,
    name: Identifier,
    table: TableId,
) -> TypeId {
    let is_union = matches!(
        comp.node_kind(node),
        NodeKind::StructLiteral { is_union: true, .. }
    );
    let struct_type = comp.types.make_struct_empty(name, is_union, None, None);
    let body_pass = comp.analysis.create_pass(WorkloadId(0));
    let body_workload = comp.executer.add_workload(
        WorkloadKind::StructBody {
            struct_type,
            node,
        },
        table,
        body_pass,
    );
    comp.analysis.passes[body_pass].origin_workload = body_workload;
    comp.types
        .set_struct_body_workload(struct_type, body_workload);
    comp.analysis.structs_by_node.insert((node, pass), struct_type);
    struct_type
}

fn int_fits(value: i64, signed: bool, width: u8) -> bool {
    let bits = width as u32 * 8;
    if signed {
        let min = -(1i128 << (bits - 1));
        let max = (1i128 << (bits - 1)) - 1;
        (value as i128) >= min && (value as i128) <= max
    } else {
        value >= 0 && (value as u128) < (1u128 << bits)
    }
}

/// Turn a resolved symbol into an expression result.
fn symbol_to_result(
    comp: &mut Compiler,
    wl: WorkloadId,
    symbol: SymbolId,
    node: NodeRef,
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let kind = comp.symbols.symbol(symbol).kind.clone();
    let result = match kind {
        SymbolKind::Variable { type_id } => ExpressionResult::Value {
            type_id,
            is_temporary: false,
        },
        SymbolKind::Global(global) => ExpressionResult::Value {
            type_id: comp.program.globals[global].type_id,
            is_temporary: false,
        },
        SymbolKind::Parameter {
            function,
            index_in_runtime_signature,
            ..
        } => {
            let signature = comp
                .types
                .signature(comp.program.functions[function].signature);
            let type_id = signature
                .parameters
                .get(index_in_runtime_signature as usize)
                .map(|p| p.type_id)
                .unwrap_or(comp.types.predefined.unknown);
            ExpressionResult::Value {
                type_id,
                is_temporary: false,
            }
        }
        SymbolKind::Function(function) => ExpressionResult::Function(function),
        SymbolKind::HardcodedFunction(hardcoded) => ExpressionResult::Hardcoded(hardcoded),
        SymbolKind::PolymorphicFunction(header) => ExpressionResult::PolymorphicFunction(header),
        SymbolKind::PolymorphicStruct(header) => ExpressionResult::PolymorphicStruct(header),
        SymbolKind::Type(type_id) => ExpressionResult::Type(type_id),
        SymbolKind::ComptimeValue(constant) => ExpressionResult::Constant(constant),
        SymbolKind::PolymorphicValue { access_index, .. } => {
            match analysis::active_poly_value(comp, wl, access_index) {
                Some(crate::poly::PolyValue::Set { value }) => ExpressionResult::Constant(value),
                Some(crate::poly::PolyValue::TemplatedType { template }) => {
                    ExpressionResult::Type(template)
                }
                Some(crate::poly::PolyValue::Unset { unset_type }) => ExpressionResult::Value {
                    type_id: unset_type,
                    is_temporary: true,
                },
                None => unknown_value(comp),
            }
        }
        SymbolKind::Module { table, .. } => ExpressionResult::Module(table),
        SymbolKind::VariableUndefined => {
            let id = comp.symbols.symbol(symbol).id;
            comp.log_semantic_error(wl, SemanticErrorKind::UnresolvedSymbol { id }, node);
            return Ok((unknown_value(comp), ExpressionSpecifics::None, false));
        }
        SymbolKind::DefinitionUnfinished { workload } => {
            comp.executer.wait_for(wl, workload, false)?;
            // Still unfinished after the wait: the defining workload died
            // in a cycle; report and continue with Unknown
            if matches!(
                comp.symbols.symbol(symbol).kind,
                SymbolKind::DefinitionUnfinished { .. }
            ) {
                let id = comp.symbols.symbol(symbol).id;
                comp.log_semantic_error(wl, SemanticErrorKind::UnresolvedSymbol { id }, node);
                return Ok((unknown_value(comp), ExpressionSpecifics::None, false));
            }
            return symbol_to_result(comp, wl, symbol, node);
        }
        SymbolKind::Alias { .. } => {
            match comp.symbols.resolve_alias(symbol) {
                Some(resolved) if resolved != symbol => {
                    return symbol_to_result(comp, wl, resolved, node)
                }
                _ => unknown_value(comp),
            }
        }
        SymbolKind::Error => unknown_value(comp),
    };
    Ok((result, ExpressionSpecifics::None, true))
}

// ----------------------------------------------------------------------
// Calls
// ----------------------------------------------------------------------

fn analyse_call(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    callee: NodeRef,
    arguments: &[upp_par::NodeId],
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let callee_info = analyse_expression(
        comp,
        wl,
        callee,
        ExpressionContext::Unknown {
            due_to_error: false,
        },
    )?;

    match callee_info.result.clone() {
        ExpressionResult::Function(function) => {
            let signature_id = comp.program.functions[function].signature;
            analyse_arguments_against_signature(comp, wl, node, arguments, signature_id)?;
            if let Some(caller) = comp.executer.workloads[wl].current_function {
                comp.program.record_call(caller, function);
            }
            let return_type = comp.types.signature(signature_id).return_type;
            Ok(call_result(return_type, ExpressionSpecifics::None))
        }
        ExpressionResult::Hardcoded(hardcoded) => {
            analyse_hardcoded_call(comp, wl, node, hardcoded, arguments)
        }
        ExpressionResult::PolymorphicStruct(header) => {
            let instance = poly_inst::instantiate_struct(comp, wl, header, node, arguments)?;
            Ok((
                ExpressionResult::Type(instance),
                ExpressionSpecifics::None,
                true,
            ))
        }
        ExpressionResult::PolymorphicFunction(header) => {
            let instance = poly_inst::instantiate_function(comp, wl, header, node, arguments)?;
            match instance {
                Some(function) => {
                    if let Some(caller) = comp.executer.workloads[wl].current_function {
                        comp.program.record_call(caller, function);
                    }
                    let signature = comp.program.functions[function].signature;
                    let return_type = comp.types.signature(signature).return_type;
                    Ok(call_result(return_type, ExpressionSpecifics::None))
                }
                None => Ok((unknown_value(comp), ExpressionSpecifics::None, false)),
            }
        }
        ExpressionResult::DotCall {
            first_argument,
            overloads,
        } => {
            // Dot-call: the receiver is the implicit first argument
            let Some(&function) = overloads.first() else {
                return Ok((unknown_value(comp), ExpressionSpecifics::None, false));
            };
            let signature_id = comp.program.functions[function].signature;
            let signature = comp.types.signature(signature_id).clone();
            // Receiver already analysed; match remaining parameters
            for (index, &argument) in arguments.iter().enumerate() {
                let argument_node = NodeRef::new(node.unit, argument);
                let expected = signature
                    .parameters
                    .get(index + 1)
                    .map(|p| p.type_id);
                let context = match expected {
                    Some(expected) => ExpressionContext::SpecificType {
                        expected,
                        cast_mode: CastMode::Implicit,
                    },
                    None => ExpressionContext::Unknown {
                        due_to_error: false,
                    },
                };
                analyse_expression(comp, wl, argument_node, context)?;
            }
            if arguments.len() + 1 != signature.parameters.len() {
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::ArgumentCountMismatch {
                        expected: signature.parameters.len(),
                        given: arguments.len() + 1,
                    },
                    node,
                );
            }
            if let Some(caller) = comp.executer.workloads[wl].current_function {
                comp.program.record_call(caller, function);
            }
            let _ = first_argument;
            Ok(call_result(signature.return_type, ExpressionSpecifics::None))
        }
        ExpressionResult::Value { type_id, .. } => {
            // Calling a function-pointer value
            let stripped = comp.types.without_constant(type_id);
            if let Datatype::FunctionPointer { signature, .. } =
                *comp.types.datatype(stripped)
            {
                analyse_arguments_against_signature(comp, wl, node, arguments, signature)?;
                let return_type = comp.types.signature(signature).return_type;
                return Ok(call_result(return_type, ExpressionSpecifics::None));
            }
            comp.log_semantic_error(
                wl,
                SemanticErrorKind::InvalidTypeForOperation { given: type_id },
                node,
            );
            Ok((unknown_value(comp), ExpressionSpecifics::None, false))
        }
        ExpressionResult::Type(type_id) => {
            // Struct initializer: `Point(x = 1, y = 2)`
            analyse_struct_initializer(comp, wl, node, type_id, arguments)
        }
        _ => {
            comp.log_semantic_error(
                wl,
                SemanticErrorKind::InvalidTypeForOperation {
                    given: comp.types.predefined.unknown,
                },
                node,
            );
            Ok((unknown_value(comp), ExpressionSpecifics::None, false))
        }
    }
}

fn call_result(
    return_type: Option<TypeId>,
    specifics: ExpressionSpecifics,
) -> (ExpressionResult, ExpressionSpecifics, bool) {
    match return_type {
        Some(type_id) => (
            ExpressionResult::Value {
                type_id,
                is_temporary: true,
            },
            specifics,
            true,
        ),
        None => (ExpressionResult::Nothing, specifics, true),
    }
}

/// Match call arguments against a signature: positional first, named by
/// parameter name, defaults fill the rest.
fn analyse_arguments_against_signature(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    arguments: &[upp_par::NodeId],
    signature_id: crate::types::SignatureId,
) -> Suspendable<()> {
    let signature = comp.types.signature(signature_id).clone();
    let mut matched: Vec<crate::passes::ParameterMatch> = signature
        .parameters
        .iter()
        .map(|parameter| crate::passes::ParameterMatch {
            name: parameter.name,
            param_type: Some(parameter.type_id),
            required: parameter.required,
            requires_named_addressing: parameter.requires_named_addressing,
            must_not_be_set: parameter.must_not_be_set,
            argument: None,
            argument_type: None,
            is_set: false,
        })
        .collect();

    let mut positional = 0usize;
    for &argument in arguments {
        let argument_node = NodeRef::new(node.unit, argument);
        let (name, value) = match comp.node_kind(argument_node) {
            NodeKind::Argument { name, value } => (name, NodeRef::new(node.unit, value)),
            _ => (None, argument_node),
        };
        let slot = match name {
            Some(name) => matched.iter().position(|m| m.name == name),
            None => {
                let slot = matched
                    .iter()
                    .enumerate()
                    .position(|(i, m)| i >= positional && !m.is_set && !m.requires_named_addressing);
                positional = slot.map(|s| s + 1).unwrap_or(matched.len());
                slot
            }
        };
        let expected = slot.and_then(|s| matched[s].param_type);
        let context = match expected {
            Some(expected) => ExpressionContext::SpecificType {
                expected,
                cast_mode: CastMode::Implicit,
            },
            None => ExpressionContext::Unknown {
                due_to_error: false,
            },
        };
        let info = analyse_expression(comp, wl, value, context)?;
        if let Some(slot) = slot {
            matched[slot].argument = Some(value);
            matched[slot].argument_type = Some(info.cast_info.initial_type);
            matched[slot].is_set = true;
        }
    }

    let missing_required = matched.iter().any(|m| m.required && !m.is_set);
    let too_many = arguments.len() > signature.parameters.len();
    if missing_required || too_many {
        comp.log_semantic_error(
            wl,
            SemanticErrorKind::ArgumentCountMismatch {
                expected: signature.parameters.len(),
                given: arguments.len(),
            },
            node,
        );
    }

    let pass = comp.executer.workloads[wl].pass;
    comp.analysis.set_info(
        node,
        pass,
        AnalysisInfo::ParameterMatching(crate::passes::ParameterMatchingInfo {
            matched,
            target: crate::passes::CallTarget::FunctionPointer(signature_id),
            has_return_value: signature.return_type.is_some(),
            return_type: signature.return_type,
        }),
    );
    Ok(())
}

fn analyse_hardcoded_call(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    hardcoded: crate::program::HardcodedKind,
    arguments: &[upp_par::NodeId],
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    use crate::program::HardcodedKind;

    // Type-introspection builtins look at their argument's type rather
    // than its value
    match hardcoded {
        HardcodedKind::TypeOf => {
            let Some(&argument) = arguments.first() else {
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::ArgumentCountMismatch {
                        expected: 1,
                        given: 0,
                    },
                    node,
                );
                return Ok((unknown_value(comp), ExpressionSpecifics::None, false));
            };
            let argument_node = NodeRef::new(node.unit, argument);
            let info = analyse_expression(
                comp,
                wl,
                argument_node,
                ExpressionContext::Unknown {
                    due_to_error: false,
                },
            )?;
            let type_id = match info.result {
                ExpressionResult::Type(type_id) => type_id,
                ExpressionResult::Value { type_id, .. } => type_id,
                _ => comp.types.predefined.unknown,
            };
            let constant =
                analysis::comptime_value_to_constant(comp, crate::comptime::ComptimeValue::Type(type_id));
            return Ok(match constant {
                Some(constant) => (
                    ExpressionResult::Constant(constant),
                    ExpressionSpecifics::None,
                    true,
                ),
                None => (unknown_value(comp), ExpressionSpecifics::None, false),
            });
        }
        HardcodedKind::SizeOf | HardcodedKind::AlignOf => {
            let Some(&argument) = arguments.first() else {
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::ArgumentCountMismatch {
                        expected: 1,
                        given: 0,
                    },
                    node,
                );
                return Ok((unknown_value(comp), ExpressionSpecifics::None, false));
            };
            let argument_node = NodeRef::new(node.unit, argument);
            let inner = match comp.node_kind(argument_node) {
                NodeKind::Argument { value, .. } => NodeRef::new(node.unit, value),
                _ => argument_node,
            };
            let type_id = expect_type(comp, wl, inner)?;
            // Requesting a size suspends until the owner struct finishes
            if comp.types.memory_info(type_id).is_none() {
                if let Some(source) = comp.types.memory_source(type_id) {
                    if let Some(body) = comp.types.struct_body_workload(source) {
                        comp.executer.wait_for(wl, body, false)?;
                    }
                } else if let Some(body) = comp.types.struct_body_workload(type_id) {
                    comp.executer.wait_for(wl, body, false)?;
                }
            }
            let memory = comp.types.memory_info(type_id);
            let value = match (hardcoded, memory) {
                (HardcodedKind::SizeOf, Some(memory)) => memory.size as i64,
                (HardcodedKind::AlignOf, Some(memory)) => memory.alignment as i64,
                _ => 0,
            };
            let constant =
                analysis::comptime_value_to_constant(comp, crate::comptime::ComptimeValue::Int(value));
            return Ok(match constant {
                Some(constant) => (
                    ExpressionResult::Constant(constant),
                    ExpressionSpecifics::None,
                    true,
                ),
                None => (unknown_value(comp), ExpressionSpecifics::None, false),
            });
        }
        _ => {}
    }

    let signature_id = comp.hardcoded_signatures[&hardcoded];
    analyse_arguments_against_signature(comp, wl, node, arguments, signature_id)?;
    let return_type = comp.types.signature(signature_id).return_type;
    let specifics = match hardcoded {
        HardcodedKind::BitwiseNot
        | HardcodedKind::BitwiseAnd
        | HardcodedKind::BitwiseOr
        | HardcodedKind::BitwiseXor
        | HardcodedKind::BitwiseShiftLeft
        | HardcodedKind::BitwiseShiftRight => ExpressionSpecifics::BitwisePrimitive {
            type_id: comp.types.predefined.i32,
        },
        _ => ExpressionSpecifics::None,
    };
    Ok(call_result(return_type, specifics))
}

fn analyse_struct_initializer(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    type_id: TypeId,
    arguments: &[upp_par::NodeId],
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let stripped = comp.types.without_constant(type_id);
    let Some(mut struct_type) = comp.types.struct_type(stripped).cloned() else {
        comp.log_semantic_error(
            wl,
            SemanticErrorKind::InvalidTypeForOperation { given: type_id },
            node,
        );
        return Ok((unknown_value(comp), ExpressionSpecifics::None, false));
    };
    // Members must be known; wait for the body when unfinished
    if let Some(body) = struct_type.body_workload {
        comp.executer.wait_for(wl, body, false)?;
        if let Some(refreshed) = comp.types.struct_type(stripped).cloned() {
            struct_type = refreshed;
        }
    }

    for (index, &argument) in arguments.iter().enumerate() {
        let argument_node = NodeRef::new(node.unit, argument);
        let (name, value) = match comp.node_kind(argument_node) {
            NodeKind::Argument { name, value } => (name, NodeRef::new(node.unit, value)),
            _ => (None, argument_node),
        };
        let member = match name {
            Some(name) => struct_type.members.iter().find(|m| m.id == name),
            None => struct_type.members.get(index),
        };
        let context = match member {
            Some(member) => ExpressionContext::SpecificType {
                expected: member.type_id,
                cast_mode: CastMode::Implicit,
            },
            None => {
                let id = name.unwrap_or(ident::ID_VALUE);
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::StructMemberNotFound { id },
                    argument_node,
                );
                ExpressionContext::Unknown { due_to_error: true }
            }
        };
        analyse_expression(comp, wl, value, context)?;
    }
    Ok((
        ExpressionResult::Value {
            type_id: stripped,
            is_temporary: true,
        },
        ExpressionSpecifics::None,
        true,
    ))
}

// ----------------------------------------------------------------------
// Member and array access
// ----------------------------------------------------------------------

fn analyse_member_access(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    base: NodeRef,
    member: Identifier,
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let base_info = analyse_expression(comp, wl, base, ExpressionContext::AutoDereference)?;

    match base_info.result.clone() {
        ExpressionResult::Module(table) => {
            let results = comp.symbols.query_id(
                table,
                member,
                SymbolQuery {
                    access_level: SymbolAccessLevel::Global,
                    import_kind: upp_par::ast::ImportKind::Symbols,
                    search_parents: false,
                },
            );
            match results.first() {
                Some(&symbol) => {
                    comp.symbols.record_reference(symbol, node);
                    symbol_to_result(comp, wl, symbol, node)
                }
                None => {
                    comp.log_semantic_error(
                        wl,
                        SemanticErrorKind::UnresolvedSymbol { id: member },
                        node,
                    );
                    Ok((unknown_value(comp), ExpressionSpecifics::None, false))
                }
            }
        }
        ExpressionResult::Type(type_id) => {
            // Enum member constants and struct subtype navigation
            let stripped = comp.types.without_constant(type_id);
            if let Some(enum_type) = comp.types.enum_type(stripped).cloned() {
                if let Some(member_def) = enum_type.members.iter().find(|m| m.id == member) {
                    let bytes = (member_def.value as i32).to_le_bytes();
                    let function_count = comp.program.functions.len();
                    if let Ok(constant) =
                        comp.constants
                            .add_constant(&comp.types, function_count, stripped, &bytes)
                    {
                        return Ok((
                            ExpressionResult::Constant(constant),
                            ExpressionSpecifics::None,
                            true,
                        ));
                    }
                }
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::StructMemberNotFound { id: member },
                    node,
                );
                return Ok((unknown_value(comp), ExpressionSpecifics::None, false));
            }
            if let Some(struct_type) = comp.types.struct_type(stripped).cloned() {
                for &subtype in &struct_type.subtypes {
                    if comp.types.struct_type(subtype).map(|s| s.name) == Some(member) {
                        return Ok((
                            ExpressionResult::Type(subtype),
                            ExpressionSpecifics::None,
                            true,
                        ));
                    }
                }
            }
            comp.log_semantic_error(
                wl,
                SemanticErrorKind::StructMemberNotFound { id: member },
                node,
            );
            Ok((unknown_value(comp), ExpressionSpecifics::None, false))
        }
        ExpressionResult::Value { type_id, .. } => {
            let value_type = base_info.cast_info.result_type;
            let _ = type_id;
            analyse_value_member(comp, wl, node, base, value_type, member)
        }
        _ => {
            comp.log_semantic_error(
                wl,
                SemanticErrorKind::StructMemberNotFound { id: member },
                node,
            );
            Ok((unknown_value(comp), ExpressionSpecifics::None, false))
        }
    }
}

fn analyse_value_member(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    base: NodeRef,
    value_type: TypeId,
    member: Identifier,
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let stripped = comp.types.without_constant(value_type);
    match comp.types.datatype(stripped).clone() {
        Datatype::Struct(struct_type) => {
            // Members must be known; wait for the body first
            if let Some(body) = struct_type.body_workload {
                comp.executer.wait_for(wl, body, false)?;
            }
            let _ = struct_type;
            // Own members, then parents' members (subtypes share layout)
            let mut search: Option<TypeId> = Some(stripped);
            while let Some(current) = search {
                let Some(current_struct) = comp.types.struct_type(current).cloned() else {
                    break;
                };
                if let Some((index, found)) = current_struct
                    .members
                    .iter()
                    .enumerate()
                    .find(|(_, m)| m.id == member)
                {
                    return Ok((
                        ExpressionResult::Value {
                            type_id: found.type_id,
                            is_temporary: false,
                        },
                        ExpressionSpecifics::MemberAccess {
                            member_index: index as u32,
                            member_type: found.type_id,
                            struct_type: current,
                        },
                        true,
                    ));
                }
                if member == ident::ID_TAG {
                    if let Some(tag) = &current_struct.tag_member {
                        return Ok((
                            ExpressionResult::Value {
                                type_id: tag.type_id,
                                is_temporary: false,
                            },
                            ExpressionSpecifics::None,
                            true,
                        ));
                    }
                }
                search = current_struct.parent;
            }
            // Fall back to dot-call operators in scope
            dot_call_lookup(comp, wl, node, base, stripped, member)
        }
        Datatype::Slice {
            pub_data_member,
            pub_size_member,
            ..
        } => {
            if member == ident::ID_DATA {
                Ok((
                    ExpressionResult::Value {
                        type_id: pub_data_member.type_id,
                        is_temporary: false,
                    },
                    ExpressionSpecifics::None,
                    true,
                ))
            } else if member == ident::ID_SIZE {
                Ok((
                    ExpressionResult::Value {
                        type_id: pub_size_member.type_id,
                        is_temporary: false,
                    },
                    ExpressionSpecifics::None,
                    true,
                ))
            } else {
                dot_call_lookup(comp, wl, node, base, stripped, member)
            }
        }
        Datatype::Optional { child, .. } => {
            if member == ident::ID_VALUE {
                Ok((
                    ExpressionResult::Value {
                        type_id: child,
                        is_temporary: false,
                    },
                    ExpressionSpecifics::None,
                    true,
                ))
            } else if member == ident::ID_IS_AVAILABLE {
                Ok((
                    ExpressionResult::Value {
                        type_id: comp.types.predefined.bool_type,
                        is_temporary: false,
                    },
                    ExpressionSpecifics::None,
                    true,
                ))
            } else {
                dot_call_lookup(comp, wl, node, base, stripped, member)
            }
        }
        Datatype::Pointer { optional: true, .. } => {
            // Optional pointers expose availability like optionals
            if member == ident::ID_IS_AVAILABLE {
                Ok((
                    ExpressionResult::Value {
                        type_id: comp.types.predefined.bool_type,
                        is_temporary: false,
                    },
                    ExpressionSpecifics::OptionalPointerCheck,
                    true,
                ))
            } else {
                dot_call_lookup(comp, wl, node, base, stripped, member)
            }
        }
        _ => dot_call_lookup(comp, wl, node, base, stripped, member),
    }
}

/// Resolve `x.f` through dot-call operators brought into scope.
fn dot_call_lookup(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    base: NodeRef,
    base_type: TypeId,
    member: Identifier,
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let table = comp.executer.workloads[wl].symbol_table;
    let context = comp.symbols.table(table).operator_context;
    // Pending dot-call context changes must land first
    for pending in comp
        .operators
        .pending_for(context, ContextChangeKind::DotCall)
    {
        comp.executer.wait_for(wl, pending, false)?;
    }
    let (base_base, _) = comp.types.base_type(base_type);
    let key = CustomOperatorKey::DotCall {
        datatype: base_base,
        id: member,
    };
    match comp.operators.lookup(context, &key) {
        Some(CustomOperator::DotCall { function, .. }) => Ok((
            ExpressionResult::DotCall {
                first_argument: base,
                overloads: vec![function],
            },
            ExpressionSpecifics::None,
            true,
        )),
        _ => {
            comp.log_semantic_error(
                wl,
                SemanticErrorKind::StructMemberNotFound { id: member },
                node,
            );
            Ok((unknown_value(comp), ExpressionSpecifics::None, false))
        }
    }
}

fn analyse_array_access(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    base: NodeRef,
    index: NodeRef,
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let base_info = analyse_expression(comp, wl, base, ExpressionContext::AutoDereference)?;
    let usize_type = comp.types.predefined.usize;
    analyse_expression(
        comp,
        wl,
        index,
        ExpressionContext::SpecificType {
            expected: usize_type,
            cast_mode: CastMode::Implicit,
        },
    )?;

    let base_type = comp
        .types
        .without_constant(base_info.cast_info.result_type);
    match comp.types.datatype(base_type).clone() {
        Datatype::Array { element, .. } | Datatype::Slice { element, .. } => Ok((
            ExpressionResult::Value {
                type_id: element,
                is_temporary: false,
            },
            ExpressionSpecifics::None,
            true,
        )),
        _ => {
            // Custom array-access operator
            let table = comp.executer.workloads[wl].symbol_table;
            let context = comp.symbols.table(table).operator_context;
            for pending in comp
                .operators
                .pending_for(context, ContextChangeKind::ArrayAccess)
            {
                comp.executer.wait_for(wl, pending, false)?;
            }
            let (base_base, _) = comp.types.base_type(base_type);
            let key = CustomOperatorKey::ArrayAccess { array: base_base };
            match comp.operators.lookup(context, &key) {
                Some(CustomOperator::ArrayAccess { function }) => {
                    if let Some(caller) = comp.executer.workloads[wl].current_function {
                        comp.program.record_call(caller, function);
                    }
                    let signature = comp.program.functions[function].signature;
                    let return_type = comp.types.signature(signature).return_type;
                    Ok(call_result(return_type, ExpressionSpecifics::None))
                }
                _ => {
                    comp.log_semantic_error(
                        wl,
                        SemanticErrorKind::InvalidTypeForOperation { given: base_type },
                        node,
                    );
                    Ok((unknown_value(comp), ExpressionSpecifics::None, false))
                }
            }
        }
    }
}

// ----------------------------------------------------------------------
// Unary, binary, cast
// ----------------------------------------------------------------------

fn analyse_unary(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    op: Unop,
    operand: NodeRef,
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let operand_info = analyse_expression(
        comp,
        wl,
        operand,
        match op {
            Unop::Dereference => ExpressionContext::Unknown {
                due_to_error: false,
            },
            _ => ExpressionContext::AutoDereference,
        },
    )?;

    match op {
        Unop::Dereference => {
            match operand_info.result.clone() {
                // `*T` over a type constructs a pointer type
                ExpressionResult::Type(type_id) => Ok((
                    ExpressionResult::Type(comp.types.make_pointer(type_id, false)),
                    ExpressionSpecifics::None,
                    true,
                )),
                ExpressionResult::Value { type_id, .. } => {
                    let stripped = comp.types.without_constant(type_id);
                    match *comp.types.datatype(stripped) {
                        Datatype::Pointer {
                            element,
                            optional: false,
                        } => Ok((
                            ExpressionResult::Value {
                                type_id: element,
                                is_temporary: false,
                            },
                            ExpressionSpecifics::None,
                            true,
                        )),
                        _ => {
                            comp.log_semantic_error(
                                wl,
                                SemanticErrorKind::InvalidTypeForOperation { given: type_id },
                                node,
                            );
                            Ok((unknown_value(comp), ExpressionSpecifics::None, false))
                        }
                    }
                }
                _ => {
                    comp.log_semantic_error(
                        wl,
                        SemanticErrorKind::InvalidTypeForOperation {
                            given: comp.types.predefined.unknown,
                        },
                        node,
                    );
                    Ok((unknown_value(comp), ExpressionSpecifics::None, false))
                }
            }
        }
        Unop::AddressOf => match operand_info.result.clone() {
            ExpressionResult::Value { type_id, .. } => Ok((
                ExpressionResult::Value {
                    type_id: comp.types.make_pointer(type_id, false),
                    is_temporary: true,
                },
                ExpressionSpecifics::None,
                true,
            )),
            _ => {
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::InvalidTypeForOperation {
                        given: comp.types.predefined.unknown,
                    },
                    node,
                );
                Ok((unknown_value(comp), ExpressionSpecifics::None, false))
            }
        },
        Unop::Negate | Unop::Not => {
            let value_type = operand_info.cast_info.result_type;
            let stripped = comp.types.without_constant(value_type);
            let valid = match (op, comp.types.datatype(stripped)) {
                (
                    Unop::Negate,
                    Datatype::Primitive {
                        class: PrimitiveClass::Int,
                        signed: true,
                        ..
                    },
                )
                | (
                    Unop::Negate,
                    Datatype::Primitive {
                        class: PrimitiveClass::Float,
                        ..
                    },
                )
                | (
                    Unop::Not,
                    Datatype::Primitive {
                        class: PrimitiveClass::Bool,
                        ..
                    },
                ) => true,
                _ => false,
            };
            if valid {
                return Ok((
                    ExpressionResult::Value {
                        type_id: stripped,
                        is_temporary: true,
                    },
                    ExpressionSpecifics::None,
                    true,
                ));
            }
            // Custom unop in scope
            let table = comp.executer.workloads[wl].symbol_table;
            let context = comp.symbols.table(table).operator_context;
            for pending in comp.operators.pending_for(context, ContextChangeKind::Unop) {
                comp.executer.wait_for(wl, pending, false)?;
            }
            let (operand_base, _) = comp.types.base_type(stripped);
            let key = CustomOperatorKey::Unop {
                op,
                operand: operand_base,
            };
            match comp.operators.lookup(context, &key) {
                Some(CustomOperator::Unop { function }) => {
                    if let Some(caller) = comp.executer.workloads[wl].current_function {
                        comp.program.record_call(caller, function);
                    }
                    let signature = comp.program.functions[function].signature;
                    let return_type = comp.types.signature(signature).return_type;
                    Ok(call_result(
                        return_type,
                        ExpressionSpecifics::Overload {
                            function: Some(function),
                            switch_left_and_right: false,
                        },
                    ))
                }
                _ => {
                    if !comp.types.is_unknown(stripped) {
                        comp.log_semantic_error(
                            wl,
                            SemanticErrorKind::InvalidTypeForOperation { given: stripped },
                            node,
                        );
                    }
                    Ok((unknown_value(comp), ExpressionSpecifics::None, false))
                }
            }
        }
    }
}

fn analyse_binary(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    op: Binop,
    left: NodeRef,
    right: NodeRef,
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let bool_type = comp.types.predefined.bool_type;
    if matches!(op, Binop::And | Binop::Or) {
        analyse_expression(
            comp,
            wl,
            left,
            ExpressionContext::SpecificType {
                expected: bool_type,
                cast_mode: CastMode::Implicit,
            },
        )?;
        analyse_expression(
            comp,
            wl,
            right,
            ExpressionContext::SpecificType {
                expected: bool_type,
                cast_mode: CastMode::Implicit,
            },
        )?;
        return Ok((
            ExpressionResult::Value {
                type_id: bool_type,
                is_temporary: true,
            },
            ExpressionSpecifics::None,
            true,
        ));
    }

    let left_info = analyse_expression(comp, wl, left, ExpressionContext::AutoDereference)?;
    let left_type = comp
        .types
        .without_constant(left_info.cast_info.result_type);
    // The right side adapts its literals to the left, but no implicit
    // conversion is applied: a mismatch falls through to custom operators
    let right_info = analyse_expression(
        comp,
        wl,
        right,
        ExpressionContext::SpecificType {
            expected: left_type,
            cast_mode: CastMode::None,
        },
    )?;
    let right_type = comp
        .types
        .without_constant(right_info.cast_info.result_type);

    let is_comparison = matches!(
        op,
        Binop::Equal | Binop::NotEqual | Binop::Less | Binop::LessEqual | Binop::Greater | Binop::GreaterEqual
    );
    let types_agree = left_type == right_type && right_info.cast_info.error.is_none();
    let left_is_numeric = matches!(
        comp.types.datatype(left_type),
        Datatype::Primitive {
            class: PrimitiveClass::Int | PrimitiveClass::Float,
            ..
        }
    );
    let left_is_pointer = matches!(comp.types.datatype(left_type), Datatype::Pointer { .. });
    let left_is_enum = matches!(comp.types.datatype(left_type), Datatype::Enum(_));

    if types_agree {
        if is_comparison && (left_is_numeric || left_is_pointer || left_is_enum || left_type == bool_type)
        {
            return Ok((
                ExpressionResult::Value {
                    type_id: bool_type,
                    is_temporary: true,
                },
                ExpressionSpecifics::None,
                true,
            ));
        }
        if !is_comparison && left_is_numeric {
            return Ok((
                ExpressionResult::Value {
                    type_id: left_type,
                    is_temporary: true,
                },
                ExpressionSpecifics::None,
                true,
            ));
        }
    }

    // Custom binop in scope
    let table = comp.executer.workloads[wl].symbol_table;
    let context = comp.symbols.table(table).operator_context;
    for pending in comp
        .operators
        .pending_for(context, ContextChangeKind::Binop)
    {
        comp.executer.wait_for(wl, pending, false)?;
    }
    let (left_base, _) = comp.types.base_type(left_type);
    let (right_base, _) = comp.types.base_type(right_type);
    let key = CustomOperatorKey::Binop {
        op,
        left: left_base,
        right: right_base,
    };
    if let Some(CustomOperator::Binop {
        function,
        switch_left_and_right,
    }) = comp.operators.lookup(context, &key)
    {
        if let Some(caller) = comp.executer.workloads[wl].current_function {
            comp.program.record_call(caller, function);
        }
        let signature = comp.program.functions[function].signature;
        let return_type = comp.types.signature(signature).return_type;
        return Ok(call_result(
            return_type,
            ExpressionSpecifics::Overload {
                function: Some(function),
                switch_left_and_right,
            },
        ));
    }

    if !comp.types.is_unknown(left_type) && !comp.types.is_unknown(right_type) {
        comp.log_semantic_error(
            wl,
            SemanticErrorKind::InvalidTypeForOperation { given: left_type },
            node,
        );
    }
    Ok((unknown_value(comp), ExpressionSpecifics::None, false))
}

fn analyse_cast(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    keyword: CastKeyword,
    target: Option<NodeRef>,
    operand: NodeRef,
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let target_type = match target {
        Some(target_node) => Some(expect_type(comp, wl, target_node)?),
        None => None,
    };

    match keyword {
        CastKeyword::CastRaw => {
            // Reinterpret: sizes must match
            let Some(target_type) = target_type else {
                return Ok((unknown_value(comp), ExpressionSpecifics::None, false));
            };
            let operand_info =
                analyse_expression(comp, wl, operand, ExpressionContext::AutoDereference)?;
            let from = comp
                .types
                .without_constant(operand_info.cast_info.result_type);
            let from_size = comp.types.memory_info(from).map(|m| m.size);
            let to_size = comp.types.memory_info(target_type).map(|m| m.size);
            if from_size.is_some() && from_size != to_size {
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::InvalidCast {
                        from,
                        to: target_type,
                        reason: "raw cast between differently sized types",
                    },
                    node,
                );
                return Ok((unknown_value(comp), ExpressionSpecifics::None, false));
            }
            Ok((
                ExpressionResult::Value {
                    type_id: target_type,
                    is_temporary: true,
                },
                ExpressionSpecifics::None,
                true,
            ))
        }
        CastKeyword::Cast | CastKeyword::CastPointer => {
            let mode = match (keyword, target_type.is_some()) {
                (CastKeyword::Cast, true) => CastMode::Explicit,
                (CastKeyword::Cast, false) => CastMode::Inferred,
                (CastKeyword::CastPointer, true) => CastMode::PointerExplicit,
                (CastKeyword::CastPointer, false) => CastMode::PointerInferred,
                _ => CastMode::Explicit,
            };
            match target_type {
                Some(expected) => {
                    let info = analyse_expression(
                        comp,
                        wl,
                        operand,
                        ExpressionContext::SpecificType {
                            expected,
                            cast_mode: mode,
                        },
                    )?;
                    if let Some(reason) = info.cast_info.error {
                        comp.log_semantic_error(
                            wl,
                            SemanticErrorKind::InvalidCast {
                                from: info.cast_info.initial_type,
                                to: expected,
                                reason,
                            },
                            node,
                        );
                        return Ok((unknown_value(comp), ExpressionSpecifics::None, false));
                    }
                    Ok((
                        ExpressionResult::Value {
                            type_id: expected,
                            is_temporary: true,
                        },
                        ExpressionSpecifics::None,
                        true,
                    ))
                }
                None => {
                    // Inferred cast: the surrounding context supplies the
                    // target; pass the operand through
                    let info = analyse_expression(
                        comp,
                        wl,
                        operand,
                        ExpressionContext::Unknown {
                            due_to_error: false,
                        },
                    )?;
                    Ok((info.result, ExpressionSpecifics::None, info.is_valid))
                }
            }
        }
    }
}

fn analyse_bake(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let pass = comp.executer.workloads[wl].pass;
    let bake = match comp.analysis.bakes_by_node.get(&(node, pass)) {
        Some(&existing) => existing,
        None => {
            let table = comp.executer.workloads[wl].symbol_table;
            let analysis_pass = comp.analysis.create_pass(WorkloadId(0));
            let bake = comp.bakes.bakes.next_index();
            let analysis_workload = comp.executer.add_workload(
                WorkloadKind::BakeAnalysis { bake, node },
                table,
                analysis_pass,
            );
            comp.analysis.passes[analysis_pass].origin_workload = analysis_workload;
            let execute_workload = comp.executer.add_workload(
                WorkloadKind::BakeExecution { bake, node },
                table,
                analysis_pass,
            );
            comp.executer.register_dependency(
                execute_workload,
                analysis::Waiting {
                    on: analysis_workload,
                    can_be_broken: false,
                    failure_flag: None,
                },
            );
            let created = comp.bakes.bakes.push(crate::comptime::BakeProgress {
                node,
                result_type: None,
                result: None,
                analysis_workload,
                execute_workload,
            });
            debug_assert_eq!(created, bake);
            comp.analysis.bakes_by_node.insert((node, pass), bake);
            bake
        }
    };
    // The bake's value is computed by the interpreter; wait for it
    let execute_workload = comp.bakes.bakes[bake].execute_workload;
    comp.executer.wait_for(wl, execute_workload, false)?;
    match comp.bakes.bakes[bake].result {
        Some(constant) => Ok((
            ExpressionResult::Constant(constant),
            ExpressionSpecifics::None,
            true,
        )),
        None => Ok((unknown_value(comp), ExpressionSpecifics::None, false)),
    }
}

fn analyse_function_type(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
) -> Suspendable<(ExpressionResult, ExpressionSpecifics, bool)> {
    let (parameters, return_type) = match comp.node_kind(node) {
        NodeKind::FunctionType {
            parameters,
            return_type,
        }
        | NodeKind::FunctionLiteral {
            parameters,
            return_type,
            ..
        } => (parameters, return_type),
        _ => return Ok((unknown_value(comp), ExpressionSpecifics::None, false)),
    };
    let mut signature_parameters = Vec::new();
    for &parameter in &parameters {
        let parameter_node = NodeRef::new(node.unit, parameter);
        let NodeKind::Parameter {
            name, type_node, ..
        } = comp.node_kind(parameter_node)
        else {
            continue;
        };
        let type_id = expect_type(comp, wl, NodeRef::new(node.unit, type_node))?;
        signature_parameters.push(crate::types::SignatureParameter {
            name,
            type_id,
            required: true,
            requires_named_addressing: false,
            must_not_be_set: false,
            default_value: None,
        });
    }
    let return_type = match return_type {
        Some(return_node) => Some(expect_type(comp, wl, NodeRef::new(node.unit, return_node))?),
        None => None,
    };
    let signature = comp.types.register_signature(crate::types::CallSignature {
        parameters: signature_parameters,
        return_type,
    });
    Ok((
        ExpressionResult::Type(comp.types.make_function_pointer(signature, false)),
        ExpressionSpecifics::None,
        true,
    ))
}

// ----------------------------------------------------------------------
// Context application: the implicit cast ladder
// ----------------------------------------------------------------------

/// Compute the cast needed to satisfy the caller's context. Applied to
/// value results; type results pass through unchanged.
fn apply_context(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    result: &ExpressionResult,
    context: ExpressionContext,
) -> CastInfo {
    let value_type = match result {
        ExpressionResult::Value { type_id, .. } => *type_id,
        ExpressionResult::Constant(constant) => comp.constants.constant(*constant).type_id,
        ExpressionResult::Function(function) => {
            let signature = comp.program.functions[*function].signature;
            comp.types.make_function_pointer(signature, false)
        }
        ExpressionResult::Type(_) => {
            if let ExpressionContext::SpecificType { expected, .. } = context {
                let stripped = comp.types.without_constant(expected);
                if stripped == comp.types.predefined.type_handle {
                    // A type value is exactly what a Type_Handle wants
                    return CastInfo::identity(stripped);
                }
                comp.log_semantic_error(wl, SemanticErrorKind::ExpectedValueGotType, node);
            }
            return CastInfo::identity(comp.types.predefined.unknown);
        }
        _ => {
            // Modules, dot-calls, polymorphic entities, and valueless
            // calls carry no value type
            if let ExpressionContext::SpecificType { expected, .. } = context {
                if !comp.types.is_unknown(expected) {
                    comp.log_semantic_error(wl, SemanticErrorKind::ExpectedValueGotType, node);
                }
            }
            return CastInfo::identity(comp.types.predefined.unknown);
        }
    };

    match context {
        ExpressionContext::Unknown { .. } => CastInfo::identity(value_type),
        ExpressionContext::AutoDereference => {
            // Apply `*` until a non-pointer type is reached
            let mut cast = CastInfo::identity(value_type);
            let mut current = comp.types.without_constant(value_type);
            while let Datatype::Pointer {
                element,
                optional: false,
            } = *comp.types.datatype(current)
            {
                cast.deref_count += 1;
                current = comp.types.without_constant(element);
            }
            cast.result_type = current;
            cast
        }
        ExpressionContext::SpecificType {
            expected,
            cast_mode,
        } => {
            let mut cast = implicit_cast_ladder(comp, wl, value_type, expected, cast_mode);
            if let Some(reason) = cast.error {
                if cast_mode == CastMode::Implicit
                    && !comp.types.is_unknown(value_type)
                    && !comp.types.is_unknown(expected)
                {
                    let _ = reason;
                    comp.log_semantic_error(
                        wl,
                        SemanticErrorKind::TypeMismatch {
                            expected,
                            given: value_type,
                        },
                        node,
                    );
                } else if comp.types.is_unknown(value_type) || comp.types.is_unknown(expected) {
                    // Downgraded: caused by an upstream unknown
                    comp.executer.workloads[wl].errors_due_to_unknown_count += 1;
                    cast.error = None;
                    cast.cast = CastType::Unknown;
                    cast.result_type = expected;
                }
            }
            cast
        }
    }
}

/// The implicit cast rules, tried in order:
/// 1. identity, 2. pointer/optional-pointer conversions, 3. integer
/// widening / int-to-float / array-to-slice, 4. auto-dereference,
/// 5. user-defined cast in scope, 6. failure with a specific reason.
pub fn implicit_cast_ladder(
    comp: &mut Compiler,
    wl: WorkloadId,
    from: TypeId,
    to: TypeId,
    mode: CastMode,
) -> CastInfo {
    let mut cast = CastInfo::identity(from);
    cast.result_type = to;

    let from_stripped = comp.types.without_constant(from);
    let to_stripped = comp.types.without_constant(to);

    // 1. Identity (constness is a modifier, not a different value shape)
    if from_stripped == to_stripped {
        cast.cast = CastType::NoCast;
        return cast;
    }
    if comp.types.is_unknown(from_stripped) || comp.types.is_unknown(to_stripped) {
        cast.cast = CastType::Unknown;
        return cast;
    }
    if mode == CastMode::None {
        // No conversions permitted in this position
        cast.cast = CastType::Invalid;
        cast.error = Some("types must match exactly here");
        cast.result_type = from_stripped;
        return cast;
    }

    // 2. Pointer and optional-pointer conversions
    let from_type = comp.types.datatype(from_stripped).clone();
    let to_type = comp.types.datatype(to_stripped).clone();
    match (&from_type, &to_type) {
        (
            Datatype::Pointer {
                element: from_element,
                optional: from_optional,
            },
            Datatype::Pointer {
                element: to_element,
                optional: to_optional,
            },
        ) if from_element == to_element => {
            if !*from_optional && *to_optional {
                // Adding `?` is always safe
                cast.cast = CastType::PointerLevel;
                return cast;
            }
            if *from_optional && !*to_optional && mode != CastMode::Implicit {
                // Removing `?` needs an explicit cast
                cast.cast = CastType::PointerLevel;
                return cast;
            }
        }
        (Datatype::Pointer { .. }, Datatype::Primitive { class, .. })
        | (Datatype::FunctionPointer { .. }, Datatype::Primitive { class, .. })
            if *class == PrimitiveClass::Address =>
        {
            // Any pointer drops to a bare address
            cast.cast = CastType::PointerLevel;
            return cast;
        }
        (Datatype::Primitive { class, .. }, Datatype::Pointer { optional: true, .. })
            if *class == PrimitiveClass::Address =>
        {
            // Null/address into an optional pointer
            cast.cast = CastType::PointerLevel;
            return cast;
        }
        _ => {}
    }

    // 3. Integer widening (same signedness), int to float of wider or
    //    equal mantissa, sized array to slice of the same element
    match (&from_type, &to_type) {
        (
            Datatype::Primitive {
                class: PrimitiveClass::Int,
                signed: from_signed,
                width: from_width,
                ..
            },
            Datatype::Primitive {
                class: PrimitiveClass::Int,
                signed: to_signed,
                width: to_width,
                ..
            },
        ) => {
            if from_signed == to_signed && to_width >= from_width {
                cast.cast = CastType::IntegerWiden;
                return cast;
            }
            if mode != CastMode::Implicit {
                // Explicit casts may narrow and change signedness
                cast.cast = CastType::IntegerWiden;
                return cast;
            }
        }
        (
            Datatype::Primitive {
                class: PrimitiveClass::Int,
                width: int_width,
                ..
            },
            Datatype::Primitive {
                class: PrimitiveClass::Float,
                width: float_width,
                ..
            },
        ) => {
            let mantissa_bits: u32 = if *float_width == 8 { 52 } else { 24 };
            let int_bits = *int_width as u32 * 8;
            if mantissa_bits >= int_bits - 1 || mode != CastMode::Implicit {
                cast.cast = CastType::IntegerToFloat;
                return cast;
            }
        }
        (
            Datatype::Primitive {
                class: PrimitiveClass::Float,
                width: from_width,
                ..
            },
            Datatype::Primitive {
                class: PrimitiveClass::Float,
                width: to_width,
                ..
            },
        ) => {
            if to_width >= from_width || mode != CastMode::Implicit {
                cast.cast = CastType::FloatWiden;
                return cast;
            }
        }
        (
            Datatype::Array {
                element: from_element,
                count_known: true,
                ..
            },
            Datatype::Slice {
                element: to_element,
                ..
            },
        ) if from_element == to_element => {
            cast.cast = CastType::ArrayToSlice;
            return cast;
        }
        (
            Datatype::Enum(_),
            Datatype::Primitive {
                class: PrimitiveClass::Int,
                ..
            },
        ) if mode != CastMode::Implicit => {
            cast.cast = CastType::EnumToInt;
            return cast;
        }
        (Datatype::Struct(_), Datatype::StructPattern { base_struct }) => {
            // Structural match against a polymorphic struct's instances
            let expected_header = comp.analysis.base_headers.get(base_struct).copied();
            let actual_header = comp
                .analysis
                .instance_headers
                .get(&from_stripped)
                .copied();
            if expected_header.is_some() && expected_header == actual_header {
                cast.cast = CastType::NoCast;
                return cast;
            }
        }
        _ => {}
    }

    // 4. Auto-dereference chain: `*p` applied until the pointee matches
    {
        let mut current = from_stripped;
        let mut derefs = 0;
        while let Datatype::Pointer {
            element,
            optional: false,
        } = *comp.types.datatype(current)
        {
            derefs += 1;
            current = comp.types.without_constant(element);
            if current == to_stripped {
                cast.deref_count = derefs;
                cast.cast = CastType::NoCast;
                return cast;
            }
        }
    }

    // 5. User-defined cast in scope
    let table = comp.executer.workloads[wl].symbol_table;
    let context = comp.symbols.table(table).operator_context;
    let (from_base, _) = comp.types.base_type(from_stripped);
    let (to_base, _) = comp.types.base_type(to_stripped);
    let key = CustomOperatorKey::Cast {
        from: from_base,
        to: Some(to_base),
    };
    if let Some(CustomOperator::Cast {
        function,
        cast_mode: registered_mode,
    }) = comp.operators.lookup(context, &key)
    {
        let allowed = match registered_mode {
            CastMode::Implicit => true,
            _ => mode != CastMode::Implicit,
        };
        if allowed {
            if let Some(caller) = comp.executer.workloads[wl].current_function {
                comp.program.record_call(caller, function);
            }
            cast.cast = CastType::Custom;
            cast.custom_cast_function = Some(function);
            return cast;
        }
    }

    // 6. Failure with a specific reason
    cast.cast = CastType::Invalid;
    cast.result_type = from_stripped;
    cast.error = Some(match (&from_type, &to_type) {
        (Datatype::Pointer { .. }, Datatype::Pointer { .. }) => {
            "pointer element types differ"
        }
        (Datatype::Primitive { .. }, Datatype::Primitive { .. }) => {
            "no implicit conversion between these primitive types"
        }
        (Datatype::Struct(_), _) | (_, Datatype::Struct(_)) => {
            "struct types are nominal and do not convert"
        }
        _ => "no conversion between these types",
    });
    cast
}

/// Wait for pending cast-context changes before running the ladder in
/// contexts where custom casts may apply.
pub fn wait_for_pending_casts(comp: &mut Compiler, wl: WorkloadId) -> Suspendable<()> {
    let table = comp.executer.workloads[wl].symbol_table;
    let context = comp.symbols.table(table).operator_context;
    for pending in comp.operators.pending_for(context, ContextChangeKind::Cast) {
        comp.executer.wait_for(wl, pending, false)?;
    }
    Ok(())
}
