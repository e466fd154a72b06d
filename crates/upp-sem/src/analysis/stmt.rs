//! Statement and code-block analysis: control flow, defers, loops,
//! switches, and local definitions.

use upp_par::ast::{ContextChangeKind, DefinitionKind, NodeKind};
use upp_par::NodeId;

use crate::analysis::expr;
use crate::comptime::{evaluate_comptime, ComptimeValue};
use crate::errors::SemanticErrorKind;
use crate::operators::{CastMode, CustomOperator, CustomOperatorKey};
use crate::passes::{
    AnalysisInfo, CaseInfo, CodeBlockInfo, ControlFlow, ExpressionContext, ExpressionResult,
    IteratorFunctions, StatementInfo, StatementSpecifics,
};
use crate::program::FunctionId;
use crate::symbols::{SymbolAccessLevel, SymbolKind};
use crate::types::Datatype;
use crate::workload::{Suspendable, WorkloadId};
use crate::{Compiler, NodeRef};

/// One enclosing block while analysing a body; tracks the defer stack and
/// loop/function boundaries for exit-point emission.
struct BlockFrame {
    node: NodeId,
    is_loop_body: bool,
    is_function_root: bool,
    in_defer: bool,
    deferred: Vec<NodeId>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    FunctionRoot,
    Plain,
    LoopBody,
    DeferBody,
}

/// Analyse a function body: statements, control flow, and the
/// missing-return check. Restarts cleanly after every suspension.
pub fn run_function_body(
    comp: &mut Compiler,
    wl: WorkloadId,
    function: FunctionId,
    node: NodeRef,
) -> Suspendable<()> {
    let NodeKind::FunctionLiteral {
        body: Some(body), ..
    } = comp.node_kind(node)
    else {
        return Ok(());
    };

    comp.executer.workloads[wl].current_function = Some(function);
    comp.executer.workloads[wl].statement_reachable = true;
    comp.executer.workloads[wl].block_stack.clear();

    let mut frames = Vec::new();
    let body_ref = NodeRef::new(node.unit, body);
    let flow = analyse_block(comp, wl, body_ref, &mut frames, BlockKind::FunctionRoot)?;

    let signature = comp.program.functions[function].signature;
    let has_return_type = comp.types.signature(signature).return_type.is_some();
    if has_return_type && flow != ControlFlow::Returns {
        comp.log_semantic_error(wl, SemanticErrorKind::MissingReturn, node);
    }
    Ok(())
}

fn analyse_block(
    comp: &mut Compiler,
    wl: WorkloadId,
    block: NodeRef,
    frames: &mut Vec<BlockFrame>,
    kind: BlockKind,
) -> Suspendable<ControlFlow> {
    let NodeKind::CodeBlock { statements } = comp.node_kind(block) else {
        return Ok(ControlFlow::Sequential);
    };
    let pass = comp.executer.workloads[wl].pass;

    // Block scope: a child table under the current one
    let outer_table = comp.executer.workloads[wl].symbol_table;
    let table = match comp.analysis.block_tables.get(&(block, pass)) {
        Some(&existing) => existing,
        None => {
            let context = comp.symbols.table(outer_table).operator_context;
            let created = comp
                .symbols
                .create_table(Some((outer_table, SymbolAccessLevel::Internal)), context);
            comp.analysis.block_tables.insert((block, pass), created);
            created
        }
    };
    comp.executer.workloads[wl].symbol_table = table;
    comp.executer.workloads[wl].block_stack.push(block.node);
    frames.push(BlockFrame {
        node: block.node,
        is_loop_body: kind == BlockKind::LoopBody,
        is_function_root: kind == BlockKind::FunctionRoot,
        in_defer: kind == BlockKind::DeferBody,
        deferred: Vec::new(),
    });

    let mut flow = ControlFlow::Sequential;
    let mut unreachable_reported = false;
    for &statement in &statements {
        let statement_ref = NodeRef::new(block.unit, statement);
        if flow != ControlFlow::Sequential && !unreachable_reported {
            comp.log_semantic_error(wl, SemanticErrorKind::UnreachableStatement, statement_ref);
            unreachable_reported = true;
        }
        let result = analyse_statement(comp, wl, statement_ref, frames);
        let statement_flow = match result {
            Ok(statement_flow) => statement_flow,
            Err(waiting) => {
                // Unwind our bookkeeping; the whole body re-runs on resume
                frames.pop();
                comp.executer.workloads[wl].block_stack.pop();
                comp.executer.workloads[wl].symbol_table = outer_table;
                return Err(waiting);
            }
        };
        if flow == ControlFlow::Sequential {
            flow = statement_flow;
        }
    }

    let frame = frames.pop().expect("block frame pushed above");
    comp.executer.workloads[wl].block_stack.pop();
    comp.executer.workloads[wl].symbol_table = outer_table;
    comp.analysis.set_info(
        block,
        pass,
        AnalysisInfo::CodeBlock(CodeBlockInfo {
            symbol_table: table,
            flow,
            deferred: frame.deferred,
        }),
    );
    Ok(flow)
}

fn analyse_statement(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    frames: &mut Vec<BlockFrame>,
) -> Suspendable<ControlFlow> {
    let kind = comp.node_kind(node);
    let pass = comp.executer.workloads[wl].pass;
    let bool_type = comp.types.predefined.bool_type;

    let (flow, specifics) = match kind {
        NodeKind::CodeBlock { .. } => {
            let flow = analyse_block(comp, wl, node, frames, BlockKind::Plain)?;
            (flow, StatementSpecifics::None)
        }
        NodeKind::ExpressionStatement { expr: value } => {
            expr::analyse_expression(
                comp,
                wl,
                NodeRef::new(node.unit, value),
                ExpressionContext::Unknown {
                    due_to_error: false,
                },
            )?;
            (ControlFlow::Sequential, StatementSpecifics::None)
        }
        NodeKind::Definition {
            name,
            kind: definition_kind,
            type_node,
            value,
        } => {
            analyse_local_definition(
                comp,
                wl,
                node,
                name,
                definition_kind,
                type_node.map(|t| NodeRef::new(node.unit, t)),
                value.map(|v| NodeRef::new(node.unit, v)),
            )?;
            (ControlFlow::Sequential, StatementSpecifics::None)
        }
        NodeKind::Assignment { target, value } => {
            let target_info = expr::analyse_expression(
                comp,
                wl,
                NodeRef::new(node.unit, target),
                ExpressionContext::Unknown {
                    due_to_error: false,
                },
            )?;
            let expected = match &target_info.result {
                ExpressionResult::Value { type_id, .. } => *type_id,
                _ => comp.types.predefined.unknown,
            };
            expr::analyse_expression(
                comp,
                wl,
                NodeRef::new(node.unit, value),
                ExpressionContext::SpecificType {
                    expected,
                    cast_mode: CastMode::Implicit,
                },
            )?;
            (ControlFlow::Sequential, StatementSpecifics::None)
        }
        NodeKind::IfStatement {
            condition,
            then_block,
            else_block,
        } => {
            expr::analyse_expression(
                comp,
                wl,
                NodeRef::new(node.unit, condition),
                ExpressionContext::SpecificType {
                    expected: bool_type,
                    cast_mode: CastMode::Implicit,
                },
            )?;
            let then_flow = analyse_block(
                comp,
                wl,
                NodeRef::new(node.unit, then_block),
                frames,
                BlockKind::Plain,
            )?;
            let else_flow = match else_block {
                Some(else_node) => {
                    let else_ref = NodeRef::new(node.unit, else_node);
                    match comp.node_kind(else_ref) {
                        NodeKind::IfStatement { .. } => {
                            analyse_statement(comp, wl, else_ref, frames)?
                        }
                        _ => analyse_block(comp, wl, else_ref, frames, BlockKind::Plain)?,
                    }
                }
                None => ControlFlow::Sequential,
            };
            let flow = match (then_flow, else_flow) {
                (ControlFlow::Returns, ControlFlow::Returns) => ControlFlow::Returns,
                (ControlFlow::Sequential, _) | (_, ControlFlow::Sequential) => {
                    ControlFlow::Sequential
                }
                _ => ControlFlow::Stops,
            };
            (flow, StatementSpecifics::None)
        }
        NodeKind::WhileStatement { condition, block } => {
            let condition_ref = NodeRef::new(node.unit, condition);
            expr::analyse_expression(
                comp,
                wl,
                condition_ref,
                ExpressionContext::SpecificType {
                    expected: bool_type,
                    cast_mode: CastMode::Implicit,
                },
            )?;
            let block_ref = NodeRef::new(node.unit, block);
            let body_flow = analyse_block(comp, wl, block_ref, frames, BlockKind::LoopBody)?;

            // A constant condition makes the loop trivially degenerate
            let mut flow = ControlFlow::Sequential;
            match evaluate_comptime(comp, condition_ref, pass) {
                Ok(ComptimeValue::Bool(false)) => {
                    comp.log_semantic_error(
                        wl,
                        SemanticErrorKind::WhileLoopTriviallyTerminating,
                        condition_ref,
                    );
                }
                Ok(ComptimeValue::Bool(true)) => {
                    let has_break = subtree_contains(comp, block_ref, |kind| {
                        matches!(kind, NodeKind::BreakStatement)
                    });
                    if body_flow == ControlFlow::Returns {
                        comp.log_semantic_error(
                            wl,
                            SemanticErrorKind::WhileLoopAlwaysReturns,
                            condition_ref,
                        );
                        flow = ControlFlow::Returns;
                    } else if !has_break {
                        comp.log_semantic_error(
                            wl,
                            SemanticErrorKind::WhileLoopNonTerminating,
                            condition_ref,
                        );
                        flow = ControlFlow::Stops;
                    }
                }
                _ => {}
            }
            (flow, StatementSpecifics::None)
        }
        NodeKind::ForeachStatement {
            loop_variable,
            index_variable,
            iterable,
            block,
        } => {
            let foreach = analyse_foreach(
                comp,
                wl,
                node,
                loop_variable,
                index_variable,
                NodeRef::new(node.unit, iterable),
                NodeRef::new(node.unit, block),
                frames,
            )?;
            (ControlFlow::Sequential, foreach)
        }
        NodeKind::SwitchStatement { value, cases } => {
            let specifics = analyse_switch(
                comp,
                wl,
                node,
                NodeRef::new(node.unit, value),
                &cases,
                frames,
            )?;
            (ControlFlow::Sequential, specifics)
        }
        NodeKind::DeferStatement { block } => {
            if frames.iter().any(|frame| frame.in_defer) {
                comp.log_semantic_error(wl, SemanticErrorKind::NestedDefer, node);
                return Ok(ControlFlow::Sequential);
            }
            let block_ref = NodeRef::new(node.unit, block);
            // Returns and nested defers inside the body are rejected by
            // the in-defer checks during block analysis
            analyse_block(comp, wl, block_ref, frames, BlockKind::DeferBody)?;
            if let Some(frame) = frames.last_mut() {
                frame.deferred.push(block);
            }
            (ControlFlow::Sequential, StatementSpecifics::None)
        }
        NodeKind::ReturnStatement { value } => {
            if frames.iter().any(|frame| frame.in_defer) {
                comp.log_semantic_error(wl, SemanticErrorKind::DeferContainsReturn, node);
            }
            let function = comp.executer.workloads[wl].current_function;
            let return_type = function.and_then(|f| {
                let signature = comp.program.functions[f].signature;
                comp.types.signature(signature).return_type
            });
            match (value, return_type) {
                (Some(value_node), Some(expected)) => {
                    expr::analyse_expression(
                        comp,
                        wl,
                        NodeRef::new(node.unit, value_node),
                        ExpressionContext::SpecificType {
                            expected,
                            cast_mode: CastMode::Implicit,
                        },
                    )?;
                }
                (Some(value_node), None) => {
                    let value_ref = NodeRef::new(node.unit, value_node);
                    expr::analyse_expression(
                        comp,
                        wl,
                        value_ref,
                        ExpressionContext::Unknown {
                            due_to_error: false,
                        },
                    )?;
                    comp.log_semantic_error(
                        wl,
                        SemanticErrorKind::TypeMismatch {
                            expected: comp.types.predefined.unknown,
                            given: comp.types.predefined.unknown,
                        },
                        value_ref,
                    );
                }
                (None, Some(expected)) => {
                    comp.log_semantic_error(
                        wl,
                        SemanticErrorKind::TypeMismatch {
                            expected,
                            given: comp.types.predefined.unknown,
                        },
                        node,
                    );
                }
                (None, None) => {}
            }
            // Deferred blocks of every enclosing scope run before the
            // return, innermost-first
            let deferred_blocks = collect_deferred(frames, |_| true);
            (
                ControlFlow::Returns,
                StatementSpecifics::Return { deferred_blocks },
            )
        }
        NodeKind::BreakStatement => {
            if !frames.iter().any(|frame| frame.is_loop_body) {
                comp.log_semantic_error(wl, SemanticErrorKind::BreakOutsideLoop, node);
            }
            let deferred_blocks = collect_deferred(frames, |frame| !frame.is_loop_body);
            (
                ControlFlow::Stops,
                StatementSpecifics::Break { deferred_blocks },
            )
        }
        NodeKind::ContinueStatement => {
            if !frames.iter().any(|frame| frame.is_loop_body) {
                comp.log_semantic_error(wl, SemanticErrorKind::ContinueOutsideLoop, node);
            }
            let deferred_blocks = collect_deferred(frames, |frame| !frame.is_loop_body);
            (
                ControlFlow::Stops,
                StatementSpecifics::Continue { deferred_blocks },
            )
        }
        NodeKind::ErrorNode => (ControlFlow::Sequential, StatementSpecifics::None),
        _ => {
            // An expression in statement position
            if kind.is_expression() {
                expr::analyse_expression(
                    comp,
                    wl,
                    node,
                    ExpressionContext::Unknown {
                        due_to_error: false,
                    },
                )?;
            }
            (ControlFlow::Sequential, StatementSpecifics::None)
        }
    };

    comp.analysis.set_info(
        node,
        pass,
        AnalysisInfo::Statement(StatementInfo {
            flow,
            specifics,
        }),
    );
    Ok(flow)
}

/// Deferred blocks emitted at an exit point, in LIFO order, scoped by the
/// exit depth: frames are walked innermost-first while `keep_walking`
/// holds, and the boundary frame's defers are included.
fn collect_deferred(frames: &[BlockFrame], keep_walking: impl Fn(&BlockFrame) -> bool) -> Vec<NodeId> {
    let mut deferred = Vec::new();
    for frame in frames.iter().rev() {
        deferred.extend(frame.deferred.iter().rev().copied());
        if !keep_walking(frame) || frame.is_function_root {
            break;
        }
    }
    deferred
}

fn analyse_local_definition(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    name: upp_util::Identifier,
    kind: DefinitionKind,
    type_node: Option<NodeRef>,
    value_node: Option<NodeRef>,
) -> Suspendable<()> {
    let declared = match type_node {
        Some(type_ref) => Some(expr::expect_type(comp, wl, type_ref)?),
        None => None,
    };
    let value_info = match value_node {
        Some(value_ref) => {
            let context = match declared {
                Some(expected) => ExpressionContext::SpecificType {
                    expected,
                    cast_mode: CastMode::Implicit,
                },
                None => ExpressionContext::Unknown {
                    due_to_error: false,
                },
            };
            Some(expr::analyse_expression(comp, wl, value_ref, context)?)
        }
        None => None,
    };

    let table = comp.executer.workloads[wl].symbol_table;
    let text_index = comp.node_text_index(node);

    if kind == DefinitionKind::Comptime {
        // Local comptime definition: fold the value now
        let pass = comp.executer.workloads[wl].pass;
        let symbol_kind = match value_node {
            Some(value_ref) => match value_info.as_ref().map(|info| &info.result) {
                Some(ExpressionResult::Type(type_id)) => SymbolKind::Type(*type_id),
                Some(ExpressionResult::Function(function)) => SymbolKind::Function(*function),
                Some(ExpressionResult::Constant(constant)) => {
                    SymbolKind::ComptimeValue(*constant)
                }
                _ => match evaluate_comptime(comp, value_ref, pass) {
                    Ok(value) => {
                        match crate::analysis::comptime_value_to_constant(comp, value) {
                            Some(constant) => SymbolKind::ComptimeValue(constant),
                            None => SymbolKind::Error,
                        }
                    }
                    Err(message) => {
                        comp.log_semantic_error(
                            wl,
                            SemanticErrorKind::ComptimeEvaluationFailed { message },
                            value_ref,
                        );
                        SymbolKind::Error
                    }
                },
            },
            None => SymbolKind::Error,
        };
        let symbol = comp.symbols.define_symbol(
            table,
            name,
            symbol_kind,
            SymbolAccessLevel::Internal,
            Some(node),
            text_index,
        );
        comp.analysis.set_info(
            node,
            comp.executer.workloads[wl].pass,
            AnalysisInfo::DefinitionSymbol { symbol },
        );
        return Ok(());
    }

    let variable_type = declared
        .or_else(|| {
            value_info
                .as_ref()
                .map(|info| info.cast_info.result_type)
        })
        .unwrap_or(comp.types.predefined.unknown);
    let symbol = comp.symbols.define_symbol(
        table,
        name,
        SymbolKind::Variable {
            type_id: variable_type,
        },
        SymbolAccessLevel::Internal,
        Some(node),
        text_index,
    );
    // Re-runs reuse the symbol; refresh the resolved type
    if let SymbolKind::Variable { type_id } = &mut comp.symbols.symbol_mut(symbol).kind {
        *type_id = variable_type;
    }
    if comp.symbols.find_duplicate(table, symbol).is_some() {
        comp.log_semantic_error(wl, SemanticErrorKind::SymbolRedefined { id: name }, node);
    }
    let pass = comp.executer.workloads[wl].pass;
    comp.analysis
        .set_info(node, pass, AnalysisInfo::DefinitionSymbol { symbol });
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn analyse_foreach(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    loop_variable: upp_util::Identifier,
    index_variable: Option<upp_util::Identifier>,
    iterable: NodeRef,
    block: NodeRef,
    frames: &mut Vec<BlockFrame>,
) -> Suspendable<StatementSpecifics> {
    let iterable_info =
        expr::analyse_expression(comp, wl, iterable, ExpressionContext::AutoDereference)?;
    let iterable_type = comp
        .types
        .without_constant(iterable_info.cast_info.result_type);

    // Element type: arrays and slices iterate directly; other types go
    // through a custom iterator operator
    let mut iterator_functions: Option<IteratorFunctions> = None;
    let element_type = match comp.types.datatype(iterable_type).clone() {
        Datatype::Array { element, .. } | Datatype::Slice { element, .. } => element,
        _ => {
            let table = comp.executer.workloads[wl].symbol_table;
            let context = comp.symbols.table(table).operator_context;
            for pending in comp
                .operators
                .pending_for(context, ContextChangeKind::Iterator)
            {
                comp.executer.wait_for(wl, pending, false)?;
            }
            let (base, _) = comp.types.base_type(iterable_type);
            let key = CustomOperatorKey::Iterator { datatype: base };
            match comp.operators.lookup(context, &key) {
                Some(CustomOperator::Iterator {
                    create,
                    has_next,
                    next,
                    get_value,
                }) => {
                    iterator_functions = Some(IteratorFunctions {
                        create,
                        has_next,
                        next,
                        get_value,
                    });
                    for function in [create, has_next, next, get_value] {
                        if let Some(caller) = comp.executer.workloads[wl].current_function {
                            comp.program.record_call(caller, function);
                        }
                    }
                    let signature = comp.program.functions[get_value].signature;
                    comp.types
                        .signature(signature)
                        .return_type
                        .unwrap_or(comp.types.predefined.unknown)
                }
                _ => {
                    if !comp.types.is_unknown(iterable_type) {
                        comp.log_semantic_error(
                            wl,
                            SemanticErrorKind::InvalidTypeForOperation {
                                given: iterable_type,
                            },
                            iterable,
                        );
                    }
                    comp.types.predefined.unknown
                }
            }
        }
    };

    // Loop variables live in a dedicated scope around the body
    let pass = comp.executer.workloads[wl].pass;
    let outer_table = comp.executer.workloads[wl].symbol_table;
    let loop_table = match comp.analysis.block_tables.get(&(node, pass)) {
        Some(&existing) => existing,
        None => {
            let context = comp.symbols.table(outer_table).operator_context;
            let created = comp
                .symbols
                .create_table(Some((outer_table, SymbolAccessLevel::Internal)), context);
            comp.analysis.block_tables.insert((node, pass), created);
            created
        }
    };
    let text_index = comp.node_text_index(node);
    let loop_symbol = comp.symbols.define_symbol(
        loop_table,
        loop_variable,
        SymbolKind::Variable {
            type_id: element_type,
        },
        SymbolAccessLevel::Internal,
        Some(node),
        text_index,
    );
    if let SymbolKind::Variable { type_id } = &mut comp.symbols.symbol_mut(loop_symbol).kind {
        *type_id = element_type;
    }
    let index_symbol = match index_variable {
        Some(index_id) => {
            let usize_type = comp.types.predefined.usize;
            Some(comp.symbols.define_symbol(
                loop_table,
                index_id,
                SymbolKind::Variable { type_id: usize_type },
                SymbolAccessLevel::Internal,
                Some(node),
                text_index,
            ))
        }
        None => None,
    };

    comp.executer.workloads[wl].symbol_table = loop_table;
    let body_result = analyse_block(comp, wl, block, frames, BlockKind::LoopBody);
    comp.executer.workloads[wl].symbol_table = outer_table;
    body_result?;

    Ok(StatementSpecifics::ForeachLoop {
        symbol_table: loop_table,
        loop_variable: loop_symbol,
        index_variable: index_symbol,
        iterator: iterator_functions,
    })
}

fn analyse_switch(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    value: NodeRef,
    cases: &[NodeId],
    frames: &mut Vec<BlockFrame>,
) -> Suspendable<StatementSpecifics> {
    let value_info = expr::analyse_expression(comp, wl, value, ExpressionContext::AutoDereference)?;
    let value_type = comp
        .types
        .without_constant(value_info.cast_info.result_type);
    let pass = comp.executer.workloads[wl].pass;

    let base_enum = match comp.types.datatype(value_type) {
        Datatype::Enum(enum_type) => {
            if enum_type.members.is_empty() {
                comp.log_semantic_error(wl, SemanticErrorKind::SwitchOnEmptyEnum, value);
            }
            Some(value_type)
        }
        Datatype::Primitive {
            class: crate::types::PrimitiveClass::Int,
            ..
        } => None,
        _ => {
            if !comp.types.is_unknown(value_type) {
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::InvalidTypeForOperation { given: value_type },
                    value,
                );
            }
            None
        }
    };

    for &case in cases {
        let case_ref = NodeRef::new(node.unit, case);
        let NodeKind::SwitchCase {
            value: case_value,
            block,
        } = comp.node_kind(case_ref)
        else {
            continue;
        };
        let mut info = CaseInfo {
            is_valid: true,
            case_value: 0,
        };
        if let Some(case_value_node) = case_value {
            let case_value_ref = NodeRef::new(node.unit, case_value_node);
            expr::analyse_expression(
                comp,
                wl,
                case_value_ref,
                ExpressionContext::Unknown {
                    due_to_error: false,
                },
            )?;
            match evaluate_comptime(comp, case_value_ref, pass)
                .ok()
                .and_then(|v| v.as_int())
            {
                Some(case_int) => {
                    info.case_value = case_int;
                    if let Some(enum_id) = base_enum {
                        let known = comp
                            .types
                            .enum_type(enum_id)
                            .map(|e| e.members.iter().any(|m| m.value == case_int))
                            .unwrap_or(false);
                        if !known {
                            info.is_valid = false;
                            comp.log_semantic_error(
                                wl,
                                SemanticErrorKind::InvalidSwitchCase,
                                case_value_ref,
                            );
                        }
                    }
                }
                None => {
                    info.is_valid = false;
                    comp.log_semantic_error(
                        wl,
                        SemanticErrorKind::InvalidSwitchCase,
                        case_value_ref,
                    );
                }
            }
        }
        comp.analysis
            .set_info(case_ref, pass, AnalysisInfo::Case(info));
        analyse_block(
            comp,
            wl,
            NodeRef::new(node.unit, block),
            frames,
            BlockKind::Plain,
        )?;
    }

    Ok(StatementSpecifics::Switch { base_enum })
}

/// Does any node in the subtree satisfy the predicate? Defer bodies and
/// nested functions still count; callers filter what they scan.
fn subtree_contains(
    comp: &Compiler,
    root: NodeRef,
    predicate: impl Fn(&NodeKind) -> bool,
) -> bool {
    let ast = comp.ast(root.unit);
    let mut stack = ast.kind(root.node).children();
    while let Some(node) = stack.pop() {
        let kind = ast.kind(node);
        if predicate(kind) {
            return true;
        }
        // Nested function literals are separate bodies
        if matches!(kind, NodeKind::FunctionLiteral { .. }) {
            continue;
        }
        stack.extend(kind.children());
    }
    false
}
