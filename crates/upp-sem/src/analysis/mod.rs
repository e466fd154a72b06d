//! The semantic analysis workloads.
//!
//! [`execute_workload`] is the single entry the scheduler steps. Every
//! workload body is written so a re-run after a suspension is idempotent:
//! symbol definitions key on their definition node, and every created
//! function/struct/header/bake is memoized by `(node, pass)` in
//! [`crate::passes::AnalysisData`].

pub mod expr;
pub mod poly_inst;
pub mod stmt;

use upp_par::ast::{ContextChangeKind, DefinitionKind, ImportKind, NodeKind};
use upp_util::Identifier;

use crate::comptime::ComptimeValue;
use crate::errors::SemanticErrorKind;
use crate::operators::{CastMode, ContextId, CustomOperator, CustomOperatorKey};
use crate::passes::{ExpressionContext, ExpressionResult, PassId};
use crate::poly::{PolyHeader, PolyValue};
use crate::program::{FunctionId, FunctionKind};
use crate::symbols::{SymbolAccessLevel, SymbolId, SymbolKind, TableId};
use crate::types::{CallSignature, Datatype, SignatureParameter, TypeId};
use crate::workload::{Suspendable, WorkloadId, WorkloadKind};
use crate::{Compiler, NodeRef};

/// Seed discovery of one module: creates its symbol-table-ready event and
/// the module-analysis workload, and chains both into the global
/// all-tables-ready event.
pub fn add_module_discovery(
    comp: &mut Compiler,
    module_node: NodeRef,
    table: TableId,
    _context: ContextId,
) -> WorkloadId {
    let event = comp.executer.add_workload(
        WorkloadKind::Event {
            description: "module symbol table ready",
        },
        table,
        PassId(0),
    );
    let pass = comp.analysis.create_pass(event);
    let module_workload = comp.executer.add_workload(
        WorkloadKind::ModuleAnalysis {
            module_node,
            table,
            table_ready_event: event,
        },
        table,
        pass,
    );
    // Fix the pass's origin to the module workload itself
    comp.analysis.passes[pass].origin_workload = module_workload;
    comp.executer.register_dependency(
        event,
        crate::workload::Waiting {
            on: module_workload,
            can_be_broken: false,
            failure_flag: None,
        },
    );
    comp.executer.register_dependency(
        comp.all_tables_ready,
        crate::workload::Waiting {
            on: module_workload,
            can_be_broken: false,
            failure_flag: None,
        },
    );
    comp.table_ready.insert(table, event);
    comp.analysis
        .module_tables_by_node
        .insert(module_node, table);
    module_workload
}

/// Step one workload. `Ok` means finished; `Err` suspends on a
/// dependency.
pub fn execute_workload(comp: &mut Compiler, id: WorkloadId) -> Suspendable<()> {
    let kind = comp.executer.workloads[id].kind.clone();
    match kind {
        WorkloadKind::Event { .. } => Ok(()),
        WorkloadKind::ModuleAnalysis {
            module_node,
            table,
            table_ready_event,
        } => run_module_analysis(comp, id, module_node, table, table_ready_event),
        WorkloadKind::ImportResolve {
            import_node,
            alias_symbol,
        } => run_import_resolve(comp, id, import_node, alias_symbol),
        WorkloadKind::OperatorContextChange {
            kind,
            change_nodes,
            context,
            definition_pass,
        } => run_context_change(comp, id, kind, &change_nodes, context, definition_pass),
        WorkloadKind::FunctionHeader {
            function,
            node,
            symbol,
            ..
        } => poly_inst::run_function_header(comp, id, function, node, symbol),
        WorkloadKind::FunctionBody { function, node } => {
            stmt::run_function_body(comp, id, function, node)
        }
        WorkloadKind::FunctionClusterCompile { functions } => {
            run_cluster_compile(comp, id, &functions)
        }
        WorkloadKind::StructPolymorphic {
            node,
            symbol,
            base_struct,
        } => poly_inst::run_struct_polymorphic(comp, id, node, symbol, base_struct),
        WorkloadKind::StructBody { struct_type, node } => {
            run_struct_body(comp, id, struct_type, node)
        }
        WorkloadKind::BakeAnalysis { bake, node } => {
            let expr_node = match comp.node_kind(node) {
                NodeKind::Bake { expr } => NodeRef::new(node.unit, expr),
                _ => node,
            };
            let info = expr::analyse_expression(
                comp,
                id,
                expr_node,
                ExpressionContext::Unknown {
                    due_to_error: false,
                },
            )?;
            let result_type = match &info.result {
                ExpressionResult::Value { type_id, .. } => *type_id,
                ExpressionResult::Type(_) => comp.types.predefined.type_handle,
                _ => comp.types.predefined.unknown,
            };
            comp.bakes.bakes[bake].result_type = Some(result_type);
            Ok(())
        }
        WorkloadKind::BakeExecution { bake, node } => run_bake_execution(comp, id, bake, node),
        WorkloadKind::Definition {
            symbol,
            node,
            is_comptime,
            type_node,
            value_node,
        } => run_definition(comp, id, symbol, node, is_comptime, type_node, value_node),
    }
}

/// Post-finish side effects that must see the workload's final state.
pub fn on_workload_finished(comp: &mut Compiler, id: WorkloadId) {
    let kind = comp.executer.workloads[id].kind.clone();
    if let WorkloadKind::FunctionBody { function, .. } = kind {
        if comp.executer.workloads[id].real_error_count > 0 {
            comp.program.functions[function].contains_errors = true;
        }
        // Finishing a body triggers cluster compilation for the strongly
        // connected set of mutually recursive functions
        get_or_create_cluster(comp, function);
    }
}

/// The AST node a workload is anchored at, for cycle errors.
pub fn workload_node(comp: &Compiler, id: WorkloadId) -> Option<NodeRef> {
    match &comp.executer.workloads[id].kind {
        WorkloadKind::Event { .. } => None,
        WorkloadKind::ModuleAnalysis { module_node, .. } => Some(*module_node),
        WorkloadKind::ImportResolve { import_node, .. } => Some(*import_node),
        WorkloadKind::OperatorContextChange { change_nodes, .. } => change_nodes.first().copied(),
        WorkloadKind::FunctionHeader { node, .. } => Some(*node),
        WorkloadKind::FunctionBody { node, .. } => Some(*node),
        WorkloadKind::FunctionClusterCompile { .. } => None,
        WorkloadKind::StructPolymorphic { node, .. } => Some(*node),
        WorkloadKind::StructBody { node, .. } => Some(*node),
        WorkloadKind::BakeAnalysis { node, .. } => Some(*node),
        WorkloadKind::BakeExecution { node, .. } => Some(*node),
        WorkloadKind::Definition { node, .. } => Some(*node),
    }
}

// ----------------------------------------------------------------------
// Module analysis
// ----------------------------------------------------------------------

/// Walk a module's items: define symbols and spawn workloads. Pure symbol
/// discovery; this stage never suspends.
fn run_module_analysis(
    comp: &mut Compiler,
    wl: WorkloadId,
    module_node: NodeRef,
    table: TableId,
    table_ready_event: WorkloadId,
) -> Suspendable<()> {
    let items = match comp.node_kind(module_node) {
        NodeKind::Module { items } => items,
        _ => return Ok(()),
    };
    let context = comp.symbols.table(table).operator_context;
    let pass = comp.executer.workloads[wl].pass;

    for item in items {
        let item_node = NodeRef::new(module_node.unit, item);
        match comp.node_kind(item_node) {
            NodeKind::Import { alias, kind, .. } => {
                let import_workload = comp.executer.add_workload(
                    WorkloadKind::ImportResolve {
                        import_node: item_node,
                        alias_symbol: None,
                    },
                    table,
                    pass,
                );
                if let Some(alias_id) = alias {
                    let text_index = comp.node_text_index(item_node);
                    let alias_symbol = comp.symbols.define_symbol(
                        table,
                        alias_id,
                        SymbolKind::Alias {
                            workload: import_workload,
                            resolved: None,
                        },
                        SymbolAccessLevel::Global,
                        Some(item_node),
                        text_index,
                    );
                    if let WorkloadKind::ImportResolve {
                        alias_symbol: slot, ..
                    } = &mut comp.executer.workloads[import_workload].kind
                    {
                        *slot = Some(alias_symbol);
                    }
                }
                let _ = kind;
                // The module's table is not ready until its imports are
                comp.executer.register_dependency(
                    table_ready_event,
                    crate::workload::Waiting {
                        on: import_workload,
                        can_be_broken: false,
                        failure_flag: None,
                    },
                );
            }
            NodeKind::ContextChange { kind, changes } => {
                let mut change_nodes = Vec::new();
                for change in changes {
                    let change_node = NodeRef::new(module_node.unit, change);
                    change_nodes.push(change_node);
                    // Named function changes also define their symbol
                    if let NodeKind::Definition { .. } = comp.node_kind(change_node) {
                        process_definition(comp, wl, change_node, table, table_ready_event);
                    }
                }
                let change_workload = comp.executer.add_workload(
                    WorkloadKind::OperatorContextChange {
                        kind,
                        change_nodes,
                        context,
                        definition_pass: pass,
                    },
                    table,
                    pass,
                );
                comp.executer.register_dependency(
                    change_workload,
                    crate::workload::Waiting {
                        on: table_ready_event,
                        can_be_broken: false,
                        failure_flag: None,
                    },
                );
                comp.operators
                    .context_mut(context)
                    .pending_changes
                    .push((kind, change_workload));
            }
            NodeKind::Definition { .. } => {
                process_definition(comp, wl, item_node, table, table_ready_event);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Classify and register one definition: function, struct, module,
/// global, or comptime value.
fn process_definition(
    comp: &mut Compiler,
    module_workload: WorkloadId,
    def_node: NodeRef,
    table: TableId,
    table_ready_event: WorkloadId,
) {
    let NodeKind::Definition {
        name,
        kind,
        type_node,
        value,
    } = comp.node_kind(def_node)
    else {
        return;
    };
    let pass = comp.executer.workloads[module_workload].pass;
    let context = comp.symbols.table(table).operator_context;
    let text_index = comp.node_text_index(def_node);
    let value_node = value.map(|v| NodeRef::new(def_node.unit, v));
    let type_node = type_node.map(|t| NodeRef::new(def_node.unit, t));

    let value_kind = value_node.map(|v| comp.node_kind(v));
    match (kind, value_kind) {
        (DefinitionKind::Comptime, Some(NodeKind::FunctionLiteral { body: Some(_), .. })) => {
            let function_node = value_node.unwrap();
            let (_, header_workload) = get_or_create_function(
                comp,
                function_node,
                pass,
                name,
                table,
                context,
                table_ready_event,
            );
            let symbol = comp.symbols.define_symbol(
                table,
                name,
                SymbolKind::DefinitionUnfinished {
                    workload: header_workload,
                },
                SymbolAccessLevel::Global,
                Some(def_node),
                text_index,
            );
            report_duplicate(comp, module_workload, table, symbol, def_node);
            if let WorkloadKind::FunctionHeader { symbol: slot, .. } =
                &mut comp.executer.workloads[header_workload].kind
            {
                *slot = Some(symbol);
            }
        }
        (DefinitionKind::Comptime, Some(NodeKind::StructLiteral { parameters, .. })) => {
            let struct_node = value_node.unwrap();
            if parameters.is_empty() {
                let struct_type = get_or_create_struct(comp, struct_node, pass, name, table, None);
                let symbol = comp.symbols.define_symbol(
                    table,
                    name,
                    SymbolKind::Type(struct_type),
                    SymbolAccessLevel::Global,
                    Some(def_node),
                    text_index,
                );
                report_duplicate(comp, module_workload, table, symbol, def_node);
            } else {
                // Polymorphic struct: header analysed by its own workload
                let base_struct = get_or_create_base_struct(comp, struct_node, pass, name);
                let header_table = comp.symbols.create_table(
                    Some((table, SymbolAccessLevel::Global)),
                    context,
                );
                let poly_pass = comp.analysis.create_pass(module_workload);
                let poly_workload = comp.executer.add_workload(
                    WorkloadKind::StructPolymorphic {
                        node: struct_node,
                        symbol: SymbolId(0),
                        base_struct,
                    },
                    header_table,
                    poly_pass,
                );
                comp.analysis.passes[poly_pass].origin_workload = poly_workload;
                comp.executer.register_dependency(
                    poly_workload,
                    crate::workload::Waiting {
                        on: table_ready_event,
                        can_be_broken: false,
                        failure_flag: None,
                    },
                );
                let symbol = comp.symbols.define_symbol(
                    table,
                    name,
                    SymbolKind::DefinitionUnfinished {
                        workload: poly_workload,
                    },
                    SymbolAccessLevel::Global,
                    Some(def_node),
                    text_index,
                );
                report_duplicate(comp, module_workload, table, symbol, def_node);
                if let WorkloadKind::StructPolymorphic { symbol: slot, .. } =
                    &mut comp.executer.workloads[poly_workload].kind
                {
                    *slot = symbol;
                }
            }
        }
        (DefinitionKind::Comptime, Some(NodeKind::Module { .. })) => {
            let submodule_node = value_node.unwrap();
            let child_context = comp.operators.create_context(Some(context));
            let child_table = comp.symbols.create_table(
                Some((table, SymbolAccessLevel::Global)),
                child_context,
            );
            let submodule_workload =
                add_module_discovery(comp, submodule_node, child_table, child_context);
            let symbol = comp.symbols.define_symbol(
                table,
                name,
                SymbolKind::Module {
                    table: child_table,
                    workload: Some(submodule_workload),
                },
                SymbolAccessLevel::Global,
                Some(def_node),
                text_index,
            );
            report_duplicate(comp, module_workload, table, symbol, def_node);
        }
        _ => {
            // Plain comptime value or runtime global
            let is_comptime = kind == DefinitionKind::Comptime;
            let def_pass = comp.analysis.create_pass(module_workload);
            let def_workload = comp.executer.add_workload(
                WorkloadKind::Definition {
                    symbol: SymbolId(0),
                    node: def_node,
                    is_comptime,
                    type_node,
                    value_node,
                },
                table,
                def_pass,
            );
            comp.analysis.passes[def_pass].origin_workload = def_workload;
            comp.executer.register_dependency(
                def_workload,
                crate::workload::Waiting {
                    on: table_ready_event,
                    can_be_broken: false,
                    failure_flag: None,
                },
            );
            let symbol = comp.symbols.define_symbol(
                table,
                name,
                SymbolKind::DefinitionUnfinished {
                    workload: def_workload,
                },
                SymbolAccessLevel::Global,
                Some(def_node),
                text_index,
            );
            report_duplicate(comp, module_workload, table, symbol, def_node);
            if let WorkloadKind::Definition { symbol: slot, .. } =
                &mut comp.executer.workloads[def_workload].kind
            {
                *slot = symbol;
            }
        }
    }
}

fn report_duplicate(
    comp: &mut Compiler,
    workload: WorkloadId,
    table: TableId,
    symbol: SymbolId,
    node: NodeRef,
) {
    if comp.symbols.find_duplicate(table, symbol).is_some() {
        let id = comp.symbols.symbol(symbol).id;
        comp.log_semantic_error(workload, SemanticErrorKind::SymbolRedefined { id }, node);
    }
}

/// Create (or reuse across re-runs) the function and header workload for
/// a function literal node.
pub fn get_or_create_function(
    comp: &mut Compiler,
    function_node: NodeRef,
    pass: PassId,
    name: Identifier,
    enclosing_table: TableId,
    context: ContextId,
    ready_event: WorkloadId,
) -> (FunctionId, WorkloadId) {
    if let Some(&function) = comp.analysis.functions_by_node.get(&(function_node, pass)) {
        let header = comp.analysis.header_workloads_by_function[&function];
        return (function, header);
    }
    let placeholder_signature = comp.types.register_signature(CallSignature {
        parameters: vec![],
        return_type: None,
    });
    let parameter_table = comp
        .symbols
        .create_table(Some((enclosing_table, SymbolAccessLevel::Global)), context);
    let function = comp.program.add_function(
        placeholder_signature,
        name,
        FunctionKind::Normal {
            symbol: None,
            parameter_table,
        },
    );
    let header_pass = comp.analysis.create_pass(WorkloadId(0));
    let header_workload = comp.executer.add_workload(
        WorkloadKind::FunctionHeader {
            function,
            node: function_node,
            symbol: None,
            header: None,
        },
        parameter_table,
        header_pass,
    );
    comp.analysis.passes[header_pass].origin_workload = header_workload;
    comp.executer.register_dependency(
        header_workload,
        crate::workload::Waiting {
            on: ready_event,
            can_be_broken: false,
            failure_flag: None,
        },
    );
    comp.analysis
        .functions_by_node
        .insert((function_node, pass), function);
    comp.analysis
        .header_workloads_by_function
        .insert(function, header_workload);
    (function, header_workload)
}

fn get_or_create_struct(
    comp: &mut Compiler,
    struct_node: NodeRef,
    pass: PassId,
    name: Identifier,
    table: TableId,
    parent: Option<TypeId>,
) -> TypeId {
    if let Some(&existing) = comp.analysis.structs_by_node.get(&(struct_node, pass)) {
        return existing;
    }
    let is_union = matches!(
        comp.node_kind(struct_node),
        NodeKind::StructLiteral { is_union: true, .. }
    );
    let struct_type = comp.types.make_struct_empty(name, is_union, parent, None);
    let body_pass = comp.analysis.create_pass(WorkloadId(0));
    let body_workload = comp.executer.add_workload(
        WorkloadKind::StructBody {
            struct_type,
            node: struct_node,
        },
        table,
        body_pass,
    );
    comp.analysis.passes[body_pass].origin_workload = body_workload;
    comp.types.set_struct_body_workload(struct_type, body_workload);
    if let Some(&ready) = comp.table_ready.get(&table) {
        comp.executer.register_dependency(
            body_workload,
            crate::workload::Waiting {
                on: ready,
                can_be_broken: false,
                failure_flag: None,
            },
        );
    }
    comp.analysis
        .structs_by_node
        .insert((struct_node, pass), struct_type);
    struct_type
}

/// The base struct of a polymorphic struct declaration: a fresh nominal
/// type that instances never share, used for struct patterns.
fn get_or_create_base_struct(
    comp: &mut Compiler,
    struct_node: NodeRef,
    pass: PassId,
    name: Identifier,
) -> TypeId {
    if let Some(&existing) = comp.analysis.structs_by_node.get(&(struct_node, pass)) {
        return existing;
    }
    let is_union = matches!(
        comp.node_kind(struct_node),
        NodeKind::StructLiteral { is_union: true, .. }
    );
    let base = comp.types.make_struct_empty(name, is_union, None, None);
    comp.analysis
        .structs_by_node
        .insert((struct_node, pass), base);
    base
}

// ----------------------------------------------------------------------
// Import resolution
// ----------------------------------------------------------------------

fn run_import_resolve(
    comp: &mut Compiler,
    wl: WorkloadId,
    import_node: NodeRef,
    alias_symbol: Option<SymbolId>,
) -> Suspendable<()> {
    let NodeKind::Import { path, kind, alias } = comp.node_kind(import_node) else {
        return Ok(());
    };
    let table = comp.executer.workloads[wl].symbol_table;
    let resolved = expr::resolve_path(comp, wl, import_node, &path)?;

    let Some(target) = resolved else {
        let id = *path.last().expect("import path is non-empty");
        comp.log_semantic_error(wl, SemanticErrorKind::UnresolvedSymbol { id }, import_node);
        return Ok(());
    };

    let _ = alias;
    if let Some(alias_symbol) = alias_symbol {
        if let SymbolKind::Alias { resolved: slot, .. } =
            &mut comp.symbols.symbol_mut(alias_symbol).kind
        {
            *slot = Some(target);
        }
        comp.symbols.record_reference(target, import_node);
        return Ok(());
    }

    // Plain import: include the target module's table
    match comp.symbols.symbol(target).kind.clone() {
        SymbolKind::Module {
            table: target_table,
            ..
        } => {
            let include_kind = match kind {
                ImportKind::DotCalls => ImportKind::DotCalls,
                _ => ImportKind::Symbols,
            };
            if let Err(error) = comp.symbols.add_include(
                table,
                target_table,
                include_kind,
                SymbolAccessLevel::Global,
                false,
            ) {
                let range = comp.units[import_node.unit]
                    .ast
                    .range(import_node.node);
                let text_range = comp.units[import_node.unit]
                    .buffer
                    .token_range_to_text_range(range);
                comp.handler
                    .error(error.to_string(), import_node.unit, text_range);
            }
            comp.symbols.record_reference(target, import_node);
        }
        _ => {
            let id = *path.last().expect("import path is non-empty");
            comp.log_semantic_error(wl, SemanticErrorKind::UnresolvedSymbol { id }, import_node);
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Operator context changes
// ----------------------------------------------------------------------

/// Process all context changes of one kind: wait for each change
/// function's header, then register the custom operator.
fn run_context_change(
    comp: &mut Compiler,
    wl: WorkloadId,
    kind: ContextChangeKind,
    change_nodes: &[NodeRef],
    context: ContextId,
    definition_pass: PassId,
) -> Suspendable<()> {
    let mut iterator_parts: Vec<(Identifier, FunctionId)> = Vec::new();

    for &change_node in change_nodes {
        let (name, function_node) = match comp.node_kind(change_node) {
            NodeKind::Definition {
                name,
                value: Some(value),
                ..
            } => (Some(name), NodeRef::new(change_node.unit, value)),
            _ => (None, change_node),
        };

        // Cast-mode changes are plain identifiers, not functions
        if kind == ContextChangeKind::CastMode {
            if let NodeKind::SymbolLookup { path } = comp.node_kind(function_node) {
                if let Some(&mode_id) = path.last() {
                    let mode = match comp.pool.get(mode_id) {
                        "none" => CastMode::None,
                        "explicit" => CastMode::Explicit,
                        "inferred" => CastMode::Inferred,
                        "implicit" => CastMode::Implicit,
                        _ => CastMode::Explicit,
                    };
                    comp.operators.add_operator(
                        context,
                        CustomOperatorKey::CastMode,
                        CustomOperator::CastMode(mode),
                    );
                }
            }
            continue;
        }

        let Some(&function) = comp
            .analysis
            .functions_by_node
            .get(&(function_node, definition_pass))
        else {
            continue;
        };
        let header_workload = comp.analysis.header_workloads_by_function[&function];
        comp.executer.wait_for(wl, header_workload, false)?;

        let signature = comp
            .types
            .signature(comp.program.functions[function].signature)
            .clone();
        let first_param = signature.parameters.first().map(|p| p.type_id);
        let second_param = signature.parameters.get(1).map(|p| p.type_id);
        let return_type = signature.return_type;

        match kind {
            ContextChangeKind::Cast => {
                let (Some(from), Some(to)) = (first_param, return_type) else {
                    continue;
                };
                let (from_base, _) = comp.types.base_type(from);
                let (to_base, _) = comp.types.base_type(to);
                comp.operators.add_operator(
                    context,
                    CustomOperatorKey::Cast {
                        from: from_base,
                        to: Some(to_base),
                    },
                    CustomOperator::Cast {
                        function,
                        cast_mode: CastMode::Implicit,
                    },
                );
            }
            ContextChangeKind::Binop => {
                // The function's name selects the operator
                let Some(name) = name else { continue };
                let Some(op) = binop_from_name(comp.pool.get(name)) else {
                    continue;
                };
                let (Some(left), Some(right)) = (first_param, second_param) else {
                    continue;
                };
                let (left_base, _) = comp.types.base_type(left);
                let (right_base, _) = comp.types.base_type(right);
                comp.operators.add_operator(
                    context,
                    CustomOperatorKey::Binop {
                        op,
                        left: left_base,
                        right: right_base,
                    },
                    CustomOperator::Binop {
                        function,
                        switch_left_and_right: false,
                    },
                );
                if left_base != right_base {
                    // Commutative double insert so one lookup suffices
                    comp.operators.add_operator(
                        context,
                        CustomOperatorKey::Binop {
                            op,
                            left: right_base,
                            right: left_base,
                        },
                        CustomOperator::Binop {
                            function,
                            switch_left_and_right: true,
                        },
                    );
                }
            }
            ContextChangeKind::Unop => {
                let Some(name) = name else { continue };
                let Some(op) = unop_from_name(comp.pool.get(name)) else {
                    continue;
                };
                let Some(operand) = first_param else { continue };
                let (operand_base, _) = comp.types.base_type(operand);
                comp.operators.add_operator(
                    context,
                    CustomOperatorKey::Unop {
                        op,
                        operand: operand_base,
                    },
                    CustomOperator::Unop { function },
                );
            }
            ContextChangeKind::ArrayAccess => {
                let Some(array) = first_param else { continue };
                let (array_base, _) = comp.types.base_type(array);
                comp.operators.add_operator(
                    context,
                    CustomOperatorKey::ArrayAccess { array: array_base },
                    CustomOperator::ArrayAccess { function },
                );
            }
            ContextChangeKind::DotCall => {
                let (Some(name), Some(receiver)) = (name, first_param) else {
                    continue;
                };
                let (receiver_base, _) = comp.types.base_type(receiver);
                comp.operators.add_operator(
                    context,
                    CustomOperatorKey::DotCall {
                        datatype: receiver_base,
                        id: name,
                    },
                    CustomOperator::DotCall {
                        function,
                        as_member_access: false,
                    },
                );
            }
            ContextChangeKind::Iterator => {
                if let Some(name) = name {
                    iterator_parts.push((name, function));
                }
            }
            ContextChangeKind::CastMode => unreachable!("handled above"),
        }
    }

    // An iterator change supplies create/has_next/next/get_value together
    if kind == ContextChangeKind::Iterator && !iterator_parts.is_empty() {
        let find = |comp: &Compiler, wanted: &str| {
            iterator_parts
                .iter()
                .find(|(name, _)| comp.pool.get(*name) == wanted)
                .map(|(_, f)| *f)
        };
        if let (Some(create), Some(has_next), Some(next), Some(get_value)) = (
            find(comp, "create"),
            find(comp, "has_next"),
            find(comp, "next"),
            find(comp, "get_value"),
        ) {
            let signature = comp
                .types
                .signature(comp.program.functions[create].signature)
                .clone();
            if let Some(iterable) = signature.parameters.first().map(|p| p.type_id) {
                let (iterable_base, _) = comp.types.base_type(iterable);
                comp.operators.add_operator(
                    context,
                    CustomOperatorKey::Iterator {
                        datatype: iterable_base,
                    },
                    CustomOperator::Iterator {
                        create,
                        has_next,
                        next,
                        get_value,
                    },
                );
            }
        }
    }

    comp.operators.clear_pending(context, wl);
    Ok(())
}

fn binop_from_name(name: &str) -> Option<upp_par::ast::Binop> {
    use upp_par::ast::Binop;
    Some(match name {
        "add" => Binop::Add,
        "subtract" => Binop::Subtract,
        "multiply" => Binop::Multiply,
        "divide" => Binop::Divide,
        "modulo" => Binop::Modulo,
        "equals" => Binop::Equal,
        "not_equals" => Binop::NotEqual,
        "less" => Binop::Less,
        "less_equal" => Binop::LessEqual,
        "greater" => Binop::Greater,
        "greater_equal" => Binop::GreaterEqual,
        _ => return None,
    })
}

fn unop_from_name(name: &str) -> Option<upp_par::ast::Unop> {
    use upp_par::ast::Unop;
    Some(match name {
        "negate" => Unop::Negate,
        "not" => Unop::Not,
        _ => return None,
    })
}

// ----------------------------------------------------------------------
// Struct bodies
// ----------------------------------------------------------------------

/// Analyse a struct's members and subtypes, then finish the whole tree's
/// layout. The stage cursor makes member analysis resumable: members
/// resolved before a suspension are not re-added.
fn run_struct_body(
    comp: &mut Compiler,
    wl: WorkloadId,
    struct_type: TypeId,
    node: NodeRef,
) -> Suspendable<()> {
    let NodeKind::StructLiteral {
        members, subtypes, ..
    } = comp.node_kind(node)
    else {
        return Ok(());
    };
    let pass = comp.executer.workloads[wl].pass;

    // Flatten (owner struct, member node) work items: root members first,
    // then each subtype's members
    let mut work: Vec<(TypeId, NodeRef)> = members
        .iter()
        .map(|&m| (struct_type, NodeRef::new(node.unit, m)))
        .collect();
    for &subtype_def in &subtypes {
        let subtype_node = NodeRef::new(node.unit, subtype_def);
        let NodeKind::Definition {
            name,
            value: Some(value),
            ..
        } = comp.node_kind(subtype_node)
        else {
            continue;
        };
        let subtype_value = NodeRef::new(node.unit, value);
        let NodeKind::StructLiteral {
            members: sub_members,
            ..
        } = comp.node_kind(subtype_value)
        else {
            continue;
        };
        let subtype_type = match comp.analysis.structs_by_node.get(&(subtype_value, pass)) {
            Some(&existing) => existing,
            None => {
                let created = comp
                    .types
                    .make_struct_empty(name, false, Some(struct_type), None);
                comp.analysis
                    .structs_by_node
                    .insert((subtype_value, pass), created);
                created
            }
        };
        for &member in &sub_members {
            work.push((subtype_type, NodeRef::new(node.unit, member)));
        }
    }

    let start = comp.executer.workloads[wl].stage as usize;
    for index in start..work.len() {
        let (owner, member_node) = work[index];
        let NodeKind::StructMember { name, type_node } = comp.node_kind(member_node) else {
            continue;
        };
        let type_ref = NodeRef::new(member_node.unit, type_node);
        let member_type = match expr::expect_type(comp, wl, type_ref) {
            Ok(member_type) => member_type,
            Err(waiting) => {
                comp.executer.workloads[wl].stage = index as u32;
                return Err(waiting);
            }
        };

        // A by-value struct member needs the other struct's size before
        // this tree can finish; a pointer member only needs the type to
        // exist, so its edge may be broken by cluster resolution
        if let Err(waiting) = wait_for_member_type(comp, wl, member_type) {
            comp.executer.workloads[wl].stage = index as u32;
            return Err(waiting);
        }

        comp.types
            .struct_add_member(owner, name, member_type, Some(member_node));
        comp.executer.workloads[wl].stage = index as u32 + 1;
    }

    let lock = comp.pool.lock();
    comp.types.finish_struct(struct_type, &comp.pool, &lock);
    Ok(())
}

/// Dependency policy for a resolved struct member type.
fn wait_for_member_type(
    comp: &mut Compiler,
    wl: WorkloadId,
    member_type: TypeId,
) -> Suspendable<()> {
    let stripped = comp.types.without_constant(member_type);
    match comp.types.datatype(stripped).clone() {
        Datatype::Pointer { element, .. } => {
            let (base, _) = comp.types.base_type(element);
            if let Some(body) = comp.types.struct_body_workload(base) {
                comp.executer.wait_for(wl, body, true)?;
            }
            Ok(())
        }
        Datatype::Struct(_) => {
            if let Some(body) = comp.types.struct_body_workload(stripped) {
                comp.executer.wait_for(wl, body, false)?;
            }
            Ok(())
        }
        Datatype::Array { element, .. } | Datatype::Optional { child: element, .. } => {
            wait_for_member_type(comp, wl, element)
        }
        _ => Ok(()),
    }
}

// ----------------------------------------------------------------------
// Definitions, bakes, clusters
// ----------------------------------------------------------------------

fn run_definition(
    comp: &mut Compiler,
    wl: WorkloadId,
    symbol: SymbolId,
    node: NodeRef,
    is_comptime: bool,
    type_node: Option<NodeRef>,
    value_node: Option<NodeRef>,
) -> Suspendable<()> {
    let expected = match type_node {
        Some(type_ref) => Some(expr::expect_type(comp, wl, type_ref)?),
        None => None,
    };

    if is_comptime {
        let Some(value_ref) = value_node else {
            comp.symbols.symbol_mut(symbol).kind = SymbolKind::Error;
            return Ok(());
        };
        // Enum definitions create a nominal type
        if let NodeKind::EnumLiteral { .. } = comp.node_kind(value_ref) {
            let enum_type = analyse_enum_literal(comp, wl, value_ref)?;
            comp.symbols.symbol_mut(symbol).kind = SymbolKind::Type(enum_type);
            return Ok(());
        }
        let context = match expected {
            Some(expected) => ExpressionContext::SpecificType {
                expected,
                cast_mode: CastMode::Implicit,
            },
            None => ExpressionContext::Unknown {
                due_to_error: false,
            },
        };
        let info = expr::analyse_expression(comp, wl, value_ref, context)?;
        let kind = match info.result {
            ExpressionResult::Type(type_id) => SymbolKind::Type(type_id),
            ExpressionResult::Function(function) => SymbolKind::Function(function),
            ExpressionResult::PolymorphicFunction(header) => {
                SymbolKind::PolymorphicFunction(header)
            }
            ExpressionResult::PolymorphicStruct(header) => SymbolKind::PolymorphicStruct(header),
            ExpressionResult::Constant(constant) => SymbolKind::ComptimeValue(constant),
            ExpressionResult::Module(table) => SymbolKind::Module {
                table,
                workload: None,
            },
            ExpressionResult::Value { .. } => {
                let pass = comp.executer.workloads[wl].pass;
                match crate::comptime::evaluate_comptime(comp, value_ref, pass) {
                    Ok(value) => match comptime_value_to_constant(comp, value) {
                        Some(constant) => SymbolKind::ComptimeValue(constant),
                        None => {
                            comp.log_semantic_error(
                                wl,
                                SemanticErrorKind::ComptimeEvaluationFailed {
                                    message: "value cannot be serialised",
                                },
                                value_ref,
                            );
                            SymbolKind::Error
                        }
                    },
                    Err(message) => {
                        comp.log_semantic_error(
                            wl,
                            SemanticErrorKind::ComptimeEvaluationFailed { message },
                            value_ref,
                        );
                        SymbolKind::Error
                    }
                }
            }
            _ => SymbolKind::Error,
        };
        comp.symbols.symbol_mut(symbol).kind = kind;
        return Ok(());
    }

    // Runtime global
    let value_info = match value_node {
        Some(value_ref) => {
            let context = match expected {
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
    let global_type = expected
        .or_else(|| {
            value_info
                .as_ref()
                .map(|info| info.cast_info.result_type)
        })
        .unwrap_or(comp.types.predefined.unknown);
    let pass = comp.executer.workloads[wl].pass;
    let global = match comp.analysis.globals_by_node.get(&(node, pass)) {
        Some(&existing) => existing,
        None => {
            let memory_slot = comp.program.globals.len() as u32;
            let created = comp.program.globals.push(crate::program::ModTreeGlobal {
                type_id: global_type,
                symbol: Some(symbol),
                is_extern: false,
                init_expr: value_node,
                memory_slot,
            });
            comp.analysis.globals_by_node.insert((node, pass), created);
            created
        }
    };
    comp.program.globals[global].type_id = global_type;
    comp.symbols.symbol_mut(symbol).kind = SymbolKind::Global(global);
    Ok(())
}

/// Analyse an `enum { ... }` literal into a finished enum type.
pub fn analyse_enum_literal(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
) -> Suspendable<TypeId> {
    let NodeKind::EnumLiteral { members } = comp.node_kind(node) else {
        return Ok(comp.types.predefined.invalid);
    };
    let pass = comp.executer.workloads[wl].pass;
    if let Some(&existing) = comp.analysis.structs_by_node.get(&(node, pass)) {
        return Ok(existing);
    }

    // Resolve member values first so creation stays atomic across
    // suspensions
    let mut resolved: Vec<(Identifier, i64)> = Vec::new();
    let mut next_value = 1i64;
    for &member in &members {
        let member_node = NodeRef::new(node.unit, member);
        let NodeKind::EnumMember { name, value } = comp.node_kind(member_node) else {
            continue;
        };
        let member_value = match value {
            Some(value_node) => {
                let value_ref = NodeRef::new(node.unit, value_node);
                expr::analyse_expression(
                    comp,
                    wl,
                    value_ref,
                    ExpressionContext::Unknown {
                        due_to_error: false,
                    },
                )?;
                match crate::comptime::evaluate_comptime(comp, value_ref, pass)
                    .ok()
                    .and_then(|v| v.as_int())
                {
                    Some(value) => value,
                    None => {
                        comp.log_semantic_error(
                            wl,
                            SemanticErrorKind::ComptimeEvaluationFailed {
                                message: "enum member value must be a comptime integer",
                            },
                            value_ref,
                        );
                        next_value
                    }
                }
            }
            None => next_value,
        };
        next_value = member_value + 1;
        resolved.push((name, member_value));
    }

    let enum_name = comp.intern("enum");
    let enum_type = comp.types.make_enum(
        enum_name,
        resolved
            .into_iter()
            .map(|(id, value)| crate::types::EnumMemberDef { id, value })
            .collect(),
    );
    comp.analysis
        .structs_by_node
        .insert((node, pass), enum_type);
    Ok(enum_type)
}

fn run_bake_execution(
    comp: &mut Compiler,
    wl: WorkloadId,
    bake: crate::comptime::BakeId,
    node: NodeRef,
) -> Suspendable<()> {
    let expr_node = match comp.node_kind(node) {
        NodeKind::Bake { expr } => NodeRef::new(node.unit, expr),
        _ => node,
    };
    let analysis_workload = comp.bakes.bakes[bake].analysis_workload;
    comp.executer.wait_for(wl, analysis_workload, false)?;
    // The execution seam: an external bytecode interpreter would run the
    // analysed expression here; the built-in evaluator folds it instead
    let pass = comp.executer.workloads[analysis_workload].pass;
    match crate::comptime::evaluate_comptime(comp, expr_node, pass) {
        Ok(value) => {
            if let Some(constant) = comptime_value_to_constant(comp, value) {
                comp.bakes.bakes[bake].result = Some(constant);
            } else {
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::ComptimeEvaluationFailed {
                        message: "bake result cannot be serialised",
                    },
                    node,
                );
            }
        }
        Err(message) => {
            comp.log_semantic_error(
                wl,
                SemanticErrorKind::ComptimeEvaluationFailed { message },
                node,
            );
        }
    }
    Ok(())
}

/// Serialise a folded comptime value into the constant pool.
pub fn comptime_value_to_constant(
    comp: &mut Compiler,
    value: ComptimeValue,
) -> Option<crate::constants::ConstantId> {
    let function_count = comp.program.functions.len();
    let (type_id, bytes): (TypeId, Vec<u8>) = match value {
        ComptimeValue::Int(value) => {
            if let Ok(small) = i32::try_from(value) {
                (comp.types.predefined.i32, small.to_le_bytes().to_vec())
            } else {
                (comp.types.predefined.i64, value.to_le_bytes().to_vec())
            }
        }
        ComptimeValue::Float(value) => (
            comp.types.predefined.f32,
            (value as f32).to_le_bytes().to_vec(),
        ),
        ComptimeValue::Bool(value) => {
            (comp.types.predefined.bool_type, vec![value as u8])
        }
        ComptimeValue::Type(type_id) => (
            comp.types.predefined.type_handle,
            type_id.0.to_le_bytes().to_vec(),
        ),
        ComptimeValue::Constant(constant) => return Some(constant),
    };
    comp.constants
        .add_constant(&comp.types, function_count, type_id, &bytes)
        .ok()
}

/// Lazily create the cluster-compile workload for a function.
pub fn get_or_create_cluster(comp: &mut Compiler, function: FunctionId) -> WorkloadId {
    if let Some(&existing) = comp.cluster_workloads.get(&function) {
        return existing;
    }
    let workload = comp.executer.add_workload(
        WorkloadKind::FunctionClusterCompile {
            functions: vec![function],
        },
        comp.root_table,
        PassId(0),
    );
    comp.cluster_workloads.insert(function, workload);
    workload
}

/// Cluster compilation does no front-end work; it waits for the
/// function's body and, breakably, for every callee's cluster. Mutual
/// recursion forms a breakable strongly-connected component the
/// scheduler resolves atomically, giving the back-end a stable batch
/// ordering.
fn run_cluster_compile(
    comp: &mut Compiler,
    wl: WorkloadId,
    functions: &[FunctionId],
) -> Suspendable<()> {
    for &function in functions {
        if let Some(&body) = comp.function_bodies.get(&function) {
            comp.executer.wait_for(wl, body, false)?;
        }
        let calls = comp.program.functions[function].calls.clone();
        for callee in calls {
            let callee_cluster = get_or_create_cluster(comp, callee);
            comp.executer.wait_for(wl, callee_cluster, true)?;
        }
    }
    Ok(())
}

/// Read one polymorphic value slot visible from a workload, walking the
/// poly-parent chain.
pub fn active_poly_value(
    comp: &Compiler,
    wl: WorkloadId,
    access_index: u32,
) -> Option<PolyValue> {
    let mut current = Some(wl);
    while let Some(id) = current {
        let workload = &comp.executer.workloads[id];
        if !workload.poly_values.is_empty() {
            return workload.poly_values.get(access_index as usize).copied();
        }
        current = workload.poly_parent;
    }
    None
}

// Re-exported pieces used by sibling modules
pub(crate) use crate::workload::Waiting;

/// Build the runtime call signature of a poly header instance by
/// substituting resolved values into the parameter types.
pub fn build_instance_signature(
    comp: &mut Compiler,
    header: &PolyHeader,
    values: &[PolyValue],
    return_type: Option<TypeId>,
) -> crate::types::SignatureId {
    let mut parameters = Vec::new();
    for parameter in &header.parameters {
        if parameter.is_comptime {
            continue;
        }
        let raw = parameter
            .param_type
            .unwrap_or(comp.types.predefined.unknown);
        let substituted = substitute_pattern_variables(comp, raw, header, values);
        parameters.push(SignatureParameter {
            name: parameter.name,
            type_id: substituted,
            required: parameter.default_value.is_none(),
            requires_named_addressing: false,
            must_not_be_set: false,
            default_value: parameter.default_value,
        });
    }
    let return_type =
        return_type.map(|t| substitute_pattern_variables(comp, t, header, values));
    comp.types.register_signature(CallSignature {
        parameters,
        return_type,
    })
}

/// Replace pattern variables inside a type with the values bound for an
/// instance.
pub fn substitute_pattern_variables(
    comp: &mut Compiler,
    type_id: TypeId,
    header: &PolyHeader,
    values: &[PolyValue],
) -> TypeId {
    let datatype = comp.types.datatype(type_id).clone();
    match datatype {
        Datatype::PatternVariable { id, .. } => {
            let slot = header
                .inferred
                .iter()
                .find(|inferred| inferred.id == id)
                .map(|inferred| inferred.value_access_index)
                .or_else(|| {
                    header
                        .parameters
                        .iter()
                        .find(|p| p.name == id)
                        .and_then(|p| p.value_access_index)
                });
            let Some(slot) = slot else { return type_id };
            match values.get(slot as usize) {
                Some(PolyValue::Set { value }) => {
                    let constant = comp.constants.constant(*value);
                    if constant.type_id == comp.types.predefined.type_handle {
                        comp.constants
                            .read_u32(*value)
                            .map(TypeId)
                            .unwrap_or(comp.types.predefined.unknown)
                    } else {
                        comp.types.predefined.unknown
                    }
                }
                Some(PolyValue::TemplatedType { template }) => *template,
                _ => type_id,
            }
        }
        Datatype::Pointer { element, optional } => {
            let element = substitute_pattern_variables(comp, element, header, values);
            comp.types.make_pointer(element, optional)
        }
        Datatype::Optional { child, .. } => {
            let child = substitute_pattern_variables(comp, child, header, values);
            comp.types.make_optional(child)
        }
        Datatype::Array {
            element,
            count_known,
            element_count,
        } => {
            let element = substitute_pattern_variables(comp, element, header, values);
            comp.types.make_array(element, count_known, element_count)
        }
        Datatype::Slice { element, .. } => {
            let element = substitute_pattern_variables(comp, element, header, values);
            comp.types.make_slice(element)
        }
        Datatype::Constant { element } => {
            let element = substitute_pattern_variables(comp, element, header, values);
            comp.types.make_constant(element)
        }
        Datatype::StructPattern { base_struct } => {
            // Struct patterns substitute into the matching instance
            let _ = base_struct;
            type_id
        }
        _ => type_id,
    }
}

/// Signature equality helper for `main` validation and tests.
pub fn signature_is_empty(comp: &Compiler, signature: crate::types::SignatureId) -> bool {
    let signature = comp.types.signature(signature);
    signature.parameters.is_empty() && signature.return_type.is_none()
}
