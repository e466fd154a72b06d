//! Function/struct header analysis and polymorphic instantiation.

use upp_par::ast::NodeKind;
use upp_util::Identifier;

use crate::analysis::{self, expr};
use crate::comptime::evaluate_comptime;
use crate::errors::SemanticErrorKind;
use crate::operators::CastMode;
use crate::passes::ExpressionContext;
use crate::poly::{
    InferredParameter, PolyHeader, PolyHeaderId, PolyInstance, PolyInstanceTarget, PolyOrigin,
    PolyParameter, PolyValue,
};
use crate::program::{FunctionId, FunctionKind};
use crate::symbols::{SymbolAccessLevel, SymbolId, SymbolKind};
use crate::types::{CallSignature, Datatype, SignatureParameter, TypeId};
use crate::workload::{Suspendable, WorkloadId, WorkloadKind};
use crate::{Compiler, NodeRef};

/// Bound on instance-inside-instance nesting; deeper chains are
/// runaway recursive instantiations.
const MAX_INSTANCIATION_DEPTH: u32 = 64;

// ----------------------------------------------------------------------
// Function headers
// ----------------------------------------------------------------------

/// Analyse a function's signature: resolve parameter types, register
/// polymorphic header info when comptime or inferred parameters exist,
/// and create parameter symbols.
pub fn run_function_header(
    comp: &mut Compiler,
    wl: WorkloadId,
    function: FunctionId,
    node: NodeRef,
    symbol: Option<SymbolId>,
) -> Suspendable<()> {
    let NodeKind::FunctionLiteral {
        parameters,
        return_type,
        body,
    } = comp.node_kind(node)
    else {
        return Ok(());
    };
    let pass = comp.executer.workloads[wl].pass;
    let parameter_table = comp.executer.workloads[wl].symbol_table;

    let mut poly_parameters: Vec<PolyParameter> = Vec::new();
    let mut inferred: Vec<InferredParameter> = Vec::new();
    let mut value_index = 0u32;
    let mut runtime_index = 0u32;
    let mut is_polymorphic = false;

    for (index, &parameter) in parameters.iter().enumerate() {
        let parameter_node = NodeRef::new(node.unit, parameter);
        let NodeKind::Parameter {
            name,
            is_comptime,
            type_node,
            default_value,
        } = comp.node_kind(parameter_node)
        else {
            continue;
        };
        let type_ref = NodeRef::new(node.unit, type_node);
        let param_type = expr::expect_type(comp, wl, type_ref)?;

        // Pattern variables discovered inside this parameter's type become
        // inferred value slots
        let pattern_nodes = collect_pattern_variables(comp, type_ref);
        let contains_inferred = !pattern_nodes.is_empty();
        for (pattern_node, pattern_id) in pattern_nodes {
            if inferred.iter().any(|slot| slot.id == pattern_id) {
                continue;
            }
            let template_type = comp
                .analysis
                .pattern_vars_by_node
                .get(&(pattern_node, pass))
                .copied()
                .unwrap_or(comp.types.predefined.unknown);
            inferred.push(InferredParameter {
                defined_in_parameter_index: index as u32,
                id: pattern_id,
                template_type,
                value_access_index: 0, // assigned below
            });
            is_polymorphic = true;
        }

        let value_access_index = if is_comptime {
            is_polymorphic = true;
            let slot = value_index;
            value_index += 1;
            let text_index = comp.node_text_index(parameter_node);
            comp.symbols.define_symbol(
                parameter_table,
                name,
                SymbolKind::PolymorphicValue {
                    defined_in_parameter_index: index as u32,
                    access_index: slot,
                },
                SymbolAccessLevel::Polymorphic,
                Some(parameter_node),
                text_index,
            );
            Some(slot)
        } else {
            None
        };

        let index_in_runtime_signature = if is_comptime {
            None
        } else {
            let slot = runtime_index;
            runtime_index += 1;
            Some(slot)
        };

        poly_parameters.push(PolyParameter {
            name,
            is_comptime,
            param_type: Some(param_type),
            type_node: Some(type_ref),
            default_value: default_value.map(|d| NodeRef::new(node.unit, d)),
            required: default_value.is_none(),
            depends_on_other_parameters: false,
            contains_inferred_parameter: contains_inferred,
            value_access_index,
            index_in_runtime_signature,
        });
    }

    // Inferred slots are appended after the comptime parameters
    for slot in inferred.iter_mut() {
        slot.value_access_index = value_index;
        value_index += 1;
    }

    let analysed_return_type = match return_type {
        Some(return_node) => Some(expr::expect_type(
            comp,
            wl,
            NodeRef::new(node.unit, return_node),
        )?),
        None => None,
    };

    if !is_polymorphic {
        let signature_parameters: Vec<SignatureParameter> = poly_parameters
            .iter()
            .map(|parameter| SignatureParameter {
                name: parameter.name,
                type_id: parameter.param_type.unwrap_or(comp.types.predefined.unknown),
                required: parameter.required,
                requires_named_addressing: false,
                must_not_be_set: false,
                default_value: parameter.default_value,
            })
            .collect();
        let signature = comp.types.register_signature(CallSignature {
            parameters: signature_parameters,
            return_type: analysed_return_type,
        });
        comp.program.functions[function].signature = signature;

        // Parameter symbols live in the parameter table
        for (index, &parameter) in parameters.iter().enumerate() {
            let parameter_node = NodeRef::new(node.unit, parameter);
            let NodeKind::Parameter { name, .. } = comp.node_kind(parameter_node) else {
                continue;
            };
            let text_index = comp.node_text_index(parameter_node);
            let parameter_symbol = comp.symbols.define_symbol(
                parameter_table,
                name,
                SymbolKind::Parameter {
                    function,
                    index_in_signature: index as u32,
                    index_in_runtime_signature: index as u32,
                },
                SymbolAccessLevel::Internal,
                Some(parameter_node),
                text_index,
            );
            comp.analysis.set_info(
                parameter_node,
                pass,
                crate::passes::AnalysisInfo::Parameter {
                    symbol: parameter_symbol,
                },
            );
        }

        if let Some(symbol) = symbol {
            comp.symbols.symbol_mut(symbol).kind = SymbolKind::Function(function);
        }

        if body.is_some() && !comp.function_bodies.contains_key(&function) {
            let body_pass = comp.analysis.create_pass(wl);
            let body_workload = comp.executer.add_workload(
                WorkloadKind::FunctionBody { function, node },
                parameter_table,
                body_pass,
            );
            comp.analysis.passes[body_pass].origin_workload = body_workload;
            comp.function_bodies.insert(function, body_workload);
        }
        return Ok(());
    }

    // Polymorphic function: register the header, no base body analysis
    let header = match comp.analysis.headers_by_node.get(&(node, pass)) {
        Some(&existing) => existing,
        None => {
            let base_values: Vec<PolyValue> = (0..value_index)
                .map(|_| PolyValue::Unset {
                    unset_type: comp.types.predefined.unknown,
                })
                .collect();
            let name = comp.program.functions[function].name;
            let created = comp.poly.headers.push(PolyHeader {
                name,
                is_function: true,
                parameters: poly_parameters,
                poly_value_count: value_index,
                inferred,
                instances: Vec::new(),
                base_values,
                symbol_table: parameter_table,
                return_type_node: return_type.map(|r| NodeRef::new(node.unit, r)),
                return_type: analysed_return_type,
                origin: PolyOrigin::Function { node },
                definition_workload: wl,
            });
            comp.analysis.headers_by_node.insert((node, pass), created);
            created
        }
    };
    if let WorkloadKind::FunctionHeader { header: slot, .. } =
        &mut comp.executer.workloads[wl].kind
    {
        *slot = Some(header);
    }
    if let Some(symbol) = symbol {
        comp.symbols.symbol_mut(symbol).kind = SymbolKind::PolymorphicFunction(header);
    }
    Ok(())
}

/// Collect `$T` pattern-variable nodes inside an expression subtree.
fn collect_pattern_variables(comp: &Compiler, root: NodeRef) -> Vec<(NodeRef, Identifier)> {
    let ast = comp.ast(root.unit);
    let mut found = Vec::new();
    let mut stack = vec![root.node];
    while let Some(node) = stack.pop() {
        if let NodeKind::PatternVariable { id } = ast.kind(node) {
            found.push((NodeRef::new(root.unit, node), *id));
        }
        stack.extend(ast.kind(node).children());
    }
    found
}

// ----------------------------------------------------------------------
// Polymorphic structs
// ----------------------------------------------------------------------

/// Analyse a polymorphic struct's header: its comptime parameters become
/// polymorphic value slots visible to every instance body.
pub fn run_struct_polymorphic(
    comp: &mut Compiler,
    wl: WorkloadId,
    node: NodeRef,
    symbol: SymbolId,
    base_struct: TypeId,
) -> Suspendable<()> {
    let NodeKind::StructLiteral { parameters, .. } = comp.node_kind(node) else {
        return Ok(());
    };
    let pass = comp.executer.workloads[wl].pass;
    let header_table = comp.executer.workloads[wl].symbol_table;

    let mut poly_parameters = Vec::new();
    for (index, &parameter) in parameters.iter().enumerate() {
        let parameter_node = NodeRef::new(node.unit, parameter);
        let NodeKind::Parameter {
            name,
            type_node,
            default_value,
            ..
        } = comp.node_kind(parameter_node)
        else {
            continue;
        };
        let type_ref = NodeRef::new(node.unit, type_node);
        let param_type = expr::expect_type(comp, wl, type_ref)?;
        let text_index = comp.node_text_index(parameter_node);
        // Struct parameters are implicitly comptime
        comp.symbols.define_symbol(
            header_table,
            name,
            SymbolKind::PolymorphicValue {
                defined_in_parameter_index: index as u32,
                access_index: index as u32,
            },
            SymbolAccessLevel::Polymorphic,
            Some(parameter_node),
            text_index,
        );
        poly_parameters.push(PolyParameter {
            name,
            is_comptime: true,
            param_type: Some(param_type),
            type_node: Some(type_ref),
            default_value: default_value.map(|d| NodeRef::new(node.unit, d)),
            required: default_value.is_none(),
            depends_on_other_parameters: false,
            contains_inferred_parameter: false,
            value_access_index: Some(index as u32),
            index_in_runtime_signature: None,
        });
    }

    let header = match comp.analysis.headers_by_node.get(&(node, pass)) {
        Some(&existing) => existing,
        None => {
            let value_count = poly_parameters.len() as u32;
            let base_values: Vec<PolyValue> = poly_parameters
                .iter()
                .map(|parameter| PolyValue::Unset {
                    unset_type: parameter
                        .param_type
                        .unwrap_or(comp.types.predefined.unknown),
                })
                .collect();
            let name = comp.symbols.symbol(symbol).id;
            let created = comp.poly.headers.push(PolyHeader {
                name,
                is_function: false,
                parameters: poly_parameters,
                poly_value_count: value_count,
                inferred: Vec::new(),
                instances: Vec::new(),
                base_values,
                symbol_table: header_table,
                return_type_node: None,
                return_type: None,
                origin: PolyOrigin::Struct { node, base_struct },
                definition_workload: wl,
            });
            comp.analysis.headers_by_node.insert((node, pass), created);
            created
        }
    };
    comp.symbols.symbol_mut(symbol).kind = SymbolKind::PolymorphicStruct(header);
    comp.analysis.base_headers.insert(base_struct, header);
    // The base struct is only a pattern anchor; give it an empty layout so
    // every registered type ends up sized
    if comp.types.memory_info(base_struct).is_none() {
        let lock = comp.pool.lock();
        comp.types.finish_struct(base_struct, &comp.pool, &lock);
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Instantiation
// ----------------------------------------------------------------------

/// Instantiate a polymorphic struct: evaluate the comptime arguments,
/// look up the instance cache, and on a miss spawn a fresh body workload
/// with the values installed.
pub fn instantiate_struct(
    comp: &mut Compiler,
    wl: WorkloadId,
    header_id: PolyHeaderId,
    call_node: NodeRef,
    arguments: &[upp_par::NodeId],
) -> Suspendable<TypeId> {
    let header = comp.poly.header(header_id).clone();
    if arguments.len() != header.parameters.len() {
        comp.log_semantic_error(
            wl,
            SemanticErrorKind::TemplateArgumentCountMismatch {
                expected: header.parameters.len(),
                given: arguments.len(),
            },
            call_node,
        );
        return Ok(comp.types.predefined.invalid);
    }

    let values = evaluate_comptime_arguments(comp, wl, &header, call_node, arguments)?;

    if let Some(instance) = comp.poly.find_instance(header_id, &values) {
        if let PolyInstanceTarget::Struct(struct_type) = instance.target {
            return Ok(struct_type);
        }
    }

    if comp.executer.workloads[wl].instanciation_depth >= MAX_INSTANCIATION_DEPTH {
        comp.log_semantic_error(wl, SemanticErrorKind::CyclicDependency, call_node);
        return Ok(comp.types.predefined.invalid);
    }
    let PolyOrigin::Struct { node, .. } = header.origin else {
        return Ok(comp.types.predefined.invalid);
    };
    let is_union = matches!(
        comp.node_kind(node),
        NodeKind::StructLiteral { is_union: true, .. }
    );
    let struct_type = comp
        .types
        .make_struct_empty(header.name, is_union, None, None);
    let body_pass = comp.analysis.create_pass(wl);
    let body_workload = comp.executer.add_workload(
        WorkloadKind::StructBody { struct_type, node },
        header.symbol_table,
        body_pass,
    );
    comp.analysis.passes[body_pass].origin_workload = body_workload;
    comp.types
        .set_struct_body_workload(struct_type, body_workload);
    {
        let parent_depth = comp.executer.workloads[wl].instanciation_depth;
        let workload = comp.executer.workload_mut(body_workload);
        workload.poly_values = values.clone();
        workload.poly_origin = Some(header_id);
        workload.poly_parent = Some(wl);
        workload.instanciation_depth = parent_depth + 1;
    }
    comp.poly.add_instance(
        header_id,
        PolyInstance {
            values,
            target: PolyInstanceTarget::Struct(struct_type),
            body_workload,
        },
    );
    comp.analysis.instance_headers.insert(struct_type, header_id);
    Ok(struct_type)
}

/// Instantiate a polymorphic function: match arguments, resolve inferred
/// parameters by unification, evaluate comptime parameters, and dedup
/// through the header's instance cache.
pub fn instantiate_function(
    comp: &mut Compiler,
    wl: WorkloadId,
    header_id: PolyHeaderId,
    call_node: NodeRef,
    arguments: &[upp_par::NodeId],
) -> Suspendable<Option<FunctionId>> {
    let header = comp.poly.header(header_id).clone();
    let mut values: Vec<PolyValue> = (0..header.poly_value_count)
        .map(|_| PolyValue::Unset {
            unset_type: comp.types.predefined.unknown,
        })
        .collect();

    // Match arguments to parameters, positionally with named override
    let mut argument_for_parameter: Vec<Option<NodeRef>> =
        vec![None; header.parameters.len()];
    let mut positional = 0usize;
    for &argument in arguments {
        let argument_node = NodeRef::new(call_node.unit, argument);
        let (name, value) = match comp.node_kind(argument_node) {
            NodeKind::Argument { name, value } => {
                (name, NodeRef::new(call_node.unit, value))
            }
            _ => (None, argument_node),
        };
        let slot = match name {
            Some(name) => header.parameters.iter().position(|p| p.name == name),
            None => {
                let slot = (positional..header.parameters.len())
                    .find(|&i| argument_for_parameter[i].is_none());
                positional = slot.map(|s| s + 1).unwrap_or(header.parameters.len());
                slot
            }
        };
        match slot {
            Some(slot) => argument_for_parameter[slot] = Some(value),
            None => {
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::ArgumentCountMismatch {
                        expected: header.parameters.len(),
                        given: arguments.len(),
                    },
                    call_node,
                );
            }
        }
    }

    for (index, parameter) in header.parameters.iter().enumerate() {
        let Some(argument) = argument_for_parameter[index] else {
            if parameter.required {
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::ArgumentCountMismatch {
                        expected: header.parameters.len(),
                        given: arguments.len(),
                    },
                    call_node,
                );
            }
            continue;
        };
        if parameter.is_comptime {
            // Comptime parameters are evaluated now
            let context = match parameter.param_type {
                Some(expected) if !contains_pattern_variable(comp, expected) => {
                    ExpressionContext::SpecificType {
                        expected,
                        cast_mode: CastMode::Implicit,
                    }
                }
                _ => ExpressionContext::Unknown {
                    due_to_error: false,
                },
            };
            expr::analyse_expression(comp, wl, argument, context)?;
            let pass = comp.executer.workloads[wl].pass;
            match evaluate_comptime(comp, argument, pass) {
                Ok(value) => {
                    if let Some(constant) = analysis::comptime_value_to_constant(comp, value) {
                        if let Some(slot) = parameter.value_access_index {
                            values[slot as usize] = PolyValue::Set { value: constant };
                        }
                    }
                }
                Err(message) => {
                    comp.log_semantic_error(
                        wl,
                        SemanticErrorKind::ComptimeEvaluationFailed { message },
                        argument,
                    );
                }
            }
        } else if parameter.contains_inferred_parameter {
            // Infer pattern variables from the explicit argument's type
            let info = expr::analyse_expression(
                comp,
                wl,
                argument,
                ExpressionContext::AutoDereference,
            )?;
            if let Some(template) = parameter.param_type {
                unify_pattern(
                    comp,
                    wl,
                    template,
                    info.cast_info.result_type,
                    &header,
                    &mut values,
                    argument,
                );
            }
        }
    }

    // Every value slot must be resolved before instantiation
    if values
        .iter()
        .any(|value| matches!(value, PolyValue::Unset { .. }))
    {
        comp.log_semantic_error(wl, SemanticErrorKind::TemplateArgumentsRequired, call_node);
        return Ok(None);
    }

    let function = if let Some(instance) = comp.poly.find_instance(header_id, &values) {
        match instance.target {
            PolyInstanceTarget::Function(function) => function,
            PolyInstanceTarget::Struct(_) => return Ok(None),
        }
    } else {
        if comp.executer.workloads[wl].instanciation_depth >= MAX_INSTANCIATION_DEPTH {
            comp.log_semantic_error(wl, SemanticErrorKind::CyclicDependency, call_node);
            return Ok(None);
        }
        create_function_instance(comp, wl, header_id, &header, values.clone())?
    };

    // Analyse remaining runtime arguments against the instance signature
    let signature = comp.program.functions[function].signature;
    let signature_parameters = comp.types.signature(signature).parameters.clone();
    let mut runtime_slot = 0usize;
    for (index, parameter) in header.parameters.iter().enumerate() {
        if parameter.is_comptime || parameter.contains_inferred_parameter {
            if !parameter.is_comptime {
                runtime_slot += 1;
            }
            continue;
        }
        let Some(argument) = argument_for_parameter[index] else {
            runtime_slot += 1;
            continue;
        };
        let expected = signature_parameters
            .get(runtime_slot)
            .map(|p| p.type_id)
            .unwrap_or(comp.types.predefined.unknown);
        expr::analyse_expression(
            comp,
            wl,
            argument,
            ExpressionContext::SpecificType {
                expected,
                cast_mode: CastMode::Implicit,
            },
        )?;
        runtime_slot += 1;
    }

    Ok(Some(function))
}

fn create_function_instance(
    comp: &mut Compiler,
    wl: WorkloadId,
    header_id: PolyHeaderId,
    header: &PolyHeader,
    values: Vec<PolyValue>,
) -> Suspendable<FunctionId> {
    let PolyOrigin::Function { node } = header.origin else {
        return Ok(FunctionId(0));
    };
    let instance_table = comp.symbols.create_table(
        Some((header.symbol_table, SymbolAccessLevel::Polymorphic)),
        comp.symbols.table(header.symbol_table).operator_context,
    );
    let signature =
        analysis::build_instance_signature(comp, header, &values, header.return_type);
    let function = comp.program.add_function(
        signature,
        header.name,
        FunctionKind::Normal {
            symbol: None,
            parameter_table: instance_table,
        },
    );

    // Instance parameter symbols carry the substituted types
    let mut runtime_index = 0u32;
    for (index, parameter) in header.parameters.iter().enumerate() {
        if parameter.is_comptime {
            continue;
        }
        if let Some(parameter_node) = parameter.type_node {
            let text_index = comp.node_text_index(parameter_node);
            comp.symbols.define_symbol(
                instance_table,
                parameter.name,
                SymbolKind::Parameter {
                    function,
                    index_in_signature: index as u32,
                    index_in_runtime_signature: runtime_index,
                },
                SymbolAccessLevel::Internal,
                Some(parameter_node),
                text_index,
            );
        }
        runtime_index += 1;
    }

    let body_pass = comp.analysis.create_pass(wl);
    let body_workload = comp.executer.add_workload(
        WorkloadKind::FunctionBody { function, node },
        instance_table,
        body_pass,
    );
    comp.analysis.passes[body_pass].origin_workload = body_workload;
    {
        let parent_depth = comp.executer.workloads[wl].instanciation_depth;
        let workload = comp.executer.workload_mut(body_workload);
        workload.poly_values = values.clone();
        workload.poly_origin = Some(header_id);
        workload.poly_parent = Some(wl);
        workload.instanciation_depth = parent_depth + 1;
    }
    comp.function_bodies.insert(function, body_workload);
    comp.poly.add_instance(
        header_id,
        PolyInstance {
            values,
            target: PolyInstanceTarget::Function(function),
            body_workload,
        },
    );
    Ok(function)
}

/// Unify a header template type against an actual argument type: the
/// first binding of a pattern variable defines it, later occurrences must
/// match.
fn unify_pattern(
    comp: &mut Compiler,
    wl: WorkloadId,
    template: TypeId,
    actual: TypeId,
    header: &PolyHeader,
    values: &mut Vec<PolyValue>,
    error_node: NodeRef,
) {
    let template_type = comp.types.datatype(template).clone();
    let actual_stripped = comp.types.without_constant(actual);
    match template_type {
        Datatype::PatternVariable { id, .. } => {
            let Some(slot) = header
                .inferred
                .iter()
                .find(|inferred| inferred.id == id)
                .map(|inferred| inferred.value_access_index)
            else {
                return;
            };
            let bound = analysis::comptime_value_to_constant(
                comp,
                crate::comptime::ComptimeValue::Type(actual_stripped),
            );
            let Some(bound) = bound else { return };
            match values[slot as usize] {
                PolyValue::Unset { .. } => {
                    values[slot as usize] = PolyValue::Set { value: bound };
                }
                PolyValue::Set { value } if value == bound => {}
                _ => {
                    comp.log_semantic_error(
                        wl,
                        SemanticErrorKind::TypeMismatch {
                            expected: template,
                            given: actual_stripped,
                        },
                        error_node,
                    );
                }
            }
        }
        Datatype::Pointer {
            element: template_element,
            ..
        } => {
            if let Datatype::Pointer {
                element: actual_element,
                ..
            } = *comp.types.datatype(actual_stripped)
            {
                unify_pattern(
                    comp,
                    wl,
                    template_element,
                    actual_element,
                    header,
                    values,
                    error_node,
                );
            }
        }
        Datatype::Slice {
            element: template_element,
            ..
        } => {
            if let Datatype::Slice {
                element: actual_element,
                ..
            } = comp.types.datatype(actual_stripped).clone()
            {
                unify_pattern(
                    comp,
                    wl,
                    template_element,
                    actual_element,
                    header,
                    values,
                    error_node,
                );
            }
        }
        Datatype::Array {
            element: template_element,
            ..
        } => {
            if let Datatype::Array {
                element: actual_element,
                ..
            } = *comp.types.datatype(actual_stripped)
            {
                unify_pattern(
                    comp,
                    wl,
                    template_element,
                    actual_element,
                    header,
                    values,
                    error_node,
                );
            }
        }
        Datatype::Optional {
            child: template_child,
            ..
        } => {
            if let Datatype::Optional {
                child: actual_child,
                ..
            } = *comp.types.datatype(actual_stripped)
            {
                unify_pattern(
                    comp,
                    wl,
                    template_child,
                    actual_child,
                    header,
                    values,
                    error_node,
                );
            }
        }
        Datatype::Constant { element } => {
            unify_pattern(comp, wl, element, actual_stripped, header, values, error_node);
        }
        Datatype::StructPattern { base_struct } => {
            // Structural match: the actual type must instantiate the same
            // polymorphic struct
            let expected_header = comp.analysis.base_headers.get(&base_struct).copied();
            let actual_header = comp.analysis.instance_headers.get(&actual_stripped).copied();
            if expected_header.is_none() || expected_header != actual_header {
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::TypeMismatch {
                        expected: template,
                        given: actual_stripped,
                    },
                    error_node,
                );
            }
        }
        _ => {}
    }
}

/// Does a resolved type mention a pattern variable anywhere?
pub fn contains_pattern_variable(comp: &Compiler, type_id: TypeId) -> bool {
    match comp.types.datatype(type_id) {
        Datatype::PatternVariable { .. } => true,
        Datatype::Pointer { element, .. }
        | Datatype::Slice { element, .. }
        | Datatype::Array { element, .. }
        | Datatype::Constant { element } => contains_pattern_variable(comp, *element),
        Datatype::Optional { child, .. } => contains_pattern_variable(comp, *child),
        Datatype::StructPattern { .. } => true,
        _ => false,
    }
}

/// Evaluate every argument of a struct instantiation to a poly value.
fn evaluate_comptime_arguments(
    comp: &mut Compiler,
    wl: WorkloadId,
    header: &PolyHeader,
    call_node: NodeRef,
    arguments: &[upp_par::NodeId],
) -> Suspendable<Vec<PolyValue>> {
    let mut values = Vec::with_capacity(header.parameters.len());
    for (index, &argument) in arguments.iter().enumerate() {
        let argument_node = NodeRef::new(call_node.unit, argument);
        let value_node = match comp.node_kind(argument_node) {
            NodeKind::Argument { value, .. } => NodeRef::new(call_node.unit, value),
            _ => argument_node,
        };
        let expected = header
            .parameters
            .get(index)
            .and_then(|parameter| parameter.param_type);
        let context = match expected {
            Some(expected) if !contains_pattern_variable(comp, expected) => {
                ExpressionContext::SpecificType {
                    expected,
                    cast_mode: CastMode::Implicit,
                }
            }
            _ => ExpressionContext::Unknown {
                due_to_error: false,
            },
        };
        expr::analyse_expression(comp, wl, value_node, context)?;
        let pass = comp.executer.workloads[wl].pass;
        let value = match evaluate_comptime(comp, value_node, pass) {
            Ok(value) => match analysis::comptime_value_to_constant(comp, value) {
                Some(constant) => PolyValue::Set { value: constant },
                None => PolyValue::Unset {
                    unset_type: comp.types.predefined.unknown,
                },
            },
            Err(message) => {
                comp.log_semantic_error(
                    wl,
                    SemanticErrorKind::ComptimeEvaluationFailed { message },
                    value_node,
                );
                PolyValue::Unset {
                    unset_type: comp.types.predefined.unknown,
                }
            }
        };
        values.push(value);
    }
    Ok(values)
}
