//! End-to-end compilation scenarios over literal sources.

use upp_par::ast::NodeKind;
use upp_sem::passes::{
    AnalysisInfo, CastType, ControlFlow, ExpressionResult, StatementSpecifics,
};
use upp_sem::poly::PolyInstanceTarget;
use upp_sem::types::Datatype;
use upp_sem::{compile_sources, Compiler, NodeRef};
use upp_util::UnitId;

fn compile(text: &str) -> Compiler {
    compile_sources(&[("main.upp", text)])
}

/// Find the first node satisfying the predicate in unit 0.
fn find_node(comp: &Compiler, predicate: impl Fn(&NodeKind) -> bool) -> Option<NodeRef> {
    let unit = UnitId(0);
    comp.ast(unit)
        .iter()
        .find(|(_, node)| predicate(&node.kind))
        .map(|(id, _)| NodeRef::new(unit, id))
}

fn expression_info_of(
    comp: &Compiler,
    node: NodeRef,
) -> Option<&upp_sem::passes::ExpressionInfo> {
    comp.analysis
        .passes_of(node)
        .iter()
        .find_map(|&pass| comp.analysis.expression_info(node, pass))
}

fn function_named(comp: &Compiler, name: &str) -> Option<upp_sem::program::FunctionId> {
    comp.program
        .functions
        .iter_enumerated()
        .find(|(_, f)| comp.pool.get(f.name) == name)
        .map(|(id, _)| id)
}

// ----------------------------------------------------------------------
// S1: empty main
// ----------------------------------------------------------------------

#[test]
fn s1_empty_main_compiles() {
    let comp = compile("main :: () -> () {}");
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    let main = comp.program.main_function.expect("main resolved");
    let function = &comp.program.functions[main];
    assert_eq!(comp.pool.get(function.name), "main");
    assert!(function.is_runnable);
    assert!(!function.contains_errors);
    let signature = comp.types.signature(function.signature);
    assert!(signature.parameters.is_empty());
    assert!(signature.return_type.is_none());
}

// ----------------------------------------------------------------------
// S2: self-referential polymorphic struct
// ----------------------------------------------------------------------

#[test]
fn s2_self_referential_struct_resolves() {
    let comp = compile(
        "Node :: struct(T: Type_Handle) { value: T; next: *?Node(T); }\n\
         main :: () -> () { n: Node(i32); }",
    );
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    let main = comp.program.main_function.expect("main resolved");
    assert!(comp.program.functions[main].is_runnable);

    // Exactly one struct instance of the header exists
    let header = comp
        .poly
        .headers
        .iter()
        .find(|h| !h.is_function)
        .expect("struct header registered");
    assert_eq!(header.instances.len(), 1);
    let PolyInstanceTarget::Struct(instance) = header.instances[0].target else {
        panic!("instance is not a struct");
    };

    let struct_type = comp.types.struct_type(instance).expect("instance struct");
    assert_eq!(struct_type.members.len(), 2);
    // `value` resolved to i32
    assert_eq!(struct_type.members[0].type_id, comp.types.predefined.i32);
    // `next` is an optional pointer to the same instance
    match *comp.types.datatype(struct_type.members[1].type_id) {
        Datatype::Pointer { element, optional } => {
            assert!(optional);
            assert_eq!(element, instance);
        }
        ref other => panic!("next is not a pointer: {other:?}"),
    }
    // The instance finished with a real layout
    let memory = comp.types.memory_info(instance).expect("instance sized");
    assert!(memory.size > 0);
    assert_eq!(memory.size % memory.alignment, 0);
}

#[test]
fn s2_instances_deduplicate() {
    let comp = compile(
        "Node :: struct(T: Type_Handle) { value: T; next: *?Node(T); }\n\
         main :: () -> () { a: Node(i32); b: Node(i32); c: Node(i64); }",
    );
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    let header = comp
        .poly
        .headers
        .iter()
        .find(|h| !h.is_function)
        .expect("struct header");
    // i32 twice dedups; i64 is a second instance
    assert_eq!(header.instances.len(), 2);
}

// ----------------------------------------------------------------------
// S3: recursive and mutually recursive functions
// ----------------------------------------------------------------------

#[test]
fn s3_recursive_functions_compile() {
    let comp = compile(
        "foo :: (x: int) -> int { return foo(x - 1); }\n\
         bar :: (x: int) -> int { return foo(x); }\n\
         main :: () -> () {}",
    );
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    let foo = function_named(&comp, "foo").expect("foo");
    let bar = function_named(&comp, "bar").expect("bar");
    assert_eq!(comp.program.functions[foo].calls, vec![foo]);
    assert_eq!(comp.program.functions[bar].calls, vec![foo]);
    assert!(comp.program.functions[foo].is_runnable);
    assert!(comp.program.functions[bar].is_runnable);
}

#[test]
fn s3_mutually_recursive_functions_compile() {
    let comp = compile(
        "foo :: (x: int) -> int { return bar(x - 1); }\n\
         bar :: (x: int) -> int { return foo(x); }\n\
         main :: () -> () {}",
    );
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    let foo = function_named(&comp, "foo").expect("foo");
    let bar = function_named(&comp, "bar").expect("bar");
    assert_eq!(comp.program.functions[foo].calls, vec![bar]);
    assert_eq!(comp.program.functions[bar].calls, vec![foo]);
    assert!(comp.program.functions[foo].is_runnable);
    assert!(comp.program.functions[bar].is_runnable);
}

// ----------------------------------------------------------------------
// S4: custom cast context
// ----------------------------------------------------------------------

#[test]
fn s4_custom_cast_applies_to_literal() {
    let comp = compile(
        "context cast(f :: (x: int) -> float { return cast_raw{float}(x); });\n\
         main :: () -> () { f: float = 3; }",
    );
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    let cast_function = function_named(&comp, "f").expect("cast function");

    let literal = find_node(&comp, |kind| matches!(kind, NodeKind::IntLiteral(3)))
        .expect("literal 3 in tree");
    let info = expression_info_of(&comp, literal).expect("literal analysed");
    assert_eq!(info.cast_info.cast, CastType::Custom);
    assert_eq!(info.cast_info.custom_cast_function, Some(cast_function));
    assert_eq!(info.cast_info.result_type, comp.types.predefined.f32);
}

// ----------------------------------------------------------------------
// S5: defer LIFO emission
// ----------------------------------------------------------------------

#[test]
fn s5_defers_emit_in_lifo_order() {
    let comp = compile(
        "main :: () -> () { defer print_i32(1); defer print_i32(2); return; }",
    );
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );

    let return_node = find_node(&comp, |kind| {
        matches!(kind, NodeKind::ReturnStatement { value: None })
    })
    .expect("return statement");
    let statement_info = comp
        .analysis
        .passes_of(return_node)
        .iter()
        .find_map(|&pass| comp.analysis.statement_info(return_node, pass))
        .expect("return analysed");
    assert_eq!(statement_info.flow, ControlFlow::Returns);

    let StatementSpecifics::Return { deferred_blocks } = &statement_info.specifics else {
        panic!("no deferred blocks recorded");
    };
    assert_eq!(deferred_blocks.len(), 2);
    // LIFO: the second defer's block first
    let literal_of_block = |block: upp_par::NodeId| -> i64 {
        let unit = UnitId(0);
        let NodeKind::CodeBlock { statements } = comp.ast(unit).kind(block) else {
            panic!("deferred node is not a block");
        };
        let NodeKind::ExpressionStatement { expr } = comp.ast(unit).kind(statements[0]) else {
            panic!("deferred statement shape");
        };
        let NodeKind::Call { arguments, .. } = comp.ast(unit).kind(*expr) else {
            panic!("deferred call shape");
        };
        let NodeKind::Argument { value, .. } = comp.ast(unit).kind(arguments[0]) else {
            panic!("argument shape");
        };
        let NodeKind::IntLiteral(value) = comp.ast(unit).kind(*value) else {
            panic!("argument is not a literal");
        };
        *value
    };
    assert_eq!(literal_of_block(deferred_blocks[0]), 2);
    assert_eq!(literal_of_block(deferred_blocks[1]), 1);

    // The body's control flow is Returns
    let main = comp.program.main_function.expect("main");
    assert!(comp.program.functions[main].is_runnable);
}

// ----------------------------------------------------------------------
// S6: unresolved symbol
// ----------------------------------------------------------------------

#[test]
fn s6_unresolved_symbol_is_reported_once() {
    let comp = compile("main :: () -> () { y: int = x; }");
    let errors = comp.error_list();
    assert_eq!(errors.len(), 1, "errors: {errors:?}");
    assert_eq!(errors[0].message, "unresolved symbol");
    // The error anchors at the identifier token
    let literal = find_node(&comp, |kind| {
        matches!(kind, NodeKind::SymbolLookup { path } if path.len() == 1)
    });
    assert!(literal.is_some());

    let main = comp.program.main_function.expect("main still resolved");
    assert!(comp.program.functions[main].contains_errors);
    assert!(!comp.program.functions[main].is_runnable);
}

// ----------------------------------------------------------------------
// Additional coverage
// ----------------------------------------------------------------------

#[test]
fn missing_main_is_an_error() {
    let comp = compile("helper :: (x: int) -> int { return x; }");
    let errors = comp.error_list();
    assert!(errors.iter().any(|e| e.message == "no main"));
    assert!(comp.program.main_function.is_none());
}

#[test]
fn main_with_wrong_signature_is_an_error() {
    let comp = compile("main :: (x: int) -> int { return x; }");
    let errors = comp.error_list();
    assert!(errors.iter().any(|e| e.message == "main has wrong signature"));
}

#[test]
fn polymorphic_function_instantiates_by_inference() {
    let comp = compile(
        "identity :: (x: $T) -> T { return x; }\n\
         main :: () -> () { y: int = identity(5); }",
    );
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    let header = comp
        .poly
        .headers
        .iter()
        .find(|h| h.is_function)
        .expect("function header");
    assert_eq!(header.instances.len(), 1);
    let PolyInstanceTarget::Function(instance) = header.instances[0].target else {
        panic!("instance is not a function");
    };
    let signature = comp.types.signature(comp.program.functions[instance].signature);
    assert_eq!(signature.parameters.len(), 1);
    assert_eq!(signature.parameters[0].type_id, comp.types.predefined.i32);
    assert_eq!(signature.return_type, Some(comp.types.predefined.i32));
}

#[test]
fn enum_definition_and_member_access() {
    let comp = compile(
        "Color :: enum { RED; GREEN; BLUE; }\n\
         main :: () -> () { c := Color.GREEN; }",
    );
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    // Sequential values 1, 2, 3
    let member_access = find_node(&comp, |kind| {
        matches!(kind, NodeKind::MemberAccess { .. })
    })
    .expect("member access");
    let info = expression_info_of(&comp, member_access).expect("analysed");
    let ExpressionResult::Constant(constant) = info.result else {
        panic!("enum member is not a constant");
    };
    assert_eq!(comp.constants.read_i32(constant), Some(2));
}

#[test]
fn defer_with_return_inside_is_rejected() {
    let comp = compile("main :: () -> () { defer { return; } }");
    let errors = comp.error_list();
    assert!(errors.iter().any(|e| e.message == "defer contains return"));
}

#[test]
fn break_outside_loop_is_rejected() {
    let comp = compile("main :: () -> () { break; }");
    let errors = comp.error_list();
    assert!(errors.iter().any(|e| e.message == "break outside loop"));
}

#[test]
fn while_loop_and_switch_analyse() {
    let comp = compile(
        "main :: () -> () {\n\
           x: int = 0;\n\
           while x < 3 { x = x + 1; }\n\
           switch x { case 1 { } default { } }\n\
         }",
    );
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
}

#[test]
fn modules_and_imports_resolve() {
    let comp = compile(
        "Math :: module { double :: (x: int) -> int { return x + x; } }\n\
         main :: () -> () { y: int = Math::double(21); }",
    );
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    let double = function_named(&comp, "double").expect("double");
    let main = comp.program.main_function.expect("main");
    assert_eq!(comp.program.functions[main].calls, vec![double]);
}

#[test]
fn bake_expression_folds_to_constant() {
    let comp = compile("main :: () -> () { x: int = bake 6 * 7; }");
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    let bake = comp.bakes.bakes.iter().next().expect("bake recorded");
    let result = bake.result.expect("bake executed");
    assert_eq!(comp.constants.read_i32(result), Some(42));
}

#[test]
fn string_literals_share_pool_bytes() {
    let comp = compile("main :: () -> () { print_string(\"hi\"); print_string(\"hi\"); }");
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    // Two identical literals dedup to one pooled constant
    let string_constants: Vec<_> = (0..comp.constants.len())
        .map(|i| upp_sem::constants::ConstantId(i as u32))
        .filter(|&id| comp.constants.string_id(id).is_some())
        .collect();
    assert_eq!(string_constants.len(), 1);
}

#[test]
fn editor_index_covers_definitions_and_errors() {
    let comp = compile("main :: () -> () { y: int = x; }");
    // The definition line carries at least one reference
    let references = comp.editor.references_at(UnitId(0), 0);
    assert!(!references.is_empty());
    // Every reference points at a non-empty info slice
    for reference in references {
        assert!(reference.info_count > 0);
        assert!(!comp.editor.infos_of(reference).is_empty());
    }
    // The error is materialised as an editor item
    let has_error_item = comp.editor.infos.iter().any(|info| {
        matches!(
            info.kind,
            upp_sem::editor::EditorInfoKind::ErrorItem { .. }
        )
    });
    assert!(has_error_item);
}

#[test]
fn unreachable_statement_is_reported() {
    let comp = compile("main :: () -> () { return; print_line(); }");
    let errors = comp.error_list();
    assert!(errors.iter().any(|e| e.message == "unreachable statement"));
}
