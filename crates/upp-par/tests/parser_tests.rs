//! Parser integration tests over the scenario grammar.

use upp_lex::lex_buffer;
use upp_par::ast::{Binop, CastKeyword, ContextChangeKind, DefinitionKind, NodeKind};
use upp_par::{parse_unit, Ast, NodeId};
use upp_util::{Handler, IdentifierPool, SourceBuffer, UnitId};

fn parse(text: &str) -> (Ast, Handler, IdentifierPool) {
    let pool = IdentifierPool::new();
    let handler = Handler::new();
    let mut buffer = SourceBuffer::from_text("test.upp", text);
    let lexed = {
        let lock = pool.lock();
        lex_buffer(&mut buffer, UnitId(0), &pool, &lock, &handler)
    };
    let ast = parse_unit(&lexed, &buffer, UnitId(0), &pool, &handler);
    (ast, handler, pool)
}

fn root_items(ast: &Ast) -> Vec<NodeId> {
    match ast.kind(ast.root.unwrap()) {
        NodeKind::Module { items } => items.clone(),
        other => panic!("root is not a module: {other:?}"),
    }
}

#[test]
fn parses_empty_main() {
    let (ast, handler, pool) = parse("main :: () -> () {}");
    assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
    let items = root_items(&ast);
    assert_eq!(items.len(), 1);
    match ast.kind(items[0]) {
        NodeKind::Definition {
            name,
            kind: DefinitionKind::Comptime,
            value: Some(value),
            ..
        } => {
            assert_eq!(pool.get(*name), "main");
            match ast.kind(*value) {
                NodeKind::FunctionLiteral {
                    parameters,
                    return_type,
                    body: Some(body),
                } => {
                    assert!(parameters.is_empty());
                    assert!(return_type.is_none());
                    match ast.kind(*body) {
                        NodeKind::CodeBlock { statements } => assert!(statements.is_empty()),
                        other => panic!("body is not a block: {other:?}"),
                    }
                }
                other => panic!("value is not a function: {other:?}"),
            }
        }
        other => panic!("not a comptime definition: {other:?}"),
    }
}

#[test]
fn parses_polymorphic_struct_with_self_pointer() {
    let source = "Node :: struct(T: Type_Handle) { value: T; next: *?Node(T); }\n\
                  main :: () -> () { n: Node(i32); }";
    let (ast, handler, pool) = parse(source);
    assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
    let items = root_items(&ast);
    assert_eq!(items.len(), 2);

    let NodeKind::Definition { value: Some(value), .. } = ast.kind(items[0]) else {
        panic!("expected definition");
    };
    let NodeKind::StructLiteral {
        is_union,
        parameters,
        members,
        subtypes,
    } = ast.kind(*value)
    else {
        panic!("expected struct literal");
    };
    assert!(!is_union);
    assert_eq!(parameters.len(), 1);
    assert_eq!(members.len(), 2);
    assert!(subtypes.is_empty());

    // `next: *?Node(T)` - optional pointer to an instantiation call
    let NodeKind::StructMember { name, type_node } = ast.kind(members[1]) else {
        panic!("expected member");
    };
    assert_eq!(pool.get(*name), "next");
    let NodeKind::PointerType { element, optional } = ast.kind(*type_node) else {
        panic!("expected pointer type, got {:?}", ast.kind(*type_node));
    };
    assert!(optional);
    assert!(matches!(ast.kind(*element), NodeKind::Call { .. }));
}

#[test]
fn parses_recursive_functions() {
    let source = "foo :: (x: int) -> int { return foo(x - 1); }\n\
                  bar :: (x: int) -> int { return foo(x); }";
    let (ast, handler, _) = parse(source);
    assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
    assert_eq!(root_items(&ast).len(), 2);
}

#[test]
fn parses_context_cast() {
    let source = "context cast(f :: (x: int) -> float { return cast_raw{float}(x); });\n\
                  main :: () -> () { f: float = 3; }";
    let (ast, handler, pool) = parse(source);
    assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
    let items = root_items(&ast);
    let NodeKind::ContextChange { kind, changes } = ast.kind(items[0]) else {
        panic!("expected context change");
    };
    assert_eq!(*kind, ContextChangeKind::Cast);
    assert_eq!(changes.len(), 1);
    let NodeKind::Definition { name, value: Some(value), .. } = ast.kind(changes[0]) else {
        panic!("expected named change");
    };
    assert_eq!(pool.get(*name), "f");
    let NodeKind::FunctionLiteral { body: Some(body), .. } = ast.kind(*value) else {
        panic!("expected function literal");
    };
    // Body returns a cast_raw expression
    let NodeKind::CodeBlock { statements } = ast.kind(*body) else {
        panic!()
    };
    let NodeKind::ReturnStatement { value: Some(ret) } = ast.kind(statements[0]) else {
        panic!("expected return");
    };
    // `cast_raw{float}(x)` parses as a cast whose operand is parenthesized
    let NodeKind::Cast { keyword, target, .. } = ast.kind(*ret) else {
        panic!("expected cast, got {:?}", ast.kind(*ret));
    };
    assert_eq!(*keyword, CastKeyword::CastRaw);
    assert!(target.is_some());
}

#[test]
fn parses_defer_statements() {
    let source = "main :: () -> () { defer print_i32(1); defer print_i32(2); return; }";
    let (ast, handler, _) = parse(source);
    assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
    let items = root_items(&ast);
    let NodeKind::Definition { value: Some(value), .. } = ast.kind(items[0]) else {
        panic!()
    };
    let NodeKind::FunctionLiteral { body: Some(body), .. } = ast.kind(*value) else {
        panic!()
    };
    let NodeKind::CodeBlock { statements } = ast.kind(*body) else { panic!() };
    assert_eq!(statements.len(), 3);
    assert!(matches!(
        ast.kind(statements[0]),
        NodeKind::DeferStatement { .. }
    ));
    assert!(matches!(
        ast.kind(statements[1]),
        NodeKind::DeferStatement { .. }
    ));
    assert!(matches!(
        ast.kind(statements[2]),
        NodeKind::ReturnStatement { value: None }
    ));
}

#[test]
fn parses_imports() {
    let (ast, handler, pool) = parse("import Algorithms::Sort as quick;\nimport Math;");
    assert!(!handler.has_errors());
    let items = root_items(&ast);
    let NodeKind::Import { path, alias, .. } = ast.kind(items[0]) else {
        panic!()
    };
    assert_eq!(path.len(), 2);
    assert_eq!(pool.get(path[0]), "Algorithms");
    assert_eq!(pool.get(alias.unwrap()), "quick");
    let NodeKind::Import { path, alias, .. } = ast.kind(items[1]) else {
        panic!()
    };
    assert_eq!(path.len(), 1);
    assert!(alias.is_none());
}

#[test]
fn parses_nested_module() {
    let source = "Utils :: module { helper :: (x: int) -> int { return x; } }";
    let (ast, handler, _) = parse(source);
    assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
    let items = root_items(&ast);
    let NodeKind::Definition { value: Some(value), .. } = ast.kind(items[0]) else {
        panic!()
    };
    let NodeKind::Module { items: inner } = ast.kind(*value) else {
        panic!("expected module literal, got {:?}", ast.kind(*value));
    };
    assert_eq!(inner.len(), 1);
}

#[test]
fn parses_struct_subtypes() {
    let source = "Shape :: struct { area: float; Circle :: struct { radius: float; } }";
    let (ast, handler, _) = parse(source);
    assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
    let items = root_items(&ast);
    let NodeKind::Definition { value: Some(value), .. } = ast.kind(items[0]) else {
        panic!()
    };
    let NodeKind::StructLiteral { members, subtypes, .. } = ast.kind(*value) else {
        panic!()
    };
    assert_eq!(members.len(), 1);
    assert_eq!(subtypes.len(), 1);
}

#[test]
fn parses_control_flow_statements() {
    let source = "main :: () -> () {\n\
        x: int = 0;\n\
        while x < 10 { x = x + 1; if x == 5 { break; } else { continue; } }\n\
        switch x { case 1 { return; } default { } }\n\
        for it in arr { print_i32(it); }\n\
    }";
    let (ast, handler, _) = parse(source);
    assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
    assert_eq!(root_items(&ast).len(), 1);
}

#[test]
fn parses_enum_definition() {
    let source = "Color :: enum { RED; GREEN = 5; BLUE; }";
    let (ast, handler, _) = parse(source);
    assert!(!handler.has_errors());
    let items = root_items(&ast);
    let NodeKind::Definition { value: Some(value), .. } = ast.kind(items[0]) else {
        panic!()
    };
    let NodeKind::EnumLiteral { members } = ast.kind(*value) else { panic!() };
    assert_eq!(members.len(), 3);
}

#[test]
fn parse_error_recovers_to_next_item() {
    let source = "broken ::::: ;\nmain :: () -> () {}";
    let (ast, handler, _) = parse(source);
    assert!(handler.has_errors());
    // main still parsed
    let found_main = root_items(&ast).iter().any(|id| {
        matches!(ast.kind(*id), NodeKind::Definition { value: Some(v), .. }
            if matches!(ast.kind(*v), NodeKind::FunctionLiteral { .. }))
    });
    assert!(found_main);
}

#[test]
fn binary_precedence_shapes_tree() {
    let (ast, handler, _) = parse("x :: 1 + 2 * 3;");
    assert!(!handler.has_errors());
    let items = root_items(&ast);
    let NodeKind::Definition { value: Some(value), .. } = ast.kind(items[0]) else {
        panic!()
    };
    let NodeKind::Binary { op, right, .. } = ast.kind(*value) else {
        panic!()
    };
    assert_eq!(*op, Binop::Add);
    assert!(matches!(
        ast.kind(*right),
        NodeKind::Binary {
            op: Binop::Multiply,
            ..
        }
    ));
}
