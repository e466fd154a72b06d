//! Quantified invariants checked over whole compilations.

use upp_sem::compile_sources;
use upp_sem::types::Datatype;

#[test]
fn every_type_is_sized_after_successful_compilation() {
    let comp = compile_sources(&[(
        "main.upp",
        "Node :: struct(T: Type_Handle) { value: T; next: *?Node(T); }\n\
         Pair :: struct { a: int; b: bool; }\n\
         main :: () -> () { n: Node(i32); p: Pair; xs: [4]int; o: ?int; }",
    )]);
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    for type_id in comp.types.all_types() {
        let memory = comp.types.memory_info(type_id);
        let memory = match memory {
            Some(memory) => memory,
            None => panic!(
                "type {} has no memory info",
                comp.types.format_type(type_id, &comp.pool)
            ),
        };
        assert!(memory.alignment >= 1);
        assert_eq!(
            memory.size % memory.alignment,
            0,
            "size not a multiple of alignment for {}",
            comp.types.format_type(type_id, &comp.pool)
        );
    }
}

#[test]
fn structurally_equal_derived_types_are_identical() {
    let comp = compile_sources(&[(
        "main.upp",
        "first :: (p: *int, s: []int, a: [3]int) -> () {}\n\
         second :: (p: *int, s: []int, a: [3]int) -> () {}\n\
         main :: () -> () {}",
    )]);
    assert!(comp.error_list().is_empty());

    // Collect structural keys of all derived types; no key may repeat
    let mut seen = std::collections::HashMap::new();
    for type_id in comp.types.all_types() {
        let key = match comp.types.datatype(type_id) {
            Datatype::Pointer { element, optional } => {
                format!("ptr:{}:{}", element.0, optional)
            }
            Datatype::Optional { child, .. } => format!("opt:{}", child.0),
            Datatype::Array {
                element,
                count_known,
                element_count,
            } => format!("arr:{}:{}:{}", element.0, count_known, element_count),
            Datatype::Slice { element, .. } => format!("slice:{}", element.0),
            Datatype::Constant { element } => format!("const:{}", element.0),
            Datatype::FunctionPointer {
                signature,
                optional,
            } => format!("fnptr:{}:{}", signature.0, optional),
            _ => continue,
        };
        if let Some(previous) = seen.insert(key.clone(), type_id) {
            panic!("duplicate structural type {key}: {previous:?} and {type_id:?}");
        }
    }
}

#[test]
fn subtype_trees_share_size_and_tag_fits() {
    let comp = compile_sources(&[(
        "main.upp",
        "Shape :: struct { x: float; Circle :: struct { r: float; } Rect :: struct { w: float; h: float; } }\n\
         main :: () -> () { s: Shape; }",
    )]);
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
    let shape = comp
        .types
        .all_types()
        .find(|&id| {
            comp.types
                .struct_type(id)
                .map(|s| comp.pool.get(s.name) == "Shape" && s.parent.is_none())
                .unwrap_or(false)
        })
        .expect("Shape struct");
    let shape_struct = comp.types.struct_type(shape).unwrap().clone();
    let shape_memory = comp.types.memory_info(shape).unwrap();
    assert_eq!(shape_struct.subtypes.len(), 2);

    let tag = shape_struct.tag_member.as_ref().expect("tag member");
    let tag_size = comp.types.memory_info(tag.type_id).unwrap().size;
    assert!(tag.offset + tag_size <= shape_memory.size);

    for &subtype in &shape_struct.subtypes {
        assert_eq!(comp.types.memory_info(subtype), Some(shape_memory));
    }

    // Tag enum is sequential 1..=n
    let tag_enum = comp
        .types
        .enum_type(shape_struct.tag_enum.unwrap())
        .unwrap();
    assert!(tag_enum.values_are_sequential);
    assert_eq!(tag_enum.sequence_start_value, 1);
    assert_eq!(tag_enum.members.len(), 2);
}

#[test]
fn constants_are_canonical_under_rewalk() {
    let comp = compile_sources(&[(
        "main.upp",
        "main :: () -> () { x: int = 41 + 1; y: int = 42; }",
    )]);
    assert!(comp.error_list().is_empty());
    // Walking each pooled constant's memory reads only canonical bytes:
    // re-adding the stored bytes yields the same constant
    for index in 0..comp.constants.len() {
        let id = upp_sem::constants::ConstantId(index as u32);
        let entry = comp.constants.constant(id);
        if comp.constants.string_id(id).is_some() {
            continue;
        }
        let bytes = comp.constants.bytes(id).to_vec();
        let mut pool = upp_sem::constants::ConstantPool::new();
        let readded = pool
            .add_constant(
                &comp.types,
                comp.program.functions.len(),
                entry.type_id,
                &bytes,
            )
            .expect("canonical bytes re-add cleanly");
        assert_eq!(pool.bytes(readded), bytes.as_slice());
    }
}

#[test]
fn scheduler_terminates_on_unbreakable_cycles() {
    // Mutually recursive by-value structs have infinite size; the cycle
    // is unbreakable and must surface as an error, not a hang
    let comp = compile_sources(&[(
        "main.upp",
        "A :: struct { b: B; }\n\
         B :: struct { a: A; }\n\
         main :: () -> () {}",
    )]);
    let errors = comp.error_list();
    assert!(
        errors
            .iter()
            .any(|e| e.message == "cyclic unbreakable dependency"),
        "errors: {errors:?}"
    );
}

#[test]
fn cyclic_comptime_definitions_error() {
    let comp = compile_sources(&[(
        "main.upp",
        "a :: b;\n\
         b :: a;\n\
         main :: () -> () {}",
    )]);
    let errors = comp.error_list();
    assert!(
        errors
            .iter()
            .any(|e| e.message == "cyclic unbreakable dependency"),
        "errors: {errors:?}"
    );
}

#[test]
fn import_cycles_are_legal() {
    let comp = compile_sources(&[(
        "main.upp",
        "First :: module { import Second; one :: (x: int) -> int { return x; } }\n\
         Second :: module { import First; two :: (x: int) -> int { return x; } }\n\
         main :: () -> () { y: int = First::one(1) + Second::two(2); }",
    )]);
    assert!(
        comp.error_list().is_empty(),
        "unexpected errors: {:?}",
        comp.error_list()
    );
}

#[test]
fn switch_on_empty_enum_is_an_error() {
    let comp = compile_sources(&[(
        "main.upp",
        "Empty :: enum { }\n\
         main :: () -> () { e: Empty; switch e { default { } } }",
    )]);
    let errors = comp.error_list();
    assert!(
        errors.iter().any(|e| e.message == "switch on empty enum"),
        "errors: {errors:?}"
    );
}
