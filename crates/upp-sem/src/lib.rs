//! upp-sem - Semantic Analyser & Type Checker
//!
//! The core of the Upp compiler front-end: turns parsed compilation units
//! into a fully typed, semantically validated program tree
//! ([`program::ModTreeProgram`]) plus the editor-info index an IDE layer
//! consumes.
//!
//! Analysis is driven by the workload scheduler in [`workload`]: every
//! module, import, function header/body, struct, bake, and definition is
//! one workload that may suspend on unresolved dependencies and resume
//! once they complete. Legitimately cyclic groups (recursive functions,
//! self-referential structs, import cycles) are resolved by the
//! scheduler's cluster mechanism.
//!
//! All state lives in one [`Compiler`] context; there are no process-wide
//! globals. Graphs are arena-allocated and addressed by typed ids, so the
//! analysis-info tables key on stable `(node, pass)` pairs rather than
//! addresses.

pub mod analysis;
pub mod comptime;
pub mod constants;
pub mod editor;
pub mod errors;
pub mod operators;
pub mod passes;
pub mod poly;
pub mod program;
pub mod symbols;
pub mod types;
pub mod workload;

use rustc_hash::FxHashMap;
use tracing::debug;
use upp_lex::LexedUnit;
use upp_par::ast::{Ast, NodeKind};
use upp_par::NodeId;
use upp_util::{
    Handler, Identifier, IdentifierPool, IndexVec, SourceBuffer, TextIndex, UnitId,
};

use comptime::BakeStore;
use constants::ConstantPool;
use editor::EditorIndex;
use errors::{SemanticError, SemanticErrorKind};
use operators::{ContextId, OperatorStore};
use passes::{AnalysisData, PassId};
use poly::PolyStore;
use program::{ExternSources, FunctionId, HardcodedKind, ModTreeProgram};
use symbols::{SymbolAccessLevel, SymbolKind, SymbolQuery, SymbolStore, TableId};
use types::{SignatureId, TypeSystem};
use workload::{ResolveOutcome, WorkloadExecuter, WorkloadId, WorkloadKind};

/// A node address that is stable across the whole compilation: the unit it
/// belongs to plus its arena id inside that unit's AST.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub unit: UnitId,
    pub node: NodeId,
}

impl NodeRef {
    pub fn new(unit: UnitId, node: NodeId) -> Self {
        Self { unit, node }
    }
}

/// One loaded compilation unit.
pub struct CompilationUnit {
    pub buffer: SourceBuffer,
    pub lexed: LexedUnit,
    pub ast: Ast,
}

/// Uniform error record for the driver: parser and semantic errors share
/// one list.
#[derive(Clone, Debug)]
pub struct CompilerErrorInfo {
    pub message: String,
    pub unit: UnitId,
    /// Index into the semantic error list, if this is a semantic error
    pub semantic_error_index: Option<usize>,
    pub text_index: TextIndex,
}

/// The whole compilation context. Passed explicitly to every analysis
/// function; owns all pools, arenas, and tables.
pub struct Compiler {
    pub pool: IdentifierPool,
    pub handler: Handler,
    pub units: IndexVec<UnitId, CompilationUnit>,

    pub types: TypeSystem,
    pub symbols: SymbolStore,
    pub constants: ConstantPool,
    pub operators: OperatorStore,
    pub executer: WorkloadExecuter,
    pub analysis: AnalysisData,
    pub poly: PolyStore,
    pub bakes: BakeStore,

    pub program: ModTreeProgram,
    pub extern_sources: ExternSources,
    pub semantic_errors: Vec<SemanticError>,
    pub editor: EditorIndex,

    /// Root scope shared by every unit's top-level definitions
    pub root_table: TableId,
    /// Builtin scope holding primitives and hardcoded functions
    pub builtin_table: TableId,
    pub root_context: ContextId,
    pub hardcoded_signatures: FxHashMap<HardcodedKind, SignatureId>,
    /// The `[]u8` type backing string literals
    pub string_type: types::TypeId,

    /// Event that fires when every module's symbols are discovered
    pub all_tables_ready: WorkloadId,
    /// Table-ready event per module table
    pub table_ready: FxHashMap<TableId, WorkloadId>,
    /// Function body workloads, for cluster compilation
    pub function_bodies: FxHashMap<FunctionId, WorkloadId>,
    /// Cluster-compile workloads per function
    pub cluster_workloads: FxHashMap<FunctionId, WorkloadId>,
}

impl Compiler {
    pub fn ast(&self, unit: UnitId) -> &Ast {
        &self.units[unit].ast
    }

    pub fn node_kind(&self, node: NodeRef) -> NodeKind {
        self.units[node.unit].ast.kind(node.node).clone()
    }

    /// Intern a string; acquires and releases the pool lock internally.
    pub fn intern(&self, text: &str) -> Identifier {
        let lock = self.pool.lock();
        self.pool.add(&lock, text)
    }

    /// Anchor position of a node for error reporting.
    pub fn node_text_index(&self, node: NodeRef) -> TextIndex {
        let range = self.units[node.unit].ast.range(node.node);
        self.units[node.unit]
            .buffer
            .token_to_text(range.start, false)
    }

    /// Record a semantic error against a node; bumps the current
    /// workload's counter and never unwinds.
    pub fn log_semantic_error(
        &mut self,
        workload: WorkloadId,
        kind: SemanticErrorKind,
        node: NodeRef,
    ) {
        let due_to_unknown = matches!(
            kind,
            SemanticErrorKind::TypeMismatch { expected, given }
                if self.types.is_unknown(expected) || self.types.is_unknown(given)
        );
        if due_to_unknown {
            self.executer.workloads[workload].errors_due_to_unknown_count += 1;
        } else {
            self.executer.workloads[workload].real_error_count += 1;
            self.semantic_errors.push(SemanticError {
                kind,
                unit: node.unit,
                node: node.node,
                text_index: self.node_text_index(node),
                due_to_unknown: false,
            });
        }
    }

    /// Uniform error list: parser diagnostics plus semantic errors.
    pub fn error_list(&self) -> Vec<CompilerErrorInfo> {
        let mut list: Vec<CompilerErrorInfo> = self
            .handler
            .diagnostics()
            .into_iter()
            .filter(|d| d.level == upp_util::Level::Error)
            .map(|d| CompilerErrorInfo {
                message: d.message,
                unit: d.unit,
                semantic_error_index: None,
                text_index: d.range.start,
            })
            .collect();
        for (index, error) in self.semantic_errors.iter().enumerate() {
            list.push(CompilerErrorInfo {
                message: error.kind.name().to_string(),
                unit: error.unit,
                semantic_error_index: Some(index),
                text_index: error.text_index,
            });
        }
        list
    }

    pub fn has_errors(&self) -> bool {
        self.handler.has_errors() || !self.semantic_errors.is_empty()
    }
}

/// Compile a set of `(path, text)` sources into a full compilation
/// context: program tree, error list, and editor index.
pub fn compile_sources(sources: &[(&str, &str)]) -> Compiler {
    let pool = IdentifierPool::new();
    let handler = Handler::new();

    // Boot the type system and hardcoded signatures under one pool lock
    let mut types = {
        let lock = pool.lock();
        TypeSystem::new(&pool, &lock)
    };
    let mut hardcoded_signatures = FxHashMap::default();
    {
        let lock = pool.lock();
        let names = [
            pool.add(&lock, "x"),
            pool.add(&lock, "y"),
            pool.add(&lock, "z"),
        ];
        for kind in HardcodedKind::ALL {
            hardcoded_signatures.insert(kind, kind.make_signature(&mut types, names));
        }
    }
    let string_type = {
        let u8_type = types.predefined.u8;
        let slice = types.make_slice(u8_type);
        types.make_constant(slice)
    };

    // Load, lex, and parse every unit
    let mut units: IndexVec<UnitId, CompilationUnit> = IndexVec::new();
    for (path, text) in sources {
        let unit_id = units.next_index();
        let mut buffer = SourceBuffer::from_text(*path, text);
        let lexed = {
            let lock = pool.lock();
            upp_lex::lex_buffer(&mut buffer, unit_id, &pool, &lock, &handler)
        };
        let ast = upp_par::parse_unit(&lexed, &buffer, unit_id, &pool, &handler);
        units.push(CompilationUnit { buffer, lexed, ast });
    }

    let mut operators = OperatorStore::default();
    let builtin_context = operators.create_context(None);
    let root_context = operators.create_context(Some(builtin_context));

    let mut symbols = SymbolStore::default();
    let builtin_table = symbols.create_table(None, builtin_context);
    let root_table = symbols.create_table(
        Some((builtin_table, SymbolAccessLevel::Global)),
        root_context,
    );

    let mut executer = WorkloadExecuter::default();
    let all_tables_ready = executer.add_workload(
        WorkloadKind::Event {
            description: "all module symbol tables discovered",
        },
        root_table,
        PassId(0),
    );

    let mut comp = Compiler {
        pool,
        handler,
        units,
        types,
        symbols,
        constants: ConstantPool::new(),
        operators,
        executer,
        analysis: AnalysisData::default(),
        poly: PolyStore::default(),
        bakes: BakeStore::default(),
        program: ModTreeProgram::default(),
        extern_sources: ExternSources::default(),
        semantic_errors: Vec::new(),
        editor: EditorIndex::default(),
        root_table,
        builtin_table,
        root_context,
        hardcoded_signatures,
        string_type,
        all_tables_ready,
        table_ready: FxHashMap::default(),
        function_bodies: FxHashMap::default(),
        cluster_workloads: FxHashMap::default(),
    };

    bind_builtin_symbols(&mut comp);

    // Seed one module-analysis workload per unit; every unit's top level
    // shares the root table
    let (seed_table, seed_context) = (comp.root_table, comp.root_context);
    for unit in comp.units.indices().collect::<Vec<_>>() {
        if let Some(root) = comp.units[unit].ast.root {
            analysis::add_module_discovery(
                &mut comp,
                NodeRef::new(unit, root),
                seed_table,
                seed_context,
            );
        }
    }

    run_executer(&mut comp);
    finalize(&mut comp);
    comp
}

/// Bind primitive type names and hardcoded functions into the builtin
/// table. `int` and `float` are the default literal types.
fn bind_builtin_symbols(comp: &mut Compiler) {
    let predefined = comp.types.predefined;
    let bindings: Vec<(&str, types::TypeId)> = vec![
        ("int", predefined.i32),
        ("float", predefined.f32),
        ("bool", predefined.bool_type),
        ("i8", predefined.i8),
        ("i16", predefined.i16),
        ("i32", predefined.i32),
        ("i64", predefined.i64),
        ("u8", predefined.u8),
        ("u16", predefined.u16),
        ("u32", predefined.u32),
        ("u64", predefined.u64),
        ("usize", predefined.usize),
        ("isize", predefined.isize),
        ("f32", predefined.f32),
        ("f64", predefined.f64),
        ("address", predefined.address),
        ("Type_Handle", predefined.type_handle),
        ("String", comp.string_type),
    ];
    for (name, type_id) in bindings {
        let id = comp.intern(name);
        comp.symbols.define_symbol(
            comp.builtin_table,
            id,
            SymbolKind::Type(type_id),
            SymbolAccessLevel::Global,
            None,
            TextIndex::default(),
        );
    }
    for kind in HardcodedKind::ALL {
        comp.symbols.define_symbol(
            comp.builtin_table,
            kind.identifier(),
            SymbolKind::HardcodedFunction(kind),
            SymbolAccessLevel::Global,
            None,
            TextIndex::default(),
        );
    }
}

/// The scheduler loop: drain runnables, then attempt cluster resolution,
/// until no runnable or resolvable workload remains. Terminates because
/// every pass finishes a workload, breaks a cluster, or errors one out.
fn run_executer(comp: &mut Compiler) {
    loop {
        while let Some(id) = comp.executer.runnable.pop_front() {
            if comp.executer.workloads[id].is_finished
                || !comp.executer.workloads[id].dependencies.is_empty()
            {
                continue;
            }
            comp.executer.workloads[id].was_started = true;
            match analysis::execute_workload(comp, id) {
                Ok(()) => {
                    analysis::on_workload_finished(comp, id);
                    comp.executer.finish_workload(id);
                }
                Err(waiting) => {
                    debug!(workload = id.0, on = waiting.on.0, "workload suspended");
                    comp.executer.register_dependency(id, waiting);
                }
            }
        }

        if comp.executer.unfinished().is_empty() {
            break;
        }

        let (outcome, irresolvable) = comp.executer.resolve_clusters();
        match outcome {
            ResolveOutcome::BrokeCluster => continue,
            ResolveOutcome::Finished => unreachable!("resolve_clusters never returns Finished"),
            ResolveOutcome::ErroredCycle | ResolveOutcome::NoProgress => {
                let stuck: Vec<Vec<WorkloadId>> = if irresolvable.is_empty() {
                    // Nothing runnable and no cycle found: error whatever
                    // is left so the loop always terminates
                    vec![comp.executer.unfinished()]
                } else {
                    irresolvable
                };
                for members in stuck {
                    for member in members {
                        if let Some(node) = analysis::workload_node(comp, member) {
                            comp.log_semantic_error(
                                member,
                                SemanticErrorKind::CyclicDependency,
                                node,
                            );
                        }
                        analysis::on_workload_finished(comp, member);
                        comp.executer.finish_workload(member);
                    }
                }
            }
        }
    }
}

/// Finalisation: locate `main`, verify its signature, propagate
/// runnability over the call graph, and build the editor index.
fn finalize(comp: &mut Compiler) {
    let main_id = upp_util::ident::ID_MAIN;
    let results = comp.symbols.query_id(
        comp.root_table,
        main_id,
        SymbolQuery {
            access_level: SymbolAccessLevel::Global,
            import_kind: upp_par::ast::ImportKind::Symbols,
            search_parents: false,
        },
    );
    let main_function = results.iter().find_map(|&symbol| {
        match comp.symbols.symbol(symbol).kind {
            SymbolKind::Function(function) => Some((symbol, function)),
            _ => None,
        }
    });

    match main_function {
        Some((symbol, function)) => {
            let signature = comp.types.signature(comp.program.functions[function].signature);
            let signature_ok =
                signature.parameters.is_empty() && signature.return_type.is_none();
            if signature_ok {
                comp.program.main_function = Some(function);
            } else if let Some(node) = comp.symbols.symbol(symbol).definition_node {
                let workload = comp.all_tables_ready;
                comp.log_semantic_error(
                    workload,
                    SemanticErrorKind::MainHasWrongSignature,
                    node,
                );
            }
        }
        None => {
            comp.semantic_errors.push(SemanticError {
                kind: SemanticErrorKind::NoMainFunction,
                unit: UnitId(0),
                node: NodeId(0),
                text_index: TextIndex::default(),
                due_to_unknown: false,
            });
        }
    }

    // Back-ends refuse to generate when main is missing or not runnable;
    // the pointer is kept either way so diagnostics can name it
    comp.program.propagate_runnability();

    let editor = editor::build_editor_index(comp);
    comp.editor = editor;
}

/// Which symbols are visible for a lookup starting in `table` at the
/// given access level.
pub fn symbol_query(access_level: SymbolAccessLevel) -> SymbolQuery {
    SymbolQuery {
        access_level,
        import_kind: upp_par::ast::ImportKind::Symbols,
        search_parents: true,
    }
}
