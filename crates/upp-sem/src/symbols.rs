//! Symbol tables: hierarchical scoping with imports and access levels.
//!
//! Each table belongs to one scope (module, function signature, code
//! block, struct header). Lookup builds the set of reachable tables under
//! the query's access clamp, applies the Internal-shadowing rule, then
//! resolves aliases transitively.
//!
//! `define_symbol` always appends; duplicate detection is deferred to the
//! caller, which can report a redefinition error against the existing
//! symbol in the same table.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use upp_util::{Identifier, IndexVec, TextIndex, UnitId};

use upp_par::ast::ImportKind;

use crate::constants::ConstantId;
use crate::operators::ContextId;
use crate::poly::PolyHeaderId;
use crate::program::{FunctionId, GlobalId, HardcodedKind};
use crate::types::TypeId;
use crate::workload::WorkloadId;
use crate::NodeRef;

upp_util::define_idx!(SymbolId);
upp_util::define_idx!(TableId);

/// How widely a symbol (or include) is visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymbolAccessLevel {
    /// Accessible everywhere: comptime definitions, functions, structs
    Global = 0,
    /// Polymorphic parameters of anonymous structs / lambdas / bakes
    Polymorphic = 1,
    /// Variables and parameters; only meaningful during execution
    Internal = 2,
}

/// Variant payload of a symbol.
#[derive(Clone, Debug)]
pub enum SymbolKind {
    /// A definition that isn't ready yet (global or comptime value)
    DefinitionUnfinished { workload: WorkloadId },
    /// A variable that hasn't been analysed yet
    VariableUndefined,
    HardcodedFunction(HardcodedKind),
    Function(FunctionId),
    PolymorphicFunction(PolyHeaderId),
    PolymorphicStruct(PolyHeaderId),
    Variable { type_id: TypeId },
    Global(GlobalId),
    Parameter {
        function: FunctionId,
        index_in_signature: u32,
        index_in_runtime_signature: u32,
    },
    Type(TypeId),
    PolymorphicValue {
        defined_in_parameter_index: u32,
        access_index: u32,
    },
    ComptimeValue(ConstantId),
    /// Alias created by an import (`import A::B as C`); resolved once the
    /// import workload completes
    Alias {
        workload: WorkloadId,
        resolved: Option<SymbolId>,
    },
    Module {
        table: TableId,
        workload: Option<WorkloadId>,
    },
    Error,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub id: Identifier,
    pub kind: SymbolKind,
    pub origin_table: TableId,
    pub access_level: SymbolAccessLevel,
    /// Lookup nodes that resolved to this symbol, for the editor layer
    pub references: Vec<NodeRef>,
    pub definition_node: Option<NodeRef>,
    pub definition_unit: Option<UnitId>,
    pub definition_text_index: TextIndex,
}

/// One include edge of a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Include {
    pub table: TableId,
    pub kind: ImportKind,
    pub access_level: SymbolAccessLevel,
    pub transitive: bool,
}

#[derive(Clone, Debug)]
pub struct SymbolTable {
    pub parent: Option<(TableId, SymbolAccessLevel)>,
    pub includes: Vec<Include>,
    /// Insertion-ordered so diagnostics and dumps are deterministic
    pub symbols: IndexMap<Identifier, Vec<SymbolId>>,
    pub operator_context: ContextId,
}

/// Query parameters for `query_id`.
#[derive(Clone, Copy, Debug)]
pub struct SymbolQuery {
    pub access_level: SymbolAccessLevel,
    pub import_kind: ImportKind,
    pub search_parents: bool,
}

impl SymbolQuery {
    /// The common case: everything visible from inside a function body.
    pub fn local() -> Self {
        Self {
            access_level: SymbolAccessLevel::Internal,
            import_kind: ImportKind::Symbols,
            search_parents: true,
        }
    }
}

/// Errors returned by include registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IncludeError {
    #[error("a table cannot include itself")]
    SelfInclude,
    #[error("table already included with the same kind")]
    DuplicateInclude,
}

#[derive(Default)]
pub struct SymbolStore {
    pub tables: IndexVec<TableId, SymbolTable>,
    pub symbols: IndexVec<SymbolId, Symbol>,
}

/// Per-table search state collected while walking the reachable set.
#[derive(Clone, Copy)]
struct ReachState {
    clamp: SymbolAccessLevel,
    search_imports: bool,
    search_parents: bool,
    depth: u32,
}

impl SymbolStore {
    pub fn create_table(
        &mut self,
        parent: Option<(TableId, SymbolAccessLevel)>,
        operator_context: ContextId,
    ) -> TableId {
        self.tables.push(SymbolTable {
            parent,
            includes: Vec::new(),
            symbols: IndexMap::new(),
            operator_context,
        })
    }

    pub fn table(&self, id: TableId) -> &SymbolTable {
        &self.tables[id]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    /// Append a symbol to a table. Always succeeds; duplicate detection is
    /// the caller's job (see [`SymbolStore::find_duplicate`]).
    ///
    /// Re-defining the same `(id, definition_node)` pair returns the
    /// existing symbol, which makes workload re-runs after a suspension
    /// idempotent.
    pub fn define_symbol(
        &mut self,
        table: TableId,
        id: Identifier,
        kind: SymbolKind,
        access_level: SymbolAccessLevel,
        definition_node: Option<NodeRef>,
        definition_text_index: TextIndex,
    ) -> SymbolId {
        if let Some(existing) = self.tables[table].symbols.get(&id) {
            if let Some(&found) = existing.iter().find(|&&s| {
                definition_node.is_some() && self.symbols[s].definition_node == definition_node
            }) {
                return found;
            }
        }
        let symbol = self.symbols.push(Symbol {
            id,
            kind,
            origin_table: table,
            access_level,
            references: Vec::new(),
            definition_node,
            definition_unit: definition_node.map(|n| n.unit),
            definition_text_index,
        });
        self.tables[table]
            .symbols
            .entry(id)
            .or_default()
            .push(symbol);
        symbol
    }

    /// First other symbol with the same name in the same table, if any.
    pub fn find_duplicate(&self, table: TableId, symbol: SymbolId) -> Option<SymbolId> {
        let id = self.symbols[symbol].id;
        self.tables[table]
            .symbols
            .get(&id)?
            .iter()
            .copied()
            .find(|&other| other != symbol)
    }

    /// Record an include edge. Including a table in itself or including
    /// the same table with the same kind twice is an error.
    pub fn add_include(
        &mut self,
        table: TableId,
        target: TableId,
        kind: ImportKind,
        access_level: SymbolAccessLevel,
        transitive: bool,
    ) -> Result<(), IncludeError> {
        if table == target {
            return Err(IncludeError::SelfInclude);
        }
        if self.tables[table]
            .includes
            .iter()
            .any(|include| include.table == target && include.kind == kind)
        {
            return Err(IncludeError::DuplicateInclude);
        }
        self.tables[table].includes.push(Include {
            table: target,
            kind,
            access_level,
            transitive,
        });
        Ok(())
    }

    /// Resolve all matching symbols reachable from `table` under `query`.
    ///
    /// 1. Build the reachable-table set with per-table access clamps and
    ///    depths; revisits upgrade the weakest of the recorded state.
    /// 2. Collect matching symbols whose access level passes the clamp.
    /// 3. Internal shadowing: an Internal symbol at the nearest depth
    ///    hides all non-Internal results.
    /// 4. Resolve aliases transitively; drop duplicates and unresolved
    ///    aliases.
    pub fn query_id(&self, table: TableId, id: Identifier, query: SymbolQuery) -> Vec<SymbolId> {
        let mut reach: FxHashMap<TableId, ReachState> = FxHashMap::default();
        let mut worklist = vec![(
            table,
            ReachState {
                clamp: query.access_level,
                search_imports: true,
                search_parents: query.search_parents,
                depth: 0,
            },
        )];

        while let Some((current, state)) = worklist.pop() {
            let merged = match reach.get(&current) {
                Some(existing) => {
                    // Upgrade only; stop if nothing improves
                    let upgraded = ReachState {
                        clamp: existing.clamp.max(state.clamp),
                        search_imports: existing.search_imports || state.search_imports,
                        search_parents: existing.search_parents || state.search_parents,
                        depth: existing.depth.min(state.depth),
                    };
                    let improved = upgraded.clamp > existing.clamp
                        || (upgraded.search_imports && !existing.search_imports)
                        || (upgraded.search_parents && !existing.search_parents)
                        || upgraded.depth < existing.depth;
                    if !improved {
                        continue;
                    }
                    upgraded
                }
                None => state,
            };
            reach.insert(current, merged);

            let entry = &self.tables[current];
            if merged.search_parents {
                if let Some((parent, parent_access)) = entry.parent {
                    worklist.push((
                        parent,
                        ReachState {
                            clamp: merged.clamp.min(parent_access),
                            search_imports: true,
                            search_parents: true,
                            depth: merged.depth + 1,
                        },
                    ));
                }
            }
            if merged.search_imports {
                for include in &entry.includes {
                    if include.kind != query.import_kind {
                        continue;
                    }
                    worklist.push((
                        include.table,
                        ReachState {
                            clamp: merged.clamp.min(include.access_level),
                            // Non-transitive imports do not re-expand
                            search_imports: include.transitive,
                            search_parents: false,
                            depth: merged.depth + 1,
                        },
                    ));
                }
            }
        }

        // Collect matching symbols with their depth
        let mut found: Vec<(SymbolId, u32)> = Vec::new();
        for (&reached, state) in &reach {
            if let Some(candidates) = self.tables[reached].symbols.get(&id) {
                for &candidate in candidates {
                    if self.symbols[candidate].access_level <= state.clamp {
                        found.push((candidate, state.depth));
                    }
                }
            }
        }

        // Internal shadowing
        let internal_min_depth = found
            .iter()
            .filter(|(s, _)| self.symbols[*s].access_level == SymbolAccessLevel::Internal)
            .map(|(_, depth)| *depth)
            .min();
        if let Some(min_depth) = internal_min_depth {
            found.retain(|(s, depth)| {
                self.symbols[*s].access_level == SymbolAccessLevel::Internal && *depth == min_depth
            });
        }

        // Alias resolution and dedup
        let mut seen = FxHashSet::default();
        let mut results = Vec::new();
        for (candidate, _) in found {
            match self.resolve_alias(candidate) {
                Some(resolved) => {
                    if seen.insert(resolved) {
                        results.push(resolved);
                    }
                }
                // Unresolved aliases only occur while module analysis is
                // still in progress
                None => {}
            }
        }
        results
    }

    /// Follow alias links transitively. Returns `None` for unresolved
    /// aliases.
    pub fn resolve_alias(&self, symbol: SymbolId) -> Option<SymbolId> {
        let mut current = symbol;
        let mut hops = 0;
        loop {
            match &self.symbols[current].kind {
                SymbolKind::Alias { resolved, .. } => match resolved {
                    Some(target) => {
                        current = *target;
                        hops += 1;
                        if hops > self.symbols.len() {
                            // Alias cycle; treated as unresolved
                            return None;
                        }
                    }
                    None => return None,
                },
                _ => return Some(current),
            }
        }
    }

    pub fn record_reference(&mut self, symbol: SymbolId, node: NodeRef) {
        self.symbols[symbol].references.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_util::IdentifierPool;

    fn store() -> (SymbolStore, IdentifierPool) {
        (SymbolStore::default(), IdentifierPool::new())
    }

    fn define(
        store: &mut SymbolStore,
        table: TableId,
        id: Identifier,
        access: SymbolAccessLevel,
    ) -> SymbolId {
        store.define_symbol(
            table,
            id,
            SymbolKind::Error,
            access,
            None,
            TextIndex::default(),
        )
    }

    #[test]
    fn finds_symbol_in_parent_chain() {
        let (mut store, pool) = store();
        let lock = pool.lock();
        let name = pool.add(&lock, "x");
        let root = store.create_table(None, ContextId(0));
        let child = store.create_table(
            Some((root, SymbolAccessLevel::Internal)),
            ContextId(0),
        );
        let symbol = define(&mut store, root, name, SymbolAccessLevel::Global);
        let results = store.query_id(child, name, SymbolQuery::local());
        assert_eq!(results, vec![symbol]);
    }

    #[test]
    fn access_clamp_hides_internals() {
        let (mut store, pool) = store();
        let lock = pool.lock();
        let name = pool.add(&lock, "local");
        let root = store.create_table(None, ContextId(0));
        // Parent linked with Global access only: internals are invisible
        let child = store.create_table(Some((root, SymbolAccessLevel::Global)), ContextId(0));
        define(&mut store, root, name, SymbolAccessLevel::Internal);
        let results = store.query_id(child, name, SymbolQuery::local());
        assert!(results.is_empty());
    }

    #[test]
    fn internal_shadows_globals() {
        let (mut store, pool) = store();
        let lock = pool.lock();
        let name = pool.add(&lock, "x");
        let root = store.create_table(None, ContextId(0));
        let child = store.create_table(
            Some((root, SymbolAccessLevel::Internal)),
            ContextId(0),
        );
        let _global = define(&mut store, root, name, SymbolAccessLevel::Global);
        let internal = define(&mut store, child, name, SymbolAccessLevel::Internal);
        let results = store.query_id(child, name, SymbolQuery::local());
        assert_eq!(results, vec![internal]);
    }

    #[test]
    fn imports_are_searched_without_their_parents() {
        let (mut store, pool) = store();
        let lock = pool.lock();
        let name = pool.add(&lock, "f");
        let hidden = pool.add(&lock, "hidden");
        let other_parent = store.create_table(None, ContextId(0));
        let imported = store.create_table(
            Some((other_parent, SymbolAccessLevel::Internal)),
            ContextId(0),
        );
        let user = store.create_table(None, ContextId(0));
        define(&mut store, other_parent, hidden, SymbolAccessLevel::Global);
        let visible = define(&mut store, imported, name, SymbolAccessLevel::Global);
        store
            .add_include(
                user,
                imported,
                ImportKind::Symbols,
                SymbolAccessLevel::Global,
                false,
            )
            .unwrap();
        assert_eq!(
            store.query_id(user, name, SymbolQuery::local()),
            vec![visible]
        );
        // The import's parent is not searched
        assert!(store.query_id(user, hidden, SymbolQuery::local()).is_empty());
    }

    #[test]
    fn non_transitive_imports_do_not_re_expand() {
        let (mut store, pool) = store();
        let lock = pool.lock();
        let name = pool.add(&lock, "deep");
        let deep = store.create_table(None, ContextId(0));
        let middle = store.create_table(None, ContextId(0));
        let user = store.create_table(None, ContextId(0));
        let symbol = define(&mut store, deep, name, SymbolAccessLevel::Global);
        store
            .add_include(
                middle,
                deep,
                ImportKind::Symbols,
                SymbolAccessLevel::Global,
                true,
            )
            .unwrap();
        // Non-transitive include of middle: middle's transitive includes
        // are followed because middle marks them transitive
        store
            .add_include(
                user,
                middle,
                ImportKind::Symbols,
                SymbolAccessLevel::Global,
                false,
            )
            .unwrap();
        assert_eq!(
            store.query_id(user, name, SymbolQuery::local()),
            vec![symbol]
        );

        // But when middle's include is non-transitive, user can't see deep
        let middle2 = store.create_table(None, ContextId(0));
        let user2 = store.create_table(None, ContextId(0));
        store
            .add_include(
                middle2,
                deep,
                ImportKind::Symbols,
                SymbolAccessLevel::Global,
                false,
            )
            .unwrap();
        store
            .add_include(
                user2,
                middle2,
                ImportKind::Symbols,
                SymbolAccessLevel::Global,
                false,
            )
            .unwrap();
        assert!(store.query_id(user2, name, SymbolQuery::local()).is_empty());
    }

    #[test]
    fn include_errors() {
        let (mut store, _) = store();
        let table = store.create_table(None, ContextId(0));
        let other = store.create_table(None, ContextId(0));
        assert_eq!(
            store.add_include(
                table,
                table,
                ImportKind::Symbols,
                SymbolAccessLevel::Global,
                false
            ),
            Err(IncludeError::SelfInclude)
        );
        store
            .add_include(
                table,
                other,
                ImportKind::Symbols,
                SymbolAccessLevel::Global,
                false,
            )
            .unwrap();
        assert_eq!(
            store.add_include(
                table,
                other,
                ImportKind::Symbols,
                SymbolAccessLevel::Global,
                true
            ),
            Err(IncludeError::DuplicateInclude)
        );
        // Same table with a different kind is fine
        store
            .add_include(
                table,
                other,
                ImportKind::DotCalls,
                SymbolAccessLevel::Global,
                false,
            )
            .unwrap();
    }

    #[test]
    fn aliases_resolve_transitively_and_dedup() {
        let (mut store, pool) = store();
        let lock = pool.lock();
        let name = pool.add(&lock, "target");
        let table = store.create_table(None, ContextId(0));
        let target = define(&mut store, table, name, SymbolAccessLevel::Global);
        let alias_inner = store.define_symbol(
            table,
            pool.add(&lock, "a"),
            SymbolKind::Alias {
                workload: WorkloadId(0),
                resolved: Some(target),
            },
            SymbolAccessLevel::Global,
            None,
            TextIndex::default(),
        );
        let alias_name = pool.add(&lock, "b");
        store.define_symbol(
            table,
            alias_name,
            SymbolKind::Alias {
                workload: WorkloadId(0),
                resolved: Some(alias_inner),
            },
            SymbolAccessLevel::Global,
            None,
            TextIndex::default(),
        );
        assert_eq!(
            store.query_id(table, alias_name, SymbolQuery::local()),
            vec![target]
        );

        // Unresolved aliases are dropped
        let pending_name = pool.add(&lock, "pending");
        store.define_symbol(
            table,
            pending_name,
            SymbolKind::Alias {
                workload: WorkloadId(0),
                resolved: None,
            },
            SymbolAccessLevel::Global,
            None,
            TextIndex::default(),
        );
        assert!(store
            .query_id(table, pending_name, SymbolQuery::local())
            .is_empty());
    }

    #[test]
    fn same_query_returns_same_multiset() {
        let (mut store, pool) = store();
        let lock = pool.lock();
        let name = pool.add(&lock, "x");
        let table = store.create_table(None, ContextId(0));
        define(&mut store, table, name, SymbolAccessLevel::Global);
        define(
            &mut store,
            table,
            name,
            SymbolAccessLevel::Global,
        );
        let a = store.query_id(table, name, SymbolQuery::local());
        let b = store.query_id(table, name, SymbolQuery::local());
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn redefine_same_node_is_idempotent() {
        let (mut store, pool) = store();
        let lock = pool.lock();
        let name = pool.add(&lock, "x");
        let table = store.create_table(None, ContextId(0));
        let node = Some(NodeRef {
            unit: UnitId(0),
            node: upp_par::NodeId(4),
        });
        let a = store.define_symbol(
            table,
            name,
            SymbolKind::VariableUndefined,
            SymbolAccessLevel::Internal,
            node,
            TextIndex::default(),
        );
        let b = store.define_symbol(
            table,
            name,
            SymbolKind::VariableUndefined,
            SymbolAccessLevel::Internal,
            node,
            TextIndex::default(),
        );
        assert_eq!(a, b);
    }
}
