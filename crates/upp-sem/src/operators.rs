//! Operator contexts: custom binops, unops, casts, array accesses,
//! dot-calls, iterators, and cast-mode configuration per scope.
//!
//! Keys always store base types (pointer and constant layers stripped);
//! after a hit the analyser validates the remaining type mods. Commutative
//! binops are inserted twice with `switch_left_and_right` set on the
//! swapped entry, so a single lookup finds one of the versions.

use indexmap::IndexMap;
use upp_util::{Identifier, IndexVec};

use upp_par::ast::{Binop, ContextChangeKind, Unop};

use crate::program::FunctionId;
use crate::types::TypeId;
use crate::workload::WorkloadId;

upp_util::define_idx!(ContextId);

/// How a cast may be performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CastMode {
    None = 1,
    /// `cast{u64} i`
    Explicit,
    /// `cast i`
    Inferred,
    /// `cast_pointer{*int} p`
    PointerExplicit,
    /// `cast_pointer p`
    PointerInferred,
    /// `x: u32 = i`
    Implicit,
}

/// Key identifying one custom operator in a context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CustomOperatorKey {
    Binop {
        op: Binop,
        left: TypeId,
        right: TypeId,
    },
    Unop {
        op: Unop,
        operand: TypeId,
    },
    ArrayAccess {
        array: TypeId,
    },
    Cast {
        from: TypeId,
        /// None for polymorphic casts resolved by target context
        to: Option<TypeId>,
    },
    DotCall {
        datatype: TypeId,
        id: Identifier,
    },
    Iterator {
        datatype: TypeId,
    },
    CastMode,
}

/// Payload of one custom operator.
#[derive(Clone, Copy, Debug)]
pub enum CustomOperator {
    Binop {
        function: FunctionId,
        switch_left_and_right: bool,
    },
    Unop {
        function: FunctionId,
    },
    ArrayAccess {
        function: FunctionId,
    },
    Cast {
        function: FunctionId,
        cast_mode: CastMode,
    },
    DotCall {
        function: FunctionId,
        as_member_access: bool,
    },
    Iterator {
        create: FunctionId,
        has_next: FunctionId,
        next: FunctionId,
        get_value: FunctionId,
    },
    CastMode(CastMode),
}

/// One scope's operator context. Parent contexts are composed through the
/// ordered import list; import 0 is always the parent.
#[derive(Debug, Default)]
pub struct OperatorContext {
    pub imports: Vec<ContextId>,
    /// Insertion-ordered for deterministic dumps
    pub operators: IndexMap<CustomOperatorKey, CustomOperator>,
    /// Pending context-change workloads per change kind; lookups await
    /// these before reading the context
    pub pending_changes: Vec<(ContextChangeKind, WorkloadId)>,
}

#[derive(Default)]
pub struct OperatorStore {
    contexts: IndexVec<ContextId, OperatorContext>,
}

impl OperatorStore {
    pub fn create_context(&mut self, parent: Option<ContextId>) -> ContextId {
        let mut context = OperatorContext::default();
        if let Some(parent) = parent {
            context.imports.push(parent);
        }
        self.contexts.push(context)
    }

    pub fn context(&self, id: ContextId) -> &OperatorContext {
        &self.contexts[id]
    }

    pub fn context_mut(&mut self, id: ContextId) -> &mut OperatorContext {
        &mut self.contexts[id]
    }

    pub fn add_operator(&mut self, id: ContextId, key: CustomOperatorKey, op: CustomOperator) {
        self.contexts[id].operators.insert(key, op);
    }

    /// Look up a custom operator, walking the import list depth-first.
    /// The nearest context wins.
    pub fn lookup(&self, id: ContextId, key: &CustomOperatorKey) -> Option<CustomOperator> {
        let mut visited = Vec::new();
        self.lookup_inner(id, key, &mut visited)
    }

    fn lookup_inner(
        &self,
        id: ContextId,
        key: &CustomOperatorKey,
        visited: &mut Vec<ContextId>,
    ) -> Option<CustomOperator> {
        if visited.contains(&id) {
            return None;
        }
        visited.push(id);
        let context = &self.contexts[id];
        if let Some(found) = context.operators.get(key) {
            return Some(*found);
        }
        for &import in &context.imports {
            if let Some(found) = self.lookup_inner(import, key, visited) {
                return Some(found);
            }
        }
        None
    }

    /// Workloads that must finish before this context can be queried for
    /// the given change kind.
    pub fn pending_for(&self, id: ContextId, kind: ContextChangeKind) -> Vec<WorkloadId> {
        let mut pending = Vec::new();
        let mut visited = Vec::new();
        self.collect_pending(id, kind, &mut pending, &mut visited);
        pending
    }

    fn collect_pending(
        &self,
        id: ContextId,
        kind: ContextChangeKind,
        pending: &mut Vec<WorkloadId>,
        visited: &mut Vec<ContextId>,
    ) {
        if visited.contains(&id) {
            return;
        }
        visited.push(id);
        let context = &self.contexts[id];
        for &(change_kind, workload) in &context.pending_changes {
            if change_kind == kind {
                pending.push(workload);
            }
        }
        for &import in &context.imports {
            self.collect_pending(import, kind, pending, visited);
        }
    }

    pub fn clear_pending(&mut self, id: ContextId, workload: WorkloadId) {
        self.contexts[id]
            .pending_changes
            .retain(|&(_, pending)| pending != workload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_context_wins() {
        let mut store = OperatorStore::default();
        let root = store.create_context(None);
        let child = store.create_context(Some(root));
        let key = CustomOperatorKey::Cast {
            from: TypeId(1),
            to: Some(TypeId(2)),
        };
        store.add_operator(
            root,
            key,
            CustomOperator::Cast {
                function: FunctionId(0),
                cast_mode: CastMode::Explicit,
            },
        );
        store.add_operator(
            child,
            key,
            CustomOperator::Cast {
                function: FunctionId(1),
                cast_mode: CastMode::Implicit,
            },
        );
        match store.lookup(child, &key).unwrap() {
            CustomOperator::Cast { function, .. } => assert_eq!(function, FunctionId(1)),
            _ => panic!(),
        }
        // Parent still resolves through the child when the child lacks
        // the key
        let other = CustomOperatorKey::Iterator { datatype: TypeId(9) };
        store.add_operator(
            root,
            other,
            CustomOperator::Iterator {
                create: FunctionId(2),
                has_next: FunctionId(3),
                next: FunctionId(4),
                get_value: FunctionId(5),
            },
        );
        assert!(store.lookup(child, &other).is_some());
    }

    #[test]
    fn missing_operator_is_none() {
        let mut store = OperatorStore::default();
        let root = store.create_context(None);
        let key = CustomOperatorKey::ArrayAccess { array: TypeId(7) };
        assert!(store.lookup(root, &key).is_none());
    }

    #[test]
    fn pending_changes_collected_through_imports() {
        let mut store = OperatorStore::default();
        let root = store.create_context(None);
        let child = store.create_context(Some(root));
        store
            .context_mut(root)
            .pending_changes
            .push((ContextChangeKind::Cast, WorkloadId(4)));
        assert_eq!(
            store.pending_for(child, ContextChangeKind::Cast),
            vec![WorkloadId(4)]
        );
        assert!(store.pending_for(child, ContextChangeKind::Binop).is_empty());
        store.clear_pending(root, WorkloadId(4));
        assert!(store.pending_for(child, ContextChangeKind::Cast).is_empty());
    }
}
