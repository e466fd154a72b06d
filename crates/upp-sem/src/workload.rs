//! Workload scheduler: a dependency engine for out-of-order analysis.
//!
//! Each workload is a small state machine. Stepping it either finishes it
//! or suspends it on a dependency ([`Waiting`]); the executer registers the
//! dependency edge and resumes the workload when the dependency completes.
//! Within one step a workload runs sequentially and owns its analyser
//! cursor state; nothing else mutates it while it is suspended.
//!
//! When the runnable queue drains, the executer attempts *cluster
//! resolution*: strongly connected components over the waiting workloads.
//! Components whose internal edges are all breakable (recursive functions,
//! struct self-references) or carry failure callbacks are resolved by
//! provisionally fulfilling those edges and re-queueing the members.
//! Anything else is a genuine cyclic-dependency error against every
//! participant.

use std::collections::VecDeque;

use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};
use upp_par::ast::ContextChangeKind;
use upp_par::NodeId;
use upp_util::IndexVec;

use crate::comptime::BakeId;
use crate::operators::ContextId;
use crate::passes::PassId;
use crate::poly::{PolyHeaderId, PolyValue};
use crate::program::FunctionId;
use crate::symbols::{SymbolAccessLevel, SymbolId, TableId};
use crate::types::TypeId;
use crate::NodeRef;

upp_util::define_idx!(WorkloadId);

/// What one workload does when stepped.
#[derive(Clone, Debug)]
pub enum WorkloadKind {
    /// Empty join point others depend on
    Event { description: &'static str },
    /// Walks a module AST, defines symbols, spawns workloads; ends by
    /// completing its module's table-ready event
    ModuleAnalysis {
        module_node: NodeRef,
        table: TableId,
        table_ready_event: WorkloadId,
    },
    /// Resolves a single `import X::Y::Z [as A]`
    ImportResolve {
        import_node: NodeRef,
        alias_symbol: Option<SymbolId>,
    },
    /// Processes the context changes of one change kind for one scope
    OperatorContextChange {
        kind: ContextChangeKind,
        change_nodes: Vec<NodeRef>,
        context: ContextId,
        /// Pass under which the change definitions were created
        definition_pass: PassId,
    },
    FunctionHeader {
        function: FunctionId,
        node: NodeRef,
        symbol: Option<SymbolId>,
        header: Option<PolyHeaderId>,
    },
    FunctionBody {
        function: FunctionId,
        node: NodeRef,
    },
    /// No front-end work; provides the back-end a stable batch ordering
    FunctionClusterCompile { functions: Vec<FunctionId> },
    StructPolymorphic {
        node: NodeRef,
        symbol: SymbolId,
        base_struct: TypeId,
    },
    StructBody {
        struct_type: TypeId,
        node: NodeRef,
    },
    BakeAnalysis { bake: BakeId, node: NodeRef },
    BakeExecution { bake: BakeId, node: NodeRef },
    /// Global or comptime definition
    Definition {
        symbol: SymbolId,
        node: NodeRef,
        is_comptime: bool,
        type_node: Option<NodeRef>,
        value_node: Option<NodeRef>,
    },
}

/// A suspension request: the current workload cannot proceed until `on`
/// completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Waiting {
    pub on: WorkloadId,
    /// Edge may be provisionally fulfilled by cluster resolution
    pub can_be_broken: bool,
    /// Failure-flag slot on the *waiting* workload; set when the edge is
    /// resolved by failing it, letting the workload continue with explicit
    /// error propagation instead of deadlocking
    pub failure_flag: Option<usize>,
}

/// Result of analysis steps that may suspend.
pub type Suspendable<T> = Result<T, Waiting>;

/// Per-edge bookkeeping.
#[derive(Clone, Debug, Default)]
struct DependencyInfo {
    can_be_broken: bool,
    /// Failure-flag slots on the dependent to set when the edge fails
    failure_flags: Vec<usize>,
}

pub struct Workload {
    pub kind: WorkloadKind,
    pub is_finished: bool,
    pub was_started: bool,
    /// State-machine cursor; stages completed before a suspension are not
    /// repeated
    pub stage: u32,

    /// Unsatisfied dependencies
    pub dependencies: Vec<WorkloadId>,
    pub dependents: Vec<WorkloadId>,
    /// Provisionally fulfilled dependencies from cluster resolution
    pub broken_dependencies: FxHashSet<WorkloadId>,
    /// Dependencies resolved by failing their edge
    pub failed_dependencies: FxHashSet<WorkloadId>,

    // Analyser cursor, consistent across suspensions
    pub symbol_table: TableId,
    pub access_level: SymbolAccessLevel,
    pub current_function: Option<FunctionId>,
    pub statement_reachable: bool,
    pub pass: PassId,
    pub block_stack: Vec<NodeId>,

    // Error counters
    pub real_error_count: u32,
    pub errors_due_to_unknown_count: u32,

    // Polymorphic value access
    pub poly_parent: Option<WorkloadId>,
    pub poly_values: Vec<PolyValue>,
    pub poly_origin: Option<PolyHeaderId>,
    pub instanciation_depth: u32,

    /// Slots set when a dependency edge is resolved by failure
    pub failure_flags: Vec<bool>,
}

/// Outcome of one executer pass, used to prove termination: every pass
/// finishes a workload, breaks a cluster, or errors one out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveOutcome {
    Finished,
    BrokeCluster,
    ErroredCycle,
    NoProgress,
}

#[derive(Default)]
pub struct WorkloadExecuter {
    pub workloads: IndexVec<WorkloadId, Workload>,
    pub runnable: VecDeque<WorkloadId>,
    pub finished: Vec<WorkloadId>,
    edges: FxHashMap<(WorkloadId, WorkloadId), DependencyInfo>,
}

impl WorkloadExecuter {
    pub fn add_workload(&mut self, kind: WorkloadKind, table: TableId, pass: PassId) -> WorkloadId {
        let id = self.workloads.push(Workload {
            kind,
            is_finished: false,
            was_started: false,
            stage: 0,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            broken_dependencies: FxHashSet::default(),
            failed_dependencies: FxHashSet::default(),
            symbol_table: table,
            // Workloads see everything reachable from their own scope;
            // parent-link access levels clamp what leaks across scopes
            access_level: SymbolAccessLevel::Internal,
            current_function: None,
            statement_reachable: true,
            pass,
            block_stack: Vec::new(),
            real_error_count: 0,
            errors_due_to_unknown_count: 0,
            poly_parent: None,
            poly_values: Vec::new(),
            poly_origin: None,
            instanciation_depth: 0,
            failure_flags: Vec::new(),
        });
        self.runnable.push_back(id);
        id
    }

    pub fn workload(&self, id: WorkloadId) -> &Workload {
        &self.workloads[id]
    }

    pub fn workload_mut(&mut self, id: WorkloadId) -> &mut Workload {
        &mut self.workloads[id]
    }

    /// Check a dependency from inside a workload step. Finished or
    /// provisionally-fulfilled dependencies pass; anything else suspends.
    pub fn wait_for(
        &self,
        current: WorkloadId,
        on: WorkloadId,
        can_be_broken: bool,
    ) -> Suspendable<()> {
        if self.workloads[on].is_finished
            || self.workloads[current].broken_dependencies.contains(&on)
        {
            return Ok(());
        }
        // A self-wait (struct pointing at itself, recursive cluster) is a
        // one-element cycle; cluster resolution breaks it when permitted
        Err(Waiting {
            on,
            can_be_broken,
            failure_flag: None,
        })
    }

    /// Like `wait_for`, but the edge carries a failure callback: cluster
    /// resolution may resolve it by setting the given flag instead of
    /// erroring the cycle. Returns `Ok(true)` when the flag fired.
    pub fn wait_for_or_fail(
        &mut self,
        current: WorkloadId,
        on: WorkloadId,
    ) -> Suspendable<bool> {
        if self.workloads[on].is_finished {
            return Ok(false);
        }
        if self.workloads[current].failed_dependencies.contains(&on) {
            return Ok(true);
        }
        if self.workloads[current].broken_dependencies.contains(&on) {
            return Ok(false);
        }
        let slot = self.workloads[current].failure_flags.len();
        self.workloads[current].failure_flags.push(false);
        Err(Waiting {
            on,
            can_be_broken: false,
            failure_flag: Some(slot),
        })
    }

    /// Record a suspension: the dependent waits on the dependency.
    pub fn register_dependency(&mut self, dependent: WorkloadId, waiting: Waiting) {
        let entry = self
            .edges
            .entry((dependent, waiting.on))
            .or_default();
        entry.can_be_broken = entry.can_be_broken || waiting.can_be_broken;
        if let Some(slot) = waiting.failure_flag {
            entry.failure_flags.push(slot);
        }
        if !self.workloads[dependent].dependencies.contains(&waiting.on) {
            self.workloads[dependent].dependencies.push(waiting.on);
        }
        if !self.workloads[waiting.on].dependents.contains(&dependent) {
            self.workloads[waiting.on].dependents.push(dependent);
        }
    }

    /// Mark a workload finished and re-queue dependents whose dependencies
    /// are now satisfied. Completion happens-before every dependent's next
    /// resume.
    pub fn finish_workload(&mut self, id: WorkloadId) {
        if self.workloads[id].is_finished {
            return;
        }
        self.workloads[id].is_finished = true;
        self.finished.push(id);
        let dependents = std::mem::take(&mut self.workloads[id].dependents);
        for dependent in dependents {
            self.workloads[dependent]
                .dependencies
                .retain(|&dep| dep != id);
            self.edges.remove(&(dependent, id));
            if self.workloads[dependent].dependencies.is_empty()
                && !self.workloads[dependent].is_finished
            {
                self.runnable.push_back(dependent);
            }
        }
    }

    /// Unfinished workloads that wait on at least one other workload.
    fn waiting_workloads(&self) -> Vec<WorkloadId> {
        self.workloads
            .indices()
            .filter(|&id| !self.workloads[id].is_finished && !self.workloads[id].dependencies.is_empty())
            .collect()
    }

    /// Attempt cluster resolution. Strongly connected components whose
    /// internal edges are all breakable (or failure-resolvable) are
    /// resolved by provisionally fulfilling those edges; the members
    /// become runnable again. Returns the ids of the members of every
    /// irresolvable component instead, so the caller can raise cycle
    /// errors.
    pub fn resolve_clusters(&mut self) -> (ResolveOutcome, Vec<Vec<WorkloadId>>) {
        let waiting = self.waiting_workloads();
        if waiting.is_empty() {
            return (ResolveOutcome::NoProgress, Vec::new());
        }

        let mut graph: DiGraph<WorkloadId, ()> = DiGraph::new();
        let mut indices: FxHashMap<WorkloadId, NodeIndex> = FxHashMap::default();
        for &id in &waiting {
            indices.insert(id, graph.add_node(id));
        }
        for &id in &waiting {
            for &dep in &self.workloads[id].dependencies {
                if let Some(&target) = indices.get(&dep) {
                    graph.add_edge(indices[&id], target, ());
                }
            }
        }

        let components = petgraph::algo::tarjan_scc(&graph);
        let mut broke_any = false;
        let mut irresolvable = Vec::new();

        for component in components {
            let members: Vec<WorkloadId> = component.iter().map(|&n| graph[n]).collect();
            let is_cycle = members.len() > 1
                || members
                    .iter()
                    .any(|&m| self.workloads[m].dependencies.contains(&m));
            if !is_cycle {
                continue;
            }
            let member_set: FxHashSet<WorkloadId> = members.iter().copied().collect();

            // Internal edges of the component
            let mut internal = Vec::new();
            for &member in &members {
                for &dep in &self.workloads[member].dependencies {
                    if member_set.contains(&dep) {
                        internal.push((member, dep));
                    }
                }
            }
            let resolvable = internal.iter().all(|edge| {
                self.edges
                    .get(edge)
                    .map(|info| info.can_be_broken || !info.failure_flags.is_empty())
                    .unwrap_or(false)
            });
            if !resolvable {
                irresolvable.push(members);
                continue;
            }

            broke_any = true;
            for (dependent, dependency) in internal {
                let info = self.edges.remove(&(dependent, dependency)).unwrap_or_default();
                if !info.can_be_broken {
                    // Resolve by failing: set the dependent's flags
                    for slot in &info.failure_flags {
                        if let Some(flag) =
                            self.workloads[dependent].failure_flags.get_mut(*slot)
                        {
                            *flag = true;
                        }
                    }
                    self.workloads[dependent]
                        .failed_dependencies
                        .insert(dependency);
                }
                self.workloads[dependent]
                    .broken_dependencies
                    .insert(dependency);
                self.workloads[dependent]
                    .dependencies
                    .retain(|&dep| dep != dependency);
                self.workloads[dependency]
                    .dependents
                    .retain(|&dep| dep != dependent);
            }
            for &member in &members {
                if self.workloads[member].dependencies.is_empty()
                    && !self.workloads[member].is_finished
                    && !self.runnable.contains(&member)
                {
                    self.runnable.push_back(member);
                }
            }
        }

        if broke_any {
            (ResolveOutcome::BrokeCluster, irresolvable)
        } else if !irresolvable.is_empty() {
            (ResolveOutcome::ErroredCycle, irresolvable)
        } else {
            (ResolveOutcome::NoProgress, irresolvable)
        }
    }

    /// Unfinished workloads left after the run loop; used to guarantee
    /// termination by erroring them out.
    pub fn unfinished(&self) -> Vec<WorkloadId> {
        self.workloads
            .indices()
            .filter(|&id| !self.workloads[id].is_finished)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executer_with(n: usize) -> (WorkloadExecuter, Vec<WorkloadId>) {
        let mut executer = WorkloadExecuter::default();
        let ids = (0..n)
            .map(|_| {
                executer.add_workload(
                    WorkloadKind::Event { description: "test" },
                    TableId(0),
                    PassId(0),
                )
            })
            .collect();
        (executer, ids)
    }

    #[test]
    fn finish_requeues_dependents() {
        let (mut executer, ids) = executer_with(2);
        executer.runnable.clear();
        executer.register_dependency(
            ids[1],
            Waiting {
                on: ids[0],
                can_be_broken: false,
                failure_flag: None,
            },
        );
        executer.finish_workload(ids[0]);
        assert!(executer.runnable.contains(&ids[1]));
        assert!(executer.workloads[ids[1]].dependencies.is_empty());
    }

    #[test]
    fn wait_for_finished_dependency_passes() {
        let (mut executer, ids) = executer_with(2);
        executer.finish_workload(ids[0]);
        assert!(executer.wait_for(ids[1], ids[0], false).is_ok());
        assert!(executer.wait_for(ids[0], ids[1], false).is_err());
    }

    #[test]
    fn breakable_cycle_is_resolved() {
        let (mut executer, ids) = executer_with(2);
        executer.runnable.clear();
        executer.register_dependency(
            ids[0],
            Waiting {
                on: ids[1],
                can_be_broken: true,
                failure_flag: None,
            },
        );
        executer.register_dependency(
            ids[1],
            Waiting {
                on: ids[0],
                can_be_broken: true,
                failure_flag: None,
            },
        );
        let (outcome, irresolvable) = executer.resolve_clusters();
        assert_eq!(outcome, ResolveOutcome::BrokeCluster);
        assert!(irresolvable.is_empty());
        assert!(executer.runnable.contains(&ids[0]));
        assert!(executer.runnable.contains(&ids[1]));
        // Broken edges satisfy later wait_for calls
        assert!(executer.wait_for(ids[0], ids[1], true).is_ok());
    }

    #[test]
    fn breakable_self_loop_is_resolved() {
        let (mut executer, ids) = executer_with(1);
        executer.runnable.clear();
        executer.register_dependency(
            ids[0],
            Waiting {
                on: ids[0],
                can_be_broken: true,
                failure_flag: None,
            },
        );
        let (outcome, _) = executer.resolve_clusters();
        assert_eq!(outcome, ResolveOutcome::BrokeCluster);
        assert!(executer.runnable.contains(&ids[0]));
    }

    #[test]
    fn unbreakable_cycle_is_reported() {
        let (mut executer, ids) = executer_with(2);
        executer.runnable.clear();
        executer.register_dependency(
            ids[0],
            Waiting {
                on: ids[1],
                can_be_broken: false,
                failure_flag: None,
            },
        );
        executer.register_dependency(
            ids[1],
            Waiting {
                on: ids[0],
                can_be_broken: false,
                failure_flag: None,
            },
        );
        let (outcome, irresolvable) = executer.resolve_clusters();
        assert_eq!(outcome, ResolveOutcome::ErroredCycle);
        assert_eq!(irresolvable.len(), 1);
        assert_eq!(irresolvable[0].len(), 2);
    }

    #[test]
    fn failure_edges_resolve_with_flags() {
        let (mut executer, ids) = executer_with(2);
        executer.runnable.clear();
        // Both directions carry failure callbacks (import cycle shape)
        let waiting_a = executer.wait_for_or_fail(ids[0], ids[1]).unwrap_err();
        executer.register_dependency(ids[0], waiting_a);
        let waiting_b = executer.wait_for_or_fail(ids[1], ids[0]).unwrap_err();
        executer.register_dependency(ids[1], waiting_b);

        let (outcome, irresolvable) = executer.resolve_clusters();
        assert_eq!(outcome, ResolveOutcome::BrokeCluster);
        assert!(irresolvable.is_empty());
        // Re-checking after the break reports the failure
        assert_eq!(executer.wait_for_or_fail(ids[0], ids[1]), Ok(true));
    }

    #[test]
    fn mixed_cycle_with_external_dependency() {
        let (mut executer, ids) = executer_with(3);
        executer.runnable.clear();
        // 0 <-> 1 breakable cycle; 1 also waits on external 2
        executer.register_dependency(
            ids[0],
            Waiting {
                on: ids[1],
                can_be_broken: true,
                failure_flag: None,
            },
        );
        executer.register_dependency(
            ids[1],
            Waiting {
                on: ids[0],
                can_be_broken: true,
                failure_flag: None,
            },
        );
        executer.register_dependency(
            ids[1],
            Waiting {
                on: ids[2],
                can_be_broken: false,
                failure_flag: None,
            },
        );
        let (outcome, _) = executer.resolve_clusters();
        assert_eq!(outcome, ResolveOutcome::BrokeCluster);
        // 0 is free, 1 still waits on 2
        assert!(executer.runnable.contains(&ids[0]));
        assert!(!executer.runnable.contains(&ids[1]));
        executer.finish_workload(ids[2]);
        assert!(executer.runnable.contains(&ids[1]));
    }
}
