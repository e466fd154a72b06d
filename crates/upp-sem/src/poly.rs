//! Polymorphic headers, values, and the instance cache.
//!
//! A [`PolyHeader`] is the signature of a polymorphic function or struct:
//! its parameters (comptime and runtime), the inferred-parameter slots
//! discovered in the header, and a cache of instances keyed by the
//! resolved value set. Equal value sets always share one instance.

use upp_util::{Identifier, IndexVec};

use crate::constants::ConstantId;
use crate::program::FunctionId;
use crate::symbols::TableId;
use crate::types::TypeId;
use crate::workload::WorkloadId;
use crate::NodeRef;

upp_util::define_idx!(PolyHeaderId);

/// State of one polymorphic value slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolyValue {
    /// Not yet resolved; carries the declared type when known
    Unset { unset_type: TypeId },
    /// Resolved to a comptime constant
    Set { value: ConstantId },
    /// Used during header analysis: a templated type read
    TemplatedType { template: TypeId },
}

/// One header parameter with its polymorphic classification.
#[derive(Clone, Debug)]
pub struct PolyParameter {
    pub name: Identifier,
    /// `$name` parameters and struct parameters are comptime
    pub is_comptime: bool,
    /// Resolved parameter type; None while it depends on other parameters
    pub param_type: Option<TypeId>,
    pub type_node: Option<NodeRef>,
    pub default_value: Option<NodeRef>,
    pub required: bool,
    pub depends_on_other_parameters: bool,
    pub contains_inferred_parameter: bool,
    /// Value slot for comptime parameters
    pub value_access_index: Option<u32>,
    /// Position in the runtime signature for normal parameters
    pub index_in_runtime_signature: Option<u32>,
}

/// An inferred (`$T`-style) parameter slot found inside a header type.
#[derive(Clone, Debug)]
pub struct InferredParameter {
    pub defined_in_parameter_index: u32,
    pub id: Identifier,
    /// The defining pattern-variable type
    pub template_type: TypeId,
    pub value_access_index: u32,
}

/// What an instance resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolyInstanceTarget {
    Function(FunctionId),
    Struct(TypeId),
}

#[derive(Clone, Debug)]
pub struct PolyInstance {
    pub values: Vec<PolyValue>,
    pub target: PolyInstanceTarget,
    pub body_workload: WorkloadId,
}

/// What declared the header.
#[derive(Clone, Copy, Debug)]
pub enum PolyOrigin {
    Function { node: NodeRef },
    Struct { node: NodeRef, base_struct: TypeId },
}

#[derive(Clone, Debug)]
pub struct PolyHeader {
    pub name: Identifier,
    pub is_function: bool,
    pub parameters: Vec<PolyParameter>,
    /// Number of comptime + inferred value slots
    pub poly_value_count: u32,
    pub inferred: Vec<InferredParameter>,
    pub instances: Vec<PolyInstance>,
    /// Values visible while analysing the base (all unset/templated)
    pub base_values: Vec<PolyValue>,
    pub symbol_table: TableId,
    pub return_type_node: Option<NodeRef>,
    /// Analysed return type; may contain pattern variables
    pub return_type: Option<TypeId>,
    pub origin: PolyOrigin,
    pub definition_workload: WorkloadId,
}

#[derive(Default)]
pub struct PolyStore {
    pub headers: IndexVec<PolyHeaderId, PolyHeader>,
}

impl PolyStore {
    pub fn header(&self, id: PolyHeaderId) -> &PolyHeader {
        &self.headers[id]
    }

    pub fn header_mut(&mut self, id: PolyHeaderId) -> &mut PolyHeader {
        &mut self.headers[id]
    }

    /// Instance-cache lookup: equal value sets share one instance.
    pub fn find_instance(&self, header: PolyHeaderId, values: &[PolyValue]) -> Option<&PolyInstance> {
        self.headers[header]
            .instances
            .iter()
            .find(|instance| instance.values == values)
    }

    pub fn add_instance(&mut self, header: PolyHeaderId, instance: PolyInstance) {
        debug_assert!(
            self.find_instance(header, &instance.values).is_none(),
            "duplicate polymorphic instance"
        );
        self.headers[header].instances.push(instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_par::NodeId;
    use upp_util::UnitId;

    fn header() -> PolyHeader {
        PolyHeader {
            name: {
                let pool = upp_util::IdentifierPool::new();
                let lock = pool.lock();
                pool.add(&lock, "H")
            },
            is_function: true,
            parameters: vec![],
            poly_value_count: 1,
            inferred: vec![],
            instances: vec![],
            base_values: vec![PolyValue::Unset {
                unset_type: TypeId(0),
            }],
            symbol_table: TableId(0),
            return_type_node: None,
            return_type: None,
            origin: PolyOrigin::Function {
                node: NodeRef {
                    unit: UnitId(0),
                    node: NodeId(0),
                },
            },
            definition_workload: WorkloadId(0),
        }
    }

    #[test]
    fn instance_cache_deduplicates_by_values() {
        let mut store = PolyStore::default();
        let id = store.headers.push(header());
        let values = vec![PolyValue::Set {
            value: ConstantId(3),
        }];
        assert!(store.find_instance(id, &values).is_none());
        store.add_instance(
            id,
            PolyInstance {
                values: values.clone(),
                target: PolyInstanceTarget::Function(FunctionId(1)),
                body_workload: WorkloadId(2),
            },
        );
        let found = store.find_instance(id, &values).unwrap();
        assert_eq!(found.target, PolyInstanceTarget::Function(FunctionId(1)));
        // Different values miss
        let other = vec![PolyValue::Set {
            value: ConstantId(4),
        }];
        assert!(store.find_instance(id, &other).is_none());
    }
}
