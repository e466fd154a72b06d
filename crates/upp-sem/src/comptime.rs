//! Comptime evaluation: bake progress tracking and the built-in constant
//! folder.
//!
//! Bakes are scheduled as an analysis workload followed by an execution
//! workload; the execution seam is where an external bytecode interpreter
//! plugs in. The built-in evaluator folds the expression shapes the
//! front-end itself needs (literals, arithmetic, comparisons, comptime
//! symbol reads, type values) so bakes, enum values, and array sizes work
//! without a back-end.

use upp_util::IndexVec;

use upp_par::ast::{Binop, NodeKind, Unop};

use crate::constants::ConstantId;
use crate::passes::PassId;
use crate::types::TypeId;
use crate::workload::WorkloadId;
use crate::{Compiler, NodeRef};

upp_util::define_idx!(BakeId);

/// Progress of one bake expression.
#[derive(Clone, Debug)]
pub struct BakeProgress {
    pub node: NodeRef,
    pub result_type: Option<TypeId>,
    pub result: Option<ConstantId>,
    pub analysis_workload: WorkloadId,
    pub execute_workload: WorkloadId,
}

#[derive(Default)]
pub struct BakeStore {
    pub bakes: IndexVec<BakeId, BakeProgress>,
}

/// A folded comptime value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ComptimeValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Type(TypeId),
    Constant(ConstantId),
}

impl ComptimeValue {
    pub fn as_int(self) -> Option<i64> {
        match self {
            ComptimeValue::Int(value) => Some(value),
            _ => None,
        }
    }
}

/// Fold a comptime expression from its analysed tree. Returns an error
/// message when the expression isn't a compile-time constant.
pub fn evaluate_comptime(
    comp: &Compiler,
    node: NodeRef,
    pass: PassId,
) -> Result<ComptimeValue, &'static str> {
    let kind = comp.ast(node.unit).kind(node.node).clone();
    match kind {
        NodeKind::IntLiteral(value) => Ok(ComptimeValue::Int(value)),
        NodeKind::FloatLiteral(value) => Ok(ComptimeValue::Float(value)),
        NodeKind::BoolLiteral(value) => Ok(ComptimeValue::Bool(value)),
        NodeKind::Unary { op, operand } => {
            let operand = evaluate_comptime(comp, NodeRef::new(node.unit, operand), pass)?;
            match (op, operand) {
                (Unop::Negate, ComptimeValue::Int(value)) => Ok(ComptimeValue::Int(-value)),
                (Unop::Negate, ComptimeValue::Float(value)) => Ok(ComptimeValue::Float(-value)),
                (Unop::Not, ComptimeValue::Bool(value)) => Ok(ComptimeValue::Bool(!value)),
                _ => Err("operator is not comptime-evaluable for this operand"),
            }
        }
        NodeKind::Binary { op, left, right } => {
            let left = evaluate_comptime(comp, NodeRef::new(node.unit, left), pass)?;
            let right = evaluate_comptime(comp, NodeRef::new(node.unit, right), pass)?;
            fold_binop(op, left, right)
        }
        NodeKind::Cast { operand, .. } => {
            // Checked conversions between comptime numbers
            let value = evaluate_comptime(comp, NodeRef::new(node.unit, operand), pass)?;
            let info = comp
                .analysis
                .expression_info(node, pass)
                .ok_or("cast has no analysis info")?;
            let target = info.cast_info.result_type;
            match (value, comp.types.datatype(target)) {
                (ComptimeValue::Int(int), crate::types::Datatype::Primitive { class, .. })
                    if *class == crate::types::PrimitiveClass::Float =>
                {
                    Ok(ComptimeValue::Float(int as f64))
                }
                (ComptimeValue::Float(float), crate::types::Datatype::Primitive { class, .. })
                    if *class == crate::types::PrimitiveClass::Int =>
                {
                    Ok(ComptimeValue::Int(float as i64))
                }
                _ => Ok(value),
            }
        }
        NodeKind::SymbolLookup { .. } => {
            // Read through the analysed lookup: comptime constants and
            // type symbols fold, everything else does not
            let info = comp
                .analysis
                .expression_info(node, pass)
                .ok_or("symbol lookup has no analysis info")?;
            match &info.result {
                crate::passes::ExpressionResult::Constant(constant) => {
                    constant_to_value(comp, *constant)
                }
                crate::passes::ExpressionResult::Type(type_id) => {
                    Ok(ComptimeValue::Type(*type_id))
                }
                _ => Err("symbol does not name a compile-time value"),
            }
        }
        NodeKind::Bake { expr } => evaluate_comptime(comp, NodeRef::new(node.unit, expr), pass),
        _ => {
            // Expressions already analysed to a type or constant fold too
            if let Some(info) = comp.analysis.expression_info(node, pass) {
                match &info.result {
                    crate::passes::ExpressionResult::Type(type_id) => {
                        return Ok(ComptimeValue::Type(*type_id));
                    }
                    crate::passes::ExpressionResult::Constant(constant) => {
                        return constant_to_value(comp, *constant);
                    }
                    _ => {}
                }
            }
            Err("expression is not comptime-evaluable")
        }
    }
}

fn constant_to_value(comp: &Compiler, constant: ConstantId) -> Result<ComptimeValue, &'static str> {
    let entry = comp.constants.constant(constant);
    let types = &comp.types;
    match types.datatype(types.without_constant(entry.type_id)) {
        crate::types::Datatype::Primitive { class, width, .. } => match class {
            crate::types::PrimitiveClass::Int => match width {
                4 => Ok(ComptimeValue::Int(
                    comp.constants.read_i32(constant).ok_or("short constant")? as i64,
                )),
                8 => Ok(ComptimeValue::Int(
                    comp.constants.read_i64(constant).ok_or("short constant")?,
                )),
                _ => Ok(ComptimeValue::Int(
                    comp.constants
                        .bytes(constant)
                        .first()
                        .copied()
                        .unwrap_or(0) as i64,
                )),
            },
            crate::types::PrimitiveClass::Float => match width {
                4 => Ok(ComptimeValue::Float(
                    comp.constants.read_f32(constant).ok_or("short constant")? as f64,
                )),
                _ => Ok(ComptimeValue::Float(
                    comp.constants.read_f64(constant).ok_or("short constant")?,
                )),
            },
            crate::types::PrimitiveClass::Bool => Ok(ComptimeValue::Bool(
                comp.constants.read_bool(constant).ok_or("short constant")?,
            )),
            crate::types::PrimitiveClass::TypeHandle => Ok(ComptimeValue::Type(
                crate::types::TypeId(comp.constants.read_u32(constant).ok_or("short constant")?),
            )),
            crate::types::PrimitiveClass::Address => Ok(ComptimeValue::Constant(constant)),
        },
        _ => Ok(ComptimeValue::Constant(constant)),
    }
}

fn fold_binop(
    op: Binop,
    left: ComptimeValue,
    right: ComptimeValue,
) -> Result<ComptimeValue, &'static str> {
    use ComptimeValue::{Bool, Float, Int};
    Ok(match (op, left, right) {
        (Binop::Add, Int(a), Int(b)) => Int(a.wrapping_add(b)),
        (Binop::Subtract, Int(a), Int(b)) => Int(a.wrapping_sub(b)),
        (Binop::Multiply, Int(a), Int(b)) => Int(a.wrapping_mul(b)),
        (Binop::Divide, Int(a), Int(b)) => {
            if b == 0 {
                return Err("division by zero in comptime expression");
            }
            Int(a.wrapping_div(b))
        }
        (Binop::Modulo, Int(a), Int(b)) => {
            if b == 0 {
                return Err("modulo by zero in comptime expression");
            }
            Int(a.wrapping_rem(b))
        }
        (Binop::Add, Float(a), Float(b)) => Float(a + b),
        (Binop::Subtract, Float(a), Float(b)) => Float(a - b),
        (Binop::Multiply, Float(a), Float(b)) => Float(a * b),
        (Binop::Divide, Float(a), Float(b)) => Float(a / b),
        (Binop::Equal, Int(a), Int(b)) => Bool(a == b),
        (Binop::NotEqual, Int(a), Int(b)) => Bool(a != b),
        (Binop::Less, Int(a), Int(b)) => Bool(a < b),
        (Binop::LessEqual, Int(a), Int(b)) => Bool(a <= b),
        (Binop::Greater, Int(a), Int(b)) => Bool(a > b),
        (Binop::GreaterEqual, Int(a), Int(b)) => Bool(a >= b),
        (Binop::Equal, Bool(a), Bool(b)) => Bool(a == b),
        (Binop::NotEqual, Bool(a), Bool(b)) => Bool(a != b),
        (Binop::And, Bool(a), Bool(b)) => Bool(a && b),
        (Binop::Or, Bool(a), Bool(b)) => Bool(a || b),
        // Mixed int/float promotes to float
        (op, Int(a), Float(b)) => return fold_binop(op, Float(a as f64), Float(b)),
        (op, Float(a), Int(b)) => return fold_binop(op, Float(a), Float(b as f64)),
        _ => return Err("operator is not comptime-evaluable for these operands"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_arithmetic() {
        assert_eq!(
            fold_binop(Binop::Add, ComptimeValue::Int(2), ComptimeValue::Int(3)),
            Ok(ComptimeValue::Int(5))
        );
        assert_eq!(
            fold_binop(Binop::Multiply, ComptimeValue::Int(4), ComptimeValue::Float(0.5)),
            Ok(ComptimeValue::Float(2.0))
        );
        assert_eq!(
            fold_binop(Binop::Less, ComptimeValue::Int(1), ComptimeValue::Int(2)),
            Ok(ComptimeValue::Bool(true))
        );
    }

    #[test]
    fn rejects_division_by_zero() {
        assert!(fold_binop(Binop::Divide, ComptimeValue::Int(1), ComptimeValue::Int(0)).is_err());
        assert!(fold_binop(Binop::Modulo, ComptimeValue::Int(1), ComptimeValue::Int(0)).is_err());
    }

    #[test]
    fn rejects_mismatched_operands() {
        assert!(fold_binop(Binop::Add, ComptimeValue::Bool(true), ComptimeValue::Int(1)).is_err());
    }
}
