//! The constraint-solving collaborator. Interpreter and trace code never
//! inspect a `Value`'s symbolic structure directly to decide feasibility —
//! they go through a `Solver` so a real SMT backend can be swapped in later
//! without touching either. The reference solver shipped here only decides
//! what constant folding already decides; it is sound (never reports SAT for
//! something actually UNSAT) but incomplete (some genuinely SAT symbolic
//! queries come back `Unknown` rather than with a witness model).

use std::collections::HashMap;

use crate::ir::{Expr, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

pub trait Solver {
    /// Conjunction of `path_condition` with `extra`. `Sat`/`Unknown` both
    /// mean "treat as feasible" — callers that need a definite no must check
    /// for `Unsat` specifically.
    fn check_sat(&self, path_condition: &[Value], extra: &[Value]) -> SatResult;

    /// Folds constant subexpressions; a no-op on already-concrete values.
    fn simplify(&self, value: &Value) -> Value;

    /// Replaces every occurrence of the free variable `name` with `with`.
    fn substitute(&self, value: &Value, name: &str, with: &Value) -> Value;

    /// A satisfying assignment for `path_condition`'s free variables, if one
    /// can be produced. `None` does not imply unsatisfiability — only that
    /// this solver could not construct a witness.
    fn model(&self, path_condition: &[Value]) -> Option<HashMap<String, Value>>;
}

/// A bitvector-only reference solver with no real constraint propagation:
/// satisfiability of a conjunction of booleans is decided purely by constant
/// folding, and a model is produced only when every conjunct is already a
/// concrete `true`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceSolver;

impl ReferenceSolver {
    pub fn new() -> ReferenceSolver {
        ReferenceSolver
    }
}

impl Solver for ReferenceSolver {
    fn check_sat(&self, path_condition: &[Value], extra: &[Value]) -> SatResult {
        let mut saw_unknown = false;
        for cond in path_condition.iter().chain(extra) {
            match self.simplify(cond).as_concrete_bool() {
                Some(false) => return SatResult::Unsat,
                Some(true) => {}
                None => saw_unknown = true,
            }
        }
        if saw_unknown {
            SatResult::Unknown
        } else {
            SatResult::Sat
        }
    }

    fn simplify(&self, value: &Value) -> Value {
        match value {
            Value::Concrete(_) => value.clone(),
            Value::Symbolic(expr, ty) => match expr.as_ref() {
                Expr::BinOp { op, lhs, rhs } => {
                    let lhs = self.simplify(lhs);
                    let rhs = self.simplify(rhs);
                    let width = ty.bit_width(64);
                    Value::bin_op(*op, width, lhs, rhs)
                }
                Expr::Cmp { predicate, unsigned_or_unordered, lhs, rhs } => {
                    let lhs = self.simplify(lhs);
                    let rhs = self.simplify(rhs);
                    Value::cmp(*predicate, *unsigned_or_unordered, lhs, rhs)
                }
                Expr::Not(operand) => Value::not(self.simplify(operand)),
                Expr::Ite { cond, then_val, else_val } => {
                    let cond = self.simplify(cond);
                    Value::ite(cond, self.simplify(then_val), self.simplify(else_val), *ty)
                }
                _ => value.clone(),
            },
        }
    }

    fn substitute(&self, value: &Value, name: &str, with: &Value) -> Value {
        match value {
            Value::Concrete(_) => value.clone(),
            Value::Symbolic(expr, ty) => match expr.as_ref() {
                Expr::Var { name: var_name, .. } if var_name.as_ref() == name => with.clone(),
                Expr::Var { .. } => value.clone(),
                Expr::BinOp { op, lhs, rhs } => {
                    let width = ty.bit_width(64);
                    Value::bin_op(*op, width, self.substitute(lhs, name, with), self.substitute(rhs, name, with))
                }
                Expr::Cmp { predicate, unsigned_or_unordered, lhs, rhs } => Value::cmp(
                    *predicate,
                    *unsigned_or_unordered,
                    self.substitute(lhs, name, with),
                    self.substitute(rhs, name, with),
                ),
                Expr::Not(operand) => Value::not(self.substitute(operand, name, with)),
                Expr::Ite { cond, then_val, else_val } => Value::ite(
                    self.substitute(cond, name, with),
                    self.substitute(then_val, name, with),
                    self.substitute(else_val, name, with),
                    *ty,
                ),
                _ => value.clone(),
            },
        }
    }

    fn model(&self, path_condition: &[Value]) -> Option<HashMap<String, Value>> {
        if path_condition.iter().all(|c| matches!(self.simplify(c).as_concrete_bool(), Some(true))) {
            Some(HashMap::new())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CmpPredicate, Ty};

    #[test]
    fn empty_path_condition_is_sat() {
        let solver = ReferenceSolver::new();
        assert_eq!(solver.check_sat(&[], &[]), SatResult::Sat);
    }

    #[test]
    fn concrete_false_conjunct_is_unsat() {
        let solver = ReferenceSolver::new();
        assert_eq!(solver.check_sat(&[Value::bool(true), Value::bool(false)], &[]), SatResult::Unsat);
    }

    #[test]
    fn symbolic_conjunct_is_unknown_not_unsat() {
        let solver = ReferenceSolver::new();
        let x = Value::symbolic("x", Ty::Bool);
        assert_eq!(solver.check_sat(&[x], &[]), SatResult::Unknown);
    }

    #[test]
    fn substitute_replaces_free_variable() {
        let solver = ReferenceSolver::new();
        let x = Value::symbolic("x", Ty::BitVec(32));
        let expr = Value::cmp(CmpPredicate::Eq, false, x, Value::bv(5, 32));
        let substituted = solver.substitute(&expr, "x", &Value::bv(5, 32));
        assert_eq!(substituted.as_concrete_bool(), Some(true));
    }
}
