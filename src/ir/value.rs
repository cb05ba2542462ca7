//! Symbolic values: either a concrete bitvector/bool/float/bytes, or a
//! symbolic expression tree over a set of free symbols. Equality is
//! structural; simplification (owned by the solver collaborator) is
//! idempotent.

use std::fmt;
use std::sync::Arc;

use crate::ir::instruction::CmpPredicate;
use crate::ir::types::{FloatWidth, ObjectId, Ty};

/// A concrete, fully-evaluated leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Concrete {
    Bool(bool),
    BitVec { bits: u128, width: u32 },
    Float { bits: u64, width: crate::ir::types::FloatWidth },
    Bytes(Arc<[u8]>),
    Pointer { object: ObjectId, offset: Box<Value> },
}

/// A symbolic expression tree. Built by `Value::sym_*` constructors and
/// walked by the solver collaborator's `check_sat`/`simplify`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Var { name: Arc<str>, ty: Ty },
    BinOp { op: BinOp, lhs: Box<Value>, rhs: Box<Value> },
    Cmp { predicate: CmpPredicate, unsigned_or_unordered: bool, lhs: Box<Value>, rhs: Box<Value> },
    Not(Box<Value>),
    Ite { cond: Box<Value>, then_val: Box<Value>, else_val: Box<Value> },
    Extend { signed: bool, width: u32, operand: Box<Value> },
    Extract { lo: u32, hi: u32, operand: Box<Value> },
    Cast { ty: Ty, operand: Box<Value> },
    UnaryFloatOp { op: UnaryFloatOp, operand: Box<Value> },
}

/// The closed set of floating-point primitives named in §4.1 beyond the
/// binary `min`/`max` already covered by `BinOp::{FMin,FMax}`: `fabs`,
/// `isnan`, `isinf`, `classify`, `signbit`, `sqrt`, and the four rounding
/// modes. Concrete evaluation follows IEEE-754 via Rust's `f32`/`f64`
/// primitives; a symbolic operand is forwarded to the solver untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryFloatOp {
    Fabs,
    Sqrt,
    Round,
    Floor,
    Ceil,
    Trunc,
    IsNan,
    IsInf,
    Signbit,
    Classify,
}

impl UnaryFloatOp {
    /// True for the predicates (`isnan`/`isinf`/`signbit`) that yield a bool
    /// rather than another float of the same width.
    pub fn is_predicate(self) -> bool {
        matches!(self, UnaryFloatOp::IsNan | UnaryFloatOp::IsInf | UnaryFloatOp::Signbit)
    }

    /// True for `classify`, which yields a small integer category code
    /// (mirroring libc's `fpclassify`) rather than a bool or a float.
    pub fn is_classify(self) -> bool {
        matches!(self, UnaryFloatOp::Classify)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FMin,
    FMax,
}

/// Either a concrete value or a symbolic expression, always tagged with its
/// static type. This is the unit of data the interpreter, the trace, and the
/// solver all exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Concrete(Concrete),
    Symbolic(Arc<Expr>, Ty),
}

impl Value {
    pub fn bool(v: bool) -> Value {
        Value::Concrete(Concrete::Bool(v))
    }

    pub fn bv(value: u128, width: u32) -> Value {
        let mask = if width >= 128 { u128::MAX } else { (1u128 << width) - 1 };
        Value::Concrete(Concrete::BitVec { bits: value & mask, width })
    }

    pub fn pointer(object: ObjectId, offset: Value) -> Value {
        Value::Concrete(Concrete::Pointer { object, offset: Box::new(offset) })
    }

    pub fn symbolic(name: impl Into<Arc<str>>, ty: Ty) -> Value {
        Value::Symbolic(Arc::new(Expr::Var { name: name.into(), ty }), ty)
    }

    pub fn float(v: f64, width: FloatWidth) -> Value {
        let bits = match width {
            FloatWidth::F32 => (v as f32).to_bits() as u64,
            FloatWidth::F64 => v.to_bits(),
        };
        Value::Concrete(Concrete::Float { bits, width })
    }

    pub fn as_concrete_float(&self) -> Option<f64> {
        match self {
            Value::Concrete(Concrete::Float { bits, width: FloatWidth::F32 }) => Some(f32::from_bits(*bits as u32) as f64),
            Value::Concrete(Concrete::Float { bits, width: FloatWidth::F64 }) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    fn float_width(&self) -> Option<FloatWidth> {
        match self {
            Value::Concrete(Concrete::Float { width, .. }) => Some(*width),
            _ => None,
        }
    }

    pub fn ty(&self, pointer_bitwidth: u32) -> Ty {
        match self {
            Value::Concrete(Concrete::Bool(_)) => Ty::Bool,
            Value::Concrete(Concrete::BitVec { width, .. }) => Ty::BitVec(*width),
            Value::Concrete(Concrete::Float { width, .. }) => Ty::Float(*width),
            Value::Concrete(Concrete::Bytes(b)) => Ty::Bytes(b.len() as u32),
            Value::Concrete(Concrete::Pointer { .. }) => Ty::Pointer,
            Value::Symbolic(_, ty) => {
                let _ = pointer_bitwidth;
                *ty
            }
        }
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Value::Concrete(_))
    }

    pub fn as_concrete_bool(&self) -> Option<bool> {
        match self {
            Value::Concrete(Concrete::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_concrete_bv(&self) -> Option<u128> {
        match self {
            Value::Concrete(Concrete::BitVec { bits, .. }) => Some(*bits),
            _ => None,
        }
    }

    /// Like `as_concrete_bv`, but keeps the bit width so callers that need a
    /// signed interpretation (`cmp`'s `unsigned_or_unordered` flag) can
    /// sign-extend correctly instead of comparing raw unsigned bit patterns.
    fn as_concrete_bv_width(&self) -> Option<(u128, u32)> {
        match self {
            Value::Concrete(Concrete::BitVec { bits, width }) => Some((*bits, *width)),
            _ => None,
        }
    }

    /// Resolves a pointer chain one level: if this value is itself a pointer
    /// whose offset is concrete, returns the underlying object id directly.
    /// Used by the race predicate's conservative "Load-of-a-Load" collapse
    /// (see `trace::race`).
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Value::Concrete(Concrete::Pointer { object, .. }) => Some(*object),
            _ => None,
        }
    }

    pub fn cmp(predicate: CmpPredicate, unsigned_or_unordered: bool, lhs: Value, rhs: Value) -> Value {
        if let (Some((a, width)), Some((b, _))) = (lhs.as_concrete_bv_width(), rhs.as_concrete_bv_width()) {
            let result = if unsigned_or_unordered || matches!(predicate, CmpPredicate::Eq | CmpPredicate::Ne) {
                match predicate {
                    CmpPredicate::Le => a <= b,
                    CmpPredicate::Lt => a < b,
                    CmpPredicate::Ge => a >= b,
                    CmpPredicate::Gt => a > b,
                    CmpPredicate::Eq => a == b,
                    CmpPredicate::Ne => a != b,
                }
            } else {
                let a = sign_extend_to_i128(a, width);
                let b = sign_extend_to_i128(b, width);
                match predicate {
                    CmpPredicate::Le => a <= b,
                    CmpPredicate::Lt => a < b,
                    CmpPredicate::Ge => a >= b,
                    CmpPredicate::Gt => a > b,
                    CmpPredicate::Eq => a == b,
                    CmpPredicate::Ne => a != b,
                }
            };
            return Value::bool(result);
        }
        Value::Symbolic(
            Arc::new(Expr::Cmp { predicate, unsigned_or_unordered, lhs: Box::new(lhs), rhs: Box::new(rhs) }),
            Ty::Bool,
        )
    }

    pub fn bin_op(op: BinOp, width: u32, lhs: Value, rhs: Value) -> Value {
        if let (Some(a), Some(b)) = (lhs.as_concrete_bv(), rhs.as_concrete_bv()) {
            if let Some(result) = eval_concrete_bin_op(op, width, a, b) {
                return Value::bv(result, width);
            }
        }
        Value::Symbolic(Arc::new(Expr::BinOp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }), Ty::BitVec(width))
    }

    pub fn not(operand: Value) -> Value {
        if let Some(b) = operand.as_concrete_bool() {
            return Value::bool(!b);
        }
        Value::Symbolic(Arc::new(Expr::Not(Box::new(operand))), Ty::Bool)
    }

    /// Evaluates one of the §4.1 floating-point primitives. `width` is used
    /// only to re-encode a concrete floating result (`fabs`, `sqrt`, the
    /// rounding modes) at the operand's own precision; `isnan`/`isinf`/
    /// `signbit` produce a bool and `classify` a small category code
    /// regardless of `width`.
    pub fn unary_float_op(op: UnaryFloatOp, operand: Value) -> Value {
        if let Some(x) = operand.as_concrete_float() {
            let width = operand.float_width().unwrap_or(FloatWidth::F64);
            return match op {
                UnaryFloatOp::Fabs => Value::float(x.abs(), width),
                UnaryFloatOp::Sqrt => Value::float(x.sqrt(), width),
                UnaryFloatOp::Round => Value::float(x.round(), width),
                UnaryFloatOp::Floor => Value::float(x.floor(), width),
                UnaryFloatOp::Ceil => Value::float(x.ceil(), width),
                UnaryFloatOp::Trunc => Value::float(x.trunc(), width),
                UnaryFloatOp::IsNan => Value::bool(x.is_nan()),
                UnaryFloatOp::IsInf => Value::bool(x.is_infinite()),
                UnaryFloatOp::Signbit => Value::bool(x.is_sign_negative()),
                UnaryFloatOp::Classify => Value::bv(fp_classify_code(x), 32),
            };
        }
        let ty = if op.is_predicate() {
            Ty::Bool
        } else if op.is_classify() {
            Ty::BitVec(32)
        } else {
            operand.ty(64)
        };
        Value::Symbolic(Arc::new(Expr::UnaryFloatOp { op, operand: Box::new(operand) }), ty)
    }

    pub fn ite(cond: Value, then_val: Value, else_val: Value, ty: Ty) -> Value {
        if let Some(b) = cond.as_concrete_bool() {
            return if b { then_val } else { else_val };
        }
        Value::Symbolic(
            Arc::new(Expr::Ite { cond: Box::new(cond), then_val: Box::new(then_val), else_val: Box::new(else_val) }),
            ty,
        )
    }
}

/// Category codes for `classify`, ordered to match libc's `fpclassify`
/// macros (`FP_NAN`, `FP_INFINITE`, `FP_ZERO`, `FP_SUBNORMAL`, `FP_NORMAL`).
fn fp_classify_code(x: f64) -> u128 {
    use std::num::FpCategory;
    match x.classify() {
        FpCategory::Nan => 0,
        FpCategory::Infinite => 1,
        FpCategory::Zero => 2,
        FpCategory::Subnormal => 3,
        FpCategory::Normal => 4,
    }
}

/// Reinterprets the low `width` bits of `v` as a two's-complement signed
/// integer, widened to `i128` for comparison.
fn sign_extend_to_i128(v: u128, width: u32) -> i128 {
    if width == 0 || width >= 128 {
        return v as i128;
    }
    let shift = 128 - width;
    ((v << shift) as i128) >> shift
}

fn eval_concrete_bin_op(op: BinOp, width: u32, a: u128, b: u128) -> Option<u128> {
    let mask = if width >= 128 { u128::MAX } else { (1u128 << width) - 1 };
    let wrap = |v: u128| v & mask;
    Some(match op {
        BinOp::Add => wrap(a.wrapping_add(b)),
        BinOp::Sub => wrap(a.wrapping_sub(b)),
        BinOp::Mul => wrap(a.wrapping_mul(b)),
        BinOp::UDiv => {
            if b == 0 {
                return None;
            }
            wrap(a / b)
        }
        BinOp::URem => {
            if b == 0 {
                return None;
            }
            wrap(a % b)
        }
        BinOp::And => wrap(a & b),
        BinOp::Or => wrap(a | b),
        BinOp::Xor => wrap(a ^ b),
        BinOp::Shl => wrap(a.wrapping_shl(b as u32)),
        BinOp::LShr => wrap(a.wrapping_shr(b as u32)),
        // Signed variants need the width to sign-extend before the native op;
        // left to the solver for now when operands aren't known-concrete-safe.
        BinOp::SDiv | BinOp::SRem | BinOp::AShr => return None,
        BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv | BinOp::FMin | BinOp::FMax => return None,
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Concrete(Concrete::Bool(b)) => write!(f, "{b}"),
            Value::Concrete(Concrete::BitVec { bits, width }) => write!(f, "{bits}:i{width}"),
            Value::Concrete(Concrete::Float { bits, .. }) => write!(f, "{bits:#x}:float"),
            Value::Concrete(Concrete::Bytes(b)) => write!(f, "bytes[{}]", b.len()),
            Value::Concrete(Concrete::Pointer { object, offset }) => write!(f, "({}, {offset})", object.0),
            Value::Symbolic(expr, _) => write!(f, "{expr:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concrete_bin_op_wraps_at_width() {
        let a = Value::bv(250, 8);
        let b = Value::bv(10, 8);
        let sum = Value::bin_op(BinOp::Add, 8, a, b);
        assert_eq!(sum.as_concrete_bv(), Some(4));
    }

    #[test]
    fn cmp_on_concrete_values_folds() {
        let a = Value::bv(3, 32);
        let b = Value::bv(5, 32);
        let r = Value::cmp(CmpPredicate::Lt, false, a, b);
        assert_eq!(r.as_concrete_bool(), Some(true));
    }

    #[test]
    fn signed_cmp_treats_high_bit_as_negative() {
        let neg_one = Value::bv(0xFFFF_FFFF, 32);
        let zero = Value::bv(0, 32);
        let signed = Value::cmp(CmpPredicate::Lt, false, neg_one.clone(), zero.clone());
        assert_eq!(signed.as_concrete_bool(), Some(true));
        let unsigned = Value::cmp(CmpPredicate::Lt, true, neg_one, zero);
        assert_eq!(unsigned.as_concrete_bool(), Some(false));
    }

    #[test]
    fn symbolic_values_stay_symbolic() {
        let x = Value::symbolic("x", Ty::BitVec(32));
        let y = Value::bv(1, 32);
        let sum = Value::bin_op(BinOp::Add, 32, x, y);
        assert!(!sum.is_concrete());
    }
}
