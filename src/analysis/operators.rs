//! Binary and unary operators
//!
//! Literal operands are folded when the result is a cheap literal again;
//! everything else asks the operand classes through their dunder methods.

use crate::analysis::Session;
use crate::ast::{BinaryOp, UnaryOp};
use crate::core::{Arguments, LiteralValue, ValueId, ValueSet};
use num_traits::{CheckedRem, PrimInt, ToPrimitive};

/// Operand pairs beyond this are evaluated through the classes instead
const MAX_FOLDED_PAIRS: usize = 16;

/// Longest string or bytes literal produced by folding
const MAX_FOLDED_LEN: usize = 4096;

/// Fold `left op right` when both are literals with a literal result
pub(crate) fn fold_literals(left: &LiteralValue, op: BinaryOp, right: &LiteralValue) -> Option<LiteralValue> {
    use LiteralValue as L;
    match (left, right) {
        (L::Int(_) | L::Bool(_), L::Int(_) | L::Bool(_)) => {
            let (a, b) = (left.as_int()?, right.as_int()?);
            match op {
                BinaryOp::Div => true_div(a as f64, b as f64),
                BinaryOp::Pow if b < 0 => Some(L::float((a as f64).powf(b as f64))),
                _ => fold_int(a, op, b).map(L::Int),
            }
        }
        (L::Float(_) | L::Int(_) | L::Bool(_), L::Float(_) | L::Int(_) | L::Bool(_)) => {
            fold_float(left.as_float()?, op, right.as_float()?)
        }
        (L::Str(a), L::Str(b)) if op == BinaryOp::Add && a.len() + b.len() <= MAX_FOLDED_LEN => {
            Some(L::Str(format!("{a}{b}")))
        }
        (L::Bytes(a), L::Bytes(b)) if op == BinaryOp::Add && a.len() + b.len() <= MAX_FOLDED_LEN => {
            Some(L::Bytes([a.as_slice(), b.as_slice()].concat()))
        }
        (L::Str(s), L::Int(n)) | (L::Int(n), L::Str(s)) if op == BinaryOp::Mult => {
            let count = repeat_count(s.len(), *n)?;
            Some(L::Str(s.repeat(count)))
        }
        (L::Bytes(b), L::Int(n)) | (L::Int(n), L::Bytes(b)) if op == BinaryOp::Mult => {
            let count = repeat_count(b.len(), *n)?;
            Some(L::Bytes(b.repeat(count)))
        }
        _ => None,
    }
}

fn repeat_count(len: usize, n: i64) -> Option<usize> {
    let count = n.max(0).to_usize()?;
    (len.checked_mul(count)? <= MAX_FOLDED_LEN).then_some(count)
}

fn true_div(a: f64, b: f64) -> Option<LiteralValue> {
    (b != 0.0).then(|| LiteralValue::float(a / b))
}

/// Integer arithmetic with floor semantics; `None` on overflow or division by zero
fn fold_int<T: PrimInt + CheckedRem>(a: T, op: BinaryOp, b: T) -> Option<T> {
    let zero = T::zero();
    match op {
        BinaryOp::Add => a.checked_add(&b),
        BinaryOp::Sub => a.checked_sub(&b),
        BinaryOp::Mult => a.checked_mul(&b),
        BinaryOp::FloorDiv => {
            let quotient = a.checked_div(&b)?;
            let remainder = a.checked_rem(&b)?;
            if remainder != zero && (remainder < zero) != (b < zero) {
                quotient.checked_sub(&T::one())
            } else {
                Some(quotient)
            }
        }
        BinaryOp::Mod => {
            let remainder = a.checked_rem(&b)?;
            if remainder != zero && (remainder < zero) != (b < zero) {
                remainder.checked_add(&b)
            } else {
                Some(remainder)
            }
        }
        BinaryOp::Pow => num_traits::checked_pow(a, b.to_usize()?),
        BinaryOp::LShift => {
            let shift = b.to_usize()?;
            let factor = num_traits::checked_pow(T::one() + T::one(), shift)?;
            a.checked_mul(&factor)
        }
        BinaryOp::RShift => Some(a.signed_shr(b.to_u32()?.min(T::zero().count_zeros() - 1))),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        BinaryOp::Div | BinaryOp::MatMult => None,
    }
}

fn fold_float(a: f64, op: BinaryOp, b: f64) -> Option<LiteralValue> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mult => a * b,
        BinaryOp::Div => return true_div(a, b),
        BinaryOp::FloorDiv if b != 0.0 => (a / b).floor(),
        BinaryOp::Mod if b != 0.0 => a - b * (a / b).floor(),
        BinaryOp::Pow => a.powf(b),
        _ => return None,
    };
    value.is_finite().then(|| LiteralValue::float(value))
}

fn fold_unary(op: UnaryOp, operand: &LiteralValue) -> Option<LiteralValue> {
    match (op, operand) {
        (UnaryOp::USub, LiteralValue::Float(_)) => Some(LiteralValue::float(-operand.as_float()?)),
        (UnaryOp::UAdd, LiteralValue::Float(_)) => Some(operand.clone()),
        (UnaryOp::USub, _) => operand.as_int()?.checked_neg().map(LiteralValue::Int),
        (UnaryOp::UAdd, _) => operand.as_int().map(LiteralValue::Int),
        (UnaryOp::Invert, _) => operand.as_int().map(|i| LiteralValue::Int(!i)),
        (UnaryOp::Not, _) => None,
    }
}

impl Session {
    /// `left op right` over every pair of operand values
    pub(crate) fn binary_op(&mut self, left: &ValueSet, op: BinaryOp, right: &ValueSet) -> ValueSet {
        let fold = left.len() * right.len() <= MAX_FOLDED_PAIRS;
        let mut out = ValueSet::empty();
        for l in left.iter() {
            for r in right.iter() {
                if fold {
                    let folded = match (self.pool.get(l).literal(), self.pool.get(r).literal()) {
                        (Some(a), Some(b)) => fold_literals(a, op, b),
                        _ => None,
                    };
                    if let Some(literal) = folded {
                        out.union_with(&self.literal(literal));
                        continue;
                    }
                }
                out.union_with(&self.dunder_op(l, op, r));
            }
        }
        out
    }

    /// `l.__op__(r)`, falling back to `r.__rop__(l)`
    fn dunder_op(&mut self, l: ValueId, op: BinaryOp, r: ValueId) -> ValueSet {
        let left = ValueSet::single(l);
        let right = ValueSet::single(r);
        let arguments = self.pool.arguments(Arguments::positional(vec![right.clone()]));
        let result = self.call_method(&left, op.dunder(), arguments);
        if !result.is_empty() {
            return result;
        }
        let arguments = self.pool.arguments(Arguments::positional(vec![left]));
        self.call_method(&right, op.reflected(), arguments)
    }

    pub(crate) fn unary_op(&mut self, op: UnaryOp, operand: &ValueSet) -> ValueSet {
        if op == UnaryOp::Not {
            return self.builtin_instance("bool");
        }
        let dunder = match op {
            UnaryOp::USub => "__neg__",
            UnaryOp::UAdd => "__pos__",
            _ => "__invert__",
        };
        operand.flat_map(|v| {
            let folded = self.pool.get(v).literal().and_then(|literal| fold_unary(op, literal));
            if let Some(literal) = folded {
                return self.literal(literal);
            }
            let arguments = self.pool.arguments(Arguments::Anonymous);
            self.call_method(&ValueSet::single(v), dunder, arguments)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> LiteralValue {
        LiteralValue::Int(i)
    }

    #[test]
    fn test_int_folding_uses_floor_semantics() {
        assert_eq!(fold_literals(&int(7), BinaryOp::FloorDiv, &int(-2)), Some(int(-4)));
        assert_eq!(fold_literals(&int(-7), BinaryOp::Mod, &int(3)), Some(int(2)));
        assert_eq!(fold_literals(&int(2), BinaryOp::Pow, &int(10)), Some(int(1024)));
        assert_eq!(fold_literals(&int(1), BinaryOp::LShift, &int(4)), Some(int(16)));
        assert_eq!(fold_literals(&int(1), BinaryOp::Div, &int(2)), Some(LiteralValue::float(0.5)));
    }

    #[test]
    fn test_overflow_and_zero_division_do_not_fold() {
        assert_eq!(fold_literals(&int(i64::MAX), BinaryOp::Add, &int(1)), None);
        assert_eq!(fold_literals(&int(1), BinaryOp::FloorDiv, &int(0)), None);
        assert_eq!(fold_literals(&int(1), BinaryOp::Div, &int(0)), None);
    }

    #[test]
    fn test_mixed_numeric_folds_to_float() {
        assert_eq!(
            fold_literals(&int(1), BinaryOp::Add, &LiteralValue::float(0.5)),
            Some(LiteralValue::float(1.5))
        );
        assert_eq!(
            fold_literals(&LiteralValue::Bool(true), BinaryOp::Add, &int(1)),
            Some(int(2))
        );
    }

    #[test]
    fn test_string_folding() {
        let a = LiteralValue::Str("ab".to_string());
        assert_eq!(
            fold_literals(&a, BinaryOp::Add, &LiteralValue::Str("c".to_string())),
            Some(LiteralValue::Str("abc".to_string()))
        );
        assert_eq!(fold_literals(&a, BinaryOp::Mult, &int(2)), Some(LiteralValue::Str("abab".to_string())));
        assert_eq!(fold_literals(&a, BinaryOp::Mult, &int(1 << 40)), None);
        assert_eq!(fold_literals(&a, BinaryOp::Sub, &int(1)), None);
    }

    #[test]
    fn test_unary_folding() {
        assert_eq!(fold_unary(UnaryOp::USub, &int(3)), Some(int(-3)));
        assert_eq!(fold_unary(UnaryOp::Invert, &int(0)), Some(int(-1)));
        assert_eq!(fold_unary(UnaryOp::UAdd, &LiteralValue::Bool(true)), Some(int(1)));
        assert_eq!(fold_unary(UnaryOp::USub, &int(i64::MIN)), None);
    }
}
