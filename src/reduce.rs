//! Reduction operators. A reduction folds the contributions of every rank
//! with a binary operator, always in rank order, so an operator only has to
//! be associative; commutativity is recorded but never relied on.
//!
//! An operator is either one of the predefined `Builtin` tokens, which each
//! value type interprets through `Reducible`, or a custom plain function.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Builtin {
    Max,
    Min,
    Sum,
    Product,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    BitAnd,
    BitOr,
    BitXor,
    MaxLoc,
    MinLoc,
    Replace,
    NoOp,
}

impl Builtin {
    pub fn commutes(self) -> bool {
        !matches!(self, Builtin::Replace | Builtin::NoOp)
    }
}

/// A value type the builtin operators know how to combine. `a` is the
/// contribution of the lower rank. The provided method supports only
/// `Replace` (keep `b`) and `NoOp` (keep `a`), so a type that is reduced
/// with custom operators alone can opt in with an empty impl.
pub trait Reducible: Clone {
    fn combine(op: Builtin, a: &Self, b: &Self) -> Result<Self> {
        match op {
            Builtin::Replace => Ok(b.clone()),
            Builtin::NoOp => Ok(a.clone()),
            _ => Err(Error::Unsupported(op)),
        }
    }
}

macro_rules! integer_reducible {
    ($($t:ty),*) => {$(
        impl Reducible for $t {
            fn combine(op: Builtin, a: &Self, b: &Self) -> Result<Self> {
                let (a, b) = (*a, *b);
                Ok(match op {
                    Builtin::Max => a.max(b),
                    Builtin::Min => a.min(b),
                    Builtin::Sum => a.wrapping_add(b),
                    Builtin::Product => a.wrapping_mul(b),
                    Builtin::LogicalAnd => (a != 0 && b != 0) as $t,
                    Builtin::LogicalOr => (a != 0 || b != 0) as $t,
                    Builtin::LogicalXor => ((a != 0) != (b != 0)) as $t,
                    Builtin::BitAnd => a & b,
                    Builtin::BitOr => a | b,
                    Builtin::BitXor => a ^ b,
                    Builtin::Replace => b,
                    Builtin::NoOp => a,
                    Builtin::MaxLoc | Builtin::MinLoc => return Err(Error::Unsupported(op)),
                })
            }
        }
    )*};
}

integer_reducible!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! float_reducible {
    ($($t:ty),*) => {$(
        impl Reducible for $t {
            fn combine(op: Builtin, a: &Self, b: &Self) -> Result<Self> {
                let (a, b) = (*a, *b);
                Ok(match op {
                    Builtin::Max => a.max(b),
                    Builtin::Min => a.min(b),
                    Builtin::Sum => a + b,
                    Builtin::Product => a * b,
                    Builtin::Replace => b,
                    Builtin::NoOp => a,
                    _ => return Err(Error::Unsupported(op)),
                })
            }
        }
    )*};
}

float_reducible!(f32, f64);

impl Reducible for bool {
    fn combine(op: Builtin, a: &Self, b: &Self) -> Result<Self> {
        let (a, b) = (*a, *b);
        Ok(match op {
            Builtin::LogicalAnd | Builtin::BitAnd => a && b,
            Builtin::LogicalOr | Builtin::BitOr => a || b,
            Builtin::LogicalXor | Builtin::BitXor => a != b,
            Builtin::Replace => b,
            Builtin::NoOp => a,
            _ => return Err(Error::Unsupported(op)),
        })
    }
}

impl Reducible for String {}

/// A value tagged with where it came from, for `MaxLoc` and `MinLoc`. Among
/// equal values the smaller location wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Loc<T> {
    pub value: T,
    pub location: usize,
}

impl<T> Loc<T> {
    pub fn new(value: T, location: usize) -> Self {
        Self { value, location }
    }
}

impl<T: PartialOrd + Clone> Reducible for Loc<T> {
    fn combine(op: Builtin, a: &Self, b: &Self) -> Result<Self> {
        use std::cmp::Ordering::*;

        let prefer_a = match (op, a.value.partial_cmp(&b.value)) {
            (Builtin::MaxLoc, Some(Greater)) | (Builtin::MinLoc, Some(Less)) => true,
            (Builtin::MaxLoc, Some(Less)) | (Builtin::MinLoc, Some(Greater)) => false,
            (Builtin::MaxLoc, _) | (Builtin::MinLoc, _) => a.location <= b.location,
            (Builtin::Replace, _) => false,
            (Builtin::NoOp, _) => true,
            _ => return Err(Error::Unsupported(op)),
        };
        Ok(if prefer_a { a.clone() } else { b.clone() })
    }
}

/// Element-wise reduction. Both operands must have the same length.
impl<T: Reducible> Reducible for Vec<T> {
    fn combine(op: Builtin, a: &Self, b: &Self) -> Result<Self> {
        if a.len() != b.len() {
            return Err(Error::LengthMismatch(a.len(), b.len()));
        }
        a.iter().zip(b).map(|(x, y)| T::combine(op, x, y)).collect()
    }
}

/// A reduction operator over values of type `T`.
pub enum Op<T> {
    Builtin(Builtin),
    Custom { f: fn(&T, &T) -> T, commutes: bool },
}

impl<T> Op<T> {
    pub fn builtin(op: Builtin) -> Self {
        Op::Builtin(op)
    }

    /// Wrap a plain function as an operator. The function must be
    /// associative; `commutes` says whether it is also commutative.
    pub fn custom(f: fn(&T, &T) -> T, commutes: bool) -> Self {
        Op::Custom { f, commutes }
    }

    pub fn commutes(&self) -> bool {
        match self {
            Op::Builtin(op) => op.commutes(),
            Op::Custom { commutes, .. } => *commutes,
        }
    }
}

impl<T: Reducible> Op<T> {
    /// Combine the contribution `a` of a lower rank with `b` of a higher one.
    pub fn apply(&self, a: &T, b: &T) -> Result<T> {
        match self {
            Op::Builtin(op) => T::combine(*op, a, b),
            Op::Custom { f, .. } => Ok(f(a, b)),
        }
    }
}

impl<T> Clone for Op<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Op<T> {}

impl<T> From<Builtin> for Op<T> {
    fn from(op: Builtin) -> Self {
        Op::Builtin(op)
    }
}

impl<T> std::fmt::Debug for Op<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::Builtin(op) => write!(f, "Op::Builtin({:?})", op),
            Op::Custom { commutes, .. } => write!(f, "Op::Custom {{ commutes: {} }}", commutes),
        }
    }
}

// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn integer_builtins() {
        let op = |b| Op::<i32>::builtin(b);
        assert_eq!(op(Builtin::Sum).apply(&3, &4).unwrap(), 7);
        assert_eq!(op(Builtin::Product).apply(&3, &4).unwrap(), 12);
        assert_eq!(op(Builtin::Max).apply(&3, &4).unwrap(), 4);
        assert_eq!(op(Builtin::Min).apply(&3, &4).unwrap(), 3);
        assert_eq!(op(Builtin::LogicalAnd).apply(&3, &0).unwrap(), 0);
        assert_eq!(op(Builtin::LogicalOr).apply(&3, &0).unwrap(), 1);
        assert_eq!(op(Builtin::LogicalXor).apply(&3, &5).unwrap(), 0);
        assert_eq!(op(Builtin::BitXor).apply(&3, &5).unwrap(), 6);
        assert_eq!(op(Builtin::Replace).apply(&3, &5).unwrap(), 5);
        assert_eq!(op(Builtin::NoOp).apply(&3, &5).unwrap(), 3);
        assert_eq!(Op::<u8>::builtin(Builtin::Sum).apply(&255, &1).unwrap(), 0);
        assert!(matches!(
            op(Builtin::MaxLoc).apply(&1, &2),
            Err(Error::Unsupported(Builtin::MaxLoc))
        ));
    }

    #[test]
    fn floats_reject_bitwise_operators() {
        assert_eq!(Op::builtin(Builtin::Sum).apply(&1.5, &2.0).unwrap(), 3.5);
        assert!(Op::<f64>::builtin(Builtin::BitAnd).apply(&1.0, &2.0).is_err());
        assert!(!Op::<bool>::builtin(Builtin::LogicalXor).apply(&true, &true).unwrap());
    }

    #[test]
    fn loc_ties_go_to_the_smaller_location() {
        let max = Op::builtin(Builtin::MaxLoc);
        let min = Op::builtin(Builtin::MinLoc);
        let a = Loc::new(2.0, 3);
        let b = Loc::new(2.0, 1);
        let c = Loc::new(-1.0, 5);
        assert_eq!(max.apply(&a, &b).unwrap(), b);
        assert_eq!(max.apply(&a, &c).unwrap(), a);
        assert_eq!(min.apply(&a, &c).unwrap(), c);
        assert_eq!(min.apply(&b, &a).unwrap(), b);
    }

    #[test]
    fn vectors_reduce_element_wise() {
        let sum = Op::builtin(Builtin::Sum);
        assert_eq!(sum.apply(&vec![1, 2], &vec![10, 20]).unwrap(), vec![11, 22]);
        assert!(matches!(
            sum.apply(&vec![1, 2], &vec![1]),
            Err(Error::LengthMismatch(2, 1))
        ));
    }

    #[test]
    fn custom_operators_keep_operand_order() {
        fn concat(a: &String, b: &String) -> String {
            format!("{}{}", a, b)
        }

        let op = Op::custom(concat, false);
        assert!(!op.commutes());
        assert_eq!(op.apply(&"ab".into(), &"cd".into()).unwrap(), "abcd");
        assert!(Op::<String>::builtin(Builtin::Sum).apply(&"a".into(), &"b".into()).is_err());
        assert!(Op::<i32>::from(Builtin::Sum).commutes());
        assert!(!Builtin::Replace.commutes());
    }
}
