//! Numeric scalar payloads, as seen by the evaluation kernels.

use super::Literal;
use crate::ty::Scalar;

use half::f16;
use std::fmt;

/// A Rust type carrying the payload of a numeric [`Scalar`].
///
/// The `checked_*` operations return `None` when the exact result cannot be
/// represented: integer overflow, division by zero, or a float result that is
/// not finite.
pub trait Number: Copy + PartialEq + PartialOrd + fmt::Debug + 'static {
    const SCALAR: Scalar;
    const ZERO: Self;
    const ONE: Self;

    fn checked_add(self, rhs: Self) -> Option<Self>;
    fn checked_sub(self, rhs: Self) -> Option<Self>;
    fn checked_mul(self, rhs: Self) -> Option<Self>;
    fn checked_div(self, rhs: Self) -> Option<Self>;
    fn checked_rem(self, rhs: Self) -> Option<Self>;

    /// Two's complement arithmetic for integers, plain arithmetic for floats.
    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_mul(self, rhs: Self) -> Self;

    fn max(self, other: Self) -> Self;
    fn min(self, other: Self) -> Self;

    fn into_literal(self) -> Literal;
    fn from_literal(literal: Literal) -> Option<Self>;

    /// Does overflow wrap silently rather than being reported?
    fn wraps() -> bool {
        Self::SCALAR.is_integer() && !Self::SCALAR.is_abstract()
    }

    /// The literal formatted for diagnostics.
    fn display(self) -> String {
        self.into_literal().to_string()
    }
}

/// A floating-point [`Number`].
pub trait Float: Number {
    fn sqrt(self) -> Self;
    fn floor(self) -> Self;
    fn ceil(self) -> Self;
    fn trunc(self) -> Self;
    fn abs(self) -> Self;
    fn is_sign_negative(self) -> bool;
    fn to_f64(self) -> f64;
    /// Round `value` to this type, yielding `None` if it does not fit.
    fn from_f64(value: f64) -> Option<Self>;
}

macro_rules! impl_integer {
    ($ty:ty, $scalar:ident) => {
        impl Number for $ty {
            const SCALAR: Scalar = Scalar::$scalar;
            const ZERO: Self = 0;
            const ONE: Self = 1;

            fn checked_add(self, rhs: Self) -> Option<Self> {
                <$ty>::checked_add(self, rhs)
            }
            fn checked_sub(self, rhs: Self) -> Option<Self> {
                <$ty>::checked_sub(self, rhs)
            }
            fn checked_mul(self, rhs: Self) -> Option<Self> {
                <$ty>::checked_mul(self, rhs)
            }
            fn checked_div(self, rhs: Self) -> Option<Self> {
                <$ty>::checked_div(self, rhs)
            }
            fn checked_rem(self, rhs: Self) -> Option<Self> {
                <$ty>::checked_rem(self, rhs)
            }
            fn wrapping_add(self, rhs: Self) -> Self {
                <$ty>::wrapping_add(self, rhs)
            }
            fn wrapping_sub(self, rhs: Self) -> Self {
                <$ty>::wrapping_sub(self, rhs)
            }
            fn wrapping_mul(self, rhs: Self) -> Self {
                <$ty>::wrapping_mul(self, rhs)
            }
            fn max(self, other: Self) -> Self {
                Ord::max(self, other)
            }
            fn min(self, other: Self) -> Self {
                Ord::min(self, other)
            }
            fn into_literal(self) -> Literal {
                Literal::$scalar(self)
            }
            fn from_literal(literal: Literal) -> Option<Self> {
                match literal {
                    Literal::$scalar(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_integer!(i32, I32);
impl_integer!(u32, U32);
impl_integer!(i64, AbstractInt);

macro_rules! impl_float {
    ($ty:ty, $scalar:ident) => {
        impl Number for $ty {
            const SCALAR: Scalar = Scalar::$scalar;
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            fn checked_add(self, rhs: Self) -> Option<Self> {
                finite(self + rhs)
            }
            fn checked_sub(self, rhs: Self) -> Option<Self> {
                finite(self - rhs)
            }
            fn checked_mul(self, rhs: Self) -> Option<Self> {
                finite(self * rhs)
            }
            fn checked_div(self, rhs: Self) -> Option<Self> {
                finite(self / rhs)
            }
            fn checked_rem(self, rhs: Self) -> Option<Self> {
                finite(self % rhs)
            }
            fn wrapping_add(self, rhs: Self) -> Self {
                self + rhs
            }
            fn wrapping_sub(self, rhs: Self) -> Self {
                self - rhs
            }
            fn wrapping_mul(self, rhs: Self) -> Self {
                self * rhs
            }
            fn max(self, other: Self) -> Self {
                <$ty>::max(self, other)
            }
            fn min(self, other: Self) -> Self {
                <$ty>::min(self, other)
            }
            fn into_literal(self) -> Literal {
                Literal::$scalar(self)
            }
            fn from_literal(literal: Literal) -> Option<Self> {
                match literal {
                    Literal::$scalar(v) => Some(v),
                    _ => None,
                }
            }
        }

        impl Float for $ty {
            fn sqrt(self) -> Self {
                <$ty>::sqrt(self)
            }
            fn floor(self) -> Self {
                <$ty>::floor(self)
            }
            fn ceil(self) -> Self {
                <$ty>::ceil(self)
            }
            fn trunc(self) -> Self {
                <$ty>::trunc(self)
            }
            fn abs(self) -> Self {
                <$ty>::abs(self)
            }
            fn is_sign_negative(self) -> bool {
                <$ty>::is_sign_negative(self)
            }
            fn to_f64(self) -> f64 {
                self.into()
            }
            fn from_f64(value: f64) -> Option<Self> {
                let rounded = value as $ty;
                (rounded.is_finite() || !value.is_finite()).then_some(rounded)
            }
        }
    };
}

impl_float!(f32, F32);
impl_float!(f64, AbstractFloat);

fn finite<F: Into<f64> + Copy>(value: F) -> Option<F> {
    value.into().is_finite().then_some(value)
}

/// `f16` arithmetic is carried out in `f32` and rounded back.
fn f16_op(a: f16, b: f16, op: impl Fn(f32, f32) -> f32) -> f16 {
    f16::from_f32(op(a.to_f32(), b.to_f32()))
}

fn finite_f16(value: f16) -> Option<f16> {
    value.is_finite().then_some(value)
}

impl Number for f16 {
    const SCALAR: Scalar = Scalar::F16;
    const ZERO: Self = f16::ZERO;
    const ONE: Self = f16::ONE;

    fn checked_add(self, rhs: Self) -> Option<Self> {
        finite_f16(f16_op(self, rhs, |a, b| a + b))
    }
    fn checked_sub(self, rhs: Self) -> Option<Self> {
        finite_f16(f16_op(self, rhs, |a, b| a - b))
    }
    fn checked_mul(self, rhs: Self) -> Option<Self> {
        finite_f16(f16_op(self, rhs, |a, b| a * b))
    }
    fn checked_div(self, rhs: Self) -> Option<Self> {
        finite_f16(f16_op(self, rhs, |a, b| a / b))
    }
    fn checked_rem(self, rhs: Self) -> Option<Self> {
        finite_f16(f16_op(self, rhs, |a, b| a % b))
    }
    fn wrapping_add(self, rhs: Self) -> Self {
        f16_op(self, rhs, |a, b| a + b)
    }
    fn wrapping_sub(self, rhs: Self) -> Self {
        f16_op(self, rhs, |a, b| a - b)
    }
    fn wrapping_mul(self, rhs: Self) -> Self {
        f16_op(self, rhs, |a, b| a * b)
    }
    fn max(self, other: Self) -> Self {
        f16::from_f32(self.to_f32().max(other.to_f32()))
    }
    fn min(self, other: Self) -> Self {
        f16::from_f32(self.to_f32().min(other.to_f32()))
    }
    fn into_literal(self) -> Literal {
        Literal::F16(self)
    }
    fn from_literal(literal: Literal) -> Option<Self> {
        match literal {
            Literal::F16(v) => Some(v),
            _ => None,
        }
    }
}

impl Float for f16 {
    fn sqrt(self) -> Self {
        f16::from_f32(self.to_f32().sqrt())
    }
    fn floor(self) -> Self {
        f16::from_f32(self.to_f32().floor())
    }
    fn ceil(self) -> Self {
        f16::from_f32(self.to_f32().ceil())
    }
    fn trunc(self) -> Self {
        f16::from_f32(self.to_f32().trunc())
    }
    fn abs(self) -> Self {
        f16::from_f32(self.to_f32().abs())
    }
    fn is_sign_negative(self) -> bool {
        f16::is_sign_negative(self)
    }
    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }
    fn from_f64(value: f64) -> Option<Self> {
        let rounded = f16::from_f64(value);
        (rounded.is_finite() || !value.is_finite()).then_some(rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concrete_integers_wrap() {
        assert!(i32::wraps());
        assert!(u32::wraps());
        assert!(!i64::wraps());
        assert!(!f32::wraps());
        assert_eq!(Number::wrapping_add(i32::MAX, 1), i32::MIN);
        assert_eq!(Number::wrapping_sub(0u32, 1), u32::MAX);
    }

    #[test]
    fn checked_floats() {
        assert_eq!(Number::checked_add(1.0f32, 2.0), Some(3.0));
        assert_eq!(Number::checked_mul(f32::MAX, 2.0), None);
        assert_eq!(Number::checked_div(1.0f64, 0.0), None);
        assert_eq!(Number::checked_rem(1.0f32, 0.0), None);
        let big = f16::from_f32(60000.0);
        assert_eq!(Number::checked_add(big, big), None);
        assert_eq!(
            Number::checked_add(f16::ONE, f16::ONE),
            Some(f16::from_f32(2.0))
        );
    }

    #[test]
    fn narrowing() {
        assert_eq!(<f32 as Float>::from_f64(1.5), Some(1.5));
        assert_eq!(<f32 as Float>::from_f64(1e300), None);
        assert_eq!(<f16 as Float>::from_f64(70000.0), None);
    }

    #[test]
    fn literals() {
        assert_eq!(5i32.into_literal(), Literal::I32(5));
        assert_eq!(u32::from_literal(Literal::I32(5)), None);
        assert_eq!(2.5f64.display(), "2.5");
    }
}
