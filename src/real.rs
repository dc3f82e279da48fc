//! Arbitrary-precision real number backing every shadow value.
//!
//! This is the concrete implementation of the opaque `Real` collaborator
//! named in the specification: a binary floating-point value with enough
//! precision that rounding error in the shadow computation itself is
//! negligible next to the concrete float error being measured. Precision is
//! fixed per [`FloatKind`] at construction, matching the original tool's
//! per-kind MPFR precision.

use dashu_float::{
    round::mode::HalfEven,
    Context,
    FBig,
};
use strum::EnumIter;

/// Binary arbitrary-precision float, rounded half-to-even.
type Big = FBig<HalfEven, 2>;

/// Precision, in significant bits, used to shadow a concrete `f32`. Chosen
/// generously above the 24 bits of an IEEE single so that the shadow
/// computation itself never becomes the dominant source of error.
const SINGLE_PRECISION_BITS: usize = 120;

/// Precision used to shadow a concrete `f64`: comfortably above the 53 bits
/// of an IEEE double.
const DOUBLE_PRECISION_BITS: usize = 240;

/// Which concrete IEEE precision a shadow value mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum FloatKind {
    /// 32-bit IEEE float.
    Single,
    /// 64-bit IEEE double.
    Double,
}

impl FloatKind {
    /// Number of 4-byte blocks one value of this kind occupies.
    pub const fn blocks(self) -> usize {
        match self {
            FloatKind::Single => 1,
            FloatKind::Double => 2,
        }
    }

    fn precision_bits(self) -> usize {
        match self {
            FloatKind::Single => SINGLE_PRECISION_BITS,
            FloatKind::Double => DOUBLE_PRECISION_BITS,
        }
    }

    fn context(self) -> Context<HalfEven> {
        Context::new(self.precision_bits())
    }
}

/// An arbitrary-precision real value, always owned by exactly one
/// [`crate::value::ShadowValue`].
#[derive(Debug, Clone)]
pub struct Real {
    value: Big,
    kind: FloatKind,
}

impl Real {
    /// Build a real from a concrete double, rounding it into `kind`'s
    /// working precision.
    pub fn from_f64(kind: FloatKind, concrete: f64) -> Self {
        let ctx = kind.context();
        let value = ctx
            .convert_from_f64(concrete)
            .value();
        Real { value, kind }
    }

    /// Zero of the given kind.
    pub fn zero(kind: FloatKind) -> Self {
        Real::from_f64(kind, 0.0)
    }

    /// The float kind this real is shadowing.
    pub fn kind(&self) -> FloatKind {
        self.kind
    }

    /// Reduce to the nearest `f64`, the reference point for ULP error.
    pub fn get_double(&self) -> f64 {
        self.value.to_f64().value()
    }

    /// True if this real is NaN.
    pub fn is_nan(&self) -> bool {
        self.value.is_nan()
    }

    /// True if this real is positive or negative infinity.
    pub fn is_infinite(&self) -> bool {
        self.value.is_infinite()
    }

    fn ctx(&self) -> Context<HalfEven> {
        self.kind.context()
    }

    /// `self + other`, result shadowed at `self`'s kind.
    pub fn add(&self, other: &Real) -> Real {
        Real {
            value: self.ctx().add(&self.value, &other.value).value(),
            kind: self.kind,
        }
    }

    /// `self - other`.
    pub fn sub(&self, other: &Real) -> Real {
        Real {
            value: self.ctx().sub(&self.value, &other.value).value(),
            kind: self.kind,
        }
    }

    /// `self * other`.
    pub fn mul(&self, other: &Real) -> Real {
        Real {
            value: self.ctx().mul(&self.value, &other.value).value(),
            kind: self.kind,
        }
    }

    /// `self / other`.
    pub fn div(&self, other: &Real) -> Real {
        Real {
            value: self.ctx().div(&self.value, &other.value).value(),
            kind: self.kind,
        }
    }

    /// `-self`.
    pub fn neg(&self) -> Real {
        Real {
            value: -self.value.clone(),
            kind: self.kind,
        }
    }

    /// `|self|`.
    pub fn abs(&self) -> Real {
        Real {
            value: self.value.clone().abs(),
            kind: self.kind,
        }
    }

    /// `sqrt(self)`.
    pub fn sqrt(&self) -> Real {
        Real {
            value: self.ctx().sqrt(&self.value).value(),
            kind: self.kind,
        }
    }

    /// Fused multiply-add: `self * b + c`. Each step still rounds to this
    /// kind's working precision rather than truly fusing into one rounding,
    /// but that precision sits so far above the shadowed double/single
    /// that the difference is negligible next to the error being measured.
    pub fn fma(&self, b: &Real, c: &Real) -> Real {
        let ctx = self.ctx();
        let product = ctx.mul(&self.value, &b.value).value();
        Real {
            value: ctx.add(&product, &c.value).value(),
            kind: self.kind,
        }
    }

    /// Apply a unary transcendental function evaluated by the host's libm
    /// replacement (sin, cos, exp, log, ...), re-rounding the `f64` result
    /// of that evaluation into this kind's working precision. The real
    /// computation itself is delegated to the host because the symbolic
    /// engine only needs a best-effort reference value to compute error
    /// against, not a high-precision transcendental implementation.
    pub fn apply_f64(kind: FloatKind, result: f64) -> Real {
        Real::from_f64(kind, result)
    }
}

impl PartialEq for Real {
    fn eq(&self, other: &Self) -> bool {
        self.get_double() == other.get_double()
    }
}
