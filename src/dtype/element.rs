//! Element traits for mapping Rust types to DType

use super::DType;
use bytemuck::{Pod, Zeroable};
use std::ops::{Add, Div, Mul, Sub};

/// Trait for types that can be stored in a buffer
///
/// This trait connects Rust's type system to the runtime dtype system. It is
/// also the bound on the alpha/beta scalars of every dispatch function: the
/// scalar's `DTYPE` must equal the operands' dtype.
///
/// # Bounds
/// - `Copy + Send + Sync + 'static` - Basic trait requirements
/// - `Pod + Zeroable` - Safe memory transmutation (bytemuck)
/// - `PartialOrd` - Comparison
pub trait Element: Copy + Send + Sync + Pod + Zeroable + PartialOrd + 'static {
    /// The corresponding DType for this Rust type
    const DTYPE: DType;

    /// Convert to f64 for generic numeric operations
    fn to_f64(self) -> f64;

    /// Convert from f64 to this type
    fn from_f64(v: f64) -> Self;

    /// Zero value
    fn zero() -> Self;

    /// One value
    fn one() -> Self;
}

macro_rules! impl_element {
    ($t:ty, $dtype:expr, $zero:expr, $one:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn zero() -> Self {
                $zero
            }

            #[inline]
            fn one() -> Self {
                $one
            }
        }
    };
}

impl_element!(f64, DType::F64, 0.0, 1.0);
impl_element!(f32, DType::F32, 0.0, 1.0);
impl_element!(i64, DType::I64, 0, 1);
impl_element!(i32, DType::I32, 0, 1);

#[cfg(feature = "f16")]
impl Element for half::f16 {
    const DTYPE: DType = DType::F16;

    #[inline]
    fn to_f64(self) -> f64 {
        half::f16::to_f64(self)
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }

    #[inline]
    fn zero() -> Self {
        half::f16::ZERO
    }

    #[inline]
    fn one() -> Self {
        half::f16::ONE
    }
}

#[cfg(feature = "f16")]
impl Element for half::bf16 {
    const DTYPE: DType = DType::BF16;

    #[inline]
    fn to_f64(self) -> f64 {
        half::bf16::to_f64(self)
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        half::bf16::from_f64(v)
    }

    #[inline]
    fn zero() -> Self {
        half::bf16::ZERO
    }

    #[inline]
    fn one() -> Self {
        half::bf16::ONE
    }
}

/// Element types the kernels compute in (F32 and F64)
///
/// Backends are generic over this trait; every other dtype either goes
/// through a promoted working copy or is refused by the capability gate.
pub trait LinalgElement:
    Element
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
{
    /// Returns square root
    fn sqrt_val(self) -> Self;
    /// Returns absolute value
    fn abs_val(self) -> Self;
    /// Returns negation
    fn neg_val(self) -> Self;
}

impl LinalgElement for f32 {
    #[inline]
    fn sqrt_val(self) -> Self {
        self.sqrt()
    }
    #[inline]
    fn abs_val(self) -> Self {
        self.abs()
    }
    #[inline]
    fn neg_val(self) -> Self {
        -self
    }
}

impl LinalgElement for f64 {
    #[inline]
    fn sqrt_val(self) -> Self {
        self.sqrt()
    }
    #[inline]
    fn abs_val(self) -> Self {
        self.abs()
    }
    #[inline]
    fn neg_val(self) -> Self {
        -self
    }
}
