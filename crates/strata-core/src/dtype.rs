use std::fmt;

use crate::storage::{Buffer, Storage};

// DType — Supported numeric element kinds
//
// Every array carries a DType so operators can be dispatched to the typed
// loop that matches its storage at runtime. Two families exist:
//
//   U8   — unsigned byte, for masks and small categorical codes
//   I32  — signed 32-bit int, for indices and counts
//   F32  — 32-bit float, the engine default
//   F64  — 64-bit float, for high-precision work and gradient checks
//
// Integer-like kinds support arithmetic, comparison and the seed/combine
// reductions. Floating-point-only operators (exp, log, tanh, softmax,
// variance, ...) refuse integer kinds with `Error::Unsupported`.

/// Element kind of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    U8,
    I32,
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::U8 => 1,
            DType::I32 => 4,
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }

    /// F32 or F64.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    /// Parse the lowercase name used by `Display` (`"f32"`, `"u8"`, ...).
    pub fn parse(name: &str) -> Option<DType> {
        match name.trim().to_ascii_lowercase().as_str() {
            "u8" => Some(DType::U8),
            "i32" => Some(DType::I32),
            "f32" => Some(DType::F32),
            "f64" => Some(DType::F64),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::U8 => "u8",
            DType::I32 => "i32",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}

// WithDType — Trait that connects Rust types to the DType enum
//
// Operator loops are written once, generic over `T: WithDType`, and
// monomorphized per kind. The trait also carries the element arithmetic
// so integer kinds can use wrapping semantics (a u8 mask minus one must not
// abort a whole forward pass) while floats follow IEEE rules.

/// Trait implemented by Rust types that can be stored in an array.
///
/// Element arithmetic lives on the trait; generic loops never use std ops
/// bounds.
pub trait WithDType: Copy + Send + Sync + 'static + PartialOrd + fmt::Debug + Default {
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert this value to f64 (for generic numeric code).
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64 (saturating for integers).
    fn from_f64(v: f64) -> Self;

    /// Wrap a typed buffer into the kind-tagged storage enum.
    fn into_storage(buffer: Buffer<Self>) -> Storage;

    /// Borrow the typed buffer if `storage` holds this kind.
    fn buffer(storage: &Storage) -> Option<&Buffer<Self>>;

    /// Mutably borrow the typed buffer if `storage` holds this kind.
    fn buffer_mut(storage: &mut Storage) -> Option<&mut Buffer<Self>>;

    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn div(self, rhs: Self) -> Self;

    /// True if the value is NaN (always false for integers).
    fn is_nan(self) -> bool {
        false
    }

    /// The zero value.
    fn zero() -> Self {
        Self::from_f64(0.0)
    }

    /// The one value.
    fn one() -> Self {
        Self::from_f64(1.0)
    }

    /// Smallest representable value, seed for `max` reductions.
    fn min_value() -> Self;

    /// Largest representable value, seed for `min` reductions.
    fn max_value() -> Self;
}

macro_rules! impl_storage_access {
    ($t:ty, $variant:ident) => {
        fn into_storage(buffer: Buffer<Self>) -> Storage {
            Storage::$variant(buffer)
        }

        fn buffer(storage: &Storage) -> Option<&Buffer<Self>> {
            match storage {
                Storage::$variant(b) => Some(b),
                _ => None,
            }
        }

        fn buffer_mut(storage: &mut Storage) -> Option<&mut Buffer<Self>> {
            match storage {
                Storage::$variant(b) => Some(b),
                _ => None,
            }
        }
    };
}

macro_rules! impl_float {
    ($t:ty, $variant:ident) => {
        impl WithDType for $t {
            const DTYPE: DType = DType::$variant;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(v: f64) -> Self {
                v as $t
            }

            impl_storage_access!($t, $variant);

            fn add(self, rhs: Self) -> Self {
                self + rhs
            }
            fn sub(self, rhs: Self) -> Self {
                self - rhs
            }
            fn mul(self, rhs: Self) -> Self {
                self * rhs
            }
            fn div(self, rhs: Self) -> Self {
                self / rhs
            }

            fn is_nan(self) -> bool {
                num_traits::Float::is_nan(self)
            }

            fn min_value() -> Self {
                num_traits::Float::neg_infinity()
            }

            fn max_value() -> Self {
                num_traits::Float::infinity()
            }
        }
    };
}

macro_rules! impl_int {
    ($t:ty, $variant:ident) => {
        impl WithDType for $t {
            const DTYPE: DType = DType::$variant;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(v: f64) -> Self {
                // `as` saturates and maps NaN to 0
                v as $t
            }

            impl_storage_access!($t, $variant);

            fn add(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }
            fn sub(self, rhs: Self) -> Self {
                self.wrapping_sub(rhs)
            }
            fn mul(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }
            fn div(self, rhs: Self) -> Self {
                self.checked_div(rhs).unwrap_or(0)
            }

            fn min_value() -> Self {
                <$t as num_traits::Bounded>::min_value()
            }

            fn max_value() -> Self {
                <$t as num_traits::Bounded>::max_value()
            }
        }
    };
}

impl_int!(u8, U8);
impl_int!(i32, I32);
impl_float!(f32, F32);
impl_float!(f64, F64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(DType::U8.size_in_bytes(), 1);
        assert_eq!(DType::I32.size_in_bytes(), 4);
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::F64.size_in_bytes(), 8);
    }

    #[test]
    fn test_dtype_is_float() {
        assert!(DType::F32.is_float());
        assert!(DType::F64.is_float());
        assert!(!DType::I32.is_float());
        assert!(!DType::U8.is_float());
    }

    #[test]
    fn test_parse_roundtrips_display() {
        for dt in [DType::U8, DType::I32, DType::F32, DType::F64] {
            assert_eq!(DType::parse(&dt.to_string()), Some(dt));
        }
        assert_eq!(DType::parse("F64 "), Some(DType::F64));
        assert_eq!(DType::parse("bf16"), None);
    }

    #[test]
    fn test_integer_arithmetic_does_not_trap() {
        assert_eq!(WithDType::sub(0u8, 1u8), 255);
        assert_eq!(WithDType::div(7i32, 0i32), 0);
        assert_eq!(WithDType::div(7i32, 2i32), 3);
        assert_eq!(u8::from_f64(-3.0), 0);
        assert_eq!(i32::from_f64(f64::NAN), 0);
    }

    #[test]
    fn test_float_arithmetic_follows_ieee() {
        assert!(WithDType::div(1.0f64, 0.0).is_infinite());
        assert!(WithDType::is_nan(WithDType::div(0.0f32, 0.0)));
    }
}
