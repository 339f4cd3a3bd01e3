//! Describing data
//!
//! Messages carry slices of plain values. A type that may travel in a message implements
//! `Equivalence`; the built-in integer primitives do. Types that a reduction or scan can combine
//! additionally implement `Arithmetic`, which supplies the identities and the wrapping
//! two's-complement operations the built-in operations are defined in terms of.
//!
//! With the `mpi` cargo feature enabled, `Equivalence` also requires the `mpi` crate's
//! equivalence so that the same element types can be handed to a native MPI library.

use std::fmt::Debug;

/// Datatype traits
pub mod traits {
    pub use super::{Arithmetic, Equivalence};
}

#[cfg(feature = "mpi")]
mod native {
    /// Element types that also have an equivalent MPI datatype
    pub trait NativeDatatype: mpi::datatype::Equivalence {}
    impl<T: mpi::datatype::Equivalence> NativeDatatype for T {}
}

#[cfg(not(feature = "mpi"))]
mod native {
    /// Element types that also have an equivalent MPI datatype
    pub trait NativeDatatype {}
    impl<T> NativeDatatype for T {}
}

pub use self::native::NativeDatatype;

/// A type whose values can be sent in a message
///
/// Values are copied bit for bit between processes, so only plain data qualifies.
pub trait Equivalence: Copy + Default + Send + Debug + PartialEq + 'static + NativeDatatype {
    /// Short name of the type, reported when a message carries another type
    const NAME: &'static str;
}

/// A type that the built-in operations can combine
pub trait Arithmetic: Equivalence + Ord {
    /// The additive identity
    const ZERO: Self;
    /// The multiplicative identity
    const ONE: Self;
    /// Smallest representable value, identity of `max`
    const MIN: Self;
    /// Largest representable value, identity of `min`
    const MAX: Self;

    /// Two's-complement addition
    fn wrapping_add(self, other: Self) -> Self;
    /// Two's-complement subtraction
    fn wrapping_sub(self, other: Self) -> Self;
    /// Two's-complement multiplication
    fn wrapping_mul(self, other: Self) -> Self;
}

macro_rules! equivalent_integer {
    ($($rstype:ident),*) => ($(
        impl Equivalence for $rstype {
            const NAME: &'static str = stringify!($rstype);
        }

        impl Arithmetic for $rstype {
            const ZERO: Self = 0;
            const ONE: Self = 1;
            const MIN: Self = $rstype::MIN;
            const MAX: Self = $rstype::MAX;

            fn wrapping_add(self, other: Self) -> Self {
                $rstype::wrapping_add(self, other)
            }

            fn wrapping_sub(self, other: Self) -> Self {
                $rstype::wrapping_sub(self, other)
            }

            fn wrapping_mul(self, other: Self) -> Self {
                $rstype::wrapping_mul(self, other)
            }
        }
    )*)
}

equivalent_integer!(i8, i16, i32, i64, u8, u16, u32, u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_wraps() {
        assert_eq!(Arithmetic::wrapping_add(i32::MAX, 1), i32::MIN);
        assert_eq!(Arithmetic::wrapping_sub(0u8, 1), u8::MAX);
        assert_eq!(<i64 as Arithmetic>::ZERO, 0);
        assert_eq!(<u16 as Arithmetic>::MAX, u16::MAX);
    }

    #[test]
    fn names() {
        assert_eq!(<i64 as Equivalence>::NAME, "i64");
        assert_eq!(<u8 as Equivalence>::NAME, "u8");
    }
}
