//! Declaration qualifiers and declaration kinds.

use serde::Serialize;

/// Qualifier bitset of a declaration.
///
/// This changes the behavior of the declaration. The bit values are part of
/// the emitter contract and must stay stable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Qualifier(u8);

impl Qualifier {
    pub const NONE: Self = Self(0);
    /// May not be modified at run time.
    pub const CONST: Self = Self(1);
    /// Refers to a unique value in its scope. Function arguments only.
    pub const RESTRICT: Self = Self(1 << 1);
    /// Value may change outside of the compiler's view. Variables only.
    pub const VOLATILE: Self = Self(1 << 2);
    /// Usage gets replaced with the contents at build time. Functions only.
    pub const INLINE: Self = Self(1 << 3);
    /// Storage outlives the scope the declaration lives in.
    pub const STATIC: Self = Self(1 << 4);
    /// Not visible outside the module that declares it.
    pub const PRIVATE: Self = Self(1 << 5);

    #[inline]
    #[must_use]
    pub const fn has(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }

    #[inline]
    pub const fn set(&mut self, flag: Self) {
        self.0 |= flag.0;
    }

    #[inline]
    #[must_use]
    pub const fn union(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    /// Raw bit value, as exposed to the emitter.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_const(self) -> bool {
        self.has(Self::CONST)
    }

    #[inline]
    #[must_use]
    pub const fn is_restricted(self) -> bool {
        self.has(Self::RESTRICT)
    }

    #[inline]
    #[must_use]
    pub const fn is_volatile(self) -> bool {
        self.has(Self::VOLATILE)
    }

    #[inline]
    #[must_use]
    pub const fn is_inline(self) -> bool {
        self.has(Self::INLINE)
    }

    #[inline]
    #[must_use]
    pub const fn is_static(self) -> bool {
        self.has(Self::STATIC)
    }

    #[inline]
    #[must_use]
    pub const fn is_private(self) -> bool {
        self.has(Self::PRIVATE)
    }
}

/// How a declaration gets mangled, stored and used in the program.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum DeclKind {
    /// An Ehlit symbol, the default.
    #[default]
    Ehlit,
    /// A C symbol, as imported from a C header.
    C,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_values_are_stable() {
        assert_eq!(Qualifier::CONST.bits(), 1);
        assert_eq!(Qualifier::RESTRICT.bits(), 2);
        assert_eq!(Qualifier::VOLATILE.bits(), 4);
        assert_eq!(Qualifier::INLINE.bits(), 8);
        assert_eq!(Qualifier::STATIC.bits(), 16);
        assert_eq!(Qualifier::PRIVATE.bits(), 32);
    }

    #[test]
    fn test_union_and_predicates() {
        let q = Qualifier::CONST.union(Qualifier::PRIVATE);
        assert!(q.is_const());
        assert!(q.is_private());
        assert!(!q.is_static());
    }

    #[test]
    fn test_serializes_as_raw_bits() {
        let q = Qualifier::CONST.union(Qualifier::STATIC);
        let json = serde_json::to_string(&q).expect("qualifiers should serialize");
        assert_eq!(json, "17");
    }
}
