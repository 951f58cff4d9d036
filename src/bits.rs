//! Shared operator plumbing for the small typed bitsets used by the crate.

/// Implements the full bitwise operator set for a single-field tuple struct
/// wrapping an unsigned integer.
macro_rules! impl_bit_ops {
    ($ty:ident) => {
        impl std::ops::BitOr for $ty {
            type Output = $ty;

            fn bitor(self, rhs: $ty) -> $ty {
                $ty(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $ty {
            fn bitor_assign(&mut self, rhs: $ty) {
                self.0 |= rhs.0;
            }
        }

        impl std::ops::BitAnd for $ty {
            type Output = $ty;

            fn bitand(self, rhs: $ty) -> $ty {
                $ty(self.0 & rhs.0)
            }
        }

        impl std::ops::BitAndAssign for $ty {
            fn bitand_assign(&mut self, rhs: $ty) {
                self.0 &= rhs.0;
            }
        }

        impl std::ops::BitXor for $ty {
            type Output = $ty;

            fn bitxor(self, rhs: $ty) -> $ty {
                $ty(self.0 ^ rhs.0)
            }
        }

        impl std::ops::BitXorAssign for $ty {
            fn bitxor_assign(&mut self, rhs: $ty) {
                self.0 ^= rhs.0;
            }
        }

        impl std::ops::Not for $ty {
            type Output = $ty;

            fn not(self) -> $ty {
                $ty(!self.0)
            }
        }
    };
}

pub(crate) use impl_bit_ops;
