//! Fixed-width two's complement arithmetic at the data width declared by a program.

/// Number of bits of a machine word, between 1 and 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataWidth(u32);

/// Result of an arithmetic operation together with the conditions it raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arith {
    pub value: u32,
    pub carry: bool,
    pub overflow: bool,
}

impl DataWidth {
    pub const MAX_BITS: u32 = 32;

    /// Returns `None` for widths outside `1..=32`.
    #[must_use]
    pub const fn new(bits: u32) -> Option<Self> {
        if bits == 0 || bits > Self::MAX_BITS {
            None
        } else {
            Some(Self(bits))
        }
    }
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
    #[must_use]
    pub const fn mask(self) -> u32 {
        if self.0 == Self::MAX_BITS {
            u32::MAX
        } else {
            (1 << self.0) - 1
        }
    }
    #[must_use]
    pub const fn truncate(self, value: u64) -> u32 {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "the mask keeps at most 32 bits"
        )]
        let res = (value & self.mask() as u64) as u32;
        res
    }
    #[must_use]
    pub const fn fits(self, value: u64) -> bool {
        value <= self.mask() as u64
    }
    #[must_use]
    pub const fn is_negative(self, value: u32) -> bool {
        (value >> (self.0 - 1)) & 1 == 1
    }
    /// Interprets `value` as two's complement number of this width.
    #[must_use]
    pub const fn to_signed(self, value: u32) -> i64 {
        let value = value & self.mask();
        if self.is_negative(value) {
            value as i64 - (1i64 << self.0)
        } else {
            value as i64
        }
    }
    /// Two's complement encoding of `value`, `None` if it needs more bits.
    #[must_use]
    pub const fn encode_signed(self, value: i64) -> Option<u32> {
        let min = -(1i64 << (self.0 - 1));
        if value < min || value > self.mask() as i64 {
            return None;
        }
        #[expect(clippy::cast_sign_loss, reason = "wrapping into two's complement")]
        let bits = value as u64;
        Some(self.truncate(bits))
    }

    /// `a + b + carry_in`, carry out of the top bit and signed overflow.
    #[must_use]
    pub const fn add(self, a: u32, b: u32, carry_in: bool) -> Arith {
        let (a, b) = (a & self.mask(), b & self.mask());
        let full = a as u64 + b as u64 + carry_in as u64;
        let value = self.truncate(full);
        let overflow = self.is_negative(a) == self.is_negative(b)
            && self.is_negative(value) != self.is_negative(a);
        Arith {
            value,
            carry: full > self.mask() as u64,
            overflow,
        }
    }
    /// `a - b - borrow_in`; `carry` reports a borrow.
    #[must_use]
    pub const fn sub(self, a: u32, b: u32, borrow_in: bool) -> Arith {
        let (a, b) = (a & self.mask(), b & self.mask());
        let subtrahend = b as u64 + borrow_in as u64;
        let value = self.truncate((a as u64).wrapping_sub(subtrahend));
        let overflow = self.is_negative(a) != self.is_negative(b)
            && self.is_negative(value) != self.is_negative(a);
        Arith {
            value,
            carry: (a as u64) < subtrahend,
            overflow,
        }
    }
    /// Unsigned product, `overflow` when the high half is not zero.
    #[must_use]
    pub const fn mul(self, a: u32, b: u32) -> Arith {
        let full = (a & self.mask()) as u64 * (b & self.mask()) as u64;
        Arith {
            value: self.truncate(full),
            carry: false,
            overflow: full > self.mask() as u64,
        }
    }
}
