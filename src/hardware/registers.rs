use std::fmt::{Debug, Formatter};

/// Registers addressable by instructions: eight general purpose ones and the stack pointer.
#[repr(u8)]
#[derive(enumn::N, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    Sp,
}

impl Register {
    pub const GENERAL_PURPOSE: [Self; 8] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
    ];
    pub const ALL: [Self; 9] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
        Self::Sp,
    ];

    /// General purpose register selected by a 3 bit instruction field, higher bits are ignored.
    #[must_use]
    pub const fn general(index: u16) -> Self {
        Self::GENERAL_PURPOSE[(index & 0b111) as usize]
    }
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::R0 => "r0",
            Self::R1 => "r1",
            Self::R2 => "r2",
            Self::R3 => "r3",
            Self::R4 => "r4",
            Self::R5 => "r5",
            Self::R6 => "r6",
            Self::R7 => "r7",
            Self::Sp => "sp",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterFile {
    values: [u32; Register::ALL.len()],
}

impl RegisterFile {
    #[must_use]
    pub const fn new(stack_pointer: u32) -> Self {
        let mut values = [0u32; Register::ALL.len()];
        values[Register::Sp as usize] = stack_pointer;
        Self { values }
    }
    #[must_use]
    pub const fn get(&self, r: Register) -> u32 {
        self.values[r as usize]
    }
    pub const fn set(&mut self, r: Register, value: u32) {
        self.values[r as usize] = value;
    }
    pub fn iter(&self) -> impl Iterator<Item = (Register, u32)> + '_ {
        Register::ALL.iter().map(|r| (*r, self.get(*r)))
    }
}

impl Debug for RegisterFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(r, v)| (r.name(), format!("{v:#06x}"))))
            .finish()
    }
}

/// Bit positions of the flag register `FR`.
#[repr(u8)]
#[derive(enumn::N, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Greater = 0,
    Lesser = 1,
    Equal = 2,
    Zero = 3,
    Carry = 4,
    Overflow = 5,
    DivByZero = 6,
    StackOverflow = 7,
    StackUnderflow = 8,
    Negative = 9,
}

/// Contents of the flag register, one bit per [`Flag`].
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags(u32);

impl StatusFlags {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
    #[must_use]
    pub const fn contains(self, flag: Flag) -> bool {
        self.0 >> (flag as u8) & 1 == 1
    }
    #[must_use]
    pub const fn with(self, flag: Flag, value: bool) -> Self {
        let bit = 1 << (flag as u8);
        if value {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }
    /// Flags that are currently set, lowest bit first.
    pub fn iter(self) -> impl Iterator<Item = Flag> {
        (0..16u8)
            .filter_map(Flag::n)
            .filter(move |flag| self.contains(*flag))
    }
}

impl Debug for StatusFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    #[gtest]
    pub fn test_register_from_field() {
        expect_that!(Register::general(0b101), eq(Register::R5));
        expect_that!(Register::general(0b1_011), eq(Register::R3));
        expect_that!(Register::n(8), some(eq(Register::Sp)));
        expect_that!(Register::n(9), none());
    }
    #[gtest]
    pub fn test_register_file() {
        let mut regs = RegisterFile::new(0x7FFF);
        regs.set(Register::R2, 42);
        expect_that!(regs.get(Register::R2), eq(42));
        expect_that!(regs.get(Register::Sp), eq(0x7FFF));
        expect_that!(regs.iter().count(), eq(9));
    }
    #[gtest]
    pub fn test_flags() {
        let flags = StatusFlags::default()
            .with(Flag::Zero, true)
            .with(Flag::Negative, true);
        expect_that!(flags.bits(), eq(0b10_0000_1000));
        expect_that!(flags.contains(Flag::Zero), eq(true));
        expect_that!(flags.contains(Flag::Carry), eq(false));
        let cleared = flags.with(Flag::Zero, false);
        assert_eq!(cleared.iter().collect::<Vec<_>>(), vec![Flag::Negative]);
    }
}
