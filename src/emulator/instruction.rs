use crate::hardware::registers::Register;
use std::fmt::{Debug, Display, Formatter};

/// Wrapper for the low 16 bits of an ICMC instruction word.
/// format is: `OOOOOO_XXX_YYY_ZZZ_C`
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct InstructionWord(u16);

impl InstructionWord {
    /// Gives the value of only the specified bit range.
    ///
    /// # Parameters
    /// - `from`: starting index
    /// - `to`: end index (inclusive), mut be greater or equal to `from`
    ///
    /// # Panics
    /// - asserts that to is greater or equal from and both are valid indexes
    #[must_use]
    pub fn get_bit_range(self, from: u8, to: u8) -> u16 {
        debug_assert!(
            to >= from,
            "wrong direction of from: {from:?} and to: {to:?}"
        );
        debug_assert!(
            (00..u16::BITS).contains(&u32::from(to)),
            "index: {to:?} to u16 is greater than maximum value {:?}",
            u16::BITS - 1
        );
        let width = u32::from(to - from) + 1;
        (self.0 >> from) & (u16::MAX >> (u16::BITS - width))
    }
    #[must_use]
    pub fn get_bit(self, index: u8) -> bool {
        self.get_bit_range(index, index) & 1 != 0
    }
    #[must_use]
    pub fn op_code(self) -> u8 {
        // 6 bit field
        #[expect(clippy::cast_possible_truncation)]
        let op = self.get_bit_range(10, 15) as u8;
        op
    }
    #[must_use]
    pub fn rx(self) -> Register {
        Register::general(self.get_bit_range(7, 9))
    }
    #[must_use]
    pub fn ry(self) -> Register {
        Register::general(self.get_bit_range(4, 6))
    }
    #[must_use]
    pub fn rz(self) -> Register {
        Register::general(self.get_bit_range(1, 3))
    }
    /// `C` bit selecting the carry variants `ADDC`/`SUBC`.
    #[must_use]
    pub fn with_carry(self) -> bool {
        self.get_bit(0)
    }
    /// Condition field of jumps and calls.
    #[must_use]
    pub fn condition_code(self) -> u16 {
        self.get_bit_range(6, 9)
    }
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }
}

impl Debug for InstructionWord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Op: {:06b}, X: {:03b}, Y: {:03b}, Z: {:03b}, C: {}",
            self.op_code(),
            self.get_bit_range(7, 9),
            self.get_bit_range(4, 6),
            self.get_bit_range(1, 3),
            u8::from(self.with_carry())
        )
    }
}

impl From<u16> for InstructionWord {
    fn from(bits: u16) -> Self {
        Self(bits)
    }
}

impl From<u32> for InstructionWord {
    /// Words wider than 16 bits carry the instruction in their low half.
    fn from(word: u32) -> Self {
        #[expect(clippy::cast_possible_truncation)]
        let low = word as u16;
        Self(low)
    }
}

/// Operand of a decoded instruction, as shown in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Register(Register),
    FlagRegister,
    Immediate(u32),
    Address(u32),
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(r) => write!(f, "{}", r.name()),
            Self::FlagRegister => write!(f, "fr"),
            Self::Immediate(n) => write!(f, "#{n}"),
            Self::Address(a) => write!(f, "{a:#06x}"),
        }
    }
}

/// One decoded instruction of a program listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub address: usize,
    pub opcode: u8,
    pub mnemonic: String,
    /// Fixed number of operands per opcode.
    pub operands: Vec<Operand>,
    /// Number of memory words occupied, 1 or 2.
    pub words: usize,
    /// Line in the program file that initialized `address`.
    pub source_line: Option<usize>,
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}: {}", self.address, self.mnemonic)?;
        for (idx, operand) in self.operands.iter().enumerate() {
            let separator = if idx == 0 { " " } else { ", " };
            write!(f, "{separator}{operand}")?;
        }
        Ok(())
    }
}
