//! Pluggable mapping from opcodes to their definitions.
use crate::emulator::instruction::{InstructionWord, Operand};
use crate::emulator::opcodes::{self, Operation, listing};
use crate::errors::Fault;
use crate::hardware::Effect;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

/// Opcodes of the ICMC instruction set, bits 15..10 of an instruction.
pub mod codes {
    pub const NOP: u8 = 0;
    pub const JMP: u8 = 2;
    pub const CALL: u8 = 3;
    pub const RTS: u8 = 4;
    pub const PUSH: u8 = 5;
    pub const POP: u8 = 6;
    pub const SETC: u8 = 8;
    pub const BREAKP: u8 = 14;
    pub const HALT: u8 = 15;
    pub const SHIFT: u8 = 16;
    pub const AND: u8 = 18;
    pub const OR: u8 = 19;
    pub const XOR: u8 = 20;
    pub const NOT: u8 = 21;
    pub const CMP: u8 = 22;
    pub const ADD: u8 = 32;
    pub const SUB: u8 = 33;
    pub const MUL: u8 = 34;
    pub const DIV: u8 = 35;
    pub const INC: u8 = 36;
    pub const MOD: u8 = 37;
    pub const LOAD: u8 = 48;
    pub const STORE: u8 = 49;
    pub const OUTCHAR: u8 = 50;
    pub const MOV: u8 = 51;
    pub const INCHAR: u8 = 53;
    pub const LOADN: u8 = 56;
    pub const LOADI: u8 = 60;
    pub const STOREI: u8 = 61;
}

pub type ExecuteFn = fn(&Operation<'_>) -> Result<Effect, Fault>;
pub type OperandsFn = fn(InstructionWord, Option<u32>) -> Vec<Operand>;

/// How an opcode renders its mnemonic.
#[derive(Clone, Copy)]
pub enum Mnemonic {
    Fixed(&'static str),
    /// Mnemonic depends on further instruction bits, e.g. jump conditions.
    Decoded(fn(InstructionWord) -> String),
}

/// Definition of one opcode.
#[derive(Clone, Copy)]
pub struct OpcodeDef {
    pub mnemonic: Mnemonic,
    /// Memory words occupied, 1 or 2.
    pub words: usize,
    /// The keyboard is polled before executing this opcode.
    pub reads_input: bool,
    pub operands: OperandsFn,
    pub execute: ExecuteFn,
}

impl OpcodeDef {
    #[must_use]
    pub const fn new(mnemonic: &'static str, operands: OperandsFn, execute: ExecuteFn) -> Self {
        Self {
            mnemonic: Mnemonic::Fixed(mnemonic),
            words: 1,
            reads_input: false,
            operands,
            execute,
        }
    }
    #[must_use]
    pub const fn decoded(
        mnemonic: fn(InstructionWord) -> String,
        operands: OperandsFn,
        execute: ExecuteFn,
    ) -> Self {
        Self {
            mnemonic: Mnemonic::Decoded(mnemonic),
            ..Self::new("", operands, execute)
        }
    }
    /// Instruction followed by an operand word.
    #[must_use]
    pub const fn two_words(mut self) -> Self {
        self.words = 2;
        self
    }
    #[must_use]
    pub const fn reading_input(mut self) -> Self {
        self.reads_input = true;
        self
    }
    #[must_use]
    pub fn mnemonic(&self, word: InstructionWord) -> String {
        match self.mnemonic {
            Mnemonic::Fixed(name) => name.to_string(),
            Mnemonic::Decoded(f) => f(word),
        }
    }
}

impl Debug for OpcodeDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self.mnemonic {
            Mnemonic::Fixed(name) => name,
            Mnemonic::Decoded(_) => "<decoded>",
        };
        f.debug_struct("OpcodeDef")
            .field("mnemonic", &name)
            .field("words", &self.words)
            .field("reads_input", &self.reads_input)
            .finish_non_exhaustive()
    }
}

/// Opcodes known to the executor, looked up by the 6 bit opcode field.
#[derive(Debug, Clone, Default)]
pub struct OpcodeTable {
    defs: BTreeMap<u8, OpcodeDef>,
}

impl OpcodeTable {
    /// Bits of an instruction word, the data width of a program must be at least this.
    pub const INSTRUCTION_BITS: u32 = 16;

    /// Table without any opcode.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The ICMC instruction set.
    #[must_use]
    pub fn icmc() -> Self {
        let mut table = Self::empty();
        let defs = [
            (codes::LOAD, OpcodeDef::new("load", listing::rx_address, opcodes::load).two_words()),
            (codes::STORE, OpcodeDef::new("store", listing::address_rx, opcodes::store).two_words()),
            (codes::LOADN, OpcodeDef::new("loadn", listing::rx_immediate, opcodes::loadn).two_words()),
            (codes::LOADI, OpcodeDef::new("loadi", listing::rx_ry, opcodes::loadi)),
            (codes::STOREI, OpcodeDef::new("storei", listing::rx_ry, opcodes::storei)),
            (codes::MOV, OpcodeDef::new("mov", listing::mov, opcodes::mov)),
            (codes::OUTCHAR, OpcodeDef::new("outchar", listing::rx_ry, opcodes::outchar)),
            (codes::INCHAR, OpcodeDef::new("inchar", listing::rx, opcodes::inchar).reading_input()),
            (codes::ADD, OpcodeDef::decoded(listing::add_mnemonic, listing::rx_ry_rz, opcodes::add)),
            (codes::SUB, OpcodeDef::decoded(listing::sub_mnemonic, listing::rx_ry_rz, opcodes::sub)),
            (codes::MUL, OpcodeDef::new("mul", listing::rx_ry_rz, opcodes::mul)),
            (codes::DIV, OpcodeDef::new("div", listing::rx_ry_rz, opcodes::div)),
            (codes::MOD, OpcodeDef::new("mod", listing::rx_ry_rz, opcodes::modulo)),
            (codes::INC, OpcodeDef::decoded(listing::inc_mnemonic, listing::rx, opcodes::inc_or_dec)),
            (codes::AND, OpcodeDef::new("and", listing::rx_ry_rz, opcodes::and)),
            (codes::OR, OpcodeDef::new("or", listing::rx_ry_rz, opcodes::or)),
            (codes::XOR, OpcodeDef::new("xor", listing::rx_ry_rz, opcodes::xor)),
            (codes::NOT, OpcodeDef::new("not", listing::rx_ry, opcodes::not)),
            (codes::SHIFT, OpcodeDef::decoded(listing::shift_mnemonic, listing::rx_amount, opcodes::shift)),
            (codes::CMP, OpcodeDef::new("cmp", listing::rx_ry, opcodes::cmp)),
            (codes::JMP, OpcodeDef::decoded(listing::jump_mnemonic, listing::target, opcodes::jump).two_words()),
            (codes::CALL, OpcodeDef::decoded(listing::call_mnemonic, listing::target, opcodes::call).two_words()),
            (codes::RTS, OpcodeDef::new("rts", listing::none, opcodes::rts)),
            (codes::PUSH, OpcodeDef::new("push", listing::stack, opcodes::push)),
            (codes::POP, OpcodeDef::new("pop", listing::stack, opcodes::pop)),
            (codes::SETC, OpcodeDef::decoded(listing::carry_mnemonic, listing::none, opcodes::set_carry)),
            (codes::BREAKP, OpcodeDef::new("breakp", listing::none, opcodes::breakp)),
            (codes::HALT, OpcodeDef::new("halt", listing::none, opcodes::halt)),
            (codes::NOP, OpcodeDef::new("nop", listing::none, opcodes::nop)),
        ];
        for (code, def) in defs {
            table.insert(code, def);
        }
        table
    }

    /// Adds or replaces the definition of `opcode`, returns the replaced one.
    pub fn insert(&mut self, opcode: u8, def: OpcodeDef) -> Option<OpcodeDef> {
        self.defs.insert(opcode, def)
    }
    pub fn remove(&mut self, opcode: u8) -> Option<OpcodeDef> {
        self.defs.remove(&opcode)
    }
    #[must_use]
    pub fn get(&self, opcode: u8) -> Option<&OpcodeDef> {
        self.defs.get(&opcode)
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
    pub fn opcodes(&self) -> impl Iterator<Item = u8> + '_ {
        self.defs.keys().copied()
    }
}
