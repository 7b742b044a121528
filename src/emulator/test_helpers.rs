use crate::format::Program;
use crate::hardware::ExecutionState;
use crate::hardware::registers::Register;
use crate::numbers::DataWidth;
use std::fmt::Write;

/// Depth of the memory of test programs.
pub const DEPTH: usize = 64;

/// MIF text placing `words` from address 0 on, one record per line starting at line 6.
pub fn mif(words: &[u32]) -> String {
    let mut text = format!("WIDTH=16;\nDEPTH={DEPTH};\nADDRESS_RADIX=UNS;\nDATA_RADIX=HEX;\nCONTENT BEGIN\n");
    for (address, word) in words.iter().enumerate() {
        writeln!(text, "    {address} : {word:04X};").unwrap();
    }
    text.push_str("END;\n");
    text
}

pub fn program(words: &[u32]) -> Program {
    Program::parse(&mif(words)).unwrap()
}

/// 16 bit state with `DEPTH` words of memory, a program of 32 words and the given registers.
pub fn state_with(registers: &[(Register, u32)]) -> ExecutionState {
    let mut state = ExecutionState::new(vec![0; DEPTH], DataWidth::new(16).unwrap(), 32, 1200);
    let mut effect = crate::hardware::Effect::jump(0);
    for (r, value) in registers {
        effect = effect.register(*r, *value);
    }
    state.apply_effect(&effect).unwrap();
    state
}

/// Instruction word encoders for building test programs.
pub mod asm {
    use crate::emulator::table::codes;

    const fn op(code: u8) -> u32 {
        (code as u32) << 10
    }
    const fn rx(r: u32) -> u32 {
        r << 7
    }
    const fn ry(r: u32) -> u32 {
        r << 4
    }
    const fn rz(r: u32) -> u32 {
        r << 1
    }

    pub const NOP: u32 = op(codes::NOP);
    pub const HALT: u32 = op(codes::HALT);
    pub const BREAKP: u32 = op(codes::BREAKP);
    pub const RTS: u32 = op(codes::RTS);

    pub const fn loadn(r: u32, n: u32) -> [u32; 2] {
        [op(codes::LOADN) | rx(r), n]
    }
    pub const fn inc(r: u32) -> u32 {
        op(codes::INC) | rx(r)
    }
    pub const fn dec(r: u32) -> u32 {
        op(codes::INC) | rx(r) | 1 << 6
    }
    pub const fn add(x: u32, y: u32, z: u32) -> u32 {
        op(codes::ADD) | rx(x) | ry(y) | rz(z)
    }
    pub const fn cmp(x: u32, y: u32) -> u32 {
        op(codes::CMP) | rx(x) | ry(y)
    }
    pub const fn outchar(x: u32, y: u32) -> u32 {
        op(codes::OUTCHAR) | rx(x) | ry(y)
    }
    pub const fn inchar(x: u32) -> u32 {
        op(codes::INCHAR) | rx(x)
    }
    /// Jump with condition `cond` to `target`.
    pub const fn jump(cond: u32, target: u32) -> [u32; 2] {
        [op(codes::JMP) | cond << 6, target]
    }
    pub const fn call(target: u32) -> [u32; 2] {
        [op(codes::CALL), target]
    }
}
