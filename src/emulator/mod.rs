//! Decoding and execution of ICMC instructions, and the controller driving them.
pub mod controller;
pub mod handle;
pub mod instruction;
pub mod opcodes;
pub mod table;
#[cfg(test)]
pub(crate) mod test_helpers;

use crate::errors::Fault;
use crate::format::Program;
use crate::hardware::{Effect, ExecutionState};
use instruction::{Instruction, InstructionWord, Operand};
use opcodes::Operation;
use std::collections::BTreeMap;
use table::{OpcodeDef, OpcodeTable};
use tracing::trace;

/// Executes the instruction at the program counter of `state` without changing it.
///
/// `key` is the pending keyboard input, only read by opcodes that read input.
///
/// # Errors
/// - `Fault::Halted` if the program counter is at the halt sentinel
/// - `Fault::InvalidOpcode` if the opcode is not in the program's opcode table
/// - `Fault::AddressOutOfRange` for accesses outside of memory
pub fn step(program: &Program, state: &ExecutionState, key: Option<u8>) -> Result<Effect, Fault> {
    execute(program.table(), state, key)
}

/// Same as [`step`] with an explicit opcode table.
///
/// # Errors
/// - see [`step`]
pub fn execute(
    table: &OpcodeTable,
    state: &ExecutionState,
    key: Option<u8>,
) -> Result<Effect, Fault> {
    let (word, def) = fetch(table, state)?;
    let address = state.pc();
    let operand = if def.words > 1 {
        Some(state.read(as_address(address + 1))?)
    } else {
        None
    };
    trace!(pc = address, word = ?word, mnemonic = %def.mnemonic(word), "execute");
    (def.execute)(&Operation {
        word,
        address,
        operand,
        next_pc: address + def.words,
        state,
        key,
    })
}

/// Definition of the instruction at the program counter.
///
/// # Errors
/// - see [`step`]
pub fn fetch<'t>(
    table: &'t OpcodeTable,
    state: &ExecutionState,
) -> Result<(InstructionWord, &'t OpcodeDef), Fault> {
    if state.is_halted() {
        return Err(Fault::Halted);
    }
    let address = state.pc();
    let word = InstructionWord::from(state.read(as_address(address))?);
    let def = table.get(word.op_code()).ok_or(Fault::InvalidOpcode {
        opcode: word.op_code(),
        address,
    })?;
    Ok((word, def))
}

fn as_address(address: usize) -> u64 {
    u64::try_from(address).unwrap_or(u64::MAX)
}

/// Listing of `words`, unknown opcodes are shown as data words.
#[must_use]
pub fn decode_listing(
    table: &OpcodeTable,
    words: &[u32],
    source_lines: &BTreeMap<usize, usize>,
) -> Vec<Instruction> {
    let mut listing = Vec::new();
    let mut address = 0;
    while let Some(raw) = words.get(address) {
        let word = InstructionWord::from(*raw);
        let instruction = match table.get(word.op_code()) {
            Some(def) => {
                let operand = (def.words > 1).then(|| words.get(address + 1).copied()).flatten();
                Instruction {
                    address,
                    opcode: word.op_code(),
                    mnemonic: def.mnemonic(word),
                    operands: (def.operands)(word, operand),
                    words: def.words,
                    source_line: source_lines.get(&address).copied(),
                }
            }
            None => Instruction {
                address,
                opcode: word.op_code(),
                mnemonic: "data".to_string(),
                operands: vec![Operand::Immediate(*raw)],
                words: 1,
                source_line: source_lines.get(&address).copied(),
            },
        };
        address += instruction.words;
        listing.push(instruction);
    }
    listing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::emulator::test_helpers::program;
    use crate::hardware::registers::Register;
    use googletest::prelude::*;

    #[gtest]
    pub fn test_step_does_not_mutate() {
        // loadn r2, #9
        let program = program(&[0xE100, 9]);
        let state = program.initial_state(&SimConfig::default());
        let before = state.clone();
        let effect = step(&program, &state, None).unwrap();
        assert_eq!(state, before);
        assert_eq!(effect, Effect::jump(2).register(Register::R2, 9));
    }
    #[gtest]
    pub fn test_step_at_sentinel_is_halted() {
        let program = program(&[0]);
        let mut state = program.initial_state(&SimConfig::default());
        state.apply_effect(&step(&program, &state, None).unwrap()).unwrap();
        expect_that!(step(&program, &state, None).err(), some(eq(Fault::Halted)));
    }
    #[gtest]
    pub fn test_step_invalid_opcode() {
        let program = program(&[0, 0xFC00]);
        let mut state = program.initial_state(&SimConfig::default());
        state.apply_effect(&step(&program, &state, None).unwrap()).unwrap();
        expect_that!(
            step(&program, &state, None).err(),
            some(eq(Fault::InvalidOpcode {
                opcode: 63,
                address: 1
            }))
        );
    }
    #[gtest]
    pub fn test_step_passes_key_to_inchar() {
        // inchar r3
        let program = program(&[0xD580]);
        let state = program.initial_state(&SimConfig::default());
        let effect = step(&program, &state, Some(b'q')).unwrap();
        assert_eq!(effect.registers, vec![(Register::R3, u32::from(b'q'))]);
    }
    #[gtest]
    pub fn test_listing_marks_unknown_words_as_data() {
        let table = OpcodeTable::icmc();
        let listing = decode_listing(&table, &[0xFC00, 0x0800, 0], &BTreeMap::new());
        let text: Vec<String> = listing.iter().map(ToString::to_string).collect();
        assert_eq!(text, ["0x0000: data #64512", "0x0001: jmp 0x0000"]);
    }
}
