//! Machine state of the simulated processor and the effects that change it.
pub mod keyboard;
pub mod memory;
pub mod registers;

use crate::errors::Fault;
use crate::numbers::DataWidth;
use memory::Memory;
use registers::{Register, RegisterFile, StatusFlags};

/// State delta produced by executing one instruction.
///
/// Nothing is written until [`ExecutionState::apply_effect`] has validated every target,
/// so an effect is applied completely or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Effect {
    pub registers: Vec<(Register, u32)>,
    pub memory: Vec<(usize, u32)>,
    pub video: Vec<(usize, u32)>,
    pub flags: Option<StatusFlags>,
    pub pc: usize,
    /// Set by `BREAKP`, a running simulation pauses after this instruction.
    pub break_requested: bool,
}

impl Effect {
    /// Effect that only moves the program counter.
    #[must_use]
    pub const fn jump(pc: usize) -> Self {
        Self {
            registers: Vec::new(),
            memory: Vec::new(),
            video: Vec::new(),
            flags: None,
            pc,
            break_requested: false,
        }
    }
    #[must_use]
    pub fn register(mut self, r: Register, value: u32) -> Self {
        self.registers.push((r, value));
        self
    }
    #[must_use]
    pub fn memory(mut self, address: usize, value: u32) -> Self {
        self.memory.push((address, value));
        self
    }
    #[must_use]
    pub fn video(mut self, position: usize, value: u32) -> Self {
        self.video.push((position, value));
        self
    }
    #[must_use]
    pub const fn flags(mut self, flags: StatusFlags) -> Self {
        self.flags = Some(flags);
        self
    }
    #[must_use]
    pub const fn request_break(mut self) -> Self {
        self.break_requested = true;
        self
    }
    /// True if nothing but the program counter changes.
    #[must_use]
    pub fn is_pc_only(&self) -> bool {
        self.registers.is_empty()
            && self.memory.is_empty()
            && self.video.is_empty()
            && self.flags.is_none()
    }
}

/// Registers, memory, video memory, flags and program counter of one simulation session.
///
/// The program counter always lies within `0..=program_length`, where `program_length`
/// is the halt sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionState {
    registers: RegisterFile,
    flags: StatusFlags,
    pc: usize,
    memory: Memory,
    video: Vec<u32>,
    width: DataWidth,
    program_length: usize,
    cycles: u64,
}

impl ExecutionState {
    /// Fresh state for a memory image; the stack starts at the last memory word.
    #[must_use]
    pub fn new(
        image: Vec<u32>,
        width: DataWidth,
        program_length: usize,
        screen_size: usize,
    ) -> Self {
        let stack_top = image.len().saturating_sub(1);
        let stack_pointer = width.truncate(u64::try_from(stack_top).unwrap_or(u64::MAX));
        Self {
            registers: RegisterFile::new(stack_pointer),
            flags: StatusFlags::default(),
            pc: 0,
            memory: Memory::from_image(image),
            video: vec![0; screen_size],
            width,
            program_length,
            cycles: 0,
        }
    }
    #[must_use]
    pub const fn register(&self, r: Register) -> u32 {
        self.registers.get(r)
    }
    #[must_use]
    pub const fn registers(&self) -> &RegisterFile {
        &self.registers
    }
    #[must_use]
    pub const fn flags(&self) -> StatusFlags {
        self.flags
    }
    #[must_use]
    pub const fn pc(&self) -> usize {
        self.pc
    }
    #[must_use]
    pub const fn memory(&self) -> &Memory {
        &self.memory
    }
    /// Checked memory read.
    ///
    /// # Errors
    /// - `Fault::AddressOutOfRange` for addresses beyond memory
    pub fn read(&self, address: u64) -> Result<u32, Fault> {
        self.memory.read(address)
    }
    #[must_use]
    pub fn video(&self) -> &[u32] {
        &self.video
    }
    #[must_use]
    pub const fn width(&self) -> DataWidth {
        self.width
    }
    #[must_use]
    pub const fn program_length(&self) -> usize {
        self.program_length
    }
    /// Program counter value that denotes a finished program.
    #[must_use]
    pub const fn halt_sentinel(&self) -> usize {
        self.program_length
    }
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.pc == self.program_length
    }
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Applies `effect` as one instruction cycle.
    ///
    /// # Errors
    /// - `Fault::AddressOutOfRange` if the new program counter leaves `0..=program_length`
    ///   or a memory or video write targets a missing cell. The state is left unchanged.
    pub fn apply_effect(&mut self, effect: &Effect) -> Result<(), Fault> {
        if effect.pc > self.program_length {
            return Err(out_of_range(effect.pc, self.program_length + 1));
        }
        if let Some((address, _)) = effect.memory.iter().find(|(a, _)| *a >= self.memory.len()) {
            return Err(out_of_range(*address, self.memory.len()));
        }
        if let Some((position, _)) = effect.video.iter().find(|(p, _)| *p >= self.video.len()) {
            return Err(out_of_range(*position, self.video.len()));
        }

        for (r, value) in &effect.registers {
            self.registers.set(*r, *value & self.width.mask());
        }
        for (address, value) in &effect.memory {
            self.memory.write(*address, *value & self.width.mask());
        }
        for (position, value) in &effect.video {
            self.video[*position] = *value & self.width.mask();
        }
        if let Some(flags) = effect.flags {
            self.flags = flags;
        }
        self.pc = effect.pc;
        self.cycles += 1;
        Ok(())
    }
}

fn out_of_range(address: usize, limit: usize) -> Fault {
    Fault::AddressOutOfRange {
        address: u64::try_from(address).unwrap_or(u64::MAX),
        limit,
    }
}
