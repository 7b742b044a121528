//! Implemented operations of the ICMC processor.
//!
//! Every operation is a pure function from an [`Operation`] to the [`Effect`] it has,
//! the state itself is never touched here.
use crate::emulator::instruction::{InstructionWord, Operand};
use crate::errors::Fault;
use crate::hardware::registers::{Flag, Register, StatusFlags};
use crate::hardware::{Effect, ExecutionState};
use crate::numbers::{Arith, DataWidth};

/// Key code `INCHAR` reads while no key is pending.
pub const NO_KEY: u32 = 255;

/// Everything an opcode may look at while executing one instruction.
#[derive(Debug, Clone, Copy)]
pub struct Operation<'a> {
    pub word: InstructionWord,
    /// Address of the instruction.
    pub address: usize,
    /// Second word of two word instructions.
    pub operand: Option<u32>,
    /// Address of the following instruction.
    pub next_pc: usize,
    pub state: &'a ExecutionState,
    /// Key pending on the keyboard, only polled for opcodes that read input.
    pub key: Option<u8>,
}

impl Operation<'_> {
    fn get(&self, r: Register) -> u32 {
        self.state.register(r)
    }
    fn width(&self) -> DataWidth {
        self.state.width()
    }
    fn flags(&self) -> StatusFlags {
        self.state.flags()
    }
    fn operand_word(&self) -> u32 {
        self.operand.unwrap_or_default()
    }
    fn advance(&self) -> Effect {
        Effect::jump(self.next_pc)
    }
}

/// Jump and call conditions, bits 9..6 of the instruction.
#[repr(u16)]
#[derive(enumn::N, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Always = 0,
    Equal = 1,
    NotEqual = 2,
    Zero = 3,
    NotZero = 4,
    Carry = 5,
    NotCarry = 6,
    Greater = 7,
    Lesser = 8,
    EqualOrGreater = 9,
    EqualOrLesser = 10,
    Overflow = 11,
    NotOverflow = 12,
    Negative = 13,
    DivByZero = 14,
}

impl Condition {
    #[must_use]
    pub const fn holds(self, flags: StatusFlags) -> bool {
        match self {
            Self::Always => true,
            Self::Equal => flags.contains(Flag::Equal),
            Self::NotEqual => !flags.contains(Flag::Equal),
            Self::Zero => flags.contains(Flag::Zero),
            Self::NotZero => !flags.contains(Flag::Zero),
            Self::Carry => flags.contains(Flag::Carry),
            Self::NotCarry => !flags.contains(Flag::Carry),
            Self::Greater => flags.contains(Flag::Greater),
            Self::Lesser => flags.contains(Flag::Lesser),
            Self::EqualOrGreater => flags.contains(Flag::Equal) || flags.contains(Flag::Greater),
            Self::EqualOrLesser => flags.contains(Flag::Equal) || flags.contains(Flag::Lesser),
            Self::Overflow => flags.contains(Flag::Overflow),
            Self::NotOverflow => !flags.contains(Flag::Overflow),
            Self::Negative => flags.contains(Flag::Negative),
            Self::DivByZero => flags.contains(Flag::DivByZero),
        }
    }
    const fn suffix(self) -> &'static str {
        match self {
            Self::Always => "",
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::Zero => "z",
            Self::NotZero => "nz",
            Self::Carry => "c",
            Self::NotCarry => "nc",
            Self::Greater => "gr",
            Self::Lesser => "le",
            Self::EqualOrGreater => "eg",
            Self::EqualOrLesser => "el",
            Self::Overflow => "ov",
            Self::NotOverflow => "no",
            Self::Negative => "n",
            Self::DivByZero => "dz",
        }
    }
}

fn condition(op: &Operation<'_>) -> Result<Condition, Fault> {
    Condition::n(op.word.condition_code()).ok_or(Fault::InvalidOpcode {
        opcode: op.word.op_code(),
        address: op.address,
    })
}

fn arith_flags(flags: StatusFlags, width: DataWidth, res: Arith) -> StatusFlags {
    flags
        .with(Flag::Zero, res.value == 0)
        .with(Flag::Negative, width.is_negative(res.value))
        .with(Flag::Carry, res.carry)
        .with(Flag::Overflow, res.overflow)
}

fn logic_flags(flags: StatusFlags, width: DataWidth, value: u32) -> StatusFlags {
    flags
        .with(Flag::Zero, value == 0)
        .with(Flag::Negative, width.is_negative(value))
}

fn to_address(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// LOAD: Loads the content of memory address `END` into RX.
/// ```text
///  15____10__9_7___6_____0_    15______0_
/// | 110000 | RX | xxxxxxx |  |   END    |
///  ------------------------    ----------
/// ```
/// # Errors
/// - `END` is outside of memory
pub fn load(op: &Operation<'_>) -> Result<Effect, Fault> {
    let value = op.state.read(u64::from(op.operand_word()))?;
    Ok(op.advance().register(op.word.rx(), value))
}

/// STORE: Stores RX at memory address `END`.
/// ```text
///  15____10__9_7___6_____0_    15______0_
/// | 110001 | RX | xxxxxxx |  |   END    |
///  ------------------------    ----------
/// ```
/// # Errors
/// - never, an address outside of memory is rejected when the effect is applied
pub fn store(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(op
        .advance()
        .memory(to_address(op.operand_word()), op.get(op.word.rx())))
}

/// LOADN: Loads the immediate number `NR` into RX.
/// ```text
///  15____10__9_7___6_____0_    15______0_
/// | 111000 | RX | xxxxxxx |  |    NR    |
///  ------------------------    ----------
/// ```
/// # Errors
/// - never
pub fn loadn(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(op.advance().register(op.word.rx(), op.operand_word()))
}

/// LOADI: Loads the content of the memory address held in RY into RX.
/// ```text
///  15____10__9_7__6_4___3__0_
/// | 111100 | RX | RY | xxxx |
///  --------------------------
/// ```
/// # Errors
/// - the address in RY is outside of memory
pub fn loadi(op: &Operation<'_>) -> Result<Effect, Fault> {
    let value = op.state.read(u64::from(op.get(op.word.ry())))?;
    Ok(op.advance().register(op.word.rx(), value))
}

/// STOREI: Stores RY at the memory address held in RX.
/// ```text
///  15____10__9_7__6_4___3__0_
/// | 111101 | RX | RY | xxxx |
///  --------------------------
/// ```
/// # Errors
/// - never, an address outside of memory is rejected when the effect is applied
pub fn storei(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(op
        .advance()
        .memory(to_address(op.get(op.word.rx())), op.get(op.word.ry())))
}

/// MOV in 3 variants selected by bits 1..0
/// - `x0`: RX is set to RY
/// - `01`: RX is set to SP
/// - `11`: SP is set to RX
/// ```text
///  15____10__9_7__6_4___3_2__1_0_
/// | 110011 | RX | RY | xx | SS |
///  -----------------------------
/// ```
/// # Errors
/// - never
pub fn mov(op: &Operation<'_>) -> Result<Effect, Fault> {
    let (target, source) = match op.word.get_bit_range(0, 1) {
        0b01 => (op.word.rx(), Register::Sp),
        0b11 => (Register::Sp, op.word.rx()),
        _ => (op.word.rx(), op.word.ry()),
    };
    Ok(op.advance().register(target, op.get(source)))
}

/// OUTCHAR: Writes the character (and colour) in RX to video position RY.
/// ```text
///  15____10__9_7__6_4___3__0_
/// | 110010 | RX | RY | xxxx |
///  --------------------------
/// ```
/// # Errors
/// - never, a position outside of the screen is rejected when the effect is applied
pub fn outchar(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(op
        .advance()
        .video(to_address(op.get(op.word.ry())), op.get(op.word.rx())))
}

/// INCHAR: Reads the pending key into RX, [`NO_KEY`] if there is none.
/// ```text
///  15____10__9_7___6_____0_
/// | 110101 | RX | xxxxxxx |
///  ------------------------
/// ```
/// # Errors
/// - never
pub fn inchar(op: &Operation<'_>) -> Result<Effect, Fault> {
    let value = op.key.map_or(NO_KEY, u32::from);
    Ok(op.advance().register(op.word.rx(), value))
}

/// ADD: RX is set to RY + RZ, plus the carry flag if `C` is set (ADDC).
/// ```text
///  15____10__9_7__6_4__3_1__0_
/// | 100000 | RX | RY | RZ | C |
///  ---------------------------
/// ```
/// Sets ZERO, NEGATIVE, CARRY and OVERFLOW.
/// # Errors
/// - never
pub fn add(op: &Operation<'_>) -> Result<Effect, Fault> {
    let carry_in = op.word.with_carry() && op.flags().contains(Flag::Carry);
    let res = op
        .width()
        .add(op.get(op.word.ry()), op.get(op.word.rz()), carry_in);
    Ok(op
        .advance()
        .register(op.word.rx(), res.value)
        .flags(arith_flags(op.flags(), op.width(), res)))
}

/// SUB: RX is set to RY - RZ, minus the carry flag if `C` is set (SUBC).
/// ```text
///  15____10__9_7__6_4__3_1__0_
/// | 100001 | RX | RY | RZ | C |
///  ---------------------------
/// ```
/// Sets ZERO, NEGATIVE, CARRY (borrow) and OVERFLOW.
/// # Errors
/// - never
pub fn sub(op: &Operation<'_>) -> Result<Effect, Fault> {
    let borrow_in = op.word.with_carry() && op.flags().contains(Flag::Carry);
    let res = op
        .width()
        .sub(op.get(op.word.ry()), op.get(op.word.rz()), borrow_in);
    Ok(op
        .advance()
        .register(op.word.rx(), res.value)
        .flags(arith_flags(op.flags(), op.width(), res)))
}

/// MUL: RX is set to the low word of RY * RZ, OVERFLOW reports a lost high word.
/// ```text
///  15____10__9_7__6_4__3_1__0_
/// | 100010 | RX | RY | RZ | x |
///  ---------------------------
/// ```
/// # Errors
/// - never
pub fn mul(op: &Operation<'_>) -> Result<Effect, Fault> {
    let res = op.width().mul(op.get(op.word.ry()), op.get(op.word.rz()));
    Ok(op
        .advance()
        .register(op.word.rx(), res.value)
        .flags(arith_flags(op.flags(), op.width(), res)))
}

fn divide(op: &Operation<'_>, f: fn(u32, u32) -> u32) -> Effect {
    let (dividend, divisor) = (op.get(op.word.ry()), op.get(op.word.rz()));
    let value = if divisor == 0 { 0 } else { f(dividend, divisor) };
    let flags = logic_flags(op.flags(), op.width(), value).with(Flag::DivByZero, divisor == 0);
    op.advance().register(op.word.rx(), value).flags(flags)
}

/// DIV: RX is set to RY / RZ (unsigned). Division by zero yields 0 and sets `DIV_BY_ZERO`.
/// ```text
///  15____10__9_7__6_4__3_1__0_
/// | 100011 | RX | RY | RZ | x |
///  ---------------------------
/// ```
/// # Errors
/// - never
pub fn div(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(divide(op, |a, b| a / b))
}

/// MOD: RX is set to RY % RZ (unsigned). Division by zero yields 0 and sets `DIV_BY_ZERO`.
/// ```text
///  15____10__9_7__6_4__3_1__0_
/// | 100101 | RX | RY | RZ | x |
///  ---------------------------
/// ```
/// # Errors
/// - never
pub fn modulo(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(divide(op, |a, b| a % b))
}

/// INC or DEC depending on bit 6.
/// ```text
///  15____10__9_7___6___5____0_
/// | 100100 | RX | D | xxxxxx |
///  --------------------------
/// ```
/// # Errors
/// - never
pub fn inc_or_dec(op: &Operation<'_>) -> Result<Effect, Fault> {
    let value = op.get(op.word.rx());
    let res = if op.word.get_bit(6) {
        op.width().sub(value, 1, false)
    } else {
        op.width().add(value, 1, false)
    };
    Ok(op
        .advance()
        .register(op.word.rx(), res.value)
        .flags(arith_flags(op.flags(), op.width(), res)))
}

fn bitwise(op: &Operation<'_>, f: fn(u32, u32) -> u32) -> Effect {
    let value = f(op.get(op.word.ry()), op.get(op.word.rz())) & op.width().mask();
    op.advance()
        .register(op.word.rx(), value)
        .flags(logic_flags(op.flags(), op.width(), value))
}

/// AND: RX is set to RY AND RZ.
/// ```text
///  15____10__9_7__6_4__3_1__0_
/// | 010010 | RX | RY | RZ | x |
///  ---------------------------
/// ```
/// # Errors
/// - never
pub fn and(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(bitwise(op, |a, b| a & b))
}

/// OR: RX is set to RY OR RZ.
/// # Errors
/// - never
pub fn or(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(bitwise(op, |a, b| a | b))
}

/// XOR: RX is set to RY XOR RZ.
/// # Errors
/// - never
pub fn xor(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(bitwise(op, |a, b| a ^ b))
}

/// NOT: RX is set to the bit-wise complement of RY.
/// ```text
///  15____10__9_7__6_4___3__0_
/// | 010101 | RX | RY | xxxx |
///  --------------------------
/// ```
/// # Errors
/// - never
pub fn not(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(bitwise(op, |a, _| !a))
}

/// Shift or rotate RX by `N` bits, bits 6..4 select the variant:
/// `000` SHIFTL0, `001` SHIFTL1, `010` SHIFTR0, `011` SHIFTR1, `10x` ROTL, `11x` ROTR.
/// ```text
///  15____10__9_7__6_4___3__0_
/// | 010000 | RX | SSS |  N  |
///  --------------------------
/// ```
/// # Errors
/// - never
pub fn shift(op: &Operation<'_>) -> Result<Effect, Fault> {
    let width = op.width();
    let value = op.get(op.word.rx());
    let amount = u32::from(op.word.get_bit_range(0, 3));
    let value = shifted(width, value, op.word.get_bit_range(4, 6), amount);
    Ok(op
        .advance()
        .register(op.word.rx(), value)
        .flags(logic_flags(op.flags(), width, value)))
}

fn shifted(width: DataWidth, value: u32, kind: u16, amount: u32) -> u32 {
    let bits = width.bits();
    let value = u64::from(value & width.mask());
    let mask = u64::from(width.mask());
    let ones = |n: u32| (1u64 << n.min(bits)) - 1;
    let res = match kind {
        0b000 => value << amount,
        0b001 => (value << amount) | ones(amount),
        0b010 => value >> amount,
        0b011 => (value >> amount) | (ones(amount) << bits.saturating_sub(amount)),
        0b100 | 0b101 => {
            let n = amount % bits;
            (value << n) | (value >> (bits - n))
        }
        _ => {
            let n = amount % bits;
            (value >> n) | (value << (bits - n))
        }
    };
    width.truncate(res & mask)
}

/// CMP: Compares RX with RY (unsigned) and sets exactly one of GREATER, LESSER and EQUAL.
/// ```text
///  15____10__9_7__6_4___3__0_
/// | 010110 | RX | RY | xxxx |
///  --------------------------
/// ```
/// # Errors
/// - never
pub fn cmp(op: &Operation<'_>) -> Result<Effect, Fault> {
    let (a, b) = (op.get(op.word.rx()), op.get(op.word.ry()));
    let flags = op
        .flags()
        .with(Flag::Greater, a > b)
        .with(Flag::Lesser, a < b)
        .with(Flag::Equal, a == b);
    Ok(op.advance().flags(flags))
}

/// JMP and the conditional jumps: PC is set to `END` if the condition holds.
/// ```text
///  15____10__9__6___5____0_    15______0_
/// | 000010 | COND | xxxxxx |  |   END    |
///  -------------------------    ----------
/// ```
/// # Errors
/// - `COND` is not a defined condition
pub fn jump(op: &Operation<'_>) -> Result<Effect, Fault> {
    if condition(op)?.holds(op.flags()) {
        Ok(Effect::jump(to_address(op.operand_word())))
    } else {
        Ok(op.advance())
    }
}

/// CALL and the conditional calls: pushes the return address and jumps to `END`
/// if the condition holds. The stack grows downwards, SP points to the next free word.
/// ```text
///  15____10__9__6___5____0_    15______0_
/// | 000011 | COND | xxxxxx |  |   END    |
///  -------------------------    ----------
/// ```
/// # Errors
/// - `COND` is not a defined condition
pub fn call(op: &Operation<'_>) -> Result<Effect, Fault> {
    if !condition(op)?.holds(op.flags()) {
        return Ok(op.advance());
    }
    let sp = op.get(Register::Sp);
    let return_address = u32::try_from(op.next_pc).unwrap_or(u32::MAX);
    Ok(Effect::jump(to_address(op.operand_word()))
        .memory(to_address(sp), return_address)
        .register(Register::Sp, op.width().sub(sp, 1, false).value))
}

/// RTS: Pops the return address pushed by CALL into PC.
/// ```text
///  15____10__9________0_
/// | 000100 | xxxxxxxxxx |
///  ---------------------
/// ```
/// # Errors
/// - the stack is empty, SP + 1 is outside of memory
pub fn rts(op: &Operation<'_>) -> Result<Effect, Fault> {
    let sp = op.width().add(op.get(Register::Sp), 1, false).value;
    let return_address = op.state.read(u64::from(sp))?;
    Ok(Effect::jump(to_address(return_address)).register(Register::Sp, sp))
}

/// PUSH RX, or PUSH FR if bit 6 is set.
/// ```text
///  15____10__9_7___6___5____0_
/// | 000101 | RX | F | xxxxxx |
///  --------------------------
/// ```
/// # Errors
/// - never, a full stack is rejected when the effect is applied
pub fn push(op: &Operation<'_>) -> Result<Effect, Fault> {
    let value = if op.word.get_bit(6) {
        op.flags().bits()
    } else {
        op.get(op.word.rx())
    };
    let sp = op.get(Register::Sp);
    Ok(op
        .advance()
        .memory(to_address(sp), value)
        .register(Register::Sp, op.width().sub(sp, 1, false).value))
}

/// POP RX, or POP FR if bit 6 is set.
/// ```text
///  15____10__9_7___6___5____0_
/// | 000110 | RX | F | xxxxxx |
///  --------------------------
/// ```
/// # Errors
/// - the stack is empty, SP + 1 is outside of memory
pub fn pop(op: &Operation<'_>) -> Result<Effect, Fault> {
    let sp = op.width().add(op.get(Register::Sp), 1, false).value;
    let value = op.state.read(u64::from(sp))?;
    let effect = op.advance().register(Register::Sp, sp);
    if op.word.get_bit(6) {
        Ok(effect.flags(StatusFlags::from_bits(value)))
    } else {
        Ok(effect.register(op.word.rx(), value))
    }
}

/// SETC if bit 9 is set, CLEARC otherwise.
/// ```text
///  15____10__9___8_______0_
/// | 001000 | C | xxxxxxxxx |
///  ------------------------
/// ```
/// # Errors
/// - never
pub fn set_carry(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(op
        .advance()
        .flags(op.flags().with(Flag::Carry, op.word.get_bit(9))))
}

/// BREAKP: Pauses a running simulation after this instruction.
/// # Errors
/// - never
pub fn breakp(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(op.advance().request_break())
}

/// HALT: Ends the program by moving PC to the halt sentinel.
/// # Errors
/// - never
pub fn halt(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(Effect::jump(op.state.halt_sentinel()))
}

/// NOP: Only advances PC.
/// # Errors
/// - never
pub fn nop(op: &Operation<'_>) -> Result<Effect, Fault> {
    Ok(op.advance())
}

pub mod listing {
    //! Mnemonics and operands for program listings.
    use super::{Condition, Operand, Register};
    use crate::emulator::instruction::InstructionWord;

    fn reg(r: Register) -> Operand {
        Operand::Register(r)
    }
    fn address(operand: Option<u32>) -> Operand {
        Operand::Address(operand.unwrap_or_default())
    }

    pub fn none(_: InstructionWord, _: Option<u32>) -> Vec<Operand> {
        Vec::new()
    }
    pub fn rx(w: InstructionWord, _: Option<u32>) -> Vec<Operand> {
        vec![reg(w.rx())]
    }
    pub fn rx_ry(w: InstructionWord, _: Option<u32>) -> Vec<Operand> {
        vec![reg(w.rx()), reg(w.ry())]
    }
    pub fn rx_ry_rz(w: InstructionWord, _: Option<u32>) -> Vec<Operand> {
        vec![reg(w.rx()), reg(w.ry()), reg(w.rz())]
    }
    pub fn rx_address(w: InstructionWord, operand: Option<u32>) -> Vec<Operand> {
        vec![reg(w.rx()), address(operand)]
    }
    pub fn address_rx(w: InstructionWord, operand: Option<u32>) -> Vec<Operand> {
        vec![address(operand), reg(w.rx())]
    }
    pub fn rx_immediate(w: InstructionWord, operand: Option<u32>) -> Vec<Operand> {
        vec![reg(w.rx()), Operand::Immediate(operand.unwrap_or_default())]
    }
    pub fn rx_amount(w: InstructionWord, _: Option<u32>) -> Vec<Operand> {
        vec![reg(w.rx()), Operand::Immediate(u32::from(w.get_bit_range(0, 3)))]
    }
    pub fn target(_: InstructionWord, operand: Option<u32>) -> Vec<Operand> {
        vec![address(operand)]
    }
    pub fn mov(w: InstructionWord, _: Option<u32>) -> Vec<Operand> {
        match w.get_bit_range(0, 1) {
            0b01 => vec![reg(w.rx()), reg(Register::Sp)],
            0b11 => vec![reg(Register::Sp), reg(w.rx())],
            _ => vec![reg(w.rx()), reg(w.ry())],
        }
    }
    pub fn stack(w: InstructionWord, _: Option<u32>) -> Vec<Operand> {
        if w.get_bit(6) {
            vec![Operand::FlagRegister]
        } else {
            vec![reg(w.rx())]
        }
    }

    pub fn jump_mnemonic(w: InstructionWord) -> String {
        Condition::n(w.condition_code())
            .map_or_else(|| "j??".into(), |c| match c {
                Condition::Always => "jmp".into(),
                c => format!("j{}", c.suffix()),
            })
    }
    pub fn call_mnemonic(w: InstructionWord) -> String {
        Condition::n(w.condition_code())
            .map_or_else(|| "c??".into(), |c| match c {
                Condition::Always => "call".into(),
                c => format!("c{}", c.suffix()),
            })
    }
    pub fn add_mnemonic(w: InstructionWord) -> String {
        if w.with_carry() { "addc" } else { "add" }.into()
    }
    pub fn sub_mnemonic(w: InstructionWord) -> String {
        if w.with_carry() { "subc" } else { "sub" }.into()
    }
    pub fn inc_mnemonic(w: InstructionWord) -> String {
        if w.get_bit(6) { "dec" } else { "inc" }.into()
    }
    pub fn carry_mnemonic(w: InstructionWord) -> String {
        if w.get_bit(9) { "setc" } else { "clearc" }.into()
    }
    pub fn shift_mnemonic(w: InstructionWord) -> String {
        match w.get_bit_range(4, 6) {
            0b000 => "shiftl0",
            0b001 => "shiftl1",
            0b010 => "shiftr0",
            0b011 => "shiftr1",
            0b100 | 0b101 => "rotl",
            _ => "rotr",
        }
        .into()
    }
}

#[expect(clippy::unusual_byte_groupings)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::test_helpers::state_with;
    use googletest::prelude::*;
    use yare::parameterized;

    type Exec = fn(&Operation<'_>) -> Result<Effect, Fault>;

    fn run(word: u16, operand: Option<u32>, state: &ExecutionState, f: Exec) -> Result<Effect, Fault> {
        let op = Operation {
            word: word.into(),
            address: state.pc(),
            operand,
            next_pc: state.pc() + if operand.is_some() { 2 } else { 1 },
            state,
            key: None,
        };
        f(&op)
    }
    fn apply(word: u16, operand: Option<u32>, state: &mut ExecutionState, f: Exec) {
        let effect = run(word, operand, state, f).unwrap();
        state.apply_effect(&effect).unwrap();
    }

    #[gtest]
    pub fn test_opcode_add() {
        let mut state = state_with(&[(Register::R0, 22), (Register::R1, 128)]);
        // ADD r2, r0, r1
        apply(0b100000_010_000_001_0, None, &mut state, add);
        expect_that!(state.register(Register::R2), eq(150));
        expect_that!(state.flags().contains(Flag::Zero), eq(false));
        expect_that!(state.pc(), eq(1));
    }
    #[gtest]
    pub fn test_opcode_add_overflow_sets_flags() {
        let mut state = state_with(&[(Register::R0, 0xFFFF), (Register::R1, 1)]);
        apply(0b100000_010_000_001_0, None, &mut state, add);
        expect_that!(state.register(Register::R2), eq(0));
        expect_that!(state.flags().contains(Flag::Zero), eq(true));
        expect_that!(state.flags().contains(Flag::Carry), eq(true));

        // ADDC r3, r4, r4 with carry set: 0 + 0 + 1
        apply(0b100000_011_100_100_1, None, &mut state, add);
        expect_that!(state.register(Register::R3), eq(1));
        expect_that!(state.flags().contains(Flag::Carry), eq(false));
    }
    #[gtest]
    pub fn test_opcode_sub_negative() {
        let mut state = state_with(&[(Register::R0, 22), (Register::R1, 128)]);
        // SUB r2, r0, r1 => -106
        apply(0b100001_010_000_001_0, None, &mut state, sub);
        expect_that!(state.width().to_signed(state.register(Register::R2)), eq(-106));
        expect_that!(state.flags().contains(Flag::Negative), eq(true));
        expect_that!(state.flags().contains(Flag::Carry), eq(true));
    }
    #[gtest]
    pub fn test_opcode_mul_and_div() {
        let mut state = state_with(&[(Register::R0, 300), (Register::R1, 7), (Register::R5, 0)]);
        apply(0b100010_010_000_001_0, None, &mut state, mul);
        expect_that!(state.register(Register::R2), eq(2100));
        apply(0b100011_011_000_001_0, None, &mut state, div);
        expect_that!(state.register(Register::R3), eq(42));
        apply(0b100101_100_000_001_0, None, &mut state, modulo);
        expect_that!(state.register(Register::R4), eq(6));
        expect_that!(state.flags().contains(Flag::DivByZero), eq(false));
    }
    #[gtest]
    pub fn test_opcode_div_by_zero() {
        let mut state = state_with(&[(Register::R0, 300), (Register::R1, 0), (Register::R2, 9)]);
        apply(0b100011_010_000_001_0, None, &mut state, div);
        expect_that!(state.register(Register::R2), eq(0));
        expect_that!(state.flags().contains(Flag::DivByZero), eq(true));
    }
    #[gtest]
    pub fn test_opcode_inc_dec() {
        let mut state = state_with(&[(Register::R6, 0)]);
        // DEC r6 wraps around
        apply(0b100100_110_1_000000, None, &mut state, inc_or_dec);
        expect_that!(state.register(Register::R6), eq(0xFFFF));
        expect_that!(state.flags().contains(Flag::Negative), eq(true));
        // INC r6 back to 0
        apply(0b100100_110_0_000000, None, &mut state, inc_or_dec);
        expect_that!(state.register(Register::R6), eq(0));
        expect_that!(state.flags().contains(Flag::Zero), eq(true));
        expect_that!(state.flags().contains(Flag::Carry), eq(true));
    }
    #[gtest]
    pub fn test_opcode_logic() {
        let mut state = state_with(&[
            (Register::R0, 0b1101_1001_0111_0101),
            (Register::R1, 0b0100_1010_0010_1001),
        ]);
        apply(0b010010_010_000_001_0, None, &mut state, and);
        expect_that!(state.register(Register::R2), eq(0b0100_1000_0010_0001));
        apply(0b010011_011_000_001_0, None, &mut state, or);
        expect_that!(state.register(Register::R3), eq(0b1101_1011_0111_1101));
        apply(0b010100_100_000_001_0, None, &mut state, xor);
        expect_that!(state.register(Register::R4), eq(0b1001_0011_0101_1100));
        apply(0b010101_101_000_000_0, None, &mut state, super::not);
        expect_that!(state.register(Register::R5), eq(0b0010_0110_1000_1010));
        expect_that!(state.flags().contains(Flag::Negative), eq(false));
    }

    #[parameterized(
        shiftl0 = { 0b000, 4, 0x0F0F, 0xF0F0 },
        shiftl1 = { 0b001, 4, 0x0F0F, 0xF0FF },
        shiftr0 = { 0b010, 4, 0x0F0F, 0x00F0 },
        shiftr1 = { 0b011, 4, 0x0F0F, 0xF0F0 },
        rotl = { 0b100, 4, 0x1234, 0x2341 },
        rotr = { 0b110, 4, 0x1234, 0x4123 },
        rotl_zero = { 0b101, 0, 0x1234, 0x1234 },
        shiftl0_all = { 0b000, 15, 0x0003, 0x8000 },
    )]
    fn test_opcode_shift(kind: u16, amount: u16, input: u32, expected: u32) {
        let mut state = state_with(&[(Register::R1, input)]);
        let word = 0b010000_001_000_0000 | (kind << 4) | amount;
        apply(word, None, &mut state, shift);
        assert_eq!(state.register(Register::R1), expected);
    }

    #[gtest]
    pub fn test_opcode_cmp() {
        let mut state = state_with(&[(Register::R0, 5), (Register::R1, 9)]);
        apply(0b010110_000_001_0000, None, &mut state, cmp);
        expect_that!(state.flags().contains(Flag::Lesser), eq(true));
        expect_that!(state.flags().contains(Flag::Greater), eq(false));
        expect_that!(state.flags().contains(Flag::Equal), eq(false));
        apply(0b010110_000_000_0000, None, &mut state, cmp);
        expect_that!(state.flags().contains(Flag::Equal), eq(true));
        expect_that!(state.flags().contains(Flag::Lesser), eq(false));
    }

    #[parameterized(
        always = { 0, 0, true },
        equal_taken = { 1, 1 << 2, true },
        equal_not_taken = { 1, 0, false },
        not_equal = { 2, 0, true },
        zero = { 3, 1 << 3, true },
        not_zero = { 4, 1 << 3, false },
        carry = { 5, 1 << 4, true },
        no_carry = { 6, 1 << 4, false },
        greater = { 7, 1, true },
        lesser = { 8, 1 << 1, true },
        equal_or_greater = { 9, 1 << 2, true },
        equal_or_lesser = { 10, 1, false },
        overflow = { 11, 1 << 5, true },
        no_overflow = { 12, 1 << 5, false },
        negative = { 13, 1 << 9, true },
        div_by_zero = { 14, 1 << 6, true },
    )]
    fn test_opcode_jump_conditions(cond: u16, flags: u32, taken: bool) {
        let mut state = state_with(&[]);
        state
            .apply_effect(&Effect::jump(0).flags(StatusFlags::from_bits(flags)))
            .unwrap();
        let effect = run(0b000010_0000_000000 | (cond << 6), Some(6), &state, jump).unwrap();
        assert_eq!(effect.pc, if taken { 6 } else { 2 });
    }

    #[gtest]
    pub fn test_opcode_jump_undefined_condition() {
        let state = state_with(&[]);
        let res = run(0b000010_1111_000000, Some(6), &state, jump);
        expect_that!(res.err(), some(eq(Fault::InvalidOpcode { opcode: 2, address: 0 })));
    }
    #[gtest]
    pub fn test_opcode_call_and_rts() {
        let mut state = state_with(&[]);
        let sp = state.register(Register::Sp);
        // CALL 6
        apply(0b000011_0000_000000, Some(6), &mut state, call);
        expect_that!(state.pc(), eq(6));
        expect_that!(state.register(Register::Sp), eq(sp - 1));
        expect_that!(state.memory()[to_address(sp)], eq(2));
        // RTS
        apply(0b000100_0000000000, None, &mut state, rts);
        expect_that!(state.pc(), eq(2));
        expect_that!(state.register(Register::Sp), eq(sp));
    }
    #[gtest]
    pub fn test_opcode_push_pop() {
        let mut state = state_with(&[(Register::R3, 4711)]);
        apply(0b000101_011_0_000000, None, &mut state, push);
        apply(0b000110_101_0_000000, None, &mut state, pop);
        expect_that!(state.register(Register::R5), eq(4711));

        apply(0b001000_1_000000000, None, &mut state, set_carry);
        apply(0b000101_000_1_000000, None, &mut state, push);
        apply(0b001000_0_000000000, None, &mut state, set_carry);
        expect_that!(state.flags().contains(Flag::Carry), eq(false));
        apply(0b000110_000_1_000000, None, &mut state, pop);
        expect_that!(state.flags().contains(Flag::Carry), eq(true));
    }
    #[gtest]
    pub fn test_opcode_pop_empty_stack() {
        let state = state_with(&[]);
        let res = run(0b000110_101_0_000000, None, &state, pop);
        expect_that!(
            res.err(),
            some(eq(Fault::AddressOutOfRange {
                address: 64,
                limit: 64
            }))
        );
    }
    #[gtest]
    pub fn test_opcode_memory_access() {
        let mut state = state_with(&[(Register::R1, 1234), (Register::R2, 12)]);
        // STORE 10, r1
        apply(0b110001_001_0000000, Some(10), &mut state, store);
        // LOAD r4, 10
        apply(0b110000_100_0000000, Some(10), &mut state, load);
        expect_that!(state.register(Register::R4), eq(1234));
        // STOREI r2, r1 ; LOADI r5, r2
        apply(0b111101_010_001_0000, None, &mut state, storei);
        apply(0b111100_101_010_0000, None, &mut state, loadi);
        expect_that!(state.register(Register::R5), eq(1234));
        // LOADN r6, #77
        apply(0b111000_110_0000000, Some(77), &mut state, loadn);
        expect_that!(state.register(Register::R6), eq(77));
    }
    #[gtest]
    pub fn test_opcode_mov_variants() {
        let mut state = state_with(&[(Register::R1, 99)]);
        apply(0b110011_010_001_0000, None, &mut state, mov);
        expect_that!(state.register(Register::R2), eq(99));
        apply(0b110011_011_000_0001, None, &mut state, mov);
        expect_that!(state.register(Register::R3), eq(state.register(Register::Sp)));
        apply(0b110011_001_000_0011, None, &mut state, mov);
        expect_that!(state.register(Register::Sp), eq(99));
    }
    #[gtest]
    pub fn test_opcode_io() {
        let mut state = state_with(&[(Register::R0, u32::from(b'H')), (Register::R1, 41)]);
        apply(0b110010_000_001_0000, None, &mut state, outchar);
        expect_that!(state.video()[41], eq(u32::from(b'H')));

        apply(0b110101_010_0000000, None, &mut state, inchar);
        expect_that!(state.register(Register::R2), eq(NO_KEY));
        let op = Operation {
            word: 0b110101_010_0000000u16.into(),
            address: state.pc(),
            operand: None,
            next_pc: state.pc() + 1,
            state: &state,
            key: Some(b'k'),
        };
        let effect = inchar(&op).unwrap();
        assert_eq!(effect.registers, vec![(Register::R2, u32::from(b'k'))]);
    }
    #[gtest]
    pub fn test_opcode_halt_breakp_nop() {
        let state = state_with(&[]);
        let effect = run(0b001111_0000000000, None, &state, halt).unwrap();
        expect_that!(effect.pc, eq(state.halt_sentinel()));
        expect_that!(effect.is_pc_only(), eq(true));
        let effect = run(0b001110_0000000000, None, &state, breakp).unwrap();
        expect_that!(effect.break_requested, eq(true));
        let effect = run(0, None, &state, nop).unwrap();
        expect_that!(effect.pc, eq(1));
    }
}
