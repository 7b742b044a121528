//! Simulation controller: drives the executor under step, run, reset and breakpoint commands.
use crate::config::SimConfig;
use crate::emulator::{fetch, step};
use crate::errors::{Fault, SimulationError};
use crate::format::Program;
use crate::format::charmap::CharacterMap;
use crate::hardware::keyboard::{KeyboardInputProvider, NoKeyboard};
use crate::hardware::{Effect, ExecutionState};
use displaydoc::Display;
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Lifecycle of a simulation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimStatus {
    /// Program loaded or reset, nothing executed yet.
    Loaded,
    /// Only observable by observers while `step` or `run` execute.
    Running,
    Paused,
    Halted,
    /// A fault ended the session, only `reset` continues it.
    Faulted,
}

/// How a `run` ended, unless it faulted.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// paused at breakpoint {0:#06x}
    Breakpoint(usize),
    /// paused by BREAKP at {0:#06x}
    BreakInstruction(usize),
    /// program halted
    Halted,
    /// run was cancelled
    Cancelled,
    /// gave up after {0} cycles without halting
    Diverged(u64),
}

/// Why the simulation stopped last.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// paused after a single step
    Step,
    /// paused at breakpoint {0:#06x}
    Breakpoint(usize),
    /// paused by BREAKP at {0:#06x}
    BreakInstruction(usize),
    /// program halted
    Halted,
    /// run was cancelled
    Cancelled,
    /// gave up after {0} cycles without halting
    Diverged(u64),
    /// {0}
    Fault(Fault),
}

impl From<RunOutcome> for StopReason {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Breakpoint(pc) => Self::Breakpoint(pc),
            RunOutcome::BreakInstruction(pc) => Self::BreakInstruction(pc),
            RunOutcome::Halted => Self::Halted,
            RunOutcome::Cancelled => Self::Cancelled,
            RunOutcome::Diverged(cycles) => Self::Diverged(cycles),
        }
    }
}

/// Cooperative cancellation of a `run`, honored between instructions.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Gets notified synchronously on every status transition.
pub trait Observer: Send {
    fn on_state_changed(&mut self, status: SimStatus, state: &ExecutionState);
}

impl<F> Observer for F
where
    F: FnMut(SimStatus, &ExecutionState) + Send,
{
    fn on_state_changed(&mut self, status: SimStatus, state: &ExecutionState) {
        self(status, state);
    }
}

/// One simulation session of a loaded program.
///
/// All mutation goes through `&mut self`, so a session has a single writer by construction.
/// Share it between threads with [`crate::emulator::handle::SimulationHandle`].
pub struct Simulation {
    program: Arc<Program>,
    charmap: Arc<CharacterMap>,
    initial: ExecutionState,
    state: ExecutionState,
    status: SimStatus,
    breakpoints: BTreeSet<usize>,
    stop_reason: Option<StopReason>,
    config: SimConfig,
    keyboard: Box<dyn KeyboardInputProvider>,
    observers: Vec<Box<dyn Observer>>,
    cancel: CancelToken,
}

impl Debug for Simulation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("status", &self.status)
            .field("pc", &self.state.pc())
            .field("cycles", &self.state.cycles())
            .field("breakpoints", &self.breakpoints)
            .field("stop_reason", &self.stop_reason)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Session in status `Loaded`, `state` is also the state `reset` restores.
    #[must_use]
    pub fn new(
        program: impl Into<Arc<Program>>,
        charmap: Arc<CharacterMap>,
        state: ExecutionState,
        config: SimConfig,
    ) -> Self {
        Self {
            program: program.into(),
            charmap,
            initial: state.clone(),
            state,
            status: SimStatus::Loaded,
            breakpoints: BTreeSet::new(),
            stop_reason: None,
            config,
            keyboard: Box::new(NoKeyboard),
            observers: Vec::new(),
            cancel: CancelToken::default(),
        }
    }
    #[must_use]
    pub fn with_keyboard(mut self, keyboard: Box<dyn KeyboardInputProvider>) -> Self {
        self.keyboard = keyboard;
        self
    }
    pub fn add_observer(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Executes one instruction.
    ///
    /// A halted session stays halted and reports `Halted` again.
    ///
    /// # Errors
    /// - `SimulationError::Fault` if the instruction faulted, the state is left as before
    /// - `SimulationError::SessionFaulted` if an earlier fault ended the session
    pub fn step(&mut self) -> Result<SimStatus, SimulationError> {
        match self.status {
            SimStatus::Halted => return Ok(SimStatus::Halted),
            SimStatus::Faulted => return Err(SimulationError::SessionFaulted),
            _ => {}
        }
        self.transition(SimStatus::Running);
        match self.execute_one() {
            Ok(_) if self.state.is_halted() => self.stop(StopReason::Halted),
            Ok(_) => self.stop(StopReason::Step),
            Err(Fault::Halted) => self.stop(StopReason::Halted),
            Err(fault) => return Err(self.fault(fault)),
        }
        Ok(self.status)
    }

    /// Executes instructions until the program halts, a breakpoint or `BREAKP` is reached,
    /// the run is cancelled or the cycle guard gives up.
    ///
    /// Breakpoints are checked before every instruction but the first, so a run can
    /// continue from the breakpoint it stopped at.
    ///
    /// # Errors
    /// - see [`Simulation::step`]
    pub fn run(&mut self) -> Result<RunOutcome, SimulationError> {
        match self.status {
            SimStatus::Halted => return Ok(RunOutcome::Halted),
            SimStatus::Faulted => return Err(SimulationError::SessionFaulted),
            _ => {}
        }
        self.cancel.clear();
        self.keyboard.clear_interrupt();
        let limit = self.config.cycle_limit(self.program.len());
        self.transition(SimStatus::Running);

        let mut executed = 0u64;
        let outcome = loop {
            let pc = self.state.pc();
            if self.cancel.is_cancelled() || self.keyboard.is_interrupted() {
                break RunOutcome::Cancelled;
            }
            if executed > 0 && self.breakpoints.contains(&pc) {
                break RunOutcome::Breakpoint(pc);
            }
            if let Some(limit) = limit
                && executed >= limit
            {
                warn!(cycles = executed, pc, "run exceeded its cycle guard");
                break RunOutcome::Diverged(executed);
            }
            let result = self.execute_one();
            executed += 1;
            match result {
                Ok(_) if self.state.is_halted() => break RunOutcome::Halted,
                Ok(effect) if effect.break_requested => break RunOutcome::BreakInstruction(pc),
                Ok(_) => {}
                Err(Fault::Halted) => break RunOutcome::Halted,
                Err(fault) => return Err(self.fault(fault)),
            }
        };
        self.stop(outcome.into());
        Ok(outcome)
    }

    /// Restores the loaded state, breakpoints are kept.
    pub fn reset(&mut self) {
        self.state.clone_from(&self.initial);
        self.stop_reason = None;
        self.cancel.clear();
        self.keyboard.clear_interrupt();
        self.transition(SimStatus::Loaded);
    }

    /// Returns `false` if the breakpoint was already set.
    pub fn add_breakpoint(&mut self, address: usize) -> bool {
        self.breakpoints.insert(address)
    }
    /// Returns `false` if there was no such breakpoint.
    pub fn remove_breakpoint(&mut self, address: usize) -> bool {
        self.breakpoints.remove(&address)
    }
    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    #[must_use]
    pub const fn status(&self) -> SimStatus {
        self.status
    }
    #[must_use]
    pub const fn state(&self) -> &ExecutionState {
        &self.state
    }
    #[must_use]
    pub const fn breakpoints(&self) -> &BTreeSet<usize> {
        &self.breakpoints
    }
    #[must_use]
    pub const fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }
    #[must_use]
    pub const fn charmap(&self) -> &Arc<CharacterMap> {
        &self.charmap
    }
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }
    /// Token that cancels a `run` in progress from another thread.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn execute_one(&mut self) -> Result<Effect, Fault> {
        let reads_input = fetch(self.program.table(), &self.state).is_ok_and(|(_, def)| def.reads_input);
        let key = if reads_input { self.poll_key() } else { None };
        let effect = step(&self.program, &self.state, key)?;
        self.state.apply_effect(&effect)?;
        Ok(effect)
    }

    fn poll_key(&mut self) -> Option<u8> {
        self.keyboard.poll_key().unwrap_or_else(|e| {
            warn!(error = %e, "keyboard could not be read");
            None
        })
    }

    fn stop(&mut self, reason: StopReason) {
        let status = if self.state.is_halted() {
            info!(cycles = self.state.cycles(), "program halted");
            SimStatus::Halted
        } else {
            SimStatus::Paused
        };
        self.stop_reason = Some(reason);
        self.transition(status);
    }

    fn fault(&mut self, fault: Fault) -> SimulationError {
        warn!(%fault, pc = self.state.pc(), "simulation faulted");
        self.stop_reason = Some(StopReason::Fault(fault));
        self.transition(SimStatus::Faulted);
        SimulationError::Fault(fault)
    }

    fn transition(&mut self, status: SimStatus) {
        debug!(from = ?self.status, to = ?status, pc = self.state.pc(), "status changed");
        self.status = status;
        for observer in &mut self.observers {
            observer.on_state_changed(status, &self.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::test_helpers::{asm, program};
    use crate::hardware::keyboard::ScriptedKeyboard;
    use crate::hardware::registers::Register;
    use googletest::prelude::*;
    use std::io;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<(SimStatus, usize, u64)>>>;

    fn simulation(words: &[u32]) -> Simulation {
        let program = program(words);
        let config = SimConfig::default();
        let state = program.initial_state(&config);
        Simulation::new(program, Arc::new(CharacterMap::default()), state, config)
    }

    fn observed(sim: &mut Simulation) -> Log {
        let log = Log::default();
        let sink = Arc::clone(&log);
        sim.add_observer(move |status: SimStatus, state: &ExecutionState| {
            sink.lock()
                .unwrap()
                .push((status, state.pc(), state.cycles()));
        });
        log
    }

    fn statuses(log: &Log) -> Vec<SimStatus> {
        log.lock().unwrap().iter().map(|(s, _, _)| *s).collect()
    }

    fn counting_loop() -> Vec<u32> {
        // loop: inc r0 ; jmp loop
        let mut words = vec![asm::inc(0)];
        words.extend(asm::jump(0, 0));
        words
    }

    #[gtest]
    pub fn test_halt_at_address_zero() {
        let mut sim = simulation(&[asm::HALT]);
        let log = observed(&mut sim);
        let before = sim.state().clone();

        expect_that!(sim.step(), ok(eq(SimStatus::Halted)));
        expect_that!(sim.state().pc(), eq(1));
        assert_eq!(sim.state().registers(), before.registers());
        assert_eq!(sim.state().memory(), before.memory());
        assert_eq!(statuses(&log), [SimStatus::Running, SimStatus::Halted]);

        // stays halted without further notifications
        expect_that!(sim.step(), ok(eq(SimStatus::Halted)));
        expect_that!(sim.run(), ok(eq(RunOutcome::Halted)));
        expect_that!(log.lock().unwrap().len(), eq(2));
        expect_that!(sim.stop_reason(), some(eq(StopReason::Halted)));
    }
    #[gtest]
    pub fn test_step_pauses() {
        let mut sim = simulation(&[asm::NOP, asm::HALT]);
        expect_that!(sim.status(), eq(SimStatus::Loaded));
        expect_that!(sim.step(), ok(eq(SimStatus::Paused)));
        expect_that!(sim.stop_reason(), some(eq(StopReason::Step)));
        expect_that!(sim.step(), ok(eq(SimStatus::Halted)));
    }
    #[gtest]
    pub fn test_breakpoint_pauses_run() {
        let mut sim = simulation(&[asm::NOP, asm::NOP, asm::NOP, asm::NOP, asm::HALT]);
        expect_that!(sim.add_breakpoint(3), eq(true));
        expect_that!(sim.add_breakpoint(3), eq(false));

        expect_that!(sim.run(), ok(eq(RunOutcome::Breakpoint(3))));
        expect_that!(sim.state().pc(), eq(3));
        expect_that!(sim.status(), eq(SimStatus::Paused));

        // the next run starts on the breakpoint and passes it
        expect_that!(sim.run(), ok(eq(RunOutcome::Halted)));
        expect_that!(sim.status(), eq(SimStatus::Halted));
    }
    #[gtest]
    pub fn test_breakpoint_edits() {
        let mut sim = simulation(&[asm::NOP, asm::NOP, asm::HALT]);
        sim.add_breakpoint(1);
        sim.add_breakpoint(2);
        expect_that!(sim.remove_breakpoint(1), eq(true));
        expect_that!(sim.remove_breakpoint(1), eq(false));
        expect_that!(sim.run(), ok(eq(RunOutcome::Breakpoint(2))));
        sim.clear_breakpoints();
        expect_that!(sim.breakpoints().is_empty(), eq(true));
        expect_that!(sim.run(), ok(eq(RunOutcome::Halted)));
    }
    #[gtest]
    pub fn test_break_instruction_pauses_run() {
        let mut sim = simulation(&[asm::NOP, asm::BREAKP, asm::HALT]);
        expect_that!(sim.run(), ok(eq(RunOutcome::BreakInstruction(1))));
        expect_that!(sim.state().pc(), eq(2));
        expect_that!(sim.status(), eq(SimStatus::Paused));
        expect_that!(sim.run(), ok(eq(RunOutcome::Halted)));
    }
    #[gtest]
    pub fn test_cycle_guard_stops_endless_loop() {
        let program = program(&counting_loop());
        let config = SimConfig::default().with_cycle_guard(Some(10));
        let state = program.initial_state(&config);
        let mut sim = Simulation::new(program, Arc::new(CharacterMap::default()), state, config);

        // 3 words * 10 cycles per word
        expect_that!(sim.run(), ok(eq(RunOutcome::Diverged(30))));
        expect_that!(sim.status(), eq(SimStatus::Paused));
        expect_that!(sim.state().cycles(), eq(30));
        expect_that!(sim.state().register(Register::R0), eq(15));

        // the guard applies per run
        expect_that!(sim.run(), ok(eq(RunOutcome::Diverged(30))));
        expect_that!(sim.state().cycles(), eq(60));
    }
    #[gtest]
    pub fn test_cancel_from_observer() {
        let mut sim = simulation(&counting_loop());
        let token = sim.cancel_token();
        sim.add_observer(move |status: SimStatus, _: &ExecutionState| {
            if status == SimStatus::Running {
                token.cancel();
            }
        });
        expect_that!(sim.run(), ok(eq(RunOutcome::Cancelled)));
        expect_that!(sim.status(), eq(SimStatus::Paused));
        expect_that!(sim.state().cycles(), eq(0));
    }
    #[gtest]
    pub fn test_cancel_before_run_is_dropped() {
        let mut sim = simulation(&[asm::NOP, asm::HALT]);
        sim.cancel_token().cancel();
        expect_that!(sim.run(), ok(eq(RunOutcome::Halted)));
        expect_that!(sim.cancel_token().is_cancelled(), eq(false));
    }
    #[gtest]
    pub fn test_invalid_opcode_faults_and_rolls_back() {
        let mut sim = simulation(&[asm::NOP, 0xFC00, asm::HALT]);
        let log = observed(&mut sim);
        sim.step().unwrap();
        let before = sim.state().clone();

        expect_that!(
            sim.step(),
            err(eq(SimulationError::Fault(Fault::InvalidOpcode {
                opcode: 63,
                address: 1
            })))
        );
        assert_eq!(sim.state(), &before);
        expect_that!(sim.status(), eq(SimStatus::Faulted));
        expect_that!(
            sim.stop_reason(),
            some(eq(StopReason::Fault(Fault::InvalidOpcode {
                opcode: 63,
                address: 1
            })))
        );
        expect_that!(sim.step(), err(eq(SimulationError::SessionFaulted)));
        expect_that!(sim.run(), err(eq(SimulationError::SessionFaulted)));
        assert_eq!(
            statuses(&log),
            [
                SimStatus::Running,
                SimStatus::Paused,
                SimStatus::Running,
                SimStatus::Faulted
            ]
        );
        sim.reset();
        expect_that!(sim.status(), eq(SimStatus::Loaded));
    }
    #[gtest]
    pub fn test_stack_underflow_faults_run() {
        // pop r0 on an empty stack
        let mut sim = simulation(&[0x1800, asm::HALT]);
        let before = sim.state().clone();
        expect_that!(
            sim.run(),
            err(eq(SimulationError::Fault(Fault::AddressOutOfRange {
                address: 64,
                limit: 64
            })))
        );
        assert_eq!(sim.state(), &before);
    }
    #[gtest]
    pub fn test_reset_restores_initial_state() {
        // loadn r1, #'A' ; loadn r2, #3 ; outchar r1, r2 ; call 10 ; halt ; nop ; nop ; rts
        let mut words = Vec::new();
        words.extend(asm::loadn(1, 65));
        words.extend(asm::loadn(2, 3));
        words.push(asm::outchar(1, 2));
        words.extend(asm::call(10));
        words.push(asm::HALT);
        words.extend([asm::NOP, asm::NOP]);
        words.push(asm::RTS);
        let mut sim = simulation(&words);
        let initial = sim.state().clone();
        sim.add_breakpoint(8);

        expect_that!(sim.run(), ok(eq(RunOutcome::Halted)));
        expect_that!(sim.state().video()[3], eq(65));
        expect_that!(sim.state().memory()[63], eq(7));
        expect_that!(sim.state().register(Register::Sp), eq(63));
        assert_ne!(sim.state(), &initial);

        sim.reset();
        assert_eq!(sim.state(), &initial);
        assert_eq!(sim.state(), &sim.program().initial_state(sim.config()));
        expect_that!(sim.status(), eq(SimStatus::Loaded));
        expect_that!(sim.stop_reason(), none());
        expect_that!(sim.breakpoints().contains(&8), eq(true));
    }
    #[gtest]
    pub fn test_notifications_are_deterministic() {
        let words = {
            let mut words = asm::loadn(0, 3).to_vec();
            // loop: dec r0 ; jnz loop ; halt
            words.push(asm::dec(0));
            words.extend(asm::jump(4, 2));
            words.push(asm::HALT);
            words
        };
        let record = || {
            let mut sim = simulation(&words);
            let log = observed(&mut sim);
            sim.add_breakpoint(2);
            sim.step().unwrap();
            sim.run().unwrap();
            sim.run().unwrap();
            sim.reset();
            sim.run().unwrap();
            let entries = log.lock().unwrap().clone();
            entries
        };
        let first = record();
        assert_eq!(first, record());
        assert_eq!(
            first.iter().map(|(s, _, _)| *s).collect::<Vec<_>>(),
            [
                SimStatus::Running,
                SimStatus::Paused,
                SimStatus::Running,
                SimStatus::Paused,
                SimStatus::Running,
                SimStatus::Paused,
                SimStatus::Loaded,
                SimStatus::Running,
                SimStatus::Paused,
            ]
        );
    }
    #[gtest]
    pub fn test_keyboard_is_polled_only_for_input() {
        let words = [asm::NOP, asm::inchar(0), asm::inchar(1), asm::HALT];
        let mut sim = simulation(&words).with_keyboard(Box::new(ScriptedKeyboard::new(b"x")));
        expect_that!(sim.run(), ok(eq(RunOutcome::Halted)));
        expect_that!(sim.state().register(Register::R0), eq(u32::from(b'x')));
        expect_that!(sim.state().register(Register::R1), eq(255));
    }

    /// Reports CTRL-C once, on its first poll.
    #[derive(Default)]
    struct CtrlCOnce {
        fired: bool,
        interrupted: bool,
    }

    impl KeyboardInputProvider for CtrlCOnce {
        fn poll_key(&mut self) -> io::Result<Option<u8>> {
            self.interrupted |= !self.fired;
            self.fired = true;
            Ok(None)
        }
        fn is_interrupted(&self) -> bool {
            self.interrupted
        }
        fn clear_interrupt(&mut self) {
            self.interrupted = false;
        }
    }

    #[gtest]
    pub fn test_keyboard_interrupt_does_not_outlive_reset() {
        let words = [asm::inchar(0), asm::NOP, asm::NOP, asm::HALT];
        let mut sim = simulation(&words).with_keyboard(Box::<CtrlCOnce>::default());
        expect_that!(sim.run(), ok(eq(RunOutcome::Cancelled)));
        expect_that!(sim.state().cycles(), eq(1));

        sim.reset();
        expect_that!(sim.run(), ok(eq(RunOutcome::Halted)));
        expect_that!(sim.state().cycles(), eq(4));
        expect_that!(sim.state().register(Register::R0), eq(255));
    }
    #[gtest]
    pub fn test_compare_selects_jump() {
        // r0 = 2 + 3 ; jgr over the inc when r0 > r2
        let mut words = Vec::new();
        words.extend(asm::loadn(1, 2));
        words.extend(asm::loadn(2, 3));
        words.push(asm::add(0, 1, 2));
        words.push(asm::cmp(0, 2));
        words.extend(asm::jump(7, 9));
        words.push(asm::inc(3));
        words.push(asm::HALT);
        let mut sim = simulation(&words);
        expect_that!(sim.run(), ok(eq(RunOutcome::Halted)));
        expect_that!(sim.state().register(Register::R0), eq(5));
        expect_that!(sim.state().register(Register::R3), eq(0));
        expect_that!(sim.state().cycles(), eq(6));
    }

    mod props {
        use super::{CharacterMap, RunOutcome, SimConfig, SimStatus, Simulation, program};
        use proptest::prelude::*;
        use std::sync::Arc;

        const GUARD_PER_WORD: u64 = 20;

        proptest! {
            #[test]
            fn reset_restores_and_run_stays_bounded(
                words in prop::collection::vec(0u32..0x1_0000, 1..24),
                steps in 0usize..40,
            ) {
                let program = program(&words);
                let config = SimConfig::default().with_cycle_guard(Some(GUARD_PER_WORD));
                let initial = program.initial_state(&config);
                let length = program.len();
                let mut sim = Simulation::new(
                    program,
                    Arc::new(CharacterMap::default()),
                    initial.clone(),
                    config,
                );

                for _ in 0..steps {
                    if !matches!(sim.step(), Ok(SimStatus::Paused)) {
                        break;
                    }
                }
                prop_assert!(sim.state().pc() <= length);
                sim.reset();
                prop_assert_eq!(sim.state(), &initial);
                prop_assert_eq!(sim.status(), SimStatus::Loaded);

                let outcome = sim.run();
                let limit = config.cycle_limit(length).unwrap_or(u64::MAX);
                prop_assert!(sim.state().cycles() <= limit);
                prop_assert!(sim.state().pc() <= length);
                match outcome {
                    Ok(RunOutcome::Halted) => {
                        prop_assert_eq!(sim.status(), SimStatus::Halted);
                    }
                    Ok(_) => {
                        prop_assert_eq!(sim.status(), SimStatus::Paused);
                    }
                    Err(_) => {
                        prop_assert_eq!(sim.status(), SimStatus::Faulted);
                    }
                }
            }
        }
    }
}
