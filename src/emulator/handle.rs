//! Thread safe access to a [`Simulation`] through a dedicated owner thread.
//!
//! The owner thread is the only writer of the session. Every command travels through one
//! channel and is answered on its own reply channel, so commands of concurrent clients are
//! executed one after another and the execution state never sees concurrent mutation.
//! Only [`SimulationHandle::cancel`] bypasses the channel, a `run` in progress checks it
//! between instructions.
use crate::emulator::controller::{CancelToken, RunOutcome, SimStatus, Simulation, StopReason};
use crate::errors::SimulationError;
use crate::hardware::ExecutionState;
use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Copy of the observable parts of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub status: SimStatus,
    pub state: ExecutionState,
    pub breakpoints: BTreeSet<usize>,
    pub stop_reason: Option<StopReason>,
}

enum Command {
    Step(Sender<Result<SimStatus, SimulationError>>),
    Run(Sender<Result<RunOutcome, SimulationError>>),
    Reset(Sender<()>),
    AddBreakpoint(usize, Sender<bool>),
    RemoveBreakpoint(usize, Sender<bool>),
    ClearBreakpoints(Sender<()>),
    Snapshot(Sender<Snapshot>),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SimulationHandle {
    commands: Sender<Command>,
    cancel: CancelToken,
}

impl SimulationHandle {
    /// Moves `simulation` to a new owner thread, the join handle returns it after
    /// [`SimulationHandle::shutdown`] or once every handle is dropped.
    #[must_use]
    pub fn spawn(simulation: Simulation) -> (Self, JoinHandle<Simulation>) {
        let cancel = simulation.cancel_token();
        let (commands, receiver) = mpsc::channel();
        let owner = thread::spawn(move || serve(simulation, &receiver));
        (Self { commands, cancel }, owner)
    }

    fn request<T>(&self, command: impl FnOnce(Sender<T>) -> Command) -> Result<T, SimulationError> {
        let (reply, response) = mpsc::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| SimulationError::Disconnected)?;
        response.recv().map_err(|_| SimulationError::Disconnected)
    }

    /// See [`Simulation::step`].
    ///
    /// # Errors
    /// - `Disconnected` if the owner thread is gone
    pub fn step(&self) -> Result<SimStatus, SimulationError> {
        self.request(Command::Step)?
    }
    /// See [`Simulation::run`], blocks until the run ends.
    ///
    /// # Errors
    /// - `Disconnected` if the owner thread is gone
    pub fn run(&self) -> Result<RunOutcome, SimulationError> {
        self.request(Command::Run)?
    }
    /// # Errors
    /// - `Disconnected` if the owner thread is gone
    pub fn reset(&self) -> Result<(), SimulationError> {
        self.request(Command::Reset)
    }
    /// # Errors
    /// - `Disconnected` if the owner thread is gone
    pub fn add_breakpoint(&self, address: usize) -> Result<bool, SimulationError> {
        self.request(|reply| Command::AddBreakpoint(address, reply))
    }
    /// # Errors
    /// - `Disconnected` if the owner thread is gone
    pub fn remove_breakpoint(&self, address: usize) -> Result<bool, SimulationError> {
        self.request(|reply| Command::RemoveBreakpoint(address, reply))
    }
    /// # Errors
    /// - `Disconnected` if the owner thread is gone
    pub fn clear_breakpoints(&self) -> Result<(), SimulationError> {
        self.request(Command::ClearBreakpoints)
    }
    /// Waits for commands queued before it, then copies the session.
    ///
    /// # Errors
    /// - `Disconnected` if the owner thread is gone
    pub fn snapshot(&self) -> Result<Snapshot, SimulationError> {
        self.request(Command::Snapshot)
    }
    /// Cancels a `run` in progress, does not wait for queued commands.
    ///
    /// A `run` clears the token when it starts, so a cancel sent while the `run` is
    /// still queued behind other commands has no effect on it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
    /// Ends the owner thread after the commands queued so far.
    pub fn shutdown(&self) {
        // a missing owner is already shut down
        let _ = self.commands.send(Command::Shutdown);
    }
}

fn serve(mut simulation: Simulation, commands: &Receiver<Command>) -> Simulation {
    debug!("simulation owner started");
    // replies to clients that hung up are dropped
    for command in commands {
        match command {
            Command::Step(reply) => {
                let _ = reply.send(simulation.step());
            }
            Command::Run(reply) => {
                let _ = reply.send(simulation.run());
            }
            Command::Reset(reply) => {
                simulation.reset();
                let _ = reply.send(());
            }
            Command::AddBreakpoint(address, reply) => {
                let _ = reply.send(simulation.add_breakpoint(address));
            }
            Command::RemoveBreakpoint(address, reply) => {
                let _ = reply.send(simulation.remove_breakpoint(address));
            }
            Command::ClearBreakpoints(reply) => {
                simulation.clear_breakpoints();
                let _ = reply.send(());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(Snapshot {
                    status: simulation.status(),
                    state: simulation.state().clone(),
                    breakpoints: simulation.breakpoints().clone(),
                    stop_reason: simulation.stop_reason(),
                });
            }
            Command::Shutdown => break,
        }
    }
    debug!("simulation owner stopped");
    simulation
}
