//! # ICMC Simulator.
//!
//! `icmc-simulator` executes programs of the 16 bit ICMC processor, given as MIF memory
//! images, one instruction at a time.
//! Usage starts with loading a program and a character map via `format::load`.
//!
//!  # Example
//! ```
//! use icmc_simulator::config::SimConfig;
//! use icmc_simulator::emulator::controller::{RunOutcome, Simulation};
//! use icmc_simulator::format::Program;
//! use icmc_simulator::format::charmap::CharacterMap;
//! use std::sync::Arc;
//!
//! let program = Program::parse("WIDTH=16;\nDEPTH=16;\nCONTENT BEGIN\n0 : 3C00;\nEND;").unwrap();
//! assert_eq!(program.listing()[0].to_string(), "0x0000: halt");
//! let config = SimConfig::default();
//! let state = program.initial_state(&config);
//! let mut sim = Simulation::new(program, Arc::new(CharacterMap::default()), state, config);
//! assert_eq!(sim.run(), Ok(RunOutcome::Halted));
//! ```
//! # Errors
//! - Program or character map file unreadable or malformed
//! - Instruction faults (unknown opcode, access outside of memory) stop the session

pub mod config;
pub mod display;
pub mod emulator;
pub mod errors;
pub mod format;
pub mod hardware;
pub mod numbers;
pub mod terminal;
