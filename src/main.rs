use clap::Parser;
use icmc_simulator::config::SimConfig;
use icmc_simulator::display::screen_rows;
use icmc_simulator::emulator::controller::Simulation;
use icmc_simulator::format::load;
use icmc_simulator::hardware::keyboard::TerminalInputProvider;
use icmc_simulator::terminal::{print_lines, set_terminal_raw};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Runs an ICMC program until it halts and prints the screen it leaves behind.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Program as MIF memory image
    program: PathBuf,
    /// Character map translating codes to glyphs
    charmap: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let args = Args::parse();

    let (program, charmap, state) = match load(&args.program, &args.charmap) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let config = SimConfig::default();
    let mut simulation = Simulation::new(program, Arc::new(charmap), state, config)
        .with_keyboard(Box::new(TerminalInputProvider::new()));

    let mut stdout = io::stdout();
    let outcome = {
        let _lock = stdout.is_terminal().then(|| set_terminal_raw(&mut stdout));
        simulation.run()
    };

    let rows = screen_rows(simulation.state(), simulation.charmap(), config.screen_columns);
    if let Err(e) = print_lines(&mut stdout, &rows) {
        eprintln!("could not print the screen: {e}");
    }
    match outcome {
        Ok(outcome) => {
            eprintln!("{outcome}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
