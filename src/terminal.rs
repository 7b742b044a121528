use crossterm::{ExecutableCommand, QueueableCommand, cursor, terminal};
use std::io;
use std::io::Write;
use tracing::warn;

/// Restores cooked mode when dropped.
pub struct RawLock {}

impl Drop for RawLock {
    fn drop(&mut self) {
        // terminal stays in raw mode but no means to repair
        if let Err(e) = terminal::disable_raw_mode() {
            warn!(error = %e, "could not reset terminal");
        }
    }
}

/// Set terminal to raw in best-effort mode, only log on failure, since it does not work for
/// cargo doc tests and disabling does not work because of a
/// [rust issue](https://github.com/rust-lang/rust/issues/67295).
pub fn set_terminal_raw(mut stdout: impl Write) -> RawLock {
    if let Err(e) =
        terminal::enable_raw_mode().and_then(|()| stdout.execute(terminal::EnableLineWrap))
    {
        warn!(error = %e, "could not set terminal to raw mode");
    }
    RawLock {}
}

/// Writes `lines` starting each one in the first column, works in raw and cooked mode.
pub fn print_lines<S: AsRef<str>>(stdout: &mut impl Write, lines: &[S]) -> io::Result<()> {
    for line in lines {
        stdout.queue(cursor::MoveToColumn(0))?;
        stdout.write_all(line.as_ref().trim_end().as_bytes())?;
        stdout.write_all(b"\n")?;
    }
    stdout.queue(cursor::MoveToColumn(0))?;
    stdout.flush()
}
