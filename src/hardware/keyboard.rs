use crossterm::event::{KeyCode, KeyModifiers, poll, read};
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

/// Providing Keyboard Input independent of an implementation.
pub trait KeyboardInputProvider: Send {
    /// Returns the next pending key code, never blocks.
    ///
    /// # Errors
    /// - the underlying input device could not be read
    fn poll_key(&mut self) -> io::Result<Option<u8>>;
    /// True if CTRL-C was triggered
    fn is_interrupted(&self) -> bool;
    /// Forgets an earlier CTRL-C, called when a run starts and on reset.
    fn clear_interrupt(&mut self) {}
}

/// Keyboard without keys, `INCHAR` always reads "no key".
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKeyboard;

impl KeyboardInputProvider for NoKeyboard {
    fn poll_key(&mut self) -> io::Result<Option<u8>> {
        Ok(None)
    }
    fn is_interrupted(&self) -> bool {
        false
    }
}

/// Delivers a fixed sequence of keys, one per poll.
#[derive(Debug, Default, Clone)]
pub struct ScriptedKeyboard {
    keys: VecDeque<u8>,
}

impl ScriptedKeyboard {
    #[must_use]
    pub fn new(keys: &[u8]) -> Self {
        Self {
            keys: keys.iter().copied().collect(),
        }
    }
}

impl KeyboardInputProvider for ScriptedKeyboard {
    fn poll_key(&mut self) -> io::Result<Option<u8>> {
        Ok(self.keys.pop_front())
    }
    fn is_interrupted(&self) -> bool {
        false
    }
}

/// Reads key presses from the terminal, which should be in raw mode, see [`crate::terminal`].
#[derive(Debug, Default)]
pub struct TerminalInputProvider {
    is_interrupted: bool,
}

impl TerminalInputProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            is_interrupted: false,
        }
    }
}

impl KeyboardInputProvider for TerminalInputProvider {
    fn poll_key(&mut self) -> io::Result<Option<u8>> {
        if poll(Duration::from_secs(0))?
            && let Some(event) = read()?.as_key_press_event()
        {
            if event.code == KeyCode::Char('c') && event.modifiers == KeyModifiers::CONTROL {
                self.is_interrupted = true;
                return Ok(None);
            }
            return Ok(key_code_to_byte(event.code));
        }
        Ok(None)
    }
    fn is_interrupted(&self) -> bool {
        self.is_interrupted
    }
    fn clear_interrupt(&mut self) {
        self.is_interrupted = false;
    }
}

fn key_code_to_byte(code: KeyCode) -> Option<u8> {
    match code {
        KeyCode::Enter => Some(b'\r'),
        KeyCode::Backspace => Some(0x08),
        KeyCode::Tab => Some(b'\t'),
        KeyCode::Esc => Some(0x1B),
        _ => code
            .as_char()
            .filter(char::is_ascii)
            .and_then(|c| u8::try_from(c).ok()),
    }
}
