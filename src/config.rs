//! Simulation parameters that are not part of the loaded files.

mod defaults {
    /// Cycles a run may spend per word of program before it counts as diverged.
    pub const CYCLE_GUARD_PER_WORD: u64 = 100_000;
    /// Text screen of the ICMC video controller, 40 columns by 30 rows.
    pub const SCREEN_COLUMNS: usize = 40;
    pub const SCREEN_ROWS: usize = 30;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// `None` lets `run` go on until halt, fault, breakpoint or cancellation.
    pub cycle_guard_per_word: Option<u64>,
    pub screen_columns: usize,
    pub screen_rows: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            cycle_guard_per_word: Some(defaults::CYCLE_GUARD_PER_WORD),
            screen_columns: defaults::SCREEN_COLUMNS,
            screen_rows: defaults::SCREEN_ROWS,
        }
    }
}

impl SimConfig {
    #[must_use]
    pub const fn with_cycle_guard(mut self, per_word: Option<u64>) -> Self {
        self.cycle_guard_per_word = per_word;
        self
    }
    #[must_use]
    pub const fn screen_size(&self) -> usize {
        self.screen_columns * self.screen_rows
    }
    /// Maximum cycle count for a program of `program_length` words.
    #[must_use]
    pub fn cycle_limit(&self, program_length: usize) -> Option<u64> {
        let words = u64::try_from(program_length.max(1)).unwrap_or(u64::MAX);
        self.cycle_guard_per_word
            .map(|per_word| per_word.saturating_mul(words))
    }
}
