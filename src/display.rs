//! Translation of raw machine words into glyphs of a [`CharacterMap`].
use crate::format::charmap::CharacterMap;
use crate::hardware::ExecutionState;
use crate::hardware::registers::Register;
use std::ops::Range;

/// Shown for codes the character map does not contain.
pub const PLACEHOLDER_GLYPH: &str = "\u{FFFD}";

/// Video cells hold the character code in the low byte, higher bits select the colour.
const CHARACTER_MASK: u32 = 0xFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Region {
    /// Memory words in the range, clamped to the memory size.
    Memory(Range<usize>),
    /// `r0` to `r7`, then `sp`.
    Registers,
    /// Every video cell, row by row.
    Screen,
}

/// Glyph of `code`, or [`PLACEHOLDER_GLYPH`].
#[must_use]
pub fn glyph(charmap: &CharacterMap, code: u32) -> &str {
    charmap.glyph(code).unwrap_or(PLACEHOLDER_GLYPH)
}

/// One glyph per word of `region`.
#[must_use]
pub fn render<'c>(
    state: &ExecutionState,
    charmap: &'c CharacterMap,
    region: Region,
) -> Vec<&'c str> {
    match region {
        Region::Memory(range) => {
            let memory = state.memory().as_slice();
            let end = range.end.min(memory.len());
            let start = range.start.min(end);
            memory[start..end]
                .iter()
                .map(|word| glyph(charmap, *word))
                .collect()
        }
        Region::Registers => Register::ALL
            .iter()
            .map(|r| glyph(charmap, state.register(*r)))
            .collect(),
        Region::Screen => state
            .video()
            .iter()
            .map(|cell| glyph(charmap, cell & CHARACTER_MASK))
            .collect(),
    }
}

/// The screen as lines of `columns` glyphs each.
#[must_use]
pub fn screen_rows(state: &ExecutionState, charmap: &CharacterMap, columns: usize) -> Vec<String> {
    render(state, charmap, Region::Screen)
        .chunks(columns.max(1))
        .map(<[&str]>::concat)
        .collect()
}
