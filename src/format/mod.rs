//! Loading of program images and character maps.
pub mod charmap;
pub mod mif;

use crate::config::SimConfig;
use crate::emulator::decode_listing;
use crate::emulator::instruction::Instruction;
use crate::emulator::table::OpcodeTable;
use crate::errors::{FormatError, FormatErrorKind, LoadError};
use crate::hardware::ExecutionState;
use crate::numbers::DataWidth;
use charmap::CharacterMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A loaded program: the initial memory image and everything derived from it.
#[derive(Debug, Clone)]
pub struct Program {
    image: Vec<u32>,
    width: DataWidth,
    length: usize,
    source_lines: BTreeMap<usize, usize>,
    listing: Vec<Instruction>,
    table: Arc<OpcodeTable>,
}

impl Program {
    /// Parses a MIF program decoded with the ICMC instruction set.
    ///
    /// # Errors
    /// - see [`mif::parse`]
    /// - `UnsupportedWidth` if the data width is narrower than an instruction
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        Self::parse_with(text, Arc::new(OpcodeTable::icmc()))
    }

    /// Parses a MIF program decoded with `table`.
    ///
    /// # Errors
    /// - see [`Program::parse`]
    pub fn parse_with(text: &str, table: Arc<OpcodeTable>) -> Result<Self, FormatError> {
        let image = mif::parse(text)?;
        if image.width.bits() < OpcodeTable::INSTRUCTION_BITS {
            return Err(FormatError::new(
                image.width_line,
                FormatErrorKind::UnsupportedWidth {
                    width: image.width.bits(),
                    minimum: OpcodeTable::INSTRUCTION_BITS,
                    maximum: DataWidth::MAX_BITS,
                },
            ));
        }
        let length = image.extent();
        let listing = decode_listing(&table, &image.words[..length], &image.source_lines);
        Ok(Self {
            width: image.width,
            length,
            image: image.words,
            source_lines: image.source_lines,
            listing,
            table,
        })
    }

    /// Fresh execution state with this program in memory.
    #[must_use]
    pub fn initial_state(&self, config: &SimConfig) -> ExecutionState {
        ExecutionState::new(
            self.image.clone(),
            self.width,
            self.length,
            config.screen_size(),
        )
    }

    #[must_use]
    pub fn image(&self) -> &[u32] {
        &self.image
    }
    #[must_use]
    pub const fn width(&self) -> DataWidth {
        self.width
    }
    #[must_use]
    pub fn depth(&self) -> usize {
        self.image.len()
    }
    /// Highest initialized address + 1, also the halt sentinel.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }
    #[must_use]
    pub fn listing(&self) -> &[Instruction] {
        &self.listing
    }
    /// Line in the program file that initialized `address`.
    #[must_use]
    pub fn source_line(&self, address: usize) -> Option<usize> {
        self.source_lines.get(&address).copied()
    }
    #[must_use]
    pub fn table(&self) -> &OpcodeTable {
        &self.table
    }
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn with_path(path: &Path) -> impl FnOnce(FormatError) -> LoadError + '_ {
    move |source| LoadError::Format {
        path: path.display().to_string(),
        source,
    }
}

/// Loads a program and a character map with the default configuration and the ICMC
/// instruction set.
///
/// # Errors
/// - either file can not be read or is malformed
pub fn load(
    program_path: impl AsRef<Path>,
    charmap_path: impl AsRef<Path>,
) -> Result<(Program, CharacterMap, ExecutionState), LoadError> {
    load_with(
        program_path,
        charmap_path,
        &SimConfig::default(),
        Arc::new(OpcodeTable::icmc()),
    )
}

/// Loads a program and a character map.
///
/// # Errors
/// - either file can not be read or is malformed
pub fn load_with(
    program_path: impl AsRef<Path>,
    charmap_path: impl AsRef<Path>,
    config: &SimConfig,
    table: Arc<OpcodeTable>,
) -> Result<(Program, CharacterMap, ExecutionState), LoadError> {
    let (program_path, charmap_path) = (program_path.as_ref(), charmap_path.as_ref());
    let program = Program::parse_with(&read(program_path)?, table).map_err(with_path(program_path))?;
    let charmap = CharacterMap::parse(&read(charmap_path)?).map_err(with_path(charmap_path))?;
    let state = program.initial_state(config);
    info!(
        program = %program_path.display(),
        words = program.len(),
        depth = program.depth(),
        width = program.width().bits(),
        "program loaded"
    );
    debug!(glyphs = charmap.len(), charmap = %charmap_path.display(), "character map loaded");
    Ok((program, charmap, state))
}
