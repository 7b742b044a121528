//! Character map: code to glyph table used to show memory and screen contents.
//!
//! ```text
//! -- comment
//! 65 : A;
//! 0x20 : " ";
//! 10 : "\n";
//! ```
use crate::errors::{FormatError, FormatErrorKind};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterMap {
    glyphs: BTreeMap<u32, String>,
}

impl CharacterMap {
    /// Parses the text of a character map file.
    ///
    /// # Errors
    /// - `MalformedRecord` for lines without `code : glyph` or with an empty glyph
    /// - `InvalidNumber` for codes that are neither decimal nor `0x` hexadecimal
    /// - `DuplicateCode` if a code is mapped twice
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let mut glyphs = BTreeMap::new();
        let mut first_lines = BTreeMap::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let record = raw.trim();
            if record.is_empty() || record.starts_with("--") {
                continue;
            }
            let (code, glyph) = parse_record(record).map_err(|kind| FormatError::new(line, kind))?;
            match glyphs.entry(code) {
                Entry::Occupied(_) => {
                    let first_line = first_lines.get(&code).copied().unwrap_or_default();
                    return Err(FormatError::new(
                        line,
                        FormatErrorKind::DuplicateCode { code, first_line },
                    ));
                }
                Entry::Vacant(slot) => {
                    slot.insert(glyph);
                    first_lines.insert(code, line);
                }
            }
        }
        Ok(Self { glyphs })
    }

    #[must_use]
    pub fn glyph(&self, code: u32) -> Option<&str> {
        self.glyphs.get(&code).map(String::as_str)
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.glyphs.iter().map(|(code, glyph)| (*code, glyph.as_str()))
    }
}

impl FromIterator<(u32, String)> for CharacterMap {
    fn from_iter<T: IntoIterator<Item = (u32, String)>>(iter: T) -> Self {
        Self {
            glyphs: iter.into_iter().collect(),
        }
    }
}

/// Writes the map in its file format, every glyph quoted.
impl Display for CharacterMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (code, glyph) in &self.glyphs {
            write!(f, "{code} : \"")?;
            for c in glyph.chars() {
                match c {
                    '\\' => write!(f, "\\\\")?,
                    '"' => write!(f, "\\\"")?,
                    '\n' => write!(f, "\\n")?,
                    '\t' => write!(f, "\\t")?,
                    c => write!(f, "{c}")?,
                }
            }
            writeln!(f, "\";")?;
        }
        Ok(())
    }
}

fn malformed(message: &str) -> FormatErrorKind {
    FormatErrorKind::MalformedRecord(message.to_string())
}

fn parse_record(record: &str) -> Result<(u32, String), FormatErrorKind> {
    let (code, glyph) = record
        .split_once(':')
        .ok_or_else(|| malformed("expected `code : glyph`"))?;
    let code = parse_code(code.trim())?;
    let glyph = glyph.trim();
    let glyph = if let Some(quoted) = glyph.strip_prefix('"') {
        parse_quoted(quoted)?
    } else {
        glyph.strip_suffix(';').unwrap_or(glyph).trim_end().to_string()
    };
    if glyph.is_empty() {
        return Err(malformed("empty glyph"));
    }
    Ok((code, glyph))
}

fn parse_code(text: &str) -> Result<u32, FormatErrorKind> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| FormatErrorKind::InvalidNumber {
        text: text.to_string(),
        radix: "DEC or 0x HEX",
    })
}

/// Unescapes a quoted glyph, `rest` starts after the opening quote.
fn parse_quoted(rest: &str) -> Result<String, FormatErrorKind> {
    let mut glyph = String::new();
    let mut chars = rest.chars();
    loop {
        match chars.next() {
            Some('"') => break,
            Some('\\') => match chars.next() {
                Some('\\') => glyph.push('\\'),
                Some('"') => glyph.push('"'),
                Some('n') => glyph.push('\n'),
                Some('t') => glyph.push('\t'),
                Some(other) => return Err(malformed(&format!("unknown escape `\\{other}`"))),
                None => return Err(malformed("unterminated string")),
            },
            Some(c) => glyph.push(c),
            None => return Err(malformed("unterminated string")),
        }
    }
    match chars.as_str().trim() {
        "" | ";" => Ok(glyph),
        _ => Err(malformed("unexpected text after glyph")),
    }
}
