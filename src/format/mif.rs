//! Reader for Quartus memory initialization files (MIF).
//!
//! ```text
//! -- line comment            % block comment %
//! WIDTH=16;
//! DEPTH=32768;
//! ADDRESS_RADIX=UNS;
//! DATA_RADIX=BIN;
//! CONTENT BEGIN
//!     0      : 1110000000000000;
//!     1      : 0000000000000101 0000000000000000;
//!     [2..7] : 0000000000000000;
//! END;
//! ```
use crate::errors::{FormatError, FormatErrorKind};
use crate::numbers::DataWidth;
use std::collections::BTreeMap;
use std::vec::IntoIter;

/// Largest supported `DEPTH`, in words.
pub const MAX_DEPTH: usize = 1 << 24;

/// Number notation of addresses and data words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radix {
    Bin,
    Oct,
    /// Decimal, data words may be negative.
    Dec,
    Uns,
    Hex,
}

impl Radix {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "BIN" => Some(Self::Bin),
            "OCT" => Some(Self::Oct),
            "DEC" => Some(Self::Dec),
            "UNS" => Some(Self::Uns),
            "HEX" => Some(Self::Hex),
            _ => None,
        }
    }
    const fn base(self) -> u32 {
        match self {
            Self::Bin => 2,
            Self::Oct => 8,
            Self::Dec | Self::Uns => 10,
            Self::Hex => 16,
        }
    }
    const fn name(self) -> &'static str {
        match self {
            Self::Bin => "BIN",
            Self::Oct => "OCT",
            Self::Dec => "DEC",
            Self::Uns => "UNS",
            Self::Hex => "HEX",
        }
    }
}

/// Contents of a MIF file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MifImage {
    pub width: DataWidth,
    /// Line of the `WIDTH` header.
    pub width_line: usize,
    /// One word per address, `DEPTH` words, uninitialized words are 0.
    pub words: Vec<u32>,
    /// Line that initialized each address.
    pub source_lines: BTreeMap<usize, usize>,
}

impl MifImage {
    #[must_use]
    pub fn depth(&self) -> usize {
        self.words.len()
    }
    /// Highest initialized address + 1, 0 if nothing was initialized.
    #[must_use]
    pub fn extent(&self) -> usize {
        self.source_lines
            .last_key_value()
            .map_or(0, |(address, _)| address + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a str),
    Symbol(char),
    /// `..` of a range record
    Range,
}

#[derive(Debug, Clone, Copy)]
struct Lexeme<'a> {
    token: Token<'a>,
    line: usize,
}

fn malformed(line: usize, message: impl Into<String>) -> FormatError {
    FormatError::new(line, FormatErrorKind::MalformedRecord(message.into()))
}

fn invalid_header(line: usize, message: impl Into<String>) -> FormatError {
    FormatError::new(line, FormatErrorKind::InvalidHeader(message.into()))
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(text: &str) -> Result<Vec<Lexeme<'_>>, FormatError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut chars = text.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        let token = match c {
            '\n' => {
                line += 1;
                continue;
            }
            '%' => {
                let opened = line;
                loop {
                    match chars.next() {
                        Some((_, '%')) => break,
                        Some((_, '\n')) => line += 1,
                        Some(_) => {}
                        None => return Err(malformed(opened, "unterminated `%` comment")),
                    }
                }
                continue;
            }
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                while chars.next_if(|(_, c)| *c != '\n').is_some() {}
                continue;
            }
            '.' if matches!(chars.peek(), Some((_, '.'))) => {
                chars.next();
                Token::Range
            }
            '=' | ':' | ';' | '[' | ']' => Token::Symbol(c),
            c if c.is_whitespace() => continue,
            c if is_word_char(c) || c == '-' => {
                let mut end = start + c.len_utf8();
                while let Some((idx, next)) = chars.next_if(|(_, c)| is_word_char(*c)) {
                    end = idx + next.len_utf8();
                }
                Token::Word(&text[start..end])
            }
            other => return Err(malformed(line, format!("unexpected character `{other}`"))),
        };
        tokens.push(Lexeme { token, line });
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: IntoIter<Lexeme<'a>>,
    line: usize,
}

impl<'a> Parser<'a> {
    fn next(&mut self) -> Option<Lexeme<'a>> {
        let lexeme = self.tokens.next()?;
        self.line = lexeme.line;
        Some(lexeme)
    }
    fn expect_symbol(&mut self, symbol: char, context: &str) -> Result<(), FormatError> {
        match self.next() {
            Some(Lexeme { token: Token::Symbol(c), .. }) if c == symbol => Ok(()),
            _ => Err(malformed(self.line, format!("expected `{symbol}` {context}"))),
        }
    }
    fn expect_word(&mut self, context: &str) -> Result<&'a str, FormatError> {
        match self.next() {
            Some(Lexeme { token: Token::Word(word), .. }) => Ok(word),
            _ => Err(malformed(self.line, format!("expected {context}"))),
        }
    }
}

#[derive(Debug, Default)]
struct Header {
    width: Option<(u32, usize)>,
    depth: Option<(usize, usize)>,
    address_width: Option<(u32, usize)>,
    address_radix: Option<(Radix, usize)>,
    data_radix: Option<(Radix, usize)>,
}

/// Keeps the first declaration of a header key, repeating the same value is accepted.
fn set_once<T: PartialEq>(
    slot: &mut Option<(T, usize)>,
    value: T,
    key: &str,
    line: usize,
) -> Result<(), FormatError> {
    match slot {
        Some((previous, _)) if *previous != value => {
            Err(invalid_header(line, format!("`{key}` is declared twice with different values")))
        }
        Some(_) => Ok(()),
        None => {
            *slot = Some((value, line));
            Ok(())
        }
    }
}

fn header_number(text: &str, line: usize) -> Result<u64, FormatError> {
    text.parse().map_err(|_| {
        FormatError::new(
            line,
            FormatErrorKind::InvalidNumber {
                text: text.to_string(),
                radix: Radix::Uns.name(),
            },
        )
    })
}

fn parse_header(parser: &mut Parser<'_>) -> Result<Header, FormatError> {
    let mut header = Header::default();
    loop {
        let Some(lexeme) = parser.next() else {
            return Err(FormatError::new(parser.line, FormatErrorKind::MissingContent));
        };
        let Token::Word(key) = lexeme.token else {
            return Err(invalid_header(lexeme.line, "expected a header key"));
        };
        let line = lexeme.line;
        if key.eq_ignore_ascii_case("CONTENT") {
            let begin = parser.expect_word("`BEGIN` after `CONTENT`")?;
            if !begin.eq_ignore_ascii_case("BEGIN") {
                return Err(malformed(line, "expected `BEGIN` after `CONTENT`"));
            }
            return Ok(header);
        }
        parser.expect_symbol('=', &format!("after `{key}`"))?;
        let value = parser.expect_word(&format!("a value for `{key}`"))?;
        parser.expect_symbol(';', &format!("after `{key}={value}`"))?;

        let overflow = |_| invalid_header(line, format!("`{key}={value}` is too large"));
        match key.to_ascii_uppercase().as_str() {
            "WIDTH" => {
                let width = u32::try_from(header_number(value, line)?).map_err(overflow)?;
                set_once(&mut header.width, width, key, line)?;
            }
            "DEPTH" => {
                let depth = usize::try_from(header_number(value, line)?).map_err(overflow)?;
                set_once(&mut header.depth, depth, key, line)?;
            }
            "ADDRESS_WIDTH" => {
                let bits = u32::try_from(header_number(value, line)?).map_err(overflow)?;
                set_once(&mut header.address_width, bits, key, line)?;
            }
            "ADDRESS_RADIX" | "DATA_RADIX" => {
                let radix = Radix::parse(value)
                    .ok_or_else(|| invalid_header(line, format!("unknown radix `{value}`")))?;
                let slot = if key.eq_ignore_ascii_case("DATA_RADIX") {
                    &mut header.data_radix
                } else {
                    &mut header.address_radix
                };
                set_once(slot, radix, key, line)?;
            }
            _ => return Err(invalid_header(line, format!("unknown key `{key}`"))),
        }
    }
}

/// Layout of the content section, resolved from the header.
#[derive(Debug, Clone, Copy)]
struct Layout {
    width: DataWidth,
    depth: usize,
    address_radix: Radix,
    data_radix: Radix,
}

fn resolve(header: &Header, content_line: usize) -> Result<Layout, FormatError> {
    let (bits, width_line) = header
        .width
        .ok_or_else(|| FormatError::new(content_line, FormatErrorKind::MissingHeader("WIDTH")))?;
    let width = DataWidth::new(bits).ok_or_else(|| {
        FormatError::new(
            width_line,
            FormatErrorKind::UnsupportedWidth {
                width: bits,
                minimum: 1,
                maximum: DataWidth::MAX_BITS,
            },
        )
    })?;
    let from_address_width = match header.address_width {
        Some((bits, line)) if bits >= usize::BITS || (1usize << bits) > MAX_DEPTH => {
            return Err(invalid_header(line, format!("ADDRESS_WIDTH {bits} exceeds {MAX_DEPTH} words")));
        }
        Some((bits, line)) => Some((1usize << bits, line)),
        None => None,
    };
    let (depth, depth_line) = match (header.depth, from_address_width) {
        (Some((depth, line)), Some((implied, _))) if depth != implied => {
            return Err(invalid_header(line, format!("DEPTH {depth} contradicts ADDRESS_WIDTH ({implied} words)")));
        }
        (Some(declared), _) => declared,
        (None, Some(implied)) => implied,
        (None, None) => {
            return Err(FormatError::new(content_line, FormatErrorKind::MissingHeader("DEPTH")));
        }
    };
    if depth == 0 || depth > MAX_DEPTH {
        return Err(invalid_header(depth_line, format!("DEPTH must be within 1..={MAX_DEPTH}")));
    }
    Ok(Layout {
        width,
        depth,
        address_radix: header.address_radix.map_or(Radix::Hex, |(radix, _)| radix),
        data_radix: header.data_radix.map_or(Radix::Hex, |(radix, _)| radix),
    })
}

fn invalid_number(text: &str, radix: Radix, line: usize) -> FormatError {
    FormatError::new(
        line,
        FormatErrorKind::InvalidNumber {
            text: text.to_string(),
            radix: radix.name(),
        },
    )
}

fn parse_address(text: &str, layout: &Layout, line: usize) -> Result<usize, FormatError> {
    let radix = layout.address_radix;
    let address = u64::from_str_radix(text, radix.base())
        .map_err(|_| invalid_number(text, radix, line))?;
    usize::try_from(address)
        .ok()
        .filter(|a| *a < layout.depth)
        .ok_or_else(|| {
            FormatError::new(
                line,
                FormatErrorKind::AddressOutOfRange {
                    address,
                    depth: layout.depth,
                },
            )
        })
}

fn parse_value(text: &str, layout: &Layout, line: usize) -> Result<u32, FormatError> {
    let (radix, width) = (layout.data_radix, layout.width);
    let too_wide = |value: i64| {
        FormatError::new(
            line,
            FormatErrorKind::ValueTooWide {
                value,
                width: width.bits(),
            },
        )
    };
    if radix == Radix::Dec && text.starts_with('-') {
        let value: i64 = text.parse().map_err(|_| invalid_number(text, radix, line))?;
        return width.encode_signed(value).ok_or_else(|| too_wide(value));
    }
    let value = u64::from_str_radix(text, radix.base())
        .map_err(|_| invalid_number(text, radix, line))?;
    if width.fits(value) {
        Ok(width.truncate(value))
    } else {
        Err(too_wide(i64::try_from(value).unwrap_or(i64::MAX)))
    }
}

/// Target addresses of one content record.
enum Target {
    Single(usize),
    Range(usize, usize),
}

struct Content {
    words: Vec<u32>,
    /// value and line per initialized address
    assigned: BTreeMap<usize, (u32, usize)>,
}

impl Content {
    fn assign(&mut self, address: usize, value: u32, line: usize) -> Result<(), FormatError> {
        if let Some((previous, _)) = self.assigned.get(&address)
            && *previous != value
        {
            return Err(FormatError::new(
                line,
                FormatErrorKind::ConflictingValue {
                    address,
                    previous: *previous,
                    value,
                },
            ));
        }
        self.assigned.insert(address, (value, line));
        self.words[address] = value;
        Ok(())
    }
}

fn parse_target(parser: &mut Parser<'_>, first: Lexeme<'_>, layout: &Layout) -> Result<Target, FormatError> {
    let line = first.line;
    match first.token {
        Token::Word(address) => Ok(Target::Single(parse_address(address, layout, line)?)),
        Token::Symbol('[') => {
            let from = parse_address(parser.expect_word("a start address")?, layout, line)?;
            match parser.next() {
                Some(Lexeme { token: Token::Range, .. }) => {}
                _ => return Err(malformed(line, "expected `..` in address range")),
            }
            let to = parse_address(parser.expect_word("an end address")?, layout, line)?;
            parser.expect_symbol(']', "after address range")?;
            if from > to {
                return Err(malformed(line, format!("address range [{from}..{to}] is reversed")));
            }
            Ok(Target::Range(from, to))
        }
        _ => Err(malformed(line, "expected an address or `[` range")),
    }
}

fn parse_content(parser: &mut Parser<'_>, layout: &Layout) -> Result<Content, FormatError> {
    let mut content = Content {
        words: vec![0; layout.depth],
        assigned: BTreeMap::new(),
    };
    loop {
        let Some(first) = parser.next() else {
            return Err(FormatError::new(parser.line, FormatErrorKind::UnterminatedContent));
        };
        if let Token::Word(word) = first.token
            && word.eq_ignore_ascii_case("END")
        {
            parser.expect_symbol(';', "after `END`")?;
            return Ok(content);
        }
        let line = first.line;
        let target = parse_target(parser, first, layout)?;
        parser.expect_symbol(':', "after address")?;

        let mut values = Vec::new();
        loop {
            match parser.next() {
                Some(Lexeme { token: Token::Word(text), line }) => values.push(parse_value(text, layout, line)?),
                Some(Lexeme { token: Token::Symbol(';'), .. }) if !values.is_empty() => break,
                Some(_) => return Err(malformed(parser.line, "expected a value or `;`")),
                None => return Err(FormatError::new(parser.line, FormatErrorKind::UnterminatedContent)),
            }
        }
        match target {
            Target::Single(start) => {
                for (offset, value) in values.iter().enumerate() {
                    let address = start + offset;
                    if address >= layout.depth {
                        return Err(FormatError::new(
                            line,
                            FormatErrorKind::AddressOutOfRange {
                                address: u64::try_from(address).unwrap_or(u64::MAX),
                                depth: layout.depth,
                            },
                        ));
                    }
                    content.assign(address, *value, line)?;
                }
            }
            Target::Range(from, to) => {
                for (address, value) in (from..=to).zip(values.iter().cycle()) {
                    content.assign(address, *value, line)?;
                }
            }
        }
    }
}

/// Parses the text of a MIF file.
///
/// # Errors
/// - any [`FormatErrorKind`] except `DuplicateCode`, tagged with the offending line
pub fn parse(text: &str) -> Result<MifImage, FormatError> {
    let mut parser = Parser {
        tokens: tokenize(text)?.into_iter(),
        line: 1,
    };
    let header = parse_header(&mut parser)?;
    let layout = resolve(&header, parser.line)?;
    let content = parse_content(&mut parser, &layout)?;
    if let Some(trailing) = parser.next() {
        return Err(FormatError::new(trailing.line, FormatErrorKind::TrailingContent));
    }
    let width_line = header.width.map_or(1, |(_, line)| line);
    Ok(MifImage {
        width: layout.width,
        width_line,
        words: content.words,
        source_lines: content
            .assigned
            .into_iter()
            .map(|(address, (_, line))| (address, line))
            .collect(),
    })
}
