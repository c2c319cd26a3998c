//! Font decoding for text extraction
//!
//! Handles the two font shapes the label generators emit:
//! - simple fonts (one byte per code, `/Widths` + `/FirstChar`)
//! - Type0 / CID fonts (two bytes per code, `/W` + `/DW` on the descendant)
//!
//! Codes are mapped to Unicode through the `/ToUnicode` CMap when present,
//! otherwise simple fonts fall back to a Latin-1 reading.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use crate::pdf_util::{number, resolve, stream_bytes};

/// Default glyph advance (thousandths of an em) when a font carries no widths.
const DEFAULT_SIMPLE_WIDTH: f64 = 500.0;
const DEFAULT_CID_WIDTH: f64 = 1000.0;

/// Decoded font information needed to turn string operands into text and advances.
#[derive(Debug, Clone)]
pub struct FontInfo {
    two_byte: bool,
    to_unicode: Option<CMap>,
    widths: HashMap<u32, f64>,
    default_width: f64,
}

/// A single decoded glyph.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub code: u32,
    pub text: String,
    /// Advance in thousandths of an em
    pub width: f64,
    /// True for the single-byte space code, which receives word spacing
    pub is_space_code: bool,
}

impl FontInfo {
    /// Fallback used when an operator references a font the resources do not define.
    pub fn fallback() -> Self {
        Self {
            two_byte: false,
            to_unicode: None,
            widths: HashMap::new(),
            default_width: DEFAULT_SIMPLE_WIDTH,
        }
    }

    pub fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let two_byte = font
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .is_some_and(|subtype| subtype == b"Type0");

        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_stream().ok())
            .and_then(|s| stream_bytes(s).ok())
            .map(|bytes| CMap::parse(&bytes));

        let (widths, default_width) = if two_byte {
            cid_widths(doc, font)
        } else {
            simple_widths(doc, font)
        };

        Self {
            two_byte,
            to_unicode,
            widths,
            default_width,
        }
    }

    /// Split a string operand into glyphs.
    pub fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        let codes: Vec<u32> = if self.two_byte {
            bytes
                .chunks(2)
                .map(|c| {
                    if c.len() == 2 {
                        u32::from(c[0]) << 8 | u32::from(c[1])
                    } else {
                        u32::from(c[0])
                    }
                })
                .collect()
        } else {
            bytes.iter().map(|&b| u32::from(b)).collect()
        };

        codes
            .into_iter()
            .map(|code| {
                let text = match self.to_unicode.as_ref().and_then(|m| m.lookup(code)) {
                    Some(s) => s.to_string(),
                    None if self.two_byte => char::from_u32(code)
                        .filter(|c| !c.is_control())
                        .map(String::from)
                        .unwrap_or_default(),
                    None => latin1(code),
                };
                Glyph {
                    code,
                    text,
                    width: self.widths.get(&code).copied().unwrap_or(self.default_width),
                    is_space_code: !self.two_byte && code == 32,
                }
            })
            .collect()
    }
}

fn latin1(code: u32) -> String {
    match code {
        // Common WinAnsi punctuation that Latin-1 leaves as C1 controls
        0x91 | 0x92 => "'".to_string(),
        0x93 | 0x94 => "\"".to_string(),
        0x96 | 0x97 => "-".to_string(),
        0x95 => "\u{2022}".to_string(),
        c if c < 0x20 => String::new(),
        c => char::from_u32(c).map(String::from).unwrap_or_default(),
    }
}

fn simple_widths(doc: &Document, font: &Dictionary) -> (HashMap<u32, f64>, f64) {
    let mut widths = HashMap::new();
    let first_char = font
        .get(b"FirstChar")
        .ok()
        .and_then(number)
        .unwrap_or(0.0) as u32;

    if let Some(arr) = font
        .get(b"Widths")
        .ok()
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
    {
        for (i, w) in arr.iter().enumerate() {
            if let Some(w) = number(resolve(doc, w)) {
                widths.insert(first_char + i as u32, w);
            }
        }
    }

    let missing = font
        .get(b"FontDescriptor")
        .ok()
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
        .and_then(|d| d.get(b"MissingWidth").ok())
        .and_then(number)
        .filter(|w| *w > 0.0)
        .unwrap_or(DEFAULT_SIMPLE_WIDTH);

    (widths, missing)
}

fn cid_widths(doc: &Document, font: &Dictionary) -> (HashMap<u32, f64>, f64) {
    let mut widths = HashMap::new();
    let descendant = font
        .get(b"DescendantFonts")
        .ok()
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
        .and_then(|a| a.first())
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok());

    let Some(descendant) = descendant else {
        return (widths, DEFAULT_CID_WIDTH);
    };

    let default_width = descendant
        .get(b"DW")
        .ok()
        .and_then(number)
        .unwrap_or(DEFAULT_CID_WIDTH);

    if let Some(w) = descendant
        .get(b"W")
        .ok()
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
    {
        // Either `c [w1 w2 ...]` or `c_first c_last w`
        let mut i = 0;
        while i < w.len() {
            let Some(start) = number(resolve(doc, &w[i])) else {
                break;
            };
            let start = start as u32;
            match w.get(i + 1).map(|o| resolve(doc, o)) {
                Some(Object::Array(list)) => {
                    for (offset, item) in list.iter().enumerate() {
                        if let Some(width) = number(resolve(doc, item)) {
                            widths.insert(start + offset as u32, width);
                        }
                    }
                    i += 2;
                }
                Some(end) => {
                    let end = number(end).unwrap_or(0.0) as u32;
                    let width = w
                        .get(i + 2)
                        .map(|o| resolve(doc, o))
                        .and_then(number)
                        .unwrap_or(default_width);
                    for code in start..=end.max(start) {
                        widths.insert(code, width);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    (widths, default_width)
}

/// ToUnicode character map (bfchar and bfrange entries only).
#[derive(Debug, Clone, Default)]
pub struct CMap {
    entries: HashMap<u32, String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Word(String),
    ArrayStart,
    ArrayEnd,
}

impl CMap {
    pub fn lookup(&self, code: u32) -> Option<&str> {
        self.entries.get(&code).map(String::as_str)
    }

    pub fn parse(data: &[u8]) -> Self {
        let tokens = tokenize(data);
        let mut entries = HashMap::new();
        let mut i = 0;

        while i < tokens.len() {
            match &tokens[i] {
                Token::Word(w) if w == "beginbfchar" => {
                    i += 1;
                    while i + 1 < tokens.len() {
                        match (&tokens[i], &tokens[i + 1]) {
                            (Token::Hex(src), Token::Hex(dst)) => {
                                entries.insert(code_of(src), utf16be(dst));
                                i += 2;
                            }
                            _ => break,
                        }
                    }
                }
                Token::Word(w) if w == "beginbfrange" => {
                    i += 1;
                    while i + 2 < tokens.len() {
                        let (Token::Hex(lo), Token::Hex(hi)) = (&tokens[i], &tokens[i + 1]) else {
                            break;
                        };
                        let (lo, hi) = (code_of(lo), code_of(hi));
                        match &tokens[i + 2] {
                            Token::Hex(dst) => {
                                let base = utf16_units(dst);
                                for (offset, code) in (lo..=hi.max(lo)).enumerate() {
                                    let mut units = base.clone();
                                    if let Some(last) = units.last_mut() {
                                        *last = last.wrapping_add(offset as u16);
                                    }
                                    entries.insert(code, String::from_utf16_lossy(&units));
                                }
                                i += 3;
                            }
                            Token::ArrayStart => {
                                let mut j = i + 3;
                                let mut code = lo;
                                while j < tokens.len() {
                                    match &tokens[j] {
                                        Token::Hex(dst) => {
                                            entries.insert(code, utf16be(dst));
                                            code += 1;
                                        }
                                        _ => break,
                                    }
                                    j += 1;
                                }
                                i = j + 1;
                            }
                            _ => break,
                        }
                    }
                }
                _ => i += 1,
            }
        }

        Self { entries }
    }
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| acc << 8 | u32::from(b))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|c| {
            if c.len() == 2 {
                u16::from_be_bytes([c[0], c[1]])
            } else {
                u16::from(c[0])
            }
        })
        .collect()
}

fn utf16be(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let b = data[i];
        match b {
            b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
            b'>' if data.get(i + 1) == Some(&b'>') => i += 2,
            b'<' => {
                let start = i + 1;
                let end = data[start..]
                    .iter()
                    .position(|&c| c == b'>')
                    .map(|p| start + p)
                    .unwrap_or(data.len());
                let digits: Vec<u8> = data[start..end]
                    .iter()
                    .copied()
                    .filter(u8::is_ascii_hexdigit)
                    .collect();
                tokens.push(Token::Hex(hex_bytes(&digits)));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b'(' => {
                // Literal strings only appear in CMap headers; skip them
                let mut depth = 0;
                while i < data.len() {
                    match data[i] {
                        b'\\' => i += 1,
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                i += 1;
            }
            c if c.is_ascii_alphanumeric() || c == b'/' || c == b'.' || c == b'-' => {
                let start = i;
                while i < data.len()
                    && (data[i].is_ascii_alphanumeric() || matches!(data[i], b'/' | b'.' | b'-' | b'_'))
                {
                    i += 1;
                }
                tokens.push(Token::Word(String::from_utf8_lossy(&data[start..i]).into_owned()));
            }
            _ => i += 1,
        }
    }

    tokens
}

fn hex_bytes(digits: &[u8]) -> Vec<u8> {
    let value = |c: u8| (c as char).to_digit(16).unwrap_or(0) as u8;
    digits
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => value(*hi) << 4 | value(*lo),
            [hi] => value(*hi) << 4,
            _ => 0,
        })
        .collect()
}
