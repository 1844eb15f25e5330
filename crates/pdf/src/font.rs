//! Font metrics and Unicode mapping for text extraction.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};

use crate::utils::{get_number, get_stream_content, resolve, resolve_array, resolve_dict};

const DEFAULT_ASCENT: f32 = 800.0;
const DEFAULT_DESCENT: f32 = -200.0;

/// Helvetica advance widths for codes 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112-126
];

/// Widths used when a simple font has no `/Widths` array.
#[derive(Debug, Clone, Copy, PartialEq)]
enum BuiltinMetrics {
    Courier,
    Helvetica,
    Unknown,
}

impl BuiltinMetrics {
    fn for_base_font(name: &str) -> Self {
        if name.contains("Courier") {
            BuiltinMetrics::Courier
        } else if name.contains("Helvetica") || name.contains("Arial") {
            BuiltinMetrics::Helvetica
        } else {
            BuiltinMetrics::Unknown
        }
    }

    fn width(&self, code: u32) -> f32 {
        match self {
            BuiltinMetrics::Courier => 600.0,
            BuiltinMetrics::Helvetica => match code {
                32..=126 => f32::from(HELVETICA_WIDTHS[(code - 32) as usize]),
                _ => 556.0,
            },
            BuiltinMetrics::Unknown => 500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Widths {
    Simple {
        first_char: u32,
        widths: Vec<f32>,
        missing: f32,
        builtin: BuiltinMetrics,
    },
    Cid {
        widths: HashMap<u32, f32>,
        default: f32,
    },
}

/// One decoded character code.
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub code: u32,
    pub bytes: Vec<u8>,
}

/// What the interpreter needs to know about a font.
#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub base_font: String,
    /// Two bytes per code (Type0) instead of one
    pub two_byte: bool,
    pub ascent: f32,
    pub descent: f32,
    widths: Widths,
    to_unicode: Option<HashMap<u32, String>>,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            base_font: String::new(),
            two_byte: false,
            ascent: DEFAULT_ASCENT,
            descent: DEFAULT_DESCENT,
            widths: Widths::Simple {
                first_char: 0,
                widths: Vec::new(),
                missing: 0.0,
                builtin: BuiltinMetrics::Unknown,
            },
            to_unicode: None,
        }
    }
}

impl Font {
    /// Read a font dictionary.
    pub fn load(doc: &Document, dict: &Dictionary) -> Self {
        let base_font = name_of(dict, b"BaseFont").unwrap_or_default();
        let is_type0 = name_of(dict, b"Subtype").as_deref() == Some("Type0");

        let mut font = Font {
            base_font,
            two_byte: is_type0,
            ..Font::default()
        };

        let descriptor_owner = if is_type0 {
            let descendant = dict
                .get(b"DescendantFonts")
                .ok()
                .and_then(|obj| resolve_array(doc, obj))
                .and_then(|arr| arr.first())
                .and_then(|obj| resolve_dict(doc, obj));
            font.widths = Widths::Cid {
                widths: descendant.map(|d| cid_widths(doc, d)).unwrap_or_default(),
                default: descendant
                    .and_then(|d| d.get(b"DW").ok())
                    .and_then(get_number)
                    .unwrap_or(1000.0),
            };
            descendant
        } else {
            font.widths = simple_widths(doc, dict, &font.base_font);
            Some(dict)
        };

        if let Some(descriptor) = descriptor_owner
            .and_then(|d| d.get(b"FontDescriptor").ok())
            .and_then(|obj| resolve_dict(doc, obj))
        {
            if let Some(ascent) = descriptor.get(b"Ascent").ok().and_then(get_number) {
                if ascent != 0.0 {
                    font.ascent = ascent;
                }
            }
            if let Some(descent) = descriptor.get(b"Descent").ok().and_then(get_number) {
                if descent != 0.0 {
                    font.descent = descent;
                }
            }
        }

        font.to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| match obj {
                Object::Stream(stream) => Some(parse_to_unicode(&get_stream_content(stream))),
                _ => None,
            });

        font
    }

    /// Split a shown string into character codes.
    pub fn codes(&self, bytes: &[u8]) -> Vec<Code> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| Code {
                    code: pair.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)),
                    bytes: pair.to_vec(),
                })
                .collect()
        } else {
            bytes
                .iter()
                .map(|b| Code {
                    code: u32::from(*b),
                    bytes: vec![*b],
                })
                .collect()
        }
    }

    /// Horizontal displacement in thousandths of text space units.
    pub fn width(&self, code: u32) -> f32 {
        match &self.widths {
            Widths::Simple {
                first_char,
                widths,
                missing,
                builtin,
            } => {
                if widths.is_empty() {
                    return builtin.width(code);
                }
                code.checked_sub(*first_char)
                    .and_then(|i| widths.get(i as usize).copied())
                    .unwrap_or(*missing)
            }
            Widths::Cid { widths, default } => widths.get(&code).copied().unwrap_or(*default),
        }
    }

    /// Unicode text for a code. Unmappable codes yield U+FFFD.
    pub fn text(&self, code: u32) -> String {
        if let Some(map) = &self.to_unicode {
            if let Some(text) = map.get(&code) {
                return text.clone();
            }
        }
        if self.two_byte {
            return char::REPLACEMENT_CHARACTER.to_string();
        }
        // Latin-1
        u8::try_from(code)
            .map(|b| char::from(b).to_string())
            .unwrap_or_else(|_| char::REPLACEMENT_CHARACTER.to_string())
    }

    /// Word spacing applies to the single-byte code 32 only.
    pub fn is_word_space(&self, code: &Code) -> bool {
        code.bytes == [32]
    }
}

/// Fonts of a page keyed by resource name.
pub type FontMap = HashMap<Vec<u8>, Font>;

/// Fonts of a resource dictionary (a page's or a form XObject's).
pub fn load_fonts(doc: &Document, resources: Option<&Dictionary>) -> FontMap {
    let mut fonts = FontMap::new();
    let Some(font_dict) = resources
        .and_then(|res| res.get(b"Font").ok())
        .and_then(|obj| resolve_dict(doc, obj))
    else {
        return fonts;
    };

    for (name, obj) in font_dict.iter() {
        if let Some(dict) = resolve_dict(doc, obj) {
            let font = Font::load(doc, dict);
            log::debug!(
                "[Font] /{} -> {} ({})",
                String::from_utf8_lossy(name),
                font.base_font,
                if font.two_byte { "2-byte" } else { "1-byte" }
            );
            fonts.insert(name.clone(), font);
        }
    }
    fonts
}

fn name_of(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

fn simple_widths(doc: &Document, dict: &Dictionary, base_font: &str) -> Widths {
    let first_char = dict
        .get(b"FirstChar")
        .ok()
        .and_then(get_number)
        .map(|n| n as u32)
        .unwrap_or(0);
    let widths = dict
        .get(b"Widths")
        .ok()
        .and_then(|obj| resolve_array(doc, obj))
        .map(|arr| {
            arr.iter()
                .map(|o| resolve(doc, o).and_then(get_number).unwrap_or(0.0))
                .collect()
        })
        .unwrap_or_default();
    let missing = dict
        .get(b"FontDescriptor")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .and_then(|d| d.get(b"MissingWidth").ok())
        .and_then(get_number)
        .unwrap_or(0.0);

    Widths::Simple {
        first_char,
        widths,
        missing,
        builtin: BuiltinMetrics::for_base_font(base_font),
    }
}

/// Highest code a two-byte string can show.
const MAX_CID: u32 = 0xFFFF;

/// Parse a CID font `/W` array: `c [w1 w2 ...]` and `c_first c_last w`.
/// Entries past [`MAX_CID`] are ignored.
fn cid_widths(doc: &Document, descendant: &Dictionary) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let Some(arr) = descendant
        .get(b"W")
        .ok()
        .and_then(|obj| resolve_array(doc, obj))
    else {
        return widths;
    };

    let mut i = 0;
    while i < arr.len() {
        let Some(first) = get_number(&arr[i]) else {
            break;
        };
        let first = first as u32;
        match arr.get(i + 1).and_then(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    let code = u32::try_from(offset)
                        .ok()
                        .and_then(|offset| first.checked_add(offset))
                        .filter(|&code| code <= MAX_CID);
                    let Some(code) = code else {
                        break;
                    };
                    if let Some(w) = get_number(w) {
                        widths.insert(code, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(w)) = (get_number(last), arr.get(i + 2).and_then(get_number))
                else {
                    break;
                };
                for code in first..=(last as u32).min(MAX_CID) {
                    widths.insert(code, w);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

// ============ ToUnicode ============

#[derive(Debug, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Word(String),
    Open,
    Close,
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'<' => {
                let end = data[i + 1..]
                    .iter()
                    .position(|&b| b == b'>')
                    .map_or(data.len(), |p| i + 1 + p);
                tokens.push(Token::Hex(decode_hex(&data[i + 1..end])));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b']' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'<' | b'[' | b']' | b'%')
                {
                    i += 1;
                }
                tokens.push(Token::Word(String::from_utf8_lossy(&data[start..i]).into_owned()));
            }
        }
    }
    tokens
}

fn decode_hex(digits: &[u8]) -> Vec<u8> {
    let nibbles: Vec<u8> = digits
        .iter()
        .filter_map(|&c| (c as char).to_digit(16).map(|d| d as u8))
        .collect();
    nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| (u16::from(pair[0]) << 8) | u16::from(pair.get(1).copied().unwrap_or(0)))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Destination string for `code` when it is `offset` past the range start.
fn offset_text(base: &[u8], offset: u32) -> String {
    let mut bytes = base.to_vec();
    if let Some(last) = bytes.len().checked_sub(1) {
        let low = u32::from(bytes[last]) + offset;
        bytes[last] = (low & 0xFF) as u8;
        if last > 0 {
            bytes[last - 1] = bytes[last - 1].wrapping_add((low >> 8) as u8);
        }
    }
    utf16_text(&bytes)
}

/// Parse the `bfchar` and `bfrange` sections of a ToUnicode CMap.
pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    let tokens = tokenize(data);
    let mut map = HashMap::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(w) if w == "beginbfchar" => {
                i += 1;
                while let (Some(Token::Hex(src)), Some(Token::Hex(dst))) =
                    (tokens.get(i), tokens.get(i + 1))
                {
                    map.insert(code_of(src), utf16_text(dst));
                    i += 2;
                }
            }
            Token::Word(w) if w == "beginbfrange" => {
                i += 1;
                while let (Some(Token::Hex(lo)), Some(Token::Hex(hi))) =
                    (tokens.get(i), tokens.get(i + 1))
                {
                    let (lo, hi) = (code_of(lo), code_of(hi));
                    match tokens.get(i + 2) {
                        Some(Token::Hex(dst)) => {
                            for code in lo..=hi.min(lo.saturating_add(0xFFFF)) {
                                map.insert(code, offset_text(dst, code - lo));
                            }
                            i += 3;
                        }
                        Some(Token::Open) => {
                            let mut j = i + 3;
                            let mut code = lo;
                            while let Some(Token::Hex(dst)) = tokens.get(j) {
                                if code <= hi {
                                    map.insert(code, utf16_text(dst));
                                }
                                code += 1;
                                j += 1;
                            }
                            // skip the closing bracket
                            i = j + 1;
                        }
                        _ => break,
                    }
                }
            }
            _ => i += 1,
        }
    }

    map
}
