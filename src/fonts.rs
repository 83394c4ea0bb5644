//! Font collaborator: glyph advances and Unicode mapping.
//!
//! The interpreter only needs two answers from a font: how far the pen
//! moves for a character code, and what text the code stands for. Both go
//! through the [`FontMetrics`] trait so a full font subsystem can be
//! plugged in with a [`FontLoader`]. The built-in [`DictionaryFont`] answers
//! from the font dictionary alone (`/Widths`, `/W`, `/ToUnicode`).

use crate::decoders::hex_value;
use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::Object;
use crate::store::ObjectStore;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Metrics and text mapping of one font.
pub trait FontMetrics: Send + Sync + Debug {
    /// Split a shown string into `(code, byte length)` pairs.
    fn decode_codes(&self, bytes: &[u8]) -> Vec<(u32, usize)> {
        bytes.iter().map(|&b| (u32::from(b), 1)).collect()
    }

    /// Advance `(w0, w1)` of a code in thousandths of text space.
    fn measure_glyph_advance(&self, code: u32) -> (f32, f32);

    /// Unicode text for a code.
    fn to_unicode(&self, code: u32) -> Option<String>;

    /// Ascender in thousandths of text space.
    fn ascent(&self) -> f32 {
        750.0
    }

    /// Descender in thousandths of text space (negative below the baseline).
    fn descent(&self) -> f32 {
        -250.0
    }

    /// Name for diagnostics.
    fn name(&self) -> &str;
}

/// Builds [`FontMetrics`] for font dictionaries found in resources.
pub trait FontLoader: Send + Sync + Debug {
    /// Load the font described by `font` (a resolved font dictionary).
    fn load(&self, store: &ObjectStore, font: &Object) -> Result<Arc<dyn FontMetrics>>;
}

/// Loader producing [`DictionaryFont`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct DictionaryFontLoader;

impl FontLoader for DictionaryFontLoader {
    fn load(&self, store: &ObjectStore, font: &Object) -> Result<Arc<dyn FontMetrics>> {
        Ok(Arc::new(DictionaryFont::from_dict(store, font)?))
    }
}

/// Font metrics read straight from a font dictionary.
#[derive(Debug, Clone)]
pub struct DictionaryFont {
    name: String,
    /// Two-byte codes (Type0 fonts)
    composite: bool,
    first_char: u32,
    widths: Vec<f32>,
    /// Per-CID widths from a Type0 `/W` array
    cid_widths: HashMap<u32, f32>,
    default_width: f32,
    /// Glyph space to thousandths of text space (Type3 `/FontMatrix`)
    scale: f32,
    ascent: f32,
    descent: f32,
    to_unicode: HashMap<u32, String>,
}

impl DictionaryFont {
    /// Metrics used before any `Tf`, or when a font cannot be loaded.
    pub fn fallback() -> Self {
        Self {
            name: "Fallback".to_string(),
            composite: false,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: 500.0,
            scale: 1.0,
            ascent: 750.0,
            descent: -250.0,
            to_unicode: HashMap::new(),
        }
    }

    /// Read metrics from a font dictionary.
    pub fn from_dict(store: &ObjectStore, font: &Object) -> Result<Self> {
        let dict = font.as_dict().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: font.type_name().to_string(),
        })?;
        let subtype = dict.get("Subtype").and_then(|o| o.as_name()).unwrap_or("Type1");
        let name = dict
            .get("BaseFont")
            .and_then(|o| o.as_name())
            .unwrap_or(subtype)
            .to_string();

        let mut font = DictionaryFont {
            name,
            ..DictionaryFont::fallback()
        };

        let descriptor_owner = if subtype == "Type0" {
            font.composite = true;
            font.default_width = 1000.0;
            let descendant = match store.resolve_dict_entry(dict, "DescendantFonts")? {
                Some(fonts) => match fonts.as_array().and_then(|a| a.first()) {
                    Some(first) => store.resolve(first)?.map(|h| h.into_owned()),
                    None => None,
                },
                None => None,
            };
            if let Some(cid_font) = &descendant {
                if let Some(dw) = cid_font.get("DW").and_then(|o| o.as_number()) {
                    font.default_width = dw as f32;
                }
                if let Some(w) = cid_font.get("W") {
                    if let Some(w) = store.resolve(w)? {
                        font.cid_widths = parse_cid_widths(&w, store)?;
                    }
                }
            }
            descendant
        } else {
            font.first_char = dict
                .get("FirstChar")
                .and_then(|o| o.as_integer())
                .map_or(0, |n| n.max(0) as u32);
            if let Some(widths) = store.resolve_dict_entry(dict, "Widths")? {
                font.widths = numbers(&widths, store)?;
            }
            if subtype == "Type3" {
                if let Some(matrix) = store.resolve_dict_entry(dict, "FontMatrix")? {
                    if let Some(a) = numbers(&matrix, store)?.first() {
                        font.scale = a * 1000.0;
                    }
                }
            } else if font.widths.is_empty() && font.name.contains("Courier") {
                font.default_width = 600.0;
            }
            Some(font_object(dict))
        };

        let descriptor = match &descriptor_owner {
            Some(owner) => match owner.get("FontDescriptor") {
                Some(d) => store.resolve(d)?.map(|h| h.into_owned()),
                None => None,
            },
            None => None,
        };
        if let Some(descriptor) = descriptor {
            if let Some(missing) = descriptor.get("MissingWidth").and_then(|o| o.as_number()) {
                if !font.composite {
                    font.default_width = missing as f32;
                }
            }
            if let Some(ascent) = descriptor.get("Ascent").and_then(|o| o.as_number()) {
                if ascent != 0.0 {
                    font.ascent = ascent as f32;
                }
            }
            if let Some(descent) = descriptor.get("Descent").and_then(|o| o.as_number()) {
                if descent != 0.0 {
                    font.descent = descent as f32;
                }
            }
        }

        if let Some(cmap) = store.resolve_dict_entry(dict, "ToUnicode")? {
            if cmap.is_stream() {
                match cmap.decode_stream_data_with_options(store.options()) {
                    Ok(data) => font.to_unicode = parse_to_unicode(&data),
                    Err(e) => log::warn!("Font {}: unreadable /ToUnicode: {}", font.name, e),
                }
            }
        }

        log::debug!(
            "Loaded font {} ({} widths, {} CID widths, {} unicode mappings)",
            font.name,
            font.widths.len(),
            font.cid_widths.len(),
            font.to_unicode.len()
        );
        Ok(font)
    }
}

fn font_object(dict: &crate::object::Dict) -> Object {
    Object::Dictionary(dict.clone())
}

fn numbers(array: &Object, store: &ObjectStore) -> Result<Vec<f32>> {
    let mut out = Vec::new();
    for item in array.as_array().map(|a| a.as_slice()).unwrap_or(&[]) {
        let value = store.resolve(item)?.and_then(|o| o.as_number());
        out.push(value.unwrap_or(0.0) as f32);
    }
    Ok(out)
}

/// `/W` array: `c [w1 w2 ...]` and `c_first c_last w` groups.
fn parse_cid_widths(w: &Object, store: &ObjectStore) -> Result<HashMap<u32, f32>> {
    let mut widths = HashMap::new();
    let items = w.as_array().map(|a| a.as_slice()).unwrap_or(&[]);
    let mut i = 0;
    while i < items.len() {
        let Some(first) = items[i].as_integer() else {
            log::warn!("Malformed /W array at index {}", i);
            break;
        };
        let first = first.max(0) as u32;
        match items.get(i + 1) {
            Some(list @ Object::Array(_)) => {
                for (offset, width) in numbers(list, store)?.into_iter().enumerate() {
                    widths.insert(first + offset as u32, width);
                }
                i += 2;
            },
            Some(last) => {
                let (Some(last), Some(width)) = (last.as_integer(), items.get(i + 2).and_then(|o| o.as_number())) else {
                    log::warn!("Malformed /W range at index {}", i);
                    break;
                };
                for cid in first..=(last.max(0) as u32).min(first.saturating_add(65_535)) {
                    widths.insert(cid, width as f32);
                }
                i += 3;
            },
            None => break,
        }
    }
    Ok(widths)
}

fn hex_code(digits: &[u8]) -> (u32, usize) {
    let mut value = 0u32;
    let mut count = 0;
    for &c in digits {
        if let Some(v) = hex_value(c) {
            value = (value << 4) | u32::from(v);
            count += 1;
        }
    }
    (value, count)
}

fn hex_text(digits: &[u8]) -> String {
    let bytes = crate::parser::decode_hex(digits);
    let units: Vec<u16> = bytes.chunks(2).map(|pair| match pair {
        [hi, lo] => u16::from_be_bytes([*hi, *lo]),
        [single] => u16::from(*single),
        _ => 0,
    }).collect();
    String::from_utf16_lossy(&units)
}

/// Read `bfchar` and `bfrange` mappings from a ToUnicode CMap.
pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    #[derive(PartialEq)]
    enum Section {
        None,
        Char,
        Range,
    }

    let mut map = HashMap::new();
    let mut section = Section::None;
    let mut pending: Vec<Token<'_>> = Vec::new();
    let mut input = data;

    while !input.is_empty() {
        let (rest, tok) = match token(input) {
            Ok(parsed) => parsed,
            Err(_) => {
                input = &input[1..];
                continue;
            },
        };
        input = rest;

        match tok {
            Token::Keyword(b"beginbfchar") => section = Section::Char,
            Token::Keyword(b"beginbfrange") => section = Section::Range,
            Token::Keyword(b"endbfchar") | Token::Keyword(b"endbfrange") => {
                section = Section::None;
                pending.clear();
            },
            Token::HexString(_) | Token::ArrayStart | Token::ArrayEnd | Token::Name(_) if section != Section::None => {
                pending.push(tok);
                match (&section, pending.as_slice()) {
                    (Section::Char, [Token::HexString(src), Token::HexString(dst)]) => {
                        map.insert(hex_code(src).0, hex_text(dst));
                        pending.clear();
                    },
                    (Section::Range, [Token::HexString(lo), Token::HexString(hi), Token::HexString(dst)]) => {
                        let (lo, hi) = (hex_code(lo).0, hex_code(hi).0);
                        let base = hex_text(dst);
                        let mut units: Vec<u16> = base.encode_utf16().collect();
                        for code in lo..=hi.min(lo.saturating_add(65_535)) {
                            map.insert(code, String::from_utf16_lossy(&units));
                            if let Some(last) = units.last_mut() {
                                *last = last.wrapping_add(1);
                            }
                        }
                        pending.clear();
                    },
                    (Section::Range, [Token::HexString(lo), Token::HexString(_), Token::ArrayStart, middle @ .., Token::ArrayEnd]) => {
                        let lo = hex_code(lo).0;
                        for (offset, dst) in middle.iter().enumerate() {
                            if let Token::HexString(dst) = dst {
                                map.insert(lo + offset as u32, hex_text(dst));
                            }
                        }
                        pending.clear();
                    },
                    (Section::Char, slice) if slice.len() >= 2 => pending.clear(),
                    (Section::Range, [_, _, Token::ArrayStart, ..]) => {},
                    (Section::Range, slice) if slice.len() >= 3 => pending.clear(),
                    _ => {},
                }
            },
            _ => {},
        }
    }
    map
}

/// WinAnsi characters in 0x80..=0x9F; the rest of the byte range maps to Latin-1.
fn win_ansi(code: u8) -> Option<char> {
    Some(match code {
        0x80 => '€',
        0x82 => '‚',
        0x83 => 'ƒ',
        0x84 => '„',
        0x85 => '…',
        0x86 => '†',
        0x87 => '‡',
        0x88 => 'ˆ',
        0x89 => '‰',
        0x8A => 'Š',
        0x8B => '‹',
        0x8C => 'Œ',
        0x8E => 'Ž',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '•',
        0x96 => '–',
        0x97 => '—',
        0x98 => '˜',
        0x99 => '™',
        0x9A => 'š',
        0x9B => '›',
        0x9C => 'œ',
        0x9E => 'ž',
        0x9F => 'Ÿ',
        0x80..=0x9F => return None,
        other => other as char,
    })
}

impl FontMetrics for DictionaryFont {
    fn decode_codes(&self, bytes: &[u8]) -> Vec<(u32, usize)> {
        if !self.composite {
            return bytes.iter().map(|&b| (u32::from(b), 1)).collect();
        }
        bytes
            .chunks(2)
            .map(|pair| match pair {
                [hi, lo] => (u32::from(u16::from_be_bytes([*hi, *lo])), 2),
                [single] => (u32::from(*single), 1),
                _ => (0, 0),
            })
            .collect()
    }

    fn measure_glyph_advance(&self, code: u32) -> (f32, f32) {
        let width = if self.composite {
            self.cid_widths.get(&code).copied().unwrap_or(self.default_width)
        } else {
            code.checked_sub(self.first_char)
                .and_then(|i| self.widths.get(i as usize))
                .copied()
                .unwrap_or(self.default_width)
        };
        (width * self.scale, 0.0)
    }

    fn to_unicode(&self, code: u32) -> Option<String> {
        if let Some(text) = self.to_unicode.get(&code) {
            return Some(text.clone());
        }
        if self.composite {
            return char::from_u32(code).map(|c| c.to_string());
        }
        u8::try_from(code).ok().and_then(win_ansi).map(|c| c.to_string())
    }

    fn ascent(&self) -> f32 {
        self.ascent
    }

    fn descent(&self) -> f32 {
        self.descent
    }

    fn name(&self) -> &str {
        &self.name
    }
}
