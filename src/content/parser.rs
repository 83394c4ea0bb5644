//! Content stream parser.
//!
//! Content streams use postfix notation: operands come first, then the
//! operator keyword that consumes them.
//!
//! ```text
//! BT
//!   /F1 12 Tf
//!   100 700 Td
//!   (Hello, World!) Tj
//! ET
//! ```
//!
//! [`ContentReader`] walks the bytes and yields one [`Operation`] per
//! operator keyword with the operands collected since the previous one.
//! Inline images (`BI ... ID <bytes> EI`) come out as a single `BI`
//! operation whose only operand is the image as a stream object.
//!
//! The reader never fails: bytes that cannot start a token are skipped and
//! end of input ends the iteration, dropping any dangling operands.

use crate::content::operators::Operator;
use crate::decoders::expand_filter_name;
use crate::error::Result;
use crate::lexer::{is_delimiter, is_whitespace, skip_ws, token, Token};
use crate::object::{Dict, Object};
use crate::parser::{decode_hex, decode_literal_string_escapes, ObjectParser};
use crate::parser_config::ParserOptions;
use bytes::Bytes;

/// An operator keyword with its raw operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Operator keyword
    pub name: String,
    /// Operands in stream order
    pub operands: Vec<Object>,
}

impl Operation {
    /// Build the typed operator.
    pub fn to_operator(&self) -> Result<Operator> {
        Operator::build(&self.name, self.operands.clone())
    }

    /// Build the typed operator, consuming the operands.
    pub fn into_operator(self) -> Result<Operator> {
        Operator::build(&self.name, self.operands)
    }
}

/// Iterator over the operations of a decoded content stream.
#[derive(Debug, Clone)]
pub struct ContentReader<'a> {
    data: &'a [u8],
    remaining: &'a [u8],
    parser: ObjectParser,
}

impl<'a> ContentReader<'a> {
    /// Reader with default parser limits.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_options(data, &ParserOptions::default())
    }

    /// Reader using the nesting limit in `options`.
    pub fn with_options(data: &'a [u8], options: &ParserOptions) -> Self {
        Self {
            data,
            remaining: data,
            parser: ObjectParser::new(options),
        }
    }

    /// Byte offset of the next unread byte.
    pub fn offset(&self) -> usize {
        self.data.len() - self.remaining.len()
    }

    fn skip_byte(&mut self) {
        if !self.remaining.is_empty() {
            log::debug!("Skipping unparseable content byte at offset {}", self.offset());
            self.remaining = &self.remaining[1..];
        }
    }

    /// Operand object starting at the current position, for arrays and dictionaries.
    fn composite(&mut self) -> Option<Object> {
        match self.parser.parse(self.remaining) {
            Ok((rest, obj)) => {
                self.remaining = rest;
                Some(obj)
            },
            Err(e) => {
                log::warn!("Malformed operand at offset {}: {:?}", self.offset(), e);
                self.skip_byte();
                None
            },
        }
    }

    fn inline_image(&mut self) -> Option<Object> {
        let mut dict = Dict::new();
        loop {
            let (after, key) = match token(self.remaining) {
                Ok(pair) => pair,
                Err(_) => {
                    log::warn!("Inline image dictionary runs past end of content");
                    self.remaining = &self.remaining[self.remaining.len()..];
                    return None;
                },
            };
            match key {
                Token::Keyword(b"ID") => {
                    // Exactly one whitespace byte separates ID from the samples.
                    self.remaining = match after.first() {
                        Some(&c) if is_whitespace(c) => &after[1..],
                        _ => after,
                    };
                    break;
                },
                Token::Name(key) => {
                    self.remaining = after;
                    let Some(value) = self.scalar_or_composite() else {
                        continue;
                    };
                    let key = expand_inline_key(&key);
                    let value = match key {
                        "ColorSpace" | "Filter" => expand_inline_value(value),
                        _ => value,
                    };
                    dict.insert(key.to_string(), value);
                },
                other => {
                    log::warn!("Unexpected {:?} in inline image dictionary", other);
                    self.remaining = after;
                },
            }
        }

        let (data, rest) = split_inline_data(&dict, self.remaining);
        self.remaining = rest;
        dict.insert("Length".to_string(), Object::Integer(data.len() as i64));
        Some(Object::Stream {
            dict,
            data: Bytes::copy_from_slice(data),
        })
    }

    fn scalar_or_composite(&mut self) -> Option<Object> {
        let (after, tok) = token(self.remaining).ok()?;
        match scalar(&tok) {
            Some(obj) => {
                self.remaining = after;
                Some(obj)
            },
            None if matches!(tok, Token::ArrayStart | Token::DictStart) => self.composite(),
            None => {
                self.remaining = after;
                None
            },
        }
    }
}

impl Iterator for ContentReader<'_> {
    type Item = Operation;

    fn next(&mut self) -> Option<Operation> {
        let mut operands = Vec::new();
        loop {
            self.remaining = skip_ws(self.remaining);
            if self.remaining.is_empty() {
                if !operands.is_empty() {
                    log::debug!("{} operands left at end of content", operands.len());
                }
                return None;
            }

            let (after, tok) = match token(self.remaining) {
                Ok(pair) => pair,
                Err(_) => {
                    self.skip_byte();
                    continue;
                },
            };

            if let Some(obj) = scalar(&tok) {
                operands.push(obj);
                self.remaining = after;
                continue;
            }

            let keyword: &[u8] = match tok {
                Token::ArrayStart | Token::DictStart => {
                    if let Some(obj) = self.composite() {
                        operands.push(obj);
                    }
                    continue;
                },
                Token::ArrayEnd | Token::DictEnd => {
                    self.remaining = after;
                    continue;
                },
                Token::Keyword(kw) if kw.len() == 1 && is_delimiter(kw[0]) => {
                    self.remaining = after;
                    continue;
                },
                Token::Keyword(kw) => kw,
                Token::R => b"R",
                Token::ObjStart => b"obj",
                Token::ObjEnd => b"endobj",
                Token::StreamStart => b"stream",
                Token::StreamEnd => b"endstream",
                _ => {
                    self.remaining = after;
                    continue;
                },
            };
            self.remaining = after;

            if keyword == b"BI" {
                return match self.inline_image() {
                    Some(image) => Some(Operation {
                        name: "BI".to_string(),
                        operands: vec![image],
                    }),
                    None => None,
                };
            }

            return Some(Operation {
                name: String::from_utf8_lossy(keyword).into_owned(),
                operands,
            });
        }
    }
}

/// Convert a scalar token straight to an object.
///
/// Integers never start a reference inside content streams, so they are
/// not handed to the object parser.
fn scalar(tok: &Token<'_>) -> Option<Object> {
    Some(match tok {
        Token::Integer(i) => Object::Integer(*i),
        Token::Real(r) => Object::Real(*r),
        Token::LiteralString(raw) => Object::String(decode_literal_string_escapes(raw)),
        Token::HexString(raw) => Object::String(decode_hex(raw)),
        Token::Name(name) => Object::Name(name.clone()),
        Token::True => Object::Boolean(true),
        Token::False => Object::Boolean(false),
        Token::Null => Object::Null,
        _ => return None,
    })
}

fn expand_inline_key(key: &str) -> &str {
    match key {
        "BPC" => "BitsPerComponent",
        "CS" => "ColorSpace",
        "D" => "Decode",
        "DP" => "DecodeParms",
        "F" => "Filter",
        "H" => "Height",
        "IM" => "ImageMask",
        "I" => "Interpolate",
        "W" => "Width",
        "L" => "Length",
        other => other,
    }
}

fn expand_inline_value(value: Object) -> Object {
    match value {
        Object::Name(name) => Object::Name(
            match name.as_str() {
                "G" => "DeviceGray",
                "RGB" => "DeviceRGB",
                "CMYK" => "DeviceCMYK",
                "I" => "Indexed",
                other => expand_filter_name(other),
            }
            .to_string(),
        ),
        Object::Array(items) => Object::Array(items.into_iter().map(expand_inline_value).collect()),
        other => other,
    }
}

/// Byte count of unfiltered samples, when the dictionary pins it down.
fn unfiltered_length(dict: &Dict) -> Option<usize> {
    if dict.contains_key("Filter") {
        return None;
    }
    let width = dict.get("Width")?.as_integer()?;
    let height = dict.get("Height")?.as_integer()?;
    let image_mask = dict.get("ImageMask").and_then(Object::as_bool).unwrap_or(false);
    let (components, bpc) = if image_mask {
        (1, 1)
    } else {
        let components = match dict.get("ColorSpace")? {
            Object::Name(name) => match name.as_str() {
                "DeviceGray" | "CalGray" => 1,
                "DeviceRGB" | "CalRGB" => 3,
                "DeviceCMYK" => 4,
                _ => return None,
            },
            Object::Array(items) if items.first().and_then(Object::as_name) == Some("Indexed") => 1,
            _ => return None,
        };
        (components, dict.get("BitsPerComponent")?.as_integer()?)
    };
    if width <= 0 || height <= 0 || !(1..=16).contains(&bpc) {
        return None;
    }
    let row = width.checked_mul(components)?.checked_mul(bpc)?.checked_add(7)? / 8;
    usize::try_from(row.checked_mul(height)?).ok()
}

fn ei_at(input: &[u8], pos: usize) -> bool {
    input.get(pos..pos + 2) == Some(b"EI")
        && input
            .get(pos + 2)
            .map_or(true, |&c| is_whitespace(c) || is_delimiter(c))
}

/// Whether the bytes after a candidate `EI` look like more content.
fn plausible_tail(tail: &[u8]) -> bool {
    tail.iter()
        .take(32)
        .all(|&c| c == b'\t' || c == b'\n' || c == b'\r' || c == 0x0C || (0x20..0x7F).contains(&c))
}

/// Split inline image samples from the content that follows `EI`.
fn split_inline_data<'a>(dict: &Dict, input: &'a [u8]) -> (&'a [u8], &'a [u8]) {
    if let Some(len) = unfiltered_length(dict) {
        if len <= input.len() {
            let after = skip_ws(&input[len..]);
            let at = input.len() - after.len();
            if ei_at(input, at) {
                return (&input[..len], &input[at + 2..]);
            }
            log::debug!("Inline image of {} bytes not followed by EI, scanning", len);
        }
    }

    if ei_at(input, 0) {
        return (&input[..0], &input[2..]);
    }
    let mut fallback = None;
    for i in 0..input.len().saturating_sub(2) {
        if is_whitespace(input[i]) && ei_at(input, i + 1) {
            if plausible_tail(&input[i + 3..]) {
                return (&input[..i], &input[i + 3..]);
            }
            fallback.get_or_insert(i);
        }
    }
    match fallback {
        Some(i) => (&input[..i], &input[i + 3..]),
        None => {
            log::warn!("Inline image without EI, taking the rest of the content");
            (input, &input[input.len()..])
        },
    }
}

/// Parse a whole content stream into typed operators.
///
/// Operators whose operands do not fit are logged and left out.
///
/// ```
/// use pdf_engine::content::parse_content_stream;
///
/// let stream = b"BT /F1 12 Tf 100 700 Td (Hello) Tj ET";
/// let operators = parse_content_stream(stream);
/// assert_eq!(operators.len(), 5);
/// ```
pub fn parse_content_stream(data: &[u8]) -> Vec<Operator> {
    ContentReader::new(data)
        .filter_map(|operation| {
            let name = operation.name.clone();
            match operation.into_operator() {
                Ok(op) => Some(op),
                Err(e) => {
                    log::warn!("Dropping '{}': {}", name, e);
                    None
                },
            }
        })
        .collect()
}
