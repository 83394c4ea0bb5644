//! PDF object parser.
//!
//! Combines lexer tokens into complete objects (arrays, dictionaries,
//! indirect references) and reads `N G obj ... endobj` frames, including
//! stream bodies.
//!
//! # Architecture
//!
//! Recursive descent over [`token`]. Composite types recurse with a depth
//! counter bounded by [`ParserOptions::max_nesting`]; running past the limit
//! is a hard failure rather than a stack overflow.
//!
//! # Error Handling
//!
//! All parsing functions return `IResult` from nom. Callers that need a
//! crate error use [`to_parse_error`] to turn a nom error into
//! [`Error::ParseError`] with a byte offset.

use crate::decoders::hex_value;
use crate::error::Error;
use crate::lexer::{token, Token};
use crate::object::{Dict, Object, ObjectRef};
use crate::parser_config::ParserOptions;
use nom::IResult;

/// Decode escape sequences in PDF literal strings.
///
/// Handles the escapes of ISO 32000-1:2008, Section 7.3.4.2:
///
/// - `\n`, `\r`, `\t`, `\b`, `\f`
/// - `\(`, `\)`, `\\`
/// - `\ddd` octal codes of 1-3 digits
/// - `\<newline>` line continuation
///
/// Unknown escapes keep the backslash.
///
/// ```
/// # use pdf_engine::parser::decode_literal_string_escapes;
/// let decoded = decode_literal_string_escapes(b"Section \\247 71.01");
/// assert_eq!(decoded, b"Section \xa7 71.01");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            result.push(raw[i]);
            i += 1;
            continue;
        }

        let escaped = raw[i + 1];
        let simple = match escaped {
            b'n' => Some(b'\n'),
            b'r' => Some(b'\r'),
            b't' => Some(b'\t'),
            b'b' => Some(0x08),
            b'f' => Some(0x0C),
            b'(' | b')' | b'\\' => Some(escaped),
            _ => None,
        };
        if let Some(byte) = simple {
            result.push(byte);
            i += 2;
            continue;
        }

        match escaped {
            b'\n' => i += 2,
            b'\r' => {
                i += 2;
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let digits = raw[i + 1..]
                    .iter()
                    .take(3)
                    .take_while(|c| (b'0'..=b'7').contains(*c))
                    .count();
                let value = raw[i + 1..i + 1 + digits]
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                result.push((value & 0xFF) as u8);
                i += 1 + digits;
            },
            _ => {
                result.push(b'\\');
                i += 1;
            },
        }
    }

    result
}

/// Decode a hex string body to bytes.
///
/// Whitespace is ignored and an odd trailing digit is padded with 0.
///
/// ```
/// use pdf_engine::parser::decode_hex;
///
/// assert_eq!(decode_hex(b"48656C6C6F"), b"Hello");
/// assert_eq!(decode_hex(b"7"), vec![0x70]);
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = hex_bytes.iter().filter_map(|&c| hex_value(c)).collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn fail(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Convert a nom error raised while parsing `base` into a crate error.
pub fn to_parse_error(base: &[u8], base_offset: u64, err: nom::Err<nom::error::Error<&[u8]>>) -> Error {
    match err {
        nom::Err::Incomplete(_) => Error::UnexpectedEof,
        nom::Err::Error(e) | nom::Err::Failure(e) => Error::ParseError {
            offset: base_offset as usize + base.len().saturating_sub(e.input.len()),
            reason: format!("{:?}", e.code),
        },
    }
}

/// Object parser carrying the nesting limit and strictness.
#[derive(Debug, Clone, Copy)]
pub struct ObjectParser {
    max_nesting: usize,
    strict: bool,
}

impl Default for ObjectParser {
    fn default() -> Self {
        Self::new(&ParserOptions::default())
    }
}

impl ObjectParser {
    /// Parser using the limits in `options`.
    pub fn new(options: &ParserOptions) -> Self {
        Self {
            max_nesting: options.max_nesting,
            strict: options.strict,
        }
    }

    /// Parse one direct object.
    pub fn parse<'a>(&self, input: &'a [u8]) -> IResult<&'a [u8], Object> {
        self.parse_at_depth(input, 0)
    }

    fn parse_at_depth<'a>(&self, input: &'a [u8], depth: usize) -> IResult<&'a [u8], Object> {
        let (rest, tok) = token(input)?;

        match tok {
            Token::Null => Ok((rest, Object::Null)),
            Token::True => Ok((rest, Object::Boolean(true))),
            Token::False => Ok((rest, Object::Boolean(false))),
            Token::Integer(i) => Ok(match reference_tail(rest, i) {
                Some((after, r)) => (after, Object::Reference(r)),
                None => (rest, Object::Integer(i)),
            }),
            Token::Real(r) => Ok((rest, Object::Real(r))),
            Token::LiteralString(bytes) => Ok((rest, Object::String(decode_literal_string_escapes(bytes)))),
            Token::HexString(bytes) => Ok((rest, Object::String(decode_hex(bytes)))),
            Token::Name(name) => Ok((rest, Object::Name(name))),
            Token::ArrayStart => self.parse_array(rest, depth + 1),
            Token::DictStart => {
                let (rest, dict) = self.parse_dict(rest, depth + 1)?;
                Ok((rest, Object::Dictionary(dict)))
            },
            _ => Err(fail(input, nom::error::ErrorKind::Tag)),
        }
    }

    fn check_depth<'a>(&self, input: &'a [u8], depth: usize) -> Result<(), nom::Err<nom::error::Error<&'a [u8]>>> {
        if depth > self.max_nesting {
            log::warn!("Object nesting exceeds {} levels", self.max_nesting);
            return Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::TooLarge)));
        }
        Ok(())
    }

    /// `[ obj1 obj2 ... ]`; an array cut off by end of input keeps its items.
    fn parse_array<'a>(&self, input: &'a [u8], depth: usize) -> IResult<&'a [u8], Object> {
        self.check_depth(input, depth)?;
        let mut items = Vec::new();
        let mut remaining = input;

        loop {
            match token(remaining) {
                Ok((after, Token::ArrayEnd)) => return Ok((after, Object::Array(items))),
                Ok(_) => {
                    let (after, obj) = self.parse_at_depth(remaining, depth)?;
                    items.push(obj);
                    remaining = after;
                },
                Err(nom::Err::Error(_)) if crate::lexer::skip_ws(remaining).is_empty() => {
                    return Ok((&remaining[remaining.len()..], Object::Array(items)));
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// `<< /Key value ... >>`; keys must be names.
    fn parse_dict<'a>(&self, input: &'a [u8], depth: usize) -> IResult<&'a [u8], Dict> {
        self.check_depth(input, depth)?;
        let mut dict = Dict::new();
        let mut remaining = input;

        loop {
            match token(remaining) {
                Ok((after, Token::DictEnd)) => return Ok((after, dict)),
                Ok((after, Token::Name(key))) => {
                    let (after, value) = self.parse_at_depth(after, depth)?;
                    // A null value is equivalent to an absent key.
                    if !value.is_null() {
                        dict.insert(key, value);
                    }
                    remaining = after;
                },
                Ok(_) => return Err(fail(remaining, nom::error::ErrorKind::Tag)),
                Err(nom::Err::Error(_)) if crate::lexer::skip_ws(remaining).is_empty() => {
                    return Ok((&remaining[remaining.len()..], dict));
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Parse `N G obj <object> [stream ... endstream] endobj`.
    ///
    /// `stream_length` turns the dictionary's `/Length` value into a byte
    /// count; it is a callback because the value may be an indirect
    /// reference only the caller can resolve. When the declared length does
    /// not land on `endstream` the body is found by scanning instead.
    pub fn parse_indirect<'a>(
        &self,
        input: &'a [u8],
        stream_length: &dyn Fn(&Object) -> Option<usize>,
    ) -> IResult<&'a [u8], (ObjectRef, Object)> {
        let (rest, id) = match token(input)? {
            (rest, Token::Integer(n)) if n >= 0 => (rest, n),
            _ => return Err(fail(input, nom::error::ErrorKind::Digit)),
        };
        let (rest, gen) = match token(rest)? {
            (rest, Token::Integer(n)) if n >= 0 => (rest, n),
            _ => return Err(fail(rest, nom::error::ErrorKind::Digit)),
        };
        let rest = match token(rest)? {
            (rest, Token::ObjStart) => rest,
            _ => return Err(fail(rest, nom::error::ErrorKind::Tag)),
        };
        let id = ObjectRef::new(id as u32, gen as u16);

        // "N G obj endobj" is an empty object.
        if let Ok((after, Token::ObjEnd)) = token(rest) {
            return Ok((after, (id, Object::Null)));
        }

        let (rest, object) = self.parse(rest)?;

        let (rest, object) = match (object, token(rest)) {
            (Object::Dictionary(dict), Ok((after_kw, Token::StreamStart))) => {
                let declared = dict.get("Length").and_then(stream_length);
                let (after, data) = self.read_stream_body(after_kw, declared)?;
                (
                    after,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::from(data),
                    },
                )
            },
            (object, _) => (rest, object),
        };

        match token(rest) {
            Ok((after, Token::ObjEnd)) => Ok((after, (id, object))),
            _ if self.strict => Err(fail(rest, nom::error::ErrorKind::Tag)),
            _ => {
                log::debug!("Object {} has no endobj keyword", id);
                Ok((rest, (id, object)))
            },
        }
    }

    fn read_stream_body<'a>(&self, input: &'a [u8], declared: Option<usize>) -> IResult<&'a [u8], Vec<u8>> {
        let input = if input.starts_with(b"\r\n") {
            &input[2..]
        } else if input.starts_with(b"\n") {
            &input[1..]
        } else if input.starts_with(b"\r") {
            log::warn!("Stream keyword followed by CR alone, accepting");
            &input[1..]
        } else {
            log::warn!("No end-of-line after stream keyword");
            input
        };

        if let Some(length) = declared {
            if length <= input.len() {
                if let Ok((after, Token::StreamEnd)) = token(&input[length..]) {
                    return Ok((after, input[..length].to_vec()));
                }
            }
            if self.strict {
                return Err(fail(input, nom::error::ErrorKind::LengthValue));
            }
            log::warn!("Stream /Length {} does not end at endstream, scanning", length);
        }

        match find_endstream(input) {
            Some(pos) => {
                let mut end = pos;
                if end > 0 && input[end - 1] == b'\n' {
                    end -= 1;
                }
                if end > 0 && input[end - 1] == b'\r' {
                    end -= 1;
                }
                Ok((&input[pos + b"endstream".len()..], input[..end].to_vec()))
            },
            None if self.strict => Err(fail(input, nom::error::ErrorKind::Eof)),
            None => {
                log::warn!("Stream without endstream, taking {} bytes to end of input", input.len());
                Ok((&input[input.len()..], input.to_vec()))
            },
        }
    }
}

/// After an integer, check for `G R` completing an indirect reference.
fn reference_tail(input: &[u8], id: i64) -> Option<(&[u8], ObjectRef)> {
    let (after_gen, gen) = match token(input) {
        Ok((rest, Token::Integer(gen))) => (rest, gen),
        _ => return None,
    };
    match token(after_gen) {
        Ok((rest, Token::R)) if id >= 0 && (0..=i64::from(u16::MAX)).contains(&gen) => {
            Some((rest, ObjectRef::new(id as u32, gen as u16)))
        },
        _ => None,
    }
}

fn find_endstream(input: &[u8]) -> Option<usize> {
    let keyword = b"endstream";
    input.windows(keyword.len()).position(|window| window == keyword)
}

/// Parse a PDF object with default limits.
///
/// ```
/// use pdf_engine::parser::parse_object;
///
/// let (_, obj) = parse_object(b"[ 1 2 /Name ]").unwrap();
/// assert_eq!(obj.as_array().map(|a| a.len()), Some(3));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    ObjectParser::default().parse(input)
}
