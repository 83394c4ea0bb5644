//! PDF lexer (tokenizer).
//!
//! Low-level tokenization of PDF byte streams, shared by the object parser,
//! the cross-reference readers and the content-stream reader.
//!
//! # PDF Syntax Overview
//!
//! - Numbers: integers (42, -123) and reals (3.14, -2.5, .5)
//! - Strings: literal ((Hello)) and hexadecimal (<48656C6C6F>)
//! - Names: identifiers starting with / (/Type, /Pages)
//! - Delimiters: `[`, `]`, `<<`, `>>`
//! - Keywords: any other run of regular characters. `true`, `false`,
//!   `null`, `obj`, `endobj`, `stream`, `endstream` and `R` get their own
//!   token; everything else (content operators such as `re`, `RG`, `T*`,
//!   `'`) is returned as [`Token::Keyword`].
//!
//! Keywords are matched on whole regular-character runs, so `RG` is never
//! split into the reference marker `R` followed by `G`.
//!
//! Whitespace (space, \t, \r, \n, \0, \f) and comments (% to EOL) are skipped.

use crate::decoders::hex_value;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, value},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),

    /// Real (floating-point) number (e.g., 3.14, -2.5, .5)
    Real(f64),

    /// Literal string bytes, escapes not yet decoded
    LiteralString(&'a [u8]),

    /// Hexadecimal string digits, whitespace preserved
    HexString(&'a [u8]),

    /// Name with `#XX` escapes decoded
    Name(String),

    /// Boolean true keyword
    True,

    /// Boolean false keyword
    False,

    /// Null keyword
    Null,

    /// Array start delimiter [
    ArrayStart,

    /// Array end delimiter ]
    ArrayEnd,

    /// Dictionary start delimiter <<
    DictStart,

    /// Dictionary end delimiter >>
    DictEnd,

    /// Indirect object start keyword "obj"
    ObjStart,

    /// Indirect object end keyword "endobj"
    ObjEnd,

    /// Stream start keyword "stream"
    StreamStart,

    /// Stream end keyword "endstream"
    StreamEnd,

    /// Reference keyword "R" (used in "10 0 R")
    R,

    /// Any other bare word: content operators, `xref`, `trailer`, stray bytes
    Keyword(&'a [u8]),
}

/// PDF whitespace (ISO 32000-1, Table 1).
#[inline]
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters (ISO 32000-1, Table 2).
#[inline]
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Anything that is neither whitespace nor a delimiter.
#[inline]
pub fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    value((), take_while1(is_whitespace))(input)
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments.
pub fn skip_ws(input: &[u8]) -> &[u8] {
    match many0(alt((whitespace, comment)))(input) {
        Ok((rest, _)) => rest,
        Err(_) => input,
    }
}

fn digit_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
}

/// Parse an integer or real number.
///
/// Accepts a leading sign and reals without an integer or fractional part
/// (`.5`, `5.`). Integers too large for `i64` degrade to reals.
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let start = input;
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    let has_digits = int_part.is_some() || matches!(frac_part, Some(Some(_)));
    if !has_digits {
        return Err(digit_error(start));
    }

    let text = std::str::from_utf8(&start[..start.len() - input.len()])
        .map_err(|_| digit_error(start))?;

    if frac_part.is_none() {
        if let Ok(n) = text.parse::<i64>() {
            return Ok((input, Token::Integer(n)));
        }
    }

    // f64 parsing rejects "5." and "-.5" forms only when no digit follows
    // the sign; rebuild a canonical form.
    let mut canonical = String::with_capacity(text.len() + 2);
    if sign == Some('-') {
        canonical.push('-');
    }
    canonical.push_str(int_part.and_then(|d| std::str::from_utf8(d).ok()).unwrap_or("0"));
    canonical.push('.');
    match frac_part {
        Some(Some(frac)) => canonical.push_str(std::str::from_utf8(frac).unwrap_or("0")),
        _ => canonical.push('0'),
    }
    let num: f64 = canonical.parse().map_err(|_| digit_error(start))?;
    Ok((input, Token::Real(num)))
}

/// Parse a literal string enclosed in balanced parentheses.
///
/// Returns the raw bytes between the outer parentheses; escapes are decoded
/// by the parser. An unterminated string consumes the rest of the input.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0;

    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    Ok((&body[body.len()..], Token::LiteralString(body)))
}

/// Parse a hexadecimal string enclosed in angle brackets.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    delimited(
        char('<'),
        map(take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)), Token::HexString),
        char('>'),
    )(input)
}

/// Decode #XX escape sequences in PDF names.
///
/// Invalid sequences are kept literally.
///
/// ```
/// # use pdf_engine::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hi = hex_value(raw[i + 1]);
            let lo = hex_value(raw[i + 2]);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                bytes.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }

    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(take_while(is_regular), |bytes: &[u8]| Token::Name(decode_name_escapes(bytes))),
    )(input)
}

fn parse_delimiter(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
    ))(input)
}

/// Classify a run of regular characters.
fn parse_word(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, word) = take_while1(is_regular)(input)?;

    if let Ok((after, number)) = parse_number(word) {
        if after.is_empty() {
            return Ok((rest, number));
        }
    }

    let tok = match word {
        b"true" => Token::True,
        b"false" => Token::False,
        b"null" => Token::Null,
        b"obj" => Token::ObjStart,
        b"endobj" => Token::ObjEnd,
        b"stream" => Token::StreamStart,
        b"endstream" => Token::StreamEnd,
        b"R" => Token::R,
        other => Token::Keyword(other),
    };
    Ok((rest, tok))
}

/// Single delimiter bytes that do not start a token (`)`, `>`, `{`, `}`).
fn parse_stray(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    map(
        nom::bytes::complete::take_while_m_n(1, 1, |c: u8| matches!(c, b')' | b'>' | b'{' | b'}')),
        Token::Keyword,
    )(input)
}

/// Parse a single PDF token after skipping whitespace and comments.
///
/// # Errors
///
/// Returns `Err` at end of input or on an unterminated hex string.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let input = skip_ws(input);

    alt((
        parse_name,
        parse_delimiter,
        parse_literal_string,
        parse_hex_string,
        parse_word,
        parse_stray,
    ))(input)
}

/// Parse multiple tokens from input.
pub fn tokens(input: &[u8]) -> IResult<&[u8], Vec<Token<'_>>> {
    many0(token)(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ========================================================================
    // Numbers
    // ========================================================================

    #[test]
    fn test_parse_integers() {
        assert_eq!(token(b"42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"-123"), Ok((&b""[..], Token::Integer(-123))));
        assert_eq!(token(b"+17"), Ok((&b""[..], Token::Integer(17))));
        assert_eq!(token(b"0"), Ok((&b""[..], Token::Integer(0))));
    }

    #[test]
    fn test_parse_reals() {
        assert_eq!(token(b"-2.5"), Ok((&b""[..], Token::Real(-2.5))));
        assert_eq!(token(b".5"), Ok((&b""[..], Token::Real(0.5))));
        assert_eq!(token(b"5."), Ok((&b""[..], Token::Real(5.0))));
        assert_eq!(token(b"-.002"), Ok((&b""[..], Token::Real(-0.002))));
    }

    #[test]
    fn test_huge_integer_degrades_to_real() {
        let (_, tok) = token(b"99999999999999999999").unwrap();
        assert!(matches!(tok, Token::Real(r) if r > 9.9e19));
    }

    #[test]
    fn test_number_followed_by_delimiter() {
        let (rest, tok) = token(b"12]").unwrap();
        assert_eq!(tok, Token::Integer(12));
        assert_eq!(rest, b"]");
    }

    // ========================================================================
    // Strings
    // ========================================================================

    #[test]
    fn test_parse_literal_string_with_nested_parens() {
        let result = token(b"(Hello (nested) World)");
        assert_eq!(result, Ok((&b""[..], Token::LiteralString(b"Hello (nested) World"))));
    }

    #[test]
    fn test_parse_literal_string_with_escaped_paren() {
        let result = token(b"(Open \\( Close \\))");
        assert_eq!(result, Ok((&b""[..], Token::LiteralString(b"Open \\( Close \\)"))));
    }

    #[test]
    fn test_unterminated_literal_string_takes_rest() {
        let (rest, tok) = token(b"(never closed").unwrap();
        assert_eq!(tok, Token::LiteralString(b"never closed"));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_parse_hex_string() {
        assert_eq!(token(b"<48 65 6C>"), Ok((&b""[..], Token::HexString(b"48 65 6C"))));
        assert_eq!(token(b"<>"), Ok((&b""[..], Token::HexString(b""))));
    }

    // ========================================================================
    // Names
    // ========================================================================

    #[test]
    fn test_parse_names() {
        assert_eq!(token(b"/Type"), Ok((&b""[..], Token::Name("Type".to_string()))));
        assert_eq!(token(b"/A#20B"), Ok((&b""[..], Token::Name("A B".to_string()))));
        assert_eq!(token(b"/A#ZZ"), Ok((&b""[..], Token::Name("A#ZZ".to_string()))));
        assert_eq!(token(b"/ "), Ok((&b" "[..], Token::Name(String::new()))));
    }

    #[test]
    fn test_name_stops_at_next_name() {
        let (rest, tok) = token(b"/F1/F2").unwrap();
        assert_eq!(tok, Token::Name("F1".to_string()));
        assert_eq!(rest, b"/F2");
    }

    // ========================================================================
    // Keywords and delimiters
    // ========================================================================

    #[test]
    fn test_reserved_keywords() {
        assert_eq!(token(b"true"), Ok((&b""[..], Token::True)));
        assert_eq!(token(b"false"), Ok((&b""[..], Token::False)));
        assert_eq!(token(b"null"), Ok((&b""[..], Token::Null)));
        assert_eq!(token(b"obj"), Ok((&b""[..], Token::ObjStart)));
        assert_eq!(token(b"endobj"), Ok((&b""[..], Token::ObjEnd)));
        assert_eq!(token(b"stream"), Ok((&b""[..], Token::StreamStart)));
        assert_eq!(token(b"endstream"), Ok((&b""[..], Token::StreamEnd)));
        assert_eq!(token(b"R"), Ok((&b""[..], Token::R)));
    }

    #[test]
    fn test_operator_keywords_respect_boundaries() {
        assert_eq!(token(b"RG"), Ok((&b""[..], Token::Keyword(b"RG"))));
        assert_eq!(token(b"re\n"), Ok((&b"\n"[..], Token::Keyword(b"re"))));
        assert_eq!(token(b"T*"), Ok((&b""[..], Token::Keyword(b"T*"))));
        assert_eq!(token(b"'"), Ok((&b""[..], Token::Keyword(b"'"))));
        assert_eq!(token(b"nulls"), Ok((&b""[..], Token::Keyword(b"nulls"))));
    }

    #[test]
    fn test_delimiters() {
        assert_eq!(token(b"<<"), Ok((&b""[..], Token::DictStart)));
        assert_eq!(token(b">>"), Ok((&b""[..], Token::DictEnd)));
        assert_eq!(token(b"["), Ok((&b""[..], Token::ArrayStart)));
        assert_eq!(token(b"]"), Ok((&b""[..], Token::ArrayEnd)));
    }

    #[test]
    fn test_stray_delimiter_is_a_keyword() {
        assert_eq!(token(b") x"), Ok((&b" x"[..], Token::Keyword(b")"))));
    }

    #[test]
    fn test_end_of_input_is_error() {
        assert!(token(b"   % only a comment").is_err());
        assert!(token(b"").is_err());
    }

    // ========================================================================
    // Sequences
    // ========================================================================

    #[test]
    fn test_skip_comments_between_tokens() {
        let (_, toks) = tokens(b"  % Comment\n  \t% Another\n  42").unwrap();
        assert_eq!(toks, vec![Token::Integer(42)]);
    }

    #[test]
    fn test_content_operator_sequence() {
        let (rest, toks) = tokens(b"1 0 0 RG 0 0 10 10 re f").unwrap();
        assert!(rest.is_empty());
        assert_eq!(toks[3], Token::Keyword(b"RG"));
        assert_eq!(toks[8], Token::Keyword(b"re"));
        assert_eq!(toks[9], Token::Keyword(b"f"));
    }

    #[test]
    fn test_indirect_object_header() {
        let (_, toks) = tokens(b"1 0 obj\n<< /Pages 2 0 R >>\nendobj").unwrap();
        assert_eq!(
            toks,
            vec![
                Token::Integer(1),
                Token::Integer(0),
                Token::ObjStart,
                Token::DictStart,
                Token::Name("Pages".to_string()),
                Token::Integer(2),
                Token::Integer(0),
                Token::R,
                Token::DictEnd,
                Token::ObjEnd,
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_integers_round_trip(n in -1_000_000_000i64..1_000_000_000i64) {
            let text = n.to_string();
            let (rest, tok) = token(text.as_bytes()).unwrap();
            prop_assert!(rest.is_empty());
            prop_assert_eq!(tok, Token::Integer(n));
        }

        #[test]
        fn prop_lexer_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut input: &[u8] = &data;
            while let Ok((rest, _)) = token(input) {
                prop_assert!(rest.len() < input.len());
                input = rest;
            }
        }
    }
}
