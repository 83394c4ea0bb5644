//! Cross-reference reconstruction for damaged files.
//!
//! When `startxref` is missing or points at garbage, the whole file is
//! scanned for `N G obj` headers and a section is synthesized from what is
//! found. The trailer comes from the last `trailer << ... >>` in the file,
//! else from the last cross-reference stream, else a minimal one is built
//! around the first object that looks like a catalog.
//!
//! Also used for the narrower case of an offset that is a few bytes off
//! ([`find_object_header_near`]).

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::parser::ObjectParser;
use crate::parser_config::ParserOptions;
use crate::source::ByteSource;
use crate::xref::{self, SectionKind, XrefEntry, XrefSection};
use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    /// "N G obj" at the start of a line or after a delimiter
    static ref RE_OBJ_HEADER: Regex = Regex::new(r"(?-u)(?:^|[^0-9])(\d{1,10})[ \t\r\n\f\x00]+(\d{1,5})[ \t\r\n\f\x00]+obj\b").unwrap();

    /// "trailer" followed by a dictionary
    static ref RE_TRAILER: Regex = Regex::new(r"trailer[ \t\r\n\f\x00]*<<").unwrap();

    /// Cross-reference stream dictionaries
    static ref RE_XREF_STREAM: Regex = Regex::new(r"(?-u)/Type[ \t\r\n\f\x00]*/XRef\b").unwrap();
}

/// An `N G obj` header found in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundHeader {
    /// Object reference declared by the header
    pub reference: ObjectRef,
    /// Byte offset of the first digit of the header
    pub offset: u64,
}

/// Every plausible object header in `data`, in file order.
pub fn scan_object_headers(data: &[u8]) -> Vec<FoundHeader> {
    let mut found = Vec::new();
    for capture in RE_OBJ_HEADER.captures_iter(data) {
        let (Some(number), Some(generation)) = (capture.get(1), capture.get(2)) else {
            continue;
        };
        let parsed = std::str::from_utf8(number.as_bytes())
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .zip(std::str::from_utf8(generation.as_bytes()).ok().and_then(|s| s.parse::<u16>().ok()));
        let Some((id, gen)) = parsed else {
            continue;
        };

        // Reject headers whose body cannot start an object, e.g. text inside strings.
        let body = crate::lexer::skip_ws(&data[capture.get(0).map_or(0, |m| m.end())..]);
        let plausible = body
            .first()
            .map_or(true, |&c| matches!(c, b'<' | b'[' | b'(' | b'/' | b't' | b'f' | b'n' | b'-' | b'+' | b'.' | b'e') || c.is_ascii_digit());
        if !plausible {
            log::debug!("Skipping false object header {} {} at offset {}", id, gen, number.start());
            continue;
        }

        found.push(FoundHeader {
            reference: ObjectRef::new(id, gen),
            offset: number.start() as u64,
        });
    }
    found
}

/// Build a section by scanning the whole source.
///
/// Later headers for the same object number win, matching incremental
/// updates appended to the file.
pub fn reconstruct(source: &ByteSource, options: &ParserOptions) -> Result<XrefSection> {
    log::info!("Reconstructing cross-reference data by scanning {} bytes", source.len());
    let data = source.read_from(0)?;
    let headers = scan_object_headers(&data);
    if headers.is_empty() {
        return Err(Error::InvalidPdf("no objects found while reconstructing xref".to_string()));
    }

    let mut section = XrefSection::new(SectionKind::Reconstructed);
    for header in &headers {
        section.insert(
            header.reference.id,
            XrefEntry::Used {
                offset: header.offset,
                generation: header.reference.gen,
            },
        );
    }

    // Compressed objects are only known to xref streams.
    let mut stream_trailer = None;
    for header in headers.iter().rev() {
        let start = header.offset as usize;
        let window = &data[start..data.len().min(start + 512)];
        if !RE_XREF_STREAM.is_match(window) {
            continue;
        }
        match xref::parse_section(&data[start..], options) {
            Ok(stream_section) => {
                for (number, entry) in stream_section.entries() {
                    if matches!(entry, XrefEntry::Compressed { .. }) && section.get(number).is_none() {
                        section.insert(number, entry);
                    }
                }
                if stream_trailer.is_none() {
                    stream_trailer = Some(stream_section.trailer().clone());
                }
            },
            Err(e) => log::debug!("Ignoring unreadable xref stream at offset {}: {}", start, e),
        }
    }

    let trailer = match find_trailer(&data, options) {
        Some(trailer) => trailer,
        None => match stream_trailer {
            Some(trailer) => trailer,
            None => minimal_trailer(&data, &headers, options)?,
        },
    };
    section.set_trailer(strip_chain_keys(trailer));

    log::info!("Reconstructed {} cross-reference entries", section.len());
    Ok(section)
}

/// A reconstructed section stands alone: its links would point back into the damage.
fn strip_chain_keys(mut trailer: Dict) -> Dict {
    trailer.remove("Prev");
    trailer.remove("XRefStm");
    trailer
}

fn find_trailer(data: &[u8], options: &ParserOptions) -> Option<Dict> {
    let parser = ObjectParser::new(options);
    let matches: Vec<usize> = RE_TRAILER.find_iter(data).map(|m| m.start()).collect();
    for start in matches.into_iter().rev() {
        let after_keyword = &data[start + b"trailer".len()..];
        match parser.parse(after_keyword) {
            Ok((_, Object::Dictionary(dict))) if dict.contains_key("Root") => return Some(dict),
            Ok(_) => log::debug!("Trailer at offset {} has no /Root", start),
            Err(e) => log::warn!("Failed to parse trailer at offset {}: {}", start, e),
        }
    }
    None
}

fn minimal_trailer(data: &[u8], headers: &[FoundHeader], options: &ParserOptions) -> Result<Dict> {
    let parser = ObjectParser::new(options);
    let direct_length = |obj: &Object| obj.as_integer().map(|n| n.max(0) as usize);

    let catalog = headers.iter().rev().find(|header| {
        match parser.parse_indirect(&data[header.offset as usize..], &direct_length) {
            Ok((_, (_, object))) => object.get("Type").and_then(|o| o.as_name()) == Some("Catalog"),
            Err(_) => false,
        }
    });

    let catalog = catalog.ok_or_else(|| Error::InvalidPdf("no catalog found while reconstructing xref".to_string()))?;
    log::info!("Using object {} as catalog", catalog.reference);

    let size = headers.iter().map(|h| h.reference.id).max().unwrap_or(0) + 1;
    let mut trailer = Dict::new();
    trailer.insert("Root".to_string(), Object::Reference(catalog.reference));
    trailer.insert("Size".to_string(), Object::Integer(i64::from(size)));
    Ok(trailer)
}

/// Find the header of `reference` within `window` bytes of `offset`.
///
/// Producers sometimes record offsets that are a few bytes off; the match
/// closest to `offset` wins.
pub fn find_object_header_near(
    source: &ByteSource,
    reference: ObjectRef,
    offset: u64,
    window: usize,
) -> Result<Option<u64>> {
    if window == 0 {
        return Ok(None);
    }
    let start = offset.saturating_sub(window as u64);
    let data = source.read_at(start, window * 2 + 32)?;

    let best = scan_object_headers(&data)
        .into_iter()
        .filter(|h| h.reference.id == reference.id)
        .map(|h| start + h.offset)
        .min_by_key(|&found| found.abs_diff(offset));

    if let Some(found) = best {
        log::debug!("Found header of {} at offset {} (recorded {})", reference, found, offset);
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAMAGED: &[u8] = b"%PDF-1.4\n\
        1 0 obj\n\
        << /Type /Catalog /Pages 2 0 R >>\n\
        endobj\n\
        2 0 obj\n\
        << /Type /Pages /Count 0 /Kids [] >>\n\
        endobj\n\
        trailer\n\
        << /Root 1 0 R /Size 3 /Prev 9999 >>\n\
        startxref\n\
        0\n\
        %%EOF";

    #[test]
    fn test_scan_object_headers() {
        let headers = scan_object_headers(DAMAGED);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].reference, ObjectRef::new(1, 0));
        assert_eq!(&DAMAGED[headers[0].offset as usize..headers[0].offset as usize + 7], b"1 0 obj");
    }

    #[test]
    fn test_scan_skips_headers_in_text() {
        let data = b"(see 4 0 obj) 5 0 obj\n<< >>\nendobj";
        let headers = scan_object_headers(data);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].reference.id, 5);
    }

    #[test]
    fn test_reconstruct_uses_trailer_and_drops_links() {
        let source = ByteSource::from_bytes(DAMAGED.to_vec());
        let section = reconstruct(&source, &ParserOptions::default()).unwrap();
        assert_eq!(section.kind(), SectionKind::Reconstructed);
        assert!(matches!(section.get(1), Some(XrefEntry::Used { .. })));
        assert!(matches!(section.get(2), Some(XrefEntry::Used { .. })));
        assert_eq!(
            section.trailer().get("Root").and_then(|o| o.as_reference()),
            Some(ObjectRef::new(1, 0))
        );
        assert_eq!(section.prev_offset(), None);
    }

    #[test]
    fn test_reconstruct_without_trailer_finds_catalog() {
        let data = b"%PDF-1.4\n3 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n\
            7 0 obj\n<< /Type /Catalog /Pages 3 0 R >>\nendobj\n%%EOF";
        let source = ByteSource::from_bytes(data.to_vec());
        let section = reconstruct(&source, &ParserOptions::default()).unwrap();
        assert_eq!(
            section.trailer().get("Root").and_then(|o| o.as_reference()),
            Some(ObjectRef::new(7, 0))
        );
        assert_eq!(section.trailer().get("Size").and_then(|o| o.as_integer()), Some(8));
    }

    #[test]
    fn test_reconstruct_no_objects() {
        let source = ByteSource::from_bytes(b"%PDF-1.4\nnot really a pdf\n%%EOF".to_vec());
        assert!(reconstruct(&source, &ParserOptions::default()).is_err());
    }

    #[test]
    fn test_find_object_header_near() {
        let source = ByteSource::from_bytes(DAMAGED.to_vec());
        let actual = scan_object_headers(DAMAGED)[1].offset;
        let found = find_object_header_near(&source, ObjectRef::new(2, 0), actual + 5, 64).unwrap();
        assert_eq!(found, Some(actual));
        assert_eq!(find_object_header_near(&source, ObjectRef::new(9, 0), actual, 64).unwrap(), None);
        assert_eq!(find_object_header_near(&source, ObjectRef::new(2, 0), actual + 5, 0).unwrap(), None);
    }
}
