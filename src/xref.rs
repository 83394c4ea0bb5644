//! Cross-reference resolver.
//!
//! Maps object numbers to where their bytes live. Two section formats are
//! understood:
//!
//! - classic tables (`xref`, `start count` subsection headers, 20-byte
//!   `oooooooooo ggggg n` records, then `trailer << ... >>`)
//! - cross-reference streams (`/Type /XRef` with `/W`, `/Index`, `/Size`
//!   and packed big-endian records)
//!
//! Sections are linked into an [`XrefChain`], newest first. Every section
//! may point at a *peer* (the `/XRefStm` stream of a hybrid file) and at a
//! *previous* section (`/Prev`, the older incremental update). Links are
//! materialized lazily on the first lookup that misses and are tried at most
//! once.

use crate::error::{Error, Result};
use crate::object::{Dict, Object};
use crate::parser::ObjectParser;
use crate::parser_config::ParserOptions;
use byteorder::{BigEndian, ByteOrder};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Where an object lives, as recorded by one cross-reference section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// Object number is not in use.
    Free {
        /// Next object number in the free list
        next_free: u32,
        /// Generation to use if the number is reused
        generation: u16,
    },
    /// Uncompressed object at a byte offset in the file.
    Used {
        /// Byte offset of the `N G obj` header
        offset: u64,
        /// Generation number
        generation: u16,
    },
    /// Object stored inside an object stream.
    Compressed {
        /// Object number of the containing object stream
        container: u32,
        /// Index of the object within the container
        index: u32,
    },
}

impl XrefEntry {
    /// Generation this entry implies for the object (0 for compressed objects).
    pub fn generation(&self) -> u16 {
        match *self {
            XrefEntry::Free { generation, .. } | XrefEntry::Used { generation, .. } => generation,
            XrefEntry::Compressed { .. } => 0,
        }
    }
}

/// How a section was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Classic `xref` table
    Table,
    /// Cross-reference stream
    Stream,
    /// Synthesized by scanning the file
    Reconstructed,
    /// Built in memory
    Synthetic,
}

/// One cross-reference section and its trailer.
#[derive(Debug, Clone)]
pub struct XrefSection {
    entries: HashMap<u32, XrefEntry>,
    trailer: Dict,
    kind: SectionKind,
}

impl Default for XrefSection {
    fn default() -> Self {
        Self::new(SectionKind::Synthetic)
    }
}

impl XrefSection {
    /// Create an empty section.
    pub fn new(kind: SectionKind) -> Self {
        Self {
            entries: HashMap::new(),
            trailer: Dict::new(),
            kind,
        }
    }

    /// Record an entry. A later record for the same number replaces the earlier one.
    pub fn insert(&mut self, object_number: u32, entry: XrefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Entry recorded for `object_number` in this section only.
    pub fn get(&self, object_number: u32) -> Option<XrefEntry> {
        self.entries.get(&object_number).copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the section has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(object_number, entry)` pairs in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, XrefEntry)> + '_ {
        self.entries.iter().map(|(&n, &e)| (n, e))
    }

    /// Trailer dictionary (the stream dictionary for xref streams).
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Replace the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dict) {
        self.trailer = trailer;
    }

    /// How this section was obtained.
    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    /// `/Prev` offset of the older section.
    pub fn prev_offset(&self) -> Option<u64> {
        trailer_offset(&self.trailer, "Prev")
    }

    /// `/XRefStm` offset of the hybrid-file peer stream.
    pub fn peer_offset(&self) -> Option<u64> {
        trailer_offset(&self.trailer, "XRefStm")
    }
}

fn trailer_offset(trailer: &Dict, key: &str) -> Option<u64> {
    match trailer.get(key).and_then(|o| o.as_integer()) {
        Some(n) if n >= 0 => Some(n as u64),
        Some(n) => {
            log::warn!("Ignoring negative /{} offset {}", key, n);
            None
        },
        None => None,
    }
}

/// Find the byte offset following the last `startxref` keyword.
///
/// `tail` is the end of the file (the last 2 KiB is plenty); CR, LF and
/// CRLF line endings are accepted.
pub fn find_startxref(tail: &[u8]) -> Result<u64> {
    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or(Error::InvalidXref)?;

    split_lines(&tail[pos + keyword.len()..])
        .map(|(_, line)| trim(line))
        .find(|line| !line.is_empty())
        .filter(|line| line.iter().all(u8::is_ascii_digit))
        .and_then(|line| std::str::from_utf8(line).ok()?.parse().ok())
        .ok_or(Error::InvalidXref)
}

/// Parse the section starting at the beginning of `data`.
///
/// `data` holds the file bytes from the section offset on. Classic tables
/// and xref streams are told apart by the first keyword.
pub fn parse_section(data: &[u8], options: &ParserOptions) -> Result<XrefSection> {
    let body = crate::lexer::skip_ws(data);
    if body.starts_with(b"xref") {
        parse_table(body, options)
    } else if body.first().is_some_and(u8::is_ascii_digit) {
        parse_stream(body, options)
    } else {
        Err(Error::InvalidXref)
    }
}

/// Iterate lines as `(byte offset, line)`, splitting on CR, LF and CRLF.
fn split_lines(data: &[u8]) -> impl Iterator<Item = (usize, &[u8])> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        if pos >= data.len() {
            return None;
        }
        let start = pos;
        let end = data[start..]
            .iter()
            .position(|&c| c == b'\r' || c == b'\n')
            .map_or(data.len(), |i| start + i);
        pos = end;
        if data.get(pos) == Some(&b'\r') {
            pos += 1;
        }
        if data.get(pos) == Some(&b'\n') {
            pos += 1;
        }
        Some((start, &data[start..end]))
    })
}

fn trim(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|c| !c.is_ascii_whitespace()).unwrap_or(line.len());
    let end = line.iter().rposition(|c| !c.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &line[start..end]
}

fn parse_u64(field: &[u8]) -> Option<u64> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(field).ok()?.parse().ok()
}

fn fields(line: &[u8]) -> Vec<&[u8]> {
    line.split(|c| c.is_ascii_whitespace()).filter(|f| !f.is_empty()).collect()
}

/// Subsection header `start count`.
fn subsection_header(line: &[u8]) -> Option<(u32, u32)> {
    match fields(line).as_slice() {
        [start, count] => Some((parse_u64(start)? as u32, parse_u64(count)? as u32)),
        _ => None,
    }
}

/// Record `oooooooooo ggggg n|f`.
fn table_record(line: &[u8]) -> Option<XrefEntry> {
    let parts = fields(line);
    if parts.len() < 3 {
        return None;
    }
    let offset = parse_u64(parts[0])?;
    let generation = parse_u64(parts[1])?.min(u64::from(u16::MAX)) as u16;
    match parts[2].first().map(u8::to_ascii_lowercase) {
        Some(b'n') => Some(XrefEntry::Used { offset, generation }),
        Some(b'f') => Some(XrefEntry::Free {
            next_free: offset as u32,
            generation,
        }),
        _ => None,
    }
}

/// Parse a classic table.
///
/// A malformed record ends its subsection: records read so far are kept,
/// lines are skipped up to the next subsection header or the trailer, and
/// parsing resumes there.
fn parse_table(data: &[u8], options: &ParserOptions) -> Result<XrefSection> {
    let mut section = XrefSection::new(SectionKind::Table);
    let mut lines = split_lines(data).skip(1).peekable();
    let mut trailer_at = None;

    // Anything after the `xref` keyword on its own line is ignored.
    'subsections: while let Some((pos, raw)) = lines.next() {
        let line = trim(raw);
        if line.is_empty() || line.starts_with(b"%") {
            continue;
        }
        if line.starts_with(b"trailer") {
            let indent = raw.iter().position(|c| !c.is_ascii_whitespace()).unwrap_or(0);
            trailer_at = Some(pos + indent + b"trailer".len());
            break;
        }

        let Some((start, count)) = subsection_header(line) else {
            log::warn!("Skipping unexpected xref line {:?}", String::from_utf8_lossy(line));
            continue;
        };
        if count > options.max_subsection_count {
            log::warn!("Xref subsection {} has {} entries, over the limit; skipping", start, count);
            continue;
        }

        let mut index = 0u32;
        while index < count {
            let Some(&(_, raw)) = lines.peek() else {
                break 'subsections;
            };
            let line = trim(raw);
            if line.is_empty() {
                lines.next();
                continue;
            }
            if line.starts_with(b"trailer") {
                log::warn!("Xref subsection {} ended after {} of {} entries", start, index, count);
                continue 'subsections;
            }
            match table_record(line) {
                Some(entry) => {
                    section.insert(start.saturating_add(index), entry);
                    lines.next();
                    index += 1;
                },
                None => {
                    log::warn!(
                        "Malformed xref record {:?} for object {}, abandoning subsection",
                        String::from_utf8_lossy(line),
                        start.saturating_add(index)
                    );
                    lines.next();
                    skip_to_next_subsection(&mut lines);
                    continue 'subsections;
                },
            }
        }
    }

    if let Some(pos) = trailer_at {
        let parser = ObjectParser::new(options);
        match parser.parse(&data[pos.min(data.len())..]) {
            Ok((_, Object::Dictionary(dict))) => section.set_trailer(dict),
            Ok((_, other)) => log::warn!("Trailer is a {}, not a dictionary", other.type_name()),
            Err(e) => log::warn!("Failed to parse trailer dictionary: {}", e),
        }
    } else {
        log::warn!("Xref table has no trailer");
    }

    Ok(section)
}

fn skip_to_next_subsection<'a, I>(lines: &mut std::iter::Peekable<I>)
where
    I: Iterator<Item = (usize, &'a [u8])>,
{
    while let Some(&(_, raw)) = lines.peek() {
        let line = trim(raw);
        if line.starts_with(b"trailer") || subsection_header(line).is_some() {
            return;
        }
        lines.next();
    }
}

/// Parse a cross-reference stream object.
///
/// Truncated record data keeps the records read before the cut.
fn parse_stream(data: &[u8], options: &ParserOptions) -> Result<XrefSection> {
    let parser = ObjectParser::new(options);
    let direct_length = |obj: &Object| obj.as_integer().filter(|&n| n >= 0).map(|n| n as usize);
    let (_, (id, object)) = parser
        .parse_indirect(data, &direct_length)
        .map_err(|e| crate::parser::to_parse_error(data, 0, e))?;

    if !object.is_stream() {
        return Err(Error::InvalidPdf(format!("xref stream {} is a {}", id, object.type_name())));
    }
    let dict = object.as_dict().cloned().unwrap_or_default();
    if let Some(kind) = dict.get("Type").and_then(|o| o.as_name()) {
        if kind != "XRef" {
            return Err(Error::InvalidPdf(format!("expected /Type /XRef, got /Type /{}", kind)));
        }
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|o| o.as_array())
        .map(|arr| arr.iter().filter_map(|o| o.as_integer()).map(|n| n.max(0) as usize).collect())
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|&w| w > 8) {
        return Err(Error::InvalidPdf(format!("invalid /W {:?} in xref stream {}", widths, id)));
    }
    let (w1, w2, w3) = (widths[0], widths[1], widths[2]);
    let record_len = w1 + w2 + w3;
    if record_len == 0 {
        return Err(Error::InvalidPdf("xref stream /W describes empty records".to_string()));
    }

    let size = dict.get("Size").and_then(|o| o.as_integer()).unwrap_or(0).max(0) as u32;
    let ranges: Vec<(u32, u32)> = match dict.get("Index").and_then(|o| o.as_array()) {
        Some(index) => index
            .chunks_exact(2)
            .filter_map(|pair| Some((pair[0].as_integer()?.max(0) as u32, pair[1].as_integer()?.max(0) as u32)))
            .collect(),
        None => vec![(0, size)],
    };

    let records = object.decode_stream_data_with_options(options)?;

    let mut section = XrefSection::new(SectionKind::Stream);
    let mut cursor = records.chunks_exact(record_len);
    'ranges: for (start, count) in ranges {
        if count > options.max_subsection_count {
            log::warn!("Xref stream range {} has {} entries, over the limit", start, count);
            continue;
        }
        for i in 0..count {
            let Some(record) = cursor.next() else {
                log::warn!("Xref stream {} truncated in range starting at {}", id, start);
                break 'ranges;
            };
            let field = |from: usize, width: usize| match width {
                0 => None,
                _ => Some(BigEndian::read_uint(&record[from..from + width], width)),
            };
            let kind = field(0, w1).unwrap_or(1);
            let second = field(w1, w2).unwrap_or(0);
            let third = field(w1 + w2, w3).unwrap_or(0);

            let entry = match kind {
                0 => XrefEntry::Free {
                    next_free: second as u32,
                    generation: third.min(u64::from(u16::MAX)) as u16,
                },
                1 => XrefEntry::Used {
                    offset: second,
                    generation: third.min(u64::from(u16::MAX)) as u16,
                },
                2 => XrefEntry::Compressed {
                    container: second as u32,
                    index: third as u32,
                },
                other => {
                    log::debug!("Ignoring xref stream record of type {}", other);
                    continue;
                },
            };
            section.insert(start.saturating_add(i), entry);
        }
    }

    section.set_trailer(dict);
    Ok(section)
}

/// Loads the section stored at a byte offset.
///
/// Implemented by the document over its byte source; closures work too,
/// which keeps chain tests independent of files.
pub trait SectionLoader {
    /// Load and parse the section at `offset`.
    fn load_section(&self, offset: u64) -> Result<XrefSection>;
}

impl<F> SectionLoader for F
where
    F: Fn(u64) -> Result<XrefSection>,
{
    fn load_section(&self, offset: u64) -> Result<XrefSection> {
        self(offset)
    }
}

#[derive(Debug)]
enum Link {
    Pending(u64),
    Loaded(Arc<XrefNode>),
    Absent,
}

impl Link {
    fn from_offset(offset: Option<u64>) -> Self {
        offset.map_or(Link::Absent, Link::Pending)
    }
}

/// A section plus its lazily loaded links.
#[derive(Debug)]
pub struct XrefNode {
    offset: Option<u64>,
    section: XrefSection,
    peer: Mutex<Link>,
    previous: Mutex<Link>,
}

impl XrefNode {
    fn new(section: XrefSection, offset: Option<u64>) -> Self {
        Self {
            offset,
            peer: Mutex::new(Link::from_offset(section.peer_offset())),
            previous: Mutex::new(Link::from_offset(section.prev_offset())),
            section,
        }
    }

    /// The section held by this node.
    pub fn section(&self) -> &XrefSection {
        &self.section
    }

    /// Byte offset the section was read from.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Newest-first chain of cross-reference sections.
#[derive(Debug)]
pub struct XrefChain {
    root: Arc<XrefNode>,
    max_length: usize,
    loaded_offsets: Mutex<HashSet<u64>>,
}

impl XrefChain {
    /// Chain rooted at the newest section.
    pub fn new(root: XrefSection, root_offset: Option<u64>, options: &ParserOptions) -> Self {
        Self {
            root: Arc::new(XrefNode::new(root, root_offset)),
            max_length: options.max_xref_chain_length.max(1),
            loaded_offsets: Mutex::new(root_offset.into_iter().collect()),
        }
    }

    /// The newest section.
    pub fn root(&self) -> &XrefSection {
        &self.root.section
    }

    /// Trailer of the newest section.
    pub fn trailer(&self) -> &Dict {
        self.root.section.trailer()
    }

    /// Resolve an object number.
    ///
    /// Checks each section in order self, peer, previous (depth first), so
    /// newer sections win. Links are loaded on first need; a link that fails
    /// to load is never retried. `Ok(None)` means no section knows the
    /// number.
    pub fn lookup(&self, object_number: u32, loader: &dyn SectionLoader) -> Result<Option<XrefEntry>> {
        let mut found = None;
        self.walk(loader, |node| {
            found = node.section.get(object_number);
            found.is_some()
        })?;
        Ok(found)
    }

    /// First trailer value for `key`, newest section first.
    pub fn trailer_entry(&self, key: &str, loader: &dyn SectionLoader) -> Result<Option<Object>> {
        let mut found = None;
        self.walk(loader, |node| {
            found = node.section.trailer().get(key).cloned();
            found.is_some()
        })?;
        Ok(found)
    }

    /// Visit nodes in lookup order until `visit` returns true.
    fn walk(&self, loader: &dyn SectionLoader, mut visit: impl FnMut(&XrefNode) -> bool) -> Result<()> {
        let mut stack = vec![Arc::clone(&self.root)];
        let mut seen: Vec<*const XrefNode> = Vec::new();

        while let Some(node) = stack.pop() {
            if seen.contains(&Arc::as_ptr(&node)) {
                continue;
            }
            if seen.len() >= self.max_length {
                log::warn!("Xref chain longer than {} sections, stopping lookup", self.max_length);
                break;
            }
            seen.push(Arc::as_ptr(&node));

            if visit(&node) {
                return Ok(());
            }

            if let Some(previous) = self.follow(&node.previous, loader, "previous")? {
                stack.push(previous);
            }
            if let Some(peer) = self.follow(&node.peer, loader, "peer")? {
                stack.push(peer);
            }
        }
        Ok(())
    }

    /// Materialize a link, loading it at most once.
    fn follow(&self, link: &Mutex<Link>, loader: &dyn SectionLoader, role: &str) -> Result<Option<Arc<XrefNode>>> {
        let mut state = lock(link);
        let offset = match &*state {
            Link::Loaded(node) => return Ok(Some(Arc::clone(node))),
            Link::Absent => return Ok(None),
            Link::Pending(offset) => *offset,
        };

        if !lock(&self.loaded_offsets).insert(offset) {
            log::warn!("Xref {} link to offset {} revisits a loaded section", role, offset);
            *state = Link::Absent;
            return Ok(None);
        }

        match loader.load_section(offset) {
            Ok(section) => {
                log::debug!("Loaded {} xref section at offset {} ({} entries)", role, offset, section.len());
                let node = Arc::new(XrefNode::new(section, Some(offset)));
                *state = Link::Loaded(Arc::clone(&node));
                Ok(Some(node))
            },
            Err(e) => {
                log::warn!("Failed to load {} xref section at offset {}: {}", role, offset, e);
                *state = Link::Absent;
                if e.is_io() {
                    return Err(e);
                }
                Ok(None)
            },
        }
    }

    /// Attach an older section at the true tail of the previous-link chain.
    ///
    /// Pending links on the way are loaded first so an existing link is
    /// never overwritten. Returns false when the section's offset is already
    /// part of the chain.
    pub fn append(&self, section: XrefSection, offset: Option<u64>, loader: &dyn SectionLoader) -> Result<bool> {
        if let Some(offset) = offset {
            if !lock(&self.loaded_offsets).insert(offset) {
                log::warn!("Not appending xref section at offset {}: already in chain", offset);
                return Ok(false);
            }
        }

        let mut node = Arc::clone(&self.root);
        let mut steps = 0;
        loop {
            steps += 1;
            if steps > self.max_length {
                return Err(Error::InvalidPdf(format!(
                    "xref chain exceeds {} sections while appending",
                    self.max_length
                )));
            }
            let next = self.follow(&node.previous, loader, "previous")?;
            match next {
                Some(next) if !Arc::ptr_eq(&next, &self.root) => node = next,
                Some(_) => return Err(Error::InvalidPdf("cyclic xref previous chain".to_string())),
                None => {
                    let mut link = lock(&node.previous);
                    if matches!(*link, Link::Absent) {
                        *link = Link::Loaded(Arc::new(XrefNode::new(section, offset)));
                        return Ok(true);
                    }
                    // Another thread attached something meanwhile; keep walking.
                },
            }
        }
    }

    /// Number of sections loaded so far, following loaded links only.
    pub fn loaded_len(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![Arc::clone(&self.root)];
        let mut seen: Vec<*const XrefNode> = Vec::new();
        while let Some(node) = stack.pop() {
            if seen.contains(&Arc::as_ptr(&node)) {
                continue;
            }
            seen.push(Arc::as_ptr(&node));
            count += 1;
            for link in [&node.previous, &node.peer] {
                if let Link::Loaded(next) = &*lock(link) {
                    stack.push(Arc::clone(next));
                }
            }
        }
        count
    }
}
