//! Object graph store.
//!
//! The single resolution authority: every indirect reference goes through
//! [`ObjectStore::get_object`], which consults the cache, then the
//! cross-reference chain, then the byte source or an object stream.
//! Objects are shared as `Arc<Object>`, so evicting the cache never
//! invalidates a handle an in-flight reader already holds.

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::ObjectStream;
use crate::parser::{to_parse_error, ObjectParser};
use crate::parser_config::ParserOptions;
use crate::source::ByteSource;
use crate::xref::{self, SectionLoader, XrefChain, XrefEntry, XrefSection};
use crate::xref_reconstruction::find_object_header_near;
use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// First read size when parsing an object at an offset; grown 4x per retry.
const INITIAL_WINDOW: usize = 64 * 1024;

/// A resolved value that is either borrowed from its container or shared
/// from the store.
#[derive(Debug, Clone)]
pub enum ObjectHandle<'a> {
    /// The value was direct.
    Direct(&'a Object),
    /// The value was reached through a reference.
    Shared(Arc<Object>),
}

impl Deref for ObjectHandle<'_> {
    type Target = Object;

    fn deref(&self) -> &Object {
        match self {
            ObjectHandle::Direct(object) => object,
            ObjectHandle::Shared(object) => object,
        }
    }
}

impl ObjectHandle<'_> {
    /// Clone out an owned object.
    pub fn into_owned(self) -> Object {
        match self {
            ObjectHandle::Direct(object) => object.clone(),
            ObjectHandle::Shared(object) => Arc::try_unwrap(object).unwrap_or_else(|shared| (*shared).clone()),
        }
    }

    /// Shared form, cloning direct values.
    pub fn into_shared(self) -> Arc<Object> {
        match self {
            ObjectHandle::Direct(object) => Arc::new(object.clone()),
            ObjectHandle::Shared(object) => object,
        }
    }
}

/// Loads chain links from the byte source.
struct SourceSections<'a> {
    source: Option<&'a ByteSource>,
    options: &'a ParserOptions,
}

impl SectionLoader for SourceSections<'_> {
    fn load_section(&self, offset: u64) -> Result<XrefSection> {
        match self.source {
            Some(source) => xref::parse_section(&source.read_from(offset)?, self.options),
            None => Err(Error::InvalidXref),
        }
    }
}

/// Map from reference to resolved object, populated on demand.
#[derive(Debug)]
pub struct ObjectStore {
    source: Option<Arc<ByteSource>>,
    xref: XrefChain,
    objects: RwLock<HashMap<ObjectRef, Arc<Object>>>,
    object_streams: Mutex<HashMap<u32, Arc<ObjectStream>>>,
    options: ParserOptions,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Turn a non-I/O failure into a logged absence.
pub(crate) fn tolerate<T>(result: Result<Option<T>>, what: &str) -> Result<Option<T>> {
    match result {
        Err(e) if !e.is_io() => {
            log::warn!("Treating {} as absent: {}", what, e);
            Ok(None)
        },
        other => other,
    }
}

impl ObjectStore {
    /// Store backed by `source` and indexed by `xref`.
    pub fn new(source: Arc<ByteSource>, xref: XrefChain, options: ParserOptions) -> Self {
        Self {
            source: Some(source),
            xref,
            objects: RwLock::new(HashMap::new()),
            object_streams: Mutex::new(HashMap::new()),
            options,
        }
    }

    /// Store with no backing file; only added objects resolve.
    pub fn in_memory(options: ParserOptions) -> Self {
        Self {
            source: None,
            xref: XrefChain::new(XrefSection::default(), None, &options),
            objects: RwLock::new(HashMap::new()),
            object_streams: Mutex::new(HashMap::new()),
            options,
        }
    }

    /// Options the store parses with.
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// The cross-reference chain.
    pub fn xref(&self) -> &XrefChain {
        &self.xref
    }

    /// Trailer of the newest cross-reference section.
    pub fn trailer(&self) -> &Dict {
        self.xref.trailer()
    }

    /// Trailer value for `key`, searching older sections when the newest lacks it.
    pub fn trailer_entry(&self, key: &str) -> Result<Option<Object>> {
        self.xref.trailer_entry(key, &self.sections())
    }

    fn sections(&self) -> SourceSections<'_> {
        SourceSections {
            source: self.source.as_deref(),
            options: &self.options,
        }
    }

    /// Cached object, without touching the byte source.
    pub fn cached(&self, reference: ObjectRef) -> Option<Arc<Object>> {
        self.objects
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&reference)
            .cloned()
    }

    /// Number of cached objects.
    pub fn cached_len(&self) -> usize {
        self.objects.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Register an object under `reference`, replacing any cached value.
    pub fn add_object(&self, reference: ObjectRef, object: Object) {
        self.insert(reference, object);
    }

    fn insert(&self, reference: ObjectRef, object: Object) -> Arc<Object> {
        let object = Arc::new(object);
        self.objects
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(reference, Arc::clone(&object));
        object
    }

    /// Drop `reference` from the cache, returning what was held.
    pub fn remove_object(&self, reference: ObjectRef) -> Option<Arc<Object>> {
        self.objects
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&reference)
    }

    /// Evict every cached object and decoded object stream.
    pub fn reduce_memory(&self) {
        let evicted = {
            let mut objects = self.objects.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            let n = objects.len();
            objects.clear();
            n
        };
        let mut streams = lock(&self.object_streams);
        for objstm in streams.values() {
            objstm.dispose();
        }
        log::debug!("Evicted {} objects and {} object streams", evicted, streams.len());
        streams.clear();
    }

    /// Resolve one indirect object.
    ///
    /// `Ok(None)` is the normal outcome for free entries, unknown numbers
    /// and objects that fail to parse. Only byte-source failures are errors.
    pub fn get_object(&self, reference: ObjectRef) -> Result<Option<Arc<Object>>> {
        self.fetch(reference, true)
    }

    fn fetch(&self, reference: ObjectRef, resolve_lengths: bool) -> Result<Option<Arc<Object>>> {
        if let Some(object) = self.cached(reference) {
            return Ok(Some(object));
        }

        match self.xref.lookup(reference.id, &self.sections())? {
            None => {
                log::debug!("Object {} is not in the cross-reference chain", reference);
                Ok(None)
            },
            Some(XrefEntry::Free { .. }) => {
                log::debug!("Object {} is free", reference);
                Ok(None)
            },
            Some(XrefEntry::Used { offset, generation }) => {
                if generation != reference.gen {
                    log::warn!(
                        "Object {} requested, xref records generation {}; using it anyway",
                        reference,
                        generation
                    );
                }
                match self.parse_at(reference, offset, resolve_lengths)? {
                    Some(object) => Ok(Some(self.insert(reference, object))),
                    None => Ok(None),
                }
            },
            Some(XrefEntry::Compressed { container, index }) => {
                self.load_compressed(reference, container, index as usize, resolve_lengths)
            },
        }
    }

    fn parse_at(&self, reference: ObjectRef, offset: u64, resolve_lengths: bool) -> Result<Option<Object>> {
        let Some(source) = self.source.as_deref() else {
            return Ok(None);
        };

        match self.parse_indirect_at(source, offset, resolve_lengths) {
            Ok((header, object)) => {
                check_header(reference, header);
                return Ok(Some(object));
            },
            Err(e) if e.is_io() => return Err(e),
            Err(e) => log::warn!("Failed to parse object {} at offset {}: {}", reference, offset, e),
        }

        match find_object_header_near(source, reference, offset, self.options.header_search_window)? {
            Some(found) if found != offset => match self.parse_indirect_at(source, found, resolve_lengths) {
                Ok((header, object)) => {
                    log::info!("Recovered object {} at offset {} (xref says {})", reference, found, offset);
                    check_header(reference, header);
                    Ok(Some(object))
                },
                Err(e) if e.is_io() => Err(e),
                Err(e) => {
                    log::warn!("Failed to parse object {} at recovered offset {}: {}", reference, found, e);
                    Ok(None)
                },
            },
            _ => Ok(None),
        }
    }

    /// Parse `N G obj ... endobj` at `offset`, reading more of the source
    /// while the object runs past the window.
    fn parse_indirect_at(&self, source: &ByteSource, offset: u64, resolve_lengths: bool) -> Result<(ObjectRef, Object)> {
        let parser = ObjectParser::new(&self.options);
        let stream_length = |value: &Object| self.stream_length(value, resolve_lengths);
        let mut window = INITIAL_WINDOW;

        loop {
            let data = source.read_at(offset, window)?;
            if data.is_empty() {
                return Err(Error::UnexpectedEof);
            }
            let exhausted = offset + data.len() as u64 >= source.len();

            match parser.parse_indirect(&data, &stream_length) {
                Ok((rest, parsed)) if exhausted || is_complete(&data[..data.len() - rest.len()], rest, &parsed.1) => {
                    return Ok(parsed)
                },
                Ok(_) => {},
                Err(e) if exhausted => return Err(to_parse_error(&data, offset, e)),
                Err(_) => {},
            }
            window = window.saturating_mul(4);
        }
    }

    /// `/Length` as a byte count. Indirect lengths are fetched without
    /// resolving their own lengths, which bounds the recursion.
    fn stream_length(&self, value: &Object, resolve_lengths: bool) -> Option<usize> {
        let length = match value {
            Object::Reference(reference) if resolve_lengths => match self.fetch(*reference, false) {
                Ok(Some(object)) => object.as_integer(),
                Ok(None) => None,
                Err(e) => {
                    log::warn!("Failed to resolve stream length {}: {}", reference, e);
                    None
                },
            },
            other => other.as_integer(),
        };
        length.and_then(|n| usize::try_from(n).ok())
    }

    fn load_compressed(
        &self,
        reference: ObjectRef,
        container: u32,
        index: usize,
        resolve_lengths: bool,
    ) -> Result<Option<Arc<Object>>> {
        let Some(objstm) = self.object_stream(container, resolve_lengths)? else {
            return Ok(None);
        };
        let key = ObjectRef::new(reference.id, 0);

        if objstm.load_object(self, index) {
            if let Some(object) = self.cached(key) {
                return Ok(Some(object));
            }
        }

        // The recorded index is wrong; find the member by number instead.
        match objstm.index_of(reference.id) {
            Ok(Some(actual)) if actual != index => {
                log::warn!(
                    "Object {} is member {} of object stream {}, not {}",
                    reference,
                    actual,
                    container,
                    index
                );
                objstm.load_object(self, actual);
                Ok(self.cached(key))
            },
            Ok(_) => {
                log::warn!("Object {} not found in object stream {}", reference, container);
                Ok(None)
            },
            Err(e) => {
                log::warn!("Object stream {} is unreadable: {}", container, e);
                Ok(None)
            },
        }
    }

    fn object_stream(&self, container: u32, resolve_lengths: bool) -> Result<Option<Arc<ObjectStream>>> {
        if let Some(objstm) = lock(&self.object_streams).get(&container) {
            return Ok(Some(Arc::clone(objstm)));
        }

        if let Some(XrefEntry::Compressed { .. }) = self.xref.lookup(container, &self.sections())? {
            log::warn!("Object stream {} is itself compressed", container);
            return Ok(None);
        }
        let Some(stream) = self.fetch(ObjectRef::new(container, 0), resolve_lengths)? else {
            log::warn!("Object stream {} does not resolve", container);
            return Ok(None);
        };

        match ObjectStream::new(container, stream, self.options) {
            Ok(objstm) => {
                let mut streams = lock(&self.object_streams);
                let objstm = streams.entry(container).or_insert_with(|| Arc::new(objstm));
                Ok(Some(Arc::clone(objstm)))
            },
            Err(e) => {
                log::warn!("Object {} is not an object stream: {}", container, e);
                Ok(None)
            },
        }
    }

    /// Follow references from `reference` to a non-reference value.
    ///
    /// `Ok(None)` when the chain ends in nothing or in `null`.
    pub fn resolve_reference(&self, reference: ObjectRef) -> Result<Option<Arc<Object>>> {
        let limit = self.options.max_recursion_depth;
        let mut seen = HashSet::new();
        let mut current = reference;

        loop {
            if !seen.insert(current) {
                return Err(Error::CircularReference(current));
            }
            if seen.len() > limit as usize {
                return Err(Error::RecursionLimitExceeded(limit));
            }
            match self.get_object(current)? {
                None => return Ok(None),
                Some(object) => match &*object {
                    Object::Reference(next) => current = *next,
                    Object::Null => return Ok(None),
                    _ => return Ok(Some(object)),
                },
            }
        }
    }

    /// Resolve a value that may be a reference.
    ///
    /// Direct values are returned borrowed; `null` counts as absent.
    pub fn resolve<'a>(&self, object: &'a Object) -> Result<Option<ObjectHandle<'a>>> {
        match object {
            Object::Reference(reference) => Ok(self.resolve_reference(*reference)?.map(ObjectHandle::Shared)),
            Object::Null => Ok(None),
            direct => Ok(Some(ObjectHandle::Direct(direct))),
        }
    }

    /// Resolve `dict[key]`.
    pub fn resolve_dict_entry<'a>(&self, dict: &'a Dict, key: &str) -> Result<Option<ObjectHandle<'a>>> {
        match dict.get(key) {
            Some(value) => self.resolve(value),
            None => Ok(None),
        }
    }
}

/// Whether a parse of a truncated window can be trusted: it ran to
/// `endobj`, to the `endstream` of a stream, or stopped where the next
/// token is fully in view and so cannot be a cut-off `stream` keyword.
fn is_complete(consumed: &[u8], rest: &[u8], object: &Object) -> bool {
    let end = consumed
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    let consumed = &consumed[..end];
    if consumed.ends_with(b"endobj") {
        return true;
    }
    if object.is_stream() {
        return consumed.ends_with(b"endstream");
    }
    crate::lexer::skip_ws(rest).len() > b"stream".len()
}

fn check_header(expected: ObjectRef, found: ObjectRef) {
    if expected != found {
        log::warn!("Object header says {} where {} was expected; using it anyway", found, expected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xref::SectionKind;

    // ==========================================================================
    // Fixtures
    // ==========================================================================

    struct Fixture {
        data: Vec<u8>,
        section: XrefSection,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                data: b"%PDF-1.7\n".to_vec(),
                section: XrefSection::new(SectionKind::Table),
            }
        }

        fn object(mut self, id: u32, gen: u16, body: &[u8]) -> Self {
            let offset = self.data.len() as u64;
            self.data.extend_from_slice(format!("{} {} obj\n", id, gen).as_bytes());
            self.data.extend_from_slice(body);
            self.data.extend_from_slice(b"\nendobj\n");
            self.section.insert(id, XrefEntry::Used { offset, generation: gen });
            self
        }

        fn entry(mut self, id: u32, entry: XrefEntry) -> Self {
            self.section.insert(id, entry);
            self
        }

        fn offset_of(&self, id: u32) -> u64 {
            match self.section.get(id) {
                Some(XrefEntry::Used { offset, .. }) => offset,
                _ => panic!("object {} has no offset", id),
            }
        }

        fn store(self) -> ObjectStore {
            let options = ParserOptions::default();
            let source = Arc::new(ByteSource::from_bytes(self.data));
            ObjectStore::new(source, XrefChain::new(self.section, None, &options), options)
        }
    }

    fn stream_body(dict: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!("<< {} /Length {} >>\nstream\n", dict, data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        body
    }

    // ==========================================================================
    // Direct objects
    // ==========================================================================

    #[test]
    fn test_get_object_parses_and_caches() {
        let store = Fixture::new().object(1, 0, b"<< /Type /Catalog /Pages 2 0 R >>").store();
        let first = store.get_object(ObjectRef::new(1, 0)).unwrap().unwrap();
        assert_eq!(first.get("Type").and_then(|o| o.as_name()), Some("Catalog"));

        let second = store.get_object(ObjectRef::new(1, 0)).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.cached_len(), 1);
    }

    #[test]
    fn test_resolution_is_idempotent_after_eviction() {
        let store = Fixture::new()
            .object(1, 0, b"<< /A 1 /B [ (x) /y ] /C << /D 2.5 >> >>")
            .store();
        let before = store.get_object(ObjectRef::new(1, 0)).unwrap().unwrap();
        store.reduce_memory();
        assert!(store.cached(ObjectRef::new(1, 0)).is_none());

        let after = store.get_object(ObjectRef::new(1, 0)).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(*before, *after);
    }

    #[test]
    fn test_free_and_unknown_objects_are_absent() {
        let store = Fixture::new()
            .object(1, 0, b"42")
            .entry(2, XrefEntry::Free { next_free: 0, generation: 1 })
            .store();
        assert!(store.get_object(ObjectRef::new(2, 0)).unwrap().is_none());
        assert!(store.get_object(ObjectRef::new(77, 0)).unwrap().is_none());
    }

    #[test]
    fn test_header_mismatch_is_tolerated() {
        let fixture = Fixture::new().object(4, 1, b"(mismatch)");
        let offset = fixture.offset_of(4);
        let store = fixture.entry(4, XrefEntry::Used { offset, generation: 0 }).store();
        let object = store.get_object(ObjectRef::new(4, 0)).unwrap().unwrap();
        assert_eq!(object.as_string(), Some(&b"mismatch"[..]));
    }

    #[test]
    fn test_offset_slightly_off_is_recovered() {
        let fixture = Fixture::new().object(1, 0, b"1").object(2, 0, b"/Recovered");
        let offset = fixture.offset_of(2);
        let store = fixture.entry(2, XrefEntry::Used { offset: offset + 3, generation: 0 }).store();
        let object = store.get_object(ObjectRef::new(2, 0)).unwrap().unwrap();
        assert_eq!(object.as_name(), Some("Recovered"));
    }

    #[test]
    fn test_garbage_offset_yields_absent() {
        let store = Fixture::new()
            .object(1, 0, b"1")
            .entry(3, XrefEntry::Used { offset: 100_000, generation: 0 })
            .store();
        assert!(store.get_object(ObjectRef::new(3, 0)).unwrap().is_none());
    }

    #[test]
    fn test_indirect_stream_length() {
        let mut body = b"<< /Length 9 0 R >>\nstream\n".to_vec();
        body.extend_from_slice(b"endstream inside\nendstream");
        let store = Fixture::new().object(3, 0, &body).object(9, 0, b"16").store();

        let object = store.get_object(ObjectRef::new(3, 0)).unwrap().unwrap();
        match &*object {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"endstream inside"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_large_object_spans_windows() {
        let payload = vec![b'a'; INITIAL_WINDOW * 2];
        let store = Fixture::new().object(5, 0, &stream_body("", &payload)).store();
        let object = store.get_object(ObjectRef::new(5, 0)).unwrap().unwrap();
        assert_eq!(object.decode_stream_data().unwrap().len(), payload.len());
    }

    #[test]
    fn test_stream_keyword_cut_by_window_is_reread() {
        // The first window ends on ">>\nstr".
        let framing = b"5 0 obj\n<< /Pad (".len() + b") /Length 4 >>\nstr".len();
        let mut body = b"<< /Pad (".to_vec();
        body.extend(std::iter::repeat(b'x').take(INITIAL_WINDOW - framing));
        body.extend_from_slice(b") /Length 4 >>\nstream\nDATA\nendstream");
        let store = Fixture::new().object(5, 0, &body).store();

        let object = store.get_object(ObjectRef::new(5, 0)).unwrap().unwrap();
        assert!(object.is_stream());
        assert_eq!(object.decode_stream_data().unwrap(), b"DATA");
        assert_eq!(object.get("Pad").and_then(|o| o.as_string()).map(|s| s.len()), Some(INITIAL_WINDOW - framing));
    }

    #[test]
    fn test_dictionary_cut_before_endobj_is_reread() {
        let framing = b"6 0 obj\n<< /Pad (".len() + b") >>\nendo".len();
        let mut body = b"<< /Pad (".to_vec();
        body.extend(std::iter::repeat(b'y').take(INITIAL_WINDOW - framing));
        body.extend_from_slice(b") >>");
        let store = Fixture::new().object(6, 0, &body).store();

        let object = store.get_object(ObjectRef::new(6, 0)).unwrap().unwrap();
        assert!(object.as_dict().is_some());
        assert!(store.cached(ObjectRef::new(6, 0)).is_some());
    }

    // ==========================================================================
    // Compressed objects
    // ==========================================================================

    fn objstm_fixture() -> Fixture {
        let data = b"5 0 6 4 7 9   /Six (seven)";
        Fixture::new()
            .object(20, 0, &stream_body("/Type /ObjStm /N 3 /First 10", data))
            .entry(5, XrefEntry::Compressed { container: 20, index: 0 })
            .entry(6, XrefEntry::Compressed { container: 20, index: 1 })
            .entry(7, XrefEntry::Compressed { container: 20, index: 2 })
    }

    #[test]
    fn test_compressed_member_is_registered_under_generation_zero() {
        let store = objstm_fixture().store();
        let six = store.get_object(ObjectRef::new(6, 0)).unwrap().unwrap();
        assert_eq!(six.as_name(), Some("Six"));
        assert!(store.cached(ObjectRef::new(6, 0)).is_some());
        assert!(store.cached(ObjectRef::new(5, 0)).is_none());
        assert!(store.cached(ObjectRef::new(7, 0)).is_none());

        assert_eq!(store.get_object(ObjectRef::new(5, 0)).unwrap().unwrap().as_integer(), Some(9));
        assert_eq!(
            store.get_object(ObjectRef::new(7, 0)).unwrap().unwrap().as_string(),
            Some(&b"seven"[..])
        );
    }

    #[test]
    fn test_wrong_member_index_falls_back_to_number() {
        let store = objstm_fixture()
            .entry(6, XrefEntry::Compressed { container: 20, index: 2 })
            .store();
        let six = store.get_object(ObjectRef::new(6, 0)).unwrap().unwrap();
        assert_eq!(six.as_name(), Some("Six"));
    }

    #[test]
    fn test_compressed_members_survive_reduce_memory() {
        let store = objstm_fixture().store();
        let held = store.get_object(ObjectRef::new(7, 0)).unwrap().unwrap();
        store.reduce_memory();
        assert_eq!(held.as_string(), Some(&b"seven"[..]));
        let again = store.get_object(ObjectRef::new(7, 0)).unwrap().unwrap();
        assert_eq!(*held, *again);
    }

    #[test]
    fn test_nested_container_is_rejected() {
        let store = objstm_fixture()
            .entry(8, XrefEntry::Compressed { container: 5, index: 0 })
            .store();
        assert!(store.get_object(ObjectRef::new(8, 0)).unwrap().is_none());
    }

    // ==========================================================================
    // Reference helpers
    // ==========================================================================

    #[test]
    fn test_resolve_follows_chains_and_detects_cycles() {
        let store = Fixture::new()
            .object(1, 0, b"2 0 R")
            .object(2, 0, b"1 0 R")
            .object(3, 0, b"4 0 R")
            .object(4, 0, b"(end)")
            .object(5, 0, b"null")
            .store();

        let target = Object::Reference(ObjectRef::new(3, 0));
        let resolved = store.resolve(&target).unwrap().unwrap();
        assert_eq!(resolved.as_string(), Some(&b"end"[..]));

        let cyclic = Object::Reference(ObjectRef::new(1, 0));
        assert!(matches!(store.resolve(&cyclic), Err(Error::CircularReference(_))));

        assert!(store.resolve(&Object::Reference(ObjectRef::new(5, 0))).unwrap().is_none());

        let direct = Object::Integer(3);
        assert!(matches!(store.resolve(&direct).unwrap(), Some(ObjectHandle::Direct(_))));
    }

    #[test]
    fn test_resolve_dict_entry() {
        let store = Fixture::new().object(9, 0, b"[ 0 0 612 792 ]").store();
        let mut dict = Dict::new();
        dict.insert("MediaBox".to_string(), Object::Reference(ObjectRef::new(9, 0)));
        dict.insert("Rotate".to_string(), Object::Integer(90));

        let media_box = store.resolve_dict_entry(&dict, "MediaBox").unwrap().unwrap();
        assert_eq!(media_box.as_array().map(|a| a.len()), Some(4));
        assert_eq!(
            store.resolve_dict_entry(&dict, "Rotate").unwrap().map(|h| h.into_owned()),
            Some(Object::Integer(90))
        );
        assert!(store.resolve_dict_entry(&dict, "Missing").unwrap().is_none());
    }

    #[test]
    fn test_in_memory_add_and_remove() {
        let store = ObjectStore::in_memory(ParserOptions::default());
        let reference = ObjectRef::new(12, 0);
        assert!(store.get_object(reference).unwrap().is_none());

        store.add_object(reference, Object::Boolean(true));
        assert_eq!(store.get_object(reference).unwrap().unwrap().as_bool(), Some(true));

        let removed = store.remove_object(reference).unwrap();
        assert_eq!(removed.as_bool(), Some(true));
        assert!(store.get_object(reference).unwrap().is_none());
    }

    #[test]
    fn test_tolerate_keeps_io_errors() {
        let parse: Result<Option<u8>> = Err(Error::InvalidXref);
        assert!(tolerate(parse, "x").unwrap().is_none());
        let io: Result<Option<u8>> = Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "gone")));
        assert!(tolerate(io, "x").is_err());
    }

    #[test]
    fn test_concurrent_first_touch() {
        let mut fixture = Fixture::new();
        for id in 1..=20u32 {
            fixture = fixture.object(id, 0, format!("<< /N {} >>", id).as_bytes());
        }
        let store = Arc::new(fixture.store());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for id in 1..=20u32 {
                        let object = store.get_object(ObjectRef::new(id, 0)).unwrap().unwrap();
                        assert_eq!(object.get("N").and_then(|o| o.as_integer()), Some(i64::from(id)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.cached_len(), 20);
    }
}
