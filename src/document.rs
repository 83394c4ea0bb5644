//! PDF document: opening, trailer and catalog access, page assembly.
//!
//! Opening reads only the header and the newest cross-reference section.
//! Older sections and every object are loaded on demand through the
//! [`ObjectStore`].

use crate::cancel::CancellationToken;
use crate::config::InterpreterConfig;
use crate::content::{ContentInterpreter, Resources, ShapeProgram};
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::images::ImageDispatcher;
use crate::object::{Dict, Object, ObjectRef};
use crate::parser_config::ParserOptions;
use crate::source::ByteSource;
use crate::store::{tolerate, ObjectStore};
use crate::xref::{self, XrefChain};
use crate::xref_reconstruction;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Bytes searched from the start of the file for `%PDF-`.
const HEADER_WINDOW: usize = 1024;

/// Bytes at the end of the file searched for `startxref`.
const TAIL_WINDOW: usize = 2048;

/// Maximum `/Parent` hops followed for inherited page attributes.
const MAX_INHERITANCE_DEPTH: usize = 64;

/// US letter width in points.
const LETTER_WIDTH: f32 = 612.0;

/// Everything needed to interpret one page.
#[derive(Debug, Clone)]
pub struct PageContent<'d> {
    /// The page object
    pub reference: ObjectRef,
    /// All `/Contents` streams, decoded and joined with newlines
    pub content: Vec<u8>,
    /// `/Resources`, possibly inherited from an ancestor
    pub resources: Resources<'d>,
    /// `/MediaBox`, possibly inherited or synthesized
    pub media_box: Rect,
}

/// PDF document.
///
/// # Example
///
/// ```no_run
/// use pdf_engine::document::PdfDocument;
///
/// let doc = PdfDocument::open("sample.pdf")?;
/// println!("PDF version: {}.{}", doc.version().0, doc.version().1);
/// println!("Page count: {}", doc.page_count()?);
/// # Ok::<(), pdf_engine::error::Error>(())
/// ```
#[derive(Debug)]
pub struct PdfDocument {
    version: (u8, u8),
    store: ObjectStore,
    config: InterpreterConfig,
    images: ImageDispatcher,
}

impl PdfDocument {
    /// Open a PDF file with default options.
    ///
    /// # Errors
    ///
    /// I/O failures, or [`Error::InvalidPdf`] / [`Error::InvalidXref`] when
    /// neither the cross-reference chain nor reconstruction yields objects.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_source(ByteSource::open(path)?, ParserOptions::default(), InterpreterConfig::default())
    }

    /// Open a PDF held in memory with default options.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_source(ByteSource::from_bytes(data), ParserOptions::default(), InterpreterConfig::default())
    }

    /// Open a PDF from any byte source.
    pub fn from_source(source: ByteSource, options: ParserOptions, config: InterpreterConfig) -> Result<Self> {
        let source = Arc::new(source);
        let version = parse_header(&source.read_at(0, HEADER_WINDOW)?, &options)?;

        let xref = match Self::load_chain(&source, &options) {
            Ok(chain) => chain,
            Err(e) if e.is_io() => return Err(e),
            Err(e) if options.allow_reconstruction => {
                log::warn!("Cross-reference data unusable ({}), reconstructing", e);
                let section = xref_reconstruction::reconstruct(&source, &options)?;
                XrefChain::new(section, None, &options)
            },
            Err(e) => return Err(e),
        };
        log::debug!("Opened PDF {}.{} with {} root xref entries", version.0, version.1, xref.root().len());

        let images = ImageDispatcher::new(&config, options);
        Ok(Self {
            version,
            store: ObjectStore::new(source, xref, options),
            config,
            images,
        })
    }

    fn load_chain(source: &ByteSource, options: &ParserOptions) -> Result<XrefChain> {
        let (_, tail) = source.read_tail(TAIL_WINDOW)?;
        let offset = xref::find_startxref(&tail)?;
        if offset >= source.len() {
            log::warn!("startxref offset {} is past the end of the file", offset);
            return Err(Error::InvalidXref);
        }
        let section = xref::parse_section(&source.read_from(offset)?, options)?;
        if section.is_empty() && section.peer_offset().is_none() && section.prev_offset().is_none() {
            return Err(Error::InvalidXref);
        }
        if !section.trailer().contains_key("Root") && section.prev_offset().is_none() {
            log::warn!("Newest trailer has no /Root");
            return Err(Error::InvalidXref);
        }
        Ok(XrefChain::new(section, Some(offset), options))
    }

    /// PDF version from the header.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// The object store.
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Interpreter options.
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// The image decoders used when interpreting pages.
    pub fn images(&self) -> &ImageDispatcher {
        &self.images
    }

    /// Register more image decoders.
    pub fn images_mut(&mut self) -> &mut ImageDispatcher {
        &mut self.images
    }

    /// Trailer of the newest cross-reference section.
    pub fn trailer(&self) -> &Dict {
        self.store.trailer()
    }

    /// Drop cached objects; they are re-read on next use.
    pub fn reduce_memory(&self) {
        self.store.reduce_memory();
    }

    /// The document catalog (`/Root`).
    pub fn catalog(&self) -> Result<Arc<Object>> {
        let root = self
            .store
            .trailer_entry("Root")?
            .ok_or_else(|| Error::InvalidPdf("trailer has no /Root".to_string()))?;
        let catalog = tolerate(self.store.resolve(&root), "catalog")?
            .ok_or_else(|| Error::InvalidPdf("/Root does not resolve".to_string()))?
            .into_shared();
        if catalog.as_dict().is_none() {
            return Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: catalog.type_name().to_string(),
            });
        }
        Ok(catalog)
    }

    /// Page objects in document order.
    ///
    /// Walks the page tree from `/Pages`, skipping nodes that are missing,
    /// malformed or already visited.
    pub fn page_refs(&self) -> Result<Vec<ObjectRef>> {
        let catalog = self.catalog()?;
        let Some(root) = catalog.get("Pages").and_then(Object::as_reference) else {
            return Err(Error::InvalidPdf("catalog has no /Pages reference".to_string()));
        };

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let mut pending = vec![root];
        while let Some(node_ref) = pending.pop() {
            if !visited.insert(node_ref) {
                log::warn!("Page tree revisits {}", node_ref);
                continue;
            }
            let node = tolerate(self.store.get_object(node_ref), "page tree node")?;
            let Some(node) = node else {
                log::warn!("Page tree node {} is missing", node_ref);
                continue;
            };
            let Some(dict) = node.as_dict() else {
                log::warn!("Page tree node {} is a {}", node_ref, node.type_name());
                continue;
            };

            let is_page = dict.get("Type").and_then(Object::as_name) == Some("Page");
            let kids = match self.store.resolve_dict_entry(dict, "Kids") {
                Ok(kids) => kids.and_then(|k| k.as_array().cloned()),
                Err(e) if e.is_io() => return Err(e),
                Err(_) => None,
            };
            match kids {
                Some(kids) if !is_page => {
                    // Reverse so the stack pops kids in order.
                    for kid in kids.iter().rev() {
                        match kid.as_reference() {
                            Some(kid_ref) => pending.push(kid_ref),
                            None => log::warn!("Ignoring direct page tree kid under {}", node_ref),
                        }
                    }
                },
                _ => pages.push(node_ref),
            }
        }
        Ok(pages)
    }

    /// Number of pages found in the page tree.
    pub fn page_count(&self) -> Result<usize> {
        Ok(self.page_refs()?.len())
    }

    /// Reference of the page at `index`.
    pub fn page(&self, index: usize) -> Result<ObjectRef> {
        let pages = self.page_refs()?;
        pages
            .get(index)
            .copied()
            .ok_or_else(|| Error::InvalidPdf(format!("page index {} out of range ({} pages)", index, pages.len())))
    }

    fn page_dict(&self, page: ObjectRef) -> Result<Arc<Object>> {
        let object = tolerate(self.store.get_object(page), "page")?.ok_or(Error::ObjectNotFound(page.id, page.gen))?;
        if object.as_dict().is_none() {
            return Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: object.type_name().to_string(),
            });
        }
        Ok(object)
    }

    /// Look up `key` on the page or, failing that, its ancestors.
    fn inherited(&self, page: &Arc<Object>, key: &str) -> Result<Option<Object>> {
        let mut node = Arc::clone(page);
        let mut seen = HashSet::new();
        for _ in 0..MAX_INHERITANCE_DEPTH {
            let Some(dict) = node.as_dict() else {
                return Ok(None);
            };
            let what = format!("page attribute /{}", key);
            if let Some(value) = tolerate(self.store.resolve_dict_entry(dict, key), &what)? {
                return Ok(Some(value.into_owned()));
            }
            let Some(parent) = dict.get("Parent").and_then(Object::as_reference) else {
                return Ok(None);
            };
            if !seen.insert(parent) {
                log::warn!("Page tree /Parent cycle at {}", parent);
                return Ok(None);
            }
            match tolerate(self.store.get_object(parent), "page parent")? {
                Some(next) => node = next,
                None => return Ok(None),
            }
        }
        log::warn!("Page tree deeper than {} levels", MAX_INHERITANCE_DEPTH);
        Ok(None)
    }

    /// Assemble a page's content, resources and media box.
    pub fn page_content(&self, page: ObjectRef) -> Result<PageContent<'_>> {
        let page_obj = self.page_dict(page)?;
        let dict = page_obj.as_dict().cloned().unwrap_or_default();

        let mut content = Vec::new();
        let streams: Vec<Object> = match tolerate(self.store.resolve_dict_entry(&dict, "Contents"), "page contents")? {
            Some(value) => match &*value {
                Object::Array(items) => items.clone(),
                other => vec![other.clone()],
            },
            None => Vec::new(),
        };
        for item in &streams {
            let Some(stream) = tolerate(self.store.resolve(item), "content stream")? else {
                continue;
            };
            match stream.decode_stream_data_with_options(self.store.options()) {
                Ok(data) => {
                    if !content.is_empty() {
                        content.push(b'\n');
                    }
                    content.extend_from_slice(&data);
                },
                Err(e) if e.is_io() => return Err(e),
                Err(e) => log::warn!("Skipping content stream of page {}: {}", page, e),
            }
        }

        let resources = match self.inherited(&page_obj, "Resources")? {
            Some(Object::Dictionary(res)) => Resources::new(&self.store, res),
            Some(other) => {
                log::warn!("Page {} /Resources is a {}", page, other.type_name());
                Resources::empty(&self.store)
            },
            None => Resources::empty(&self.store),
        };

        let media_box = self
            .inherited(&page_obj, "MediaBox")?
            .and_then(|o| {
                let values: Vec<f32> = o.as_array()?.iter().filter_map(Object::as_f32).collect();
                Rect::from_array(&values)
            })
            .unwrap_or_else(|| {
                let height = LETTER_WIDTH * self.config.page_fallback_aspect_ratio as f32;
                log::debug!("Page {} has no /MediaBox, using 612x{}", page, height);
                Rect::new(0.0, 0.0, LETTER_WIDTH, height)
            });

        Ok(PageContent {
            reference: page,
            content,
            resources,
            media_box,
        })
    }

    /// Interpreter bound to this document's store, options and decoders.
    pub fn interpreter(&self) -> ContentInterpreter<'_> {
        ContentInterpreter::new(&self.store, self.config.clone()).with_image_dispatcher(&self.images)
    }

    /// Interpret a page with full fidelity.
    pub fn interpret_page(&self, page: ObjectRef) -> Result<ShapeProgram> {
        let page = self.page_content(page)?;
        self.interpreter().parse(&page.content, &page.resources)
    }

    /// Interpret a page, polling `token` between operators.
    ///
    /// A cancelled run returns [`Error::Interrupted`] holding the partial
    /// program; calling again with a reset token starts over.
    pub fn interpret_page_cancellable(&self, page: ObjectRef, token: CancellationToken) -> Result<ShapeProgram> {
        let page = self.page_content(page)?;
        self.interpreter()
            .with_cancellation(token)
            .parse(&page.content, &page.resources)
    }

    /// Extract the text of a page.
    pub fn extract_text(&self, page: ObjectRef) -> Result<String> {
        let page = self.page_content(page)?;
        let program = self.interpreter().parse_text_only(&page.content, &page.resources)?;
        Ok(program.text.text())
    }
}

/// Parse the `%PDF-M.m` header.
///
/// Lenient options accept a header anywhere in `head` and fall back to
/// 1.4 when none is found.
///
/// ```
/// use pdf_engine::document::parse_header;
/// use pdf_engine::ParserOptions;
///
/// assert_eq!(parse_header(b"%PDF-1.7\n", &ParserOptions::strict()).unwrap(), (1, 7));
/// assert_eq!(parse_header(b"junk%PDF-2.0", &ParserOptions::lenient()).unwrap(), (2, 0));
/// assert!(parse_header(b"junk", &ParserOptions::strict()).is_err());
/// ```
pub fn parse_header(head: &[u8], options: &ParserOptions) -> Result<(u8, u8)> {
    let magic = b"%PDF-";
    let position = head.windows(magic.len()).position(|w| w == magic);
    let position = match position {
        Some(0) => 0,
        Some(p) if !options.strict => {
            log::warn!("PDF header found at offset {}", p);
            p
        },
        _ if options.strict => {
            return Err(Error::InvalidPdf("missing %PDF- header".to_string()));
        },
        _ => {
            log::warn!("No PDF header, assuming version 1.4");
            return Ok((1, 4));
        },
    };

    let version = &head[position + magic.len()..];
    match version {
        [major, b'.', minor, ..] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Ok((major - b'0', minor - b'0'))
        },
        _ if options.strict => Err(Error::InvalidPdf("malformed PDF version".to_string())),
        _ => {
            log::warn!("Malformed PDF version, assuming 1.4");
            Ok((1, 4))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_variants() {
        let strict = ParserOptions::strict();
        let lenient = ParserOptions::lenient();
        assert_eq!(parse_header(b"%PDF-1.4\n%\xe2\xe3", &strict).unwrap(), (1, 4));
        assert!(parse_header(b"\n%PDF-1.5", &strict).is_err());
        assert_eq!(parse_header(b"\n%PDF-1.5", &lenient).unwrap(), (1, 5));
        assert_eq!(parse_header(b"%PDF-x", &lenient).unwrap(), (1, 4));
        assert!(parse_header(b"%PDF-x", &strict).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = PdfDocument::from_bytes(b"not a pdf at all".to_vec()).unwrap_err();
        assert!(!err.is_io());
    }
}
