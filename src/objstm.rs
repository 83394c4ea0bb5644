//! Object stream unpacker (PDF 1.5+).
//!
//! Object streams (`/Type /ObjStm`) pack many objects into one filtered
//! stream:
//!
//! ```text
//! 12 0 obj
//! << /Type /ObjStm /N 3 /First 18 /Filter /FlateDecode >>
//! stream
//! 10 0 11 15 12 28                % N pairs: object number, offset
//! << /Type /Font ... >>           % bodies, offsets relative to /First
//! ...
//! endstream
//! ```
//!
//! The header table is decoded once, on first use, and kept together with
//! the decoded body until [`ObjectStream::dispose`] drops both. Members are
//! parsed on demand and registered in the [`ObjectStore`] under generation 0.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Object, ObjectRef};
use crate::parser::ObjectParser;
use crate::parser_config::ParserOptions;
use crate::store::ObjectStore;
use std::sync::{Arc, Mutex, MutexGuard};

/// Decoded body plus `(object number, absolute offset)` per member.
#[derive(Debug)]
struct Unpacked {
    data: Vec<u8>,
    members: Vec<(u32, usize)>,
}

/// A compressed-object container.
#[derive(Debug)]
pub struct ObjectStream {
    container: u32,
    stream: Arc<Object>,
    options: ParserOptions,
    unpacked: Mutex<Option<Unpacked>>,
}

impl ObjectStream {
    /// Wrap the container stream object `container`.
    pub fn new(container: u32, stream: Arc<Object>, options: ParserOptions) -> Result<Self> {
        if !stream.is_stream() {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: stream.type_name().to_string(),
            });
        }
        match stream.get("Type").and_then(|o| o.as_name()) {
            Some("ObjStm") | None => {},
            Some(other) => log::warn!("Object stream {} has /Type /{}", container, other),
        }
        Ok(Self {
            container,
            stream,
            options,
            unpacked: Mutex::new(None),
        })
    }

    /// Object number of the container.
    pub fn container(&self) -> u32 {
        self.container
    }

    fn lock(&self) -> MutexGuard<'_, Option<Unpacked>> {
        self.unpacked.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decode the body and read the header table. Later calls are no-ops.
    pub fn init(&self) -> Result<()> {
        let mut guard = self.lock();
        if guard.is_none() {
            *guard = Some(self.unpack()?);
        }
        Ok(())
    }

    fn unpack(&self) -> Result<Unpacked> {
        let count = self.stream.get("N").and_then(|o| o.as_integer());
        let first = self.stream.get("First").and_then(|o| o.as_integer());
        let (count, first) = match (count, first) {
            (Some(n), Some(f)) if n >= 0 && f >= 0 => (n as usize, f as usize),
            _ => {
                return Err(Error::InvalidPdf(format!(
                    "object stream {} lacks a valid /N or /First",
                    self.container
                )))
            },
        };

        let data = self.stream.decode_stream_data_with_options(&self.options)?;
        if first > data.len() {
            return Err(Error::InvalidPdf(format!(
                "object stream {} has /First {} beyond its {} decoded bytes",
                self.container,
                first,
                data.len()
            )));
        }

        let mut members = Vec::with_capacity(count.min(data.len() / 2 + 1));
        let mut input: &[u8] = &data;
        while members.len() < count {
            let pair = match token(input) {
                Ok((rest, Token::Integer(number))) => match token(rest) {
                    Ok((rest, Token::Integer(offset))) if number >= 0 && offset >= 0 => {
                        input = rest;
                        Some((number as u32, first.saturating_add(offset as usize)))
                    },
                    _ => None,
                },
                _ => None,
            };
            match pair {
                Some(member) => members.push(member),
                None => {
                    log::warn!(
                        "Object stream {} header ends after {} of {} pairs",
                        self.container,
                        members.len(),
                        count
                    );
                    break;
                },
            }
        }

        log::debug!(
            "Unpacked object stream {}: {} members, {} bytes",
            self.container,
            members.len(),
            data.len()
        );
        Ok(Unpacked { data, members })
    }

    /// Number of members listed in the header.
    pub fn len(&self) -> Result<usize> {
        self.init()?;
        Ok(self.lock().as_ref().map_or(0, |u| u.members.len()))
    }

    /// Check if the header lists no members.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether the header table and body are currently held.
    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    /// Index of the member with object number `number`.
    pub fn index_of(&self, number: u32) -> Result<Option<usize>> {
        self.init()?;
        Ok(self
            .lock()
            .as_ref()
            .and_then(|u| u.members.iter().position(|&(n, _)| n == number)))
    }

    /// Parse member `index`, returning its object number and value.
    pub fn member(&self, index: usize) -> Result<(u32, Object)> {
        self.init()?;
        let guard = self.lock();
        let unpacked = guard
            .as_ref()
            .ok_or_else(|| Error::InvalidPdf(format!("object stream {} disposed", self.container)))?;

        let &(number, offset) = unpacked.members.get(index).ok_or_else(|| {
            Error::InvalidPdf(format!(
                "index {} out of range for object stream {} ({} members)",
                index,
                self.container,
                unpacked.members.len()
            ))
        })?;
        let body = unpacked.data.get(offset..).ok_or_else(|| {
            Error::InvalidPdf(format!(
                "member {} of object stream {} starts past the body",
                number, self.container
            ))
        })?;

        let (_, object) = ObjectParser::new(&self.options)
            .parse(body)
            .map_err(|e| crate::parser::to_parse_error(body, offset as u64, e))?;
        Ok((number, object))
    }

    /// Parse member `index` and register it in `store` as `(number, 0)`.
    ///
    /// Failures are logged and reported as `false`.
    pub fn load_object(&self, store: &ObjectStore, index: usize) -> bool {
        match self.member(index) {
            Ok((number, object)) => {
                store.add_object(ObjectRef::new(number, 0), object);
                true
            },
            Err(e) => {
                log::warn!("Failed to load member {} of object stream {}: {}", index, self.container, e);
                false
            },
        }
    }

    /// Drop the decoded body and header table; `init` rebuilds them.
    pub fn dispose(&self) {
        *self.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dict;

    fn container(n: i64, first: i64, body: &[u8]) -> Arc<Object> {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::Name("ObjStm".to_string()));
        dict.insert("N".to_string(), Object::Integer(n));
        dict.insert("First".to_string(), Object::Integer(first));
        Arc::new(Object::Stream {
            dict,
            data: bytes::Bytes::copy_from_slice(body),
        })
    }

    #[test]
    fn test_members_are_parsed_at_first_relative_offsets() {
        let body = b"10 0 11 5 12 11\n<<>> [1 2] (abc)";
        let first = body.iter().position(|&c| c == b'<').unwrap() as i64;
        let objstm = ObjectStream::new(3, container(3, first, body), ParserOptions::default()).unwrap();

        assert_eq!(objstm.len().unwrap(), 3);
        assert_eq!(objstm.member(0).unwrap(), (10, Object::Dictionary(Dict::new())));
        assert_eq!(
            objstm.member(1).unwrap(),
            (11, Object::Array(vec![Object::Integer(1), Object::Integer(2)]))
        );
        assert_eq!(objstm.member(2).unwrap(), (12, Object::String(b"abc".to_vec())));
        assert!(objstm.member(3).is_err());
    }

    #[test]
    fn test_init_is_idempotent_and_dispose_rebuilds() {
        let objstm = ObjectStream::new(3, container(1, 4, b"7 0 42"), ParserOptions::default()).unwrap();
        assert!(!objstm.is_initialized());
        objstm.init().unwrap();
        objstm.init().unwrap();
        assert!(objstm.is_initialized());

        objstm.dispose();
        assert!(!objstm.is_initialized());
        assert_eq!(objstm.member(0).unwrap(), (7, Object::Integer(42)));
    }

    #[test]
    fn test_short_header_keeps_complete_pairs() {
        let objstm = ObjectStream::new(3, container(3, 6, b"1 0 2 (x)"), ParserOptions::default()).unwrap();
        assert_eq!(objstm.len().unwrap(), 1);
    }

    #[test]
    fn test_missing_first_is_an_error() {
        let mut dict = Dict::new();
        dict.insert("N".to_string(), Object::Integer(1));
        let stream = Arc::new(Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"1 0 null"),
        });
        let objstm = ObjectStream::new(3, stream, ParserOptions::default()).unwrap();
        assert!(objstm.init().is_err());
        assert!(!objstm.is_initialized());
    }

    #[test]
    fn test_rejects_non_stream_container() {
        let result = ObjectStream::new(3, Arc::new(Object::Integer(1)), ParserOptions::default());
        assert!(matches!(result, Err(Error::InvalidObjectType { .. })));
    }

    #[test]
    fn test_load_object_registers_generation_zero() {
        let store = ObjectStore::in_memory(ParserOptions::default());
        let objstm = ObjectStream::new(3, container(2, 10, b"20 0 21 3 /A /B"), ParserOptions::default()).unwrap();

        assert!(objstm.load_object(&store, 1));
        assert!(!objstm.load_object(&store, 5));
        let loaded = store.cached(ObjectRef::new(21, 0)).unwrap();
        assert_eq!(loaded.as_name(), Some("B"));
        assert_eq!(objstm.index_of(20).unwrap(), Some(0));
        assert_eq!(objstm.index_of(99).unwrap(), None);
    }
}
