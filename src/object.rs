//! PDF object types.

use crate::decoders::{self, DecodeParams, FilterSpec};
use crate::error::{Error, Result};
use crate::parser_config::ParserOptions;
use std::collections::HashMap;

/// Dictionary representation shared by dictionaries and stream headers.
pub type Dict = HashMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (starting with /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dict),
    /// Stream (dictionary + undecoded data)
    Stream {
        /// Stream dictionary
        dict: Dict,
        /// Raw stream data as stored in the file
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of an integer or real.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Numeric value narrowed to `f32`, the precision used for geometry.
    pub fn as_f32(&self) -> Option<f32> {
        self.as_number().map(|n| n as f32)
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to real number.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Check if object is a stream.
    pub fn is_stream(&self) -> bool {
        matches!(self, Object::Stream { .. })
    }

    /// Look up a key when this is a dictionary or stream.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Filters declared by a stream dictionary, paired with their parameters.
    pub fn stream_filters(&self) -> Vec<FilterSpec> {
        match self.as_dict() {
            Some(dict) => filter_specs(dict.get("Filter"), dict.get("DecodeParms")),
            None => Vec::new(),
        }
    }

    /// Decode stream data with default limits.
    ///
    /// Fails with `UnsupportedFilter` when the stream uses an image-only
    /// codec; image data goes through [`crate::images`] instead.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        self.decode_stream_data_with_options(&ParserOptions::default())
    }

    /// Decode stream data, enforcing the decompression limits in `options`.
    pub fn decode_stream_data_with_options(&self, options: &ParserOptions) -> Result<Vec<u8>> {
        match self {
            Object::Stream { data, .. } => {
                let filters = self.stream_filters();
                if filters.is_empty() {
                    return Ok(data.to_vec());
                }
                let partial = decoders::decode_filters(data, &filters, options)?;
                match partial.remaining.first() {
                    None => Ok(partial.data),
                    Some(image_filter) => Err(Error::UnsupportedFilter(image_filter.name.clone())),
                }
            },
            _ => Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: self.type_name().to_string(),
            }),
        }
    }
}

/// Pair each filter name with the parameter dictionary at the same position.
///
/// `Filter` is either a single name or an array; `DecodeParms` mirrors its
/// shape, with `null` entries for filters that take no parameters.
pub fn filter_specs(filter: Option<&Object>, params: Option<&Object>) -> Vec<FilterSpec> {
    let names: Vec<String> = match filter {
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(arr)) => arr
            .iter()
            .filter_map(|obj| obj.as_name().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    };

    names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let param_dict = match params {
                Some(Object::Dictionary(d)) if idx == 0 => Some(d),
                Some(Object::Array(arr)) => arr.get(idx).and_then(|o| o.as_dict()),
                _ => None,
            };
            FilterSpec {
                name: decoders::expand_filter_name(&name).to_string(),
                params: param_dict.map(extract_decode_params).unwrap_or_default(),
            }
        })
        .collect()
}

/// Read predictor and LZW parameters from a DecodeParms dictionary.
fn extract_decode_params(dict: &Dict) -> DecodeParams {
    let int = |key: &str, default: i64| dict.get(key).and_then(|o| o.as_integer()).unwrap_or(default);

    DecodeParams {
        predictor: int("Predictor", 1),
        columns: int("Columns", 1).max(1) as usize,
        colors: int("Colors", 1).max(1) as usize,
        bits_per_component: int("BitsPerComponent", 8).clamp(1, 16) as usize,
        early_change: int("EarlyChange", 1) != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(dict: Dict, data: &'static [u8]) -> Object {
        Object::Stream {
            dict,
            data: bytes::Bytes::from_static(data),
        }
    }

    #[test]
    fn test_object_numbers() {
        assert_eq!(Object::Integer(42).as_number(), Some(42.0));
        assert_eq!(Object::Real(0.5).as_f32(), Some(0.5));
        assert!(Object::Name("X".into()).as_number().is_none());
    }

    #[test]
    fn test_object_dictionary_get() {
        let mut dict = HashMap::new();
        dict.insert("Type".to_string(), Object::Name("Page".to_string()));
        let obj = Object::Dictionary(dict);
        assert_eq!(obj.get("Type").and_then(|o| o.as_name()), Some("Page"));
        assert!(obj.get("Missing").is_none());
        assert!(Object::Null.get("Type").is_none());
    }

    #[test]
    fn test_object_stream_dict_access() {
        let mut dict = HashMap::new();
        dict.insert("Length".to_string(), Object::Integer(100));
        let obj = stream(dict, b"stream data");

        let d = obj.as_dict().unwrap();
        assert_eq!(d.get("Length").unwrap().as_integer(), Some(100));
        assert!(obj.is_stream());
    }

    #[test]
    fn test_object_ref_display_and_order() {
        let a = ObjectRef::new(10, 0);
        let b = ObjectRef::new(10, 1);
        assert_eq!(format!("{}", a), "10 0 R");
        assert!(a < b);
    }

    #[test]
    fn test_decode_stream_no_filter() {
        let obj = stream(HashMap::new(), b"Hello");
        assert_eq!(obj.decode_stream_data().unwrap(), b"Hello");
    }

    #[test]
    fn test_decode_stream_filter_array() {
        let mut dict = HashMap::new();
        dict.insert(
            "Filter".to_string(),
            Object::Array(vec![Object::Name("ASCIIHexDecode".to_string())]),
        );
        let obj = stream(dict, b"48656C6C6F>");
        assert_eq!(obj.decode_stream_data().unwrap(), b"Hello");
    }

    #[test]
    fn test_decode_stream_image_filter_is_unsupported_here() {
        let mut dict = HashMap::new();
        dict.insert("Filter".to_string(), Object::Name("DCTDecode".to_string()));
        let obj = stream(dict, b"\xFF\xD8");
        match obj.decode_stream_data() {
            Err(Error::UnsupportedFilter(name)) => assert_eq!(name, "DCTDecode"),
            other => panic!("expected UnsupportedFilter, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_stream_not_a_stream() {
        match Object::Integer(42).decode_stream_data() {
            Err(Error::InvalidObjectType { expected, found }) => {
                assert_eq!(expected, "Stream");
                assert_eq!(found, "Integer");
            },
            _ => panic!("Expected InvalidObjectType error"),
        }
    }

    #[test]
    fn test_filter_specs_pair_params_by_position() {
        let mut flate_params = HashMap::new();
        flate_params.insert("Predictor".to_string(), Object::Integer(12));
        flate_params.insert("Columns".to_string(), Object::Integer(5));
        let filter = Object::Array(vec![
            Object::Name("A85".to_string()),
            Object::Name("FlateDecode".to_string()),
        ]);
        let params = Object::Array(vec![Object::Null, Object::Dictionary(flate_params)]);

        let specs = filter_specs(Some(&filter), Some(&params));
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "ASCII85Decode");
        assert_eq!(specs[0].params.predictor, 1);
        assert_eq!(specs[1].name, "FlateDecode");
        assert_eq!(specs[1].params.predictor, 12);
        assert_eq!(specs[1].params.columns, 5);
    }

    #[test]
    fn test_filter_specs_invalid() {
        assert!(filter_specs(Some(&Object::Integer(42)), None).is_empty());
        assert!(filter_specs(None, None).is_empty());
    }
}
