//! Stream filter pipeline.
//!
//! Decoders for the general-purpose PDF filters:
//! - FlateDecode (zlib/deflate)
//! - LZWDecode
//! - ASCIIHexDecode
//! - ASCII85Decode
//! - RunLengthDecode
//!
//! Image codecs (DCT, JPX, JBIG2, CCITT) are not decoded here. The pipeline
//! stops in front of the first one and hands the remaining filters back so
//! the image dispatcher can pick a strategy.

use crate::error::{Error, Result};
use crate::parser_config::ParserOptions;

mod ascii85;
mod ascii_hex;
mod flate;
mod lzw;
mod predictor;
mod runlength;

pub use ascii85::Ascii85Decoder;
pub use ascii_hex::{hex_value, AsciiHexDecoder};
pub use flate::FlateDecoder;
pub use lzw::LzwDecoder;
pub use predictor::{decode_predictor, DecodeParams};
pub use runlength::RunLengthDecoder;

/// PDF stream filter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// FlateDecode (deflate/zlib compression)
    FlateDecode,
    /// ASCIIHexDecode (hexadecimal encoding)
    ASCIIHexDecode,
    /// ASCII85Decode (base-85 encoding)
    ASCII85Decode,
    /// LZWDecode (Lempel-Ziv-Welch compression)
    LZWDecode,
    /// RunLengthDecode (run-length encoding)
    RunLengthDecode,
    /// DCTDecode (JPEG)
    DCTDecode,
    /// JPXDecode (JPEG 2000)
    JPXDecode,
    /// CCITTFaxDecode (Group 3/4 fax)
    CCITTFaxDecode,
    /// JBIG2Decode
    JBIG2Decode,
}

impl Filter {
    /// Parse a filter name, accepting inline-image abbreviations.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match expand_filter_name(name) {
            "FlateDecode" => Filter::FlateDecode,
            "ASCIIHexDecode" => Filter::ASCIIHexDecode,
            "ASCII85Decode" => Filter::ASCII85Decode,
            "LZWDecode" => Filter::LZWDecode,
            "RunLengthDecode" => Filter::RunLengthDecode,
            "DCTDecode" => Filter::DCTDecode,
            "JPXDecode" => Filter::JPXDecode,
            "CCITTFaxDecode" => Filter::CCITTFaxDecode,
            "JBIG2Decode" => Filter::JBIG2Decode,
            _ => return None,
        })
    }

    /// Codecs whose output is a raster, left to the image dispatcher.
    pub fn is_image_codec(self) -> bool {
        matches!(
            self,
            Filter::DCTDecode | Filter::JPXDecode | Filter::CCITTFaxDecode | Filter::JBIG2Decode
        )
    }
}

/// Expand the abbreviated filter names allowed in inline images.
pub fn expand_filter_name(name: &str) -> &str {
    match name {
        "AHx" => "ASCIIHexDecode",
        "A85" => "ASCII85Decode",
        "LZW" => "LZWDecode",
        "Fl" => "FlateDecode",
        "RL" => "RunLengthDecode",
        "CCF" => "CCITTFaxDecode",
        "DCT" => "DCTDecode",
        other => other,
    }
}

/// One entry of a stream's filter chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    /// Full filter name
    pub name: String,
    /// Parameters from the matching DecodeParms entry
    pub params: DecodeParams,
}

impl FilterSpec {
    /// Filter with default parameters.
    pub fn new(name: &str) -> Self {
        Self {
            name: expand_filter_name(name).to_string(),
            params: DecodeParams::default(),
        }
    }
}

/// Output of running the general-purpose part of a filter chain.
#[derive(Debug, Clone)]
pub struct PartialDecode {
    /// Bytes after every general-purpose filter ran
    pub data: Vec<u8>,
    /// Filters not applied, starting with the first image codec
    pub remaining: Vec<FilterSpec>,
}

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of this decoder (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// Run `filters` over `data` until the chain ends or reaches an image codec.
///
/// Decompression-bomb limits from `options` are checked after every filter.
pub fn decode_filters(
    data: &[u8],
    filters: &[FilterSpec],
    options: &ParserOptions,
) -> Result<PartialDecode> {
    let compressed_size = data.len().max(1);
    let mut current = data.to_vec();

    for (idx, spec) in filters.iter().enumerate() {
        let filter =
            Filter::from_name(&spec.name).ok_or_else(|| Error::UnsupportedFilter(spec.name.clone()))?;

        if filter.is_image_codec() {
            log::debug!("Stopping filter chain at image codec {}", spec.name);
            return Ok(PartialDecode {
                data: current,
                remaining: filters[idx..].to_vec(),
            });
        }

        let decoder: Box<dyn StreamDecoder> = match filter {
            Filter::FlateDecode => Box::new(FlateDecoder),
            Filter::ASCIIHexDecode => Box::new(AsciiHexDecoder),
            Filter::ASCII85Decode => Box::new(Ascii85Decoder),
            Filter::LZWDecode => Box::new(LzwDecoder {
                early_change: spec.params.early_change,
            }),
            Filter::RunLengthDecode => Box::new(RunLengthDecoder),
            _ => return Err(Error::UnsupportedFilter(spec.name.clone())),
        };

        current = decoder.decode(&current)?;

        if matches!(filter, Filter::FlateDecode | Filter::LZWDecode) && spec.params.predictor > 1 {
            current = decode_predictor(&current, &spec.params)?;
        }

        check_limits(current.len(), compressed_size, options)?;
    }

    Ok(PartialDecode {
        data: current,
        remaining: Vec::new(),
    })
}

fn check_limits(decoded: usize, compressed: usize, options: &ParserOptions) -> Result<()> {
    let max_ratio = options.max_decompression_ratio as u64;
    // Small inputs legitimately expand a lot (a 20-byte stream of zeros).
    if max_ratio > 0 && decoded > 1024 * 1024 {
        let ratio = decoded as u64 / compressed as u64;
        if ratio > max_ratio {
            return Err(Error::Decode(format!(
                "Decompression bomb detected: ratio {}:1 exceeds limit {}:1 ({} -> {} bytes)",
                ratio, max_ratio, compressed, decoded
            )));
        }
    }

    if options.max_decompressed_size > 0 && decoded > options.max_decompressed_size {
        return Err(Error::Decode(format!(
            "Decompression bomb detected: decoded size {} bytes exceeds limit {} bytes",
            decoded, options.max_decompressed_size
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_filters_is_identity() {
        let out = decode_filters(b"Hello, World!", &[], &ParserOptions::default()).unwrap();
        assert_eq!(out.data, b"Hello, World!");
        assert!(out.remaining.is_empty());
    }

    #[test]
    fn test_unsupported_filter() {
        let filters = vec![FilterSpec::new("Bogus")];
        match decode_filters(b"test", &filters, &ParserOptions::default()) {
            Err(Error::UnsupportedFilter(name)) => assert_eq!(name, "Bogus"),
            other => panic!("Expected UnsupportedFilter error, got {:?}", other),
        }
    }

    #[test]
    fn test_chain_stops_at_image_codec() {
        let filters = vec![FilterSpec::new("AHx"), FilterSpec::new("DCT")];
        let out = decode_filters(b"FFD8>", &filters, &ParserOptions::default()).unwrap();
        assert_eq!(out.data, vec![0xFF, 0xD8]);
        assert_eq!(out.remaining.len(), 1);
        assert_eq!(out.remaining[0].name, "DCTDecode");
    }

    #[test]
    fn test_size_limit_enforced() {
        let options = ParserOptions {
            max_decompressed_size: 4,
            ..ParserOptions::default()
        };
        let filters = vec![FilterSpec::new("ASCIIHexDecode")];
        let result = decode_filters(b"48656C6C6F", &filters, &options);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_expand_abbreviations() {
        assert_eq!(expand_filter_name("Fl"), "FlateDecode");
        assert_eq!(expand_filter_name("RL"), "RunLengthDecode");
        assert_eq!(expand_filter_name("FlateDecode"), "FlateDecode");
        assert!(Filter::from_name("CCF").is_some_and(|f| f.is_image_codec()));
    }
}
