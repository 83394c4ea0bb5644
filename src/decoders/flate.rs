//! FlateDecode (zlib/deflate) implementation.
//!
//! Producers regularly write streams with a damaged zlib header or a
//! truncated tail, so decoding falls back through progressively looser
//! readings of the same bytes and keeps whatever output it obtained.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// FlateDecode filter implementation.
pub struct FlateDecoder;

/// Outcome of one decoding attempt.
enum Attempt {
    Complete(Vec<u8>),
    Partial(Vec<u8>, std::io::Error),
    Failed(std::io::Error),
}

fn run<R: Read>(mut reader: R) -> Attempt {
    let mut output = Vec::new();
    match reader.read_to_end(&mut output) {
        Ok(_) => Attempt::Complete(output),
        Err(e) if !output.is_empty() => Attempt::Partial(output, e),
        Err(e) => Attempt::Failed(e),
    }
}

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let zlib_err = match run(ZlibDecoder::new(input)) {
            Attempt::Complete(data) => return Ok(data),
            Attempt::Partial(data, e) => {
                log::warn!(
                    "FlateDecode partial recovery: {} bytes before corruption: {}",
                    data.len(),
                    e
                );
                return Ok(data);
            },
            Attempt::Failed(e) => e,
        };

        // Raw deflate, then deflate behind a 2-byte header that failed to parse.
        let candidates: [(&str, &[u8]); 2] = [
            ("raw deflate", input),
            ("deflate after header skip", input.get(2..).unwrap_or(&[])),
        ];
        for (label, bytes) in candidates {
            if bytes.is_empty() {
                continue;
            }
            match run(DeflateDecoder::new(bytes)) {
                Attempt::Complete(data) if !data.is_empty() => {
                    log::info!("FlateDecode recovered via {}: {} bytes", label, data.len());
                    return Ok(data);
                },
                Attempt::Partial(data, _) => {
                    log::warn!("FlateDecode partial recovery via {}: {} bytes", label, data.len());
                    return Ok(data);
                },
                _ => {},
            }
        }

        Err(Error::Decode(format!(
            "FlateDecode decompression failed ({} bytes): {}",
            input.len(),
            zlib_err
        )))
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}
