//! LZWDecode implementation.
//!
//! PDF's LZW variant uses MSB-first codes starting at 9 bits, clear code 256
//! and EOD code 257. With `EarlyChange` 1 (the default) the code width grows
//! one code earlier than in GIF, which is the TIFF convention in `weezl`.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use weezl::{decode::Decoder, BitOrder, LzwStatus};

/// LZWDecode filter implementation.
pub struct LzwDecoder {
    /// Value of the `EarlyChange` decode parameter.
    pub early_change: bool,
}

impl Default for LzwDecoder {
    fn default() -> Self {
        Self { early_change: true }
    }
}

impl StreamDecoder for LzwDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = if self.early_change {
            Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            Decoder::new(BitOrder::Msb, 8)
        };

        let mut output = Vec::with_capacity(input.len().saturating_mul(2));
        let mut chunk = [0u8; 4096];
        let mut remaining = input;

        loop {
            let result = decoder.decode_bytes(remaining, &mut chunk);
            remaining = &remaining[result.consumed_in..];
            output.extend_from_slice(&chunk[..result.consumed_out]);

            match result.status {
                Ok(LzwStatus::Ok) if result.consumed_in == 0 && result.consumed_out == 0 => break,
                Ok(LzwStatus::Ok) => continue,
                Ok(LzwStatus::Done) => break,
                Ok(LzwStatus::NoProgress) => {
                    log::debug!("LZWDecode: data ended without EOD after {} bytes", output.len());
                    break;
                },
                Err(e) if !output.is_empty() => {
                    log::warn!("LZWDecode: {:?} after {} bytes, keeping prefix", e, output.len());
                    break;
                },
                Err(e) => return Err(Error::Decode(format!("LZWDecode error: {:?}", e))),
            }
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "LZWDecode"
    }
}
