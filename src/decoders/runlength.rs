//! RunLengthDecode implementation.
//!
//! - Length byte 0-127: copy the next N+1 bytes literally
//! - Length byte 128: end of data
//! - Length byte 129-255: repeat the next byte 257-N times

use crate::decoders::StreamDecoder;
use crate::error::Result;

/// RunLengthDecode filter implementation.
pub struct RunLengthDecoder;

impl StreamDecoder for RunLengthDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() * 2);
        let mut pos = 0;

        while let Some(&length) = input.get(pos) {
            pos += 1;
            match length {
                0..=127 => {
                    let end = pos + length as usize + 1;
                    if end > input.len() {
                        log::warn!(
                            "RunLengthDecode: literal run of {} truncated to {}",
                            length as usize + 1,
                            input.len() - pos
                        );
                    }
                    let end = end.min(input.len());
                    output.extend_from_slice(&input[pos..end]);
                    pos = end;
                },
                128 => break,
                129..=255 => {
                    let Some(&byte) = input.get(pos) else {
                        log::warn!("RunLengthDecode: repeat run without its byte");
                        break;
                    };
                    pos += 1;
                    output.resize(output.len() + 257 - length as usize, byte);
                },
            }
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "RunLengthDecode"
    }
}
