//! Predictor post-processing for Flate and LZW streams.
//!
//! Predictor 2 is the TIFF horizontal differencing scheme; 10-15 are the PNG
//! filters, where every row carries its own filter-type byte.

use crate::error::{Error, Result};

/// Decode parameters for Flate and LZW streams.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of samples per row
    pub columns: usize,
    /// Number of colour components per sample
    pub colors: usize,
    /// Bits per colour component
    pub bits_per_component: usize,
    /// LZW `EarlyChange`
    pub early_change: bool,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
            early_change: true,
        }
    }
}

impl DecodeParams {
    /// Bytes of sample data per row, excluding any PNG tag byte.
    pub fn row_bytes(&self) -> usize {
        self.columns
            .saturating_mul(self.colors)
            .saturating_mul(self.bits_per_component)
            .div_ceil(8)
    }

    /// Distance in bytes to the corresponding byte of the previous pixel.
    pub fn pixel_stride(&self) -> usize {
        self.colors.saturating_mul(self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Undo the predictor named by `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff(data, params),
        10..=15 => Ok(decode_png(data, params)),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

fn decode_tiff(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Decode(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let row_len = params.row_bytes().max(1);
    let stride = params.colors;
    let mut output = data.to_vec();
    for row in output.chunks_mut(row_len) {
        for i in stride..row.len() {
            row[i] = row[i].wrapping_add(row[i - stride]);
        }
    }
    Ok(output)
}

fn decode_png(data: &[u8], params: &DecodeParams) -> Vec<u8> {
    // No row is longer than the input, whatever /Columns claims.
    let row_len = params.row_bytes().min(data.len());
    let stride = params.pixel_stride();
    let mut output: Vec<u8> = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_len];

    for encoded in data.chunks(row_len + 1) {
        let (tag, samples) = match encoded.split_first() {
            Some(split) => split,
            None => break,
        };
        if samples.len() < row_len {
            log::debug!("PNG predictor: short final row ({} of {} bytes)", samples.len(), row_len);
        }

        let mut row = vec![0u8; samples.len()];
        for i in 0..samples.len() {
            let left = if i >= stride { row[i - stride] } else { 0 };
            let up = previous[i];
            let up_left = if i >= stride { previous[i - stride] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    log::warn!("PNG predictor: unknown filter type {}, copying row", other);
                    0
                },
            };
            row[i] = samples[i].wrapping_add(predicted);
        }

        output.extend_from_slice(&row);
        previous[..row.len()].copy_from_slice(&row);
    }

    output
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
