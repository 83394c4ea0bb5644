//! Image decode dispatch.
//!
//! The interpreter hands every image it paints to an [`ImageDispatcher`],
//! which tries its registered [`ImageDecoder`]s in priority order. A decoder
//! that cannot handle a request says so through [`ImageDecoder::can_decode`]
//! or an `Err`, and the dispatcher moves on to the next one. Codecs such as
//! DCT or JBIG2 are plugged in by registering a decoder for them; without one
//! the outcome is [`Error::UnsupportedFilter`].

use crate::config::InterpreterConfig;
use crate::content::color::ColorSpace;
use crate::content::resources::Resources;
use crate::decoders::{decode_filters, FilterSpec};
use crate::error::{Error, Result};
use crate::object::{Dict, Object};
use crate::parser_config::ParserOptions;
use crate::store::ObjectStore;
use std::fmt::Debug;
use std::sync::Arc;

/// Pixel layout of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One byte per pixel
    Gray8,
    /// Three bytes per pixel
    Rgb8,
    /// Four bytes per pixel, CMYK
    Cmyk8,
    /// One byte per pixel, 255 where a stencil paints
    Stencil8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 | PixelFormat::Stencil8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Cmyk8 => 4,
        }
    }

    fn for_space(space: &ColorSpace) -> Option<PixelFormat> {
        match space {
            ColorSpace::DeviceGray | ColorSpace::CalGray => Some(PixelFormat::Gray8),
            ColorSpace::DeviceRGB | ColorSpace::CalRGB | ColorSpace::Lab => Some(PixelFormat::Rgb8),
            ColorSpace::DeviceCMYK => Some(PixelFormat::Cmyk8),
            ColorSpace::Indexed { base, .. } => PixelFormat::for_space(base),
            other => match other.components() {
                1 => Some(PixelFormat::Gray8),
                3 => Some(PixelFormat::Rgb8),
                4 => Some(PixelFormat::Cmyk8),
                _ => None,
            },
        }
    }
}

/// Decoded pixels, rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: PixelFormat,
    /// `width * height * format.channels()` bytes
    pub data: Vec<u8>,
    /// Per-pixel alpha from `/SMask` or `/Mask`
    pub alpha: Option<Vec<u8>>,
}

/// `/Mask` of an image.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageMask {
    /// Stencil mask image: samples of 1 are masked out
    Stencil(Arc<Object>),
    /// Colour key ranges `[min0 max0 min1 max1 ...]` on raw samples
    ColorKey(Vec<i64>),
}

/// Everything a decoder needs to know about one image.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// Width in samples
    pub width: u32,
    /// Height in samples
    pub height: u32,
    /// Bits per sample component
    pub bits_per_component: u8,
    /// Colour space, DeviceGray for stencil masks
    pub color_space: ColorSpace,
    /// Filter chain still to apply
    pub filters: Vec<FilterSpec>,
    /// Encoded sample bytes
    pub data: bytes::Bytes,
    /// `/Decode` array
    pub decode: Option<Vec<f32>>,
    /// `/ImageMask true`
    pub image_mask: bool,
    /// `/SMask` image
    pub soft_mask: Option<Arc<Object>>,
    /// `/Mask`
    pub mask: Option<ImageMask>,
}

impl ImageRequest {
    /// Build a request from an image XObject or an inline image stream.
    ///
    /// Colour space names are looked up in `resources` when they are not
    /// device names.
    pub fn from_stream(store: &ObjectStore, image: &Object, resources: Option<&Resources<'_>>) -> Result<Self> {
        let Object::Stream { dict, data } = image else {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: image.type_name().to_string(),
            });
        };

        let width = dimension(store, dict, "Width")?;
        let height = dimension(store, dict, "Height")?;
        let image_mask = match store.resolve_dict_entry(dict, "ImageMask")? {
            Some(value) => value.as_bool().unwrap_or(false),
            None => false,
        };
        let bits_per_component = if image_mask {
            1
        } else {
            match store.resolve_dict_entry(dict, "BitsPerComponent")? {
                Some(value) => value.as_integer().unwrap_or(8).clamp(1, 16) as u8,
                None => 8,
            }
        };

        let color_space = if image_mask {
            ColorSpace::DeviceGray
        } else {
            match dict.get("ColorSpace") {
                Some(cs) => ColorSpace::resolve(cs, store, resources)?,
                None => ColorSpace::DeviceGray,
            }
        };

        let decode = match store.resolve_dict_entry(dict, "Decode")? {
            Some(array) => array
                .as_array()
                .map(|items| items.iter().filter_map(|o| o.as_f32()).collect::<Vec<_>>()),
            None => None,
        };

        let soft_mask = match dict.get("SMask") {
            Some(smask) => store.resolve(smask)?.map(|h| h.into_shared()).filter(|o| o.is_stream()),
            None => None,
        };
        let mask = match dict.get("Mask") {
            Some(mask) => match store.resolve(mask)? {
                Some(m) if m.is_stream() => Some(ImageMask::Stencil(m.into_shared())),
                Some(m) => m
                    .as_array()
                    .map(|items| ImageMask::ColorKey(items.iter().filter_map(|o| o.as_integer()).collect())),
                None => None,
            },
            None => None,
        };

        Ok(Self {
            width,
            height,
            bits_per_component,
            color_space,
            filters: image.stream_filters(),
            data: data.clone(),
            decode,
            image_mask,
            soft_mask,
            mask,
        })
    }

    /// Name of the first filter, for diagnostics.
    pub fn filter_name(&self) -> Option<&str> {
        self.filters.first().map(|f| f.name.as_str())
    }
}

fn dimension(store: &ObjectStore, dict: &Dict, key: &str) -> Result<u32> {
    let value = store.resolve_dict_entry(dict, key)?.and_then(|o| o.as_integer());
    match value {
        Some(n) if n > 0 && n <= i64::from(u32::MAX) => Ok(n as u32),
        _ => Err(Error::Image(format!("image /{} missing or invalid", key))),
    }
}

/// One decoding strategy.
pub trait ImageDecoder: Send + Sync + Debug {
    /// Name for diagnostics.
    fn name(&self) -> &str;

    /// Whether this decoder should be tried for `request`.
    fn can_decode(&self, request: &ImageRequest) -> bool;

    /// Decode the request's samples.
    fn decode(&self, request: &ImageRequest, options: &ParserOptions) -> Result<DecodedImage>;
}

/// Decoder for samples behind general-purpose filters (Flate, LZW, ...).
///
/// Unpacks 1, 2, 4, 8 and 16 bit samples, applies `/Decode`, expands
/// Indexed palettes and turns masks into an alpha channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSampleDecoder;

impl ImageDecoder for RawSampleDecoder {
    fn name(&self) -> &str {
        "raw samples"
    }

    fn can_decode(&self, request: &ImageRequest) -> bool {
        request.filters.iter().all(|f| {
            crate::decoders::Filter::from_name(&f.name).is_some_and(|filter| !filter.is_image_codec())
        })
    }

    fn decode(&self, request: &ImageRequest, options: &ParserOptions) -> Result<DecodedImage> {
        let samples = decode_filters(&request.data, &request.filters, options)?;
        if let Some(codec) = samples.remaining.first() {
            return Err(Error::UnsupportedFilter(codec.name.clone()));
        }

        let mut image = if request.image_mask {
            unpack_stencil(request, &samples.data, options)?
        } else {
            unpack_samples(request, &samples.data, options)?
        };

        image.alpha = match (&request.soft_mask, &request.mask) {
            (Some(smask), _) => decode_mask_image(smask, image.width, image.height, options, false),
            (None, Some(ImageMask::Stencil(mask))) => {
                decode_mask_image(mask, image.width, image.height, options, true)
            },
            (None, Some(ImageMask::ColorKey(ranges))) => {
                Some(color_key_alpha(request, &samples.data, ranges, options)?)
            },
            (None, None) => None,
        };
        Ok(image)
    }
}

/// Reads `bits`-wide big-endian samples from a byte row.
struct SampleReader<'a> {
    data: &'a [u8],
    bits: usize,
    position: usize,
}

impl<'a> SampleReader<'a> {
    fn new(data: &'a [u8], bits: u8) -> Self {
        Self {
            data,
            bits: bits as usize,
            position: 0,
        }
    }

    fn next(&mut self) -> u32 {
        let value = match self.bits {
            8 => u32::from(self.data.get(self.position / 8).copied().unwrap_or(0)),
            16 => {
                let i = self.position / 8;
                let hi = u32::from(self.data.get(i).copied().unwrap_or(0));
                let lo = u32::from(self.data.get(i + 1).copied().unwrap_or(0));
                (hi << 8) | lo
            },
            bits => {
                let byte = u32::from(self.data.get(self.position / 8).copied().unwrap_or(0));
                let shift = 8 - bits - (self.position % 8);
                (byte >> shift) & ((1 << bits) - 1)
            },
        };
        self.position += self.bits;
        value
    }
}

fn valid_bits(bits: u8) -> Result<()> {
    match bits {
        1 | 2 | 4 | 8 | 16 => Ok(()),
        other => Err(Error::Image(format!("unsupported BitsPerComponent {}", other))),
    }
}

/// Row stride and total sample bytes for a `components` x `bits` image.
///
/// Refuses images whose samples or `channels`-wide output would exceed
/// `max_decompressed_size`, or whose size does not fit in `usize`.
fn sample_layout(
    request: &ImageRequest,
    components: usize,
    bits: u8,
    channels: usize,
    options: &ParserOptions,
) -> Result<(usize, usize)> {
    let too_large = || {
        Error::Image(format!(
            "{}x{} image with {} components at {} bits is too large",
            request.width, request.height, components, bits
        ))
    };
    let width = request.width as usize;
    let height = request.height as usize;
    let stride = width
        .checked_mul(components)
        .and_then(|n| n.checked_mul(bits as usize))
        .map(|bits| bits.div_ceil(8))
        .ok_or_else(too_large)?;
    let size = stride.checked_mul(height).ok_or_else(too_large)?;
    let output = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(too_large)?;
    if options.max_decompressed_size > 0 && size.max(output) > options.max_decompressed_size {
        return Err(too_large());
    }
    Ok((stride, size))
}

fn padded<'a>(data: &'a [u8], expected: usize, buffer: &'a mut Vec<u8>) -> &'a [u8] {
    if data.len() >= expected {
        return &data[..expected];
    }
    log::warn!("Image data short by {} bytes, padding with zeros", expected - data.len());
    buffer.extend_from_slice(data);
    buffer.resize(expected, 0);
    buffer
}

fn unpack_samples(request: &ImageRequest, data: &[u8], options: &ParserOptions) -> Result<DecodedImage> {
    valid_bits(request.bits_per_component)?;
    let format = PixelFormat::for_space(&request.color_space).ok_or_else(|| {
        Error::Image(format!(
            "no pixel format for {} colour space with {} components",
            request.color_space.family(),
            request.color_space.components()
        ))
    })?;

    let components = match &request.color_space {
        ColorSpace::Indexed { .. } => 1,
        other => other.components(),
    };
    let bits = request.bits_per_component;
    let max = ((1u32 << bits) - 1) as f32;
    let (stride, size) = sample_layout(request, components, bits, format.channels(), options)?;
    let mut buffer = Vec::new();
    let data = padded(data, size, &mut buffer);

    let decode_range = |component: usize, default: (f32, f32)| -> (f32, f32) {
        match &request.decode {
            Some(d) if d.len() >= 2 * (component + 1) => (d[2 * component], d[2 * component + 1]),
            _ => default,
        }
    };

    let mut out = Vec::with_capacity(request.width as usize * request.height as usize * format.channels());

    match &request.color_space {
        ColorSpace::Indexed { base, hival, lookup } => {
            let base_components = base.components();
            let (dmin, dmax) = decode_range(0, (0.0, max));
            for row in data.chunks(stride) {
                let mut reader = SampleReader::new(row, bits);
                for _ in 0..request.width {
                    let sample = reader.next() as f32;
                    let index = (dmin + sample * (dmax - dmin) / max).round().clamp(0.0, f32::from(*hival)) as usize;
                    let start = index * base_components;
                    for c in 0..base_components {
                        out.push(lookup.get(start + c).copied().unwrap_or(0));
                    }
                }
            }
        },
        _ => {
            for row in data.chunks(stride) {
                let mut reader = SampleReader::new(row, bits);
                for _ in 0..request.width {
                    for c in 0..components {
                        let (dmin, dmax) = decode_range(c, (0.0, 1.0));
                        let value = dmin + reader.next() as f32 * (dmax - dmin) / max;
                        out.push((value.clamp(0.0, 1.0) * 255.0).round() as u8);
                    }
                }
            }
        },
    }

    Ok(DecodedImage {
        width: request.width,
        height: request.height,
        format,
        data: out,
        alpha: None,
    })
}

fn unpack_stencil(request: &ImageRequest, data: &[u8], options: &ParserOptions) -> Result<DecodedImage> {
    let (stride, size) = sample_layout(request, 1, 1, 1, options)?;
    let mut buffer = Vec::new();
    let data = padded(data, size, &mut buffer);
    // `/Decode [1 0]` paints where samples are 1.
    let paint_on = match &request.decode {
        Some(d) if d.first().is_some_and(|&v| v > 0.5) => 1,
        _ => 0,
    };

    let mut out = Vec::with_capacity(request.width as usize * request.height as usize);
    for row in data.chunks(stride) {
        let mut reader = SampleReader::new(row, 1);
        for _ in 0..request.width {
            out.push(if reader.next() == paint_on { 255 } else { 0 });
        }
    }
    Ok(DecodedImage {
        width: request.width,
        height: request.height,
        format: PixelFormat::Stencil8,
        data: out,
        alpha: None,
    })
}

/// Alpha from an `/SMask` (gray levels) or a stencil `/Mask` (inverted coverage).
fn decode_mask_image(mask: &Object, width: u32, height: u32, options: &ParserOptions, stencil: bool) -> Option<Vec<u8>> {
    let store = ObjectStore::in_memory(*options);
    let mut request = match ImageRequest::from_stream(&store, mask, None) {
        Ok(request) => request,
        Err(e) => {
            log::warn!("Ignoring unreadable image mask: {}", e);
            return None;
        },
    };
    if request.width != width || request.height != height {
        log::warn!(
            "Ignoring {}x{} mask for {}x{} image",
            request.width,
            request.height,
            width,
            height
        );
        return None;
    }
    request.image_mask = stencil;
    request.color_space = ColorSpace::DeviceGray;
    request.soft_mask = None;
    request.mask = None;

    match RawSampleDecoder.decode(&request, options) {
        Ok(decoded) => Some(decoded.data),
        Err(e) => {
            log::warn!("Ignoring undecodable image mask: {}", e);
            None
        },
    }
}

fn color_key_alpha(request: &ImageRequest, data: &[u8], ranges: &[i64], options: &ParserOptions) -> Result<Vec<u8>> {
    let components = match &request.color_space {
        ColorSpace::Indexed { .. } => 1,
        other => other.components(),
    };
    let (stride, size) = sample_layout(request, components, request.bits_per_component, 1, options)?;
    let mut buffer = Vec::new();
    let data = padded(data, size, &mut buffer);

    let mut alpha = Vec::with_capacity(request.width as usize * request.height as usize);
    for row in data.chunks(stride) {
        let mut reader = SampleReader::new(row, request.bits_per_component);
        for _ in 0..request.width {
            let mut keyed = true;
            for c in 0..components {
                let sample = i64::from(reader.next());
                let inside = match (ranges.get(2 * c), ranges.get(2 * c + 1)) {
                    (Some(&lo), Some(&hi)) => sample >= lo && sample <= hi,
                    _ => false,
                };
                keyed &= inside;
            }
            alpha.push(if keyed { 0 } else { 255 });
        }
    }
    Ok(alpha)
}

/// Tries registered decoders in priority order.
#[derive(Debug, Clone)]
pub struct ImageDispatcher {
    decoders: Vec<Arc<dyn ImageDecoder>>,
    prefer_alternate: bool,
    options: ParserOptions,
}

impl ImageDispatcher {
    /// Dispatcher with the built-in [`RawSampleDecoder`].
    pub fn new(config: &InterpreterConfig, options: ParserOptions) -> Self {
        let mut dispatcher = Self::empty(config, options);
        dispatcher.register(Arc::new(RawSampleDecoder));
        dispatcher
    }

    /// Dispatcher with no decoders; every request is unsupported.
    pub fn empty(config: &InterpreterConfig, options: ParserOptions) -> Self {
        Self {
            decoders: Vec::new(),
            prefer_alternate: config.prefer_alternate_decoder,
            options,
        }
    }

    /// Add a decoder after the ones already registered.
    pub fn register(&mut self, decoder: Arc<dyn ImageDecoder>) {
        self.decoders.push(decoder);
    }

    /// Decoders in the order they are tried.
    pub fn decoders(&self) -> Vec<&Arc<dyn ImageDecoder>> {
        let mut ordered: Vec<&Arc<dyn ImageDecoder>> = self.decoders.iter().collect();
        if self.prefer_alternate && ordered.len() >= 2 {
            ordered.swap(0, 1);
        }
        ordered
    }

    /// Decode with the first decoder that succeeds.
    pub fn decode(&self, request: &ImageRequest) -> Result<DecodedImage> {
        let mut last_error = None;
        for decoder in self.decoders() {
            if !decoder.can_decode(request) {
                continue;
            }
            match decoder.decode(request, &self.options) {
                Ok(image) => {
                    log::debug!(
                        "Decoded {}x{} image with {}",
                        image.width,
                        image.height,
                        decoder.name()
                    );
                    return Ok(image);
                },
                Err(e) => {
                    log::debug!("Image decoder {} failed: {}", decoder.name(), e);
                    last_error = Some(e);
                },
            }
        }
        Err(last_error.unwrap_or_else(|| {
            Error::UnsupportedFilter(request.filter_name().unwrap_or("raw samples").to_string())
        }))
    }
}
