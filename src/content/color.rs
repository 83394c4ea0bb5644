//! Colour spaces and colour values carried by the graphics state.
//!
//! Components are kept exactly as the content stream supplied them;
//! conversion to a device's colour model is the renderer's business.

use crate::content::resources::Resources;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::store::ObjectStore;
use std::sync::Arc;

/// Nesting allowed between colour spaces (Indexed over ICCBased over ...).
const MAX_COLOR_SPACE_DEPTH: usize = 8;

/// A resolved colour space.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    /// DeviceGray (1 component)
    DeviceGray,
    /// DeviceRGB (3 components)
    DeviceRGB,
    /// DeviceCMYK (4 components)
    DeviceCMYK,
    /// CalGray (1 component)
    CalGray,
    /// CalRGB (3 components)
    CalRGB,
    /// Lab (3 components)
    Lab,
    /// ICC profile stream with `/N` components
    ICCBased {
        /// Number of components
        components: usize,
        /// `/Alternate` space, if given
        alternate: Option<Box<ColorSpace>>,
    },
    /// Palette lookup into a base space
    Indexed {
        /// Base colour space
        base: Box<ColorSpace>,
        /// Highest valid index
        hival: u8,
        /// Palette bytes, `(hival + 1) * base.components()` long
        lookup: Vec<u8>,
    },
    /// Single named colorant
    Separation {
        /// Colorant name
        name: String,
        /// Alternate space the tint transform maps into
        alternate: Box<ColorSpace>,
    },
    /// Several named colorants
    DeviceN {
        /// Colorant names
        names: Vec<String>,
        /// Alternate space the tint transform maps into
        alternate: Box<ColorSpace>,
    },
    /// Pattern space, optionally over an underlying space for uncoloured patterns
    Pattern {
        /// Space of the tint components of an uncoloured pattern
        underlying: Option<Box<ColorSpace>>,
    },
}

impl ColorSpace {
    /// Device space for a family name, accepting inline-image abbreviations.
    pub fn from_name(name: &str) -> Option<ColorSpace> {
        Some(match name {
            "DeviceGray" | "G" => ColorSpace::DeviceGray,
            "DeviceRGB" | "RGB" => ColorSpace::DeviceRGB,
            "DeviceCMYK" | "CMYK" => ColorSpace::DeviceCMYK,
            "CalGray" => ColorSpace::CalGray,
            "CalRGB" => ColorSpace::CalRGB,
            "Lab" => ColorSpace::Lab,
            "Pattern" => ColorSpace::Pattern { underlying: None },
            _ => return None,
        })
    }

    /// Device space with `count` components.
    pub fn device_for_components(count: usize) -> Option<ColorSpace> {
        match count {
            1 => Some(ColorSpace::DeviceGray),
            3 => Some(ColorSpace::DeviceRGB),
            4 => Some(ColorSpace::DeviceCMYK),
            _ => None,
        }
    }

    /// Number of colour components an operator must supply.
    pub fn components(&self) -> usize {
        match self {
            ColorSpace::DeviceGray | ColorSpace::CalGray => 1,
            ColorSpace::DeviceRGB | ColorSpace::CalRGB | ColorSpace::Lab => 3,
            ColorSpace::DeviceCMYK => 4,
            ColorSpace::ICCBased { components, .. } => *components,
            ColorSpace::Indexed { .. } | ColorSpace::Separation { .. } => 1,
            ColorSpace::DeviceN { names, .. } => names.len(),
            ColorSpace::Pattern { underlying } => underlying.as_ref().map_or(0, |s| s.components()),
        }
    }

    /// Family name as written in PDF.
    pub fn family(&self) -> &'static str {
        match self {
            ColorSpace::DeviceGray => "DeviceGray",
            ColorSpace::DeviceRGB => "DeviceRGB",
            ColorSpace::DeviceCMYK => "DeviceCMYK",
            ColorSpace::CalGray => "CalGray",
            ColorSpace::CalRGB => "CalRGB",
            ColorSpace::Lab => "Lab",
            ColorSpace::ICCBased { .. } => "ICCBased",
            ColorSpace::Indexed { .. } => "Indexed",
            ColorSpace::Separation { .. } => "Separation",
            ColorSpace::DeviceN { .. } => "DeviceN",
            ColorSpace::Pattern { .. } => "Pattern",
        }
    }

    /// Check if this is a pattern space.
    pub fn is_pattern(&self) -> bool {
        matches!(self, ColorSpace::Pattern { .. })
    }

    /// Components of the initial colour after `cs`/`CS` selects this space.
    pub fn initial_components(&self) -> Vec<f32> {
        match self {
            ColorSpace::DeviceCMYK => vec![0.0, 0.0, 0.0, 1.0],
            ColorSpace::Separation { .. } => vec![1.0],
            ColorSpace::DeviceN { names, .. } => vec![1.0; names.len()],
            ColorSpace::Pattern { .. } => Vec::new(),
            other => vec![0.0; other.components()],
        }
    }

    /// Resolve a colour space operand or resource value.
    ///
    /// Names not in the device family are looked up in the `/ColorSpace`
    /// resources.
    pub fn resolve(object: &Object, store: &ObjectStore, resources: Option<&Resources<'_>>) -> Result<ColorSpace> {
        Self::resolve_at(object, store, resources, 0)
    }

    fn resolve_at(
        object: &Object,
        store: &ObjectStore,
        resources: Option<&Resources<'_>>,
        depth: usize,
    ) -> Result<ColorSpace> {
        if depth > MAX_COLOR_SPACE_DEPTH {
            return Err(Error::InvalidPdf("colour spaces nested too deeply".to_string()));
        }
        let Some(object) = store.resolve(object)? else {
            return Err(Error::InvalidPdf("colour space resolves to nothing".to_string()));
        };

        match &*object {
            Object::Name(name) => {
                if let Some(space) = ColorSpace::from_name(name) {
                    return Ok(space);
                }
                let named = match resources {
                    Some(resources) => resources.lookup("ColorSpace", name)?,
                    None => None,
                };
                match named {
                    Some(value) => Self::resolve_at(&value, store, None, depth + 1),
                    None => Err(Error::InvalidPdf(format!("unknown colour space /{}", name))),
                }
            },
            Object::Array(items) => Self::resolve_array(items, store, resources, depth),
            other => Err(Error::InvalidObjectType {
                expected: "Name or Array".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    fn resolve_array(
        items: &[Object],
        store: &ObjectStore,
        resources: Option<&Resources<'_>>,
        depth: usize,
    ) -> Result<ColorSpace> {
        let family = items
            .first()
            .and_then(|o| o.as_name())
            .ok_or_else(|| Error::InvalidPdf("colour space array without a family name".to_string()))?;
        let nested = |index: usize| -> Result<ColorSpace> {
            let item = items
                .get(index)
                .ok_or_else(|| Error::InvalidPdf(format!("/{} colour space is missing operand {}", family, index)))?;
            Self::resolve_at(item, store, resources, depth + 1)
        };

        match family {
            "ICCBased" => {
                let stream = match items.get(1) {
                    Some(value) => store.resolve(value)?,
                    None => None,
                };
                let stream = stream.ok_or_else(|| Error::InvalidPdf("ICCBased without a profile".to_string()))?;
                let alternate = match stream.get("Alternate") {
                    Some(alt) => Some(Box::new(Self::resolve_at(alt, store, resources, depth + 1)?)),
                    None => None,
                };
                let declared = stream.get("N").and_then(|o| o.as_integer()).map(|n| n.max(0) as usize);
                let components = declared
                    .or_else(|| alternate.as_ref().map(|a| a.components()))
                    .unwrap_or(3);
                Ok(ColorSpace::ICCBased { components, alternate })
            },
            "Indexed" | "I" => {
                let base = Box::new(nested(1)?);
                let hival = match items.get(2) {
                    Some(value) => store.resolve(value)?.and_then(|o| o.as_integer()).unwrap_or(0),
                    None => 0,
                };
                let lookup = match items.get(3) {
                    Some(value) => match store.resolve(value)? {
                        Some(table) if table.is_stream() => table.decode_stream_data_with_options(store.options())?,
                        Some(table) => table.as_string().map(|s| s.to_vec()).unwrap_or_default(),
                        None => Vec::new(),
                    },
                    None => Vec::new(),
                };
                Ok(ColorSpace::Indexed {
                    base,
                    hival: hival.clamp(0, 255) as u8,
                    lookup,
                })
            },
            "Separation" => Ok(ColorSpace::Separation {
                name: items.get(1).and_then(|o| o.as_name()).unwrap_or("All").to_string(),
                alternate: Box::new(nested(2)?),
            }),
            "DeviceN" => {
                let names = match items.get(1) {
                    Some(value) => store
                        .resolve(value)?
                        .and_then(|o| o.as_array().cloned())
                        .unwrap_or_default()
                        .iter()
                        .filter_map(|o| o.as_name().map(str::to_string))
                        .collect(),
                    None => Vec::new(),
                };
                Ok(ColorSpace::DeviceN {
                    names,
                    alternate: Box::new(nested(2)?),
                })
            },
            "Pattern" => Ok(ColorSpace::Pattern {
                underlying: if items.len() > 1 { Some(Box::new(nested(1)?)) } else { None },
            }),
            other => ColorSpace::from_name(other)
                .ok_or_else(|| Error::InvalidPdf(format!("unknown colour space family /{}", other))),
        }
    }
}

/// A pattern selected by `scn`/`SCN`.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternPaint {
    /// Resource name
    pub name: String,
    /// Pattern dictionary or stream, when it resolved
    pub pattern: Option<Arc<Object>>,
}

/// A colour: space, components and, for pattern spaces, the pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Color {
    /// Colour space the components are in
    pub space: ColorSpace,
    /// Components in operand order
    pub components: Vec<f32>,
    /// Pattern, in pattern spaces
    pub pattern: Option<PatternPaint>,
}

impl Color {
    /// Black in DeviceGray, the initial colour.
    pub fn black() -> Self {
        Self::gray(0.0)
    }

    /// DeviceGray colour.
    pub fn gray(level: f32) -> Self {
        Self {
            space: ColorSpace::DeviceGray,
            components: vec![level],
            pattern: None,
        }
    }

    /// DeviceRGB colour.
    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self {
            space: ColorSpace::DeviceRGB,
            components: vec![r, g, b],
            pattern: None,
        }
    }

    /// DeviceCMYK colour, components in operand order.
    pub fn cmyk(c: f32, m: f32, y: f32, k: f32) -> Self {
        Self {
            space: ColorSpace::DeviceCMYK,
            components: vec![c, m, y, k],
            pattern: None,
        }
    }

    /// Initial colour of `space`.
    pub fn initial(space: ColorSpace) -> Self {
        Self {
            components: space.initial_components(),
            space,
            pattern: None,
        }
    }

    /// Apply `sc`/`scn` operands to a colour in `space`.
    ///
    /// When the component count does not match the space, a device space
    /// with that many components is used instead; counts no device space
    /// has leave the colour unchanged (`None`).
    pub fn with_components(space: &ColorSpace, components: Vec<f32>, pattern: Option<PatternPaint>) -> Option<Self> {
        if space.is_pattern() {
            return Some(Self {
                space: space.clone(),
                components,
                pattern,
            });
        }
        if components.len() == space.components() {
            return Some(Self {
                space: space.clone(),
                components,
                pattern: None,
            });
        }

        let fallback = ColorSpace::device_for_components(components.len())?;
        log::warn!(
            "{} components given for {} colour space, using {}",
            components.len(),
            space.family(),
            fallback.family()
        );
        Some(Self {
            space: fallback,
            components,
            pattern: None,
        })
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::black()
    }
}
