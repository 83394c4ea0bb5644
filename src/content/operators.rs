//! PDF content stream operators.
//!
//! [`Operator::build`] turns an operator keyword and the operands collected
//! before it into a typed operator. Fixed-arity operators take their operands
//! from the end of the operand list, so stray leading operands are ignored;
//! too few or mistyped operands are an [`Error::InvalidOperands`].

use crate::content::path::WindingRule;
use crate::error::{Error, Result};
use crate::object::{Dict, Object};

/// A content stream operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    // Path construction
    /// Move to (m)
    MoveTo {
        /// X coordinate
        x: f32,
        /// Y coordinate
        y: f32,
    },
    /// Line to (l)
    LineTo {
        /// X coordinate
        x: f32,
        /// Y coordinate
        y: f32,
    },
    /// Cubic Bézier curve (c)
    CurveTo {
        /// X coordinate of first control point
        x1: f32,
        /// Y coordinate of first control point
        y1: f32,
        /// X coordinate of second control point
        x2: f32,
        /// Y coordinate of second control point
        y2: f32,
        /// X coordinate of end point
        x3: f32,
        /// Y coordinate of end point
        y3: f32,
    },
    /// Bézier curve with first control point = current point (v)
    CurveToV {
        /// X coordinate of second control point
        x2: f32,
        /// Y coordinate of second control point
        y2: f32,
        /// X coordinate of end point
        x3: f32,
        /// Y coordinate of end point
        y3: f32,
    },
    /// Bézier curve with second control point = end point (y)
    CurveToY {
        /// X coordinate of first control point
        x1: f32,
        /// Y coordinate of first control point
        y1: f32,
        /// X coordinate of end point
        x3: f32,
        /// Y coordinate of end point
        y3: f32,
    },
    /// Rectangle (re)
    Rectangle {
        /// Lower-left x
        x: f32,
        /// Lower-left y
        y: f32,
        /// Width
        width: f32,
        /// Height
        height: f32,
    },
    /// Close subpath (h)
    ClosePath,

    // Path painting
    /// Stroke (S)
    Stroke,
    /// Close and stroke (s)
    CloseStroke,
    /// Fill (f, F, f*)
    Fill {
        /// Winding rule
        rule: WindingRule,
    },
    /// Fill and stroke (B, B*)
    FillStroke {
        /// Winding rule
        rule: WindingRule,
    },
    /// Close, fill and stroke (b, b*)
    CloseFillStroke {
        /// Winding rule
        rule: WindingRule,
    },
    /// End path without painting (n)
    EndPath,
    /// Mark the current path as the next clip (W, W*)
    Clip {
        /// Winding rule
        rule: WindingRule,
    },

    // Graphics state
    /// Save graphics state (q)
    SaveState,
    /// Restore graphics state (Q)
    RestoreState,
    /// Modify current transformation matrix (cm)
    Cm {
        /// Matrix components `[a b c d e f]`
        matrix: [f32; 6],
    },
    /// Line width (w)
    SetLineWidth {
        /// Width in user space
        width: f32,
    },
    /// Line cap (J)
    SetLineCap {
        /// 0 butt, 1 round, 2 square
        cap_style: i64,
    },
    /// Line join (j)
    SetLineJoin {
        /// 0 miter, 1 round, 2 bevel
        join_style: i64,
    },
    /// Miter limit (M)
    SetMiterLimit {
        /// Limit ratio
        limit: f32,
    },
    /// Dash pattern (d)
    SetDash {
        /// On/off lengths
        array: Vec<f32>,
        /// Phase
        phase: f32,
    },
    /// Rendering intent (ri)
    SetRenderingIntent {
        /// Intent name
        intent: String,
    },
    /// Flatness (i)
    SetFlatness {
        /// Tolerance
        tolerance: f32,
    },
    /// Apply an ExtGState resource (gs)
    SetExtGState {
        /// Resource name
        dict_name: String,
    },

    // Colour
    /// Gray fill (g)
    SetFillGray {
        /// Gray level
        gray: f32,
    },
    /// Gray stroke (G)
    SetStrokeGray {
        /// Gray level
        gray: f32,
    },
    /// RGB fill (rg)
    SetFillRgb {
        /// Red
        r: f32,
        /// Green
        g: f32,
        /// Blue
        b: f32,
    },
    /// RGB stroke (RG)
    SetStrokeRgb {
        /// Red
        r: f32,
        /// Green
        g: f32,
        /// Blue
        b: f32,
    },
    /// CMYK fill (k)
    SetFillCmyk {
        /// Cyan
        c: f32,
        /// Magenta
        m: f32,
        /// Yellow
        y: f32,
        /// Black
        k: f32,
    },
    /// CMYK stroke (K)
    SetStrokeCmyk {
        /// Cyan
        c: f32,
        /// Magenta
        m: f32,
        /// Yellow
        y: f32,
        /// Black
        k: f32,
    },
    /// Fill colour space (cs)
    SetFillColorSpace {
        /// Device family or `/ColorSpace` resource name
        name: String,
    },
    /// Stroke colour space (CS)
    SetStrokeColorSpace {
        /// Device family or `/ColorSpace` resource name
        name: String,
    },
    /// Fill colour (sc, scn)
    SetFillColor {
        /// Numeric components
        components: Vec<f32>,
        /// Pattern name (scn only)
        pattern: Option<String>,
    },
    /// Stroke colour (SC, SCN)
    SetStrokeColor {
        /// Numeric components
        components: Vec<f32>,
        /// Pattern name (SCN only)
        pattern: Option<String>,
    },

    // Text objects and state
    /// Begin text object (BT)
    BeginText,
    /// End text object (ET)
    EndText,
    /// Character spacing (Tc)
    Tc {
        /// Character spacing
        char_space: f32,
    },
    /// Word spacing (Tw)
    Tw {
        /// Word spacing
        word_space: f32,
    },
    /// Horizontal scaling (Tz)
    Tz {
        /// Percentage
        scale: f32,
    },
    /// Leading (TL)
    TL {
        /// Leading
        leading: f32,
    },
    /// Font and size (Tf)
    Tf {
        /// `/Font` resource name
        font: String,
        /// Size
        size: f32,
    },
    /// Rendering mode (Tr)
    Tr {
        /// Mode 0-7
        render: i64,
    },
    /// Rise (Ts)
    Ts {
        /// Rise
        rise: f32,
    },

    // Text positioning
    /// Move text position (Td)
    Td {
        /// Horizontal offset
        tx: f32,
        /// Vertical offset
        ty: f32,
    },
    /// Move text position and set leading (TD)
    TD {
        /// Horizontal offset
        tx: f32,
        /// Vertical offset
        ty: f32,
    },
    /// Set text matrix (Tm)
    Tm {
        /// Matrix components `[a b c d e f]`
        matrix: [f32; 6],
    },
    /// Move to start of next line (T*)
    TStar,

    // Text showing
    /// Show text string (Tj)
    Tj {
        /// Text to show
        text: Vec<u8>,
    },
    /// Show text with individual glyph positioning (TJ)
    TJ {
        /// Strings and adjustments
        array: Vec<TextElement>,
    },
    /// Move to next line and show text (')
    Quote {
        /// Text to show
        text: Vec<u8>,
    },
    /// Set spacing, move to next line and show text (")
    DoubleQuote {
        /// Word spacing
        word_space: f32,
        /// Character spacing
        char_space: f32,
        /// Text to show
        text: Vec<u8>,
    },

    // Type 3 glyphs
    /// Glyph width (d0)
    SetGlyphWidth,
    /// Glyph width and bounding box (d1)
    SetGlyphWidthAndBounds,

    // External objects
    /// Paint XObject (Do)
    Do {
        /// `/XObject` resource name
        name: String,
    },
    /// Inline image (BI ... ID ... EI)
    InlineImage {
        /// Image dictionary with keys expanded
        dict: Dict,
        /// Encoded sample bytes
        data: bytes::Bytes,
    },
    /// Paint shading (sh)
    PaintShading {
        /// `/Shading` resource name
        name: String,
    },

    // Marked content and compatibility
    /// Begin marked content (BMC)
    BeginMarkedContent {
        /// Tag
        tag: String,
    },
    /// Begin marked content with properties (BDC)
    BeginMarkedContentDict {
        /// Tag
        tag: String,
        /// Inline dictionary or `/Properties` resource name
        properties: Object,
    },
    /// End marked content (EMC)
    EndMarkedContent,
    /// Marked-content point (MP, DP)
    MarkPoint {
        /// Tag
        tag: String,
    },
    /// Begin compatibility section (BX)
    BeginCompatibility,
    /// End compatibility section (EX)
    EndCompatibility,

    /// Operator this interpreter does not know
    Other {
        /// Operator name
        name: String,
        /// Operands
        operands: Vec<Object>,
    },
}

/// Element in a TJ array (text showing with positioning).
#[derive(Debug, Clone, PartialEq)]
pub enum TextElement {
    /// Text string to show
    String(Vec<u8>),
    /// Positioning adjustment (in thousandths of a unit of text space)
    Offset(f32),
}

fn invalid(operator: &str, reason: impl Into<String>) -> Error {
    Error::InvalidOperands {
        operator: operator.to_string(),
        reason: reason.into(),
    }
}

/// The last `N` operands as numbers.
fn numbers<const N: usize>(operator: &str, operands: &[Object]) -> Result<[f32; N]> {
    if operands.len() < N {
        return Err(invalid(
            operator,
            format!("expected {} numbers, found {} operands", N, operands.len()),
        ));
    }
    let mut out = [0.0; N];
    for (slot, operand) in out.iter_mut().zip(&operands[operands.len() - N..]) {
        *slot = operand
            .as_f32()
            .ok_or_else(|| invalid(operator, format!("expected number, found {}", operand.type_name())))?;
    }
    Ok(out)
}

fn last(operator: &str, operands: &[Object]) -> Result<Object> {
    operands
        .last()
        .cloned()
        .ok_or_else(|| invalid(operator, "missing operand"))
}

fn name(operator: &str, operand: &Object) -> Result<String> {
    operand
        .as_name()
        .map(str::to_string)
        .ok_or_else(|| invalid(operator, format!("expected name, found {}", operand.type_name())))
}

fn string(operator: &str, operand: &Object) -> Result<Vec<u8>> {
    operand
        .as_string()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| invalid(operator, format!("expected string, found {}", operand.type_name())))
}

fn integer(operator: &str, operands: &[Object]) -> Result<i64> {
    let [value] = numbers::<1>(operator, operands)?;
    Ok(value.round() as i64)
}

/// Trailing numeric components of `sc`/`scn`, with an optional pattern name last.
fn color_operands(operator: &str, operands: &[Object], allow_pattern: bool) -> Result<(Vec<f32>, Option<String>)> {
    let (pattern, numeric) = match operands.split_last() {
        Some((Object::Name(pattern), rest)) if allow_pattern => (Some(pattern.clone()), rest),
        _ => (None, operands),
    };
    let start = numeric.iter().rposition(|o| o.as_f32().is_none()).map_or(0, |i| i + 1);
    let components: Vec<f32> = numeric[start..].iter().filter_map(Object::as_f32).collect();
    if components.is_empty() && pattern.is_none() {
        return Err(invalid(operator, "no colour components"));
    }
    Ok((components, pattern))
}

impl Operator {
    /// Build an operator from its keyword and the operands pushed before it.
    pub fn build(op: &str, operands: Vec<Object>) -> Result<Operator> {
        let ops = operands.as_slice();
        Ok(match op {
            // Path construction
            "m" => {
                let [x, y] = numbers(op, ops)?;
                Operator::MoveTo { x, y }
            },
            "l" => {
                let [x, y] = numbers(op, ops)?;
                Operator::LineTo { x, y }
            },
            "c" => {
                let [x1, y1, x2, y2, x3, y3] = numbers(op, ops)?;
                Operator::CurveTo { x1, y1, x2, y2, x3, y3 }
            },
            "v" => {
                let [x2, y2, x3, y3] = numbers(op, ops)?;
                Operator::CurveToV { x2, y2, x3, y3 }
            },
            "y" => {
                let [x1, y1, x3, y3] = numbers(op, ops)?;
                Operator::CurveToY { x1, y1, x3, y3 }
            },
            "re" => {
                let [x, y, width, height] = numbers(op, ops)?;
                Operator::Rectangle { x, y, width, height }
            },
            "h" => Operator::ClosePath,

            // Path painting
            "S" => Operator::Stroke,
            "s" => Operator::CloseStroke,
            "f" | "F" => Operator::Fill {
                rule: WindingRule::NonZero,
            },
            "f*" => Operator::Fill {
                rule: WindingRule::EvenOdd,
            },
            "B" => Operator::FillStroke {
                rule: WindingRule::NonZero,
            },
            "B*" => Operator::FillStroke {
                rule: WindingRule::EvenOdd,
            },
            "b" => Operator::CloseFillStroke {
                rule: WindingRule::NonZero,
            },
            "b*" => Operator::CloseFillStroke {
                rule: WindingRule::EvenOdd,
            },
            "n" => Operator::EndPath,
            "W" => Operator::Clip {
                rule: WindingRule::NonZero,
            },
            "W*" => Operator::Clip {
                rule: WindingRule::EvenOdd,
            },

            // Graphics state
            "q" => Operator::SaveState,
            "Q" => Operator::RestoreState,
            "cm" => Operator::Cm {
                matrix: numbers(op, ops)?,
            },
            "w" => {
                let [width] = numbers(op, ops)?;
                Operator::SetLineWidth { width }
            },
            "J" => Operator::SetLineCap {
                cap_style: integer(op, ops)?,
            },
            "j" => Operator::SetLineJoin {
                join_style: integer(op, ops)?,
            },
            "M" => {
                let [limit] = numbers(op, ops)?;
                Operator::SetMiterLimit { limit }
            },
            "d" => {
                if ops.len() < 2 {
                    return Err(invalid(op, "expected dash array and phase"));
                }
                let array = ops[ops.len() - 2]
                    .as_array()
                    .ok_or_else(|| invalid(op, "dash pattern is not an array"))?
                    .iter()
                    .filter_map(Object::as_f32)
                    .collect();
                let [phase] = numbers(op, ops)?;
                Operator::SetDash { array, phase }
            },
            "ri" => Operator::SetRenderingIntent {
                intent: name(op, &last(op, ops)?)?,
            },
            "i" => {
                let [tolerance] = numbers(op, ops)?;
                Operator::SetFlatness { tolerance }
            },
            "gs" => Operator::SetExtGState {
                dict_name: name(op, &last(op, ops)?)?,
            },

            // Colour
            "g" => {
                let [gray] = numbers(op, ops)?;
                Operator::SetFillGray { gray }
            },
            "G" => {
                let [gray] = numbers(op, ops)?;
                Operator::SetStrokeGray { gray }
            },
            "rg" => {
                let [r, g, b] = numbers(op, ops)?;
                Operator::SetFillRgb { r, g, b }
            },
            "RG" => {
                let [r, g, b] = numbers(op, ops)?;
                Operator::SetStrokeRgb { r, g, b }
            },
            "k" => {
                let [c, m, y, k] = numbers(op, ops)?;
                Operator::SetFillCmyk { c, m, y, k }
            },
            "K" => {
                let [c, m, y, k] = numbers(op, ops)?;
                Operator::SetStrokeCmyk { c, m, y, k }
            },
            "cs" => Operator::SetFillColorSpace {
                name: name(op, &last(op, ops)?)?,
            },
            "CS" => Operator::SetStrokeColorSpace {
                name: name(op, &last(op, ops)?)?,
            },
            "sc" | "scn" => {
                let (components, pattern) = color_operands(op, ops, op == "scn")?;
                Operator::SetFillColor { components, pattern }
            },
            "SC" | "SCN" => {
                let (components, pattern) = color_operands(op, ops, op == "SCN")?;
                Operator::SetStrokeColor { components, pattern }
            },

            // Text
            "BT" => Operator::BeginText,
            "ET" => Operator::EndText,
            "Tc" => {
                let [char_space] = numbers(op, ops)?;
                Operator::Tc { char_space }
            },
            "Tw" => {
                let [word_space] = numbers(op, ops)?;
                Operator::Tw { word_space }
            },
            "Tz" => {
                let [scale] = numbers(op, ops)?;
                Operator::Tz { scale }
            },
            "TL" => {
                let [leading] = numbers(op, ops)?;
                Operator::TL { leading }
            },
            "Tf" => {
                if ops.len() < 2 {
                    return Err(invalid(op, "expected font name and size"));
                }
                let font = name(op, &ops[ops.len() - 2])?;
                let [size] = numbers(op, ops)?;
                Operator::Tf { font, size }
            },
            "Tr" => Operator::Tr {
                render: integer(op, ops)?,
            },
            "Ts" => {
                let [rise] = numbers(op, ops)?;
                Operator::Ts { rise }
            },
            "Td" => {
                let [tx, ty] = numbers(op, ops)?;
                Operator::Td { tx, ty }
            },
            "TD" => {
                let [tx, ty] = numbers(op, ops)?;
                Operator::TD { tx, ty }
            },
            "Tm" => Operator::Tm {
                matrix: numbers(op, ops)?,
            },
            "T*" => Operator::TStar,
            "Tj" => Operator::Tj {
                text: string(op, &last(op, ops)?)?,
            },
            "'" => Operator::Quote {
                text: string(op, &last(op, ops)?)?,
            },
            "\"" => {
                if ops.len() < 3 {
                    return Err(invalid(op, "expected word spacing, char spacing and string"));
                }
                let text = string(op, &ops[ops.len() - 1])?;
                let [word_space, char_space] = numbers(op, &ops[..ops.len() - 1])?;
                Operator::DoubleQuote {
                    word_space,
                    char_space,
                    text,
                }
            },
            "TJ" => {
                let array = last(op, ops)?;
                let items = array
                    .as_array()
                    .ok_or_else(|| invalid(op, format!("expected array, found {}", array.type_name())))?;
                Operator::TJ {
                    array: items
                        .iter()
                        .filter_map(|obj| match obj {
                            Object::String(s) => Some(TextElement::String(s.clone())),
                            Object::Integer(i) => Some(TextElement::Offset(*i as f32)),
                            Object::Real(r) => Some(TextElement::Offset(*r as f32)),
                            _ => None,
                        })
                        .collect(),
                }
            },

            "d0" => Operator::SetGlyphWidth,
            "d1" => Operator::SetGlyphWidthAndBounds,

            // External objects
            "Do" => Operator::Do {
                name: name(op, &last(op, ops)?)?,
            },
            "BI" => match operands.into_iter().last() {
                Some(Object::Stream { dict, data }) => Operator::InlineImage { dict, data },
                _ => return Err(invalid(op, "inline image without data")),
            },
            "sh" => Operator::PaintShading {
                name: name(op, &last(op, ops)?)?,
            },

            // Marked content
            "BMC" => Operator::BeginMarkedContent {
                tag: name(op, &last(op, ops)?)?,
            },
            "BDC" => {
                if ops.len() < 2 {
                    return Err(invalid(op, "expected tag and properties"));
                }
                Operator::BeginMarkedContentDict {
                    tag: name(op, &ops[ops.len() - 2])?,
                    properties: ops[ops.len() - 1].clone(),
                }
            },
            "EMC" => Operator::EndMarkedContent,
            "MP" => Operator::MarkPoint {
                tag: name(op, &last(op, ops)?)?,
            },
            "DP" => {
                if ops.len() < 2 {
                    return Err(invalid(op, "expected tag and properties"));
                }
                Operator::MarkPoint {
                    tag: name(op, &ops[ops.len() - 2])?,
                }
            },
            "BX" => Operator::BeginCompatibility,
            "EX" => Operator::EndCompatibility,

            _ => Operator::Other {
                name: op.to_string(),
                operands,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Vec<Object> {
        values.iter().map(|&v| Object::Real(v)).collect()
    }

    #[test]
    fn test_fixed_arity_takes_trailing_operands() {
        let op = Operator::build("m", nums(&[99.0, 10.0, 20.0])).unwrap();
        assert_eq!(op, Operator::MoveTo { x: 10.0, y: 20.0 });
    }

    #[test]
    fn test_missing_operands_are_rejected() {
        match Operator::build("re", nums(&[1.0, 2.0])) {
            Err(Error::InvalidOperands { operator, .. }) => assert_eq!(operator, "re"),
            other => panic!("expected InvalidOperands, got {:?}", other),
        }
        assert!(Operator::build("Tf", vec![Object::Integer(12)]).is_err());
        assert!(Operator::build("l", vec![Object::Name("x".into()), Object::Integer(1)]).is_err());
    }

    #[test]
    fn test_fill_rules() {
        assert_eq!(
            Operator::build("f*", vec![]).unwrap(),
            Operator::Fill {
                rule: WindingRule::EvenOdd
            }
        );
        assert_eq!(
            Operator::build("F", vec![]).unwrap(),
            Operator::Fill {
                rule: WindingRule::NonZero
            }
        );
        assert_eq!(
            Operator::build("W*", vec![]).unwrap(),
            Operator::Clip {
                rule: WindingRule::EvenOdd
            }
        );
    }

    #[test]
    fn test_scn_with_pattern_and_tints() {
        let op = Operator::build(
            "scn",
            vec![Object::Real(0.5), Object::Integer(1), Object::Name("P0".into())],
        )
        .unwrap();
        assert_eq!(
            op,
            Operator::SetFillColor {
                components: vec![0.5, 1.0],
                pattern: Some("P0".into())
            }
        );

        // SC never takes a pattern name.
        assert!(Operator::build("SC", vec![Object::Name("P0".into())]).is_err());
    }

    #[test]
    fn test_text_operators() {
        let op = Operator::build("Tf", vec![Object::Name("F1".into()), Object::Integer(12)]).unwrap();
        assert_eq!(
            op,
            Operator::Tf {
                font: "F1".into(),
                size: 12.0
            }
        );

        let op = Operator::build(
            "\"",
            vec![Object::Integer(2), Object::Integer(1), Object::String(b"x".to_vec())],
        )
        .unwrap();
        assert_eq!(
            op,
            Operator::DoubleQuote {
                word_space: 2.0,
                char_space: 1.0,
                text: b"x".to_vec()
            }
        );

        let op = Operator::build(
            "TJ",
            vec![Object::Array(vec![
                Object::String(b"A".to_vec()),
                Object::Integer(-250),
                Object::String(b"B".to_vec()),
            ])],
        )
        .unwrap();
        assert_eq!(
            op,
            Operator::TJ {
                array: vec![
                    TextElement::String(b"A".to_vec()),
                    TextElement::Offset(-250.0),
                    TextElement::String(b"B".to_vec()),
                ]
            }
        );
    }

    #[test]
    fn test_dash_and_marked_content() {
        let op = Operator::build(
            "d",
            vec![Object::Array(vec![Object::Integer(3), Object::Integer(2)]), Object::Integer(1)],
        )
        .unwrap();
        assert_eq!(
            op,
            Operator::SetDash {
                array: vec![3.0, 2.0],
                phase: 1.0
            }
        );

        let op = Operator::build("BDC", vec![Object::Name("Span".into()), Object::Name("MC0".into())]).unwrap();
        assert!(matches!(op, Operator::BeginMarkedContentDict { ref tag, .. } if tag == "Span"));
    }

    #[test]
    fn test_unknown_operator_keeps_operands() {
        let op = Operator::build("zz", vec![Object::Integer(1)]).unwrap();
        assert_eq!(
            op,
            Operator::Other {
                name: "zz".into(),
                operands: vec![Object::Integer(1)]
            }
        );
    }
}
