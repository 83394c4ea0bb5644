//! Content stream interpreter.
//!
//! Runs the operators read by [`ContentReader`] against a graphics state
//! stack and records what they paint in a [`ShapeProgram`].
//!
//! Two regions matter: page level and text objects (`BT` ... `ET`). Inside
//! a text object `cm` accumulates into a separate text base transform that
//! is folded into the CTM at `ET`, so text placed between `BT` and `ET`
//! sees both.
//!
//! Malformed operators are logged and skipped. Lookups that fail for any
//! reason other than I/O are treated as absent resources. Only I/O errors
//! and cancellation leave [`ContentInterpreter::parse`] as an `Err`.

use crate::cancel::CancellationToken;
use crate::config::InterpreterConfig;
use crate::content::color::{Color, ColorSpace, PatternPaint};
use crate::content::graphics_state::{DashPattern, GraphicsState, GraphicsStateStack, LineCap, LineJoin, Matrix};
use crate::content::operators::{Operator, TextElement};
use crate::content::parser::ContentReader;
use crate::content::path::{ClipPath, Path, WindingRule};
use crate::content::program::{ImagePaint, ShapeCommand, ShapeProgram, TextRun};
use crate::content::resources::Resources;
use crate::content::text::{Glyph, TextRenderMode};
use crate::error::{Error, Result};
use crate::fonts::{DictionaryFont, DictionaryFontLoader, FontLoader, FontMetrics};
use crate::geometry::Rect;
use crate::images::{ImageDispatcher, ImageRequest};
use crate::object::{Dict, Object, ObjectRef};
use crate::store::ObjectStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Which operators get full treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Everything, for rendering.
    Full,
    /// Fonts, text state and positioning only, for text extraction.
    TextOnly,
}

/// State shared by a page and every form it invokes.
struct Session {
    mode: Mode,
    fonts: HashMap<ObjectRef, Arc<dyn FontMetrics>>,
    forms: Vec<ObjectRef>,
    operations: usize,
    stopped: bool,
}

/// State private to one content stream.
struct Frame {
    stack: GraphicsStateStack,
    path: Path,
    pending_clip: Option<WindingRule>,
    in_text: bool,
    text_base: Matrix,
    compatibility: usize,
    text_clip: Vec<Rect>,
    program: ShapeProgram,
}

impl Frame {
    fn new(state: GraphicsState) -> Self {
        Self {
            stack: GraphicsStateStack::with_state(state),
            path: Path::new(),
            pending_clip: None,
            in_text: false,
            text_base: Matrix::identity(),
            compatibility: 0,
            text_clip: Vec::new(),
            program: ShapeProgram::new(),
        }
    }

    fn state(&self) -> &GraphicsState {
        self.stack.current()
    }

    fn state_mut(&mut self) -> &mut GraphicsState {
        self.stack.current_mut()
    }

    /// CTM including the text base while inside a text object.
    fn effective_ctm(&self) -> Matrix {
        if self.in_text {
            self.text_base.multiply(&self.stack.current().ctm)
        } else {
            self.stack.current().ctm
        }
    }
}

/// Log a non-I/O failure and carry on without the value.
fn recover<T>(result: Result<T>, what: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_io() || e.is_interrupted() => Err(e),
        Err(e) => {
            log::warn!("Skipping {}: {}", what, e);
            Ok(None)
        },
    }
}

/// Interprets page and form content streams.
///
/// ```
/// use pdf_engine::content::{ContentInterpreter, Resources, ShapeCommand};
/// use pdf_engine::{InterpreterConfig, ObjectStore, ParserOptions};
///
/// let store = ObjectStore::in_memory(ParserOptions::default());
/// let interpreter = ContentInterpreter::new(&store, InterpreterConfig::default());
/// let program = interpreter
///     .parse(b"1 0 0 rg 10 10 50 50 re f", &Resources::empty(&store))
///     .unwrap();
///
/// assert!(program.is_complete());
/// assert!(matches!(program.commands[0], ShapeCommand::Fill { .. }));
/// ```
#[derive(Debug, Clone)]
pub struct ContentInterpreter<'a> {
    store: &'a ObjectStore,
    config: InterpreterConfig,
    font_loader: Arc<dyn FontLoader>,
    images: Option<&'a ImageDispatcher>,
    cancel: Option<CancellationToken>,
}

impl<'a> ContentInterpreter<'a> {
    /// Interpreter resolving resources through `store`.
    pub fn new(store: &'a ObjectStore, config: InterpreterConfig) -> Self {
        Self {
            store,
            config,
            font_loader: Arc::new(DictionaryFontLoader),
            images: None,
            cancel: None,
        }
    }

    /// Use `loader` for fonts selected with `Tf` or `gs`.
    pub fn with_font_loader(mut self, loader: Arc<dyn FontLoader>) -> Self {
        self.font_loader = loader;
        self
    }

    /// Decode image samples through `dispatcher`.
    ///
    /// Without a dispatcher images are placed but never decoded.
    pub fn with_image_dispatcher(mut self, dispatcher: &'a ImageDispatcher) -> Self {
        self.images = Some(dispatcher);
        self
    }

    /// Poll `token` before every operator.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The options in use.
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Interpret `content` with full fidelity.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] from the object store, or [`Error::Interrupted`] with
    /// the partial program when the cancellation token fires.
    pub fn parse(&self, content: &[u8], resources: &Resources<'_>) -> Result<ShapeProgram> {
        Ok(self.execute(content, resources, GraphicsState::new())?.0)
    }

    /// Interpret `content` tracking only text.
    ///
    /// Paths, clips, colours, images and shadings are skipped; the program
    /// holds the text index and nothing else.
    pub fn parse_text_only(&self, content: &[u8], resources: &Resources<'_>) -> Result<ShapeProgram> {
        let mut session = self.session(Mode::TextOnly);
        let (mut program, _) = self.run(&mut session, content, resources, GraphicsState::new())?;
        program.contract();
        program.mark_complete();
        Ok(program)
    }

    /// Interpret `content` starting from `state`, returning the program and
    /// the state left at the end.
    pub fn execute(
        &self,
        content: &[u8],
        resources: &Resources<'_>,
        state: GraphicsState,
    ) -> Result<(ShapeProgram, GraphicsState)> {
        let mut session = self.session(Mode::Full);
        let (mut program, state) = self.run(&mut session, content, resources, state)?;
        program.contract();
        program.mark_complete();
        Ok((program, state))
    }

    fn session(&self, mode: Mode) -> Session {
        Session {
            mode,
            fonts: HashMap::new(),
            forms: Vec::new(),
            operations: 0,
            stopped: false,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn run(
        &self,
        session: &mut Session,
        content: &[u8],
        resources: &Resources<'_>,
        state: GraphicsState,
    ) -> Result<(ShapeProgram, GraphicsState)> {
        let mut frame = Frame::new(state);
        let mut reader = ContentReader::with_options(content, self.store.options());

        loop {
            if self.cancelled() {
                log::info!("Interpretation cancelled at content offset {}", reader.offset());
                return Err(Error::Interrupted(Box::new(frame.program)));
            }
            if session.stopped {
                break;
            }
            let Some(operation) = reader.next() else {
                break;
            };

            session.operations += 1;
            if self.config.max_operations > 0 && session.operations > self.config.max_operations {
                log::warn!("Stopping after {} operators", self.config.max_operations);
                session.stopped = true;
                break;
            }

            let name = operation.name.clone();
            let operator = match operation.into_operator() {
                Ok(op) => op,
                Err(e) => {
                    log::warn!("Skipping '{}' at offset {}: {}", name, reader.offset(), e);
                    continue;
                },
            };

            match self.apply(session, &mut frame, resources, operator) {
                Ok(()) => {},
                Err(Error::Interrupted(_)) => return Err(Error::Interrupted(Box::new(frame.program))),
                Err(e) if e.is_io() => return Err(e),
                Err(e) => log::warn!("Operator '{}' failed: {}", name, e),
            }
        }

        if frame.in_text {
            self.end_text(session, &mut frame);
        }
        let Frame { program, stack, .. } = frame;
        Ok((program, stack.into_current()))
    }

    fn apply(&self, session: &mut Session, frame: &mut Frame, resources: &Resources<'_>, op: Operator) -> Result<()> {
        let full = session.mode == Mode::Full;
        match op {
            // Path construction
            Operator::MoveTo { x, y } if full => {
                let ctm = frame.effective_ctm();
                frame.path.move_to(x, y, &ctm);
            },
            Operator::LineTo { x, y } if full => {
                let ctm = frame.effective_ctm();
                if !frame.path.line_to(x, y, &ctm) {
                    log::warn!("'l' without a current point");
                }
            },
            Operator::CurveTo { x1, y1, x2, y2, x3, y3 } if full => {
                let ctm = frame.effective_ctm();
                if !frame.path.curve_to(x1, y1, x2, y2, x3, y3, &ctm) {
                    log::warn!("'c' without a current point");
                }
            },
            Operator::CurveToV { x2, y2, x3, y3 } if full => {
                let ctm = frame.effective_ctm();
                if !frame.path.curve_to_v(x2, y2, x3, y3, &ctm) {
                    log::warn!("'v' without a current point");
                }
            },
            Operator::CurveToY { x1, y1, x3, y3 } if full => {
                let ctm = frame.effective_ctm();
                if !frame.path.curve_to_y(x1, y1, x3, y3, &ctm) {
                    log::warn!("'y' without a current point");
                }
            },
            Operator::Rectangle { x, y, width, height } if full => {
                let ctm = frame.effective_ctm();
                frame.path.rectangle(x, y, width, height, &ctm);
            },
            Operator::ClosePath if full => {
                frame.path.close_path();
            },

            // Painting and clipping
            Operator::Stroke if full => self.paint(frame, None, true, false),
            Operator::CloseStroke if full => self.paint(frame, None, true, true),
            Operator::Fill { rule } if full => self.paint(frame, Some(rule), false, false),
            Operator::FillStroke { rule } if full => self.paint(frame, Some(rule), true, false),
            Operator::CloseFillStroke { rule } if full => self.paint(frame, Some(rule), true, true),
            Operator::EndPath if full => self.paint(frame, None, false, false),
            Operator::Clip { rule } if full => frame.pending_clip = Some(rule),

            // Graphics state
            Operator::SaveState => {
                frame.stack.save();
                if full {
                    frame.program.push(ShapeCommand::Save);
                }
            },
            Operator::RestoreState => {
                if !frame.stack.restore() {
                    log::warn!("'Q' without matching 'q', resetting graphics state");
                } else if full {
                    frame.program.push(ShapeCommand::Restore);
                }
            },
            Operator::Cm { matrix } => {
                let m = Matrix::from_slice(&matrix).unwrap_or_default();
                if frame.in_text {
                    frame.text_base = m.multiply(&frame.text_base);
                } else {
                    let state = frame.state_mut();
                    state.ctm = m.multiply(&state.ctm);
                    let ctm = state.ctm;
                    if full {
                        frame.program.push(ShapeCommand::Transform(ctm));
                    }
                }
            },
            Operator::SetLineWidth { width } => frame.state_mut().stroke_style.width = width,
            Operator::SetLineCap { cap_style } => match LineCap::from_code(cap_style) {
                Some(cap) => frame.state_mut().stroke_style.cap = cap,
                None => log::warn!("Invalid line cap {}", cap_style),
            },
            Operator::SetLineJoin { join_style } => match LineJoin::from_code(join_style) {
                Some(join) => frame.state_mut().stroke_style.join = join,
                None => log::warn!("Invalid line join {}", join_style),
            },
            Operator::SetMiterLimit { limit } => frame.state_mut().stroke_style.miter_limit = limit,
            Operator::SetDash { array, phase } => frame.state_mut().stroke_style.dash = DashPattern { array, phase },
            Operator::SetRenderingIntent { intent } => frame.state_mut().rendering_intent = intent,
            Operator::SetFlatness { tolerance } => frame.state_mut().flatness = tolerance,
            Operator::SetExtGState { dict_name } => self.apply_ext_gstate(session, frame, resources, &dict_name)?,

            // Colour
            Operator::SetFillGray { gray } if full => frame.state_mut().fill = Color::gray(gray),
            Operator::SetStrokeGray { gray } if full => frame.state_mut().stroke = Color::gray(gray),
            Operator::SetFillRgb { r, g, b } if full => frame.state_mut().fill = Color::rgb(r, g, b),
            Operator::SetStrokeRgb { r, g, b } if full => frame.state_mut().stroke = Color::rgb(r, g, b),
            Operator::SetFillCmyk { c, m, y, k } if full => frame.state_mut().fill = Color::cmyk(c, m, y, k),
            Operator::SetStrokeCmyk { c, m, y, k } if full => frame.state_mut().stroke = Color::cmyk(c, m, y, k),
            Operator::SetFillColorSpace { name } if full => {
                if let Some(space) = self.color_space(resources, &name)? {
                    frame.state_mut().fill = Color::initial(space);
                }
            },
            Operator::SetStrokeColorSpace { name } if full => {
                if let Some(space) = self.color_space(resources, &name)? {
                    frame.state_mut().stroke = Color::initial(space);
                }
            },
            Operator::SetFillColor { components, pattern } if full => {
                let pattern = self.pattern(resources, pattern)?;
                let space = frame.state().fill.space.clone();
                if let Some(color) = Color::with_components(&space, components, pattern) {
                    frame.state_mut().fill = color;
                }
            },
            Operator::SetStrokeColor { components, pattern } if full => {
                let pattern = self.pattern(resources, pattern)?;
                let space = frame.state().stroke.space.clone();
                if let Some(color) = Color::with_components(&space, components, pattern) {
                    frame.state_mut().stroke = color;
                }
            },

            // Text objects
            Operator::BeginText => {
                if frame.in_text {
                    log::warn!("Nested 'BT'");
                    self.end_text(session, frame);
                }
                frame.in_text = true;
                frame.text_base = Matrix::identity();
                frame.state_mut().text.begin();
                frame.program.text.break_word();
            },
            Operator::EndText => {
                if frame.in_text {
                    self.end_text(session, frame);
                } else {
                    log::warn!("'ET' outside a text object");
                }
            },

            // Text state
            Operator::Tc { char_space } => frame.state_mut().text.char_space = char_space,
            Operator::Tw { word_space } => frame.state_mut().text.word_space = word_space,
            Operator::Tz { scale } => frame.state_mut().text.horizontal_scaling = scale,
            Operator::TL { leading } => frame.state_mut().text.leading = leading,
            Operator::Tf { font, size } => {
                let metrics = self.font(session, resources, &font)?;
                let text = &mut frame.state_mut().text;
                text.font = metrics;
                text.font_name = Some(font);
                text.font_size = size;
            },
            Operator::Tr { render } => match TextRenderMode::from_code(render) {
                Some(mode) => frame.state_mut().text.render_mode = mode,
                None => log::warn!("Invalid text rendering mode {}", render),
            },
            Operator::Ts { rise } => frame.state_mut().text.rise = rise,

            // Text positioning
            Operator::Td { tx, ty } => self.move_line(frame, tx, ty),
            Operator::TD { tx, ty } => {
                frame.state_mut().text.leading = -ty;
                self.move_line(frame, tx, ty);
            },
            Operator::Tm { matrix } => {
                let m = Matrix::from_slice(&matrix).unwrap_or_default();
                let text = &mut frame.state_mut().text;
                let moved_vertically = text.matrix.f != m.f || text.matrix.d != m.d;
                text.matrix = m;
                text.line_matrix = m;
                if moved_vertically {
                    frame.program.text.new_line();
                } else {
                    frame.program.text.break_word();
                }
            },
            Operator::TStar => self.next_line(frame),

            // Text showing
            Operator::Tj { text } => {
                let glyphs = self.show_string(frame, &text);
                self.emit_text(session, frame, glyphs);
            },
            Operator::Quote { text } => {
                self.next_line(frame);
                let glyphs = self.show_string(frame, &text);
                self.emit_text(session, frame, glyphs);
            },
            Operator::DoubleQuote {
                word_space,
                char_space,
                text,
            } => {
                let state = frame.state_mut();
                state.text.word_space = word_space;
                state.text.char_space = char_space;
                self.next_line(frame);
                let glyphs = self.show_string(frame, &text);
                self.emit_text(session, frame, glyphs);
            },
            Operator::TJ { array } => {
                let mut glyphs = Vec::new();
                for element in array {
                    match element {
                        TextElement::String(bytes) => glyphs.extend(self.show_string(frame, &bytes)),
                        TextElement::Offset(adjustment) => {
                            let text = &mut frame.state_mut().text;
                            let shift = -adjustment / 1000.0 * text.font_size * text.horizontal_scale();
                            text.advance(shift);
                            if -adjustment > self.config.word_break_threshold {
                                frame.program.text.break_word();
                            }
                        },
                    }
                }
                self.emit_text(session, frame, glyphs);
            },

            // External objects
            Operator::Do { name } => self.do_xobject(session, frame, resources, &name)?,
            Operator::InlineImage { dict, data } if full => {
                let image = Object::Stream { dict, data };
                self.paint_image(frame, resources, None, &image)?;
            },
            Operator::PaintShading { name } if full => match resources.lookup("Shading", &name)? {
                Some(shading) => {
                    let matrix = frame.effective_ctm();
                    let alpha = frame.state().fill_alpha;
                    frame.program.push(ShapeCommand::Shading {
                        name,
                        shading,
                        matrix,
                        alpha,
                    });
                },
                None => log::warn!("Shading /{} not found", name),
            },

            Operator::BeginCompatibility => frame.compatibility += 1,
            Operator::EndCompatibility => frame.compatibility = frame.compatibility.saturating_sub(1),
            Operator::Other { name, .. } => {
                if frame.compatibility > 0 {
                    log::debug!("Ignoring '{}' inside BX/EX", name);
                } else {
                    log::warn!("Unknown operator '{}'", name);
                }
            },

            // Marked content, Type 3 metrics and everything skipped in text-only mode.
            _ => {},
        }
        Ok(())
    }

    // ========================================================================
    // Paths
    // ========================================================================

    fn paint(&self, frame: &mut Frame, fill: Option<WindingRule>, stroke: bool, close: bool) {
        if close {
            frame.path.close_path();
        }
        let path = frame.path.take();
        let clip = frame.pending_clip.take();
        if path.is_empty() {
            if fill.is_some() || stroke {
                log::debug!("Painting operator without a current path");
            }
            return;
        }

        let state = frame.stack.current();
        let command = match (fill, stroke) {
            (Some(rule), false) => Some(ShapeCommand::Fill {
                path: path.clone(),
                rule,
                color: state.fill.clone(),
                alpha: state.fill_alpha,
            }),
            (None, true) => Some(ShapeCommand::Stroke {
                path: path.clone(),
                color: state.stroke.clone(),
                style: state.stroke_style.clone(),
                alpha: state.stroke_alpha,
            }),
            (Some(rule), true) => Some(ShapeCommand::FillStroke {
                path: path.clone(),
                rule,
                fill: state.fill.clone(),
                stroke: state.stroke.clone(),
                style: state.stroke_style.clone(),
                fill_alpha: state.fill_alpha,
                stroke_alpha: state.stroke_alpha,
            }),
            (None, false) => None,
        };
        if let Some(command) = command {
            frame.program.push(command);
        }

        // W/W* take effect once the path has been painted.
        if let Some(rule) = clip {
            frame.program.push(ShapeCommand::Clip {
                path: path.clone(),
                rule,
            });
            frame.state_mut().push_clip(ClipPath { path, rule });
        }
    }

    // ========================================================================
    // Colour
    // ========================================================================

    fn color_space(&self, resources: &Resources<'_>, name: &str) -> Result<Option<ColorSpace>> {
        let what = format!("colour space /{}", name);
        recover(
            ColorSpace::resolve(&Object::Name(name.to_string()), self.store, Some(resources)),
            &what,
        )
    }

    fn pattern(&self, resources: &Resources<'_>, name: Option<String>) -> Result<Option<PatternPaint>> {
        let Some(name) = name else {
            return Ok(None);
        };
        let pattern = resources.lookup("Pattern", &name)?;
        if pattern.is_none() {
            log::warn!("Pattern /{} not found", name);
        }
        Ok(Some(PatternPaint { name, pattern }))
    }

    // ========================================================================
    // Graphics state parameter dictionaries
    // ========================================================================

    fn apply_ext_gstate(
        &self,
        session: &mut Session,
        frame: &mut Frame,
        resources: &Resources<'_>,
        name: &str,
    ) -> Result<()> {
        let Some(gs) = resources.lookup("ExtGState", name)? else {
            log::warn!("ExtGState /{} not found", name);
            return Ok(());
        };
        let Some(dict) = gs.as_dict() else {
            log::warn!("ExtGState /{} is a {}", name, gs.type_name());
            return Ok(());
        };

        let mut entries: Vec<(&String, Object)> = Vec::with_capacity(dict.len());
        for (key, value) in dict {
            let what = format!("ExtGState /{} /{}", name, key);
            let resolved = crate::store::tolerate(self.store.resolve(value), &what)?;
            if let Some(resolved) = resolved {
                entries.push((key, resolved.into_owned()));
            }
        }

        for (key, value) in entries {
            match key.as_str() {
                "LW" => {
                    if let Some(width) = value.as_f32() {
                        frame.state_mut().stroke_style.width = width;
                    }
                },
                "LC" => {
                    if let Some(cap) = value.as_integer().and_then(LineCap::from_code) {
                        frame.state_mut().stroke_style.cap = cap;
                    }
                },
                "LJ" => {
                    if let Some(join) = value.as_integer().and_then(LineJoin::from_code) {
                        frame.state_mut().stroke_style.join = join;
                    }
                },
                "ML" => {
                    if let Some(limit) = value.as_f32() {
                        frame.state_mut().stroke_style.miter_limit = limit;
                    }
                },
                "D" => {
                    let dash = value.as_array().and_then(|items| {
                        let array = items.first()?.as_array()?.iter().filter_map(Object::as_f32).collect();
                        let phase = items.get(1).and_then(Object::as_f32).unwrap_or(0.0);
                        Some(DashPattern { array, phase })
                    });
                    if let Some(dash) = dash {
                        frame.state_mut().stroke_style.dash = dash;
                    }
                },
                "CA" => {
                    if let Some(alpha) = value.as_f32() {
                        frame.state_mut().stroke_alpha = alpha.clamp(0.0, 1.0);
                    }
                },
                "ca" => {
                    if let Some(alpha) = value.as_f32() {
                        frame.state_mut().fill_alpha = alpha.clamp(0.0, 1.0);
                    }
                },
                "OP" => {
                    if let Some(overprint) = value.as_bool() {
                        let state = frame.state_mut();
                        state.stroke_overprint = overprint;
                        if !dict.contains_key("op") {
                            state.fill_overprint = overprint;
                        }
                    }
                },
                "op" => {
                    if let Some(overprint) = value.as_bool() {
                        frame.state_mut().fill_overprint = overprint;
                    }
                },
                "BM" => {
                    let mode = match &value {
                        Object::Name(mode) => Some(mode.clone()),
                        Object::Array(modes) => modes.first().and_then(Object::as_name).map(str::to_string),
                        _ => None,
                    };
                    if let Some(mode) = mode {
                        frame.state_mut().blend_mode = mode;
                    }
                },
                "Font" => {
                    let Some(items) = value.as_array() else {
                        continue;
                    };
                    let (Some(font), Some(size)) = (items.first(), items.get(1).and_then(Object::as_f32)) else {
                        continue;
                    };
                    let metrics = self.load_font(session, font.as_reference(), font)?;
                    let text = &mut frame.state_mut().text;
                    text.font = metrics;
                    text.font_name = None;
                    text.font_size = size;
                },
                _ => {},
            }
        }
        Ok(())
    }

    // ========================================================================
    // Fonts
    // ========================================================================

    fn font(&self, session: &mut Session, resources: &Resources<'_>, name: &str) -> Result<Arc<dyn FontMetrics>> {
        match resources.lookup_with_ref("Font", name)? {
            Some((reference, font)) => self.load_font(session, reference, &font),
            None => {
                log::warn!("Font /{} not found, using default metrics", name);
                Ok(Arc::new(DictionaryFont::fallback()))
            },
        }
    }

    fn load_font(
        &self,
        session: &mut Session,
        reference: Option<ObjectRef>,
        font: &Object,
    ) -> Result<Arc<dyn FontMetrics>> {
        if let Some(cached) = reference.and_then(|r| session.fonts.get(&r)) {
            return Ok(Arc::clone(cached));
        }
        let resolved = match self.store.resolve(font)? {
            Some(handle) => handle.into_owned(),
            None => Object::Null,
        };
        let metrics = match recover(self.font_loader.load(self.store, &resolved), "font")? {
            Some(metrics) => metrics,
            None => Arc::new(DictionaryFont::fallback()) as Arc<dyn FontMetrics>,
        };
        if let Some(reference) = reference {
            session.fonts.insert(reference, Arc::clone(&metrics));
        }
        Ok(metrics)
    }

    // ========================================================================
    // Text
    // ========================================================================

    fn move_line(&self, frame: &mut Frame, tx: f32, ty: f32) {
        frame.state_mut().text.move_line(tx, ty);
        if ty != 0.0 {
            frame.program.text.new_line();
        } else {
            frame.program.text.break_word();
        }
    }

    fn next_line(&self, frame: &mut Frame) {
        let leading = frame.state().text.leading;
        self.move_line(frame, 0.0, -leading);
    }

    /// Advance through one string, recording glyphs in the text index.
    fn show_string(&self, frame: &mut Frame, bytes: &[u8]) -> Vec<Glyph> {
        if !frame.in_text {
            log::debug!("Text shown outside a text object");
        }
        let ctm = frame.effective_ctm();
        let clips = frame.state().text.render_mode.clips();
        let text = &mut frame.stack.current_mut().text;
        let font = Arc::clone(&text.font);
        let size = text.font_size;
        let scale = text.horizontal_scale();
        let bottom = text.rise + font.descent() * size / 1000.0;
        let top = text.rise + font.ascent() * size / 1000.0;

        let mut glyphs = Vec::new();
        for (code, len) in font.decode_codes(bytes) {
            let (w0, _) = font.measure_glyph_advance(code);
            let width = w0 / 1000.0 * size;
            let is_space = len == 1 && code == 32;

            if is_space {
                frame.program.text.break_word();
            } else {
                let to_page = text.matrix.multiply(&ctm);
                let bbox = to_page.transform_rect(&Rect::from_points(0.0, bottom, width * scale, top));
                let glyph = Glyph {
                    code,
                    unicode: font.to_unicode(code).unwrap_or_default(),
                    bbox,
                };
                if clips {
                    frame.text_clip.push(bbox);
                }
                frame.program.text.push_glyph(glyph.clone());
                glyphs.push(glyph);
            }

            let spacing = text.char_space + if is_space { text.word_space } else { 0.0 };
            text.advance((width + spacing) * scale);
        }
        glyphs
    }

    fn emit_text(&self, session: &Session, frame: &mut Frame, glyphs: Vec<Glyph>) {
        if session.mode != Mode::Full || glyphs.is_empty() {
            return;
        }
        let state = frame.stack.current();
        let mode = state.text.render_mode;
        if !mode.fills() && !mode.strokes() {
            return;
        }
        let scale = state.text.matrix.scale_factor();
        let stroke_width = if scale > f32::EPSILON {
            state.stroke_style.width / scale
        } else {
            state.stroke_style.width
        };
        let run = TextRun {
            font_name: state.text.font_name.clone(),
            font_size: state.text.font_size,
            render_mode: mode,
            glyphs,
            fill: mode.fills().then(|| state.fill.clone()),
            stroke: mode.strokes().then(|| state.stroke.clone()),
            stroke_width,
            fill_alpha: state.fill_alpha,
            stroke_alpha: state.stroke_alpha,
        };
        frame.program.push(ShapeCommand::Text(run));
    }

    fn end_text(&self, session: &Session, frame: &mut Frame) {
        frame.in_text = false;
        let base = std::mem::replace(&mut frame.text_base, Matrix::identity());
        let full = session.mode == Mode::Full;
        if base != Matrix::identity() {
            let state = frame.state_mut();
            state.ctm = base.multiply(&state.ctm);
            let ctm = state.ctm;
            if full {
                frame.program.push(ShapeCommand::Transform(ctm));
            }
        }

        let rects = std::mem::take(&mut frame.text_clip);
        if full && !rects.is_empty() {
            let mut path = Path::new();
            for rect in &rects {
                path.rectangle(rect.x, rect.y, rect.width, rect.height, &Matrix::identity());
            }
            frame.program.push(ShapeCommand::Clip {
                path: path.clone(),
                rule: WindingRule::NonZero,
            });
            frame.state_mut().push_clip(ClipPath {
                path,
                rule: WindingRule::NonZero,
            });
        }
    }

    // ========================================================================
    // XObjects
    // ========================================================================

    fn do_xobject(&self, session: &mut Session, frame: &mut Frame, resources: &Resources<'_>, name: &str) -> Result<()> {
        let Some((reference, xobject)) = resources.lookup_with_ref("XObject", name)? else {
            log::warn!("XObject /{} not found", name);
            return Ok(());
        };
        let subtype = match xobject.get("Subtype") {
            Some(value) => self.store.resolve(value)?.and_then(|o| o.as_name().map(str::to_string)),
            None => None,
        };
        match subtype.as_deref() {
            Some("Form") => self.do_form(session, frame, resources, name, reference, &xobject),
            Some("Image") if session.mode == Mode::Full => self.paint_image(frame, resources, Some(name), &xobject),
            Some("Image") => Ok(()),
            other => {
                log::warn!("XObject /{} has unsupported subtype {:?}", name, other);
                Ok(())
            },
        }
    }

    fn do_form(
        &self,
        session: &mut Session,
        frame: &mut Frame,
        resources: &Resources<'_>,
        name: &str,
        reference: Option<ObjectRef>,
        form: &Object,
    ) -> Result<()> {
        if let Some(reference) = reference {
            if session.forms.contains(&reference) {
                log::warn!("Skipping form /{}: {}", name, Error::CircularReference(reference));
                return Ok(());
            }
        }
        if session.forms.len() >= self.config.max_form_depth {
            log::warn!(
                "Skipping form /{}: {}",
                name,
                Error::RecursionLimitExceeded(self.config.max_form_depth as u32)
            );
            return Ok(());
        }
        let Object::Stream { dict, .. } = form else {
            log::warn!("Form /{} is not a stream", name);
            return Ok(());
        };
        let what = format!("form /{}", name);
        let Some(content) = recover(form.decode_stream_data_with_options(self.store.options()), &what)? else {
            return Ok(());
        };

        let matrix = self.matrix_entry(dict, "Matrix")?;
        let ctm = matrix.multiply(&frame.effective_ctm());
        let full = session.mode == Mode::Full;

        let mut state = frame.state().clone();
        state.ctm = ctm;
        if full {
            frame.program.push(ShapeCommand::Save);
        }

        if let Some(bbox) = self.rect_entry(dict, "BBox")? {
            if matrix.is_invertible() {
                let clip = Path::from_rect(&bbox).transformed(&ctm);
                if full {
                    frame.program.push(ShapeCommand::Clip {
                        path: clip.clone(),
                        rule: WindingRule::NonZero,
                    });
                }
                state.push_clip(ClipPath {
                    path: clip,
                    rule: WindingRule::NonZero,
                });
            } else {
                log::warn!("Form /{} matrix is not invertible, painting unclipped", name);
            }
        }
        if full {
            frame.program.push(ShapeCommand::Transform(ctm));
        }

        let form_resources = match self.store.resolve_dict_entry(dict, "Resources")? {
            Some(value) => match value.as_dict() {
                Some(res) => Resources::new(self.store, res.clone()),
                None => resources.clone(),
            },
            None => resources.clone(),
        };

        if let Some(reference) = reference {
            session.forms.push(reference);
        }
        let result = self.run(session, &content, &form_resources, state);
        if reference.is_some() {
            session.forms.pop();
        }

        let interrupted = match result {
            Ok((program, _)) => {
                frame.program.append(program);
                false
            },
            Err(Error::Interrupted(partial)) => {
                frame.program.append(*partial);
                true
            },
            Err(e) => return Err(e),
        };
        if full {
            frame.program.push(ShapeCommand::Restore);
        }
        if interrupted {
            return Err(Error::Interrupted(Box::default()));
        }
        Ok(())
    }

    fn paint_image(
        &self,
        frame: &mut Frame,
        resources: &Resources<'_>,
        name: Option<&str>,
        image: &Object,
    ) -> Result<()> {
        let label = name.unwrap_or("inline");
        let what = format!("image /{}", label);
        let Some(request) = recover(ImageRequest::from_stream(self.store, image, Some(resources)), &what)? else {
            return Ok(());
        };

        let decoded = match self.images {
            Some(dispatcher) if self.config.decode_images => recover(dispatcher.decode(&request), &what)?,
            _ => None,
        };

        // Samples run top to bottom, user space runs bottom to top.
        let matrix = Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, 1.0).multiply(&frame.effective_ctm());
        let state = frame.state();
        let interpolate = image.get("Interpolate").and_then(Object::as_bool).unwrap_or(false);
        let paint = ImagePaint {
            name: name.map(str::to_string),
            matrix,
            width: request.width,
            height: request.height,
            decoded,
            stencil: request.image_mask.then(|| state.fill.clone()),
            interpolate,
            alpha: state.fill_alpha,
        };
        frame.program.push(ShapeCommand::Image(paint));
        Ok(())
    }

    fn matrix_entry(&self, dict: &Dict, key: &str) -> Result<Matrix> {
        let values: Option<Vec<f32>> = self
            .store
            .resolve_dict_entry(dict, key)?
            .and_then(|o| o.as_array().map(|items| items.iter().filter_map(Object::as_f32).collect()));
        Ok(values.as_deref().and_then(Matrix::from_slice).unwrap_or_default())
    }

    fn rect_entry(&self, dict: &Dict, key: &str) -> Result<Option<Rect>> {
        let values: Option<Vec<f32>> = self
            .store
            .resolve_dict_entry(dict, key)?
            .and_then(|o| o.as_array().map(|items| items.iter().filter_map(Object::as_f32).collect()));
        Ok(values.as_deref().and_then(Rect::from_array))
    }
}
