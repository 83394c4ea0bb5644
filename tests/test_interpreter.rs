//! Page interpretation tests: paths, forms, images, graphics state and
//! cancellation, driven through whole documents.

mod common;

use common::{init_logging, PdfBuilder};
use pdf_engine::content::{
    Color, GraphicsState, Matrix, PathSegment, Resources, ShapeCommand, ShapeProgram, WindingRule,
};
use pdf_engine::fonts::{DictionaryFont, FontLoader, FontMetrics};
use pdf_engine::geometry::{Point, Rect};
use pdf_engine::images::PixelFormat;
use pdf_engine::source::ByteSource;
use pdf_engine::{
    CancellationToken, ContentInterpreter, Error, InterpreterConfig, Object, ObjectStore, ParserOptions, PdfDocument,
    Result,
};
use std::sync::Arc;

/// Catalog 1, pages 2, page 3 with `resources`, content 4; `extra` adds
/// objects numbered from 5.
fn page_pdf(resources: &str, content: &[u8], extra: impl FnOnce(&mut PdfBuilder)) -> Vec<u8> {
    let mut pdf = PdfBuilder::new("1.4");
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.object(
        3,
        &format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources {} /Contents 4 0 R >>",
            resources
        ),
    );
    pdf.stream(4, "", content);
    extra(&mut pdf);
    pdf.xref_table("/Size 20 /Root 1 0 R");
    pdf.finish()
}

fn interpret(data: Vec<u8>) -> ShapeProgram {
    init_logging();
    let doc = PdfDocument::from_bytes(data).unwrap();
    let page = doc.page(0).unwrap();
    doc.interpret_page(page).unwrap()
}

fn fills(program: &ShapeProgram) -> Vec<(Rect, Color, f32)> {
    program
        .commands
        .iter()
        .filter_map(|c| match c {
            ShapeCommand::Fill { path, color, alpha, .. } => Some((path.bounds()?, color.clone(), *alpha)),
            _ => None,
        })
        .collect()
}

/// Run `content` against an empty store from the default state.
fn execute(content: &[u8]) -> (ShapeProgram, GraphicsState) {
    init_logging();
    let store = ObjectStore::in_memory(ParserOptions::default());
    let interpreter = ContentInterpreter::new(&store, InterpreterConfig::default());
    interpreter
        .execute(content, &Resources::empty(&store), GraphicsState::new())
        .unwrap()
}

// ============================================================================
// Paths
// ============================================================================

#[test]
fn test_quadrilateral_fill() {
    let (program, _) = execute(b"10 20 m 30 20 l 30 40 l 10 40 l h f");

    assert_eq!(program.commands.len(), 1);
    match &program.commands[0] {
        ShapeCommand::Fill { path, rule, .. } => {
            assert_eq!(*rule, WindingRule::NonZero);
            assert_eq!(
                path.segments(),
                &[
                    PathSegment::MoveTo(Point::new(10.0, 20.0)),
                    PathSegment::LineTo(Point::new(30.0, 20.0)),
                    PathSegment::LineTo(Point::new(30.0, 40.0)),
                    PathSegment::LineTo(Point::new(10.0, 40.0)),
                    PathSegment::Close,
                ]
            );
        },
        other => panic!("expected fill, got {:?}", other),
    }
}

// ============================================================================
// Form XObjects
// ============================================================================

#[test]
fn test_form_is_clipped_and_transformed() {
    let data = page_pdf("<< /XObject << /Fm1 5 0 R >> >>", b"/Fm1 Do", |pdf| {
        pdf.stream(
            5,
            "/Type /XObject /Subtype /Form /BBox [0 0 100 100] /Matrix [1 0 0 1 50 50]",
            b"0 0 1 rg 0 0 10 10 re f",
        );
    });
    let program = interpret(data);

    assert_eq!(program.commands.first(), Some(&ShapeCommand::Save));
    assert_eq!(program.commands.last(), Some(&ShapeCommand::Restore));
    let clip = program.commands.iter().find_map(|c| match c {
        ShapeCommand::Clip { path, .. } => path.bounds(),
        _ => None,
    });
    assert_eq!(clip, Some(Rect::new(50.0, 50.0, 100.0, 100.0)));
    assert!(program
        .commands
        .contains(&ShapeCommand::Transform(Matrix::translation(50.0, 50.0))));
    assert_eq!(
        fills(&program),
        vec![(Rect::new(50.0, 50.0, 10.0, 10.0), Color::rgb(0.0, 0.0, 1.0), 1.0)]
    );
}

#[test]
fn test_form_state_does_not_leak() {
    let data = page_pdf("<< /XObject << /Fm1 5 0 R >> >>", b"/Fm1 Do 0 0 5 5 re f", |pdf| {
        pdf.stream(5, "/Subtype /Form /BBox [0 0 100 100]", b"1 0 0 rg 2 0 0 2 0 0 cm");
    });
    let program = interpret(data);

    assert_eq!(fills(&program), vec![(Rect::new(0.0, 0.0, 5.0, 5.0), Color::black(), 1.0)]);
}

#[test]
fn test_self_referencing_form_runs_once() {
    let data = page_pdf("<< /XObject << /Fm1 5 0 R >> >>", b"/Fm1 Do", |pdf| {
        pdf.stream(
            5,
            "/Subtype /Form /BBox [0 0 100 100] /Resources << /XObject << /Fm1 5 0 R >> >>",
            b"0 0 5 5 re f /Fm1 Do",
        );
    });
    let program = interpret(data);
    assert_eq!(fills(&program).len(), 1);
}

#[test]
fn test_form_depth_limit() {
    init_logging();
    // Fm1 -> Fm2 -> Fm3, each painting one square.
    let data = page_pdf("<< /XObject << /Fm1 5 0 R >> >>", b"/Fm1 Do", |pdf| {
        pdf.stream(
            5,
            "/Subtype /Form /BBox [0 0 100 100] /Resources << /XObject << /Fm2 6 0 R >> >>",
            b"0 0 1 1 re f /Fm2 Do",
        );
        pdf.stream(
            6,
            "/Subtype /Form /BBox [0 0 100 100] /Resources << /XObject << /Fm3 7 0 R >> >>",
            b"0 0 2 2 re f /Fm3 Do",
        );
        pdf.stream(7, "/Subtype /Form /BBox [0 0 100 100]", b"0 0 3 3 re f");
    });

    let config = InterpreterConfig::default().with_max_form_depth(2);
    let doc = PdfDocument::from_source(ByteSource::from_bytes(data), ParserOptions::default(), config).unwrap();
    let program = doc.interpret_page(doc.page(0).unwrap()).unwrap();
    assert_eq!(fills(&program).len(), 2);
}

#[test]
fn test_form_uses_parent_resources_when_it_has_none() {
    let data = page_pdf(
        "<< /XObject << /Fm1 5 0 R >> /ExtGState << /Half << /ca 0.5 >> >> >>",
        b"/Fm1 Do",
        |pdf| {
            pdf.stream(5, "/Subtype /Form /BBox [0 0 100 100]", b"/Half gs 0 0 4 4 re f");
        },
    );
    let program = interpret(data);
    assert_eq!(fills(&program)[0].2, 0.5);
}

// ============================================================================
// Images
// ============================================================================

#[test]
fn test_image_xobject_placement_and_samples() {
    let data = page_pdf("<< /XObject << /Im1 5 0 R >> >>", b"q 100 0 0 50 10 20 cm /Im1 Do Q", |pdf| {
        pdf.stream(
            5,
            "/Type /XObject /Subtype /Image /Width 2 /Height 2 /ColorSpace /DeviceGray /BitsPerComponent 8",
            &[0, 255, 128, 64],
        );
    });
    let program = interpret(data);

    let images: Vec<_> = program.images().collect();
    assert_eq!(images.len(), 1);
    let image = images[0];
    assert_eq!(image.name.as_deref(), Some("Im1"));
    assert_eq!((image.width, image.height), (2, 2));
    assert_eq!(image.matrix, Matrix::new(100.0, 0.0, 0.0, -50.0, 10.0, 70.0));

    let decoded = image.decoded.as_ref().unwrap();
    assert_eq!(decoded.format, PixelFormat::Gray8);
    assert_eq!(decoded.data, vec![0, 255, 128, 64]);
}

#[test]
fn test_image_decoding_can_be_disabled() {
    init_logging();
    let data = page_pdf("<< /XObject << /Im1 5 0 R >> >>", b"/Im1 Do", |pdf| {
        pdf.stream(5, "/Subtype /Image /Width 1 /Height 1 /ColorSpace /DeviceGray /BitsPerComponent 8", &[7]);
    });
    let config = InterpreterConfig::default().with_decode_images(false);
    let doc = PdfDocument::from_source(ByteSource::from_bytes(data), ParserOptions::default(), config).unwrap();
    let program = doc.interpret_page(doc.page(0).unwrap()).unwrap();

    let image = program.images().next().unwrap();
    assert!(image.decoded.is_none());
    assert_eq!((image.width, image.height), (1, 1));
}

#[test]
fn test_inline_rgb_image() {
    let mut content = b"q 20 0 0 20 0 0 cm BI /W 2 /H 1 /CS /RGB /BPC 8 ID ".to_vec();
    content.extend_from_slice(&[0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00]);
    content.extend_from_slice(b" EI Q");
    let program = interpret(page_pdf("<< >>", &content, |_| {}));

    let image = program.images().next().unwrap();
    assert!(image.name.is_none());
    assert_eq!((image.width, image.height), (2, 1));
    let decoded = image.decoded.as_ref().unwrap();
    assert_eq!(decoded.format, PixelFormat::Rgb8);
    assert_eq!(decoded.data, vec![0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00]);
}

#[test]
fn test_stencil_mask_paints_fill_colour() {
    let mut content = b"1 0 0 rg BI /W 8 /H 1 /IM true ID ".to_vec();
    content.push(0xAA);
    content.extend_from_slice(b" EI");
    let program = interpret(page_pdf("<< >>", &content, |_| {}));

    let image = program.images().next().unwrap();
    assert_eq!(image.stencil, Some(Color::rgb(1.0, 0.0, 0.0)));
}

#[test]
fn test_huge_inline_image_is_left_undecoded() {
    let content = b"BI /W 4000000000 /H 4000000000 /BPC 16 /CS /RGB ID \x00\x01 EI 0 0 1 1 re f";
    let program = interpret(page_pdf("<< >>", content, |_| {}));

    let image = program.images().next().unwrap();
    assert_eq!((image.width, image.height), (4_000_000_000, 4_000_000_000));
    assert!(image.decoded.is_none());
    assert_eq!(fills(&program).len(), 1);
}

#[test]
fn test_image_without_dimensions_is_skipped() {
    let data = page_pdf("<< /XObject << /Im1 5 0 R >> >>", b"/Im1 Do 0 0 1 1 re f", |pdf| {
        pdf.stream(5, "/Subtype /Image /ColorSpace /DeviceGray /BitsPerComponent 8", &[7]);
    });
    let program = interpret(data);
    assert_eq!(program.images().count(), 0);
    assert_eq!(fills(&program).len(), 1);
}

// ============================================================================
// Graphics state
// ============================================================================

#[test]
fn test_balanced_save_restore_restores_state() {
    let (program, state) = execute(
        b"2 0 0 2 5 5 cm 0 0 1 rg 3 w \
          q 1 0 0 1 50 50 cm 1 0 0 rg 9 w 0 0 1 1 re f Q \
          0 0 1 1 re f",
    );

    assert_eq!(state.ctm, Matrix::new(2.0, 0.0, 0.0, 2.0, 5.0, 5.0));
    assert_eq!(state.fill, Color::rgb(0.0, 0.0, 1.0));
    assert_eq!(state.stroke_style.width, 3.0);

    let colors: Vec<Color> = fills(&program).into_iter().map(|(_, color, _)| color).collect();
    assert_eq!(colors, vec![Color::rgb(1.0, 0.0, 0.0), Color::rgb(0.0, 0.0, 1.0)]);
}

#[test]
fn test_ext_gstate_parameters() {
    let data = page_pdf(
        "<< /ExtGState << /GS1 << /CA 0.5 /ca 0.25 /LW 3 >> >> >>",
        b"/GS1 gs 0 0 10 10 re B",
        |_| {},
    );
    let program = interpret(data);

    match &program.commands[0] {
        ShapeCommand::FillStroke {
            style,
            fill_alpha,
            stroke_alpha,
            ..
        } => {
            assert_eq!(style.width, 3.0);
            assert_eq!(*fill_alpha, 0.25);
            assert_eq!(*stroke_alpha, 0.5);
        },
        other => panic!("expected fill+stroke, got {:?}", other),
    }
}

#[test]
fn test_shading_command() {
    let data = page_pdf(
        "<< /Shading << /Sh1 << /ShadingType 2 /ColorSpace /DeviceRGB /Coords [0 0 100 0] >> >> >>",
        b"2 0 0 2 0 0 cm /Sh1 sh",
        |_| {},
    );
    let program = interpret(data);

    let shading = program.commands.iter().find_map(|c| match c {
        ShapeCommand::Shading { name, shading, matrix, .. } => Some((name.clone(), shading.clone(), *matrix)),
        _ => None,
    });
    let (name, shading, matrix) = shading.unwrap();
    assert_eq!(name, "Sh1");
    assert_eq!(shading.get("ShadingType").and_then(Object::as_integer), Some(2));
    assert_eq!(matrix, Matrix::scaling(2.0, 2.0));
}

#[test]
fn test_unknown_resources_are_skipped() {
    let program = interpret(page_pdf("<< >>", b"/Missing Do /Nope gs /None sh 0 0 1 1 re f", |_| {}));
    assert_eq!(fills(&program).len(), 1);
}

#[test]
fn test_content_split_across_streams() {
    init_logging();
    let mut pdf = PdfBuilder::new("1.4");
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    pdf.object(3, "<< /Type /Page /Parent 2 0 R /Contents [4 0 R 5 0 R] >>");
    pdf.stream(4, "", b"0 0 10 10 re");
    pdf.stream(5, "", b"f");
    pdf.xref_table("/Size 6 /Root 1 0 R");

    let doc = PdfDocument::from_bytes(pdf.finish()).unwrap();
    let page = doc.page(0).unwrap();
    let content = doc.page_content(page).unwrap();
    assert_eq!(content.content, b"0 0 10 10 re\nf");
    // No /MediaBox anywhere: letter width, height from the fallback ratio.
    assert_eq!(content.media_box.width, 612.0);
    assert!((content.media_box.height - 792.0).abs() < 0.01);

    let program = doc.interpret_page(page).unwrap();
    assert_eq!(fills(&program).len(), 1);
}

#[test]
fn test_resources_inherited_from_page_tree() {
    init_logging();
    let mut pdf = PdfBuilder::new("1.4");
    pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(
        2,
        "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 200 300] /Resources << /ExtGState << /G << /ca 0.75 >> >> >> >>",
    );
    pdf.object(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>");
    pdf.stream(4, "", b"/G gs 0 0 1 1 re f");
    pdf.xref_table("/Size 5 /Root 1 0 R");

    let doc = PdfDocument::from_bytes(pdf.finish()).unwrap();
    let page = doc.page(0).unwrap();
    assert_eq!(doc.page_content(page).unwrap().media_box, Rect::new(0.0, 0.0, 200.0, 300.0));
    let program = doc.interpret_page(page).unwrap();
    assert_eq!(fills(&program)[0].2, 0.75);
}

// ============================================================================
// Cancellation and limits
// ============================================================================

/// Font loader that trips a cancellation token when asked for a font.
#[derive(Debug)]
struct CancellingLoader(CancellationToken);

impl FontLoader for CancellingLoader {
    fn load(&self, _store: &ObjectStore, _font: &Object) -> Result<Arc<dyn FontMetrics>> {
        self.0.cancel();
        Ok(Arc::new(DictionaryFont::fallback()))
    }
}

const CANCEL_CONTENT: &[u8] = b"0 0 10 10 re f BT /F1 12 Tf (x) Tj ET 5 5 5 5 re f";

#[test]
fn test_cancellation_returns_partial_program() {
    init_logging();
    let doc = PdfDocument::from_bytes(common::single_page_pdf(CANCEL_CONTENT)).unwrap();
    let page = doc.page_content(doc.page(0).unwrap()).unwrap();
    let token = CancellationToken::new();
    let interpreter = ContentInterpreter::new(doc.store(), InterpreterConfig::default())
        .with_font_loader(Arc::new(CancellingLoader(token.clone())))
        .with_cancellation(token.clone());

    match interpreter.parse(&page.content, &page.resources) {
        Err(Error::Interrupted(partial)) => {
            assert!(!partial.is_complete());
            assert_eq!(fills(&partial).len(), 1);
            assert!(partial.text.is_empty());
        },
        other => panic!("expected interruption, got {:?}", other),
    }

    // A fresh run with the flag cleared completes; the loader trips it
    // again, so give this run its own token.
    token.reset();
    let program = ContentInterpreter::new(doc.store(), InterpreterConfig::default())
        .with_cancellation(token)
        .parse(&page.content, &page.resources)
        .unwrap();
    assert!(program.is_complete());
    assert_eq!(fills(&program).len(), 2);
    assert_eq!(program.text.text(), "x");
}

#[test]
fn test_cancelled_token_stops_before_first_operator() {
    init_logging();
    let doc = PdfDocument::from_bytes(common::single_page_pdf(CANCEL_CONTENT)).unwrap();
    let token = CancellationToken::new();
    token.cancel();

    match doc.interpret_page_cancellable(doc.page(0).unwrap(), token.clone()) {
        Err(Error::Interrupted(partial)) => assert!(partial.commands.is_empty()),
        other => panic!("expected interruption, got {:?}", other),
    }
    assert!(token.checks() >= 1);
}

#[test]
fn test_cancellation_inside_form_interrupts_page() {
    init_logging();
    let data = page_pdf(
        "<< /XObject << /Fm1 5 0 R >> /Font << /F1 6 0 R >> >>",
        b"0 0 1 1 re f /Fm1 Do 0 0 3 3 re f",
        |pdf| {
            pdf.stream(5, "/Subtype /Form /BBox [0 0 100 100]", b"0 0 2 2 re f BT /F1 1 Tf ET 9 9 9 9 re f");
            pdf.object(6, &common::helvetica_dict());
        },
    );
    let doc = PdfDocument::from_bytes(data).unwrap();
    let page = doc.page_content(doc.page(0).unwrap()).unwrap();
    let token = CancellationToken::new();
    let interpreter = ContentInterpreter::new(doc.store(), InterpreterConfig::default())
        .with_font_loader(Arc::new(CancellingLoader(token.clone())))
        .with_cancellation(token);

    match interpreter.parse(&page.content, &page.resources) {
        Err(Error::Interrupted(partial)) => {
            let sizes: Vec<f32> = fills(&partial).iter().map(|(r, _, _)| r.width).collect();
            assert_eq!(sizes, vec![1.0, 2.0]);
            assert_eq!(partial.commands.last(), Some(&ShapeCommand::Restore));
        },
        other => panic!("expected interruption, got {:?}", other),
    }
}

#[test]
fn test_max_operations_limit() {
    init_logging();
    let data = common::single_page_pdf(b"0 0 1 1 re f 0 0 2 2 re f 0 0 3 3 re f");
    let config = InterpreterConfig::default().with_max_operations(4);
    let doc = PdfDocument::from_source(ByteSource::from_bytes(data), ParserOptions::default(), config).unwrap();
    let program = doc.interpret_page(doc.page(0).unwrap()).unwrap();
    assert_eq!(fills(&program).len(), 2);
    assert!(program.is_complete());
}

#[test]
fn test_text_only_skips_painting() {
    init_logging();
    let doc = PdfDocument::from_bytes(common::single_page_pdf(
        b"1 0 0 rg 0 0 100 100 re f BT /F1 12 Tf 10 10 Td (Words) Tj ET",
    ))
    .unwrap();
    let page = doc.page_content(doc.page(0).unwrap()).unwrap();
    let program = doc.interpreter().parse_text_only(&page.content, &page.resources).unwrap();

    assert!(program.commands.is_empty());
    assert_eq!(program.text.text(), "Words");
}

// ============================================================================
// Robustness
// ============================================================================

mod arbitrary_content {
    use super::*;
    use pdf_engine::content::Resources;
    use proptest::prelude::*;

    const TOKENS: &[&str] = &[
        "q", "Q", "0", "1", "-2.5", "10", "re", "m", "l", "c", "h", "f", "S", "W", "n", "cm", "BT", "ET", "Tj",
        "TJ", "Td", "Tf", "/F1", "(s)", "<41>", "[", "]", "<<", ">>", "BI", "ID", "EI", "Do", "/X", "gs", "sh",
    ];

    proptest! {
        #[test]
        fn prop_arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let store = ObjectStore::in_memory(ParserOptions::default());
            let interpreter = ContentInterpreter::new(&store, InterpreterConfig::default());
            let program = interpreter.parse(&data, &Resources::empty(&store)).unwrap();
            prop_assert!(program.is_complete());
        }

        #[test]
        fn prop_operator_soup_never_panics(picks in proptest::collection::vec(0..TOKENS.len(), 0..200)) {
            let content = picks.iter().map(|&i| TOKENS[i]).collect::<Vec<_>>().join(" ");
            let store = ObjectStore::in_memory(ParserOptions::default());
            let interpreter = ContentInterpreter::new(&store, InterpreterConfig::default());
            let resources = Resources::empty(&store);
            prop_assert!(interpreter.parse(content.as_bytes(), &resources).is_ok());
            prop_assert!(interpreter.parse_text_only(content.as_bytes(), &resources).is_ok());
        }
    }
}
