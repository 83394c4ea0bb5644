//! Inspect one page of a PDF
//!
//! Opens a PDF, interprets a page and prints a summary of the paint
//! program and the extracted text.
//!
//! Usage:
//!   cargo run --release --bin inspect_page -- file.pdf
//!   cargo run --release --bin inspect_page -- file.pdf --page 3 --text-only
//!   RUST_LOG=debug cargo run --bin inspect_page -- file.pdf --no-images

use pdf_engine::content::ShapeCommand;
use pdf_engine::{InterpreterConfig, ParserOptions, PdfDocument};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

struct InspectConfig {
    path: PathBuf,
    page: usize,
    text_only: bool,
    decode_images: bool,
    strict: bool,
}

impl InspectConfig {
    fn from_args() -> Option<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut path = None;
        let mut page = 0;
        let mut text_only = false;
        let mut decode_images = true;
        let mut strict = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--page" | "-p" => {
                    i += 1;
                    page = args.get(i)?.parse().ok()?;
                },
                "--text-only" => text_only = true,
                "--no-images" => decode_images = false,
                "--strict" => strict = true,
                other if path.is_none() => path = Some(PathBuf::from(other)),
                other => eprintln!("Ignoring argument {}", other),
            }
            i += 1;
        }

        Some(Self {
            path: path?,
            page,
            text_only,
            decode_images,
            strict,
        })
    }
}

fn command_kind(command: &ShapeCommand) -> &'static str {
    match command {
        ShapeCommand::Save => "save",
        ShapeCommand::Restore => "restore",
        ShapeCommand::Transform(_) => "transform",
        ShapeCommand::Clip { .. } => "clip",
        ShapeCommand::Fill { .. } => "fill",
        ShapeCommand::Stroke { .. } => "stroke",
        ShapeCommand::FillStroke { .. } => "fill+stroke",
        ShapeCommand::Image(_) => "image",
        ShapeCommand::Text(_) => "text",
        ShapeCommand::Shading { .. } => "shading",
    }
}

fn run(config: &InspectConfig) -> pdf_engine::Result<()> {
    let options = if config.strict {
        ParserOptions::strict()
    } else {
        ParserOptions::lenient()
    };
    let interpreter_config = InterpreterConfig::default().with_decode_images(config.decode_images);

    let start = Instant::now();
    let source = pdf_engine::source::ByteSource::open(&config.path)?;
    let doc = PdfDocument::from_source(source, options, interpreter_config)?;
    let pages = doc.page_refs()?;
    let (major, minor) = doc.version();
    println!("{}: PDF {}.{}, {} pages", config.path.display(), major, minor, pages.len());

    let page = doc.page(config.page)?;
    let content = doc.page_content(page)?;
    println!(
        "Page {} ({}): media box {:?}, {} content bytes",
        config.page,
        page,
        content.media_box,
        content.content.len()
    );

    let interpreter = doc.interpreter();
    let program = if config.text_only {
        interpreter.parse_text_only(&content.content, &content.resources)?
    } else {
        interpreter.parse(&content.content, &content.resources)?
    };
    let elapsed = start.elapsed();

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for command in &program.commands {
        *counts.entry(command_kind(command)).or_default() += 1;
    }
    println!("{} paint commands in {:.2?}", program.len(), elapsed);
    for (kind, count) in &counts {
        println!("  {:<12} {}", kind, count);
    }
    for image in program.images() {
        println!(
            "  image {} {}x{} decoded={}",
            image.name.as_deref().unwrap_or("(inline)"),
            image.width,
            image.height,
            image.decoded.is_some()
        );
    }

    println!(
        "{} lines, {} glyphs of text:",
        program.text.lines().len(),
        program.text.glyph_count()
    );
    println!("{}", program.text.text());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let Some(config) = InspectConfig::from_args() else {
        eprintln!("Usage: inspect_page <file.pdf> [--page N] [--text-only] [--no-images] [--strict]");
        return ExitCode::from(2);
    };

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
