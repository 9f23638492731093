//! `batworks`: bat for Microsoft Works word-processor files.
//!
//! Reads Works 2 through Works 8 `.wps` documents and dumps their text to
//! stdout. When stdout is a terminal the output is pretty-printed as
//! syntax-highlighted markdown via `bat`; when piped, plain text is emitted.

#![allow(clippy::redundant_pub_crate)]

mod markup;
mod render;

use batworks::WorksError;

use bat::{Input, PrettyPrinter};
use is_terminal::IsTerminal;
use log::debug;
use std::io::{self, Read, Write};
use std::process;

use render::Renderer;

const USAGE: &str = "\
batworks - bat for Microsoft Works word-processor files

Usage: batworks [OPTIONS] [FILE...]
       cat FILE | batworks [OPTIONS]
       batworks [OPTIONS] -

Options:
  -p, --plain       Force plain text output (no colors, no decorations)
  -m, --markdown    Output as markdown (default when terminal detected)
  -h, --help        Show this help

When stdout is a terminal, output is pretty-printed as syntax-highlighted
markdown with decorations. When piped, output is plain text.

Multiple files can be specified and will be processed in order.
Use - to read from stdin explicitly.

Supports Works 2 (raw), Works 3/4 and Works 5/7/8 (compound file) documents.
Format is detected by file signature, not extension.
Set RUST_LOG=debug to trace decoding.";

/// Maximum input file size (256 MiB). Prevents accidental OOM from
/// huge files.
const MAX_INPUT_SIZE: usize = 256 * 1024 * 1024;

/// Output mode selection.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    /// Detect automatically: markdown to terminal, plain text when piped.
    Auto,
    /// Force plain text output.
    Plain,
    /// Force markdown output.
    Markdown,
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut mode = Mode::Auto;
    let mut files: Vec<String> = Vec::new();

    for arg in &args {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{USAGE}");
                return;
            }
            "-p" | "--plain" => mode = Mode::Plain,
            "-m" | "--markdown" => mode = Mode::Markdown,
            "-" => files.push("-".to_string()),
            s if s.starts_with('-') => {
                eprintln!("batworks: unknown option: {s}");
                eprintln!("{USAGE}");
                process::exit(1);
            }
            _ => files.push(arg.clone()),
        }
    }

    // No files specified → read from stdin
    if files.is_empty() {
        files.push("-".to_string());
    }

    let mut exit_code = 0;
    for (i, path) in files.iter().enumerate() {
        let (buf, filename) = if path == "-" {
            let mut buf = Vec::new();
            if let Err(e) = io::stdin().read_to_end(&mut buf) {
                eprintln!("batworks: stdin: {e}");
                exit_code = 1;
                continue;
            }
            (buf, "stdin".to_string())
        } else {
            match std::fs::read(path) {
                Ok(b) => (b, path.clone()),
                Err(e) => {
                    eprintln!("batworks: {path}: {e}");
                    exit_code = 1;
                    continue;
                }
            }
        };

        if buf.len() > MAX_INPUT_SIZE {
            #[allow(clippy::cast_precision_loss)] // only used in error message
            let size_mib = buf.len() as f64 / (1024.0 * 1024.0);
            eprintln!(
                "batworks: {filename}: too large ({size_mib:.1} MiB, max {} MiB)",
                MAX_INPUT_SIZE / (1024 * 1024),
            );
            exit_code = 1;
            continue;
        }

        let multiple = files.len() > 1;

        if let Err(e) = run(&buf, &filename, mode, multiple && i > 0) {
            eprintln!("batworks: {filename}: {e} ({:?})", e.status());
            exit_code = 1;
        }
    }

    if exit_code != 0 {
        process::exit(exit_code);
    }
}

fn run(data: &[u8], filename: &str, mode: Mode, needs_separator: bool) -> batworks::Result<()> {
    let detection = batworks::detect(data);
    let Some(format) = detection.format else {
        return Err(WorksError::Unsupported(
            "not a Works word-processor document".into(),
        ));
    };
    debug!("{filename}: {format} ({:?})", detection.confidence);

    let is_tty = io::stdout().is_terminal();

    if needs_separator && !is_tty {
        io::stdout().write_all(b"\n")?;
    }

    match mode {
        Mode::Plain => {
            let text = extract(data, false)?;
            io::stdout().write_all(text.as_bytes())?;
        }
        Mode::Markdown => {
            let md = extract(data, true)?;
            if is_tty {
                pretty_print(&md, filename)?;
            } else {
                io::stdout().write_all(md.as_bytes())?;
            }
        }
        Mode::Auto => {
            if is_tty {
                let md = extract(data, true)?;
                pretty_print(&md, filename)?;
            } else {
                let text = extract(data, false)?;
                io::stdout().write_all(text.as_bytes())?;
            }
        }
    }

    Ok(())
}

/// Decode `data` and render it as markdown or plain text.
fn extract(data: &[u8], markdown: bool) -> batworks::Result<String> {
    let mut renderer = Renderer::new(markdown);
    batworks::parse(data, &mut renderer)?;
    Ok(renderer.finish())
}

fn pretty_print(content: &str, filename: &str) -> batworks::Result<()> {
    let input = Input::from_bytes(content.as_bytes())
        .name(filename)
        .title(filename);

    let theme = std::env::var("BAT_THEME").unwrap_or_else(|_| "ansi".to_string());
    let colored = std::env::var_os("NO_COLOR").is_none();

    PrettyPrinter::new()
        .input(input)
        .language("Markdown")
        .theme(&theme)
        .header(true)
        .line_numbers(false)
        .grid(true)
        .colored_output(colored)
        .true_color(true)
        .paging_mode(bat::PagingMode::QuitIfOneScreen)
        .print()
        .map_err(|e| WorksError::Render(e.to_string()))?;

    Ok(())
}
