use man::prelude::*;
use std::path::Path;

fn main() {
    let page = Manual::new("batworks")
        .about("cat(1) for Microsoft Works word-processor files, rendered to markdown with bat")
        .author(Author::new("Damon Petta").email("d@disassemble.net"))
        .flag(
            Flag::new()
                .short("-p")
                .long("--plain")
                .help("Force plain text output (no colors, no decorations)."),
        )
        .flag(
            Flag::new()
                .short("-m")
                .long("--markdown")
                .help("Output as markdown (default when terminal detected)."),
        )
        .flag(
            Flag::new()
                .short("-h")
                .long("--help")
                .help("Show help information."),
        )
        .arg(Arg::new("[FILE...]"))
        .custom(
            Section::new("description")
                .paragraph(
                    "batworks reads Microsoft Works word-processor documents \
                     (.wps) and dumps their text to the terminal as markdown.",
                )
                .paragraph(
                    "Format is detected by file signature, not file extension. \
                     Supported formats: Works 2 (raw DOS files), Works 3 and 4 \
                     (MN0 stream in an OLE compound file) and Works 5, 7 and 8 \
                     (CONTENTS stream in an OLE compound file).",
                )
                .paragraph(
                    "In markdown, bold, italic and struck-through text keep their \
                     styling, numbered and bulleted paragraphs become list items, \
                     footnote references become [^n] markers and page number, \
                     date and time fields become {PAGE}, {DATE} and {TIME}.",
                )
                .paragraph(
                    "When stdout is a terminal, output is pretty-printed as \
                     syntax-highlighted markdown via bat(1) with paging. When \
                     piped, plain text is emitted.",
                )
                .paragraph(
                    "Multiple files can be specified and will be processed in \
                     order. Use \\fB-\\fR to read from stdin explicitly. Maximum \
                     input size is 256 MiB. A corrupt document produces an error \
                     and no partial output.",
                ),
        )
        .example(
            Example::new()
                .text("View a Works document in the terminal")
                .command("batworks letter.wps"),
        )
        .example(
            Example::new()
                .text("Extract plain text")
                .command("batworks --plain letter.wps > letter.txt"),
        )
        .example(
            Example::new()
                .text("Trace how a document is decoded")
                .command("RUST_LOG=debug batworks --plain report.wps"),
        )
        .custom(
            Section::new("environment")
                .paragraph(
                    "batworks respects the \\fBNO_COLOR\\fR environment variable. \
                     When set, colored output is suppressed even on a terminal.",
                )
                .paragraph(
                    "The \\fBPAGER\\fR environment variable controls which pager \
                     is used when output is displayed on a terminal. \
                     \\fBBAT_THEME\\fR selects the highlighting theme.",
                )
                .paragraph(
                    "\\fBRUST_LOG\\fR sets the log level (warn, debug) for \
                     decoding diagnostics written to stderr.",
                ),
        )
        .custom(Section::new("see also").paragraph("bat(1), batdoc(1), catdoc(1)"))
        .render();

    // Write to OUT_DIR (standard cargo output directory)
    let out_dir = std::env::var("OUT_DIR").unwrap();
    let out_path = Path::new(&out_dir).join("batworks.1");
    std::fs::write(&out_path, &page).unwrap();

    // Also write to target/man/ so packaging scripts have a stable path
    // that doesn't depend on the hash-based OUT_DIR.
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let man_dir = Path::new(&manifest_dir).join("target").join("man");
    std::fs::create_dir_all(&man_dir).unwrap();
    std::fs::write(man_dir.join("batworks.1"), &page).unwrap();

    println!("cargo::rerun-if-changed=build.rs");
}
