//! snapforge – command-line export of an HTML screen to a paginated PDF.
//!
//! Usage:
//!   snapforge <input.html> [out_dir] [--title T] [--anchor ID] [--width N]
//!             [--scale S] [--font path.ttf] [--options opts.json] [--plan]
//!   snapforge --demo [out_dir]
//!
//! The PDF is written to `out_dir` (default: next to the input file) as
//! `<title>.pdf`; the title defaults to the input filename stem.

use std::{env, fs, path::PathBuf, process, sync::Arc};

use snapshot_forge::content::{ContentRef, LiveContent, Theme};
use snapshot_forge::fonts::FontManager;
use snapshot_forge::images::StandardImageLoader;
use snapshot_forge::pipeline::{ExportOptions, ExportOutcome, Exporter};
use snapshot_forge::save::{DirectorySaveTarget, SaveTarget};
use snapshot_forge::templates;

#[derive(Default)]
struct Args {
    input: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    title: Option<String>,
    anchor: Option<String>,
    width: Option<u32>,
    scale: Option<f32>,
    font: Option<PathBuf>,
    options: Option<PathBuf>,
    plan: bool,
    demo: bool,
}

fn main() {
    env_logger::init();

    let argv: Vec<String> = env::args().collect();
    let prog = argv.first().map(String::as_str).unwrap_or("snapforge");
    let args = parse_args(prog, &argv);

    let options = load_options(&args);
    let exporter = build_exporter(&args);

    if args.demo {
        let out_dir = args.out_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        run_demo(&exporter, &options, &out_dir, args.plan);
        return;
    }

    let input = match args.input {
        Some(ref p) => p.clone(),
        None => {
            eprintln!("Error: no input file specified.");
            print_usage(prog);
            process::exit(1);
        }
    };

    let html = match fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", input.display());
            process::exit(1);
        }
    };

    let title = args.title.clone().unwrap_or_else(|| {
        input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("export")
            .to_string()
    });
    let out_dir = args.out_dir.clone().unwrap_or_else(|| {
        input
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    });

    let doc = LiveContent::from_html(&html, Theme::default());
    let content = match &args.anchor {
        Some(id) => ContentRef::anchored(&doc, id.clone()),
        None => ContentRef::new(&doc),
    };

    match exporter.export_generic(&content, &title, &options) {
        Ok(outcome) => save_outcome(&outcome, &out_dir, args.plan),
        Err(e) => {
            log::error!("Export of '{}' failed: {e}", input.display());
            eprintln!("{}", e.user_message());
            process::exit(1);
        }
    }
}

fn parse_args(prog: &str, argv: &[String]) -> Args {
    let mut args = Args::default();
    let mut positional = 0usize;

    let mut iter = argv.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--title" | "-t" => args.title = Some(flag_value(prog, arg, iter.next())),
            "--anchor" | "-a" => args.anchor = Some(flag_value(prog, arg, iter.next())),
            "--width" | "-w" => args.width = Some(parse_number(prog, arg, iter.next())),
            "--scale" | "-s" => args.scale = Some(parse_number(prog, arg, iter.next())),
            "--font" => args.font = Some(PathBuf::from(flag_value(prog, arg, iter.next()))),
            "--options" | "-o" => {
                args.options = Some(PathBuf::from(flag_value(prog, arg, iter.next())))
            }
            "--plan" => args.plan = true,
            "--demo" => args.demo = true,
            "--help" | "-h" => {
                print_usage(prog);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(prog);
                process::exit(1);
            }
            path => {
                // With --demo the only positional is the output directory.
                let slot = if args.demo { positional + 1 } else { positional };
                match slot {
                    0 => args.input = Some(PathBuf::from(path)),
                    1 => args.out_dir = Some(PathBuf::from(path)),
                    _ => {
                        eprintln!("Unexpected argument: {path}");
                        print_usage(prog);
                        process::exit(1);
                    }
                }
                positional += 1;
            }
        }
    }
    args
}

fn flag_value(prog: &str, flag: &str, value: Option<&String>) -> String {
    match value {
        Some(v) => v.clone(),
        None => {
            eprintln!("Missing value for {flag}");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn parse_number<T: std::str::FromStr>(prog: &str, flag: &str, value: Option<&String>) -> T {
    let raw = flag_value(prog, flag, value);
    match raw.parse() {
        Ok(v) => v,
        Err(_) => {
            eprintln!("Invalid number for {flag}: {raw}");
            process::exit(1);
        }
    }
}

/// Options file first, then flag overrides.
fn load_options(args: &Args) -> ExportOptions {
    let mut options = match &args.options {
        Some(path) => {
            let parsed = fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|json| ExportOptions::from_json(&json).map_err(|e| e.to_string()));
            match parsed {
                Ok(o) => o,
                Err(e) => {
                    eprintln!("Error loading options '{}': {e}", path.display());
                    process::exit(1);
                }
            }
        }
        None => ExportOptions::default(),
    };
    if let Some(width) = args.width {
        options.surface_width = width;
    }
    if let Some(scale) = args.scale {
        options.scale = scale;
    }
    if let Err(e) = options.validate() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
    options
}

fn build_exporter(args: &Args) -> Exporter {
    let fonts = match &args.font {
        Some(path) => {
            let mut fonts = FontManager::new();
            if let Err(e) = fonts.load_font_file("Helvetica", false, false, path) {
                eprintln!("Error loading font '{}': {e}", path.display());
                process::exit(1);
            }
            fonts
        }
        None => FontManager::with_system_font(),
    };
    let loader = match args.input.as_ref().and_then(|p| p.parent()) {
        Some(dir) if !dir.as_os_str().is_empty() => StandardImageLoader::with_base_dir(dir),
        _ => StandardImageLoader::new(),
    };
    Exporter::new()
        .with_fonts(fonts)
        .with_image_loader(Arc::new(loader))
}

fn run_demo(exporter: &Exporter, options: &ExportOptions, out_dir: &std::path::Path, plan: bool) {
    let long = templates::long_report(40);
    let samples = [
        ("Quarterly Report", templates::report_template(), Some("report")),
        ("Invoice 2024-001", templates::invoice_template(), Some("invoice")),
        ("Operations Log", long.as_str(), None),
    ];
    for (title, html, anchor) in samples {
        let doc = LiveContent::from_html(html, templates::dark_theme());
        let content = match anchor {
            Some(id) => ContentRef::anchored(&doc, id),
            None => ContentRef::new(&doc),
        };
        match exporter.export_generic(&content, title, options) {
            Ok(outcome) => save_outcome(&outcome, out_dir, plan),
            Err(e) => {
                log::error!("Demo export '{title}' failed: {e}");
                eprintln!("{}", e.user_message());
                process::exit(1);
            }
        }
    }
}

fn save_outcome(outcome: &ExportOutcome, out_dir: &std::path::Path, plan: bool) {
    for w in &outcome.warnings {
        log::warn!("{w}");
    }
    if plan {
        println!("{}", outcome.plan.to_json());
    }
    match DirectorySaveTarget::new(out_dir).save(&outcome.file) {
        Ok(path) => {
            let pages = outcome.plan.page_count();
            eprintln!(
                "Wrote '{}' ({} bytes, {} page{})",
                path.display(),
                outcome.file.bytes.len(),
                pages,
                if pages == 1 { "" } else { "s" }
            );
        }
        Err(e) => {
            log::error!("Saving '{}' failed: {e}", outcome.file.filename);
            eprintln!("{}", e.user_message());
            process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    eprintln!("snapforge – export an HTML screen to a paginated PDF");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <input.html> [out_dir] [flags]");
    eprintln!("  {prog} --demo [out_dir]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <input.html>   HTML file to export (data-URI and local images only)");
    eprintln!("  [out_dir]      Output directory (default: the input file's directory)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --title, -t    Document title and file name (default: input filename stem)");
    eprintln!("  --anchor, -a   Export only the element with this id");
    eprintln!("  --width, -w    Surface width in CSS px, 800-1200 (default: 1000)");
    eprintln!("  --scale, -s    Device scale, (0, 4] (default: 1.5)");
    eprintln!("  --font         TTF/OTF file used for all text");
    eprintln!("  --options, -o  JSON file with export options; flags override it");
    eprintln!("  --plan         Print the page plan as JSON to stdout");
    eprintln!("  --demo         Export the built-in sample screens");
    eprintln!("  --help         Print this message");
}
