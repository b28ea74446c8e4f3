use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use png2webp::config::{self, OutputLayout, OverwritePolicy};
use png2webp::metadata::{self, ExtraLayout, PromptMetadata};
use png2webp::pipeline::{self, BatchSummary, ConversionResult, ConversionStatus};

#[derive(Parser, Debug)]
#[command(
    name = "png2webp",
    version,
    about = "Convert ComfyUI PNG renders to WEBP, keeping the prompt and workflow metadata"
)]
struct Cli {
    /// PNG files or directories to convert
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Encode losslessly
    #[arg(long)]
    lossless: bool,

    /// Lossy quality, 0-100
    #[arg(short, long, value_name = "N")]
    quality: Option<f32>,

    /// Encoder effort, 0 (fast) to 6 (smallest output)
    #[arg(long, value_name = "N")]
    method: Option<u8>,

    /// What to do when the .webp already exists
    #[arg(long = "on-existing", value_enum, value_name = "POLICY")]
    on_existing: Option<OverwritePolicy>,

    /// Skip files whose .webp already exists (same as --on-existing skip)
    #[arg(long = "no-overwrite", conflicts_with = "on_existing")]
    no_overwrite: bool,

    /// Only convert direct children of directory arguments
    #[arg(long = "no-recursive")]
    no_recursive: bool,

    /// Write to <input>/webp/<YYYY_MM_DD>/ instead of next to the source
    #[arg(long = "dated-output")]
    dated_output: bool,

    /// Store each extra_pnginfo member in its own EXIF entry
    #[arg(long = "expand-extra")]
    expand_extra: bool,

    /// Preview conversions without writing files
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Display the prompt metadata of PNG/WEBP files and exit
    #[arg(long = "show-metadata")]
    show_metadata: bool,

    /// Wait for Enter before exiting
    #[arg(long)]
    pause: bool,

    /// Verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show warnings and errors
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let code = run(&cli);

    if cli.pause {
        pause();
    }

    code
}

fn run(cli: &Cli) -> Result<ExitCode> {
    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(ExitCode::SUCCESS);
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }
    if !cli.paths.iter().any(|p| p.exists()) {
        anyhow::bail!("None of the specified paths exist.");
    }

    // Handle --show-metadata
    if cli.show_metadata {
        let walker = pipeline::FileWalker::new(
            &cli.paths,
            !cli.no_recursive,
            pipeline::METADATA_EXTENSIONS,
        );
        let files: Vec<_> = pipeline::collect_files(&walker)
            .into_iter()
            .filter_map(|item| match item {
                Ok(file) => Some(file),
                Err(e) => {
                    log::error!("{e}");
                    None
                }
            })
            .collect();
        if files.is_empty() {
            anyhow::bail!("No PNG or WEBP files found in the specified paths.");
        }
        for file in &files {
            if let Err(e) = print_metadata(&file.path) {
                log::error!("Failed to read {}: {e}", file.path.display());
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    // Load config, then apply CLI overrides
    let mut config = config::Config::load(cli.config.as_deref())?;
    apply_overrides(&mut config, cli);
    config.validate()?;

    // Collect PNGs
    let items = pipeline::collect_pngs(&cli.paths, config.output.recursive);
    if items.is_empty() {
        log::info!("No PNG files found in the specified paths.");
        return Ok(ExitCode::SUCCESS);
    }

    log::info!("Found {} file(s) to convert", items.len());
    if config.output.dry_run {
        log::info!("DRY RUN: no files will be written");
    }
    let encoding = &config.encoding;
    if encoding.lossless {
        log::debug!("Encoding: lossless, method {}", encoding.method);
    } else {
        log::debug!("Encoding: quality {}, method {}", encoding.quality, encoding.method);
    }

    let results = pipeline::convert_batch(items, &config, |p| {
        let r = p.result;
        log::info!("{}", progress_line(&p));
        match r.status {
            ConversionStatus::Success => {
                if let Some(ref dest) = r.destination {
                    log::info!("  -> {}", dest.display());
                }
                if r.metadata_keys.is_empty() {
                    log::info!("  No prompt metadata");
                } else {
                    let keys: Vec<_> = r.metadata_keys.iter().map(|k| k.as_str()).collect();
                    log::info!("  Metadata: {}", keys.join(", "));
                }
            }
            ConversionStatus::Skipped => log::info!("  Skipped: destination exists"),
            ConversionStatus::Failed => {
                if let Some(ref err) = r.error {
                    log::error!("  Error: {err}");
                }
            }
        }
    });

    // JSON output
    if cli.json {
        let json_results: Vec<serde_json::Value> = results.iter().map(result_json).collect();
        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    // Summary
    let summary = BatchSummary::from_results(&results);
    log::info!(
        "Done: {} converted, {} failed, {} skipped out of {} files",
        summary.succeeded,
        summary.failed,
        summary.skipped,
        summary.total
    );
    if summary.has_failures() {
        log::error!("Failed:");
        for r in results.iter().filter(|r| r.status == ConversionStatus::Failed) {
            if let Some(ref err) = r.error {
                log::error!("  {}: {err}", r.source.display());
            }
        }
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

/// `[i/N] Processed: <path>`, logged once the file is done.
fn progress_line(p: &pipeline::Progress<'_>) -> String {
    format!("[{}/{}] Processed: {}", p.index, p.total, p.result.source.display())
}

fn apply_overrides(config: &mut config::Config, cli: &Cli) {
    if cli.lossless {
        config.encoding.lossless = true;
    }
    if let Some(quality) = cli.quality {
        config.encoding.quality = quality;
    }
    if let Some(method) = cli.method {
        config.encoding.method = method;
    }
    if let Some(policy) = cli.on_existing {
        config.output.on_existing = policy;
    }
    if cli.no_overwrite {
        config.output.on_existing = OverwritePolicy::Skip;
    }
    if cli.no_recursive {
        config.output.recursive = false;
    }
    if cli.dated_output {
        config.output.layout = OutputLayout::Dated;
    }
    if cli.expand_extra {
        config.metadata.extra_layout = ExtraLayout::Expand;
    }
    if cli.dry_run {
        config.output.dry_run = true;
    }
}

fn result_json(r: &ConversionResult) -> serde_json::Value {
    serde_json::json!({
        "source": r.source.display().to_string(),
        "destination": r.destination.as_ref().map(|p| p.display().to_string()),
        "status": r.status.as_str(),
        "error_kind": r.error.as_ref().map(|e| e.kind()),
        "error": r.error.as_ref().map(|e| e.to_string()),
        "metadata_keys": r.metadata_keys,
    })
}

fn pause() {
    use std::io::Write;

    print!("Press Enter to exit...");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}

// ANSI color codes
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 56;
/// Indent for continuation lines (key column width + " : " = 17 chars + 2 leading spaces).
const INDENT: &str = "                   ";

/// Print the recognized metadata of a PNG or WEBP file.
fn print_metadata(path: &Path) -> Result<()> {
    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(76));

    let is_webp = pipeline::has_extension(path, &["webp"]);
    let (meta, other) = if is_webp {
        let data = metadata::read_webp_metadata(path)?;
        (data.metadata, data.other)
    } else {
        (metadata::read_png_metadata(path)?, Vec::new())
    };

    print_section("Prompt Metadata", &meta);

    if !other.is_empty() {
        println!("  {BOLD}Other EXIF Entries{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(74));
        for (key, val) in &other {
            print_row(key, val);
        }
        println!();
    }

    if meta.is_empty() && other.is_empty() {
        println!("  {DIM}(no prompt metadata found){RESET}");
        println!();
    }

    Ok(())
}

fn print_section(title: &str, meta: &PromptMetadata) {
    if meta.is_empty() {
        return;
    }
    println!("  {BOLD}{title}{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(74));
    for (key, val) in meta.iter() {
        print_row(key.as_str(), val);
    }
    println!();
}

/// Print a single row in the metadata table.
fn print_row(key: &str, val: &str) {
    let key_col = format!("{:<14}", key);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {key_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
///
/// Single words longer than the width (minified JSON, mostly) are hard-split.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        for piece in split_long(word, max_width) {
            if current_line.is_empty() {
                current_line = piece.to_string();
            } else if current_line.chars().count() + 1 + piece.chars().count() <= max_width {
                current_line.push(' ');
                current_line.push_str(piece);
            } else {
                lines.push(current_line);
                current_line = piece.to_string();
            }
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}

fn split_long(word: &str, max_width: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = word;
    while rest.chars().count() > max_width {
        let cut = rest
            .char_indices()
            .nth(max_width)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }
    pieces.push(rest);
    pieces
}
