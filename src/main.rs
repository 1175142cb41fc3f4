//! example-verify: run the code examples of a documentation build.
//!
//! Reads reStructuredText sources in order, runs every example they show,
//! and exits nonzero if any example misbehaves or coverage has gaps:
//!
//! `PYTHON=python3 example-verify -l python -o _build/rst *.rst`

use anyhow::{bail, Context, Result};
use clap::Parser;
use example_verify::document::render::{self, SourceLinks, DEFAULT_SOURCE_URL};
use example_verify::toolchain::{ToolOverrides, Toolchain};
use example_verify::{Harness, Language};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "example-verify",
    about = "Run the code examples of a multi-language documentation build and check their output"
)]
struct Cli {
    /// Documentation sources (glob patterns and directories supported)
    files: Vec<String>,

    /// Language whose examples are verified
    #[arg(short = 'l', long, default_value = "python")]
    language: Language,

    /// Write processed documents to this directory
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Base URL for links to example sources
    #[arg(long, default_value = DEFAULT_SOURCE_URL)]
    source_url: String,

    /// Print the supported languages and exit
    #[arg(long)]
    list_languages: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    if cli.list_languages {
        println!("{}", Language::names().join(" "));
        return Ok(ExitCode::SUCCESS);
    }
    if cli.files.is_empty() {
        bail!("no documentation sources given");
    }

    let toolchain = Toolchain::resolve(cli.language, &ToolOverrides::from_env())?;
    let workdir = std::env::current_dir().context("failed to read the working directory")?;
    let mut harness = Harness::new(toolchain, workdir);

    if let Some(ref dir) = cli.output {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory: {}", dir.display()))?;
    }

    let files = expand_globs(&cli.files)?;
    let outputs = match cli.output {
        Some(ref dir) => output_paths(dir, &files)?,
        None => vec![None; files.len()],
    };

    let links = SourceLinks::new(cli.source_url.as_str());
    for (path, out_path) in files.iter().zip(outputs) {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let rendered = render::process(&mut harness, path, &content, &links)?;

        if let Err(e) = harness.end_of_document(path) {
            eprintln!("error: {e}");
            continue;
        }
        if let Some(out_path) = out_path {
            fs::write(&out_path, rendered)
                .with_context(|| format!("failed to write {}", out_path.display()))?;
        }
    }

    Ok(harness.end_of_build().exit_code())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// File extensions recognized as documentation sources.
const SUPPORTED_EXTENSIONS: &[&str] = &["rst"];

/// Expand glob patterns into a list of real file paths.
/// Bare directories are scanned (non-recursively) for `.rst` files.
fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let path = Path::new(pattern);
        if path.is_file() {
            files.push(path.to_path_buf());
            continue;
        }
        if path.is_dir() {
            let entries = fs::read_dir(path)
                .with_context(|| format!("failed to read directory: {}", path.display()))?;
            for entry in entries.flatten() {
                let p = entry.path();
                if p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
                {
                    files.push(p);
                }
            }
            continue;
        }
        let matches: Vec<_> = glob::glob(pattern)
            .with_context(|| format!("invalid glob pattern: {}", pattern))?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
            .collect();
        if matches.is_empty() {
            eprintln!("warning: no files matched: {}", pattern);
        }
        files.extend(matches);
    }
    // Sort for deterministic processing order
    files.sort();
    files.dedup();
    Ok(files)
}

/// Output file for each source, refusing two sources that would share one.
fn output_paths(dir: &Path, files: &[PathBuf]) -> Result<Vec<Option<PathBuf>>> {
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    let mut outputs = Vec::with_capacity(files.len());
    for path in files {
        let out_path = dir.join(format!("{}.rst", derive_output_name(path)));
        if let Some(previous) = claimed.insert(out_path.clone(), path) {
            bail!(
                "{} and {} would both be written to {}",
                previous.display(),
                path.display(),
                out_path.display()
            );
        }
        outputs.push(Some(out_path));
    }
    Ok(outputs)
}

/// "docs/intro.rst" → "intro"
fn derive_output_name(source: &Path) -> String {
    let filename = source
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    filename
        .strip_suffix(".rst")
        .unwrap_or(&filename)
        .to_string()
}
