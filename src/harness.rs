//! The per-build harness context.
//!
//! One [`Harness`] is created per documentation build. The renderer calls it
//! for every example directive in document order, then once per document
//! end and once at build end. All state lives here.

use crate::aggregator::{BuildOutcome, ErrorAggregator};
use crate::compare::{ComparisonResult, OutputComparator};
use crate::coverage::CoverageTracker;
use crate::error::{HarnessError, Result};
use crate::language::Language;
use crate::runner::{ExampleRunner, Execution, Invocation};
use crate::toolchain::{display_command, Toolchain};
use regex::{NoExpand, Regex};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Region shown when a show directive names no marker.
pub const DEFAULT_MARKER: &str = "example code";

/// The id that stands for the most recently shown example in roles.
pub const LAST_EXAMPLE: &str = "^";

static RE_LANGUAGE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bLANGUAGE\b").unwrap());

/// A "show example" request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowExample {
    pub example: String,
    /// Shows the text between `Start of <marker>` and `End of <marker>`.
    pub marker: Option<String>,
    pub start_after: Option<String>,
    pub end_before: Option<String>,
}

impl ShowExample {
    pub fn new(example: impl Into<String>) -> Self {
        Self {
            example: example.into(),
            ..Self::default()
        }
    }
}

/// What a directive contributes to the rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveOutput {
    Nothing,
    /// Inline literal, used for examples not yet ported to the language.
    Placeholder(String),
    /// Source code in the given language.
    Code { language: Language, text: String },
    /// Shell transcript: `$ `-prefixed command lines, then the output.
    Transcript { commands: Vec<String>, output: String },
}

#[derive(Debug)]
pub struct Harness {
    language: Language,
    toolchain: Toolchain,
    workdir: PathBuf,
    runner: ExampleRunner,
    comparator: OutputComparator,
    coverage: CoverageTracker,
    errors: ErrorAggregator,
    last_example: Option<String>,
    reported_goldens: HashSet<PathBuf>,
}

impl Harness {
    pub fn new(toolchain: Toolchain, workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        Self {
            language: toolchain.language(),
            toolchain,
            runner: ExampleRunner::new(&workdir),
            comparator: OutputComparator::new(&workdir),
            workdir,
            coverage: CoverageTracker::new(),
            errors: ErrorAggregator::new(),
            last_example: None,
            reported_goldens: HashSet::new(),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn coverage(&self) -> &CoverageTracker {
        &self.coverage
    }

    pub fn document_errors(&self) -> usize {
        self.errors.document_errors()
    }

    pub fn last_example(&self) -> Option<&str> {
        self.last_example.as_deref()
    }

    fn has_source(&self, source: &Path) -> bool {
        self.workdir.join(source).is_file()
    }

    fn placeholder(&self, example: &str) -> DirectiveOutput {
        DirectiveOutput::Placeholder(format!(
            "No version of example {} in language {} - patches welcome!",
            example, self.language
        ))
    }

    /// Count a non-fatal error against the current document and print it.
    /// Fatal errors are handed back.
    pub fn report_error(&mut self, err: HarnessError) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }
        println!("{err}");
        self.errors.note_error();
        Ok(())
    }

    /// Show an example's source, or a placeholder if this language lacks it.
    pub fn show_example(&mut self, show: &ShowExample) -> Result<DirectiveOutput> {
        let id = show.example.as_str();
        self.coverage.declare(id);
        self.last_example = Some(id.to_string());

        let source = self.language.source_path(id);
        if !self.has_source(&source) {
            self.coverage.record_missing(id);
            return Ok(self.placeholder(id));
        }

        let text = match fs::read_to_string(self.workdir.join(&source)) {
            Ok(text) => text,
            Err(e) => {
                self.report_error(HarnessError::io(&source, e))?;
                return Ok(DirectiveOutput::Nothing);
            }
        };
        let (start_after, end_before) = match (&show.start_after, &show.end_before) {
            (None, None) => {
                let marker = show.marker.as_deref().unwrap_or(DEFAULT_MARKER);
                (
                    Some(format!("Start of {marker}")),
                    Some(format!("End of {marker}")),
                )
            }
            (start, end) => (start.clone(), end.clone()),
        };
        match extract_region(&source, &text, start_after.as_deref(), end_before.as_deref()) {
            Ok(text) => Ok(DirectiveOutput::Code {
                language: self.language,
                text,
            }),
            Err(e) => {
                self.report_error(e)?;
                Ok(DirectiveOutput::Nothing)
            }
        }
    }

    /// Run an example from `document` and verify its output.
    ///
    /// Only configuration errors are returned; everything else is counted
    /// against the document.
    pub fn run_example(&mut self, document: &Path, invocation: &Invocation) -> Result<DirectiveOutput> {
        if let Err(e) = self.runner.enter_document(document) {
            self.report_error(e)?;
        }

        let id = invocation.example.as_str();
        let source = self.language.source_path(id);
        if !self.has_source(&source) {
            self.coverage.record_missing(id);
            return Ok(self.placeholder(id));
        }
        self.coverage.record_run(id, &invocation.args);

        if let Some(targets) = invocation.clean_first.as_deref() {
            if let Err(e) = self.runner.clean_first(targets) {
                self.report_error(e)?;
            }
        }

        match self.runner.execute(&self.toolchain, invocation) {
            Ok(execution) => self.check(document, &source, invocation, &execution)?,
            Err(e) => self.report_error(e)?,
        }

        if invocation.silent {
            return Ok(DirectiveOutput::Nothing);
        }
        let golden = self.comparator.resolve_golden(&source, &invocation.args);
        let output = fs::read_to_string(self.workdir.join(golden)).unwrap_or_default();
        Ok(DirectiveOutput::Transcript {
            commands: transcript_commands(self.language, id, &invocation.args),
            output,
        })
    }

    fn check(
        &mut self,
        document: &Path,
        source: &Path,
        invocation: &Invocation,
        execution: &Execution,
    ) -> Result<()> {
        let verdict = match self.comparator.verify(source, invocation, execution) {
            Ok(verdict) => verdict,
            Err(e) => return self.report_error(e),
        };

        match &verdict.status {
            ComparisonResult::UnexpectedSuccess => println!(
                "{}: ({}): Exit status 0, expected failure",
                source.display(),
                document.display()
            ),
            ComparisonResult::UnexpectedFailure { code } => println!(
                "{}: ({}): Exit status {}, expected 0",
                source.display(),
                document.display(),
                code.map_or_else(|| "(killed by signal)".to_string(), |c| c.to_string())
            ),
            _ => {}
        }

        match &verdict.output {
            ComparisonResult::GoldenMissing { golden } => {
                if self.reported_goldens.insert(golden.clone()) {
                    println!(
                        "*** No output file {} in language {} - patches welcome!",
                        golden.display(),
                        self.language
                    );
                }
            }
            ComparisonResult::OutputMismatch { actual, golden } => {
                let mut run = self.toolchain.run_command(&invocation.example).to_string();
                if !invocation.args.is_empty() {
                    run.push(' ');
                    run.push_str(&invocation.args);
                }
                if let Err(e) = io::stdout().flush() {
                    tracing::warn!(error = %e, "failed to flush stdout");
                }
                self.comparator.report_mismatch(&run, actual, golden);
            }
            _ => {}
        }

        self.errors.note_errors(verdict.error_count());
        Ok(())
    }

    /// Keep a snippet only when it is written in the active language.
    pub fn code_snippet(&self, language: &str, body: &str) -> DirectiveOutput {
        if language != self.language.name() {
            return DirectiveOutput::Nothing;
        }
        DirectiveOutput::Code {
            language: self.language,
            text: body.to_string(),
        }
    }

    /// Substitute the active language for each whole word `LANGUAGE`.
    pub fn include_path(&self, raw: &str) -> String {
        RE_LANGUAGE_WORD
            .replace_all(raw, NoExpand(self.language.name()))
            .into_owned()
    }

    /// Source path for an example reference; `^` means the last shown example.
    pub fn example_source(&self, reference: &str) -> PathBuf {
        let id = match (reference, self.last_example.as_deref()) {
            (LAST_EXAMPLE, Some(last)) => last,
            _ => reference,
        };
        self.language.source_path(id)
    }

    /// `<basename><ext>` for an example reference, as shown in short links.
    pub fn example_basename(&self, reference: &str) -> String {
        let id = match (reference, self.last_example.as_deref()) {
            (LAST_EXAMPLE, Some(last)) => last,
            _ => reference,
        };
        let base = id.rsplit('/').next().unwrap_or(id);
        format!("{}{}", base, self.language.extension())
    }

    /// Close a document; fails if it accumulated errors.
    pub fn end_of_document(&mut self, document: &Path) -> Result<()> {
        self.errors.end_of_document(document)
    }

    /// Final coverage check and summary. Consumes the harness.
    pub fn end_of_build(mut self) -> BuildOutcome {
        let report = self.coverage.finalize();
        for err in &report.errors {
            println!("{err}");
        }
        for id in &report.missing {
            println!(
                "*** No version of example {} in language {} - patches welcome!",
                id, self.language
            );
        }
        tracing::debug!(
            verified = report.verified.len(),
            missing = report.missing.len(),
            "coverage finalized"
        );
        let outcome = self.errors.end_of_build(report.errors.len());
        if !outcome.is_success() {
            println!("*** {} total error(s) with example code", outcome.total_errors);
        }
        outcome
    }
}

/// Command lines shown above a run's output, arguments on the last line.
pub fn transcript_commands(language: Language, example: &str, args: &str) -> Vec<String> {
    let mut lines: Vec<String> = display_command(language, example)
        .lines()
        .map(|l| format!("$ {l}"))
        .collect();
    if !args.is_empty() {
        if let Some(last) = lines.last_mut() {
            last.push(' ');
            last.push_str(args);
        }
    }
    lines
}

/// The lines strictly between the first line containing `start_after` and
/// the next line containing `end_before`. Either bound may be absent.
pub fn extract_region(
    file: &Path,
    text: &str,
    start_after: Option<&str>,
    end_before: Option<&str>,
) -> Result<String> {
    let not_found = |pattern: &str| HarnessError::PatternNotFound {
        file: file.to_path_buf(),
        pattern: pattern.to_string(),
    };
    let lines: Vec<&str> = text.split_inclusive('\n').collect();

    let start = match start_after {
        Some(pattern) => {
            lines
                .iter()
                .position(|l| l.contains(pattern))
                .ok_or_else(|| not_found(pattern))?
                + 1
        }
        None => 0,
    };
    let end = match end_before {
        Some(pattern) => {
            start
                + lines[start..]
                    .iter()
                    .position(|l| l.contains(pattern))
                    .ok_or_else(|| not_found(pattern))?
        }
        None => lines.len(),
    };
    Ok(lines[start..end].concat())
}
