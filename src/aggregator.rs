//! Error counting per document and for the whole build.

use crate::error::HarnessError;
use std::path::Path;
use std::process::ExitCode;

#[derive(Debug, Default)]
pub struct ErrorAggregator {
    document: usize,
    total: usize,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_error(&mut self) {
        self.note_errors(1);
    }

    pub fn note_errors(&mut self, n: usize) {
        self.document += n;
    }

    /// Errors noted since the current document started.
    pub fn document_errors(&self) -> usize {
        self.document
    }

    /// Errors folded in from finished documents plus build-level errors.
    pub fn total_errors(&self) -> usize {
        self.total
    }

    /// Close the current document.
    ///
    /// Any errors are moved into the build total and reported as a
    /// [`HarnessError::DocumentFailed`]; the counter restarts at zero either way.
    pub fn end_of_document(&mut self, document: &Path) -> Result<(), HarnessError> {
        let errors = std::mem::take(&mut self.document);
        if errors == 0 {
            return Ok(());
        }
        self.total += errors;
        Err(HarnessError::DocumentFailed {
            document: document.to_path_buf(),
            errors,
        })
    }

    /// Fold in build-level errors (coverage gaps) and close the build.
    ///
    /// Errors still pending on an unfinished document count as well.
    pub fn end_of_build(&mut self, build_errors: usize) -> BuildOutcome {
        self.total += std::mem::take(&mut self.document) + build_errors;
        BuildOutcome {
            total_errors: self.total,
        }
    }
}

/// Whole-build result; the single source of the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOutcome {
    pub total_errors: usize,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        self.total_errors == 0
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}
