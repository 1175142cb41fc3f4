//! Build-wide bookkeeping of which examples were shown, run, or missing.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverageError {
    /// Shown to the reader but never verified.
    NeverRun(String),
    /// Verified but never shown to the reader.
    NeverShown(String),
}

impl fmt::Display for CoverageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeverRun(id) => write!(f, "Example {id} isn't shown to be run anywhere"),
            Self::NeverShown(id) => write!(f, "Example {id} is used but never shown anywhere"),
        }
    }
}

/// Final classification produced by [`CoverageTracker::finalize`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoverageReport {
    /// Declared and run.
    pub verified: Vec<String>,
    /// No implementation in this language, first-seen order, no duplicates.
    pub missing: Vec<String>,
    pub errors: Vec<CoverageError>,
}

#[derive(Debug, Default)]
pub struct CoverageTracker {
    declared: BTreeSet<String>,
    runs: BTreeMap<String, Vec<String>>,
    missing: Vec<String>,
}

impl CoverageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// An example was shown.
    pub fn declare(&mut self, example: &str) {
        self.declared.insert(example.to_string());
    }

    /// An example has no source file for the current language.
    pub fn record_missing(&mut self, example: &str) {
        self.missing.push(example.to_string());
    }

    /// An example was executed with `args`.
    pub fn record_run(&mut self, example: &str, args: &str) {
        self.runs
            .entry(example.to_string())
            .or_default()
            .push(args.to_string());
    }

    /// Argument strings `example` has been run with, in order.
    pub fn runs_of(&self, example: &str) -> &[String] {
        self.runs.get(example).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_declared(&self, example: &str) -> bool {
        self.declared.contains(example)
    }

    /// Classify everything seen during the build. Called once, at the end.
    pub fn finalize(self) -> CoverageReport {
        let missing_set: HashSet<&str> = self.missing.iter().map(String::as_str).collect();
        let mut report = CoverageReport::default();

        for id in &self.declared {
            if self.runs.contains_key(id) {
                report.verified.push(id.clone());
            } else if !missing_set.contains(id.as_str()) {
                report.errors.push(CoverageError::NeverRun(id.clone()));
            }
        }
        for id in self.runs.keys() {
            if !self.declared.contains(id) {
                report.errors.push(CoverageError::NeverShown(id.clone()));
            }
        }

        let mut seen = HashSet::new();
        for id in self.missing {
            if seen.insert(id.clone()) {
                report.missing.push(id);
            }
        }
        report
    }
}
