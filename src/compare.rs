//! Golden-output resolution and comparison.
//!
//! ## File naming
//!
//! | File | Path |
//! |------|------|
//! | default golden | `<source>.out` |
//! | per-arguments golden | `<source>.<escaped-args>.out` |
//! | kept actual output | `<source>.<escaped-args>.tmp` |

use crate::error::{HarnessError, Result};
use crate::runner::{Execution, Invocation};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

/// Escape an argument string into a filename-safe token.
///
/// Bytes outside `[-A-Za-z0-9. ]` become `=xx` (lowercase hex), then spaces
/// become underscores. `_` and `=` are themselves escaped, so distinct
/// argument strings never collide.
pub fn escape_args(args: &str) -> String {
    let mut out = String::with_capacity(args.len());
    for byte in args.bytes() {
        match byte {
            b'-' | b'.' | b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => out.push(byte as char),
            b' ' => out.push('_'),
            _ => out.push_str(&format!("={byte:02x}")),
        }
    }
    out
}

fn with_suffix(source: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(source.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// `<source>.out`
pub fn default_golden_path(source: &Path) -> PathBuf {
    with_suffix(source, ".out")
}

/// `<source>.<escaped-args>.out`
pub fn args_golden_path(source: &Path, args: &str) -> PathBuf {
    with_suffix(source, &format!(".{}.out", escape_args(args)))
}

/// `<source>.<escaped-args>.tmp`
pub fn actual_output_path(source: &Path, args: &str) -> PathBuf {
    with_suffix(source, &format!(".{}.tmp", escape_args(args)))
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonResult {
    Pass,
    /// Nonzero exit from an example expected to succeed.
    UnexpectedFailure { code: Option<i32> },
    /// Exit status 0 from an example marked `shouldfail`.
    UnexpectedSuccess,
    /// Actual output differs; it is kept at `actual` for inspection.
    OutputMismatch { actual: PathBuf, golden: PathBuf },
    /// No golden file for this language yet. A warning, not an error.
    GoldenMissing { golden: PathBuf },
}

impl ComparisonResult {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedFailure { .. } | Self::UnexpectedSuccess | Self::OutputMismatch { .. }
        )
    }
}

/// Separate verdicts for the exit status and for the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: ComparisonResult,
    pub output: ComparisonResult,
}

impl Verdict {
    pub fn error_count(&self) -> usize {
        usize::from(self.status.is_error()) + usize::from(self.output.is_error())
    }

    pub fn is_pass(&self) -> bool {
        self.status == ComparisonResult::Pass && self.output == ComparisonResult::Pass
    }
}

/// Check an exit status against the invocation's expectation.
pub fn check_status(should_fail: bool, status: ExitStatus) -> ComparisonResult {
    match (should_fail, status.success()) {
        (true, true) => ComparisonResult::UnexpectedSuccess,
        (false, false) => ComparisonResult::UnexpectedFailure {
            code: status.code(),
        },
        _ => ComparisonResult::Pass,
    }
}

#[derive(Debug)]
pub struct OutputComparator {
    workdir: PathBuf,
}

impl OutputComparator {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Golden file for `args`, relative to the working directory.
    ///
    /// The argument-specific file wins when it exists; otherwise the default.
    pub fn resolve_golden(&self, source: &Path, args: &str) -> PathBuf {
        if !args.is_empty() {
            let specific = args_golden_path(source, args);
            if self.workdir.join(&specific).is_file() {
                return specific;
            }
        }
        default_golden_path(source)
    }

    /// Verify an execution of `invocation` whose source is `source`.
    ///
    /// The actual output is moved next to the source. It is deleted on a
    /// match and kept otherwise.
    pub fn verify(
        &self,
        source: &Path,
        invocation: &Invocation,
        execution: &Execution,
    ) -> Result<Verdict> {
        let status = check_status(invocation.should_fail, execution.status);

        let actual = actual_output_path(source, &invocation.args);
        let actual_abs = self.workdir.join(&actual);
        fs::rename(&execution.output, &actual_abs)
            .map_err(|e| HarnessError::io(&execution.output, e))?;

        let golden = self.resolve_golden(source, &invocation.args);
        let golden_abs = self.workdir.join(&golden);
        tracing::trace!(golden = %golden.display(), "resolved golden output");
        if !golden_abs.is_file() {
            remove_if_present(&execution.error_capture)?;
            return Ok(Verdict {
                status,
                output: ComparisonResult::GoldenMissing { golden },
            });
        }

        let expected = fs::read(&golden_abs).map_err(|e| HarnessError::io(&golden_abs, e))?;
        let got = fs::read(&actual_abs).map_err(|e| HarnessError::io(&actual_abs, e))?;
        let output = if expected == got {
            remove_if_present(&actual_abs)?;
            remove_if_present(&execution.error_capture)?;
            ComparisonResult::Pass
        } else {
            ComparisonResult::OutputMismatch { actual, golden }
        };
        Ok(Verdict { status, output })
    }

    /// Print a unified diff plus the commands to reproduce and inspect it.
    pub fn report_mismatch(&self, command: &str, actual: &Path, golden: &Path) {
        match Command::new("diff")
            .arg("-u")
            .arg(actual)
            .arg(golden)
            .current_dir(&self.workdir)
            .output()
        {
            Ok(out) => {
                print!("{}", String::from_utf8_lossy(&out.stdout));
                eprint!("{}", String::from_utf8_lossy(&out.stderr));
            }
            Err(e) => eprintln!("warning: could not run diff: {e}"),
        }
        for line in inspection_commands(command, actual, golden) {
            println!("{line}");
        }
    }
}

/// The "run it yourself" and "compare it yourself" lines for a mismatch.
pub fn inspection_commands(command: &str, actual: &Path, golden: &Path) -> [String; 2] {
    [
        format!("$ {command}"),
        format!("vimdiff {} {}", actual.display(), golden.display()),
    ]
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(HarnessError::io(path, e)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn exit_with(code: i32) -> ExitStatus {
        Command::new("sh")
            .arg("-c")
            .arg(format!("exit {code}"))
            .status()
            .unwrap()
    }

    struct Fixture {
        dir: TempDir,
        source: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::create_dir_all(dir.path().join("code/python")).unwrap();
            let source = PathBuf::from("code/python/hello.py");
            fs::write(dir.path().join(&source), "").unwrap();
            Self { dir, source }
        }

        fn golden(&self, args: &str, text: &str) {
            let path = if args.is_empty() {
                default_golden_path(&self.source)
            } else {
                args_golden_path(&self.source, args)
            };
            fs::write(self.dir.path().join(path), text).unwrap();
        }

        fn execution(&self, code: i32, output: &str) -> Execution {
            let out = self.dir.path().join("tmp.out");
            let err = self.dir.path().join("tmp2.out");
            fs::write(&out, output).unwrap();
            fs::write(&err, "").unwrap();
            Execution {
                status: exit_with(code),
                output: out,
                error_capture: err,
            }
        }

        fn comparator(&self) -> OutputComparator {
            OutputComparator::new(self.dir.path())
        }
    }

    #[test]
    fn escape_examples() {
        assert_eq!(escape_args(""), "");
        assert_eq!(escape_args("db 0 10"), "db_0_10");
        assert_eq!(escape_args("bad -query"), "bad_-query");
        assert_eq!(escape_args("title:\"a b\""), "title=3a=22a_b=22");
        assert_eq!(escape_args("a_b"), "a=5fb");
        assert_eq!(escape_args("x=y"), "x=3dy");
        assert_eq!(escape_args("é"), "=c3=a9");
    }

    #[test]
    fn golden_naming() {
        let src = Path::new("code/python/search.py");
        assert_eq!(default_golden_path(src), Path::new("code/python/search.py.out"));
        assert_eq!(
            args_golden_path(src, "db tiger"),
            Path::new("code/python/search.py.db_tiger.out")
        );
        assert_eq!(actual_output_path(src, ""), Path::new("code/python/search.py..tmp"));
    }

    #[test]
    fn resolution_prefers_args_specific_golden() {
        let fx = Fixture::new();
        let cmp = fx.comparator();
        assert_eq!(cmp.resolve_golden(&fx.source, "db x"), default_golden_path(&fx.source));
        fx.golden("db x", "specific\n");
        let first = cmp.resolve_golden(&fx.source, "db x");
        assert_eq!(first, args_golden_path(&fx.source, "db x"));
        assert_eq!(cmp.resolve_golden(&fx.source, "db x"), first);
        assert_eq!(cmp.resolve_golden(&fx.source, "db y"), default_golden_path(&fx.source));
    }

    #[test]
    fn matching_output_passes_and_cleans_up() {
        let fx = Fixture::new();
        fx.golden("", "Hello, world!\n");
        let exec = fx.execution(0, "Hello, world!\n");
        let verdict = fx
            .comparator()
            .verify(&fx.source, &Invocation::new("hello"), &exec)
            .unwrap();
        assert!(verdict.is_pass());
        assert!(!fx.dir.path().join(actual_output_path(&fx.source, "")).exists());
        assert!(!fx.dir.path().join("tmp.out").exists());
        assert!(!fx.dir.path().join("tmp2.out").exists());
    }

    #[test]
    fn mismatch_keeps_actual_output() {
        let fx = Fixture::new();
        fx.golden("", "Hello, world!\n");
        let exec = fx.execution(0, "Goodbye\n");
        let verdict = fx
            .comparator()
            .verify(&fx.source, &Invocation::new("hello"), &exec)
            .unwrap();
        assert_eq!(verdict.status, ComparisonResult::Pass);
        let actual = actual_output_path(&fx.source, "");
        assert_eq!(
            verdict.output,
            ComparisonResult::OutputMismatch {
                actual: actual.clone(),
                golden: default_golden_path(&fx.source),
            }
        );
        assert_eq!(verdict.error_count(), 1);
        assert_eq!(
            fs::read_to_string(fx.dir.path().join(actual)).unwrap(),
            "Goodbye\n"
        );
    }

    #[test]
    fn unexpected_failure_is_reported_alongside_output() {
        let fx = Fixture::new();
        fx.golden("", "partial\n");
        let exec = fx.execution(2, "partial\n");
        let verdict = fx
            .comparator()
            .verify(&fx.source, &Invocation::new("hello"), &exec)
            .unwrap();
        assert_eq!(verdict.status, ComparisonResult::UnexpectedFailure { code: Some(2) });
        assert_eq!(verdict.output, ComparisonResult::Pass);
        assert_eq!(verdict.error_count(), 1);
    }

    #[test]
    fn expected_failure() {
        let fx = Fixture::new();
        fx.golden("bad -query", "Error: bad query\n");
        let inv = Invocation {
            args: "bad -query".into(),
            should_fail: true,
            ..Invocation::new("search")
        };
        let exec = fx.execution(1, "something else\n");
        let verdict = fx.comparator().verify(&fx.source, &inv, &exec).unwrap();
        assert_eq!(verdict.status, ComparisonResult::Pass);

        let exec = fx.execution(0, "Error: bad query\n");
        let verdict = fx.comparator().verify(&fx.source, &inv, &exec).unwrap();
        assert_eq!(verdict.status, ComparisonResult::UnexpectedSuccess);
        assert_eq!(verdict.output, ComparisonResult::Pass);
    }

    #[test]
    fn missing_golden_is_a_warning() {
        let fx = Fixture::new();
        let exec = fx.execution(0, "whatever\n");
        let verdict = fx
            .comparator()
            .verify(&fx.source, &Invocation::new("hello"), &exec)
            .unwrap();
        assert_eq!(
            verdict.output,
            ComparisonResult::GoldenMissing {
                golden: default_golden_path(&fx.source)
            }
        );
        assert!(!verdict.output.is_error());
        assert_eq!(verdict.error_count(), 0);
        // Kept so it can become the new golden file.
        assert!(fx.dir.path().join(actual_output_path(&fx.source, "")).exists());
    }

    #[test]
    fn inspection_lines() {
        let [run, diff] = inspection_commands(
            "python2 code/python/hello.py db",
            Path::new("a.tmp"),
            Path::new("a.out"),
        );
        assert_eq!(run, "$ python2 code/python/hello.py db");
        assert_eq!(diff, "vimdiff a.tmp a.out");
    }

    proptest! {
        #[test]
        fn escaping_is_injective(a in "[ -~]{0,12}", b in "[ -~]{0,12}") {
            prop_assume!(a != b);
            prop_assert_ne!(escape_args(&a), escape_args(&b));
        }

        #[test]
        fn escaped_tokens_are_filename_safe(s in "\\PC{0,16}") {
            let escaped = escape_args(&s);
            prop_assert!(escaped
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "-._=".contains(c)));
        }
    }

    #[test]
    fn escaping_has_no_collisions_over_a_sample() {
        let samples = [
            "", " ", "_", "=5f", "a b", "a_b", "a=20b", "a  b", "-", ".", "..", "a\tb",
            "title:free", "title=3afree", "'x'", "\"x\"",
        ];
        let mut seen = HashMap::new();
        for s in samples {
            if let Some(prev) = seen.insert(escape_args(s), s) {
                panic!("{prev:?} and {s:?} collide");
            }
        }
    }
}
