//! Executes example invocations and captures their output.

use crate::error::{ConfigError, HarnessError, Result};
use crate::toolchain::{CommandLine, Toolchain};
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;

/// Scratch state left behind by examples, cleared when a new document starts.
pub const SCRATCH_ARTIFACTS: &[&str] = &["db", "filtersdb", "statesdb"];

/// Captured standard output; standard error is appended after the run.
pub const OUTPUT_CAPTURE: &str = "tmp.out";
pub const ERROR_CAPTURE: &str = "tmp2.out";

static RE_UNSAFE_CLEAN_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^-A-Za-z0-9_ ]").unwrap());

/// One "run example" request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub example: String,
    /// Raw argument string, split shell-style before execution.
    pub args: String,
    pub should_fail: bool,
    /// Verify, but don't show anything in the document.
    pub silent: bool,
    /// Space-separated names to delete from the working directory first.
    pub clean_first: Option<String>,
}

impl Invocation {
    pub fn new(example: impl Into<String>) -> Self {
        Self {
            example: example.into(),
            ..Self::default()
        }
    }
}

/// Result of running an invocation.
#[derive(Debug)]
pub struct Execution {
    pub status: ExitStatus,
    /// Combined stdout followed by stderr.
    pub output: PathBuf,
    /// Raw stderr capture, already folded into `output`.
    pub error_capture: PathBuf,
}

#[derive(Debug)]
pub struct ExampleRunner {
    workdir: PathBuf,
    current_document: Option<PathBuf>,
}

impl ExampleRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            current_document: None,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Note which document the next invocation belongs to.
    ///
    /// Returns `true` (after clearing scratch artifacts) when this is a
    /// different document from the previous invocation's.
    pub fn enter_document(&mut self, document: &Path) -> Result<bool> {
        if self.current_document.as_deref() == Some(document) {
            return Ok(false);
        }
        tracing::debug!(document = %document.display(), "new document, clearing scratch state");
        for name in SCRATCH_ARTIFACTS {
            remove_path(&self.workdir.join(name))?;
        }
        self.current_document = Some(document.to_path_buf());
        Ok(true)
    }

    /// Remove the invocation's clean-first targets.
    pub fn clean_first(&self, targets: &str) -> Result<()> {
        if RE_UNSAFE_CLEAN_TARGET.is_match(targets) {
            return Err(ConfigError::UnsafeCleanTarget(targets.to_string()).into());
        }
        for name in targets.split_whitespace() {
            tracing::debug!(target = name, "cleaning before run");
            remove_path(&self.workdir.join(name))?;
        }
        Ok(())
    }

    /// Build (if needed) and run the example, capturing its output.
    ///
    /// The exit status is returned as-is. A failing build step skips the run
    /// and reports the build's status.
    pub fn execute(&self, toolchain: &Toolchain, invocation: &Invocation) -> Result<Execution> {
        let output = self.workdir.join(OUTPUT_CAPTURE);
        let error_capture = self.workdir.join(ERROR_CAPTURE);
        let stdout = File::create(&output).map_err(|e| HarnessError::io(&output, e))?;
        let stderr =
            File::create(&error_capture).map_err(|e| HarnessError::io(&error_capture, e))?;

        if let Some(build) = toolchain.build_command(&invocation.example) {
            tracing::debug!(command = %build, "building example");
            let status = build
                .to_command(&self.workdir)
                .stdin(Stdio::null())
                .status()
                .map_err(|source| self.spawn_failed(&build, source))?;
            if !status.success() {
                return Ok(Execution {
                    status,
                    output,
                    error_capture,
                });
            }
        }

        let mut run = toolchain.run_command(&invocation.example);
        run.args.extend(split_args(&invocation.args));
        tracing::debug!(command = %run, "running example");
        let status = run
            .to_command(&self.workdir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|source| self.spawn_failed(&run, source))?;

        append_file(&error_capture, &output)?;
        Ok(Execution {
            status,
            output,
            error_capture,
        })
    }

    /// Drop the capture files of a command that never started.
    fn spawn_failed(&self, command: &CommandLine, source: io::Error) -> HarnessError {
        for name in [OUTPUT_CAPTURE, ERROR_CAPTURE] {
            if let Err(e) = remove_path(&self.workdir.join(name)) {
                tracing::warn!(error = %e, "failed to remove capture file");
            }
        }
        HarnessError::Spawn {
            command: command.to_string(),
            source,
        }
    }
}

fn append_file(from: &Path, to: &Path) -> Result<()> {
    let mut src = File::open(from).map_err(|e| HarnessError::io(from, e))?;
    let mut dst = OpenOptions::new()
        .append(true)
        .open(to)
        .map_err(|e| HarnessError::io(to, e))?;
    io::copy(&mut src, &mut dst).map_err(|e| HarnessError::io(to, e))?;
    Ok(())
}

/// `rm -rf` for a single path; absence is fine.
fn remove_path(path: &Path) -> Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|e| HarnessError::io(path, e))
}

/// Split an argument string into words the way a POSIX shell would for
/// plain words, single quotes, double quotes and backslash escapes.
///
/// No expansion of any kind is performed.
pub fn split_args(args: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = args.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' if !in_double => {
                in_single = !in_single;
                in_word = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                in_word = true;
            }
            '\\' if !in_single => {
                in_word = true;
                match chars.next() {
                    // Inside double quotes only a few characters are escapable.
                    Some(c) if in_double && !matches!(c, '"' | '\\' | '$' | '`') => {
                        word.push('\\');
                        word.push(c);
                    }
                    Some(c) => word.push(c),
                    None => word.push('\\'),
                }
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                word.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(word);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::toolchain::ToolOverrides;
    use tempfile::TempDir;

    fn sh_python() -> Toolchain {
        Toolchain::resolve(
            Language::Python,
            &ToolOverrides::from_pairs([("PYTHON", "sh")]),
        )
        .unwrap()
    }

    fn write_example(dir: &Path, name: &str, body: &str) {
        let path = dir.join("code/python");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(format!("{name}.py")), body).unwrap();
    }

    #[test]
    fn split_plain_words() {
        assert_eq!(split_args("  foo  bar\tbaz "), ["foo", "bar", "baz"]);
        assert!(split_args("").is_empty());
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn split_quoted_words() {
        assert_eq!(
            split_args(r#"db 'title:"free software"' "a b" c"#),
            ["db", r#"title:"free software""#, "a b", "c"]
        );
        assert_eq!(split_args("''"), [""]);
        assert_eq!(split_args(r"a\ b"), ["a b"]);
        assert_eq!(split_args(r#""x\"y\n""#), [r#"x"y\n"#]);
    }

    #[test]
    fn split_keeps_punctuation() {
        assert_eq!(split_args("bad -query"), ["bad", "-query"]);
        assert_eq!(split_args("db 0 10 a..b"), ["db", "0", "10", "a..b"]);
    }

    #[test]
    fn first_invocation_of_document_clears_scratch() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("db/sub")).unwrap();
        fs::write(dir.path().join("statesdb"), "x").unwrap();
        fs::create_dir(dir.path().join("keepme")).unwrap();

        let mut runner = ExampleRunner::new(dir.path());
        assert!(runner.enter_document(Path::new("a.rst")).unwrap());
        assert!(!dir.path().join("db").exists());
        assert!(!dir.path().join("statesdb").exists());
        assert!(dir.path().join("keepme").exists());

        // Same document again: nothing is touched.
        fs::create_dir(dir.path().join("db")).unwrap();
        assert!(!runner.enter_document(Path::new("a.rst")).unwrap());
        assert!(dir.path().join("db").exists());

        assert!(runner.enter_document(Path::new("b.rst")).unwrap());
        assert!(!dir.path().join("db").exists());
    }

    #[test]
    fn clean_first_removes_named_targets() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("db2")).unwrap();
        fs::write(dir.path().join("other_db"), "").unwrap();
        let runner = ExampleRunner::new(dir.path());
        runner.clean_first("db2 other_db missing").unwrap();
        assert!(!dir.path().join("db2").exists());
        assert!(!dir.path().join("other_db").exists());
    }

    #[test]
    fn clean_first_rejects_unsafe_names() {
        let dir = TempDir::new().unwrap();
        let runner = ExampleRunner::new(dir.path());
        for bad in ["../db", "/tmp", "db;ls", "*"] {
            let err = runner.clean_first(bad).unwrap_err();
            assert!(err.is_fatal(), "accepted {bad:?}");
        }
    }

    #[test]
    fn execute_combines_stdout_then_stderr() {
        let dir = TempDir::new().unwrap();
        write_example(dir.path(), "both", "echo err >&2\necho out\n");
        let runner = ExampleRunner::new(dir.path());
        let exec = runner.execute(&sh_python(), &Invocation::new("both")).unwrap();
        assert!(exec.status.success());
        assert_eq!(fs::read_to_string(&exec.output).unwrap(), "out\nerr\n");
    }

    #[test]
    fn execute_passes_arguments_and_status() {
        let dir = TempDir::new().unwrap();
        write_example(dir.path(), "args", "echo \"$#:$1\"\nexit 3\n");
        let runner = ExampleRunner::new(dir.path());
        let inv = Invocation {
            args: "'two words' more".into(),
            ..Invocation::new("args")
        };
        let exec = runner.execute(&sh_python(), &inv).unwrap();
        assert_eq!(exec.status.code(), Some(3));
        assert_eq!(fs::read_to_string(&exec.output).unwrap(), "2:two words\n");
    }

    #[test]
    fn arguments_are_not_shell_interpreted() {
        let dir = TempDir::new().unwrap();
        write_example(dir.path(), "echoargs", "echo \"$1\"\n");
        let runner = ExampleRunner::new(dir.path());
        let inv = Invocation {
            args: "'$(touch pwned)'".into(),
            ..Invocation::new("echoargs")
        };
        runner.execute(&sh_python(), &inv).unwrap();
        assert!(!dir.path().join("pwned").exists());
    }

    #[test]
    fn missing_interpreter_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        write_example(dir.path(), "hello", "echo hi\n");
        let tc = Toolchain::resolve(
            Language::Python,
            &ToolOverrides::from_pairs([("PYTHON", "no-such-interpreter-here")]),
        )
        .unwrap();
        let err = ExampleRunner::new(dir.path())
            .execute(&tc, &Invocation::new("hello"))
            .unwrap_err();
        assert!(matches!(err, HarnessError::Spawn { .. }));
        assert!(!err.is_fatal());
        assert!(!dir.path().join(OUTPUT_CAPTURE).exists());
        assert!(!dir.path().join(ERROR_CAPTURE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn java_run_sees_inherited_classpath() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("code/java")).unwrap();
        fs::write(dir.path().join("code/java/hello.java"), "class hello {}\n").unwrap();
        // Stands in for the JVM: reports the class path it was given.
        let java = dir.path().join("fake-java");
        fs::write(&java, "#!/bin/sh\necho \"$2\"\n").unwrap();
        fs::set_permissions(&java, fs::Permissions::from_mode(0o755)).unwrap();

        let java = java.display().to_string();
        let tc = Toolchain::resolve(
            Language::Java,
            &ToolOverrides::from_pairs([
                ("JAVAC", "true"),
                ("JAVA", java.as_str()),
                ("CLASSPATH", "/opt/xapian/lib/xapian.jar"),
            ]),
        )
        .unwrap();
        let exec = ExampleRunner::new(dir.path())
            .execute(&tc, &Invocation::new("hello"))
            .unwrap();
        assert!(exec.status.success());
        assert_eq!(
            fs::read_to_string(&exec.output).unwrap(),
            "code/java:/opt/xapian/lib/xapian.jar\n"
        );
    }
}
