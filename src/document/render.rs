//! Feed a document's directives to the harness and render the result.
//!
//! Harness directives are replaced by plain reStructuredText: code blocks for
//! shown sources and run transcripts, inline literals for placeholders.
//! Example roles in prose become hyperlinks to the example source.

use super::{parse, Block, Directive, DirectiveKind};
use crate::error::{HarnessError, Result};
use crate::harness::{DirectiveOutput, Harness, ShowExample};
use crate::runner::Invocation;
use regex::{Captures, Regex};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// Maximum include nesting.
const MAX_INCLUDE_DEPTH: usize = 16;

pub const DEFAULT_SOURCE_URL: &str = "https://github.com/xapian/xapian-docsprint/blob/master";

static RE_EXAMPLE_ROLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":xapian-(basename-)?(code-)?example:`([^`]+)`").unwrap());

/// Where example-source links point.
#[derive(Debug, Clone)]
pub struct SourceLinks {
    base: String,
}

impl SourceLinks {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { base }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }
}

impl Default for SourceLinks {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_URL)
    }
}

/// Process every directive of `document` in order and return the rendered text.
///
/// Only fatal errors are returned. Everything else has been counted against
/// the document by the time this returns.
pub fn process(
    harness: &mut Harness,
    document: &Path,
    content: &str,
    links: &SourceLinks,
) -> Result<String> {
    let dir = document.parent().unwrap_or_else(|| Path::new(""));
    let mut out = String::new();
    process_blocks(harness, document, dir, content, links, 0, &mut out)?;
    Ok(out)
}

fn process_blocks(
    harness: &mut Harness,
    document: &Path,
    dir: &Path,
    content: &str,
    links: &SourceLinks,
    depth: usize,
    out: &mut String,
) -> Result<()> {
    for block in parse(content) {
        match block {
            Block::Text(line) => {
                out.push_str(&expand_roles(harness, links, &line));
                out.push('\n');
            }
            Block::Directive(d) if d.kind == DirectiveKind::Include => {
                include(harness, document, dir, &d, links, depth, out)?;
            }
            Block::Directive(d) => {
                tracing::trace!(line = d.line, kind = ?d.kind, argument = %d.argument, "directive");
                let output = match d.kind {
                    DirectiveKind::ShowExample => harness.show_example(&show_request(&d))?,
                    DirectiveKind::RunExample => {
                        harness.run_example(document, &invocation(&d))?
                    }
                    DirectiveKind::CodeSnippet => {
                        harness.code_snippet(&d.argument, &d.content.join("\n"))
                    }
                    DirectiveKind::Include => DirectiveOutput::Nothing,
                };
                render_output(&output, &d.indent, out);
            }
        }
    }
    Ok(())
}

fn include(
    harness: &mut Harness,
    document: &Path,
    dir: &Path,
    d: &Directive,
    links: &SourceLinks,
    depth: usize,
    out: &mut String,
) -> Result<()> {
    let path = dir.join(harness.include_path(&d.argument));
    if depth >= MAX_INCLUDE_DEPTH {
        return harness.report_error(HarnessError::io(
            &path,
            std::io::Error::other("include nested too deeply"),
        ));
    }
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => return harness.report_error(HarnessError::io(&path, e)),
    };
    tracing::debug!(path = %path.display(), "including");
    let inner_dir = path.parent().unwrap_or(dir).to_path_buf();
    process_blocks(harness, document, &inner_dir, &text, links, depth + 1, out)
}

fn show_request(d: &Directive) -> ShowExample {
    ShowExample {
        example: d.argument.clone(),
        marker: d.option("marker").map(str::to_string),
        start_after: d.option("start-after").map(str::to_string),
        end_before: d.option("end-before").map(str::to_string),
    }
}

fn invocation(d: &Directive) -> Invocation {
    Invocation {
        example: d.argument.clone(),
        args: d.option("args").unwrap_or_default().to_string(),
        // Present without a value, or with any value but "0", means set.
        should_fail: d.option("shouldfail").is_some_and(|v| v != "0"),
        silent: d.has_option("silent"),
        clean_first: d
            .option("cleanfirst")
            .filter(|v| !v.is_empty())
            .map(str::to_string),
    }
}

/// Replace example roles with source links.
///
/// `code-example` roles take an example id (or `^`); plain `example` roles
/// take a repository path.
fn expand_roles(harness: &Harness, links: &SourceLinks, line: &str) -> String {
    RE_EXAMPLE_ROLE
        .replace_all(line, |caps: &Captures| {
            let reference = &caps[3];
            let basename = caps.get(1).is_some();
            let (path, short) = if caps.get(2).is_some() {
                let path = harness.example_source(reference).display().to_string();
                (path, harness.example_basename(reference))
            } else {
                let short = Path::new(reference)
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| reference.to_string());
                (reference.to_string(), short)
            };
            let text = if basename { short } else { path.clone() };
            format!("`{} <{}>`__", text, links.url(&path))
        })
        .into_owned()
}

fn push_indented(out: &mut String, indent: &str, text: &str) {
    for line in text.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(indent);
            out.push_str("   ");
            out.push_str(line);
            out.push('\n');
        }
    }
}

fn render_output(output: &DirectiveOutput, indent: &str, out: &mut String) {
    match output {
        DirectiveOutput::Nothing => {}
        DirectiveOutput::Placeholder(text) => {
            out.push_str(&format!("{indent}``{text}``\n"));
        }
        DirectiveOutput::Code { language, text } => {
            out.push_str(&format!("{indent}.. code-block:: {language}\n\n"));
            push_indented(out, indent, text);
        }
        DirectiveOutput::Transcript { commands, output } => {
            out.push_str(&format!("{indent}.. code-block:: none\n\n"));
            push_indented(out, indent, &commands.join("\n"));
            push_indented(out, indent, output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::toolchain::{ToolOverrides, Toolchain};
    use tempfile::TempDir;

    fn harness(dir: &Path) -> Harness {
        let tc = Toolchain::resolve(
            Language::Python,
            &ToolOverrides::from_pairs([("PYTHON", "sh")]),
        )
        .unwrap();
        Harness::new(tc, dir)
    }

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn directive_options_map_to_invocation() {
        let d = match &parse(".. xapianrunexample:: s\n   :args: a b\n   :shouldfail:\n   :cleanfirst: db\n")[0] {
            Block::Directive(d) => d.clone(),
            Block::Text(_) => panic!("not a directive"),
        };
        let inv = invocation(&d);
        assert_eq!(inv.example, "s");
        assert_eq!(inv.args, "a b");
        assert!(inv.should_fail);
        assert!(!inv.silent);
        assert_eq!(inv.clean_first.as_deref(), Some("db"));
    }

    #[test]
    fn renders_show_and_run() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "code/python/hello.py",
            "# Start of example code\necho 'Hello, world!'\n# End of example code\n",
        );
        write(dir.path(), "code/python/hello.py.out", "Hello, world!\n");
        let mut h = harness(dir.path());

        let doc = "Hello\n=====\n\n.. xapianexample:: hello\n\nSee :xapian-code-example:`^`.\n\n.. xapianrunexample:: hello\n";
        let out = process(&mut h, Path::new("hello.rst"), doc, &SourceLinks::new("https://x/")).unwrap();
        assert_eq!(
            out,
            "Hello\n=====\n\n\
             .. code-block:: python\n\n   echo 'Hello, world!'\n\n\
             See `code/python/hello.py <https://x/code/python/hello.py>`__.\n\n\
             .. code-block:: none\n\n   $ python2 code/python/hello.py\n   Hello, world!\n"
        );
        assert_eq!(h.document_errors(), 0);
    }

    #[test]
    fn missing_example_renders_placeholder() {
        let dir = TempDir::new().unwrap();
        let mut h = harness(dir.path());
        let out = process(
            &mut h,
            Path::new("a.rst"),
            ".. xapianexample:: feature_x\n",
            &SourceLinks::default(),
        )
        .unwrap();
        assert_eq!(
            out,
            "``No version of example feature_x in language python - patches welcome!``\n"
        );
    }

    #[test]
    fn basename_role() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path());
        let line = expand_roles(
            &h,
            &SourceLinks::new("https://h"),
            "in :xapian-basename-code-example:`search1` we",
        );
        assert_eq!(line, "in `search1.py <https://h/code/python/search1.py>`__ we");
    }

    #[test]
    fn repository_path_roles() {
        let dir = TempDir::new().unwrap();
        let h = harness(dir.path());
        let links = SourceLinks::new("https://h");
        assert_eq!(
            expand_roles(&h, &links, "see :xapian-example:`code/expand.stopwords`."),
            "see `code/expand.stopwords <https://h/code/expand.stopwords>`__."
        );
        assert_eq!(
            expand_roles(&h, &links, ":xapian-basename-example:`code/python/support.py`"),
            "`support.py <https://h/code/python/support.py>`__"
        );
        // `^` is only meaningful for example ids.
        assert_eq!(
            expand_roles(&h, &links, ":xapian-example:`^`"),
            "`^ <https://h/^>`__"
        );
    }

    #[test]
    fn includes_substitute_language() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "docs/langs/python/intro.rst",
            "Python specific.\n\n.. xapiancodesnippet:: python\n\n   import xapian\n",
        );
        write(dir.path(), "docs/langs/tcl/intro.rst", "Tcl specific.\n");
        let mut h = harness(dir.path());
        let doc_path = dir.path().join("docs/index.rst");
        let out = process(
            &mut h,
            &doc_path,
            ".. xapianinclude:: langs/LANGUAGE/intro.rst\n",
            &SourceLinks::default(),
        )
        .unwrap();
        assert_eq!(
            out,
            "Python specific.\n\n.. code-block:: python\n\n   import xapian\n"
        );
    }

    #[test]
    fn missing_include_is_a_document_error() {
        let dir = TempDir::new().unwrap();
        let mut h = harness(dir.path());
        process(
            &mut h,
            &dir.path().join("index.rst"),
            ".. xapianinclude:: nope/LANGUAGE.rst\n",
            &SourceLinks::default(),
        )
        .unwrap();
        assert_eq!(h.document_errors(), 1);
    }

    #[test]
    fn self_include_stops_at_depth_limit() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "loop.rst", ".. xapianinclude:: loop.rst\n");
        let mut h = harness(dir.path());
        process(
            &mut h,
            &dir.path().join("index.rst"),
            ".. xapianinclude:: loop.rst\n",
            &SourceLinks::default(),
        )
        .unwrap();
        assert_eq!(h.document_errors(), 1);
    }
}
