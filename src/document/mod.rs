//! reStructuredText scanning for the example directives.
//!
//! Only the harness directives are recognised; every other line is passed
//! through untouched as text.
//!
//! ```rst
//! .. xapianexample:: search1
//!    :marker: query
//!
//! .. xapianrunexample:: search1
//!    :args: db "title:search"
//!    :cleanfirst: db
//! ```

pub mod render;

use regex::Regex;
use std::sync::LazyLock;

static RE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([ \t]*)\.\.[ \t]+(xapianexample|xapianrunexample|xapiancodesnippet|xapianinclude)::[ \t]*(.*?)[ \t]*$",
    )
    .unwrap()
});

static RE_OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]+:([A-Za-z][\w-]*):(?:[ \t]+(.*?))?[ \t]*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// `xapianexample`: show an example's source.
    ShowExample,
    /// `xapianrunexample`: run an example and show its output.
    RunExample,
    /// `xapiancodesnippet`: literal code for one language only.
    CodeSnippet,
    /// `xapianinclude`: include a per-language file.
    Include,
}

impl DirectiveKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "xapianexample" => Some(Self::ShowExample),
            "xapianrunexample" => Some(Self::RunExample),
            "xapiancodesnippet" => Some(Self::CodeSnippet),
            "xapianinclude" => Some(Self::Include),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub argument: String,
    /// In source order; flag options have an empty value.
    pub options: Vec<(String, String)>,
    /// Body lines with the common indentation removed.
    pub content: Vec<String>,
    /// Indentation of the `..` line, reused for the rendered output.
    pub indent: String,
    /// 1-based line of the `..` marker.
    pub line: usize,
}

impl Directive {
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_option(&self, name: &str) -> bool {
        self.option(name).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Text(String),
    Directive(Directive),
}

fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Split a document into text lines and harness directives.
pub fn parse(content: &str) -> Vec<Block> {
    let lines: Vec<&str> = content.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(caps) = RE_DIRECTIVE.captures(lines[i]) else {
            blocks.push(Block::Text(lines[i].to_string()));
            i += 1;
            continue;
        };
        let indent = caps[1].to_string();
        let base = indent.len();
        let Some(kind) = DirectiveKind::from_name(&caps[2]) else {
            // Unreachable with the current pattern
            blocks.push(Block::Text(lines[i].to_string()));
            i += 1;
            continue;
        };
        let line = i + 1;
        let argument = caps[3].to_string();
        i += 1;

        let mut options = Vec::new();
        while i < lines.len() && indent_width(lines[i]) > base {
            let Some(opt) = RE_OPTION.captures(lines[i]) else {
                break;
            };
            options.push((
                opt[1].to_string(),
                opt.get(2).map_or(String::new(), |m| m.as_str().to_string()),
            ));
            i += 1;
        }

        // Body: everything blank or indented deeper than the directive.
        let start = i;
        while i < lines.len() && (is_blank(lines[i]) || indent_width(lines[i]) > base) {
            i += 1;
        }
        // Trailing blank lines belong to the surrounding text.
        let mut end = i;
        while end > start && is_blank(lines[end - 1]) {
            end -= 1;
        }
        i = end;

        let body = &lines[start..end];
        let first = body.iter().position(|l| !is_blank(l)).unwrap_or(body.len());
        let body = &body[first..];
        let strip = body
            .iter()
            .filter(|l| !is_blank(l))
            .map(|l| indent_width(l))
            .min()
            .unwrap_or(0);
        let content = body
            .iter()
            .map(|l| l.get(strip..).unwrap_or("").to_string())
            .collect();

        blocks.push(Block::Directive(Directive {
            kind,
            argument,
            options,
            content,
            indent,
            line,
        }));
    }
    blocks
}
