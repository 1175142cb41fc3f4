//! The closed set of documented languages and their per-language data.

use crate::error::ConfigError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A toolchain executable that may be overridden from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    /// Environment variable holding the override.
    pub env: &'static str,
    /// Executable used when the variable is unset.
    pub default: &'static str,
}

/// How an example gets from source to a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStyle {
    /// Run the source directly with the interpreter (one tool).
    Interpreted,
    /// Compile with the C++ compiler, flags from the config tool.
    Cxx,
    /// Compile to `<id>.exe` with the C# compiler.
    CSharp,
    /// `javac` then `java`.
    Java,
}

/// Template data carried by each language.
#[derive(Debug)]
pub struct LanguageSpec {
    pub name: &'static str,
    pub extension: &'static str,
    pub tools: &'static [Tool],
    pub style: BuildStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    Cxx,
    CSharp,
    Java,
    Lua,
    Perl,
    Php,
    Python,
    Python3,
    Ruby,
    Tcl,
}

const fn interpreted(
    name: &'static str,
    extension: &'static str,
    tools: &'static [Tool],
) -> LanguageSpec {
    LanguageSpec {
        name,
        extension,
        tools,
        style: BuildStyle::Interpreted,
    }
}

static CXX: LanguageSpec = LanguageSpec {
    name: "c++",
    extension: ".cc",
    tools: &[
        Tool { env: "CXX", default: "g++" },
        Tool { env: "XAPIAN_CONFIG", default: "xapian-config" },
    ],
    style: BuildStyle::Cxx,
};
static CSHARP: LanguageSpec = LanguageSpec {
    name: "csharp",
    extension: ".cs",
    tools: &[Tool { env: "CSC", default: "cli-csc" }],
    style: BuildStyle::CSharp,
};
static JAVA: LanguageSpec = LanguageSpec {
    name: "java",
    extension: ".java",
    tools: &[
        Tool { env: "JAVAC", default: "javac" },
        Tool { env: "JAVA", default: "java" },
    ],
    style: BuildStyle::Java,
};
static LUA: LanguageSpec = interpreted("lua", ".lua", &[Tool { env: "LUA", default: "lua" }]);
static PERL: LanguageSpec = interpreted("perl", ".pl", &[Tool { env: "PERL", default: "perl" }]);
static PHP: LanguageSpec = interpreted("php", ".php", &[Tool { env: "PHP", default: "php" }]);
static PYTHON: LanguageSpec =
    interpreted("python", ".py", &[Tool { env: "PYTHON", default: "python2" }]);
static PYTHON3: LanguageSpec =
    interpreted("python3", ".py", &[Tool { env: "PYTHON3", default: "python3" }]);
static RUBY: LanguageSpec = interpreted("ruby", ".rb", &[Tool { env: "RUBY", default: "ruby" }]);
static TCL: LanguageSpec = interpreted("tcl", ".tcl", &[Tool { env: "TCLSH", default: "tclsh" }]);

impl Language {
    pub const ALL: [Language; 10] = [
        Language::Cxx,
        Language::CSharp,
        Language::Java,
        Language::Lua,
        Language::Perl,
        Language::Php,
        Language::Python,
        Language::Python3,
        Language::Ruby,
        Language::Tcl,
    ];

    pub fn spec(self) -> &'static LanguageSpec {
        match self {
            Language::Cxx => &CXX,
            Language::CSharp => &CSHARP,
            Language::Java => &JAVA,
            Language::Lua => &LUA,
            Language::Perl => &PERL,
            Language::Php => &PHP,
            Language::Python => &PYTHON,
            Language::Python3 => &PYTHON3,
            Language::Ruby => &RUBY,
            Language::Tcl => &TCL,
        }
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn extension(self) -> &'static str {
        self.spec().extension
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|l| l.name()).collect()
    }

    /// Source of an example: `code/<language>/<id><ext>`.
    pub fn source_path(self, example: &str) -> PathBuf {
        PathBuf::from(format!("code/{}/{}{}", self.name(), example, self.extension()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.name() == s)
            .ok_or_else(|| ConfigError::UnknownLanguage(s.to_string()))
    }
}
