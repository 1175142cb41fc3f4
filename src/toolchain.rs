//! Per-language build and run commands.
//!
//! Tool names are resolved once, from the environment, into a [`Toolchain`].
//! After that, [`Toolchain::build_command`] and [`Toolchain::run_command`]
//! are pure functions of the example id.

use crate::error::ConfigError;
use crate::language::{BuildStyle, Language, Tool};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

/// Anything outside `[-/_+.A-Za-z0-9]` disqualifies a tool override.
static RE_UNSAFE_TOOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^-/_+.A-Za-z0-9]").unwrap());

const DEFAULT_XAPIAN_CONFIG: &str = "xapian-config";
const CXX_SUPPORT_SOURCE: &str = "code/c++/support.cc";
const JAVA_CLASS_DIR: &str = "code/java";
/// Search path for the Java bindings, inherited by both `javac` and `java`.
const CLASSPATH_VAR: &str = "CLASSPATH";

/// Environment overrides for toolchain executables, keyed by variable name.
#[derive(Debug, Clone, Default)]
pub struct ToolOverrides {
    vars: HashMap<String, String>,
}

impl ToolOverrides {
    /// Snapshot every override variable any language knows about.
    pub fn from_env() -> Self {
        let vars = Language::ALL
            .iter()
            .flat_map(|l| l.spec().tools.iter().map(|t| t.env))
            .chain([CLASSPATH_VAR])
            .filter_map(|var| std::env::var(var).ok().map(|v| (var.to_string(), v)))
            .collect();
        Self { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The inherited Java class path, if any.
    pub fn class_path(&self) -> Option<&str> {
        self.vars
            .get(CLASSPATH_VAR)
            .map(String::as_str)
            .filter(|cp| !cp.is_empty())
    }

    /// The executable for `tool`, validated against the safe character set.
    pub fn tool_name(&self, tool: &Tool) -> Result<String, ConfigError> {
        let name = self
            .vars
            .get(tool.env)
            .map(String::as_str)
            .unwrap_or(tool.default);
        if RE_UNSAFE_TOOL.is_match(name) {
            return Err(ConfigError::UnsafeTool {
                var: tool.env,
                value: name.to_string(),
            });
        }
        Ok(name.to_string())
    }
}

/// A program plus its argument vector. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn to_command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(workdir);
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Compiler and linker flags reported by `xapian-config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CxxFlags {
    pub cxxflags: Vec<String>,
    pub libs: Vec<String>,
    /// Link through `libtool --mode=link` using `--ltlibs`.
    pub libtool: bool,
}

impl CxxFlags {
    /// Query `config_tool` for flags.
    ///
    /// A non-default tool outside `/usr/` must answer `--ltlibs`; when its
    /// `--libs` fails (an uninstalled build tree) linking goes through the
    /// libtool wrapper instead.
    pub fn probe(config_tool: &str) -> Result<Self, ConfigError> {
        let mut libtool = false;
        if config_tool != DEFAULT_XAPIAN_CONFIG && !config_tool.starts_with("/usr/") {
            if !probe_succeeds(config_tool, "--ltlibs") {
                return Err(ConfigError::ToolProbe {
                    tool: config_tool.to_string(),
                    option: "--ltlibs",
                });
            }
            if !probe_succeeds(config_tool, "--libs") {
                tracing::debug!(tool = config_tool, "--libs failed, linking with libtool");
                libtool = true;
            }
        }
        let link_option = if libtool { "--ltlibs" } else { "--libs" };
        Ok(Self {
            cxxflags: capture_words(config_tool, "--cxxflags")?,
            libs: capture_words(config_tool, link_option)?,
            libtool,
        })
    }
}

fn probe_succeeds(tool: &str, option: &str) -> bool {
    Command::new(tool)
        .arg(option)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn capture_words(tool: &str, option: &'static str) -> Result<Vec<String>, ConfigError> {
    let probe_error = || ConfigError::ToolProbe {
        tool: tool.to_string(),
        option,
    };
    let output = Command::new(tool)
        .arg(option)
        .stderr(Stdio::inherit())
        .output()
        .map_err(|_| probe_error())?;
    if !output.status.success() {
        return Err(probe_error());
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .map(str::to_string)
        .collect())
}

/// Resolved executables for one language.
#[derive(Debug, Clone)]
pub struct Toolchain {
    language: Language,
    /// One entry per [`LanguageSpec::tools`](crate::language::LanguageSpec), same order.
    tools: Vec<String>,
    cxx: Option<CxxFlags>,
    /// Class path handed to `java`: the compiled examples, then `$CLASSPATH`.
    class_path: String,
}

impl Toolchain {
    /// Validate overrides and, for C++, query the config tool.
    ///
    /// Validation of every tool name happens before any process is spawned.
    pub fn resolve(language: Language, overrides: &ToolOverrides) -> Result<Self, ConfigError> {
        let tools = language
            .spec()
            .tools
            .iter()
            .map(|t| overrides.tool_name(t))
            .collect::<Result<Vec<_>, _>>()?;
        let cxx = match language.spec().style {
            BuildStyle::Cxx => Some(CxxFlags::probe(&tools[1])?),
            _ => None,
        };
        Ok(Self {
            language,
            tools,
            cxx,
            class_path: java_class_path(overrides.class_path()),
        })
    }

    /// Build a toolchain from already-known parts, skipping the probe.
    pub fn with_tools(language: Language, tools: Vec<String>, cxx: Option<CxxFlags>) -> Self {
        Self {
            language,
            tools,
            cxx,
            class_path: java_class_path(None),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    fn tool(&self, index: usize) -> &str {
        self.tools
            .get(index)
            .map(String::as_str)
            .unwrap_or_else(|| self.language.spec().tools[index].default)
    }

    /// The compile step, or `None` for interpreted languages.
    pub fn build_command(&self, example: &str) -> Option<CommandLine> {
        let source = self.language.source_path(example).display().to_string();
        match self.language.spec().style {
            BuildStyle::Interpreted => None,
            BuildStyle::Cxx => {
                let flags = self.cxx.as_ref();
                let compile = CommandLine::new(self.tool(0))
                    .args(flags.map(|f| f.cxxflags.clone()).unwrap_or_default())
                    .arg(source)
                    .arg(CXX_SUPPORT_SOURCE)
                    .arg("-o")
                    .arg(format!("code/c++/{example}"))
                    .args(flags.map(|f| f.libs.clone()).unwrap_or_default());
                if flags.is_some_and(|f| f.libtool) {
                    Some(
                        CommandLine::new("libtool")
                            .arg("--quiet")
                            .arg("--mode=link")
                            .arg(compile.program)
                            .args(compile.args),
                    )
                } else {
                    Some(compile)
                }
            }
            BuildStyle::CSharp => Some(
                CommandLine::new(self.tool(0))
                    .arg("-unsafe")
                    .arg("-target:exe")
                    .arg(format!("-out:{example}.exe"))
                    .arg(source)
                    .arg("-r:XapianSharp.dll"),
            ),
            BuildStyle::Java => Some(CommandLine::new(self.tool(0)).arg(source)),
        }
    }

    /// The command that runs the example, before any example arguments.
    pub fn run_command(&self, example: &str) -> CommandLine {
        match self.language.spec().style {
            BuildStyle::Interpreted => CommandLine::new(self.tool(0))
                .arg(self.language.source_path(example).display().to_string()),
            BuildStyle::Cxx => CommandLine::new(format!("code/c++/{example}")),
            BuildStyle::CSharp => CommandLine::new(format!("./{example}.exe")),
            BuildStyle::Java => CommandLine::new(self.tool(1))
                .arg("-classpath")
                .arg(self.class_path.as_str())
                .arg(example),
        }
    }
}

/// `-classpath` replaces `$CLASSPATH` for the JVM, so the inherited entries
/// are appended after the example class directory.
fn java_class_path(inherited: Option<&str>) -> String {
    let separator = if cfg!(windows) { ';' } else { ':' };
    match inherited {
        Some(cp) => format!("{JAVA_CLASS_DIR}{separator}{cp}"),
        None => JAVA_CLASS_DIR.to_string(),
    }
}

/// The command text shown to readers, one shell line per step.
///
/// Uses the stock tool names regardless of any local overrides.
pub fn display_command(language: Language, example: &str) -> String {
    let source = language.source_path(example).display().to_string();
    match language.spec().style {
        BuildStyle::Interpreted => format!("{} {}", language.spec().tools[0].default, source),
        BuildStyle::Cxx => format!(
            "g++ `xapian-config --cxxflags` {source} support.cc -o {example} `xapian-config --libs`\n./{example}"
        ),
        BuildStyle::CSharp => format!(
            "cli-csc -unsafe -target:exe -out:{example}.exe {source} -r:XapianSharp.dll\n./{example}.exe"
        ),
        BuildStyle::Java => format!("javac {source}\njava {example}"),
    }
}
