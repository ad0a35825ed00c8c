//! The external script compiler and the errors it produces.
//!
//! A [`Compiler`] is deliberately `&mut self`: adapters may wrap engines that
//! cannot be re-entered, so each worker owns its own instance and hands it to
//! the cache explicitly.

use regex::Regex;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use thiserror::Error;

use crate::source::SourceError;

static LINE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"line ([0-9]+)").expect("valid line number pattern"));

/// Raw failure reported by a compiler adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileFailure {
    pub message: String,
}

impl CompileFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The line number that the failure happened on, or 0 if not found in the message
    pub fn line_number(&self) -> u32 {
        line_number(&self.message)
    }
}

/// First `line N` in a compiler message, or 0
pub fn line_number(message: &str) -> u32 {
    LINE_NUMBER
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Translates script source into its compiled output
pub trait Compiler {
    fn compile(&mut self, source: &str) -> Result<String, CompileFailure>;
}

impl<C: Compiler + ?Sized> Compiler for Box<C> {
    fn compile(&mut self, source: &str) -> Result<String, CompileFailure> {
        (**self).compile(source)
    }
}

/// Runs an external command with the source on stdin and reads the output from stdout
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    program: String,
    args: Vec<String>,
}

impl ProcessCompiler {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `coffee --stdio --print --bare`
    pub fn coffee() -> Self {
        Self::new(
            "coffee",
            vec![
                "--stdio".to_string(),
                "--print".to_string(),
                "--bare".to_string(),
            ],
        )
    }
}

impl Compiler for ProcessCompiler {
    fn compile(&mut self, source: &str) -> Result<String, CompileFailure> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CompileFailure::new(format!("Failed to start {}: {}", self.program, e)))?;

        // Feed stdin from a separate thread so a chatty child can't deadlock on a full pipe
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CompileFailure::new("Compiler stdin unavailable"))?;
        let input = source.to_string();
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .map_err(|e| CompileFailure::new(format!("Compiler {} failed: {}", self.program, e)))?;

        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => {
                return Err(CompileFailure::new(format!(
                    "Failed to write to {}: {}",
                    self.program, e
                )))
            }
            Err(_) => return Err(CompileFailure::new("Compiler input thread panicked")),
        }

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim();
            if message.is_empty() {
                Err(CompileFailure::new(format!(
                    "{} exited with {}",
                    self.program, output.status
                )))
            } else {
                Err(CompileFailure::new(message))
            }
        }
    }
}

/// Returns the source unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompiler;

impl Compiler for PassthroughCompiler {
    fn compile(&mut self, source: &str) -> Result<String, CompileFailure> {
        Ok(source.to_string())
    }
}

/// Why a cached compilation produced no output
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("The file {path} could not be compiled.\nError raised is : {message}")]
    Syntax {
        path: String,
        message: String,
        /// 1-based, 0 when the compiler didn't say
        line: u32,
        source_text: String,
    },

    #[error("Source for {path} unavailable: {message}")]
    Source { path: String, message: String },

    #[error("Compilation of {path} was abandoned")]
    Abandoned { path: String },
}

impl CompileError {
    pub fn syntax(path: &str, source: String, failure: CompileFailure) -> Self {
        CompileError::Syntax {
            path: path.to_string(),
            line: failure.line_number(),
            message: failure.message,
            source_text: source,
        }
    }

    pub fn from_source(path: &str, error: &SourceError) -> Self {
        CompileError::Source {
            path: path.to_string(),
            message: error.to_string(),
        }
    }

    pub fn title(&self) -> &'static str {
        "Compilation error"
    }

    pub fn path(&self) -> &str {
        match self {
            CompileError::Syntax { path, .. }
            | CompileError::Source { path, .. }
            | CompileError::Abandoned { path } => path,
        }
    }

    /// Offending line, 0 when unknown
    pub fn line_number(&self) -> u32 {
        match self {
            CompileError::Syntax { line, .. } => *line,
            _ => 0,
        }
    }

    /// Path, message and the marked-up source, ready to show to a person
    pub fn description(&self) -> String {
        let display = self.source_display();
        if display.is_empty() {
            self.to_string()
        } else {
            format!("{}\n{}", self, display.join("\n"))
        }
    }

    /// Numbered source lines with the failing line flagged by `>` and a caret
    /// line under it; empty when there is no source to show
    pub fn source_display(&self) -> Vec<String> {
        let CompileError::Syntax {
            source_text, line, ..
        } = self
        else {
            return Vec::new();
        };

        let lines: Vec<&str> = source_text.lines().collect();
        let width = lines.len().to_string().len();
        let mut display = Vec::with_capacity(lines.len() + 1);

        for (i, text) in lines.iter().enumerate() {
            let number = i + 1;
            let marker = if number == *line as usize { '>' } else { ' ' };
            display.push(format!("{} {:>width$} | {}", marker, number, text, width = width));

            if number == *line as usize {
                let indent = text.len() - text.trim_start().len();
                display.push(format!(
                    "  {:>width$} | {}^",
                    "",
                    " ".repeat(indent),
                    width = width
                ));
            }
        }

        display
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_number_extraction() {
        assert_eq!(line_number("Parse error on line 3: Unexpected 'INDENT'"), 3);
        assert_eq!(line_number("error on line 12, then line 40"), 12);
        assert_eq!(line_number("unexpected end of input"), 0);
    }

    #[test]
    fn test_passthrough() {
        let mut compiler = PassthroughCompiler;
        assert_eq!(compiler.compile("x = 1").unwrap(), "x = 1");
    }

    #[test]
    fn test_syntax_error_fields() {
        let failure = CompileFailure::new("Parse error on line 2: Unexpected 'TERMINATOR'");
        let err = CompileError::syntax("/js/app.js", "a = 1\nb = )\n".to_string(), failure);

        assert_eq!(err.path(), "/js/app.js");
        assert_eq!(err.line_number(), 2);
        assert_eq!(err.title(), "Compilation error");
        assert!(err.to_string().contains("/js/app.js"));
        assert!(err.to_string().contains("Unexpected 'TERMINATOR'"));
    }

    #[test]
    fn test_source_display_marks_failing_line() {
        let failure = CompileFailure::new("error on line 2");
        let source = "a = 1\n  b = )\nc = 3".to_string();
        let err = CompileError::syntax("app.coffee", source, failure);

        assert_eq!(
            err.source_display(),
            vec![
                "  1 | a = 1".to_string(),
                "> 2 |   b = )".to_string(),
                "    |   ^".to_string(),
                "  3 | c = 3".to_string(),
            ]
        );
        assert!(err.description().ends_with("  3 | c = 3"));
    }

    #[test]
    fn test_source_display_without_line() {
        let err = CompileError::syntax("app.coffee", "a\nb".to_string(), CompileFailure::new("bad"));
        assert_eq!(err.source_display(), vec!["  1 | a", "  2 | b"]);
    }

    #[test]
    fn test_non_syntax_errors_have_no_display() {
        let err = CompileError::Abandoned {
            path: "app.coffee".to_string(),
        };
        assert!(err.source_display().is_empty());
        assert_eq!(err.line_number(), 0);
        assert_eq!(err.description(), "Compilation of app.coffee was abandoned");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_compiler_round_trip() {
        let mut compiler = ProcessCompiler::new("cat", vec![]);
        assert_eq!(compiler.compile("class Animal\n").unwrap(), "class Animal\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_process_compiler_failure_uses_stderr() {
        let mut compiler = ProcessCompiler::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo 'Parse error on line 7' >&2; exit 1".to_string(),
            ],
        );
        let failure = compiler.compile("x").unwrap_err();
        assert_eq!(failure.message, "Parse error on line 7");
        assert_eq!(failure.line_number(), 7);
    }

    #[test]
    fn test_process_compiler_missing_program() {
        let mut compiler = ProcessCompiler::new("percolate-no-such-compiler", vec![]);
        let failure = compiler.compile("x").unwrap_err();
        assert!(failure.message.contains("Failed to start"));
    }
}
