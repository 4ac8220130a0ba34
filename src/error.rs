use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::model::{RecordId, ScriptId};

/// Position of a diagnostic inside the composed source (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// A single error-severity diagnostic reported by the toolchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Engine message, e.g. "unexpected token in expression: ')'"
    pub message: String,
    /// Engine error name, e.g. "SyntaxError"
    pub code: String,
    /// Location in the composed source, when the engine reports one
    pub location: Option<SourceLocation>,
    /// Leading block comment of the source, truncated
    pub context: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}", self.message, self.code)?;
        if let Some(location) = self.location {
            write!(f, ": Line {}, Column {}", location.line, location.column)?;
        }
        if let Some(context) = &self.context {
            write!(f, ", {}", context)?;
        }
        write!(f, "]")
    }
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Failures raised while turning a snippet into an artifact
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("missing script")]
    MissingScript,

    #[error("invalid template")]
    InvalidTemplate,

    #[error("invalid language version: {0}")]
    InvalidLanguageVersion(String),

    #[error("{}", join_diagnostics(.0))]
    Diagnostics(Vec<Diagnostic>),

    #[error("toolchain failure: {0}")]
    Toolchain(String),
}

impl CompileError {
    /// Structured diagnostics, empty for non-diagnostic failures
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Diagnostics(diagnostics) => diagnostics,
            _ => &[],
        }
    }
}

/// Failures of the compile/cache/execute pipeline
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("script {script_id} has no compiled binary")]
    MissingBinary { script_id: ScriptId },

    #[error("module load failed: {0}")]
    Load(String),

    #[error("evaluation error in record {record_id}: {message}")]
    Evaluation { record_id: RecordId, message: String },

    #[error("evaluation of record {record_id} timed out after {deadline:?}")]
    Timeout {
        record_id: RecordId,
        deadline: Duration,
    },

    #[error("repository error: {0}")]
    Repository(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ScriptError {
    /// Record the failure belongs to, for evaluation-scoped errors
    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            ScriptError::Evaluation { record_id, .. } | ScriptError::Timeout { record_id, .. } => {
                Some(*record_id)
            }
            _ => None,
        }
    }
}

/// Non-fatal module cache failures; logged and swallowed by the cache
#[derive(Error, Debug)]
pub(crate) enum CacheError {
    #[error("entry for {consumer}/{hash} was inserted concurrently")]
    InsertRace { consumer: &'static str, hash: i32 },

    #[error("entry for {consumer}/{hash} holds a different binary")]
    HashCollision { consumer: &'static str, hash: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic {
            message: "unexpected token".to_string(),
            code: "SyntaxError".to_string(),
            location: Some(SourceLocation { line: 3, column: 7 }),
            context: Some("/* StockQuoteFunction */".to_string()),
        };
        assert_eq!(
            diagnostic.to_string(),
            "unexpected token [SyntaxError: Line 3, Column 7, /* StockQuoteFunction */]"
        );
    }

    #[test]
    fn test_compile_error_joins_diagnostics() {
        let error = CompileError::Diagnostics(vec![
            Diagnostic {
                message: "first".to_string(),
                code: "SyntaxError".to_string(),
                location: None,
                context: None,
            },
            Diagnostic {
                message: "second".to_string(),
                code: "SyntaxError".to_string(),
                location: None,
                context: None,
            },
        ]);
        assert_eq!(error.to_string(), "first [SyntaxError]\nsecond [SyntaxError]");
        assert_eq!(error.diagnostics().len(), 2);
    }

    #[test]
    fn test_record_id_of_evaluation_errors() {
        let error = ScriptError::Timeout {
            record_id: 7,
            deadline: Duration::from_millis(10),
        };
        assert_eq!(error.record_id(), Some(7));
        assert_eq!(ScriptError::MissingBinary { script_id: 1 }.record_id(), None);
    }
}
