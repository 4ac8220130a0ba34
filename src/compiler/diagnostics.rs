//! Conversion of engine exceptions into structured diagnostics

use rquickjs::{CaughtError, Exception};

use crate::error::{Diagnostic, SourceLocation};

const CONTEXT_LIMIT: usize = 100;

/// Build a diagnostic from an error caught while compiling `source`
pub(crate) fn from_caught(caught: CaughtError<'_>, unit_name: &str, source: &str) -> Diagnostic {
    let context = leading_comment(source);

    match caught {
        CaughtError::Exception(exception) => Diagnostic {
            code: exception
                .get::<_, Option<String>>("name")
                .ok()
                .flatten()
                .unwrap_or_else(|| "Error".to_string()),
            message: exception
                .message()
                .unwrap_or_else(|| "unknown error".to_string()),
            location: exception_location(&exception, unit_name, source),
            context,
        },
        CaughtError::Value(value) => Diagnostic {
            message: format!("non-error value thrown: {:?}", value.type_of()),
            code: "Error".to_string(),
            location: None,
            context,
        },
        CaughtError::Error(error) => Diagnostic {
            message: error.to_string(),
            code: "EngineError".to_string(),
            location: None,
            context,
        },
    }
}

/// Line reported by the engine, column recovered from the source
///
/// The engine's `columnNumber` for syntax errors does not point at the
/// offending token, so only its line is kept.
fn exception_location(
    exception: &Exception<'_>,
    unit_name: &str,
    source: &str,
) -> Option<SourceLocation> {
    let line = exception
        .get::<_, Option<u32>>("lineNumber")
        .ok()
        .flatten()
        .filter(|line| *line > 0)
        .or_else(|| {
            exception
                .stack()
                .and_then(|stack| stack_location(&stack, unit_name))
                .map(|location| location.line)
        })?;

    let message = exception.message().unwrap_or_default();
    locate(source, line, &message)
}

/// Position on `line` of the token named by `message`
///
/// Messages of the form `unexpected token ...: 'tok'` point at the first
/// occurrence of `tok` on the line. Otherwise the column is that of the
/// first non-blank character. Lines outside `source` give `None`.
pub(crate) fn locate(source: &str, line: u32, message: &str) -> Option<SourceLocation> {
    let text = source.lines().nth((line as usize).checked_sub(1)?)?;

    let offset = offending_token(message)
        .and_then(|token| text.find(token))
        .or_else(|| text.find(|c: char| !c.is_whitespace()))
        .unwrap_or(0);
    let column = text[..offset].chars().count() as u32 + 1;

    Some(SourceLocation { line, column })
}

/// The quoted token of an `unexpected token` message
fn offending_token(message: &str) -> Option<&str> {
    if !message.contains("unexpected token") {
        return None;
    }
    let end = message.rfind('\'')?;
    let start = message[..end].rfind('\'')? + 1;
    let token = &message[start..end];
    (!token.is_empty()).then_some(token)
}

/// First `unit:line[:column]` frame of a stack trace
///
/// Frames look like `at unit:12:5` or `at evaluate (unit:12:5)`. A frame
/// without a column is reported at column 1.
pub(crate) fn stack_location(stack: &str, unit_name: &str) -> Option<SourceLocation> {
    let needle = format!("{}:", unit_name);

    stack.lines().find_map(|frame| {
        let position = frame.find(&needle)? + needle.len();
        let mut parts = frame[position..]
            .trim_end_matches(')')
            .trim_end()
            .split(':');
        let line = parts.next()?.parse().ok()?;
        let column = parts
            .next()
            .and_then(|column| column.parse().ok())
            .unwrap_or(1);
        Some(SourceLocation { line, column })
    })
}

/// The first block comment of `source`, truncated for display
pub(crate) fn leading_comment(source: &str) -> Option<String> {
    let start = source.find("/*")?;
    let end = source[start..].find("*/")? + start;
    let comment = &source[start..end + 2];

    if comment.chars().count() > CONTEXT_LIMIT {
        let truncated: String = comment.chars().take(CONTEXT_LIMIT).collect();
        Some(format!("{}...", truncated))
    } else {
        Some(comment.to_string())
    }
}
