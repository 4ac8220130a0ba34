//! Snippet preparation and template region splicing

use crate::error::CompileError;

/// Marker opening the script region inside a template
pub const REGION_START: &str = "#region Script";
/// Marker closing the script region
pub const REGION_END: &str = "#endregion";

const TERMINATOR: char = ';';

/// Trim the raw snippet and make sure it ends with a statement terminator
pub fn prepare_snippet(snippet: &str) -> Result<String, CompileError> {
    let snippet = snippet.trim();
    if snippet.is_empty() {
        return Err(CompileError::MissingScript);
    }

    let mut prepared = snippet.to_string();
    if !prepared.ends_with(TERMINATOR) {
        prepared.push(TERMINATOR);
    }
    Ok(prepared)
}

/// Replace the script region of `template` with `code`
///
/// Everything between the two markers is dropped. Code lines are indented
/// like the line holding the end marker, and that line keeps its original
/// prefix so a marker written inside a line comment stays commented.
pub fn splice(template: &str, code: &str) -> Result<String, CompileError> {
    if template.trim().is_empty() {
        return Err(CompileError::InvalidTemplate);
    }

    let start = template
        .find(REGION_START)
        .ok_or(CompileError::InvalidTemplate)?;
    let body = start + REGION_START.len();
    let end = template[body..]
        .find(REGION_END)
        .map(|offset| body + offset)
        .ok_or(CompileError::InvalidTemplate)?;

    let line_start = template[..end].rfind('\n').map_or(0, |newline| newline + 1);
    let prefix = &template[line_start..end];
    let indent = &prefix[..prefix.len() - prefix.trim_start().len()];

    let mut spliced = String::with_capacity(template.len() + code.len() + 64);
    spliced.push_str(&template[..start]);
    spliced.push_str(REGION_START);
    spliced.push_str("\n\n");
    for line in code.lines() {
        if !line.trim().is_empty() {
            spliced.push_str(indent);
        }
        spliced.push_str(line);
        spliced.push('\n');
    }
    spliced.push_str(prefix);
    spliced.push_str(REGION_END);
    spliced.push_str(&template[end + REGION_END.len()..]);

    Ok(spliced)
}
