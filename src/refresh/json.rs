//! JSON helpers for parsing model output.

use anyhow::Result;

/// Remove a Markdown code fence wrapped around a model reply, if present.
///
/// Handles both ```` ```json ```` and bare ```` ``` ```` openers. Text without a
/// fence is returned trimmed and otherwise unchanged.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse JSON and, on failure, report the serde path, the type mismatch and a
/// snippet of the offending line.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    match serde_path_to_error::deserialize(jd) {
        Ok(value) => Ok(value),
        Err(err) => {
            let inner_err = err.inner();
            let (line, column) = (inner_err.line(), inner_err.column());
            let path = err.path().to_string();

            let msg = inner_err.to_string();
            let loc = format!(" at line {line} column {column}");
            let msg_without_loc = msg.strip_suffix(&loc).unwrap_or(&msg);

            let mut final_err = String::new();
            if !path.is_empty() && path != "." {
                final_err.push_str(&format!("at path '{path}': "));
            }
            final_err.push_str(&format!(
                "{} (line {line} col {column})\n{}",
                describe_mismatch(msg_without_loc),
                error_snippet(body, line, column, 20)
            ));

            Err(anyhow::anyhow!(final_err))
        }
    }
}

/// Rewrite `invalid type: X, expected Y` into `expected Y, got X`.
fn describe_mismatch(error_msg: &str) -> String {
    if let Some(after_prefix) = error_msg.strip_prefix("invalid type: ")
        && let Some((actual, expected)) = after_prefix.split_once(", expected ")
    {
        return format!("expected {expected}, got {actual}");
    }
    error_msg.to_string()
}

fn error_snippet(body: &str, line: usize, column: usize, context_len: usize) -> String {
    let target_line = body.lines().nth(line.saturating_sub(1)).unwrap_or("");
    if target_line.is_empty() {
        return "(empty line)".to_string();
    }

    // Work in chars so multi-byte text never splits mid-codepoint.
    let chars: Vec<char> = target_line.chars().collect();
    let error_idx = column.saturating_sub(1).min(chars.len());
    let half_len = context_len / 2;
    let start = error_idx.saturating_sub(half_len);
    let end = (error_idx + half_len).min(chars.len());

    let slice: String = chars[start..end].iter().collect();
    let indicator = " ".repeat(error_idx - start) + "^";

    format!("...{slice}...\n   {indicator}")
}
