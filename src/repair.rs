//! Parsing and structural repair of model text output.
//!
//! Model responses are *expected* to be JSON but arrive as free-form text:
//! fenced, quoted sloppily, missing closers. The path here is fence strip →
//! strict parse → truncation short-circuit → one pass of ordered repair
//! rules → strict parse. Repair is deliberately conservative and only
//! touches the known syntactic failure classes; it never rewrites values.

use crate::error::StudioError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Remove a ``` / ```json wrapper if the model fenced its output.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(without_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match without_open.find('\n') {
        Some(idx) => &without_open[idx + 1..],
        None => without_open,
    };
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

struct ScanState {
    /// Expected closers for scopes still open at end of input, innermost last.
    stack: Vec<char>,
    /// End of input landed inside a string literal.
    in_string: bool,
}

/// String- and escape-aware bracket scan.
fn scan(s: &str) -> ScanState {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                // Tolerate mismatched or extra closers; they fail the
                // final parse instead.
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }
    ScanState { stack, in_string }
}

/// Detect output that was cut off mid-generation. Keys on the tail of the
/// text: an unterminated string, or a dangling `:` `,` `{` `[`. A clean
/// tail with unclosed scopes is left for the balancing rule instead —
/// appending closers there yields valid JSON, while "repairing" a
/// mid-token cut would fabricate plausible but wrong structure.
pub fn looks_truncated(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    if scan(s).in_string {
        return true;
    }
    matches!(
        s.trim_end().chars().last(),
        Some(':') | Some(',') | Some('{') | Some('[')
    )
}

static REPAIR_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        // Quote bare object keys: {name: -> {"name":
        (
            Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).unwrap(),
            r#"${1}"${2}":"#,
        ),
        // Single-quoted values after a colon: : 'x' -> : "x"
        (
            Regex::new(r#":\s*'((?:[^'\\]|\\.)*)'"#).unwrap(),
            r#": "${1}""#,
        ),
        // Trailing comma before a closer: ,] -> ] and ,} -> }
        (Regex::new(r#",(\s*[}\]])"#).unwrap(), "${1}"),
        // Missing comma between adjacent strings split across a newline.
        // Known limitation: this can also join two string values that
        // legitimately abut across a line break outside array context.
        (Regex::new(r#""([ \t]*\n\s*)""#).unwrap(), "\",${1}\""),
    ]
});

/// One pass of each repair rule in order, then close any scopes still open.
fn apply_repairs(s: &str) -> String {
    let mut out = s.to_string();
    for (pattern, rewrite) in REPAIR_RULES.iter() {
        out = pattern.replace_all(&out, *rewrite).into_owned();
    }
    let state = scan(&out);
    if !state.in_string {
        for close in state.stack.iter().rev() {
            out.push(*close);
        }
    }
    out
}

/// Parse raw model text into JSON, repairing the known syntactic failure
/// classes when a strict parse fails.
pub fn parse_model_json(raw: &str) -> Result<Value, StudioError> {
    let cleaned = strip_code_fences(raw);
    if let Ok(value) = serde_json::from_str(cleaned) {
        return Ok(value);
    }
    if looks_truncated(cleaned) {
        warn!(
            chars = cleaned.chars().count(),
            "model output looks truncated, not attempting repair"
        );
        return Err(StudioError::ResponseTruncated);
    }
    let repaired = apply_repairs(cleaned);
    debug!(
        before = cleaned.chars().count(),
        after = repaired.chars().count(),
        "strict parse failed, attempting structural repair"
    );
    serde_json::from_str(&repaired).map_err(|e| {
        warn!(error = %e, "auto-repair failed");
        StudioError::InvalidFormat(e.to_string())
    })
}
