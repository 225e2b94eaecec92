//! Request validation: every violated field is reported at once, with the
//! detail kept for logs. The caller only ever sees the generic invalid-input
//! sentence.

use crate::error::StudioError;
use std::borrow::Cow;
use tracing::warn;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// Validate a request envelope, folding all violations into one error.
pub fn check<T: Validate>(request: &T) -> Result<(), StudioError> {
    request.validate().map_err(|errors| {
        let detail = flatten(&errors);
        warn!(%detail, "request failed input validation");
        StudioError::InvalidInput(detail)
    })
}

/// Custom rule: a `data:<mime>;base64,<payload>` string whose payload
/// actually decodes.
pub fn data_url(value: &str) -> Result<(), ValidationError> {
    match crate::gemini::parse_data_url(value) {
        Ok(_) => Ok(()),
        Err(_) => {
            let mut error = ValidationError::new("data_url");
            error.message = Some(Cow::Borrowed("must be a base64 data URL"));
            Err(error)
        }
    }
}

fn flatten(errors: &ValidationErrors) -> String {
    let mut lines = Vec::new();
    collect(errors, "", &mut lines);
    lines.sort();
    lines.join("; ")
}

fn collect(errors: &ValidationErrors, prefix: &str, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let reason = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    out.push(format!("{path}: {reason}"));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect(nested, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}
