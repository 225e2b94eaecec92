//! Structural contracts for model output.
//!
//! The generation calls return parsed-but-untrusted JSON. Validation here is
//! all-or-nothing: every violated path is collected (not just the first) so
//! the logs show the whole picture, then the value is rejected as one
//! `SchemaInvalid` error. The user sees a single generic sentence.

use crate::error::StudioError;
use crate::models::{ArrangementStyle, ContentPlan, DirectorOutput, Ratio};
use serde_json::Value;
use tracing::warn;

const MAX_ROUTES: usize = 5;
const MAX_SET_NUMBER: u64 = 3;

#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn push(&mut self, path: &str, reason: &str) {
        self.0.push(format!("{path}: {reason}"));
    }

    fn reject_or<T>(self, shape: &str, ok: impl FnOnce() -> Result<T, StudioError>) -> Result<T, StudioError> {
        if self.0.is_empty() {
            return ok();
        }
        warn!(shape, violations = %self.0.join("; "), "model output failed schema validation");
        Err(StudioError::SchemaInvalid(self.0.join("; ")))
    }
}

fn require_nonempty_str(root: &Value, pointer: &str, errs: &mut Violations) {
    match root.pointer(pointer) {
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        Some(Value::String(_)) => errs.push(pointer, "must be a non-empty string"),
        Some(_) => errs.push(pointer, "must be a string"),
        None => errs.push(pointer, "is required"),
    }
}

fn require_present_str(root: &Value, pointer: &str, errs: &mut Violations) {
    match root.pointer(pointer) {
        Some(Value::String(_)) => {}
        Some(_) => errs.push(pointer, "must be a string"),
        None => errs.push(pointer, "is required"),
    }
}

fn require_ratio(root: &Value, pointer: &str, errs: &mut Violations) {
    match root.pointer(pointer) {
        Some(Value::String(s)) if Ratio::parse(s).is_some() => {}
        Some(Value::String(s)) => errs.push(pointer, &format!("unknown ratio \"{s}\"")),
        Some(_) => errs.push(pointer, "must be a ratio string"),
        None => errs.push(pointer, "is required"),
    }
}

fn array_len(root: &Value, pointer: &str, errs: &mut Violations) -> Option<usize> {
    match root.pointer(pointer) {
        Some(Value::Array(items)) => Some(items.len()),
        Some(_) => {
            errs.push(pointer, "must be an array");
            None
        }
        None => {
            errs.push(pointer, "is required");
            None
        }
    }
}

/// Validate and type the first generation call's output: a product analysis
/// plus 1-5 marketing routes, every field a non-empty string.
pub fn validate_director_output(value: &Value) -> Result<DirectorOutput, StudioError> {
    let mut errs = Violations::default();

    require_nonempty_str(value, "/product_analysis/name", &mut errs);
    require_nonempty_str(value, "/product_analysis/visual_description", &mut errs);
    require_nonempty_str(value, "/product_analysis/key_features", &mut errs);

    if let Some(len) = array_len(value, "/marketing_routes", &mut errs) {
        if len == 0 {
            errs.push("/marketing_routes", "must contain at least one route");
        } else if len > MAX_ROUTES {
            errs.push(
                "/marketing_routes",
                &format!("must contain at most {MAX_ROUTES} routes, got {len}"),
            );
        }
        for i in 0..len {
            for field in [
                "route_name",
                "headline",
                "subhead",
                "style_brief",
                "target_audience",
            ] {
                require_nonempty_str(value, &format!("/marketing_routes/{i}/{field}"), &mut errs);
            }
        }
    }

    errs.reject_or("director_output", || {
        serde_json::from_value(value.clone())
            .map_err(|e| StudioError::SchemaInvalid(e.to_string()))
    })
}

/// Validate and type the second generation call's output: a named plan with
/// at least one selected size and at least one content set.
///
/// A set's `ratio` is checked against the ratio enum but not against the
/// plan's `selected_sizes`; the `{ratio}_set{n}` id convention is likewise
/// advisory only.
pub fn validate_content_plan(value: &Value) -> Result<ContentPlan, StudioError> {
    let mut errs = Violations::default();

    require_nonempty_str(value, "/plan_name", &mut errs);

    if let Some(len) = array_len(value, "/selected_sizes", &mut errs) {
        if len == 0 {
            errs.push("/selected_sizes", "must contain at least one size");
        }
        for i in 0..len {
            require_ratio(value, &format!("/selected_sizes/{i}"), &mut errs);
        }
    }

    if let Some(len) = array_len(value, "/content_sets", &mut errs) {
        if len == 0 {
            errs.push("/content_sets", "must contain at least one content set");
        }
        for i in 0..len {
            let base = format!("/content_sets/{i}");
            require_nonempty_str(value, &format!("{base}/id"), &mut errs);
            require_ratio(value, &format!("{base}/ratio"), &mut errs);
            require_nonempty_str(value, &format!("{base}/size_label"), &mut errs);
            require_nonempty_str(value, &format!("{base}/title"), &mut errs);
            require_nonempty_str(value, &format!("{base}/copy"), &mut errs);
            require_nonempty_str(value, &format!("{base}/visual_prompt_en"), &mut errs);
            require_present_str(value, &format!("{base}/visual_summary"), &mut errs);

            let set_number_path = format!("{base}/set_number");
            match value.pointer(&set_number_path) {
                Some(Value::Number(n)) => match n.as_u64() {
                    Some(v) if (1..=MAX_SET_NUMBER).contains(&v) => {}
                    _ => errs.push(
                        &set_number_path,
                        &format!("must be an integer between 1 and {MAX_SET_NUMBER}"),
                    ),
                },
                Some(_) => errs.push(&set_number_path, "must be a number"),
                None => errs.push(&set_number_path, "is required"),
            }

            let arrangement_path = format!("{base}/arrangement_style");
            match value.pointer(&arrangement_path) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) if ArrangementStyle::parse(s).is_some() => {}
                Some(Value::String(s)) => {
                    errs.push(&arrangement_path, &format!("unknown arrangement \"{s}\""));
                }
                Some(_) => errs.push(&arrangement_path, "must be a string"),
            }
        }
    }

    errs.reject_or("content_plan", || {
        serde_json::from_value(value.clone())
            .map_err(|e| StudioError::SchemaInvalid(e.to_string()))
    })
}
