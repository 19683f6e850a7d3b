//! Human-readable error block appended to the run output on failure.

use serde_json::Value;
use std::borrow::Cow;
use std::fmt::Write;

use crate::script::ScriptError;

const INDENT: &str = "  ";

/// Renders the consolidated failure block. Parts whose source field is
/// absent or empty are omitted.
pub fn format_error_block(err: &ScriptError) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "\nError: {}", err.error);
    let _ = writeln!(out, "Type: {}", err.error_type);
    if let Some(code) = err.returncode {
        let _ = writeln!(out, "Exit Code: {code}");
    }

    if !err.suggestions.is_empty() {
        out.push_str("\nSuggestions:\n");
        for s in &err.suggestions {
            let _ = writeln!(out, "- {s}");
        }
    }

    if !err.stderr.trim().is_empty() {
        out.push_str("\nError Output:\n");
        push_block(&mut out, &err.stderr);
    }

    if let Some(tb) = err.traceback.as_deref().filter(|t| !t.trim().is_empty()) {
        out.push_str("\nTraceback:\n");
        push_block(&mut out, tb);
    }

    if let Some(details) = err.details.as_ref().filter(|d| !is_empty_value(d)) {
        out.push_str("\nDetails:\n");
        render_value(&mut out, details, 1);
    }

    out
}

fn push_block(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Non-empty objects and arrays, including ones serialized into a string.
fn as_structured(v: &Value) -> Option<Cow<'_, Value>> {
    match v {
        Value::Object(m) if !m.is_empty() => Some(Cow::Borrowed(v)),
        Value::Array(a) if !a.is_empty() => Some(Cow::Borrowed(v)),
        Value::String(s) => {
            let trimmed = s.trim_start();
            if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
                return None;
            }
            serde_json::from_str::<Value>(s)
                .ok()
                .filter(|parsed| (parsed.is_object() || parsed.is_array()) && !is_empty_value(parsed))
                .map(Cow::Owned)
        }
        _ => None,
    }
}

fn scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_value(out: &mut String, value: &Value, depth: usize) {
    let pad = INDENT.repeat(depth);
    let Some(structured) = as_structured(value) else {
        let _ = writeln!(out, "{pad}{}", scalar(value));
        return;
    };

    match structured.as_ref() {
        Value::Object(map) => {
            for (key, v) in map {
                match as_structured(v) {
                    Some(nested) => {
                        let _ = writeln!(out, "{pad}{key}:");
                        render_value(out, &nested, depth + 1);
                    }
                    None => {
                        let _ = writeln!(out, "{pad}{key}: {}", scalar(v));
                    }
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                match as_structured(item) {
                    Some(nested) => {
                        let _ = writeln!(out, "{pad}-");
                        render_value(out, &nested, depth + 1);
                    }
                    None => {
                        let _ = writeln!(out, "{pad}- {}", scalar(item));
                    }
                }
            }
        }
        other => {
            let _ = writeln!(out, "{pad}{}", scalar(other));
        }
    }
}
