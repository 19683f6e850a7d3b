use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::error_type::ErrorType;

/// Reads an explicit `null` as the type's default. The backend sends `null`
/// for empty lists and flags as often as it omits them.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One browser navigation recorded while an automation script ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageHistoryItem {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Failure record of a run. Carries enough of the failed script to drive a
/// repair request without re-fetching it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScriptError {
    #[serde(default, deserialize_with = "null_as_default")]
    pub error: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub error_type: ErrorType,

    #[serde(default, deserialize_with = "null_as_default")]
    pub stdout: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub stderr: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub suggestions: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub possible_causes: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub script_content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_history: Option<Vec<PageHistoryItem>>,
}

/// Structured error payload as sent by the backend, either as an `error`
/// event or nested under `complete.error`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "ErrorDetailWire")]
pub struct ErrorDetail {
    pub message: Option<String>,
    pub error_type: Option<ErrorType>,
    pub stderr: Option<String>,
    pub traceback: Option<String>,
    pub returncode: Option<i32>,
    pub suggestions: Vec<String>,
    pub possible_causes: Vec<String>,
    pub details: Option<Value>,
}

/// Wire shape of [`ErrorDetail`]. Payloads may carry `message` and `error`,
/// or `error_type` and `type`, side by side; the first non-empty one wins.
#[derive(Deserialize)]
struct ErrorDetailWire {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_type: Option<ErrorType>,
    #[serde(default, rename = "type")]
    kind: Option<ErrorType>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    traceback: Option<String>,
    #[serde(default)]
    returncode: Option<i32>,
    #[serde(default, deserialize_with = "null_as_default")]
    suggestions: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    possible_causes: Vec<String>,
    #[serde(default)]
    details: Option<Value>,
}

impl From<ErrorDetailWire> for ErrorDetail {
    fn from(w: ErrorDetailWire) -> Self {
        let message = w
            .message
            .filter(|m| !m.trim().is_empty())
            .or(w.error.filter(|m| !m.trim().is_empty()));
        Self {
            message,
            error_type: w.error_type.or(w.kind),
            stderr: w.stderr,
            traceback: w.traceback,
            returncode: w.returncode,
            suggestions: w.suggestions,
            possible_causes: w.possible_causes,
            details: w.details,
        }
    }
}

/// `error` on a run result is either a bare message or a structured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorField {
    Message(String),
    Detail(ErrorDetail),
}

/// Terminal outcome of a run: the single JSON response of a non-streaming
/// run, or the payload of a `complete` event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,

    #[serde(default)]
    pub stdout: Option<String>,

    #[serde(default)]
    pub stderr: Option<String>,

    #[serde(default)]
    pub error: Option<ErrorField>,

    #[serde(default)]
    pub error_type: Option<ErrorType>,

    #[serde(default)]
    pub returncode: Option<i32>,

    #[serde(default)]
    pub traceback: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub suggestions: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub possible_causes: Vec<String>,

    #[serde(default)]
    pub details: Option<Value>,

    #[serde(default)]
    pub script_content: Option<String>,

    #[serde(default)]
    pub page_history: Option<Vec<PageHistoryItem>>,
}

impl RunResult {
    pub fn failed(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(ErrorField::Message(message.into())),
            error_type: Some(error_type),
            ..Self::default()
        }
    }

    /// Flattens top-level and nested error fields into one detail record.
    /// Top-level fields win over the nested `error` object.
    pub fn error_detail(&self) -> ErrorDetail {
        let nested = match &self.error {
            Some(ErrorField::Detail(d)) => d.clone(),
            Some(ErrorField::Message(m)) => ErrorDetail {
                message: Some(m.clone()),
                ..ErrorDetail::default()
            },
            None => ErrorDetail::default(),
        };

        ErrorDetail {
            message: nested.message.filter(|m| !m.trim().is_empty()),
            error_type: self.error_type.or(nested.error_type),
            stderr: non_empty(self.stderr.clone()).or(nested.stderr),
            traceback: non_empty(self.traceback.clone()).or(nested.traceback),
            returncode: self.returncode.or(nested.returncode),
            suggestions: prefer_non_empty(&self.suggestions, nested.suggestions),
            possible_causes: prefer_non_empty(&self.possible_causes, nested.possible_causes),
            details: self.details.clone().or(nested.details),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

fn prefer_non_empty(primary: &[String], fallback: Vec<String>) -> Vec<String> {
    if primary.is_empty() {
        fallback
    } else {
        primary.to_vec()
    }
}
