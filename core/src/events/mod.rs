//! Run feed events.
//!
//! The backend tags every event with `type`. Decoding is total: anything that
//! is not a well-formed `output`, `error` or `complete` payload becomes
//! [`RunEvent::Unknown`] so the coordinator never handles untyped data.

use serde::Deserialize;
use serde_json::Value;

use crate::script::{null_as_default, ErrorDetail, RunResult};

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A fragment of script output. `is_error` routes it to stderr.
    Output { content: String, is_error: bool },
    /// A failure notification; may arrive before the terminal event.
    Error(ErrorDetail),
    /// Terminal event of a run.
    Complete(RunResult),
    /// Unrecognized tag or malformed payload.
    Unknown { kind: String, reason: String },
}

#[derive(Deserialize)]
struct OutputPayload {
    content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    is_error: bool,
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Output { .. } => "output",
            Self::Error(_) => "error",
            Self::Complete(_) => "complete",
            Self::Unknown { kind, .. } => kind,
        }
    }

    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(v) => Self::from_value(v),
            Err(e) => Self::Unknown {
                kind: String::new(),
                reason: format!("invalid json: {e}"),
            },
        }
    }

    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::Unknown {
                kind: String::new(),
                reason: "event is not a json object".to_string(),
            };
        };

        // The tag would otherwise collide with `ErrorDetail`'s `type` alias.
        let kind = match map.remove("type") {
            Some(Value::String(s)) => s,
            _ => {
                return Self::Unknown {
                    kind: String::new(),
                    reason: "missing event type".to_string(),
                }
            }
        };
        let body = Value::Object(map);

        let decoded = match kind.as_str() {
            "output" => serde_json::from_value::<OutputPayload>(body).map(|p| Self::Output {
                content: p.content,
                is_error: p.is_error,
            }),
            "error" => serde_json::from_value::<ErrorDetail>(body).map(Self::Error),
            "complete" => serde_json::from_value::<RunResult>(body).map(Self::Complete),
            _ => {
                return Self::Unknown {
                    kind: kind.clone(),
                    reason: "unsupported event type".to_string(),
                }
            }
        };

        decoded.unwrap_or_else(|e| Self::Unknown {
            reason: e.to_string(),
            kind,
        })
    }
}
