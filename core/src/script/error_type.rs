use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Closed failure taxonomy shown to the user and sent back on repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorType {
    TimeoutError,
    SyntaxError,
    RuntimeError,
    NetworkError,
    ApiError,
    ScriptError,
    ExecutionError,
    #[default]
    UnknownError,
}

impl ErrorType {
    pub const ALL: [ErrorType; 8] = [
        Self::TimeoutError,
        Self::SyntaxError,
        Self::RuntimeError,
        Self::NetworkError,
        Self::ApiError,
        Self::ScriptError,
        Self::ExecutionError,
        Self::UnknownError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimeoutError => "TimeoutError",
            Self::SyntaxError => "SyntaxError",
            Self::RuntimeError => "RuntimeError",
            Self::NetworkError => "NetworkError",
            Self::ApiError => "ApiError",
            Self::ScriptError => "ScriptError",
            Self::ExecutionError => "ExecutionError",
            Self::UnknownError => "UnknownError",
        }
    }

    /// Maps any free-form type string onto the taxonomy.
    ///
    /// Matching ignores ASCII case and the separators `_`, `-` and whitespace,
    /// so `"network_error"` and `"NETWORKERROR"` both land on `NetworkError`.
    /// Anything else is `UnknownError`.
    pub fn normalize(raw: &str) -> Self {
        let folded: String = raw
            .chars()
            .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(&folded))
            .unwrap_or(Self::UnknownError)
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ErrorType {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

impl Serialize for ErrorType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::normalize(&raw))
    }
}
