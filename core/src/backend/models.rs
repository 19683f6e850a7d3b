use serde::{Deserialize, Serialize};

use crate::script::{ErrorType, ScriptError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionRequest {
    pub content: String,
}

/// Failure context attached to a repair request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub error_type: ErrorType,
    pub error: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRequest {
    pub content: String,
    pub error_context: ErrorContext,
    pub original_script: String,
}

impl RepairRequest {
    pub fn from_error(content: impl Into<String>, prior: &ScriptError) -> Self {
        Self {
            content: content.into(),
            error_context: ErrorContext {
                error_type: prior.error_type,
                error: prior.error.clone(),
                stderr: prior.stderr.clone(),
                traceback: prior.traceback.clone(),
            },
            original_script: prior.script_content.clone(),
        }
    }
}

/// Response of the generate and repair endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstructionResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub script_id: Option<String>,
    #[serde(default)]
    pub script_path: Option<String>,
    #[serde(default)]
    pub script_content: Option<String>,
    #[serde(default)]
    pub is_repair: Option<bool>,
    #[serde(default)]
    pub prompt_used: Option<String>,
}

impl InstructionResponse {
    /// True when `status` is absent or reports success.
    pub fn is_success(&self) -> bool {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(s) => s.eq_ignore_ascii_case("success") || s.eq_ignore_ascii_case("ok"),
        }
    }
}
