//! Instruction submission flow: generate a script from an instruction, or
//! repair a failed one with its error context attached.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::backend::{InstructionRequest, InstructionResponse, RepairRequest, ScriptBackend};
use crate::error::SubmitError;
use crate::script::ScriptError;
use crate::state::StatusMessage;

/// Prompt the backend actually sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptInfo {
    pub content: String,
    pub is_repair: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub script_id: String,
    pub script_path: Option<String>,
    pub script_content: String,
    pub is_repaired: bool,
    pub prompt_used: Option<String>,
}

pub struct SubmissionFlow {
    backend: Arc<dyn ScriptBackend>,
    is_submitting: bool,
    current_prompt: Option<PromptInfo>,
    last_outcome: Option<SubmitOutcome>,
    status: Option<StatusMessage>,
}

impl SubmissionFlow {
    pub fn new(backend: Arc<dyn ScriptBackend>) -> Self {
        Self {
            backend,
            is_submitting: false,
            current_prompt: None,
            last_outcome: None,
            status: None,
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.is_submitting
    }

    pub fn current_prompt(&self) -> Option<&PromptInfo> {
        self.current_prompt.as_ref()
    }

    pub fn last_outcome(&self) -> Option<&SubmitOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn set_status(&mut self, status: StatusMessage) {
        self.status = Some(status);
    }

    /// Sends an instruction, or a repair when `is_repair` is set.
    ///
    /// A repair requires `prior` so its type, message, stderr, traceback and
    /// script content go out as repair context.
    #[tracing::instrument(name = "submit.instruction", skip_all, fields(is_repair = is_repair))]
    pub async fn submit(
        &mut self,
        instruction: &str,
        is_repair: bool,
        prior: Option<&ScriptError>,
    ) -> Result<SubmitOutcome, SubmitError> {
        if instruction.trim().is_empty() {
            self.status = Some(StatusMessage::error(SubmitError::EmptyInstruction.to_string()));
            return Err(SubmitError::EmptyInstruction);
        }
        if is_repair && prior.is_none() {
            self.status = Some(StatusMessage::error(format!(
                "Error: {}",
                SubmitError::MissingRepairContext
            )));
            return Err(SubmitError::MissingRepairContext);
        }

        self.current_prompt = None;
        self.is_submitting = true;
        self.status = None;

        let result = self.send(instruction, is_repair, prior).await;
        self.is_submitting = false;

        match result {
            Ok((outcome, response)) => {
                if let Some(prompt) = outcome.prompt_used.clone() {
                    self.current_prompt = Some(PromptInfo {
                        content: prompt,
                        is_repair,
                    });
                }
                let message = if is_repair {
                    "Script repaired successfully".to_string()
                } else {
                    response
                        .message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| "Script generated successfully".to_string())
                };
                tracing::info!(
                    target: "rpa.submit",
                    script_id = %outcome.script_id,
                    is_repaired = outcome.is_repaired,
                    "script ready"
                );
                self.status = Some(StatusMessage::success(message));
                self.last_outcome = Some(outcome.clone());
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(target: "rpa.submit", error = %err, "submission failed");
                self.status = Some(StatusMessage::error(format!("Error: {err}")));
                Err(err)
            }
        }
    }

    async fn send(
        &self,
        instruction: &str,
        is_repair: bool,
        prior: Option<&ScriptError>,
    ) -> Result<(SubmitOutcome, InstructionResponse), SubmitError> {
        let response = match (is_repair, prior) {
            (true, Some(prior)) => {
                let req = RepairRequest::from_error(instruction, prior);
                tracing::debug!(
                    target: "rpa.submit",
                    stage = "submit.repair.in",
                    error_type = %req.error_context.error_type,
                    original_script_len = req.original_script.len()
                );
                self.backend.repair_script(req).await?
            }
            _ => {
                tracing::debug!(
                    target: "rpa.submit",
                    stage = "submit.instruction.in",
                    content_len = instruction.len()
                );
                self.backend
                    .submit_instruction(InstructionRequest {
                        content: instruction.to_string(),
                    })
                    .await?
            }
        };

        if !response.is_success() {
            let message = response
                .message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Failed to process instruction".to_string());
            return Err(SubmitError::Rejected { message });
        }

        let script_id = response
            .script_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| response.script_path.as_deref().and_then(script_id_from_path))
            .ok_or_else(|| SubmitError::Rejected {
                message: "backend response carries no script id".to_string(),
            })?;

        let script_content = match response.script_content.clone() {
            Some(content) if !content.is_empty() => content,
            _ => self
                .backend
                .fetch_script(&script_id)
                .await?
                .unwrap_or_default(),
        };

        let outcome = SubmitOutcome {
            script_id,
            script_path: response.script_path.clone(),
            script_content,
            is_repaired: response.is_repair.unwrap_or(false),
            prompt_used: response.prompt_used.clone(),
        };
        Ok((outcome, response))
    }
}

/// `.../script_<id>.py` -> `<id>`
pub fn script_id_from_path(path: &str) -> Option<String> {
    let last = path.rsplit('_').next()?;
    let id = last.split('.').next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
