//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `rpa_core::api` instead of reaching into internal modules.

pub use crate::backend::{
    ErrorContext, EventSink, InstructionRequest, InstructionResponse, RepairRequest, ScriptBackend,
};
pub use crate::config::{load_default, AppConfig, BackendConfig, LoggingConfig, PanelConfig};
pub use crate::error::{CliError, RunError, SubmitError};
pub use crate::events::RunEvent;
pub use crate::script::{
    ErrorDetail, ErrorField, ErrorType, PageHistoryItem, RunResult, ScriptError,
};
pub use crate::state::{
    format_error_block, OutputChunk, OutputSource, RunState, RunUpdate, ScriptRunCoordinator,
    StatusKind, StatusMessage,
};
pub use crate::submit::{script_id_from_path, PromptInfo, SubmissionFlow, SubmitOutcome};
