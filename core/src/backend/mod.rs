pub mod models;
pub mod r#trait;

pub use models::{ErrorContext, InstructionRequest, InstructionResponse, RepairRequest};
pub use r#trait::{EventSink, ScriptBackend};
