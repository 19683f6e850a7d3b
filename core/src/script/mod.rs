//! Script failure taxonomy and the wire shapes of a script run.

mod error_type;
mod types;

pub use error_type::ErrorType;
pub(crate) use types::null_as_default;
pub use types::{ErrorDetail, ErrorField, PageHistoryItem, RunResult, ScriptError};
