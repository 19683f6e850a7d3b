pub mod http;
pub mod sse;

pub use http::{BackendHttpError, BackendHttpErrorKind, BackendOp, HttpScriptBackend};
pub use sse::SseDecoder;
