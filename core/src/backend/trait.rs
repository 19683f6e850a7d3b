use async_trait::async_trait;
use tokio::sync::mpsc;

use super::models::{InstructionRequest, InstructionResponse, RepairRequest};
use crate::events::RunEvent;
use crate::script::RunResult;

/// Where a backend pushes run feed events while a run is in flight.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the coordinator stopped listening.
    pub fn emit(&self, event: RunEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// The automation API: script generation, repair, storage and execution.
#[async_trait]
pub trait ScriptBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn submit_instruction(&self, req: InstructionRequest) -> anyhow::Result<InstructionResponse>;

    async fn repair_script(&self, req: RepairRequest) -> anyhow::Result<InstructionResponse>;

    /// `Ok(None)` when the script does not exist.
    async fn fetch_script(&self, script_id: &str) -> anyhow::Result<Option<String>>;

    /// Starts a run. Streamed events go to `sink`; the returned result is
    /// used only when no `complete` event was delivered. `Err` means the
    /// call itself failed (transport, protocol).
    async fn run_script(&self, script_id: &str, sink: EventSink) -> anyhow::Result<RunResult>;
}
