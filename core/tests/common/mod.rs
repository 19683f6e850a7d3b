#![allow(dead_code)]

use async_trait::async_trait;
use rpa_core::api::{
    EventSink, InstructionRequest, InstructionResponse, RepairRequest, RunEvent, RunResult,
    ScriptBackend,
};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub enum Outcome {
    Result(RunResult),
    Transport(String),
}

/// Backend double that replays a fixed feed and records every request.
pub struct ScriptedBackend {
    pub events: Vec<RunEvent>,
    pub outcome: Outcome,
    pub response: InstructionResponse,
    pub stored_script: Option<String>,
    pub gate: Option<Arc<Notify>>,
    pub instructions: Mutex<Vec<InstructionRequest>>,
    pub repairs: Mutex<Vec<RepairRequest>>,
    pub fetches: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(events: Vec<RunEvent>, outcome: Outcome) -> Self {
        Self {
            events,
            outcome,
            response: InstructionResponse::default(),
            stored_script: None,
            gate: None,
            instructions: Mutex::new(Vec::new()),
            repairs: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(response: InstructionResponse) -> Self {
        Self {
            response,
            ..Self::new(vec![], Outcome::Result(RunResult::default()))
        }
    }
}

#[async_trait]
impl ScriptBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit_instruction(&self, req: InstructionRequest) -> anyhow::Result<InstructionResponse> {
        self.instructions.lock().unwrap().push(req);
        Ok(self.response.clone())
    }

    async fn repair_script(&self, req: RepairRequest) -> anyhow::Result<InstructionResponse> {
        self.repairs.lock().unwrap().push(req);
        Ok(self.response.clone())
    }

    async fn fetch_script(&self, script_id: &str) -> anyhow::Result<Option<String>> {
        self.fetches.lock().unwrap().push(script_id.to_string());
        Ok(self.stored_script.clone())
    }

    async fn run_script(&self, _script_id: &str, sink: EventSink) -> anyhow::Result<RunResult> {
        for ev in &self.events {
            sink.emit(ev.clone());
            tokio::task::yield_now().await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.outcome {
            Outcome::Result(r) => Ok(r.clone()),
            Outcome::Transport(msg) => {
                Err(anyhow::anyhow!("{msg}").context("error sending request for url"))
            }
        }
    }
}

pub fn output(content: &str, is_error: bool) -> RunEvent {
    RunEvent::Output {
        content: content.to_string(),
        is_error,
    }
}
