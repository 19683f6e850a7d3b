//! 显示层：把运行状态、提交结果和错误详情渲染成终端文本。
use std::io::Write;

use rpa_core::api as core_api;
use tokio::sync::broadcast;

pub fn render_status(status: &core_api::StatusMessage) -> String {
    let tag = match status.kind {
        core_api::StatusKind::Success => "ok",
        core_api::StatusKind::Error => "error",
        core_api::StatusKind::Info => "info",
    };
    format!("[{tag}] {}", status.message)
}

/// Text for one live update; `None` for updates that print nothing.
pub fn render_update(update: &core_api::RunUpdate) -> Option<String> {
    match update {
        core_api::RunUpdate::Started { script_id, .. } => Some(format!("--- run {script_id} ---\n")),
        core_api::RunUpdate::Output(chunk) => Some(chunk.text.clone()),
        core_api::RunUpdate::Status(status) => Some(format!("{}\n", render_status(status))),
        core_api::RunUpdate::Finished { .. } => None,
        core_api::RunUpdate::Cleared => Some("(output cleared)\n".to_string()),
    }
}

/// Prints updates until the current run finishes.
pub async fn follow_run(mut rx: broadcast::Receiver<core_api::RunUpdate>) {
    loop {
        match rx.recv().await {
            Ok(update) => {
                let finished = matches!(update, core_api::RunUpdate::Finished { .. });
                print_update(&update);
                if finished {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "display lagged behind run updates");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Prints updates for the lifetime of the session.
pub async fn follow_session(mut rx: broadcast::Receiver<core_api::RunUpdate>) {
    loop {
        match rx.recv().await {
            Ok(update) => print_update(&update),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "display lagged behind run updates");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn print_update(update: &core_api::RunUpdate) {
    if let Some(text) = render_update(update) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

pub fn render_outcome(
    outcome: &core_api::SubmitOutcome,
    prompt: Option<&core_api::PromptInfo>,
    panel: &core_api::PanelConfig,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Script ID: {}\n", outcome.script_id));
    if let Some(path) = &outcome.script_path {
        out.push_str(&format!("Path: {path}\n"));
    }
    if outcome.is_repaired {
        out.push_str("Repaired: yes\n");
    }
    if panel.show_prompt {
        if let Some(prompt) = prompt {
            let label = if prompt.is_repair {
                "Repair Prompt"
            } else {
                "Generation Prompt"
            };
            out.push_str(&format!("\n{label}:\n{}\n", prompt.content.trim_end()));
        }
    }
    if panel.echo_script && !outcome.script_content.is_empty() {
        out.push_str(&format!(
            "\nScript:\n{}\n",
            outcome.script_content.trim_end()
        ));
    }
    out
}

/// Error detail beyond the block already appended to the run output.
pub fn render_error_extras(err: &core_api::ScriptError) -> String {
    let mut out = String::new();
    if !err.possible_causes.is_empty() {
        out.push_str("\nPossible Causes:\n");
        for cause in &err.possible_causes {
            out.push_str(&format!("- {cause}\n"));
        }
    }
    if let Some(history) = err.page_history.as_ref().filter(|h| !h.is_empty()) {
        out.push_str("\nPage History:\n");
        for (idx, page) in history.iter().enumerate() {
            out.push_str(&format!("{}. {}", idx + 1, page.url));
            if let Some(title) = page.title.as_deref().filter(|t| !t.is_empty()) {
                out.push_str(&format!(" ({title})"));
            }
            if let Some(ts) = page.timestamp.as_deref().filter(|t| !t.is_empty()) {
                out.push_str(&format!(" @ {ts}"));
            }
            out.push('\n');
        }
    }
    out
}

pub fn render_state(state: &core_api::RunState, flow: &core_api::SubmissionFlow) -> String {
    let mut out = String::new();
    match flow.last_outcome() {
        Some(outcome) => out.push_str(&format!("script: {}\n", outcome.script_id)),
        None => out.push_str("script: none\n"),
    }
    out.push_str(&format!(
        "running: {}{}\n",
        state.is_running,
        if flow.is_submitting() { " (submitting)" } else { "" }
    ));
    if let Some(ms) = state.duration_ms() {
        out.push_str(&format!("last run: {ms} ms\n"));
    }
    if let Some(status) = state.status.as_ref() {
        out.push_str(&format!("run status: {}\n", render_status(status)));
    }
    if let Some(status) = flow.status() {
        out.push_str(&format!("submit status: {}\n", render_status(status)));
    }
    if let Some(err) = state.error.as_ref() {
        out.push_str(&format!("error: {} ({})\n", err.error, err.error_type));
    }
    out
}
