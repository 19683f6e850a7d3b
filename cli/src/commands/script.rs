//! One-shot script commands: generate, show, run, repair.
use std::path::Path;

use crate::app::AppContext;
use crate::commands::cli::{GenerateArgs, RepairArgs, RunArgs, ShowArgs};
use crate::render;
use rpa_core::api as core_api;

pub async fn handle_generate(args: GenerateArgs, ctx: &AppContext) -> Result<i32, core_api::CliError> {
    let mut flow = core_api::SubmissionFlow::new(ctx.backend());
    let outcome = flow.submit(&args.instruction, false, None).await?;
    print_submission(&flow, &outcome, ctx);
    Ok(0)
}

pub async fn handle_show(args: ShowArgs, ctx: &AppContext) -> Result<i32, core_api::CliError> {
    let content = ctx
        .backend()
        .fetch_script(&args.script_id)
        .await
        .map_err(|e| core_api::CliError::Command(format!("fetch script failed: {e}")))?
        .ok_or_else(|| {
            core_api::CliError::Command(format!("Script with ID {} not found", args.script_id))
        })?;
    println!("{}", content.trim_end());
    Ok(0)
}

/// Streams a run to the terminal. Exit code 1 when the run failed.
pub async fn handle_run(args: RunArgs, ctx: &AppContext) -> Result<i32, core_api::CliError> {
    let backend = ctx.backend();
    // The stored script travels with the error record so a later repair
    // does not need to fetch it again.
    let script_content = backend
        .fetch_script(&args.script_id)
        .await
        .map_err(|e| core_api::CliError::Command(format!("fetch script failed: {e}")))?
        .unwrap_or_else(|| {
            tracing::warn!(script_id = %args.script_id, "script content unavailable");
            String::new()
        });

    let coordinator = core_api::ScriptRunCoordinator::new(backend);
    let printer = tokio::spawn(render::follow_run(coordinator.subscribe()));
    let result = coordinator.run(&args.script_id, &script_content).await;
    if result.is_err() {
        printer.abort();
    } else if let Err(e) = printer.await {
        tracing::warn!(error = %e, "display task ended abnormally");
    }
    result?;

    let state = coordinator.snapshot();
    let Some(err) = state.error else {
        return Ok(0);
    };

    let extras = render::render_error_extras(&err);
    if !extras.is_empty() {
        print!("{extras}");
    }
    if let Some(path) = args.save_error.as_deref() {
        save_error(path, &err).await?;
        eprintln!("error record saved to {}", path.display());
    }
    Ok(1)
}

pub async fn handle_repair(args: RepairArgs, ctx: &AppContext) -> Result<i32, core_api::CliError> {
    let prior = load_error(&args.error_file).await?;
    let mut flow = core_api::SubmissionFlow::new(ctx.backend());
    let outcome = flow.submit(&args.instruction, true, Some(&prior)).await?;
    print_submission(&flow, &outcome, ctx);
    Ok(0)
}

fn print_submission(flow: &core_api::SubmissionFlow, outcome: &core_api::SubmitOutcome, ctx: &AppContext) {
    if let Some(status) = flow.status() {
        eprintln!("{}", render::render_status(status));
    }
    print!(
        "{}",
        render::render_outcome(outcome, flow.current_prompt(), &ctx.cfg().panel)
    );
}

pub async fn save_error(path: &Path, err: &core_api::ScriptError) -> Result<(), core_api::CliError> {
    let json = serde_json::to_string_pretty(err).map_err(|e| core_api::CliError::Anyhow(e.into()))?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

pub async fn load_error(path: &Path) -> Result<core_api::ScriptError, core_api::CliError> {
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str::<core_api::ScriptError>(&raw).map_err(|e| {
        core_api::CliError::Command(format!("invalid error file {}: {e}", path.display()))
    })
}
