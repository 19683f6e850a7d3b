use clap::Parser;
use rpa_cli::app::{self, AppContext};
use rpa_cli::commands::{cli, panel, script};
use rpa_core::api as core_api;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, core_api::CliError> {
    let mut args = cli::Args::parse();
    let mut cfg = core_api::load_default().map_err(|e| core_api::CliError::Config(e.to_string()))?;
    app::apply_overrides(&mut cfg, &args);
    init_tracing(&cfg.logging).map_err(core_api::CliError::Config)?;

    let ctx = AppContext::new(cfg)?;
    let cmd = args.command.take().unwrap_or(cli::Commands::Panel);
    dispatch(cmd, &ctx).await
}

fn exit_code_for_error(e: &core_api::CliError) -> i32 {
    // 0: success
    // 1: script run failed (returned as a normal exit code, not as an error)
    // 11: config error
    // 20: transport / IO error
    // 30: request rejected by the backend or by input validation
    // 50: internal/uncategorized
    match e {
        core_api::CliError::Config(_) => 11,
        core_api::CliError::Submit(se) => match se {
            core_api::SubmitError::Backend(_) => 20,
            core_api::SubmitError::EmptyInstruction
            | core_api::SubmitError::MissingRepairContext
            | core_api::SubmitError::Rejected { .. } => 30,
        },
        core_api::CliError::Run(_) => 30,
        core_api::CliError::Io(_) => 20,
        core_api::CliError::Command(_) => 20,
        core_api::CliError::Anyhow(_) => 50,
    }
}

async fn dispatch(cmd: cli::Commands, ctx: &AppContext) -> Result<i32, core_api::CliError> {
    match cmd {
        cli::Commands::Generate(args) => script::handle_generate(args, ctx).await,
        cli::Commands::Show(args) => script::handle_show(args, ctx).await,
        cli::Commands::Run(args) => script::handle_run(args, ctx).await,
        cli::Commands::Repair(args) => script::handle_repair(args, ctx).await,
        cli::Commands::Panel => panel::run_panel(ctx).await,
    }
}

fn init_tracing(logging: &core_api::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("rpa-panel"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("rpa-panel.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
