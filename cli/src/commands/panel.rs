//! 交互式面板：读取用户意图（提交、运行、修复、清空），驱动提交流程与运行协调器。
use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::app::AppContext;
use crate::render;
use rpa_core::api as core_api;

const HELP: &str = "\
Type an instruction to generate a script. While an error is shown, the
instruction is sent as a repair request for the failed script.

  :run            run the current script
  :repair TEXT    repair the current script with TEXT
  :clear          clear output and error
  :status         show run and submission state
  :script         print the current script
  :help           show this help
  :quit           leave the panel
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    Submit(String),
    Run,
    Repair(String),
    Clear,
    Status,
    Script,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl PanelCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix(':') else {
            return Self::Submit(line.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "run" | "r" => Self::Run,
            "repair" => Self::Repair(arg.to_string()),
            "clear" | "c" => Self::Clear,
            "status" | "s" => Self::Status,
            "script" => Self::Script,
            "help" | "h" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

pub struct PanelSession {
    panel: core_api::PanelConfig,
    coordinator: core_api::ScriptRunCoordinator,
    flow: core_api::SubmissionFlow,
    run_task: Option<JoinHandle<()>>,
}

impl PanelSession {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            panel: ctx.cfg().panel.clone(),
            coordinator: core_api::ScriptRunCoordinator::new(ctx.backend()),
            flow: core_api::SubmissionFlow::new(ctx.backend()),
            run_task: None,
        }
    }

    pub fn coordinator(&self) -> &core_api::ScriptRunCoordinator {
        &self.coordinator
    }

    pub fn flow(&self) -> &core_api::SubmissionFlow {
        &self.flow
    }

    pub async fn handle(&mut self, cmd: PanelCommand) -> Control {
        match cmd {
            PanelCommand::Empty => {}
            PanelCommand::Submit(text) => {
                let repair = self.coordinator.snapshot().error.is_some();
                self.submit(&text, repair).await;
            }
            PanelCommand::Repair(text) => self.submit(&text, true).await,
            PanelCommand::Run => self.start_run(),
            PanelCommand::Clear => {
                if self.coordinator.is_running() {
                    notice(&core_api::StatusMessage::error(
                        "Cannot clear output while a script is running",
                    ));
                } else {
                    self.coordinator.clear();
                }
            }
            PanelCommand::Status => {
                print!(
                    "{}",
                    render::render_state(&self.coordinator.snapshot(), &self.flow)
                );
            }
            PanelCommand::Script => match self.flow.last_outcome() {
                Some(outcome) => println!("{}", outcome.script_content.trim_end()),
                None => notice(&core_api::StatusMessage::info("No script yet")),
            },
            PanelCommand::Help => print!("{HELP}"),
            PanelCommand::Quit => return Control::Quit,
            PanelCommand::Unknown(name) => {
                notice(&core_api::StatusMessage::error(format!(
                    "Unknown command :{name} (try :help)"
                )));
            }
        }
        Control::Continue
    }

    /// Waits for the run started by `:run`, if any.
    pub async fn wait_run(&mut self) {
        if let Some(task) = self.run_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "run task ended abnormally");
            }
        }
    }

    async fn submit(&mut self, text: &str, repair: bool) {
        let prior = if repair {
            self.coordinator.snapshot().error
        } else {
            None
        };
        match self.flow.submit(text, repair, prior.as_ref()).await {
            Ok(outcome) => {
                if outcome.is_repaired || repair {
                    self.coordinator.dismiss_error("Script repaired successfully");
                } else if let Some(status) = self.flow.status() {
                    notice(status);
                }
                print!(
                    "{}",
                    render::render_outcome(&outcome, self.flow.current_prompt(), &self.panel)
                );
            }
            Err(_) => {
                if let Some(status) = self.flow.status() {
                    notice(status);
                }
            }
        }
    }

    fn start_run(&mut self) {
        let Some(outcome) = self.flow.last_outcome() else {
            notice(&core_api::StatusMessage::error(
                "No script to run; submit an instruction first",
            ));
            return;
        };
        if self.coordinator.is_running() {
            notice(&core_api::StatusMessage::error("A script is already running"));
            return;
        }

        let coordinator = self.coordinator.clone();
        let script_id = outcome.script_id.clone();
        let script_content = outcome.script_content.clone();
        self.run_task = Some(tokio::spawn(async move {
            if let Err(e) = coordinator.run(&script_id, &script_content).await {
                notice(&core_api::StatusMessage::error(e.to_string()));
                return;
            }
            if let Some(err) = coordinator.snapshot().error {
                print!("{}", render::render_error_extras(&err));
            }
        }));
    }
}

fn notice(status: &core_api::StatusMessage) {
    eprintln!("{}", render::render_status(status));
}

pub async fn run_panel(ctx: &AppContext) -> Result<i32, core_api::CliError> {
    let mut session = PanelSession::new(ctx);
    let printer = tokio::spawn(render::follow_session(session.coordinator().subscribe()));

    println!("rpa-panel connected to {}", ctx.cfg().backend.base_url);
    println!("Type :help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if session.handle(PanelCommand::parse(&line)).await == Control::Quit {
            break;
        }
    }

    if session.coordinator().is_running() {
        tracing::warn!("leaving the panel with a run in flight");
    }
    printer.abort();
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_plain_text() {
        assert_eq!(PanelCommand::parse("  "), PanelCommand::Empty);
        assert_eq!(
            PanelCommand::parse("open example.com and search rust"),
            PanelCommand::Submit("open example.com and search rust".to_string())
        );
        assert_eq!(PanelCommand::parse(":run"), PanelCommand::Run);
        assert_eq!(
            PanelCommand::parse(":repair  wait for the button "),
            PanelCommand::Repair("wait for the button".to_string())
        );
        assert_eq!(PanelCommand::parse(":repair"), PanelCommand::Repair(String::new()));
        assert_eq!(PanelCommand::parse(":q"), PanelCommand::Quit);
        assert_eq!(
            PanelCommand::parse(":frobnicate"),
            PanelCommand::Unknown("frobnicate".to_string())
        );
    }
}
