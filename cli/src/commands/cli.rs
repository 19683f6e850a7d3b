use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "rpa-panel",
    version,
    about = "Generate, run and repair browser automation scripts"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Automation API base URL, including the `/api` prefix.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Model client the backend should use for generate/repair.
    #[arg(long, global = true)]
    pub llm_client: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct GenerateArgs {
    /// Natural-language description of the automation task.
    #[arg(short = 'i', long)]
    pub instruction: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ShowArgs {
    pub script_id: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    pub script_id: String,

    /// Write the error record as JSON to this file when the run fails.
    #[arg(long)]
    pub save_error: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RepairArgs {
    #[arg(short = 'i', long)]
    pub instruction: String,

    /// Error record saved by `run --save-error`.
    #[arg(long)]
    pub error_file: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Turn an instruction into a script.
    Generate(GenerateArgs),
    /// Print a stored script.
    Show(ShowArgs),
    /// Execute a script and stream its output.
    Run(RunArgs),
    /// Ask for a corrected script using a saved error record.
    Repair(RepairArgs),
    /// Interactive session (default).
    Panel,
}
