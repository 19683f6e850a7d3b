use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("submit failed: {0}")]
    Submit(#[from] SubmitError),
    #[error("run rejected: {0}")]
    Run(#[from] RunError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Failures of the instruction submission flow.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Please enter an instruction")]
    EmptyInstruction,
    #[error("repair requested without a prior script error")]
    MissingRepairContext,
    #[error("{message}")]
    Rejected { message: String },
    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("a run is already in flight (script {script_id})")]
    AlreadyRunning { script_id: String },
}
