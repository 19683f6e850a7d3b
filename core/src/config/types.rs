use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub panel: PanelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the automation API, including the `/api` prefix.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Value of the `llm_client` query parameter on generate/repair requests.
    #[serde(default = "default_llm_client")]
    pub llm_client: String,

    /// Timeout for generate/repair/fetch requests. Runs are never timed out.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional bearer token; empty means no Authorization header.
    #[serde(default)]
    pub api_key: String,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_llm_client() -> String {
    "openai".to_string()
}

fn default_request_timeout_ms() -> u64 {
    120_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            llm_client: default_llm_client(),
            request_timeout_ms: default_request_timeout_ms(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "rpa_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    false
}

fn default_logging_file() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Print the prompt the backend used after a generate/repair.
    #[serde(default = "default_true")]
    pub show_prompt: bool,

    /// Print the generated script after a generate/repair.
    #[serde(default = "default_true")]
    pub echo_script: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            show_prompt: true,
            echo_script: true,
        }
    }
}
