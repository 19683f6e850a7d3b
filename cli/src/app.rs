//! CLI 应用装配层：合并命令行覆盖、构建 backend，并持有一次进程内共享的上下文。
use std::sync::Arc;

use crate::commands::cli::Args;
use rpa_core::api as core_api;

pub struct AppContext {
    cfg: core_api::AppConfig,
    backend: Arc<dyn core_api::ScriptBackend>,
}

impl AppContext {
    pub fn new(cfg: core_api::AppConfig) -> Result<Self, core_api::CliError> {
        let backend = rpa_plugins::factory::build_backend(&cfg.backend)
            .map_err(|e| core_api::CliError::Config(e.to_string()))?;
        tracing::debug!(
            backend = backend.name(),
            base_url = %cfg.backend.base_url,
            llm_client = %cfg.backend.llm_client,
            "backend ready"
        );
        Ok(Self { cfg, backend })
    }

    /// Context over an already built backend.
    pub fn with_backend(cfg: core_api::AppConfig, backend: Arc<dyn core_api::ScriptBackend>) -> Self {
        Self { cfg, backend }
    }

    pub fn cfg(&self) -> &core_api::AppConfig {
        &self.cfg
    }

    pub fn backend(&self) -> Arc<dyn core_api::ScriptBackend> {
        self.backend.clone()
    }
}

/// Command-line flags win over file and environment settings.
pub fn apply_overrides(cfg: &mut core_api::AppConfig, args: &Args) {
    if let Some(url) = args.base_url.as_deref().filter(|s| !s.trim().is_empty()) {
        cfg.backend.base_url = url.trim().to_string();
    }
    if let Some(client) = args.llm_client.as_deref().filter(|s| !s.trim().is_empty()) {
        cfg.backend.llm_client = client.trim().to_string();
    }
}
