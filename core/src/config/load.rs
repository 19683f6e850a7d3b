use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Default data directory: ~/.rpa-panel
pub fn get_panel_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".rpa-panel"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.rpa-panel/config.toml
    let data_dir = get_panel_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml
    let local_config = Path::new("config.toml");

    let mut cfg = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    if cfg
        .logging
        .directory
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
    Ok(cfg)
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Some(v) = non_empty_env("RPA_PANEL_BASE_URL") {
        cfg.backend.base_url = v;
    }
    if let Some(v) = non_empty_env("RPA_PANEL_LLM_CLIENT") {
        cfg.backend.llm_client = v;
    }
    if let Some(v) = non_empty_env("RPA_PANEL_API_KEY") {
        cfg.backend.api_key = v;
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
