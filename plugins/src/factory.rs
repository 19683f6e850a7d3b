use anyhow::Result;
use std::sync::Arc;

use rpa_core::api::{BackendConfig, ScriptBackend};

use crate::backend::HttpScriptBackend;

pub fn build_backend(cfg: &BackendConfig) -> Result<Arc<dyn ScriptBackend>> {
    let base = cfg.base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        anyhow::bail!("backend.base_url must be an http(s) URL, got {:?}", cfg.base_url);
    }
    Ok(Arc::new(HttpScriptBackend::new(cfg)?))
}
