use serde::Deserialize;
use std::fs;

use loan_ledger_core::EngineConfig;

use crate::input;

fn default_log_level() -> String {
    "warn".to_string()
}

/// Contents of the `--config` file. Engine settings sit at the top level
/// next to `log_level`.
#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub engine: EngineConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Load configuration from a YAML (or JSON) file; defaults when no file is given.
pub fn load(path: Option<&str>) -> Result<CliConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let canonical = input::file::resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let cfg: CliConfig = serde_yaml::from_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    cfg.engine.validate()?;
    Ok(cfg)
}
