use std::{fs, path::Path, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::controller::ErrorDisplay;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_API_URL: &str = "GOGGINS_API_URL";
const ENV_LOG: &str = "GOGGINS_LOG";

/// On-disk `config.toml`. Every key is optional.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppConfig {
    pub api_url: Option<String>,
    pub send_context: Option<bool>,
    pub error_display: Option<ErrorDisplay>,
    pub log_level: Option<String>,
}

/// Effective settings after defaults and environment overrides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub send_context: bool,
    pub error_display: ErrorDisplay,
    pub log_level: String,
}

impl Settings {
    pub fn resolve(cfg: AppConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_url: env(ENV_API_URL)
                .or(cfg.api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            send_context: cfg.send_context.unwrap_or(true),
            error_display: cfg.error_display.unwrap_or_default(),
            log_level: env(ENV_LOG)
                .or(cfg.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "gogginsgpt", "gogginsgpt").ok_or_else(|| anyhow!("unable to resolve home dir"))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

pub fn data_dir() -> Result<PathBuf> {
    let dir = project_dirs()?.data_dir().to_path_buf();
    fs::create_dir_all(&dir).with_context(|| format!("create data dir {}", dir.display()))?;
    Ok(dir)
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&s).with_context(|| "parse TOML".to_string())?;
    Ok(cfg)
}
