use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LauncherError;
use crate::form::DEFAULT_SCRIPT_PATH;

pub const DEFAULT_CONFIG_YAML: &str = include_str!("../config/default.yaml");
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub version: u32,
    pub script: ScriptConfig,
    pub registry: RegistryConfig,
    pub bridge: BridgeConfig,
    pub host: HostConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptConfig {
    pub default_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub url: String,
    pub timeout_sec: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub program: String,
    pub host: HostBridgeMode,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HostBridgeMode {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub codex_home: String,
    pub terminal: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            script: ScriptConfig::default(),
            registry: RegistryConfig::default(),
            bridge: BridgeConfig::default(),
            host: HostConfig::default(),
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            default_path: DEFAULT_SCRIPT_PATH.to_string(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1/workspaces.json".to_string(),
            timeout_sec: 10,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "".to_string(),
            host: HostBridgeMode::Auto,
        }
    }
}

impl Default for HostBridgeMode {
    fn default() -> Self {
        HostBridgeMode::Auto
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            codex_home: "~/codex".to_string(),
            terminal: "".to_string(),
        }
    }
}

impl Config {
    pub fn default_script_path(&self) -> &str {
        let trimmed = self.script.default_path.trim();
        if trimmed.is_empty() {
            DEFAULT_SCRIPT_PATH
        } else {
            trimmed
        }
    }
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(path) = env::var("CODEX_LAUNCHER_CONFIG_DIR") {
        return PathBuf::from(path);
    }
    let mut base = home_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push(".config");
    base.push("codex-launcher");
    base
}

pub fn resolve_config_path(override_path: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = override_path {
        return path.clone();
    }
    if let Ok(path) = env::var("CODEX_LAUNCHER_CONFIG") {
        return PathBuf::from(path);
    }
    let mut base = default_config_dir();
    base.push("config.yaml");
    base
}

pub fn ensure_parent(path: &Path) -> Result<(), LauncherError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn read_config_from_str(content: &str) -> Result<Config, LauncherError> {
    let cfg: Config = serde_yaml::from_str(content)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn read_config(path: &Path) -> Result<Config, LauncherError> {
    let content = fs::read_to_string(path)?;
    read_config_from_str(&content)
}

/// Reads the config at `path`, or returns defaults when no file exists yet.
pub fn load_config(path: &Path) -> Result<Config, LauncherError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    read_config(path)
}

fn validate_config(cfg: &Config) -> Result<(), LauncherError> {
    if cfg.version != CONFIG_VERSION {
        return Err(LauncherError::Config(format!(
            "unsupported config version {}",
            cfg.version
        )));
    }
    let url = cfg.registry.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(LauncherError::Config(format!(
            "registry.url must be an http(s) URL, got '{url}'"
        )));
    }
    if cfg.registry.timeout_sec == 0 {
        return Err(LauncherError::Config(
            "registry.timeout_sec must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

pub fn expand_path(input: &str) -> String {
    if let Some(stripped) = input.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(stripped).to_string_lossy().to_string();
        }
    }
    input.to_string()
}
