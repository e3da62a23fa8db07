use serde_json::Value;
use std::io;
use thiserror::Error;

use crate::validate::ValidationError;

pub const EXECUTION_FAILED: &str = "execution failed";

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("bridge unavailable; run the generated command manually")]
    BridgeUnavailable,
    /// `BridgeUnavailable` with the command the user should run instead.
    #[error("bridge unavailable; run the generated command manually")]
    ManualLaunch { command: String, payload: Value },
    #[error("{0}")]
    Dispatch(String),
    #[error("the bridge returned no response")]
    NoResponse,
    #[error("registry error: {0}")]
    Registry(String),
    #[error("clipboard error: {0}")]
    Clipboard(String),
    #[error("process error: {0}")]
    Process(String),
}

impl LauncherError {
    pub fn code(&self) -> &'static str {
        match self {
            LauncherError::Config(_) | LauncherError::Yaml(_) => "config",
            LauncherError::Io(_) => "io",
            LauncherError::Prompt(_) => "prompt",
            LauncherError::Json(_) => "json",
            LauncherError::Http(_) | LauncherError::Registry(_) => "registry_fetch",
            LauncherError::Validation(err) => err.code(),
            LauncherError::BridgeUnavailable | LauncherError::ManualLaunch { .. } => {
                "bridge_unavailable"
            }
            LauncherError::Dispatch(_) => "dispatch_failed",
            LauncherError::NoResponse => "no_response",
            LauncherError::Clipboard(_) => "clipboard",
            LauncherError::Process(_) => "process",
        }
    }
}
