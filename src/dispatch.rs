use serde::Serialize;
use serde_json::Value;

use crate::bridge::{launch_args, Bridge, BridgeError, LAUNCH_CODEX};
use crate::command::synthesize;
use crate::error::{LauncherError, EXECUTION_FAILED};
use crate::form::LaunchOptions;

pub const UNKNOWN_TERMINAL: &str = "unknown terminal";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Launched {
    pub command: String,
    pub terminal: String,
}

/// Sends `options` to the bridge. `Ok(None)` is the bridge answering with
/// nothing, which callers treat as a soft failure.
pub fn dispatch(
    bridge: Option<&dyn Bridge>,
    options: &LaunchOptions,
) -> Result<Option<Launched>, LauncherError> {
    let bridge = bridge.ok_or(LauncherError::BridgeUnavailable)?;
    tracing::info!(bridge = bridge.name(), mode = options.mode.digit(), "dispatching launch");
    let raw = bridge
        .invoke(LAUNCH_CODEX, launch_args(options))
        .map_err(|err| {
            tracing::error!(%err, "launch failed");
            match err {
                BridgeError::Rejected(Some(message)) => LauncherError::Dispatch(message),
                BridgeError::Rejected(None) => LauncherError::Dispatch(EXECUTION_FAILED.to_string()),
                other => LauncherError::Dispatch(other.to_string()),
            }
        })?;
    if is_empty_reply(&raw) {
        tracing::warn!(reply = %raw, "bridge returned no launch result");
        return Ok(None);
    }
    let field = |name: &str| {
        raw.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    Ok(Some(Launched {
        command: field("command").unwrap_or_else(|| synthesize(options)),
        terminal: field("terminal").unwrap_or_else(|| UNKNOWN_TERMINAL.to_string()),
    }))
}

/// Null, `false`, zero and the empty string count as no answer; anything else is a launch.
fn is_empty_reply(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
