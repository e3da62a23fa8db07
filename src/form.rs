use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::command::synthesize;

pub const DEFAULT_SCRIPT_PATH: &str = "codex-setup.sh";
pub const MIN_WORKSPACES: i64 = 1;
pub const MAX_WORKSPACES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(into = "u8", try_from = "u8")]
pub enum Mode {
    /// Remote access through a Tailscale tunnel.
    Tunnel,
    /// Plain local-network deployment.
    #[value(name = "lan")]
    LocalNetwork,
    Uninstall,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Tunnel, Mode::LocalNetwork, Mode::Uninstall];

    pub fn digit(self) -> u8 {
        match self {
            Mode::Tunnel => 1,
            Mode::LocalNetwork => 2,
            Mode::Uninstall => 3,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Mode::Tunnel => "Tailscale tunnel",
            Mode::LocalNetwork => "Local network",
            Mode::Uninstall => "Uninstall",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Mode::Tunnel => "Expose workspaces through your tailnet domain",
            Mode::LocalNetwork => "Serve workspaces on this machine's LAN address",
            Mode::Uninstall => "Remove every workspace and the installed services",
        }
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> Self {
        mode.digit()
    }
}

impl TryFrom<u8> for Mode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Mode::Tunnel),
            2 => Ok(Mode::LocalNetwork),
            3 => Ok(Mode::Uninstall),
            other => Err(format!("unsupported mode {other}")),
        }
    }
}

/// Which fields carry meaning for a given mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Visibility {
    pub domain_applicable: bool,
    pub count_applicable: bool,
    pub uninstall_applicable: bool,
}

impl Visibility {
    pub fn for_mode(mode: Mode) -> Self {
        Self {
            domain_applicable: mode == Mode::Tunnel,
            count_applicable: mode != Mode::Uninstall,
            uninstall_applicable: mode == Mode::Uninstall,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    pub mode: Mode,
    pub domain: String,
    pub workspace_count: i64,
    pub script_path: String,
    pub confirm_uninstall: bool,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            mode: Mode::Tunnel,
            domain: String::new(),
            workspace_count: MIN_WORKSPACES,
            script_path: DEFAULT_SCRIPT_PATH.to_string(),
            confirm_uninstall: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormAction {
    SetMode(Mode),
    SetDomain(String),
    SetWorkspaceCount(i64),
    SetScriptPath(String),
    SetConfirmUninstall(bool),
}

pub fn reduce(state: &FormState, action: FormAction) -> FormState {
    let mut next = state.clone();
    match action {
        FormAction::SetMode(mode) => {
            next.mode = mode;
            if mode != Mode::Uninstall {
                next.confirm_uninstall = false;
            }
        }
        FormAction::SetDomain(domain) => next.domain = domain,
        FormAction::SetWorkspaceCount(count) => next.workspace_count = count,
        FormAction::SetScriptPath(path) => next.script_path = path,
        FormAction::SetConfirmUninstall(value) => next.confirm_uninstall = value,
    }
    next
}

/// Mode-scoped view of the form. Fields that do not apply to `mode` are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub mode: Mode,
    #[serde(rename = "num_users")]
    pub workspace_count: Option<i64>,
    pub domain: Option<String>,
    pub script_path: String,
    #[serde(default)]
    pub confirm_uninstall: bool,
}

impl LaunchOptions {
    pub fn from_state(state: &FormState, visibility: Visibility) -> Self {
        Self {
            mode: state.mode,
            workspace_count: visibility
                .count_applicable
                .then_some(state.workspace_count),
            domain: visibility
                .domain_applicable
                .then(|| state.domain.trim().to_string()),
            script_path: state.script_path.trim().to_string(),
            confirm_uninstall: state.confirm_uninstall,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derived {
    pub visibility: Visibility,
    pub options: LaunchOptions,
    pub command: String,
}

pub fn derive(state: &FormState) -> Derived {
    let visibility = Visibility::for_mode(state.mode);
    let options = LaunchOptions::from_state(state, visibility);
    let command = synthesize(&options);
    Derived {
        visibility,
        options,
        command,
    }
}

/// Form state paired with its derived values. The only mutator is `apply`,
/// which re-derives before returning.
#[derive(Debug, Clone)]
pub struct FormSession {
    state: FormState,
    derived: Derived,
}

impl FormSession {
    pub fn new(state: FormState) -> Self {
        let derived = derive(&state);
        Self { state, derived }
    }

    pub fn apply(&mut self, action: FormAction) -> &Derived {
        self.state = reduce(&self.state, action);
        self.derived = derive(&self.state);
        &self.derived
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn derived(&self) -> &Derived {
        &self.derived
    }
}
