use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

use crate::command::{effective_script_path, synthesize_with_script};
use crate::config::{expand_path, BridgeConfig, Config, HostBridgeMode, HostConfig};
use crate::error::EXECUTION_FAILED;
use crate::form::{LaunchOptions, Visibility, DEFAULT_SCRIPT_PATH};
use crate::registry::{InstallDetection, WorkspaceInfo, DEFAULT_BASE_URL};
use crate::validate::validate;

pub const LAUNCH_CODEX: &str = "launch_codex";
pub const CHECK_INSTALL_STATE: &str = "check_install_state";
pub const OPEN_WORKSPACE_URL: &str = "open_workspace_url";
pub const BRIDGE_ENV: &str = "CODEX_LAUNCHER_BRIDGE";

const LAUNCH_TRAILER: &str =
    "; echo \"\"; echo \"Process complete.\"; read -p \"Press Enter to close...\" _";
const ANCESTOR_DEPTH: usize = 6;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{}", .0.as_deref().unwrap_or(EXECUTION_FAILED))]
    Rejected(Option<String>),
    #[error("bridge transport error: {0}")]
    Transport(String),
    #[error("unknown bridge command '{0}'")]
    UnknownCommand(String),
}

/// Optional host capability able to run privileged operations for us.
pub trait Bridge {
    fn name(&self) -> &str;

    fn invoke(&self, command: &str, args: Value) -> Result<Value, BridgeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchResult {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub terminal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LaunchRequest {
    options: LaunchOptions,
}

#[derive(Debug, Deserialize)]
struct OpenUrlRequest {
    url: String,
}

/// Bridge provided by another program speaking JSON over stdin/stdout.
pub struct ExternalBridge {
    program: PathBuf,
    name: String,
}

impl ExternalBridge {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let name = program.display().to_string();
        Self { program, name }
    }
}

impl Bridge for ExternalBridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, command: &str, args: Value) -> Result<Value, BridgeError> {
        let payload = serde_json::to_string(&args)
            .map_err(|err| BridgeError::Transport(format!("failed to encode args: {err}")))?;
        let mut child = Command::new(&self.program)
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                BridgeError::Transport(format!("failed to start {}: {err}", self.name))
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(payload.as_bytes()) {
                if err.kind() != io::ErrorKind::BrokenPipe {
                    return Err(BridgeError::Transport(format!(
                        "failed to write to {}: {err}",
                        self.name
                    )));
                }
            }
        }
        let output = child
            .wait_with_output()
            .map_err(|err| BridgeError::Transport(format!("{} did not finish: {err}", self.name)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(bridge = %self.name, command, status = ?output.status.code(), "bridge call rejected");
            return Err(BridgeError::Rejected((!stderr.is_empty()).then_some(stderr)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(trimmed)
            .map_err(|err| BridgeError::Transport(format!("{} returned invalid JSON: {err}", self.name)))
    }
}

pub trait ProcessSpawner {
    fn spawn(&self, program: &str, args: &[String]) -> Result<(), io::Error>;
}

pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    fn spawn(&self, program: &str, args: &[String]) -> Result<(), io::Error> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }
}

fn terminal_candidates(command: &str) -> Vec<(&'static str, Vec<String>)> {
    let with = |prefix: &[&str]| -> Vec<String> {
        prefix
            .iter()
            .map(|part| part.to_string())
            .chain(["bash", "-lc", command].iter().map(|part| part.to_string()))
            .collect()
    };
    vec![
        ("x-terminal-emulator", with(&["-e"])),
        ("gnome-terminal", with(&["--"])),
        ("mate-terminal", with(&["-e"])),
        ("konsole", with(&["-e"])),
        ("kitty", with(&[])),
        ("tilix", with(&["-e"])),
        ("xfce4-terminal", with(&["-e"])),
        ("wezterm", with(&["start", "--"])),
        ("foot", with(&["-e"])),
        ("terminator", with(&["-e"])),
        ("alacritty", with(&["-e"])),
        ("xterm", with(&["-e"])),
        ("urxvt", with(&["-e"])),
        ("qterminal", with(&["-e"])),
        ("lxterminal", with(&["-e"])),
    ]
}

/// Terminal emulators tried in order when no terminal is configured.
pub fn known_terminals() -> Vec<&'static str> {
    terminal_candidates("")
        .into_iter()
        .map(|(name, _)| name)
        .collect()
}

pub fn platform_opener() -> Option<PathBuf> {
    let name = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    which::which(name).ok()
}

pub fn open_with_system<S: ProcessSpawner>(spawner: &S, url: &str) -> Result<(), String> {
    let opener = platform_opener()
        .ok_or_else(|| format!("no URL opener found; open {url} in your browser"))?;
    spawner
        .spawn(&opener.to_string_lossy(), &[url.to_string()])
        .map_err(|err| format!("could not open {url}: {err}"))
}

/// Resolves the setup script the way an installed launcher finds it: as given,
/// then walking up from `cwd`, then next to the executable.
pub fn resolve_script_path(
    candidate: &str,
    cwd: Option<&Path>,
    resource_dirs: &[PathBuf],
) -> Result<PathBuf, String> {
    let trimmed = candidate.trim();
    let fallback = if trimmed.is_empty() {
        DEFAULT_SCRIPT_PATH
    } else {
        trimmed
    };
    let raw_path = Path::new(fallback);
    let canonical = |path: &Path| {
        path.canonicalize()
            .map_err(|err| format!("could not resolve the script path: {err}"))
    };

    if raw_path.is_absolute() {
        if raw_path.exists() {
            return canonical(raw_path);
        }
        return Err(format!("script not found at {}", raw_path.display()));
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    let mut push = |path: PathBuf| {
        if !candidates.contains(&path) {
            candidates.push(path);
        }
    };
    if let Some(cwd) = cwd {
        for dir in cwd.ancestors().take(ANCESTOR_DEPTH) {
            push(dir.join(raw_path));
        }
        if let Some(file_name) = raw_path.file_name() {
            for dir in cwd.ancestors().take(ANCESTOR_DEPTH) {
                push(dir.join(file_name));
            }
        }
    }
    for dir in resource_dirs {
        for resource in [fallback, DEFAULT_SCRIPT_PATH, "resources/codex-setup.sh"] {
            push(dir.join(resource));
        }
    }

    for path in &candidates {
        if path.is_file() {
            return canonical(path);
        }
    }
    Err(format!(
        "could not find the script; adjust the path manually (current value: {fallback})"
    ))
}

pub fn detect_base_url(codex_home: &Path, env_override: Option<&str>) -> String {
    if let Some(candidate) = env_override {
        let trimmed = candidate.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    for hint in ["base-url.txt", ".base-url", "BASE_URL"] {
        if let Ok(contents) = fs::read_to_string(codex_home.join(hint)) {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    DEFAULT_BASE_URL.to_string()
}

pub fn collect_workspaces(users_dir: &Path) -> Result<Vec<WorkspaceInfo>, String> {
    let read_dir = fs::read_dir(users_dir)
        .map_err(|err| format!("could not read {}: {err}", users_dir.display()))?;
    let mut entries: Vec<(u16, WorkspaceInfo)> = Vec::new();
    for entry in read_dir {
        let entry = entry
            .map_err(|err| format!("could not read an entry in {}: {err}", users_dir.display()))?;
        let file_type = entry
            .file_type()
            .map_err(|err| format!("could not stat {}: {err}", entry.path().display()))?;
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(number) = name.strip_prefix("user") else {
            continue;
        };
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let order = number.parse::<u16>().unwrap_or(0);
        if order == 0 {
            continue;
        }
        entries.push((
            order,
            WorkspaceInfo {
                id: name.to_string(),
                label: format!("Workspace {order}"),
                href: format!("/{name}/"),
            },
        ));
    }
    entries.sort_by_key(|(order, _)| *order);
    Ok(entries.into_iter().map(|(_, info)| info).collect())
}

pub fn detect_install_state(
    codex_home: &Path,
    base_url_override: Option<&str>,
) -> Result<InstallDetection, String> {
    let users_dir = codex_home.join("users");
    let base_url = detect_base_url(codex_home, base_url_override);
    if !users_dir.is_dir() {
        return Ok(InstallDetection {
            installed: false,
            base_url,
            workspaces: Vec::new(),
        });
    }
    let workspaces = collect_workspaces(&users_dir)?;
    Ok(InstallDetection {
        installed: !workspaces.is_empty(),
        base_url,
        workspaces,
    })
}

/// In-process bridge: the native half of the launcher.
pub struct HostBridge<S: ProcessSpawner = SystemSpawner> {
    codex_home: PathBuf,
    terminal_override: Option<String>,
    base_url_override: Option<String>,
    cwd: Option<PathBuf>,
    resource_dirs: Vec<PathBuf>,
    spawner: S,
}

impl HostBridge<SystemSpawner> {
    pub fn from_config(cfg: &HostConfig) -> Self {
        let terminal_override = Some(cfg.terminal.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| env::var("TERMINAL").ok().filter(|value| !value.trim().is_empty()));
        let resource_dirs = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .map(|dir| vec![dir.clone(), dir.join("resources")])
            .unwrap_or_default();
        Self {
            codex_home: PathBuf::from(expand_path(&cfg.codex_home)),
            terminal_override,
            base_url_override: env::var("CODEX_BASE_URL").ok(),
            cwd: env::current_dir().ok(),
            resource_dirs,
            spawner: SystemSpawner,
        }
    }
}

impl<S: ProcessSpawner> HostBridge<S> {
    pub fn launch_codex(&self, options: &LaunchOptions) -> Result<LaunchResult, String> {
        tracing::info!(?options, "launch_codex invoked");
        validate(options, Visibility::for_mode(options.mode)).map_err(|err| err.to_string())?;
        let script = resolve_script_path(
            effective_script_path(options),
            self.cwd.as_deref(),
            &self.resource_dirs,
        )?;
        let mut command = synthesize_with_script(options, &script.to_string_lossy());
        command.push_str(LAUNCH_TRAILER);
        tracing::info!(%command, "launch_codex computed command");
        let terminal = self.spawn_terminal(&command)?;
        Ok(LaunchResult {
            command,
            terminal: Some(terminal),
        })
    }

    pub fn check_install_state(&self) -> Result<InstallDetection, String> {
        detect_install_state(&self.codex_home, self.base_url_override.as_deref())
    }

    pub fn open_workspace_url(&self, url: &str) -> Result<(), String> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err("the URL is empty".to_string());
        }
        open_with_system(&self.spawner, trimmed)
    }

    fn spawn_terminal(&self, command: &str) -> Result<String, String> {
        if let Some(custom) = &self.terminal_override {
            let args: Vec<String> = ["-e", "bash", "-lc", command]
                .iter()
                .map(|part| part.to_string())
                .collect();
            match self.spawner.spawn(custom, &args) {
                Ok(()) => return Ok(custom.clone()),
                Err(err) => tracing::warn!(terminal = %custom, %err, "configured terminal failed"),
            }
        }

        let mut last_err: Option<io::Error> = None;
        for (binary, args) in terminal_candidates(command) {
            match self.spawner.spawn(binary, &args) {
                Ok(()) => return Ok(binary.to_string()),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err
            .map(|err| format!("could not open a terminal: {err}"))
            .unwrap_or_else(|| "no supported terminal emulator found".to_string()))
    }
}

impl<S: ProcessSpawner> Bridge for HostBridge<S> {
    fn name(&self) -> &str {
        "host"
    }

    fn invoke(&self, command: &str, args: Value) -> Result<Value, BridgeError> {
        let rejected = |message: String| BridgeError::Rejected(Some(message));
        let encode = |value: Result<Value, serde_json::Error>| {
            value.map_err(|err| BridgeError::Transport(err.to_string()))
        };
        match command {
            LAUNCH_CODEX => {
                let request: LaunchRequest = serde_json::from_value(args)
                    .map_err(|err| rejected(format!("invalid launch payload: {err}")))?;
                let result = self.launch_codex(&request.options).map_err(rejected)?;
                encode(serde_json::to_value(result))
            }
            CHECK_INSTALL_STATE => {
                let detection = self.check_install_state().map_err(rejected)?;
                encode(serde_json::to_value(detection))
            }
            OPEN_WORKSPACE_URL => {
                let request: OpenUrlRequest = serde_json::from_value(args)
                    .map_err(|err| rejected(format!("invalid open payload: {err}")))?;
                self.open_workspace_url(&request.url).map_err(rejected)?;
                Ok(Value::Null)
            }
            other => Err(BridgeError::UnknownCommand(other.to_string())),
        }
    }
}

pub fn launch_args(options: &LaunchOptions) -> Value {
    json!({ "options": options })
}

pub fn open_url_args(url: &str) -> Value {
    json!({ "url": url })
}

/// Process-level facts the resolver probes.
#[derive(Debug, Clone, Default)]
pub struct BridgeProbe {
    pub disabled: bool,
    pub env_program: Option<String>,
    pub graphical_session: bool,
}

impl BridgeProbe {
    pub fn from_env(disabled: bool) -> Self {
        let set = |key: &str| env::var(key).map(|v| !v.trim().is_empty()).unwrap_or(false);
        Self {
            disabled,
            env_program: env::var(BRIDGE_ENV).ok(),
            graphical_session: cfg!(target_os = "macos") || set("DISPLAY") || set("WAYLAND_DISPLAY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeChoice {
    External(PathBuf),
    Host,
}

type Provider = fn(&BridgeProbe, &BridgeConfig) -> Option<BridgeChoice>;

fn program_choice(value: Option<&str>) -> Option<BridgeChoice> {
    value
        .map(str::trim)
        .filter(|program| !program.is_empty())
        .map(|program| BridgeChoice::External(PathBuf::from(expand_path(program))))
}

fn env_program(probe: &BridgeProbe, _cfg: &BridgeConfig) -> Option<BridgeChoice> {
    program_choice(probe.env_program.as_deref())
}

fn config_program(_probe: &BridgeProbe, cfg: &BridgeConfig) -> Option<BridgeChoice> {
    program_choice(Some(&cfg.program))
}

fn host_session(probe: &BridgeProbe, cfg: &BridgeConfig) -> Option<BridgeChoice> {
    match cfg.host {
        HostBridgeMode::Always => Some(BridgeChoice::Host),
        HostBridgeMode::Auto if probe.graphical_session => Some(BridgeChoice::Host),
        _ => None,
    }
}

/// Probed in order; the first provider that answers wins.
const PROVIDERS: [Provider; 3] = [env_program, config_program, host_session];

pub fn choose_bridge(probe: &BridgeProbe, cfg: &BridgeConfig) -> Option<BridgeChoice> {
    if probe.disabled {
        return None;
    }
    PROVIDERS.iter().find_map(|provider| provider(probe, cfg))
}

pub fn resolve_bridge(probe: &BridgeProbe, cfg: &Config) -> Option<Box<dyn Bridge>> {
    let choice = choose_bridge(probe, &cfg.bridge);
    tracing::debug!(?choice, "bridge resolution");
    match choice? {
        BridgeChoice::External(program) => Some(Box::new(ExternalBridge::new(program))),
        BridgeChoice::Host => Some(Box::new(HostBridge::from_config(&cfg.host))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::Mode;
    use std::cell::RefCell;
    use tempfile::tempdir;

    #[derive(Default)]
    struct MockSpawner {
        calls: RefCell<Vec<(String, Vec<String>)>>,
        available: Vec<&'static str>,
    }

    impl ProcessSpawner for MockSpawner {
        fn spawn(&self, program: &str, args: &[String]) -> Result<(), io::Error> {
            self.calls
                .borrow_mut()
                .push((program.to_string(), args.to_vec()));
            if self.available.iter().any(|name| *name == program) {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::NotFound, "not installed"))
            }
        }
    }

    fn host(dir: &Path, spawner: MockSpawner) -> HostBridge<MockSpawner> {
        HostBridge {
            codex_home: dir.join("codex"),
            terminal_override: None,
            base_url_override: None,
            cwd: Some(dir.to_path_buf()),
            resource_dirs: Vec::new(),
            spawner,
        }
    }

    fn lan_options(script: &str) -> LaunchOptions {
        LaunchOptions {
            mode: Mode::LocalNetwork,
            workspace_count: Some(2),
            domain: None,
            script_path: script.to_string(),
            confirm_uninstall: false,
        }
    }

    #[test]
    fn launch_uses_first_available_terminal() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("codex-setup.sh");
        fs::write(&script, "#!/bin/bash\n").unwrap();
        let spawner = MockSpawner {
            available: vec!["konsole"],
            ..MockSpawner::default()
        };
        let bridge = host(dir.path(), spawner);

        let result = bridge.launch_codex(&lan_options("codex-setup.sh")).unwrap();
        assert_eq!(result.terminal.as_deref(), Some("konsole"));
        let canonical = script.canonicalize().unwrap();
        assert!(result
            .command
            .contains(&format!("sudo -E /bin/bash \"{}\"", canonical.display())));
        assert!(result.command.ends_with(LAUNCH_TRAILER));

        let calls = bridge.spawner.calls.borrow();
        let names: Vec<&str> = calls.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["x-terminal-emulator", "gnome-terminal", "mate-terminal", "konsole"]);
        assert_eq!(calls[3].1[..3], ["-e".to_string(), "bash".to_string(), "-lc".to_string()]);
        assert_eq!(calls[3].1[3], result.command);
    }

    #[test]
    fn launch_prefers_configured_terminal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("codex-setup.sh"), "").unwrap();
        let spawner = MockSpawner {
            available: vec!["my-term"],
            ..MockSpawner::default()
        };
        let mut bridge = host(dir.path(), spawner);
        bridge.terminal_override = Some("my-term".to_string());
        let result = bridge.launch_codex(&lan_options("")).unwrap();
        assert_eq!(result.terminal.as_deref(), Some("my-term"));
        assert_eq!(bridge.spawner.calls.borrow().len(), 1);
    }

    #[test]
    fn launch_reports_missing_terminals() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("codex-setup.sh"), "").unwrap();
        let bridge = host(dir.path(), MockSpawner::default());
        let err = bridge.launch_codex(&lan_options("codex-setup.sh")).unwrap_err();
        assert!(err.starts_with("could not open a terminal"));
    }

    #[test]
    fn launch_revalidates_payload() {
        let dir = tempdir().unwrap();
        let bridge = host(dir.path(), MockSpawner::default());
        let mut options = lan_options("codex-setup.sh");
        options.workspace_count = Some(99);
        let err = bridge.launch_codex(&options).unwrap_err();
        assert!(err.contains("between 1 and 30"));
        assert!(bridge.spawner.calls.borrow().is_empty());
    }

    #[test]
    fn invoke_maps_failures_to_rejections() {
        let dir = tempdir().unwrap();
        let bridge = host(dir.path(), MockSpawner::default());
        let err = bridge
            .invoke(LAUNCH_CODEX, launch_args(&lan_options("/definitely/missing.sh")))
            .unwrap_err();
        match err {
            BridgeError::Rejected(Some(message)) => assert!(message.contains("script not found")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            bridge.invoke("reboot", Value::Null),
            Err(BridgeError::UnknownCommand(_))
        ));
        assert!(matches!(
            bridge.invoke(OPEN_WORKSPACE_URL, open_url_args("   ")),
            Err(BridgeError::Rejected(Some(_)))
        ));
    }

    #[test]
    fn script_is_found_in_ancestor_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("codex-setup.sh"), "").unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        let found = resolve_script_path("codex-setup.sh", Some(&nested), &[]).unwrap();
        assert_eq!(found, dir.path().join("codex-setup.sh").canonicalize().unwrap());

        let by_name = resolve_script_path("scripts/codex-setup.sh", Some(&nested), &[]).unwrap();
        assert_eq!(by_name, found);
    }

    #[test]
    fn script_is_found_in_resource_dir() {
        let dir = tempdir().unwrap();
        let resources = dir.path().join("bundle");
        fs::create_dir_all(resources.join("resources")).unwrap();
        fs::write(resources.join("resources").join("codex-setup.sh"), "").unwrap();
        let cwd = dir.path().join("elsewhere");
        fs::create_dir_all(&cwd).unwrap();
        let found = resolve_script_path("custom.sh", Some(&cwd), &[resources.clone()]).unwrap();
        assert!(found.ends_with("resources/codex-setup.sh"));
    }

    #[test]
    fn missing_script_is_actionable() {
        let dir = tempdir().unwrap();
        let err = resolve_script_path("nope.sh", Some(dir.path()), &[]).unwrap_err();
        assert!(err.contains("current value: nope.sh"));
    }

    #[test]
    fn install_state_lists_numbered_user_dirs() {
        let dir = tempdir().unwrap();
        let home = dir.path().join("codex");
        for name in ["user10", "user2", "user0", "userx", "admin"] {
            fs::create_dir_all(home.join("users").join(name)).unwrap();
        }
        fs::write(home.join("users").join("user3"), "not a dir").unwrap();
        fs::write(home.join("base-url.txt"), "  https://box.tail.ts.net \n").unwrap();

        let detection = detect_install_state(&home, None).unwrap();
        assert!(detection.installed);
        assert_eq!(detection.base_url, "https://box.tail.ts.net");
        let ids: Vec<&str> = detection.workspaces.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["user2", "user10"]);
        assert_eq!(detection.workspaces[1].label, "Workspace 10");
        assert_eq!(detection.workspaces[1].href, "/user10/");
    }

    #[test]
    fn install_state_without_users_dir() {
        let dir = tempdir().unwrap();
        let detection = detect_install_state(dir.path(), Some("http://override")).unwrap();
        assert!(!detection.installed);
        assert_eq!(detection.base_url, "http://override");
    }

    #[test]
    fn resolver_probes_providers_in_order() {
        let cfg = BridgeConfig {
            program: "/opt/bridge".to_string(),
            host: HostBridgeMode::Always,
        };
        let probe = BridgeProbe {
            env_program: Some("/env/bridge".to_string()),
            ..BridgeProbe::default()
        };
        assert_eq!(
            choose_bridge(&probe, &cfg),
            Some(BridgeChoice::External(PathBuf::from("/env/bridge")))
        );
        assert_eq!(
            choose_bridge(&BridgeProbe::default(), &cfg),
            Some(BridgeChoice::External(PathBuf::from("/opt/bridge")))
        );
        let host_only = BridgeConfig {
            program: " ".to_string(),
            host: HostBridgeMode::Always,
        };
        assert_eq!(
            choose_bridge(&BridgeProbe::default(), &host_only),
            Some(BridgeChoice::Host)
        );
        let disabled = BridgeProbe {
            disabled: true,
            ..probe
        };
        assert_eq!(choose_bridge(&disabled, &cfg), None);
    }

    #[test]
    fn auto_host_needs_graphical_session() {
        let cfg = BridgeConfig::default();
        assert_eq!(choose_bridge(&BridgeProbe::default(), &cfg), None);
        let graphical = BridgeProbe {
            graphical_session: true,
            ..BridgeProbe::default()
        };
        assert_eq!(choose_bridge(&graphical, &cfg), Some(BridgeChoice::Host));
        let never = BridgeConfig {
            host: HostBridgeMode::Never,
            ..BridgeConfig::default()
        };
        assert_eq!(choose_bridge(&graphical, &never), None);
    }

    #[test]
    fn rejection_without_message_is_generic() {
        assert_eq!(BridgeError::Rejected(None).to_string(), EXECUTION_FAILED);
        assert_eq!(
            BridgeError::Rejected(Some("sudo: no tty".to_string())).to_string(),
            "sudo: no tty"
        );
    }

    #[cfg(unix)]
    #[test]
    fn external_bridge_speaks_json_over_stdio() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let program = dir.path().join("bridge.sh");
        fs::write(
            &program,
            "#!/bin/sh\ncat > \"$(dirname \"$0\")/args-$1.json\"\ncase \"$1\" in\n  launch_codex) echo '{\"command\":\"x\",\"terminal\":\"kitty\"}' ;;\n  open_workspace_url) ;;\n  *) echo 'boom' >&2; exit 3 ;;\nesac\n",
        )
        .unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
        let bridge = ExternalBridge::new(&program);

        let value = bridge
            .invoke(LAUNCH_CODEX, launch_args(&lan_options("codex-setup.sh")))
            .unwrap();
        assert_eq!(value["terminal"], "kitty");
        let sent: Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("args-launch_codex.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(sent["options"]["mode"], 2);

        assert_eq!(
            bridge.invoke(OPEN_WORKSPACE_URL, open_url_args("http://h/")).unwrap(),
            Value::Null
        );
        match bridge.invoke(CHECK_INSTALL_STATE, Value::Null) {
            Err(BridgeError::Rejected(Some(message))) => assert_eq!(message, "boom"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
