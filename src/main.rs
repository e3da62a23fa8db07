mod bridge;
mod clipboard;
mod command;
mod config;
mod discovery;
mod dispatch;
mod error;
mod form;
mod logging;
mod registry;
mod status;
mod validate;

use clap::{Args, Parser, Subcommand};
use dialoguer::console::{style, Term};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::time::Duration;

use crate::bridge::{
    known_terminals, open_url_args, open_with_system, platform_opener, resolve_bridge,
    resolve_script_path, Bridge, BridgeProbe, HostBridge, SystemSpawner,
    OPEN_WORKSPACE_URL,
};
use crate::clipboard::{copy_command, SystemClipboard};
use crate::config::{
    ensure_parent, load_config, read_config, resolve_config_path, Config, DEFAULT_CONFIG_YAML,
};
use crate::discovery::{
    run_until, Clock, DiscoveryScheduler, RunSummary, Snapshot, StopWhen, SystemClock,
};
use crate::dispatch::{dispatch, Launched};
use crate::error::LauncherError;
use crate::form::{Derived, FormAction, FormSession, FormState, Mode};
use crate::registry::{BridgeRegistry, HttpRegistry, RegistrySource, WorkspaceInfo};
use crate::status::Status;
use crate::validate::validate;

#[derive(Parser, Debug)]
#[command(name = "codex-launcher", version, about = "Codex setup launcher")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    /// Never use a bridge; print commands for manual use instead.
    #[arg(long, global = true)]
    no_bridge: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct FormArgs {
    #[arg(long, value_enum, default_value_t = Mode::Tunnel)]
    mode: Mode,
    /// Tailscale domain (tunnel mode only).
    #[arg(long, default_value = "")]
    domain: String,
    /// Number of workspaces, 1-30 (ignored for uninstall).
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    count: i64,
    #[arg(long)]
    script: Option<String>,
    #[arg(long)]
    confirm_uninstall: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive setup form.
    Setup,
    Preview {
        #[command(flatten)]
        form: FormArgs,
    },
    Launch {
        #[command(flatten)]
        form: FormArgs,
        /// Skip the workspace re-poll after dispatch.
        #[arg(long)]
        no_watch: bool,
    },
    Copy {
        #[command(flatten)]
        form: FormArgs,
        /// Linux only: seconds to keep the selection alive for another program to take it.
        #[arg(long, default_value_t = 10)]
        hold_sec: u64,
    },
    Workspaces {
        #[command(subcommand)]
        command: WorkspacesCommand,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    Doctor,
    #[command(hide = true)]
    Bridge { command: String },
}

#[derive(Subcommand, Debug)]
enum WorkspacesCommand {
    List,
    Open {
        id: Option<String>,
        #[arg(long)]
        url_only: bool,
        /// Re-poll the registry afterwards.
        #[arg(long)]
        watch: bool,
    },
    Watch {
        #[arg(long)]
        timeout_sec: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Init,
    Validate,
    Path,
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_details: Option<ErrorDetails>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

fn extract_error_details(err: &LauncherError) -> Option<ErrorDetails> {
    match err {
        LauncherError::ManualLaunch { command, payload } => Some(ErrorDetails {
            hint: Some("Copy the command and run it in a terminal.".to_string()),
            command: Some(command.clone()),
            payload: Some(payload.clone()),
        }),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct Context {
    config_path: PathBuf,
    json: bool,
    no_bridge: bool,
    log_dir: Option<PathBuf>,
}

impl Context {
    fn load_config(&self) -> Result<Config, LauncherError> {
        load_config(&self.config_path)
    }

    fn bridge(&self, cfg: &Config) -> Option<Box<dyn Bridge>> {
        resolve_bridge(&BridgeProbe::from_env(self.no_bridge), cfg)
    }
}

fn main() -> Result<(), LauncherError> {
    let cli = Cli::parse();
    let log_guard = logging::init();
    let ctx = Context {
        config_path: resolve_config_path(cli.config.as_ref()),
        json: cli.json,
        no_bridge: cli.no_bridge,
        log_dir: log_guard.as_ref().map(|guard| guard.log_dir().to_path_buf()),
    };
    tracing::debug!(command = ?cli.command, config = %ctx.config_path.display(), "starting");

    let result = match cli.command {
        Commands::Setup => handle_setup(&ctx),
        Commands::Preview { form } => handle_preview(&ctx, form),
        Commands::Launch { form, no_watch } => handle_launch(&ctx, form, no_watch),
        Commands::Copy { form, hold_sec } => handle_copy(&ctx, form, hold_sec),
        Commands::Workspaces { command } => handle_workspaces(&ctx, command),
        Commands::Config { command } => handle_config(&ctx, command),
        Commands::Doctor => handle_doctor(&ctx),
        Commands::Bridge { command } => handle_bridge(&ctx, &command),
    };

    if let Err(err) = result {
        tracing::error!(%err, code = err.code(), "command failed");
        if ctx.json {
            let payload = JsonResult::<Value> {
                ok: false,
                result: None,
                error: Some(err.to_string()),
                error_code: Some(err.code().to_string()),
                error_details: extract_error_details(&err),
            };
            print_json(&payload)?;
        } else {
            eprintln!("{err}");
        }
        drop(log_guard);
        std::process::exit(1);
    }

    Ok(())
}

fn initial_state(cfg: &Config, form: Option<&FormArgs>) -> FormState {
    let mut state = FormState {
        script_path: cfg.default_script_path().to_string(),
        ..FormState::default()
    };
    if let Some(form) = form {
        state.mode = form.mode;
        state.domain = form.domain.clone();
        state.workspace_count = form.count;
        state.confirm_uninstall = form.confirm_uninstall;
        if let Some(script) = &form.script {
            state.script_path = script.clone();
        }
    }
    state
}

fn registry_source<'a>(
    cfg: &Config,
    bridge: Option<&'a dyn Bridge>,
) -> Box<dyn RegistrySource + 'a> {
    match bridge {
        Some(bridge) => Box::new(BridgeRegistry::new(bridge)),
        None => Box::new(HttpRegistry::new(
            cfg.registry.url.trim(),
            Duration::from_secs(cfg.registry.timeout_sec),
        )),
    }
}

fn fetch_once(source: &dyn RegistrySource) -> Snapshot {
    let mut scheduler = DiscoveryScheduler::new();
    scheduler.begin_fetch();
    let result = source.fetch().map_err(|err| {
        tracing::warn!(source = %source.describe(), %err, "registry fetch failed");
        err.to_string()
    });
    scheduler.complete(0, result);
    scheduler.snapshot().clone()
}

fn snapshot_status(snapshot: &Snapshot) -> Status {
    match snapshot {
        Snapshot::Idle => Status::info("Detecting installed workspaces..."),
        Snapshot::Installed { registry } => Status::info(format!(
            "{} workspace(s) ready at {}",
            registry.workspaces.len(),
            registry.base_url
        )),
        Snapshot::NotInstalled { .. } => {
            Status::info("No workspaces installed yet. Run the setup to create them.")
        }
        Snapshot::Unknown { error } => {
            Status::error(format!("Could not load the workspace list ({error})"))
        }
    }
}

fn print_workspaces(snapshot: &Snapshot) {
    snapshot_status(snapshot).emit();
    if let Some(registry) = snapshot.registry() {
        for workspace in &registry.workspaces {
            println!(
                "  {} {}  {}",
                style(&workspace.id).bold(),
                workspace.label,
                style(registry.url_for(workspace)).dim()
            );
        }
    }
}

/// Runs discovery after a trigger that already happened on `scheduler`.
fn follow_discovery(
    ctx: &Context,
    scheduler: &mut DiscoveryScheduler,
    source: &dyn RegistrySource,
    clock: &SystemClock,
    stop: StopWhen,
    deadline_ms: Option<u64>,
) -> RunSummary {
    let quiet = ctx.json;
    run_until(scheduler, source, clock, stop, deadline_ms, |snapshot, changed| {
        if changed && !quiet {
            print_workspaces(snapshot);
        }
    })
}

fn handle_preview(ctx: &Context, form: FormArgs) -> Result<(), LauncherError> {
    let cfg = ctx.load_config()?;
    let session = FormSession::new(initial_state(&cfg, Some(&form)));
    let derived = session.derived();
    let validation = validate(&derived.options, derived.visibility);
    if ctx.json {
        return output(
            ctx,
            json!({
                "command": derived.command,
                "payload": derived.options,
                "visibility": derived.visibility,
                "valid": validation.is_ok(),
                "validation_error": validation.err().map(|err| err.to_string()),
            }),
        );
    }
    println!("{}", derived.command);
    if let Err(err) = validation {
        Status::error(err.to_string()).emit();
    }
    Ok(())
}

fn handle_launch(ctx: &Context, form: FormArgs, no_watch: bool) -> Result<(), LauncherError> {
    let cfg = ctx.load_config()?;
    let session = FormSession::new(initial_state(&cfg, Some(&form)));
    let derived = session.derived();
    validate(&derived.options, derived.visibility)?;

    let bridge = ctx.bridge(&cfg);
    if !ctx.json {
        Status::info("Opening a terminal...").emit();
    }
    let outcome = dispatch(bridge.as_deref(), &derived.options);

    if !ctx.json {
        launch_status(&outcome).emit();
        if matches!(outcome, Err(LauncherError::BridgeUnavailable)) {
            println!("Run this command manually:");
            println!("{}", derived.command);
        }
    }

    let discovery = if no_watch {
        None
    } else {
        let clock = SystemClock::new();
        let mut scheduler = DiscoveryScheduler::new();
        scheduler.trigger(clock.now_ms());
        let source = registry_source(&cfg, bridge.as_deref());
        let summary = follow_discovery(
            ctx,
            &mut scheduler,
            source.as_ref(),
            &clock,
            StopWhen::BurstDrained,
            None,
        );
        Some(json!({ "snapshot": scheduler.snapshot(), "summary": summary }))
    };

    let outcome = match outcome {
        Err(LauncherError::BridgeUnavailable) => Err(LauncherError::ManualLaunch {
            command: derived.command.clone(),
            payload: serde_json::to_value(&derived.options)?,
        }),
        other => other,
    };
    match outcome? {
        Some(launched) => {
            if ctx.json {
                return output(
                    ctx,
                    json!({
                        "launched": launched,
                        "preview": derived.command,
                        "discovery": discovery,
                    }),
                );
            }
            Ok(())
        }
        None => Err(LauncherError::NoResponse),
    }
}

fn launch_status(outcome: &Result<Option<Launched>, LauncherError>) -> Status {
    match outcome {
        Ok(Some(launched)) => Status::info(format!(
            "Terminal opened ({}). Follow the instructions there.",
            launched.terminal
        )),
        Ok(None) => Status::error("The bridge did not respond."),
        Err(err) => Status::error(err.to_string()),
    }
}

fn handle_copy(ctx: &Context, form: FormArgs, hold_sec: u64) -> Result<(), LauncherError> {
    let cfg = ctx.load_config()?;
    let session = FormSession::new(initial_state(&cfg, Some(&form)));
    let command = &session.derived().command;
    let mut clipboard = SystemClipboard::holding(Duration::from_secs(hold_sec));
    let status = match copy_command(&mut clipboard, command) {
        Ok(()) => Status::info("Command copied to the clipboard."),
        Err(err) => Status::error(format!("Could not copy the command: {err}")),
    };
    if ctx.json {
        return output(
            ctx,
            json!({
                "command": command,
                "copied": !status.is_error(),
                "status": status,
            }),
        );
    }
    println!("{command}");
    status.emit();
    Ok(())
}

fn open_url(bridge: Option<&dyn Bridge>, url: &str) -> Result<(), LauncherError> {
    match bridge {
        Some(bridge) => bridge
            .invoke(OPEN_WORKSPACE_URL, open_url_args(url))
            .map(|_| ())
            .map_err(|err| LauncherError::Dispatch(err.to_string())),
        None => open_with_system(&SystemSpawner, url).map_err(LauncherError::Process),
    }
}

fn handle_workspaces(ctx: &Context, command: WorkspacesCommand) -> Result<(), LauncherError> {
    let cfg = ctx.load_config()?;
    let bridge = ctx.bridge(&cfg);
    let source = registry_source(&cfg, bridge.as_deref());

    match command {
        WorkspacesCommand::List => {
            let snapshot = fetch_once(source.as_ref());
            if let Snapshot::Unknown { error } = &snapshot {
                return Err(LauncherError::Registry(error.clone()));
            }
            if ctx.json {
                return output(ctx, serde_json::to_value(&snapshot)?);
            }
            print_workspaces(&snapshot);
            Ok(())
        }
        WorkspacesCommand::Open { id, url_only, watch } => {
            let snapshot = fetch_once(source.as_ref());
            let registry = match &snapshot {
                Snapshot::Installed { registry } => registry,
                Snapshot::Unknown { error } => return Err(LauncherError::Registry(error.clone())),
                _ => {
                    return Err(LauncherError::Registry(
                        "no workspaces are installed yet".to_string(),
                    ))
                }
            };
            let workspace = match id.as_deref() {
                Some(id) => registry
                    .find(id)
                    .ok_or_else(|| LauncherError::Registry(format!("unknown workspace '{id}'")))?,
                None => registry
                    .select(None)
                    .ok_or_else(|| LauncherError::Registry("no workspaces listed".to_string()))?,
            };
            let url = registry.url_for(workspace);
            if !url_only {
                open_url(bridge.as_deref(), &url)
                    .inspect_err(|err| tracing::error!(%err, %url, "failed to open workspace"))?;
            }
            let discovery = if watch {
                let clock = SystemClock::new();
                let mut scheduler = DiscoveryScheduler::new();
                scheduler.trigger(clock.now_ms());
                Some(follow_discovery(
                    ctx,
                    &mut scheduler,
                    source.as_ref(),
                    &clock,
                    StopWhen::BurstDrained,
                    None,
                ))
            } else {
                None
            };
            if ctx.json {
                return output(
                    ctx,
                    json!({
                        "workspace": workspace,
                        "url": url,
                        "opened": !url_only,
                        "discovery": discovery,
                    }),
                );
            }
            if url_only {
                println!("{url}");
            } else {
                Status::info(format!("Opened {}.", workspace.label)).emit();
            }
            Ok(())
        }
        WorkspacesCommand::Watch { timeout_sec } => {
            let clock = SystemClock::new();
            let mut scheduler = DiscoveryScheduler::new();
            scheduler.trigger(clock.now_ms());
            if !ctx.json {
                Status::info(format!("Watching {}", source.describe())).emit();
            }
            let summary = follow_discovery(
                ctx,
                &mut scheduler,
                source.as_ref(),
                &clock,
                StopWhen::Installed,
                timeout_sec.map(|secs| secs.saturating_mul(1_000)),
            );
            if ctx.json {
                return output(
                    ctx,
                    json!({ "snapshot": scheduler.snapshot(), "summary": summary }),
                );
            }
            Ok(())
        }
    }
}

fn handle_config(ctx: &Context, command: ConfigCommand) -> Result<(), LauncherError> {
    match command {
        ConfigCommand::Init => {
            if ctx.config_path.exists() {
                return output(ctx, json!({"path": ctx.config_path, "created": false}));
            }
            ensure_parent(&ctx.config_path)?;
            fs::write(&ctx.config_path, DEFAULT_CONFIG_YAML)?;
            output(ctx, json!({"path": ctx.config_path, "created": true}))
        }
        ConfigCommand::Validate => {
            let _cfg = read_config(&ctx.config_path)?;
            output(ctx, json!({"path": ctx.config_path, "valid": true}))
        }
        ConfigCommand::Path => output(
            ctx,
            json!({
                "path": ctx.config_path,
                "exists": ctx.config_path.exists(),
                "log_dir": ctx.log_dir,
            }),
        ),
    }
}

#[derive(Debug, Clone, Serialize)]
struct DoctorCheck {
    id: String,
    ok: bool,
    severity: String,
    message: String,
    remediation: String,
}

fn doctor_check(
    id: &str,
    ok: bool,
    severity: &str,
    message: impl Into<String>,
    remediation: impl Into<String>,
) -> DoctorCheck {
    DoctorCheck {
        id: id.to_string(),
        ok,
        severity: severity.to_string(),
        message: message.into(),
        remediation: remediation.into(),
    }
}

fn collect_doctor_checks(ctx: &Context) -> Vec<DoctorCheck> {
    let mut checks = Vec::new();

    let cfg = match ctx.load_config() {
        Ok(cfg) => {
            checks.push(doctor_check(
                "config",
                true,
                "error",
                format!("config loaded from {}", ctx.config_path.display()),
                "",
            ));
            cfg
        }
        Err(err) => {
            checks.push(doctor_check(
                "config",
                false,
                "error",
                err.to_string(),
                format!("fix or delete {}", ctx.config_path.display()),
            ));
            return checks;
        }
    };

    let bridge = ctx.bridge(&cfg);
    checks.push(match &bridge {
        Some(bridge) => doctor_check(
            "bridge",
            true,
            "warn",
            format!("bridge available: {}", bridge.name()),
            "",
        ),
        None => doctor_check(
            "bridge",
            false,
            "warn",
            "no bridge available; launches fall back to copy/paste",
            "run inside a graphical session, set bridge.host: always, or point CODEX_LAUNCHER_BRIDGE at a bridge program",
        ),
    });

    let cwd = std::env::current_dir().ok();
    checks.push(
        match resolve_script_path(cfg.default_script_path(), cwd.as_deref(), &[]) {
            Ok(path) => doctor_check(
                "script",
                true,
                "warn",
                format!("setup script found at {}", path.display()),
                "",
            ),
            Err(err) => doctor_check(
                "script",
                false,
                "warn",
                err,
                "set script.default_path or pass --script",
            ),
        },
    );

    let configured_terminal = Some(cfg.host.terminal.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| std::env::var("TERMINAL").ok());
    let terminal = configured_terminal
        .into_iter()
        .chain(known_terminals().into_iter().map(str::to_string))
        .find(|name| which::which(name).is_ok());
    checks.push(match terminal {
        Some(name) => doctor_check("terminal", true, "warn", format!("terminal: {name}"), ""),
        None => doctor_check(
            "terminal",
            false,
            "warn",
            "no supported terminal emulator found",
            "install one (e.g. xterm) or set host.terminal",
        ),
    });

    checks.push(match platform_opener() {
        Some(path) => doctor_check(
            "opener",
            true,
            "warn",
            format!("URL opener: {}", path.display()),
            "",
        ),
        None => doctor_check(
            "opener",
            false,
            "warn",
            "no URL opener found",
            "install xdg-utils to open workspaces from the launcher",
        ),
    });

    checks
}

fn handle_doctor(ctx: &Context) -> Result<(), LauncherError> {
    let checks = collect_doctor_checks(ctx);
    let failed_error = checks
        .iter()
        .find(|check| !check.ok && check.severity == "error")
        .map(|check| check.message.clone());
    let ok = failed_error.is_none();

    if ctx.json {
        let payload = JsonResult {
            ok,
            result: Some(json!({ "checks": checks })),
            error: failed_error,
            error_code: None,
            error_details: None,
        };
        print_json(&payload)?;
        return Ok(());
    }

    for check in &checks {
        let state = if check.ok { "ok" } else { "fail" };
        println!(
            "[{}] {} ({}) - {}",
            state, check.id, check.severity, check.message
        );
        if !check.ok {
            println!("  remediation: {}", check.remediation);
        }
    }
    match failed_error {
        Some(message) => Err(LauncherError::Config(message)),
        None => Ok(()),
    }
}

/// Serves one host-bridge call: JSON args on stdin, JSON result on stdout.
fn handle_bridge(ctx: &Context, command: &str) -> Result<(), LauncherError> {
    let cfg = ctx.load_config()?;
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let args: Value = if input.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&input)?
    };
    let host = HostBridge::from_config(&cfg.host);
    match host.invoke(command, args) {
        Ok(value) => {
            println!("{}", serde_json::to_string(&value)?);
            Ok(())
        }
        Err(err) => Err(LauncherError::Dispatch(err.to_string())),
    }
}

fn print_preview(derived: &Derived) {
    println!("{}", style("Command preview").dim());
    println!("  {}", style(&derived.command).yellow());
}

fn print_step(step: usize, total: usize, title: &str) {
    println!();
    println!(
        "{} {}",
        style(format!("Codex Setup ({step}/{total})")).bold().cyan(),
        style(title).bold()
    );
}

fn edit_form(theme: &ColorfulTheme, session: &mut FormSession) -> Result<(), LauncherError> {
    let total_steps = 3usize;

    print_step(1, total_steps, "Mode");
    let items: Vec<String> = Mode::ALL
        .iter()
        .map(|mode| format!("{} - {}", mode.title(), mode.description()))
        .collect();
    let current = Mode::ALL
        .iter()
        .position(|mode| *mode == session.state().mode)
        .unwrap_or(0);
    let choice = Select::with_theme(theme)
        .with_prompt("How should Codex be deployed?")
        .items(&items)
        .default(current)
        .interact()?;
    session.apply(FormAction::SetMode(Mode::ALL[choice]));
    print_preview(session.derived());

    print_step(2, total_steps, "Details");
    if session.derived().visibility.domain_applicable {
        let domain = Input::<String>::with_theme(theme)
            .with_prompt("Tailscale domain (e.g. machine.tailnet.ts.net)")
            .default(session.state().domain.clone())
            .allow_empty(true)
            .interact_text()?;
        session.apply(FormAction::SetDomain(domain));
    }
    if session.derived().visibility.count_applicable {
        let count = Input::<i64>::with_theme(theme)
            .with_prompt("Number of workspaces (1-30)")
            .default(session.state().workspace_count)
            .interact_text()?;
        session.apply(FormAction::SetWorkspaceCount(count));
    }
    if session.derived().visibility.uninstall_applicable {
        println!(
            "{}",
            style("Uninstalling removes every workspace and its data.").red()
        );
        let confirmed = Confirm::with_theme(theme)
            .with_prompt("I understand, uninstall Codex")
            .default(session.state().confirm_uninstall)
            .interact()?;
        session.apply(FormAction::SetConfirmUninstall(confirmed));
    }
    print_preview(session.derived());

    print_step(3, total_steps, "Script");
    let script = Input::<String>::with_theme(theme)
        .with_prompt("Setup script path")
        .default(session.state().script_path.clone())
        .allow_empty(true)
        .interact_text()?;
    session.apply(FormAction::SetScriptPath(script));
    print_preview(session.derived());
    Ok(())
}

/// Fires every discovery fetch that came due while a prompt was open.
fn pump_discovery(
    scheduler: &mut DiscoveryScheduler,
    source: &dyn RegistrySource,
    clock: &SystemClock,
) -> bool {
    let mut changed = false;
    while scheduler.take_due(clock.now_ms()).is_some() {
        scheduler.begin_fetch();
        let result = source.fetch().map_err(|err| {
            tracing::warn!(source = %source.describe(), %err, "registry fetch failed");
            err.to_string()
        });
        changed |= scheduler.complete(clock.now_ms(), result);
        tracing::debug!(phase = ?scheduler.phase(), changed, "discovery fetch serviced");
    }
    changed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuAction {
    Run,
    Copy,
    Open,
    Refresh,
    Edit,
    Quit,
}

impl MenuAction {
    fn label(self) -> &'static str {
        match self {
            MenuAction::Run => "Run setup in a terminal",
            MenuAction::Copy => "Copy command",
            MenuAction::Open => "Open a workspace",
            MenuAction::Refresh => "Refresh workspaces",
            MenuAction::Edit => "Edit the form",
            MenuAction::Quit => "Quit",
        }
    }
}

fn choose_workspace<'a>(
    theme: &ColorfulTheme,
    workspaces: &'a [WorkspaceInfo],
    preferred: Option<&str>,
) -> Result<&'a WorkspaceInfo, LauncherError> {
    let labels: Vec<&str> = workspaces.iter().map(|w| w.label.as_str()).collect();
    let default = preferred
        .and_then(|id| workspaces.iter().position(|w| w.id == id))
        .unwrap_or(0);
    let index = Select::with_theme(theme)
        .with_prompt("Workspace")
        .items(&labels)
        .default(default)
        .interact()?;
    Ok(&workspaces[index])
}

fn handle_setup(ctx: &Context) -> Result<(), LauncherError> {
    if ctx.json {
        return Err(LauncherError::Process(
            "--json is not supported for the interactive setup; use `preview` or `launch`"
                .to_string(),
        ));
    }
    if !io::stdin().is_terminal() {
        return Err(LauncherError::Process(
            "interactive setup requires a TTY; use `codex-launcher launch` for non-interactive mode"
                .to_string(),
        ));
    }

    let cfg = ctx.load_config()?;
    let theme = ColorfulTheme::default();
    let bridge = ctx.bridge(&cfg);
    let source = registry_source(&cfg, bridge.as_deref());
    let clock = SystemClock::new();
    let mut scheduler = DiscoveryScheduler::new();
    scheduler.trigger(clock.now_ms());
    let mut clipboard = SystemClipboard::default();
    let mut session = FormSession::new(initial_state(&cfg, None));
    let mut selected_workspace: Option<String> = None;

    if io::stdout().is_terminal() {
        let _ = Term::stdout().clear_screen();
    }
    println!("{}", style("Codex Setup").bold().cyan());
    println!(
        "{}",
        style("Pick a deployment mode, fill in the details, then run or copy the command.").dim()
    );
    if bridge.is_none() {
        Status::info("No bridge available: copy the command and run it yourself.").emit();
    }

    'form: loop {
        edit_form(&theme, &mut session)?;
        let derived = session.derived().clone();
        let mut status = match validate(&derived.options, derived.visibility) {
            Ok(()) => Status::info("Ready."),
            Err(err) => Status::error(err.to_string()),
        };

        loop {
            pump_discovery(&mut scheduler, source.as_ref(), &clock);
            println!();
            print_workspaces(scheduler.snapshot());
            status.emit();

            let mut actions = vec![MenuAction::Run, MenuAction::Copy];
            if scheduler.snapshot().is_installed() {
                actions.push(MenuAction::Open);
            }
            actions.extend([MenuAction::Refresh, MenuAction::Edit, MenuAction::Quit]);
            let labels: Vec<&str> = actions.iter().map(|action| action.label()).collect();
            let choice = Select::with_theme(&theme)
                .with_prompt("Next step")
                .items(&labels)
                .default(0)
                .interact()?;

            match actions[choice] {
                MenuAction::Run => {
                    if let Err(err) = validate(&derived.options, derived.visibility) {
                        status = Status::error(err.to_string());
                        continue;
                    }
                    Status::info("Opening a terminal...").emit();
                    let outcome = dispatch(bridge.as_deref(), &derived.options);
                    status = launch_status(&outcome);
                    if matches!(outcome, Err(LauncherError::BridgeUnavailable)) {
                        print_preview(&derived);
                    }
                    scheduler.trigger(clock.now_ms());
                }
                MenuAction::Copy => {
                    status = match copy_command(&mut clipboard, &derived.command) {
                        Ok(()) => Status::info("Command copied to the clipboard."),
                        Err(err) => Status::error(format!("Could not copy the command: {err}")),
                    };
                }
                MenuAction::Open => {
                    let Some(registry) = scheduler.snapshot().registry().cloned() else {
                        continue;
                    };
                    let workspace = choose_workspace(
                        &theme,
                        &registry.workspaces,
                        selected_workspace.as_deref(),
                    )?;
                    selected_workspace = Some(workspace.id.clone());
                    let url = registry.url_for(workspace);
                    status = match open_url(bridge.as_deref(), &url) {
                        Ok(()) => Status::info(format!("Opened {}.", workspace.label)),
                        Err(err) => {
                            tracing::error!(%err, %url, "failed to open workspace");
                            Status::error(format!("Could not open the workspace: {err}"))
                        }
                    };
                    scheduler.trigger(clock.now_ms());
                }
                MenuAction::Refresh => {
                    scheduler.trigger(clock.now_ms());
                    status = Status::info("Refreshing workspaces...");
                }
                MenuAction::Edit => continue 'form,
                MenuAction::Quit => break 'form,
            }
        }
    }

    let cancelled = scheduler.cancel_all();
    tracing::debug!(cancelled, "setup session closed");
    Ok(())
}

fn output(ctx: &Context, payload: Value) -> Result<(), LauncherError> {
    if ctx.json {
        let wrapper = JsonResult {
            ok: true,
            result: Some(payload),
            error: None,
            error_code: None,
            error_details: None,
        };
        print_json(&wrapper)?;
    } else {
        println!("{}", payload);
    }
    Ok(())
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), LauncherError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}
