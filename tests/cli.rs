use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::tempdir;

const TUNNEL_COMMAND: &str = "export CODEX_NUM_USERS=\"5\"; export CODEX_DOMAIN=\"a.ts.net\"; \
printf '%s\\n' \"1\" \"5\" \"a.ts.net\" | sudo -E /bin/bash \"codex-setup.sh\"";

fn bin() -> Command {
    let path = assert_cmd::cargo::cargo_bin!("codex-launcher");
    Command::new(path)
}

/// Binary with config and logs isolated under `config_dir` and no ambient bridge.
fn isolated(config_dir: &Path) -> Command {
    let mut cmd = bin();
    cmd.env("CODEX_LAUNCHER_CONFIG_DIR", config_dir)
        .env_remove("CODEX_LAUNCHER_CONFIG")
        .env_remove("CODEX_LAUNCHER_BRIDGE")
        .env_remove("CODEX_BASE_URL")
        .env_remove("DISPLAY")
        .env_remove("WAYLAND_DISPLAY");
    cmd
}

fn parse_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("json output")
}

#[cfg(unix)]
fn write_bridge_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-bridge.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// Serves a single HTTP response on a local port and returns the URL.
fn serve_registry_once(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/workspaces.json", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|window| window == b"\r\n\r\n") {
            let read = stream.read(&mut buf).unwrap();
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buf[..read]);
        }
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).unwrap();
    });
    (url, handle)
}

fn write_registry_config(dir: &Path, url: &str) -> PathBuf {
    let config_path = dir.join("config.yaml");
    fs::write(
        &config_path,
        format!("version: 1\nregistry:\n  url: {url}\n  timeout_sec: 5\n"),
    )
    .unwrap();
    config_path
}

fn without_proxy(cmd: &mut Command) -> &mut Command {
    for key in ["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"] {
        cmd.env_remove(key);
    }
    cmd
}

#[test]
fn preview_prints_exact_command() {
    let dir = tempdir().unwrap();
    isolated(dir.path())
        .args(["preview", "--mode", "tunnel", "--count", "5", "--domain", "a.ts.net"])
        .assert()
        .success()
        .stdout(format!("{TUNNEL_COMMAND}\n"));
}

#[test]
fn preview_json_carries_payload_and_visibility() {
    let dir = tempdir().unwrap();
    let output = isolated(dir.path())
        .args(["--json", "preview", "--mode", "lan", "--count", "3", "--domain", "ignored"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = parse_json(&output);
    assert_eq!(json["ok"], true);
    let result = &json["result"];
    assert_eq!(
        result["command"],
        "export CODEX_NUM_USERS=\"3\"; printf '%s\\n' \"2\" \"3\" | sudo -E /bin/bash \"codex-setup.sh\""
    );
    assert_eq!(result["payload"]["mode"], 2);
    assert_eq!(result["payload"]["num_users"], 3);
    assert!(result["payload"]["domain"].is_null());
    assert_eq!(result["visibility"]["domain_applicable"], false);
    assert_eq!(result["valid"], true);
}

#[test]
fn preview_escapes_hostile_domain() {
    let dir = tempdir().unwrap();
    isolated(dir.path())
        .args(["preview", "--count", "2", "--domain", "a\"$(id)`x`\\"])
        .assert()
        .success()
        .stdout(contains(r#"export CODEX_DOMAIN="a\"\$(id)\`x\`\\";"#));
}

#[test]
fn preview_reports_invalid_form_without_failing() {
    let dir = tempdir().unwrap();
    let output = isolated(dir.path())
        .args(["--json", "preview", "--count", "31", "--domain", "a.ts.net"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = parse_json(&output);
    assert_eq!(json["result"]["valid"], false);
    assert!(json["result"]["validation_error"]
        .as_str()
        .unwrap()
        .contains("between 1 and 30"));
}

#[test]
fn launch_rejects_missing_domain() {
    let dir = tempdir().unwrap();
    let output = isolated(dir.path())
        .args(["--json", "--no-bridge", "launch", "--count", "4", "--domain", "   "])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let json = parse_json(&output);
    assert_eq!(json["ok"], false);
    assert_eq!(json["error_code"], "domain_required");
}

#[test]
fn launch_uninstall_requires_confirmation() {
    let dir = tempdir().unwrap();
    let output = isolated(dir.path())
        .args(["--json", "--no-bridge", "launch", "--mode", "uninstall"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let json = parse_json(&output);
    assert_eq!(json["error_code"], "confirmation_required");
}

#[test]
fn launch_count_out_of_range_fails() {
    let dir = tempdir().unwrap();
    isolated(dir.path())
        .args(["--no-bridge", "launch", "--mode", "lan", "--count", "0"])
        .assert()
        .failure()
        .stderr(contains("between 1 and 30"));
}

#[test]
fn launch_without_bridge_prints_command_for_manual_use() {
    let dir = tempdir().unwrap();
    isolated(dir.path())
        .args([
            "--no-bridge",
            "launch",
            "--count",
            "5",
            "--domain",
            "a.ts.net",
            "--no-watch",
        ])
        .assert()
        .failure()
        .stdout(contains(TUNNEL_COMMAND))
        .stderr(contains("bridge unavailable"));
}

#[test]
fn launch_json_without_bridge_carries_fallback_command() {
    let dir = tempdir().unwrap();
    let output = isolated(dir.path())
        .args([
            "--json",
            "--no-bridge",
            "launch",
            "--mode",
            "lan",
            "--count",
            "2",
            "--no-watch",
        ])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let json = parse_json(&output);
    assert_eq!(json["ok"], false);
    assert_eq!(json["error_code"], "bridge_unavailable");
    assert_eq!(
        json["error_details"]["command"],
        "export CODEX_NUM_USERS=\"2\"; printf '%s\\n' \"2\" \"2\" | sudo -E /bin/bash \"codex-setup.sh\""
    );
    assert_eq!(json["error_details"]["payload"]["mode"], 2);
    assert_eq!(json["error_details"]["payload"]["num_users"], 2);
}

#[test]
fn workspaces_list_reads_static_registry() {
    let dir = tempdir().unwrap();
    let (url, server) = serve_registry_once("200 OK", r#"{"workspaces":[{"id":"alpha"}]}"#);
    let config_path = write_registry_config(dir.path(), &url);
    let output = without_proxy(&mut isolated(dir.path()))
        .arg("--json")
        .arg("--no-bridge")
        .arg("--config")
        .arg(&config_path)
        .args(["workspaces", "list"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    server.join().unwrap();
    let json = parse_json(&output);
    let registry = &json["result"]["registry"];
    assert_eq!(json["result"]["state"], "installed");
    assert_eq!(registry["source"], "static");
    assert_eq!(registry["workspaces"][0]["label"], "Workspace 1");
    assert_eq!(registry["workspaces"][0]["href"], "/alpha/");
}

#[test]
fn workspaces_list_reports_registry_http_failure() {
    let dir = tempdir().unwrap();
    let (url, server) = serve_registry_once("503 Service Unavailable", "down");
    let config_path = write_registry_config(dir.path(), &url);
    let output = without_proxy(&mut isolated(dir.path()))
        .arg("--json")
        .arg("--no-bridge")
        .arg("--config")
        .arg(&config_path)
        .args(["workspaces", "list"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    server.join().unwrap();
    let json = parse_json(&output);
    assert_eq!(json["error_code"], "registry_fetch");
    assert!(json["error"].as_str().unwrap().contains("503"));
}

#[cfg(unix)]
#[test]
fn launch_through_bridge_reports_terminal() {
    let dir = tempdir().unwrap();
    let payload_path = dir.path().join("payload.json");
    let script = write_bridge_script(
        dir.path(),
        &format!(
            "cat > '{}'\necho '{{\"command\":\"sudo -E /bin/bash x\",\"terminal\":\"foot\"}}'",
            payload_path.display()
        ),
    );
    let output = isolated(dir.path())
        .env("CODEX_LAUNCHER_BRIDGE", &script)
        .args([
            "--json",
            "launch",
            "--count",
            "5",
            "--domain",
            "a.ts.net",
            "--no-watch",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = parse_json(&output);
    assert_eq!(json["result"]["launched"]["terminal"], "foot");
    assert_eq!(json["result"]["preview"], TUNNEL_COMMAND);

    let sent: Value = serde_json::from_str(&fs::read_to_string(&payload_path).unwrap()).unwrap();
    assert_eq!(sent["options"]["mode"], 1);
    assert_eq!(sent["options"]["num_users"], 5);
    assert_eq!(sent["options"]["domain"], "a.ts.net");
    assert_eq!(sent["options"]["script_path"], "codex-setup.sh");
}

#[cfg(unix)]
#[test]
fn bridge_rejection_message_is_shown_verbatim() {
    let dir = tempdir().unwrap();
    let script = write_bridge_script(
        dir.path(),
        "cat > /dev/null\necho 'sudo: a password is required' >&2\nexit 1",
    );
    let output = isolated(dir.path())
        .env("CODEX_LAUNCHER_BRIDGE", &script)
        .args(["--json", "launch", "--mode", "lan", "--count", "2", "--no-watch"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let json = parse_json(&output);
    assert_eq!(json["error"], "sudo: a password is required");
    assert_eq!(json["error_code"], "dispatch_failed");
}

#[cfg(unix)]
#[test]
fn bridge_rejection_without_message_is_generic() {
    let dir = tempdir().unwrap();
    let script = write_bridge_script(dir.path(), "cat > /dev/null\nexit 3");
    isolated(dir.path())
        .env("CODEX_LAUNCHER_BRIDGE", &script)
        .args(["launch", "--mode", "lan", "--count", "2", "--no-watch"])
        .assert()
        .failure()
        .stderr(contains("execution failed"));
}

#[cfg(unix)]
#[test]
fn empty_bridge_reply_is_no_response() {
    let dir = tempdir().unwrap();
    let script = write_bridge_script(dir.path(), "cat > /dev/null");
    let output = isolated(dir.path())
        .env("CODEX_LAUNCHER_BRIDGE", &script)
        .args(["--json", "launch", "--mode", "lan", "--count", "2", "--no-watch"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let json = parse_json(&output);
    assert_eq!(json["error_code"], "no_response");
}

#[cfg(unix)]
#[test]
fn workspaces_list_reads_bridge_install_state() {
    let dir = tempdir().unwrap();
    let script = write_bridge_script(
        dir.path(),
        r#"cat > /dev/null
if [ "$1" = "check_install_state" ]; then
  echo '{"installed":true,"baseUrl":"https://box.ts.net/","workspaces":[{"id":"user1","label":"Workspace 1","href":"user1"}]}'
else
  exit 2
fi"#,
    );
    let output = isolated(dir.path())
        .env("CODEX_LAUNCHER_BRIDGE", &script)
        .args(["--json", "workspaces", "list"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = parse_json(&output);
    let result = &json["result"];
    assert_eq!(result["state"], "installed");
    assert_eq!(result["registry"]["base_url"], "https://box.ts.net");
    assert_eq!(result["registry"]["workspaces"][0]["href"], "/user1/");
    assert_eq!(result["registry"]["source"], "bridge");

    let output = isolated(dir.path())
        .env("CODEX_LAUNCHER_BRIDGE", &script)
        .args(["workspaces", "open", "user1", "--url-only"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8_lossy(&output).trim(), "https://box.ts.net/user1/");
}

#[cfg(unix)]
#[test]
fn workspaces_open_unknown_id_fails() {
    let dir = tempdir().unwrap();
    let script = write_bridge_script(
        dir.path(),
        r#"cat > /dev/null
echo '{"installed":true,"baseUrl":"","workspaces":[{"id":"user1","label":"Workspace 1","href":"/user1/"}]}'"#,
    );
    isolated(dir.path())
        .env("CODEX_LAUNCHER_BRIDGE", &script)
        .args(["workspaces", "open", "user9", "--url-only"])
        .assert()
        .failure()
        .stderr(contains("unknown workspace 'user9'"));
}

#[test]
fn bridge_subcommand_reports_install_state() {
    let dir = tempdir().unwrap();
    let codex_home = dir.path().join("codex");
    fs::create_dir_all(codex_home.join("users/user2")).unwrap();
    fs::create_dir_all(codex_home.join("users/user10")).unwrap();
    fs::create_dir_all(codex_home.join("users/shared")).unwrap();
    fs::write(codex_home.join("base-url.txt"), "https://host.ts.net\n").unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(
        &config_path,
        format!("version: 1\nhost:\n  codex_home: {}\n", codex_home.display()),
    )
    .unwrap();

    let output = isolated(dir.path())
        .arg("--config")
        .arg(&config_path)
        .args(["bridge", "check_install_state"])
        .write_stdin("null")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = parse_json(&output);
    assert_eq!(json["installed"], true);
    assert_eq!(json["baseUrl"], "https://host.ts.net");
    let ids: Vec<&str> = json["workspaces"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["user2", "user10"]);
}

#[test]
fn bridge_subcommand_rejects_invalid_launch() {
    let dir = tempdir().unwrap();
    isolated(dir.path())
        .args(["bridge", "launch_codex"])
        .write_stdin(r#"{"options":{"mode":1,"num_users":4,"domain":null,"script_path":"codex-setup.sh"}}"#)
        .assert()
        .failure()
        .stderr(contains("a Tailscale domain is required"));
}

#[test]
fn bridge_subcommand_rejects_unknown_command() {
    let dir = tempdir().unwrap();
    isolated(dir.path())
        .args(["bridge", "reboot"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(contains("unknown bridge command 'reboot'"));
}

#[test]
fn config_init_creates_and_preserves_existing() {
    let dir = tempdir().unwrap();
    let config_dir = dir.path().join("config");

    let output = isolated(&config_dir)
        .args(["--json", "config", "init"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = parse_json(&output);
    assert_eq!(json["result"]["created"], true);
    let config_path = config_dir.join("config.yaml");
    assert!(config_path.exists());

    fs::write(&config_path, "version: 1\nscript:\n  default_path: custom.sh\n").unwrap();
    let output = isolated(&config_dir)
        .args(["--json", "config", "init"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = parse_json(&output);
    assert_eq!(json["result"]["created"], false);
    assert!(fs::read_to_string(&config_path).unwrap().contains("custom.sh"));

    isolated(&config_dir)
        .args(["preview", "--mode", "lan", "--count", "1"])
        .assert()
        .success()
        .stdout(contains("sudo -E /bin/bash \"custom.sh\""));
}

#[test]
fn config_validate_rejects_unknown_fields() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, "version: 1\nregistry:\n  retries: 3\n").unwrap();
    isolated(dir.path())
        .arg("--config")
        .arg(&config_path)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(contains("retries"));
}

#[test]
fn config_validate_accepts_template() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    let template = fs::read_to_string("config/default.yaml").expect("read template");
    fs::write(&config_path, template).unwrap();
    let output = isolated(dir.path())
        .arg("--json")
        .arg("--config")
        .arg(&config_path)
        .args(["config", "validate"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(parse_json(&output)["result"]["valid"], true);
}

#[test]
fn setup_refuses_json_mode() {
    let dir = tempdir().unwrap();
    isolated(dir.path())
        .args(["--json", "setup"])
        .assert()
        .failure()
        .stdout(contains("not supported"));
}
