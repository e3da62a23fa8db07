use crate::form::{LaunchOptions, Mode, DEFAULT_SCRIPT_PATH};

pub const NUM_USERS_ENV: &str = "CODEX_NUM_USERS";
pub const DOMAIN_ENV: &str = "CODEX_DOMAIN";
const UNINSTALL_ANSWER: &str = "YES";

/// Escapes a value for interpolation inside double quotes.
/// Backslash must go first so later replacements are not doubled.
pub fn escape_for_double_quotes(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('`', "\\`")
        .replace('$', "\\$")
}

fn double_quoted(value: &str) -> String {
    format!("\"{}\"", escape_for_double_quotes(value))
}

fn prompt_answers(options: &LaunchOptions) -> Vec<String> {
    let count = options
        .workspace_count
        .map(|count| count.to_string())
        .unwrap_or_default();
    let digit = options.mode.digit().to_string();
    match options.mode {
        Mode::Tunnel => vec![digit, count, options.domain.clone().unwrap_or_default()],
        Mode::LocalNetwork => vec![digit, count],
        Mode::Uninstall => vec![digit, UNINSTALL_ANSWER.to_string()],
    }
}

pub fn effective_script_path(options: &LaunchOptions) -> &str {
    let trimmed = options.script_path.trim();
    if trimmed.is_empty() {
        DEFAULT_SCRIPT_PATH
    } else {
        trimmed
    }
}

/// Builds the shell invocation equivalent to `options`.
pub fn synthesize(options: &LaunchOptions) -> String {
    synthesize_with_script(options, effective_script_path(options))
}

/// Same as [`synthesize`] but runs `script` instead of the path carried in
/// `options`. The host bridge uses this once it has resolved an absolute path.
pub fn synthesize_with_script(options: &LaunchOptions, script: &str) -> String {
    let mut segments: Vec<String> = Vec::new();

    if options.mode != Mode::Uninstall {
        if let Some(count) = options.workspace_count {
            segments.push(format!(
                "export {NUM_USERS_ENV}={}; ",
                double_quoted(&count.to_string())
            ));
        }
    }

    if options.mode == Mode::Tunnel {
        if let Some(domain) = options.domain.as_deref().filter(|d| !d.is_empty()) {
            segments.push(format!("export {DOMAIN_ENV}={}; ", double_quoted(domain)));
        }
    }

    let answers = prompt_answers(options);
    if !answers.is_empty() {
        let quoted: Vec<String> = answers.iter().map(|answer| double_quoted(answer)).collect();
        segments.push(format!("printf '%s\\n' {} | ", quoted.join(" ")));
    }

    segments.push(format!("sudo -E /bin/bash {}", double_quoted(script)));
    segments.concat()
}
