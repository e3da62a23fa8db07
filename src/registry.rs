use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::bridge::{Bridge, BridgeError, CHECK_INSTALL_STATE};
use crate::error::LauncherError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInfo {
    pub id: String,
    pub label: String,
    pub href: String,
}

/// Wire shape of the bridge's `check_install_state` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallDetection {
    pub installed: bool,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub workspaces: Vec<WorkspaceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaticDocument {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    workspaces: Option<Vec<StaticWorkspace>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StaticWorkspace {
    #[serde(default)]
    id: String,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Bridge,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceRegistry {
    pub installed: bool,
    pub base_url: String,
    pub workspaces: Vec<WorkspaceInfo>,
    pub source: SnapshotSource,
    pub fetched_at: DateTime<Utc>,
}

impl WorkspaceRegistry {
    pub fn find(&self, id: &str) -> Option<&WorkspaceInfo> {
        self.workspaces.iter().find(|workspace| workspace.id == id)
    }

    /// Picks `preferred` when it exists, otherwise the first workspace.
    pub fn select(&self, preferred: Option<&str>) -> Option<&WorkspaceInfo> {
        preferred
            .and_then(|id| self.find(id))
            .or_else(|| self.workspaces.first())
    }

    pub fn url_for(&self, workspace: &WorkspaceInfo) -> String {
        workspace_url(&self.base_url, &workspace.href)
    }
}

pub fn normalize_base_url(candidate: Option<&str>) -> String {
    match candidate.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => trimmed.trim_end_matches('/').to_string(),
        _ => DEFAULT_BASE_URL.to_string(),
    }
}

pub fn build_href(segment: &str) -> String {
    let trimmed = segment.trim().trim_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    format!("/{trimmed}/")
}

pub fn workspace_url(base_url: &str, href: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if href.starts_with('/') {
        format!("{base}{href}")
    } else {
        format!("{base}/{href}")
    }
}

pub fn from_detection(raw: InstallDetection, fetched_at: DateTime<Utc>) -> WorkspaceRegistry {
    WorkspaceRegistry {
        installed: raw.installed,
        base_url: normalize_base_url(Some(&raw.base_url)),
        workspaces: raw
            .workspaces
            .into_iter()
            .map(|workspace| WorkspaceInfo {
                href: build_href(&workspace.href),
                ..workspace
            })
            .collect(),
        source: SnapshotSource::Bridge,
        fetched_at,
    }
}

fn from_static_document(doc: StaticDocument, fetched_at: DateTime<Utc>) -> WorkspaceRegistry {
    let workspaces: Vec<WorkspaceInfo> = doc
        .workspaces
        .unwrap_or_default()
        .into_iter()
        .filter(|workspace| !workspace.id.is_empty())
        .enumerate()
        .map(|(index, workspace)| WorkspaceInfo {
            href: build_href(&workspace.id),
            label: workspace
                .label
                .unwrap_or_else(|| format!("Workspace {}", index + 1)),
            id: workspace.id,
        })
        .collect();
    WorkspaceRegistry {
        installed: !workspaces.is_empty(),
        base_url: normalize_base_url(doc.base_url.as_deref()),
        workspaces,
        source: SnapshotSource::Static,
        fetched_at,
    }
}

pub fn parse_static_document(
    body: &str,
    fetched_at: DateTime<Utc>,
) -> Result<WorkspaceRegistry, LauncherError> {
    let doc: StaticDocument = serde_json::from_str(body)?;
    Ok(from_static_document(doc, fetched_at))
}

/// One fetch of the workspace registry.
pub trait RegistrySource {
    fn fetch(&self) -> Result<WorkspaceRegistry, LauncherError>;

    fn describe(&self) -> String;
}

pub struct BridgeRegistry<'a> {
    bridge: &'a dyn Bridge,
}

impl<'a> BridgeRegistry<'a> {
    pub fn new(bridge: &'a dyn Bridge) -> Self {
        Self { bridge }
    }
}

impl RegistrySource for BridgeRegistry<'_> {
    fn fetch(&self) -> Result<WorkspaceRegistry, LauncherError> {
        let raw = self
            .bridge
            .invoke(CHECK_INSTALL_STATE, Value::Null)
            .map_err(|err| match err {
                BridgeError::Rejected(Some(message)) => LauncherError::Registry(message),
                other => LauncherError::Registry(other.to_string()),
            })?;
        if raw.is_null() {
            return Err(LauncherError::Registry(
                "bridge returned no install state".to_string(),
            ));
        }
        let detection: InstallDetection = serde_json::from_value(raw)?;
        Ok(from_detection(detection, Utc::now()))
    }

    fn describe(&self) -> String {
        format!("bridge ({})", self.bridge.name())
    }
}

pub struct HttpRegistry {
    url: String,
    timeout: Duration,
}

impl HttpRegistry {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

impl RegistrySource for HttpRegistry {
    fn fetch(&self) -> Result<WorkspaceRegistry, LauncherError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let response = client
            .get(&self.url)
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("User-Agent", "codex-launcher")
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::Registry(format!(
                "GET {} returned HTTP {}",
                self.url, status
            )));
        }
        let body = response.text()?;
        parse_static_document(&body, Utc::now())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
