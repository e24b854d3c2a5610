//! Step data and turn result models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OnboardingError;
use crate::tools::UiAction;

use super::state::FsmState;

/// Current `StepData` schema version.
pub const STEP_DATA_VERSION: u32 = 1;

/// What the user chose to do with documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocAction {
    Import,
    Generate,
    Both,
}

impl DocAction {
    /// Whether this action includes importing existing markdown.
    pub fn imports(&self) -> bool {
        matches!(self, Self::Import | Self::Both)
    }

    /// Whether this action includes generating docs from code.
    pub fn generates(&self) -> bool {
        matches!(self, Self::Generate | Self::Both)
    }
}

impl std::fmt::Display for DocAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Import => write!(f, "import"),
            Self::Generate => write!(f, "generate"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// How badly a documentation gap needs filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    Low,
    #[default]
    Medium,
    High,
}

/// A documentation gap reported by gap analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapResult {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: GapSeverity,
}

/// Durable per-session onboarding data.
///
/// Owned by the caller; the engine reads it through the tool context and
/// writes it only via `StepDataUpdate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepData {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsm_state: Option<FsmState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_integration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_installation_id: Option<i64>,
    /// `owner/repo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_repos: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discovered_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_action: Option<DocAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imported_articles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generated_articles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gap_analysis_results: Vec<GapResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_triggered: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_commit_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Raw text of the current turn. Never persisted.
    #[serde(skip)]
    pub user_message: Option<String>,
}

impl StepData {
    /// Fresh step data for a new session.
    pub fn new() -> Self {
        Self {
            version: STEP_DATA_VERSION,
            ..Default::default()
        }
    }

    /// Decode persisted step data, validating the schema version.
    ///
    /// Records written before versioning carry no `version` and are read as
    /// the current version.
    pub fn from_json(value: serde_json::Value) -> Result<Self, OnboardingError> {
        let mut data: StepData = serde_json::from_value(value)
            .map_err(|e| OnboardingError::InvalidStepData(e.to_string()))?;
        if data.version > STEP_DATA_VERSION {
            return Err(OnboardingError::UnsupportedStepDataVersion {
                found: data.version,
                supported: STEP_DATA_VERSION,
            });
        }
        data.version = STEP_DATA_VERSION;
        Ok(data)
    }

    /// Whether the webhook or the poller has seen a push.
    pub fn is_sync_triggered(&self) -> bool {
        self.sync_triggered == Some(true)
    }

    /// Number of articles produced so far, imported or generated.
    pub fn article_count(&self) -> usize {
        let generated = self
            .generated_count
            .map(|c| c as usize)
            .unwrap_or(0)
            .max(self.generated_articles.len());
        self.imported_articles.len() + generated
    }

    /// Apply a partial update: listed fields are cleared first, then every
    /// `Some` field overwrites.
    pub fn apply(&mut self, update: StepDataUpdate) {
        for field in &update.clear {
            self.clear_field(*field);
        }
        if let Some(v) = update.fsm_state {
            self.fsm_state = Some(v);
        }
        if let Some(v) = update.connected_integration {
            self.connected_integration = Some(v);
        }
        if let Some(v) = update.connected_installation_id {
            self.connected_installation_id = Some(v);
        }
        if let Some(v) = update.connected_repo {
            self.connected_repo = Some(v);
        }
        if let Some(v) = update.available_repos {
            self.available_repos = v;
        }
        if let Some(v) = update.discovered_files {
            self.discovered_files = v;
        }
        if let Some(v) = update.doc_action {
            self.doc_action = Some(v);
        }
        if let Some(v) = update.space_id {
            self.space_id = Some(v);
        }
        if let Some(v) = update.space_name {
            self.space_name = Some(v);
        }
        if let Some(v) = update.imported_articles {
            self.imported_articles = v;
        }
        if let Some(v) = update.generated_articles {
            self.generated_articles = v;
        }
        if let Some(v) = update.generated_count {
            self.generated_count = Some(v);
        }
        if let Some(v) = update.gap_analysis_results {
            self.gap_analysis_results = v;
        }
        if let Some(v) = update.sync_triggered {
            self.sync_triggered = Some(v);
        }
        if let Some(v) = update.last_known_commit_sha {
            self.last_known_commit_sha = Some(v);
        }
        if let Some(v) = update.last_sync_time {
            self.last_sync_time = Some(v);
        }
    }

    fn clear_field(&mut self, field: StepField) {
        match field {
            StepField::FsmState => self.fsm_state = None,
            StepField::ConnectedIntegration => self.connected_integration = None,
            StepField::ConnectedInstallationId => self.connected_installation_id = None,
            StepField::ConnectedRepo => self.connected_repo = None,
            StepField::AvailableRepos => self.available_repos.clear(),
            StepField::DiscoveredFiles => self.discovered_files.clear(),
            StepField::DocAction => self.doc_action = None,
            StepField::SpaceId => self.space_id = None,
            StepField::SpaceName => self.space_name = None,
            StepField::ImportedArticles => self.imported_articles.clear(),
            StepField::GeneratedArticles => self.generated_articles.clear(),
            StepField::GeneratedCount => self.generated_count = None,
            StepField::GapAnalysisResults => self.gap_analysis_results.clear(),
            StepField::SyncTriggered => self.sync_triggered = None,
            StepField::LastKnownCommitSha => self.last_known_commit_sha = None,
            StepField::LastSyncTime => self.last_sync_time = None,
        }
    }
}

/// Names of clearable `StepData` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepField {
    FsmState,
    ConnectedIntegration,
    ConnectedInstallationId,
    ConnectedRepo,
    AvailableRepos,
    DiscoveredFiles,
    DocAction,
    SpaceId,
    SpaceName,
    ImportedArticles,
    GeneratedArticles,
    GeneratedCount,
    GapAnalysisResults,
    SyncTriggered,
    LastKnownCommitSha,
    LastSyncTime,
}

/// A partial `StepData` write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepDataUpdate {
    pub clear: Vec<StepField>,
    pub fsm_state: Option<FsmState>,
    pub connected_integration: Option<String>,
    pub connected_installation_id: Option<i64>,
    pub connected_repo: Option<String>,
    pub available_repos: Option<Vec<String>>,
    pub discovered_files: Option<Vec<String>>,
    pub doc_action: Option<DocAction>,
    pub space_id: Option<String>,
    pub space_name: Option<String>,
    pub imported_articles: Option<Vec<String>>,
    pub generated_articles: Option<Vec<String>>,
    pub generated_count: Option<u32>,
    pub gap_analysis_results: Option<Vec<GapResult>>,
    pub sync_triggered: Option<bool>,
    pub last_known_commit_sha: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl StepDataUpdate {
    /// An update that only clears the given fields.
    pub fn clearing(fields: &[StepField]) -> Self {
        Self {
            clear: fields.to_vec(),
            ..Default::default()
        }
    }
}

/// Result reported by `check_github_status`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitHubConnection {
    Connected,
    Installed,
    NotInstalled,
}

/// Structured `data` of a `check_github_status` result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubStatus {
    pub status: GitHubConnection,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub integration_id: Option<String>,
    #[serde(default)]
    pub installation_id: Option<i64>,
    #[serde(default)]
    pub repos: Vec<String>,
}

/// A tool invocation announced to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: serde_json::Value,
}

/// One item the chat UI renders for a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Content {
        content: String,
    },
    ToolCall {
        #[serde(rename = "toolCall")]
        tool_call: ToolCall,
    },
    UiAction {
        #[serde(rename = "uiAction")]
        ui_action: UiAction,
    },
}

impl Event {
    pub fn content(content: impl Into<String>) -> Self {
        Self::Content {
            content: content.into(),
        }
    }

    pub fn tool_call(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self::ToolCall {
            tool_call: ToolCall {
                name: name.into(),
                args,
            },
        }
    }

    /// Text of a `content` event.
    pub fn as_content(&self) -> Option<&str> {
        match self {
            Self::Content { content } => Some(content),
            _ => None,
        }
    }

    /// Name of a `tool_call` event.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::ToolCall { tool_call } => Some(&tool_call.name),
            _ => None,
        }
    }
}

/// Outcome of one engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResult {
    pub new_state: FsmState,
    pub events: Vec<Event>,
}

impl TransitionResult {
    /// All content text, in order.
    pub fn contents(&self) -> Vec<&str> {
        self.events.iter().filter_map(Event::as_content).collect()
    }

    /// All tool names called, in order.
    pub fn tool_calls(&self) -> Vec<&str> {
        self.events.iter().filter_map(Event::tool_name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_data_serializes_camel_case_and_skips_empty() {
        let data = StepData {
            connected_repo: Some("acme/docs".into()),
            sync_triggered: Some(true),
            user_message: Some("hello".into()),
            ..StepData::new()
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["connectedRepo"], "acme/docs");
        assert_eq!(json["syncTriggered"], true);
        assert_eq!(json["version"], STEP_DATA_VERSION);
        assert!(json.get("userMessage").is_none());
        assert!(json.get("discoveredFiles").is_none());
    }

    #[test]
    fn from_json_accepts_unversioned_records() {
        let data = StepData::from_json(serde_json::json!({
            "connectedIntegration": "int-7",
            "discoveredFiles": ["README.md"],
            "docAction": "both"
        }))
        .unwrap();
        assert_eq!(data.version, STEP_DATA_VERSION);
        assert_eq!(data.connected_integration.as_deref(), Some("int-7"));
        assert_eq!(data.doc_action, Some(DocAction::Both));
    }

    #[test]
    fn from_json_rejects_newer_version() {
        let err = StepData::from_json(serde_json::json!({ "version": 99 })).unwrap_err();
        assert!(matches!(
            err,
            OnboardingError::UnsupportedStepDataVersion { found: 99, .. }
        ));
    }

    #[test]
    fn from_json_rejects_bad_types() {
        let err = StepData::from_json(serde_json::json!({ "docAction": "teleport" })).unwrap_err();
        assert!(matches!(err, OnboardingError::InvalidStepData(_)));
    }

    #[test]
    fn apply_clears_before_setting() {
        let mut data = StepData {
            connected_repo: Some("acme/old".into()),
            discovered_files: vec!["a.md".into()],
            ..StepData::new()
        };
        data.apply(StepDataUpdate {
            clear: vec![StepField::ConnectedRepo, StepField::DiscoveredFiles],
            connected_repo: Some("acme/new".into()),
            ..Default::default()
        });
        assert_eq!(data.connected_repo.as_deref(), Some("acme/new"));
        assert!(data.discovered_files.is_empty());
    }

    #[test]
    fn article_count_uses_larger_generated_figure() {
        let data = StepData {
            imported_articles: vec!["a".into(), "b".into()],
            generated_articles: vec!["c".into()],
            generated_count: Some(4),
            ..Default::default()
        };
        assert_eq!(data.article_count(), 6);
    }

    #[test]
    fn event_wire_format() {
        let event = Event::tool_call("scan_repository", serde_json::json!({"repo": "acme/docs"}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["toolCall"]["name"], "scan_repository");

        let json = serde_json::to_value(Event::content("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "content", "content": "hi"}));
    }

    #[test]
    fn github_status_parses_tool_data() {
        let status: GitHubStatus = serde_json::from_value(serde_json::json!({
            "status": "installed",
            "installationId": 42,
            "repos": ["acme/docs", "acme/api"]
        }))
        .unwrap();
        assert_eq!(status.status, GitHubConnection::Installed);
        assert_eq!(status.installation_id, Some(42));
        assert_eq!(status.repos.len(), 2);
    }
}
