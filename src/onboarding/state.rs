//! Onboarding state machine states.

use serde::{Deserialize, Serialize};

use super::model::StepData;

/// Every state the onboarding conversation can be in.
///
/// States are either *prompt* states, which wait for the next user message,
/// or *auto* states, which run a tool and immediately compute their
/// successor within the same turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FsmState {
    #[default]
    Welcome,
    GithubCheck,
    GithubInstallPrompt,
    GithubInstalling,
    GithubRepoPrompt,
    GithubRepoSelecting,
    RepoScanPrompt,
    RepoScanning,
    DocActionPrompt,
    SpaceCreating,
    Importing,
    GapAnalysisPrompt,
    GapAnalyzing,
    GeneratePrompt,
    Generating,
    SyncExplain,
    SyncWaiting,
    SyncChecking,
    SyncConfirmed,
    Completing,
    Completed,
}

impl FsmState {
    /// All states, in flow order.
    pub const ALL: [FsmState; 21] = [
        Self::Welcome,
        Self::GithubCheck,
        Self::GithubInstallPrompt,
        Self::GithubInstalling,
        Self::GithubRepoPrompt,
        Self::GithubRepoSelecting,
        Self::RepoScanPrompt,
        Self::RepoScanning,
        Self::DocActionPrompt,
        Self::SpaceCreating,
        Self::Importing,
        Self::GapAnalysisPrompt,
        Self::GapAnalyzing,
        Self::GeneratePrompt,
        Self::Generating,
        Self::SyncExplain,
        Self::SyncWaiting,
        Self::SyncChecking,
        Self::SyncConfirmed,
        Self::Completing,
        Self::Completed,
    ];

    /// Whether this state runs without waiting for user input.
    pub fn is_auto(&self) -> bool {
        use FsmState::*;
        matches!(
            self,
            GithubCheck
                | GithubInstalling
                | GithubRepoSelecting
                | RepoScanning
                | SpaceCreating
                | Importing
                | GapAnalyzing
                | Generating
                | SyncChecking
                | Completing
        )
    }

    /// Whether this state waits for the next user message.
    pub fn is_prompt(&self) -> bool {
        !self.is_auto()
    }

    /// Whether onboarding is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// States reached after the GitHub connection step has been entered.
    /// `change_github` only applies from these.
    pub fn is_past_github_check(&self) -> bool {
        !matches!(self, Self::Welcome | Self::Completing | Self::Completed)
    }

    /// States reached after a doc action was chosen. `reimport` only
    /// applies from these.
    pub fn is_past_doc_action(&self) -> bool {
        use FsmState::*;
        matches!(
            self,
            SpaceCreating
                | Importing
                | GapAnalysisPrompt
                | GapAnalyzing
                | GeneratePrompt
                | Generating
                | SyncExplain
                | SyncWaiting
                | SyncChecking
                | SyncConfirmed
        )
    }

    /// Stable name used in logs, persisted step names and templates.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "WELCOME",
            Self::GithubCheck => "GITHUB_CHECK",
            Self::GithubInstallPrompt => "GITHUB_INSTALL_PROMPT",
            Self::GithubInstalling => "GITHUB_INSTALLING",
            Self::GithubRepoPrompt => "GITHUB_REPO_PROMPT",
            Self::GithubRepoSelecting => "GITHUB_REPO_SELECTING",
            Self::RepoScanPrompt => "REPO_SCAN_PROMPT",
            Self::RepoScanning => "REPO_SCANNING",
            Self::DocActionPrompt => "DOC_ACTION_PROMPT",
            Self::SpaceCreating => "SPACE_CREATING",
            Self::Importing => "IMPORTING",
            Self::GapAnalysisPrompt => "GAP_ANALYSIS_PROMPT",
            Self::GapAnalyzing => "GAP_ANALYZING",
            Self::GeneratePrompt => "GENERATE_PROMPT",
            Self::Generating => "GENERATING",
            Self::SyncExplain => "SYNC_EXPLAIN",
            Self::SyncWaiting => "SYNC_WAITING",
            Self::SyncChecking => "SYNC_CHECKING",
            Self::SyncConfirmed => "SYNC_CONFIRMED",
            Self::Completing => "COMPLETING",
            Self::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for FsmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FsmState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown onboarding state: {s}"))
    }
}

/// Infer a plausible state from step data that has no stored `fsmState`.
///
/// Used when recovering sessions written before the state was persisted.
/// Checks the furthest-along evidence first.
pub fn derive_fsm_state_from_step_data(step_data: &StepData) -> FsmState {
    if step_data.sync_triggered.is_some() {
        FsmState::SyncConfirmed
    } else if !step_data.imported_articles.is_empty() {
        FsmState::SyncExplain
    } else if !step_data.discovered_files.is_empty() {
        FsmState::DocActionPrompt
    } else if step_data.connected_integration.is_some() {
        FsmState::RepoScanPrompt
    } else {
        FsmState::Welcome
    }
}

/// The state a session resumes in: the stored one, else the derived one.
pub fn resolve_state(step_data: &StepData) -> FsmState {
    step_data
        .fsm_state
        .unwrap_or_else(|| derive_fsm_state_from_step_data(step_data))
}
