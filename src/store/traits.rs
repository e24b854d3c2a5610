//! Persistence traits for onboarding sessions and GitHub integrations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::onboarding::{StepData, StepDataUpdate};

/// Lifecycle of an onboarding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Skipped,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }

    /// Parse a status string from the DB.
    pub fn from_db(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "skipped" => Self::Skipped,
            _ => Self::InProgress,
        }
    }

    /// Whether the session no longer accepts turns.
    pub fn is_closed(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// A persisted onboarding session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingSession {
    pub user_id: String,
    pub status: SessionStatus,
    /// Last step name recorded via `advance_step`.
    pub current_step: String,
    pub step_data: StepData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A GitHub integration record (one connected repository).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubIntegration {
    pub id: String,
    pub user_id: String,
    pub installation_id: Option<i64>,
    /// `owner/repo`.
    pub repo: String,
    pub branch: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Storage for onboarding sessions.
#[async_trait]
pub trait OnboardingStore: Send + Sync {
    /// Load a user's session, if one exists.
    async fn load_session(&self, user_id: &str) -> Result<Option<OnboardingSession>, DatabaseError>;

    /// Create an empty in-progress session, or return the existing one.
    async fn start_session(&self, user_id: &str) -> Result<OnboardingSession, DatabaseError>;

    /// Overwrite the session's step data.
    async fn save_step_data(&self, user_id: &str, step_data: &StepData) -> Result<(), DatabaseError>;

    /// Apply `update` to the stored step data and return the merged record.
    ///
    /// Read, merge and write happen as one step, so concurrent writers that
    /// touch different fields never erase each other.
    async fn merge_step_data(
        &self,
        user_id: &str,
        update: StepDataUpdate,
    ) -> Result<StepData, DatabaseError>;

    /// Record the named step the session is at.
    async fn advance_step(&self, user_id: &str, step: &str) -> Result<(), DatabaseError>;

    /// Close the session with the given status.
    async fn close_session(&self, user_id: &str, status: SessionStatus) -> Result<(), DatabaseError>;
}

/// Storage for GitHub integrations.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// The active integration for `user_id` on `repo`, if any.
    async fn active_github_integration(
        &self,
        user_id: &str,
        repo: &str,
    ) -> Result<Option<GitHubIntegration>, DatabaseError>;

    /// Create (or reactivate) the integration for `repo` and deactivate the
    /// user's other GitHub integrations.
    async fn connect_repository(
        &self,
        user_id: &str,
        installation_id: Option<i64>,
        repo: &str,
    ) -> Result<GitHubIntegration, DatabaseError>;
}
