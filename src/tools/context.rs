//! Tool context: the engine's and tools' handle on one onboarding session.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::error::DatabaseError;
use crate::github::GitHubApi;
use crate::onboarding::{StepData, StepDataUpdate};
use crate::store::{IntegrationStore, OnboardingStore, SessionStatus};

/// Everything a tool call may read or mutate for one user's session.
///
/// Step data lives here as an in-memory copy; every write goes through
/// `update_step_data`, which merges against the stored record and then
/// adopts it, so fields written elsewhere mid-turn (the webhook flag) are
/// seen rather than overwritten.
pub struct ToolContext {
    /// User that owns the session.
    pub user_id: String,
    step_data: RwLock<StepData>,
    sessions: Arc<dyn OnboardingStore>,
    /// Integration DAO.
    pub integrations: Arc<dyn IntegrationStore>,
    /// GitHub REST client.
    pub github: Arc<dyn GitHubApi>,
}

impl ToolContext {
    pub fn new(
        user_id: impl Into<String>,
        step_data: StepData,
        sessions: Arc<dyn OnboardingStore>,
        integrations: Arc<dyn IntegrationStore>,
        github: Arc<dyn GitHubApi>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            step_data: RwLock::new(step_data),
            sessions,
            integrations,
            github,
        }
    }

    /// Snapshot of the current step data.
    pub async fn step_data(&self) -> StepData {
        self.step_data.read().await.clone()
    }

    /// Set the transient raw text of the current turn.
    pub async fn set_user_message(&self, message: Option<String>) {
        self.step_data.write().await.user_message = message;
    }

    /// Merge `update` into the stored step data and refresh the local copy.
    ///
    /// The in-memory copy is updated even if persistence fails.
    pub async fn update_step_data(&self, update: StepDataUpdate) -> Result<(), DatabaseError> {
        let mut data = self.step_data.write().await;
        match self
            .sessions
            .merge_step_data(&self.user_id, update.clone())
            .await
        {
            Ok(stored) => {
                let user_message = data.user_message.take();
                *data = stored;
                data.user_message = user_message;
                Ok(())
            }
            Err(e) => {
                data.apply(update);
                Err(e)
            }
        }
    }

    /// Record the step the session is at.
    pub async fn advance_step(&self, step: &str) -> Result<(), DatabaseError> {
        self.sessions.advance_step(&self.user_id, step).await
    }

    /// Close the session as completed.
    pub async fn complete_onboarding(&self) -> Result<(), DatabaseError> {
        info!(user_id = %self.user_id, "Completing onboarding");
        self.sessions
            .close_session(&self.user_id, SessionStatus::Completed)
            .await
    }

    /// Close the session as skipped.
    pub async fn skip_onboarding(&self) -> Result<(), DatabaseError> {
        info!(user_id = %self.user_id, "Skipping onboarding");
        self.sessions
            .close_session(&self.user_id, SessionStatus::Skipped)
            .await
    }
}
