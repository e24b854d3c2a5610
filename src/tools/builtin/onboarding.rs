//! Tools the onboarding engine ships with.
//!
//! The GitHub tools only hand a UI action back to the client; the
//! session tools close the onboarding record through the context.

use async_trait::async_trait;

use crate::tools::context::ToolContext;
use crate::tools::tool::{Tool, ToolError, ToolOutput, UiAction};

/// Opens the GitHub App installation page.
pub struct InstallGithubAppTool {
    install_url: String,
}

impl InstallGithubAppTool {
    pub fn new(install_url: impl Into<String>) -> Self {
        Self {
            install_url: install_url.into(),
        }
    }
}

#[async_trait]
impl Tool for InstallGithubAppTool {
    fn name(&self) -> &str {
        "install_github_app"
    }

    fn description(&self) -> &str {
        "Open the GitHub App installation page so the user can grant repository access."
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::success(
            "I've opened the GitHub App installation page. Pick the repositories to share, \
             then come back and tell me when you're done.",
        )
        .with_ui_action(UiAction::new("open_url").with("url", self.install_url.clone())))
    }
}

/// Opens the client's repository picker.
pub struct ConnectGithubRepoTool;

#[async_trait]
impl Tool for ConnectGithubRepoTool {
    fn name(&self) -> &str {
        "connect_github_repo"
    }

    fn description(&self) -> &str {
        "Show a repository picker listing the repositories the GitHub App can access."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "repos": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Candidate repositories as owner/repo"
                }
            }
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let repos = params
            .get("repos")
            .cloned()
            .unwrap_or_else(|| serde_json::json!([]));
        if !repos.is_array() {
            return Err(ToolError::InvalidParameters {
                name: self.name().to_string(),
                reason: "'repos' must be an array of strings".to_string(),
            });
        }
        Ok(ToolOutput::success("Choose the repository to connect.")
            .with_ui_action(UiAction::new("open_repo_picker").with("repos", repos)))
    }
}

/// Closes the session as completed. Requires at least one article.
pub struct CompleteOnboardingTool;

#[async_trait]
impl Tool for CompleteOnboardingTool {
    fn name(&self) -> &str {
        "complete_onboarding"
    }

    fn description(&self) -> &str {
        "Mark onboarding as complete once documentation has been imported or generated."
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let data = ctx.step_data().await;
        if data.article_count() == 0 {
            return Ok(ToolOutput::failure(
                "Onboarding can't be completed yet: no articles were imported or generated. \
                 Say \"reimport\" to import your markdown files or generate docs from code.",
            ));
        }

        ctx.complete_onboarding()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                reason: e.to_string(),
            })?;

        Ok(ToolOutput::success(format!(
            "Onboarding complete. Your space has {} article(s) and stays in sync with your repository.",
            data.article_count()
        )))
    }
}

/// Closes the session as skipped.
pub struct SkipOnboardingTool;

#[async_trait]
impl Tool for SkipOnboardingTool {
    fn name(&self) -> &str {
        "skip_onboarding"
    }

    fn description(&self) -> &str {
        "End onboarding early. The user can set things up later from settings."
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        ctx.skip_onboarding()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                reason: e.to_string(),
            })?;
        Ok(ToolOutput::success(
            "Onboarding closed. You can connect GitHub and import docs any time from settings.",
        ))
    }
}
