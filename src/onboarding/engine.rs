//! Transition engine: runs one user turn through the onboarding FSM.
//!
//! Each handler returns a `Hop`. The engine loops while hops chain into
//! further states, collecting events, and stops at the first state that
//! must wait for the user (or that yields so the caller can render progress
//! before a slow step).

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::intent::Intent;
use super::model::{
    DocAction, Event, GapResult, GitHubConnection, GitHubStatus, StepData, StepDataUpdate,
    StepField, TransitionResult,
};
use super::prompts;
use super::repo_match::match_repo_name;
use super::state::FsmState;
use super::sync::{self, SyncStatus};
use super::table::{GlobalAction, global_action};
use crate::error::{OnboardingError, ToolError};
use crate::tools::{ToolContext, ToolOutput, ToolRegistry};

/// Upper bound on handler invocations within one turn.
pub const MAX_HOPS: usize = 16;

/// Where a handler sends the turn next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hop {
    /// Stop and wait for the user in this state.
    Wait(FsmState),
    /// Run this state's handler within the same turn.
    Chain(FsmState),
    /// Stop in an auto state without running it yet.
    Yield(FsmState),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpaceData {
    space_id: String,
    #[serde(default)]
    space_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FilesData {
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ArticlesData {
    #[serde(default)]
    articles: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GapsData {
    #[serde(default)]
    gaps: Vec<GapResult>,
}

/// Drives the onboarding FSM. Holds no per-session state.
pub struct TransitionEngine {
    tools: Arc<ToolRegistry>,
    default_space_name: String,
}

impl TransitionEngine {
    pub fn new(tools: Arc<ToolRegistry>, default_space_name: impl Into<String>) -> Self {
        Self {
            tools,
            default_space_name: default_space_name.into(),
        }
    }

    /// Process one turn starting in `state` with the classified `intent`.
    ///
    /// Tool failures never escape: they become `content` events and the
    /// turn continues along the table's edge. An error here means the
    /// chain looped or ran away.
    pub async fn transition(
        &self,
        state: FsmState,
        intent: Intent,
        ctx: &ToolContext,
    ) -> Result<TransitionResult, OnboardingError> {
        let mut events = Vec::new();
        let mut visited = HashSet::new();
        if state.is_auto() {
            visited.insert(state);
        }

        let mut handled = state;
        let mut hop = self.first_hop(state, intent, ctx, &mut events).await;
        let mut hops = 1;

        let new_state = loop {
            match hop {
                Hop::Wait(next) => break self.settle(handled, next, ctx, &mut events).await,
                Hop::Yield(next) => break next,
                Hop::Chain(next) => {
                    if next.is_auto() && !visited.insert(next) {
                        return Err(OnboardingError::ChainCycle { state: next });
                    }
                    hops += 1;
                    if hops > MAX_HOPS {
                        return Err(OnboardingError::ChainTooLong {
                            state: next,
                            max: MAX_HOPS,
                        });
                    }
                    debug!(from = %handled, to = %next, "Chaining");
                    handled = next;
                    hop = self.handle(next, intent, ctx, &mut events).await;
                }
            }
        };

        persist(
            ctx,
            StepDataUpdate {
                fsm_state: Some(new_state),
                ..Default::default()
            },
        )
        .await;
        if let Err(e) = ctx.advance_step(new_state.as_str()).await {
            warn!(state = %new_state, "Failed to record step: {}", e);
        }

        info!(from = %state, to = %new_state, intent = %intent, events = events.len(), "Transition");
        Ok(TransitionResult { new_state, events })
    }

    /// First hop of a turn: repo-name match, then global intents, then the
    /// state handler.
    async fn first_hop(
        &self,
        state: FsmState,
        intent: Intent,
        ctx: &ToolContext,
        events: &mut Vec<Event>,
    ) -> Hop {
        let data = ctx.step_data().await;

        if state == FsmState::GithubRepoPrompt
            && !data.available_repos.is_empty()
            && let Some(repo) = data
                .user_message
                .as_deref()
                .and_then(|m| match_repo_name(m, &data.available_repos))
        {
            debug!(repo = %repo, "Repository matched from free text");
            persist(
                ctx,
                StepDataUpdate {
                    connected_repo: Some(repo),
                    ..Default::default()
                },
            )
            .await;
            return Hop::Chain(FsmState::GithubRepoSelecting);
        }

        match global_action(state, intent, &data) {
            Some(GlobalAction::Reply(message)) => {
                events.push(Event::content(message));
                Hop::Wait(state)
            }
            Some(GlobalAction::JumpBack { ack, clear, target }) => {
                events.push(Event::content(ack));
                persist(ctx, StepDataUpdate::clearing(clear)).await;
                if target.is_auto() {
                    Hop::Chain(target)
                } else {
                    Hop::Wait(target)
                }
            }
            Some(GlobalAction::Reinterpret(as_intent)) => {
                self.handle(state, as_intent, ctx, events).await
            }
            None => self.handle(state, intent, ctx, events).await,
        }
    }

    /// Finish a turn that stops in `next`, entered from `handled`.
    async fn settle(
        &self,
        handled: FsmState,
        next: FsmState,
        ctx: &ToolContext,
        events: &mut Vec<Event>,
    ) -> FsmState {
        if next == handled {
            return next;
        }

        let mut next = next;
        if next == FsmState::SyncExplain {
            if ctx.step_data().await.is_sync_triggered() {
                next = FsmState::SyncConfirmed;
            } else {
                sync::snapshot_commit_sha(ctx).await;
            }
        }

        if let Some(prompt) = prompts::entry_prompt(next, &ctx.step_data().await) {
            events.push(Event::content(prompt));
        }
        next
    }

    async fn handle(
        &self,
        state: FsmState,
        intent: Intent,
        ctx: &ToolContext,
        events: &mut Vec<Event>,
    ) -> Hop {
        let data = ctx.step_data().await;
        match state {
            FsmState::Welcome => match intent {
                Intent::Confirm | Intent::GithubDone | Intent::Check | Intent::ChangeGithub => {
                    Hop::Chain(FsmState::GithubCheck)
                }
                Intent::Skip => {
                    self.run_tool("skip_onboarding", json!({}), ctx, events).await;
                    Hop::Wait(FsmState::Completed)
                }
                _ => reprompt(state, &data, events),
            },

            FsmState::GithubCheck => self.check_github(intent, &data, ctx, events).await,

            FsmState::GithubInstalling => {
                self.run_tool("install_github_app", json!({}), ctx, events)
                    .await;
                Hop::Wait(FsmState::GithubInstallPrompt)
            }

            FsmState::GithubInstallPrompt => match intent {
                Intent::GithubDone | Intent::Check => Hop::Chain(FsmState::GithubCheck),
                Intent::Confirm => Hop::Chain(FsmState::GithubInstalling),
                Intent::Skip => Hop::Chain(FsmState::Completing),
                _ => reprompt(state, &data, events),
            },

            FsmState::GithubRepoPrompt => match intent {
                Intent::Confirm if data.available_repos.len() == 1 => {
                    persist(
                        ctx,
                        StepDataUpdate {
                            connected_repo: data.available_repos.first().cloned(),
                            ..Default::default()
                        },
                    )
                    .await;
                    Hop::Chain(FsmState::GithubRepoSelecting)
                }
                Intent::Confirm => {
                    events.push(Event::content(prompts::repo_choice_prompt(
                        &data.available_repos,
                    )));
                    self.run_tool(
                        "connect_github_repo",
                        json!({ "repos": data.available_repos }),
                        ctx,
                        events,
                    )
                    .await;
                    Hop::Wait(state)
                }
                Intent::Skip => Hop::Wait(FsmState::RepoScanPrompt),
                _ => {
                    let typed = data.user_message.as_deref().unwrap_or("").trim();
                    if typed.is_empty() || data.available_repos.is_empty() {
                        reprompt(state, &data, events)
                    } else {
                        events.push(Event::content(prompts::repo_not_found(
                            typed,
                            &data.available_repos,
                        )));
                        Hop::Wait(state)
                    }
                }
            },

            FsmState::GithubRepoSelecting => self.select_repo(&data, ctx, events).await,

            FsmState::RepoScanPrompt => match intent {
                Intent::Confirm | Intent::Check => Hop::Chain(FsmState::RepoScanning),
                Intent::Skip => Hop::Wait(FsmState::SyncExplain),
                _ => reprompt(state, &data, events),
            },

            FsmState::RepoScanning => {
                let Some(repo) = data.connected_repo.clone() else {
                    events.push(Event::content(
                        "No repository is connected yet, so there is nothing to scan. \
                         Say \"change github\" to connect one.",
                    ));
                    return Hop::Wait(FsmState::RepoScanPrompt);
                };
                let out = self
                    .run_tool("scan_repository", json!({ "repo": repo }), ctx, events)
                    .await;
                let files = successful_data::<FilesData>(&out).files;
                persist(
                    ctx,
                    StepDataUpdate {
                        discovered_files: Some(files),
                        ..Default::default()
                    },
                )
                .await;
                Hop::Wait(FsmState::DocActionPrompt)
            }

            FsmState::DocActionPrompt => {
                let action = match intent {
                    Intent::Import | Intent::Reimport => DocAction::Import,
                    Intent::Generate => DocAction::Generate,
                    Intent::Both => DocAction::Both,
                    Intent::Confirm => {
                        events.push(Event::content(prompts::doc_action_question()));
                        return Hop::Wait(state);
                    }
                    Intent::Skip => return Hop::Wait(FsmState::SyncExplain),
                    _ => return reprompt(state, &data, events),
                };

                if action.imports() && data.discovered_files.is_empty() {
                    events.push(Event::content(prompts::nothing_to_import()));
                    return Hop::Wait(state);
                }

                persist(
                    ctx,
                    StepDataUpdate {
                        doc_action: Some(action),
                        ..Default::default()
                    },
                )
                .await;
                events.push(Event::content(prompts::doc_action_ack(action)));
                if action.imports() {
                    Hop::Chain(FsmState::SpaceCreating)
                } else {
                    Hop::Wait(FsmState::GeneratePrompt)
                }
            }

            FsmState::SpaceCreating => {
                self.create_space(ctx, events).await;
                Hop::Yield(FsmState::Importing)
            }

            FsmState::Importing => {
                let out = self
                    .run_tool(
                        "import_all_markdown",
                        json!({ "spaceId": data.space_id, "files": data.discovered_files }),
                        ctx,
                        events,
                    )
                    .await;
                if out.success {
                    persist(
                        ctx,
                        StepDataUpdate {
                            imported_articles: Some(successful_data::<ArticlesData>(&out).articles),
                            ..Default::default()
                        },
                    )
                    .await;
                }
                Hop::Wait(FsmState::GapAnalysisPrompt)
            }

            FsmState::GapAnalysisPrompt => match intent {
                Intent::Confirm | Intent::Check => Hop::Chain(FsmState::GapAnalyzing),
                Intent::Skip if data.doc_action == Some(DocAction::Both) => {
                    Hop::Wait(FsmState::GeneratePrompt)
                }
                Intent::Skip => Hop::Wait(FsmState::SyncExplain),
                _ => reprompt(state, &data, events),
            },

            FsmState::GapAnalyzing => {
                let out = self
                    .run_tool(
                        "run_gap_analysis",
                        json!({ "repo": data.connected_repo, "spaceId": data.space_id }),
                        ctx,
                        events,
                    )
                    .await;
                if out.success {
                    persist(
                        ctx,
                        StepDataUpdate {
                            gap_analysis_results: Some(successful_data::<GapsData>(&out).gaps),
                            ..Default::default()
                        },
                    )
                    .await;
                }
                if data.doc_action.is_some_and(|a| a.generates()) {
                    Hop::Wait(FsmState::GeneratePrompt)
                } else {
                    Hop::Wait(FsmState::SyncExplain)
                }
            }

            FsmState::GeneratePrompt => match intent {
                Intent::Confirm | Intent::Generate | Intent::Check => {
                    Hop::Chain(FsmState::Generating)
                }
                Intent::Skip => Hop::Wait(FsmState::SyncExplain),
                _ => reprompt(state, &data, events),
            },

            FsmState::Generating => {
                if data.space_id.is_none() {
                    self.create_space(ctx, events).await;
                }
                let data = ctx.step_data().await;
                let out = self
                    .run_tool(
                        "generate_from_code",
                        json!({
                            "repo": data.connected_repo,
                            "spaceId": data.space_id,
                            "gaps": data.gap_analysis_results,
                        }),
                        ctx,
                        events,
                    )
                    .await;
                if out.success {
                    let articles = successful_data::<ArticlesData>(&out).articles;
                    persist(
                        ctx,
                        StepDataUpdate {
                            generated_count: Some(u32::try_from(articles.len()).unwrap_or(u32::MAX)),
                            generated_articles: Some(articles),
                            ..Default::default()
                        },
                    )
                    .await;
                }
                Hop::Wait(FsmState::SyncExplain)
            }

            FsmState::SyncExplain => {
                if data.is_sync_triggered() {
                    return Hop::Wait(FsmState::SyncConfirmed);
                }
                match intent {
                    Intent::Confirm | Intent::Check => Hop::Chain(FsmState::SyncChecking),
                    Intent::Skip => Hop::Chain(FsmState::Completing),
                    _ => reprompt(state, &data, events),
                }
            }

            FsmState::SyncChecking => {
                sync::snapshot_commit_sha(ctx).await;
                match sync::detect_sync(ctx).await {
                    SyncStatus::Confirmed => Hop::Wait(FsmState::SyncConfirmed),
                    SyncStatus::Waiting => Hop::Wait(FsmState::SyncWaiting),
                }
            }

            FsmState::SyncWaiting => match intent {
                Intent::Check | Intent::Confirm | Intent::GithubDone => {
                    Hop::Chain(FsmState::SyncChecking)
                }
                Intent::Skip => Hop::Chain(FsmState::Completing),
                _ => reprompt(state, &data, events),
            },

            FsmState::SyncConfirmed => match intent {
                Intent::Goodbye | Intent::Skip => Hop::Chain(FsmState::Completing),
                _ => {
                    events.push(Event::content(prompts::sync_confirmed_reply()));
                    Hop::Wait(state)
                }
            },

            FsmState::Completing => {
                if data.article_count() > 0 {
                    let out = self
                        .run_tool("complete_onboarding", json!({}), ctx, events)
                        .await;
                    if !out.success {
                        self.run_tool("skip_onboarding", json!({}), ctx, events)
                            .await;
                    }
                } else {
                    self.run_tool("skip_onboarding", json!({}), ctx, events)
                        .await;
                }
                Hop::Wait(FsmState::Completed)
            }

            FsmState::Completed => {
                events.push(Event::content(prompts::completed_message(&data)));
                Hop::Wait(state)
            }
        }
    }

    async fn check_github(
        &self,
        intent: Intent,
        data: &StepData,
        ctx: &ToolContext,
        events: &mut Vec<Event>,
    ) -> Hop {
        let out = self
            .run_tool(
                "check_github_status",
                json!({ "reconnect": intent == Intent::ChangeGithub }),
                ctx,
                events,
            )
            .await;
        if !out.success {
            return Hop::Wait(FsmState::GithubInstallPrompt);
        }
        let Some(status) = out.data_as::<GitHubStatus>() else {
            warn!("check_github_status returned no status data");
            return Hop::Chain(FsmState::GithubInstalling);
        };

        match status.status {
            GitHubConnection::Connected => {
                let same_repo = status.repo.is_some() && status.repo == data.connected_repo;
                persist(
                    ctx,
                    StepDataUpdate {
                        clear: vec![StepField::AvailableRepos],
                        connected_repo: status.repo,
                        connected_integration: status.integration_id,
                        connected_installation_id: status.installation_id,
                        ..Default::default()
                    },
                )
                .await;
                if same_repo && !data.discovered_files.is_empty() {
                    Hop::Wait(FsmState::DocActionPrompt)
                } else {
                    Hop::Wait(FsmState::RepoScanPrompt)
                }
            }
            GitHubConnection::Installed => match status.repos.len() {
                0 => Hop::Chain(FsmState::GithubInstalling),
                1 => {
                    persist(
                        ctx,
                        StepDataUpdate {
                            connected_repo: status.repos.into_iter().next(),
                            connected_installation_id: status.installation_id,
                            ..Default::default()
                        },
                    )
                    .await;
                    Hop::Chain(FsmState::GithubRepoSelecting)
                }
                _ => {
                    persist(
                        ctx,
                        StepDataUpdate {
                            available_repos: Some(status.repos),
                            connected_installation_id: status.installation_id,
                            ..Default::default()
                        },
                    )
                    .await;
                    Hop::Wait(FsmState::GithubRepoPrompt)
                }
            },
            GitHubConnection::NotInstalled => Hop::Chain(FsmState::GithubInstalling),
        }
    }

    async fn select_repo(&self, data: &StepData, ctx: &ToolContext, events: &mut Vec<Event>) -> Hop {
        let Some(repo) = data.connected_repo.clone() else {
            return Hop::Wait(FsmState::GithubRepoPrompt);
        };

        match ctx
            .integrations
            .connect_repository(&ctx.user_id, data.connected_installation_id, &repo)
            .await
        {
            Ok(integration) => {
                persist(
                    ctx,
                    StepDataUpdate {
                        connected_integration: Some(integration.id),
                        ..Default::default()
                    },
                )
                .await;
                Hop::Wait(FsmState::RepoScanPrompt)
            }
            Err(e) => {
                warn!(repo = %repo, "Failed to connect repository: {}", e);
                events.push(Event::content(format!(
                    "I couldn't connect **{repo}**: {e}"
                )));
                persist(ctx, StepDataUpdate::clearing(&[StepField::ConnectedRepo])).await;
                Hop::Wait(FsmState::GithubRepoPrompt)
            }
        }
    }

    async fn create_space(&self, ctx: &ToolContext, events: &mut Vec<Event>) {
        let out = self
            .run_tool(
                "get_or_create_space",
                json!({ "name": self.default_space_name }),
                ctx,
                events,
            )
            .await;
        if let Some(space) = out.success.then(|| out.data_as::<SpaceData>()).flatten() {
            persist(
                ctx,
                StepDataUpdate {
                    space_id: Some(space.space_id),
                    space_name: space.space_name,
                    ..Default::default()
                },
            )
            .await;
        }
    }

    /// Run a tool by name and record its events.
    ///
    /// Emits `tool_call`, then the tool's content, then its UI action. A
    /// missing tool or a tool error is reported as a failed output.
    async fn run_tool(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolContext,
        events: &mut Vec<Event>,
    ) -> ToolOutput {
        events.push(Event::tool_call(name, args.clone()));

        let result = match self.tools.get(name).await {
            Some(tool) => tool.execute(args, ctx).await,
            None => Err(ToolError::NotFound {
                name: name.to_string(),
            }),
        };
        let out = result.unwrap_or_else(|e| ToolOutput::failure(e.to_string()));

        if out.success {
            debug!(tool = %name, "Tool succeeded");
        } else {
            warn!(tool = %name, "Tool failed: {}", out.content);
        }
        if !out.content.is_empty() {
            events.push(Event::content(out.content.clone()));
        }
        if let Some(ref action) = out.ui_action {
            events.push(Event::UiAction {
                ui_action: action.clone(),
            });
        }
        out
    }
}

/// Repeat the state's own question.
fn reprompt(state: FsmState, data: &StepData, events: &mut Vec<Event>) -> Hop {
    let text = prompts::entry_prompt(state, data).unwrap_or_else(|| prompts::redirect_message(state));
    events.push(Event::content(text));
    Hop::Wait(state)
}

/// Structured data of a successful result, empty otherwise.
fn successful_data<T: Default + serde::de::DeserializeOwned>(out: &ToolOutput) -> T {
    if out.success {
        out.data_as().unwrap_or_default()
    } else {
        T::default()
    }
}

async fn persist(ctx: &ToolContext, update: StepDataUpdate) {
    if let Err(e) = ctx.update_step_data(update).await {
        warn!(user_id = %ctx.user_id, "Failed to persist step data: {}", e);
    }
}
