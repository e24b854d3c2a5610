//! Global intents: the interrupts that work from any state.
//!
//! `global_action` runs before the per-state handler on the first hop of a
//! turn. It is pure; the engine applies whatever it returns.

use super::intent::Intent;
use super::model::{StepData, StepField};
use super::prompts;
use super::state::FsmState;

/// Fields derived from the connected repository.
const REPO_DERIVED_FIELDS: &[StepField] = &[
    StepField::ConnectedRepo,
    StepField::ConnectedIntegration,
    StepField::ConnectedInstallationId,
    StepField::AvailableRepos,
    StepField::DiscoveredFiles,
    StepField::LastKnownCommitSha,
    StepField::SyncTriggered,
];

/// Fields derived from the chosen doc action.
const DOC_ACTION_FIELDS: &[StepField] = &[StepField::DocAction, StepField::GapAnalysisResults];

/// What a global intent does in a given state.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalAction {
    /// Say `message` and stay put.
    Reply(String),
    /// Acknowledge, clear stale fields, then move to `target`.
    JumpBack {
        ack: &'static str,
        clear: &'static [StepField],
        target: FsmState,
    },
    /// Let the state handler see the turn as `intent` instead.
    Reinterpret(Intent),
}

/// Resolve a global intent for `state`, or `None` to use the state handler.
pub fn global_action(state: FsmState, intent: Intent, data: &StepData) -> Option<GlobalAction> {
    match intent {
        Intent::Status => Some(GlobalAction::Reply(prompts::status_summary(state, data))),
        Intent::Help => Some(GlobalAction::Reply(prompts::help_message(state).to_string())),
        Intent::OffTopic => {
            let typed_a_name = state == FsmState::GithubRepoPrompt
                && data
                    .user_message
                    .as_deref()
                    .is_some_and(|m| !m.trim().is_empty());
            if typed_a_name {
                None
            } else {
                Some(GlobalAction::Reply(prompts::redirect_message(state)))
            }
        }
        Intent::ChangeGithub if state.is_past_github_check() => Some(GlobalAction::JumpBack {
            ack: prompts::change_github_ack(),
            clear: REPO_DERIVED_FIELDS,
            target: FsmState::GithubCheck,
        }),
        Intent::Reimport if state.is_past_doc_action() => Some(GlobalAction::JumpBack {
            ack: prompts::reimport_ack(),
            clear: DOC_ACTION_FIELDS,
            target: FsmState::DocActionPrompt,
        }),
        Intent::Goodbye if state != FsmState::SyncConfirmed => {
            Some(GlobalAction::Reinterpret(Intent::Skip))
        }
        _ => None,
    }
}
