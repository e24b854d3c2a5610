//! Onboarding conversation: a fixed FSM that connects GitHub, brings in
//! documentation and verifies auto-sync, one chat turn at a time.

pub mod engine;
pub mod intent;
pub mod manager;
pub mod model;
pub mod prompts;
pub mod repo_match;
pub mod routes;
pub mod state;
pub mod sync;
pub mod table;

pub use engine::{MAX_HOPS, TransitionEngine};
pub use intent::{Intent, classify_by_pattern};
pub use manager::{IntentFallback, OnboardingManager, OnboardingStatus, TurnOutcome};
pub use model::{
    DocAction, Event, GapResult, GapSeverity, GitHubConnection, GitHubStatus, StepData,
    STEP_DATA_VERSION, StepDataUpdate, StepField, ToolCall, TransitionResult,
};
pub use repo_match::match_repo_name;
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use state::{FsmState, derive_fsm_state_from_step_data, resolve_state};
pub use sync::{SyncStatus, check_sync_via_api, detect_sync, snapshot_commit_sha};
