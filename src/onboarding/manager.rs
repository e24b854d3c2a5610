//! OnboardingManager: loads a user's session, classifies the message and
//! runs the transition engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ClassifierError, Result};
use crate::github::GitHubApi;
use crate::store::{IntegrationStore, OnboardingSession, OnboardingStore, SessionStatus};
use crate::tools::ToolContext;

use super::engine::TransitionEngine;
use super::intent::{Intent, classify_by_pattern};
use super::model::{Event, StepDataUpdate};
use super::prompts;
use super::state::{FsmState, resolve_state};

/// Classifier consulted when no pattern rule matches (typically an LLM).
#[async_trait]
pub trait IntentFallback: Send + Sync {
    async fn classify(
        &self,
        message: &str,
        state: FsmState,
    ) -> std::result::Result<Intent, ClassifierError>;
}

/// Result of one turn as seen by a channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub state: FsmState,
    pub events: Vec<Event>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    /// The turn stopped in an auto state; call `continue_turn` to run it.
    pub needs_continuation: bool,
    /// Set when the fallback classifier failed and the message was treated
    /// as off-topic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier_error: Option<String>,
}

/// Session status returned by the REST endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingStatus {
    pub user_id: String,
    pub status: SessionStatus,
    pub state: FsmState,
    pub current_step: String,
    pub step_data: super::model::StepData,
}

/// Coordinates sessions, classification and the transition engine.
///
/// Turns for one user run one at a time; turns for different users run
/// concurrently.
pub struct OnboardingManager {
    engine: TransitionEngine,
    sessions: Arc<dyn OnboardingStore>,
    integrations: Arc<dyn IntegrationStore>,
    github: Arc<dyn GitHubApi>,
    fallback: Option<Arc<dyn IntentFallback>>,
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OnboardingManager {
    pub fn new(
        engine: TransitionEngine,
        sessions: Arc<dyn OnboardingStore>,
        integrations: Arc<dyn IntegrationStore>,
        github: Arc<dyn GitHubApi>,
    ) -> Self {
        Self {
            engine,
            sessions,
            integrations,
            github,
            fallback: None,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Use `fallback` for messages no pattern rule recognizes.
    pub fn with_fallback(mut self, fallback: Arc<dyn IntentFallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Process one user message.
    pub async fn process_message(&self, user_id: &str, message: &str) -> Result<TurnOutcome> {
        let lock = self.turn_lock(user_id).await;
        let _turn = lock.lock().await;

        let session = self.sessions.start_session(user_id).await?;
        if session.status.is_closed() {
            return Ok(closed_outcome(&session));
        }

        let state = resolve_state(&session.step_data);
        let (intent, classifier_error) = self.classify(message, state).await;
        debug!(user_id, state = %state, intent = %intent, "Processing onboarding message");

        let ctx = self.context(user_id, session);
        ctx.set_user_message(Some(message.to_string())).await;
        let result = self.engine.transition(state, intent, &ctx).await?;

        Ok(TurnOutcome {
            needs_continuation: result.new_state.is_auto(),
            state: result.new_state,
            events: result.events,
            intent: Some(intent),
            classifier_error,
        })
    }

    /// Run the auto state a previous turn stopped in. No-op in a prompt state.
    pub async fn continue_turn(&self, user_id: &str) -> Result<TurnOutcome> {
        let lock = self.turn_lock(user_id).await;
        let _turn = lock.lock().await;

        let session = self.sessions.start_session(user_id).await?;
        if session.status.is_closed() {
            return Ok(closed_outcome(&session));
        }

        let state = resolve_state(&session.step_data);
        if !state.is_auto() {
            return Ok(TurnOutcome {
                state,
                events: Vec::new(),
                intent: None,
                needs_continuation: false,
                classifier_error: None,
            });
        }

        let ctx = self.context(user_id, session);
        let result = self.engine.transition(state, Intent::Confirm, &ctx).await?;
        Ok(TurnOutcome {
            needs_continuation: result.new_state.is_auto(),
            state: result.new_state,
            events: result.events,
            intent: None,
            classifier_error: None,
        })
    }

    /// Current session status, if the user has started onboarding.
    pub async fn get_status(&self, user_id: &str) -> Result<Option<OnboardingStatus>> {
        let Some(session) = self.sessions.load_session(user_id).await? else {
            return Ok(None);
        };
        Ok(Some(OnboardingStatus {
            user_id: session.user_id,
            status: session.status,
            state: resolve_state(&session.step_data),
            current_step: session.current_step,
            step_data: session.step_data,
        }))
    }

    /// Webhook entry point: a push landed on `repo`.
    ///
    /// Returns whether it was recorded against the user's connected repo.
    /// Does not wait for an in-flight turn; the flag is merged into the
    /// stored step data and the turn picks it up on its next write.
    pub async fn record_push(&self, user_id: &str, repo: &str) -> Result<bool> {
        let Some(session) = self.sessions.load_session(user_id).await? else {
            return Ok(false);
        };
        let connected = session.step_data.connected_repo.as_deref();
        if !connected.is_some_and(|c| c.eq_ignore_ascii_case(repo)) {
            debug!(user_id, repo, "Push for a repository that is not connected");
            return Ok(false);
        }

        self.sessions
            .merge_step_data(
                user_id,
                StepDataUpdate {
                    sync_triggered: Some(true),
                    last_sync_time: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        info!(user_id, repo, "Push recorded");
        Ok(true)
    }

    /// Patterns first, then the fallback. With no fallback, or when it
    /// fails, the message is off-topic; a failure is returned alongside so
    /// the caller can tell it apart from a genuinely off-topic message.
    async fn classify(&self, message: &str, state: FsmState) -> (Intent, Option<String>) {
        if let Some(intent) = classify_by_pattern(message) {
            return (intent, None);
        }
        match &self.fallback {
            Some(fallback) => match fallback.classify(message, state).await {
                Ok(intent) => (intent, None),
                Err(e) => {
                    warn!(state = %state, "Fallback classifier failed: {}", e);
                    (Intent::OffTopic, Some(e.to_string()))
                }
            },
            None => {
                debug!(state = %state, "No fallback classifier, treating message as off-topic");
                (Intent::OffTopic, None)
            }
        }
    }

    async fn turn_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks.entry(user_id.to_string()).or_default().clone()
    }

    fn context(&self, user_id: &str, session: OnboardingSession) -> ToolContext {
        ToolContext::new(
            user_id,
            session.step_data,
            self.sessions.clone(),
            self.integrations.clone(),
            self.github.clone(),
        )
    }
}

fn closed_outcome(session: &OnboardingSession) -> TurnOutcome {
    TurnOutcome {
        state: FsmState::Completed,
        events: vec![Event::content(prompts::completed_message(&session.step_data))],
        intent: None,
        needs_continuation: false,
        classifier_error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;
    use crate::tools::ToolRegistry;
    use crate::tools::context::test_support::FixedHead;

    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::{GitHubError, ToolError};
    use crate::onboarding::StepData;
    use crate::store::IntegrationStore;
    use crate::tools::{Tool, ToolOutput};

    struct AlwaysConfirm;

    struct Unreachable;

    #[async_trait]
    impl IntentFallback for Unreachable {
        async fn classify(
            &self,
            _message: &str,
            _state: FsmState,
        ) -> std::result::Result<Intent, ClassifierError> {
            Err(ClassifierError::RequestFailed("timed out".into()))
        }
    }

    /// GitHub stub whose HEAD never moves, but a webhook push arrives while
    /// the HEAD request is in flight.
    struct PushDuringPoll {
        manager: OnceLock<Arc<OnboardingManager>>,
    }

    #[async_trait]
    impl GitHubApi for PushDuringPoll {
        async fn head_commit_sha(
            &self,
            repo: &str,
            _branch: &str,
        ) -> std::result::Result<String, GitHubError> {
            if let Some(manager) = self.manager.get() {
                assert!(manager.record_push("u1", repo).await.unwrap());
            }
            Ok("abc".to_string())
        }
    }

    /// Import tool that counts its runs and takes a moment to finish.
    #[derive(Default)]
    struct SlowImport(AtomicUsize);

    #[async_trait]
    impl Tool for SlowImport {
        fn name(&self) -> &str {
            "import_all_markdown"
        }

        fn description(&self) -> &str {
            "counts imports"
        }

        async fn execute(
            &self,
            _params: serde_json::Value,
            _ctx: &ToolContext,
        ) -> std::result::Result<ToolOutput, ToolError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(ToolOutput::success("Imported.").with_data(serde_json::json!({"articles": ["Readme"]})))
        }
    }

    #[async_trait]
    impl IntentFallback for AlwaysConfirm {
        async fn classify(
            &self,
            _message: &str,
            _state: FsmState,
        ) -> std::result::Result<Intent, ClassifierError> {
            Ok(Intent::Confirm)
        }
    }

    async fn manager() -> (OnboardingManager, Arc<LibSqlBackend>) {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let registry = ToolRegistry::new();
        registry.register_builtin_tools("https://example.com/install");
        let engine = TransitionEngine::new(Arc::new(registry), "Documentation");
        let manager = OnboardingManager::new(
            engine,
            backend.clone(),
            backend.clone(),
            Arc::new(FixedHead(None)),
        );
        (manager, backend)
    }

    #[tokio::test]
    async fn unclassified_without_fallback_is_off_topic() {
        let (manager, _) = manager().await;
        let outcome = manager
            .process_message("u1", "what a lovely day")
            .await
            .unwrap();
        assert_eq!(outcome.intent, Some(Intent::OffTopic));
        assert_eq!(outcome.state, FsmState::Welcome);
    }

    #[tokio::test]
    async fn fallback_resolves_unclassified() {
        let (manager, _) = manager().await;
        let manager = manager.with_fallback(Arc::new(AlwaysConfirm));
        let outcome = manager.process_message("u1", "done").await.unwrap();
        assert_eq!(outcome.intent, Some(Intent::Confirm));
        assert_ne!(outcome.state, FsmState::Welcome);
    }

    #[tokio::test]
    async fn closed_session_answers_completed() {
        let (manager, _) = manager().await;
        manager.process_message("u1", "skip").await.unwrap();
        let outcome = manager.process_message("u1", "yes").await.unwrap();
        assert_eq!(outcome.state, FsmState::Completed);
        assert_eq!(outcome.events.len(), 1);

        let status = manager.get_status("u1").await.unwrap().unwrap();
        assert_eq!(status.status, SessionStatus::Skipped);
    }

    #[tokio::test]
    async fn push_only_counts_for_connected_repo() {
        let (manager, backend) = manager().await;
        assert!(!manager.record_push("nobody", "acme/docs").await.unwrap());

        let session = backend.start_session("u1").await.unwrap();
        let mut data = session.step_data;
        data.connected_repo = Some("acme/docs".into());
        backend.save_step_data("u1", &data).await.unwrap();

        assert!(!manager.record_push("u1", "acme/api").await.unwrap());
        assert!(manager.record_push("u1", "Acme/Docs").await.unwrap());
        let status = manager.get_status("u1").await.unwrap().unwrap();
        assert_eq!(status.step_data.sync_triggered, Some(true));
    }

    #[tokio::test]
    async fn continue_in_prompt_state_is_noop() {
        let (manager, _) = manager().await;
        let outcome = manager.continue_turn("u1").await.unwrap();
        assert_eq!(outcome.state, FsmState::Welcome);
        assert!(outcome.events.is_empty());
    }

    #[tokio::test]
    async fn fallback_failure_is_reported() {
        let (manager, _) = manager().await;
        let manager = manager.with_fallback(Arc::new(Unreachable));
        let outcome = manager.process_message("u1", "done").await.unwrap();
        assert_eq!(outcome.intent, Some(Intent::OffTopic));
        assert!(outcome.classifier_error.unwrap().contains("timed out"));

        let outcome = manager.process_message("u1", "status").await.unwrap();
        assert!(outcome.classifier_error.is_none());
    }

    #[tokio::test]
    async fn push_during_turn_survives_turn_write() {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let registry = ToolRegistry::new();
        registry.register_builtin_tools("https://example.com/install");
        let github = Arc::new(PushDuringPoll {
            manager: OnceLock::new(),
        });
        let manager = Arc::new(OnboardingManager::new(
            TransitionEngine::new(Arc::new(registry), "Documentation"),
            backend.clone(),
            backend.clone(),
            github.clone(),
        ));
        let _ = github.manager.set(manager.clone());

        backend
            .connect_repository("u1", Some(7), "acme/docs")
            .await
            .unwrap();
        backend.start_session("u1").await.unwrap();
        let data = StepData {
            fsm_state: Some(FsmState::SyncWaiting),
            connected_repo: Some("acme/docs".into()),
            last_known_commit_sha: Some("abc".into()),
            ..StepData::new()
        };
        backend.save_step_data("u1", &data).await.unwrap();

        let outcome = manager.process_message("u1", "check").await.unwrap();
        assert_eq!(outcome.state, FsmState::SyncWaiting);
        let stored = backend.load_session("u1").await.unwrap().unwrap();
        assert_eq!(stored.step_data.sync_triggered, Some(true));
        assert_eq!(stored.step_data.fsm_state, Some(FsmState::SyncWaiting));

        let outcome = manager.process_message("u1", "check").await.unwrap();
        assert_eq!(outcome.state, FsmState::SyncConfirmed);
    }

    #[tokio::test]
    async fn concurrent_continues_run_import_once() {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let import = Arc::new(SlowImport::default());
        let registry = ToolRegistry::new();
        registry.register_builtin_tools("https://example.com/install");
        registry.register(import.clone()).await;
        let manager = OnboardingManager::new(
            TransitionEngine::new(Arc::new(registry), "Documentation"),
            backend.clone(),
            backend.clone(),
            Arc::new(FixedHead(None)),
        );

        backend.start_session("u1").await.unwrap();
        let data = StepData {
            fsm_state: Some(FsmState::Importing),
            space_id: Some("sp-1".into()),
            discovered_files: vec!["README.md".into()],
            ..StepData::new()
        };
        backend.save_step_data("u1", &data).await.unwrap();

        let (a, b) = tokio::join!(manager.continue_turn("u1"), manager.continue_turn("u1"));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(import.0.load(Ordering::SeqCst), 1);
        assert_eq!(a.state, FsmState::GapAnalysisPrompt);
        assert_eq!(b.state, FsmState::GapAnalysisPrompt);
        assert_eq!(a.events.is_empty() as u8 + b.events.is_empty() as u8, 1);
    }
}
