//! End-to-end onboarding flows against the in-memory libSQL backend.
//!
//! Host tools are stubbed with canned results; the GitHub API is a stub
//! whose HEAD SHA the test controls.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use docs_onboarding::error::{GitHubError, ToolError};
use docs_onboarding::github::GitHubApi;
use docs_onboarding::onboarding::{
    DocAction, FsmState, Intent, OnboardingManager, StepData, TransitionEngine, classify_by_pattern,
    derive_fsm_state_from_step_data, match_repo_name,
};
use docs_onboarding::store::{IntegrationStore, LibSqlBackend, OnboardingStore, SessionStatus};
use docs_onboarding::tools::{Tool, ToolContext, ToolOutput, ToolRegistry};

// ── Stubs ──────────────────────────────────────────────────────────

/// Tool that returns a fixed output and records the arguments it saw.
struct StubTool {
    name: &'static str,
    output: ToolOutput,
    calls: Mutex<Vec<Value>>,
}

impl StubTool {
    fn new(name: &'static str, output: ToolOutput) -> Arc<Self> {
        Arc::new(Self {
            name,
            output,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "stub"
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        self.calls.lock().unwrap().push(params);
        Ok(self.output.clone())
    }
}

/// Tool that always errors.
struct BrokenTool(&'static str);

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        self.0
    }

    fn description(&self) -> &str {
        "always fails"
    }

    async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        Err(ToolError::ExecutionFailed {
            name: self.0.to_string(),
            reason: "upstream unavailable".to_string(),
        })
    }
}

/// GitHub stub whose HEAD SHA can be moved by the test.
#[derive(Default)]
struct MovableHead(Mutex<Option<String>>);

impl MovableHead {
    fn set(&self, sha: &str) {
        *self.0.lock().unwrap() = Some(sha.to_string());
    }
}

#[async_trait]
impl GitHubApi for MovableHead {
    async fn head_commit_sha(&self, repo: &str, _branch: &str) -> Result<String, GitHubError> {
        self.0
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GitHubError::NotFound(repo.to_string()))
    }
}

struct Harness {
    backend: Arc<LibSqlBackend>,
    github: Arc<MovableHead>,
    engine: TransitionEngine,
}

impl Harness {
    async fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        backend.start_session("u1").await.unwrap();
        let registry = ToolRegistry::new();
        registry.register_builtin_tools("https://github.com/apps/docs/installations/new");
        for tool in tools {
            registry.register(tool).await;
        }
        Self {
            backend,
            github: Arc::new(MovableHead::default()),
            engine: TransitionEngine::new(Arc::new(registry), "Documentation"),
        }
    }

    /// Store `step_data` as the session's record and open a context on it.
    async fn context(&self, step_data: StepData) -> ToolContext {
        self.backend.save_step_data("u1", &step_data).await.unwrap();
        ToolContext::new(
            "u1",
            step_data,
            self.backend.clone(),
            self.backend.clone(),
            self.github.clone(),
        )
    }

    async fn stored(&self) -> StepData {
        self.backend
            .load_session("u1")
            .await
            .unwrap()
            .unwrap()
            .step_data
    }
}

fn github_status(data: Value) -> Arc<StubTool> {
    StubTool::new(
        "check_github_status",
        ToolOutput::success("Checked GitHub.").with_data(data),
    )
}

// ── Global intents ─────────────────────────────────────────────────

#[tokio::test]
async fn status_and_off_topic_never_advance() {
    let h = Harness::new(vec![]).await;
    for state in FsmState::ALL {
        for intent in [Intent::Status, Intent::OffTopic] {
            let ctx = h.context(StepData::new()).await;
            let result = h.engine.transition(state, intent, &ctx).await.unwrap();
            assert_eq!(result.new_state, state, "{state} {intent}");
            assert!(result.tool_calls().is_empty(), "{state} {intent}");
            assert!(!result.events.is_empty());
        }
    }
}

#[tokio::test]
async fn change_github_reconnects_and_clears_repo_data() {
    let status = github_status(json!({
        "status": "installed",
        "installationId": 42,
        "repos": ["acme/docs", "acme/api"],
    }));
    let h = Harness::new(vec![status.clone()]).await;
    let ctx = h.context(StepData {
        connected_repo: Some("acme/old".into()),
        discovered_files: vec!["README.md".into()],
        imported_articles: vec!["Readme".into()],
        sync_triggered: Some(true),
        ..StepData::new()
    }).await;

    let result = h
        .engine
        .transition(FsmState::SyncConfirmed, Intent::ChangeGithub, &ctx)
        .await
        .unwrap();

    assert_eq!(result.new_state, FsmState::GithubRepoPrompt);
    assert_eq!(status.calls(), vec![json!({"reconnect": true})]);
    let data = h.stored().await;
    assert!(data.connected_repo.is_none());
    assert!(data.discovered_files.is_empty());
    assert!(data.sync_triggered.is_none());
    assert_eq!(data.imported_articles, vec!["Readme".to_string()]);
    assert_eq!(data.available_repos.len(), 2);
}

// ── Welcome and GitHub ─────────────────────────────────────────────

#[tokio::test]
async fn welcome_skip_completes() {
    let h = Harness::new(vec![]).await;
    let ctx = h.context(StepData::new()).await;
    let result = h
        .engine
        .transition(FsmState::Welcome, Intent::Skip, &ctx)
        .await
        .unwrap();
    assert_eq!(result.new_state, FsmState::Completed);

    let session = h.backend.load_session("u1").await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Skipped);
}

#[tokio::test]
async fn welcome_confirm_survives_failing_tools() {
    let h = Harness::new(vec![Arc::new(BrokenTool("check_github_status"))]).await;
    let ctx = h.context(StepData::new()).await;
    let result = h
        .engine
        .transition(FsmState::Welcome, Intent::Confirm, &ctx)
        .await
        .unwrap();
    assert!(!result.events.is_empty());
    assert!(result.contents().iter().any(|c| c.contains("upstream unavailable")));
    assert_eq!(result.new_state, FsmState::GithubInstallPrompt);
}

#[tokio::test]
async fn not_installed_opens_install_page() {
    let h = Harness::new(vec![github_status(json!({"status": "not_installed"}))]).await;
    let ctx = h.context(StepData::new()).await;
    let result = h
        .engine
        .transition(FsmState::Welcome, Intent::Confirm, &ctx)
        .await
        .unwrap();

    assert_eq!(result.new_state, FsmState::GithubInstallPrompt);
    assert_eq!(
        result.tool_calls(),
        vec!["check_github_status", "install_github_app"]
    );
    let json = serde_json::to_value(&result.events).unwrap();
    let ui = json
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["type"] == "ui_action")
        .unwrap();
    assert_eq!(ui["uiAction"]["type"], "open_url");
}

#[tokio::test]
async fn single_installed_repo_is_connected_automatically() {
    let h = Harness::new(vec![github_status(json!({
        "status": "installed",
        "installationId": 7,
        "repos": ["acme/docs"],
    }))])
    .await;
    let ctx = h.context(StepData::new()).await;
    let result = h
        .engine
        .transition(FsmState::Welcome, Intent::Confirm, &ctx)
        .await
        .unwrap();

    assert_eq!(result.new_state, FsmState::RepoScanPrompt);
    let data = h.stored().await;
    assert_eq!(data.connected_repo.as_deref(), Some("acme/docs"));
    assert!(data.connected_integration.is_some());

    let integration = h
        .backend
        .active_github_integration("u1", "acme/docs")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(integration.installation_id, Some(7));
}

#[tokio::test]
async fn typed_repo_name_wins_over_intent() {
    let h = Harness::new(vec![]).await;
    let ctx = h.context(StepData {
        available_repos: vec!["acme/docs".into(), "acme/api".into()],
        ..StepData::new()
    }).await;
    ctx.set_user_message(Some("**DOCS**".into())).await;

    let result = h
        .engine
        .transition(FsmState::GithubRepoPrompt, Intent::OffTopic, &ctx)
        .await
        .unwrap();
    assert_eq!(result.new_state, FsmState::RepoScanPrompt);
    assert_eq!(h.stored().await.connected_repo.as_deref(), Some("acme/docs"));
}

#[tokio::test]
async fn unknown_repo_name_reprompts_with_candidates() {
    let h = Harness::new(vec![]).await;
    let ctx = h.context(StepData {
        available_repos: vec!["acme/docs".into(), "acme/api".into()],
        ..StepData::new()
    }).await;
    ctx.set_user_message(Some("widgets".into())).await;

    let result = h
        .engine
        .transition(FsmState::GithubRepoPrompt, Intent::OffTopic, &ctx)
        .await
        .unwrap();
    assert_eq!(result.new_state, FsmState::GithubRepoPrompt);
    let text = result.contents().join("\n");
    assert!(text.contains("widgets"));
    assert!(text.contains("acme/api"));
}

#[tokio::test]
async fn confirm_with_many_repos_opens_picker() {
    let h = Harness::new(vec![]).await;
    let ctx = h.context(StepData {
        available_repos: vec!["acme/docs".into(), "acme/api".into()],
        ..StepData::new()
    }).await;
    ctx.set_user_message(Some("yes".into())).await;

    let result = h
        .engine
        .transition(FsmState::GithubRepoPrompt, Intent::Confirm, &ctx)
        .await
        .unwrap();
    assert_eq!(result.new_state, FsmState::GithubRepoPrompt);
    assert_eq!(result.tool_calls(), vec!["connect_github_repo"]);
}

// ── Docs ───────────────────────────────────────────────────────────

#[tokio::test]
async fn import_creates_space_and_yields_importing() {
    let space = StubTool::new(
        "get_or_create_space",
        ToolOutput::success("Space ready.")
            .with_data(json!({"spaceId": "sp-1", "spaceName": "Documentation"})),
    );
    let import = StubTool::new("import_all_markdown", ToolOutput::success("Imported."));
    let h = Harness::new(vec![space.clone(), import.clone()]).await;
    let ctx = h.context(StepData {
        connected_repo: Some("acme/docs".into()),
        discovered_files: vec!["README.md".into(), "docs/setup.md".into()],
        ..StepData::new()
    }).await;

    let result = h
        .engine
        .transition(FsmState::DocActionPrompt, Intent::Import, &ctx)
        .await
        .unwrap();

    assert_eq!(result.new_state, FsmState::Importing);
    assert_eq!(result.tool_calls(), vec!["get_or_create_space"]);
    assert_eq!(space.calls(), vec![json!({"name": "Documentation"})]);
    assert!(import.calls().is_empty());

    let data = h.stored().await;
    assert_eq!(data.doc_action, Some(DocAction::Import));
    assert_eq!(data.space_id.as_deref(), Some("sp-1"));
    assert_eq!(data.fsm_state, Some(FsmState::Importing));
}

#[tokio::test]
async fn import_failure_is_surfaced_and_flow_continues() {
    let import = StubTool::new(
        "import_all_markdown",
        ToolOutput::failure("Space sp-1 is read-only"),
    );
    let h = Harness::new(vec![import]).await;
    let ctx = h.context(StepData {
        space_id: Some("sp-1".into()),
        discovered_files: vec!["README.md".into()],
        doc_action: Some(DocAction::Import),
        ..StepData::new()
    }).await;

    let result = h
        .engine
        .transition(FsmState::Importing, Intent::Confirm, &ctx)
        .await
        .unwrap();

    assert_eq!(result.new_state, FsmState::GapAnalysisPrompt);
    assert!(result.contents().contains(&"Space sp-1 is read-only"));
    assert!(h.stored().await.imported_articles.is_empty());
}

#[tokio::test]
async fn import_then_gap_analysis_then_generate_for_both() {
    let import = StubTool::new(
        "import_all_markdown",
        ToolOutput::success("Imported 2 articles.").with_data(json!({"articles": ["Readme", "Setup"]})),
    );
    let gaps = StubTool::new(
        "run_gap_analysis",
        ToolOutput::success("Found 1 gap.")
            .with_data(json!({"gaps": [{"title": "Auth", "description": "Undocumented", "severity": "high"}]})),
    );
    let generate = StubTool::new(
        "generate_from_code",
        ToolOutput::success("Generated 1 article.").with_data(json!({"articles": ["Auth"]})),
    );
    let h = Harness::new(vec![import, gaps, generate.clone()]).await;
    let ctx = h.context(StepData {
        connected_repo: Some("acme/docs".into()),
        space_id: Some("sp-1".into()),
        discovered_files: vec!["README.md".into(), "SETUP.md".into()],
        doc_action: Some(DocAction::Both),
        ..StepData::new()
    }).await;

    let r = h.engine.transition(FsmState::Importing, Intent::Confirm, &ctx).await.unwrap();
    assert_eq!(r.new_state, FsmState::GapAnalysisPrompt);

    let r = h
        .engine
        .transition(FsmState::GapAnalysisPrompt, Intent::Confirm, &ctx)
        .await
        .unwrap();
    assert_eq!(r.new_state, FsmState::GeneratePrompt);

    let r = h
        .engine
        .transition(FsmState::GeneratePrompt, Intent::Confirm, &ctx)
        .await
        .unwrap();
    assert_eq!(r.new_state, FsmState::SyncExplain);
    assert_eq!(generate.calls()[0]["gaps"][0]["title"], "Auth");

    let data = h.stored().await;
    assert_eq!(data.imported_articles.len(), 2);
    assert_eq!(data.generated_count, Some(1));
    assert_eq!(data.article_count(), 3);
}

#[tokio::test]
async fn gap_analysis_skip_depends_on_doc_action() {
    let h = Harness::new(vec![]).await;
    let ctx = h.context(StepData {
        doc_action: Some(DocAction::Both),
        ..StepData::new()
    }).await;
    let r = h
        .engine
        .transition(FsmState::GapAnalysisPrompt, Intent::Skip, &ctx)
        .await
        .unwrap();
    assert_eq!(r.new_state, FsmState::GeneratePrompt);

    let ctx = h.context(StepData {
        doc_action: Some(DocAction::Import),
        ..StepData::new()
    }).await;
    let r = h
        .engine
        .transition(FsmState::GapAnalysisPrompt, Intent::Skip, &ctx)
        .await
        .unwrap();
    assert_eq!(r.new_state, FsmState::SyncExplain);
}

#[tokio::test]
async fn import_without_files_suggests_generate() {
    let h = Harness::new(vec![]).await;
    let ctx = h.context(StepData::new()).await;
    let r = h
        .engine
        .transition(FsmState::DocActionPrompt, Intent::Both, &ctx)
        .await
        .unwrap();
    assert_eq!(r.new_state, FsmState::DocActionPrompt);
    assert!(r.tool_calls().is_empty());
    assert!(r.contents()[0].contains("generate"));
}

// ── Sync ───────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_waiting_confirms_on_webhook_flag() {
    let h = Harness::new(vec![]).await;
    let ctx = h.context(StepData {
        sync_triggered: Some(true),
        ..StepData::new()
    }).await;
    let r = h
        .engine
        .transition(FsmState::SyncWaiting, Intent::Check, &ctx)
        .await
        .unwrap();
    assert_eq!(r.new_state, FsmState::SyncConfirmed);
}

#[tokio::test]
async fn sync_waiting_stays_without_integration() {
    let h = Harness::new(vec![]).await;
    h.github.set("abc123");
    let ctx = h.context(StepData {
        connected_repo: Some("acme/docs".into()),
        sync_triggered: Some(false),
        ..StepData::new()
    }).await;
    let r = h
        .engine
        .transition(FsmState::SyncWaiting, Intent::Check, &ctx)
        .await
        .unwrap();
    assert_eq!(r.new_state, FsmState::SyncWaiting);
}

#[tokio::test]
async fn commit_poll_detects_push() {
    let h = Harness::new(vec![]).await;
    h.backend
        .connect_repository("u1", Some(7), "acme/docs")
        .await
        .unwrap();
    h.github.set("aaa111");
    let ctx = h.context(StepData {
        connected_repo: Some("acme/docs".into()),
        ..StepData::new()
    }).await;

    // Entering the sync step takes the snapshot.
    let r = h
        .engine
        .transition(FsmState::RepoScanPrompt, Intent::Skip, &ctx)
        .await
        .unwrap();
    assert_eq!(r.new_state, FsmState::SyncExplain);
    assert_eq!(h.stored().await.last_known_commit_sha.as_deref(), Some("aaa111"));

    let r = h
        .engine
        .transition(FsmState::SyncExplain, Intent::Check, &ctx)
        .await
        .unwrap();
    assert_eq!(r.new_state, FsmState::SyncWaiting);

    h.github.set("bbb222");
    let r = h
        .engine
        .transition(FsmState::SyncWaiting, Intent::Check, &ctx)
        .await
        .unwrap();
    assert_eq!(r.new_state, FsmState::SyncConfirmed);
    assert_eq!(h.stored().await.sync_triggered, Some(true));
}

#[tokio::test]
async fn goodbye_after_sync_completes_onboarding() {
    let h = Harness::new(vec![]).await;
    let ctx = h.context(StepData {
        imported_articles: vec!["Readme".into()],
        sync_triggered: Some(true),
        ..StepData::new()
    }).await;
    let r = h
        .engine
        .transition(FsmState::SyncConfirmed, Intent::Goodbye, &ctx)
        .await
        .unwrap();
    assert_eq!(r.new_state, FsmState::Completed);
    assert_eq!(r.tool_calls(), vec!["complete_onboarding"]);

    let session = h.backend.load_session("u1").await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);

    let again = h
        .engine
        .transition(FsmState::Completed, Intent::Confirm, &ctx)
        .await
        .unwrap();
    assert_eq!(again.new_state, FsmState::Completed);
}

// ── Manager ────────────────────────────────────────────────────────

#[tokio::test]
async fn manager_runs_import_in_two_turns() {
    let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let registry = ToolRegistry::new();
    registry.register_builtin_tools("https://github.com/apps/docs/installations/new");
    registry
        .register(StubTool::new(
            "get_or_create_space",
            ToolOutput::success("Space ready.").with_data(json!({"spaceId": "sp-1"})),
        ))
        .await;
    registry
        .register(StubTool::new(
            "import_all_markdown",
            ToolOutput::success("Imported.").with_data(json!({"articles": ["Readme"]})),
        ))
        .await;
    let manager = OnboardingManager::new(
        TransitionEngine::new(Arc::new(registry), "Documentation"),
        backend.clone(),
        backend.clone(),
        Arc::new(MovableHead::default()),
    );

    let session = backend.start_session("u1").await.unwrap();
    let mut data = session.step_data;
    data.fsm_state = Some(FsmState::DocActionPrompt);
    data.discovered_files = vec!["README.md".into()];
    backend.save_step_data("u1", &data).await.unwrap();

    let first = manager
        .process_message("u1", "import my existing docs")
        .await
        .unwrap();
    assert_eq!(first.intent, Some(Intent::Import));
    assert_eq!(first.state, FsmState::Importing);
    assert!(first.needs_continuation);

    let second = manager.continue_turn("u1").await.unwrap();
    assert_eq!(second.state, FsmState::GapAnalysisPrompt);
    assert!(!second.needs_continuation);

    let status = manager.get_status("u1").await.unwrap().unwrap();
    assert_eq!(status.current_step, "GAP_ANALYSIS_PROMPT");
    assert_eq!(status.step_data.imported_articles, vec!["Readme".to_string()]);
}

// ── Pure helpers ───────────────────────────────────────────────────

#[test]
fn pure_helpers_are_usable_standalone() {
    assert_eq!(classify_by_pattern(""), Some(Intent::OffTopic));
    assert_eq!(classify_by_pattern("   "), Some(Intent::OffTopic));
    assert_ne!(classify_by_pattern("done"), Some(Intent::Goodbye));

    let repos = vec!["acme/docs".to_string(), "acme/api".to_string()];
    assert_eq!(match_repo_name("DOCS", &repos).as_deref(), Some("acme/docs"));
    assert_eq!(
        match_repo_name("**acme/docs**", &repos),
        match_repo_name("acme/docs", &repos)
    );
    let twins = vec!["org1/docs".to_string(), "org2/docs".to_string()];
    assert_eq!(match_repo_name("docs", &twins), None);

    assert_eq!(
        derive_fsm_state_from_step_data(&StepData::default()),
        FsmState::Welcome
    );
    let synced = StepData {
        sync_triggered: Some(true),
        ..StepData::default()
    };
    assert_eq!(
        derive_fsm_state_from_step_data(&synced),
        FsmState::SyncConfirmed
    );
}
