use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tower_http::cors::CorsLayer;

use docs_onboarding::config::OnboardingConfig;
use docs_onboarding::github::RestGitHubClient;
use docs_onboarding::onboarding::{
    Event, OnboardingManager, OnboardingRouteState, TransitionEngine, TurnOutcome,
    onboarding_routes,
};
use docs_onboarding::store::LibSqlBackend;
use docs_onboarding::tools::ToolRegistry;

/// Tools provided by the host application rather than this crate.
const HOST_TOOLS: &[&str] = &[
    "check_github_status",
    "get_or_create_space",
    "scan_repository",
    "import_all_markdown",
    "run_gap_analysis",
    "generate_from_code",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = OnboardingConfig::from_env();

    eprintln!("📚 Docs Onboarding v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   REST: http://0.0.0.0:{}/api/onboarding", config.port);
    eprintln!("   User: {}", config.repl_user_id);

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Tools ────────────────────────────────────────────────────────────
    let tools = Arc::new(ToolRegistry::new());
    tools.register_builtin_tools(&config.github_app_install_url);
    for name in HOST_TOOLS {
        if !tools.has(name).await {
            tracing::warn!(tool = %name, "Tool not registered; its steps will report a failure");
        }
    }
    eprintln!("   Tools: {} registered", tools.count());

    let github = Arc::new(RestGitHubClient::new(
        config.github_api_url.clone(),
        config.github_token.clone(),
    ));
    let engine = TransitionEngine::new(tools, config.default_space_name.clone());
    let manager = Arc::new(OnboardingManager::new(engine, db.clone(), db, github));

    // ── REST server ──────────────────────────────────────────────────────
    let app = onboarding_routes(OnboardingRouteState {
        manager: manager.clone(),
    })
    .layer(CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    tokio::spawn(async move {
        tracing::info!("Onboarding REST server started");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("REST server stopped: {}", e);
        }
    });

    eprintln!("   Type a message and press Enter. /quit to exit.\n");

    // ── REPL ─────────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprint!("> ");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            eprint!("> ");
            continue;
        }
        if line == "/quit" {
            break;
        }

        let mut outcome = manager.process_message(&config.repl_user_id, line).await;
        loop {
            match outcome {
                Ok(turn) => {
                    print_turn(&turn);
                    if !turn.needs_continuation {
                        break;
                    }
                    outcome = manager.continue_turn(&config.repl_user_id).await;
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    break;
                }
            }
        }
        eprint!("> ");
    }

    Ok(())
}

fn print_turn(turn: &TurnOutcome) {
    for event in &turn.events {
        match event {
            Event::Content { content } => println!("\n{content}"),
            Event::ToolCall { tool_call } => eprintln!("   [tool] {} {}", tool_call.name, tool_call.args),
            Event::UiAction { ui_action } => {
                let fields = serde_json::Value::Object(ui_action.fields.clone());
                eprintln!("   [ui] {} {}", ui_action.kind, fields);
            }
        }
    }
    println!();
    tracing::debug!(state = %turn.state, "Turn finished");
}
