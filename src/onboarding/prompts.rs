//! Response templates for the onboarding conversation.
//!
//! Everything the engine says that is not a tool's own message comes from
//! here: entry prompts for prompt states, contextual help, off-topic
//! redirects, the status summary and the jump-back acknowledgements.

use super::model::{DocAction, StepData};
use super::state::FsmState;

/// Short description of what the user is being asked at `state`.
fn current_step(state: FsmState) -> &'static str {
    match state {
        FsmState::Welcome => "getting started",
        FsmState::GithubCheck | FsmState::GithubInstalling | FsmState::GithubInstallPrompt => {
            "connecting GitHub"
        }
        FsmState::GithubRepoPrompt | FsmState::GithubRepoSelecting => "choosing a repository",
        FsmState::RepoScanPrompt | FsmState::RepoScanning => "scanning your repository",
        FsmState::DocActionPrompt => "choosing what to do with your docs",
        FsmState::SpaceCreating | FsmState::Importing => "importing your markdown",
        FsmState::GapAnalysisPrompt | FsmState::GapAnalyzing => "checking for documentation gaps",
        FsmState::GeneratePrompt | FsmState::Generating => "generating docs from code",
        FsmState::SyncExplain
        | FsmState::SyncChecking
        | FsmState::SyncWaiting
        | FsmState::SyncConfirmed => "verifying auto-sync",
        FsmState::Completing | FsmState::Completed => "wrapping up",
    }
}

/// The question a prompt state asks when it is first entered.
pub fn entry_prompt(state: FsmState, data: &StepData) -> Option<String> {
    let text = match state {
        FsmState::Welcome => "Welcome! I'll help you connect a GitHub repository, bring in your \
             existing docs, and keep them in sync. Ready to get started? (You can say \"skip\" \
             at any time.)"
            .to_string(),
        FsmState::GithubInstallPrompt => "Once the GitHub App is installed, say \"done\" and I'll \
             check the connection. Say \"open it again\" if you need the page, or \"skip\" to \
             set this up later."
            .to_string(),
        FsmState::GithubRepoPrompt => repo_choice_prompt(&data.available_repos),
        FsmState::RepoScanPrompt => match data.connected_repo.as_deref() {
            Some(repo) => format!(
                "**{repo}** is connected. Shall I scan it for markdown documentation?"
            ),
            None => "Shall I scan your repository for markdown documentation? Say \"skip\" to \
                 move on without scanning."
                .to_string(),
        },
        FsmState::DocActionPrompt => {
            let count = data.discovered_files.len();
            format!(
                "I found {count} markdown file(s). Would you like to **import** them, \
                 **generate** new docs from your code, or **both**?"
            )
        }
        FsmState::GapAnalysisPrompt => {
            let imported = data.imported_articles.len();
            format!(
                "Imported {imported} article(s). Want me to analyze your code for topics your \
                 docs don't cover yet?"
            )
        }
        FsmState::GeneratePrompt => {
            if data.gap_analysis_results.is_empty() {
                "Shall I generate documentation from your code?".to_string()
            } else {
                format!(
                    "I can write articles for the {} gap(s) I found. Shall I generate them?",
                    data.gap_analysis_results.len()
                )
            }
        }
        FsmState::SyncExplain => "Your docs stay in sync with the repository: every push to \
             the connected branch updates the matching articles. Try it now: edit a markdown \
             file, push, and say \"check\". Or say \"skip\" to finish."
            .to_string(),
        FsmState::SyncWaiting => "I haven't seen a push yet. Push a change and say \"check\" \
             again, or \"skip\" to finish without verifying."
            .to_string(),
        FsmState::SyncConfirmed => "Sync confirmed: your push came through. Say \"bye\" when \
             you're ready to finish."
            .to_string(),
        FsmState::Completed => completed_message(data),
        _ => return None,
    };
    Some(text)
}

/// Static help for `state`.
pub fn help_message(state: FsmState) -> &'static str {
    match state {
        FsmState::Welcome => {
            "This short setup connects GitHub, brings in your docs and turns on auto-sync. \
             Say \"yes\" to begin or \"skip\" to do it later."
        }
        FsmState::GithubCheck | FsmState::GithubInstalling | FsmState::GithubInstallPrompt => {
            "Install the GitHub App on the account that owns your docs repository and grant it \
             access. Say \"done\" when finished, or \"skip\" to set this up later."
        }
        FsmState::GithubRepoPrompt | FsmState::GithubRepoSelecting => {
            "Type the name of the repository to connect, for example `owner/repo` or just the \
             repo name. Say \"skip\" to continue without one."
        }
        FsmState::RepoScanPrompt | FsmState::RepoScanning => {
            "Scanning reads your repository and lists its markdown files. Nothing is changed. \
             Say \"yes\" to scan or \"skip\"."
        }
        FsmState::DocActionPrompt => {
            "\"import\" copies your markdown files into articles, \"generate\" writes new \
             articles from your code, \"both\" does one then the other."
        }
        FsmState::SpaceCreating | FsmState::Importing => {
            "Your markdown files are being imported into your documentation space."
        }
        FsmState::GapAnalysisPrompt | FsmState::GapAnalyzing => {
            "Gap analysis compares your code to your docs and lists undocumented areas. \
             Say \"yes\" to run it or \"skip\"."
        }
        FsmState::GeneratePrompt | FsmState::Generating => {
            "Generation drafts articles from your source code. Say \"yes\" to generate or \"skip\"."
        }
        FsmState::SyncExplain | FsmState::SyncChecking | FsmState::SyncWaiting => {
            "Push any change to the connected branch, then say \"check\" and I'll confirm the \
             sync. Say \"skip\" to finish without verifying."
        }
        FsmState::SyncConfirmed => {
            "Everything is set up. Say \"bye\" to finish onboarding, or \"status\" for a summary."
        }
        FsmState::Completing | FsmState::Completed => {
            "Onboarding is finished. You can change your GitHub connection or re-import docs \
             from settings."
        }
    }
}

/// Redirect for messages unrelated to the current step.
pub fn redirect_message(state: FsmState) -> String {
    format!(
        "Let's stay on track: we're {}. Say \"help\" if you're unsure what to do next.",
        current_step(state)
    )
}

/// Progress summary built from the step data.
pub fn status_summary(state: FsmState, data: &StepData) -> String {
    let mut lines = vec![format!("**Onboarding status:** {}", current_step(state))];
    lines.push(format!(
        "- Repository: {}",
        data.connected_repo.as_deref().unwrap_or("not connected")
    ));
    lines.push(format!(
        "- Space: {}",
        data.space_name
            .as_deref()
            .or(data.space_id.as_deref())
            .unwrap_or("not created")
    ));
    if let Some(action) = data.doc_action {
        lines.push(format!("- Doc action: {action}"));
    }
    lines.push(format!("- Markdown files found: {}", data.discovered_files.len()));
    lines.push(format!(
        "- Articles: {} imported, {} generated",
        data.imported_articles.len(),
        data.generated_count
            .map(|c| c as usize)
            .unwrap_or(data.generated_articles.len())
    ));
    if !data.gap_analysis_results.is_empty() {
        lines.push(format!(
            "- Documentation gaps: {}",
            data.gap_analysis_results.len()
        ));
    }
    lines.push(format!(
        "- Auto-sync: {}",
        if data.is_sync_triggered() {
            "confirmed"
        } else {
            "not yet verified"
        }
    ));
    lines.join("\n")
}

pub fn change_github_ack() -> &'static str {
    "Sure, let's switch your GitHub connection."
}

pub fn reimport_ack() -> &'static str {
    "No problem, let's choose again what to do with your docs."
}

/// Ask the user to name one of `candidates`.
pub fn repo_choice_prompt(candidates: &[String]) -> String {
    if candidates.is_empty() {
        return "Which repository should I connect? Type its name as `owner/repo`.".to_string();
    }
    format!(
        "The GitHub App can access several repositories. Which one holds your docs?\n{}",
        bullet_list(candidates)
    )
}

/// Re-prompt after a repository name that matched nothing.
pub fn repo_not_found(input: &str, candidates: &[String]) -> String {
    format!(
        "I couldn't find a repository matching \"{}\". Available repositories:\n{}",
        input.trim(),
        bullet_list(candidates)
    )
}

pub fn nothing_to_import() -> &'static str {
    "There are no markdown files to import from this repository. Say \"generate\" to write \
     docs from your code instead, or \"skip\"."
}

pub fn doc_action_question() -> &'static str {
    "Which would you like: **import**, **generate**, or **both**?"
}

pub fn sync_confirmed_reply() -> &'static str {
    "Your docs are connected and syncing. Say \"bye\" to finish onboarding."
}

/// Closing message, also the answer for any turn after completion.
pub fn completed_message(data: &StepData) -> String {
    let count = data.article_count();
    if count == 0 {
        "Onboarding is finished. You can connect a repository or import docs any time from \
         settings."
            .to_string()
    } else {
        format!("You're all set! {count} article(s) are live and stay in sync with your repository.")
    }
}

/// Label for a doc action in acknowledgements.
pub fn doc_action_ack(action: DocAction) -> String {
    match action {
        DocAction::Import => "Great, importing your markdown files.".to_string(),
        DocAction::Generate => "Great, let's generate docs from your code.".to_string(),
        DocAction::Both => {
            "Great, I'll import your markdown first, then generate what's missing.".to_string()
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
