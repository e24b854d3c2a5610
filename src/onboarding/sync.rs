//! Sync detection: has a push landed on the connected repository?
//!
//! Two signals converge on `StepData::sync_triggered`: the webhook flag set
//! by `OnboardingManager::record_push`, and a HEAD SHA poll against the
//! snapshot taken when the user reached the sync step. Fetch failures are
//! "no evidence yet", never errors.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::onboarding::model::StepDataUpdate;
use crate::store::GitHubIntegration;
use crate::tools::ToolContext;

/// Outcome of a sync check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Confirmed,
    Waiting,
}

async fn active_integration(ctx: &ToolContext, repo: &str) -> Option<GitHubIntegration> {
    match ctx.integrations.active_github_integration(&ctx.user_id, repo).await {
        Ok(found) => found,
        Err(e) => {
            warn!(repo, "Integration lookup failed: {}", e);
            None
        }
    }
}

/// Record the connected branch's HEAD SHA, unless one is already recorded.
pub async fn snapshot_commit_sha(ctx: &ToolContext) {
    let data = ctx.step_data().await;
    if data.last_known_commit_sha.is_some() {
        return;
    }
    let Some(repo) = data.connected_repo else {
        return;
    };
    let Some(integration) = active_integration(ctx, &repo).await else {
        return;
    };

    match ctx
        .github
        .head_commit_sha(&integration.repo, &integration.branch)
        .await
    {
        Ok(sha) => {
            debug!(repo = %repo, sha = %sha, "Snapshotted HEAD commit");
            if let Err(e) = ctx
                .update_step_data(StepDataUpdate {
                    last_known_commit_sha: Some(sha),
                    ..Default::default()
                })
                .await
            {
                warn!("Failed to persist commit snapshot: {}", e);
            }
        }
        Err(e) => debug!(repo = %repo, "HEAD snapshot unavailable: {}", e),
    }
}

/// Poll the connected branch and compare against the snapshot.
///
/// Returns true only when the HEAD SHA moved; in that case `sync_triggered`
/// is set so the poll and the webhook agree on one persisted fact.
pub async fn check_sync_via_api(ctx: &ToolContext) -> bool {
    let data = ctx.step_data().await;
    let Some(repo) = data.connected_repo else {
        return false;
    };
    let Some(integration) = active_integration(ctx, &repo).await else {
        debug!(repo = %repo, "No active integration, sync check skipped");
        return false;
    };

    let head = match ctx
        .github
        .head_commit_sha(&integration.repo, &integration.branch)
        .await
    {
        Ok(sha) => sha,
        Err(e) => {
            debug!(repo = %repo, "HEAD fetch failed: {}", e);
            return false;
        }
    };

    let Some(known) = data.last_known_commit_sha else {
        // First successful fetch becomes the baseline.
        if let Err(e) = ctx
            .update_step_data(StepDataUpdate {
                last_known_commit_sha: Some(head),
                ..Default::default()
            })
            .await
        {
            warn!("Failed to persist commit snapshot: {}", e);
        }
        return false;
    };

    if known == head {
        return false;
    }

    info!(repo = %repo, from = %known, to = %head, "Push detected via commit poll");
    if let Err(e) = ctx
        .update_step_data(StepDataUpdate {
            sync_triggered: Some(true),
            last_known_commit_sha: Some(head),
            last_sync_time: Some(Utc::now()),
            ..Default::default()
        })
        .await
    {
        warn!("Failed to persist sync detection: {}", e);
    }
    true
}

/// Combine the webhook flag and the commit poll.
pub async fn detect_sync(ctx: &ToolContext) -> SyncStatus {
    let data = ctx.step_data().await;
    if data.is_sync_triggered() {
        return SyncStatus::Confirmed;
    }
    if data.connected_repo.is_none() {
        return SyncStatus::Waiting;
    }
    if check_sync_via_api(ctx).await {
        SyncStatus::Confirmed
    } else {
        SyncStatus::Waiting
    }
}
