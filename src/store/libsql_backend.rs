//! libSQL backend: async implementation of the onboarding store traits.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::{StepData, StepDataUpdate};
use crate::store::migrations;
use crate::store::traits::{
    GitHubIntegration, IntegrationStore, OnboardingSession, OnboardingStore, SessionStatus,
};

/// Branch recorded for new integrations.
const DEFAULT_BRANCH: &str = "main";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
/// Step-data writes are serialized by `step_data_lock`.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    step_data_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            step_data_lock: Mutex::new(()),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Overwrite the step-data column. Callers hold `step_data_lock`.
    async fn write_step_data(&self, user_id: &str, step_data: &StepData) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let value = serde_json::to_string(step_data)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        let count = conn
            .execute(
                "UPDATE onboarding_sessions SET step_data = ?2, updated_at = ?3 WHERE user_id = ?1",
                params![user_id, value, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_step_data: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "onboarding_session".to_string(),
                id: user_id.to_string(),
            });
        }
        debug!(user_id, "Saved step data");
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<i64>` to libsql Value.
fn opt_int(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

fn row_to_session(row: &libsql::Row) -> Result<OnboardingSession, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("row_to_session: {e}"));

    let user_id: String = row.get(0).map_err(read)?;
    let status: String = row.get(1).map_err(read)?;
    let current_step: String = row.get(2).map_err(read)?;
    let step_data_str: String = row.get(3).map_err(read)?;
    let created_str: String = row.get(4).map_err(read)?;
    let updated_str: String = row.get(5).map_err(read)?;

    let raw: serde_json::Value = serde_json::from_str(&step_data_str)
        .map_err(|e| DatabaseError::Serialization(format!("step_data for {user_id}: {e}")))?;
    let step_data = StepData::from_json(raw)
        .map_err(|e| DatabaseError::Serialization(format!("step_data for {user_id}: {e}")))?;

    Ok(OnboardingSession {
        user_id,
        status: SessionStatus::from_db(&status),
        current_step,
        step_data,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_integration(row: &libsql::Row) -> Result<GitHubIntegration, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("row_to_integration: {e}"));
    let created_str: String = row.get(6).map_err(read)?;
    let active: i64 = row.get(5).map_err(read)?;

    Ok(GitHubIntegration {
        id: row.get(0).map_err(read)?,
        user_id: row.get(1).map_err(read)?,
        installation_id: row.get::<i64>(2).ok(),
        repo: row.get(3).map_err(read)?,
        branch: row.get(4).map_err(read)?,
        active: active != 0,
        created_at: parse_datetime(&created_str),
    })
}

const SESSION_COLUMNS: &str = "user_id, status, current_step, step_data, created_at, updated_at";

const INTEGRATION_COLUMNS: &str = "id, user_id, installation_id, repo, branch, active, created_at";

// ── Sessions ────────────────────────────────────────────────────────

#[async_trait]
impl OnboardingStore for LibSqlBackend {
    async fn load_session(&self, user_id: &str) -> Result<Option<OnboardingSession>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM onboarding_sessions WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_session(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_session: {e}"))),
        }
    }

    async fn start_session(&self, user_id: &str) -> Result<OnboardingSession, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let step_data = serde_json::to_string(&StepData::new())
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO onboarding_sessions (user_id, status, current_step, step_data, created_at, updated_at)
             VALUES (?1, 'in_progress', 'WELCOME', ?2, ?3, ?3)
             ON CONFLICT (user_id) DO NOTHING",
            params![user_id, step_data, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("start_session: {e}")))?;

        self.load_session(user_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "onboarding_session".to_string(),
                id: user_id.to_string(),
            })
    }

    async fn save_step_data(&self, user_id: &str, step_data: &StepData) -> Result<(), DatabaseError> {
        let _guard = self.step_data_lock.lock().await;
        self.write_step_data(user_id, step_data).await
    }

    async fn merge_step_data(
        &self,
        user_id: &str,
        update: StepDataUpdate,
    ) -> Result<StepData, DatabaseError> {
        let _guard = self.step_data_lock.lock().await;
        let mut step_data = self
            .load_session(user_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "onboarding_session".to_string(),
                id: user_id.to_string(),
            })?
            .step_data;
        step_data.apply(update);
        self.write_step_data(user_id, &step_data).await?;
        Ok(step_data)
    }

    async fn advance_step(&self, user_id: &str, step: &str) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE onboarding_sessions SET current_step = ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user_id, step, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("advance_step: {e}")))?;
        Ok(())
    }

    async fn close_session(&self, user_id: &str, status: SessionStatus) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE onboarding_sessions SET status = ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user_id, status.as_str(), now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("close_session: {e}")))?;
        info!(user_id, status = status.as_str(), "Onboarding session closed");
        Ok(())
    }
}

// ── GitHub integrations ─────────────────────────────────────────────

#[async_trait]
impl IntegrationStore for LibSqlBackend {
    async fn active_github_integration(
        &self,
        user_id: &str,
        repo: &str,
    ) -> Result<Option<GitHubIntegration>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {INTEGRATION_COLUMNS} FROM github_integrations
                     WHERE user_id = ?1 AND repo = ?2 AND active = 1"
                ),
                params![user_id, repo],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("active_github_integration: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_integration(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("active_github_integration: {e}"))),
        }
    }

    async fn connect_repository(
        &self,
        user_id: &str,
        installation_id: Option<i64>,
        repo: &str,
    ) -> Result<GitHubIntegration, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE github_integrations SET active = 0 WHERE user_id = ?1 AND repo != ?2",
            params![user_id, repo],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("connect_repository: {e}")))?;

        conn.execute(
            "INSERT INTO github_integrations (id, user_id, installation_id, repo, branch, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
             ON CONFLICT (user_id, repo) DO UPDATE SET
                active = 1,
                installation_id = COALESCE(?3, installation_id)",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                opt_int(installation_id),
                repo,
                DEFAULT_BRANCH,
                now
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("connect_repository: {e}")))?;

        info!(user_id, repo, "GitHub repository connected");
        self.active_github_integration(user_id, repo)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "github_integration".to_string(),
                id: repo.to_string(),
            })
    }
}
