//! Persistence layer: libSQL-backed storage for onboarding sessions and
//! GitHub integrations.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    GitHubIntegration, IntegrationStore, OnboardingSession, OnboardingStore, SessionStatus,
};
