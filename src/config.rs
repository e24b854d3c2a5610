//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

/// Runtime configuration for the onboarding service.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// Port for the REST server.
    pub port: u16,
    /// GitHub REST API base URL.
    pub github_api_url: String,
    /// Token used for commit lookups (optional for public repos).
    pub github_token: Option<SecretString>,
    /// Where the user installs the GitHub app.
    pub github_app_install_url: String,
    /// Name used when creating the docs space.
    pub default_space_name: String,
    /// User id the stdin REPL talks as.
    pub repl_user_id: String,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/onboarding.db"),
            port: 8080,
            github_api_url: "https://api.github.com".to_string(),
            github_token: None,
            github_app_install_url: "https://github.com/apps/docs-sync/installations/new"
                .to_string(),
            default_space_name: "Documentation".to_string(),
            repl_user_id: "local-user".to_string(),
        }
    }
}

impl OnboardingConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let db_path = std::env::var("ONBOARDING_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let port: u16 = std::env::var("ONBOARDING_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let github_api_url = std::env::var("GITHUB_API_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.github_api_url);

        let github_token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(SecretString::from);

        let github_app_install_url = std::env::var("GITHUB_APP_INSTALL_URL")
            .unwrap_or(defaults.github_app_install_url);

        let default_space_name = std::env::var("ONBOARDING_DEFAULT_SPACE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.default_space_name);

        let repl_user_id =
            std::env::var("ONBOARDING_USER_ID").unwrap_or(defaults.repl_user_id);

        Self {
            db_path,
            port,
            github_api_url,
            github_token,
            github_app_install_url,
            default_space_name,
            repl_user_id,
        }
    }
}
