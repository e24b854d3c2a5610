//! Tool registry for the tools the onboarding engine calls by name.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::tools::builtin::{
    CompleteOnboardingTool, ConnectGithubRepoTool, InstallGithubAppTool, SkipOnboardingTool,
};
use crate::tools::tool::Tool;

/// Names of built-in tools that cannot be shadowed by later registrations.
const PROTECTED_TOOL_NAMES: &[&str] = &[
    "install_github_app",
    "connect_github_repo",
    "complete_onboarding",
    "skip_onboarding",
];

/// Registry of available tools.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    /// Tracks which names were registered as built-in (protected from shadowing).
    builtin_names: RwLock<HashSet<String>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            builtin_names: RwLock::new(HashSet::new()),
        }
    }

    /// Register a tool. Rejects tools that try to shadow a built-in name.
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.builtin_names.read().await.contains(&name) {
            tracing::warn!(
                tool = %name,
                "Rejected tool registration: would shadow a built-in tool"
            );
            return;
        }
        self.tools.write().await.insert(name.clone(), tool);
        tracing::debug!("Registered tool: {}", name);
    }

    /// Register a tool (sync version for startup, marks protected names as built-in).
    pub fn register_sync(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if let Ok(mut tools) = self.tools.try_write() {
            tools.insert(name.clone(), tool);
            if PROTECTED_TOOL_NAMES.contains(&name.as_str())
                && let Ok(mut builtins) = self.builtin_names.try_write()
            {
                builtins.insert(name.clone());
            }
            tracing::debug!("Registered tool: {}", name);
        }
    }

    /// Register the onboarding built-ins.
    pub fn register_builtin_tools(&self, github_app_install_url: &str) {
        self.register_sync(Arc::new(InstallGithubAppTool::new(github_app_install_url)));
        self.register_sync(Arc::new(ConnectGithubRepoTool));
        self.register_sync(Arc::new(CompleteOnboardingTool));
        self.register_sync(Arc::new(SkipOnboardingTool));
    }

    /// Get a tool by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Check if a tool exists.
    pub async fn has(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// List all tool names.
    pub async fn list(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    /// Get the number of registered tools.
    pub fn count(&self) -> usize {
        self.tools.try_read().map(|t| t.len()).unwrap_or(0)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
