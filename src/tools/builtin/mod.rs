//! Built-in onboarding tools: GitHub UI hand-offs and session closing.

mod onboarding;

pub use onboarding::{
    CompleteOnboardingTool, ConnectGithubRepoTool, InstallGithubAppTool, SkipOnboardingTool,
};
