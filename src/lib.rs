//! Docs onboarding: a chat-driven FSM that connects GitHub, brings in
//! documentation and verifies auto-sync.

pub mod config;
pub mod error;
pub mod github;
pub mod onboarding;
pub mod store;
pub mod tools;
