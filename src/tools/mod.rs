//! Tool abstraction for the side-effecting steps of onboarding.

pub mod builtin;
pub mod context;
pub mod registry;
pub mod tool;

pub use context::ToolContext;
pub use registry::ToolRegistry;
pub use tool::*;
