//! Core types - pure abstractions shared across the codebase.

mod capability;
mod change;
mod project;
mod state;
mod update;

pub use capability::{CapabilitySet, DEFAULT_CAPABILITIES};
pub use change::{ChangeKind, FileChange};
pub use project::{ProjectGraph, ProjectIdentity, ProjectNode, ToolchainMarker};
pub use state::{register_root_token, setup_shutdown_handler};
pub use update::{HandlerOutcome, UpdateRecord};
