//! Configuration section definitions.

mod backend;
mod project;
mod runtime;

pub use backend::{BackendConfig, CapabilitiesConfig, RebuildConfig};
pub use project::{AssetsConfig, ProjectConfig};
pub use runtime::{ProfileSetting, RuntimeConfig, WatchSection};
