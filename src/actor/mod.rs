//! Actor System for watch mode
//!
//! ```text
//! FsActor --> ReloadActor --> HotReload --> backends / appliers
//! (watch)     (serialize)     (dispatch)
//! ```
//!
//! - `messages` - message types between actors
//! - `fs` - file system watcher with debouncing
//! - `reload` - owns the orchestrator, one batch at a time
//! - `coordinator` - wires up and runs actors

pub mod coordinator;
pub mod fs;
pub mod messages;
pub mod reload;

pub use coordinator::Coordinator;
