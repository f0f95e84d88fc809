//! deltawatch - hot reload orchestration for running applications.
//!
//! Turns a batch of changed files into either in-place content updates
//! (static assets, scoped styles) or binary code deltas pushed into the
//! running application.
//!
//! ```text
//! FileChange batch
//!   └─ HotReload (dispatch)
//!        ├─ content handlers ─► copied assets, style bundle, browser refresh
//!        └─ ProjectClassifier
//!             ├─ IncrementalBackend ─► SessionProvider ─► UpdateRecord deltas
//!             └─ RecompileBackend ──► full rebuild ─► module image record
//!                    └─ DeltaApplier (process | browser | hosted)
//! ```
//!
//! Embedding hosts supply the incremental compiler through
//! [`session::WorkspaceHost`] and assemble the pipeline with
//! [`cli::watch::assemble`] or [`dispatch::HotReload::builder`].

pub mod actor;
pub mod applier;
pub mod backend;
pub mod capabilities;
pub mod classify;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod image;
pub mod logger;
pub mod project;
pub mod report;
pub mod session;
pub mod utils;
