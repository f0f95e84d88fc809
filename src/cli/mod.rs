//! Command-line interface module.

mod args;
pub mod classify;
pub mod inspect;
pub mod watch;

pub use args::{Cli, Commands};
