//! Process-wide shutdown state.
//!
//! The Ctrl+C handler cancels a root token; every session, backend call
//! and actor observes a child of it.

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

/// Root cancellation token registered by the watch command
static ROOT_TOKEN: OnceLock<CancellationToken> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start
///
/// - Before `register_root_token()`: process exits immediately
/// - After: the root token is cancelled and actors wind down
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        if let Some(token) = ROOT_TOKEN.get() {
            crate::log!("watch"; "shutting down...");
            token.cancel();
        } else {
            std::process::exit(0);
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Register the root token cancelled on Ctrl+C, returning the registered one.
pub fn register_root_token(token: CancellationToken) -> CancellationToken {
    ROOT_TOKEN.get_or_init(|| token).clone()
}
