use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actor::fs::FsActor;
use crate::actor::messages::ReloadMsg;
use crate::actor::reload::ReloadActor;

/// Backends get this long to dispose after shutdown was requested.
const DISPOSE_GRACE: Duration = Duration::from_secs(5);

/// Run both actors until cancellation or until either of them stops.
pub(super) async fn run_actors(
    fs: FsActor,
    reload: ReloadActor,
    reload_tx: mpsc::Sender<ReloadMsg>,
    cancel: CancellationToken,
) {
    let mut reload_handle = tokio::spawn(reload.run());
    let fs_handle = tokio::spawn(fs.run());

    tokio::select! {
        _ = cancel.cancelled() => {
            crate::debug!("actor"; "shutdown requested");
        }
        _ = &mut reload_handle => {
            crate::debug!("actor"; "reload actor stopped");
            fs_handle.abort();
            return;
        }
    }

    let _ = reload_tx.send(ReloadMsg::Shutdown).await;
    if tokio::time::timeout(DISPOSE_GRACE, reload_handle).await.is_err() {
        crate::log!("actor"; "backends did not dispose within {}s", DISPOSE_GRACE.as_secs());
    }
    fs_handle.abort();
}
