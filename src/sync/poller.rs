use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::manager::{AuthSync, Lifecycle};
use crate::clock::Clock;

/// Start the background poll task for `manager`.
///
/// Each round sleeps for `interval` and then runs one synchronous poll, so
/// rounds never overlap. Rounds over blocking storage run on the blocking
/// pool. The task ends on its own once the manager is
/// destroyed or dropped. Returns `None` when called outside a tokio runtime.
pub(crate) fn spawn(
    manager: Weak<AuthSync>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    let runtime = match Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            warn!("auth_sync: no tokio runtime, cross-context polling disabled");
            return None;
        }
    };

    Some(runtime.spawn(async move {
        loop {
            clock.sleep(interval).await;

            let Some(manager) = manager.upgrade() else {
                debug!("auth_sync: manager dropped, poller exiting");
                break;
            };
            if manager.lifecycle() == Lifecycle::Destroyed {
                break;
            }

            if manager.storage_blocks() {
                let result = tokio::task::spawn_blocking(move || manager.poll_once()).await;
                if let Err(e) = result {
                    error!(error = %e, "auth_sync: poll round panicked");
                }
            } else {
                manager.poll_once();
            }
        }
    }))
}
