use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info};
use vigil_core::Clock;

use crate::container::ReplayContainer;

/// Background task that periodically checks the session for expiry and
/// flushes due segments. Dropping the timer cancels the task.
pub struct ExpiryTimer {
    cancellation_token: CancellationToken,
    _cancel_on_drop: DropGuard,
    handle: JoinHandle<()>,
}

impl ExpiryTimer {
    pub fn spawn(
        container: Arc<Mutex<ReplayContainer>>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        let cancellation_token = CancellationToken::new();
        let token = cancellation_token.clone();

        let handle = tokio::spawn(async move {
            debug!("Replay expiry timer started ({}ms interval)", interval.as_millis());
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = clock.now();
                        if container.lock().await.tick(now) {
                            debug!("Replay session rotated by expiry timer");
                        }
                    }
                    _ = token.cancelled() => {
                        info!("Replay expiry timer received cancellation signal");
                        return;
                    }
                }
            }
        });

        Self {
            _cancel_on_drop: cancellation_token.clone().drop_guard(),
            cancellation_token,
            handle,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the timer and wait for the task to exit
    pub async fn stop(self) {
        self.cancellation_token.cancel();
        let _ = self.handle.await;
    }
}
