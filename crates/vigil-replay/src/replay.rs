//! Async recording handle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};
use vigil_core::{Clock, ReplayConfig};

use crate::container::ReplayContainer;
use crate::dom::Document;
use crate::error::{ReplayError, ReplayResult};
use crate::event::ReplayMetadata;
use crate::recorder::UiEvent;
use crate::timer::ExpiryTimer;
use crate::transport::Transport;

/// Point-in-time view of the recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayState {
    pub session_id: String,
    /// Index of the next segment to flush
    pub segment_id: u32,
    pub live: bool,
    pub rotations: u64,
    pub buffered: usize,
}

/// Shared handle to one recording context.
///
/// Every operation runs under a single lock, so event capture, expiry checks
/// and flushes never interleave. The stopped flag is read under that lock,
/// so nothing is recorded after the final flush.
pub struct Replay {
    container: Arc<Mutex<ReplayContainer>>,
    clock: Arc<dyn Clock>,
    timer: Mutex<Option<ExpiryTimer>>,
    stopped: AtomicBool,
}

impl Replay {
    /// Wrap a container without starting the expiry timer; expiry is then
    /// driven by [`Replay::tick`] and by incoming events
    pub fn new(container: ReplayContainer, clock: Arc<dyn Clock>) -> Self {
        Self {
            container: Arc::new(Mutex::new(container)),
            clock,
            timer: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Start recording with the expiry timer running. Must be called from
    /// within a tokio runtime.
    pub fn start(
        config: &ReplayConfig,
        metadata: ReplayMetadata,
        document: Document,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let container = ReplayContainer::new(config, metadata, document, transport, clock.now());
        let mut replay = Self::new(container, clock.clone());

        let timer = ExpiryTimer::spawn(replay.container.clone(), clock, config.check_interval());
        *replay.timer.get_mut() = Some(timer);

        info!("Replay recording started");
        replay
    }

    pub async fn record(&self, event: UiEvent) -> ReplayResult<usize> {
        let mut container = self.lock_running().await?;
        Ok(container.record(&event, self.clock.now()))
    }

    /// Run one expiry check; returns whether the session rotated
    pub async fn tick(&self) -> ReplayResult<bool> {
        let mut container = self.lock_running().await?;
        Ok(container.tick(self.clock.now()))
    }

    /// Flush buffered snapshots immediately
    pub async fn flush(&self) -> ReplayResult<Option<u32>> {
        let mut container = self.lock_running().await?;
        container.flush(self.clock.now())
    }

    pub async fn session_id(&self) -> String {
        self.container.lock().await.session().id().to_string()
    }

    pub async fn state(&self) -> ReplayState {
        let container = self.container.lock().await;
        let session = container.session();
        ReplayState {
            session_id: session.id().to_string(),
            segment_id: session.segment_id(),
            live: session.is_live(),
            rotations: container.rotations(),
            buffered: container.buffered(),
        }
    }

    pub async fn is_timer_running(&self) -> bool {
        self.timer
            .lock()
            .await
            .as_ref()
            .map(ExpiryTimer::is_running)
            .unwrap_or(false)
    }

    /// Stop the timer, flush what is left and shut the transport down
    pub async fn stop(&self, timeout: Duration) -> ReplayResult<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(timer) = self.timer.lock().await.take() {
            timer.stop().await;
        }

        let transport = {
            let mut container = self.container.lock().await;
            let now = self.clock.now();
            if let Err(e) = container.flush(now) {
                warn!("Final replay flush failed: {}", e);
            }
            container.transport().clone()
        };

        transport.shutdown(timeout).await?;
        info!("Replay recording stopped");
        Ok(())
    }

    /// Lock the container, failing once the recording was stopped
    async fn lock_running(&self) -> ReplayResult<MutexGuard<'_, ReplayContainer>> {
        let container = self.container.lock().await;
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ReplayError::NotRunning);
        }
        Ok(container)
    }
}
