//! Recording context
//!
//! Owns the session manager, the segment packager and the snapshot recorder
//! of one recording. All operations are synchronous and take the current
//! time explicitly; the async [`crate::Replay`] handle serializes access.

use std::sync::Arc;
use tracing::{debug, warn};
use vigil_core::{ReplayConfig, UtcDateTime};

use crate::dom::Document;
use crate::error::ReplayResult;
use crate::event::ReplayMetadata;
use crate::recorder::{SnapshotRecorder, UiEvent};
use crate::segment::SegmentPackager;
use crate::session::{Session, SessionManager};
use crate::snapshot::Snapshot;
use crate::transport::Transport;

pub struct ReplayContainer {
    sessions: SessionManager,
    packager: SegmentPackager,
    recorder: SnapshotRecorder,
    transport: Arc<dyn Transport>,
}

impl ReplayContainer {
    /// Start recording `document`; segment 0 of the first session is handed
    /// to the transport right away.
    pub fn new(
        config: &ReplayConfig,
        metadata: ReplayMetadata,
        document: Document,
        transport: Arc<dyn Transport>,
        now: UtcDateTime,
    ) -> Self {
        let recorder = SnapshotRecorder::new(document, now);
        let mut packager = SegmentPackager::new(config, metadata);
        packager.start_session(recorder.checkout(now), now);

        let mut container = Self {
            sessions: SessionManager::new(config.idle_timeout, now),
            packager,
            recorder,
            transport,
        };
        container.flush_if_due(now);
        container
    }

    pub fn session(&self) -> &Session {
        self.sessions.session()
    }

    pub fn rotations(&self) -> u64 {
        self.sessions.rotations()
    }

    /// Snapshots waiting for the next flush
    pub fn buffered(&self) -> usize {
        self.packager.len()
    }

    pub fn document(&self) -> &Document {
        self.recorder.document()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Feed one UI event. Returns how many snapshots it produced.
    pub fn record(&mut self, event: &UiEvent, now: UtcDateTime) -> usize {
        self.tick(now);

        let pristine = !self.sessions.session().is_live();
        if event.is_user_activity() {
            self.sessions.record_activity(now);
        }

        let mut recorded = 0;
        if let UiEvent::Navigate { href } = event {
            if let Some(full) = self.recorder.navigate(href, now) {
                if pristine {
                    // Nothing was sent for this session yet; the new page
                    // replaces the seed checkout as its first snapshot
                    self.packager.start_session(full, now);
                } else {
                    self.packager.push_url(href.clone());
                    self.packager.push(Snapshot::Full(full), now);
                }
                recorded += 1;
            }
        }
        for snapshot in self.recorder.observe(event, now) {
            self.packager.push(Snapshot::Incremental(snapshot), now);
            recorded += 1;
        }

        if !self.sessions.session().is_live() && self.packager.is_full() {
            // Nothing has been sent for this session yet; a fresh checkout
            // replaces everything buffered so far
            debug!(
                "Re-seeding pristine replay session {} after {} buffered snapshots",
                self.sessions.session().id(),
                self.packager.len()
            );
            self.packager.start_session(self.recorder.checkout(now), now);
        }

        self.flush_if_due(now);
        recorded
    }

    /// Periodic check: rotate an expired session, flush a due segment.
    /// Idempotent. Returns whether the session rotated.
    pub fn tick(&mut self, now: UtcDateTime) -> bool {
        let rotated = self.sessions.is_expired(now);
        if rotated {
            self.rotate(now);
        }
        self.flush_if_due(now);
        rotated
    }

    /// Flush whatever is buffered, regardless of the flush delay
    pub fn flush(&mut self, now: UtcDateTime) -> ReplayResult<Option<u32>> {
        if !self.sessions.session().is_live() {
            return Ok(None);
        }
        self.flush_now(now)
    }

    fn rotate(&mut self, now: UtcDateTime) {
        // The old session's tail goes out before anything of the new one
        if self.sessions.session().is_live() {
            if let Err(e) = self.flush_now(now) {
                warn!(
                    "Dropping final segment of replay {}: {}",
                    self.sessions.session().id(),
                    e
                );
            }
        }
        let dropped = self.packager.discard();
        if dropped > 0 {
            debug!("Discarded {} unsent snapshots on rotation", dropped);
        }

        self.sessions.check_expiry(now);
        self.recorder.begin_segment(now);
        self.packager.start_session(self.recorder.checkout(now), now);
    }

    fn flush_now(&mut self, now: UtcDateTime) -> ReplayResult<Option<u32>> {
        let flushed =
            self.packager
                .flush(self.sessions.session_mut(), now, self.transport.as_ref())?;
        if flushed.is_some() {
            self.recorder.begin_segment(now);
        }
        Ok(flushed)
    }

    fn flush_if_due(&mut self, now: UtcDateTime) {
        if !self.packager.is_due(self.sessions.session(), now) {
            return;
        }
        if let Err(e) = self.flush_now(now) {
            // Snapshots stay buffered; the next due check retries
            debug!("Segment flush deferred: {}", e);
        }
    }
}
