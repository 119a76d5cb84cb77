//! Segment packaging
//!
//! Buffers snapshots and drains them into numbered segments. A segment index
//! only advances once the transport accepted the segment; on a failed
//! hand-off the snapshots go back to the front of the buffer and the next
//! flush retries the same index.

use std::collections::VecDeque;
use tracing::{debug, warn};
use vigil_core::{ReplayConfig, UtcDateTime};

use crate::error::ReplayResult;
use crate::event::{segment_envelope, ReplayMetadata};
use crate::session::Session;
use crate::snapshot::{FullSnapshot, Snapshot};
use crate::transport::Transport;

/// One batch of snapshots belonging to a session
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub replay_id: String,
    pub segment_id: u32,
    /// Start of the owning session
    pub replay_start: UtcDateTime,
    /// Time of the latest snapshot in the segment
    pub timestamp: UtcDateTime,
    pub urls: Vec<String>,
    pub snapshots: Vec<Snapshot>,
}

impl Segment {
    pub fn full_snapshots(&self) -> usize {
        self.snapshots.iter().filter(|s| s.is_full()).count()
    }
}

pub struct SegmentPackager {
    buffer: VecDeque<Snapshot>,
    buffered_since: Option<UtcDateTime>,
    urls: Vec<String>,
    flush_delay: chrono::Duration,
    max_buffered: usize,
    metadata: ReplayMetadata,
}

impl SegmentPackager {
    pub fn new(config: &ReplayConfig, metadata: ReplayMetadata) -> Self {
        Self {
            buffer: VecDeque::new(),
            buffered_since: None,
            urls: Vec::new(),
            flush_delay: chrono::Duration::from_std(config.flush_delay)
                .unwrap_or(chrono::Duration::MAX),
            max_buffered: config.max_buffered_snapshots.max(1),
            metadata,
        }
    }

    pub fn metadata(&self) -> &ReplayMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether the buffer reached its size limit
    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.max_buffered
    }

    pub fn push(&mut self, snapshot: Snapshot, now: UtcDateTime) {
        if self.buffered_since.is_none() {
            self.buffered_since = Some(now);
        }
        self.buffer.push_back(snapshot);
    }

    /// Record a URL visited during the current segment
    pub fn push_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !self.urls.contains(&url) {
            self.urls.push(url);
        }
    }

    /// Reset the buffer for a new session, seeded with its full snapshot
    pub fn start_session(&mut self, full: FullSnapshot, now: UtcDateTime) {
        self.discard();
        if let Some(href) = &full.href {
            self.push_url(href.clone());
        }
        self.push(Snapshot::Full(full), now);
    }

    /// Drop everything buffered; returns how many snapshots were dropped
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        self.buffered_since = None;
        self.urls.clear();
        dropped
    }

    /// Whether the buffer should be flushed now.
    ///
    /// Segment 0 of a live session goes out immediately; later segments wait
    /// for the flush delay or a full buffer. Pristine sessions never flush.
    pub fn is_due(&self, session: &Session, now: UtcDateTime) -> bool {
        if self.buffer.is_empty() || !session.is_live() {
            return false;
        }
        if session.segment_id() == 0 || self.is_full() {
            return true;
        }
        self.buffered_since
            .map(|since| now - since >= self.flush_delay)
            .unwrap_or(false)
    }

    /// Drain the buffer into the session's next segment and hand it to the
    /// transport. Returns the index of the flushed segment, or `None` when
    /// there was nothing to flush.
    pub fn flush(
        &mut self,
        session: &mut Session,
        now: UtcDateTime,
        transport: &dyn Transport,
    ) -> ReplayResult<Option<u32>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let snapshots: Vec<Snapshot> = std::mem::take(&mut self.buffer).into();
        let urls = std::mem::take(&mut self.urls);
        let timestamp = snapshots
            .iter()
            .map(Snapshot::timestamp)
            .max()
            .unwrap_or(now);

        let segment = Segment {
            replay_id: session.id().to_string(),
            segment_id: session.segment_id(),
            replay_start: session.started_at(),
            timestamp,
            urls,
            snapshots,
        };

        let handed_off: ReplayResult<()> = segment_envelope(&segment, &self.metadata, now)
            .map_err(Into::into)
            .and_then(|envelope| transport.send(envelope).map_err(Into::into));

        if let Err(e) = handed_off {
            warn!(
                "Failed to hand off segment {} of replay {}: {}",
                segment.segment_id, segment.replay_id, e
            );
            self.restore(segment);
            return Err(e);
        }

        debug!(
            "Flushed segment {} of replay {} ({} snapshots, {} full)",
            segment.segment_id,
            segment.replay_id,
            segment.snapshots.len(),
            segment.full_snapshots()
        );
        session.advance_segment();
        self.buffered_since = None;
        Ok(Some(segment.segment_id))
    }

    fn restore(&mut self, segment: Segment) {
        for snapshot in segment.snapshots.into_iter().rev() {
            self.buffer.push_front(snapshot);
        }
        let mut urls = segment.urls;
        for url in self.urls.drain(..) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        self.urls = urls;
    }
}
