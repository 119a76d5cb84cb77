//! Segment delivery
//!
//! `send` is a non-blocking hand-off: the envelope is queued and delivered by
//! a single worker in hand-off order, so segments of a session (and sessions
//! among themselves) reach the endpoint in the order they were flushed.
//! The queue is bounded; a full queue refuses the envelope and the caller
//! keeps it for a later attempt.

mod http;
mod memory;

pub use http::{HttpTransport, AUTH_HEADER, ENVELOPE_CONTENT_TYPE};
pub use memory::MemoryTransport;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use vigil_core::{Envelope, EnvelopeError, UtcDateTime};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Transport is closed")]
    Closed,

    #[error("Shutdown timed out with {0} envelope(s) undelivered")]
    ShutdownTimeout(usize),

    #[error("Delivery queue is full ({0} envelopes)")]
    QueueFull(usize),

    #[error("Send rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Queue an envelope for delivery. Must not block on the network.
    fn send(&self, envelope: Envelope) -> Result<(), TransportError>;

    /// Stop accepting envelopes and drain the queue within `timeout`
    async fn shutdown(&self, timeout: Duration) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { status: u16 },
    Failed { status: Option<u16>, message: String },
}

/// Published for every delivery attempt
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub event_id: Option<String>,
    pub outcome: DeliveryOutcome,
    pub attempted_at: UtcDateTime,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered { .. })
    }
}
