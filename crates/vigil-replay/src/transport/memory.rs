use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil_core::Envelope;

use super::{Transport, TransportError};

/// Keeps every envelope in memory instead of sending it.
///
/// Clones share the same storage. `fail_next` makes the following hand-offs
/// fail, which lets callers exercise the packager's retry path.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    envelopes: Vec<Envelope>,
    failures: usize,
    closed: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.state().envelopes.clone()
    }

    pub fn len(&self) -> usize {
        self.state().envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail_next(&self, count: usize) {
        self.state().failures = count;
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.failures > 0 {
            state.failures -= 1;
            return Err(TransportError::Rejected("injected failure".to_string()));
        }
        state.envelopes.push(envelope);
        Ok(())
    }

    async fn shutdown(&self, _timeout: Duration) -> Result<(), TransportError> {
        self.state().closed = true;
        Ok(())
    }
}
