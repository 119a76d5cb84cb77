//! Local variables integration
//!
//! On every exception pause the variables of the innermost frames are read
//! through the debugger and cached under a hash of the stack. When the error
//! event for that exception is processed later, the cached variables are
//! attached to the matching frames as `vars`.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use vigil_core::{Clock, LocalVariablesConfig};

use crate::cache::LruCache;
use crate::debugger::{Debugger, PauseReason, PausedEvent};
use crate::error::LocalVariablesError;
use crate::event::{hash_call_frames, hash_stack_frames, Event};
use crate::rate_limit::RateLimiter;
use crate::serialize::serialize_scope;

/// Variables captured for one frame, innermost frame first in a capture
#[derive(Debug, Clone, PartialEq)]
pub struct FrameVariables {
    pub function: String,
    pub vars: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NotAnException,
    Caught,
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Frames with variables and the stack hash they are cached under
    Captured { hash: String, frames: usize },
    Skipped(SkipReason),
}

struct CaptureState {
    cache: LruCache<String, Vec<FrameVariables>>,
    limiter: RateLimiter,
}

pub struct LocalVariables {
    config: LocalVariablesConfig,
    debugger: Arc<dyn Debugger>,
    clock: Arc<dyn Clock>,
    state: Mutex<CaptureState>,
}

impl LocalVariables {
    pub fn new(
        config: LocalVariablesConfig,
        debugger: Arc<dyn Debugger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = CaptureState {
            cache: LruCache::new(config.cache_size),
            limiter: RateLimiter::new(config.max_exceptions_per_second),
        };
        Self {
            config,
            debugger,
            clock,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &LocalVariablesConfig {
        &self.config
    }

    /// Stacks currently cached
    pub async fn cached(&self) -> usize {
        self.state.lock().await.cache.len()
    }

    /// Handle a debugger pause. Execution is always resumed, whatever the
    /// capture outcome.
    pub async fn on_paused(
        &self,
        event: &PausedEvent,
    ) -> Result<CaptureOutcome, LocalVariablesError> {
        let outcome = self.capture(event).await;

        self.debugger.resume().await?;
        Ok(outcome)
    }

    async fn capture(&self, event: &PausedEvent) -> CaptureOutcome {
        if !self.config.enabled {
            return CaptureOutcome::Skipped(SkipReason::Disabled);
        }
        if event.reason == PauseReason::Other {
            return CaptureOutcome::Skipped(SkipReason::NotAnException);
        }
        if !event.uncaught && !self.config.capture_all_exceptions {
            return CaptureOutcome::Skipped(SkipReason::Caught);
        }
        if !self.state.lock().await.limiter.allow(self.clock.now()) {
            return CaptureOutcome::Skipped(SkipReason::RateLimited);
        }

        let mut frames = Vec::with_capacity(event.call_frames.len());
        for (depth, frame) in event.call_frames.iter().enumerate() {
            let function = frame.qualified_name();
            let vars = match frame.local_scope() {
                Some(scope) if depth < self.config.max_frames => {
                    match serialize_scope(self.debugger.as_ref(), &scope.object_id).await {
                        Ok(vars) if !vars.is_empty() => Some(vars),
                        Ok(_) => None,
                        Err(e) => {
                            debug!("Failed to read locals of {}: {}", function, e);
                            None
                        }
                    }
                }
                _ => None,
            };
            frames.push(FrameVariables { function, vars });
        }

        let captured = frames.iter().filter(|f| f.vars.is_some()).count();
        let hash = hash_call_frames(&event.call_frames);
        debug!(
            "Captured local variables for {} of {} frames",
            captured,
            frames.len()
        );
        self.state.lock().await.cache.insert(hash.clone(), frames);

        CaptureOutcome::Captured {
            hash,
            frames: captured,
        }
    }

    /// Attach cached variables to the frames of every exception in `event`.
    /// Returns how many frames received `vars`.
    pub async fn process_event(&self, event: &mut Event) -> usize {
        if !self.config.enabled {
            return 0;
        }
        let Some(exceptions) = event.exception.as_mut() else {
            return 0;
        };

        let mut state = self.state.lock().await;
        let mut attached = 0;

        for exception in &mut exceptions.values {
            let Some(stacktrace) = exception.stacktrace.as_mut() else {
                continue;
            };
            let hash = hash_stack_frames(&stacktrace.frames);
            let Some(cached) = state.cache.remove(&hash) else {
                continue;
            };

            // Event frames are outermost first, cached frames innermost first
            for (frame, captured) in stacktrace.frames.iter_mut().rev().zip(cached) {
                if frame.in_app == Some(false) {
                    continue;
                }
                if frame.function.as_deref() != Some(captured.function.as_str()) {
                    warn!(
                        "Frame mismatch: expected {}, found {:?}",
                        captured.function, frame.function
                    );
                    continue;
                }
                if let Some(vars) = captured.vars {
                    frame.vars = Some(vars);
                    attached += 1;
                }
            }
        }

        attached
    }
}
