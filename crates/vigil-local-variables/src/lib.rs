//! Local variables capture for error events
//!
//! [`LocalVariables`] listens to debugger pauses on exceptions, serializes the
//! locals of the innermost frames and later attaches them to the frames of
//! the matching error event.

pub mod cache;
pub mod debugger;
pub mod error;
pub mod event;
pub mod integration;
pub mod rate_limit;
pub mod serialize;

pub use cache::LruCache;
pub use debugger::{
    CallFrame, Debugger, DebuggerError, Location, ObjectId, PauseReason, PausedEvent,
    PropertyDescriptor, RemoteValue, Scope, ScopeKind,
};
pub use error::LocalVariablesError;
pub use event::{stack_frames, Event, Exception, ExceptionValues, StackFrame, Stacktrace};
pub use integration::{CaptureOutcome, FrameVariables, LocalVariables, SkipReason};
pub use rate_limit::RateLimiter;
