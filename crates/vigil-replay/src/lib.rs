//! Session replay capture
//!
//! A [`Replay`] observes UI events against a mirrored [`Document`], packages
//! them into full and incremental snapshots, groups those into numbered
//! segments of an idle-expiring session and ships every segment as an
//! envelope through a [`Transport`].

pub mod container;
pub mod dom;
pub mod error;
pub mod event;
pub mod recorder;
pub mod replay;
pub mod segment;
pub mod session;
pub mod snapshot;
pub mod timer;
pub mod transport;

pub use container::ReplayContainer;
pub use dom::{Document, DomMutation, NodeId};
pub use error::{ReplayError, ReplayResult};
pub use event::{segment_envelope, DecodedSegment, ReplayEvent, ReplayMetadata};
pub use recorder::{SnapshotRecorder, UiEvent};
pub use replay::{Replay, ReplayState};
pub use segment::{Segment, SegmentPackager};
pub use session::{Session, SessionManager};
pub use snapshot::{FullSnapshot, IncrementalData, IncrementalSnapshot, Snapshot};
pub use timer::ExpiryTimer;
pub use transport::{
    DeliveryOutcome, DeliveryReport, HttpTransport, MemoryTransport, Transport, TransportError,
};
