//! Core utilities and types shared across all Vigil crates

pub mod clock;
pub mod config;
pub mod dsn;
pub mod envelope;
pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use dsn::{Dsn, DsnError};
pub use envelope::{Envelope, EnvelopeError, EnvelopeHeaders, EnvelopeItem, ItemHeader, ItemType};
pub use error::*;
pub use types::*;
pub use utils::*;

// Re-export external dependencies
pub use chrono;
pub use serde_json;
pub use tracing;
