//! Replay event and envelope construction
//!
//! Every flushed segment becomes one envelope with two items: the
//! `replay_event` describing the segment and the `replay_recording` carrying
//! its snapshots.

use serde::{Deserialize, Serialize};
use vigil_core::envelope::encode_recording;
use vigil_core::{
    epoch_seconds, generate_id, Envelope, EnvelopeError, EnvelopeHeaders, EnvelopeItem, ItemType,
    SdkInfo, UtcDateTime,
};

use crate::segment::Segment;

pub const REPLAY_EVENT_TYPE: &str = "replay_event";
pub const REPLAY_TYPE_SESSION: &str = "session";
pub const DEFAULT_PLATFORM: &str = "javascript";

/// Context attached to every segment of a recording
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayMetadata {
    pub platform: String,
    pub environment: Option<String>,
    pub release: Option<String>,
    pub sdk: SdkInfo,
    pub compress: bool,
}

impl Default for ReplayMetadata {
    fn default() -> Self {
        Self {
            platform: DEFAULT_PLATFORM.to_string(),
            environment: None,
            release: None,
            sdk: SdkInfo::default(),
            compress: false,
        }
    }
}

impl ReplayMetadata {
    pub fn from_config(config: &vigil_core::ClientConfig) -> Self {
        Self {
            environment: config.environment.clone(),
            release: config.release.clone(),
            compress: config.replay.compress_recordings,
            ..Self::default()
        }
    }
}

/// Wire form of the `replay_event` item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEvent {
    #[serde(rename = "type")]
    pub ty: String,
    pub event_id: String,
    pub replay_id: String,
    pub segment_id: u32,
    /// Seconds since the epoch
    pub timestamp: f64,
    /// Only present on segment 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_start_timestamp: Option<f64>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub error_ids: Vec<String>,
    #[serde(default)]
    pub trace_ids: Vec<String>,
    pub replay_type: String,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    pub sdk: SdkInfo,
}

impl ReplayEvent {
    pub fn new(segment: &Segment, metadata: &ReplayMetadata) -> Self {
        let replay_start_timestamp = if segment.segment_id == 0 {
            Some(epoch_seconds(segment.replay_start))
        } else {
            None
        };

        Self {
            ty: REPLAY_EVENT_TYPE.to_string(),
            event_id: generate_id(),
            replay_id: segment.replay_id.clone(),
            segment_id: segment.segment_id,
            timestamp: epoch_seconds(segment.timestamp),
            replay_start_timestamp,
            urls: segment.urls.clone(),
            error_ids: Vec::new(),
            trace_ids: Vec::new(),
            replay_type: REPLAY_TYPE_SESSION.to_string(),
            platform: metadata.platform.clone(),
            environment: metadata.environment.clone(),
            release: metadata.release.clone(),
            sdk: metadata.sdk.clone(),
        }
    }
}

/// Build the envelope for one segment
pub fn segment_envelope(
    segment: &Segment,
    metadata: &ReplayMetadata,
    sent_at: UtcDateTime,
) -> Result<Envelope, EnvelopeError> {
    let event = ReplayEvent::new(segment, metadata);
    let snapshots = serde_json::to_vec(&segment.snapshots)
        .map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))?;
    let recording = encode_recording(segment.segment_id, &snapshots, metadata.compress)?;

    let mut envelope = Envelope::new(EnvelopeHeaders {
        event_id: Some(event.event_id.clone()),
        sent_at: Some(sent_at),
        sdk: Some(metadata.sdk.clone()),
    });
    envelope.add_item(EnvelopeItem::json(ItemType::ReplayEvent, &event)?);
    envelope.add_item(EnvelopeItem::new(ItemType::ReplayRecording, recording));

    Ok(envelope)
}

/// A replay segment read back out of an envelope
#[derive(Debug, Clone)]
pub struct DecodedSegment {
    pub event: ReplayEvent,
    pub segment_id: u32,
    pub snapshots: Vec<serde_json::Value>,
}

impl DecodedSegment {
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, EnvelopeError> {
        let event: ReplayEvent = envelope
            .item(&ItemType::ReplayEvent)
            .ok_or_else(|| EnvelopeError::InvalidPayload("missing replay_event item".into()))?
            .payload_json()?;
        let recording = envelope
            .item(&ItemType::ReplayRecording)
            .ok_or_else(|| EnvelopeError::InvalidPayload("missing replay_recording item".into()))?;

        let (segment_id, body) = vigil_core::envelope::decode_recording(&recording.payload)?;
        let snapshots = serde_json::from_slice(&body)
            .map_err(|e| EnvelopeError::InvalidPayload(format!("Invalid recording: {}", e)))?;

        Ok(Self {
            event,
            segment_id,
            snapshots,
        })
    }

    pub fn full_snapshots(&self) -> usize {
        self.count_type(crate::snapshot::FULL_SNAPSHOT_TYPE)
    }

    pub fn incremental_snapshots(&self) -> usize {
        self.count_type(crate::snapshot::INCREMENTAL_SNAPSHOT_TYPE)
    }

    fn count_type(&self, ty: u8) -> usize {
        self.snapshots
            .iter()
            .filter(|s| s["type"].as_u64() == Some(u64::from(ty)))
            .count()
    }
}
