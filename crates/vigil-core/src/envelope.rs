//! Envelope encoding and parsing
//!
//! The envelope format is a simple newline delimited protocol:
//! ```text
//! {envelope_header}\n
//! {item_header}\n
//! {item_payload}\n
//! {item_header}\n
//! {item_payload}\n
//! ...
//! ```
//!
//! Item headers carry a `length` so binary payloads (compressed replay
//! recordings) can contain newlines.

use crate::types::{SdkInfo, UtcDateTime};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("missing envelope header")]
    MissingHeader,
    #[error("missing newline after header or payload")]
    MissingNewline,
    #[error("invalid envelope header: {0}")]
    InvalidHeader(String),
    #[error("invalid item header")]
    InvalidItemHeader(#[source] serde_json::Error),
    #[error("failed to write header")]
    HeaderIoFailed(#[source] serde_json::Error),
    #[error("failed to write payload")]
    PayloadIoFailed(#[source] std::io::Error),
    #[error("Invalid item payload: {0}")]
    InvalidPayload(String),
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct EnvelopeHeaders {
    /// Identifier of the event carried by this envelope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// Time the envelope was sent, according to the SDK
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<UtcDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<SdkInfo>,
}

/// The type of an envelope item.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Error event payload encoded in JSON.
    Event,
    /// Replay metadata payload.
    ReplayEvent,
    /// Replay recording data.
    ReplayRecording,
    /// Client internal report (eg: outcomes).
    ClientReport,
    /// An item type this version does not know about.
    #[serde(other)]
    Unknown,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::ReplayEvent => "replay_event",
            Self::ReplayRecording => "replay_recording",
            Self::ClientReport => "client_report",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ItemHeader {
    #[serde(rename = "type")]
    pub ty: ItemType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

/// A single item: its header and the raw payload bytes
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeItem {
    pub header: ItemHeader,
    pub payload: Vec<u8>,
}

impl EnvelopeItem {
    pub fn new(ty: ItemType, payload: Vec<u8>) -> Self {
        Self {
            header: ItemHeader {
                ty,
                length: Some(payload.len()),
            },
            payload,
        }
    }

    /// Item whose payload is the JSON serialization of `value`
    pub fn json<T: Serialize>(ty: ItemType, value: &T) -> Result<Self, EnvelopeError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))?;
        Ok(Self::new(ty, payload))
    }

    pub fn ty(&self) -> &ItemType {
        &self.header.ty
    }

    pub fn payload_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, EnvelopeError> {
        serde_json::from_slice(&self.payload).map_err(|e| {
            EnvelopeError::InvalidPayload(format!("Failed to parse {}: {}", self.header.ty, e))
        })
    }
}

/// An envelope with its header and items
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    header: EnvelopeHeaders,
    items: Vec<EnvelopeItem>,
}

impl Envelope {
    pub fn new(header: EnvelopeHeaders) -> Self {
        Self {
            header,
            items: Vec::new(),
        }
    }

    pub fn add_item(&mut self, item: EnvelopeItem) {
        self.items.push(item);
    }

    /// Get the envelope header
    pub fn header(&self) -> &EnvelopeHeaders {
        &self.header
    }

    /// Iterate over envelope items
    pub fn items(&self) -> impl Iterator<Item = &EnvelopeItem> {
        self.items.iter()
    }

    /// First item of the given type
    pub fn item(&self, ty: &ItemType) -> Option<&EnvelopeItem> {
        self.items.iter().find(|item| item.ty() == ty)
    }

    /// Serialize to the wire format
    pub fn to_vec(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut out = Vec::new();
        serde_json::to_writer(&mut out, &self.header).map_err(EnvelopeError::HeaderIoFailed)?;
        out.push(b'\n');

        for item in &self.items {
            let header = ItemHeader {
                ty: item.header.ty.clone(),
                length: Some(item.payload.len()),
            };
            serde_json::to_writer(&mut out, &header).map_err(EnvelopeError::HeaderIoFailed)?;
            out.push(b'\n');
            out.write_all(&item.payload)
                .map_err(EnvelopeError::PayloadIoFailed)?;
            out.push(b'\n');
        }

        Ok(out)
    }

    /// Parse an envelope from bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, EnvelopeError> {
        let (header_line, mut rest) = split_line(data).ok_or(EnvelopeError::MissingHeader)?;
        if header_line.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(EnvelopeError::MissingHeader);
        }

        let header: EnvelopeHeaders = serde_json::from_slice(header_line)
            .map_err(|e| EnvelopeError::InvalidHeader(format!("Failed to parse header: {}", e)))?;

        let mut items = Vec::new();

        loop {
            // Skip blank lines between items
            while let Some((line, tail)) = split_line(rest) {
                if !line.iter().all(|b| b.is_ascii_whitespace()) {
                    break;
                }
                rest = tail;
            }
            if rest.is_empty() {
                break;
            }

            let (item_line, tail) = split_line(rest).ok_or(EnvelopeError::UnexpectedEof)?;
            let item_header: ItemHeader =
                serde_json::from_slice(item_line).map_err(EnvelopeError::InvalidItemHeader)?;
            rest = tail;

            let payload = match item_header.length {
                Some(length) => {
                    if rest.len() < length {
                        return Err(EnvelopeError::UnexpectedEof);
                    }
                    let (payload, tail) = rest.split_at(length);
                    rest = match tail.first() {
                        Some(b'\n') => &tail[1..],
                        Some(_) => return Err(EnvelopeError::MissingNewline),
                        None => tail,
                    };
                    payload
                }
                None => {
                    let (payload, tail) = split_line(rest).ok_or(EnvelopeError::UnexpectedEof)?;
                    rest = tail;
                    payload
                }
            };

            if item_header.ty == ItemType::Unknown {
                tracing::debug!("Skipping unknown envelope item type");
                continue;
            }

            items.push(EnvelopeItem {
                header: item_header,
                payload: payload.to_vec(),
            });
        }

        Ok(Envelope { header, items })
    }
}

/// Split off the first line; the returned tail excludes the newline.
fn split_line(data: &[u8]) -> Option<(&[u8], &[u8])> {
    if data.is_empty() {
        return None;
    }
    match data.iter().position(|b| *b == b'\n') {
        Some(pos) => Some((&data[..pos], &data[pos + 1..])),
        None => Some((data, &[])),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct RecordingHeader {
    segment_id: u32,
}

/// Build a replay recording payload: `{"segment_id":N}\n` followed by the
/// snapshot array, zlib-compressed when `compress` is set.
pub fn encode_recording(
    segment_id: u32,
    events_json: &[u8],
    compress: bool,
) -> Result<Vec<u8>, EnvelopeError> {
    let mut out = serde_json::to_vec(&RecordingHeader { segment_id })
        .map_err(EnvelopeError::HeaderIoFailed)?;
    out.push(b'\n');

    if compress {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(events_json)
            .map_err(EnvelopeError::PayloadIoFailed)?;
        let compressed = encoder.finish().map_err(EnvelopeError::PayloadIoFailed)?;
        out.extend_from_slice(&compressed);
    } else {
        out.extend_from_slice(events_json);
    }

    Ok(out)
}

/// Split a replay recording payload into its segment id and the
/// (decompressed) snapshot array bytes.
pub fn decode_recording(payload: &[u8]) -> Result<(u32, Vec<u8>), EnvelopeError> {
    let pos = payload
        .iter()
        .position(|b| *b == b'\n')
        .ok_or(EnvelopeError::MissingNewline)?;
    let header: RecordingHeader = serde_json::from_slice(&payload[..pos])
        .map_err(|e| EnvelopeError::InvalidPayload(format!("Invalid recording header: {}", e)))?;
    let body = &payload[pos + 1..];

    // JSON arrays start with '['; anything else is treated as a zlib stream
    let events = match body.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'[') => body.to_vec(),
        _ => {
            let mut decoder = ZlibDecoder::new(body);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed).map_err(|e| {
                EnvelopeError::InvalidPayload(format!("Failed to decompress recording: {}", e))
            })?;
            decompressed
        }
    };

    Ok((header.segment_id, events))
}
