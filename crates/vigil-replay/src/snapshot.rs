//! Recording snapshot types
//!
//! Snapshots are sent as rrweb-compatible records:
//! `{ "type": 2 | 3, "data": {...}, "timestamp": <ms> }` where 2 is a full
//! snapshot of the document and 3 an incremental mutation record. Incremental
//! data carries a numeric `source` discriminant.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use vigil_core::{epoch_millis, UtcDateTime};

use crate::dom::{NodeId, SerializedNode};

pub const FULL_SNAPSHOT_TYPE: u8 = 2;
pub const INCREMENTAL_SNAPSHOT_TYPE: u8 = 3;

/// A single recorded snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Full(FullSnapshot),
    Incremental(IncrementalSnapshot),
}

impl Snapshot {
    pub fn timestamp(&self) -> UtcDateTime {
        match self {
            Snapshot::Full(full) => full.timestamp,
            Snapshot::Incremental(incremental) => incremental.timestamp,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Snapshot::Full(_))
    }

    pub fn type_code(&self) -> u8 {
        match self {
            Snapshot::Full(_) => FULL_SNAPSHOT_TYPE,
            Snapshot::Incremental(_) => INCREMENTAL_SNAPSHOT_TYPE,
        }
    }
}

impl From<FullSnapshot> for Snapshot {
    fn from(value: FullSnapshot) -> Self {
        Snapshot::Full(value)
    }
}

impl From<IncrementalSnapshot> for Snapshot {
    fn from(value: IncrementalSnapshot) -> Self {
        Snapshot::Incremental(value)
    }
}

impl Serialize for Snapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("type", &self.type_code())?;
        match self {
            Snapshot::Full(full) => map.serialize_entry("data", &FullData::from(full))?,
            Snapshot::Incremental(incremental) => {
                map.serialize_entry("data", &incremental.data)?
            }
        }
        map.serialize_entry("timestamp", &epoch_millis(self.timestamp()))?;
        map.end()
    }
}

/// Complete serialized state of the document
#[derive(Debug, Clone, PartialEq)]
pub struct FullSnapshot {
    pub timestamp: UtcDateTime,
    pub node: SerializedNode,
    pub initial_offset: ScrollOffset,
    pub href: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScrollOffset {
    pub left: i32,
    pub top: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FullData<'a> {
    node: &'a SerializedNode,
    initial_offset: ScrollOffset,
    #[serde(skip_serializing_if = "Option::is_none")]
    href: Option<&'a str>,
}

impl<'a> From<&'a FullSnapshot> for FullData<'a> {
    fn from(full: &'a FullSnapshot) -> Self {
        FullData {
            node: &full.node,
            initial_offset: full.initial_offset,
            href: full.href.as_deref(),
        }
    }
}

/// A delta since the previous snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementalSnapshot {
    pub timestamp: UtcDateTime,
    /// Milliseconds since the start of the segment; never decreases within a segment
    pub time_offset: i64,
    pub data: IncrementalData,
}

/// rrweb incremental sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementalSource {
    Mutation = 0,
    MouseMove = 1,
    MouseInteraction = 2,
    Scroll = 3,
    ViewportResize = 4,
    Input = 5,
}

/// rrweb mouse interaction kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseInteraction {
    MouseUp = 0,
    MouseDown = 1,
    Click = 2,
    Focus = 5,
    Blur = 6,
}

impl Serialize for MouseInteraction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(*self as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MousePosition {
    pub id: NodeId,
    pub time_offset: i64,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedNode {
    #[serde(rename = "parentId")]
    pub parent_id: NodeId,
    pub node: SerializedNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedNode {
    pub parent_id: NodeId,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeChange {
    pub id: NodeId,
    pub attributes: std::collections::BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChange {
    pub id: NodeId,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationData {
    pub texts: Vec<TextChange>,
    pub attributes: Vec<AttributeChange>,
    pub removes: Vec<RemovedNode>,
    pub adds: Vec<AddedNode>,
}

impl MutationData {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
            && self.attributes.is_empty()
            && self.removes.is_empty()
            && self.adds.is_empty()
    }
}

/// Payload of an incremental snapshot, tagged by source
#[derive(Debug, Clone, PartialEq)]
pub enum IncrementalData {
    Mutation(MutationData),
    MouseMove {
        positions: Vec<MousePosition>,
    },
    MouseInteraction {
        kind: MouseInteraction,
        id: NodeId,
        x: i32,
        y: i32,
    },
    Scroll {
        id: NodeId,
        x: i32,
        y: i32,
    },
    ViewportResize {
        width: u32,
        height: u32,
    },
    Input {
        id: NodeId,
        text: String,
    },
}

impl IncrementalData {
    pub fn source(&self) -> IncrementalSource {
        match self {
            IncrementalData::Mutation(_) => IncrementalSource::Mutation,
            IncrementalData::MouseMove { .. } => IncrementalSource::MouseMove,
            IncrementalData::MouseInteraction { .. } => IncrementalSource::MouseInteraction,
            IncrementalData::Scroll { .. } => IncrementalSource::Scroll,
            IncrementalData::ViewportResize { .. } => IncrementalSource::ViewportResize,
            IncrementalData::Input { .. } => IncrementalSource::Input,
        }
    }
}

impl Serialize for IncrementalData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("source", &(self.source() as u8))?;
        match self {
            IncrementalData::Mutation(mutation) => {
                map.serialize_entry("texts", &mutation.texts)?;
                map.serialize_entry("attributes", &mutation.attributes)?;
                map.serialize_entry("removes", &mutation.removes)?;
                map.serialize_entry("adds", &mutation.adds)?;
            }
            IncrementalData::MouseMove { positions } => {
                map.serialize_entry("positions", positions)?;
            }
            IncrementalData::MouseInteraction { kind, id, x, y } => {
                map.serialize_entry("type", kind)?;
                map.serialize_entry("id", id)?;
                map.serialize_entry("x", x)?;
                map.serialize_entry("y", y)?;
            }
            IncrementalData::Scroll { id, x, y } => {
                map.serialize_entry("id", id)?;
                map.serialize_entry("x", x)?;
                map.serialize_entry("y", y)?;
            }
            IncrementalData::ViewportResize { width, height } => {
                map.serialize_entry("width", width)?;
                map.serialize_entry("height", height)?;
            }
            IncrementalData::Input { id, text } => {
                map.serialize_entry("id", id)?;
                map.serialize_entry("text", text)?;
            }
        }
        map.end()
    }
}
