//! Error event shapes the integration reads and enriches

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::debugger::CallFrame;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionValues>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionValues {
    pub values: Vec<Exception>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stacktrace {
    /// Outermost frame first
    pub frames: Vec<StackFrame>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// One-based
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    /// One-based
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colno: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_app: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vars: Option<Map<String, Value>>,
}

impl StackFrame {
    pub fn from_call_frame(frame: &CallFrame) -> Self {
        Self {
            function: Some(frame.qualified_name()),
            lineno: Some(frame.location.line_number + 1),
            colno: Some(frame.location.column_number + 1),
            in_app: Some(true),
            ..Default::default()
        }
    }
}

/// Event frames (outermost first) for a set of paused call frames
pub fn stack_frames(call_frames: &[CallFrame]) -> Vec<StackFrame> {
    call_frames
        .iter()
        .rev()
        .map(StackFrame::from_call_frame)
        .collect()
}

/// Stable hash of a stack given innermost-first `(function, line, column)`
/// triples with one-based positions
pub fn hash_frames<'a, I>(frames: I) -> String
where
    I: IntoIterator<Item = (&'a str, Option<u32>, Option<u32>)>,
{
    let mut hasher = Sha256::new();
    for (function, line, column) in frames {
        hasher.update(function.as_bytes());
        hasher.update(b":");
        hasher.update(line.unwrap_or(0).to_string().as_bytes());
        hasher.update(b":");
        hasher.update(column.unwrap_or(0).to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Hash of an event's stack; frames are reversed to innermost first
pub fn hash_stack_frames(frames: &[StackFrame]) -> String {
    hash_frames(frames.iter().rev().map(|f| {
        (
            f.function.as_deref().unwrap_or("<anonymous>"),
            f.lineno,
            f.colno,
        )
    }))
}

/// Hash of paused call frames, comparable with [`hash_stack_frames`]
pub fn hash_call_frames(frames: &[CallFrame]) -> String {
    let names: Vec<String> = frames.iter().map(CallFrame::qualified_name).collect();
    hash_frames(frames.iter().zip(names.iter()).map(|(frame, name)| {
        (
            name.as_str(),
            Some(frame.location.line_number + 1),
            Some(frame.location.column_number + 1),
        )
    }))
}
