//! Snapshot recorder
//!
//! Turns UI events into snapshots. Events that change nothing observable
//! (idle ticks, repeated pointer positions, writes of an unchanged value)
//! produce no snapshot.

use chrono::Duration;
use std::collections::HashMap;
use tracing::debug;
use vigil_core::UtcDateTime;

use crate::dom::{Document, DomMutation, NodeId};
use crate::snapshot::{
    FullSnapshot, IncrementalData, IncrementalSnapshot, MouseInteraction, MousePosition,
    ScrollOffset,
};

/// An observed UI event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    MouseMove { target: NodeId, x: i32, y: i32 },
    Click { target: NodeId, x: i32, y: i32 },
    Input { target: NodeId, text: String },
    Scroll { target: NodeId, x: i32, y: i32 },
    Resize { width: u32, height: u32 },
    Focus { target: NodeId },
    Blur { target: NodeId },
    Mutation(DomMutation),
    /// Page change; recorded as a fresh full snapshot, see [`SnapshotRecorder::navigate`]
    Navigate { href: String },
    Idle,
}

impl UiEvent {
    /// Whether the event counts as user activity for the session's idle timer
    pub fn is_user_activity(&self) -> bool {
        !matches!(self, UiEvent::Idle | UiEvent::Mutation(_))
    }
}

pub struct SnapshotRecorder {
    document: Document,
    segment_start: UtcDateTime,
    last_offset: i64,
    pointer: Option<(NodeId, i32, i32)>,
    scroll: HashMap<NodeId, (i32, i32)>,
    viewport: Option<(u32, u32)>,
}

impl SnapshotRecorder {
    pub fn new(document: Document, now: UtcDateTime) -> Self {
        Self {
            document,
            segment_start: now,
            last_offset: 0,
            pointer: None,
            scroll: HashMap::new(),
            viewport: None,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Reset the time base for the next segment
    pub fn begin_segment(&mut self, now: UtcDateTime) {
        self.segment_start = now;
        self.last_offset = 0;
    }

    pub fn segment_start(&self) -> UtcDateTime {
        self.segment_start
    }

    /// Capture the complete current state
    pub fn checkout(&self, now: UtcDateTime) -> FullSnapshot {
        let (left, top) = self
            .scroll
            .get(&self.document.root())
            .copied()
            .unwrap_or_default();

        FullSnapshot {
            timestamp: now,
            node: self.document.serialize(),
            initial_offset: ScrollOffset { left, top },
            href: self.document.href().map(str::to_string),
        }
    }

    /// Move to a new page. Returns the full snapshot of the new page, or
    /// `None` when the location did not change.
    pub fn navigate(&mut self, href: &str, now: UtcDateTime) -> Option<FullSnapshot> {
        if self.document.href() == Some(href) {
            return None;
        }
        self.document.set_href(href);
        self.pointer = None;
        self.scroll.clear();
        Some(self.checkout(now))
    }

    /// Classify an event into zero or more incremental snapshots
    pub fn observe(&mut self, event: &UiEvent, now: UtcDateTime) -> Vec<IncrementalSnapshot> {
        let mut data = Vec::new();

        match event {
            UiEvent::Idle | UiEvent::Navigate { .. } => {}
            UiEvent::MouseMove { target, x, y } => {
                if self.known(*target) && self.pointer != Some((*target, *x, *y)) {
                    self.pointer = Some((*target, *x, *y));
                    data.push(self.positions(*target, *x, *y, now));
                }
            }
            UiEvent::Click { target, x, y } => {
                if self.known(*target) {
                    if self.pointer != Some((*target, *x, *y)) {
                        self.pointer = Some((*target, *x, *y));
                        data.push(self.positions(*target, *x, *y, now));
                    }
                    for kind in [
                        MouseInteraction::MouseDown,
                        MouseInteraction::MouseUp,
                        MouseInteraction::Click,
                    ] {
                        data.push(IncrementalData::MouseInteraction {
                            kind,
                            id: *target,
                            x: *x,
                            y: *y,
                        });
                    }
                }
            }
            UiEvent::Focus { target } | UiEvent::Blur { target } => {
                if self.known(*target) {
                    let kind = if matches!(event, UiEvent::Focus { .. }) {
                        MouseInteraction::Focus
                    } else {
                        MouseInteraction::Blur
                    };
                    data.push(IncrementalData::MouseInteraction {
                        kind,
                        id: *target,
                        x: 0,
                        y: 0,
                    });
                }
            }
            UiEvent::Input { target, text } => {
                let changed = self.document.apply(&DomMutation::SetAttribute {
                    id: *target,
                    name: "value".to_string(),
                    value: Some(text.clone()),
                });
                if changed.is_some() {
                    data.push(IncrementalData::Input {
                        id: *target,
                        text: text.clone(),
                    });
                }
            }
            UiEvent::Scroll { target, x, y } => {
                if self.known(*target) && self.scroll.get(target) != Some(&(*x, *y)) {
                    self.scroll.insert(*target, (*x, *y));
                    data.push(IncrementalData::Scroll {
                        id: *target,
                        x: *x,
                        y: *y,
                    });
                }
            }
            UiEvent::Resize { width, height } => {
                if self.viewport != Some((*width, *height)) {
                    self.viewport = Some((*width, *height));
                    data.push(IncrementalData::ViewportResize {
                        width: *width,
                        height: *height,
                    });
                }
            }
            UiEvent::Mutation(mutation) => {
                if let Some(delta) = self.document.apply(mutation) {
                    data.push(IncrementalData::Mutation(delta));
                }
            }
        }

        if data.is_empty() {
            debug!("Event produced no observable change: {:?}", event);
            return Vec::new();
        }

        let time_offset = self.time_offset(now);
        let timestamp = self.segment_start + Duration::milliseconds(time_offset);
        data.into_iter()
            .map(|data| IncrementalSnapshot {
                timestamp,
                time_offset,
                data,
            })
            .collect()
    }

    fn known(&self, target: NodeId) -> bool {
        let known = self.document.contains(target);
        if !known {
            debug!("Ignoring event for unknown node {}", target);
        }
        known
    }

    fn positions(&mut self, target: NodeId, x: i32, y: i32, now: UtcDateTime) -> IncrementalData {
        IncrementalData::MouseMove {
            positions: vec![MousePosition {
                id: target,
                time_offset: self.time_offset(now),
                x,
                y,
            }],
        }
    }

    /// Offset from the segment start, clamped so it never goes backwards
    fn time_offset(&mut self, now: UtcDateTime) -> i64 {
        let elapsed = (now - self.segment_start).num_milliseconds().max(0);
        self.last_offset = self.last_offset.max(elapsed);
        self.last_offset
    }
}
