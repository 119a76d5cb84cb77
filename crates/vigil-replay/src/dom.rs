//! Mirrored document tree
//!
//! The recorder keeps its own copy of the observed UI tree so it can serialize
//! full snapshots and turn mutations into deltas. Node ids are assigned in
//! insertion order starting at 1 (the document node) and are never reused.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::snapshot::{AddedNode, AttributeChange, MutationData, RemovedNode, TextChange};

pub type NodeId = u32;

/// rrweb node type codes
pub const DOCUMENT_NODE: u8 = 0;
pub const ELEMENT_NODE: u8 = 2;
pub const TEXT_NODE: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
    },
    Text {
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
}

/// Wire form of a node and its subtree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_nodes: Option<Vec<SerializedNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
}

impl SerializedNode {
    pub fn document(id: NodeId, child_nodes: Vec<SerializedNode>) -> Self {
        Self {
            id,
            node_type: DOCUMENT_NODE,
            tag_name: None,
            attributes: None,
            child_nodes: Some(child_nodes),
            text_content: None,
        }
    }
}

/// A change applied to the mirrored document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomMutation {
    AppendElement {
        parent: NodeId,
        tag: String,
        attributes: Vec<(String, String)>,
    },
    AppendText {
        parent: NodeId,
        text: String,
    },
    Remove {
        id: NodeId,
    },
    /// `None` removes the attribute
    SetAttribute {
        id: NodeId,
        name: String,
        value: Option<String>,
    },
    SetText {
        id: NodeId,
        text: String,
    },
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: NodeId,
    href: Option<String>,
}

impl Document {
    pub fn new(href: Option<String>) -> Self {
        let root = 1;
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                id: root,
                parent: None,
                kind: NodeKind::Document,
                children: Vec::new(),
            },
        );

        Self {
            nodes,
            root,
            next_id: root + 1,
            href,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    pub fn set_href(&mut self, href: impl Into<String>) {
        self.href = Some(href.into());
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(&id)?.kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    /// Append an element; returns `None` when the parent cannot hold children
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attributes: &[(&str, &str)],
    ) -> Option<NodeId> {
        let attributes = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.insert(
            parent,
            NodeKind::Element {
                tag: tag.to_string(),
                attributes,
            },
        )
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Option<NodeId> {
        self.insert(
            parent,
            NodeKind::Text {
                content: text.to_string(),
            },
        )
    }

    fn insert(&mut self, parent: NodeId, kind: NodeKind) -> Option<NodeId> {
        let parent_node = self.nodes.get_mut(&parent)?;
        if matches!(parent_node.kind, NodeKind::Text { .. }) {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        parent_node.children.push(id);
        self.nodes.insert(
            id,
            Node {
                id,
                parent: Some(parent),
                kind,
                children: Vec::new(),
            },
        );
        Some(id)
    }

    fn remove_subtree(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                pending.extend(node.children);
            }
        }
    }

    /// Serialize the whole document
    pub fn serialize(&self) -> SerializedNode {
        self.serialize_node(self.root)
            .unwrap_or_else(|| SerializedNode::document(self.root, Vec::new()))
    }

    /// Serialize a node and its subtree. Walks with an explicit stack so
    /// deep trees do not exhaust the call stack.
    pub fn serialize_node(&self, id: NodeId) -> Option<SerializedNode> {
        // (node, index of the next child to visit, serialized children)
        let mut stack: Vec<(&Node, usize, Vec<SerializedNode>)> =
            vec![(self.nodes.get(&id)?, 0, Vec::new())];

        loop {
            let top = stack.last_mut()?;
            if let Some(&child) = top.0.children.get(top.1) {
                top.1 += 1;
                if let Some(node) = self.nodes.get(&child) {
                    stack.push((node, 0, Vec::new()));
                }
                continue;
            }

            let (node, _, children) = stack.pop()?;
            let serialized = serialize_single(node, children);
            match stack.last_mut() {
                Some(parent) => parent.2.push(serialized),
                None => return Some(serialized),
            }
        }
    }

    /// Apply a mutation and describe the resulting delta.
    ///
    /// Returns `None` when nothing observable changed (unknown node, value
    /// already set, removal of the root).
    pub fn apply(&mut self, mutation: &DomMutation) -> Option<MutationData> {
        let mut data = MutationData::default();

        match mutation {
            DomMutation::AppendElement {
                parent,
                tag,
                attributes,
            } => {
                let attrs: Vec<(&str, &str)> = attributes
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                let id = self.append_element(*parent, tag, &attrs)?;
                data.adds.push(AddedNode {
                    parent_id: *parent,
                    node: self.serialize_node(id)?,
                });
            }
            DomMutation::AppendText { parent, text } => {
                let id = self.append_text(*parent, text)?;
                data.adds.push(AddedNode {
                    parent_id: *parent,
                    node: self.serialize_node(id)?,
                });
            }
            DomMutation::Remove { id } => {
                let parent = self.nodes.get(id)?.parent?;
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.retain(|child| child != id);
                }
                self.remove_subtree(*id);
                data.removes.push(RemovedNode {
                    parent_id: parent,
                    id: *id,
                });
            }
            DomMutation::SetAttribute { id, name, value } => {
                let node = self.nodes.get_mut(id)?;
                let NodeKind::Element { attributes, .. } = &mut node.kind else {
                    return None;
                };
                let changed = match value {
                    Some(value) => attributes.insert(name.clone(), value.clone()).as_ref() != Some(value),
                    None => attributes.remove(name).is_some(),
                };
                if !changed {
                    return None;
                }
                let mut change = BTreeMap::new();
                change.insert(name.clone(), value.clone());
                data.attributes.push(AttributeChange {
                    id: *id,
                    attributes: change,
                });
            }
            DomMutation::SetText { id, text } => {
                let node = self.nodes.get_mut(id)?;
                let NodeKind::Text { content } = &mut node.kind else {
                    return None;
                };
                if content == text {
                    return None;
                }
                *content = text.clone();
                data.texts.push(TextChange {
                    id: *id,
                    value: text.clone(),
                });
            }
        }

        if data.is_empty() {
            None
        } else {
            Some(data)
        }
    }
}

fn serialize_single(node: &Node, children: Vec<SerializedNode>) -> SerializedNode {
    match &node.kind {
        NodeKind::Document => SerializedNode::document(node.id, children),
        NodeKind::Element { tag, attributes } => SerializedNode {
            id: node.id,
            node_type: ELEMENT_NODE,
            tag_name: Some(tag.clone()),
            attributes: Some(attributes.clone()),
            child_nodes: Some(children),
            text_content: None,
        },
        NodeKind::Text { content } => SerializedNode {
            id: node.id,
            node_type: TEXT_NODE,
            tag_name: None,
            attributes: None,
            child_nodes: None,
            text_content: Some(content.clone()),
        },
    }
}
