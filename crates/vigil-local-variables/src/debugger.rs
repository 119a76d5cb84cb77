//! Debugger collaborator
//!
//! The runtime's debugger is reached through [`Debugger`]. Values are
//! described the way an inspector protocol reports them: primitives inline,
//! objects and arrays by a handle that can be expanded with
//! [`Debugger::get_properties`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ObjectId = String;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DebuggerError {
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Debugger disconnected")]
    Disconnected,
}

/// A value as reported by the debugger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteValue {
    Undefined,
    Null,
    /// Boolean, number or string
    Primitive { value: serde_json::Value },
    Array { object_id: ObjectId },
    Object {
        class_name: String,
        object_id: ObjectId,
    },
    Function,
}

impl RemoteValue {
    pub fn primitive(value: impl Into<serde_json::Value>) -> Self {
        RemoteValue::Primitive {
            value: value.into(),
        }
    }

    pub fn object(class_name: impl Into<String>, object_id: impl Into<ObjectId>) -> Self {
        RemoteValue::Object {
            class_name: class_name.into(),
            object_id: object_id.into(),
        }
    }

    pub fn array(object_id: impl Into<ObjectId>) -> Self {
        RemoteValue::Array {
            object_id: object_id.into(),
        }
    }
}

/// One own property of an object. `value` is `None` for accessors and
/// properties the debugger could not read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub value: Option<RemoteValue>,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, value: RemoteValue) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }
}

/// Zero-based source position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line_number: u32,
    pub column_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Local,
    Closure,
    Block,
    Module,
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub object_id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFrame {
    pub function_name: String,
    /// Class of the receiver when the frame is a method call
    pub this_class_name: Option<String>,
    pub location: Location,
    pub scope_chain: Vec<Scope>,
}

impl CallFrame {
    /// Function name as it appears in stack traces: `Class.method` for
    /// methods, `<anonymous>` when the function has no name
    pub fn qualified_name(&self) -> String {
        let name = if self.function_name.is_empty() {
            "<anonymous>"
        } else {
            self.function_name.as_str()
        };
        match &self.this_class_name {
            Some(class) if class != "Object" && !class.is_empty() => format!("{}.{}", class, name),
            _ => name.to_string(),
        }
    }

    pub fn local_scope(&self) -> Option<&Scope> {
        self.scope_chain.iter().find(|s| s.kind == ScopeKind::Local)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    Exception,
    PromiseRejection,
    Other,
}

/// Notification that execution paused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PausedEvent {
    pub reason: PauseReason,
    /// Whether the exception escaped every handler
    pub uncaught: bool,
    /// Innermost frame first
    pub call_frames: Vec<CallFrame>,
}

#[async_trait]
pub trait Debugger: Send + Sync {
    /// Own properties of the object behind `object_id`
    async fn get_properties(
        &self,
        object_id: &str,
    ) -> Result<Vec<PropertyDescriptor>, DebuggerError>;

    /// Resume execution after a pause
    async fn resume(&self) -> Result<(), DebuggerError>;
}
