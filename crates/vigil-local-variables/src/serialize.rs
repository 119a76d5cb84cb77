//! Turning debugger values into JSON
//!
//! Scopes are expanded one level: arrays become arrays of their elements,
//! plain objects become maps of their own properties, anything deeper or any
//! class instance becomes a `<ClassName>` tag. Functions are left out.

use serde_json::{Map, Value};
use tracing::debug;

use crate::debugger::{Debugger, DebuggerError, PropertyDescriptor, RemoteValue};

pub const UNDEFINED: &str = "<undefined>";
const PLAIN_OBJECT: &str = "Object";

fn type_tag(class_name: &str) -> Value {
    Value::String(format!("<{}>", class_name))
}

/// Value of a nested property; no further expansion happens at this depth
fn shallow(value: &RemoteValue) -> Option<Value> {
    match value {
        RemoteValue::Undefined => Some(Value::String(UNDEFINED.to_string())),
        RemoteValue::Null => Some(Value::Null),
        RemoteValue::Primitive { value } => Some(value.clone()),
        RemoteValue::Array { .. } => Some(type_tag("Array")),
        RemoteValue::Object { class_name, .. } => Some(type_tag(class_name)),
        RemoteValue::Function => None,
    }
}

/// Serialize the variables of a scope object.
///
/// Fails only when the scope itself cannot be read; a variable whose value
/// cannot be expanded is left out.
pub async fn serialize_scope(
    debugger: &dyn Debugger,
    scope_id: &str,
) -> Result<Map<String, Value>, DebuggerError> {
    let properties = debugger.get_properties(scope_id).await?;
    let mut vars = Map::new();

    for property in properties {
        let Some(value) = &property.value else {
            continue;
        };

        let serialized = match value {
            RemoteValue::Array { object_id } => unroll_array(debugger, object_id).await,
            RemoteValue::Object {
                class_name,
                object_id,
            } if class_name == PLAIN_OBJECT => unroll_object(debugger, object_id).await,
            other => Ok(shallow(other)),
        };

        match serialized {
            Ok(Some(value)) => {
                vars.insert(property.name, value);
            }
            Ok(None) => {}
            Err(e) => debug!("Skipping variable {}: {}", property.name, e),
        }
    }

    Ok(vars)
}

async fn unroll_array(
    debugger: &dyn Debugger,
    object_id: &str,
) -> Result<Option<Value>, DebuggerError> {
    let properties = debugger.get_properties(object_id).await?;

    let mut elements: Vec<(usize, &PropertyDescriptor)> = properties
        .iter()
        .filter_map(|p| p.name.parse::<usize>().ok().map(|index| (index, p)))
        .collect();
    elements.sort_by_key(|(index, _)| *index);

    let values = elements
        .into_iter()
        .map(|(_, p)| p.value.as_ref().and_then(shallow).unwrap_or(Value::Null))
        .collect();
    Ok(Some(Value::Array(values)))
}

async fn unroll_object(
    debugger: &dyn Debugger,
    object_id: &str,
) -> Result<Option<Value>, DebuggerError> {
    let properties = debugger.get_properties(object_id).await?;

    let map = properties
        .into_iter()
        .filter_map(|p| {
            let value = p.value.as_ref().and_then(shallow)?;
            Some((p.name, value))
        })
        .collect();
    Ok(Some(Value::Object(map)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    struct FixedDebugger {
        objects: HashMap<&'static str, Vec<PropertyDescriptor>>,
    }

    #[async_trait]
    impl Debugger for FixedDebugger {
        async fn get_properties(
            &self,
            object_id: &str,
        ) -> Result<Vec<PropertyDescriptor>, DebuggerError> {
            self.objects
                .get(object_id)
                .cloned()
                .ok_or_else(|| DebuggerError::ObjectNotFound(object_id.to_string()))
        }

        async fn resume(&self) -> Result<(), DebuggerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_serialize_scope() {
        let mut objects = HashMap::new();
        objects.insert(
            "scope",
            vec![
                PropertyDescriptor::new("flag", RemoteValue::primitive(true)),
                PropertyDescriptor::new("missing", RemoteValue::Undefined),
                PropertyDescriptor::new("nothing", RemoteValue::Null),
                PropertyDescriptor::new("callback", RemoteValue::Function),
                PropertyDescriptor::new("list", RemoteValue::array("list")),
                PropertyDescriptor::new("gone", RemoteValue::array("no-such-object")),
                PropertyDescriptor {
                    name: "getter".to_string(),
                    value: None,
                },
            ],
        );
        objects.insert(
            "list",
            vec![
                PropertyDescriptor::new("1", RemoteValue::object("Object", "inner")),
                PropertyDescriptor::new("0", RemoteValue::primitive(7)),
                PropertyDescriptor::new("length", RemoteValue::primitive(2)),
            ],
        );
        let debugger = FixedDebugger { objects };

        let vars = serialize_scope(&debugger, "scope").await.unwrap();
        assert_eq!(
            Value::Object(vars),
            json!({
                "flag": true,
                "missing": "<undefined>",
                "nothing": null,
                "list": [7, "<Object>"],
            })
        );
    }

    #[tokio::test]
    async fn test_unreadable_scope_fails() {
        let debugger = FixedDebugger {
            objects: HashMap::new(),
        };
        assert!(serialize_scope(&debugger, "scope").await.is_err());
    }
}
