//! Shared building blocks for the Opengear resource modules.

use crate::connection::Method;
use crate::diff::is_empty_value;
use crate::modules::{ModuleError, ModuleResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One device object as a mapping of field names to values.
pub type Instance = Map<String, Value>;

// ============================================================================
// Command Descriptor
// ============================================================================

/// A single REST operation against the device.
///
/// `DELETE` carries no data, `POST` targets a collection path, `PUT` targets an
/// id-qualified path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub method: Method,
    pub path: String,
    pub data: Option<Value>,
}

impl Command {
    pub fn put(path: impl Into<String>, data: Value) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            data: Some(data),
        }
    }

    pub fn post(path: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            data,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            data: None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Decide the REST operation for a (data, path, id) triple.
///
/// 1. An explicit `method` is returned as given.
/// 2. With an id, the id is appended to `path`: non-empty data gives `PUT`,
///    otherwise `DELETE` unless the id is protected, which gives nothing.
/// 3. Without an id, non-empty data gives `POST`.
/// 4. Anything else gives nothing.
pub fn command_builder(
    data: Option<Value>,
    path: &str,
    id: Option<&str>,
    delete_exceptions: &[String],
    method: Option<Method>,
) -> Option<Command> {
    if let Some(method) = method {
        return Some(Command {
            method,
            path: path.to_string(),
            data,
        });
    }

    let data = data.filter(|d| !is_empty_value(d));

    match (id, data) {
        (Some(id), Some(data)) => Some(Command::put(format!("{}{}", path, id), data)),
        (Some(id), None) => {
            if delete_exceptions.iter().any(|protected| protected == id) {
                None
            } else {
                Some(Command::delete(format!("{}{}", path, id)))
            }
        }
        (None, Some(data)) => Some(Command::post(path, Some(data))),
        (None, None) => None,
    }
}

/// Fluent front end for [`command_builder`].
#[derive(Debug, Clone)]
pub struct CommandBuilder<'a> {
    path: &'a str,
    data: Option<Value>,
    id: Option<&'a str>,
    delete_exceptions: &'a [String],
    method: Option<Method>,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(path: &'a str) -> Self {
        Self {
            path,
            data: None,
            id: None,
            delete_exceptions: &[],
            method: None,
        }
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Wrap `body` under `key`, the envelope every Opengear write uses.
    pub fn body(self, key: &str, body: Instance) -> Self {
        let mut envelope = Map::new();
        envelope.insert(key.to_string(), Value::Object(body));
        self.data(Value::Object(envelope))
    }

    pub fn id(mut self, id: Option<&'a str>) -> Self {
        self.id = id;
        self
    }

    pub fn protect(mut self, ids: &'a [String]) -> Self {
        self.delete_exceptions = ids;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn build(self) -> Option<Command> {
        command_builder(
            self.data,
            self.path,
            self.id,
            self.delete_exceptions,
            self.method,
        )
    }
}

// ============================================================================
// Instance Helpers
// ============================================================================

/// String form of an id or name field; numbers are accepted as well.
pub fn field_str(instance: &Instance, field: &str) -> Option<String> {
    match instance.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Copy of `instance` without the listed keys.
pub fn without(instance: &Instance, keys: &[&str]) -> Instance {
    instance
        .iter()
        .filter(|(k, _)| !keys.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Read a list of mappings; null and absent mean an empty list.
pub fn instance_list(value: &Value, what: &str) -> ModuleResult<Vec<Instance>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map.clone()),
                other => Err(ModuleError::InvalidParameter(format!(
                    "{} entries must be mappings, got {}",
                    what, other
                ))),
            })
            .collect(),
        other => Err(ModuleError::InvalidParameter(format!(
            "{} must be a list, got {}",
            what, other
        ))),
    }
}

/// Read a mapping; null and absent mean an empty mapping.
pub fn instance_map(value: &Value, what: &str) -> ModuleResult<Instance> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        other => Err(ModuleError::InvalidParameter(format!(
            "{} must be a mapping, got {}",
            what, other
        ))),
    }
}
