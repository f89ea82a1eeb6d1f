use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Field names with a typed slot on `Principal`
const RESERVED_FIELDS: [&str; 3] = ["id", "name", "role"];

/// Opaque principal identifier. The backend hands out either numeric or
/// string ids, so both are accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(untagged)]
pub enum PrincipalId {
    Int(i64),
    Text(String),
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalId::Int(id) => write!(f, "{}", id),
            PrincipalId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for PrincipalId {
    fn from(id: i64) -> Self {
        PrincipalId::Int(id)
    }
}

impl From<&str> for PrincipalId {
    fn from(id: &str) -> Self {
        PrincipalId::Text(id.to_string())
    }
}

impl From<String> for PrincipalId {
    fn from(id: String) -> Self {
        PrincipalId::Text(id)
    }
}

/// The authenticated admin as the backend describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Principal {
    pub id: PrincipalId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Any other profile fields the application sends along
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: Map<String, Value>,
}

impl Principal {
    pub fn new(id: impl Into<PrincipalId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            role: None,
            extra: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Name for display, falling back to the id
    pub fn display_name(&self) -> String {
        match self.name {
            Some(ref name) if !name.trim().is_empty() => name.clone(),
            _ => format!("#{}", self.id),
        }
    }

    /// Shallow field-level merge. Every field present in `patch` replaces
    /// the one here; everything else is left alone. The id never changes.
    pub fn apply(&mut self, patch: &PrincipalPatch) {
        if let Some(ref name) = patch.name {
            self.name = name.clone();
        }
        if let Some(ref role) = patch.role {
            self.role = Some(role.clone());
        }
        for (key, value) in &patch.fields {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum PatchError {
    #[error("Profile patch must be a JSON object")]
    NotAnObject,

    #[error("Field '{field}' has the wrong type: expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// A partial principal: only the fields that should change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrincipalPatch {
    // Outer None = leave alone, Some(None) = set to null
    name: Option<Option<String>>,
    role: Option<String>,
    fields: Map<String, Value>,
}

impl PrincipalPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Some(name.into()));
        self
    }

    /// Set the display name to null
    pub fn clear_name(mut self) -> Self {
        self.name = Some(None);
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set an extension field. Keys that belong to typed fields are ignored
    /// here; use `name` / `role` for those, and `id` cannot be patched.
    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if RESERVED_FIELDS.contains(&key.as_str()) {
            debug!(field = %key, "Ignoring reserved field in profile patch");
            return self;
        }
        self.fields.insert(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.role.is_none() && self.fields.is_empty()
    }
}

impl TryFrom<Value> for PrincipalPatch {
    type Error = PatchError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(map) = value else {
            return Err(PatchError::NotAnObject);
        };

        let mut patch = PrincipalPatch::new();
        for (key, value) in map {
            match key.as_str() {
                "id" => debug!("Dropping id from profile patch"),
                "name" => {
                    patch = match value {
                        Value::Null => patch.clear_name(),
                        Value::String(name) => patch.name(name),
                        _ => {
                            return Err(PatchError::WrongType {
                                field: "name",
                                expected: "string or null",
                            })
                        }
                    }
                }
                "role" => {
                    patch = match value {
                        Value::String(role) => patch.role(role),
                        _ => {
                            return Err(PatchError::WrongType {
                                field: "role",
                                expected: "string",
                            })
                        }
                    }
                }
                _ => patch = patch.field(key, value),
            }
        }
        Ok(patch)
    }
}

/// Everything except the id becomes part of the patch. A `Principal`
/// cannot tell an absent name from a null one, so `None` leaves the name
/// alone; build the patch from JSON when an explicit null must clear it.
impl From<Principal> for PrincipalPatch {
    fn from(principal: Principal) -> Self {
        let mut patch = PrincipalPatch {
            name: principal.name.map(Some),
            role: principal.role,
            fields: Map::new(),
        };
        for (key, value) in principal.extra {
            patch = patch.field(key, value);
        }
        patch
    }
}
