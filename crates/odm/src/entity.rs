//! Entity trait.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{OdmResult, UnitOfWorkError};

/// A domain type that can be stored in a search engine.
///
/// Entities are plain serde types. The mapping of their properties onto an
/// index is declared separately and supplied by a
/// [`MappingDriver`](crate::mapping::MappingDriver) under [`Entity::CLASS_NAME`].
///
/// ```
/// use helios_odm::Entity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct User {
///     id: Option<String>,
///     name: String,
///     username: String,
/// }
///
/// impl Entity for User {
///     const CLASS_NAME: &'static str = "User";
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name under which the mapping of this type is declared.
    const CLASS_NAME: &'static str;
}

/// Converts an entity into its object snapshot.
pub(crate) fn to_snapshot<T: Entity>(entity: &T) -> OdmResult<Value> {
    let value = serde_json::to_value(entity)?;
    ensure_object(T::CLASS_NAME, value)
}

/// Rejects snapshots that are not JSON objects.
pub(crate) fn ensure_object(class_name: &str, value: Value) -> OdmResult<Value> {
    if value.is_object() {
        return Ok(value);
    }
    let found = match &value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    Err(UnitOfWorkError::UnexpectedArgumentType {
        class_name: class_name.to_string(),
        found: found.to_string(),
    }
    .into())
}

/// Converts a hydrated object back into an entity.
pub(crate) fn from_snapshot<T: Entity>(value: Value) -> OdmResult<T> {
    Ok(serde_json::from_value(value)?)
}
