//! Error types for the object-document mapper.
//!
//! Errors are grouped by the layer that raises them: mapping metadata, the
//! unit of work, query execution and the search engine backend. Everything is
//! folded into [`OdmError`] so callers can use a single `?` chain.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all mapper operations.
#[derive(Error, Debug)]
pub enum OdmError {
    /// Mapping declaration and metadata errors
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Staging and commit errors
    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),

    /// Query building and execution errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A single-document lookup matched nothing.
    ///
    /// This is an expected condition for lookups, not a bug signal.
    #[error("no result for {class_name} matching {criteria}")]
    NoResult { class_name: String, criteria: String },

    /// Search engine backend errors, passed through unchanged
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl OdmError {
    /// Returns true if this error is a [`OdmError::NoResult`].
    pub fn is_no_result(&self) -> bool {
        matches!(self, OdmError::NoResult { .. })
    }

    pub(crate) fn no_result(class_name: &str, criteria: impl Into<String>) -> Self {
        OdmError::NoResult {
            class_name: class_name.to_string(),
            criteria: criteria.into(),
        }
    }
}

/// Errors raised while building class metadata from mapping declarations.
#[derive(Error, Debug)]
pub enum MappingError {
    /// The class carries no usable mapping declaration.
    #[error("invalid mapping for {class_name}: {message}")]
    InvalidMapping { class_name: String, message: String },

    /// A declared field or parameter lacks a required attribute.
    #[error("mapping of {class_name}::{property} is missing required attribute '{attribute}'")]
    MissingAttribute {
        class_name: String,
        property: String,
        attribute: String,
    },

    /// The declared index name cannot be used by a search engine.
    #[error("invalid index name '{index}' declared by {class_name}")]
    InvalidIndexName { class_name: String, index: String },

    /// The configured index name pattern does not compile.
    #[error("invalid index name pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Mapping declarations could not be read.
    #[error("failed to load mapping declarations from {source_name}: {message}")]
    LoadFailed {
        source_name: String,
        message: String,
    },
}

impl MappingError {
    pub(crate) fn invalid(class_name: &str, message: impl Into<String>) -> Self {
        MappingError::InvalidMapping {
            class_name: class_name.to_string(),
            message: message.into(),
        }
    }
}

/// Errors raised by the unit of work while staging or committing.
#[derive(Error, Debug)]
pub enum UnitOfWorkError {
    /// An entity staged for persistence has no resolvable identifier.
    #[error("entity of class {class_name} has no identifier")]
    MissingIdentifier { class_name: String },

    /// A value that is not an object was passed where an entity was expected.
    #[error("expected an object for entity class {class_name}, found {found}")]
    UnexpectedArgumentType { class_name: String, found: String },
}

/// Errors raised while building or executing a query.
#[derive(Error, Debug)]
pub enum QueryError {
    /// No backend query object has been attached via `search_with`.
    #[error("no backend query is bound to this query")]
    NoQueryBound,

    /// `count()` or `facets()` was requested before the query ran.
    #[error("query has not been executed yet")]
    NotExecuted,

    /// The backend returned a result this mapper cannot interpret.
    #[error("unexpected result type: {message}")]
    UnexpectedResultType { message: String },

    /// The backend query object does not understand a forwarded call.
    #[error("backend query does not support call '{call}'")]
    UnsupportedCall { call: String },

    /// A forwarded call received arguments of the wrong shape.
    #[error("invalid arguments for '{call}': {message}")]
    InvalidArgument { call: String, message: String },

    /// Normal hydration was requested without a secondary hydration query.
    #[error("no hydration query configured for normal hydration mode")]
    NoHydrationQuery,
}

/// Errors originating from the search engine backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// The addressed index does not exist.
    #[error("index not found: {index}")]
    IndexNotFound { index: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

impl BackendError {
    pub(crate) fn internal(backend_name: &str, message: impl Into<String>) -> Self {
        BackendError::Internal {
            backend_name: backend_name.to_string(),
            message: message.into(),
            source: None,
        }
    }
}

/// Result type alias for mapper operations.
pub type OdmResult<T> = Result<T, OdmError>;

impl From<serde_json::Error> for OdmError {
    fn from(err: serde_json::Error) -> Self {
        OdmError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Internal {
            backend_name: "unknown".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(feature = "elasticsearch")]
impl From<elasticsearch::Error> for OdmError {
    fn from(err: elasticsearch::Error) -> Self {
        OdmError::Backend(BackendError::Internal {
            backend_name: "elasticsearch".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_result_display() {
        let err = OdmError::no_result("User", "username=mrhash");
        assert_eq!(err.to_string(), "no result for User matching username=mrhash");
        assert!(err.is_no_result());
    }

    #[test]
    fn test_mapping_error_display() {
        let err = MappingError::MissingAttribute {
            class_name: "User".to_string(),
            property: "name".to_string(),
            attribute: "type".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "mapping of User::name is missing required attribute 'type'"
        );
    }

    #[test]
    fn test_missing_identifier_display() {
        let err = UnitOfWorkError::MissingIdentifier {
            class_name: "Comment".to_string(),
        };
        assert!(err.to_string().contains("Comment"));
    }

    #[test]
    fn test_odm_error_from_categories() {
        let err: OdmError = QueryError::NoQueryBound.into();
        assert!(matches!(err, OdmError::Query(QueryError::NoQueryBound)));
        assert!(!err.is_no_result());

        let err: OdmError = MappingError::invalid("User", "no index").into();
        assert!(matches!(err, OdmError::Mapping(_)));
    }

    #[test]
    fn test_serde_error_maps_to_serialization() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: OdmError = parse_err.into();
        assert!(matches!(
            err,
            OdmError::Backend(BackendError::SerializationError { .. })
        ));
    }
}
