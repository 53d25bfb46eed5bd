//! Weaver errors
//!
//! Every error aborts the pass; the rewritten module is only written back
//! when the whole pass succeeds.

use semweave_bytecode::{ModuleError, VerifyError};
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, WeaveError>;

/// Errors raised while weaving a module
#[derive(Debug, Error)]
pub enum WeaveError {
    #[error("{type_name}.{member}: refusing to rewrite hand-written {accessor} accessor")]
    HandWrittenAccessor {
        type_name: String,
        member: String,
        accessor: &'static str,
    },

    #[error("{type_name}.{member}: no compiler-generated backing field found in setter")]
    MissingBackingField { type_name: String, member: String },

    #[error("{type_name}.{member}: no {method} method accepting {mapping_type} found in type hierarchy")]
    MappingApiNotFound {
        type_name: String,
        member: String,
        method: String,
        mapping_type: String,
    },

    #[error("{type_name}.{member}: notification method {method}(System.String) not found in type hierarchy")]
    NotificationMethodNotFound {
        type_name: String,
        member: String,
        method: String,
    },

    #[error("{type_name}.{member}: cannot resolve an equality check for {value_type}")]
    EqualityNotResolvable {
        type_name: String,
        member: String,
        value_type: String,
    },

    #[error("{type_name}.{member}: unsupported default value of type {kind}")]
    UnsupportedDefaultValue {
        type_name: String,
        member: String,
        kind: &'static str,
    },

    #[error("{type_name}: mapped type declares no type identifiers and no {method} override exists in its hierarchy")]
    MissingTypeIdentifiers { type_name: String, method: String },

    #[error("{type_name}: no virtual {method} declaration found in base types")]
    QueryMethodNotFound { type_name: String, method: String },

    #[error("{type_name}: {mapping_type} has no constructor taking ({signature})")]
    MappingConstructorNotFound {
        type_name: String,
        mapping_type: String,
        signature: String,
    },

    #[error("{type_name}: identifier type {identifier_type} has no constructor taking (System.String)")]
    IdentifierConstructorNotFound {
        type_name: String,
        identifier_type: String,
    },

    #[error("{type_name}.{member}: invalid {annotation} annotation: {reason}")]
    InvalidAnnotation {
        type_name: String,
        member: String,
        annotation: String,
        reason: String,
    },

    #[error("type {0} could not be resolved")]
    TypeNotFound(String),

    #[error("module {name} not found (searched: {searched:?})")]
    ModuleNotFound {
        name: String,
        searched: Vec<PathBuf>,
    },

    #[error("{type_name}: field {field} already exists with type {existing}")]
    FieldNameCollision {
        type_name: String,
        field: String,
        existing: String,
    },

    #[error("unbound label {0} in synthesized body")]
    UnboundLabel(usize),

    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("module error: {0}")]
    Module(#[from] ModuleError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl WeaveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WeaveError::Io {
            path: path.into(),
            source,
        }
    }
}
