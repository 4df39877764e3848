//! Error types for the schema registry and decoder

use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Genuine schema defects found while compiling sources.
///
/// The tolerant enum rewrite never produces one of these on its own; anything
/// reported here is a real problem in the submitted text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("{file}:{line}:{column}: syntax error: {message}")]
    Syntax {
        file: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{file}: type {name} is already defined")]
    DuplicateType { file: String, name: String },

    #[error("{file}: field number {number} is used more than once in {message}")]
    DuplicateFieldNumber {
        file: String,
        message: String,
        number: u32,
    },

    #[error("{file}: field name {field} is used more than once in {message}")]
    DuplicateFieldName {
        file: String,
        message: String,
        field: String,
    },

    #[error("{file}: field {message}.{field} has invalid number {number}")]
    InvalidFieldNumber {
        file: String,
        message: String,
        field: String,
        number: i64,
    },

    #[error("{file}: field {message}.{field} uses a reserved name or number")]
    ReservedField {
        file: String,
        message: String,
        field: String,
    },

    #[error("{file}: enum value {value} is defined more than once in {enum_name}")]
    DuplicateEnumValue {
        file: String,
        enum_name: String,
        value: String,
    },

    #[error("{file}: enum value {enum_name}.{value} has number {number} outside the int32 range")]
    InvalidEnumNumber {
        file: String,
        enum_name: String,
        value: String,
        number: i64,
    },

    #[error("{file}: enum value {value} in {enum_name} conflicts with a sibling enum in scope {scope}")]
    EnumValueConflict {
        file: String,
        scope: String,
        enum_name: String,
        value: String,
    },

    #[error("{file}: field {message}.{field} references unknown type {type_name}")]
    UnresolvedType {
        file: String,
        message: String,
        field: String,
        type_name: String,
    },

    #[error("{file}: map field {message}.{field} has invalid key type {key_type}")]
    InvalidMapKey {
        file: String,
        message: String,
        field: String,
        key_type: String,
    },
}

/// Failures while interpreting wire-format bytes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed payload at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("message nesting exceeds depth limit of {limit}")]
    DepthExceeded { limit: usize },
}

/// Registry and decoder errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid URL pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether this is a lookup miss rather than a compile or IO failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
