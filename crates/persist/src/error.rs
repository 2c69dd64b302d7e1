//! Error taxonomy for archiving

use thiserror::Error;

use crate::value::ObjRef;

/// Errors raised while building, reducing or rendering an archive.
///
/// Every error surfaces synchronously from the entry point that caused it.
/// The engine holds no external resources, so discarding the in-memory state
/// is the only cleanup a caller ever needs.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The children-edge relation contains a cycle. The whole build is aborted.
    #[error("archive contains cyclic dependencies: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// A heuristic rename replaced a different number of occurrences than the
    /// template has value references.
    #[error("replacement {old}->{new}: expected {expected}, replaced {actual}")]
    ReplacementMismatch {
        old: String,
        new: String,
        expected: usize,
        actual: usize,
    },

    /// Two distinct objects were inserted under the same root name.
    #[error("object with name '{0}' already exists in archive")]
    NameCollision(String),

    /// A root name is not usable as a Python binding.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// A template could not be parsed as a Python expression.
    #[error("failed to parse template `{template}`: {message}")]
    TemplateParse { template: String, message: String },

    /// No registered encoder accepts the value.
    #[error("no encoder accepts {0} values")]
    NoEncoder(String),

    /// An encoder rejected a value it had accepted.
    #[error("encoder failed: {0}")]
    Encode(String),

    /// An object handle does not belong to the heap.
    #[error("unknown object handle {0:?}")]
    UnknownObject(ObjRef),

    /// Graph bookkeeping is inconsistent.
    #[error("graph integrity violated: {0}")]
    Integrity(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] toml::de::Error),

    #[error("invalid object document: {0}")]
    InvalidDocument(String),
}

pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;
