use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::value::Shape;

/// Errors returned by store operations.
#[derive(Error, Debug)]
pub enum KVError {
    #[error("kv: corrupt data in {path}: {source}")]
    CorruptData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("kv: rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("kv: key not found: {0}")]
    NotFound(String),

    #[error("kv: value of {0} is not a list")]
    NotList(String),

    #[error("kv: write to {path} failed: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("kv: store is shutting down")]
    ShuttingDown,

    #[error("kv: storage error: {0}")]
    Storage(String),

    #[error("kv: io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for store operations.
pub type KVResult<T> = Result<T, KVError>;

/// Why a key or value was refused before reaching the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("key is empty")]
    EmptyKey,

    #[error("key is too long ({len} > {max})")]
    KeyTooLong { len: usize, max: usize },

    #[error("value is too long ({len} > {max})")]
    ValueTooLong { len: usize, max: usize },

    #[error("cannot convert {found} to {target}")]
    Coercion { target: Shape, found: &'static str },

    #[error("unsupported value type: {0}")]
    Unsupported(&'static str),

    #[error("list elements must be strings, numbers or booleans, found {0}")]
    Element(&'static str),
}
