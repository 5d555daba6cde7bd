// src/errors.rs

//! Crate-wide error taxonomy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedoError {
    /// The resolver walked all the way up without finding a script.
    #[error("{0}: cannot find a .do script to build it")]
    ScriptNotFound(String),

    /// A mode that records prerequisites was invoked outside a .do script.
    #[error("not invoked from within a .do script")]
    NoParentDatabase,

    /// `redo-ifcreate` was given a path that already exists.
    #[error("{0}: file or directory already exists")]
    AlreadyExists(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid job limit")]
    InvalidJobLimit,

    #[error("{value}: invalid file descriptor list: {reason}")]
    BadFdList { value: String, reason: String },

    #[error("no filenames supplied")]
    NoFilenames,

    #[error("{0}: unknown invocation identity")]
    UnknownIdentity(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RedoError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        RedoError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, RedoError>;
