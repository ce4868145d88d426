//! Error and diagnostic types shared by the engine and every dialect.
//!
//! [`PostError`] aborts the current translation unit. Anything that can be
//! skipped without producing wrong motion code is reported as a [`Diagnostic`]
//! instead, and translation carries on.

use crate::cell::{FrameKind, NodeId};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure that makes the output of a translation unit unusable.
#[derive(Debug, Error)]
pub enum PostError {
    /// A base/tool arrangement the dialect cannot express correctly.
    #[error("statement `{statement}`: {reason}")]
    UnsupportedGeometry { statement: String, reason: String },

    /// A motion references a frame that never received a register slot.
    #[error("statement `{statement}`: {kind} frame `{frame}` has no register slot")]
    UnmappedFrame {
        statement: String,
        kind: FrameKind,
        frame: String,
    },

    #[error("no free name left for seed `{seed}` after {limit} attempts")]
    NamesExhausted { seed: String, limit: usize },

    #[error("routine `{caller}` calls `{callee}`, which is not part of the program")]
    UnknownRoutine { caller: String, callee: String },

    #[error("{kind} frame `{name}` is not defined on robot `{robot}`")]
    UnknownFrame {
        kind: FrameKind,
        name: String,
        robot: String,
    },

    #[error("node {0} is not part of the cell")]
    UnknownNode(NodeId),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How serious a diagnostic is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A message collected during translation for display by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}
