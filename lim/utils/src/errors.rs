//! Errors generated by the compiler.
use thiserror::Error as ThisError;

/// Convenience wrapper to represent success or meaningful compiler error.
pub type LimResult<T> = std::result::Result<T, Error>;

/// Errors generated by the compiler. None of these are recoverable: they
/// signal a graph that an earlier step left in an invalid state.
#[derive(ThisError)]
pub enum Error {
    /// The graph violates a structural invariant.
    #[error("Malformed structure: {0}")]
    MalformedStructure(String),

    /// Two values that must agree on width do not.
    #[error("Size mismatch: {msg} (expected {expected}, found {found})")]
    SizeMismatch {
        msg: String,
        expected: usize,
        found: usize,
    },

    /// An operation was requested in a lifecycle state that forbids it.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// The node has a singular identity and cannot be cloned.
    #[error("Clone not supported for {0}")]
    UnsupportedClone(String),

    /// A pass reached a node it does not handle.
    #[error(
        "Internal error at: {pass}. Unexpected traversal of {node} encountered"
    )]
    UnexpectedNode { pass: String, node: String },

    /// A reference that the referent does not track.
    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    /// The program violates an assumption made by a pass.
    #[error("[{pass}] {msg}")]
    PassAssumption { pass: String, msg: String },

    /// Miscellaneous error message.
    #[error("{0}")]
    Misc(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn malformed_structure<S: ToString>(msg: S) -> Self {
        Self::MalformedStructure(msg.to_string())
    }

    pub fn size_mismatch<S: ToString>(
        msg: S,
        expected: usize,
        found: usize,
    ) -> Self {
        Self::SizeMismatch {
            msg: msg.to_string(),
            expected,
            found,
        }
    }

    pub fn illegal_state<S: ToString>(msg: S) -> Self {
        Self::IllegalState(msg.to_string())
    }

    pub fn unsupported_clone<S: ToString>(what: S) -> Self {
        Self::UnsupportedClone(what.to_string())
    }

    pub fn unexpected_node<P: ToString, N: ToString>(pass: P, node: N) -> Self {
        Self::UnexpectedNode {
            pass: pass.to_string(),
            node: node.to_string(),
        }
    }

    pub fn unknown_reference<S: ToString>(what: S) -> Self {
        Self::UnknownReference(what.to_string())
    }

    pub fn pass_assumption<P: ToString, S: ToString>(pass: P, msg: S) -> Self {
        Self::PassAssumption {
            pass: pass.to_string(),
            msg: msg.to_string(),
        }
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Self::Misc(msg.to_string())
    }

    /// The bare message without the category prefix.
    pub fn message(&self) -> String {
        match self {
            Error::MalformedStructure(msg)
            | Error::IllegalState(msg)
            | Error::UnsupportedClone(msg)
            | Error::UnknownReference(msg)
            | Error::Misc(msg) => msg.clone(),
            Error::SizeMismatch { msg, .. }
            | Error::PassAssumption { msg, .. } => msg.clone(),
            Error::UnexpectedNode { node, .. } => node.clone(),
            Error::Io(e) => e.to_string(),
            Error::Json(e) => e.to_string(),
        }
    }
}

// Returning a result from `main` prints the Debug form.
impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_node_names_pass_and_node() {
        let err = Error::unexpected_node("latency-check", "AddOp(add0)");
        let msg = err.to_string();
        assert!(msg.contains("latency-check"));
        assert!(msg.contains("AddOp(add0)"));
    }

    #[test]
    fn size_mismatch_reports_both_widths() {
        let err = Error::size_mismatch("port p0", 8, 4);
        assert_eq!(
            err.to_string(),
            "Size mismatch: port p0 (expected 8, found 4)"
        );
    }
}
