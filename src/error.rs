//! Error types for query compilation.
//!
//! Every error terminates the current `render` call. Nothing is retried and
//! no partial output is suppressed.

use thiserror::Error;

/// Errors raised while lowering an expression tree into builder calls.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Malformed join: {0}")]
    MalformedJoin(String),

    #[error("Malformed set operation: {0}")]
    MalformedSetOperation(String),

    #[error("Malformed CTE projection: {0}")]
    MalformedCteProjection(String),

    #[error("Malformed recursive CTE: {0}")]
    MalformedRecursiveCte(String),

    #[error("Unreachable window state: {0}")]
    UnreachableWindowState(String),

    #[error("Named window extension is not supported by this builder (base window '{0}')")]
    UnsupportedWindowExtension(String),

    #[error("Template '{template}' references argument {index} but only {available} were given")]
    MissingTemplateArgument {
        template: String,
        index: usize,
        available: usize,
    },

    #[error("Unsupported construct: {0}")]
    UnsupportedConstruct(String),

    #[error("Builder rejected call: {0}")]
    Builder(#[from] BuildError),
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised by a target builder that cannot accept a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("{call} is not valid here: {reason}")]
    Protocol { call: String, reason: String },

    #[error("{0} is not supported by this builder")]
    Unsupported(String),
}

impl BuildError {
    pub fn protocol(call: &str, reason: impl Into<String>) -> Self {
        BuildError::Protocol {
            call: call.to_string(),
            reason: reason.into(),
        }
    }
}

pub type BuildResult<T> = Result<T, BuildError>;
