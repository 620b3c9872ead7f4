//! Error types.
//!
//! Nothing in the reactive core propagates these past its own boundary. The
//! directive resolvers and the lifecycle controller log them through
//! `tracing` and carry on with the rest of the page, so a single malformed
//! attribute never halts hydration.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the runtime can report.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// A directive found no enclosing component, store or item to bind to.
    #[error("no owning proxy found for `{attribute}`")]
    NoOwner { attribute: String },

    /// A component or store name that was never registered.
    #[error("unknown component or store `{0}`")]
    UnknownInstance(String),

    /// Two definitions or two live instances claimed the same global name.
    #[error("name `{0}` is already registered")]
    NameCollision(String),

    /// A collection target that cannot be resolved.
    #[error("malformed collection target `{0}`")]
    MalformedTarget(String),

    /// Wholesale assignment to an item collection.
    #[error("property `{prop}` holds an item collection and cannot be reassigned")]
    CollectionReplacement { prop: String },

    /// Assignment of a non-string, non-array value to a class list.
    #[error("property `{prop}` holds a class list; expected a string or an array, got {found}")]
    ClassListType { prop: String, found: &'static str },

    /// The expression text could not be parsed.
    #[error("parse error in `{source_text}` at offset {offset}: {message}")]
    Parse {
        source_text: String,
        offset: usize,
        message: String,
    },

    /// Evaluating an expression failed.
    #[error("evaluation error: {0}")]
    Eval(String),

    /// A collection index outside `0..len`.
    #[error("index {index} out of bounds for collection of length {len}")]
    OutOfBounds { index: usize, len: usize },

    /// A CSS selector the swap engine does not understand.
    #[error("invalid selector `{0}`")]
    Selector(String),

    /// A swap target matched nothing.
    #[error("swap target `{0}` matched no element")]
    TargetNotFound(String),

    /// The transport failed to produce a response.
    #[error("request to `{url}` failed: {message}")]
    Request { url: String, message: String },

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn eval(message: impl Into<String>) -> Self {
        Error::Eval(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_their_context() {
        let err = Error::ClassListType {
            prop: "classes".into(),
            found: "number",
        };
        assert_eq!(
            err.to_string(),
            "property `classes` holds a class list; expected a string or an array, got number"
        );

        let err = Error::OutOfBounds { index: 4, len: 2 };
        assert!(err.to_string().contains("index 4"));
    }
}
