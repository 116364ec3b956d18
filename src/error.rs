//! Error type shared by every module in the crate.

use thiserror::Error;

/// Everything that can go wrong while parsing, composing, transforming or
/// applying changesets, or while maintaining a pad's history.
#[derive(Error, Debug)]
pub enum Error {
    /// The input text is not well formed.
    #[error("malformed input at byte {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// The changeset is well formed but internally inconsistent.
    #[error("invalid changeset: {0}")]
    InvalidChangeset(String),

    #[error("{what} length mismatch: expected {expected}, found {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An attribute id is missing from the pool, or the pool itself is corrupt.
    #[error("attribute pool inconsistency: {0}")]
    PoolInconsistency(String),

    #[error("an entry with key {0} already exists")]
    DuplicateKey(String),

    #[error("entry key must not be null")]
    NullKey,

    #[error("offset {offset} is beyond total width {total}")]
    OffsetOutOfRange { offset: usize, total: usize },

    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("revision {rev} does not exist (head is {head:?})")]
    RevisionOutOfRange { rev: usize, head: Option<usize> },

    /// A client tried to attribute text to somebody else.
    #[error("author {expected} tried to submit changes as {found}")]
    AuthorMismatch { expected: String, found: String },

    /// A client-side call was made out of order.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// A stored revision failed the integrity check.
    #[error("revision {rev}: {source}")]
    Integrity {
        rev: usize,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Error {
        return Error::Parse {
            offset,
            message: message.into(),
        };
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Error {
        return Error::InvalidChangeset(message.into());
    }

    pub(crate) fn at_revision(self, rev: usize) -> Error {
        return Error::Integrity {
            rev,
            source: Box::new(self),
        };
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
