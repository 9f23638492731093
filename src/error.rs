//! Error types for batworks.
//!
//! Provides a single [`WorksError`] enum shared by the container reader,
//! the FOD page decoder and both format families, plus the coarse
//! [`ParseStatus`] code callers get back from a document parse.

/// All errors that can occur while detecting, decoding or rendering a
/// Works document.
#[derive(Debug, thiserror::Error)]
pub enum WorksError {
    /// The underlying byte source could not be read or seeked.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// A fixed-width read ran past the end of the current extent.
    #[error("unexpected end of data at offset {offset:#x}")]
    UnexpectedEof { offset: u64 },

    /// The input is not a compound file at all (bad size, magic or
    /// geometry).
    #[error("not a compound file")]
    NotContainer,

    /// The input looks like a compound file but its tables are corrupt.
    #[error("corrupt compound file: {0}")]
    Container(String),

    /// A Works structure (FOD page, property string, font table, header
    /// index, text run) is inconsistent.
    #[error("{0}")]
    Parse(String),

    /// The input is not a Works document this crate recognizes.
    #[error("{0}")]
    Unsupported(String),

    /// Pretty-printing error (bat rendering failure).
    #[error("pretty print: {0}")]
    Render(String),
}

/// Terminal status of one document parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Ok,
    FileAccessError,
    ParseError,
    ContainerError,
    UnknownError,
}

impl WorksError {
    /// Build a [`WorksError::Parse`] from anything string-like.
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Build a [`WorksError::Container`] from anything string-like.
    pub(crate) fn container(msg: impl Into<String>) -> Self {
        Self::Container(msg.into())
    }

    /// Classify this error into one of the caller-visible result codes.
    pub const fn status(&self) -> ParseStatus {
        match self {
            Self::Io(_) => ParseStatus::FileAccessError,
            Self::UnexpectedEof { .. } | Self::Parse(_) => ParseStatus::ParseError,
            Self::NotContainer | Self::Container(_) => ParseStatus::ContainerError,
            Self::Unsupported(_) | Self::Render(_) => ParseStatus::UnknownError,
        }
    }
}

impl<T> From<&Result<T>> for ParseStatus {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) => e.status(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WorksError>;
