//! Error types shared by every ewfkit crate

use thiserror::Error;

/// The main error type for EWF operations
#[derive(Error, Debug)]
pub enum Error {
    /// Caller passed an invalid value
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Operation attempted in the wrong handle state
    #[error("Invalid handle state: {0}")]
    State(String),

    /// The segment pool reported an underlying I/O error
    #[error("Segment I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Section header failed its Adler-32 check or is structurally invalid
    #[error("Bad section header: {0}")]
    BadSectionHeader(String),

    /// A section's next-offset does not advance through the segment
    #[error("Section overflow: {0}")]
    SectionOverflow(String),

    /// Chunk Adler-32 or decompression mismatch
    #[error("Corrupt chunk: {0}")]
    CorruptChunk(String),

    /// Chunk table entry unreadable from both table and table2
    #[error("Missing chunk {0}")]
    MissingChunk(u64),

    /// Write targeted an already-sealed chunk outside delta mode
    #[error("Chunk {0} is sealed and the image is not in delta mode")]
    ReadOnlyChunk(u64),

    /// LEF record stream violates the category/types/values contract
    #[error("Malformed logical evidence record: {0}")]
    MalformedRecord(String),

    /// LEF file entry references an unknown or cyclic parent
    #[error("Dangling parent identifier {parent} for entry {entry}")]
    DanglingParent { entry: u64, parent: u64 },

    /// Cooperative cancel via `signal_abort`
    #[error("Operation aborted")]
    Aborted,

    /// Unrecognized dialect or feature combination
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Text could not be converted between encodings
    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Result type alias for EWF operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid argument error
    pub fn argument(msg: impl Into<String>) -> Self {
        Error::Argument(msg.into())
    }

    /// Create a wrong-state error
    pub fn state(msg: impl Into<String>) -> Self {
        Error::State(msg.into())
    }

    /// Create a bad section header error
    pub fn bad_section_header(msg: impl Into<String>) -> Self {
        Error::BadSectionHeader(msg.into())
    }

    /// Create a section overflow error
    pub fn section_overflow(msg: impl Into<String>) -> Self {
        Error::SectionOverflow(msg.into())
    }

    /// Create a corrupt chunk error
    pub fn corrupt_chunk(reason: impl Into<String>) -> Self {
        Error::CorruptChunk(reason.into())
    }

    /// Create a malformed record error
    pub fn malformed_record(msg: impl Into<String>) -> Self {
        Error::MalformedRecord(msg.into())
    }

    /// Create an unsupported error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create an encoding error
    pub fn encoding(msg: impl Into<String>) -> Self {
        Error::Encoding(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corrupt_chunk("chunk 17: adler mismatch");
        assert_eq!(err.to_string(), "Corrupt chunk: chunk 17: adler mismatch");

        let err = Error::MissingChunk(3);
        assert_eq!(err.to_string(), "Missing chunk 3");

        let err = Error::DanglingParent { entry: 5, parent: 9 };
        assert!(err.to_string().contains("9"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
