//! Errors raised while reading a `gmon.out` container.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GmonError {
    #[error("Unsupported gmon.out version {0}")]
    UnsupportedVersion(u32),

    #[error("Unknown record tag {tag} at offset {offset:#x}")]
    UnknownTag { tag: u8, offset: u64 },

    #[error("Truncated {0} record")]
    Truncated(&'static str),

    #[error("Histogram mismatch: {0}")]
    HistogramMismatch(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl GmonError {
    /// Maps end-of-stream inside a record to [`GmonError::Truncated`].
    pub(crate) fn truncated(record: &'static str) -> impl Fn(io::Error) -> GmonError + Copy {
        move |e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                GmonError::Truncated(record)
            } else {
                GmonError::Io(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            GmonError::UnknownTag { tag: 7, offset: 0x14 }.to_string(),
            "Unknown record tag 7 at offset 0x14"
        );
        assert_eq!(
            GmonError::Truncated("call-graph").to_string(),
            "Truncated call-graph record"
        );
    }

    #[test]
    fn eof_becomes_truncated() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            GmonError::truncated("histogram")(eof),
            GmonError::Truncated("histogram")
        ));
        let other = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            GmonError::truncated("histogram")(other),
            GmonError::Io(_)
        ));
    }
}
