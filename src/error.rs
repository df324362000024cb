use thiserror::Error;

/// Failure while decoding a build or anim file. Decoding is all-or-nothing,
/// so any of these aborts the whole call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("bad magic: expected {expected:?}, found {found:?}")]
    BadMagic { expected: String, found: String },

    #[error("unsupported version: expected {expected}, found {found}")]
    UnsupportedVersion { expected: u32, found: u32 },

    #[error("truncated input: needed {needed} bytes at offset {offset}, {remaining} left")]
    TruncatedInput {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("{0} trailing bytes after end of data")]
    TrailingData(usize),

    #[error("string at offset {0} is not valid UTF-8")]
    InvalidString(usize),
}
