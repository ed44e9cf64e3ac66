//! # Fatal errors
//!
//! Most problems a user's source can have are reported as
//! [`crate::diagnostics::Diagnostic`] records so that `check`/`compile` can
//! collect every issue in one pass (`spec.md` §7). `CoreError` is reserved for
//! the much smaller set of conditions that prevent the pipeline from
//! producing *any* result at all — not "your score is wrong" but "the
//! compiler cannot proceed". Modeled after the teacher's `GenError`: a flat
//! `thiserror` enum with one variant per condition.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The entry module path could not be resolved to itself (e.g. empty path).
    #[error("invalid entry path: {0}")]
    InvalidEntryPath(String),

    /// A recursion or iteration bound configured in [`crate::CompilerOptions`]
    /// was itself invalid (e.g. zero).
    #[error("invalid compiler option: {0}")]
    InvalidOption(String),

    /// Internal invariant violation. Reaching this means the compiler itself
    /// has a bug; it is never produced by user source alone.
    #[error("internal compiler error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        let e = CoreError::InvalidEntryPath("".into());
        assert_eq!(e.to_string(), "invalid entry path: ");
    }
}
