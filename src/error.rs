//! Error taxonomy for contract violations surfaced by the core.
//!
//! The core never panics on a happy, contract-respecting path; violations of its own
//! contracts (bad configuration, mismatched cache sizes) are returned as `SaxsError`
//! rather than recovered from.

use std::fmt;

/// Which class of contract violation occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaxsErrorKind {
    /// A configuration value is out of its valid domain (e.g. qmin >= qmax).
    InvalidConfiguration,
    /// Internal state that should never diverge has diverged (mismatched cache sizes,
    /// a replaced distribution with the wrong bin count, a poisoned mutex).
    InconsistentState,
    /// A rounded distance fell outside the allocated bin range. Only raised in
    /// debug builds; in release this is a silently-discarded contract violation per
    /// the padding guarantee of the compact coordinate store.
    OutOfRange,
}

impl fmt::Display for SaxsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidConfiguration => "invalid configuration",
            Self::InconsistentState => "inconsistent internal state",
            Self::OutOfRange => "distance out of bin range",
        };
        write!(f, "{s}")
    }
}

/// A fatal, fail-fast contract violation raised by the core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaxsError {
    pub kind: SaxsErrorKind,
    msg: String,
}

impl SaxsError {
    pub fn new(kind: SaxsErrorKind, msg: &str) -> Self {
        Self {
            kind,
            msg: msg.to_owned(),
        }
    }

    pub fn invalid_config(msg: &str) -> Self {
        Self::new(SaxsErrorKind::InvalidConfiguration, msg)
    }

    pub fn inconsistent_state(msg: &str) -> Self {
        Self::new(SaxsErrorKind::InconsistentState, msg)
    }

    pub fn out_of_range(msg: &str) -> Self {
        Self::new(SaxsErrorKind::OutOfRange, msg)
    }
}

impl fmt::Display for SaxsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}

impl std::error::Error for SaxsError {}

pub type SaxsResult<T> = Result<T, SaxsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_non_empty_for_each_kind() {
        let kinds = [
            SaxsErrorKind::InvalidConfiguration,
            SaxsErrorKind::InconsistentState,
            SaxsErrorKind::OutOfRange,
        ];
        for kind in kinds {
            let err = SaxsError::new(kind, "detail");
            let rendered = err.to_string();
            assert!(!rendered.is_empty());
            assert!(rendered.contains("detail"));
        }
    }

    #[test]
    fn invalid_config_helper_sets_kind() {
        let err = SaxsError::invalid_config("qmin >= qmax");
        assert_eq!(err.kind, SaxsErrorKind::InvalidConfiguration);
    }
}
