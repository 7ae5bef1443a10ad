//! Optimistic concurrency expectations for versioned rows.

use crate::error::{DomainError, DomainResult};

/// What a writer expects to find when it commits against a versioned row.
///
/// Versions start at 1 when a row is first written; a row that was never
/// written has no version at all.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The row must not exist yet.
    Absent,
    /// The row must exist at exactly this version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation derived from a read: `None` means the row was absent.
    pub fn from_read(version: Option<u64>) -> Self {
        match version {
            Some(v) => ExpectedVersion::Exact(v),
            None => ExpectedVersion::Absent,
        }
    }

    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Absent, None) => true,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            _ => false,
        }
    }

    pub fn check(self, actual: Option<u64>) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual:?})"
            )))
        }
    }

    /// Version the row will carry once a write under this expectation commits.
    pub fn next(self) -> u64 {
        match self {
            ExpectedVersion::Absent => 1,
            ExpectedVersion::Exact(v) => v + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_matches_only_missing_rows() {
        assert!(ExpectedVersion::Absent.matches(None));
        assert!(!ExpectedVersion::Absent.matches(Some(1)));
    }

    #[test]
    fn exact_rejects_stale_versions() {
        assert!(ExpectedVersion::Exact(3).matches(Some(3)));
        assert!(!ExpectedVersion::Exact(3).matches(Some(4)));
        assert!(!ExpectedVersion::Exact(3).matches(None));
        assert!(matches!(
            ExpectedVersion::Exact(3).check(Some(4)),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn next_version_starts_at_one() {
        assert_eq!(ExpectedVersion::Absent.next(), 1);
        assert_eq!(ExpectedVersion::Exact(7).next(), 8);
        assert_eq!(ExpectedVersion::from_read(Some(2)), ExpectedVersion::Exact(2));
    }
}
