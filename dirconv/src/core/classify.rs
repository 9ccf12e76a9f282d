//! Map batch outcomes onto stable exit codes.

use crate::core::types::{DirOutcome, DirStatus};
use crate::exit_codes;

/// Classify a finished batch.
///
/// Failures dominate; a batch where nothing was ready is `EMPTY`.
pub fn batch_exit_code(outcomes: &[DirOutcome]) -> i32 {
    if outcomes.iter().any(|outcome| outcome.status.is_failure()) {
        return exit_codes::PARTIAL;
    }
    if outcomes
        .iter()
        .all(|outcome| outcome.status == DirStatus::Skipped)
    {
        return exit_codes::EMPTY;
    }
    exit_codes::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: DirStatus) -> DirOutcome {
        DirOutcome::new("dir", status)
    }

    #[test]
    fn ok_when_all_converted_or_skipped() {
        let outcomes = vec![outcome(DirStatus::Converted), outcome(DirStatus::Skipped)];
        assert_eq!(batch_exit_code(&outcomes), exit_codes::OK);
    }

    #[test]
    fn partial_when_any_failure() {
        let outcomes = vec![outcome(DirStatus::Converted), outcome(DirStatus::NoOutput)];
        assert_eq!(batch_exit_code(&outcomes), exit_codes::PARTIAL);
    }

    #[test]
    fn empty_when_nothing_ready() {
        assert_eq!(batch_exit_code(&[]), exit_codes::EMPTY);
        let outcomes = vec![outcome(DirStatus::Skipped)];
        assert_eq!(batch_exit_code(&outcomes), exit_codes::EMPTY);
    }
}
