use thiserror::Error;

use crate::domain::{InvalidMember, InvalidPaymentAmount, MemberId};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("'{reference}' matches {count} members, use the member ID instead")]
    AmbiguousMember { reference: String, count: usize },

    #[error("Invalid member: {0}")]
    InvalidMember(#[from] InvalidMember),

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] InvalidPaymentAmount),

    #[error("Import failed: {0}")]
    ImportFormat(String),

    #[error("Nothing to export: {0}")]
    NothingToExport(String),

    #[error("Member {member_id} is being updated concurrently (gave up after {attempts} attempts)")]
    ConcurrentUpdate { member_id: MemberId, attempts: u32 },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the failure was the store's rather than the data's.
    ///
    /// Callers may retry these with backoff. Ledger mutations are not
    /// idempotent, so retrying after an ambiguous commit can double-apply.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ConcurrentUpdate { .. } | AppError::Database(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::PaymentAmount;

    #[test]
    fn test_retryable_classification() {
        assert!(!AppError::MemberNotFound("x".into()).is_retryable());
        assert!(!AppError::ImportFormat("no students".into()).is_retryable());

        let invalid = PaymentAmount::new(100).unwrap_err();
        assert!(!AppError::from(invalid).is_retryable());

        assert!(
            AppError::ConcurrentUpdate {
                member_id: Uuid::new_v4(),
                attempts: 3
            }
            .is_retryable()
        );
        assert!(AppError::Database(anyhow::anyhow!("disk I/O error")).is_retryable());
    }
}
