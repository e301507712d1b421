use thiserror::Error;

use crate::entity::{CertificationId, PeriodId, UserId};

#[derive(Error, Debug)]
pub enum RecertError {
    /// A date field violates the period ordering invariants. The message names
    /// the offending field pair; callers must not retry with the same input.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("certification not found: {0}")]
    CertificationNotFound(CertificationId),

    #[error("period not found: {0}")]
    PeriodNotFound(PeriodId),

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("no assignment for user {user} in certification {certification}")]
    AssignmentNotFound {
        certification: CertificationId,
        user: UserId,
    },

    #[error("no open period for user {user} on program {program}")]
    NoOpenPeriod { user: UserId, program: String },

    #[error("certificate revocation failed: {0}")]
    Certificate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
