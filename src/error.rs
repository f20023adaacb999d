use thiserror::Error;

#[derive(Debug, Error)]
pub enum VicesError {
    #[error("No authenticated user session found")]
    AuthenticationMissing,

    #[error("Unauthorized: {0}")]
    AuthorizationMismatch(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("goal must be a positive number of days, got {0}")]
    InvalidGoal(i64),

    #[error("invalid {table} row {id}: {reason}")]
    InvalidRow {
        table: &'static str,
        id: i64,
        reason: String,
    },

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("An account with email {0} already exists")]
    EmailTaken(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("{0}")]
    External(String),
}

impl VicesError {
    /// Wraps a collaborator failure, keeping its message verbatim.
    pub fn external(error: anyhow::Error) -> Self {
        Self::External(format!("{error:#}"))
    }
}
