use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown status '{literal}'")]
    UnknownStatus { literal: String },

    #[error("Transition to '{status}' is missing required fields: {}", missing.join(", "))]
    MissingSupplement {
        status: String,
        missing: Vec<&'static str>,
    },

    #[error("Customer '{customer_id}' not found")]
    CustomerNotFound { customer_id: String },

    #[error("Customer '{customer_id}' already exists")]
    CustomerExists { customer_id: String },

    #[error("Status mismatch on '{customer_id}': expected '{expected}', stored '{actual}'")]
    StatusMismatch {
        customer_id: String,
        expected: String,
        actual: String,
    },

    #[error("Version conflict on '{customer_id}': expected {expected}, stored {actual}")]
    VersionConflict {
        customer_id: String,
        expected: i64,
        actual: i64,
    },

    #[error("Manager '{manager_id}' is not in the staff directory")]
    UnknownManager { manager_id: String },

    #[error("Manager '{manager_id}' does not belong to team '{team_id}'")]
    TeamMismatch { manager_id: String, team_id: String },

    #[error("Invalid period: {reason}")]
    InvalidPeriod { reason: String },

    #[error("Corrupt row in '{table}': {detail}")]
    CorruptRow { table: &'static str, detail: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CrmResult<T> = Result<T, CrmError>;
