//! Error types for the replica retirement job.
//!
//! Every failure in the job propagates unchanged to the process boundary, so
//! this enum is the full taxonomy a caller can observe.

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Errors that can occur while retiring geodatabase replicas.
///
/// None of these are recovered from inside the job. A failure at any step
/// aborts the run and no retirement report is produced.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required setting is missing or a setting has an invalid value.
    ///
    /// This error is returned when the settings file cannot be read or parsed,
    /// when a required key is absent from its section, or when a value such as
    /// the replica count cannot be interpreted.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input was supplied when building the database connection string.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A database operation failed.
    ///
    /// This covers connectivity problems, SQL errors, permission denials and
    /// reading from a staging table that does not exist on the connection.
    #[error("Database error: {0}")]
    Database(String),

    /// The geodatabase administration call failed for a replica.
    ///
    /// Replicas unregistered before this failure stay unregistered.
    #[error("Failed to unregister replica {replica_id}: {message}")]
    Administration { replica_id: String, message: String },
}

/// Result type alias for replica retirement operations.
pub type Result<T> = std::result::Result<T, Error>;
