use thiserror::Error;

/// Errors that change how the process behaves, per failure class.
///
/// Configuration and session errors are fatal (exit code 1). Everything that
/// happens per message (send failure, enrichment failure, parse failure) is
/// logged and recovered locally, so those paths carry `anyhow::Error` instead
/// of a variant here. Store persistence failures degrade to in-memory dedup
/// and are also only logged.
#[derive(Error, Debug)]
pub enum RelayError {
    /// A required configuration value is absent or empty.
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    /// A profile pattern from the registry failed to compile.
    #[error("invalid pattern {pattern:?} in profile '{profile}': {source}")]
    InvalidProfile {
        profile: String,
        pattern: String,
        source: regex::Error,
    },

    /// Mailbox connect, auth, or protocol failure. Fatal for the run.
    #[error("mailbox session error: {0}")]
    Session(String),
}
