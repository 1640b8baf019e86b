//! Unified error types for the halo core library.
//!
//! The engine itself never fails fatally: radio errors degrade to "peer not
//! yet resolved" and are retried on the fixed cadences. [`HaloError`] covers
//! the failure modes that do surface to callers — configuration problems,
//! undecodable beacon payloads, and queries against an engine that has shut
//! down. Transport-level failures travel inside radio events as
//! [`TransportError`](crate::transport::TransportError) instead.

use std::path::PathBuf;

use thiserror::Error;

/// The unified error type for all halo operations.
#[derive(Debug, Error)]
pub enum HaloError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The configuration was parsed but contains invalid values.
    #[error("configuration validation failed for `{field}`: {message}")]
    ConfigValidation {
        /// The offending field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// A beacon characteristic payload was not valid UTF-8.
    #[error("beacon characteristic payload is not valid UTF-8")]
    IdentityNotUtf8,

    /// The engine actor has shut down and can no longer answer.
    #[error("beacon engine is no longer running")]
    EngineStopped,

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for halo operations.
pub type Result<T> = std::result::Result<T, HaloError>;

impl HaloError {
    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParse(_) | Self::ConfigValidation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_classification() {
        assert!(HaloError::ConfigNotFound(PathBuf::from("/tmp/halo.toml")).is_config_error());
        assert!(HaloError::ConfigParse("bad toml".into()).is_config_error());
        assert!(HaloError::ConfigValidation {
            field: "report_interval_ms",
            message: "must be greater than zero".into(),
        }
        .is_config_error());

        assert!(!HaloError::IdentityNotUtf8.is_config_error());
        assert!(!HaloError::EngineStopped.is_config_error());
    }

    #[test]
    fn display_messages_name_the_problem() {
        let err = HaloError::ConfigNotFound(PathBuf::from("/etc/halo/config.toml"));
        assert!(err.to_string().contains("/etc/halo/config.toml"));

        let err = HaloError::ConfigValidation {
            field: "local_name",
            message: "must not be empty".into(),
        };
        assert!(err.to_string().contains("local_name"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: HaloError = io.into();
        assert!(matches!(err, HaloError::Io(_)));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<HaloError>();
        assert_sync::<HaloError>();
    }
}
