use code_index_shared::{ErrorCode, ErrorEnvelope, ErrorKind};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    CompletedWithFailures = 1,
    InvalidInput = 2,
    Runtime = 3,
    Cancelled = 130,
}

impl ExitCode {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Exit code for an error that ended a command.
    pub fn for_error(error: &ErrorEnvelope) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else if is_input_error(error) {
            Self::InvalidInput
        } else {
            Self::Runtime
        }
    }
}

fn is_input_error(error: &ErrorEnvelope) -> bool {
    error.kind == ErrorKind::Expected
        && (error.code == ErrorCode::invalid_input()
            || matches!(error.code.namespace(), "config" | "workspace"))
}

#[derive(Debug)]
pub enum CliError {
    Command(ErrorEnvelope),
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl CliError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Command(error) => ExitCode::for_error(error),
            Self::Io(_) | Self::Serialization(_) => ExitCode::Runtime,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(error) => write!(formatter, "{}: {}", error.code, error.message),
            Self::Io(error) => write!(formatter, "io error: {error}"),
            Self::Serialization(error) => write!(formatter, "serialization error: {error}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ErrorEnvelope> for CliError {
    fn from(error: ErrorEnvelope) -> Self {
        Self::Command(error.redacted())
    }
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_index_shared::ErrorClass;

    #[test]
    fn errors_map_to_exit_codes() {
        let cases = [
            (ErrorEnvelope::cancelled("interrupted"), ExitCode::Cancelled),
            (
                ErrorEnvelope::expected(ErrorCode::new("config", "invalid_toml"), "bad toml"),
                ExitCode::InvalidInput,
            ),
            (
                ErrorEnvelope::expected(ErrorCode::invalid_input(), "empty query"),
                ExitCode::InvalidInput,
            ),
            (
                ErrorEnvelope::unexpected(
                    ErrorCode::new("vector", "unavailable"),
                    "connection refused",
                    ErrorClass::Retriable,
                ),
                ExitCode::Runtime,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ExitCode::for_error(&error), expected, "{}", error.code);
        }
    }
}
