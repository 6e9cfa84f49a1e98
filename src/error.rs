// src/error.rs
//
// Router-facing error taxonomy. Every variant maps onto one of the
// screaming-snake-case `error_code` tags the command router echoes back
// over the wire; the `Display` text is always a sentence ending in a period.

use std::fmt;

#[derive(Debug, Clone)]
pub enum EngineError {
    Parse(String),
    UnknownCommand(String),
    MissingParameter(String),
    InvalidParameter(String),
    EngineNotFound(String),
    WrongEngineType(String),
    ExecutionFailed(String),
    InvariantFail(String),
    Internal(String),
}

impl EngineError {
    pub fn unknown_command(cmd: &str) -> Self {
        Self::UnknownCommand(format!("Unknown command '{}'.", cmd))
    }

    pub fn missing_parameter(name: &str) -> Self {
        Self::MissingParameter(format!("Missing required parameter '{}'.", name))
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(Self::terminate(msg.into()))
    }

    pub fn engine_not_found(id: &str) -> Self {
        Self::EngineNotFound(format!("No engine with id '{}' exists.", id))
    }

    pub fn wrong_engine_type(id: &str, expected: &str) -> Self {
        Self::WrongEngineType(format!(
            "Engine '{}' is not a '{}' engine.",
            id, expected
        ))
    }

    pub fn execution_failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(Self::terminate(msg.into()))
    }

    pub fn invariant_fail(msg: impl Into<String>) -> Self {
        Self::InvariantFail(Self::terminate(msg.into()))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(Self::terminate(msg.into()))
    }

    fn terminate(mut s: String) -> String {
        if !s.ends_with('.') {
            s.push('.');
        }
        s
    }

    /// The screaming-snake-case tag surfaced in the JSON envelope's `error_code`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "PARSE_ERROR",
            Self::UnknownCommand(_) => "UNKNOWN_COMMAND",
            Self::MissingParameter(_) => "MISSING_PARAMETER",
            Self::InvalidParameter(_) => "INVALID_PARAMETER",
            Self::EngineNotFound(_) => "ENGINE_NOT_FOUND",
            Self::WrongEngineType(_) => "WRONG_ENGINE_TYPE",
            Self::ExecutionFailed(_) => "EXECUTION_FAILED",
            Self::InvariantFail(_) => "INVARIANT_FAIL",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Parse(m)
            | Self::UnknownCommand(m)
            | Self::MissingParameter(m)
            | Self::InvalidParameter(m)
            | Self::EngineNotFound(m)
            | Self::WrongEngineType(m)
            | Self::ExecutionFailed(m)
            | Self::InvariantFail(m)
            | Self::Internal(m) => m,
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for EngineError {}

/// Converts a context-carrying internal failure into a client-facing `Internal` error,
/// preserving the chain via `anyhow`'s `Display`.
impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::internal(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_terminated_sentences() {
        let e = EngineError::invalid_parameter("R_c must be positive");
        assert!(e.to_string().ends_with('.'));
        assert_eq!(e.code(), "INVALID_PARAMETER");
    }

    #[test]
    fn codes_are_screaming_snake_case() {
        assert_eq!(EngineError::engine_not_found("engine_001").code(), "ENGINE_NOT_FOUND");
        assert_eq!(
            EngineError::wrong_engine_type("engine_001", "sid_ternary").code(),
            "WRONG_ENGINE_TYPE"
        );
    }
}
