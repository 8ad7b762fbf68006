// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// Narrow, serialisable error kinds at the seams between components. Ad hoc
// fallible plumbing inside a single module (file I/O, JSON parsing) still
// uses `anyhow::Result` with `.context()`; this enum is for errors that cross
// a component boundary and need to be matched on by a caller (the Trade
// Manager deciding whether to retry, the operator surface deciding what to
// report).

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("exchange error {code}: {message}")]
    Exchange { code: String, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("risk abort: {0}")]
    RiskAbort(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("internal timeout: {0}")]
    InternalTimeout(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,

    #[error("authorize timed out")]
    Timeout,

    #[error("authorize transport failure: {0}")]
    TransportFailure(String),
}

impl AuthError {
    /// `InvalidToken` is fatal for the account that produced it — no retry,
    /// fall back to an alternate token if one is configured. Every other
    /// auth failure is retried up to a bounded count by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthError::InvalidToken)
    }
}

impl EngineError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn risk_abort(msg: impl Into<String>) -> Self {
        Self::RiskAbort(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Whether this error is retryable by the generic backoff policy, as
    /// opposed to terminal for the current session/connection.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Transport(_) => true,
            EngineError::Auth(e) => !e.is_fatal(),
            EngineError::Exchange { .. } => true,
            EngineError::Config(_) => false,
            EngineError::RiskAbort(_) => false,
            EngineError::Integrity(_) => false,
            EngineError::InternalTimeout(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_token_is_fatal() {
        assert!(AuthError::InvalidToken.is_fatal());
        assert!(!AuthError::Timeout.is_fatal());
    }

    #[test]
    fn config_and_risk_errors_are_not_retryable() {
        assert!(!EngineError::config("bad duration").is_retryable());
        assert!(!EngineError::risk_abort("daily cap reached").is_retryable());
        assert!(!EngineError::integrity("corrupt recovery record").is_retryable());
    }

    #[test]
    fn transport_and_exchange_errors_are_retryable() {
        assert!(EngineError::transport("socket closed").is_retryable());
        assert!(EngineError::Exchange {
            code: "RateLimit".into(),
            message: "too many requests".into()
        }
        .is_retryable());
    }

    #[test]
    fn fatal_auth_error_is_not_retryable() {
        let err = EngineError::Auth(AuthError::InvalidToken);
        assert!(!err.is_retryable());
    }
}
