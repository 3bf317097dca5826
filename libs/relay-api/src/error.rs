use std::fmt;

/// Error kind for broker errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Broker unreachable, session lost, subscribe rejected.
    Connection,
    /// Broker rejected or timed out a send.
    Publish,
    /// Payload could not be encoded or decoded.
    Format,
    /// Invalid client configuration.
    Config,
    /// Invalid state (e.g. send before connect).
    Logic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Connection => f.write_str("connection"),
            ErrorKind::Publish => f.write_str("publish"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Logic => f.write_str("logic"),
        }
    }
}

/// Error returned by every broker trait method.
///
/// The kind lets callers decide between escalation (connection errors go
/// through the consumer's failure policy) and local recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerError {
    kind: ErrorKind,
    message: String,
}

impl BrokerError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Connection, message: msg.into() }
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Publish, message: msg.into() }
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn logic(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Logic, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for BrokerError {}

// ---------------------------------------------------------------------------
// From impls: standard error types → BrokerError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<std::io::Error> for BrokerError {
    fn from(e: std::io::Error) -> Self {
        Self::connection(e.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        Self::format(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_prepended_and_kind_kept() {
        let err = BrokerError::connection("refused").with_context("topic 'db-changes'");
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.message(), "topic 'db-changes': refused");
        assert_eq!(err.to_string(), "connection: topic 'db-changes': refused");
    }

    #[test]
    fn json_errors_are_format_errors() {
        let json_err = serde_json::from_str::<serde_json::Value>("not-json").unwrap_err();
        let err = BrokerError::from(json_err);
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
