//! Error types for voyager-link

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Recv(String),

    #[error("stream closed by remote")]
    StreamClosed,

    #[error("reconnect attempts exhausted after {attempts} retries")]
    AttemptsExhausted { attempts: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LinkError {
    /// Whether the session state machine may absorb this error and retry.
    /// Only `AttemptsExhausted` escapes the retry loop.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            LinkError::AttemptsExhausted { .. } | LinkError::Config(_) | LinkError::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_faults_are_recoverable() {
        assert!(LinkError::Connect("refused".into()).is_recoverable());
        assert!(LinkError::Send("broken pipe".into()).is_recoverable());
        assert!(LinkError::Recv("reset".into()).is_recoverable());
        assert!(LinkError::StreamClosed.is_recoverable());
    }

    #[test]
    fn exhaustion_is_terminal() {
        assert!(!LinkError::AttemptsExhausted { attempts: 5 }.is_recoverable());
    }
}
