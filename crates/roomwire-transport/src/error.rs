/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer does not speak this protocol (bad URL, non-upgrade
    /// response, protocol violation during the opening handshake).
    #[error("incompatible endpoint: {0}")]
    Incompatible(String),

    /// The connect request itself could not be built.
    #[error("invalid connect request: {0}")]
    InvalidRequest(String),

    /// Establishing the connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The connection was closed without a close frame.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}

impl TransportError {
    /// Returns `true` if reconnecting may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Incompatible(_) | Self::InvalidRequest(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_incompatible_is_fatal() {
        assert!(!TransportError::Incompatible("http 404".into()).is_retryable());
        assert!(!TransportError::InvalidRequest("bad header".into()).is_retryable());
    }

    #[test]
    fn test_is_retryable_io_failures_are_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(TransportError::ReceiveFailed(io).is_retryable());
        assert!(TransportError::ConnectionClosed("eof".into()).is_retryable());
    }
}
