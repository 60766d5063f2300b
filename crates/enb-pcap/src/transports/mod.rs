pub mod udp;

/// Datagram transport used by the capture writer.
///
/// Only unreliable delivery is needed: a capture stream may have gaps, so a
/// failed send is reported once and never retried.
pub trait NetworkTransport: Send {
    /// Connect or reconnect the transport. Destroys any existing connection.
    fn connect(&mut self) -> Result<(), NetworkError>;

    /// Release the socket. Sending afterwards reconnects.
    fn close(&mut self);

    fn is_connected(&self) -> bool;

    /// Send one datagram, failing if it did not leave whole
    fn send_unreliable(&mut self, payload: &[u8]) -> Result<(), NetworkError>;
}

/// Network address abstraction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NetworkAddress {
    Udp { host: String, port: u16 },
}

/// Network-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    ConnectionFailed(String),
    SendFailed(String),
    /// Datagram left the socket truncated
    ShortSend { expected: usize, sent: usize },
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            NetworkError::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            NetworkError::ShortSend { expected, sent } => {
                write!(f, "Sending UDP packet mismatches {} != {}", expected, sent)
            }
        }
    }
}

impl std::error::Error for NetworkError {}
