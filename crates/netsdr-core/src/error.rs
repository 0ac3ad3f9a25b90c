//! Error types for the netsdr driver.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! streaming errors are all captured here.

/// The error type for all netsdr operations.
///
/// Variants cover the failure modes of a networked receiver: the control
/// connection could not be established, a command/response exchange failed,
/// a frame arrived damaged, or a requested operation is outside what the
/// unit supports.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The control connection could not be established.
    ///
    /// Fatal to the source instance until a reconnect is attempted.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A command/response exchange failed (socket error mid-transaction or
    /// a discarded response). The control connection remains usable; the
    /// caller may retry or treat the parameter as unchanged.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// A control frame's length prefix disagreed with the bytes on the
    /// wire, or the frame was truncated below the header size.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A control frame carried an item code outside the recognized set.
    #[error("unknown control item: 0x{0:04X}")]
    UnknownOpcode(u16),

    /// The unit NAK'd the request: the item or value is not supported
    /// by this hardware.
    #[error("unsupported by device: {0}")]
    Unsupported(String),

    /// An invalid parameter was passed to a driver call (bad channel
    /// index, unknown gain stage, unknown antenna name).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No control connection has been established.
    #[error("not connected")]
    NotConnected,

    /// The control connection was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The sample stream was stopped while a pull was outstanding.
    #[error("stream closed")]
    StreamClosed,

    /// Timed out waiting for a response or a datagram.
    #[error("timeout waiting for response")]
    Timeout,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_connect() {
        let e = Error::Connect("connection refused".into());
        assert_eq!(e.to_string(), "connect failed: connection refused");
    }

    #[test]
    fn error_display_transaction() {
        let e = Error::Transaction("short write".into());
        assert_eq!(e.to_string(), "transaction failed: short write");
    }

    #[test]
    fn error_display_malformed_frame() {
        let e = Error::MalformedFrame("length prefix 12, buffer 9".into());
        assert_eq!(e.to_string(), "malformed frame: length prefix 12, buffer 9");
    }

    #[test]
    fn error_display_unknown_opcode() {
        let e = Error::UnknownOpcode(0x0BAD);
        assert_eq!(e.to_string(), "unknown control item: 0x0BAD");
    }

    #[test]
    fn error_display_unsupported() {
        let e = Error::Unsupported("10 MHz bandwidth".into());
        assert_eq!(e.to_string(), "unsupported by device: 10 MHz bandwidth");
    }

    #[test]
    fn error_display_timeout() {
        let e = Error::Timeout;
        assert_eq!(e.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
