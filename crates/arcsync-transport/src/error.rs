/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel was closed, or the transport is unreachable.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Opening the underlying connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The channel refused or failed the subscription handshake.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The channel was unsubscribed and can't be used any more.
    #[error("channel shut down")]
    Shutdown,
}
