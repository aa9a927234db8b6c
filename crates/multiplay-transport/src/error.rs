/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link was closed, either by us or by the peer.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Establishing an outgoing link failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The link needs a Tokio runtime and none is running on this thread.
    #[error("no tokio runtime available to drive the link")]
    NoRuntime,

    /// `connect` was called on a link that is already connecting or connected.
    #[error("link already started")]
    AlreadyStarted,
}
