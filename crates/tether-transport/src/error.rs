/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the local socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Handing a datagram to the OS failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// The datagram does not fit in a single packet.
    #[error("datagram too large: {size} bytes (max {max})")]
    DatagramTooLarge { size: usize, max: usize },

    /// The transport was closed.
    #[error("transport closed")]
    Closed,
}
