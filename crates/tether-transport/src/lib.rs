//! Transport abstraction layer for Tether.
//!
//! Provides the [`Transport`] trait: a non-blocking datagram socket that
//! the session layer polls once per tick. Implementations:
//!
//! - [`UdpTransport`]: a tokio UDP socket. A background task receives
//!   datagrams and hands them to the tick thread through a channel, so
//!   `try_recv` never touches the socket.
//! - [`MemoryNetwork`] / [`MemoryTransport`]: an in-process network with
//!   fault injection (partitions, loss, reordering) for tests.

mod error;
mod memory;
mod udp;

pub use error::TransportError;
pub use memory::{MemoryNetwork, MemoryTransport};
pub use udp::UdpTransport;

use std::net::SocketAddr;

use bytes::Bytes;

/// Largest datagram any transport will carry.
pub const MAX_DATAGRAM_SIZE: usize = 1472;

/// One received datagram and the address it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub from: SocketAddr,
    pub data: Bytes,
}

/// A connectionless, unreliable, poll-driven datagram endpoint.
///
/// None of these methods block or suspend. Everything reliability-related
/// (acks, ordering, retransmission) is built above this trait.
pub trait Transport: Send + 'static {
    /// The address peers should send to.
    fn local_addr(&self) -> SocketAddr;

    /// Sends one datagram. Success means "handed off", not "delivered".
    fn send_to(&self, addr: SocketAddr, data: &[u8]) -> Result<(), TransportError>;

    /// Returns the next received datagram, if one is waiting.
    fn try_recv(&mut self) -> Option<Datagram>;

    /// Stops receiving. Later sends fail with [`TransportError::Closed`].
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

pub(crate) fn check_size(data: &[u8]) -> Result<(), TransportError> {
    if data.len() > MAX_DATAGRAM_SIZE {
        return Err(TransportError::DatagramTooLarge {
            size: data.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_size_accepts_max() {
        assert!(check_size(&[0u8; MAX_DATAGRAM_SIZE]).is_ok());
    }

    #[test]
    fn test_check_size_rejects_oversized() {
        let err = check_size(&[0u8; MAX_DATAGRAM_SIZE + 1]).unwrap_err();
        assert!(matches!(err, TransportError::DatagramTooLarge { .. }));
    }
}
