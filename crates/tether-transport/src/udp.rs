//! UDP transport implementation using tokio.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{Datagram, MAX_DATAGRAM_SIZE, Transport, TransportError, check_size};

/// Datagrams buffered between the receive task and the tick thread.
/// When the tick thread falls this far behind, new datagrams are dropped,
/// which is what the kernel would do anyway.
const INBOUND_QUEUE: usize = 4096;

/// First pause after a receive error that is not known to be harmless.
const RECV_BACKOFF_MIN: Duration = Duration::from_millis(10);
/// Longest pause between retries while the socket keeps failing.
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// A UDP [`Transport`].
///
/// Must be created inside a tokio runtime: the receive loop runs as a
/// spawned task. Sending is a synchronous `try_send_to`.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    inbound: mpsc::Receiver<Datagram>,
    recv_task: Option<JoinHandle<()>>,
}

impl UdpTransport {
    /// Binds a UDP socket and starts its receive task.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        let local_addr = socket.local_addr().map_err(TransportError::BindFailed)?;
        let socket = Arc::new(socket);

        let (tx, inbound) = mpsc::channel(INBOUND_QUEUE);
        let recv_task = tokio::spawn(recv_loop(Arc::clone(&socket), tx));

        tracing::info!(%local_addr, "UDP transport bound");
        Ok(Self {
            socket,
            local_addr,
            inbound,
            recv_task: Some(recv_task),
        })
    }
}

/// Errors a UDP receive can report without the socket being unwell.
fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        // An ICMP "port unreachable" from an earlier send surfaces as one
        // of these on some platforms. It says nothing about this socket.
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Exponential pause between receive retries while errors persist.
#[derive(Debug, Default)]
struct RecvBackoff {
    failures: u32,
}

impl RecvBackoff {
    /// Records one more failure and returns how long to wait.
    fn next_delay(&mut self) -> Duration {
        let delay = RECV_BACKOFF_MIN
            .saturating_mul(1 << self.failures.min(16))
            .min(RECV_BACKOFF_MAX);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    fn reset(&mut self) {
        self.failures = 0;
    }

    fn failures(&self) -> u32 {
        self.failures
    }
}

async fn recv_loop(socket: Arc<UdpSocket>, tx: mpsc::Sender<Datagram>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut backoff = RecvBackoff::default();
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                if backoff.failures() > 0 {
                    tracing::info!(failures = backoff.failures(), "UDP receive recovered");
                    backoff.reset();
                }
                let datagram = Datagram {
                    from,
                    data: Bytes::copy_from_slice(&buf[..len]),
                };
                match tx.try_send(datagram) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::trace!(%from, "inbound queue full, dropping datagram");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Err(e) if is_transient(e.kind()) => continue,
            Err(e) => {
                let delay = backoff.next_delay();
                if backoff.failures() == 1 {
                    tracing::warn!(error = %e, "UDP receive failed, backing off");
                } else {
                    tracing::debug!(error = %e, failures = backoff.failures(), ?delay, "UDP receive still failing");
                }
                if tx.is_closed() {
                    break;
                }
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send_to(&self, addr: SocketAddr, data: &[u8]) -> Result<(), TransportError> {
        if self.recv_task.is_none() {
            return Err(TransportError::Closed);
        }
        check_size(data)?;
        match self.socket.try_send_to(data, addr) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tracing::trace!(%addr, "socket send buffer full, dropping datagram");
                Ok(())
            }
            Err(e) => Err(TransportError::SendFailed(e)),
        }
    }

    fn try_recv(&mut self) -> Option<Datagram> {
        self.inbound.try_recv().ok()
    }

    fn close(&mut self) {
        if let Some(task) = self.recv_task.take() {
            task.abort();
            self.inbound.close();
            tracing::info!(local_addr = %self.local_addr, "UDP transport closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.recv_task.is_none()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
    }
}
