//! In-process datagram network for tests.
//!
//! Every [`MemoryTransport`] bound on a [`MemoryNetwork`] gets a fake
//! `127.0.0.1:<port>` address and an inbound queue. Sends append to the
//! destination's queue immediately; nothing is delivered until the
//! destination polls. Between those two points a test can partition an
//! address, drop its queue, or reorder it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::seq::SliceRandom;

use crate::{Datagram, Transport, TransportError, check_size};

const FIRST_PORT: u16 = 40_000;

#[derive(Default)]
struct NetworkState {
    next_port: u16,
    queues: HashMap<SocketAddr, VecDeque<Datagram>>,
    partitioned: HashSet<SocketAddr>,
    sent: u64,
    dropped: u64,
}

/// A shared in-process network. Cloning yields another handle to the
/// same network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a transport on the next free port.
    pub fn bind(&self) -> MemoryTransport {
        let mut state = self.state.lock();
        let mut port = state.next_port.max(FIRST_PORT);
        while state.queues.contains_key(&loopback(port)) {
            port = port.wrapping_add(1).max(FIRST_PORT);
        }
        state.next_port = port.wrapping_add(1);
        self.attach(&mut state, loopback(port))
    }

    /// Binds a transport on a specific port.
    pub fn bind_port(&self, port: u16) -> Result<MemoryTransport, TransportError> {
        let mut state = self.state.lock();
        let addr = loopback(port);
        if state.queues.contains_key(&addr) {
            return Err(TransportError::BindFailed(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!("{addr} already bound"),
            )));
        }
        Ok(self.attach(&mut state, addr))
    }

    fn attach(&self, state: &mut NetworkState, addr: SocketAddr) -> MemoryTransport {
        state.queues.insert(addr, VecDeque::new());
        MemoryTransport {
            addr,
            network: self.clone(),
            closed: false,
        }
    }

    // =====================================================================
    // Fault injection
    // =====================================================================

    /// Cuts `addr` off: datagrams to or from it are silently dropped
    /// until [`heal`](Self::heal).
    pub fn partition(&self, addr: SocketAddr) {
        self.state.lock().partitioned.insert(addr);
    }

    pub fn heal(&self, addr: SocketAddr) {
        self.state.lock().partitioned.remove(&addr);
    }

    /// Discards everything queued for `addr`. Returns how many datagrams
    /// were lost.
    pub fn drop_pending(&self, addr: SocketAddr) -> usize {
        let mut state = self.state.lock();
        let lost = state.queues.get_mut(&addr).map_or(0, |q| {
            let n = q.len();
            q.clear();
            n
        });
        state.dropped += lost as u64;
        lost
    }

    /// Reverses the delivery order of everything queued for `addr`.
    pub fn reverse_pending(&self, addr: SocketAddr) {
        if let Some(q) = self.state.lock().queues.get_mut(&addr) {
            q.make_contiguous().reverse();
        }
    }

    /// Randomly permutes everything queued for `addr`.
    pub fn shuffle_pending(&self, addr: SocketAddr) {
        if let Some(q) = self.state.lock().queues.get_mut(&addr) {
            q.make_contiguous().shuffle(&mut rand::rng());
        }
    }

    /// Number of datagrams waiting for `addr`.
    pub fn pending(&self, addr: SocketAddr) -> usize {
        self.state.lock().queues.get(&addr).map_or(0, VecDeque::len)
    }

    /// Total datagrams accepted for delivery since the network was created.
    pub fn sent_count(&self) -> u64 {
        self.state.lock().sent
    }

    /// Total datagrams lost to partitions, unbound destinations, or
    /// [`drop_pending`](Self::drop_pending).
    pub fn dropped_count(&self) -> u64 {
        self.state.lock().dropped
    }

    fn deliver(&self, from: SocketAddr, to: SocketAddr, data: &[u8]) {
        let mut state = self.state.lock();
        if state.partitioned.contains(&from) || state.partitioned.contains(&to) {
            state.dropped += 1;
            return;
        }
        match state.queues.get_mut(&to) {
            Some(queue) => {
                queue.push_back(Datagram {
                    from,
                    data: Bytes::copy_from_slice(data),
                });
                state.sent += 1;
            }
            None => state.dropped += 1,
        }
    }

    fn pop(&self, addr: SocketAddr) -> Option<Datagram> {
        self.state.lock().queues.get_mut(&addr)?.pop_front()
    }

    fn detach(&self, addr: SocketAddr) {
        let mut state = self.state.lock();
        state.queues.remove(&addr);
        state.partitioned.remove(&addr);
    }
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// One endpoint on a [`MemoryNetwork`].
pub struct MemoryTransport {
    addr: SocketAddr,
    network: MemoryNetwork,
    closed: bool,
}

impl MemoryTransport {
    /// The network this transport is attached to.
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    fn send_to(&self, addr: SocketAddr, data: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        check_size(data)?;
        self.network.deliver(self.addr, addr, data);
        Ok(())
    }

    fn try_recv(&mut self) -> Option<Datagram> {
        if self.closed {
            return None;
        }
        self.network.pop(self.addr)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.network.detach(self.addr);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recv_all(t: &mut MemoryTransport) -> Vec<u8> {
        std::iter::from_fn(|| t.try_recv())
            .map(|d| d.data[0])
            .collect()
    }

    #[test]
    fn test_bind_assigns_distinct_addresses() {
        let net = MemoryNetwork::new();
        let a = net.bind();
        let b = net.bind();
        assert_ne!(a.local_addr(), b.local_addr());
        assert!(a.local_addr().ip().is_loopback());
    }

    #[test]
    fn test_bind_port_twice_fails() {
        let net = MemoryNetwork::new();
        let _a = net.bind_port(7777).unwrap();
        assert!(matches!(
            net.bind_port(7777),
            Err(TransportError::BindFailed(_))
        ));
    }

    #[test]
    fn test_send_to_delivers_in_order_with_source() {
        let net = MemoryNetwork::new();
        let a = net.bind();
        let mut b = net.bind();

        a.send_to(b.local_addr(), &[1]).unwrap();
        a.send_to(b.local_addr(), &[2]).unwrap();

        let first = b.try_recv().unwrap();
        assert_eq!(first.from, a.local_addr());
        assert_eq!(&first.data[..], &[1]);
        assert_eq!(&b.try_recv().unwrap().data[..], &[2]);
        assert!(b.try_recv().is_none());
    }

    #[test]
    fn test_send_to_unbound_address_is_silently_lost() {
        let net = MemoryNetwork::new();
        let a = net.bind();
        a.send_to(loopback(1), &[1]).unwrap();
        assert_eq!(net.dropped_count(), 1);
    }

    #[test]
    fn test_partition_drops_both_directions_until_heal() {
        let net = MemoryNetwork::new();
        let mut a = net.bind();
        let mut b = net.bind();

        net.partition(a.local_addr());
        a.send_to(b.local_addr(), &[1]).unwrap();
        b.send_to(a.local_addr(), &[2]).unwrap();
        assert!(a.try_recv().is_none());
        assert!(b.try_recv().is_none());

        net.heal(a.local_addr());
        a.send_to(b.local_addr(), &[3]).unwrap();
        assert_eq!(recv_all(&mut b), vec![3]);
    }

    #[test]
    fn test_reverse_pending_reverses_delivery_order() {
        let net = MemoryNetwork::new();
        let a = net.bind();
        let mut b = net.bind();
        for i in 1..=3 {
            a.send_to(b.local_addr(), &[i]).unwrap();
        }
        net.reverse_pending(b.local_addr());
        assert_eq!(recv_all(&mut b), vec![3, 2, 1]);
    }

    #[test]
    fn test_shuffle_pending_keeps_every_datagram() {
        let net = MemoryNetwork::new();
        let a = net.bind();
        let mut b = net.bind();
        for i in 0..20 {
            a.send_to(b.local_addr(), &[i]).unwrap();
        }
        net.shuffle_pending(b.local_addr());
        let mut got = recv_all(&mut b);
        got.sort_unstable();
        assert_eq!(got, (0..20).collect::<Vec<u8>>());
    }

    #[test]
    fn test_drop_pending_empties_queue() {
        let net = MemoryNetwork::new();
        let a = net.bind();
        let mut b = net.bind();
        a.send_to(b.local_addr(), &[1]).unwrap();
        a.send_to(b.local_addr(), &[2]).unwrap();
        assert_eq!(net.pending(b.local_addr()), 2);
        assert_eq!(net.drop_pending(b.local_addr()), 2);
        assert!(b.try_recv().is_none());
    }

    #[test]
    fn test_close_rejects_sends_and_frees_address() {
        let net = MemoryNetwork::new();
        let mut a = net.bind_port(9000).unwrap();
        a.close();
        assert!(a.is_closed());
        assert!(matches!(
            a.send_to(loopback(1), &[1]),
            Err(TransportError::Closed)
        ));
        assert!(net.bind_port(9000).is_ok());
    }

    #[test]
    fn test_drop_detaches_from_network() {
        let net = MemoryNetwork::new();
        let a = net.bind();
        let b = net.bind();
        let b_addr = b.local_addr();
        drop(b);
        a.send_to(b_addr, &[1]).unwrap();
        assert_eq!(net.pending(b_addr), 0);
        assert_eq!(net.dropped_count(), 1);
    }
}
