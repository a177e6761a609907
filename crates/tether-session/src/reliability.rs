//! Reliable, ordered delivery on top of an unreliable datagram transport.
//!
//! Each direction of a session numbers its reliable frames with a wrapping
//! `u16` sequence. The sender keeps every frame until the matching `Ack`
//! arrives and retransmits on a fixed interval. The receiver acks every
//! reliable frame it sees (duplicates included, since the earlier ack may
//! have been lost) and releases envelopes strictly in sequence order.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bytes::Bytes;

use crate::Frame;

/// Reliable frames a sender may have unacknowledged at once. Well below
/// half the sequence space, so wrapping comparisons stay unambiguous.
pub const MAX_IN_FLIGHT: usize = 1024;

/// `true` if `a` comes after `b` in wrapping sequence order.
pub fn seq_newer(a: u16, b: u16) -> bool {
    a != b && a.wrapping_sub(b) < 0x8000
}

#[derive(Debug)]
struct PendingFrame {
    seq: u16,
    encoded: Bytes,
    last_sent: Duration,
    resends: u32,
}

/// What the receiver did with an incoming reliable frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Received {
    /// Envelopes now deliverable, in order. May be more than one when the
    /// frame fills a gap in front of buffered arrivals.
    Deliver(Vec<Bytes>),
    /// Arrived ahead of a gap; held until the gap fills.
    Buffered,
    /// Already delivered (or already buffered); dropped.
    Duplicate,
}

/// Retransmission budget ran out for the oldest unacked frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitExhausted {
    pub seq: u16,
}

/// Sender and receiver state for one session's reliable stream.
#[derive(Debug, Default)]
pub struct ReliableChannel {
    next_send_seq: u16,
    pending: VecDeque<PendingFrame>,
    next_recv_seq: u16,
    out_of_order: HashMap<u16, Bytes>,
}

impl ReliableChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames sent but not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Assigns the next sequence number and returns the encoded frame to
    /// transmit now. The frame stays queued until acked.
    pub fn send(&mut self, envelope: Bytes, now: Duration) -> Option<Bytes> {
        if self.pending.len() >= MAX_IN_FLIGHT {
            return None;
        }
        let seq = self.next_send_seq;
        self.next_send_seq = seq.wrapping_add(1);

        let encoded = Frame::Reliable { seq, envelope }.encode();
        self.pending.push_back(PendingFrame {
            seq,
            encoded: encoded.clone(),
            last_sent: now,
            resends: 0,
        });
        Some(encoded)
    }

    /// Drops the frame with this sequence number from the resend queue.
    /// Returns `false` for unknown or already-acked sequences.
    pub fn ack(&mut self, seq: u16) -> bool {
        match self.pending.iter().position(|p| p.seq == seq) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    /// Processes an incoming reliable frame. The caller acks `seq`
    /// regardless of the outcome.
    pub fn receive(&mut self, seq: u16, envelope: Bytes) -> Received {
        if seq == self.next_recv_seq {
            let mut ready = vec![envelope];
            self.next_recv_seq = self.next_recv_seq.wrapping_add(1);
            while let Some(next) = self.out_of_order.remove(&self.next_recv_seq) {
                ready.push(next);
                self.next_recv_seq = self.next_recv_seq.wrapping_add(1);
            }
            return Received::Deliver(ready);
        }

        if !seq_newer(seq, self.next_recv_seq) {
            return Received::Duplicate;
        }

        // Beyond the sender's window means a stale frame from the far side
        // of a wrap, not a future one.
        if usize::from(seq.wrapping_sub(self.next_recv_seq)) >= MAX_IN_FLIGHT {
            return Received::Duplicate;
        }

        if self.out_of_order.contains_key(&seq) {
            return Received::Duplicate;
        }
        self.out_of_order.insert(seq, envelope);
        Received::Buffered
    }

    /// Returns every pending frame whose resend interval has elapsed,
    /// marking each as sent again.
    ///
    /// Fails when any frame has already been retransmitted `max_resends`
    /// times without an ack.
    pub fn due_resends(
        &mut self,
        now: Duration,
        interval: Duration,
        max_resends: u32,
    ) -> Result<Vec<Bytes>, RetransmitExhausted> {
        let mut due = Vec::new();
        for pending in &mut self.pending {
            if now.saturating_sub(pending.last_sent) < interval {
                continue;
            }
            if pending.resends >= max_resends {
                return Err(RetransmitExhausted { seq: pending.seq });
            }
            pending.resends += 1;
            pending.last_sent = now;
            due.push(pending.encoded.clone());
        }
        Ok(due)
    }

    /// Every unacked frame, oldest first. Used for the best-effort flush
    /// on graceful disconnect.
    pub fn unacked(&self) -> impl Iterator<Item = &Bytes> {
        self.pending.iter().map(|p| &p.encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn env(n: u8) -> Bytes {
        Bytes::from(vec![n, 0])
    }

    // =====================================================================
    // Sequence comparison
    // =====================================================================

    #[test]
    fn test_seq_newer_simple() {
        assert!(seq_newer(2, 1));
        assert!(!seq_newer(1, 2));
        assert!(!seq_newer(5, 5));
    }

    #[test]
    fn test_seq_newer_across_wrap() {
        assert!(seq_newer(0, u16::MAX));
        assert!(seq_newer(3, 65_530));
        assert!(!seq_newer(65_530, 3));
    }

    // =====================================================================
    // Sending
    // =====================================================================

    #[test]
    fn test_send_assigns_increasing_sequences() {
        let mut ch = ReliableChannel::new();
        let a = ch.send(env(1), Duration::ZERO).unwrap();
        let b = ch.send(env(2), Duration::ZERO).unwrap();
        assert_eq!(
            Frame::decode(a).unwrap(),
            Frame::Reliable {
                seq: 0,
                envelope: env(1)
            }
        );
        assert!(matches!(Frame::decode(b).unwrap(), Frame::Reliable { seq: 1, .. }));
        assert_eq!(ch.in_flight(), 2);
    }

    #[test]
    fn test_send_full_window_returns_none() {
        let mut ch = ReliableChannel::new();
        for _ in 0..MAX_IN_FLIGHT {
            assert!(ch.send(env(0), Duration::ZERO).is_some());
        }
        assert!(ch.send(env(0), Duration::ZERO).is_none());
    }

    #[test]
    fn test_ack_removes_pending_once() {
        let mut ch = ReliableChannel::new();
        ch.send(env(1), Duration::ZERO);
        assert!(ch.ack(0));
        assert!(!ch.ack(0), "second ack is a no-op");
        assert_eq!(ch.in_flight(), 0);
    }

    #[test]
    fn test_due_resends_waits_for_interval() {
        let mut ch = ReliableChannel::new();
        ch.send(env(1), Duration::ZERO);

        let due = ch.due_resends(99 * MS, 100 * MS, 5).unwrap();
        assert!(due.is_empty());

        let due = ch.due_resends(100 * MS, 100 * MS, 5).unwrap();
        assert_eq!(due.len(), 1);

        // Clock restarted from the resend.
        let due = ch.due_resends(150 * MS, 100 * MS, 5).unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn test_due_resends_exhausted_after_budget() {
        let mut ch = ReliableChannel::new();
        ch.send(env(1), Duration::ZERO);
        for i in 1..=3u32 {
            assert!(ch.due_resends(i * 100 * MS, 100 * MS, 3).is_ok());
        }
        assert_eq!(
            ch.due_resends(400 * MS, 100 * MS, 3),
            Err(RetransmitExhausted { seq: 0 })
        );
    }

    #[test]
    fn test_acked_frame_is_not_resent() {
        let mut ch = ReliableChannel::new();
        ch.send(env(1), Duration::ZERO);
        ch.ack(0);
        assert!(ch.due_resends(Duration::from_secs(1), 100 * MS, 1).unwrap().is_empty());
    }

    // =====================================================================
    // Receiving
    // =====================================================================

    #[test]
    fn test_receive_in_order_delivers_immediately() {
        let mut ch = ReliableChannel::new();
        assert_eq!(ch.receive(0, env(0)), Received::Deliver(vec![env(0)]));
        assert_eq!(ch.receive(1, env(1)), Received::Deliver(vec![env(1)]));
    }

    #[test]
    fn test_receive_gap_buffers_then_releases_in_order() {
        let mut ch = ReliableChannel::new();
        assert_eq!(ch.receive(2, env(2)), Received::Buffered);
        assert_eq!(ch.receive(1, env(1)), Received::Buffered);
        assert_eq!(
            ch.receive(0, env(0)),
            Received::Deliver(vec![env(0), env(1), env(2)])
        );
    }

    #[test]
    fn test_receive_duplicate_is_dropped() {
        let mut ch = ReliableChannel::new();
        ch.receive(0, env(0));
        assert_eq!(ch.receive(0, env(0)), Received::Duplicate);

        assert_eq!(ch.receive(3, env(3)), Received::Buffered);
        assert_eq!(ch.receive(3, env(3)), Received::Duplicate);
    }

    #[test]
    fn test_receive_across_sequence_wrap() {
        let mut ch = ReliableChannel {
            next_recv_seq: u16::MAX,
            ..ReliableChannel::default()
        };
        assert_eq!(ch.receive(0, env(1)), Received::Buffered);
        assert_eq!(
            ch.receive(u16::MAX, env(0)),
            Received::Deliver(vec![env(0), env(1)])
        );
    }

    #[test]
    fn test_unacked_lists_oldest_first() {
        let mut ch = ReliableChannel::new();
        ch.send(env(1), Duration::ZERO);
        ch.send(env(2), Duration::ZERO);
        ch.ack(0);
        let frames: Vec<_> = ch.unacked().cloned().collect();
        assert_eq!(frames.len(), 1);
        assert!(matches!(
            Frame::decode(frames[0].clone()).unwrap(),
            Frame::Reliable { seq: 1, .. }
        ));
    }
}
