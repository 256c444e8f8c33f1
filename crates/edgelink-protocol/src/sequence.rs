//! Per-channel event sequencing.
//!
//! Senders number events monotonically from 1 per connection. Receivers
//! keep a watermark of the last accepted sequence: duplicates below it are
//! discarded, gaps above it are delivered anyway but flagged. Handoff
//! events act as barriers; delivery behind a barrier stalls until the gap
//! beneath it fills or a timeout forces the channel onward.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use edgelink_types::{InputEvent, SequencedEvent};

/// Assigns outbound sequence numbers for one channel instance.
#[derive(Debug)]
pub struct SendSequence {
    next: u64,
}

impl SendSequence {
    #[must_use]
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Stamp an event with the next sequence number and the current time.
    pub fn stamp(&mut self, event: InputEvent) -> SequencedEvent {
        let sequence = self.next;
        self.next += 1;
        SequencedEvent::new(sequence, event)
    }

    /// Restart numbering from 1, as required on a fresh connection.
    pub fn reset(&mut self) {
        self.next = 1;
    }
}

impl Default for SendSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// A barrier event waiting for the gap beneath it to fill.
#[derive(Debug)]
struct PendingBarrier {
    sequence: u64,
    buffered: BTreeMap<u64, SequencedEvent>,
    since: Instant,
}

/// Receive-side sequencing: duplicate discard, gap flagging, barrier
/// stalls.
///
/// `accept` returns the events that became deliverable, in sequence
/// order. The owner must call [`Self::release_expired`] periodically so a
/// stalled barrier cannot block the channel past its timeout.
#[derive(Debug)]
pub struct ReceiveSequencer {
    last_accepted: u64,
    barrier: Option<PendingBarrier>,
    barrier_timeout: Duration,
    duplicates: u64,
    out_of_order: u64,
    inconsistencies: u64,
}

impl ReceiveSequencer {
    #[must_use]
    pub fn new(barrier_timeout: Duration) -> Self {
        Self {
            last_accepted: 0,
            barrier: None,
            barrier_timeout,
            duplicates: 0,
            out_of_order: 0,
            inconsistencies: 0,
        }
    }

    /// Feed one received event; returns everything now deliverable.
    pub fn accept(&mut self, event: SequencedEvent) -> Vec<SequencedEvent> {
        let sequence = event.sequence;
        if sequence <= self.last_accepted {
            self.duplicates += 1;
            debug!(
                sequence,
                watermark = self.last_accepted,
                "discarding duplicate event"
            );
            return Vec::new();
        }

        if let Some(pending) = self.barrier.as_mut() {
            if pending.buffered.insert(sequence, event).is_some() {
                self.duplicates += 1;
                debug!(sequence, "discarding duplicate buffered event");
            }
            return self.release_if_complete();
        }

        if event.event.is_barrier() && sequence > self.last_accepted + 1 {
            debug!(
                sequence,
                watermark = self.last_accepted,
                "stalling delivery behind handoff barrier"
            );
            let mut buffered = BTreeMap::new();
            buffered.insert(sequence, event);
            self.barrier = Some(PendingBarrier {
                sequence,
                buffered,
                since: Instant::now(),
            });
            return Vec::new();
        }

        vec![self.deliver(event)]
    }

    /// Force out a stalled barrier whose timeout has elapsed.
    ///
    /// Returns the flushed events; empty when nothing has expired.
    pub fn release_expired(&mut self) -> Vec<SequencedEvent> {
        let expired = self
            .barrier
            .as_ref()
            .is_some_and(|p| p.since.elapsed() >= self.barrier_timeout);
        if !expired {
            return Vec::new();
        }
        let Some(pending) = self.barrier.take() else {
            return Vec::new();
        };
        self.inconsistencies += 1;
        warn!(
            barrier = pending.sequence,
            watermark = self.last_accepted,
            timeout = ?self.barrier_timeout,
            "handoff inconsistency: releasing barrier with events still missing"
        );
        self.flush(pending.buffered)
    }

    /// Forget all channel state, as required after a reconnect.
    ///
    /// Anomaly counters survive; they describe the channel's lifetime.
    pub fn reset(&mut self) {
        self.last_accepted = 0;
        self.barrier = None;
    }

    #[must_use]
    pub fn has_pending_barrier(&self) -> bool {
        self.barrier.is_some()
    }

    #[must_use]
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    #[must_use]
    pub fn out_of_order(&self) -> u64 {
        self.out_of_order
    }

    #[must_use]
    pub fn inconsistencies(&self) -> u64 {
        self.inconsistencies
    }

    fn release_if_complete(&mut self) -> Vec<SequencedEvent> {
        let complete = self.barrier.as_ref().is_some_and(|p| {
            let needed = p.sequence - self.last_accepted;
            let have = u64::try_from(p.buffered.range(..=p.sequence).count()).unwrap_or(u64::MAX);
            have >= needed
        });
        if !complete {
            return Vec::new();
        }
        let Some(pending) = self.barrier.take() else {
            return Vec::new();
        };
        self.flush(pending.buffered)
    }

    fn flush(&mut self, buffered: BTreeMap<u64, SequencedEvent>) -> Vec<SequencedEvent> {
        buffered
            .into_values()
            .map(|event| self.deliver(event))
            .collect()
    }

    fn deliver(&mut self, event: SequencedEvent) -> SequencedEvent {
        if event.sequence > self.last_accepted + 1 {
            self.out_of_order += 1;
            warn!(
                sequence = event.sequence,
                expected = self.last_accepted + 1,
                "sequence gap, delivering out of order"
            );
        }
        self.last_accepted = event.sequence;
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(sequence: u64) -> SequencedEvent {
        SequencedEvent {
            sequence,
            timestamp: 0.0,
            event: InputEvent::Move { dx: 1, dy: 0 },
        }
    }

    fn crossing(sequence: u64) -> SequencedEvent {
        SequencedEvent {
            sequence,
            timestamp: 0.0,
            event: InputEvent::EdgeCross {
                from_screen: "a".to_string(),
                to_screen: "b".to_string(),
                entry_x: 0,
                entry_y: 10,
            },
        }
    }

    fn sequences(events: &[SequencedEvent]) -> Vec<u64> {
        events.iter().map(|e| e.sequence).collect()
    }

    #[test]
    fn send_sequence_starts_at_one_and_resets() {
        let mut seq = SendSequence::new();
        assert_eq!(seq.stamp(InputEvent::Wheel { delta: 1 }).sequence, 1);
        assert_eq!(seq.stamp(InputEvent::Wheel { delta: 1 }).sequence, 2);
        seq.reset();
        assert_eq!(seq.stamp(InputEvent::Wheel { delta: 1 }).sequence, 1);
    }

    #[test]
    fn duplicates_apply_exactly_once() {
        let mut rx = ReceiveSequencer::new(Duration::from_millis(250));
        let mut applied = Vec::new();
        for seq in [1, 2, 2, 3] {
            applied.extend(rx.accept(movement(seq)));
        }
        assert_eq!(sequences(&applied), vec![1, 2, 3]);
        assert_eq!(rx.duplicates(), 1);
        assert_eq!(rx.out_of_order(), 0);
    }

    #[test]
    fn gap_delivers_but_is_flagged() {
        let mut rx = ReceiveSequencer::new(Duration::from_millis(250));
        let mut applied = Vec::new();
        applied.extend(rx.accept(movement(1)));
        applied.extend(rx.accept(movement(3)));
        assert_eq!(sequences(&applied), vec![1, 3]);
        assert_eq!(rx.out_of_order(), 1);
        assert!(!rx.has_pending_barrier());
    }

    #[test]
    fn barrier_in_order_passes_straight_through() {
        let mut rx = ReceiveSequencer::new(Duration::from_millis(250));
        assert_eq!(sequences(&rx.accept(movement(1))), vec![1]);
        assert_eq!(sequences(&rx.accept(crossing(2))), vec![2]);
        assert!(!rx.has_pending_barrier());
    }

    #[test]
    fn barrier_stalls_until_gap_fills() {
        let mut rx = ReceiveSequencer::new(Duration::from_secs(5));
        assert_eq!(sequences(&rx.accept(movement(1))), vec![1]);

        // Barrier arrives before the movement it must follow.
        assert!(rx.accept(crossing(3)).is_empty());
        assert!(rx.has_pending_barrier());

        // Later events stall behind it too.
        assert!(rx.accept(movement(4)).is_empty());

        // Filling the gap releases everything in order.
        let released = rx.accept(movement(2));
        assert_eq!(sequences(&released), vec![2, 3, 4]);
        assert!(!rx.has_pending_barrier());
        assert_eq!(rx.out_of_order(), 0);
        assert_eq!(rx.inconsistencies(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn barrier_timeout_forces_progress() {
        let mut rx = ReceiveSequencer::new(Duration::from_millis(250));
        assert_eq!(sequences(&rx.accept(movement(1))), vec![1]);
        assert!(rx.accept(crossing(3)).is_empty());

        // Nothing expires before the timeout.
        assert!(rx.release_expired().is_empty());

        tokio::time::advance(Duration::from_millis(300)).await;
        let released = rx.release_expired();
        assert_eq!(sequences(&released), vec![3]);
        assert_eq!(rx.inconsistencies(), 1);
        assert_eq!(rx.out_of_order(), 1);

        // The straggler that caused the stall is now a duplicate.
        assert!(rx.accept(movement(2)).is_empty());
        assert_eq!(rx.duplicates(), 1);
    }

    #[test]
    fn reset_restarts_watermark_for_fresh_connection() {
        let mut rx = ReceiveSequencer::new(Duration::from_millis(250));
        rx.accept(movement(1));
        rx.accept(movement(2));
        rx.reset();

        // Sequence 1 from the new connection is not a duplicate.
        assert_eq!(sequences(&rx.accept(movement(1))), vec![1]);
    }
}
