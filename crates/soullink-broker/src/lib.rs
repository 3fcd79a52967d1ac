// crates/soullink-broker/src/lib.rs
// ============================================================================
// Module: SoulLink Broker
// Description: Per-run live broadcast fan-out for newly appended events.
// Purpose: Let WebSocket subscribers observe events as they are appended,
//          without coupling the event store to any particular transport.
// Dependencies: soullink-core, tokio, thiserror, tracing
// ============================================================================

//! ## Overview
//! One [`tokio::sync::broadcast`] channel exists per run. The ingestion
//! path publishes each durably-appended [`EventEnvelope`] after its
//! transaction commits; subscribers that can't keep up simply miss the
//! oldest backlog entries and are told so via [`RecvError::Lagged`], matching
//! `broadcast`'s normal lagging behavior. Catch-up (fetching events a
//! subscriber missed before it connected) is the event store's job, not
//! this broker's: a subscriber is expected to page through
//! `soullink-store-sqlite`'s event query first, then subscribe to the live
//! feed (a caller that lags on the live feed after catch-up is expected to
//! disconnect and resynchronize rather than stay on a gapped stream).
//!
//! Invariants:
//! - A run's channel is created lazily on first use and reused afterward.
//! - Publishing to a run with no subscribers is a no-op, never an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use soullink_core::EventEnvelope;
use soullink_core::RunId;
use thiserror::Error;
use tokio::sync::broadcast;

/// Default per-run channel capacity used by [`Broker::new`].
///
/// Overridable per broker via [`Broker::with_capacity`]; `soullink-config`'s
/// `broadcast_channel_capacity` field is the intended source of this value
/// at startup.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Errors surfaced by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker was asked to publish a sequence number lower than one
    /// already seen on this run's channel. This would indicate the caller
    /// is replaying events out of order and is treated as a caller bug.
    #[error(
        "refusing to publish out-of-order event for run {run_id}: sequence {sequence_number} is not \
         greater than the last published sequence {last_published}"
    )]
    OutOfOrder {
        /// Affected run.
        run_id: RunId,
        /// Sequence number of the event that was rejected.
        sequence_number: u64,
        /// Last sequence number successfully published for this run.
        last_published: u64,
    },
}

/// A subscription handle to a single run's live event feed.
pub type Subscription = broadcast::Receiver<EventEnvelope>;

/// Re-exported so callers can match on lag without depending on `tokio`
/// directly.
pub type RecvError = broadcast::error::RecvError;

/// Per-run channel state: the sender half plus the last sequence number
/// published, used to detect caller-side ordering bugs early.
struct RunChannel {
    /// Sender half; a receiver is cloned from this for each subscriber.
    sender: broadcast::Sender<EventEnvelope>,
    /// Highest sequence number published on this channel so far.
    last_published: u64,
}

/// Registry of live broadcast channels, one per run.
///
/// Cloning a [`Broker`] is cheap and shares the same underlying registry,
/// matching how the ingestion service and the WebSocket handlers each hold
/// their own handle to the same broker.
#[derive(Clone)]
pub struct Broker {
    /// Capacity applied to newly created per-run channels.
    capacity: usize,
    /// Lazily populated per-run channel table.
    channels: Arc<RwLock<HashMap<RunId, RunChannel>>>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    /// Creates a broker using [`DEFAULT_CHANNEL_CAPACITY`] for new run
    /// channels.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a broker with an explicit per-run channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribes to a run's live event feed, creating the channel if this
    /// is the first subscriber for that run.
    ///
    /// # Panics
    ///
    /// Panics only if the internal lock is poisoned, which would mean an
    /// earlier panic already occurred while the lock was held.
    #[must_use]
    pub fn subscribe(&self, run_id: RunId) -> Subscription {
        let mut channels = self.lock_write();
        channels
            .entry(run_id)
            .or_insert_with(|| RunChannel {
                sender: broadcast::channel(self.capacity).0,
                last_published: 0,
            })
            .sender
            .subscribe()
    }

    /// Publishes a durably-appended event to its run's live subscribers.
    ///
    /// Returns [`BrokerError::OutOfOrder`] if `event.sequence_number` is not
    /// strictly greater than the last sequence number published for this
    /// run, which would indicate a caller bug rather than a transport
    /// failure. A publish with zero subscribers is not an error: the
    /// broadcast channel simply drops the value.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::OutOfOrder`] as described above.
    ///
    /// # Panics
    ///
    /// Panics only if the internal lock is poisoned, which would mean an
    /// earlier panic already occurred while the lock was held.
    pub fn publish(&self, run_id: RunId, event: EventEnvelope) -> Result<(), BrokerError> {
        let mut channels = self.lock_write();
        let channel = channels.entry(run_id).or_insert_with(|| RunChannel {
            sender: broadcast::channel(self.capacity).0,
            last_published: 0,
        });

        if event.sequence_number <= channel.last_published {
            return Err(BrokerError::OutOfOrder {
                run_id,
                sequence_number: event.sequence_number,
                last_published: channel.last_published,
            });
        }

        channel.last_published = event.sequence_number;
        // A send error here only means there are currently no receivers,
        // which is a normal, non-erroneous state for this broker.
        let _ = channel.sender.send(event);
        Ok(())
    }

    /// Returns the number of active subscribers for a run, or zero if the
    /// run has no channel yet.
    ///
    /// # Panics
    ///
    /// Panics only if the internal lock is poisoned, which would mean an
    /// earlier panic already occurred while the lock was held.
    #[must_use]
    pub fn subscriber_count(&self, run_id: RunId) -> usize {
        let channels = self.lock_read();
        channels.get(&run_id).map_or(0, |channel| channel.sender.receiver_count())
    }

    /// Returns the total number of runs with at least one live channel
    /// (not necessarily with subscribers; channels persist once created).
    ///
    /// # Panics
    ///
    /// Panics only if the internal lock is poisoned, which would mean an
    /// earlier panic already occurred while the lock was held.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.lock_read().len()
    }

    #[allow(
        clippy::unwrap_used,
        reason = "poisoning only occurs after an unrelated panic already unwound the process"
    )]
    fn lock_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<RunId, RunChannel>> {
        self.channels.read().unwrap()
    }

    #[allow(
        clippy::unwrap_used,
        reason = "poisoning only occurs after an unrelated panic already unwound the process"
    )]
    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<RunId, RunChannel>> {
        self.channels.write().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use soullink_core::EventId;
    use soullink_core::EventPayload;
    use soullink_core::FaintPayload;
    use soullink_core::PlayerId;
    use time::OffsetDateTime;

    use super::*;

    fn sample_event(run_id: RunId, sequence_number: u64) -> EventEnvelope {
        EventEnvelope {
            event_id: EventId::generate(),
            run_id,
            player_id: PlayerId::generate(),
            occurred_at: OffsetDateTime::UNIX_EPOCH,
            stored_at: OffsetDateTime::UNIX_EPOCH,
            sequence_number,
            payload: EventPayload::Faint(FaintPayload {
                pokemon_key: "party-1".to_string(),
                party_slot_index: Some(0),
            }),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let broker = Broker::new();
        let run_id = RunId::generate();
        let mut subscription = broker.subscribe(run_id);

        broker.publish(run_id, sample_event(run_id, 1)).expect("publish");

        let received = subscription.recv().await.expect("recv");
        assert_eq!(received.sequence_number, 1);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_not_an_error() {
        let broker = Broker::new();
        let run_id = RunId::generate();
        broker.publish(run_id, sample_event(run_id, 1)).expect("publish");
    }

    #[tokio::test]
    async fn out_of_order_publish_is_rejected() {
        let broker = Broker::new();
        let run_id = RunId::generate();
        broker.publish(run_id, sample_event(run_id, 5)).expect("publish");

        let result = broker.publish(run_id, sample_event(run_id, 5));
        assert!(matches!(result, Err(BrokerError::OutOfOrder { .. })));
    }

    #[tokio::test]
    async fn subscriber_count_reflects_live_subscriptions() {
        let broker = Broker::new();
        let run_id = RunId::generate();
        assert_eq!(broker.subscriber_count(run_id), 0);

        let subscription = broker.subscribe(run_id);
        assert_eq!(broker.subscriber_count(run_id), 1);
        drop(subscription);
    }

    #[tokio::test]
    async fn channels_are_independent_per_run() {
        let broker = Broker::new();
        let run_a = RunId::generate();
        let run_b = RunId::generate();
        let mut sub_a = broker.subscribe(run_a);

        broker.publish(run_b, sample_event(run_b, 1)).expect("publish to b");

        assert!(sub_a.try_recv().is_err());
    }
}
