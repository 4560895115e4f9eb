//! Stream + consumer-group support for the in-memory store
//!
//! Mirrors the durable-queue contract: append preserves order, group reads
//! at the next-new cursor move delivered entries onto the pending list, and
//! only an acknowledgment removes them. The blocking read is a
//! notify-or-timeout loop, so an idle consumer wakes on traffic and still
//! returns to its caller within the bounded timeout.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use flashmart_common::Clock;
use flashmart_core::store_ports::{ReadCursor, StreamEntry, StreamStore};
use flashmart_domain::{FlashMartError, OrderMessage, Result};
use tracing::trace;

use super::MemoryStore;

pub(super) struct RecordedEntry {
    seq: u64,
    id: String,
    message: OrderMessage,
}

pub(super) struct PendingEntry {
    id: String,
    message: OrderMessage,
    consumer: String,
    delivery_count: u32,
}

#[derive(Default)]
pub(super) struct GroupState {
    /// Next sequence this group has not yet delivered.
    cursor: u64,
    /// Delivered-but-unacknowledged entries, ordered oldest first.
    pending: BTreeMap<u64, PendingEntry>,
}

#[derive(Default)]
pub(super) struct StreamState {
    next_seq: u64,
    entries: Vec<RecordedEntry>,
    groups: HashMap<String, GroupState>,
}

fn no_group(stream: &str, group: &str) -> FlashMartError {
    FlashMartError::Store(format!("no consumer group {group} on stream {stream}"))
}

#[async_trait]
impl<C: Clock + 'static> StreamStore for MemoryStore<C> {
    async fn append(&self, stream: &str, message: &OrderMessage) -> Result<String> {
        let millis = self.clock.millis_since_epoch();
        let id = {
            let mut inner = self.lock()?;
            let state = inner.streams.entry(stream.to_string()).or_default();
            let seq = state.next_seq;
            state.next_seq += 1;
            let id = format!("{millis}-{seq}");
            state.entries.push(RecordedEntry { seq, id: id.clone(), message: *message });
            id
        };
        self.notify_handle().notify_waiters();
        Ok(id)
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut inner = self.lock()?;
        let state = inner.streams.entry(stream.to_string()).or_default();
        let tail = state.next_seq;
        state
            .groups
            .entry(group.to_string())
            .or_insert_with(|| GroupState { cursor: tail, pending: BTreeMap::new() });
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        cursor: ReadCursor,
        block: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        match cursor {
            ReadCursor::Pending => self.read_pending(stream, group, consumer, count),
            ReadCursor::NextNew => {
                let deadline = Instant::now() + block;
                loop {
                    let delivered = self.deliver_new(stream, group, consumer, count)?;
                    if !delivered.is_empty() {
                        return Ok(delivered);
                    }

                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(Vec::new());
                    }

                    let notify = self.notify_handle();
                    tokio::select! {
                        _ = notify.notified() => continue,
                        _ = tokio::time::sleep(remaining) => return Ok(Vec::new()),
                    }
                }
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, entry_id: &str) -> Result<()> {
        let mut inner = self.lock()?;
        let state = inner.streams.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
        let group_state = state.groups.get_mut(group).ok_or_else(|| no_group(stream, group))?;

        let seq = group_state
            .pending
            .iter()
            .find(|(_, pending)| pending.id == entry_id)
            .map(|(seq, _)| *seq);
        if let Some(seq) = seq {
            group_state.pending.remove(&seq);
        }
        Ok(())
    }
}

impl<C: Clock + 'static> MemoryStore<C> {
    /// Move up to `count` unseen entries onto the pending list and hand them
    /// to `consumer`.
    fn deliver_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let mut inner = self.lock()?;
        let state = inner.streams.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
        let StreamState { entries, groups, .. } = state;
        let group_state = groups.get_mut(group).ok_or_else(|| no_group(stream, group))?;

        let mut delivered = Vec::new();
        let cursor = group_state.cursor;
        for record in entries.iter().filter(|r| r.seq >= cursor).take(count) {
            group_state.pending.insert(
                record.seq,
                PendingEntry {
                    id: record.id.clone(),
                    message: record.message,
                    consumer: consumer.to_string(),
                    delivery_count: 1,
                },
            );
            group_state.cursor = record.seq + 1;
            delivered.push(StreamEntry { id: record.id.clone(), message: record.message });
        }
        Ok(delivered)
    }

    /// Re-deliver `consumer`'s unacknowledged entries, oldest first.
    fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let mut inner = self.lock()?;
        let state = inner.streams.get_mut(stream).ok_or_else(|| no_group(stream, group))?;
        let group_state = state.groups.get_mut(group).ok_or_else(|| no_group(stream, group))?;

        let mut redelivered = Vec::new();
        for pending in group_state
            .pending
            .values_mut()
            .filter(|pending| pending.consumer == consumer)
            .take(count)
        {
            pending.delivery_count += 1;
            trace!(
                entry_id = %pending.id,
                delivery_count = pending.delivery_count,
                "stream.entry_redelivered"
            );
            redelivered.push(StreamEntry { id: pending.id.clone(), message: pending.message });
        }
        Ok(redelivered)
    }
}
