use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use flashmart_common::{retry_with_backoff, BackoffStrategy};
use flashmart_domain::{FlashMartError, OrderMessage, OrderOutcome, Result, SeckillConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::lock::LockProvider;
use crate::repositories::OrderRepository;
use crate::store_ports::{ReadCursor, StreamEntry, StreamStore};

/// Lease on the per-user processing lock; renewed by the provider while the
/// persistence transaction runs.
const ORDER_LOCK_LEASE: Duration = Duration::from_secs(30);
const ORDER_LOCK_ATTEMPTS: u32 = 3;
const ORDER_LOCK_BACKOFF: BackoffStrategy = BackoffStrategy::Fixed(Duration::from_millis(50));

/// Entries fetched per recovery read.
const PENDING_BATCH: usize = 16;
/// Pause before yielding back to the main loop when a recovery pass acks
/// nothing (head-of-line message keeps failing).
const RECOVERY_BACKOFF: Duration = Duration::from_millis(500);

/// The single background consumer of the order stream
///
/// One logical consumer per process in a named group. Messages are
/// acknowledged only after the persistence transaction commits; anything
/// that fails mid-processing stays on the group's pending list and is
/// reprocessed by recovery, which the authoritative duplicate check makes
/// idempotent.
pub struct OrderConsumer {
    stream: Arc<dyn StreamStore>,
    locks: Arc<dyn LockProvider>,
    orders: Arc<dyn OrderRepository>,
    config: SeckillConfig,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl OrderConsumer {
    pub fn new(
        stream: Arc<dyn StreamStore>,
        locks: Arc<dyn LockProvider>,
        orders: Arc<dyn OrderRepository>,
        config: SeckillConfig,
    ) -> Self {
        Self {
            stream,
            locks,
            orders,
            config,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Ensure the consumer group exists and start the background loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.stream
            .create_group(&self.config.order_stream, &self.config.consumer_group)
            .await?;

        let consumer = Arc::clone(self);
        let handle = tokio::spawn(async move { consumer.run().await });
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }

    /// Signal the loop to stop after its current bounded read, then wait for
    /// it to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                warn!(error = %error, "seckill.consumer_join_failed");
            }
        }
        info!("seckill.consumer_stopped");
    }

    async fn run(&self) {
        info!(
            stream = %self.config.order_stream,
            group = %self.config.consumer_group,
            consumer = %self.config.consumer_name,
            "seckill.consumer_started"
        );

        // Crash recovery: drain entries a previous run dequeued but never
        // acknowledged before taking new traffic.
        self.recover_pending().await;

        let block = Duration::from_secs(self.config.block_timeout_secs);
        while !self.cancel.is_cancelled() {
            let read = tokio::select! {
                _ = self.cancel.cancelled() => break,
                read = self.stream.read_group(
                    &self.config.order_stream,
                    &self.config.consumer_group,
                    &self.config.consumer_name,
                    ReadCursor::NextNew,
                    block,
                    1,
                ) => read,
            };

            match read {
                Ok(entries) => {
                    for entry in entries {
                        if let Err(error) = self.process_entry(&entry).await {
                            warn!(entry_id = %entry.id, error = %error, "seckill.order_failed");
                            self.recover_pending().await;
                        }
                    }
                }
                Err(error) => {
                    warn!(error = %error, "seckill.consumer_read_failed");
                    self.recover_pending().await;
                }
            }
        }
    }

    /// Handle one delivered entry and acknowledge it. The ack only happens
    /// after persistence succeeded; on any error the entry stays pending.
    async fn process_entry(&self, entry: &StreamEntry) -> Result<()> {
        self.handle_order(&entry.message).await?;
        self.stream
            .ack(&self.config.order_stream, &self.config.consumer_group, &entry.id)
            .await
    }

    /// Persist one admitted order under the per-user lock.
    ///
    /// The lock is defense-in-depth against concurrent duplicate processing
    /// (manual reprocessing, a second consumer instance); the repository's
    /// transaction remains the authoritative guard.
    async fn handle_order(&self, message: &OrderMessage) -> Result<()> {
        let resource = format!("seckill:order:{}", message.user_id);

        let token = retry_with_backoff(
            ORDER_LOCK_ATTEMPTS,
            ORDER_LOCK_BACKOFF,
            FlashMartError::is_transient,
            || {
                let locks = Arc::clone(&self.locks);
                let resource = resource.clone();
                async move {
                    match locks.try_acquire(&resource, ORDER_LOCK_LEASE).await? {
                        Some(token) => Ok(token),
                        None => Err(FlashMartError::LockUnavailable(resource)),
                    }
                }
            },
        )
        .await
        .map_err(|e| e.into_inner())?;

        let outcome = self.orders.create_order(message).await;

        // Release on every path; failure to release only costs lease time.
        if let Err(error) = self.locks.release(&resource, &token).await {
            warn!(resource = %resource, error = %error, "seckill.lock_release_failed");
        }

        match outcome? {
            OrderOutcome::Created => {
                info!(
                    order_id = message.order_id,
                    user_id = message.user_id,
                    voucher_id = message.voucher_id,
                    "seckill.order_persisted"
                );
            }
            OrderOutcome::AlreadyExists => {
                debug!(order_id = message.order_id, "seckill.order_redelivered");
            }
        }
        Ok(())
    }

    /// Reprocess the group's pending entries, oldest first, until the list is
    /// drained. A pass that acknowledges nothing backs off and returns so a
    /// permanently failing message cannot spin the loop; it stays pending.
    async fn recover_pending(&self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            let entries = match self
                .stream
                .read_group(
                    &self.config.order_stream,
                    &self.config.consumer_group,
                    &self.config.consumer_name,
                    ReadCursor::Pending,
                    Duration::ZERO,
                    PENDING_BATCH,
                )
                .await
            {
                Ok(entries) => entries,
                Err(error) => {
                    warn!(error = %error, "seckill.recovery_read_failed");
                    return;
                }
            };

            if entries.is_empty() {
                debug!("seckill.recovery_drained");
                return;
            }

            let mut acked = 0usize;
            for entry in &entries {
                match self.process_entry(entry).await {
                    Ok(()) => acked += 1,
                    Err(error) => {
                        warn!(entry_id = %entry.id, error = %error, "seckill.recovery_entry_failed");
                    }
                }
            }

            if acked == 0 {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(RECOVERY_BACKOFF) => {}
                }
                return;
            }
        }
    }
}
