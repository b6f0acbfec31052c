//! Status notifications to the manager.
//!
//! A notification is a single PUT run on its own task; callers get a [`NotificationHandle`]
//! they may await or drop. Completion is logged in the task. Failed PUTs are not retried:
//! the manager keeps the entity pending and the next poll cycle redoes the work.
//!
//! Per entity, notifications are enqueued under an [`EntityGuard`] and executed strictly in
//! enqueue order. A notification whose status does not move past the last status delivered
//! for that entity is skipped, so the manager never sees a duplicate or a regression.
//! [`EntityGuard::reset`] starts a new lifecycle when the manager requests the entity again.
//!
//! The queue of an entity reported DELETED is released after a retention period without
//! further activity.

use crate::shard::client::ManagerClient;
use crate::types::{BridgeDto, BridgeStatus, ProcessorDto};
use crate::{error::BridgeError, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    /// Status was not ahead of the last delivered one
    Skipped,
}

pub type NotificationHandle = JoinHandle<Result<NotifyOutcome>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntityKey {
    Bridge(String),
    Processor(String),
}

#[derive(Debug, Clone)]
enum Notification {
    Bridge(BridgeDto),
    Processor(ProcessorDto),
}

impl Notification {
    fn kind(&self) -> &'static str {
        match self {
            Notification::Bridge(_) => "Bridge",
            Notification::Processor(_) => "Processor",
        }
    }

    fn id(&self) -> &str {
        match self {
            Notification::Bridge(b) => &b.id,
            Notification::Processor(p) => &p.id,
        }
    }

    fn status(&self) -> BridgeStatus {
        match self {
            Notification::Bridge(b) => b.status,
            Notification::Processor(p) => p.status,
        }
    }
}

struct EntityState {
    /// Ticket allowed to run its PUT
    serving: watch::Sender<u64>,
    delivered_rank: Mutex<Option<u8>>,
}

impl EntityState {
    /// Every ticket below `next_ticket` has run and the entity was reported DELETED
    fn is_retired(&self, next_ticket: u64) -> bool {
        *self.serving.borrow() >= next_ticket
            && *self.delivered_rank.lock() == Some(BridgeStatus::Deleted.rank())
    }
}

struct EntitySlot {
    next_ticket: Arc<AsyncMutex<u64>>,
    state: Arc<EntityState>,
}

impl EntitySlot {
    fn new() -> Self {
        let (serving, _) = watch::channel(0);
        Self {
            next_ticket: Arc::new(AsyncMutex::new(0)),
            state: Arc::new(EntityState {
                serving,
                delivered_rank: Mutex::new(None),
            }),
        }
    }
}

/// Notification queues of all entities a [`StatusNotifier`] has seen
struct Queues {
    slots: DashMap<EntityKey, Arc<EntitySlot>>,
    /// How long the queue of a deleted entity is kept to absorb late duplicates
    retention: Duration,
}

impl Queues {
    /// Schedule the release of a deleted entity's queue. The caller holds the ticket
    /// lock of `slot`; the release is dropped if the entity sees new activity meanwhile.
    fn release_if_retired(
        self: &Arc<Self>,
        key: &EntityKey,
        slot: &Arc<EntitySlot>,
        next_ticket: u64,
    ) {
        if !slot.state.is_retired(next_ticket) {
            return;
        }

        let queues = self.clone();
        let key = key.clone();
        let slot = slot.clone();
        tokio::spawn(async move {
            tokio::time::sleep(queues.retention).await;
            let Ok(current_ticket) = slot.next_ticket.try_lock() else {
                return;
            };
            if *current_ticket != next_ticket || !slot.state.is_retired(next_ticket) {
                return;
            }
            if queues
                .slots
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &slot))
                .is_some()
            {
                debug!("[shard] Released notification queue of {:?}", key);
            }
        });
    }
}

/// Advances the entity queue when a notification task finishes, however it finishes
struct Turn {
    state: Arc<EntityState>,
    ticket: u64,
}

impl Drop for Turn {
    fn drop(&mut self) {
        let next = self.ticket + 1;
        self.state.serving.send_modify(|serving| *serving = (*serving).max(next));
    }
}

/// Exclusive access to one entity's notification queue. Holding it across a shard side
/// effect and the matching enqueue keeps the two in order with respect to every other
/// writer of the same entity.
pub struct EntityGuard {
    next_ticket: OwnedMutexGuard<u64>,
    key: EntityKey,
    slot: Arc<EntitySlot>,
    queues: Arc<Queues>,
    client: Arc<dyn ManagerClient>,
}

impl EntityGuard {
    pub fn notify_bridge(&mut self, bridge: BridgeDto) -> NotificationHandle {
        self.enqueue(Notification::Bridge(bridge))
    }

    pub fn notify_processor(&mut self, processor: ProcessorDto) -> NotificationHandle {
        self.enqueue(Notification::Processor(processor))
    }

    /// Start a new lifecycle for the entity. Takes effect in queue order: notifications
    /// enqueued before still see the old guard, later ones may report any status again.
    pub fn reset(&mut self) -> JoinHandle<()> {
        let ticket = self.take_ticket();
        let state = self.slot.state.clone();
        tokio::spawn(async move {
            if wait_for_turn(&state, ticket).await.is_err() {
                return;
            }
            let _turn = Turn {
                state: state.clone(),
                ticket,
            };
            *state.delivered_rank.lock() = None;
        })
    }

    fn take_ticket(&mut self) -> u64 {
        let ticket = *self.next_ticket;
        *self.next_ticket += 1;
        ticket
    }

    fn enqueue(&mut self, notification: Notification) -> NotificationHandle {
        let ticket = self.take_ticket();

        let key = self.key.clone();
        let slot = self.slot.clone();
        let queues = self.queues.clone();
        let client = self.client.clone();
        tokio::spawn(async move {
            wait_for_turn(&slot.state, ticket).await?;
            let outcome = {
                let _turn = Turn {
                    state: slot.state.clone(),
                    ticket,
                };
                deliver(client.as_ref(), &slot.state, notification).await
            };

            // A held guard releases the slot itself when it drops
            if let Ok(next_ticket) = slot.next_ticket.try_lock() {
                queues.release_if_retired(&key, &slot, *next_ticket);
            }
            outcome
        })
    }
}

impl Drop for EntityGuard {
    fn drop(&mut self) {
        self.queues
            .release_if_retired(&self.key, &self.slot, *self.next_ticket);
    }
}

async fn wait_for_turn(state: &EntityState, ticket: u64) -> Result<()> {
    let mut serving = state.serving.subscribe();
    serving
        .wait_for(|serving| *serving >= ticket)
        .await
        .map(|_| ())
        .map_err(|_| BridgeError::InvariantViolated("notification queue closed".to_string()))
}

async fn deliver(
    client: &dyn ManagerClient,
    state: &EntityState,
    notification: Notification,
) -> Result<NotifyOutcome> {
    let rank = notification.status().rank();
    let delivered = *state.delivered_rank.lock();
    if delivered.map_or(false, |delivered| rank <= delivered) {
        debug!(
            "[shard] Skipping {} update with id '{}' to {}",
            notification.kind(),
            notification.id(),
            notification.status()
        );
        return Ok(NotifyOutcome::Skipped);
    }

    let result = match &notification {
        Notification::Bridge(bridge) => client.update_bridge(bridge).await,
        Notification::Processor(processor) => client.update_processor(processor).await,
    };

    match result {
        Ok(()) => {
            let mut delivered = state.delivered_rank.lock();
            *delivered = Some(delivered.map_or(rank, |d| d.max(rank)));
            drop(delivered);
            info!("[shard] Updating {} with id '{}' done", notification.kind(), notification.id());
            Ok(NotifyOutcome::Delivered)
        }
        Err(e) => {
            warn!(
                "[shard] Updating {} with id '{}' FAILED: {}",
                notification.kind(),
                notification.id(),
                e
            );
            Err(e)
        }
    }
}

/// Keep the queue of a deleted entity this long before releasing it
pub const DEFAULT_DELETED_RETENTION: Duration = Duration::from_secs(300);

/// Ordered, monotonic status notifications for bridges and processors. The queue of an
/// entity is released once its DELETED status has been delivered and the retention
/// period passed without further activity.
pub struct StatusNotifier {
    client: Arc<dyn ManagerClient>,
    queues: Arc<Queues>,
}

impl StatusNotifier {
    pub fn new(client: Arc<dyn ManagerClient>) -> Self {
        Self::with_retention(client, DEFAULT_DELETED_RETENTION)
    }

    pub fn with_retention(client: Arc<dyn ManagerClient>, retention: Duration) -> Self {
        Self {
            client,
            queues: Arc::new(Queues {
                slots: DashMap::new(),
                retention,
            }),
        }
    }

    async fn lock(&self, key: EntityKey) -> EntityGuard {
        loop {
            let slot = self
                .queues
                .slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(EntitySlot::new()))
                .clone();
            let next_ticket = slot.next_ticket.clone().lock_owned().await;

            // The slot may have been released while we waited for its lock
            let current = self
                .queues
                .slots
                .get(&key)
                .map_or(false, |current| Arc::ptr_eq(current.value(), &slot));
            if current {
                return EntityGuard {
                    next_ticket,
                    key,
                    slot,
                    queues: self.queues.clone(),
                    client: self.client.clone(),
                };
            }
        }
    }

    pub async fn lock_bridge(&self, bridge_id: &str) -> EntityGuard {
        self.lock(EntityKey::Bridge(bridge_id.to_string())).await
    }

    pub async fn lock_processor(&self, processor_id: &str) -> EntityGuard {
        self.lock(EntityKey::Processor(processor_id.to_string())).await
    }

    pub async fn notify_bridge(&self, bridge: BridgeDto) -> NotificationHandle {
        self.lock_bridge(&bridge.id).await.notify_bridge(bridge)
    }

    pub async fn notify_processor(&self, processor: ProcessorDto) -> NotificationHandle {
        self.lock_processor(&processor.id)
            .await
            .notify_processor(processor)
    }

    /// Entities with a live notification queue
    pub fn tracked_entities(&self) -> usize {
        self.queues.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records delivered bridge statuses; PROVISIONING is slow and the first
    /// `failures` calls fail
    #[derive(Default)]
    struct RecordingClient {
        delivered: Mutex<Vec<BridgeStatus>>,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl ManagerClient for RecordingClient {
        async fn fetch_bridges_to_deploy_or_delete(&self) -> Result<Vec<BridgeDto>> {
            Ok(vec![])
        }

        async fn fetch_processors_to_deploy_or_delete(&self) -> Result<Vec<ProcessorDto>> {
            Ok(vec![])
        }

        async fn update_bridge(&self, bridge: &BridgeDto) -> Result<()> {
            if bridge.status == BridgeStatus::Provisioning {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BridgeError::ManagerApi {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            self.delivered.lock().push(bridge.status);
            Ok(())
        }

        async fn update_processor(&self, _processor: &ProcessorDto) -> Result<()> {
            Ok(())
        }
    }

    fn bridge(status: BridgeStatus) -> BridgeDto {
        BridgeDto::new("myId-1", "myName-1", "myEndpoint", "myCustomerId", status)
    }

    #[tokio::test]
    async fn test_notifications_run_in_enqueue_order() {
        let client = Arc::new(RecordingClient::default());
        let notifier = StatusNotifier::new(client.clone());

        let first = notifier.notify_bridge(bridge(BridgeStatus::Provisioning)).await;
        let second = notifier.notify_bridge(bridge(BridgeStatus::Available)).await;

        assert_eq!(second.await.unwrap().unwrap(), NotifyOutcome::Delivered);
        assert_eq!(first.await.unwrap().unwrap(), NotifyOutcome::Delivered);
        assert_eq!(
            *client.delivered.lock(),
            vec![BridgeStatus::Provisioning, BridgeStatus::Available]
        );
    }

    #[tokio::test]
    async fn test_duplicates_and_regressions_are_skipped() {
        let client = Arc::new(RecordingClient::default());
        let notifier = StatusNotifier::new(client.clone());

        let handles = vec![
            notifier.notify_bridge(bridge(BridgeStatus::Available)).await,
            notifier.notify_bridge(bridge(BridgeStatus::Provisioning)).await,
            notifier.notify_bridge(bridge(BridgeStatus::Deleted)).await,
            notifier.notify_bridge(bridge(BridgeStatus::Deleted)).await,
        ];
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(
            outcomes,
            vec![
                NotifyOutcome::Delivered,
                NotifyOutcome::Skipped,
                NotifyOutcome::Delivered,
                NotifyOutcome::Skipped
            ]
        );
        assert_eq!(*client.delivered.lock(), vec![BridgeStatus::Available, BridgeStatus::Deleted]);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_advance_guard() {
        let client = Arc::new(RecordingClient {
            failures: AtomicUsize::new(1),
            ..Default::default()
        });
        let notifier = StatusNotifier::new(client.clone());

        let failed = notifier.notify_bridge(bridge(BridgeStatus::Deleted)).await;
        assert!(matches!(failed.await.unwrap(), Err(BridgeError::ManagerApi { .. })));

        let resent = notifier.notify_bridge(bridge(BridgeStatus::Deleted)).await;
        assert_eq!(resent.await.unwrap().unwrap(), NotifyOutcome::Delivered);
        assert_eq!(*client.delivered.lock(), vec![BridgeStatus::Deleted]);
    }

    #[tokio::test]
    async fn test_dropped_handle_still_delivers() {
        let client = Arc::new(RecordingClient::default());
        let notifier = StatusNotifier::new(client.clone());

        drop(notifier.notify_bridge(bridge(BridgeStatus::Available)).await);
        let last = notifier.notify_bridge(bridge(BridgeStatus::Deleted)).await;
        last.await.unwrap().unwrap();

        assert_eq!(*client.delivered.lock(), vec![BridgeStatus::Available, BridgeStatus::Deleted]);
    }

    #[tokio::test]
    async fn test_entities_do_not_block_each_other() {
        let client = Arc::new(RecordingClient::default());
        let notifier = StatusNotifier::new(client.clone());

        let _held = notifier.lock_bridge("other").await;
        let handle = notifier.notify_bridge(bridge(BridgeStatus::Available)).await;

        assert_eq!(handle.await.unwrap().unwrap(), NotifyOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_reset_starts_a_new_lifecycle() {
        let client = Arc::new(RecordingClient::default());
        let notifier = StatusNotifier::new(client.clone());

        let first = notifier.notify_bridge(bridge(BridgeStatus::Available)).await;
        let (reset, second) = {
            let mut guard = notifier.lock_bridge("myId-1").await;
            let reset = guard.reset();
            (reset, guard.notify_bridge(bridge(BridgeStatus::Provisioning)))
        };
        let third = notifier.notify_bridge(bridge(BridgeStatus::Provisioning)).await;

        assert_eq!(first.await.unwrap().unwrap(), NotifyOutcome::Delivered);
        reset.await.unwrap();
        assert_eq!(second.await.unwrap().unwrap(), NotifyOutcome::Delivered);
        assert_eq!(third.await.unwrap().unwrap(), NotifyOutcome::Skipped);
        assert_eq!(
            *client.delivered.lock(),
            vec![BridgeStatus::Available, BridgeStatus::Provisioning]
        );
    }

    #[tokio::test]
    async fn test_deleted_entity_queue_is_released_after_retention() {
        let client = Arc::new(RecordingClient::default());
        let notifier = StatusNotifier::with_retention(client.clone(), Duration::from_millis(20));

        notifier
            .notify_bridge(bridge(BridgeStatus::Available))
            .await
            .await
            .unwrap()
            .unwrap();
        let other = BridgeDto::new(
            "myId-2",
            "myName-2",
            "myEndpoint",
            "myCustomerId",
            BridgeStatus::Deleted,
        );
        notifier.notify_bridge(other).await.await.unwrap().unwrap();
        assert_eq!(notifier.tracked_entities(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(notifier.tracked_entities(), 1);

        let deleted = notifier.notify_bridge(bridge(BridgeStatus::Deleted)).await;
        assert_eq!(deleted.await.unwrap().unwrap(), NotifyOutcome::Delivered);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(notifier.tracked_entities(), 0);
    }

    #[tokio::test]
    async fn test_deleted_entity_still_deduplicates_within_retention() {
        let client = Arc::new(RecordingClient::default());
        let notifier = StatusNotifier::with_retention(client.clone(), Duration::from_secs(60));

        let first = notifier.notify_bridge(bridge(BridgeStatus::Deleted)).await;
        assert_eq!(first.await.unwrap().unwrap(), NotifyOutcome::Delivered);
        let late = notifier.notify_bridge(bridge(BridgeStatus::Deleted)).await;

        assert_eq!(late.await.unwrap().unwrap(), NotifyOutcome::Skipped);
        assert_eq!(notifier.tracked_entities(), 1);
        assert_eq!(*client.delivered.lock(), vec![BridgeStatus::Deleted]);
    }
}
