use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use crate::{
    ChannelConfig, ChannelError, EventType, Result,
    channel::{Delivery, EventChannel, EventPublisher, NackOutcome, ParkedEvent, PublishedEvent},
};

/// In-memory event channel for tests and single-process runs.
///
/// Keeps an append-only log of what was published and, per subscription, a
/// fixed number of partition queues. An event lands in the partition chosen by
/// hashing its `orderId`; events without one share partition 0.
///
/// The log and the parked list keep the most recent
/// [`retained_events`](ChannelConfig::retained_events) entries each, so a
/// long-running process holds bounded history. Queued deliveries are not
/// capped.
#[derive(Clone)]
pub struct InMemoryEventChannel {
    config: Arc<ChannelConfig>,
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    unavailable: Arc<AtomicBool>,
}

#[derive(Default)]
struct Inner {
    log: VecDeque<PublishedEvent>,
    next_sequence: u64,
    next_delivery_id: u64,
    subscriptions: BTreeMap<String, SubscriptionState>,
    parked: VecDeque<ParkedEvent>,
}

/// Appends to a bounded history, dropping the oldest entry when full.
fn retain<T>(history: &mut VecDeque<T>, entry: T, capacity: usize) -> bool {
    history.push_back(entry);
    if history.len() > capacity.max(1) {
        history.pop_front();
        return true;
    }
    false
}

struct SubscriptionState {
    interests: Vec<EventType>,
    partitions: Vec<Partition>,
    cursor: usize,
}

impl SubscriptionState {
    fn wants(&self, event: &PublishedEvent) -> bool {
        self.interests.is_empty()
            || event
                .type_name()
                .is_some_and(|name| self.interests.iter().any(|t| t.as_str() == name))
    }

    fn has_work(&self) -> bool {
        self.partitions
            .iter()
            .any(|p| p.lease.is_none() && !p.queue.is_empty())
    }
}

#[derive(Default)]
struct Partition {
    queue: VecDeque<Pending>,
    lease: Option<u64>,
}

struct Pending {
    event: PublishedEvent,
    attempts: u32,
}

impl InMemoryEventChannel {
    /// Creates an empty channel.
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(Inner::default())),
            notify: Arc::new(Notify::new()),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a copy of the retained published log.
    pub async fn published(&self) -> Vec<PublishedEvent> {
        self.inner.lock().await.log.iter().cloned().collect()
    }

    /// Returns the published events of one type, in publish order.
    pub async fn published_of(&self, event_type: EventType) -> Vec<PublishedEvent> {
        self.inner
            .lock()
            .await
            .log
            .iter()
            .filter(|e| e.type_name() == Some(event_type.as_str()))
            .cloned()
            .collect()
    }

    /// Returns the number of queued or in-flight deliveries across subscriptions.
    pub async fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .subscriptions
            .values()
            .flat_map(|s| s.partitions.iter())
            .map(|p| p.queue.len())
            .sum()
    }

    /// Makes publishing fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn partition_for(&self, order_id: Option<&str>) -> usize {
        let partitions = self.config.partitions.max(1);
        match order_id {
            Some(id) => {
                let mut hasher = DefaultHasher::new();
                id.hash(&mut hasher);
                (hasher.finish() % partitions as u64) as usize
            }
            None => 0,
        }
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_delivery_attempts.max(1)
    }
}

impl Default for InMemoryEventChannel {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventChannel {
    async fn publish_raw(&self, source: &str, payload: Value) -> Result<u64> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ChannelError::Unavailable(format!(
                "bus {} is not accepting events",
                self.config.bus_name
            )));
        }

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        inner.next_sequence += 1;
        let event = PublishedEvent {
            sequence: inner.next_sequence,
            bus_name: self.config.bus_name.clone(),
            source: source.to_string(),
            payload,
            published_at: Utc::now(),
        };
        let partition = self.partition_for(event.order_id());

        for state in inner.subscriptions.values_mut() {
            if state.wants(&event) {
                state.partitions[partition].queue.push_back(Pending {
                    event: event.clone(),
                    attempts: 0,
                });
            }
        }

        let sequence = event.sequence;
        let type_name = event.type_name().unwrap_or("UNKNOWN").to_string();
        if retain(&mut inner.log, event, self.config.retained_events) {
            tracing::trace!(sequence, "oldest published event dropped from log");
        }
        drop(guard);

        self.notify.notify_waiters();

        tracing::debug!(
            sequence,
            source,
            event_type = %type_name,
            bus = %self.config.bus_name,
            "event published"
        );
        metrics::counter!("channel_events_published_total", "type" => type_name).increment(1);

        Ok(sequence)
    }
}

#[async_trait]
impl EventChannel for InMemoryEventChannel {
    async fn subscribe(&self, subscription: &str, interests: &[EventType]) -> Result<()> {
        let partitions = self.config.partitions.max(1);
        let mut inner = self.inner.lock().await;
        inner
            .subscriptions
            .entry(subscription.to_string())
            .or_insert_with(|| SubscriptionState {
                interests: interests.to_vec(),
                partitions: (0..partitions).map(|_| Partition::default()).collect(),
                cursor: 0,
            });
        Ok(())
    }

    async fn poll(&self, subscription: &str) -> Result<Option<Delivery>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let state = inner
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| ChannelError::UnknownSubscription(subscription.to_string()))?;

        let count = state.partitions.len();
        for offset in 0..count {
            let index = (state.cursor + offset) % count;
            let partition = &mut state.partitions[index];
            if partition.lease.is_some() {
                continue;
            }
            let Some(head) = partition.queue.front_mut() else {
                continue;
            };

            inner.next_delivery_id += 1;
            let id = inner.next_delivery_id;
            head.attempts += 1;
            partition.lease = Some(id);
            let delivery = Delivery {
                id,
                subscription: subscription.to_string(),
                partition: index,
                attempt: head.attempts,
                event: head.event.clone(),
            };
            state.cursor = (index + 1) % count;
            return Ok(Some(delivery));
        }

        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let partition = leased_partition(&mut inner.subscriptions, delivery)?;
        partition.queue.pop_front();
        partition.lease = None;
        drop(inner);

        self.notify.notify_waiters();
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<NackOutcome> {
        let max_attempts = self.max_attempts();
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let partition = leased_partition(&mut inner.subscriptions, delivery)?;
        partition.lease = None;

        let attempts = partition.queue.front().map(|p| p.attempts).unwrap_or(0);
        let outcome = if attempts >= max_attempts {
            if let Some(pending) = partition.queue.pop_front() {
                let parked = ParkedEvent {
                    subscription: delivery.subscription.clone(),
                    event: pending.event,
                    attempts: pending.attempts,
                    reason: reason.to_string(),
                    parked_at: Utc::now(),
                };
                if retain(&mut inner.parked, parked, self.config.retained_events) {
                    tracing::warn!("oldest parked event dropped; parked list is full");
                }
            }
            tracing::error!(
                subscription = %delivery.subscription,
                sequence = delivery.event.sequence,
                attempts,
                reason,
                "event parked after exhausting delivery attempts"
            );
            metrics::counter!("channel_events_parked_total").increment(1);
            NackOutcome::Parked { attempts }
        } else {
            tracing::warn!(
                subscription = %delivery.subscription,
                sequence = delivery.event.sequence,
                attempt = attempts,
                reason,
                "delivery failed, will redeliver"
            );
            metrics::counter!("channel_redeliveries_total").increment(1);
            NackOutcome::Redelivering {
                attempt: attempts + 1,
            }
        };
        drop(guard);

        self.notify.notify_waiters();
        Ok(outcome)
    }

    async fn wait_for_work(&self, subscription: &str, max_wait: Duration) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking so a publish in between is not missed
        notified.as_mut().enable();

        let has_work = self
            .inner
            .lock()
            .await
            .subscriptions
            .get(subscription)
            .is_some_and(SubscriptionState::has_work);
        if has_work {
            return;
        }

        let _ = tokio::time::timeout(max_wait, notified).await;
    }

    async fn parked(&self) -> Result<Vec<ParkedEvent>> {
        Ok(self.inner.lock().await.parked.iter().cloned().collect())
    }
}

fn leased_partition<'a>(
    subscriptions: &'a mut BTreeMap<String, SubscriptionState>,
    delivery: &Delivery,
) -> Result<&'a mut Partition> {
    let unknown = || ChannelError::UnknownDelivery {
        subscription: delivery.subscription.clone(),
        delivery_id: delivery.id,
    };
    let partition = subscriptions
        .get_mut(&delivery.subscription)
        .ok_or_else(|| ChannelError::UnknownSubscription(delivery.subscription.clone()))?
        .partitions
        .get_mut(delivery.partition)
        .ok_or_else(unknown)?;
    if partition.lease != Some(delivery.id) {
        return Err(unknown());
    }
    Ok(partition)
}
