//! Consumers for both saga participants.

use std::sync::Arc;

use event_channel::{ChannelConfig, Consumer, EventChannel};
use record_store::RecordStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{InventoryParticipant, OrderParticipant, SagaConfig};

type InventoryConsumer<S, C> = Consumer<C, InventoryParticipant<S, C>>;
type OrderConsumer<S, C> = Consumer<C, OrderParticipant<S, C>>;

/// The consumer pool driving the saga.
///
/// Each participant gets `consumers_per_participant` consumers sharing one
/// subscription. Participants are stateless, so the consumers share one
/// handler instance.
pub struct SagaRunner<S: RecordStore, C> {
    inventory: Vec<InventoryConsumer<S, C>>,
    orders: Vec<OrderConsumer<S, C>>,
}

impl<S, C> SagaRunner<S, C>
where
    S: RecordStore + Clone + 'static,
    C: EventChannel + Clone + 'static,
{
    /// Subscribes both participants and builds their consumers.
    pub async fn new(
        store: S,
        channel: C,
        saga: &SagaConfig,
        channel_config: &ChannelConfig,
    ) -> event_channel::Result<Self> {
        let inventory_handler = Arc::new(InventoryParticipant::new(
            store.clone(),
            channel.clone(),
            saga.restore_policy,
        ));
        let order_handler = Arc::new(OrderParticipant::new(store, channel.clone()));

        let count = saga.consumers_per_participant.max(1);
        let mut inventory = Vec::with_capacity(count);
        let mut orders = Vec::with_capacity(count);
        for _ in 0..count {
            inventory.push(
                Consumer::subscribe(
                    channel.clone(),
                    Arc::clone(&inventory_handler),
                    channel_config,
                )
                .await?,
            );
            orders.push(
                Consumer::subscribe(channel.clone(), Arc::clone(&order_handler), channel_config)
                    .await?,
            );
        }

        tracing::info!(
            consumers = count,
            restore_policy = %saga.restore_policy,
            "saga consumers ready"
        );
        Ok(Self { inventory, orders })
    }

    /// Processes deliveries until both subscriptions are quiet.
    ///
    /// Returns how many deliveries were settled. Used where events must be
    /// fully propagated before continuing, such as tests.
    pub async fn drain(&self) -> event_channel::Result<usize> {
        let mut total = 0;
        loop {
            let mut settled = 0;
            for consumer in &self.inventory {
                settled += consumer.drain().await?;
            }
            for consumer in &self.orders {
                settled += consumer.drain().await?;
            }
            if settled == 0 {
                return Ok(total);
            }
            total += settled;
        }
    }

    /// Spawns every consumer as a task that stops once `shutdown` flips to true.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.inventory.len() + self.orders.len());
        for consumer in self.inventory {
            handles.push(tokio::spawn(consumer.run_until(stopped(shutdown.clone()))));
        }
        for consumer in self.orders {
            handles.push(tokio::spawn(consumer.run_until(stopped(shutdown.clone()))));
        }
        handles
    }
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    // A dropped sender also means shut down.
    let _ = shutdown.wait_for(|stop| *stop).await;
}
