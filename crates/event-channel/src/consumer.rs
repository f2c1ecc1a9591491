use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;

use crate::{
    ChannelConfig, EventEnvelope, EventType, Result,
    channel::{Delivery, EventChannel, NackOutcome},
};

/// A participant that reacts to channel events.
///
/// Handlers must be idempotent: returning an error leaves the event for
/// redelivery, and a handler may also see an event again after a crash
/// between its side effects and the ack.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Error returned when an event could not be processed.
    type Error: std::fmt::Display + Send + Sync + 'static;

    /// Subscription name shared by every consumer of this handler.
    fn name(&self) -> &str;

    /// Event types the handler consumes. Empty means all.
    fn interests(&self) -> &[EventType];

    /// Processes one event.
    async fn handle(&self, event: &EventEnvelope) -> std::result::Result<(), Self::Error>;
}

/// How a single delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    Redelivering { attempt: u32 },
    Parked { attempts: u32 },
}

/// Pulls deliveries for one handler and settles them.
///
/// Any number of consumers may run for the same handler; the channel's
/// partition leases keep events for one order in sequence.
pub struct Consumer<C, H> {
    channel: C,
    handler: Arc<H>,
    handler_timeout: Duration,
    idle_poll_interval: Duration,
}

impl<C, H> Consumer<C, H>
where
    C: EventChannel,
    H: EventHandler,
{
    /// Registers the handler's subscription and creates a consumer for it.
    pub async fn subscribe(channel: C, handler: Arc<H>, config: &ChannelConfig) -> Result<Self> {
        channel
            .subscribe(handler.name(), handler.interests())
            .await?;
        Ok(Self {
            channel,
            handler,
            handler_timeout: config.handler_timeout,
            idle_poll_interval: config.idle_poll_interval,
        })
    }

    /// Returns the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Processes the next available delivery.
    ///
    /// Returns None if nothing was deliverable.
    pub async fn process_next(&self) -> Result<Option<DeliveryOutcome>> {
        let Some(delivery) = self.channel.poll(self.handler.name()).await? else {
            return Ok(None);
        };
        self.settle(delivery).await.map(Some)
    }

    /// Processes deliveries until none is available.
    ///
    /// Returns how many deliveries were settled.
    pub async fn drain(&self) -> Result<usize> {
        let mut settled = 0;
        while self.process_next().await?.is_some() {
            settled += 1;
        }
        Ok(settled)
    }

    /// Runs until `shutdown` resolves.
    ///
    /// A delivery already in progress is settled before the consumer stops.
    /// Channel errors are logged and retried after the idle interval.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let name = self.handler.name().to_string();
        tracing::info!(subscription = %name, "consumer started");

        tokio::pin!(shutdown);
        loop {
            if (&mut shutdown).now_or_never().is_some() {
                break;
            }

            match self.process_next().await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = self.channel.wait_for_work(&name, self.idle_poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(subscription = %name, error = %e, "consumer poll failed");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(self.idle_poll_interval) => {}
                    }
                }
            }
        }

        tracing::info!(subscription = %name, "consumer stopped");
    }

    #[tracing::instrument(
        skip(self, delivery),
        fields(
            subscription = %delivery.subscription,
            sequence = delivery.event.sequence,
            attempt = delivery.attempt
        )
    )]
    async fn settle(&self, delivery: Delivery) -> Result<DeliveryOutcome> {
        let envelope = match delivery.event.envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable event payload");
                return self.fail(&delivery, &e.to_string()).await;
            }
        };

        let start = Instant::now();
        let result =
            tokio::time::timeout(self.handler_timeout, self.handler.handle(&envelope)).await;
        metrics::histogram!(
            "channel_handler_duration_seconds",
            "subscription" => delivery.subscription.clone()
        )
        .record(start.elapsed().as_secs_f64());

        match result {
            Ok(Ok(())) => {
                self.channel.ack(&delivery).await?;
                Ok(DeliveryOutcome::Acked)
            }
            Ok(Err(e)) => self.fail(&delivery, &e.to_string()).await,
            Err(_) => {
                let reason = format!("handler timed out after {:?}", self.handler_timeout);
                self.fail(&delivery, &reason).await
            }
        }
    }

    async fn fail(&self, delivery: &Delivery, reason: &str) -> Result<DeliveryOutcome> {
        Ok(match self.channel.nack(delivery, reason).await? {
            NackOutcome::Redelivering { attempt } => DeliveryOutcome::Redelivering { attempt },
            NackOutcome::Parked { attempts } => DeliveryOutcome::Parked { attempts },
        })
    }
}
