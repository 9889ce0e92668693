//! Single-threaded, in-tick event bus.
//!
//! Handlers are invoked in subscription order. A handler does not call
//! back into the bus; instead it returns the events it raises, and the
//! bus publishes each of them depth-first -- every raised event completes
//! a full fanout before the original event reaches the next handler.
//! That lets a single `time` event cascade through the state machines and
//! the health/status/chat handlers within one tick.
//!
//! The subscriber set is sampled at each publish, so a handler subscribed
//! between publishes sees every event from that point on and nothing
//! earlier.
//!
//! Once the tick context is cancelled, events that would be published are
//! handed to the context's spill sink instead; the driver persists them
//! into the config's redelivery queue for the next tick.
//!
//! Recursion is capped to keep an accidental event loop (for example a
//! `startFailed` handler re-publishing `start`) from spinning forever
//! inside a tick.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use oceanbench_types::Event;

use crate::context::TickContext;
use crate::error::OrchestratorError;

/// Maximum depth of nested publishes within one tick.
const MAX_PUBLISH_DEPTH: usize = 16;

/// A bus subscriber.
///
/// Handlers may perform side effects through the context's adapters but
/// must not block without a timeout; network work belongs to adapters
/// that carry their own.
#[async_trait]
pub trait EventHandler: Send {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// React to one event, returning any events raised in response.
    async fn handle(
        &mut self,
        ctx: &mut TickContext,
        event: &Event,
    ) -> Result<Vec<Event>, OrchestratorError>;
}

/// The per-broadcast, per-tick event bus.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<Box<dyn EventHandler>>,
    trace: Vec<&'static str>,
}

impl EventBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. Handlers receive events in subscription order.
    pub fn subscribe(&mut self, handler: Box<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Publish an event to every current subscriber.
    pub async fn publish(
        &mut self,
        ctx: &mut TickContext,
        event: Event,
    ) -> Result<(), OrchestratorError> {
        self.publish_at(ctx, event, 0).await
    }

    /// The tags of every event published this tick, in publish order.
    pub fn trace(&self) -> &[&'static str] {
        &self.trace
    }

    fn publish_at<'a>(
        &'a mut self,
        ctx: &'a mut TickContext,
        event: Event,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<(), OrchestratorError>> + Send + 'a>> {
        Box::pin(async move {
            if ctx.cancelled() {
                ctx.spill(&event);
                return Ok(());
            }
            if depth >= MAX_PUBLISH_DEPTH {
                return Err(OrchestratorError::EventLoop {
                    depth,
                    tag: event.tag(),
                });
            }

            self.trace.push(event.tag());
            tracing::debug!(event = event.tag(), depth, "Publishing event");

            let mut index = 0;
            while index < self.handlers.len() {
                let raised = match self.handlers.get_mut(index) {
                    Some(handler) => handler.handle(ctx, &event).await?,
                    None => break,
                };
                for follow_up in raised {
                    self.publish_at(ctx, follow_up, depth.saturating_add(1))
                        .await?;
                }
                index = index.saturating_add(1);
            }
            Ok(())
        })
    }
}
