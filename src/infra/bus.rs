//! In-process event bus
//!
//! A bounded mpsc channel feeds one dedicated consumer task. Handlers are
//! registered per event type before the loop starts and run sequentially in
//! registration order; a failing handler is logged and never aborts the loop
//! or its siblings. Delivery is FIFO per event type. Events published after
//! shutdown may be dropped.

use crate::domain::{Event, EventPayload, EventType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

/// A subscriber invoked by the bus consumer task
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event) -> anyhow::Result<()>;
}

/// Cheap clonable publishing handle
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<Event>,
}

impl EventPublisher {
    /// Enqueue an event for the consumer task.
    ///
    /// Never blocks; a full queue or a stopped bus drops the event with
    /// a warning.
    pub fn publish(&self, payload: EventPayload) {
        let event = Event::now(payload);
        let event_type = event.event_type();
        debug!(event_type = %event_type, "event_published");
        if let Err(e) = self.tx.try_send(event) {
            warn!(event_type = %event_type, error = %e, "event_dropped");
        }
    }
}

/// Publish/subscribe broker decoupling all booth components
pub struct EventBus {
    tx: mpsc::Sender<Event>,
    rx: mpsc::Receiver<Event>,
    subscribers: HashMap<EventType, Vec<Arc<dyn EventHandler>>>,
    poll_interval: Duration,
}

impl EventBus {
    pub fn new(capacity: usize, poll_interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self { tx, rx, subscribers: HashMap::new(), poll_interval }
    }

    /// Get a publishing handle for components
    pub fn publisher(&self) -> EventPublisher {
        EventPublisher { tx: self.tx.clone() }
    }

    /// Register a handler; handlers for a type run in registration order
    pub fn subscribe(&mut self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        let handlers = self.subscribers.entry(event_type).or_default();
        handlers.push(handler);
        info!(event_type = %event_type, handlers = handlers.len(), "bus_subscribed");
    }

    /// Run the consumer loop until the shutdown flag is set.
    ///
    /// Shutdown is cooperative: the flag is re-checked on every
    /// bounded-timeout dequeue, so stop latency is at most one poll
    /// interval.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) {
        info!(
            subscriptions = self.subscribers.values().map(Vec::len).sum::<usize>(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "event_bus_started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            match timeout(self.poll_interval, self.rx.recv()).await {
                Ok(Some(event)) => self.dispatch(event).await,
                // All publishers dropped
                Ok(None) => break,
                // Idle poll, loop to re-check the stop flag
                Err(_) => continue,
            }
        }

        info!("event_bus_stopped");
    }

    /// Invoke every handler for the event's type, isolating failures
    async fn dispatch(&self, event: Event) {
        let event_type = event.event_type();
        let Some(handlers) = self.subscribers.get(&event_type) else {
            debug!(event_type = %event_type, "event_unhandled");
            return;
        };

        for (index, handler) in handlers.iter().enumerate() {
            if let Err(e) = handler.handle(event.clone()).await {
                error!(
                    event_type = %event_type,
                    handler = index,
                    error = %e,
                    "event_handler_failed"
                );
            }
        }
    }
}
