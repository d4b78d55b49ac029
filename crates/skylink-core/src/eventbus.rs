//! Event bus for the control plane's telemetry output.
//!
//! Components publish [`SkylinkEvent`]s here; external reporting subscribes.
//! The bus uses a broadcast channel, so events are distributed to every
//! subscriber and discarded when nobody listens.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::event::{EventMetadata, SkylinkEvent};

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Shared handle to an event bus.
pub type SharedEventBus = Arc<EventBus>;

/// Event bus distributing telemetry events to subscribers.
///
/// Supports:
/// - Publishing events with automatic metadata generation
/// - Subscribing to all events
/// - Filtered subscriptions for specific event families
#[derive(Clone)]
pub struct EventBus {
    /// Broadcast channel sender
    tx: broadcast::Sender<(SkylinkEvent, EventMetadata)>,
    /// Event bus name for identification
    name: String,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the specified capacity.
    ///
    /// The capacity determines how many events are buffered for slow
    /// subscribers.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            name: "default".to_string(),
        }
    }

    /// Create a new event bus with a name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            tx: broadcast::channel(DEFAULT_CHANNEL_CAPACITY).0,
            name: name.into(),
        }
    }

    /// Get the name of this event bus.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event with default metadata.
    ///
    /// Returns `true` if there was at least one subscriber.
    pub fn publish(&self, event: SkylinkEvent) -> bool {
        self.publish_with_source(event, "system")
    }

    /// Publish an event with a custom source.
    pub fn publish_with_source(&self, event: SkylinkEvent, source: impl Into<String>) -> bool {
        let metadata = EventMetadata::new(source);
        self.publish_with_metadata(event, metadata)
    }

    /// Publish an event with custom metadata.
    pub fn publish_with_metadata(&self, event: SkylinkEvent, metadata: EventMetadata) -> bool {
        self.tx.send((event, metadata)).is_ok()
    }

    /// Subscribe to all events.
    ///
    /// Returns a receiver that will receive all published events.
    /// If the subscriber falls behind, older events may be dropped.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Subscribe to events matching a filter.
    ///
    /// The filter is a function that returns `true` for events to receive.
    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&SkylinkEvent) -> bool + Send + 'static,
    {
        let rx = self.tx.subscribe();
        FilteredReceiver::new(rx, filter)
    }

    /// Create a filtered subscription helper for common patterns.
    pub fn filter(&self) -> FilterBuilder {
        FilterBuilder {
            tx: self.tx.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for all events from the event bus.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<(SkylinkEvent, EventMetadata)>,
}

impl EventBusReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the event bus is closed.
    pub async fn recv(&mut self) -> Option<(SkylinkEvent, EventMetadata)> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => {
                // We missed some events, but can continue receiving
                self.rx.try_recv().ok()
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<(SkylinkEvent, EventMetadata)> {
        self.rx.try_recv().ok()
    }

    /// Get the underlying broadcast receiver.
    pub fn into_inner(self) -> broadcast::Receiver<(SkylinkEvent, EventMetadata)> {
        self.rx
    }
}

/// Receiver for filtered events from the event bus.
pub struct FilteredReceiver<F>
where
    F: Fn(&SkylinkEvent) -> bool + Send,
{
    rx: broadcast::Receiver<(SkylinkEvent, EventMetadata)>,
    filter: F,
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&SkylinkEvent) -> bool + Send,
{
    fn new(rx: broadcast::Receiver<(SkylinkEvent, EventMetadata)>, filter: F) -> Self {
        Self { rx, filter }
    }

    /// Receive the next event matching the filter.
    ///
    /// Returns `None` if the event bus is closed.
    pub async fn recv(&mut self) -> Option<(SkylinkEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a matching event without blocking.
    pub fn try_recv(&mut self) -> Option<(SkylinkEvent, EventMetadata)> {
        while let Ok((event, meta)) = self.rx.try_recv() {
            if (self.filter)(&event) {
                return Some((event, meta));
            }
        }
        None
    }
}

/// Builder for creating filtered subscriptions.
pub struct FilterBuilder {
    tx: broadcast::Sender<(SkylinkEvent, EventMetadata)>,
}

impl FilterBuilder {
    /// Subscribe to rate-adaptation events only.
    pub fn adr_events(&self) -> FilteredReceiver<fn(&SkylinkEvent) -> bool> {
        let rx = self.tx.subscribe();
        FilteredReceiver::new(rx, SkylinkEvent::is_adr_event)
    }

    /// Subscribe to statistics events only.
    pub fn statistics_events(&self) -> FilteredReceiver<fn(&SkylinkEvent) -> bool> {
        let rx = self.tx.subscribe();
        FilteredReceiver::new(rx, SkylinkEvent::is_statistics_event)
    }

    /// Subscribe to command lifecycle events only.
    pub fn command_events(&self) -> FilteredReceiver<fn(&SkylinkEvent) -> bool> {
        let rx = self.tx.subscribe();
        FilteredReceiver::new(rx, SkylinkEvent::is_command_event)
    }

    /// Subscribe to events for a specific device.
    pub fn device(
        &self,
        device: crate::types::DevAddr,
    ) -> FilteredReceiver<impl Fn(&SkylinkEvent) -> bool + Send + 'static> {
        let rx = self.tx.subscribe();
        FilteredReceiver::new(rx, move |event| event.device() == Some(device))
    }
}
