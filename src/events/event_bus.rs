use super::types::{EngineEvent, EventKind};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Event subscriber handle
pub struct EventSubscriber {
    receiver: broadcast::Receiver<EngineEvent>,
    filter: Option<EventFilter>,
}

impl EventSubscriber {
    /// Create a new subscriber with an optional filter
    pub fn new(receiver: broadcast::Receiver<EngineEvent>, filter: Option<EventFilter>) -> Self {
        Self { receiver, filter }
    }

    fn accepts(&self, event: &EngineEvent) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter.matches(event))
    }

    /// Receive the next event matching the filter.
    ///
    /// Returns `None` once the engine is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive without blocking
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(_) => return None,
            }
        }
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    kinds: Option<Vec<EventKind>>,
    property_names: Option<Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kinds(mut self, kinds: Vec<EventKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Only let through property changes for these names. Other event
    /// kinds are unaffected.
    pub fn with_property_names(mut self, names: Vec<String>) -> Self {
        self.property_names = Some(names);
        self
    }

    pub fn matches(&self, event: &EngineEvent) -> bool {
        if let Some(ref kinds) = self.kinds
            && !kinds.contains(&event.kind())
        {
            return false;
        }

        if let (Some(names), EngineEvent::PropertyChange(change)) = (&self.property_names, event)
            && !names.iter().any(|name| *name == change.name)
        {
            return false;
        }

        true
    }
}

/// Broadcast fan-out for decoded engine events
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
    stats: Mutex<EventBusStats>,
}

#[derive(Debug, Default, Clone)]
pub struct EventBusStats {
    pub total_events: u64,
    pub events_by_kind: HashMap<&'static str, u64>,
    pub subscriber_count: usize,
    pub undelivered_events: u64,
}

impl EventBus {
    /// Create a new event bus with specified buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            stats: Mutex::new(EventBusStats::default()),
        }
    }

    /// Publish an event to all subscribers. Never blocks.
    pub fn publish(&self, event: EngineEvent) {
        trace!("Publishing engine event: {}", event.kind().as_str());

        let delivered = self.sender.send(event.clone()).is_ok();

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.total_events += 1;
        *stats.events_by_kind.entry(event.kind().as_str()).or_insert(0) += 1;
        if !delivered {
            // No subscribers is normal
            stats.undelivered_events += 1;
        }
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), None)
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), Some(filter))
    }

    /// Subscribe to specific event kinds
    pub fn subscribe_to_kinds(&self, kinds: Vec<EventKind>) -> EventSubscriber {
        self.subscribe_filtered(EventFilter::new().with_kinds(kinds))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stats(&self) -> EventBusStats {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        EventBusStats {
            subscriber_count: self.subscriber_count(),
            ..stats.clone()
        }
    }
}
