//! Typed publish/subscribe for board events.
//!
//! The board only knows the [`Notifier`] trait. [`EventBus`] is the shipped
//! implementation: callbacks and channel receivers registered at runtime,
//! delivered synchronously and fire-and-forget.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::model::{Status, TicketId};

/// Domain events emitted by the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum BoardEvent {
    Created { ticket_id: TicketId, key: String },
    Moved { ticket_id: TicketId, from: Status, to: Status },
    Updated { ticket_id: TicketId },
    Deleted { ticket_id: TicketId },
    ParentUpdated { parent_id: TicketId, new_status: Status },
}

impl BoardEvent {
    /// Wire name of the event kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Moved { .. } => "moved",
            Self::Updated { .. } => "updated",
            Self::Deleted { .. } => "deleted",
            Self::ParentUpdated { .. } => "parent-updated",
        }
    }

    /// The ticket the event is about.
    #[must_use]
    pub const fn ticket_id(&self) -> &TicketId {
        match self {
            Self::Created { ticket_id, .. }
            | Self::Moved { ticket_id, .. }
            | Self::Updated { ticket_id }
            | Self::Deleted { ticket_id } => ticket_id,
            Self::ParentUpdated { parent_id, .. } => parent_id,
        }
    }
}

/// Sink for board events.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &BoardEvent);
}

/// Notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: &BoardEvent) {}
}

/// Handle returned by [`EventBus::subscribe`]; pass to
/// [`EventBus::unsubscribe`] to stop delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&BoardEvent) + Send + Sync>;

#[derive(Clone)]
enum Subscriber {
    Callback(Callback),
    Channel(Sender<BoardEvent>),
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

/// In-process event bus.
///
/// Delivery happens outside the registry lock, so callbacks may subscribe or
/// unsubscribe. Channel subscribers whose receiver was dropped are removed on
/// the next publish.
#[derive(Default)]
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked for every event.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&BoardEvent) + Send + Sync + 'static,
    {
        self.register(Subscriber::Callback(Arc::new(callback)))
    }

    /// Register a channel; every event is sent to the returned receiver.
    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<BoardEvent>) {
        let (tx, rx) = mpsc::channel();
        (self.register(Subscriber::Channel(tx)), rx)
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|(sid, _)| *sid != id);
        registry.subscribers.len() != before
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Deliver `event` to every subscriber.
    pub fn publish(&self, event: &BoardEvent) {
        let snapshot = self.lock().subscribers.clone();
        trace!(kind = event.kind(), ticket_id = %event.ticket_id(), subscribers = snapshot.len(), "publish");

        let mut dead = Vec::new();
        for (id, subscriber) in snapshot {
            match subscriber {
                Subscriber::Callback(callback) => callback(event),
                Subscriber::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        dead.push(id);
                    }
                }
            }
        }

        if !dead.is_empty() {
            self.lock()
                .subscribers
                .retain(|(id, _)| !dead.contains(id));
        }
    }

    fn register(&self, subscriber: Subscriber) -> SubscriptionId {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.subscribers.push((id, subscriber));
        id
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Notifier for EventBus {
    fn notify(&self, event: &BoardEvent) {
        self.publish(event);
    }
}
