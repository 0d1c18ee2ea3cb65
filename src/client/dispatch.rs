use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::gateway::GatewayError;
use crate::model::event::{Event, EventType};
use crate::model::id::ShardId;

/// A handler for one subscribed event type. The [`ShardId`] is the shard the dispatch arrived
/// on.
pub type EventHandler = Arc<dyn Fn(ShardId, &Event) + Send + Sync>;

/// A handler for debug breadcrumbs emitted by the shards and the manager.
pub type DebugHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// A handler for fatal per-shard errors surfaced by the manager.
pub type ErrorHandler = Arc<dyn Fn(&GatewayError) + Send + Sync>;

/// A handler called whenever a shard reaches Ready.
pub type ShardOnlineHandler = Arc<dyn Fn(ShardId) + Send + Sync>;

/// The subscriber registry: typed subscriptions by event name, plus the meta hooks.
///
/// Dispatch is fanned out synchronously per subscription, in subscription order, tagged with the
/// originating shard. The registry is only locked to mutate on subscribe; dispatching clones a
/// snapshot of the handler list and calls outside the lock, so handlers may subscribe
/// re-entrantly.
#[derive(Default)]
pub struct Subscriptions {
    events: RwLock<HashMap<EventType, Vec<EventHandler>>>,
    debug: RwLock<Vec<DebugHandler>>,
    errors: RwLock<Vec<ErrorHandler>>,
    shard_online: RwLock<Vec<ShardOnlineHandler>>,
}

impl Subscriptions {
    /// Registers `handler` to be called for every dispatch of type `kind`.
    pub fn subscribe(&self, kind: EventType, handler: EventHandler) {
        self.events.write().entry(kind).or_default().push(handler);
    }

    /// Registers a handler for debug breadcrumbs.
    pub fn on_debug(&self, handler: DebugHandler) {
        self.debug.write().push(handler);
    }

    /// Registers a handler for fatal per-shard errors.
    pub fn on_error(&self, handler: ErrorHandler) {
        self.errors.write().push(handler);
    }

    /// Registers a handler called when a shard reaches Ready.
    pub fn on_shard_online(&self, handler: ShardOnlineHandler) {
        self.shard_online.write().push(handler);
    }

    pub(crate) fn dispatch(&self, shard_id: ShardId, event: &Event) {
        let handlers = {
            let events = self.events.read();
            events.get(&event.event_type()).cloned()
        };

        if let Some(handlers) = handlers {
            for handler in handlers {
                handler(shard_id, event);
            }
        }
    }

    pub(crate) fn debug(&self, msg: &str) {
        let handlers = self.debug.read().clone();

        for handler in handlers {
            handler(msg);
        }
    }

    pub(crate) fn error(&self, error: &GatewayError) {
        let handlers = self.errors.read().clone();

        for handler in handlers {
            handler(error);
        }
    }

    pub(crate) fn shard_online(&self, shard_id: ShardId) {
        let handlers = self.shard_online.read().clone();

        for handler in handlers {
            handler(shard_id);
        }
    }
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("event_types", &self.events.read().len())
            .field("debug", &self.debug.read().len())
            .field("errors", &self.errors.read().len())
            .field("shard_online", &self.shard_online.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::Subscriptions;
    use crate::model::event::{Event, EventType, ResumedEvent, TypingStartEvent};
    use crate::model::id::{ChannelId, ShardId, UserId};

    fn typing_event() -> Event {
        Event::TypingStart(TypingStartEvent {
            channel_id: ChannelId::new(1),
            user_id: UserId::new(2),
            guild_id: None,
            timestamp: 0,
        })
    }

    #[test]
    fn dispatch_only_reaches_matching_subscriptions() {
        let subs = Subscriptions::default();
        let typing = Arc::new(AtomicUsize::new(0));
        let resumed = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&typing);
        subs.subscribe(
            EventType::TypingStart,
            Arc::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let counter = Arc::clone(&resumed);
        subs.subscribe(
            EventType::Resumed,
            Arc::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        subs.dispatch(ShardId(0), &typing_event());
        subs.dispatch(ShardId(0), &Event::Resumed(ResumedEvent {}));
        subs.dispatch(ShardId(0), &typing_event());

        assert_eq!(typing.load(Ordering::SeqCst), 2);
        assert_eq!(resumed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_tags_the_originating_shard() {
        let subs = Subscriptions::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        subs.subscribe(
            EventType::TypingStart,
            Arc::new(move |shard_id, _| {
                sink.lock().unwrap().push(shard_id);
            }),
        );

        subs.dispatch(ShardId(3), &typing_event());
        subs.dispatch(ShardId(1), &typing_event());

        assert_eq!(*seen.lock().unwrap(), vec![ShardId(3), ShardId(1)]);
    }

    #[test]
    fn fan_out_runs_in_subscription_order() {
        let subs = Subscriptions::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let sink = Arc::clone(&order);
            subs.subscribe(
                EventType::TypingStart,
                Arc::new(move |_, _| {
                    sink.lock().unwrap().push(tag);
                }),
            );
        }

        subs.dispatch(ShardId(0), &typing_event());

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
