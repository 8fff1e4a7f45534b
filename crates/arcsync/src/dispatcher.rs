//! Typed observer registry for inbound and local events.
//!
//! Three independent lists: game actions, state syncs, and conflicts.
//! Observers run synchronously on the task that delivers the event, in
//! registration order. They must not block.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use arcsync_protocol::{
    Action, ConflictPayload, ConnectionLostPayload, GameActionPayload,
    ServerEvent, StateSyncPayload,
};

/// Something the caller has to decide how to resolve.
///
/// Everything here arrives on the conflict channel. Nothing on this
/// channel mutates local state; resolution is left to the observer.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictEvent {
    /// The authority (or this client) saw an action based on a version
    /// other than the local one.
    Detected(ConflictPayload),
    /// The authority reported the link lost, or reconnection attempts
    /// ran out.
    ConnectionLost(ConnectionLostPayload),
    /// The validator explicitly refused the action. It was rolled back
    /// and will not be retried.
    ActionRejected { action: Action, reason: String },
    /// A queued action ran out of retries or didn't fit in the queue.
    ActionDropped { action: Action, retries: u32 },
}

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    GameAction,
    StateSync,
    Conflict,
}

struct ObserverList<T> {
    entries: Vec<(u64, Observer<T>)>,
}

impl<T> ObserverList<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn snapshot(&self) -> Vec<Observer<T>> {
        self.entries.iter().map(|(_, f)| Arc::clone(f)).collect()
    }

    fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }
}

struct Registry {
    next_id: u64,
    game_actions: ObserverList<GameActionPayload>,
    state_syncs: ObserverList<StateSyncPayload>,
    conflicts: ObserverList<ConflictEvent>,
}

impl Registry {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Handle returned by every `on_*` registration.
///
/// Dropping it leaves the observer registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    topic: Topic,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Removes the observer. Returns `false` if it was already gone, or
    /// if the dispatcher no longer exists.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
        match self.topic {
            Topic::GameAction => registry.game_actions.remove(self.id),
            Topic::StateSync => registry.state_syncs.remove(self.id),
            Topic::Conflict => registry.conflicts.remove(self.id),
        }
    }
}

/// Routes events to registered observers. Cheap to clone; clones share
/// the same observer lists.
#[derive(Clone)]
pub struct EventDispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 1,
                game_actions: ObserverList::new(),
                state_syncs: ObserverList::new(),
                conflicts: ObserverList::new(),
            })),
        }
    }

    pub fn on_game_action(
        &self,
        observer: impl Fn(&GameActionPayload) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = self.lock();
        let id = registry.next_id();
        registry.game_actions.entries.push((id, Arc::new(observer)));
        self.subscription(id, Topic::GameAction)
    }

    pub fn on_state_sync(
        &self,
        observer: impl Fn(&StateSyncPayload) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = self.lock();
        let id = registry.next_id();
        registry.state_syncs.entries.push((id, Arc::new(observer)));
        self.subscription(id, Topic::StateSync)
    }

    pub fn on_conflict(
        &self,
        observer: impl Fn(&ConflictEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = self.lock();
        let id = registry.next_id();
        registry.conflicts.entries.push((id, Arc::new(observer)));
        self.subscription(id, Topic::Conflict)
    }

    /// Forwards a server event to the matching observer list.
    ///
    /// Closed dispatch over the event tag. Heartbeats and state-sync
    /// requests have no observers; for those this returns `false`.
    pub fn dispatch(&self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::GameAction(payload) => {
                self.emit_game_action(payload);
                true
            }
            ServerEvent::StateSync(payload) => {
                self.emit_state_sync(payload);
                true
            }
            ServerEvent::ConflictDetected(payload) => {
                self.emit_conflict(&ConflictEvent::Detected(payload.clone()));
                true
            }
            ServerEvent::ConnectionLost(payload) => {
                self.emit_conflict(&ConflictEvent::ConnectionLost(payload.clone()));
                true
            }
            ServerEvent::Heartbeat(_) | ServerEvent::RequestStateSync(_) => false,
        }
    }

    pub fn emit_game_action(&self, payload: &GameActionPayload) {
        let observers = self.lock().game_actions.snapshot();
        for observer in observers {
            observer(payload);
        }
    }

    pub fn emit_state_sync(&self, payload: &StateSyncPayload) {
        let observers = self.lock().state_syncs.snapshot();
        for observer in observers {
            observer(payload);
        }
    }

    pub fn emit_conflict(&self, event: &ConflictEvent) {
        let observers = self.lock().conflicts.snapshot();
        for observer in observers {
            observer(event);
        }
    }

    fn subscription(&self, id: u64, topic: Topic) -> Subscription {
        Subscription {
            id,
            topic,
            registry: Arc::downgrade(&self.registry),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
