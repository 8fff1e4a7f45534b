//! In-process pub/sub hub.
//!
//! Every [`MemoryChannel`] opened on the same topic of one [`MemoryHub`]
//! sees the events the others send. The hub also plays the part of the
//! authority in tests: [`MemoryHub::inject`] delivers an event to every
//! subscriber of a topic, and [`MemoryHub::set_online`] /
//! [`MemoryHub::fail_next_sends`] simulate partitions.
//!
//! Every successful send is recorded in order, so tests can assert on
//! exactly what reached the wire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::{Channel, ChannelId, Connector, Frame, TransportError};

/// Counter for generating unique channel IDs.
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// One event that went out through the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub channel: ChannelId,
    pub topic: String,
    pub event: String,
    pub payload: Vec<u8>,
}

struct HubState {
    online: bool,
    failing_sends: usize,
    subscribers: HashMap<String, Vec<(ChannelId, mpsc::UnboundedSender<Frame>)>>,
    sent: Vec<SentFrame>,
    opened: usize,
    subscribe_attempts: usize,
}

/// A shared in-process message hub. Cheap to clone.
#[derive(Clone)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    /// Creates an empty, online hub.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                online: true,
                failing_sends: 0,
                subscribers: HashMap::new(),
                sent: Vec::new(),
                opened: 0,
                subscribe_attempts: 0,
            })),
        }
    }

    /// A connector that opens channels on this hub.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector { hub: self.clone() }
    }

    /// Takes the hub on- or offline.
    ///
    /// Going offline drops every subscription, so every open channel's
    /// `recv` returns `Ok(None)`. While offline, subscribe and send fail.
    pub fn set_online(&self, online: bool) {
        let mut state = self.lock();
        state.online = online;
        if !online {
            state.subscribers.clear();
        }
        tracing::debug!(online, "memory hub connectivity changed");
    }

    /// Makes the next `n` sends fail without taking the hub offline.
    pub fn fail_next_sends(&self, n: usize) {
        self.lock().failing_sends = n;
    }

    /// Delivers an event to every subscriber of `topic`, as if the
    /// authority had published it.
    pub fn inject(&self, topic: &str, event: &str, payload: Vec<u8>) {
        let state = self.lock();
        if let Some(subs) = state.subscribers.get(topic) {
            for (_, tx) in subs {
                let _ = tx.send(Frame {
                    event: event.to_string(),
                    payload: payload.clone(),
                });
            }
        }
    }

    /// Every successful send so far, in order.
    pub fn sent(&self) -> Vec<SentFrame> {
        self.lock().sent.clone()
    }

    /// Successful sends of one event name, in order.
    pub fn sent_events(&self, event: &str) -> Vec<SentFrame> {
        self.lock()
            .sent
            .iter()
            .filter(|f| f.event == event)
            .cloned()
            .collect()
    }

    /// How many channels have been opened.
    pub fn opened(&self) -> usize {
        self.lock().opened
    }

    /// How many subscribe calls were made, successful or not.
    pub fn subscribe_attempts(&self) -> usize {
        self.lock().subscribe_attempts
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().subscribers.get(topic).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // A panic while holding this lock can only come from a bug in this
        // module; recovering the data is fine for a test hub.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// [`Connector`] for a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryConnector {
    hub: MemoryHub,
}

impl Connector for MemoryConnector {
    type Channel = MemoryChannel;

    async fn open(&self, topic: &str) -> Result<MemoryChannel, TransportError> {
        let id = ChannelId::new(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub.lock().opened += 1;
        tracing::debug!(%id, topic, "memory channel opened");
        Ok(MemoryChannel {
            id,
            topic: topic.to_string(),
            hub: self.hub.clone(),
            pending_tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
        })
    }
}

/// A channel on a [`MemoryHub`].
pub struct MemoryChannel {
    id: ChannelId,
    topic: String,
    hub: MemoryHub,
    /// Held until subscribe hands it to the hub. Once the hub drops it
    /// (unsubscribe, hub offline), `recv` sees the end of the stream.
    pending_tx: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
}

impl Channel for MemoryChannel {
    async fn subscribe(&self) -> Result<(), TransportError> {
        let mut state = self.hub.lock();
        state.subscribe_attempts += 1;
        if !state.online {
            return Err(TransportError::ConnectionClosed("hub offline".into()));
        }
        let tx = self
            .pending_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| TransportError::SubscribeFailed("already subscribed".into()))?;
        state
            .subscribers
            .entry(self.topic.clone())
            .or_default()
            .push((self.id, tx));
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        let mut state = self.hub.lock();
        if let Some(subs) = state.subscribers.get_mut(&self.topic) {
            subs.retain(|(id, _)| *id != self.id);
        }
        // Never subscribed: drop the sender we still hold so recv ends.
        self.pending_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }

    async fn send(&self, event: &str, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = self.hub.lock();
        if !state.online {
            return Err(TransportError::ConnectionClosed("hub offline".into()));
        }
        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected send failure",
            )));
        }
        state.sent.push(SentFrame {
            channel: self.id,
            topic: self.topic.clone(),
            event: event.to_string(),
            payload: payload.to_vec(),
        });
        if let Some(subs) = state.subscribers.get(&self.topic) {
            for (id, tx) in subs {
                if *id != self.id {
                    let _ = tx.send(Frame {
                        event: event.to_string(),
                        payload: payload.to_vec(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Frame>, TransportError> {
        Ok(self.rx.lock().await.recv().await)
    }

    fn id(&self) -> ChannelId {
        self.id
    }
}
