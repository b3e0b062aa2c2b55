//! Adapter Event Surface
//!
//! Subscription capability held by every adapter. Listeners are registered
//! with [`EventEmitter::on`] and removed with the [`ListenerHandle`] it
//! returned.

use async_stream::stream;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

use super::error::WalletError;

/// Event emitted by a wallet adapter
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// The wallet transport was detected
    Ready,
    /// A connection was established
    Connect,
    /// The connection ended, by request or by the wallet
    Disconnect,
    /// An operation failed
    Error(WalletError),
}

impl AdapterEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AdapterEvent::Ready => "ready",
            AdapterEvent::Connect => "connect",
            AdapterEvent::Disconnect => "disconnect",
            AdapterEvent::Error(_) => "error",
        }
    }
}

/// Listener callback
pub type Listener = Arc<dyn Fn(&AdapterEvent) + Send + Sync>;

/// Stream of adapter events
pub type AdapterEventStream = Pin<Box<dyn Stream<Item = AdapterEvent> + Send>>;

/// Identity of a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

const STREAM_CAPACITY: usize = 64;

/// Synchronous listener registry plus a broadcast feed for async consumers
pub struct EventEmitter {
    listeners: Mutex<Vec<(ListenerHandle, Listener)>>,
    next_id: AtomicU64,
    feed: broadcast::Sender<AdapterEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            feed,
        }
    }

    /// Register a listener
    pub fn on<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&AdapterEvent) + Send + Sync + 'static,
    {
        let handle = ListenerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((handle, Arc::new(listener)));
        handle
    }

    /// Remove a listener, returns false when the handle was unknown
    pub fn off(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(h, _)| *h != handle);
        listeners.len() != before
    }

    /// Deliver an event to every listener and stream
    ///
    /// Listeners are called outside the registry lock, so they may
    /// subscribe or unsubscribe while being notified.
    pub fn emit(&self, event: AdapterEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        debug!("Emitting {} to {} listeners", event.name(), snapshot.len());
        for listener in snapshot {
            listener(&event);
        }
        // no receivers is fine
        let _ = self.feed.send(event);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Events emitted from now on
    pub fn stream(&self) -> AdapterEventStream {
        let mut receiver = self.feed.subscribe();
        let stream = stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Event stream lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Box::pin(stream)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
