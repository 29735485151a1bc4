//! "A bookmark changed" notifications between execution contexts.
//!
//! Each context (popup, manager, background) owns an [`UpdateNotifier`].
//! Publishing sends the url over a named [`BroadcastChannel`], which every
//! other context listening on that name receives, and over a local channel
//! for listeners in the publishing context itself. Delivery is
//! fire-and-forget and at most once; subscribers see only what is
//! published after they subscribe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

pub const UPDATE_CHANNEL: &str = "bookmark_db_update";

const CHANNEL_CAPACITY: usize = 64;

static NEXT_ENDPOINT: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
struct Envelope {
    origin: u64,
    payload: String,
}

/// Registry of named broadcast channels shared by all contexts of a process.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Envelope>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new endpoint on channel `name`.
    pub fn open(&self, name: &str) -> BroadcastChannel {
        let sender = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();

        BroadcastChannel {
            name: name.to_string(),
            id: NEXT_ENDPOINT.fetch_add(1, Ordering::Relaxed),
            sender,
        }
    }
}

/// One endpoint of a named channel. Messages it posts reach every other
/// endpoint with the same name, never itself.
#[derive(Clone)]
pub struct BroadcastChannel {
    name: String,
    id: u64,
    sender: broadcast::Sender<Envelope>,
}

impl BroadcastChannel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn post_message(&self, message: &str) {
        // No listeners is not an error.
        let _ = self.sender.send(Envelope {
            origin: self.id,
            payload: message.to_string(),
        });
    }

    /// Messages posted by other endpoints from now on.
    pub fn messages(&self) -> impl Stream<Item = String> + Send + 'static {
        let own = self.id;
        receive(self.sender.subscribe(), move |envelope: Envelope| {
            (envelope.origin != own).then_some(envelope.payload)
        })
    }
}

fn receive<T, F>(rx: broadcast::Receiver<T>, accept: F) -> impl Stream<Item = String> + Send + 'static
where
    T: Clone + Send + 'static,
    F: Fn(T) -> Option<String> + Send + Sync + 'static,
{
    let accept = Arc::new(accept);
    stream::unfold(rx, move |mut rx| {
        let accept = Arc::clone(&accept);
        async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if let Some(payload) = (*accept)(message) {
                            return Some((payload, rx));
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("Update subscriber lagged, dropped {} notifications", missed);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }
    })
}

/// Publishes and observes bookmark changes for one execution context.
#[derive(Clone)]
pub struct UpdateNotifier {
    channel: BroadcastChannel,
    local: broadcast::Sender<String>,
}

impl UpdateNotifier {
    pub fn new(hub: &BroadcastHub) -> Self {
        Self::with_channel(hub, UPDATE_CHANNEL)
    }

    pub fn with_channel(hub: &BroadcastHub, name: &str) -> Self {
        Self {
            channel: hub.open(name),
            local: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn publish(&self, url: &str) {
        tracing::debug!("Publishing update for {}", url);
        self.channel.post_message(url);
        let _ = self.local.send(url.to_string());
    }

    /// Urls published from now on, by this context or any other.
    pub fn subscribe(&self) -> BoxStream<'static, String> {
        let remote = self.channel.messages();
        let local = receive(self.local.subscribe(), Some);
        stream::select(remote, local).boxed()
    }
}
