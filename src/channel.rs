//! Bounded event channels between pipeline stages.
//!
//! All stage-to-stage handoff goes through these channels. Capacity is fixed
//! at construction and the send side never blocks: when a channel is full the
//! new event is dropped (drop-new), a warning is logged, and the channel's
//! drop counter advances. Consumers block on `recv`, which is how the stages
//! idle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::error::{BfpError, BfpResult};
use crate::event::Event;

/// Creates a named bounded channel. Zero capacity is a configuration error.
pub fn event_channel(
    name: &'static str,
    capacity: usize,
) -> BfpResult<(EventSender, EventReceiver)> {
    if capacity == 0 {
        return Err(BfpError::Configuration(format!(
            "channel '{name}' capacity must be non-zero"
        )));
    }
    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    Ok((
        EventSender {
            name,
            tx,
            dropped: Arc::clone(&dropped),
        },
        EventReceiver { name, rx },
    ))
}

/// Producer half of an event channel. Cloneable; all clones share the drop
/// counter.
#[derive(Clone)]
pub struct EventSender {
    name: &'static str,
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Publishes an event without blocking.
    ///
    /// A full channel drops the new event: the drop is counted, warned, and
    /// reported as `ChannelFull`. A closed channel reports `ChannelClosed`.
    pub fn try_publish(&self, event: Event) -> BfpResult<()> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(channel = self.name, dropped, "event dropped: channel full");
                Err(BfpError::ChannelFull { channel: self.name })
            }
            Err(TrySendError::Closed(_)) => Err(BfpError::ChannelClosed { channel: self.name }),
        }
    }

    /// Channel name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Events dropped on this channel since creation.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Capacity the channel was created with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("name", &self.name)
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

/// Consumer half of an event channel.
pub struct EventReceiver {
    name: &'static str,
    rx: mpsc::Receiver<Event>,
}

impl EventReceiver {
    /// Waits for the next event. `None` means every sender is gone and the
    /// channel is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for draining in tests and shutdown paths.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Channel name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReceiver")
            .field("name", &self.name)
            .finish()
    }
}
