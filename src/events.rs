//! Tree change notifications
//!
//! A handle owns an [`EventBus`]; each subscriber gets its own unbounded
//! channel. Dropping the bus drops every sender, which disconnects the
//! receivers.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::path::PathBuf;

/// A change to a handle's working tree or its writable layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    Created { path: String },
    Deleted { path: String },
    Renamed { from: String, to: String },
    AttributeChanged { path: String, name: String },
    ContentChanged { path: String },
    Saved { layer: PathBuf },
    ExternallyChanged { layer: PathBuf },
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<TreeEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<TreeEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver to every live subscriber, forgetting the ones that hung up
    pub fn publish(&self, event: TreeEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
