use crate::types::Flat;
use tokio::sync::broadcast;

/// In-process fan-out of flattened events to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Flat>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Flat> {
        self.sender.subscribe()
    }

    /// Fails only when nobody is subscribed.
    pub fn publish(&self, event: Flat) -> Result<usize, broadcast::error::SendError<Flat>> {
        self.sender.send(event)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
