use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-facility broadcast of committed ledger events.
///
/// Notification collaborators (email, dashboards) subscribe here; the engine
/// only publishes after an event is durable.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a facility's events. Creates the channel if needed.
    pub fn subscribe(&self, facility_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(facility_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, facility_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&facility_id) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn subscriber_count(&self, facility_id: &Ulid) -> usize {
        self.channels
            .get(facility_id)
            .map_or(0, |s| s.receiver_count())
    }
}
