use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Channel receiving every request lifecycle event across all rooms.
/// Approver dashboards listen here instead of per room.
pub const REQUESTS_CHANNEL: &str = "requests";

/// Channel name for a single room's events.
pub fn room_channel(room_id: Ulid) -> String {
    format!("room_{room_id}")
}

/// Broadcast hub backing LISTEN/NOTIFY, one channel per name.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a channel. Creates it if needed.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, channel: &str, event: &Event) {
        if let Some(sender) = self.channels.get(channel) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when its room is deleted).
    pub fn remove(&self, channel: &str) {
        self.channels.remove(channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        let mut rx = hub.subscribe(&room_channel(rid));

        let event = Event::RoomCreated {
            id: rid,
            building: "Main".into(),
            name: "101".into(),
        };
        hub.send(&room_channel(rid), &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        // No subscriber — should not panic
        hub.send(&room_channel(rid), &Event::RoomDeleted { id: rid });
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let hub = NotifyHub::new();
        let a = Ulid::new();
        let b = Ulid::new();
        let mut rx_a = hub.subscribe(&room_channel(a));
        let _rx_b = hub.subscribe(&room_channel(b));

        hub.send(&room_channel(b), &Event::RoomDeleted { id: b });
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn requests_channel_is_plain_name() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(REQUESTS_CHANNEL);
        let event = Event::RequestApproved {
            id: Ulid::new(),
            room_id: Ulid::new(),
            reviewed_by: "principal".into(),
            reviewed_at: 0,
        };
        hub.send(REQUESTS_CHANNEL, &event);
        assert_eq!(rx.recv().await.unwrap(), event);
    }
}
