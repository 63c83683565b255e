use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::events::RoomEvent;

/// Room-scoped pub/sub seam. Implementations must not block: `publish` is
/// called while the publishing room's state lock is held, which is what keeps
/// a single room's event stream in application order.
pub trait TransportRepository: Send + Sync {
    fn publish(&self, room_id: &str, event: &RoomEvent);
}

/// In-process fan-out over one broadcast channel per room. Subscribers that
/// lag far enough to overflow the channel miss events rather than stalling
/// the room.
pub struct BroadcastTransport {
    channels: Mutex<HashMap<String, broadcast::Sender<RoomEvent>>>,
    capacity: usize,
}

impl BroadcastTransport {
    pub fn new(capacity: usize) -> Self {
        BroadcastTransport {
            channels: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribe to a room's event stream, creating the channel on first use.
    pub fn subscribe(&self, room_id: &str) -> broadcast::Receiver<RoomEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drop a room's channel once the room is evicted.
    pub fn remove_room(&self, room_id: &str) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.remove(room_id);
    }
}

impl Default for BroadcastTransport {
    fn default() -> Self {
        Self::new(256)
    }
}

impl TransportRepository for BroadcastTransport {
    fn publish(&self, room_id: &str, event: &RoomEvent) {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = channels.get(room_id) {
            // Err here only means nobody is subscribed right now.
            if sender.send(event.clone()).is_err() {
                debug!(room_id, "No subscribers for room event");
            }
        }
    }
}
