//! Room membership via per-room broadcast channels.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use parley::channel::ChannelEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcast channel per room, created on first join.
///
/// A client joins a room by subscribing to its channel; publishing reaches
/// every client subscribed at that moment. A room is dropped once its last
/// member leaves, so the map only holds rooms with live members (plus any
/// emptied since the last join or [`prune`](Rooms::prune)).
pub struct Rooms {
    capacity: usize,
    rooms: Mutex<HashMap<String, broadcast::Sender<ChannelEvent>>>,
}

impl Rooms {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<ChannelEvent>>> {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn join(&self, room_id: &str) -> broadcast::Receiver<ChannelEvent> {
        let mut rooms = self.lock();
        sweep(&mut rooms);
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                debug!("Created room {room_id}");
                broadcast::channel(self.capacity).0
            })
            .subscribe()
    }

    /// Send `event` to everyone in `room_id`. Returns the number of receivers.
    ///
    /// Publishing never creates a room; an empty room is removed instead.
    pub fn publish(&self, room_id: &str, event: ChannelEvent) -> usize {
        let mut rooms = self.lock();
        let Some(tx) = rooms.get(room_id) else {
            return 0;
        };
        match tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                rooms.remove(room_id);
                debug!("Closed empty room {room_id}");
                0
            }
        }
    }

    /// Drop every room without members.
    pub fn prune(&self) {
        sweep(&mut self.lock());
    }

    /// Rooms that currently have at least one member.
    pub fn active_rooms(&self) -> usize {
        self.lock().values().filter(|tx| tx.receiver_count() > 0).count()
    }

    /// Rooms held in memory, including empty ones not yet pruned.
    pub fn retained_rooms(&self) -> usize {
        self.lock().len()
    }
}

fn sweep(rooms: &mut HashMap<String, broadcast::Sender<ChannelEvent>>) {
    rooms.retain(|_, tx| tx.receiver_count() > 0);
}
