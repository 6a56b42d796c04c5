//! Per-session drawing rooms relaying pen strokes between the two participants.

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{dto::draw::DrawOutbound, state::game::Seat};

const ROOM_CAPACITY: usize = 256;

/// Frame fanned out to every socket of a room.
#[derive(Debug, Clone)]
pub struct RoomFrame {
    /// Seat that produced the frame; `None` for server-originated frames.
    pub origin: Option<Seat>,
    /// Message forwarded to the sockets.
    pub message: DrawOutbound,
}

/// Registry of live drawing rooms keyed by session.
#[derive(Default)]
pub struct DrawingRooms {
    rooms: DashMap<Uuid, broadcast::Sender<RoomFrame>>,
}

impl DrawingRooms {
    /// Join the room of `session_id`, creating it on first use.
    pub fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<RoomFrame> {
        self.rooms
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Relay a frame to the room if one is open. Returns the number of receivers reached.
    pub fn publish(&self, session_id: Uuid, frame: RoomFrame) -> usize {
        self.rooms
            .get(&session_id)
            .and_then(|sender| sender.send(frame).ok())
            .unwrap_or(0)
    }

    /// Drop the room once its last socket went away.
    pub fn release(&self, session_id: Uuid) {
        self.rooms
            .remove_if(&session_id, |_, sender| sender.receiver_count() == 0);
    }

    /// Number of sockets currently attached to the room.
    pub fn occupancy(&self, session_id: Uuid) -> usize {
        self.rooms
            .get(&session_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_reach_every_socket_of_the_room() {
        let rooms = DrawingRooms::default();
        let session_id = Uuid::new_v4();
        let mut first = rooms.subscribe(session_id);
        let mut second = rooms.subscribe(session_id);

        let reached = rooms.publish(
            session_id,
            RoomFrame {
                origin: Some(Seat::First),
                message: DrawOutbound::Stop,
            },
        );
        assert_eq!(reached, 2);
        assert_eq!(first.recv().await.unwrap().origin, Some(Seat::First));
        assert!(matches!(
            second.recv().await.unwrap().message,
            DrawOutbound::Stop
        ));
    }

    #[test]
    fn publishing_without_a_room_is_a_no_op() {
        let rooms = DrawingRooms::default();
        let reached = rooms.publish(
            Uuid::new_v4(),
            RoomFrame {
                origin: None,
                message: DrawOutbound::Clear,
            },
        );
        assert_eq!(reached, 0);
    }

    #[test]
    fn release_keeps_rooms_with_live_sockets() {
        let rooms = DrawingRooms::default();
        let session_id = Uuid::new_v4();
        let receiver = rooms.subscribe(session_id);

        rooms.release(session_id);
        assert_eq!(rooms.occupancy(session_id), 1);

        drop(receiver);
        rooms.release(session_id);
        assert_eq!(rooms.occupancy(session_id), 0);
    }
}
