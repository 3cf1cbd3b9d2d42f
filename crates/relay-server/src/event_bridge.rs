use std::sync::Arc;

use relay_core::{Outbound, Target};
use tokio::sync::broadcast;

use crate::client::ConnectionRegistry;

/// Subscribes to the engine's outbound broadcast and forwards each event to
/// the WebSocket connections in its target room.
pub struct EventBridge {
    registry: Arc<ConnectionRegistry>,
}

impl EventBridge {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Start the bridge. Spawns a task that reads from the broadcast channel
    /// and fans serialized events out to room members.
    pub fn start(&self, mut rx: broadcast::Receiver<Outbound>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(outbound) => {
                        let Ok(json) = serde_json::to_string(&outbound.event) else {
                            continue;
                        };
                        match &outbound.target {
                            Target::Room(room) => registry.broadcast_to_room(room, &json),
                            Target::RoomExcept(room, except) => {
                                registry.broadcast_to_room_except(room, Some(except), &json)
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event bridge lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("event bridge channel closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Create an event bridge wired to a broadcast channel.
pub fn create_bridge(
    registry: Arc<ConnectionRegistry>,
    rx: broadcast::Receiver<Outbound>,
) -> tokio::task::JoinHandle<()> {
    let bridge = EventBridge::new(registry);
    bridge.start(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{JobId, ServerEvent};
    use std::time::Duration;

    fn withdrawn(job: &str) -> ServerEvent {
        ServerEvent::OfferWithdrawn {
            job_id: JobId::from_raw(job),
        }
    }

    #[tokio::test]
    async fn bridge_forwards_room_events_to_members() {
        let registry = Arc::new(ConnectionRegistry::new(32));
        let (tx, rx) = broadcast::channel(64);

        let (member, mut member_rx) = registry.register(None);
        let (_outsider, mut outsider_rx) = registry.register(None);
        registry.join_room(&member.id, "zone:560001");

        let handle = create_bridge(Arc::clone(&registry), rx);

        tx.send(Outbound::room("zone:560001", withdrawn("job_9")))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let raw = member_rx.try_recv().unwrap();
        assert!(raw.contains("job:offer:withdrawn"));
        assert!(outsider_rx.try_recv().is_err());

        handle.abort();
    }

    #[tokio::test]
    async fn bridge_skips_the_excluded_connection() {
        let registry = Arc::new(ConnectionRegistry::new(32));
        let (tx, rx) = broadcast::channel(64);

        let (winner, mut winner_rx) = registry.register(None);
        let (loser, mut loser_rx) = registry.register(None);
        registry.join_room(&winner.id, "zone:560001");
        registry.join_room(&loser.id, "zone:560001");

        let handle = create_bridge(Arc::clone(&registry), rx);

        tx.send(Outbound::room_except(
            "zone:560001",
            &winner.id,
            withdrawn("job_9"),
        ))
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(winner_rx.try_recv().is_err());
        assert!(loser_rx.try_recv().unwrap().contains("job:offer:withdrawn"));

        handle.abort();
    }

    #[tokio::test]
    async fn bridge_survives_events_for_empty_rooms() {
        let registry = Arc::new(ConnectionRegistry::new(32));
        let (tx, rx) = broadcast::channel(64);

        let (bystander, mut bystander_rx) = registry.register(None);
        registry.join_room(&bystander.id, "zone:560002");

        let handle = create_bridge(Arc::clone(&registry), rx);

        tx.send(Outbound::room("zone:560001", withdrawn("job_1")))
            .unwrap();
        tx.send(Outbound::room("zone:560002", withdrawn("job_2")))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The empty-room event is dropped; the next one still flows
        let raw = bystander_rx.try_recv().unwrap();
        assert!(raw.contains("job_2"));

        handle.abort();
    }
}
