use std::sync::Arc;

use crate::events::{ClientEvent, PeerId};
use crate::relay::Relay;
use crate::transport::{SignalingChannel, SignalingError, SignalingResult, SignalingTransport};

/// In-process rendezvous for tests and single-process setups.
#[derive(Clone, Default)]
pub struct LocalHub {
    relay: Arc<Relay>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Connects a new peer with a generated id.
    pub fn connect(&self) -> (PeerId, SignalingChannel) {
        self.connect_as(PeerId::generate())
    }

    /// Connects a new peer under a chosen id. Dropping the last handle to
    /// the returned sender disconnects it.
    pub fn connect_as(&self, id: impl Into<PeerId>) -> (PeerId, SignalingChannel) {
        let (id, events) = self.relay.join_as(id.into());
        let endpoint = LocalEndpoint {
            id: id.clone(),
            relay: Arc::clone(&self.relay),
        };
        (id, SignalingChannel::new(Arc::new(endpoint), events))
    }
}

struct LocalEndpoint {
    id: PeerId,
    relay: Arc<Relay>,
}

impl SignalingTransport for LocalEndpoint {
    fn emit(&self, event: ClientEvent) -> SignalingResult<()> {
        if !self.relay.is_online(&self.id) {
            return Err(SignalingError::Closed);
        }
        // A missing addressee is the relay's concern; the emit itself succeeded.
        let _ = self.relay.route(&self.id, event);
        Ok(())
    }
}

impl Drop for LocalEndpoint {
    fn drop(&mut self) {
        self.relay.leave(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ServerEvent, SessionDescription};

    #[tokio::test]
    async fn emits_reach_the_addressee() {
        let hub = LocalHub::new();
        let (a, chan_a) = hub.connect_as("a");
        let (b, mut chan_b) = hub.connect_as("b");

        let first = chan_b.events.recv().await.expect("user list");
        assert_eq!(first, ServerEvent::UpdateUserList { users: vec![a.clone()] });

        chan_a
            .sender
            .emit(ClientEvent::CallUser {
                offer: SessionDescription::offer("sdp"),
                to: b.clone(),
            })
            .expect("emit");
        let delivered = chan_b.events.recv().await.expect("call made");
        assert_eq!(
            delivered,
            ServerEvent::CallMade {
                offer: SessionDescription::offer("sdp"),
                socket: a,
            }
        );
    }

    #[tokio::test]
    async fn dropping_sender_disconnects() {
        let hub = LocalHub::new();
        let (_a, mut chan_a) = hub.connect_as("a");
        let (b, chan_b) = hub.connect_as("b");
        let _ = chan_a.events.recv().await;
        let _ = chan_a.events.recv().await;

        drop(chan_b);
        let event = chan_a.events.recv().await.expect("remove-user");
        assert_eq!(event, ServerEvent::RemoveUser { socket_id: b.clone() });
        assert!(!hub.relay().is_online(&b));
    }
}
