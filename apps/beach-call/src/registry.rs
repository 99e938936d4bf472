use call_signaling::PeerId;

use crate::connection::{ConnectionHandler, NegotiationState};

/// Active peer links in creation order, at most one per remote user.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Vec<ConnectionHandler>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler, handing back any previous handler for the same peer.
    /// The new handler goes to the end of the order.
    pub fn insert(&mut self, handler: ConnectionHandler) -> Option<ConnectionHandler> {
        let replaced = self.remove(handler.peer());
        self.entries.push(handler);
        replaced
    }

    pub fn get(&self, peer: &PeerId) -> Option<&ConnectionHandler> {
        self.entries.iter().find(|entry| entry.peer() == peer)
    }

    pub fn get_mut(&mut self, peer: &PeerId) -> Option<&mut ConnectionHandler> {
        self.entries.iter_mut().find(|entry| entry.peer() == peer)
    }

    /// Looks a handler up by id; stale ids from replaced handlers miss.
    pub fn get_by_id_mut(&mut self, handler_id: u64) -> Option<&mut ConnectionHandler> {
        self.entries
            .iter_mut()
            .find(|entry| entry.id() == handler_id)
    }

    pub fn contains_id(&self, handler_id: u64) -> bool {
        self.entries.iter().any(|entry| entry.id() == handler_id)
    }

    pub fn remove(&mut self, peer: &PeerId) -> Option<ConnectionHandler> {
        let index = self.entries.iter().position(|entry| entry.peer() == peer)?;
        Some(self.entries.remove(index))
    }

    pub fn remove_id(&mut self, handler_id: u64) -> Option<ConnectionHandler> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.id() == handler_id)?;
        Some(self.entries.remove(index))
    }

    /// The only handler, if exactly one exists.
    pub fn sole_mut(&mut self) -> Option<&mut ConnectionHandler> {
        match self.entries.as_mut_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// The only handler still waiting for an answer, if exactly one is.
    pub fn sole_awaiting_answer_mut(&mut self) -> Option<&mut ConnectionHandler> {
        let mut waiting = self
            .entries
            .iter_mut()
            .filter(|entry| entry.state() == NegotiationState::OfferSent);
        let first = waiting.next()?;
        if waiting.next().is_some() {
            return None;
        }
        Some(first)
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.entries.iter().map(|entry| entry.peer().clone()).collect()
    }

    pub fn drain(&mut self) -> Vec<ConnectionHandler> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SessionEvents;
    use crate::mock::MockSessionFactory;
    use tokio::sync::mpsc;

    async fn handler(factory: &MockSessionFactory, id: u64, peer: &str) -> ConnectionHandler {
        let (tx, _rx) = mpsc::unbounded_channel();
        ConnectionHandler::open(factory, SessionEvents::new(id, PeerId::from(peer), tx))
            .await
            .expect("open")
    }

    #[tokio::test]
    async fn keeps_one_handler_per_peer() {
        let factory = MockSessionFactory::new();
        let mut registry = ConnectionRegistry::new();
        assert!(registry.insert(handler(&factory, 1, "a").await).is_none());
        assert!(registry.insert(handler(&factory, 2, "b").await).is_none());

        let replaced = registry
            .insert(handler(&factory, 3, "a").await)
            .expect("replaced");
        assert_eq!(replaced.id(), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.peers(), vec![PeerId::from("b"), PeerId::from("a")]);
        assert!(!registry.contains_id(1));
        assert!(registry.contains_id(3));
    }

    #[tokio::test]
    async fn sole_awaiting_answer_requires_exactly_one() {
        let factory = MockSessionFactory::new();
        let mut registry = ConnectionRegistry::new();
        assert!(registry.sole_awaiting_answer_mut().is_none());

        let mut first = handler(&factory, 1, "a").await;
        first.create_offer().await.expect("offer");
        registry.insert(first);
        registry.insert(handler(&factory, 2, "b").await);
        assert_eq!(
            registry.sole_awaiting_answer_mut().map(|h| h.id()),
            Some(1)
        );

        let mut third = handler(&factory, 3, "c").await;
        third.create_offer().await.expect("offer");
        registry.insert(third);
        assert!(registry.sole_awaiting_answer_mut().is_none());
    }

    #[tokio::test]
    async fn remove_by_id_ignores_stale_ids() {
        let factory = MockSessionFactory::new();
        let mut registry = ConnectionRegistry::new();
        registry.insert(handler(&factory, 7, "a").await);
        assert!(registry.remove_id(6).is_none());
        assert_eq!(registry.remove_id(7).map(|h| h.id()), Some(7));
        assert!(registry.is_empty());
        assert!(registry.sole_mut().is_none());
    }
}
