use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::{ClientEvent, PeerId, ServerEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("peer {0} is not connected")]
    UnknownPeer(PeerId),
}

struct Member {
    joined: u64,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

/// Rendezvous state: who is online and how to reach them.
///
/// Every event a peer emits is forwarded to its addressee with the sender's
/// id stamped on it, so receivers can route answers and candidates to the
/// connection that is waiting for them.
#[derive(Default)]
pub struct Relay {
    members: RwLock<HashMap<PeerId, Member>>,
    join_counter: AtomicU64,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new peer under a freshly generated id.
    ///
    /// The newcomer is told about everyone already online and everyone else
    /// is told about the newcomer.
    pub fn join(&self) -> (PeerId, mpsc::UnboundedReceiver<ServerEvent>) {
        self.join_as(PeerId::generate())
    }

    pub fn join_as(&self, id: PeerId) -> (PeerId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            // One guard for snapshot, announce and insert: concurrent joiners
            // must end up listed to each other.
            let mut members = self.members.write();
            let joined = self.join_counter.fetch_add(1, Ordering::Relaxed);
            let mut existing: Vec<(u64, PeerId)> = members
                .iter()
                .map(|(peer, member)| (member.joined, peer.clone()))
                .collect();
            existing.sort_by_key(|(joined, _)| *joined);

            for (peer, member) in members.iter() {
                if member
                    .tx
                    .send(ServerEvent::UpdateUserList {
                        users: vec![id.clone()],
                    })
                    .is_err()
                {
                    debug!(target = "relay", peer = %peer, "announce skipped; receiver gone");
                }
            }
            let _ = tx.send(ServerEvent::UpdateUserList {
                users: existing.into_iter().map(|(_, peer)| peer).collect(),
            });
            members.insert(id.clone(), Member { joined, tx });
        }
        info!(target = "relay", peer = %id, "peer joined");
        (id, rx)
    }

    /// Drops a peer and tells everyone still online.
    pub fn leave(&self, id: &PeerId) {
        let mut members = self.members.write();
        if members.remove(id).is_none() {
            return;
        }
        for member in members.values() {
            let _ = member.tx.send(ServerEvent::RemoveUser {
                socket_id: id.clone(),
            });
        }
        drop(members);
        info!(target = "relay", peer = %id, "peer left");
    }

    /// Online peers in join order.
    pub fn peers(&self) -> Vec<PeerId> {
        let members = self.members.read();
        let mut peers: Vec<(u64, PeerId)> = members
            .iter()
            .map(|(id, member)| (member.joined, id.clone()))
            .collect();
        peers.sort_by_key(|(joined, _)| *joined);
        peers.into_iter().map(|(_, id)| id).collect()
    }

    pub fn is_online(&self, id: &PeerId) -> bool {
        self.members.read().contains_key(id)
    }

    /// Forwards one client event from `from` to its addressee.
    pub fn route(&self, from: &PeerId, event: ClientEvent) -> Result<(), RelayError> {
        let name = event.name();
        let (to, delivered) = match event {
            ClientEvent::CallUser { offer, to } => (
                to,
                ServerEvent::CallMade {
                    offer,
                    socket: from.clone(),
                },
            ),
            ClientEvent::MakeAnswer { answer, to } => (
                to,
                ServerEvent::AnswerMade {
                    answer,
                    socket: Some(from.clone()),
                },
            ),
            ClientEvent::IceCandidate { candidate, to } => (
                to,
                ServerEvent::IceCandidatePost {
                    candidate,
                    socket: Some(from.clone()),
                },
            ),
        };

        let members = self.members.read();
        let Some(member) = members.get(&to) else {
            warn!(target = "relay", from = %from, to = %to, event = name, "addressee not online");
            return Err(RelayError::UnknownPeer(to));
        };
        debug!(target = "relay", from = %from, to = %to, event = name, "relaying");
        member
            .tx
            .send(delivered)
            .map_err(|_| RelayError::UnknownPeer(to.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{IceCandidate, SessionDescription};

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn join_announces_both_directions() {
        let relay = Relay::new();
        let (a, mut rx_a) = relay.join_as(PeerId::from("a"));
        assert_eq!(
            drain(&mut rx_a),
            vec![ServerEvent::UpdateUserList { users: vec![] }]
        );

        let (b, mut rx_b) = relay.join_as(PeerId::from("b"));
        assert_eq!(
            drain(&mut rx_b),
            vec![ServerEvent::UpdateUserList {
                users: vec![a.clone()]
            }]
        );
        assert_eq!(
            drain(&mut rx_a),
            vec![ServerEvent::UpdateUserList {
                users: vec![b.clone()]
            }]
        );
        assert_eq!(relay.peers(), vec![a, b]);
    }

    #[test]
    fn relayed_events_carry_sender() {
        let relay = Relay::new();
        let (a, mut rx_a) = relay.join_as(PeerId::from("a"));
        let (b, mut rx_b) = relay.join_as(PeerId::from("b"));
        drain(&mut rx_a);
        drain(&mut rx_b);

        relay
            .route(
                &a,
                ClientEvent::CallUser {
                    offer: SessionDescription::offer("o"),
                    to: b.clone(),
                },
            )
            .expect("call routed");
        relay
            .route(
                &b,
                ClientEvent::MakeAnswer {
                    answer: SessionDescription::answer("x"),
                    to: a.clone(),
                },
            )
            .expect("answer routed");
        relay
            .route(
                &b,
                ClientEvent::IceCandidate {
                    candidate: IceCandidate::new("candidate:1"),
                    to: a.clone(),
                },
            )
            .expect("candidate routed");

        assert_eq!(
            drain(&mut rx_b),
            vec![ServerEvent::CallMade {
                offer: SessionDescription::offer("o"),
                socket: a.clone(),
            }]
        );
        assert_eq!(
            drain(&mut rx_a),
            vec![
                ServerEvent::AnswerMade {
                    answer: SessionDescription::answer("x"),
                    socket: Some(b.clone()),
                },
                ServerEvent::IceCandidatePost {
                    candidate: IceCandidate::new("candidate:1"),
                    socket: Some(b.clone()),
                },
            ]
        );
    }

    #[test]
    fn unknown_addressee_is_reported() {
        let relay = Relay::new();
        let (a, _rx) = relay.join_as(PeerId::from("a"));
        let err = relay
            .route(
                &a,
                ClientEvent::CallUser {
                    offer: SessionDescription::offer("o"),
                    to: PeerId::from("ghost"),
                },
            )
            .unwrap_err();
        assert_eq!(err, RelayError::UnknownPeer(PeerId::from("ghost")));
    }

    #[test]
    fn leave_notifies_remaining_peers() {
        let relay = Relay::new();
        let (a, mut rx_a) = relay.join_as(PeerId::from("a"));
        let (b, _rx_b) = relay.join_as(PeerId::from("b"));
        drain(&mut rx_a);

        relay.leave(&b);
        assert_eq!(
            drain(&mut rx_a),
            vec![ServerEvent::RemoveUser { socket_id: b.clone() }]
        );
        assert!(!relay.is_online(&b));
        assert_eq!(relay.peers(), vec![a]);

        relay.leave(&b);
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn concurrent_joiners_all_see_each_other() {
        use std::collections::BTreeSet;
        use std::sync::{Arc, Barrier};

        const JOINERS: usize = 6;
        for round in 0..200 {
            let relay = Arc::new(Relay::new());
            let barrier = Arc::new(Barrier::new(JOINERS));
            let handles: Vec<_> = (0..JOINERS)
                .map(|i| {
                    let relay = Arc::clone(&relay);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        relay.join_as(PeerId::new(format!("p{i}")))
                    })
                })
                .collect();
            let mut joined: Vec<_> = handles
                .into_iter()
                .map(|handle| handle.join().expect("join thread"))
                .collect();

            let everyone: BTreeSet<PeerId> = joined.iter().map(|(id, _)| id.clone()).collect();
            for (id, rx) in joined.iter_mut() {
                let mut seen = BTreeSet::new();
                for event in drain(rx) {
                    if let ServerEvent::UpdateUserList { users } = event {
                        seen.extend(users);
                    }
                }
                let mut expected = everyone.clone();
                expected.remove(&*id);
                assert_eq!(seen, expected, "round {round}: {id} missed a joiner");
            }
            assert_eq!(relay.peers().len(), JOINERS);
        }
    }
}
