use std::fmt;

use serde::{Deserialize, Serialize};

/// Session identifier issued by the rendezvous server for one connected peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description in the browser's `{type, sdp}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate in the browser's init-dictionary shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Events a call client emits to the rendezvous server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    CallUser {
        offer: SessionDescription,
        to: PeerId,
    },
    MakeAnswer {
        answer: SessionDescription,
        to: PeerId,
    },
    IceCandidate {
        candidate: IceCandidate,
        to: PeerId,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::CallUser { .. } => "call-user",
            ClientEvent::MakeAnswer { .. } => "make-answer",
            ClientEvent::IceCandidate { .. } => "ice-candidate",
        }
    }

    pub fn recipient(&self) -> &PeerId {
        match self {
            ClientEvent::CallUser { to, .. }
            | ClientEvent::MakeAnswer { to, .. }
            | ClientEvent::IceCandidate { to, .. } => to,
        }
    }
}

/// Events the rendezvous server delivers to a call client.
///
/// `socket` on `answer-made` and `ice-candidate-post` names the sender. Relays
/// that predate sender stamping omit it, so it stays optional on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    CallMade {
        offer: SessionDescription,
        socket: PeerId,
    },
    AnswerMade {
        answer: SessionDescription,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        socket: Option<PeerId>,
    },
    IceCandidatePost {
        candidate: IceCandidate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        socket: Option<PeerId>,
    },
    UpdateUserList {
        users: Vec<PeerId>,
    },
    RemoveUser {
        #[serde(rename = "socketId")]
        socket_id: PeerId,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::CallMade { .. } => "call-made",
            ServerEvent::AnswerMade { .. } => "answer-made",
            ServerEvent::IceCandidatePost { .. } => "ice-candidate-post",
            ServerEvent::UpdateUserList { .. } => "update-user-list",
            ServerEvent::RemoveUser { .. } => "remove-user",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_events_use_event_data_envelope() {
        let event = ClientEvent::CallUser {
            offer: SessionDescription::offer("v=0"),
            to: PeerId::from("peer-b"),
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value,
            json!({
                "event": "call-user",
                "data": { "offer": { "type": "offer", "sdp": "v=0" }, "to": "peer-b" }
            })
        );
    }

    #[test]
    fn candidate_matches_browser_field_names() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        };
        let event = ClientEvent::IceCandidate {
            candidate,
            to: PeerId::from("peer-a"),
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["event"], "ice-candidate");
        assert_eq!(value["data"]["candidate"]["sdpMid"], "0");
        assert_eq!(value["data"]["candidate"]["sdpMLineIndex"], 0);
        assert!(value["data"]["candidate"].get("usernameFragment").is_none());
    }

    #[test]
    fn parses_legacy_answer_without_socket() {
        let text = r#"{"event":"answer-made","data":{"answer":{"type":"answer","sdp":"v=0"}}}"#;
        let event: ServerEvent = serde_json::from_str(text).expect("parse");
        assert_eq!(
            event,
            ServerEvent::AnswerMade {
                answer: SessionDescription::answer("v=0"),
                socket: None,
            }
        );
    }

    #[test]
    fn parses_remove_user_socket_id() {
        let text = r#"{"event":"remove-user","data":{"socketId":"abc"}}"#;
        let event: ServerEvent = serde_json::from_str(text).expect("parse");
        assert_eq!(
            event,
            ServerEvent::RemoveUser {
                socket_id: PeerId::from("abc")
            }
        );
        assert_eq!(event.name(), "remove-user");
    }

    #[test]
    fn parses_user_list() {
        let text = r#"{"event":"update-user-list","data":{"users":["a","b"]}}"#;
        let event: ServerEvent = serde_json::from_str(text).expect("parse");
        match event {
            ServerEvent::UpdateUserList { users } => {
                assert_eq!(users, vec![PeerId::from("a"), PeerId::from("b")]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_event_is_rejected() {
        let text = r#"{"event":"hang-up","data":{}}"#;
        assert!(serde_json::from_str::<ServerEvent>(text).is_err());
    }
}
