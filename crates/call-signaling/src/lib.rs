//! Call signaling: the wire events exchanged with the rendezvous server, the
//! transport seam the call client emits through, and the relay that routes
//! events between connected peers.
//!
//! The relay is shared by the websocket server and by [`LocalHub`], an
//! in-process hub used in tests and embedded setups.

pub mod events;
pub mod local;
pub mod relay;
pub mod transport;
pub mod websocket;

pub use events::{ClientEvent, IceCandidate, PeerId, SdpKind, ServerEvent, SessionDescription};
pub use local::LocalHub;
pub use relay::{Relay, RelayError};
pub use transport::{SignalingChannel, SignalingError, SignalingResult, SignalingTransport};
pub use websocket::{WsSignaling, derive_websocket_url};
