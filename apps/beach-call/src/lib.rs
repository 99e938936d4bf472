pub mod config;
pub mod connection;
pub mod console;
pub mod directory;
pub mod error;
pub mod media;
pub mod mock;
pub mod orchestrator;
pub mod registry;

pub use connection::{ConnectionHandler, NegotiationState, TransportState};
pub use directory::{UserDirectory, UserSelected};
pub use error::{CallError, CallResult};
pub use orchestrator::{CallOrchestrator, Collaborators};
pub use registry::ConnectionRegistry;
