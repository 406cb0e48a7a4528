//! Session management for connected doctors and patients
//!
//! This module handles:
//! - Per-connection reader/writer tasks for stream clients
//! - The shared datagram socket for datagram clients
//! - The registry of every registered participant

mod connection;
mod datagram;
mod registry;

pub use connection::{spawn_stream_session, ConnId, SessionHandle};
#[cfg(test)]
pub use connection::Outgoing;
pub use datagram::{spawn_datagram_endpoint, DatagramSender};
pub use registry::{
    ClientKey, ClientRegistry, Endpoint, ParticipantId, RegistrationError,
    TransportKind,
};
