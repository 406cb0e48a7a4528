//! Events merged into the dispatcher's single ordered stream

use crate::command::Expiry;
use crate::session::{ConnId, SessionHandle};
use std::net::SocketAddr;

/// Everything the dispatch loop reacts to
#[derive(Debug)]
pub enum ServerEvent {
    /// A stream connection sent its registration token
    StreamOpened {
        session: SessionHandle,
        token: String,
    },
    /// A line from an open stream connection
    StreamLine { conn: ConnId, line: String },
    /// A stream connection closed or failed
    StreamClosed { conn: ConnId },
    /// A datagram arrived on the shared socket
    Datagram { addr: SocketAddr, text: String },
    /// A call deadline elapsed
    Timeout(Expiry),
    /// Operator asked the process to stop
    Interrupt,
}
