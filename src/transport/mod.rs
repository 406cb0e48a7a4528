pub mod tcp;
pub mod traits;
pub mod udp;

pub use tcp::TcpConnector;
pub use traits::{LinePair, LineReader, LineWriter, TransportConnector};
pub use udp::UdpConnector;
