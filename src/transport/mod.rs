//! Sending and receiving packets over UDP or TCP.
//!
//! A [`PacketSender`] fans packets out to its targets, optionally paced by a
//! dedicated thread. A [`PacketReceiver`] reads on a dedicated thread and
//! hands packets to a [`TransferHandler`].

mod counters;
pub use counters::CountersSnapshot;

mod logging;
pub use logging::{Direction, LoggedPacket, PacketLogger, PacketProtocol, Protocol};

mod pacer;

mod receiver;
pub use receiver::{DatagramFilter, PacketReceiver, ReceiverState, TransferHandler};

mod sender;
pub use sender::PacketSender;

mod socket;
pub use socket::{InputTransport, OutputTransport, TcpTransport, UdpTransport};
