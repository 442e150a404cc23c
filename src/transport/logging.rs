use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::packet::Packet;
use crate::rtcp::is_rtcp;

/// Transport a packet travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// UDP
    Udp,
    /// TCP, one connected stream.
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Udp => "UDP",
            Protocol::Tcp => "TCP",
        };
        f.write_str(s)
    }
}

/// Which way a logged packet travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// From the network.
    In,
    /// To the network.
    Out,
}

/// Protocol a logged packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketProtocol {
    /// RTP media.
    Rtp,
    /// RTCP control.
    Rtcp,
}

impl PacketProtocol {
    fn of(buf: &[u8]) -> Self {
        if is_rtcp(buf) {
            PacketProtocol::Rtcp
        } else {
            PacketProtocol::Rtp
        }
    }
}

/// One packet handed to a [`PacketLogger`].
#[derive(Debug, Clone, Copy)]
pub struct LoggedPacket<'a> {
    /// RTP or RTCP.
    pub protocol: PacketProtocol,
    /// Address of the local socket.
    pub local: Option<SocketAddr>,
    /// Address of the remote peer.
    pub remote: SocketAddr,
    /// Transport the packet travels over.
    pub transport: Protocol,
    /// Way the packet travels.
    pub direction: Direction,
    /// Header bytes. For RTP the fixed header, CSRCs and extension.
    pub header: &'a [u8],
}

/// Sink for packet captures, such as a pcap writer.
///
/// Logging is best effort, the sink can drop whatever it wants.
pub trait PacketLogger: Send + Sync {
    /// Whether packets of `protocol` should be logged at all.
    fn is_enabled(&self, protocol: PacketProtocol) -> bool {
        protocol == PacketProtocol::Rtp
    }

    /// Log one packet.
    fn log(&self, packet: &LoggedPacket<'_>);
}

/// Hand `pkt` to `logger` if it wants that protocol.
pub(crate) fn log_packet(
    logger: &dyn PacketLogger,
    pkt: &Packet,
    local: Option<SocketAddr>,
    remote: SocketAddr,
    transport: Protocol,
    direction: Direction,
) {
    let protocol = PacketProtocol::of(pkt.as_slice());
    if !logger.is_enabled(protocol) {
        return;
    }

    let header_len = match protocol {
        PacketProtocol::Rtp => pkt.header_len(),
        PacketProtocol::Rtcp => pkt.len(),
    };

    logger.log(&LoggedPacket {
        protocol,
        local,
        remote,
        transport,
        direction,
        header: &pkt.as_slice()[..header_len],
    });
}
