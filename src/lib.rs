//! Real-time transport core for a VoIP media stack.
//!
//! rtcore moves RTP and RTCP packets between a media engine and the network.
//! It paces outgoing traffic, keeps the latest RTCP reports of every source,
//! and adds RFC 3611 VoIP Metrics extended reports (XR) to outgoing RTCP.
//!
//! # Sending
//!
//! A [`PacketSender`] writes each packet to every target. Without a rate limit
//! the write happens on the calling thread. With a rate limit a dedicated
//! thread drains a bounded queue, sending at most `max_packets` in any
//! `per_millis` window.
//!
//! ```no_run
//! use std::net::UdpSocket;
//! use std::sync::Arc;
//! use rtcore::{PacketSender, TransportConfig, UdpTransport};
//!
//! let config = TransportConfig::new();
//! let socket = UdpSocket::bind("0.0.0.0:0").unwrap();
//! let transport = Arc::new(UdpTransport::new(socket, &config).unwrap());
//!
//! let sender = PacketSender::new(transport, config).unwrap();
//! sender.add_target("10.0.0.1:5000".parse().unwrap());
//!
//! // 50 packets per second.
//! sender.set_max_packets_per_millis(1, 20).unwrap();
//! ```
//!
//! # Receiving
//!
//! A [`PacketReceiver`] reads on a dedicated thread. Datagrams pass a chain of
//! [`DatagramFilter`]s and an optional [`PacketTransformer`] before they are
//! handed to the [`TransferHandler`].
//!
//! # Statistics
//!
//! The [`StatisticsEngine`] is a [`PacketTransformer`] for one media stream.
//! Installed on both the sender and the receiver, it records every SR and RR
//! in a [`RtcpReportStore`], strips incoming XR packets and, for audio streams
//! that negotiated `voip-metrics`, adds an XR with a VoIP Metrics block per
//! reported source to outgoing RTCP. Receive statistics come from the media
//! engine through a [`ReceiveStatsProvider`].
//!
//! ```
//! use std::sync::Arc;
//! use rtcore::{Packet, PacketTransformer, ReceiveStatsProvider, ReceiveStreamStats};
//! use rtcore::{RtcpReportStore, Ssrc, StatisticsConfig, StatisticsEngine};
//!
//! struct NoStats;
//!
//! impl ReceiveStatsProvider for NoStats {
//!     fn receive_stream(&self, _ssrc: Ssrc, _sender: Ssrc) -> Option<ReceiveStreamStats> {
//!         None
//!     }
//! }
//!
//! let config = StatisticsConfig::new().set_encoding("opus").set_voip_metrics(true);
//! let store = Arc::new(RtcpReportStore::new());
//! let engine = StatisticsEngine::new(config, store.clone(), Arc::new(NoStats));
//!
//! // An empty RR from SSRC 1.
//! let rr = Packet::from_slice(&[0x80, 0xc9, 0x00, 0x01, 0, 0, 0, 1]);
//! engine.transform(rr).unwrap();
//!
//! assert!(store.sent().report(1.into()).is_some());
//! ```
//!
//! The voice quality estimate MOS-CQ is computed with [`mos_cq`], a
//! simplified ITU-T G.107 E-model.
//!
//! # SRTP
//!
//! Encryption itself is not part of this crate. An SRTP transform wrapping
//! the sender and receiver is configured with a [`SrtpPolicy`].
//!
//! # Crate features
//!
//! * `pii` redacts socket addresses from logs.

#![forbid(unsafe_code)]
#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]
#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
pub use config::{MediaKind, RateLimit, StatisticsConfig, TransportConfig};

mod error_;

mod id;
pub use id::{SendStreamId, Ssrc, StreamKey};

mod manager;
pub use manager::{DataSource, GlobalReceptionStats, GlobalTransmissionStats};
pub use manager::{RtpSession, RtpTranslator, StreamManager};
pub use manager::{SessionEvent, SessionListener};

mod packet;
pub use packet::{rebase, Packet, PacketPool, RTP_HEADER_LEN};

pub mod rtcp;

mod srtp;
pub use srtp::{AuthAlgorithm, EncryptionAlgorithm, SrtpPolicy};

mod stats;
pub use stats::{add_extended_report, remove_extended_reports};
pub use stats::{discard_rate, loss_rate, mos_cq, MosInputs};
pub use stats::{BurstMetrics, JitterBufferStats, ReceiveStatsProvider};
pub use stats::{PacketTransformer, StatisticsEngine};
pub use stats::{ReceiveStreamStats, ReceptionStats};
pub use stats::{ReportSide, RtcpReport, RtcpReportListener, RtcpReportStore, Stamped};

mod transport;
pub use transport::CountersSnapshot;
pub use transport::{DatagramFilter, PacketReceiver, ReceiverState, TransferHandler};
pub use transport::{Direction, LoggedPacket, PacketLogger, PacketProtocol, Protocol};
pub use transport::{InputTransport, OutputTransport, PacketSender};
pub use transport::{TcpTransport, UdpTransport};

mod util;

/// Various error types.
pub mod error {
    pub use crate::error_::{ConfigError, NetError, RtcpError, SessionError};
}
