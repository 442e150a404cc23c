//! One API over a point to point session or a shared multi-party translator.

use std::sync::Arc;

use crate::error::SessionError;
use crate::id::{SendStreamId, Ssrc, StreamKey};

/// Media to send on a new send stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    /// Encoding name, such as `opus`.
    pub encoding: String,
    /// Clock rate of the encoding.
    pub clock_rate: u32,
    /// Number of streams the source provides.
    pub stream_count: usize,
}

/// Something happened in an RTP session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionEvent {
    /// First packet of a new remote source.
    NewReceiveStream(Ssrc),
    /// A remote source stopped sending.
    ReceiveStreamTimeout(Ssrc),
    /// A remote source sent BYE.
    ByeReceived(Ssrc),
    /// A send stream was created.
    NewSendStream(SendStreamId),
    /// A send stream was closed.
    SendStreamClosed(SendStreamId),
    /// An RTCP report arrived from a remote source.
    RemoteReport(Ssrc),
    /// Two sources use the same SSRC.
    SsrcCollision(Ssrc),
}

/// Gets the [`SessionEvent`]s of a session.
pub trait SessionListener: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &SessionEvent);
}

/// Counters over everything a session received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalReceptionStats {
    /// RTP packets received.
    pub packets_received: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// RTP packets that failed to parse.
    pub bad_rtp_packets: u64,
    /// RTCP packets received.
    pub rtcp_received: u64,
    /// Sender reports received.
    pub sr_received: u64,
    /// RTCP packets that failed to parse.
    pub bad_rtcp_packets: u64,
    /// Packets looped back from ourselves.
    pub packets_looped: u64,
}

/// Counters over everything a session sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalTransmissionStats {
    /// Bytes sent.
    pub bytes_sent: u64,
    /// RTP packets sent.
    pub rtp_sent: u64,
    /// RTCP packets sent.
    pub rtcp_sent: u64,
    /// Sends that failed.
    pub transmit_failed: u64,
    /// SSRC collisions detected locally.
    pub local_collisions: u64,
}

/// A point to point RTP session.
pub trait RtpSession: Send + Sync {
    /// Map `payload_type` to `encoding`.
    fn add_format(&self, encoding: &str, payload_type: u8);

    /// Add a listener.
    fn add_listener(&self, listener: Arc<dyn SessionListener>);

    /// Remove a listener.
    fn remove_listener(&self, listener: &Arc<dyn SessionListener>);

    /// Start sending stream `index` of `source`.
    fn create_send_stream(
        &self,
        source: &DataSource,
        index: usize,
    ) -> Result<SendStreamId, SessionError>;

    /// Reception counters.
    fn global_reception_stats(&self) -> GlobalReceptionStats;

    /// Transmission counters.
    fn global_transmission_stats(&self) -> GlobalTransmissionStats;

    /// Our SSRC.
    fn local_ssrc(&self) -> Ssrc;

    /// Remote sources.
    fn receive_streams(&self) -> Vec<Ssrc>;

    /// Local send streams.
    fn send_streams(&self) -> Vec<SendStreamId>;

    /// Release everything. Further calls may fail with [`SessionError::Disposed`].
    fn dispose(&self);
}

/// A multi-party translator shared by many streams.
///
/// Every call names the participating stream with its [`StreamKey`].
pub trait RtpTranslator: Send + Sync {
    /// Map `payload_type` to `encoding` for stream `key`.
    fn add_format(&self, key: StreamKey, encoding: &str, payload_type: u8);

    /// Add a listener for stream `key`.
    fn add_listener(&self, key: StreamKey, listener: Arc<dyn SessionListener>);

    /// Remove a listener of stream `key`.
    fn remove_listener(&self, key: StreamKey, listener: &Arc<dyn SessionListener>);

    /// Start sending stream `index` of `source` for stream `key`.
    fn create_send_stream(
        &self,
        key: StreamKey,
        source: &DataSource,
        index: usize,
    ) -> Result<SendStreamId, SessionError>;

    /// Reception counters of stream `key`.
    fn global_reception_stats(&self, key: StreamKey) -> GlobalReceptionStats;

    /// Transmission counters of stream `key`.
    fn global_transmission_stats(&self, key: StreamKey) -> GlobalTransmissionStats;

    /// SSRC of stream `key`.
    fn local_ssrc(&self, key: StreamKey) -> Ssrc;

    /// Remote sources seen by stream `key`.
    fn receive_streams(&self, key: StreamKey) -> Vec<Ssrc>;

    /// Send streams of stream `key`.
    fn send_streams(&self, key: StreamKey) -> Vec<SendStreamId>;

    /// Detach stream `key`. The translator lives on for other streams.
    fn dispose(&self, key: StreamKey);
}

/// RTP session access for one media stream, whatever the topology.
///
/// ```
/// # use std::sync::Arc;
/// # use rtcore::{RtpTranslator, StreamManager};
/// # fn f(translator: Arc<dyn RtpTranslator>) {
/// let manager = StreamManager::translated(translator);
/// let ssrc = manager.local_ssrc();
/// manager.dispose();
/// # }
/// ```
#[derive(Clone)]
pub enum StreamManager {
    /// Straight to a session of our own.
    Direct(Arc<dyn RtpSession>),
    /// Through a translator shared with other streams.
    Translated {
        /// The shared translator.
        translator: Arc<dyn RtpTranslator>,
        /// Our stream in the translator.
        key: StreamKey,
    },
}

impl StreamManager {
    /// Manager over a session of our own.
    pub fn direct(session: Arc<dyn RtpSession>) -> Self {
        StreamManager::Direct(session)
    }

    /// Manager joining `translator` under a new random key.
    pub fn translated(translator: Arc<dyn RtpTranslator>) -> Self {
        let key = StreamKey::new();
        debug!("Join translator with key {}", key);
        StreamManager::Translated { translator, key }
    }

    /// Map `payload_type` to `encoding`.
    pub fn add_format(&self, encoding: &str, payload_type: u8) {
        match self {
            Self::Direct(s) => s.add_format(encoding, payload_type),
            Self::Translated { translator, key } => {
                translator.add_format(*key, encoding, payload_type)
            }
        }
    }

    /// Add a listener.
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        match self {
            Self::Direct(s) => s.add_listener(listener),
            Self::Translated { translator, key } => translator.add_listener(*key, listener),
        }
    }

    /// Remove a listener.
    pub fn remove_listener(&self, listener: &Arc<dyn SessionListener>) {
        match self {
            Self::Direct(s) => s.remove_listener(listener),
            Self::Translated { translator, key } => translator.remove_listener(*key, listener),
        }
    }

    /// Start sending stream `index` of `source`.
    pub fn create_send_stream(
        &self,
        source: &DataSource,
        index: usize,
    ) -> Result<SendStreamId, SessionError> {
        match self {
            Self::Direct(s) => s.create_send_stream(source, index),
            Self::Translated { translator, key } => {
                translator.create_send_stream(*key, source, index)
            }
        }
    }

    /// Reception counters.
    pub fn global_reception_stats(&self) -> GlobalReceptionStats {
        match self {
            Self::Direct(s) => s.global_reception_stats(),
            Self::Translated { translator, key } => translator.global_reception_stats(*key),
        }
    }

    /// Transmission counters.
    pub fn global_transmission_stats(&self) -> GlobalTransmissionStats {
        match self {
            Self::Direct(s) => s.global_transmission_stats(),
            Self::Translated { translator, key } => translator.global_transmission_stats(*key),
        }
    }

    /// Our SSRC.
    pub fn local_ssrc(&self) -> Ssrc {
        match self {
            Self::Direct(s) => s.local_ssrc(),
            Self::Translated { translator, key } => translator.local_ssrc(*key),
        }
    }

    /// Remote sources.
    pub fn receive_streams(&self) -> Vec<Ssrc> {
        match self {
            Self::Direct(s) => s.receive_streams(),
            Self::Translated { translator, key } => translator.receive_streams(*key),
        }
    }

    /// Local send streams.
    pub fn send_streams(&self) -> Vec<SendStreamId> {
        match self {
            Self::Direct(s) => s.send_streams(),
            Self::Translated { translator, key } => translator.send_streams(*key),
        }
    }

    /// Release the session, or leave the translator.
    pub fn dispose(&self) {
        match self {
            Self::Direct(s) => {
                debug!("Dispose session");
                s.dispose()
            }
            Self::Translated { translator, key } => {
                debug!("Leave translator with key {}", key);
                translator.dispose(*key)
            }
        }
    }
}
