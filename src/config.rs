use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::packet::RTP_HEADER_LEN;

/// Outbound rate limit: at most `max_packets` every `per_millis` milliseconds.
///
/// `max_packets == 0` means no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Packets allowed in any window.
    pub max_packets: usize,
    /// Window length in milliseconds.
    pub per_millis: u64,
}

impl RateLimit {
    /// Checked rate limit.
    ///
    /// A limit with packets but no period is rejected.
    pub fn new(max_packets: usize, per_millis: u64) -> Result<Self, ConfigError> {
        let limit = RateLimit {
            max_packets,
            per_millis,
        };
        limit.validate()?;
        Ok(limit)
    }

    /// Whether this limit actually paces anything.
    pub fn is_enabled(&self) -> bool {
        self.max_packets > 0
    }

    /// Window length.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.per_millis)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.is_enabled() && self.per_millis < 1 {
            return Err(ConfigError::PerMillis(self.per_millis));
        }
        Ok(())
    }
}

/// Configuration of packet senders and receivers.
///
/// ```
/// use std::time::Duration;
/// use rtcore::TransportConfig;
///
/// let config = TransportConfig::new()
///     .set_rate_limit(10, 100)
///     .set_receive_timeout(Duration::from_millis(50));
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.rate_limit().unwrap().max_packets, 10);
/// ```
///
/// Configs implement [`Clone`] to help create multiple transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub(crate) rate_limit: Option<RateLimit>,
    pub(crate) receive_buffer_len: usize,
    pub(crate) receive_timeout: Duration,
    pub(crate) queue_capacity: usize,
    pub(crate) socket_receive_buffer: usize,
    pub(crate) packet_logging: bool,
}

impl TransportConfig {
    /// Creates a new default config.
    pub fn new() -> Self {
        TransportConfig::default()
    }

    /// Outbound rate limit, if any.
    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }

    /// Pace outbound packets to at most `max_packets` every `per_millis` ms.
    ///
    /// `max_packets == 0` removes the limit. Checked by [`TransportConfig::validate`].
    pub fn set_rate_limit(mut self, max_packets: usize, per_millis: u64) -> Self {
        let limit = RateLimit {
            max_packets,
            per_millis,
        };
        self.rate_limit = limit.is_enabled().then_some(limit);
        self
    }

    /// Size of the buffer each datagram is read into.
    pub fn receive_buffer_len(&self) -> usize {
        self.receive_buffer_len
    }

    /// Set the size of the buffer each datagram is read into.
    ///
    /// Defaults to 4096.
    pub fn set_receive_buffer_len(mut self, len: usize) -> Self {
        self.receive_buffer_len = len;
        self
    }

    /// How long a receive blocks before checking for close.
    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// Set how long a receive blocks before checking for close.
    ///
    /// Defaults to 100ms.
    pub fn set_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Number of packets the pacing queue holds before `write` blocks.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Set the pacing queue capacity.
    ///
    /// Defaults to 256.
    pub fn set_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Receive buffer size requested from the OS for UDP sockets.
    pub fn socket_receive_buffer(&self) -> usize {
        self.socket_receive_buffer
    }

    /// Set the receive buffer size requested from the OS for UDP sockets.
    ///
    /// Defaults to 65535.
    pub fn set_socket_receive_buffer(mut self, size: usize) -> Self {
        self.socket_receive_buffer = size;
        self
    }

    /// Whether sent and received packets are mirrored to a [`PacketLogger`][crate::PacketLogger].
    pub fn packet_logging(&self) -> bool {
        self.packet_logging
    }

    /// Toggle mirroring of packets to a [`PacketLogger`][crate::PacketLogger].
    ///
    /// Defaults to true. Without a logger this has no effect.
    pub fn set_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    /// Check the config before any thread is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(limit) = &self.rate_limit {
            limit.validate()?;
        }
        if self.receive_buffer_len < RTP_HEADER_LEN {
            return Err(ConfigError::ReceiveBuffer(self.receive_buffer_len));
        }
        if self.receive_timeout.is_zero() {
            return Err(ConfigError::ReceiveTimeout);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::QueueCapacity);
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            rate_limit: None,
            receive_buffer_len: 4 * 1024,
            receive_timeout: Duration::from_millis(100),
            queue_capacity: 256,
            socket_receive_buffer: 65535,
            packet_logging: true,
        }
    }
}

/// Audio or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio media.
    #[default]
    Audio,
    /// Video media.
    Video,
}

/// Configuration of the [`StatisticsEngine`][crate::StatisticsEngine] of one media stream.
///
/// ```
/// use rtcore::{MediaKind, StatisticsConfig};
///
/// let config = StatisticsConfig::new()
///     .set_encoding("opus")
///     .set_voip_metrics(true);
///
/// assert_eq!(config.media_kind(), MediaKind::Audio);
/// assert!(config.sends_voip_metrics());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub(crate) media_kind: MediaKind,
    pub(crate) encoding: Option<String>,
    pub(crate) voip_metrics: bool,
    pub(crate) packet_time: Duration,
    pub(crate) rendering_delay: Duration,
}

impl StatisticsConfig {
    /// Creates a new default config.
    pub fn new() -> Self {
        StatisticsConfig::default()
    }

    /// Kind of media of the stream.
    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    /// Set the kind of media of the stream.
    ///
    /// Defaults to audio.
    pub fn set_media_kind(mut self, kind: MediaKind) -> Self {
        self.media_kind = kind;
        self
    }

    /// Encoding name of the active codec, such as `opus`.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Set the encoding name of the active codec.
    pub fn set_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Whether the remote negotiated `rtcp-xr` with `voip-metrics`.
    pub fn voip_metrics(&self) -> bool {
        self.voip_metrics
    }

    /// Set whether the remote negotiated `rtcp-xr` with `voip-metrics`.
    ///
    /// Defaults to false.
    pub fn set_voip_metrics(mut self, enabled: bool) -> Self {
        self.voip_metrics = enabled;
        self
    }

    /// Whether outgoing RTCP gets VoIP Metrics XR blocks.
    ///
    /// Only for audio streams where the metrics were negotiated.
    pub fn sends_voip_metrics(&self) -> bool {
        self.media_kind == MediaKind::Audio && self.voip_metrics
    }

    /// Media duration of one packet, used to turn sequence numbers into time.
    pub fn packet_time(&self) -> Duration {
        self.packet_time
    }

    /// Set the media duration of one packet.
    ///
    /// Defaults to 20ms.
    pub fn set_packet_time(mut self, packet_time: Duration) -> Self {
        self.packet_time = packet_time;
        self
    }

    /// Delay added by audio rendering, part of the end system delay.
    pub fn rendering_delay(&self) -> Duration {
        self.rendering_delay
    }

    /// Set the delay added by audio rendering.
    ///
    /// Defaults to 100ms.
    pub fn set_rendering_delay(mut self, delay: Duration) -> Self {
        self.rendering_delay = delay;
        self
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        StatisticsConfig {
            media_kind: MediaKind::Audio,
            encoding: None,
            voip_metrics: false,
            packet_time: Duration::from_millis(20),
            rendering_delay: Duration::from_millis(100),
        }
    }
}
