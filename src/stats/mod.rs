//! RTCP statistics: report storage, XR VoIP Metrics and MOS-CQ.
//!
//! The [`StatisticsEngine`] sits in the packet pipeline of one media stream.
//! Outgoing RTCP is recorded and gets VoIP Metrics XR packets added. Incoming
//! RTCP has its XR packets removed and recorded. Everything ends up in a
//! [`RtcpReportStore`] that listeners can watch.

mod compound;
pub use compound::{add_extended_report, remove_extended_reports};

mod engine;
pub use engine::{PacketTransformer, StatisticsEngine};

mod metrics;
pub use metrics::{discard_rate, loss_rate};
pub use metrics::{BurstMetrics, JitterBufferStats, ReceiveStatsProvider};
pub use metrics::{ReceiveStreamStats, ReceptionStats};

mod mos;
pub use mos::{mos_cq, MosInputs};

mod store;
pub use store::{ReportSide, RtcpReport, RtcpReportListener, RtcpReportStore, Stamped};
