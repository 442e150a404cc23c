//! Latest RTCP reports per SSRC, in both directions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};

use crate::id::Ssrc;
use crate::rtcp::{ExtendedReport, ReceiverReport, ReceptionReport, SenderInfo, SenderReport};
use crate::rtcp::VoipMetrics;
use crate::util::unix_millis;

/// A value with the wall clock time it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamped<T> {
    /// The stored value.
    pub value: T,
    /// When the value was stored.
    pub timestamp: SystemTime,
}

/// A sender or receiver report, as seen by the store.
///
/// `sender_info` is set for sender reports only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpReport {
    /// SSRC of the originator.
    pub ssrc: Ssrc,
    /// Sender information of an SR.
    pub sender_info: Option<SenderInfo>,
    /// Feedback on each source the originator receives.
    pub feedback: Vec<ReceptionReport>,
}

impl From<&SenderReport> for RtcpReport {
    fn from(v: &SenderReport) -> Self {
        RtcpReport {
            ssrc: v.sender_info.ssrc,
            sender_info: Some(v.sender_info),
            feedback: v.reports.iter().copied().collect(),
        }
    }
}

impl From<&ReceiverReport> for RtcpReport {
    fn from(v: &ReceiverReport) -> Self {
        RtcpReport {
            ssrc: v.sender_ssrc,
            sender_info: None,
            feedback: v.reports.iter().copied().collect(),
        }
    }
}

/// Notified when a stored report changes.
///
/// Called on the thread that stored the report, outside any store lock.
pub trait RtcpReportListener: Send + Sync {
    /// A new SR or RR arrived from the remote.
    fn report_received(&self, _report: &Stamped<RtcpReport>) {}

    /// A new SR or RR was sent.
    fn report_sent(&self, _report: &Stamped<RtcpReport>) {}

    /// A new XR arrived from the remote.
    fn extended_report_received(&self, _report: &Stamped<ExtendedReport>) {}

    /// A new XR was sent.
    fn extended_report_sent(&self, _report: &Stamped<ExtendedReport>) {}
}

#[derive(Debug, Default)]
struct Side {
    reports: HashMap<Ssrc, Stamped<RtcpReport>>,
    feedback: HashMap<Ssrc, ReceptionReport>,
    extended: HashMap<Ssrc, Stamped<ExtendedReport>>,
    voip_metrics: HashMap<Ssrc, VoipMetrics>,
    first_packet: HashMap<Ssrc, SystemTime>,
}

impl Side {
    fn store_report(&mut self, report: RtcpReport) -> Option<Stamped<RtcpReport>> {
        if self.reports.get(&report.ssrc).map(|s| &s.value) == Some(&report) {
            return None;
        }

        for f in &report.feedback {
            self.feedback.insert(f.ssrc, *f);
        }

        let stamped = Stamped {
            value: report,
            timestamp: SystemTime::now(),
        };
        self.reports.insert(stamped.value.ssrc, stamped.clone());

        Some(stamped)
    }

    fn store_extended(&mut self, report: ExtendedReport) -> Option<Stamped<ExtendedReport>> {
        if self.extended.get(&report.ssrc).map(|s| &s.value) == Some(&report) {
            return None;
        }

        for m in report.voip_metrics() {
            self.voip_metrics.insert(m.ssrc, *m);
        }

        let stamped = Stamped {
            value: report,
            timestamp: SystemTime::now(),
        };
        self.extended.insert(stamped.value.ssrc, stamped.clone());

        Some(stamped)
    }
}

/// Read access to one direction of a [`RtcpReportStore`].
///
/// Values are cloned out, no lock is held between calls.
#[derive(Clone, Copy)]
pub struct ReportSide<'a> {
    side: &'a RwLock<Side>,
}

impl<'a> ReportSide<'a> {
    /// Latest SR or RR originated by `ssrc`.
    pub fn report(&self, ssrc: Ssrc) -> Option<Stamped<RtcpReport>> {
        self.side.read().reports.get(&ssrc).cloned()
    }

    /// Latest SR or RR of every originator.
    pub fn reports(&self) -> Vec<Stamped<RtcpReport>> {
        self.side.read().reports.values().cloned().collect()
    }

    /// Latest feedback block reporting on source `ssrc`.
    pub fn feedback(&self, ssrc: Ssrc) -> Option<ReceptionReport> {
        self.side.read().feedback.get(&ssrc).copied()
    }

    /// Latest XR originated by `ssrc`.
    pub fn extended_report(&self, ssrc: Ssrc) -> Option<Stamped<ExtendedReport>> {
        self.side.read().extended.get(&ssrc).cloned()
    }

    /// Latest VoIP Metrics block reporting on source `ssrc`.
    pub fn voip_metrics(&self, ssrc: Ssrc) -> Option<VoipMetrics> {
        self.side.read().voip_metrics.get(&ssrc).copied()
    }

    /// When the first packet of `ssrc` went through in this direction.
    pub fn first_packet_time(&self, ssrc: Ssrc) -> Option<SystemTime> {
        self.side.read().first_packet.get(&ssrc).copied()
    }
}

type Listeners = Arc<Vec<Arc<dyn RtcpReportListener>>>;

/// Cache of the latest RTCP reports of one media stream.
///
/// A report replaces the stored one for its SSRC only when it differs. An
/// unchanged report keeps the old timestamp and notifies nobody.
#[derive(Default)]
pub struct RtcpReportStore {
    received: RwLock<Side>,
    sent: RwLock<Side>,
    rtt_via_seq: Mutex<HashMap<Ssrc, u32>>,
    listeners: Mutex<Listeners>,
}

impl RtcpReportStore {
    /// Empty store.
    pub fn new() -> Self {
        RtcpReportStore::default()
    }

    /// Reports that arrived from the remote.
    pub fn received(&self) -> ReportSide<'_> {
        ReportSide {
            side: &self.received,
        }
    }

    /// Reports sent to the remote.
    pub fn sent(&self) -> ReportSide<'_> {
        ReportSide { side: &self.sent }
    }

    /// Store a received SR or RR. Returns whether anything changed.
    pub fn report_received(&self, report: RtcpReport) -> bool {
        let stored = self.received.write().store_report(report);

        let Some(stamped) = stored else {
            return false;
        };
        trace!("RTCP report received from {}", stamped.value.ssrc);

        for l in self.listeners().iter() {
            l.report_received(&stamped);
        }
        true
    }

    /// Store a sent SR or RR. Returns whether anything changed.
    pub fn report_sent(&self, report: RtcpReport) -> bool {
        let stored = self.sent.write().store_report(report);

        let Some(stamped) = stored else {
            return false;
        };
        trace!("RTCP report sent from {}", stamped.value.ssrc);

        for l in self.listeners().iter() {
            l.report_sent(&stamped);
        }
        true
    }

    /// Store a received XR. Returns whether anything changed.
    pub fn extended_report_received(&self, report: ExtendedReport) -> bool {
        let stored = self.received.write().store_extended(report);

        let Some(stamped) = stored else {
            return false;
        };
        trace!("RTCP XR received from {}", stamped.value.ssrc);

        for l in self.listeners().iter() {
            l.extended_report_received(&stamped);
        }
        true
    }

    /// Store a sent XR. Returns whether anything changed.
    pub fn extended_report_sent(&self, report: ExtendedReport) -> bool {
        let stored = self.sent.write().store_extended(report);

        let Some(stamped) = stored else {
            return false;
        };
        trace!("RTCP XR sent from {}", stamped.value.ssrc);

        for l in self.listeners().iter() {
            l.extended_report_sent(&stamped);
        }
        true
    }

    /// Record the first packet received from `ssrc`. Later calls are ignored.
    pub fn set_first_packet_received(&self, ssrc: Ssrc, at: SystemTime) -> bool {
        set_first(&self.received, ssrc, at, "received")
    }

    /// Record the first packet sent from `ssrc`. Later calls are ignored.
    pub fn set_first_packet_sent(&self, ssrc: Ssrc, at: SystemTime) -> bool {
        set_first(&self.sent, ssrc, at, "sent")
    }

    /// Round trip time of `ssrc` estimated from sequence numbers, in milliseconds.
    ///
    /// 0 when nothing has been estimated.
    pub fn rtt_via_seq(&self, ssrc: Ssrc) -> u32 {
        self.rtt_via_seq.lock().get(&ssrc).copied().unwrap_or(0)
    }

    /// Set the round trip time of `ssrc` estimated from sequence numbers.
    pub fn set_rtt_via_seq(&self, ssrc: Ssrc, millis: u32) {
        self.rtt_via_seq.lock().insert(ssrc, millis);
    }

    /// Add a listener. A listener already added is not added again.
    pub fn add_listener(&self, listener: Arc<dyn RtcpReportListener>) {
        let mut lock = self.listeners.lock();
        if lock.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return;
        }

        let mut next = Vec::with_capacity(lock.len() + 1);
        next.extend(lock.iter().cloned());
        next.push(listener);
        *lock = Arc::new(next);
    }

    /// Remove a listener previously added.
    pub fn remove_listener(&self, listener: &Arc<dyn RtcpReportListener>) {
        let mut lock = self.listeners.lock();
        if !lock.iter().any(|l| Arc::ptr_eq(l, listener)) {
            return;
        }

        let next = lock
            .iter()
            .filter(|l| !Arc::ptr_eq(*l, listener))
            .cloned()
            .collect();
        *lock = Arc::new(next);
    }

    fn listeners(&self) -> Listeners {
        self.listeners.lock().clone()
    }
}

fn set_first(side: &RwLock<Side>, ssrc: Ssrc, at: SystemTime, dir: &str) -> bool {
    let mut lock = side.write();
    if lock.first_packet.contains_key(&ssrc) {
        return false;
    }

    debug!("First packet {} for {} at {}", dir, ssrc, unix_millis(at));
    lock.first_packet.insert(ssrc, at);
    true
}
