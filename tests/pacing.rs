use std::time::{Duration, Instant};

use rtcore::error::NetError;
use rtcore::{PacketSender, TransportConfig};

mod common;
use common::{init_log, remote, rtp, wait_until, Recorder};

#[test]
pub fn paced_drain_keeps_order_and_rate() {
    init_log();

    let out = Recorder::new();
    let config = TransportConfig::new().set_rate_limit(10, 100);
    let sender = PacketSender::new(out.clone(), config).unwrap();
    sender.add_target(remote());

    let start = Instant::now();
    for seq in 0..1000_u16 {
        sender.write(&rtp(1, seq)).unwrap();
    }
    wait_until(|| out.len() == 1000);
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(900), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_secs(20), "{:?}", elapsed);

    let seqs: Vec<u16> = out
        .payloads()
        .iter()
        .map(|b| u16::from_be_bytes([b[2], b[3]]))
        .collect();
    assert_eq!(seqs, (0..1000).collect::<Vec<_>>());

    // No 11 sends fit within any 100ms window.
    let times = out.times();
    for w in times.windows(11) {
        assert!(
            w[10] - w[0] >= Duration::from_millis(95),
            "{:?}",
            w[10] - w[0]
        );
    }

    assert_eq!(sender.counters().packets, 1000);
    sender.close();
}

#[test]
pub fn unpaced_writes_are_immediate() {
    init_log();

    let out = Recorder::new();
    let sender = PacketSender::new(out.clone(), TransportConfig::new()).unwrap();
    sender.add_target(remote());
    sender.add_target("10.0.0.3:5004".parse().unwrap());

    for seq in 0..50_u16 {
        sender.write(&rtp(1, seq)).unwrap();
    }

    // Synchronous fan out, one send per target.
    assert_eq!(out.len(), 100);
}

#[test]
pub fn rate_limit_can_be_set_later() {
    init_log();

    let out = Recorder::new();
    let sender = PacketSender::new(out.clone(), TransportConfig::new()).unwrap();
    sender.add_target(remote());

    assert!(matches!(
        sender.set_max_packets_per_millis(10, 0),
        Err(NetError::Config(_))
    ));
    sender.set_max_packets_per_millis(5, 50).unwrap();

    let start = Instant::now();
    for seq in 0..20_u16 {
        sender.write(&rtp(1, seq)).unwrap();
    }
    wait_until(|| out.len() == 20);

    assert!(start.elapsed() >= Duration::from_millis(140));

    sender.close();
    assert!(matches!(sender.write(&rtp(1, 0)), Err(NetError::Closed)));
    assert!(matches!(
        sender.set_max_packets_per_millis(5, 50),
        Err(NetError::Closed)
    ));
}
