//! Integration tests: a full link against a fake drone on localhost.
//!
//! The fake drone is a pair of plain UDP sockets. It records what the link
//! sends to the control port and pushes telemetry and video back to the
//! link's ephemeral local ports.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use x80_core::flags::{ActionFlags, StatusFlags};
use x80_core::header::{CONTROL_FRAME_LEN, HEARTBEAT};
use x80_core::telemetry::{encode_v1, encode_v2};
use x80_core::{
    AuxCommand, ConnectionHealth, ControlFrame, DroneLink, LinkConfig, LinkEvent, TelemetryFormat,
    VideoFragment, X80Error,
};

// ── Helpers ──────────────────────────────────────────────────────

const WAIT: Duration = Duration::from_secs(5);

struct FakeDrone {
    control: UdpSocket,
    video_out: UdpSocket,
}

impl FakeDrone {
    async fn new() -> Self {
        Self {
            control: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            video_out: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    /// Link configuration pointing at this drone, with ephemeral local
    /// ports and short timings.
    fn config(&self) -> LinkConfig {
        let ephemeral = SocketAddr::from(([127, 0, 0, 1], 0));
        let mut cfg = LinkConfig::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_local_addrs(ephemeral, ephemeral);
        cfg.control_port = self.control.local_addr().unwrap().port();
        cfg.control_interval = Duration::from_millis(20);
        cfg.heartbeat_interval = Duration::from_millis(100);
        cfg.recv_timeout = Duration::from_millis(100);
        cfg.reconnect_pause = Duration::from_millis(20);
        cfg
    }

    /// Next datagram on the control port.
    async fn recv(&self) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let (n, _) = tokio::time::timeout(WAIT, self.control.recv_from(&mut buf))
            .await
            .expect("timeout waiting for the link")
            .unwrap();
        buf[..n].to_vec()
    }

    /// Next control frame, skipping heartbeats and auxiliary commands.
    async fn recv_control(&self) -> ControlFrame {
        loop {
            let datagram = self.recv().await;
            if let Some(frame) = ControlFrame::from_bytes(&datagram) {
                return frame;
            }
        }
    }

    async fn send_telemetry(&self, link: &DroneLink, bytes: &[u8]) {
        let (control, _) = link.local_addrs().unwrap();
        self.control.send_to(bytes, control).await.unwrap();
    }

    async fn send_video(&self, link: &DroneLink, datagram: &[u8]) {
        let (_, video) = link.local_addrs().unwrap();
        self.video_out.send_to(datagram, video).await.unwrap();
    }
}

async fn next_health(rx: &mut tokio::sync::broadcast::Receiver<LinkEvent>) -> ConnectionHealth {
    tokio::time::timeout(WAIT, async {
        loop {
            if let LinkEvent::Health(h) = rx.recv().await.unwrap() {
                return h;
            }
        }
    })
    .await
    .expect("timeout waiting for health event")
}

// ── Control channel ──────────────────────────────────────────────

#[tokio::test]
async fn test_control_frames_are_periodic_and_valid() {
    let drone = FakeDrone::new().await;
    let mut link = DroneLink::new(drone.config());
    link.command().set_sticks(-100, 0, 50, 100);
    link.connect().await.unwrap();

    for _ in 0..3 {
        let frame = drone.recv_control().await;
        assert!(frame.is_valid());
        let bytes = frame.as_bytes();
        assert_eq!(bytes.len(), CONTROL_FRAME_LEN);
        assert_eq!(bytes[2], 0);
        assert_eq!(bytes[4], 191);
        assert_eq!(bytes[5], 255);
    }

    link.disconnect().await;
}

#[tokio::test]
async fn test_heartbeat_is_sent() {
    let drone = FakeDrone::new().await;
    let mut link = DroneLink::new(drone.config());
    link.connect().await.unwrap();

    tokio::time::timeout(WAIT, async {
        while drone.recv().await != HEARTBEAT {}
    })
    .await
    .expect("no heartbeat");

    link.disconnect().await;
}

#[tokio::test]
async fn test_one_shot_clears_itself() {
    let drone = FakeDrone::new().await;
    let mut cfg = drone.config();
    cfg.one_shot_timeout = Duration::from_millis(150);
    let mut link = DroneLink::new(cfg);
    link.connect().await.unwrap();

    link.command().takeoff();
    let mut seen = false;
    tokio::time::timeout(WAIT, async {
        loop {
            let frame = drone.recv_control().await;
            let set = frame.actions().contains(ActionFlags::TAKEOFF);
            if set {
                seen = true;
            } else if seen {
                break;
            }
        }
    })
    .await
    .expect("takeoff flag never cleared");
    assert!(!link.command().snapshot().takeoff);

    link.disconnect().await;
}

#[tokio::test]
async fn test_video_start_is_sent_once() {
    let drone = FakeDrone::new().await;
    let mut link = DroneLink::new(drone.config());
    link.connect().await.unwrap();

    link.start_video().await.unwrap();
    let expected = AuxCommand::VideoStart.bytes().unwrap();
    tokio::time::timeout(WAIT, async {
        while drone.recv().await != expected {}
    })
    .await
    .expect("video start never arrived");

    link.disconnect().await;
    assert!(matches!(
        link.stop_video().await,
        Err(X80Error::NotConnected)
    ));
}

// ── Inbound streams ──────────────────────────────────────────────

#[tokio::test]
async fn test_telemetry_reaches_subscribers() {
    let drone = FakeDrone::new().await;
    let mut link = DroneLink::new(drone.config());
    let mut rx = link.subscribe_telemetry();
    link.connect().await.unwrap();

    // Garbage, then a format 1 frame split across two datagrams.
    let frame = encode_v1(80, 12, 70, StatusFlags::FLYING);
    let mut first = vec![0x01, 0x02, 0x03];
    first.extend_from_slice(&frame[..4]);
    drone.send_telemetry(&link, &first).await;
    drone.send_telemetry(&link, &frame[4..]).await;

    let t = tokio::time::timeout(WAIT, rx.wait_for(|t| t.packets >= 1))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(t.battery_pct, 67);
    assert_eq!(t.altitude, 12);
    assert_eq!(t.format, Some(TelemetryFormat::V1));
    assert!(t.is_flying());

    drone
        .send_telemetry(&link, &encode_v2(45, 79, 3, 60, StatusFlags::empty()))
        .await;
    let t = tokio::time::timeout(WAIT, rx.wait_for(|t| t.packets >= 2))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(t.battery_pct, 45);
    assert_eq!(t.format, Some(TelemetryFormat::V2));

    link.disconnect().await;
}

#[tokio::test]
async fn test_video_fragments_become_a_frame() {
    let drone = FakeDrone::new().await;
    let mut link = DroneLink::new(drone.config());
    let mut events = link.subscribe();
    link.connect().await.unwrap();

    let parts: [&[u8]; 3] = [&[0x00, 0xFF, 0xD8], &[0x10, 0x20], &[0xFF, 0xD9]];
    // Out of order; the closing fragment goes last.
    for packet_num in [1u8, 0, 2] {
        let fragment = VideoFragment {
            frame_id: 3,
            is_last: packet_num == 2,
            packet_num,
            payload: bytes::Bytes::copy_from_slice(parts[packet_num as usize]),
        };
        drone.send_video(&link, &fragment.encode()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let frame = tokio::time::timeout(WAIT, async {
        loop {
            if let LinkEvent::Frame(f) = events.recv().await.unwrap() {
                return f;
            }
        }
    })
    .await
    .expect("no frame");
    assert_eq!(frame.frame_id, 3);
    assert_eq!(&frame.data[..], &[0xFF, 0xD8, 0x10, 0x20, 0xFF, 0xD9]);
    assert_eq!(link.stats().unwrap().video_frames, 1);

    link.disconnect().await;
}

#[tokio::test]
async fn test_foreign_sender_is_ignored() {
    let drone = FakeDrone::new().await;
    let mut link = DroneLink::new(drone.config());
    link.connect().await.unwrap();

    // 127.0.0.2 is still loopback on Linux, but not the configured drone.
    let Ok(stranger) = UdpSocket::bind("127.0.0.2:0").await else {
        link.disconnect().await;
        return;
    };
    let (control, _) = link.local_addrs().unwrap();
    stranger
        .send_to(&encode_v2(1, 70, 0, 0, StatusFlags::empty()), control)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(link.telemetry().packets, 0);

    link.disconnect().await;
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn test_bind_failure_starts_nothing() {
    let drone = FakeDrone::new().await;
    let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut cfg = drone.config();
    cfg.local_video = taken.local_addr().unwrap();

    let mut link = DroneLink::new(cfg);
    let err = link.connect().await.unwrap_err();
    match err {
        X80Error::Bind { channel, addr, .. } => {
            assert_eq!(channel, "video");
            assert_eq!(addr, taken.local_addr().unwrap());
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(!link.is_connected());
    assert!(link.local_addrs().is_none());
    assert!(link.stats().is_none());
}

#[tokio::test]
async fn test_disconnect_is_idempotent_and_stops_traffic() {
    let drone = FakeDrone::new().await;
    let mut link = DroneLink::new(drone.config());
    link.disconnect().await;
    link.connect().await.unwrap();
    drone.recv_control().await;

    link.disconnect().await;
    link.disconnect().await;
    assert!(!link.is_connected());

    // Drain what was in flight, then expect silence.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut buf = [0u8; 64];
    while let Ok(Ok(_)) =
        tokio::time::timeout(Duration::from_millis(10), drone.control.recv_from(&mut buf)).await
    {}
    let quiet =
        tokio::time::timeout(Duration::from_millis(200), drone.control.recv_from(&mut buf)).await;
    assert!(quiet.is_err(), "link kept sending after disconnect");
}

#[tokio::test]
async fn test_reconnect_resumes_control() {
    let drone = FakeDrone::new().await;
    let mut link = DroneLink::new(drone.config());
    link.connect().await.unwrap();
    drone.recv_control().await;

    link.reconnect().await.unwrap();
    assert!(link.is_connected());
    assert_eq!(link.health(), ConnectionHealth::Connected);
    assert!(drone.recv_control().await.is_valid());
    assert_eq!(link.stats().unwrap().video_frames, 0);

    link.disconnect().await;
}

// ── Supervision ──────────────────────────────────────────────────

#[tokio::test]
async fn test_stale_streams_degrade_then_restore() {
    let drone = FakeDrone::new().await;
    let mut cfg = drone.config();
    cfg.watchdog_interval = Duration::from_millis(50);
    cfg.stale_after = Duration::from_millis(150);
    let mut link = DroneLink::new(cfg);
    let mut events = link.subscribe();
    link.connect().await.unwrap();

    // Nothing inbound: both streams go stale while sends keep working.
    assert_eq!(next_health(&mut events).await, ConnectionHealth::Unstable);
    assert!(link.is_connected());

    // Feed both streams until the watchdog sees them fresh again.
    let jpeg = VideoFragment {
        frame_id: 1,
        is_last: true,
        packet_num: 0,
        payload: bytes::Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
    }
    .encode();
    let feeder = async {
        loop {
            drone
                .send_telemetry(&link, &encode_v2(90, 82, 0, 0, StatusFlags::empty()))
                .await;
            drone.send_video(&link, &jpeg).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    let restored = tokio::select! {
        h = next_health(&mut events) => h,
        _ = feeder => unreachable!(),
    };
    assert_eq!(restored, ConnectionHealth::Connected);
    assert_eq!(link.health(), ConnectionHealth::Connected);

    link.disconnect().await;
}
