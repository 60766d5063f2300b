use std::net::UdpSocket;
use std::time::Duration;

use enb_config::CfgPcap;
use enb_core::{ByteBuffer, TtiPoint, debug};
use enb_pcap::{MacPcapNet, PcapError};

fn collector() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

#[test]
fn test_frames_reach_collector() {
    debug::setup_logging_verbose();
    let (socket, port) = collector();
    let mut pcap = MacPcapNet::new();
    pcap.open("127.0.0.1", "127.0.0.1", port, 0, 7).unwrap();

    let tti = TtiPoint::from_sfn_sf(100, 4);
    pcap.write_dl_crnti(ByteBuffer::from_payload(64, &[0x3c, 0x01, 0x02]), 0x46, tti);
    pcap.write_dl_ranti(ByteBuffer::from_payload(64, &[0x40; 7]), 5, tti);

    let mut buf = [0u8; 256];
    let len = socket.recv(&mut buf).unwrap();
    let frame = &buf[..len];
    assert!(frame.starts_with(b"mac-lte"));
    // FDD, downlink, C-RNTI, then the RNTI tag
    assert_eq!(&frame[7..13], &[1, 1, 3, 0x02, 0x00, 0x46]);
    // UE id tag
    assert_eq!(&frame[13..16], &[0x03, 0x00, 0x07]);
    assert_eq!(&frame[len - 4..], &[0x01, 0x3c, 0x01, 0x02]);

    let len = socket.recv(&mut buf).unwrap();
    assert_eq!(buf[9], 2);
    assert_eq!(&buf[len - 7..len], &[0x40; 7]);

    let stats = pcap.close().unwrap();
    assert_eq!(stats.nof_sent, 2);
    assert_eq!(stats.nof_dropped, 0);
}

#[test]
fn test_open_from_config_twice_fails() {
    debug::setup_logging_verbose();
    let (_socket, port) = collector();
    let cfg = CfgPcap {
        client_ip: "127.0.0.1".to_string(),
        client_port: port,
        bind_ip: "127.0.0.1".to_string(),
        bind_port: 0,
        ue_id: 0,
    };
    let mut pcap = MacPcapNet::from_config(&cfg).unwrap();
    assert!(pcap.is_open());
    let err = pcap.open(&cfg.client_ip, &cfg.bind_ip, cfg.client_port, 0, 0).unwrap_err();
    assert!(matches!(err, PcapError::AlreadyOpen));

    pcap.close().unwrap();
    // The sink can be reopened after close
    pcap.open(&cfg.client_ip, &cfg.bind_ip, cfg.client_port, 0, 0).unwrap();
}

#[test]
fn test_bind_failure_is_reported() {
    debug::setup_logging_verbose();
    let mut pcap = MacPcapNet::new();
    let err = pcap.open("127.0.0.1", "256.0.0.1", 5847, 0, 0).unwrap_err();
    assert!(matches!(err, PcapError::Network(_)));
    assert!(!pcap.is_open());
}
