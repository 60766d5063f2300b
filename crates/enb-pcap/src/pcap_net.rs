use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};

use enb_config::CfgPcap;
use enb_core::{ByteBuffer, Rnti, SIRNTI, TtiPoint};

use crate::context::{LteMacContext, NrMacContext, PcapContext, PcapDirection, RntiType};
use crate::transports::udp::UdpTransport;
use crate::transports::{NetworkAddress, NetworkError, NetworkTransport};

#[derive(Debug)]
pub enum PcapError {
    /// `open` called while a writer is running
    AlreadyOpen,
    NotOpen,
    Network(NetworkError),
    Thread(String),
}

impl std::fmt::Display for PcapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PcapError::AlreadyOpen => write!(f, "PCAP socket writer already running, close first"),
            PcapError::NotOpen => write!(f, "PCAP socket writer not running"),
            PcapError::Network(e) => write!(f, "PCAP socket: {}", e),
            PcapError::Thread(msg) => write!(f, "PCAP writer thread: {}", msg),
        }
    }
}

impl std::error::Error for PcapError {}

impl From<NetworkError> for PcapError {
    fn from(e: NetworkError) -> Self {
        PcapError::Network(e)
    }
}

/// PDU queued for the writer thread
#[derive(Debug)]
pub struct PcapPdu {
    pub context: PcapContext,
    pub pdu: ByteBuffer,
}

/// Counters kept by the writer thread, returned on close
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PcapWriterStats {
    pub nof_sent: u64,
    pub nof_dropped: u64,
}

/// Drains the queue into the transport until the queue is closed
struct PcapWriter<T: NetworkTransport> {
    transport: T,
    rx: Receiver<PcapPdu>,
    stats: PcapWriterStats,
}

impl<T: NetworkTransport> PcapWriter<T> {
    fn run(mut self) -> PcapWriterStats {
        while let Ok(pdu) = self.rx.recv() {
            self.write_pdu(pdu);
        }
        tracing::debug!("PcapWriter: queue closed, sent={} dropped={}", self.stats.nof_sent, self.stats.nof_dropped);
        self.transport.close();
        self.stats
    }

    fn write_pdu(&mut self, mut pdu: PcapPdu) {
        let header = pdu.context.header();
        if let Err(e) = pdu.pdu.prepend(&header) {
            tracing::error!("write_pdu: PDU headroom is too small for the context header: {}", e);
            self.stats.nof_dropped += 1;
            return;
        }
        match self.transport.send_unreliable(pdu.pdu.data()) {
            Ok(()) => self.stats.nof_sent += 1,
            Err(e) => {
                tracing::error!("write_pdu: {}", e);
                self.stats.nof_dropped += 1;
            }
        }
    }
}

/// MAC PCAP sink streaming framed PDUs over UDP, e.g. to Wireshark.
///
/// Writes are queued and sent from a dedicated thread. While the sink is
/// closed, writes are discarded.
pub struct MacPcapNet {
    ue_id: u16,
    tx: Option<Sender<PcapPdu>>,
    worker: Option<JoinHandle<PcapWriterStats>>,
}

impl Default for MacPcapNet {
    fn default() -> Self {
        Self::new()
    }
}

impl MacPcapNet {
    pub fn new() -> Self {
        MacPcapNet { ue_id: 0, tx: None, worker: None }
    }

    /// Open the sink as described by the config
    pub fn from_config(cfg: &CfgPcap) -> Result<Self, PcapError> {
        let mut pcap = MacPcapNet::new();
        pcap.open(&cfg.client_ip, &cfg.bind_ip, cfg.client_port, cfg.bind_port, cfg.ue_id)?;
        Ok(pcap)
    }

    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    pub fn open(
        &mut self,
        client_ip: &str,
        bind_ip: &str,
        client_port: u16,
        bind_port: u16,
        ue_id: u16,
    ) -> Result<(), PcapError> {
        if self.is_open() {
            tracing::error!("open: PCAP socket writer for {} already running", bind_ip);
            return Err(PcapError::AlreadyOpen);
        }

        let client = NetworkAddress::Udp { host: client_ip.to_string(), port: client_port };
        let mut transport = UdpTransport::new(client, format!("{}:{}", bind_ip, bind_port));
        transport.connect()?;
        tracing::info!(
            "Sending MAC PCAP frames to {}:{} (from {}:{})",
            client_ip,
            client_port,
            bind_ip,
            transport.local_port().unwrap_or(bind_port)
        );
        self.start(transport, ue_id)
    }

    /// Start the writer thread on an already connected transport
    pub fn start<T: NetworkTransport + 'static>(&mut self, transport: T, ue_id: u16) -> Result<(), PcapError> {
        if self.is_open() {
            return Err(PcapError::AlreadyOpen);
        }
        let (tx, rx) = unbounded::<PcapPdu>();
        let writer = PcapWriter { transport, rx, stats: PcapWriterStats::default() };
        let worker = thread::Builder::new()
            .name("mac-pcap-writer".to_string())
            .spawn(move || writer.run())
            .map_err(|e| PcapError::Thread(format!("failed to spawn: {}", e)))?;

        self.ue_id = ue_id;
        self.tx = Some(tx);
        self.worker = Some(worker);
        Ok(())
    }

    /// Flush everything queued so far, then stop the writer and release the socket
    pub fn close(&mut self) -> Result<PcapWriterStats, PcapError> {
        let Some(tx) = self.tx.take() else {
            return Err(PcapError::NotOpen);
        };
        // Disconnecting the queue lets the writer drain it and exit
        drop(tx);
        let Some(worker) = self.worker.take() else {
            return Err(PcapError::NotOpen);
        };
        worker.join().map_err(|_| PcapError::Thread("writer panicked".to_string()))
    }

    /// Queue a PDU with an explicit context
    pub fn write_pdu(&self, context: PcapContext, pdu: ByteBuffer) {
        let Some(tx) = &self.tx else {
            tracing::trace!("write_pdu: sink closed, dropping {:?}", context);
            return;
        };
        if tx.send(PcapPdu { context, pdu }).is_err() {
            tracing::error!("write_pdu: writer thread gone");
        }
    }

    fn write_lte(&self, direction: PcapDirection, rnti_type: RntiType, rnti: Rnti, tti: TtiPoint, pdu: ByteBuffer) {
        let ctx = LteMacContext::new(direction, rnti_type, rnti, self.ue_id, tti);
        self.write_pdu(PcapContext::Lte(ctx), pdu);
    }

    pub fn write_dl_crnti(&self, pdu: ByteBuffer, rnti: Rnti, tti: TtiPoint) {
        self.write_lte(PcapDirection::Dl, RntiType::CRnti, rnti, tti, pdu);
    }

    pub fn write_ul_crnti(&self, pdu: ByteBuffer, rnti: Rnti, tti: TtiPoint) {
        self.write_lte(PcapDirection::Ul, RntiType::CRnti, rnti, tti, pdu);
    }

    pub fn write_dl_ranti(&self, pdu: ByteBuffer, ra_rnti: Rnti, tti: TtiPoint) {
        self.write_lte(PcapDirection::Dl, RntiType::RaRnti, ra_rnti, tti, pdu);
    }

    pub fn write_dl_sirnti(&self, pdu: ByteBuffer, tti: TtiPoint) {
        self.write_lte(PcapDirection::Dl, RntiType::SiRnti, SIRNTI, tti, pdu);
    }

    pub fn write_nr_pdu(&self, pdu: ByteBuffer, direction: PcapDirection, rnti_type: RntiType, rnti: Rnti, harq_id: u8, tti: TtiPoint) {
        let ctx = NrMacContext::new(direction, rnti_type, rnti, self.ue_id, harq_id, tti);
        self.write_pdu(PcapContext::Nr(ctx), pdu);
    }
}

impl Drop for MacPcapNet {
    fn drop(&mut self) {
        if self.is_open() {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every datagram instead of sending it
    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: bool,
    }

    impl NetworkTransport for RecordingTransport {
        fn connect(&mut self) -> Result<(), NetworkError> {
            Ok(())
        }
        fn close(&mut self) {}
        fn is_connected(&self) -> bool {
            true
        }
        fn send_unreliable(&mut self, payload: &[u8]) -> Result<(), NetworkError> {
            if self.fail {
                return Err(NetworkError::ShortSend { expected: payload.len(), sent: 0 });
            }
            self.sent.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_writes_are_framed_in_order() {
        let transport = RecordingTransport::default();
        let sent = transport.sent.clone();
        let mut pcap = MacPcapNet::new();
        pcap.start(transport, 1).unwrap();

        let tti = TtiPoint::from_sfn_sf(10, 3);
        pcap.write_dl_crnti(ByteBuffer::from_payload(64, &[0xaa, 0xbb]), 0x46, tti);
        pcap.write_dl_sirnti(ByteBuffer::from_payload(64, &[0x01]), tti);
        let stats = pcap.close().unwrap();
        assert_eq!(stats, PcapWriterStats { nof_sent: 2, nof_dropped: 0 });

        let sent = sent.lock().unwrap();
        let expected_hdr = PcapContext::Lte(LteMacContext::new(PcapDirection::Dl, RntiType::CRnti, 0x46, 1, tti)).header();
        assert_eq!(&sent[0][..expected_hdr.len()], &expected_hdr[..]);
        assert_eq!(&sent[0][expected_hdr.len()..], &[0xaa, 0xbb]);
        assert!(sent[1].starts_with(b"mac-lte"));
        assert_eq!(sent[1][9], RntiType::SiRnti as u8);
    }

    #[test]
    fn test_small_headroom_drops_pdu() {
        let transport = RecordingTransport::default();
        let sent = transport.sent.clone();
        let mut pcap = MacPcapNet::new();
        pcap.start(transport, 0).unwrap();

        pcap.write_ul_crnti(ByteBuffer::from_payload(4, &[0xaa]), 0x46, TtiPoint::new(0));
        pcap.write_nr_pdu(ByteBuffer::from_payload(64, &[0xbb]), PcapDirection::Ul, RntiType::CRnti, 0x46, 2, TtiPoint::new(0));
        let stats = pcap.close().unwrap();
        assert_eq!(stats, PcapWriterStats { nof_sent: 1, nof_dropped: 1 });
        assert!(sent.lock().unwrap()[0].starts_with(b"mac-nr"));
    }

    #[test]
    fn test_send_failure_is_not_retried() {
        let transport = RecordingTransport { fail: true, ..Default::default() };
        let mut pcap = MacPcapNet::new();
        pcap.start(transport, 0).unwrap();
        pcap.write_dl_ranti(ByteBuffer::from_payload(64, &[0; 7]), 2, TtiPoint::new(1));
        assert_eq!(pcap.close().unwrap(), PcapWriterStats { nof_sent: 0, nof_dropped: 1 });
    }

    #[test]
    fn test_open_close_state() {
        let mut pcap = MacPcapNet::new();
        assert!(matches!(pcap.close(), Err(PcapError::NotOpen)));
        // Writes to a closed sink are discarded
        pcap.write_dl_sirnti(ByteBuffer::from_payload(64, &[0]), TtiPoint::new(0));

        pcap.start(RecordingTransport::default(), 0).unwrap();
        assert!(matches!(pcap.start(RecordingTransport::default(), 0), Err(PcapError::AlreadyOpen)));
        assert!(pcap.close().is_ok());
        assert!(!pcap.is_open());
    }
}
