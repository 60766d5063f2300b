//! Synthetic MAC PDUs for the grants of one scheduling result.
//! Only the subheaders reflect the grant, payload bytes are zero.

use enb_core::byte_buffer::DEFAULT_HEADROOM;
use enb_core::{ByteBuffer, HarqTiming};
use enb_pcap::MacPcapNet;
use enb_sched::{DlSchedData, PduElem, RarGrant, SfSchedResult};

/// LCID of a padding subheader
const PADDING_LCID: u8 = 0x3f;

fn dl_data_pdu(pdus: &[PduElem], tbs: u32) -> ByteBuffer {
    let mut buf = ByteBuffer::new(DEFAULT_HEADROOM);
    for (i, elem) in pdus.iter().enumerate() {
        let more = if i + 1 < pdus.len() { 0x20 } else { 0x00 };
        buf.append(&[more | (elem.lcid as u8 & 0x1f)]);
    }
    buf.append(&vec![0u8; (tbs as usize).saturating_sub(buf.len())]);
    buf
}

fn ul_data_pdu(tbs: u32) -> ByteBuffer {
    let mut buf = ByteBuffer::new(DEFAULT_HEADROOM);
    buf.append(&[PADDING_LCID]);
    buf.append(&vec![0u8; (tbs as usize).saturating_sub(1)]);
    buf
}

/// One E/T/RAPID subheader plus a 6-byte RAR per detected preamble
fn rar_pdu(rar: &RarGrant) -> ByteBuffer {
    let mut buf = ByteBuffer::new(DEFAULT_HEADROOM);
    let n = rar.msg3_grant.len();
    for (i, g) in rar.msg3_grant.iter().enumerate() {
        let more = if i + 1 < n { 0x80 } else { 0x00 };
        buf.append(&[more | 0x40 | (g.data.preamble_idx as u8 & 0x3f)]);
    }
    for g in &rar.msg3_grant {
        let riv = g.grant.riv.to_be_bytes();
        let crnti = g.data.temp_crnti.to_be_bytes();
        buf.append(&[0, riv[2], riv[3], g.grant.mcs as u8, crnti[0], crnti[1]]);
    }
    buf
}

/// Export every PDSCH, PUSCH, RAR and SI transmission of `result`
pub fn export_result(pcap: &MacPcapNet, timing: &HarqTiming, result: &SfSchedResult) -> usize {
    let tti_tx_dl = timing.to_tx_dl(result.tti_rx);
    let tti_tx_ul = timing.to_tx_ul(result.tti_rx);
    let mut nof_pdus = 0;

    for dl in &result.dl_cc_result {
        for bc in &dl.bc {
            pcap.write_dl_sirnti(ByteBuffer::from_payload(DEFAULT_HEADROOM, &vec![0u8; bc.tbs as usize]), tti_tx_dl);
            nof_pdus += 1;
        }
        for rar in &dl.rar {
            pcap.write_dl_ranti(rar_pdu(rar), rar.ra_rnti, tti_tx_dl);
            nof_pdus += 1;
        }
        for DlSchedData { dci, tbs, pdus } in &dl.data {
            pcap.write_dl_crnti(dl_data_pdu(&pdus[0], tbs[0]), dci.rnti, tti_tx_dl);
            nof_pdus += 1;
        }
    }
    for ul in &result.ul_cc_result {
        for pusch in &ul.pusch {
            pcap.write_ul_crnti(ul_data_pdu(pusch.tbs), pusch.dci.rnti, tti_tx_ul);
            nof_pdus += 1;
        }
    }
    nof_pdus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dl_subheaders() {
        let pdus = [PduElem { lcid: 28, nbytes: 6 }, PduElem { lcid: 0, nbytes: 20 }];
        let buf = dl_data_pdu(&pdus, 32);
        assert_eq!(buf.len(), 32);
        assert_eq!(&buf.data()[..2], &[0x3c, 0x00]);
        assert_eq!(buf.headroom(), DEFAULT_HEADROOM);
    }

    #[test]
    fn test_ul_padding() {
        let buf = ul_data_pdu(10);
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.data()[0], PADDING_LCID);
    }
}
