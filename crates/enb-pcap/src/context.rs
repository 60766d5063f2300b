//! Per-PDU context headers understood by the Wireshark `mac-lte-framed`
//! and `mac-nr-framed` UDP heuristics

use enb_core::{Rnti, TtiPoint};

/// Start string of an LTE MAC frame
pub const MAC_LTE_START_STRING: &[u8] = b"mac-lte";
/// Start string of an NR MAC frame
pub const MAC_NR_START_STRING: &[u8] = b"mac-nr";

/// Largest packed context, start string included
pub const PCAP_CONTEXT_HEADER_MAX: usize = 32;

// Optional field tags, shared by both context layouts unless noted
const PAYLOAD_TAG: u8 = 0x01;
const RNTI_TAG: u8 = 0x02;
const UEID_TAG: u8 = 0x03;
const LTE_FRAME_SUBFRAME_TAG: u8 = 0x04;
const NR_HARQID_TAG: u8 = 0x06;
const NR_FRAME_SLOT_TAG: u8 = 0x07;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RadioType {
    Fdd = 1,
    Tdd = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PcapDirection {
    Ul = 0,
    Dl = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RntiType {
    NoRnti = 0,
    PRnti = 1,
    RaRnti = 2,
    CRnti = 3,
    SiRnti = 4,
    SpsRnti = 5,
    MRnti = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LteMacContext {
    pub radio_type: RadioType,
    pub direction: PcapDirection,
    pub rnti_type: RntiType,
    pub rnti: Rnti,
    pub ue_id: u16,
    pub sysframe: u16,
    pub subframe: u16,
}

impl LteMacContext {
    pub fn new(direction: PcapDirection, rnti_type: RntiType, rnti: Rnti, ue_id: u16, tti: TtiPoint) -> Self {
        LteMacContext {
            radio_type: RadioType::Fdd,
            direction,
            rnti_type,
            rnti,
            ue_id,
            sysframe: tti.sfn() as u16,
            subframe: tti.sf_idx() as u16,
        }
    }

    /// Fixed fields followed by the tagged ones, ending with the payload tag
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PCAP_CONTEXT_HEADER_MAX);
        out.push(self.radio_type as u8);
        out.push(self.direction as u8);
        out.push(self.rnti_type as u8);

        out.push(RNTI_TAG);
        out.extend_from_slice(&self.rnti.to_be_bytes());
        out.push(UEID_TAG);
        out.extend_from_slice(&self.ue_id.to_be_bytes());
        out.push(LTE_FRAME_SUBFRAME_TAG);
        // 12 bits of SFN, 4 bits of subframe
        let sfn_sf = (self.sysframe << 4) | (self.subframe & 0x0f);
        out.extend_from_slice(&sfn_sf.to_be_bytes());

        out.push(PAYLOAD_TAG);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NrMacContext {
    pub radio_type: RadioType,
    pub direction: PcapDirection,
    pub rnti_type: RntiType,
    pub rnti: Rnti,
    pub ue_id: u16,
    pub harq_id: u8,
    pub system_frame_number: u16,
    pub slot: u16,
}

impl NrMacContext {
    pub fn new(direction: PcapDirection, rnti_type: RntiType, rnti: Rnti, ue_id: u16, harq_id: u8, tti: TtiPoint) -> Self {
        // 15 kHz subcarrier spacing, one slot per subframe
        NrMacContext {
            radio_type: RadioType::Fdd,
            direction,
            rnti_type,
            rnti,
            ue_id,
            harq_id,
            system_frame_number: tti.sfn() as u16,
            slot: tti.sf_idx() as u16,
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PCAP_CONTEXT_HEADER_MAX);
        out.push(self.radio_type as u8);
        out.push(self.direction as u8);
        out.push(self.rnti_type as u8);

        out.push(RNTI_TAG);
        out.extend_from_slice(&self.rnti.to_be_bytes());
        out.push(UEID_TAG);
        out.extend_from_slice(&self.ue_id.to_be_bytes());
        out.push(NR_HARQID_TAG);
        out.push(self.harq_id);
        out.push(NR_FRAME_SLOT_TAG);
        out.extend_from_slice(&self.system_frame_number.to_be_bytes());
        out.extend_from_slice(&self.slot.to_be_bytes());

        out.push(PAYLOAD_TAG);
        out
    }
}

/// Context of a captured PDU, by radio access technology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcapContext {
    Lte(LteMacContext),
    Nr(NrMacContext),
}

impl PcapContext {
    pub fn start_string(&self) -> &'static [u8] {
        match self {
            PcapContext::Lte(_) => MAC_LTE_START_STRING,
            PcapContext::Nr(_) => MAC_NR_START_STRING,
        }
    }

    /// Start string plus packed context, as it goes in front of the PDU
    pub fn header(&self) -> Vec<u8> {
        let mut out = self.start_string().to_vec();
        match self {
            PcapContext::Lte(ctx) => out.extend(ctx.pack()),
            PcapContext::Nr(ctx) => out.extend(ctx.pack()),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lte_context_layout() {
        let tti = TtiPoint::from_sfn_sf(513, 7);
        let ctx = LteMacContext::new(PcapDirection::Dl, RntiType::CRnti, 0x4601, 3, tti);
        let packed = ctx.pack();
        assert_eq!(packed, vec![1, 1, 3, 0x02, 0x46, 0x01, 0x03, 0x00, 0x03, 0x04, 0x20, 0x17, 0x01]);
    }

    #[test]
    fn test_nr_context_layout() {
        let ctx = NrMacContext::new(PcapDirection::Ul, RntiType::CRnti, 0x46, 0, 5, TtiPoint::from_sfn_sf(2, 9));
        assert_eq!(ctx.pack(), vec![1, 0, 3, 0x02, 0x00, 0x46, 0x03, 0x00, 0x00, 0x06, 5, 0x07, 0x00, 0x02, 0x00, 0x09, 0x01]);
    }

    #[test]
    fn test_header_fits_reserved_space() {
        let tti = TtiPoint::new(enb_core::tti_point::TTI_WRAP - 1);
        let lte = PcapContext::Lte(LteMacContext::new(PcapDirection::Dl, RntiType::SiRnti, 0xffff, 0, tti));
        let nr = PcapContext::Nr(NrMacContext::new(PcapDirection::Dl, RntiType::CRnti, 0x46, 0, 7, tti));
        assert!(lte.header().starts_with(b"mac-lte"));
        assert!(nr.header().starts_with(b"mac-nr"));
        assert!(lte.header().len() <= PCAP_CONTEXT_HEADER_MAX);
        assert!(nr.header().len() <= PCAP_CONTEXT_HEADER_MAX);
        assert!(PCAP_CONTEXT_HEADER_MAX <= enb_core::byte_buffer::DEFAULT_HEADROOM);
    }
}
