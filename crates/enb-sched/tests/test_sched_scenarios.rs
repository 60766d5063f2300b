mod common;

use enb_config::UeCfg;
use enb_core::{CONRES_CE_LCID, TtiInterval, TtiPoint, debug};
use enb_sched::MeasGap;
use enb_sched::ra::RAR_WINDOW_OFFSET;
use common::{SchedBench, default_test_config};

#[test]
fn test_rar_inside_window_and_msg3_after_delay() {
    debug::setup_logging_verbose();
    let cfg = default_test_config(1, 25);
    let mut bench = SchedBench::new(&cfg, TtiPoint::new(100));
    bench.add_ue(0x46, UeCfg::default());

    let rar = bench.run_until(10, |r| !r.dl_cc_result[0].rar.is_empty()).expect("no RAR sent");
    let tti_tx_dl = cfg.timing.to_tx_dl(rar.tti_rx);
    let start = TtiPoint::new(100) + RAR_WINDOW_OFFSET;
    let window = TtiInterval::new(start, start + cfg.cells[0].prach_rar_window);
    assert!(window.contains(tti_tx_dl), "RAR at {} outside {:?}", tti_tx_dl, window);
    assert_eq!(window.start().to_uint(), 103);
    assert_eq!(window.stop().to_uint(), 106);

    let grant = rar.dl_cc_result[0].rar[0].msg3_grant[0];
    assert_eq!(grant.data.temp_crnti, 0x46);
    assert_eq!(grant.data.prach_tti, TtiPoint::new(100));

    // Nothing for the UE until the Msg3 TTI
    let msg3_tti = rar.tti_rx + cfg.timing.msg3_delay;
    while bench.tti != msg3_tti {
        let r = bench.step();
        assert!(r.find_pusch(0, 0x46).is_none());
    }
    let r = bench.step();
    let msg3 = r.find_pusch(0, 0x46).expect("no Msg3");
    assert!(!msg3.needs_pdcch);
    assert_eq!(msg3.dci.riv, grant.grant.riv);
    assert_eq!(msg3.current_tx_nb, 0);
}

#[test]
fn test_msg4_carries_conres_once() {
    debug::setup_logging_verbose();
    let cfg = default_test_config(1, 25);
    let mut bench = SchedBench::new(&cfg, TtiPoint::new(0));
    bench.add_ue(0x46, UeCfg::default());
    bench.connect(0x46);
    bench.sched.dl_rlc_buffer_state(0x46, 0, 200, 0).unwrap();
    bench.run(40);

    let with_conres: Vec<_> = bench
        .trace
        .iter()
        .filter_map(|r| r.find_pdsch(0, 0x46))
        .filter(|d| d.pdus[0].iter().any(|p| p.lcid == CONRES_CE_LCID))
        .collect();
    assert_eq!(with_conres.len(), 1);

    // The SRB0 data went out after the Msg4
    let data: u32 = bench
        .trace
        .iter()
        .filter_map(|r| r.find_pdsch(0, 0x46))
        .flat_map(|d| d.pdus[0].iter())
        .filter(|p| p.lcid == 0)
        .map(|p| p.nbytes)
        .sum();
    assert_eq!(data, 200);
}

#[test]
fn test_dl_harq_rv_sequence_until_max_tx() {
    debug::setup_logging_verbose();
    let cfg = default_test_config(1, 25);
    let mut bench = SchedBench::new(&cfg, TtiPoint::new(0));
    let ue_cfg = UeCfg { maxharq_tx: 5, ..Default::default() };
    bench.add_ue(0x46, ue_cfg);
    bench.connect(0x46);

    bench.dl_ack = false;
    bench.sched.dl_rlc_buffer_state(0x46, 0, 50, 0).unwrap();
    let first = bench.run_until(5, |r| r.find_pdsch(0, 0x46).is_some()).expect("no PDSCH");
    let first_tx = first.find_pdsch(0, 0x46).unwrap().clone();
    let pid = first_tx.dci.pid;
    assert_eq!(first_tx.dci.tb[0].rv, 0);

    bench.run(60);
    let txs: Vec<_> = bench
        .trace
        .iter()
        .filter(|r| r.tti_rx >= first.tti_rx)
        .filter_map(|r| r.find_pdsch(0, 0x46).map(|d| (r.tti_rx, d.clone())))
        .collect();
    assert_eq!(txs.len(), 5);
    let rvs: Vec<u32> = txs.iter().map(|(_, d)| d.dci.tb[0].rv).collect();
    assert_eq!(rvs, vec![0, 2, 3, 1, 0]);
    for (i, (tti, d)) in txs.iter().enumerate() {
        assert_eq!(*tti, first.tti_rx + 8 * i as u32);
        assert_eq!(d.dci.pid, pid);
        assert_eq!(d.dci.tb[0].ndi, first_tx.dci.tb[0].ndi);
        assert_eq!(d.tbs[0], first_tx.tbs[0]);
    }

    let ue = bench.sched.ue(0x46).unwrap();
    let h = &ue.carrier(0).unwrap().harq.dl_procs()[pid as usize];
    assert!(!h.harq().is_active());
}

#[test]
fn test_no_grants_in_measurement_gap() {
    debug::setup_logging_verbose();
    let cfg = default_test_config(1, 25);
    let mut bench = SchedBench::new(&cfg, TtiPoint::new(0));
    bench.add_ue(0x46, UeCfg::default());
    bench.connect(0x46);

    let gap_cfg = UeCfg { measgap_period: 40, measgap_offset: 7, ..Default::default() };
    bench.reconf_ue(0x46, gap_cfg.clone());
    let gap = MeasGap::from_ue_cfg(&gap_cfg);

    let start = bench.tti;
    for _ in 0..200 {
        bench.sched.dl_rlc_buffer_state(0x46, 0, 500, 0).unwrap();
        bench.sched.ul_bsr(0x46, 0, 500).unwrap();
        bench.step();
    }

    let mut nof_pdsch = 0;
    let mut nof_pusch = 0;
    for r in bench.trace.iter().filter(|r| r.tti_rx >= start) {
        if r.find_pdsch(0, 0x46).is_some() {
            nof_pdsch += 1;
            assert!(!gap.blocks_dl(&cfg.timing, r.tti_rx), "PDSCH at {}", r.tti_rx);
        }
        if r.find_pusch(0, 0x46).is_some() {
            nof_pusch += 1;
            assert!(!gap.blocks_ul(&cfg.timing, r.tti_rx), "PUSCH at {}", r.tti_rx);
        }
    }
    // Two blocked subframes per direction and gap, five gaps
    assert!(nof_pdsch > 150);
    assert!(nof_pusch > 150);
}

#[test]
fn test_removed_ue_gets_nothing() {
    debug::setup_logging_verbose();
    let cfg = default_test_config(1, 25);
    let mut bench = SchedBench::new(&cfg, TtiPoint::new(0));
    bench.add_ue(0x46, UeCfg::default());
    bench.add_ue(0x47, UeCfg::default());
    bench.connect(0x46);
    bench.sched.dl_rlc_buffer_state(0x47, 0, 100, 0).unwrap();

    bench.rem_ue(0x46);
    for _ in 0..50 {
        let r = bench.step();
        assert!(r.find_pdsch(0, 0x46).is_none());
        assert!(r.find_pusch(0, 0x46).is_none());
        assert!(r.ul_cc_result[0].phich.iter().all(|p| p.rnti != 0x46));
    }
}
