mod common;

use enb_core::tti_point::TTI_WRAP;
use enb_core::{TtiPoint, debug};
use enb_sched::testing::{SchedSimEventGenerator, SchedTester};
use common::default_test_config;

fn run_scenario(cfg: &enb_config::EnbConfig, start: TtiPoint) -> SchedTester {
    let mut tester = SchedTester::new(cfg).unwrap();
    let mut generator = SchedSimEventGenerator::new(&cfg.sim, cfg.cells.len());
    if let Err(e) = tester.run(&mut generator, start, cfg.sim.nof_ttis) {
        panic!("seed {}: {}", cfg.sim.seed, e);
    }
    tester
}

#[test]
fn test_random_single_cell() {
    debug::setup_logging_quiet();
    for seed in [1, 2, 3] {
        let mut cfg = default_test_config(1, 25);
        cfg.sim.seed = seed;
        cfg.sim.nof_ttis = 1500;
        cfg.sim.p_ue_arrival = 0.05;
        let tester = run_scenario(&cfg, TtiPoint::new(0));

        let stats = tester.stats();
        assert_eq!(stats.nof_ttis, 1500);
        assert!(stats.nof_ues_added > 0);
        assert!(stats.nof_msg3 > 0);
        assert!(stats.nof_msg4 > 0);
        assert!(stats.nof_dl_newtx > 0);
        assert!(stats.nof_dl_retx > 0);
        assert!(stats.nof_ul_newtx > 0);
        assert!(stats.nof_phich_ack > 0);
    }
}

#[test]
fn test_random_two_cells_across_wrap() {
    debug::setup_logging_quiet();
    let mut cfg = default_test_config(2, 50);
    cfg.sim.seed = 7;
    cfg.sim.nof_ttis = 1500;
    cfg.sim.p_ue_arrival = 0.05;
    cfg.sim.p_scell = 1.0;
    cfg.sim.p_retx = 0.2;
    let tester = run_scenario(&cfg, TtiPoint::new(TTI_WRAP - 700));
    assert!(tester.stats().nof_ul_retx > 0);

    // Some UE got data on its secondary carrier
    let scell_pdsch = tester.trace().iter().flat_map(|r| r.dl_cc_result.iter()).flat_map(|dl| dl.data.iter()).any(|d| d.dci.ue_cc_idx == 1);
    assert!(scell_pdsch);
}

#[test]
fn test_random_heavy_load() {
    debug::setup_logging_quiet();
    let mut cfg = default_test_config(1, 15);
    cfg.sim.seed = 11;
    cfg.sim.nof_ttis = 1200;
    cfg.sim.max_ues = 16;
    cfg.sim.p_ue_arrival = 0.1;
    cfg.sim.p_dl_data = 0.5;
    cfg.sim.p_ul_data = 0.5;
    cfg.sim.p_measgap = 0.5;
    let tester = run_scenario(&cfg, TtiPoint::new(3000));
    assert!(tester.stats().nof_dl_newtx > 0);
}

#[test]
fn test_same_seed_same_grants() {
    debug::setup_logging_quiet();
    let mut cfg = default_test_config(2, 25);
    cfg.sim.seed = 42;
    cfg.sim.nof_ttis = 800;
    cfg.sim.p_ue_arrival = 0.05;
    let a = run_scenario(&cfg, TtiPoint::new(0));
    let b = run_scenario(&cfg, TtiPoint::new(0));
    assert_eq!(a.stats(), b.stats());
    assert_eq!(a.trace(), b.trace());

    cfg.sim.seed = 43;
    let c = run_scenario(&cfg, TtiPoint::new(0));
    assert_ne!(a.trace(), c.trace());
}
