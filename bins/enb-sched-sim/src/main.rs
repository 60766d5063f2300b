use clap::Parser;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use enb_config::{EnbConfig, toml_config};
use enb_core::{TtiPoint, debug};
use enb_pcap::MacPcapNet;
use enb_sched::testing::{SchedSimEventGenerator, SchedTester};

mod capture;

/// Load configuration file
fn load_config_from_toml(cfg_path: &str) -> EnbConfig {
    match toml_config::from_file(cfg_path) {
        Ok(c) => (*c.config()).clone(),
        Err(e) => {
            println!("Failed to load configuration from {}: {}", cfg_path, e);
            std::process::exit(1);
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "eNodeB MAC scheduler simulator",
    long_about = "Runs a seeded random UE population against the MAC scheduler and verifies every TTI"
)]
struct Args {
    /// Config file (required)
    #[arg(help = "TOML config with cell, scheduler and [sim] parameters")]
    config: String,

    /// Overrides sim.seed
    #[arg(long)]
    seed: Option<u64>,

    /// Overrides sim.nof_ttis
    #[arg(long)]
    ttis: Option<u32>,

    /// First TTI to schedule
    #[arg(long, default_value_t = 0)]
    start_tti: u32,
}

fn main() {
    eprintln!("eNodeB MAC scheduler simulator {}\n", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut cfg = load_config_from_toml(&args.config);
    if let Some(seed) = args.seed {
        cfg.sim.seed = seed;
    }
    if let Some(ttis) = args.ttis {
        cfg.sim.nof_ttis = ttis;
    }
    let _log_guard = debug::setup_logging_default(cfg.debug_log.clone());

    let mut tester = match SchedTester::new(&cfg) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to create scheduler: {}", e);
            std::process::exit(1);
        }
    };
    let mut generator = SchedSimEventGenerator::new(&cfg.sim, cfg.cells.len());

    let mut pcap = match cfg.pcap.as_ref().map(MacPcapNet::from_config).transpose() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Failed to open MAC PCAP: {}", e);
            std::process::exit(1);
        }
    };
    if pcap.is_some() {
        eprintln!(" -> MAC PCAP export enabled");
    }

    // Set up Ctrl+C handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        tracing::warn!("Failed to set Ctrl+C handler: {}", e);
    }

    tracing::info!("Running {} TTIs with seed {} on {} cell(s)", cfg.sim.nof_ttis, cfg.sim.seed, cfg.cells.len());
    let start = TtiPoint::new(args.start_tti);
    let mut failed = false;
    let mut nof_pdus = 0;
    for i in 0..cfg.sim.nof_ttis {
        if !running.load(Ordering::SeqCst) {
            tracing::info!("Interrupted after {} TTIs", i);
            break;
        }
        let tti_rx = start + i;
        let events = generator.next_tti(tti_rx);
        let result = tester.apply_events(&events).and_then(|_| tester.run_tti(tti_rx));
        match result {
            Ok(result) => {
                if let Some(pcap) = &pcap {
                    nof_pdus += capture::export_result(pcap, &cfg.timing, &result);
                }
            }
            Err(e) => {
                tracing::error!(tti = tti_rx.to_uint(), "{}", e);
                failed = true;
                break;
            }
        }
    }

    if let Some(pcap) = pcap.as_mut() {
        match pcap.close() {
            Ok(stats) => tracing::info!("MAC PCAP: {} PDUs queued, {} sent, {} dropped", nof_pdus, stats.nof_sent, stats.nof_dropped),
            Err(e) => tracing::warn!("MAC PCAP: {}", e),
        }
    }

    let stats = tester.stats();
    tracing::info!(
        "ttis={} ues={}/{} rar={} msg3={} msg4={} dl={}+{}retx ul={}+{}retx phich={}ack/{}nack dl_bytes={} ul_bytes={}",
        stats.nof_ttis,
        stats.nof_ues_added,
        stats.nof_ues_removed,
        stats.nof_rar,
        stats.nof_msg3,
        stats.nof_msg4,
        stats.nof_dl_newtx,
        stats.nof_dl_retx,
        stats.nof_ul_newtx,
        stats.nof_ul_retx,
        stats.nof_phich_ack,
        stats.nof_phich_nack,
        stats.dl_bytes,
        stats.ul_bytes
    );
    if failed {
        std::process::exit(1);
    }
}
