//! # ECM Control Loop Node
//!
//! Loads the node configuration, builds the control loop over the
//! in-process transport, runs its lifecycle phases and enters the cycle
//! loop. An administrative thread answers configuration requests given
//! with `--sdo-requests` (one JSON request per line), services SDO bulk
//! reads, loops the commanded control words back as status words (no
//! field bus attached), and optionally dumps feedback batches as JSON.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use ecm_common::cia402::ControlWord;
use ecm_common::config::{ConfigLoader, LogLevel, NodeConfig};
use ecm_common::messages::SdoRequest;
use ecm_common::consts::DEFAULT_CONFIG_PATH;
use ecm_control_loop::ControlLoop;
use ecm_control_loop::cycle::{CycleRunner, rt_setup};
use ecm_control_loop::dio::DigitalIo;
use ecm_control_loop::drive::Drive;
use ecm_control_loop::params::ParameterTree;
use ecm_control_loop::sdo::{SdoClient, SdoService, SimulatedSdoTransfer, parse_requests};
use ecm_control_loop::transport::{MailboxTransport, TransportHandle};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Admin lane polling period.
const ADMIN_PERIOD: Duration = Duration::from_millis(1);

/// ECM Control Loop - cyclic drive and I/O orchestrator
#[derive(Parser, Debug)]
#[command(name = "ecm_control_loop")]
#[command(version)]
#[command(about = "Cyclic control loop for drives and digital I/O on an EtherCAT master")]
struct Args {
    /// Path to the node configuration TOML.
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Stop after this many cycles (runs until Ctrl-C otherwise).
    #[arg(long)]
    cycles: Option<u64>,

    /// CPU core to pin the cycle thread to (overrides the config).
    #[arg(long)]
    cpu_core: Option<usize>,

    /// SCHED_FIFO priority (overrides the config).
    #[arg(long)]
    rt_priority: Option<i32>,

    /// Configuration requests to answer at startup, one JSON object per line.
    #[arg(long)]
    sdo_requests: Option<PathBuf>,

    /// Enable verbose logging (DEBUG level, overrides the config).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,

    /// Log every drive feedback batch as JSON.
    #[arg(long)]
    dump_feedback: bool,
}

fn main() {
    let args = Args::parse();
    let config = NodeConfig::load(&args.config);
    let log_level = config.as_ref().map(|c| c.shared.log_level).unwrap_or_default();
    setup_tracing(&args, log_level);

    info!("ECM Control Loop v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = match config {
        Ok(config) => run(&args, config),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("ECM Control Loop shutdown complete");
}

fn run(args: &Args, config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let cl_config = &config.control_loop;
    info!(
        "Config OK ({}): cycle_time={}µs, drives={}, ios={}",
        config.shared.service_name, cl_config.cycle_time_us, cl_config.drives, cl_config.ios
    );

    let tree = Arc::new(ParameterTree::new());
    let mut transport = MailboxTransport::new();
    let handle = transport.handle();
    let mut control_loop = ControlLoop::standard(cl_config, tree.clone(), &mut transport)?;

    let service = SdoService::from_fn(cl_config.drives, |_| {
        let (transfer, _probe) = SimulatedSdoTransfer::new();
        SdoClient::new(transfer)
    })
    .with_trigger(control_loop.sdo_read_trigger());

    let requests = match &args.sdo_requests {
        Some(path) => parse_requests(&fs::read_to_string(path)?)?,
        None => Vec::new(),
    };

    control_loop.init_phase1()?;
    control_loop.init_phase2()?;
    info!("{} bindings registered", tree.len());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    // Spawned before RT setup so it keeps the default scheduling policy.
    let admin = {
        let running = running.clone();
        let tree = tree.clone();
        let drives = cl_config.drives;
        let dump = args.dump_feedback;
        thread::Builder::new()
            .name("ecm-admin".into())
            .spawn(move || {
                answer_requests(&service, &requests);
                admin_lane(&running, &service, &tree, &handle, drives, dump);
            })?
    };

    let result = run_cyclic(args, &config, &mut control_loop, &running);
    running.store(false, Ordering::SeqCst);
    if admin.join().is_err() {
        warn!("admin thread panicked");
    }
    result
}

fn run_cyclic(
    args: &Args,
    config: &NodeConfig,
    control_loop: &mut ControlLoop<Drive, DigitalIo>,
    running: &Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cpu_core = args.cpu_core.unwrap_or(config.rt.cpu_core);
    let rt_priority = args.rt_priority.unwrap_or(config.rt.priority);
    rt_setup(cpu_core, rt_priority)?;
    info!("RT setup complete (cpu_core={cpu_core}, priority={rt_priority})");

    control_loop.start()?;
    let result = CycleRunner::new(control_loop, running.clone(), args.cycles).run();

    if let Err(e) = control_loop.stop() {
        warn!("stop reported: {e}");
    }

    let stats = result?;
    info!(
        "{} cycles, {} degraded, {} overruns",
        stats.cycle_count, stats.degraded_cycles, stats.overruns
    );
    Ok(())
}

/// Answer startup configuration requests in order, logging each reply.
fn answer_requests(service: &SdoService<SdoClient<SimulatedSdoTransfer>>, requests: &[SdoRequest]) {
    for request in requests {
        let reply = service.handle(request);
        match serde_json::to_string(&reply) {
            Ok(json) => info!(target: "sdo", "{json}"),
            Err(e) => warn!("reply encoding failed: {e}"),
        }
    }
}

/// Administrative lane: bulk reads, bus loopback and feedback dump.
fn admin_lane(
    running: &AtomicBool,
    service: &SdoService<SdoClient<SimulatedSdoTransfer>>,
    tree: &ParameterTree,
    handle: &TransportHandle,
    drives: usize,
    dump: bool,
) {
    while running.load(Ordering::Relaxed) {
        if let Some(outcome) = service.poll_bulk_read() {
            debug!("bulk read: {} drives, {} failed", outcome.drives, outcome.failed);
        }

        for i in 0..drives {
            let status = tree
                .get::<u16>("root/controlword", i)
                .map(loopback_status_word)
                .and_then(|sw| tree.set("root/statusword", i, sw));
            if let Err(e) = status {
                warn!("loopback drive {i}: {e}");
            }
        }

        if dump {
            if let Some(batch) = handle.take_drive_feedback() {
                match serde_json::to_string(batch.as_slice()) {
                    Ok(json) => info!(target: "feedback", "{json}"),
                    Err(e) => warn!("feedback encoding failed: {e}"),
                }
            }
        }

        thread::sleep(ADMIN_PERIOD);
    }
}

/// Status word a healthy drive settles in for the commanded control word.
fn loopback_status_word(control_word: u16) -> u16 {
    let cw = ControlWord::from_bits_truncate(control_word);
    let ready = ControlWord::ENABLE_VOLTAGE | ControlWord::QUICK_STOP;
    if cw.contains(ready | ControlWord::SWITCH_ON | ControlWord::ENABLE_OPERATION) {
        0x0237
    } else if cw.contains(ready | ControlWord::SWITCH_ON) {
        0x0233
    } else if cw.contains(ready) {
        0x0231
    } else {
        0x0250
    }
}

/// `--verbose` raises the configured level to debug; `RUST_LOG` wins over both.
fn log_directive(verbose: bool, level: LogLevel) -> &'static str {
    if verbose && level != LogLevel::Trace {
        LogLevel::Debug.as_str()
    } else {
        level.as_str()
    }
}

fn setup_tracing(args: &Args, level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directive(args.verbose, level)));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
