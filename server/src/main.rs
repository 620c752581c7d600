//! Kestrel server bootstrap.
//!
//! Thin outer layer around the engine: parse the CLI, load configuration,
//! start the cores, and drive a synthetic ingress workload so the data
//! plane can be observed end to end. The real network receive/transmit
//! path replaces the synthetic driver in a deployment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use bytes::Bytes;
use clap::{Arg, Command};

use kestrel_core::dispatch::{EgressSink, SpinWorkload};
use kestrel_core::types::error::AdmitError;
use kestrel_core::{load_config_or_default, Engine, Message, MessageKind};

#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Counts completions by kind instead of transmitting them.
#[derive(Default)]
struct TallySink {
    task_done: AtomicU64,
    task_done_idle: AtomicU64,
    other: AtomicU64,
}

impl EgressSink for TallySink {
    fn send(&self, msg: &Message, _payload: &[u8]) {
        let counter = match msg.kind {
            MessageKind::TaskDone => &self.task_done,
            MessageKind::TaskDoneIdle => &self.task_done_idle,
            _ => &self.other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn synthetic_packet(dst_id: u16, request_id: u32, run_ns: u64) -> Bytes {
    let header = Message {
        kind: MessageKind::NewTask,
        cluster_id: 0,
        src_id: 1000,
        dst_id,
        queue_depth: 0,
        seq_num: 0,
        client_id: 1,
        request_id,
        payload_len: 8,
        run_ns,
        gen_ns: 0,
    };
    let mut pkt = header.encode().to_vec();
    pkt.extend_from_slice(&request_id.to_be_bytes());
    pkt.extend_from_slice(&run_ns.to_be_bytes()[..4]);
    Bytes::from(pkt)
}

fn main() -> anyhow::Result<()> {
    let matches = Command::new("kestrel")
        .version("0.1.0")
        .about("Core-granular preemptive request scheduler")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("requests")
                .short('n')
                .long("requests")
                .value_name("COUNT")
                .default_value("1024")
                .help("Synthetic requests to drive through the engine"),
        )
        .get_matches();

    tracing_subscriber::fmt::init();

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let config = load_config_or_default(config_path);
    let total: u32 = matches
        .get_one::<String>("requests")
        .expect("has default")
        .parse()
        .context("--requests must be a number")?;

    tracing::info!(
        workers = config.scheduler.workers.len(),
        cores = num_cpus::get(),
        preemption_delay_ns = config.scheduler.preemption_delay_ns,
        "starting kestrel engine"
    );

    let sink = Arc::new(TallySink::default());
    let (engine, mut courier) = Engine::start(
        &config,
        Arc::new(SpinWorkload),
        Arc::clone(&sink) as Arc<dyn EgressSink>,
    )?;

    let workers = config.scheduler.workers.len() as u32;
    let started = Instant::now();
    for i in 0..total {
        let dst = (i % workers) as u16;
        // Vary requested runtimes around the preemption delay so some tasks
        // finish clean and some get suspended.
        let run_ns = (i as u64 % 10) * config.scheduler.preemption_delay_ns / 4;
        let pkt = synthetic_packet(dst, i, run_ns);
        loop {
            match courier.offer_packet(pkt.clone()) {
                Ok(_) => break,
                Err(AdmitError::RequestPoolExhausted) => {
                    courier.flush();
                    std::thread::yield_now();
                }
                Err(err) => {
                    tracing::warn!(%err, request = i, "dropping synthetic request");
                    break;
                }
            }
        }
        courier.flush();
        courier.poll_keep_alive();
    }

    // Drain: keep exchanging until everything staged was published and the
    // workers run dry.
    let deadline = Instant::now() + Duration::from_secs(30);
    while (courier.pending() > 0 || !engine.is_idle()) && Instant::now() < deadline {
        courier.flush();
        std::thread::sleep(Duration::from_micros(100));
    }

    let elapsed = started.elapsed();
    let stats = engine.shutdown();
    tracing::info!(
        admitted = stats.admitted,
        completed = stats.completed,
        preemptions = stats.preemptions,
        declined = stats.declined,
        idle_signals = stats.idle_signals,
        max_queue_wait_ns = stats.max_queue_wait_ns,
        elapsed_ms = elapsed.as_millis() as u64,
        "engine drained"
    );
    tracing::info!(
        task_done = sink.task_done.load(Ordering::Relaxed),
        task_done_idle = sink.task_done_idle.load(Ordering::Relaxed),
        "completions by kind"
    );
    Ok(())
}
