//! SyncLru stress driver - hammers one cache from many threads and checks
//! its invariants while and after the load runs

mod sampler;
mod worker;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use synclru::{CacheConfig, SyncLru};
use tracing::{error, info, warn};

use crate::sampler::{check_settled, Sampler};
use crate::worker::{Worker, WorkerStats, Workload};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cache capacity (number of entries)
    #[arg(short, long, default_value_t = 1024)]
    capacity: usize,

    /// Worker threads
    #[arg(short, long, default_value_t = 8)]
    threads: u64,

    /// Operations per worker
    #[arg(short, long, default_value_t = 100_000)]
    ops: u64,

    /// Size of the key space workers draw from
    #[arg(short, long, default_value_t = 4096, value_parser = clap::value_parser!(u64).range(1..))]
    keys: u64,

    /// Fraction of operations that are gets (0.0 to 1.0)
    #[arg(short, long, default_value_t = 0.8)]
    read_ratio: f64,

    /// Base RNG seed; worker N uses seed + N
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Release locks with hand-off to the longest waiter
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    fair: bool,

    /// Give up on lock acquisition after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if !(0.0..=1.0).contains(&args.read_ratio) {
        bail!("read ratio must be between 0.0 and 1.0, got {}", args.read_ratio);
    }

    info!("Starting syncstress v{}", env!("CARGO_PKG_VERSION"));
    info!("Cache capacity: {}", args.capacity);
    info!("Threads: {}, ops per thread: {}", args.threads, args.ops);
    info!("Key space: {}, read ratio: {}", args.keys, args.read_ratio);
    info!("Fair unlock: {}", args.fair);
    if let Some(ms) = args.timeout_ms {
        info!("Lock timeout: {} ms", ms);
    }

    let config = CacheConfig::new(args.capacity).fair_unlock(args.fair);
    let cache = Arc::new(SyncLru::with_config(config)?);

    let workload = Workload {
        ops: args.ops,
        keys: args.keys,
        read_ratio: args.read_ratio,
        timeout: args.timeout_ms.map(Duration::from_millis),
    };

    let done = Arc::new(AtomicBool::new(false));
    let sampler = {
        let sampler = Sampler::new(Arc::clone(&cache), Arc::clone(&done));
        thread::spawn(move || sampler.run())
    };

    let started = Instant::now();
    let workers: Vec<_> = (0..args.threads)
        .map(|id| {
            let worker = Worker::new(id, Arc::clone(&cache), args.seed, workload);
            (id, thread::spawn(move || worker.run()))
        })
        .collect();

    let mut totals = WorkerStats::default();
    let mut failed = false;
    for (id, handle) in workers {
        match handle.join() {
            Ok(Ok(stats)) => totals.merge(&stats),
            Ok(Err(e)) => {
                error!("Worker {} failed: {}", id, e);
                failed = true;
            }
            Err(_) => {
                error!("Worker {} panicked", id);
                failed = true;
            }
        }
    }
    let elapsed = started.elapsed();

    done.store(true, Ordering::Release);
    let samples = sampler
        .join()
        .map_err(|_| anyhow!("sampler thread panicked"))?;

    let settled = check_settled(&cache);

    info!("Elapsed: {:.3} s", elapsed.as_secs_f64());
    info!(
        "Throughput: {:.0} ops/s",
        totals.total() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    info!(
        "Gets: {} hits, {} misses (hit ratio {:.3})",
        totals.hits,
        totals.misses,
        totals.hit_ratio()
    );
    info!("Puts: {}", totals.puts);
    if totals.timeouts > 0 {
        warn!("Timed out lock acquisitions: {}", totals.timeouts);
    }
    info!("Final size: {} / {}", cache.len(), cache.capacity());
    info!(
        "Sampler: {} samples, {} violations",
        samples.samples, samples.violations
    );

    let mut survivors: BTreeMap<u64, u64> = BTreeMap::new();
    let mut newest_seq = 0;
    for key in cache.keys() {
        if let Some(stamp) = cache.peek(&key) {
            *survivors.entry(stamp.writer).or_default() += 1;
            newest_seq = newest_seq.max(stamp.seq);
        }
    }
    info!(
        "Surviving entries by writer: {:?}, newest seq: {}",
        survivors, newest_seq
    );

    if failed {
        bail!("one or more workers failed");
    }
    if totals.mismatches > 0 {
        bail!("{} gets returned a value stored under another key", totals.mismatches);
    }
    if samples.violations > 0 || settled > 0 {
        bail!(
            "invariant violations: {} while running, {} after settling",
            samples.violations,
            settled
        );
    }

    info!("All invariants held");
    Ok(())
}
