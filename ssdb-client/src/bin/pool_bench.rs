//! # Pool Load Driver
//!
//! Purpose: Hammer one `ConnectionPool` from several threads with a
//! set/get/del cycle and report throughput plus the final pool counters.
//!
//! Usage: `pool_bench [host:port] [threads] [ops_per_thread] [max_conn]`

use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{bail, Context};
use ssdb_client::{ClientError, Commands, ConnectionPool, PoolConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:8888";
const DEFAULT_THREADS: usize = 8;
const DEFAULT_OPS: usize = 10_000;
const DEFAULT_MAX_CONN: usize = 8;

struct BenchConfig {
    host: String,
    port: u16,
    threads: usize,
    ops: usize,
    max_conn: usize,
}

impl BenchConfig {
    fn from_args() -> anyhow::Result<Self> {
        let mut args = env::args().skip(1);
        let addr = args.next().unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let (host, port) = addr
            .rsplit_once(':')
            .with_context(|| format!("address {addr:?} is not host:port"))?;
        let port = port
            .parse()
            .with_context(|| format!("invalid port in {addr:?}"))?;

        Ok(BenchConfig {
            host: host.to_string(),
            port,
            threads: parse_usize(args.next(), DEFAULT_THREADS),
            ops: parse_usize(args.next(), DEFAULT_OPS),
            max_conn: parse_usize(args.next(), DEFAULT_MAX_CONN),
        })
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bench = BenchConfig::from_args()?;
    let mut config = PoolConfig::new(bench.host.clone(), bench.port);
    config.max_conn_count = bench.max_conn;
    config.max_idle_count = bench.max_conn;
    config.initial_conn_count = 1;
    let pool = ConnectionPool::new(config).context("failed to create pool")?;

    let completed = Arc::new(AtomicU64::new(0));
    let retries = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let workers: Vec<_> = (0..bench.threads)
        .map(|worker| {
            let pool = pool.clone();
            let completed = Arc::clone(&completed);
            let retries = Arc::clone(&retries);
            let ops = bench.ops;
            thread::spawn(move || -> Result<(), ClientError> {
                for op in 0..ops {
                    let mut conn = loop {
                        match pool.acquire() {
                            Ok(conn) => break conn,
                            Err(ClientError::PoolExhausted | ClientError::NoIdleConnection) => {
                                retries.fetch_add(1, Ordering::Relaxed);
                                thread::yield_now();
                            }
                            Err(err) => return Err(err),
                        }
                    };
                    let key = format!("bench:{worker}:{op}");
                    conn.set(&key, "value")?;
                    conn.get(&key)?;
                    conn.del(&key)?;
                    completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            })
        })
        .collect();

    let mut failed = 0;
    for worker in workers {
        match worker.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(error = %err, "worker failed");
                failed += 1;
            }
            Err(_) => failed += 1,
        }
    }

    let elapsed = start.elapsed();
    let cycles = completed.load(Ordering::Relaxed);
    let stats = pool.stats();
    info!(
        cycles,
        retries = retries.load(Ordering::Relaxed),
        elapsed_ms = elapsed.as_millis() as u64,
        cycles_per_sec = (cycles as f64 / elapsed.as_secs_f64()) as u64,
        idle = stats.idle,
        used = stats.used,
        total = stats.total,
        "bench finished"
    );
    pool.close();

    if failed > 0 {
        bail!("{failed} worker(s) failed");
    }
    Ok(())
}
