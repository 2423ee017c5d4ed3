//! # Connection Pool
//!
//! Purpose: Reuse TCP connections across callers to avoid repeated connects,
//! while keeping the number of sockets bounded.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Bookkeeping-Only Locking**: The mutex guards the idle queue, the set
//!    of checked-out ids and the total counter. Liveness probes run after
//!    the lock is released. A connection the sweeper is checking still
//!    counts as idle, so `idle + used == total` holds whenever the lock is
//!    free.
//! 3. **Fail Fast**: When capacity is reached and nothing is idle,
//!    acquisition errors immediately. The only wait is for an in-flight
//!    sweep to hand its connection back.
//! 4. **Amortized Health Checks**: A background sweeper probes only the
//!    oldest idle connection per interval.
//!
//! ## Connection Lifecycle
//! ```text
//!   dial ──> idle ──acquire──> used ──release──> idle
//!              │                 │
//!              └──probe failed───┴──broken / over max_idle / closed──> removed
//! ```

use std::collections::{HashSet, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::commands::Commands;
use crate::config::PoolConfig;
use crate::connection::{ConnectOptions, Connection};
use crate::error::{ClientError, ClientResult};
use crate::protocol::Arg;
use crate::response::Response;

const PROBE_VALUE: &str = "1";

/// Point-in-time view of the pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub used: usize,
    pub total: usize,
}

struct IdleConnection {
    id: u64,
    conn: Connection,
    last_checked: Instant,
}

struct PoolState {
    idle: VecDeque<IdleConnection>,
    used: HashSet<u64>,
    /// Idle connections taken out by the sweeper for a health check.
    checking: usize,
    total: usize,
    next_id: u64,
    closed: bool,
}

impl PoolState {
    fn push_new(&mut self, conn: Connection) {
        let id = self.next_id;
        self.next_id += 1;
        self.total += 1;
        self.idle.push_back(IdleConnection {
            id,
            conn,
            last_checked: Instant::now(),
        });
    }

    fn checkout_front(&mut self) -> Option<IdleConnection> {
        let entry = self.idle.pop_front()?;
        self.used.insert(entry.id);
        Some(entry)
    }

    /// Drops a checked-out connection from the bookkeeping.
    fn forget_used(&mut self, id: u64) {
        if self.used.remove(&id) {
            self.total = self.total.saturating_sub(1);
        }
    }

    fn start_check(&mut self) -> Option<IdleConnection> {
        let entry = self.idle.pop_front()?;
        self.checking += 1;
        Some(entry)
    }

    /// Ends a health check, either requeueing the connection or dropping it.
    fn finish_check(&mut self, keep: Option<IdleConnection>) {
        self.checking -= 1;
        match keep {
            Some(entry) => self.idle.push_back(entry),
            None => self.total = self.total.saturating_sub(1),
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len() + self.checking,
            used: self.used.len(),
            total: self.total,
        }
    }
}

struct PoolInner {
    config: PoolConfig,
    addr: String,
    options: ConnectOptions,
    state: Mutex<PoolState>,
    /// Signalled when a health check hands its connection back.
    checked: Condvar,
    shutdown: Mutex<Option<Sender<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Every critical section leaves the counters consistent, so a
        // poisoned lock still guards valid state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dial(&self) -> ClientResult<Connection> {
        Connection::connect(&self.addr, &self.options)
    }

    /// Dials up to `grow_step` new idle connections without exceeding the
    /// maximum. Runs with the pool lock held.
    fn grow(&self, state: &mut PoolState) -> ClientResult<()> {
        let room = self.config.max_conn_count.saturating_sub(state.total);
        let count = room.min(self.config.grow_step);
        let mut dialed = 0;
        let mut failure = None;
        for _ in 0..count {
            match self.dial() {
                Ok(conn) => {
                    state.push_new(conn);
                    dialed += 1;
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        debug!(dialed, total = state.total, "pool grown");

        match failure {
            Some(err) if state.idle.is_empty() => Err(err),
            Some(err) => {
                warn!(error = %err, "partial pool growth");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn acquire(self: &Arc<Self>) -> ClientResult<PooledConnection> {
        let mut entry = {
            let mut state = self.lock();
            loop {
                if state.closed {
                    return Err(ClientError::PoolClosed);
                }
                if let Some(entry) = state.checkout_front() {
                    break entry;
                }
                if state.total < self.config.max_conn_count {
                    self.grow(&mut state)?;
                    continue;
                }
                if state.checking == 0 {
                    return Err(ClientError::PoolExhausted);
                }
                // An idle connection is out for a health check.
                state = self
                    .checked
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        if self.config.check_on_get {
            if let Err(err) = probe(&mut entry.conn, &self.config.probe_key) {
                warn!(id = entry.id, error = %err, "evicting connection that failed probe");
                self.lock().forget_used(entry.id);
                return Err(ClientError::NoIdleConnection);
            }
        }

        Ok(PooledConnection {
            pool: Arc::clone(self),
            id: entry.id,
            last_checked: entry.last_checked,
            conn: Some(entry.conn),
        })
    }

    fn release(&self, id: u64, conn: Connection, last_checked: Instant) {
        let mut state = self.lock();
        if !state.used.contains(&id) {
            return;
        }
        if state.closed || !conn.is_connected() || state.idle.len() >= self.config.max_idle_count {
            debug!(id, broken = !conn.is_connected(), "discarding released connection");
            state.forget_used(id);
            return;
        }
        state.used.remove(&id);
        state.idle.push_back(IdleConnection {
            id,
            conn,
            last_checked,
        });
    }

    /// Probes the front idle connection and returns when the next sweep is due.
    fn check_idle(&self) -> Instant {
        let interval = self.config.health_check_interval;
        let mut entry = {
            let mut state = self.lock();
            if state.closed {
                return Instant::now() + interval;
            }
            match state.start_check() {
                Some(entry) => entry,
                None => return Instant::now() + interval,
            }
        };

        let result = probe(&mut entry.conn, &self.config.probe_key);

        let mut state = self.lock();
        let next_due = match result {
            Ok(()) if !state.closed => {
                let previous = entry.last_checked;
                entry.last_checked = Instant::now();
                state.finish_check(Some(entry));
                debug!(idle = state.idle.len(), "idle connection passed health check");
                previous + interval
            }
            Ok(()) => {
                state.finish_check(None);
                Instant::now() + interval
            }
            Err(err) => {
                warn!(id = entry.id, error = %err, "evicting idle connection");
                state.finish_check(None);
                // Treat the next entry as already overdue.
                Instant::now()
            }
        };
        drop(state);
        self.checked.notify_all();
        next_due
    }

    fn close(&self) {
        let drained: Vec<IdleConnection> = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained: Vec<IdleConnection> = state.idle.drain(..).collect();
            state.total -= drained.len();
            drained
        };
        self.checked.notify_all();

        drop(self.shutdown.lock().unwrap_or_else(PoisonError::into_inner).take());
        let sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = sweeper {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }

        info!(closed = drained.len(), "connection pool closed");
    }
}

/// Connection pool handle.
///
/// Cloning is cheap and every clone refers to the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates the pool, dials `initial_conn_count` connections and starts
    /// the background sweeper.
    pub fn new(config: PoolConfig) -> ClientResult<Self> {
        config.validate()?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let inner = Arc::new(PoolInner {
            addr: config.addr(),
            options: config.connect_options(),
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(config.max_idle_count),
                used: HashSet::with_capacity(config.max_conn_count),
                checking: 0,
                total: 0,
                next_id: 0,
                closed: false,
            }),
            checked: Condvar::new(),
            shutdown: Mutex::new(Some(shutdown_tx)),
            sweeper: Mutex::new(None),
            config,
        });

        {
            let mut state = inner.lock();
            for _ in 0..inner.config.initial_conn_count {
                let conn = inner.dial()?;
                state.push_new(conn);
            }
        }

        let weak = Arc::downgrade(&inner);
        let interval = inner.config.health_check_interval;
        let handle = thread::Builder::new()
            .name("ssdb-pool-sweeper".to_string())
            .spawn(move || run_sweeper(weak, shutdown_rx, interval))?;
        *inner.sweeper.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(
            addr = %inner.addr,
            initial = inner.config.initial_conn_count,
            max = inner.config.max_conn_count,
            "connection pool created"
        );
        Ok(ConnectionPool { inner })
    }

    /// Acquires a connection, growing the pool if nothing is idle.
    ///
    /// Fails with `PoolExhausted` at capacity and with `NoIdleConnection`
    /// when the selected connection fails its probe; both are retryable.
    /// If the only idle connection is being health-checked, waits for the
    /// check to finish.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        self.inner.acquire()
    }

    /// Runs one health-check step now and returns when the next is due.
    pub fn check_idle(&self) -> Instant {
        self.inner.check_idle()
    }

    /// Stops the sweeper and closes idle connections. Connections still
    /// checked out are closed when released.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats()
    }

    pub fn idle_count(&self) -> usize {
        self.stats().idle
    }

    pub fn used_count(&self) -> usize {
        self.stats().used
    }

    pub fn total_count(&self) -> usize {
        self.stats().total
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

fn run_sweeper(pool: Weak<PoolInner>, shutdown: mpsc::Receiver<()>, interval: Duration) {
    let mut next_due = Instant::now() + interval;
    loop {
        let wait = next_due.saturating_duration_since(Instant::now());
        match shutdown.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            // Explicit close, or the pool was dropped.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        let Some(inner) = pool.upgrade() else {
            break;
        };
        next_due = inner.check_idle();
    }
    debug!("pool sweeper stopped");
}

fn probe(conn: &mut Connection, key: &str) -> ClientResult<()> {
    conn.execute("set", &[Arg::from(key), Arg::from(PROBE_VALUE)])?.ok()
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    id: u64,
    last_checked: Instant,
    conn: Option<Connection>,
}

impl PooledConnection {
    /// Returns the connection to the pool. Same as dropping it.
    pub fn release(self) {}
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection exists")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection exists")
    }
}

impl Commands for PooledConnection {
    fn execute(&mut self, cmd: &str, args: &[Arg<'_>]) -> ClientResult<Response> {
        Connection::execute(self, cmd, args)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(self.id, conn, self.last_checked);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("conn", &self.conn)
            .finish()
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("addr", &self.inner.addr)
            .finish_non_exhaustive()
    }
}
