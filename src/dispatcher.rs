//! The dispatcher (C5, spec §4.5): owns the pools, the shared timing tables,
//! and the main thread. Walks the planner's fixed schedule, leasing
//! connections, spawning one short-lived flow thread per leased connection,
//! and pacing the next request according to the Poisson schedule.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::Error;
use crate::pool::{ConnHandle, Pool, ServerEndpoint};
use crate::timing::{Clock, TimingTables};
use crate::wire::FlowHeader;
use crate::planner::Plan;

/// Floor on the per-server pool size maintained even when no request yet
/// demands that many concurrent flows (the original's `TG_PAIR_INIT_CONN`).
const INIT_POOL_CONNECTIONS: usize = 4;

/// One server's pool plus the listener threads spawned on its connections.
/// Listener handles accumulate as the pool grows and are joined once, after
/// every connection has been sent its terminator.
struct ServerPools {
    pool: Arc<Pool>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

pub struct Dispatcher {
    servers: Vec<ServerPools>,
    timing: Arc<TimingTables>,
    clock: Arc<Clock>,
}

impl Dispatcher {
    /// Opens the initial pool for every server and starts a listener thread
    /// on each connection. Fails fast (spec §7 resource-exhaustion errors)
    /// if any server's initial fill can't be opened.
    pub fn new(
        server_endpoints: &[ServerEndpoint],
        max_fanout: u32,
        timing: Arc<TimingTables>,
        clock: Arc<Clock>,
    ) -> Result<Dispatcher, Error> {
        let init_n = (max_fanout as usize).max(INIT_POOL_CONNECTIONS);
        let mut servers = Vec::with_capacity(server_endpoints.len());
        for endpoint in server_endpoints {
            let pool = Arc::new(Pool::new(*endpoint));
            let opened = pool.insert(init_n)?;
            let listeners = spawn_listeners(&pool, opened, &timing, &clock);
            servers.push(ServerPools {
                pool,
                listeners: Mutex::new(listeners),
            });
        }
        Ok(Dispatcher {
            servers,
            timing,
            clock,
        })
    }

    /// Walks the whole plan, dispatching requests and pacing between them,
    /// then sends terminators and joins every listener.
    pub fn run(&self, plan: &Plan, usleep_overhead_us: i64) {
        let mut sleep_debt: i64 = 0;

        for (i, req) in plan.requests.iter().enumerate() {
            let t0 = self.clock.now_us();

            if let Err(e) = self.dispatch_one(i, req) {
                error!("request {i}: {e}, skipping");
            }

            let elapsed = self.clock.now_us() - t0;
            let step = pace_step(sleep_debt, req.sleep_us as i64, usleep_overhead_us, elapsed);
            if let Some(sleep_us) = step.sleep_us {
                std::thread::sleep(Duration::from_micros(sleep_us as u64));
            }
            sleep_debt = step.carried_debt;
        }

        self.shutdown();
    }

    /// Leases (growing pools as needed) across every server this request
    /// fans out to, then dispatches a flow thread per leased connection.
    /// Any failure aborts the whole request: `req_stop_time` stays zero and
    /// the reporter marks it unfinished.
    fn dispatch_one(&self, request_index: usize, req: &crate::planner::RequestPlan) -> Result<(), Error> {
        let flow_size = req.flow_size_bytes();
        let tos = req.tos();
        let rate_mbps = req.rate_mbps;

        let mut leases: Vec<(&ServerPools, Vec<ConnHandle>)> = Vec::new();
        for (server, &k) in self.servers.iter().zip(&req.per_server_flow_count) {
            if k == 0 {
                continue;
            }
            let k = k as usize;
            if server.pool.available_len() < k {
                let needed = k - server.pool.available_len();
                debug!(
                    "{}: growing pool by {needed} connections ({k} needed, {} idle)",
                    server.pool.server.addr,
                    server.pool.available_len()
                );
                let opened = server.pool.insert(needed)?;
                let mut new_listeners = spawn_listeners(&server.pool, opened, &self.timing, &self.clock);
                server.listeners.lock().unwrap().append(&mut new_listeners);
            }
            let handles = server
                .pool
                .lease(k)
                .ok_or_else(|| Error::Resource(format!("{}: lease of {k} connections failed", server.pool.server.addr)))?;
            debug!("{}: leased {k} connections for request {request_index}", server.pool.server.addr);
            leases.push((server, handles));
        }

        let now = self.clock.now_us();
        self.timing.mark_req_start(request_index, now);

        let flow_handles: Vec<JoinHandle<()>> = leases
            .into_iter()
            .flat_map(|(server, handles)| {
                handles.into_iter().map(move |handle| (server, handle))
            })
            .map(|(server, handle)| {
                let pool = server.pool.clone();
                let timing = self.timing.clone();
                let clock = self.clock.clone();
                let flow_id = self.timing.alloc_flow_id(request_index);
                std::thread::spawn(move || {
                    let now = clock.now_us();
                    timing.mark_flow_start(flow_id, now);
                    let header = FlowHeader {
                        flow_id,
                        flow_size,
                        flow_tos: tos,
                        flow_rate: rate_mbps,
                    };
                    if let Err(e) = pool.send_descriptor(handle, &header) {
                        warn!("{}: error writing flow descriptor: {e}", pool.server.addr);
                        pool.retire(handle);
                    }
                })
            })
            .collect();

        for h in flow_handles {
            let _ = h.join();
        }
        Ok(())
    }

    /// Sends a terminator descriptor to every still-connected node across
    /// every server, then joins every listener thread (spec §4.5
    /// "Termination"). Terminators are written directly from this thread,
    /// not via spawned flow threads, mirroring the original's synchronous
    /// `exit_connections` sweep.
    fn shutdown(&self) {
        for server in &self.servers {
            for handle in server.pool.connected_handles() {
                if let Err(e) = server.pool.send_descriptor(handle, &FlowHeader::terminator()) {
                    warn!("{}: error writing terminator: {e}", server.pool.server.addr);
                    server.pool.retire(handle);
                }
            }
        }
        for server in &self.servers {
            let handles = std::mem::take(&mut *server.listeners.lock().unwrap());
            for h in handles {
                let _ = h.join();
            }
        }
        info!("all listeners retired, run complete");
    }

    pub fn pools(&self) -> impl Iterator<Item = &Arc<Pool>> {
        self.servers.iter().map(|s| &s.pool)
    }
}

/// Result of one request's pacing decision: either a concrete sleep to
/// issue, or nothing (the debt carries forward), plus the debt to carry into
/// the next request either way.
struct PaceStep {
    sleep_us: Option<i64>,
    carried_debt: i64,
}

/// Pure sleep-debt arithmetic for spec §4.5 step 5, factored out of `run` so
/// the overload law (spec §8 scenario 5: debt that never clears under a
/// saturated schedule) is testable without real sockets or real sleeps.
///
/// `sleep_debt` carries unspent inter-arrival time from prior requests;
/// `req_sleep_us` is this request's planned interval; `overhead_us` is the
/// measured sleep-primitive overhead; `elapsed_us` is how long this request's
/// dispatch itself took. A sleep is only issued once the accumulated debt
/// exceeds what dispatch and overhead already spent; otherwise the debt is
/// carried forward untouched, which is exactly what keeps happening under
/// overload (`req_sleep_us` too small to ever clear `overhead_us + elapsed_us`).
fn pace_step(sleep_debt: i64, req_sleep_us: i64, overhead_us: i64, elapsed_us: i64) -> PaceStep {
    let debt = sleep_debt + req_sleep_us;
    let spent = overhead_us + elapsed_us;
    if debt > spent {
        PaceStep {
            sleep_us: Some(debt - spent),
            carried_debt: 0,
        }
    } else {
        PaceStep {
            sleep_us: None,
            carried_debt: debt,
        }
    }
}

fn spawn_listeners(
    pool: &Arc<Pool>,
    opened: Vec<(usize, std::net::TcpStream)>,
    timing: &Arc<TimingTables>,
    clock: &Arc<Clock>,
) -> Vec<JoinHandle<()>> {
    opened
        .into_iter()
        .map(|(index, read_half)| {
            let pool = pool.clone();
            let timing = timing.clone();
            let clock = clock.clone();
            let handle = ConnHandle::from_index(index);
            std::thread::spawn(move || crate::listener::run(pool, handle, read_half, timing, clock))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleeps_and_resets_debt_once_it_exceeds_overhead_and_elapsed() {
        let step = pace_step(0, 800, 50, 10);
        assert_eq!(step.sleep_us, Some(740));
        assert_eq!(step.carried_debt, 0);
    }

    #[test]
    fn carries_debt_forward_when_it_does_not_clear_overhead_and_elapsed() {
        let step = pace_step(0, 5, 50, 10);
        assert_eq!(step.sleep_us, None);
        assert_eq!(step.carried_debt, 5);
    }

    #[test]
    fn overload_never_issues_a_sleep_across_many_requests() {
        // period_us == 1 (spec §8 scenario 5): each request's planned interval
        // is far smaller than the fixed overhead, so debt should accumulate
        // forever without a single sleep ever being issued.
        let mut debt = 0i64;
        let mut slept_any = false;
        for _ in 0..10_000 {
            let step = pace_step(debt, 1, 50, 20);
            if step.sleep_us.is_some() {
                slept_any = true;
            }
            debt = step.carried_debt;
        }
        assert!(!slept_any, "overload schedule should never clear the debt");
        assert_eq!(debt, 10_000);
    }

    #[test]
    fn debt_carried_across_requests_eventually_triggers_a_sleep() {
        let step1 = pace_step(0, 40, 50, 10); // debt 40, spent 60: carried
        assert_eq!(step1.sleep_us, None);
        let step2 = pace_step(step1.carried_debt, 40, 50, 10); // debt 80, spent 60: sleeps
        assert_eq!(step2.sleep_us, Some(20));
        assert_eq!(step2.carried_debt, 0);
    }
}
