//! The shared timing state touched by the dispatcher's flow threads and the
//! listeners' completion threads (spec §3 "Timing records", §5 "Mutation
//! discipline").
//!
//! Each `flow_id` is unique for the lifetime of the process, so
//! `flow_start_time`/`flow_stop_time` entries are never written by two
//! threads concurrently and need no lock — plain atomics suffice. Sibling
//! flows of one request *do* race on that request's `req_stop_time` entry;
//! the spec calls this race benign (last writer wins, and any winner is
//! within microseconds of the request's true completion), so it's also a
//! plain atomic rather than something lock-protected.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Zero means "unfinished". Real timestamps are offset by one so that a
/// flow/request completing in the same microsecond the clock was created
/// can never collide with that sentinel.
const UNFINISHED: i64 = 0;

pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn start() -> Clock {
        Clock {
            epoch: Instant::now(),
        }
    }

    pub fn now_us(&self) -> i64 {
        self.epoch.elapsed().as_micros() as i64 + 1
    }
}

/// Times `samples` minimum-duration sleeps and returns the mean positive
/// residual between requested and actual duration, in microseconds. The
/// dispatcher's pacing compensates for this before every inter-request
/// sleep (spec §4.5 step 5).
pub fn measure_sleep_overhead_us(samples: u32) -> i64 {
    let mut total = 0i64;
    for _ in 0..samples {
        let requested = Duration::from_micros(1);
        let start = Instant::now();
        std::thread::sleep(requested);
        let actual = start.elapsed();
        let residual = actual.as_micros() as i64 - requested.as_micros() as i64;
        if residual > 0 {
            total += residual;
        }
    }
    total / samples.max(1) as i64
}

pub struct TimingTables {
    req_start: Vec<AtomicI64>,
    req_stop: Vec<AtomicI64>,
    flow_start: Vec<AtomicI64>,
    flow_stop: Vec<AtomicI64>,
    /// flow_req_id[flow_id - 1] = the request index that flow belongs to.
    /// Written once by the dispatcher before the flow is ever dispatched,
    /// read afterward by that flow's listener; the write always precedes
    /// the socket write that makes the flow observable to a peer, so by
    /// the time a listener looks this up the entry has long since settled.
    flow_req_id: Vec<AtomicI64>,
    next_flow_id: AtomicU32,
}

impl TimingTables {
    pub fn new(num_reqs: usize, num_flows: usize) -> TimingTables {
        TimingTables {
            req_start: (0..num_reqs).map(|_| AtomicI64::new(UNFINISHED)).collect(),
            req_stop: (0..num_reqs).map(|_| AtomicI64::new(UNFINISHED)).collect(),
            flow_start: (0..num_flows).map(|_| AtomicI64::new(UNFINISHED)).collect(),
            flow_stop: (0..num_flows).map(|_| AtomicI64::new(UNFINISHED)).collect(),
            flow_req_id: (0..num_flows).map(|_| AtomicI64::new(-1)).collect(),
            next_flow_id: AtomicU32::new(1),
        }
    }

    /// Allocates the next globally-unique flow id (never 0, never reused)
    /// and records which request it belongs to.
    pub fn alloc_flow_id(&self, request_index: usize) -> u32 {
        let flow_id = self.next_flow_id.fetch_add(1, Ordering::SeqCst);
        self.flow_req_id[(flow_id - 1) as usize].store(request_index as i64, Ordering::SeqCst);
        flow_id
    }

    pub fn request_of(&self, flow_id: u32) -> usize {
        self.flow_req_id[(flow_id - 1) as usize].load(Ordering::SeqCst) as usize
    }

    pub fn mark_req_start(&self, request_index: usize, now_us: i64) {
        self.req_start[request_index].store(now_us, Ordering::SeqCst);
    }

    pub fn mark_req_stop(&self, request_index: usize, now_us: i64) {
        self.req_stop[request_index].store(now_us, Ordering::SeqCst);
    }

    pub fn mark_flow_start(&self, flow_id: u32, now_us: i64) {
        self.flow_start[(flow_id - 1) as usize].store(now_us, Ordering::SeqCst);
    }

    pub fn mark_flow_stop(&self, flow_id: u32, now_us: i64) {
        self.flow_stop[(flow_id - 1) as usize].store(now_us, Ordering::SeqCst);
    }

    /// Returns `(start, stop)` in microseconds for request `i`; `stop == 0`
    /// means unfinished.
    pub fn request_times(&self, i: usize) -> (i64, i64) {
        (self.req_start[i].load(Ordering::SeqCst), self.req_stop[i].load(Ordering::SeqCst))
    }

    pub fn flow_times(&self, flow_id: u32) -> (i64, i64) {
        let idx = (flow_id - 1) as usize;
        (self.flow_start[idx].load(Ordering::SeqCst), self.flow_stop[idx].load(Ordering::SeqCst))
    }

    pub fn num_reqs(&self) -> usize {
        self.req_start.len()
    }

    pub fn num_flows(&self) -> usize {
        self.flow_start.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_overhead_is_never_negative() {
        assert!(measure_sleep_overhead_us(3) >= 0);
    }

    #[test]
    fn flow_ids_start_at_one_and_never_repeat() {
        let t = TimingTables::new(2, 5);
        let ids: Vec<u32> = (0..5).map(|_| t.alloc_flow_id(0)).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn unfinished_flows_report_zero_stop() {
        let t = TimingTables::new(1, 1);
        let id = t.alloc_flow_id(0);
        t.mark_flow_start(id, 100);
        let (start, stop) = t.flow_times(id);
        assert_eq!(start, 100);
        assert_eq!(stop, 0);
    }

    #[test]
    fn stop_never_precedes_start_once_set() {
        let t = TimingTables::new(1, 1);
        let id = t.alloc_flow_id(0);
        t.mark_flow_start(id, 50);
        t.mark_flow_stop(id, 75);
        let (start, stop) = t.flow_times(id);
        assert!(stop >= start);
    }
}
