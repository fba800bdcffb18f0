//! The reporter (C6, spec §4.6): after every listener has retired, drains
//! the timing tables into the two completion-time logs and prints the
//! goodput summary, matching the original's `print_statistic`.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use log::info;

use crate::planner::Plan;
use crate::timing::TimingTables;

pub struct RunReport {
    pub duration_us: i64,
    pub goodput_mbps: f64,
    pub reqs_path: PathBuf,
    pub flows_path: PathBuf,
    pub unfinished_requests: usize,
    pub unfinished_flows: usize,
}

/// Writes `<prefix>_reqs.txt` and `<prefix>_flows.txt`, prints one
/// `Unfinished request <i>` / `Unfinished flow <i>` stdout line per
/// zero-stop record, and returns the summary the caller prints last.
pub fn report(plan: &Plan, timing: &TimingTables, start_us: i64, end_us: i64, log_prefix: &str) -> io::Result<RunReport> {
    let reqs_path = PathBuf::from(format!("{log_prefix}_reqs.txt"));
    let flows_path = PathBuf::from(format!("{log_prefix}_flows.txt"));

    let mut unfinished_requests = 0;
    {
        let mut f = File::create(&reqs_path)?;
        for (i, req) in plan.requests.iter().enumerate() {
            let (start, stop) = timing.request_times(i);
            let rct_us = if stop == 0 { 0 } else { stop - start };
            if stop == 0 {
                unfinished_requests += 1;
                println!("Unfinished request {i}");
            }
            writeln!(f, "{} {} {} {} {}", req.size_bytes, rct_us, req.dscp, req.fanout, req.rate_mbps)?;
        }
    }

    let mut unfinished_flows = 0;
    {
        let mut f = File::create(&flows_path)?;
        let mut flow_id = 1u32;
        for req in &plan.requests {
            for _ in 0..req.fanout {
                let (start, stop) = timing.flow_times(flow_id);
                let fct_us = if stop == 0 { 0 } else { stop - start };
                if stop == 0 {
                    unfinished_flows += 1;
                    println!("Unfinished flow {flow_id}");
                }
                writeln!(f, "{} {} {} {}", req.flow_size_bytes(), fct_us, req.dscp, req.rate_mbps)?;
                flow_id += 1;
            }
        }
    }

    let duration_us = (end_us - start_us).max(1);
    let total_bytes: u64 = plan.requests.iter().map(|r| r.size_bytes as u64).sum();
    let goodput_mbps = (total_bytes as f64 * 8.0) / duration_us as f64;

    info!("goodput: {goodput_mbps:.3} Mbps over {duration_us} us");
    println!("Achieved goodput: {goodput_mbps:.3} Mbps");
    println!("Per-request log: {}", reqs_path.display());
    println!("Per-flow log: {}", flows_path.display());

    Ok(RunReport {
        duration_us,
        goodput_mbps,
        reqs_path,
        flows_path,
        unfinished_requests,
        unfinished_flows,
    })
}
