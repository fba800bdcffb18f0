//! Top-level orchestration: wires the CLI, config loader, planner,
//! dispatcher, and reporter together. `main` just calls [`run`] and turns
//! any error into a process exit code.

use std::sync::Arc;

use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::cli::Cli;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::planner::{self, Plan};
use crate::timing::{self, Clock, TimingTables};
use crate::{config, reporter};

/// Number of sleeps timed to estimate the sleep primitive's overhead (the
/// original's `get_usleep_overhead(10)`).
const OVERHEAD_SAMPLES: u32 = 10;

pub fn run(cli: &Cli) -> Result<(), Error> {
    let config = config::parse_file(&cli.config)?;

    let seed = cli.resolved_seed();
    info!("seed: {seed}");
    let mut rng = StdRng::seed_from_u64(seed);

    let plan = planner::build_plan(&config, &mut rng);
    log_run_stats(&config, &plan);

    let usleep_overhead_us = timing::measure_sleep_overhead_us(OVERHEAD_SAMPLES);
    info!("usleep overhead: {usleep_overhead_us} us");

    let timing = Arc::new(TimingTables::new(plan.requests.len(), plan.flow_total_num));
    let clock = Arc::new(Clock::start());

    let dispatcher = Dispatcher::new(&config.servers, config.max_fanout, timing.clone(), clock.clone())?;

    let start_us = clock.now_us();
    dispatcher.run(&plan, usleep_overhead_us);
    let end_us = clock.now_us();

    reporter::report(&plan, &timing, start_us, end_us, &cli.log_prefix).map_err(Error::Io)?;

    Ok(())
}

fn log_run_stats(config: &config::Config, plan: &Plan) {
    let num_reqs = plan.requests.len();
    if num_reqs == 0 {
        info!("run stats: 0 requests planned");
        return;
    }
    let avg_sleep_us = plan.requests.iter().map(|r| r.sleep_us as f64).sum::<f64>() / num_reqs as f64;
    let avg_size = plan.requests.iter().map(|r| r.size_bytes as f64).sum::<f64>() / num_reqs as f64;
    let avg_fanout = plan.requests.iter().map(|r| r.fanout as f64).sum::<f64>() / num_reqs as f64;
    let avg_dscp = plan.requests.iter().map(|r| r.dscp as f64).sum::<f64>() / num_reqs as f64;
    let avg_rate = plan.requests.iter().map(|r| r.rate_mbps as f64).sum::<f64>() / num_reqs as f64;

    info!(
        "run stats: {num_reqs} requests, {} flows, {} servers, avg interval {avg_sleep_us:.1}us, \
         avg size {avg_size:.1}B, avg fanout {avg_fanout:.2}, avg dscp {avg_dscp:.1}, avg rate {avg_rate:.1}Mbps",
        plan.flow_total_num,
        config.servers.len(),
    );
    for (i, count) in plan.server_flow_count.iter().enumerate() {
        info!("  server {i}: {count} flows");
    }
}
