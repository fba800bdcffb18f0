//! The request planner (C4, spec §4.4). Runs once, before dispatch, and
//! produces a fixed schedule: every request's size/fanout/DSCP/rate/
//! inter-arrival, its flow-to-server assignment, and the resulting flat list
//! of flows. Nothing here touches the network or a clock; it only consumes
//! an `rng`.

use rand::Rng;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub size_bytes: u32,
    pub fanout: u32,
    pub dscp: u32,
    pub rate_mbps: u32,
    pub sleep_us: u32,
    /// Indexed by server index; `per_server_flow_count[s]` flows of this
    /// request go to server `s`. Sums to `fanout`.
    pub per_server_flow_count: Vec<u32>,
}

impl RequestPlan {
    /// `size_bytes / fanout`, integer division, as each flow of this
    /// request carries.
    pub fn flow_size_bytes(&self) -> u32 {
        self.size_bytes / self.fanout
    }

    pub fn tos(&self) -> u32 {
        crate::wire::dscp_to_tos(self.dscp)
    }
}

pub struct Plan {
    pub requests: Vec<RequestPlan>,
    pub flow_total_num: usize,
    /// Total flows sent to each server across the whole run, for the
    /// startup banner (`RunStats`).
    pub server_flow_count: Vec<u64>,
}

pub fn build_plan(config: &Config, rng: &mut impl Rng) -> Plan {
    let num_servers = config.servers.len();
    let mut server_flow_count = vec![0u64; num_servers];
    let mut flow_total_num = 0usize;

    let requests: Vec<RequestPlan> = (0..config.num_reqs)
        .map(|_| {
            let size_bytes = config.req_size_cdf.sample(rng);
            let fanout = config.fanout_dist.sample(rng).max(1);
            let dscp = config.service_dist.sample(rng);
            let rate_mbps = config.rate_dist.sample(rng);
            let sleep_us = crate::sampling::poisson_interval_us(1.0 / config.period_us, rng);

            let mut per_server_flow_count = vec![0u32; num_servers];
            for _ in 0..fanout {
                let server = rng.gen_range(0..num_servers);
                per_server_flow_count[server] += 1;
                server_flow_count[server] += 1;
            }
            flow_total_num += fanout as usize;

            RequestPlan {
                size_bytes,
                fanout,
                dscp,
                rate_mbps,
                sleep_us,
                per_server_flow_count,
            }
        })
        .collect();

    Plan {
        requests,
        flow_total_num,
        server_flow_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdf::CdfTable;
    use crate::pool::ServerEndpoint;
    use crate::sampling::WeightedDist;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn two_server_config() -> Config {
        Config {
            servers: vec![
                ServerEndpoint::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000)),
                ServerEndpoint::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9001)),
            ],
            load_mbps: 100.0,
            num_reqs: 100,
            req_size_cdf: CdfTable::new(vec![(10_000.0, 1.0)]),
            fanout_dist: WeightedDist::new(vec![1, 4], vec![1, 1], 2),
            service_dist: WeightedDist::single(0),
            rate_dist: WeightedDist::single(0),
            period_us: 800.0,
            max_fanout: 4,
        }
    }

    #[test]
    fn per_request_flow_counts_sum_to_fanout() {
        let config = two_server_config();
        let mut rng = StdRng::seed_from_u64(5);
        let plan = build_plan(&config, &mut rng);
        for req in &plan.requests {
            let total: u32 = req.per_server_flow_count.iter().sum();
            assert_eq!(total, req.fanout);
        }
    }

    #[test]
    fn flow_total_matches_sum_of_fanouts() {
        let config = two_server_config();
        let mut rng = StdRng::seed_from_u64(11);
        let plan = build_plan(&config, &mut rng);
        let expected: usize = plan.requests.iter().map(|r| r.fanout as usize).sum();
        assert_eq!(plan.flow_total_num, expected);
    }

    #[test]
    fn server_flow_count_matches_per_request_totals() {
        let config = two_server_config();
        let mut rng = StdRng::seed_from_u64(13);
        let plan = build_plan(&config, &mut rng);
        let mut expected = vec![0u64; config.servers.len()];
        for req in &plan.requests {
            for (s, count) in req.per_server_flow_count.iter().enumerate() {
                expected[s] += *count as u64;
            }
        }
        assert_eq!(plan.server_flow_count, expected);
    }

    #[test]
    fn fanout_distribution_converges_to_configured_weights() {
        let mut config = two_server_config();
        config.num_reqs = 20_000;
        let mut rng = StdRng::seed_from_u64(99);
        let plan = build_plan(&config, &mut rng);
        let ones = plan.requests.iter().filter(|r| r.fanout == 1).count();
        let ratio = ones as f64 / plan.requests.len() as f64;
        assert!((0.45..0.55).contains(&ratio), "ratio was {ratio}");
    }
}
