//! The line-oriented configuration file reader. Not a JSON/YAML/TOML
//! format, so no format crate applies — this is a small hand-written
//! key/value reader producing a validated `Config`.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::cdf::CdfTable;
use crate::error::Error;
use crate::pool::ServerEndpoint;
use crate::sampling::WeightedDist;

#[derive(Debug, Clone)]
pub struct Config {
    pub servers: Vec<ServerEndpoint>,
    pub load_mbps: f64,
    pub num_reqs: u32,
    pub req_size_cdf: CdfTable,
    pub fanout_dist: WeightedDist,
    pub service_dist: WeightedDist,
    pub rate_dist: WeightedDist,
    /// Mean inter-arrival interval in microseconds, derived from the
    /// average request size and the target load: `avg(size) * 8 / load`.
    pub period_us: f64,
    pub max_fanout: u32,
}

struct Accum {
    servers: Vec<ServerEndpoint>,
    load_mbps: Option<f64>,
    num_reqs: Option<u32>,
    dist_path: Option<PathBuf>,
    fanout_values: Vec<u32>,
    fanout_weights: Vec<u32>,
    service_values: Vec<u32>,
    service_weights: Vec<u32>,
    rate_values: Vec<u32>,
    rate_weights: Vec<u32>,
}

impl Accum {
    fn new() -> Accum {
        Accum {
            servers: Vec::new(),
            load_mbps: None,
            num_reqs: None,
            dist_path: None,
            fanout_values: Vec::new(),
            fanout_weights: Vec::new(),
            service_values: Vec::new(),
            service_weights: Vec::new(),
            rate_values: Vec::new(),
            rate_weights: Vec::new(),
        }
    }
}

pub fn parse_file(path: &Path) -> Result<Config, Error> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read config file {}: {e}", path.display())))?;
    parse(&text, path.parent().unwrap_or_else(|| Path::new(".")))
}

fn parse(text: &str, base_dir: &Path) -> Result<Config, Error> {
    let mut acc = Accum::new();

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let mut words = line.split_whitespace();
        let key = words.next().unwrap();
        let rest: Vec<&str> = words.collect();

        match key {
            "server" => parse_server(&rest, lineno, &mut acc)?,
            "load" => parse_load(&rest, lineno, &mut acc)?,
            "num_reqs" => parse_num_reqs(&rest, lineno, &mut acc)?,
            "req_size_dist" => parse_req_size_dist(&rest, lineno, &mut acc)?,
            "fanout" => parse_weighted_line(
                &rest,
                lineno,
                "fanout",
                &mut acc.fanout_values,
                &mut acc.fanout_weights,
                |v| v >= 1,
                "fanout size must be >= 1",
            )?,
            "service" => parse_weighted_line(
                &rest,
                lineno,
                "service",
                &mut acc.service_values,
                &mut acc.service_weights,
                |v| v < 64,
                "DSCP must be in 0..64",
            )?,
            "rate" => parse_rate_line(&rest, lineno, &mut acc)?,
            other => {
                return Err(Error::Config(format!(
                    "line {}: invalid key in configuration file: {other}",
                    lineno + 1
                )))
            }
        }
    }

    if acc.servers.is_empty() {
        return Err(Error::Config(
            "configuration file should provide at least one server".into(),
        ));
    }
    let load_mbps = acc
        .load_mbps
        .ok_or_else(|| Error::Config("configuration file should provide one network load".into()))?;
    let num_reqs = acc.num_reqs.ok_or_else(|| {
        Error::Config("configuration file should provide one total number of requests".into())
    })?;
    let dist_path = acc.dist_path.ok_or_else(|| {
        Error::Config("configuration file should provide one request size distribution".into())
    })?;

    let dist_path = if dist_path.is_absolute() {
        dist_path
    } else {
        base_dir.join(dist_path)
    };
    let req_size_cdf = CdfTable::load(&dist_path)?;

    let (fanout_dist, max_fanout) = if acc.fanout_values.is_empty() {
        (WeightedDist::single(1), 1)
    } else {
        let max_fanout = *acc.fanout_values.iter().max().unwrap();
        let total = acc.fanout_weights.iter().sum();
        (WeightedDist::new(acc.fanout_values, acc.fanout_weights, total), max_fanout)
    };

    let service_dist = if acc.service_values.is_empty() {
        WeightedDist::single(0)
    } else {
        let total = acc.service_weights.iter().sum();
        WeightedDist::new(acc.service_values, acc.service_weights, total)
    };

    let rate_dist = if acc.rate_values.is_empty() {
        WeightedDist::single(0)
    } else {
        let total = acc.rate_weights.iter().sum();
        WeightedDist::new(acc.rate_values, acc.rate_weights, total)
    };

    if load_mbps <= 0.0 {
        return Err(Error::Config("load is not positive".into()));
    }
    let period_us = req_size_cdf.avg() * 8.0 / load_mbps;
    if period_us <= 0.0 {
        return Err(Error::Config("period_us is not positive".into()));
    }

    Ok(Config {
        servers: acc.servers,
        load_mbps,
        num_reqs,
        req_size_cdf,
        fanout_dist,
        service_dist,
        rate_dist,
        period_us,
        max_fanout,
    })
}

fn parse_server(rest: &[&str], lineno: usize, acc: &mut Accum) -> Result<(), Error> {
    let [ip, port] = rest else {
        return Err(Error::Config(format!("line {}: expected `server <ip> <port>`", lineno + 1)));
    };
    let ip: IpAddr = ip
        .parse()
        .map_err(|_| Error::Config(format!("line {}: invalid server address {ip}", lineno + 1)))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::Config(format!("line {}: invalid server port {port}", lineno + 1)))?;
    acc.servers.push(ServerEndpoint::new(SocketAddr::new(ip, port)));
    Ok(())
}

fn parse_load(rest: &[&str], lineno: usize, acc: &mut Accum) -> Result<(), Error> {
    if acc.load_mbps.is_some() {
        return Err(Error::Config("configuration file should provide one network load".into()));
    }
    let [value] = rest else {
        return Err(Error::Config(format!("line {}: expected `load <value>Mbps`", lineno + 1)));
    };
    let numeric = value.trim_end_matches("Mbps").trim_end_matches("mbps");
    let load: f64 = numeric
        .parse()
        .map_err(|_| Error::Config(format!("line {}: invalid load value {value}", lineno + 1)))?;
    acc.load_mbps = Some(load);
    Ok(())
}

fn parse_num_reqs(rest: &[&str], lineno: usize, acc: &mut Accum) -> Result<(), Error> {
    if acc.num_reqs.is_some() {
        return Err(Error::Config(
            "configuration file should provide one total number of requests".into(),
        ));
    }
    let [value] = rest else {
        return Err(Error::Config(format!("line {}: expected `num_reqs <n>`", lineno + 1)));
    };
    let n: u32 = value
        .parse()
        .map_err(|_| Error::Config(format!("line {}: invalid num_reqs value {value}", lineno + 1)))?;
    acc.num_reqs = Some(n);
    Ok(())
}

fn parse_req_size_dist(rest: &[&str], lineno: usize, acc: &mut Accum) -> Result<(), Error> {
    if acc.dist_path.is_some() {
        return Err(Error::Config(
            "configuration file should provide one request size distribution".into(),
        ));
    }
    let [path] = rest else {
        return Err(Error::Config(format!("line {}: expected `req_size_dist <path>`", lineno + 1)));
    };
    acc.dist_path = Some(PathBuf::from(path));
    Ok(())
}

fn parse_weighted_line(
    rest: &[&str],
    lineno: usize,
    key: &str,
    values: &mut Vec<u32>,
    weights: &mut Vec<u32>,
    value_ok: impl Fn(u32) -> bool,
    value_err: &str,
) -> Result<(), Error> {
    let [value, weight] = rest else {
        return Err(Error::Config(format!("line {}: expected `{key} <value> <weight>`", lineno + 1)));
    };
    let value: i64 = value
        .parse()
        .map_err(|_| Error::Config(format!("line {}: invalid {key} value {value}", lineno + 1)))?;
    let weight: i64 = weight
        .parse()
        .map_err(|_| Error::Config(format!("line {}: invalid {key} weight {weight}", lineno + 1)))?;
    if value < 0 || !value_ok(value as u32) {
        return Err(Error::Config(format!("line {}: illegal {key} value: {value_err}", lineno + 1)));
    }
    if weight < 0 {
        return Err(Error::Config(format!("line {}: illegal {key} probability value", lineno + 1)));
    }
    values.push(value as u32);
    weights.push(weight as u32);
    Ok(())
}

fn parse_rate_line(rest: &[&str], lineno: usize, acc: &mut Accum) -> Result<(), Error> {
    let [value, weight] = rest else {
        return Err(Error::Config(format!("line {}: expected `rate <Mbps> <weight>`", lineno + 1)));
    };
    let numeric = value.trim_end_matches("Mbps").trim_end_matches("mbps");
    let rate: i64 = numeric
        .parse()
        .map_err(|_| Error::Config(format!("line {}: invalid rate value {value}", lineno + 1)))?;
    let weight: i64 = weight
        .parse()
        .map_err(|_| Error::Config(format!("line {}: invalid rate weight {weight}", lineno + 1)))?;
    if rate < 0 {
        return Err(Error::Config(format!("line {}: illegal sending rate value", lineno + 1)));
    }
    if weight < 0 {
        return Err(Error::Config(format!("line {}: illegal sending rate probability value", lineno + 1)));
    }
    acc.rate_values.push(rate as u32);
    acc.rate_weights.push(weight as u32);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};

    // Minimal scratch-dir helper so this module doesn't need a dev-dependency
    // on `tempfile` just for a handful of tests.
    struct TempDir(PathBuf);
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    impl TempDir {
        fn new() -> TempDir {
            let n = COUNTER.fetch_add(1, Ordering::SeqCst);
            let path = std::env::temp_dir().join(format!("incast-gen-test-{}-{n}", std::process::id()));
            std::fs::create_dir_all(&path).unwrap();
            TempDir(path)
        }

        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn write_cdf(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::File::create(&path).unwrap().write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let dir = TempDir::new();
        let dist_path = write_cdf(&dir, "sizes.cdf", "10000 1.0\n");

        let text = format!(
            "server 127.0.0.1 9000\nload 100Mbps\nnum_reqs 10\nreq_size_dist {}\n",
            dist_path.display()
        );
        let config = parse(&text, dir.path()).unwrap();
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.num_reqs, 10);
        assert_eq!(config.max_fanout, 1);
        assert!((config.period_us - 800.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_unknown_key() {
        let err = parse("bogus 1\n", Path::new(".")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_duplicate_load() {
        let dir = TempDir::new();
        let dist_path = write_cdf(&dir, "sizes.cdf", "10000 1.0\n");
        let text = format!(
            "server 127.0.0.1 9000\nload 100Mbps\nload 200Mbps\nnum_reqs 10\nreq_size_dist {}\n",
            dist_path.display()
        );
        let err = parse(&text, dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_out_of_range_dscp() {
        let dir = TempDir::new();
        let dist_path = write_cdf(&dir, "sizes.cdf", "10000 1.0\n");
        let text = format!(
            "server 127.0.0.1 9000\nload 100Mbps\nnum_reqs 10\nreq_size_dist {}\nservice 64 100\n",
            dist_path.display()
        );
        let err = parse(&text, dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn parses_multiple_fanout_lines() {
        let dir = TempDir::new();
        let dist_path = write_cdf(&dir, "sizes.cdf", "10000 1.0\n");
        let text = format!(
            "server 127.0.0.1 9000\nload 100Mbps\nnum_reqs 10\nreq_size_dist {}\nfanout 1 1\nfanout 4 1\n",
            dist_path.display()
        );
        let config = parse(&text, dir.path()).unwrap();
        assert_eq!(config.max_fanout, 4);
    }
}
