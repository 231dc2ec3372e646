use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::node::gossip::GossipConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct PeerCfg {
    pub addr: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GossipCfg {
    pub interval_ms: u64,
    pub sweep_interval_ms: u64,
    pub suspect_timeout_ms: u64,
    pub rpc_timeout_ms: u64,
}

impl Default for GossipCfg {
    fn default() -> Self {
        let defaults = GossipConfig::default();
        Self {
            interval_ms: defaults.interval.as_millis() as u64,
            sweep_interval_ms: defaults.sweep_interval.as_millis() as u64,
            suspect_timeout_ms: defaults.suspect_timeout.as_millis() as u64,
            rpc_timeout_ms: defaults.rpc_timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub id: Option<String>,
    pub host: String,
    pub port: u16,
    pub advertise_addr: Option<String>,
    pub peers: Vec<PeerCfg>,
    pub data_dir: PathBuf,
    pub fsync: bool,
    pub request_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
    pub gossip: GossipCfg,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: None,
            host: "0.0.0.0".to_string(),
            port: 7000,
            advertise_addr: None,
            peers: Vec::new(),
            data_dir: PathBuf::from("./data"),
            fsync: false,
            request_timeout_ms: 30_000,
            shutdown_grace_ms: 10_000,
            gossip: GossipCfg::default(),
        }
    }
}

impl Config {
    pub fn new(file: &str) -> Result<Self> {
        let raw = fs::read_to_string(file).with_context(|| format!("reading {file}"))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| format!("parsing {file}"))?;
        Ok(cfg)
    }

    pub fn node_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("node-{}", self.port))
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("bad listen host {:?}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// The address peers should dial us on.
    pub fn advertise_addr(&self) -> String {
        self.advertise_addr
            .clone()
            .unwrap_or_else(|| format!("127.0.0.1:{}", self.port))
    }

    pub fn gossip_config(&self) -> GossipConfig {
        GossipConfig {
            interval: Duration::from_millis(self.gossip.interval_ms),
            sweep_interval: Duration::from_millis(self.gossip.sweep_interval_ms),
            suspect_timeout: Duration::from_millis(self.gossip.suspect_timeout_ms),
            rpc_timeout: Duration::from_millis(self.gossip.rpc_timeout_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
