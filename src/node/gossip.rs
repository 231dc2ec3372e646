//! Cluster membership: heartbeat gossip plus a timeout-based failure detector.
//!
//! Every tick the node bumps its own heartbeat and pushes its full view to one
//! random live peer. Receivers keep, per peer, the largest heartbeat they have
//! seen and when they saw it grow. A separate sweep demotes peers that have
//! gone quiet: `alive -> suspect -> dead`. Dead peers stay in the table; what to
//! do about them is the coordinator's call.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use rand::seq::IndexedRandom;
use tokio::select;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::api::grpc;

const GOSSIP_INTERVAL: Duration = Duration::from_secs(1);
const SWEEP_INTERVAL: Duration = Duration::from_secs(2);
const SUSPECT_TIMEOUT: Duration = Duration::from_secs(5);
const GOSSIP_RPC_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct GossipConfig {
    pub interval: Duration,
    pub sweep_interval: Duration,
    pub suspect_timeout: Duration,
    pub rpc_timeout: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            interval: GOSSIP_INTERVAL,
            sweep_interval: SWEEP_INTERVAL,
            suspect_timeout: SUSPECT_TIMEOUT,
            rpc_timeout: GOSSIP_RPC_TIMEOUT,
        }
    }
}

impl GossipConfig {
    pub fn dead_timeout(&self) -> Duration {
        self.suspect_timeout * 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Alive,
    Suspect,
    Dead,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Alive => "alive",
            MemberStatus::Suspect => "suspect",
            MemberStatus::Dead => "dead",
        }
    }

    /// Unknown strings from the wire are read as alive.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "suspect" => MemberStatus::Suspect,
            "dead" => MemberStatus::Dead,
            _ => MemberStatus::Alive,
        }
    }
}

impl Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Member {
    pub id: String,
    pub addr: String,
    pub status: MemberStatus,
    pub heartbeat: u64,
    pub last_seen: Instant,
}

impl Member {
    /// Seed peers are keyed by address until their real id shows up in gossip.
    fn is_provisional(&self) -> bool {
        self.id == self.addr
    }
}

/// Outbound delivery of a gossip message to one peer.
#[tonic::async_trait]
pub trait GossipTransport: Send + Sync + 'static {
    async fn send_gossip(
        &self,
        peer_id: &str,
        addr: &str,
        msg: grpc::GossipMessage,
        deadline: Duration,
    ) -> Result<()>;

    /// Release anything held for a peer id that left the member table.
    async fn forget(&self, _peer_id: &str) {}
}

pub struct GossipProtocol {
    id: String,
    addr: String,
    config: GossipConfig,
    members: RwLock<HashMap<String, Member>>,
    transport: Arc<dyn GossipTransport>,
    stop: watch::Sender<bool>,
}

impl GossipProtocol {
    pub fn new(
        id: String,
        addr: String,
        seeds: Vec<String>,
        config: GossipConfig,
        transport: Arc<dyn GossipTransport>,
    ) -> Self {
        let now = Instant::now();
        let mut members = HashMap::new();
        for seed in seeds {
            if seed == addr || seed == id {
                continue;
            }
            members.insert(
                seed.clone(),
                Member {
                    id: seed.clone(),
                    addr: seed,
                    status: MemberStatus::Alive,
                    heartbeat: 0,
                    last_seen: now,
                },
            );
        }
        members.insert(
            id.clone(),
            Member {
                id: id.clone(),
                addr: addr.clone(),
                status: MemberStatus::Alive,
                heartbeat: 0,
                last_seen: now,
            },
        );
        let (stop, _) = watch::channel(false);

        Self {
            id,
            addr,
            config,
            members: RwLock::new(members),
            transport,
            stop,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Start the gossip and failure-detector loops.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!(
            node_id = self.id,
            addr = self.addr,
            interval_ms = self.config.interval.as_millis() as u64,
            suspect_ms = self.config.suspect_timeout.as_millis() as u64,
            "starting gossip"
        );
        let gossip = {
            let this = self.clone();
            tokio::spawn(async move { this.gossip_loop().await })
        };
        let sweep = {
            let this = self.clone();
            tokio::spawn(async move { this.sweep_loop().await })
        };
        vec![gossip, sweep]
    }

    /// Halt both loops. A round already waiting on its RPC finishes on its own.
    pub fn stop(&self) {
        if !self.stop.send_replace(true) {
            info!(node_id = self.id, "stopping gossip");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    async fn gossip_loop(&self) {
        let mut stop = self.stop.subscribe();
        let mut ticker = time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if *stop.borrow() {
                break;
            }
            select! {
                _ = ticker.tick() => {
                    self.gossip_round().await;
                }
                _ = stop.changed() => {}
            }
        }
        debug!(node_id = self.id, "gossip loop exited");
    }

    async fn sweep_loop(&self) {
        let mut stop = self.stop.subscribe();
        let mut ticker = time::interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if *stop.borrow() {
                break;
            }
            select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = stop.changed() => {}
            }
        }
        debug!(node_id = self.id, "failure detector exited");
    }

    /// One gossip tick: advance our heartbeat and push the full view to a
    /// random live peer. Returns the chosen peer, if any.
    pub async fn gossip_round(&self) -> Option<String> {
        let (peer_id, addr, msg) = {
            let mut members = self.members.write().await;
            let now = Instant::now();
            if let Some(me) = members.get_mut(&self.id) {
                me.heartbeat += 1;
                me.last_seen = now;
                me.status = MemberStatus::Alive;
            }

            let candidates: Vec<&Member> = members
                .values()
                .filter(|m| m.id != self.id && m.status == MemberStatus::Alive)
                .collect();
            let (peer_id, addr) = candidates
                .choose(&mut rand::rng())
                .map(|m| (m.id.clone(), m.addr.clone()))?;
            (peer_id, addr, self.message(&members, now))
        };

        let deadline = self.config.rpc_timeout;
        match time::timeout(
            deadline,
            self.transport.send_gossip(&peer_id, &addr, msg, deadline),
        )
        .await
        {
            Ok(Ok(())) => debug!(peer_id, addr, "gossip delivered"),
            Ok(Err(err)) => warn!(peer_id, addr, error = format!("{err:#}"), "sending gossip"),
            Err(_) => warn!(
                peer_id,
                addr,
                deadline_ms = deadline.as_millis() as u64,
                "gossip timed out"
            ),
        }
        Some(peer_id)
    }

    /// Fold a received view into ours. Only a strictly larger heartbeat
    /// changes a known entry.
    pub async fn merge(&self, msg: grpc::GossipMessage) {
        let now = Instant::now();
        let mut members = self.members.write().await;
        let mut resolved = Vec::new();
        debug!(
            sender = msg.sender_id,
            sender_addr = msg.sender_addr,
            entries = msg.members.len(),
            "merging gossip"
        );

        for (id, state) in msg.members {
            // nobody else advances our heartbeat, and a peer's provisional
            // entry for our address is us
            if id == self.id || state.addr == self.addr {
                continue;
            }
            if id == state.addr && members.values().any(|m| m.addr == id && m.id != id) {
                continue;
            }
            if id != state.addr
                && members
                    .get(&state.addr)
                    .is_some_and(|m| m.is_provisional())
            {
                members.remove(&state.addr);
                info!(peer_id = id, addr = state.addr, "resolved seed peer id");
                resolved.push(state.addr.clone());
            }

            let status = MemberStatus::from_wire(&state.status);
            match members.get_mut(&id) {
                None => {
                    info!(peer_id = id, addr = state.addr, %status, heartbeat = state.heartbeat, "discovered peer");
                    members.insert(
                        id.clone(),
                        Member {
                            id,
                            addr: state.addr,
                            status,
                            heartbeat: state.heartbeat,
                            last_seen: now,
                        },
                    );
                }
                Some(member) if state.heartbeat > member.heartbeat => {
                    if member.status != status {
                        info!(peer_id = id, from = %member.status, to = %status, "peer status changed by gossip");
                    }
                    if member.addr != state.addr {
                        info!(peer_id = id, old = member.addr, new = state.addr, "peer address changed");
                        member.addr = state.addr;
                    }
                    member.heartbeat = state.heartbeat;
                    member.last_seen = now;
                    member.status = status;
                }
                Some(_) => {}
            }
        }
        drop(members);

        for peer_id in resolved {
            self.transport.forget(&peer_id).await;
        }
    }

    pub async fn sweep(&self) {
        self.sweep_at(Instant::now()).await
    }

    /// Reclassify peers by how long ago they were last seen, as of `now`.
    pub async fn sweep_at(&self, now: Instant) {
        let suspect_after = self.config.suspect_timeout;
        let dead_after = self.config.dead_timeout();
        let mut members = self.members.write().await;

        for member in members.values_mut() {
            if member.id == self.id {
                continue;
            }
            let silent = now.saturating_duration_since(member.last_seen);
            if member.status == MemberStatus::Alive && silent > suspect_after {
                warn!(peer_id = member.id, silent_ms = silent.as_millis() as u64, "peer suspected");
                member.status = MemberStatus::Suspect;
            }
            if member.status == MemberStatus::Suspect && silent > dead_after {
                warn!(peer_id = member.id, silent_ms = silent.as_millis() as u64, "peer declared dead");
                member.status = MemberStatus::Dead;
            }
        }
    }

    pub async fn member(&self, id: &str) -> Option<Member> {
        self.members.read().await.get(id).cloned()
    }

    pub async fn members(&self) -> Vec<Member> {
        self.members.read().await.values().cloned().collect()
    }

    /// The peer table in wire form, `last_seen` in our own clock.
    pub async fn snapshot(&self) -> HashMap<String, grpc::MemberState> {
        let members = self.members.read().await;
        wire_members(&members, Instant::now())
    }

    fn message(&self, members: &HashMap<String, Member>, now: Instant) -> grpc::GossipMessage {
        grpc::GossipMessage {
            sender_id: self.id.clone(),
            sender_addr: self.addr.clone(),
            timestamp: unix_secs(),
            members: wire_members(members, now),
        }
    }
}

fn wire_members(
    members: &HashMap<String, Member>,
    now: Instant,
) -> HashMap<String, grpc::MemberState> {
    let unix_now = unix_secs();
    members
        .iter()
        .map(|(id, m)| {
            let age = now.saturating_duration_since(m.last_seen).as_secs() as i64;
            (
                id.clone(),
                grpc::MemberState {
                    addr: m.addr.clone(),
                    status: m.status.as_str().to_string(),
                    last_seen: unix_now - age,
                    heartbeat: m.heartbeat,
                },
            )
        })
        .collect()
}

fn unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, grpc::GossipMessage)>>,
        fail: bool,
    }

    #[tonic::async_trait]
    impl GossipTransport for RecordingTransport {
        async fn send_gossip(
            &self,
            peer_id: &str,
            _addr: &str,
            msg: grpc::GossipMessage,
            _deadline: Duration,
        ) -> Result<()> {
            self.sent.lock().unwrap().push((peer_id.to_string(), msg));
            if self.fail {
                bail!("connection refused");
            }
            Ok(())
        }
    }

    struct HangingTransport;

    #[tonic::async_trait]
    impl GossipTransport for HangingTransport {
        async fn send_gossip(
            &self,
            _peer_id: &str,
            _addr: &str,
            _msg: grpc::GossipMessage,
            _deadline: Duration,
        ) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    /// Delivers gossip straight into other in-process nodes, keyed by address.
    #[derive(Default)]
    struct LocalNet {
        nodes: Mutex<HashMap<String, Arc<GossipProtocol>>>,
    }

    #[tonic::async_trait]
    impl GossipTransport for LocalNet {
        async fn send_gossip(
            &self,
            _peer_id: &str,
            addr: &str,
            msg: grpc::GossipMessage,
            _deadline: Duration,
        ) -> Result<()> {
            let node = self.nodes.lock().unwrap().get(addr).cloned();
            match node {
                Some(node) => {
                    node.merge(msg).await;
                    Ok(())
                }
                None => bail!("no node at {addr}"),
            }
        }
    }

    fn protocol(transport: Arc<dyn GossipTransport>) -> GossipProtocol {
        GossipProtocol::new(
            "self".to_string(),
            "127.0.0.1:7000".to_string(),
            Vec::new(),
            GossipConfig::default(),
            transport,
        )
    }

    fn gossip_from(sender: &str, entries: &[(&str, &str, &str, u64)]) -> grpc::GossipMessage {
        grpc::GossipMessage {
            sender_id: sender.to_string(),
            sender_addr: format!("{sender}:1"),
            timestamp: 0,
            members: entries
                .iter()
                .map(|(id, addr, status, heartbeat)| {
                    (
                        id.to_string(),
                        grpc::MemberState {
                            addr: addr.to_string(),
                            status: status.to_string(),
                            last_seen: 0,
                            heartbeat: *heartbeat,
                        },
                    )
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_new_has_only_self_and_seeds() {
        let g = GossipProtocol::new(
            "n1".to_string(),
            "10.0.0.1:7000".to_string(),
            vec!["10.0.0.2:7000".to_string(), "10.0.0.1:7000".to_string()],
            GossipConfig::default(),
            Arc::new(RecordingTransport::default()),
        );
        let members = g.members().await;
        assert_eq!(members.len(), 2);
        let seed = g.member("10.0.0.2:7000").await.unwrap();
        assert_eq!(seed.addr, "10.0.0.2:7000");
        assert_eq!(seed.status, MemberStatus::Alive);
        assert_eq!(g.member("n1").await.unwrap().status, MemberStatus::Alive);
    }

    #[tokio::test]
    async fn test_merge_raises_heartbeat() {
        let g = protocol(Arc::new(RecordingTransport::default()));
        g.merge(gossip_from("n2", &[("n3", "n3:1", "alive", 10)])).await;
        assert_eq!(g.member("n3").await.unwrap().heartbeat, 10);

        let before = Instant::now();
        g.merge(gossip_from("n2", &[("n3", "n3:1", "alive", 15)])).await;
        let n3 = g.member("n3").await.unwrap();
        assert_eq!(n3.heartbeat, 15);
        assert!(n3.last_seen >= before);

        let seen = n3.last_seen;
        g.merge(gossip_from("n2", &[("n3", "n3:1", "alive", 12)])).await;
        let n3 = g.member("n3").await.unwrap();
        assert_eq!(n3.heartbeat, 15);
        assert_eq!(n3.last_seen, seen);

        // equal heartbeat is not evidence either
        g.merge(gossip_from("n2", &[("n3", "n3:1", "dead", 15)])).await;
        assert_eq!(g.member("n3").await.unwrap().status, MemberStatus::Alive);
    }

    #[tokio::test]
    async fn test_merge_ignores_self() {
        let g = protocol(Arc::new(RecordingTransport::default()));
        g.merge(gossip_from(
            "n2",
            &[("self", "127.0.0.1:7000", "dead", 1000), ("127.0.0.1:7000", "127.0.0.1:7000", "alive", 0)],
        ))
        .await;
        let me = g.member("self").await.unwrap();
        assert_eq!(me.heartbeat, 0);
        assert_eq!(me.status, MemberStatus::Alive);
        assert_eq!(g.members().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_escalation() {
        let g = protocol(Arc::new(RecordingTransport::default()));
        g.merge(gossip_from("p", &[("p", "p:1", "alive", 1)])).await;
        let seen = g.member("p").await.unwrap().last_seen;

        g.sweep_at(seen + Duration::from_secs(4)).await;
        assert_eq!(g.member("p").await.unwrap().status, MemberStatus::Alive);

        g.sweep_at(seen + Duration::from_secs(10)).await;
        assert_eq!(g.member("p").await.unwrap().status, MemberStatus::Suspect);

        g.sweep_at(seen + Duration::from_secs(20)).await;
        assert_eq!(g.member("p").await.unwrap().status, MemberStatus::Dead);

        // never demoted: ourselves
        assert_eq!(g.member("self").await.unwrap().status, MemberStatus::Alive);
    }

    #[tokio::test]
    async fn test_suspect_recovers_on_fresh_heartbeat() {
        let g = protocol(Arc::new(RecordingTransport::default()));
        g.merge(gossip_from("p", &[("p", "p:1", "alive", 1)])).await;
        let seen = g.member("p").await.unwrap().last_seen;
        g.sweep_at(seen + Duration::from_secs(6)).await;
        assert_eq!(g.member("p").await.unwrap().status, MemberStatus::Suspect);

        g.merge(gossip_from("p", &[("p", "p:1", "alive", 2)])).await;
        assert_eq!(g.member("p").await.unwrap().status, MemberStatus::Alive);
        g.sweep().await;
        assert_eq!(g.member("p").await.unwrap().status, MemberStatus::Alive);
    }

    #[tokio::test]
    async fn test_gossip_round_sends_full_view() {
        let transport = Arc::new(RecordingTransport::default());
        let g = protocol(transport.clone());
        g.merge(gossip_from("n2", &[("n2", "n2:1", "alive", 3), ("n3", "n3:1", "dead", 9)]))
            .await;

        // n3 is dead so n2 is the only candidate
        assert_eq!(g.gossip_round().await.as_deref(), Some("n2"));
        assert_eq!(g.gossip_round().await.as_deref(), Some("n2"));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let (peer, msg) = &sent[1];
        assert_eq!(peer, "n2");
        assert_eq!(msg.sender_id, "self");
        assert_eq!(msg.sender_addr, "127.0.0.1:7000");
        assert_eq!(msg.members.len(), 3);
        assert_eq!(msg.members["self"].heartbeat, 2);
        assert_eq!(msg.members["n3"].status, "dead");
    }

    #[tokio::test]
    async fn test_gossip_round_without_peers() {
        let transport = Arc::new(RecordingTransport::default());
        let g = protocol(transport.clone());
        assert_eq!(g.gossip_round().await, None);
        assert_eq!(g.gossip_round().await, None);
        assert!(transport.sent.lock().unwrap().is_empty());
        // the heartbeat still advances
        assert_eq!(g.member("self").await.unwrap().heartbeat, 2);
    }

    #[tokio::test]
    async fn test_delivery_failure_leaves_state() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let g = protocol(transport.clone());
        g.merge(gossip_from("n2", &[("n2", "n2:1", "alive", 3)])).await;

        assert_eq!(g.gossip_round().await.as_deref(), Some("n2"));
        let n2 = g.member("n2").await.unwrap();
        assert_eq!(n2.status, MemberStatus::Alive);
        assert_eq!(n2.heartbeat, 3);
    }

    #[tokio::test]
    async fn test_gossip_round_honours_deadline() {
        let g = GossipProtocol::new(
            "self".to_string(),
            "127.0.0.1:7000".to_string(),
            vec!["127.0.0.1:7001".to_string()],
            GossipConfig {
                rpc_timeout: Duration::from_millis(50),
                ..Default::default()
            },
            Arc::new(HangingTransport),
        );
        let round = time::timeout(Duration::from_secs(2), g.gossip_round()).await;
        assert_eq!(round.unwrap().as_deref(), Some("127.0.0.1:7001"));
    }

    #[tokio::test]
    async fn test_provisional_seed_replaced_by_real_id() {
        let g = GossipProtocol::new(
            "a".to_string(),
            "h:1".to_string(),
            vec!["h:2".to_string()],
            GossipConfig::default(),
            Arc::new(RecordingTransport::default()),
        );
        g.merge(gossip_from("b", &[("b", "h:2", "alive", 4)])).await;
        assert!(g.member("h:2").await.is_none());
        assert_eq!(g.member("b").await.unwrap().addr, "h:2");

        // someone else's stale provisional entry does not come back
        g.merge(gossip_from("c", &[("h:2", "h:2", "alive", 9)])).await;
        assert!(g.member("h:2").await.is_none());
        assert_eq!(g.members().await.len(), 2);
    }

    #[tokio::test]
    async fn test_address_change_is_tracked() {
        let g = protocol(Arc::new(RecordingTransport::default()));
        g.merge(gossip_from("n2", &[("n2", "old:1", "alive", 1)])).await;
        g.merge(gossip_from("n2", &[("n2", "new:1", "alive", 2)])).await;
        assert_eq!(g.member("n2").await.unwrap().addr, "new:1");
    }

    #[tokio::test]
    async fn test_snapshot_reports_unix_seconds() {
        let g = protocol(Arc::new(RecordingTransport::default()));
        let snap = g.snapshot().await;
        let me = &snap["self"];
        assert_eq!(me.status, "alive");
        assert_eq!(me.addr, "127.0.0.1:7000");
        assert!((unix_secs() - me.last_seen).abs() <= 1);
    }

    #[tokio::test]
    async fn test_cluster_converges_in_process() {
        let net = Arc::new(LocalNet::default());
        let addrs = ["mem:1", "mem:2", "mem:3"];
        let seeds = [vec!["mem:2".to_string()], vec!["mem:3".to_string()], vec![]];
        let nodes: Vec<Arc<GossipProtocol>> = addrs
            .iter()
            .zip(seeds)
            .enumerate()
            .map(|(i, (addr, seeds))| {
                Arc::new(GossipProtocol::new(
                    format!("n{}", i + 1),
                    addr.to_string(),
                    seeds,
                    GossipConfig::default(),
                    net.clone(),
                ))
            })
            .collect();
        for node in &nodes {
            net.nodes
                .lock()
                .unwrap()
                .insert(node.addr().to_string(), node.clone());
        }

        let mut converged = false;
        for _ in 0..200 {
            for node in &nodes {
                node.gossip_round().await;
            }
            let mut all = true;
            for node in &nodes {
                let mut ids: Vec<String> =
                    node.members().await.into_iter().map(|m| m.id).collect();
                ids.sort();
                all &= ids == ["n1", "n2", "n3"];
            }
            if all {
                converged = true;
                break;
            }
        }
        assert!(converged);
    }

    #[tokio::test]
    async fn test_stop_halts_loops() {
        let g = Arc::new(GossipProtocol::new(
            "self".to_string(),
            "127.0.0.1:7000".to_string(),
            Vec::new(),
            GossipConfig {
                interval: Duration::from_millis(10),
                sweep_interval: Duration::from_millis(10),
                ..Default::default()
            },
            Arc::new(RecordingTransport::default()),
        ));
        let handles = g.spawn();
        time::sleep(Duration::from_millis(50)).await;
        assert!(g.member("self").await.unwrap().heartbeat > 0);

        g.stop();
        assert!(g.is_stopped());
        for handle in handles {
            time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
        let hb = g.member("self").await.unwrap().heartbeat;
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(g.member("self").await.unwrap().heartbeat, hb);
    }
}
