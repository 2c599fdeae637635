use std::time::Duration;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_LEADER_PORT: u16 = 8000;
const DEFAULT_FOLLOWER_PORT: u16 = 8001;
const DEFAULT_WRITE_QUORUM: usize = 1;
const DEFAULT_MIN_DELAY_SECS: f64 = 0.0;
const DEFAULT_MAX_DELAY_SECS: f64 = 0.1;
const DEFAULT_REPLICATION_WORKERS: usize = 10;
const DEFAULT_REPLICATION_TIMEOUT_SECS: u64 = 5;
const DEFAULT_LEADER_URL: &str = "http://127.0.0.1:8000";

/// Leader node configuration. Built entirely from environment variables
/// (§6) — there is no flag-parsing layer above this.
#[derive(Debug, Clone)]
pub struct LeaderConfig {
    pub host: String,
    pub port: u16,
    pub followers: Vec<String>,
    pub write_quorum: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub replication_workers: usize,
    pub replication_timeout: Duration,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        LeaderConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_LEADER_PORT,
            followers: Vec::new(),
            write_quorum: DEFAULT_WRITE_QUORUM,
            min_delay: Duration::from_secs_f64(DEFAULT_MIN_DELAY_SECS),
            max_delay: Duration::from_secs_f64(DEFAULT_MAX_DELAY_SECS),
            replication_workers: DEFAULT_REPLICATION_WORKERS,
            replication_timeout: Duration::from_secs(DEFAULT_REPLICATION_TIMEOUT_SECS),
        }
    }
}

impl LeaderConfig {
    pub fn from_env() -> Self {
        let mut cfg = LeaderConfig::default();

        if let Ok(v) = std::env::var("HOST") {
            cfg.host = v;
        }
        if let Ok(v) = env_parse("PORT") {
            cfg.port = v;
        }
        if let Ok(followers) = std::env::var("FOLLOWERS") {
            cfg.followers = followers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = env_parse("WRITE_QUORUM") {
            cfg.write_quorum = v;
        }
        if let Ok(v) = env_parse::<f64>("MIN_DELAY") {
            cfg.min_delay = Duration::from_secs_f64(v);
        }
        if let Ok(v) = env_parse::<f64>("MAX_DELAY") {
            cfg.max_delay = Duration::from_secs_f64(v);
        }
        if let Ok(v) = env_parse("REPLICATION_WORKERS") {
            cfg.replication_workers = v;
        }
        if let Ok(v) = env_parse::<u64>("REPLICATION_TIMEOUT") {
            cfg.replication_timeout = Duration::from_secs(v);
        }

        cfg
    }

    pub fn write_quorum_clamped(&self) -> usize {
        self.write_quorum.min(self.followers.len())
    }
}

/// Follower node configuration.
#[derive(Debug, Clone)]
pub struct FollowerConfig {
    pub host: String,
    pub port: u16,
    pub node_id: String,
    pub leader_url: String,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        FollowerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_FOLLOWER_PORT,
            node_id: "follower".to_string(),
            leader_url: DEFAULT_LEADER_URL.to_string(),
        }
    }
}

impl FollowerConfig {
    pub fn from_env() -> Self {
        let mut cfg = FollowerConfig::default();

        if let Ok(v) = std::env::var("HOST") {
            cfg.host = v;
        }
        if let Ok(v) = env_parse("PORT") {
            cfg.port = v;
        }
        if let Ok(v) = std::env::var("NODE_ID") {
            cfg.node_id = v;
        }
        if let Ok(v) = std::env::var("LEADER_URL") {
            cfg.leader_url = v;
        }

        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<T, ()> {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).ok_or(())
}
