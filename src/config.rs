use std::fs;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use tracing::info;

use crate::error::NsasError;
use crate::fetchable::TtlPolicy;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NsasConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub settings: StoreSettings,
    #[serde(default)]
    pub upstream: UpstreamSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// 最多缓存的 zone 数量。
    #[serde(default = "default_zone_capacity")]
    pub zone_capacity: usize,
    /// 最多缓存的 nameserver 数量。
    #[serde(default = "default_nameserver_capacity")]
    pub nameserver_capacity: usize,
    /// 查询失败后多久重试（秒）。
    #[serde(default = "default_unreachable_ttl_secs")]
    pub unreachable_ttl_secs: u64,
    /// 记录 TTL 上限（秒）。
    #[serde(default = "default_max_ttl_secs")]
    pub max_ttl_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            zone_capacity: default_zone_capacity(),
            nameserver_capacity: default_nameserver_capacity(),
            unreachable_ttl_secs: default_unreachable_ttl_secs(),
            max_ttl_secs: default_max_ttl_secs(),
        }
    }
}

impl StoreSettings {
    pub fn capacities(&self) -> std::result::Result<(NonZeroUsize, NonZeroUsize), NsasError> {
        let zones = NonZeroUsize::new(self.zone_capacity)
            .ok_or_else(|| NsasError::InvalidConfig("zone_capacity must be positive".into()))?;
        let nameservers = NonZeroUsize::new(self.nameserver_capacity)
            .ok_or_else(
                || NsasError::InvalidConfig("nameserver_capacity must be positive".into()),
            )?;
        Ok((zones, nameservers))
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            unreachable_ttl: Duration::from_secs(self.unreachable_ttl_secs),
            max_ttl: Duration::from_secs(self.max_ttl_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSettings {
    /// 递归上游地址。
    #[serde(default = "default_upstream")]
    pub address: String,
    /// 上游超时（毫秒）。
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            address: default_upstream(),
            timeout_ms: default_upstream_timeout_ms(),
        }
    }
}

impl UpstreamSettings {
    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, NsasError> {
        self.address
            .parse()
            .map_err(
                |_| NsasError::InvalidConfig(format!("bad upstream address: {}", self.address)),
            )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

pub fn load_config(path: &Path) -> Result<NsasConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read config file: {}", path.display()))?;
    let cfg = parse_config(&raw).with_context(|| format!("parse config file: {}", path.display()))?;

    if let Some(version) = cfg.version.as_ref() {
        info!(target = "config", version = %version, "config loaded");
    }
    Ok(cfg)
}

/// Parses and validates a JSON config document.
pub fn parse_config(raw: &str) -> Result<NsasConfig> {
    let cfg: NsasConfig = serde_json::from_str(raw)?;
    cfg.settings.capacities()?;
    cfg.upstream.socket_addr()?;
    if cfg.upstream.timeout_ms == 0 {
        anyhow::bail!("upstream timeout_ms must be positive");
    }
    Ok(cfg)
}

fn default_zone_capacity() -> usize {
    1_000
}

fn default_nameserver_capacity() -> usize {
    3_000
}

fn default_unreachable_ttl_secs() -> u64 {
    60
}

fn default_max_ttl_secs() -> u64 {
    86_400
}

fn default_upstream() -> String {
    "1.1.1.1:53".to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    2000
}
