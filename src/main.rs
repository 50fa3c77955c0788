use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use arc_swap::ArcSwap;
use clap::{Parser, ValueEnum};
use hickory_proto::rr::{DNSClass, Name, RecordType};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use nsas::config::{NsasConfig, load_config};
use nsas::resolver::make_query;
use nsas::upstream::measure_rtt;
use nsas::{AddressRequest, AddressStore, Resolver, UpstreamResolver, watcher};

const DNS_PORT: u16 = 53;

#[derive(Parser, Debug)]
#[command(author, version, about = "Nameserver address store lookup tool", long_about = None)]
struct Args {
    /// 配置文件路径（JSON），不存在时使用默认配置
    #[arg(short = 'c', long = "config", default_value = "config/nsas.json")]
    config: PathBuf,
    /// 启用调试日志
    #[arg(long = "debug", default_value_t = false)]
    debug: bool,
    /// 需要的地址族
    #[arg(long = "family", value_enum, default_value_t = Family::Any)]
    family: Family,
    /// 重复查询间隔（秒），0 表示只查询一次
    #[arg(long = "repeat-secs", default_value_t = 0)]
    repeat_secs: u64,
    /// 要查询的 zone
    #[arg(required = true)]
    zones: Vec<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Family {
    V4,
    V6,
    Any,
}

impl From<Family> for AddressRequest {
    fn from(family: Family) -> Self {
        match family {
            Family::V4 => AddressRequest::V4Only,
            Family::V6 => AddressRequest::V6Only,
            Family::Any => AddressRequest::Any,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let config_exists = args.config.exists();
    let cfg = if config_exists {
        load_config(&args.config).context("load initial config")?
    } else {
        info!(path = %args.config.display(), "config file not found, using defaults");
        NsasConfig::default()
    };

    let zones = args
        .zones
        .iter()
        .map(|z| Name::from_str(z).with_context(|| format!("parse zone name: {z}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let upstream = Arc::new(ArcSwap::from_pointee(cfg.upstream.clone()));
    if config_exists {
        watcher::spawn(args.config.clone(), Arc::clone(&upstream));
    }

    let resolver: Arc<dyn Resolver> = Arc::new(UpstreamResolver::new(upstream));
    let store = AddressStore::new(resolver, &cfg.settings).context("build address store")?;
    let family = AddressRequest::from(args.family);

    info!(
        upstream = %cfg.upstream.address,
        zone_capacity = cfg.settings.zone_capacity,
        nameserver_capacity = cfg.settings.nameserver_capacity,
        "address store ready"
    );

    let timeout = cfg.upstream.timeout();
    loop {
        survey(&store, &zones, family, timeout).await;
        if args.repeat_secs == 0 {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.repeat_secs)) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

/// Looks each zone up, then times one SOA query to the chosen address so the
/// next round picks by measured RTT.
async fn survey(store: &AddressStore, zones: &[Name], family: AddressRequest, timeout: Duration) {
    for zone in zones {
        match store.lookup(zone, DNSClass::IN, family).await {
            Some(found) => {
                let soa = make_query(zone, RecordType::SOA, DNSClass::IN);
                let measured = match measure_rtt(&found, DNS_PORT, &soa, timeout).await {
                    Ok(rtt) => format!("{}ms", rtt.as_millis()),
                    Err(err) => {
                        warn!(
                            zone = %zone,
                            ip = %found.ip(),
                            error = %err,
                            "nameserver unreachable",
                        );
                        "unreachable".to_string()
                    }
                };
                println!(
                    "{zone}\t{}\t{}\tprevious_rtt={}ms\tmeasured={measured}",
                    found.ip(),
                    found.nameserver().name(),
                    found.address().rtt().as_millis()
                );
            }
            None => {
                warn!(zone = %zone, family = ?family, "no usable nameserver address");
                println!("{zone}\tunreachable");
            }
        }
    }
    info!(
        zones = store.zone_count(),
        nameservers = store.nameserver_count(),
        "cache occupancy"
    );
}

fn init_tracing(debug: bool) {
    // 默认仅 warn，debug 时输出更多细节
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_level(debug)
        .with_writer(std::io::stderr);

    let level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
