use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwap;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{error, info, warn};

use crate::config::{self, UpstreamSettings};

/// Watches the config file and swaps in new upstream settings on change.
/// Cache sizes and TTL limits are fixed for the life of the store.
pub fn spawn(path: PathBuf, upstream: Arc<ArcSwap<UpstreamSettings>>) {
    // 使用阻塞线程持有watcher，避免异步生命周期问题。
    thread::spawn(move || {
        if let Err(err) = run_watcher(path, upstream) {
            error!(target = "watcher", error = %err, "config watcher exited with error");
        }
    });
}

fn run_watcher(path: PathBuf, upstream: Arc<ArcSwap<UpstreamSettings>>) -> notify::Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher: RecommendedWatcher = Watcher::new(tx, Config::default())?;
    watcher.watch(&path, RecursiveMode::NonRecursive)?;

    info!(target = "watcher", path = %path.display(), "config watcher started");

    for res in rx {
        match res {
            Ok(_event) => reload(&path, &upstream),
            Err(err) => {
                warn!(target = "watcher", error = %err, "watcher event error");
            }
        }
    }
    Ok(())
}

fn reload(path: &Path, upstream: &ArcSwap<UpstreamSettings>) {
    // Editors often truncate then write; give the second write a moment.
    let mut retries = 3;
    while retries > 0 {
        match config::load_config(path) {
            Ok(cfg) => {
                info!(
                    target = "watcher",
                    path = %path.display(),
                    upstream = %cfg.upstream.address,
                    "upstream settings reloaded"
                );
                upstream.store(Arc::new(cfg.upstream));
                return;
            }
            Err(err) => {
                retries -= 1;
                if retries == 0 {
                    warn!(
                        target = "watcher",
                        path = %path.display(),
                        error = %err,
                        "config reload failed, keeping old config",
                    );
                } else {
                    std::thread::sleep(std::time::Duration::from_millis(50));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reload_swaps_upstream_and_keeps_old_on_error() {
        let path = std::env::temp_dir().join(format!("nsas-watcher-{}.json", std::process::id()));
        let upstream = ArcSwap::from_pointee(UpstreamSettings::default());

        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"upstream": {{"address": "9.9.9.9:53", "timeout_ms": 500}}}}"#).unwrap();
        drop(file);
        reload(&path, &upstream);
        assert_eq!(upstream.load().address, "9.9.9.9:53");
        assert_eq!(upstream.load().timeout_ms, 500);

        std::fs::write(&path, "{ not json").unwrap();
        reload(&path, &upstream);
        assert_eq!(upstream.load().address, "9.9.9.9:53");

        let _ = std::fs::remove_file(&path);
    }
}
