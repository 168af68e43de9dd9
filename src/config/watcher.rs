//! Host list hot reload.
//!
//! # Data Flow
//! ```text
//! notify event (modify/create on the config file)
//!     → load_config (parse + validate)
//!     → resolve_hosts
//!     → mpsc → reload task → Pool::set_hosts (only when the host set changed)
//! ```
//!
//! # Design Decisions
//! - A config that fails to load or resolve is logged and the pool keeps its hosts
//! - Only `hosts` is reloaded; timeouts and the selector are fixed at build time
//! - Hosts given outside the file (`with_extra_hosts`) are appended to every
//!   reloaded list so a reload never drops them

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::{load_config, ConfigError};
use crate::net::host::Host;
use crate::pool::Pool;

/// Keeps a pool's host list in sync with a config file.
pub struct ConfigWatcher {
    path: PathBuf,
    extra_hosts: Vec<Host>,
}

/// Running watch. Dropping it stops both the file watcher and the reload task.
pub struct WatchGuard {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl ConfigWatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            extra_hosts: Vec::new(),
        }
    }

    /// Hosts to keep in the pool on top of whatever the file lists.
    pub fn with_extra_hosts(mut self, hosts: Vec<Host>) -> Self {
        self.extra_hosts = hosts;
        self
    }

    /// Start watching and apply every valid change to `pool`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self, pool: Pool) -> Result<WatchGuard, notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Host>>();
        let path = self.path.clone();
        let extra_hosts = self.extra_hosts.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match reload_hosts(&path, &extra_hosts) {
                        Ok(hosts) => {
                            let _ = tx.send(hosts);
                        }
                        Err(e) => {
                            tracing::error!(path = ?path, error = %e, "Config reload failed, keeping current hosts");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        let task = tokio::spawn(async move {
            let mut current: BTreeSet<String> = pool
                .get_connections()
                .iter()
                .chain(pool.dead_connections().iter())
                .map(|c| c.key())
                .collect();
            while let Some(hosts) = rx.recv().await {
                let next = host_keys(&hosts);
                if next == current {
                    tracing::debug!("Config changed but host set did not");
                    continue;
                }
                tracing::info!(hosts = next.len(), "Applying reloaded host list");
                pool.set_hosts(hosts);
                current = next;
            }
        });

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(WatchGuard {
            _watcher: watcher,
            task,
        })
    }
}

fn reload_hosts(path: &Path, extra: &[Host]) -> Result<Vec<Host>, ConfigError> {
    let hosts = load_config(path)?.resolve_hosts()?;
    Ok(merge_hosts(hosts, extra))
}

/// File hosts first, then extras. Duplicates are collapsed later by `set_hosts`.
fn merge_hosts(mut hosts: Vec<Host>, extra: &[Host]) -> Vec<Host> {
    hosts.extend(extra.iter().cloned());
    hosts
}

fn host_keys(hosts: &[Host]) -> BTreeSet<String> {
    hosts.iter().map(Host::key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("node-pool-{}-{}.toml", name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn host_keys_ignore_order_and_duplicates() {
        let a: Host = "localhost:9200".parse().unwrap();
        let b: Host = "http://localhost:9201/".parse().unwrap();
        let left = host_keys(&[a.clone(), b.clone(), a.clone()]);
        let right = host_keys(&[b, a]);
        assert_eq!(left, right);
        assert_eq!(left.len(), 2);
    }

    #[test]
    fn reload_resolves_hosts() {
        let path = write_temp("reload-ok", "hosts = [\"localhost:9200\", { port = 9201 }]\n");
        let hosts = reload_hosts(&path, &[]).unwrap();
        std::fs::remove_file(&path).ok();

        let keys: Vec<String> = hosts.iter().map(Host::key).collect();
        assert_eq!(keys, vec!["http://localhost:9200", "http://localhost:9201"]);
    }

    #[test]
    fn extra_hosts_survive_every_reload() {
        let cli: Host = "localhost:9300".parse().unwrap();
        let path = write_temp("reload-extra", "hosts = [\"localhost:9200\"]\n");
        let first = reload_hosts(&path, std::slice::from_ref(&cli)).unwrap();

        std::fs::write(&path, "hosts = [\"localhost:9201\", \"localhost:9300\"]\n").unwrap();
        let second = reload_hosts(&path, std::slice::from_ref(&cli)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(
            host_keys(&first),
            ["http://localhost:9200", "http://localhost:9300"]
                .into_iter()
                .map(String::from)
                .collect::<BTreeSet<String>>()
        );
        assert!(host_keys(&second).contains(&cli.key()));
        assert_eq!(host_keys(&second).len(), 2);
    }

    #[test]
    fn merge_appends_extras_after_file_hosts() {
        let file: Vec<Host> = vec!["localhost:9200".parse().unwrap()];
        let extra: Vec<Host> = vec!["localhost:9300".parse().unwrap()];

        let keys: Vec<String> = merge_hosts(file, &extra).iter().map(Host::key).collect();
        assert_eq!(keys, vec!["http://localhost:9200", "http://localhost:9300"]);
        assert!(merge_hosts(Vec::new(), &[]).is_empty());
    }

    #[test]
    fn reload_rejects_invalid_config() {
        let path = write_temp("reload-bad", "hosts = [\"ftp://files:21\"]\n");
        let result = reload_hosts(&path, &[]);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
