//! Configuration file watcher for hot reload.
//!
//! Editors tend to emit several modify events per save; a reload is only
//! forwarded when the file content actually changed and passes validation.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::{parse_config, ConfigError};
use crate::config::schema::WalletConfig;

/// Monitors the configuration file and publishes validated updates.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<WalletConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<WalletConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for updates to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let last_seen = Mutex::new(std::fs::read_to_string(&path).ok());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match reload_if_changed(&path, &last_seen) {
                        Ok(Some(config)) => {
                            tracing::info!(path = ?path, "Configuration reloaded");
                            if tx.send(config).is_err() {
                                tracing::debug!("Config update receiver dropped");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

fn reload_if_changed(
    path: &Path,
    last_seen: &Mutex<Option<String>>,
) -> Result<Option<WalletConfig>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut last = match last_seen.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if last.as_deref() == Some(content.as_str()) {
        return Ok(None);
    }
    let config = parse_config(&content)?;
    *last = Some(content);
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("wallet-watch-{}.toml", uuid::Uuid::new_v4()))
    }

    #[test]
    fn unchanged_content_is_not_reloaded() {
        let path = temp_path();
        std::fs::write(&path, "[scanner]\nmax_blocks_per_scan = 10\n").unwrap();
        let last_seen = Mutex::new(None);

        assert!(reload_if_changed(&path, &last_seen).unwrap().is_some());
        assert!(reload_if_changed(&path, &last_seen).unwrap().is_none());

        std::fs::write(&path, "[scanner]\nmax_blocks_per_scan = 0\n").unwrap();
        assert!(matches!(
            reload_if_changed(&path, &last_seen),
            Err(ConfigError::Validation(_))
        ));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn reload_delivers_validated_config() {
        let path = temp_path();
        std::fs::write(&path, "[scanner]\nmax_blocks_per_scan = 10\n").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&path);
        let _guard = watcher.run().unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&path, "[scanner]\nmax_blocks_per_scan = 42\n").unwrap();

        let updated = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no config update received")
            .expect("watcher channel closed");
        assert_eq!(updated.scanner.max_blocks_per_scan, 42);

        let _ = std::fs::remove_file(&path);
    }
}
