pub mod apply;
pub mod assignment;
pub mod backend;
pub mod config;
pub mod dbus;
pub mod error;
pub mod format;
pub mod modes;
pub mod monitor;
pub mod resources;
pub mod store;

pub use config::Configuration;
pub use dbus::DisplayServer;
pub use error::{Error, Result};

use log::{debug, error, info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;

use backend::DisplayBackend;
use resources::ScreenResources;
use store::ConfigStore;

/// Where the kernel lists connectors and their hot-plug status.
const DRM_CLASS_DIR: &str = "/sys/class/drm";
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Owns the display server connection and the stored configurations, and
/// keeps track of the hardware snapshot clients are looking at.
pub struct DisplayManager {
    /// Bumped whenever the hardware snapshot changes.
    serial: u32,
    timestamp: u32,
    backend: Box<dyn DisplayBackend>,
    store: ConfigStore,
    screen: Option<ScreenResources>,
}

impl DisplayManager {
    pub fn new(backend: Box<dyn DisplayBackend>, store: ConfigStore) -> DisplayManager {
        DisplayManager {
            serial: 0,
            timestamp: 0,
            backend,
            store,
            screen: None,
        }
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    fn next_timestamp(&mut self) -> u32 {
        self.timestamp = self.timestamp.wrapping_add(1);
        self.timestamp
    }

    /// Re-reads the hardware.
    pub fn refresh(&mut self) -> Result<&ScreenResources> {
        let screen = self.backend.screen_resources()?;
        if self.screen.as_ref() != Some(&screen) {
            self.serial = self.serial.wrapping_add(1);
            debug!("hardware changed, serial is now {}", self.serial);
        }
        Ok(self.screen.insert(screen))
    }

    /// What the hardware shows right now.
    pub fn current_configuration(&mut self) -> Result<Configuration> {
        if self.screen.is_none() {
            self.refresh()?;
        }
        Ok(self
            .screen
            .as_ref()
            .map(Configuration::new_current)
            .unwrap_or_default())
    }

    /// Applies `config` and, when `persistent`, stores it for this set of
    /// monitors.
    pub fn apply_configuration(&mut self, mut config: Configuration, persistent: bool) -> Result<()> {
        config.sanitize();
        let screen = self.backend.screen_resources()?;
        let timestamp = self.next_timestamp();
        let applied = apply::apply(&config, &screen, self.backend.as_mut(), timestamp);
        let refreshed = self.refresh().map(|_| ());
        applied?;
        refreshed?;

        if persistent {
            self.store.save(&config)?;
        }
        Ok(())
    }

    /// Applies the stored configuration matching the connected monitors.
    pub fn apply_stored(&mut self) -> Result<()> {
        let timestamp = self.next_timestamp();
        let applied = apply::apply_from_file(&self.store.paths().intended, self.backend.as_mut(), timestamp);
        let refreshed = self.refresh().map(|_| ());
        applied?;
        refreshed
    }

    /// Brings back the configurations saved before the last save and
    /// applies the matching one.
    pub fn restore_backup(&mut self) -> Result<()> {
        let paths = self.store.paths().clone();
        fs::rename(&paths.backup, &paths.intended)?;
        info!("restored {}", paths.intended.display());
        self.apply_stored()
    }

    /// Watch for monitor changes.
    pub async fn watch_changes(manager: Arc<Mutex<DisplayManager>>, connection: &zbus::Connection) -> Result<()> {
        info!("Watching Monitor Changes...");
        let drm = Path::new(DRM_CLASS_DIR);
        let mut known = connector_status(drm);
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let status = connector_status(drm);
            if status == known {
                continue;
            }
            known = status;

            info!("Displays changed...");
            {
                let mut manager = manager.lock().await;
                match manager.apply_stored() {
                    Ok(()) => info!("applied stored configuration"),
                    Err(e) if e.is_no_match() => info!("no stored configuration for these monitors: {e}"),
                    Err(e) => error!("{e}"),
                }
            }
            connection
                .emit_signal(
                    None::<&str>,
                    dbus::OBJECT_PATH,
                    dbus::INTERFACE_NAME,
                    "MonitorsChanged",
                    &(),
                )
                .await?;
        }
    }
}

/// Connector directories (`card0-DP-1`, ...) under `dir` with the content
/// of their `status` file.
fn connector_status(dir: &Path) -> Vec<(PathBuf, String)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("cannot list {}: {e}", dir.display());
            return Vec::new();
        }
    };

    let mut connectors: Vec<(PathBuf, String)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with("card") && name.contains('-')
        })
        .map(|entry| {
            let path = entry.path();
            let status = fs::read_to_string(path.join("status")).unwrap_or_default();
            (path, status.trim().to_string())
        })
        .collect();
    connectors.sort();
    connectors
}
