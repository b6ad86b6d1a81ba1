use std::fs::{self, DirBuilder};
use std::io::{self, Write};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::format;
use crate::resources::ScreenResources;

pub const CONFIG_INTENDED_BASENAME: &str = "monitors.xml";
pub const CONFIG_BACKUP_BASENAME: &str = "monitors.xml.backup";

/// Where the monitors file and its backup live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub intended: PathBuf,
    pub backup: PathBuf,
}

impl ConfigPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> ConfigPaths {
        let dir = dir.as_ref();
        ConfigPaths {
            intended: dir.join(CONFIG_INTENDED_BASENAME),
            backup: dir.join(CONFIG_BACKUP_BASENAME),
        }
    }

    /// Files under the user's configuration directory (`$XDG_CONFIG_HOME`).
    pub fn user() -> Result<ConfigPaths> {
        let dir = dirs::config_dir().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no user configuration directory",
            ))
        })?;
        Ok(ConfigPaths::in_dir(dir))
    }

    fn directory(&self) -> &Path {
        self.intended.parent().unwrap_or_else(|| Path::new("."))
    }

    fn ensure_directory(&self) -> Result<()> {
        DirBuilder::new().recursive(true).mode(0o700).create(self.directory())?;
        Ok(())
    }
}

/// Persisted configurations, one per distinct set of monitors.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    paths: ConfigPaths,
}

impl ConfigStore {
    pub fn new(paths: ConfigPaths) -> ConfigStore {
        ConfigStore { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn read_file(path: &Path) -> Result<Vec<Configuration>> {
        let text = fs::read_to_string(path)?;
        format::parse(&text)
    }

    pub fn load_all(&self) -> Result<Vec<Configuration>> {
        ConfigStore::read_file(&self.paths.intended)
    }

    /// Stores `configuration`, replacing whatever was stored for the same
    /// monitors and keeping configurations of other setups.
    pub fn save(&self, configuration: &Configuration) -> Result<()> {
        let stored = match self.load_all() {
            Ok(stored) => stored,
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("discarding unreadable {}: {e}", self.paths.intended.display());
                Vec::new()
            }
        };

        let mut configurations: Vec<Configuration> = stored
            .into_iter()
            .filter(|c| !c.matches(configuration))
            .collect();
        configurations.push(configuration.clone());
        let contents = format::serialize(&configurations)?;

        self.paths.ensure_directory()?;
        // Written next to the target so the final rename stays on one filesystem.
        let mut staged = NamedTempFile::new_in(self.paths.directory())?;
        staged.write_all(contents.as_bytes())?;
        staged.as_file().sync_all()?;

        // The intended file may not exist yet.
        if let Err(e) = fs::rename(&self.paths.intended, &self.paths.backup) {
            debug!("no previous configuration to back up: {e}");
        }
        if let Err(e) = staged.persist(&self.paths.intended) {
            // Nor may the backup.
            let _ = fs::rename(&self.paths.backup, &self.paths.intended);
            return Err(e.error.into());
        }

        info!(
            "saved {} configuration(s) to {}",
            configurations.len(),
            self.paths.intended.display()
        );
        Ok(())
    }

    /// The stored configuration for the monitors currently plugged in.
    pub fn load_matching(&self, screen: &ScreenResources) -> Result<Configuration> {
        ConfigStore::load_matching_from(&self.paths.intended, screen)
    }

    pub fn load_matching_from(path: &Path, screen: &ScreenResources) -> Result<Configuration> {
        let current = Configuration::new_current(screen);
        ConfigStore::read_file(path)?
            .into_iter()
            .find(|stored| stored.matches(&current))
            .ok_or(Error::NoMatchingStoredConfiguration)
    }
}
