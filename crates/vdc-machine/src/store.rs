//! On-disk machine store.
//!
//! Layout: `<root>/machines/<name>/config.json`, next to the machine's
//! SSH key written by the driver.

use std::fs;
use std::path::{Path, PathBuf};

use vdc_driver::DriverConfig;

use crate::error::{CliError, Result};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone)]
pub struct MachineStore {
    root: PathBuf,
}

impl MachineStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn machines_dir(&self) -> PathBuf {
        self.root.join("machines")
    }

    fn machine_dir(&self, name: &str) -> PathBuf {
        self.machines_dir().join(name)
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.machine_dir(name).join(CONFIG_FILE)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.config_path(name).is_file()
    }

    pub fn save(&self, config: &DriverConfig) -> Result<()> {
        let dir = self.machine_dir(&config.machine_name);
        fs::create_dir_all(&dir).map_err(|source| CliError::Store {
            path: dir.clone(),
            source,
        })?;

        let path = self.config_path(&config.machine_name);
        let json = serde_json::to_vec_pretty(config).map_err(|source| CliError::Config {
            path: path.clone(),
            source,
        })?;

        // Write-then-rename; readers never see a partial file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|source| CliError::Store { path, source })
    }

    pub fn load(&self, name: &str) -> Result<DriverConfig> {
        let path = self.config_path(name);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CliError::UnknownMachine(name.to_string()));
            }
            Err(source) => return Err(CliError::Store { path, source }),
        };

        serde_json::from_slice(&raw).map_err(|source| CliError::Config { path, source })
    }

    /// Delete the machine directory, including its SSH key.
    pub fn remove(&self, name: &str) -> Result<()> {
        let dir = self.machine_dir(name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CliError::Store { path: dir, source }),
        }
    }

    /// Names of all stored machines, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let dir = self.machines_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(CliError::Store { path: dir, source }),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| self.exists(name))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Machine names double as CloudStack VM and key pair names.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');

    if !valid {
        return Err(CliError::InvalidName(name.to_string()));
    }
    Ok(())
}
