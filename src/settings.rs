//! Settings store - persistent JSON key/value configuration
//!
//! Every read goes back to disk so a message always sees the latest prefix,
//! password and whitelist flag the owner saved.

use crate::config::{Config, DEFAULT_COMMAND_PREFIX};
use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::info;

/// Settings the command pipeline reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub command_prefix: String,
    pub command_password: String,
    pub whitelist_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            command_password: String::new(),
            whitelist_enabled: false,
        }
    }
}

/// Change notification published after every successful write
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsChange {
    PrefixChanged(String),
    PasswordChanged,
    WhitelistToggled(bool),
}

/// JSON-file backed settings store
pub struct SettingsStore {
    path: PathBuf,
    changes: broadcast::Sender<SettingsChange>,
}

impl SettingsStore {
    pub fn new(config: &Config) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            path: config.settings_file.clone(),
            changes,
        }
    }

    /// Read current settings, falling back to defaults for missing keys
    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Settings::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Save settings to disk atomically
    fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let parent = self.path.parent().unwrap_or(std::path::Path::new("."));
        let mut temp = NamedTempFile::new_in(parent)?;

        let json = serde_json::to_string_pretty(settings)?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        Ok(())
    }

    /// Listen for settings changes
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.changes.subscribe()
    }

    fn publish(&self, change: SettingsChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }

    pub fn prefix(&self) -> Result<String> {
        Ok(self.load()?.command_prefix)
    }

    pub fn password(&self) -> Result<String> {
        Ok(self.load()?.command_password)
    }

    pub fn whitelist_enabled(&self) -> Result<bool> {
        Ok(self.load()?.whitelist_enabled)
    }

    pub fn set_prefix(&self, prefix: &str) -> Result<()> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(Error::Config("command prefix must not be blank".to_string()));
        }

        let mut settings = self.load()?;
        settings.command_prefix = prefix.to_string();
        self.save(&settings)?;
        self.publish(SettingsChange::PrefixChanged(settings.command_prefix));
        Ok(())
    }

    pub fn set_password(&self, password: &str) -> Result<()> {
        let mut settings = self.load()?;
        settings.command_password = password.to_string();
        self.save(&settings)?;
        self.publish(SettingsChange::PasswordChanged);
        Ok(())
    }

    pub fn set_whitelist_enabled(&self, enabled: bool) -> Result<()> {
        let mut settings = self.load()?;
        settings.whitelist_enabled = enabled;
        self.save(&settings)?;
        self.publish(SettingsChange::WhitelistToggled(enabled));
        Ok(())
    }

    /// Make sure a command password exists, generating one if it is empty.
    /// Returns the password in effect.
    pub fn ensure_password(&self) -> Result<String> {
        let settings = self.load()?;
        if !settings.command_password.is_empty() {
            return Ok(settings.command_password);
        }

        let password = generate_password();
        self.set_password(&password)?;
        info!("Generated default command password: {}", password);
        Ok(password)
    }
}

/// "password" followed by four random digits
pub fn generate_password() -> String {
    let digits: u16 = rand::thread_rng().gen_range(1000..=9999);
    format!("password{}", digits)
}
