//! Access gate - decides whether a sender may talk to the device at all

use crate::settings::SettingsStore;
use crate::whitelist::{normalize_number, WhitelistStore};
use tracing::{debug, error};

pub struct AccessGate<'a> {
    settings: &'a SettingsStore,
    whitelist: &'a WhitelistStore,
}

impl<'a> AccessGate<'a> {
    pub fn new(settings: &'a SettingsStore, whitelist: &'a WhitelistStore) -> Self {
        Self {
            settings,
            whitelist,
        }
    }

    /// Everyone is allowed while the whitelist is off. Store failures deny.
    pub fn is_allowed(&self, sender: &str) -> bool {
        let enabled = match self.settings.whitelist_enabled() {
            Ok(enabled) => enabled,
            Err(e) => {
                error!("Failed to read whitelist flag: {}", e);
                return false;
            }
        };

        if !enabled {
            return true;
        }

        let normalized = normalize_number(sender);
        match self.whitelist.exists(&normalized) {
            Ok(found) => {
                if !found {
                    debug!(sender = %normalized, "Sender not in whitelist");
                }
                found
            }
            Err(e) => {
                error!("Whitelist lookup failed for {}: {}", normalized, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn stores(temp_dir: &TempDir) -> (SettingsStore, WhitelistStore) {
        let config = Config::for_test(temp_dir.path());
        (
            SettingsStore::new(&config),
            WhitelistStore::open(&config).unwrap(),
        )
    }

    #[test]
    fn test_disabled_allows_everyone() {
        let temp_dir = TempDir::new().unwrap();
        let (settings, whitelist) = stores(&temp_dir);
        let gate = AccessGate::new(&settings, &whitelist);

        assert!(gate.is_allowed("+15551234567"));
        assert!(gate.is_allowed("unknown"));
        assert!(gate.is_allowed(""));
    }

    #[test]
    fn test_enabled_checks_normalized_number() {
        let temp_dir = TempDir::new().unwrap();
        let (settings, whitelist) = stores(&temp_dir);
        whitelist.add("+15551234567", "Owner").unwrap();
        settings.set_whitelist_enabled(true).unwrap();

        let gate = AccessGate::new(&settings, &whitelist);
        assert!(gate.is_allowed("+15551234567"));
        assert!(gate.is_allowed("+1 (555) 123-4567"));
        assert!(!gate.is_allowed("+15559999999"));
        assert!(!gate.is_allowed("15551234567"));
    }

    #[test]
    fn test_toggle_takes_effect_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let (settings, whitelist) = stores(&temp_dir);
        let gate = AccessGate::new(&settings, &whitelist);

        assert!(gate.is_allowed("+15559999999"));
        settings.set_whitelist_enabled(true).unwrap();
        assert!(!gate.is_allowed("+15559999999"));
    }
}
