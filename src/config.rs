//! Configuration, paths and protocol constants

use std::path::PathBuf;
use std::time::Duration;

/// All configurable paths and timings
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub settings_file: PathBuf,
    pub whitelist_db: PathBuf,
    pub alert_duration: Duration,
    pub overlay_timeout: Duration,
    pub location_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wheres-my-device");

        Self {
            settings_file: data_dir.join("settings.json"),
            whitelist_db: data_dir.join("whitelist.db"),
            data_dir,
            alert_duration: ALERT_DURATION,
            overlay_timeout: OVERLAY_TIMEOUT,
            location_timeout: LOCATION_TIMEOUT,
        }
    }
}

impl Config {
    /// Production timings with all files under `data_dir`
    pub fn in_dir(data_dir: &std::path::Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            settings_file: data_dir.join("settings.json"),
            whitelist_db: data_dir.join("whitelist.db"),
            ..Self::default()
        }
    }

    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &std::path::Path) -> Self {
        Self {
            data_dir: temp_dir.to_path_buf(),
            settings_file: temp_dir.join("settings.json"),
            whitelist_db: temp_dir.join("whitelist.db"),
            alert_duration: Duration::from_millis(200),
            overlay_timeout: Duration::from_millis(200),
            location_timeout: Duration::from_millis(100),
        }
    }
}

/// Prefix every command body must start with until the owner changes it
pub const DEFAULT_COMMAND_PREFIX: &str = "WMD";

/// Longest reply sent as a single SMS
pub const SINGLE_SEGMENT_LIMIT: usize = 160;

/// Characters per part of a concatenated GSM-7 message
pub const GSM7_PART_LEN: usize = 153;

/// Characters per part of a concatenated UCS-2 message
pub const UCS2_PART_LEN: usize = 67;

pub const ALERT_DURATION: Duration = Duration::from_secs(30);
pub const OVERLAY_TIMEOUT: Duration = Duration::from_secs(30);
pub const LOCATION_TIMEOUT: Duration = Duration::from_secs(30);

pub const MAPS_URL: &str = "https://maps.google.com/maps?q=";
