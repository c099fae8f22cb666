//! Command handlers
//!
//! Each handler performs one side effect and builds the reply text. Sending
//! the reply is the dispatcher's job.

use crate::alert::AlertPlayer;
use crate::config::MAPS_URL;
use crate::error::Result;
use crate::platform::{AudioControl, DeviceStatus, Location, LocationProvider, RingerMode, Telephony};
use crate::settings::SettingsStore;
use chrono::{DateTime, Local};
use std::time::Duration;
use tracing::{debug, error, warn};

pub const MISSING_PASSWORD: &str =
    "Missing password. Commands must look like: <prefix> <command> <password>";
pub const INVALID_PASSWORD: &str = "Invalid password.";
pub const UNKNOWN_COMMAND: &str =
    "Unknown command. Send the help command with your password for the list of commands.";
pub const LOCATION_NOT_AVAILABLE: &str = "Location not available.";
pub const CALL_PERMISSION_REQUIRED: &str =
    "Cannot call back: phone call permission has not been granted on the device.";
pub const ERROR_MAKING_CALL: &str = "Error making call.";
pub const PING_RESPONSE: &str = "WMD is running on this device.";
pub const RING_OVERLAY_MESSAGE: &str =
    "This device is being located by its owner. Tap dismiss to stop the alarm.";

/// Last-known fix first, then one fresh fix bounded by `timeout`
pub async fn locate(location: &dyn LocationProvider, timeout: Duration) -> String {
    match fetch_location(location, timeout).await {
        Some(fix) => format_location(&fix),
        None => LOCATION_NOT_AVAILABLE.to_string(),
    }
}

async fn fetch_location(location: &dyn LocationProvider, timeout: Duration) -> Option<Location> {
    if let Some(fix) = location.last_known() {
        return Some(fix);
    }

    debug!("No last known location, requesting a fresh fix");
    match tokio::time::timeout(timeout, location.request_fix()).await {
        Ok(Ok(fix)) => fix,
        Ok(Err(_)) => {
            warn!("Location provider dropped the request");
            None
        }
        Err(_) => {
            warn!("No location fix within {:?}", timeout);
            location.cancel_fix();
            None
        }
    }
}

pub fn format_location(fix: &Location) -> String {
    format!(
        "Device location: {}, {}\n{}{},{}",
        fix.latitude, fix.longitude, MAPS_URL, fix.latitude, fix.longitude
    )
}

/// Start the alert; there is no text reply
pub fn ring(alert: &AlertPlayer) -> Result<()> {
    alert.start(RING_OVERLAY_MESSAGE)?;
    Ok(())
}

pub fn info(status: &dyn DeviceStatus, now: DateTime<Local>) -> String {
    let battery = status
        .battery_percent()
        .map(i32::from)
        .unwrap_or(-1);

    format!(
        "Device info:\nBattery: {}%\nCharging: {}\nScreen on: {}\nTime: {}",
        battery,
        yes_no(status.is_charging()),
        yes_no(status.is_screen_on()),
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Command list with the prefix and password as they are right now
pub fn help(settings: &SettingsStore) -> Result<String> {
    let current = settings.load()?;
    Ok(help_text(&current.command_prefix, &current.command_password))
}

pub fn help_text(prefix: &str, password: &str) -> String {
    format!(
        "Available commands:\n\
         {p} locate {pw} - reply with location\n\
         {p} ring {pw} - ring at full volume\n\
         {p} info {pw} - battery and screen state\n\
         {p} callme {pw} - call you back\n\
         {p} sound {pw} [normal|vibrate|silent] - ringer mode\n\
         {p} ping {pw} - check the service\n\
         {p} help {pw} - this list",
        p = prefix,
        pw = password
    )
}

/// Call the sender back. The reply is only set when something went wrong.
pub fn callme(telephony: &dyn Telephony, sender: &str) -> Option<String> {
    match telephony.place_call(sender) {
        Ok(()) => None,
        Err(e) => {
            error!("Error making call: {}", e);
            Some(ERROR_MAKING_CALL.to_string())
        }
    }
}

/// Set the ringer mode named in `params`, or report the current one
pub fn sound(audio: &dyn AudioControl, params: &[String]) -> String {
    match requested_mode(params) {
        Some(mode) => match audio.set_ringer_mode(mode) {
            Ok(()) => format!("Sound mode set to {}", mode.param()),
            Err(e) => {
                warn!("Failed to set ringer mode {:?}: {}", mode, e);
                format!("Failed to set sound mode to {}", mode.param())
            }
        },
        None => format!("Current sound mode: {}", audio.ringer_mode().label()),
    }
}

/// normal beats vibrate beats silent when several are given. Params are
/// matched exactly; `SILENT` is not a mode.
fn requested_mode(params: &[String]) -> Option<RingerMode> {
    [RingerMode::Normal, RingerMode::Vibrate, RingerMode::Silent]
        .into_iter()
        .find(|mode| params.iter().any(|p| p == mode.param()))
}

pub fn ping() -> &'static str {
    PING_RESPONSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::platform::simulated::{FreshFix, SimulatedDevice};
    use chrono::TimeZone;
    use tempfile::TempDir;

    const HERE: Location = Location {
        latitude: 52.52,
        longitude: 13.405,
    };

    fn params(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_locate_uses_last_known() {
        let device = SimulatedDevice::new();
        device.set_last_known(Some(HERE));

        let reply = locate(&device, Duration::from_millis(50)).await;
        assert!(reply.starts_with("Device location: 52.52, 13.405"));
        assert!(reply.contains("https://maps.google.com/maps?q=52.52,13.405"));
        assert_eq!(device.fix_requests(), 0);
    }

    #[tokio::test]
    async fn test_locate_falls_back_to_fresh_fix() {
        let device = SimulatedDevice::new();
        device.set_fresh_fix(FreshFix::Answer(Some(HERE)));

        let reply = locate(&device, Duration::from_millis(50)).await;
        assert!(reply.contains("52.52"));
        assert_eq!(device.fix_requests(), 1);
    }

    #[tokio::test]
    async fn test_locate_times_out() {
        let device = SimulatedDevice::new();
        device.set_fresh_fix(FreshFix::NeverAnswer);

        let reply = locate(&device, Duration::from_millis(30)).await;
        assert_eq!(reply, LOCATION_NOT_AVAILABLE);
        assert_eq!(device.fix_requests(), 1);
        assert_eq!(device.fix_cancellations(), 1);
    }

    #[tokio::test]
    async fn test_locate_no_fix() {
        let device = SimulatedDevice::new();
        device.set_fresh_fix(FreshFix::Answer(None));
        assert_eq!(
            locate(&device, Duration::from_millis(30)).await,
            LOCATION_NOT_AVAILABLE
        );
    }

    #[test]
    fn test_info_format() {
        let device = SimulatedDevice::new();
        device.set_battery(Some(42), true);
        device.set_screen_on(false);
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let reply = info(&device, now);
        assert!(reply.contains("Battery: 42%"));
        assert!(reply.contains("Charging: Yes"));
        assert!(reply.contains("Screen on: No"));
        assert!(reply.contains("Time: 2024-03-09 14:05:07"));
    }

    #[test]
    fn test_info_unknown_battery() {
        let device = SimulatedDevice::new();
        device.set_battery(None, false);
        assert!(info(&device, Local::now()).contains("Battery: -1%"));
    }

    #[test]
    fn test_help_reads_current_settings() {
        let temp_dir = TempDir::new().unwrap();
        let settings = SettingsStore::new(&Config::for_test(temp_dir.path()));
        settings.set_password("first").unwrap();
        assert!(help(&settings).unwrap().contains("WMD locate first"));

        settings.set_prefix("FIND").unwrap();
        settings.set_password("second").unwrap();
        let reply = help(&settings).unwrap();
        assert!(reply.contains("FIND locate second"));
        assert!(!reply.contains("first"));
    }

    #[test]
    fn test_callme() {
        let device = SimulatedDevice::new();
        assert_eq!(callme(&device, "+15551234567"), None);
        assert_eq!(device.calls(), vec!["+15551234567".to_string()]);

        device.fail_calls(true);
        assert_eq!(
            callme(&device, "+15551234567"),
            Some(ERROR_MAKING_CALL.to_string())
        );
    }

    #[test]
    fn test_sound_set_modes() {
        let device = SimulatedDevice::new();
        assert_eq!(sound(&device, &params(&["silent"])), "Sound mode set to silent");
        assert_eq!(device.ringer_mode(), RingerMode::Silent);

        assert_eq!(sound(&device, &params(&["vibrate"])), "Sound mode set to vibrate");
        assert_eq!(device.ringer_mode(), RingerMode::Vibrate);
    }

    #[test]
    fn test_sound_params_case_sensitive() {
        let device = SimulatedDevice::new();
        assert_eq!(sound(&device, &params(&["SILENT"])), "Current sound mode: Normal");
        assert_eq!(device.ringer_mode(), RingerMode::Normal);
    }

    #[test]
    fn test_sound_priority() {
        let device = SimulatedDevice::new();
        assert_eq!(
            sound(&device, &params(&["silent", "normal"])),
            "Sound mode set to normal"
        );
    }

    #[test]
    fn test_sound_query() {
        let device = SimulatedDevice::new();
        device.set_ringer_mode(RingerMode::Vibrate).unwrap();
        assert_eq!(sound(&device, &[]), "Current sound mode: Vibrate");
        assert_eq!(sound(&device, &params(&["loud"])), "Current sound mode: Vibrate");
    }

    #[test]
    fn test_sound_failure_reported() {
        let device = SimulatedDevice::new();
        device.fail_ringer(true);
        assert_eq!(
            sound(&device, &params(&["silent"])),
            "Failed to set sound mode to silent"
        );
        assert_eq!(device.ringer_mode(), RingerMode::Normal);
    }

    #[test]
    fn test_ping_constant() {
        assert_eq!(ping(), PING_RESPONSE);
    }
}
