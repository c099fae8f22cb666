//! In-process device used by the CLI and tests
//!
//! Records every side effect instead of touching real hardware.

use super::{
    AudioControl, Capabilities, Capability, CapabilityChange, DeviceStatus, Location, LocationProvider,
    OverlayDisplay, RingerMode, SmsTransport, Telephony,
};
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{broadcast, oneshot};
use tracing::info;

/// An SMS the device sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSms {
    pub destination: String,
    pub parts: Vec<String>,
    pub multipart: bool,
}

impl OutboundSms {
    pub fn text(&self) -> String {
        self.parts.concat()
    }
}

/// How the simulated location service answers a fresh-fix request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FreshFix {
    Answer(Option<Location>),
    NeverAnswer,
}

#[derive(Debug)]
struct DeviceState {
    outbox: Vec<OutboundSms>,
    sms_fails: bool,

    last_known: Option<Location>,
    fresh_fix: FreshFix,
    pending_fixes: Vec<oneshot::Sender<Option<Location>>>,
    fix_requests: usize,
    fix_cancellations: usize,

    ringer_mode: RingerMode,
    ringer_fails: bool,
    ring_volume: u32,
    max_ring_volume: u32,
    volume_changes: Vec<u32>,
    alert_playing: bool,
    alert_fails: bool,
    alert_starts: usize,
    alert_stops: usize,

    overlay_message: Option<String>,
    overlay_shows: usize,
    overlay_removals: usize,

    calls: Vec<String>,
    call_fails: bool,

    battery: Option<u8>,
    charging: bool,
    screen_on: bool,

    granted: HashSet<Capability>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            outbox: Vec::new(),
            sms_fails: false,
            last_known: None,
            fresh_fix: FreshFix::Answer(None),
            pending_fixes: Vec::new(),
            fix_requests: 0,
            fix_cancellations: 0,
            ringer_mode: RingerMode::Normal,
            ringer_fails: false,
            ring_volume: 3,
            max_ring_volume: 7,
            volume_changes: Vec::new(),
            alert_playing: false,
            alert_fails: false,
            alert_starts: 0,
            alert_stops: 0,
            overlay_message: None,
            overlay_shows: 0,
            overlay_removals: 0,
            calls: Vec::new(),
            call_fails: false,
            battery: Some(80),
            charging: false,
            screen_on: false,
            granted: Capability::ALL.into_iter().collect(),
        }
    }
}

#[derive(Debug)]
pub struct SimulatedDevice {
    state: Mutex<DeviceState>,
    capability_changes: broadcast::Sender<CapabilityChange>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        let (capability_changes, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(DeviceState::default()),
            capability_changes,
        }
    }
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        // A panicked test thread must not wedge the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- knobs ----

    pub fn set_last_known(&self, location: Option<Location>) {
        self.state().last_known = location;
    }

    pub fn set_fresh_fix(&self, fix: FreshFix) {
        self.state().fresh_fix = fix;
    }

    pub fn set_battery(&self, percent: Option<u8>, charging: bool) {
        let mut state = self.state();
        state.battery = percent;
        state.charging = charging;
    }

    pub fn set_screen_on(&self, on: bool) {
        self.state().screen_on = on;
    }

    pub fn set_ring_volume_levels(&self, current: u32, max: u32) {
        let mut state = self.state();
        state.ring_volume = current;
        state.max_ring_volume = max;
    }

    /// Grant or revoke a permission; watchers hear about real changes only
    pub fn set_capability(&self, capability: Capability, granted: bool) {
        let changed = {
            let mut state = self.state();
            if granted {
                state.granted.insert(capability)
            } else {
                state.granted.remove(&capability)
            }
        };

        if changed {
            info!(%capability, granted, "[simulated] permission changed");
            // No watchers is fine
            let _ = self
                .capability_changes
                .send(CapabilityChange { capability, granted });
        }
    }

    pub fn fail_sms(&self, fails: bool) {
        self.state().sms_fails = fails;
    }

    pub fn fail_ringer(&self, fails: bool) {
        self.state().ringer_fails = fails;
    }

    pub fn fail_alert_sound(&self, fails: bool) {
        self.state().alert_fails = fails;
    }

    pub fn fail_calls(&self, fails: bool) {
        self.state().call_fails = fails;
    }

    // ---- observations ----

    pub fn outbox(&self) -> Vec<OutboundSms> {
        self.state().outbox.clone()
    }

    pub fn take_outbox(&self) -> Vec<OutboundSms> {
        std::mem::take(&mut self.state().outbox)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn current_ring_volume(&self) -> u32 {
        self.state().ring_volume
    }

    pub fn volume_changes(&self) -> Vec<u32> {
        self.state().volume_changes.clone()
    }

    pub fn is_alert_playing(&self) -> bool {
        self.state().alert_playing
    }

    pub fn alert_starts(&self) -> usize {
        self.state().alert_starts
    }

    pub fn alert_stops(&self) -> usize {
        self.state().alert_stops
    }

    pub fn overlay_message(&self) -> Option<String> {
        self.state().overlay_message.clone()
    }

    pub fn overlay_shows(&self) -> usize {
        self.state().overlay_shows
    }

    pub fn overlay_removals(&self) -> usize {
        self.state().overlay_removals
    }

    pub fn fix_requests(&self) -> usize {
        self.state().fix_requests
    }

    pub fn fix_cancellations(&self) -> usize {
        self.state().fix_cancellations
    }
}

impl SmsTransport for SimulatedDevice {
    fn send_text(&self, destination: &str, message: &str) -> Result<()> {
        let mut state = self.state();
        if state.sms_fails {
            return Err(Error::Platform("SMS transport unavailable".to_string()));
        }
        state.outbox.push(OutboundSms {
            destination: destination.to_string(),
            parts: vec![message.to_string()],
            multipart: false,
        });
        Ok(())
    }

    fn send_multipart(&self, destination: &str, parts: &[String]) -> Result<()> {
        let mut state = self.state();
        if state.sms_fails {
            return Err(Error::Platform("SMS transport unavailable".to_string()));
        }
        state.outbox.push(OutboundSms {
            destination: destination.to_string(),
            parts: parts.to_vec(),
            multipart: true,
        });
        Ok(())
    }
}

impl LocationProvider for SimulatedDevice {
    fn last_known(&self) -> Option<Location> {
        self.state().last_known
    }

    fn request_fix(&self) -> oneshot::Receiver<Option<Location>> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state();
        state.fix_requests += 1;
        match state.fresh_fix {
            FreshFix::Answer(fix) => {
                let _ = tx.send(fix);
            }
            FreshFix::NeverAnswer => state.pending_fixes.push(tx),
        }
        rx
    }

    fn cancel_fix(&self) {
        let mut state = self.state();
        state.pending_fixes.clear();
        state.fix_cancellations += 1;
    }
}

impl AudioControl for SimulatedDevice {
    fn ringer_mode(&self) -> RingerMode {
        self.state().ringer_mode
    }

    fn set_ringer_mode(&self, mode: RingerMode) -> Result<()> {
        let mut state = self.state();
        if state.ringer_fails {
            return Err(Error::Platform("ringer mode change not permitted".to_string()));
        }
        state.ringer_mode = mode;
        Ok(())
    }

    fn ring_volume(&self) -> u32 {
        self.state().ring_volume
    }

    fn max_ring_volume(&self) -> u32 {
        self.state().max_ring_volume
    }

    fn set_ring_volume(&self, volume: u32) -> Result<()> {
        let mut state = self.state();
        state.ring_volume = volume;
        state.volume_changes.push(volume);
        Ok(())
    }

    fn start_alert_sound(&self) -> Result<()> {
        let mut state = self.state();
        if state.alert_fails {
            return Err(Error::Platform("no default ringtone".to_string()));
        }
        state.alert_playing = true;
        state.alert_starts += 1;
        info!("[simulated] alert sound playing");
        Ok(())
    }

    fn stop_alert_sound(&self) {
        let mut state = self.state();
        state.alert_playing = false;
        state.alert_stops += 1;
    }
}

impl OverlayDisplay for SimulatedDevice {
    fn show(&self, message: &str) -> Result<()> {
        let mut state = self.state();
        state.overlay_message = Some(message.to_string());
        state.overlay_shows += 1;
        Ok(())
    }

    fn remove(&self) {
        let mut state = self.state();
        state.overlay_message = None;
        state.overlay_removals += 1;
    }
}

impl Telephony for SimulatedDevice {
    fn place_call(&self, number: &str) -> Result<()> {
        let mut state = self.state();
        if state.call_fails {
            return Err(Error::Platform("call could not be placed".to_string()));
        }
        state.calls.push(number.to_string());
        Ok(())
    }
}

impl DeviceStatus for SimulatedDevice {
    fn battery_percent(&self) -> Option<u8> {
        self.state().battery
    }

    fn is_charging(&self) -> bool {
        self.state().charging
    }

    fn is_screen_on(&self) -> bool {
        self.state().screen_on
    }
}

impl Capabilities for SimulatedDevice {
    fn has(&self, capability: Capability) -> bool {
        self.state().granted.contains(&capability)
    }

    fn watch(&self) -> Option<broadcast::Receiver<CapabilityChange>> {
        Some(self.capability_changes.subscribe())
    }
}
