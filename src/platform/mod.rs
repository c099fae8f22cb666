//! Device platform seams
//!
//! Everything the command pipeline does to the outside world goes through
//! one of these traits. A phone build implements them over the OS APIs; the
//! CLI and tests use [`simulated::SimulatedDevice`].

pub mod simulated;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};

/// Outbound SMS
pub trait SmsTransport: Send + Sync {
    fn send_text(&self, destination: &str, message: &str) -> Result<()>;
    fn send_multipart(&self, destination: &str, parts: &[String]) -> Result<()>;
}

/// A location fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

pub trait LocationProvider: Send + Sync {
    /// Cached fix, if the platform has one
    fn last_known(&self) -> Option<Location>;

    /// Ask for a fresh fix. The platform completes the channel from its own
    /// callback; a dropped sender means no fix.
    fn request_fix(&self) -> oneshot::Receiver<Option<Location>>;

    /// Stop delivering updates for an abandoned request
    fn cancel_fix(&self) {}
}

/// Ringer mode of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingerMode {
    Normal,
    Vibrate,
    Silent,
}

impl RingerMode {
    /// Parameter spelling used in commands
    pub fn param(&self) -> &'static str {
        match self {
            RingerMode::Normal => "normal",
            RingerMode::Vibrate => "vibrate",
            RingerMode::Silent => "silent",
        }
    }

    /// Capitalized name used in replies
    pub fn label(&self) -> &'static str {
        match self {
            RingerMode::Normal => "Normal",
            RingerMode::Vibrate => "Vibrate",
            RingerMode::Silent => "Silent",
        }
    }
}

/// Ringer mode, ring-stream volume and alert sound
pub trait AudioControl: Send + Sync {
    fn ringer_mode(&self) -> RingerMode;
    fn set_ringer_mode(&self, mode: RingerMode) -> Result<()>;

    fn ring_volume(&self) -> u32;
    fn max_ring_volume(&self) -> u32;
    fn set_ring_volume(&self, volume: u32) -> Result<()>;

    /// Start looping the default ringtone on the ring stream
    fn start_alert_sound(&self) -> Result<()>;
    fn stop_alert_sound(&self);
}

/// Full-screen message with a dismiss control
pub trait OverlayDisplay: Send + Sync {
    fn show(&self, message: &str) -> Result<()>;
    fn remove(&self);
}

pub trait Telephony: Send + Sync {
    fn place_call(&self, number: &str) -> Result<()>;
}

/// Battery and screen state
pub trait DeviceStatus: Send + Sync {
    /// Battery percentage, `None` when the platform cannot tell
    fn battery_percent(&self) -> Option<u8>;
    fn is_charging(&self) -> bool;
    fn is_screen_on(&self) -> bool;
}

/// Optional platform features gated by permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Sms,
    Location,
    Call,
    Overlay,
    Contacts,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Sms,
        Capability::Location,
        Capability::Call,
        Capability::Overlay,
        Capability::Contacts,
    ];
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Sms => "sms",
            Capability::Location => "location",
            Capability::Call => "call",
            Capability::Overlay => "overlay",
            Capability::Contacts => "contacts",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Capability {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Capability::ALL
            .into_iter()
            .find(|c| c.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::error::Error::Config(format!("unknown capability: {}", s)))
    }
}

/// A permission granted or revoked while running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityChange {
    pub capability: Capability,
    pub granted: bool,
}

pub trait Capabilities: Send + Sync {
    fn has(&self, capability: Capability) -> bool;

    /// Grant and revoke notifications, `None` when the platform cannot
    /// observe permission changes. `has` stays the source of truth.
    fn watch(&self) -> Option<broadcast::Receiver<CapabilityChange>> {
        None
    }
}

/// Snapshot of which capabilities are granted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureSet {
    pub granted: Vec<Capability>,
    pub missing: Vec<Capability>,
}

impl FeatureSet {
    pub fn query(capabilities: &dyn Capabilities) -> Self {
        let (granted, missing) = Capability::ALL
            .iter()
            .copied()
            .partition(|c| capabilities.has(*c));
        Self { granted, missing }
    }
}

/// All platform collaborators, shared across tasks
#[derive(Clone)]
pub struct Platform {
    pub sms: Arc<dyn SmsTransport>,
    pub location: Arc<dyn LocationProvider>,
    pub audio: Arc<dyn AudioControl>,
    pub overlay: Arc<dyn OverlayDisplay>,
    pub telephony: Arc<dyn Telephony>,
    pub status: Arc<dyn DeviceStatus>,
    pub capabilities: Arc<dyn Capabilities>,
}

impl Platform {
    /// Every seam backed by the same device object
    pub fn from_device<D>(device: Arc<D>) -> Self
    where
        D: SmsTransport
            + LocationProvider
            + AudioControl
            + OverlayDisplay
            + Telephony
            + DeviceStatus
            + Capabilities
            + 'static,
    {
        Self {
            sms: device.clone(),
            location: device.clone(),
            audio: device.clone(),
            overlay: device.clone(),
            telephony: device.clone(),
            status: device.clone(),
            capabilities: device,
        }
    }
}
