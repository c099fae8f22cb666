//! Command dispatcher - routes an authenticated command to its handler

use crate::alert::AlertPlayer;
use crate::command::{CommandKind, ParsedCommand};
use crate::config::Config;
use crate::handlers;
use crate::platform::{Capability, Platform};
use crate::responder::{Responder, SendOutcome};
use crate::settings::SettingsStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Result of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler ran and a reply was handed to the responder
    Replied(CommandKind, SendOutcome),
    /// Handler ran with nothing to say
    Silent(CommandKind),
    /// Platform lacks what the handler needs; its fallback was sent if it has one
    CapabilityMissing(CommandKind, Capability),
    /// Handler failed; logged only
    Failed(CommandKind),
}

/// Capability a command cannot run without
pub fn required_capability(kind: CommandKind) -> Option<Capability> {
    match kind {
        CommandKind::Locate => Some(Capability::Location),
        CommandKind::CallMe => Some(Capability::Call),
        CommandKind::Ring => Some(Capability::Overlay),
        _ => None,
    }
}

/// Reply sent when the required capability is missing
fn capability_fallback(kind: CommandKind) -> Option<&'static str> {
    match kind {
        CommandKind::Locate => Some(handlers::LOCATION_NOT_AVAILABLE),
        CommandKind::CallMe => Some(handlers::CALL_PERMISSION_REQUIRED),
        _ => None,
    }
}

pub struct Dispatcher {
    platform: Platform,
    settings: Arc<SettingsStore>,
    alert: Arc<AlertPlayer>,
    responder: Responder,
    location_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        platform: Platform,
        settings: Arc<SettingsStore>,
        alert: Arc<AlertPlayer>,
    ) -> Self {
        Self {
            responder: Responder::new(platform.sms.clone()),
            platform,
            settings,
            alert,
            location_timeout: config.location_timeout,
        }
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    pub async fn dispatch(&self, command: &ParsedCommand, sender: &str) -> DispatchOutcome {
        let kind = CommandKind::from_keyword(&command.keyword);
        info!(command = %kind, sender = %sender, "Dispatching command");

        if let Some(capability) = required_capability(kind) {
            if !self.platform.capabilities.has(capability) {
                warn!(command = %kind, %capability, "Capability missing");
                if let Some(text) = capability_fallback(kind) {
                    self.responder.send(sender, text);
                }
                return DispatchOutcome::CapabilityMissing(kind, capability);
            }
        }

        let reply = match kind {
            CommandKind::Locate => {
                Ok(Some(handlers::locate(self.platform.location.as_ref(), self.location_timeout).await))
            }
            CommandKind::Ring => handlers::ring(&self.alert).map(|()| None),
            CommandKind::Info => Ok(Some(handlers::info(
                self.platform.status.as_ref(),
                chrono::Local::now(),
            ))),
            CommandKind::Help => handlers::help(&self.settings).map(Some),
            CommandKind::CallMe => Ok(handlers::callme(self.platform.telephony.as_ref(), sender)),
            CommandKind::Sound => Ok(Some(handlers::sound(
                self.platform.audio.as_ref(),
                &command.params,
            ))),
            CommandKind::Ping => Ok(Some(handlers::ping().to_string())),
            CommandKind::Unknown => Ok(Some(handlers::UNKNOWN_COMMAND.to_string())),
        };

        match reply {
            Ok(Some(text)) => DispatchOutcome::Replied(kind, self.responder.send(sender, &text)),
            Ok(None) => DispatchOutcome::Silent(kind),
            Err(e) => {
                error!("Error handling {} command: {}", kind, e);
                DispatchOutcome::Failed(kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::simulated::{FreshFix, SimulatedDevice};
    use crate::platform::{AudioControl, Location, RingerMode};
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        device: Arc<SimulatedDevice>,
        settings: Arc<SettingsStore>,
        alert: Arc<AlertPlayer>,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_test(temp_dir.path());
        let device = Arc::new(SimulatedDevice::new());
        let platform = Platform::from_device(device.clone());
        let settings = Arc::new(SettingsStore::new(&config));
        settings.set_password("pass123").unwrap();
        let alert = Arc::new(AlertPlayer::new(
            &config,
            platform.audio.clone(),
            platform.overlay.clone(),
        ));
        let dispatcher = Dispatcher::new(&config, platform, settings.clone(), alert.clone());

        Fixture {
            _temp_dir: temp_dir,
            device,
            settings,
            alert,
            dispatcher,
        }
    }

    fn command(keyword: &str, params: &[&str]) -> ParsedCommand {
        ParsedCommand {
            keyword: keyword.to_string(),
            params: params.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_ping_replies() {
        let f = fixture();
        let outcome = f.dispatcher.dispatch(&command("ping", &[]), "+1555").await;
        assert_eq!(
            outcome,
            DispatchOutcome::Replied(CommandKind::Ping, SendOutcome::Single)
        );
        assert_eq!(f.device.outbox()[0].text(), handlers::PING_RESPONSE);
        assert_eq!(f.device.outbox()[0].destination, "+1555");
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let f = fixture();
        let outcome = f.dispatcher.dispatch(&command("explode", &[]), "+1555").await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Replied(CommandKind::Unknown, _)
        ));
        assert_eq!(f.device.outbox()[0].text(), handlers::UNKNOWN_COMMAND);
    }

    #[tokio::test]
    async fn test_locate_replies_with_coordinates() {
        let f = fixture();
        f.device.set_last_known(Some(Location {
            latitude: 1.5,
            longitude: -2.25,
        }));
        f.dispatcher.dispatch(&command("locate", &[]), "+1555").await;
        assert!(f.device.outbox()[0].text().contains("maps?q=1.5,-2.25"));
    }

    #[tokio::test]
    async fn test_locate_without_permission() {
        let f = fixture();
        f.device.set_capability(Capability::Location, false);
        f.device.set_fresh_fix(FreshFix::Answer(Some(Location {
            latitude: 0.0,
            longitude: 0.0,
        })));

        let outcome = f.dispatcher.dispatch(&command("locate", &[]), "+1555").await;
        assert_eq!(
            outcome,
            DispatchOutcome::CapabilityMissing(CommandKind::Locate, Capability::Location)
        );
        assert_eq!(f.device.outbox()[0].text(), handlers::LOCATION_NOT_AVAILABLE);
        assert_eq!(f.device.fix_requests(), 0);
    }

    #[tokio::test]
    async fn test_callme_without_permission() {
        let f = fixture();
        f.device.set_capability(Capability::Call, false);

        let outcome = f.dispatcher.dispatch(&command("callme", &[]), "+1555").await;
        assert_eq!(
            outcome,
            DispatchOutcome::CapabilityMissing(CommandKind::CallMe, Capability::Call)
        );
        assert_eq!(f.device.outbox()[0].text(), handlers::CALL_PERMISSION_REQUIRED);
        assert!(f.device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_callme_places_call_silently() {
        let f = fixture();
        let outcome = f.dispatcher.dispatch(&command("callme", &[]), "+1555").await;
        assert_eq!(outcome, DispatchOutcome::Silent(CommandKind::CallMe));
        assert_eq!(f.device.calls(), vec!["+1555".to_string()]);
        assert!(f.device.outbox().is_empty());
    }

    #[tokio::test]
    async fn test_ring_has_no_text_reply() {
        let f = fixture();
        let outcome = f.dispatcher.dispatch(&command("ring", &[]), "+1555").await;
        assert_eq!(outcome, DispatchOutcome::Silent(CommandKind::Ring));
        assert!(f.device.outbox().is_empty());
        assert!(f.alert.is_playing());
        assert!(f.device.overlay_message().is_some());
        f.alert.dismiss();
    }

    #[tokio::test]
    async fn test_ring_without_overlay_does_not_start() {
        let f = fixture();
        f.device.set_capability(Capability::Overlay, false);
        let outcome = f.dispatcher.dispatch(&command("ring", &[]), "+1555").await;
        assert_eq!(
            outcome,
            DispatchOutcome::CapabilityMissing(CommandKind::Ring, Capability::Overlay)
        );
        assert!(f.device.outbox().is_empty());
        assert_eq!(f.device.alert_starts(), 0);
    }

    #[tokio::test]
    async fn test_ring_failure_is_contained() {
        let f = fixture();
        f.device.fail_alert_sound(true);
        let outcome = f.dispatcher.dispatch(&command("ring", &[]), "+1555").await;
        assert_eq!(outcome, DispatchOutcome::Failed(CommandKind::Ring));
        assert!(f.device.outbox().is_empty());
    }

    #[tokio::test]
    async fn test_sound_silent() {
        let f = fixture();
        f.dispatcher
            .dispatch(&command("sound", &["silent"]), "+1555")
            .await;
        assert_eq!(f.device.ringer_mode(), RingerMode::Silent);
        assert_eq!(f.device.outbox()[0].text(), "Sound mode set to silent");
    }

    #[tokio::test]
    async fn test_help_is_multipart_and_current() {
        let f = fixture();
        f.settings.set_password("newpass").unwrap();
        let outcome = f.dispatcher.dispatch(&command("help", &[]), "+1555").await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Replied(CommandKind::Help, SendOutcome::Multipart(_))
        ));
        assert!(f.device.outbox()[0].text().contains("WMD ping newpass"));
    }

    #[tokio::test]
    async fn test_info_replies() {
        let f = fixture();
        f.device.set_battery(Some(15), false);
        f.dispatcher.dispatch(&command("info", &[]), "+1555").await;
        assert!(f.device.outbox()[0].text().contains("Battery: 15%"));
    }

    #[test]
    fn test_required_capabilities() {
        assert_eq!(required_capability(CommandKind::Locate), Some(Capability::Location));
        assert_eq!(required_capability(CommandKind::CallMe), Some(Capability::Call));
        assert_eq!(required_capability(CommandKind::Ring), Some(Capability::Overlay));
        for kind in [CommandKind::Info, CommandKind::Help, CommandKind::Sound, CommandKind::Ping] {
            assert_eq!(required_capability(kind), None);
        }
    }
}
