//! Inbound SMS processing
//!
//! gate → password provisioning → prefix → parse/auth → dispatch. Nothing in
//! here returns an error: every failure ends as a log line or a single reply.

use crate::access::AccessGate;
use crate::alert::AlertPlayer;
use crate::command::{parse_and_authenticate, strip_prefix, AuthError};
use crate::config::Config;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::Result;
use crate::handlers;
use crate::platform::Platform;
use crate::settings::SettingsStore;
use crate::whitelist::WhitelistStore;
use std::sync::Arc;
use tracing::{debug, error, info};

/// A message as delivered by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSms {
    pub sender: String,
    pub body: String,
}

impl InboundSms {
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
        }
    }
}

/// What became of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Sender failed the access gate; no reply
    NotAllowed,
    /// Body does not carry the command prefix; no reply
    NotACommand,
    /// Settings could not be read; no reply
    Unavailable,
    /// Refused before dispatch with a fixed reply
    Rejected(AuthError),
    Dispatched(DispatchOutcome),
}

pub struct CommandProcessor {
    settings: Arc<SettingsStore>,
    whitelist: Arc<WhitelistStore>,
    alert: Arc<AlertPlayer>,
    dispatcher: Dispatcher,
}

impl CommandProcessor {
    pub fn new(config: &Config, platform: Platform) -> Result<Self> {
        let settings = Arc::new(SettingsStore::new(config));
        let whitelist = Arc::new(WhitelistStore::open(config)?);
        Ok(Self::with_stores(config, platform, settings, whitelist))
    }

    pub fn with_stores(
        config: &Config,
        platform: Platform,
        settings: Arc<SettingsStore>,
        whitelist: Arc<WhitelistStore>,
    ) -> Self {
        let alert = Arc::new(AlertPlayer::new(
            config,
            platform.audio.clone(),
            platform.overlay.clone(),
        ));
        let dispatcher = Dispatcher::new(config, platform, settings.clone(), alert.clone());

        Self {
            settings,
            whitelist,
            alert,
            dispatcher,
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn whitelist(&self) -> &WhitelistStore {
        &self.whitelist
    }

    /// The alert player, for wiring the overlay's dismiss control
    pub fn alert(&self) -> &AlertPlayer {
        &self.alert
    }

    pub async fn handle(&self, sms: &InboundSms) -> ProcessOutcome {
        debug!(sender = %sms.sender, "SMS received");

        if !AccessGate::new(&self.settings, &self.whitelist).is_allowed(&sms.sender) {
            debug!("Sender not in whitelist, ignoring message");
            return ProcessOutcome::NotAllowed;
        }

        let password = match self.settings.ensure_password() {
            Ok(password) => password,
            Err(e) => {
                error!("Failed to read command password: {}", e);
                return ProcessOutcome::Unavailable;
            }
        };

        let prefix = match self.settings.prefix() {
            Ok(prefix) => prefix,
            Err(e) => {
                error!("Failed to read command prefix: {}", e);
                return ProcessOutcome::Unavailable;
            }
        };

        let raw = match strip_prefix(&sms.body, &prefix) {
            Some(raw) => raw,
            None => {
                debug!("Message without command prefix, ignoring");
                return ProcessOutcome::NotACommand;
            }
        };

        match parse_and_authenticate(raw, &password) {
            Ok(command) => {
                ProcessOutcome::Dispatched(self.dispatcher.dispatch(&command, &sms.sender).await)
            }
            Err(auth_error) => {
                info!(sender = %sms.sender, "Command rejected: {}", auth_error);
                let reply = match auth_error {
                    AuthError::MissingPassword => handlers::MISSING_PASSWORD,
                    AuthError::InvalidPassword => handlers::INVALID_PASSWORD,
                };
                self.dispatcher.responder().send(&sms.sender, reply);
                ProcessOutcome::Rejected(auth_error)
            }
        }
    }
}
