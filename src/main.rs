//! Where's My Device daemon - Rust implementation
//!
//! CLI for the whitelist and command settings, plus a message loop that feeds
//! inbound SMS through the command processor on a simulated device.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use wheres_my_device_rs::config::Config;
use wheres_my_device_rs::platform::simulated::SimulatedDevice;
use wheres_my_device_rs::platform::{Capabilities, Capability, FeatureSet, Location, Platform};
use wheres_my_device_rs::processor::{CommandProcessor, InboundSms};
use wheres_my_device_rs::settings::SettingsStore;
use wheres_my_device_rs::whitelist::{normalize_number, WhitelistStore};
use wheres_my_device_rs::{Error, Result};

/// Where's My Device - SMS remote-command daemon
#[derive(Parser)]
#[command(name = "wheres-my-device-rs")]
#[command(about = "Locate, ring and control a lost device by SMS (Rust implementation)")]
struct Cli {
    /// Directory holding settings and the whitelist
    #[arg(long, global = true, env = "WMD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Knobs for the simulated device
#[derive(Args, Clone, Default)]
struct DeviceArgs {
    /// Capability to withhold (sms, location, call, overlay, contacts)
    #[arg(long = "deny", value_name = "CAPABILITY")]
    deny: Vec<Capability>,

    /// Last known location, as LAT,LON
    #[arg(long, value_parser = parse_location, allow_hyphen_values = true)]
    location: Option<Location>,

    /// Battery percentage to report
    #[arg(long)]
    battery: Option<u8>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a single inbound SMS
    Receive {
        /// Sender phone number
        #[arg(long)]
        from: String,

        #[command(flatten)]
        device: DeviceArgs,

        /// Message body
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        body: Vec<String>,
    },

    /// Read inbound SMS from stdin, one per line: <sender> <body...>
    ///
    /// Lines of the form `!grant <capability>` or `!deny <capability>`
    /// change the simulated device's permissions instead.
    Run {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Manage the sender whitelist
    Whitelist {
        #[command(subcommand)]
        action: WhitelistAction,
    },

    /// Show or change command settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Show settings, whitelist size and device capabilities
    Status {
        #[command(flatten)]
        device: DeviceArgs,
    },
}

#[derive(Subcommand)]
enum WhitelistAction {
    /// Add a number by hand
    Add {
        /// Phone number
        number: String,

        /// Display name
        #[arg(long, default_value = "")]
        name: String,
    },

    /// Add a number taken from an address book contact
    Import {
        /// Contact name
        name: String,

        /// Contact number as stored in the address book
        number: String,
    },

    /// Show whether a number is whitelisted
    Check {
        /// Phone number, in any format
        number: String,
    },

    /// Remove an entry by id
    Remove {
        /// Entry id
        id: String,
    },

    /// List all entries
    List,

    /// Only accept commands from whitelisted numbers
    Enable,

    /// Accept commands from any number
    Disable,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print current settings
    Show,

    /// Change the command prefix
    SetPrefix {
        prefix: String,
    },

    /// Change the command password
    SetPassword {
        password: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.data_dir {
        Some(dir) => Config::in_dir(dir),
        None => Config::default(),
    };

    // First launch: make sure a command password exists
    SettingsStore::new(&config).ensure_password()?;

    match cli.command {
        Commands::Receive { from, device, body } => {
            cmd_receive(&config, &device, &from, &body.join(" "))
        }
        Commands::Run { device } => cmd_run(&config, &device),
        Commands::Whitelist { action } => cmd_whitelist(&config, action),
        Commands::Settings { action } => cmd_settings(&config, action),
        Commands::Status { device } => cmd_status(&config, &device),
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

fn cmd_receive(config: &Config, args: &DeviceArgs, from: &str, body: &str) -> Result<()> {
    let device = simulated_device(args);
    let processor = CommandProcessor::new(config, Platform::from_device(device.clone()))?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let outcome = processor.handle(&InboundSms::new(from, body)).await;
        print_outbox(&device);
        println!("Outcome: {:?}", outcome);
        wait_for_alert(&processor).await;
    });

    Ok(())
}

fn cmd_run(config: &Config, args: &DeviceArgs) -> Result<()> {
    info!("Where's My Device daemon starting (Rust)");

    let device = simulated_device(args);
    let processor = CommandProcessor::new(config, Platform::from_device(device.clone()))?;
    info!(
        "Loaded {} whitelist entries",
        processor.whitelist().list_all()?.len()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut changes = processor.settings().subscribe();
        tokio::spawn(async move {
            while let Ok(change) = changes.recv().await {
                info!(?change, "Settings changed");
            }
        });

        if let Some(mut permissions) = device.watch() {
            tokio::spawn(async move {
                while let Ok(change) = permissions.recv().await {
                    let verb = if change.granted { "granted" } else { "revoked" };
                    info!("Permission {} {}", change.capability, verb);
                }
            });
        }

        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(control) = line.strip_prefix('!') {
                match apply_permission(&device, control) {
                    Ok(change) => println!("{}", change),
                    Err(e) => warn!("Ignoring control line {}: {}", line, e),
                }
                continue;
            }

            let (sender, body) = match line.split_once(char::is_whitespace) {
                Some(parts) => parts,
                None => {
                    warn!("Ignoring line without a message body: {}", line);
                    continue;
                }
            };

            let outcome = processor.handle(&InboundSms::new(sender, body.trim())).await;
            debug!(?outcome, "Message processed");
            print_outbox(&device);
        }

        wait_for_alert(&processor).await;
        Ok::<_, Error>(())
    })?;

    info!("Input closed, daemon stopping");
    Ok(())
}

fn cmd_whitelist(config: &Config, action: WhitelistAction) -> Result<()> {
    let whitelist = WhitelistStore::open(config)?;
    let settings = SettingsStore::new(config);

    match action {
        WhitelistAction::Add { number, name } => {
            let entry = whitelist.add(&number, &name)?;
            println!("Whitelisted {} ({})", entry.phone_number, entry.id);
        }
        WhitelistAction::Import { name, number } => {
            let entry = whitelist.import_contact(&name, &number)?;
            println!("Imported {} {} ({})", entry.name, entry.phone_number, entry.id);
        }
        WhitelistAction::Check { number } => match whitelist.find_by_number(&number)? {
            Some(entry) => {
                let name = if entry.name.is_empty() { "-" } else { &entry.name };
                println!("{} is whitelisted as {} ({})", entry.phone_number, name, entry.id);
            }
            None => println!("{} is not whitelisted", normalize_number(&number)),
        },
        WhitelistAction::Remove { id } => {
            if !whitelist.delete(&id)? {
                return Err(Error::EntryNotFound(id));
            }
            println!("Removed {}", id);
        }
        WhitelistAction::List => {
            let entries = whitelist.list_all()?;
            if entries.is_empty() {
                println!("Whitelist is empty");
            }
            for entry in entries {
                let name = if entry.name.is_empty() { "-" } else { &entry.name };
                println!("{}  {}  {}", entry.id, entry.phone_number, name);
            }
        }
        WhitelistAction::Enable => {
            settings.set_whitelist_enabled(true)?;
            println!("Whitelist enabled");
        }
        WhitelistAction::Disable => {
            settings.set_whitelist_enabled(false)?;
            println!("Whitelist disabled");
        }
    }

    Ok(())
}

fn cmd_settings(config: &Config, action: SettingsAction) -> Result<()> {
    let settings = SettingsStore::new(config);

    match action {
        SettingsAction::Show => {
            let current = settings.load()?;
            println!("Command prefix:    {}", current.command_prefix);
            println!("Command password:  {}", current.command_password);
            println!(
                "Whitelist:         {}",
                if current.whitelist_enabled { "enabled" } else { "disabled" }
            );
        }
        SettingsAction::SetPrefix { prefix } => {
            settings.set_prefix(&prefix)?;
            println!("Command prefix set to {}", prefix.trim());
        }
        SettingsAction::SetPassword { password } => {
            if password.trim().is_empty() || password.chars().any(char::is_whitespace) {
                return Err(Error::Config(
                    "password must be a single non-empty word".to_string(),
                ));
            }
            settings.set_password(&password)?;
            println!("Command password updated");
        }
    }

    Ok(())
}

fn cmd_status(config: &Config, args: &DeviceArgs) -> Result<()> {
    let settings = SettingsStore::new(config).load()?;
    let whitelist = WhitelistStore::open(config)?;
    let device = simulated_device(args);
    let features = FeatureSet::query(device.as_ref());

    println!("Data directory: {}", config.data_dir.display());
    println!("Command prefix: {}", settings.command_prefix);
    println!(
        "Whitelist: {} ({} entries)",
        if settings.whitelist_enabled { "enabled" } else { "disabled" },
        whitelist.list_all()?.len()
    );
    println!("Granted: {}", join(&features.granted));
    println!("Missing: {}", join(&features.missing));

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn simulated_device(args: &DeviceArgs) -> Arc<SimulatedDevice> {
    let device = Arc::new(SimulatedDevice::new());
    for capability in &args.deny {
        device.set_capability(*capability, false);
    }
    device.set_last_known(args.location);
    if let Some(percent) = args.battery {
        device.set_battery(Some(percent), false);
    }
    device
}

fn print_outbox(device: &SimulatedDevice) {
    for sms in device.take_outbox() {
        if sms.multipart {
            println!("SMS to {} ({} parts):", sms.destination, sms.parts.len());
        } else {
            println!("SMS to {}:", sms.destination);
        }
        println!("{}", sms.text());
    }
}

/// Keep the runtime alive while an alert rings; Ctrl+C dismisses it
async fn wait_for_alert(processor: &CommandProcessor) {
    if !processor.alert().is_playing() {
        return;
    }

    println!("Alert ringing (Ctrl+C to dismiss)");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                processor.alert().dismiss();
                println!("Alert dismissed");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if !processor.alert().is_playing() {
                    println!("Alert finished");
                    break;
                }
            }
        }
    }
}

/// `grant <capability>` or `deny <capability>`
fn apply_permission(device: &SimulatedDevice, control: &str) -> Result<String> {
    let mut words = control.split_whitespace();
    let granted = match words.next() {
        Some("grant") => true,
        Some("deny") => false,
        _ => return Err(Error::Config("expected grant or deny".to_string())),
    };
    let capability: Capability = words
        .next()
        .ok_or_else(|| Error::Config("missing capability".to_string()))?
        .parse()?;

    device.set_capability(capability, granted);
    Ok(format!(
        "Permission {}: {}",
        capability,
        if device.has(capability) { "granted" } else { "denied" }
    ))
}

fn parse_location(value: &str) -> std::result::Result<Location, String> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got {}", value))?;
    let latitude: f64 = lat.trim().parse().map_err(|e| format!("latitude: {}", e))?;
    let longitude: f64 = lon.trim().parse().map_err(|e| format!("longitude: {}", e))?;
    Ok(Location {
        latitude,
        longitude,
    })
}

fn join(capabilities: &[Capability]) -> String {
    if capabilities.is_empty() {
        return "none".to_string();
    }
    capabilities
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        let location = parse_location("52.52, -13.4").unwrap();
        assert_eq!(location.latitude, 52.52);
        assert_eq!(location.longitude, -13.4);
    }

    #[test]
    fn test_parse_location_invalid() {
        assert!(parse_location("52.52").is_err());
        assert!(parse_location("north,south").is_err());
    }

    #[test]
    fn test_join_capabilities() {
        assert_eq!(join(&[]), "none");
        assert_eq!(join(&[Capability::Sms, Capability::Call]), "sms, call");
    }

    #[test]
    fn test_apply_permission() {
        let device = SimulatedDevice::new();
        let mut changes = device.watch().unwrap();

        assert_eq!(
            apply_permission(&device, "deny location").unwrap(),
            "Permission location: denied"
        );
        assert!(!device.has(Capability::Location));
        assert!(!changes.try_recv().unwrap().granted);

        assert!(apply_permission(&device, "grant Location").is_ok());
        assert!(device.has(Capability::Location));
    }

    #[test]
    fn test_apply_permission_invalid() {
        let device = SimulatedDevice::new();
        assert!(apply_permission(&device, "revoke call").is_err());
        assert!(apply_permission(&device, "deny").is_err());
        assert!(apply_permission(&device, "deny camera").is_err());
        assert!(device.has(Capability::Call));
    }

    #[test]
    fn test_simulated_device_knobs() {
        let args = DeviceArgs {
            deny: vec![Capability::Call],
            location: None,
            battery: Some(10),
        };
        let device = simulated_device(&args);
        assert!(!device.has(Capability::Call));
        assert!(device.has(Capability::Location));
    }

    #[test]
    fn test_cli_parses_receive() {
        let cli = Cli::try_parse_from([
            "wheres-my-device-rs",
            "receive",
            "--from",
            "+1555",
            "--deny",
            "location",
            "WMD",
            "ping",
            "pw",
        ])
        .unwrap();
        match cli.command {
            Commands::Receive { from, device, body } => {
                assert_eq!(from, "+1555");
                assert_eq!(device.deny, vec![Capability::Location]);
                assert_eq!(body.join(" "), "WMD ping pw");
            }
            _ => panic!("expected receive"),
        }
    }
}
