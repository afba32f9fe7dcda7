//! CLI for the BenTech hub
//!
//! Scans for the hub and drives the chunked stream operations: info dump,
//! WiFi provisioning, subscription upload, accessory re-scan, and a push
//! test through the relay.

use clap::{Parser, Subcommand};

use bentech_ble_controller::settings::{
    JsonSettings, SettingsStore, WIFI_PASSWORD_KEY, WIFI_SSID_KEY,
};
use bentech_ble_controller::transport::{self, BleTransport};
use bentech_ble_controller::HubSession;
use bentech_notify::RelayClient;

#[derive(Parser)]
#[command(name = "bentech")]
#[command(about = "BenTech hub client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for BenTech hubs
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Connect and print the hub's info snapshot
    Info {
        /// Device name or address to connect to
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Send WiFi credentials to the hub
    Wifi {
        /// Device name or address to connect to
        #[arg(short, long)]
        device: Option<String>,
        /// Credentials file (SSID on line 1, password on line 2); falls
        /// back to the saved settings
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Tell the hub to drop its WiFi connection
    DisconnectWifi {
        /// Device name or address to connect to
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Upload a push subscription to the hub
    Subscribe {
        /// Device name or address to connect to
        #[arg(short, long)]
        device: Option<String>,
        /// Subscription JSON file
        #[arg(short, long)]
        file: String,
    },
    /// Ask the hub to re-scan its accessory devices
    Rescan {
        /// Device name or address to connect to
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Send a test alert through the push relay
    Notify {
        /// Push relay endpoint URL
        #[arg(short, long)]
        relay: String,
        /// Alert message
        #[arg(short, long)]
        message: String,
        /// Subscription JSON file
        #[arg(short, long)]
        subscription: String,
    },
}

type Session = HubSession<BleTransport, JsonSettings>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { duration } => scan(duration).await?,
        Commands::Info { device } => info(device).await?,
        Commands::Wifi { device, file } => wifi(device, file).await?,
        Commands::DisconnectWifi { device } => disconnect_wifi(device).await?,
        Commands::Subscribe { device, file } => subscribe(device, file).await?,
        Commands::Rescan { device } => rescan(device).await?,
        Commands::Notify { relay, message, subscription } => {
            notify(relay, message, subscription).await?
        }
    }

    Ok(())
}

async fn scan(duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    println!("Scanning for BenTech hubs ({} seconds)...", duration);

    let devices = transport::scan(duration).await?;

    println!("\nFound {} devices:", devices.len());
    for device in devices {
        let rssi = device
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string());
        let marker = if device.is_hub { " [HUB]" } else { "" };

        println!("  {} ({}) RSSI: {}{}", device.name, device.address, rssi, marker);
    }

    Ok(())
}

async fn open_session(device: Option<String>) -> Result<Session, Box<dyn std::error::Error>> {
    println!("Scanning for the hub...");
    let peripheral = transport::find_hub(device.as_deref()).await?;

    println!("Connecting...");
    let link = BleTransport::connect(peripheral).await?;
    println!("Connected!");

    let settings = JsonSettings::open(&JsonSettings::home_dir())?;
    Ok(HubSession::new(link, settings))
}

async fn close_session(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    session.link().disconnect().await?;
    println!("Disconnected");
    Ok(())
}

async fn info(device: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(device).await?;

    let info = session.fetch_info().await?;
    println!("WiFi connected: {}", info.wifi_connected);
    println!(
        "Push subscription: {}",
        if info.subscription.is_some() { "stored" } else { "none" }
    );
    println!("Devices:");
    for device in &info.devices {
        println!("  {}", device);
    }

    close_session(&session).await
}

fn read_wifi_credentials(file: &str) -> Result<(String, String), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let mut lines = content.lines();
    let ssid = lines.next().ok_or("Missing SSID in credentials file")?.trim().to_string();
    let password = lines.next().ok_or("Missing password in credentials file")?.trim().to_string();
    Ok((ssid, password))
}

async fn wifi(
    device: Option<String>,
    file: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (ssid, password) = match file {
        Some(file) => read_wifi_credentials(&file)?,
        None => {
            let settings = JsonSettings::open(&JsonSettings::home_dir())?;
            let ssid = settings
                .get(WIFI_SSID_KEY)
                .ok_or("No saved SSID; pass --file")?;
            let password = settings
                .get(WIFI_PASSWORD_KEY)
                .ok_or("No saved password; pass --file")?;
            (ssid, password)
        }
    };

    let session = open_session(device).await?;

    println!("Sending WiFi credentials...");
    println!("  SSID: {}", ssid);

    if session.send_wifi_data(&ssid, &password).await? {
        println!("Hub accepted the credentials and is connecting to WiFi.");
    } else {
        println!("Hub rejected the credentials.");
    }

    close_session(&session).await
}

async fn disconnect_wifi(device: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(device).await?;

    session.disconnect_wifi().await?;
    println!("Hub told to drop its WiFi connection.");

    close_session(&session).await
}

async fn subscribe(device: Option<String>, file: String) -> Result<(), Box<dyn std::error::Error>> {
    let subscription: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&file)?)?;

    let session = open_session(device).await?;

    session.send_subscription(&subscription).await?;
    println!("Subscription sent to the hub.");

    close_session(&session).await
}

async fn rescan(device: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(device).await?;

    println!("Re-scanning accessory devices...");
    let devices = session.rescan_devices().await?;

    println!("Connected devices:");
    for device in &devices {
        println!("  {}", device);
    }

    close_session(&session).await
}

async fn notify(
    relay: String,
    message: String,
    subscription: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let subscription: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&subscription)?)?;

    let client = RelayClient::new(relay);
    client.send(&message, &subscription).await?;
    println!("Push accepted by the relay.");

    Ok(())
}
