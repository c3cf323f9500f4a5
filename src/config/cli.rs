use crate::config::toml_config::AppConfig;
use crate::domain::model::TimestampZone;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "lsm-logger")]
#[command(about = "Reads a laser scan micrometer over serial, classifies and logs every reading")]
pub struct CliConfig {
    /// TOML configuration file (defaults to ./lsm-logger.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, help = "List serial ports and exit")]
    pub list_ports: bool,

    /// Serial port to use, e.g. /dev/ttyUSB0 or COM3
    #[arg(short, long)]
    pub port: Option<String>,

    #[arg(long, help = "Open --port even when enumeration does not list it")]
    pub force_port: bool,

    #[arg(long)]
    pub baud: Option<u32>,

    #[arg(long)]
    pub data_bits: Option<u8>,

    /// none | odd | even (N/O/E accepted)
    #[arg(long)]
    pub parity: Option<String>,

    #[arg(long)]
    pub stop_bits: Option<u8>,

    /// Read timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// CSV log path
    #[arg(long)]
    pub csv: Option<String>,

    #[arg(long, help = "Write log timestamps in UTC instead of local time")]
    pub utc: bool,

    #[arg(long, help = "Read from a simulated micrometer instead of a serial port")]
    pub simulate: bool,

    #[arg(long, help = "Print status events as JSON lines")]
    pub events_json: bool,

    #[arg(long, help = "Emit diagnostics as JSON")]
    pub log_json: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl CliConfig {
    /// Command line values win over the configuration file.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(port) = &self.port {
            config.serial.port = Some(port.clone());
        }
        if self.force_port {
            config.serial.force_port = true;
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(data_bits) = self.data_bits {
            config.serial.data_bits = data_bits;
        }
        if let Some(parity) = &self.parity {
            config.serial.parity = parity.clone();
        }
        if let Some(stop_bits) = self.stop_bits {
            config.serial.stop_bits = stop_bits;
        }
        if let Some(timeout) = self.timeout_ms {
            config.serial.read_timeout_ms = timeout;
        }
        if let Some(csv) = &self.csv {
            config.logging.csv_path = csv.clone();
        }
        if self.utc {
            config.logging.timestamp_tz = TimestampZone::Utc;
        }
    }
}
