use crate::domain::decimal::Decimal;
use crate::utils::error::DecodeError;
use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Mm,
    Inch,
}

impl Unit {
    /// Recognises the unit suffixes a micrometer may append to a frame.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "mm" => Some(Unit::Mm),
            "in" | "inch" | "inches" => Some(Unit::Inch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Mm => "mm",
            Unit::Inch => "inch",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub value: Decimal,
    pub unit: Option<Unit>,
    pub timestamp: DateTime<Utc>,
    pub raw_line: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictStatus {
    Pass,
    Fail,
    Unknown,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Pass => "PASS",
            VerdictStatus::Fail => "FAIL",
            VerdictStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one reading against one rule set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    /// Label of the matched rule, `None` when nothing matched.
    pub rule_id: Option<String>,
    /// Signed distance to the nearest threshold: positive inside the matched rule,
    /// negative outside every rule.
    pub margin: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Parity setting for the serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    /// Accepts both spelled-out names and the one-letter codes used on instrument manuals.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "n" => Some(Parity::None),
            "odd" | "o" => Some(Parity::Odd),
            "even" | "e" => Some(Parity::Even),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// Line parameters applied when a port is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub read_timeout: Duration,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            read_timeout: Duration::from_millis(1000),
        }
    }
}

impl fmt::Display for LineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} baud {}{}{}",
            self.baud_rate,
            self.data_bits,
            self.parity.code(),
            self.stop_bits
        )
    }
}

/// A port as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampZone {
    #[default]
    Local,
    Utc,
}

impl TimestampZone {
    pub fn format(&self, ts: &DateTime<Utc>) -> String {
        match self {
            TimestampZone::Utc => ts.to_rfc3339_opts(SecondsFormat::Millis, true),
            TimestampZone::Local => ts
                .with_timezone(&Local)
                .to_rfc3339_opts(SecondsFormat::Millis, false),
        }
    }
}

/// Header row of the measurement log, in column order.
pub const LOG_HEADER: [&str; 8] = [
    "sequence_number",
    "timestamp",
    "raw_line",
    "decoded_value",
    "unit",
    "verdict_status",
    "rule_id",
    "margin",
];

/// On-disk row of the measurement log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub sequence_number: u64,
    pub timestamp: String,
    pub raw_line: String,
    pub decoded_value: String,
    pub unit: String,
    pub verdict_status: String,
    pub rule_id: String,
    pub margin: String,
}

impl LogRecord {
    pub fn new(sequence_number: u64, reading: &Reading, verdict: &Verdict, zone: TimestampZone) -> Self {
        Self {
            sequence_number,
            timestamp: zone.format(&reading.timestamp),
            raw_line: reading.raw_line.clone(),
            decoded_value: reading.value.to_string(),
            unit: reading.unit.map(|u| u.to_string()).unwrap_or_default(),
            verdict_status: verdict.status.to_string(),
            rule_id: verdict.rule_id.clone().unwrap_or_default(),
            margin: verdict.margin.map(|m| m.to_string()).unwrap_or_default(),
        }
    }
}

/// Events published by the acquisition loop, in the order they happen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
        port: Option<String>,
        detail: Option<String>,
    },
    Measured {
        /// `None` while the reading waits in the persistence backlog.
        sequence: Option<u64>,
        reading: Reading,
        verdict: Verdict,
    },
    /// A reading published earlier with no sequence number has reached the log.
    BacklogWritten {
        sequence: u64,
        reading: Reading,
    },
    DecodeFailed {
        error: DecodeError,
    },
    SinkFailed {
        error: String,
        consecutive_failures: u32,
        pending: usize,
    },
}
