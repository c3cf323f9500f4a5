use serde::Serialize;
use thiserror::Error;

/// Serial endpoint failures. Retried with backoff by the acquisition loop, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortError {
    #[error("No serial port found matching the configured patterns")]
    NoPortFound,

    #[error("Serial port not found: {port}")]
    NotFound { port: String },

    #[error("Permission denied opening {port}")]
    PermissionDenied { port: String },

    #[error("Serial port {port} is busy")]
    Busy { port: String },

    #[error("Failed to open {port}: {message}")]
    Open { port: String, message: String },

    #[error("Failed to enumerate serial ports: {message}")]
    Enumerate { message: String },
}

/// Per-frame decode failures. The frame is skipped and the pipeline continues.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeError {
    #[error("Unparseable frame {line:?}: {reason}")]
    UnparseableFrame { line: String, reason: String },

    #[error("Frame exceeded {limit} bytes without a terminator (dropped at {length} bytes)")]
    FrameTooLong { length: usize, limit: usize },
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Log file error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV encoding error: {message}")]
    Csv { message: String },

    #[error("Persistence failed {failures} times in a row ({pending} readings not persisted): {last}")]
    TooManyFailures {
        failures: u32,
        pending: usize,
        last: String,
    },
}

impl From<csv::Error> for SinkError {
    fn from(e: csv::Error) -> Self {
        SinkError::Csv {
            message: e.to_string(),
        }
    }
}

/// Startup configuration failures. Fatal before any acquisition begins.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Configuration parse error: {message}")]
    Parse { message: String },

    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Malformed rule {label:?}: {reason}")]
    MalformedRule { label: String, reason: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },
}

#[derive(Error, Debug)]
pub enum LsmError {
    #[error("Port error: {0}")]
    Port(#[from] PortError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Device,
    Protocol,
    Storage,
    Configuration,
    System,
}

impl LsmError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LsmError::Port(_) => ErrorCategory::Device,
            LsmError::Decode(_) => ErrorCategory::Protocol,
            LsmError::Sink(_) => ErrorCategory::Storage,
            LsmError::Config(_) => ErrorCategory::Configuration,
            LsmError::IoError(_) => ErrorCategory::System,
        }
    }

    /// Process exit code for a terminal failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LsmError::Sink(_) => 3,
            _ => 1,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            LsmError::Port(PortError::NoPortFound) => {
                "No micrometer serial port was found".to_string()
            }
            LsmError::Port(e) => format!("Serial port problem: {}", e),
            LsmError::Decode(e) => format!("Could not decode instrument output: {}", e),
            LsmError::Sink(e) => format!("Could not write the measurement log: {}", e),
            LsmError::Config(e) => format!("Invalid configuration: {}", e),
            LsmError::IoError(e) => format!("System I/O failure: {}", e),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            LsmError::Port(PortError::PermissionDenied { .. }) => {
                "Add your user to the dialout (Linux) group or run with sufficient privileges"
            }
            LsmError::Port(PortError::Busy { .. }) => {
                "Close any other program that has the serial port open"
            }
            LsmError::Port(_) => {
                "Plug in the USB-RS232 adapter, or run --list-ports and pass --port"
            }
            LsmError::Decode(_) => "Check the protocol type and line ending in the configuration",
            LsmError::Sink(_) => "Check free disk space and write permission on the CSV log path",
            LsmError::Config(_) => "Fix the configuration file or command line and start again",
            LsmError::IoError(_) => "Check file permissions and available disk space",
        }
    }
}

pub type Result<T> = std::result::Result<T, LsmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let config: LsmError = ConfigError::Missing {
            field: "serial.port".to_string(),
        }
        .into();
        assert_eq!(config.exit_code(), 1);
        assert_eq!(config.category(), ErrorCategory::Configuration);

        let sink: LsmError = SinkError::TooManyFailures {
            failures: 3,
            pending: 2,
            last: "disk full".to_string(),
        }
        .into();
        assert_eq!(sink.exit_code(), 3);
    }

    #[test]
    fn test_decode_error_serializes_with_kind_tag() {
        let err = DecodeError::FrameTooLong {
            length: 300,
            limit: 256,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "frame_too_long");
        assert_eq!(json["limit"], 256);
    }
}
