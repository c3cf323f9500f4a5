use crate::domain::decimal::Decimal;
use crate::domain::model::{LineSettings, PortDescriptor, Reading, Unit, Verdict};
use crate::utils::error::{DecodeError, PortError, SinkError};
use std::io::Read;

/// An open device: a byte stream whose reads return within the configured timeout.
///
/// `Ok(0)` means end of stream, `ErrorKind::TimedOut` / `WouldBlock` mean no data yet, and
/// any other error means the device is gone.
pub type DeviceStream = Box<dyn Read + Send>;

pub trait PortEnumerator: Send {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, PortError>;
}

pub trait DeviceOpener: Send {
    fn open(&self, port: &str, line: &LineSettings) -> Result<DeviceStream, PortError>;
}

/// Value extracted from one frame by a [`FrameParser`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    pub value: Decimal,
    /// Unit encoded in the frame itself, if any.
    pub unit: Option<Unit>,
}

/// Tokenization rule for one instrument output mode: one trimmed, non-empty line in, one
/// value or decode error out.
pub trait FrameParser: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, line: &str) -> Result<ParsedFrame, DecodeError>;
}

/// Append-only store of classified readings.
pub trait ReadingSink: Send {
    /// Persists one record and returns its sequence number.
    fn append(&mut self, reading: &Reading, verdict: &Verdict) -> Result<u64, SinkError>;
    fn flush(&mut self) -> Result<(), SinkError>;
}
