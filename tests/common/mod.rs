#![allow(dead_code)]

use lsm_logger::app::protocols::FirstNumberParser;
use lsm_logger::core::acquisition::{AcquisitionLoop, AcquisitionSettings, StatusReporter, StopSignal};
use lsm_logger::core::classifier::Classifier;
use lsm_logger::core::decoder::{FrameDecoder, LineEnding};
use lsm_logger::core::port_resolver::PortResolver;
use lsm_logger::domain::decimal::Decimal;
use lsm_logger::domain::model::{LineSettings, PortDescriptor, Reading, StatusEvent, Verdict};
use lsm_logger::domain::ports::{DeviceOpener, DeviceStream, PortEnumerator, ReadingSink};
use lsm_logger::domain::rules::{Rule, RuleOutcome, RuleSet, RuleSetHandle};
use lsm_logger::utils::error::{PortError, SinkError};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const PORT: &str = "/dev/ttyUSB0";

/// One scripted result of `read` on a fake device.
#[derive(Debug, Clone)]
pub enum Step {
    Data(&'static [u8]),
    Timeout,
    Fail(io::ErrorKind),
    Eof,
    /// Requests a stop, then behaves like a read timeout.
    Stop,
}

pub struct FakeEnumerator;

impl PortEnumerator for FakeEnumerator {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, PortError> {
        Ok(vec![PortDescriptor {
            name: PORT.to_string(),
            description: "fake".to_string(),
        }])
    }
}

/// Each `open` consumes the next script; once none are left, opening fails.
#[derive(Clone)]
pub struct ScriptedOpener {
    scripts: Arc<Mutex<VecDeque<Vec<Step>>>>,
    pub opens: Arc<AtomicUsize>,
    stop: StopSignal,
}

impl ScriptedOpener {
    pub fn new(scripts: Vec<Vec<Step>>, stop: &StopSignal) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            opens: Arc::new(AtomicUsize::new(0)),
            stop: stop.clone(),
        }
    }
}

impl DeviceOpener for ScriptedOpener {
    fn open(&self, port: &str, _line: &LineSettings) -> Result<DeviceStream, PortError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front().ok_or(PortError::Busy {
            port: port.to_string(),
        })?;
        Ok(Box::new(ScriptedDevice {
            steps: script.into(),
            stop: self.stop.clone(),
        }))
    }
}

struct ScriptedDevice {
    steps: VecDeque<Step>,
    stop: StopSignal,
}

impl Read for ScriptedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.steps.pop_front() {
            Some(Step::Data(bytes)) => {
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(bytes.len())
            }
            Some(Step::Timeout) => {
                std::thread::sleep(Duration::from_millis(1));
                Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"))
            }
            Some(Step::Fail(kind)) => Err(io::Error::new(kind, "device error")),
            Some(Step::Eof) | None => Ok(0),
            Some(Step::Stop) => {
                self.stop.stop();
                Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"))
            }
        }
    }
}

/// In-memory sink that can be told to fail a number of appends first.
#[derive(Clone, Default)]
pub struct MemorySink {
    pub records: Arc<Mutex<Vec<(u64, Reading, Verdict)>>>,
    failures_left: Arc<AtomicU32>,
}

impl MemorySink {
    pub fn failing(times: u32) -> Self {
        let sink = Self::default();
        sink.failures_left.store(times, Ordering::SeqCst);
        sink
    }

    pub fn values(&self) -> Vec<(u64, String)> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(seq, reading, _)| (*seq, reading.value.to_string()))
            .collect()
    }
}

impl ReadingSink for MemorySink {
    fn append(&mut self, reading: &Reading, verdict: &Verdict) -> Result<u64, SinkError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            if left != u32::MAX {
                self.failures_left.store(left - 1, Ordering::SeqCst);
            }
            return Err(SinkError::Io {
                path: "memory".to_string(),
                source: io::Error::other("disk full"),
            });
        }
        let mut records = self.records.lock().unwrap();
        let sequence = records.len() as u64 + 1;
        records.push((sequence, reading.clone(), verdict.clone()));
        Ok(sequence)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

pub fn d(s: &str) -> Decimal {
    Decimal::parse(s).unwrap()
}

pub fn ok_rules() -> RuleSet {
    RuleSet::new(
        vec![Rule::new("OK", Some(d("0.0")), Some(d("2.0")), RuleOutcome::Pass)],
        3,
    )
    .unwrap()
}

pub fn fast_settings() -> AcquisitionSettings {
    AcquisitionSettings {
        backoff_min: Duration::from_millis(1),
        backoff_max: Duration::from_millis(4),
        ..AcquisitionSettings::default()
    }
}

pub type TestLoop = AcquisitionLoop<FakeEnumerator, ScriptedOpener, MemorySink>;

pub fn build_loop(
    opener: ScriptedOpener,
    sink: MemorySink,
    settings: AcquisitionSettings,
) -> (TestLoop, mpsc::Receiver<StatusEvent>) {
    build_loop_with_channel(opener, sink, settings, 1024)
}

pub fn build_loop_with_channel(
    opener: ScriptedOpener,
    sink: MemorySink,
    settings: AcquisitionSettings,
    capacity: usize,
) -> (TestLoop, mpsc::Receiver<StatusEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    let resolver = PortResolver::new(FakeEnumerator, &[r"^/dev/ttyUSB\d+$".to_string()]).unwrap();
    let decoder = FrameDecoder::new(Arc::new(FirstNumberParser::new()), LineEnding::Crlf, 256);
    let acquisition = AcquisitionLoop::new(
        resolver,
        opener,
        decoder,
        Classifier::new(RuleSetHandle::new(ok_rules())),
        sink,
        StatusReporter::new(tx),
        settings,
    );
    (acquisition, rx)
}

pub fn drain(rx: &mut mpsc::Receiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
