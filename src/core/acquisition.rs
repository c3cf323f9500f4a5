use crate::core::classifier::Classifier;
use crate::core::decoder::FrameDecoder;
use crate::core::port_resolver::PortResolver;
use crate::domain::model::{ConnectionState, LineSettings, Reading, StatusEvent, Verdict};
use crate::domain::ports::{DeviceOpener, DeviceStream, PortEnumerator, ReadingSink};
use crate::utils::error::{DecodeError, PortError, Result, SinkError};
use serde::Serialize;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Longest a backoff wait sleeps before looking at the stop flag again.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Cooperative stop request shared between the control side and the acquisition thread.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleeps up to `duration`. Returns `true` as soon as a stop is requested.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
        }
    }
}

/// Exponential reconnect delay, doubling from `min` up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// Best-effort publisher for the presentation layer. Never blocks: when the channel is
/// full or closed the event is dropped and counted.
#[derive(Debug)]
pub struct StatusReporter {
    tx: Option<mpsc::Sender<StatusEvent>>,
    dropped: u64,
}

impl StatusReporter {
    pub fn new(tx: mpsc::Sender<StatusEvent>) -> Self {
        Self {
            tx: Some(tx),
            dropped: 0,
        }
    }

    pub fn disabled() -> Self {
        Self { tx: None, dropped: 0 }
    }

    pub fn publish(&mut self, event: StatusEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::trace!("Status channel full, event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped += 1;
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub port_hint: Option<String>,
    pub line: LineSettings,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Consecutive failed appends after which the loop gives up.
    pub max_sink_failures: u32,
    pub read_buffer_size: usize,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            port_hint: None,
            line: LineSettings::default(),
            backoff_min: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            max_sink_failures: 3,
            read_buffer_size: 256,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionSummary {
    pub readings: u64,
    pub persisted: u64,
    pub decode_errors: u64,
    pub connections: u64,
    pub disconnects: u64,
    pub dropped_events: u64,
    pub last_sequence: Option<u64>,
}

enum SessionEnd {
    Stopped,
    Disconnected(String),
}

/// Connection lifecycle plus the read → decode → classify → persist chain.
///
/// Everything runs on the calling thread. Each reading is classified and persisted before
/// the next read, which keeps sink sequence numbers in arrival order.
pub struct AcquisitionLoop<E: PortEnumerator, O: DeviceOpener, S: ReadingSink> {
    resolver: PortResolver<E>,
    opener: O,
    decoder: FrameDecoder,
    classifier: Classifier,
    sink: S,
    status: StatusReporter,
    settings: AcquisitionSettings,
    state: ConnectionState,
    backlog: VecDeque<(Reading, Verdict)>,
    sink_failures: u32,
    summary: AcquisitionSummary,
}

impl<E: PortEnumerator, O: DeviceOpener, S: ReadingSink> AcquisitionLoop<E, O, S> {
    pub fn new(
        resolver: PortResolver<E>,
        opener: O,
        decoder: FrameDecoder,
        classifier: Classifier,
        sink: S,
        status: StatusReporter,
        settings: AcquisitionSettings,
    ) -> Self {
        Self {
            resolver,
            opener,
            decoder,
            classifier,
            sink,
            status,
            settings,
            state: ConnectionState::Disconnected,
            backlog: VecDeque::new(),
            sink_failures: 0,
            summary: AcquisitionSummary::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    /// Runs until `stop` is requested or persistence fails for good.
    pub fn run(&mut self, stop: &StopSignal) -> Result<AcquisitionSummary> {
        tracing::info!(
            "🚀 Acquisition started (parser: {}, line: {})",
            self.decoder.parser_name(),
            self.settings.line
        );

        let mut result = self.supervise(stop);

        if result.is_ok() && !self.backlog.is_empty() {
            result = self.drain_backlog_on_stop();
        }
        if let Err(e) = self.sink.flush() {
            tracing::warn!("Final log flush failed: {}", e);
        }
        self.transition(ConnectionState::Disconnected, None, Some("stopped".to_string()));

        self.summary.dropped_events = self.status.dropped();
        tracing::info!(
            "🛑 Acquisition stopped: {} readings, {} persisted, {} decode errors",
            self.summary.readings,
            self.summary.persisted,
            self.summary.decode_errors
        );
        result.map(|_| self.summary.clone())
    }

    fn supervise(&mut self, stop: &StopSignal) -> Result<()> {
        let mut backoff = Backoff::new(self.settings.backoff_min, self.settings.backoff_max);

        while !stop.is_stopped() {
            self.transition(ConnectionState::Connecting, None, None);

            let (port, device) = match self.connect() {
                Ok(opened) => opened,
                Err(e) => {
                    tracing::warn!("❌ Connection attempt failed: {}", e);
                    self.transition(ConnectionState::Error, None, Some(e.to_string()));
                    if stop.wait(backoff.next_delay()) {
                        break;
                    }
                    continue;
                }
            };

            backoff.reset();
            self.summary.connections += 1;
            self.decoder.reset();
            self.transition(
                ConnectionState::Connected,
                Some(port.clone()),
                Some(self.settings.line.to_string()),
            );

            // the device handle is released when `pump` returns
            let end = self.pump(device, stop);
            let dropped = self.decoder.reset();
            if dropped > 0 {
                tracing::debug!("Discarded {} bytes of an incomplete frame", dropped);
            }

            match end? {
                SessionEnd::Stopped => break,
                SessionEnd::Disconnected(reason) => {
                    tracing::warn!("🔌 {} disconnected: {}", port, reason);
                    self.summary.disconnects += 1;
                    self.transition(ConnectionState::Disconnected, Some(port), Some(reason));
                    if stop.wait(backoff.next_delay()) {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    fn connect(&mut self) -> std::result::Result<(String, DeviceStream), PortError> {
        let port = self.resolver.resolve(self.settings.port_hint.as_deref())?;
        tracing::debug!("Opening {} at {}", port, self.settings.line);
        let device = self.opener.open(&port, &self.settings.line)?;
        Ok((port, device))
    }

    fn pump(&mut self, mut device: DeviceStream, stop: &StopSignal) -> Result<SessionEnd> {
        let mut buf = vec![0u8; self.settings.read_buffer_size.max(1)];

        loop {
            if stop.is_stopped() {
                return Ok(SessionEnd::Stopped);
            }

            match device.read(&mut buf) {
                Ok(0) => return Ok(SessionEnd::Disconnected("end of stream".to_string())),
                Ok(n) => {
                    for result in self.decoder.feed(&buf[..n]) {
                        self.process(result)?;
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                Err(e) => return Ok(SessionEnd::Disconnected(format!("read failed: {}", e))),
            }
        }
    }

    fn process(&mut self, result: std::result::Result<Reading, DecodeError>) -> Result<()> {
        match result {
            Ok(reading) => {
                let verdict = self.classifier.classify(&reading);
                self.summary.readings += 1;
                tracing::debug!(
                    "📏 {} → {} ({})",
                    reading.value,
                    verdict.status,
                    verdict.rule_id.as_deref().unwrap_or("-")
                );
                let sequence = self.persist(reading.clone(), verdict.clone())?;
                self.status.publish(StatusEvent::Measured {
                    sequence,
                    reading,
                    verdict,
                });
            }
            Err(error) => {
                self.summary.decode_errors += 1;
                tracing::warn!("⚠️ {}", error);
                self.status.publish(StatusEvent::DecodeFailed { error });
            }
        }
        Ok(())
    }

    /// Appends the reading after anything still waiting from earlier failures. Returns the
    /// sequence number once this reading is on disk, `None` if it is queued.
    fn persist(&mut self, reading: Reading, verdict: Verdict) -> Result<Option<u64>> {
        self.backlog.push_back((reading, verdict));

        let mut last = None;
        while let Some((reading, verdict)) = self.backlog.front() {
            match self.sink.append(reading, verdict) {
                Ok(sequence) => {
                    let queued = self.backlog.len() > 1;
                    self.sink_failures = 0;
                    self.record_written(sequence, queued);
                    last = Some(sequence);
                }
                Err(e) => {
                    self.sink_failures += 1;
                    tracing::error!(
                        "💾 Log append failed ({} in a row, {} pending): {}",
                        self.sink_failures,
                        self.backlog.len(),
                        e
                    );
                    self.status.publish(StatusEvent::SinkFailed {
                        error: e.to_string(),
                        consecutive_failures: self.sink_failures,
                        pending: self.backlog.len(),
                    });
                    if self.sink_failures >= self.settings.max_sink_failures {
                        return Err(SinkError::TooManyFailures {
                            failures: self.sink_failures,
                            pending: self.backlog.len(),
                            last: e.to_string(),
                        }
                        .into());
                    }
                    return Ok(None);
                }
            }
        }
        Ok(last)
    }

    /// Pops the front of the backlog after it was appended as `sequence`. Readings that
    /// were queued earlier went out with no sequence, so their number is published now.
    fn record_written(&mut self, sequence: u64, queued: bool) {
        let written = self.backlog.pop_front();
        self.summary.persisted += 1;
        self.summary.last_sequence = Some(sequence);
        if let (true, Some((reading, _))) = (queued, written) {
            tracing::debug!("💾 Backlog reading {} logged as #{}", reading.value, sequence);
            self.status
                .publish(StatusEvent::BacklogWritten { sequence, reading });
        }
    }

    fn drain_backlog_on_stop(&mut self) -> Result<()> {
        while let Some((reading, verdict)) = self.backlog.front() {
            match self.sink.append(reading, verdict) {
                Ok(sequence) => self.record_written(sequence, true),
                Err(e) => {
                    return Err(SinkError::TooManyFailures {
                        failures: self.sink_failures + 1,
                        pending: self.backlog.len(),
                        last: e.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn transition(&mut self, to: ConnectionState, port: Option<String>, detail: Option<String>) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::info!(
            "{} → {}{}",
            from,
            to,
            detail.as_deref().map(|d| format!(" ({})", d)).unwrap_or_default()
        );
        self.status.publish(StatusEvent::StateChanged {
            from,
            to,
            port,
            detail,
        });
    }
}
