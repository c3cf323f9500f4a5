use crate::config::toml_config::SimulatorConfig;
use crate::domain::decimal::Decimal;
use crate::domain::model::{LineSettings, PortDescriptor};
use crate::domain::ports::{DeviceOpener, DeviceStream, PortEnumerator};
use crate::utils::error::PortError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, Read};
use std::time::{Duration, Instant};

pub const SIMULATED_PORT: &str = "SIM0";

/// Decimal places the simulated instrument prints.
const SIM_DECIMALS: u32 = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedEnumerator;

impl PortEnumerator for SimulatedEnumerator {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, PortError> {
        Ok(vec![PortDescriptor {
            name: SIMULATED_PORT.to_string(),
            description: "Simulated laser scan micrometer".to_string(),
        }])
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedOpener {
    config: SimulatorConfig,
    max_readings: Option<u64>,
}

impl SimulatedOpener {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            max_readings: None,
        }
    }

    /// End the stream (as if unplugged) after `count` readings per connection.
    pub fn with_max_readings(mut self, count: u64) -> Self {
        self.max_readings = Some(count);
        self
    }
}

impl DeviceOpener for SimulatedOpener {
    fn open(&self, port: &str, line: &LineSettings) -> Result<DeviceStream, PortError> {
        if port != SIMULATED_PORT {
            return Err(PortError::NotFound {
                port: port.to_string(),
            });
        }
        let device = SimulatedDevice::new(&self.config, line.read_timeout, self.max_readings)?;
        Ok(Box::new(device))
    }
}

/// Emits `+0.11234\r\n`-style lines at a fixed interval. Between lines a read waits at most
/// the read timeout and then fails with `TimedOut`, like a real port.
struct SimulatedDevice {
    rng: StdRng,
    standard: i64,
    spread: i64,
    interval: Duration,
    read_timeout: Duration,
    next_due: Instant,
    pending: Vec<u8>,
    remaining: Option<u64>,
}

impl SimulatedDevice {
    fn new(config: &SimulatorConfig, read_timeout: Duration, remaining: Option<u64>) -> Result<Self, PortError> {
        let out_of_range = || PortError::Open {
            port: SIMULATED_PORT.to_string(),
            message: "simulator standard or spread out of range".to_string(),
        };
        let standard = scaled_mantissa(config.standard).ok_or_else(out_of_range)?;
        let spread = scaled_mantissa(config.spread).ok_or_else(out_of_range)?.abs();

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            rng,
            standard,
            spread,
            interval: Duration::from_millis(config.interval_ms.max(1)),
            read_timeout,
            next_due: Instant::now(),
            pending: Vec::new(),
            remaining,
        })
    }

    fn next_line(&mut self) -> Vec<u8> {
        let offset = self.rng.gen_range(-self.spread..=self.spread);
        let value = Decimal::new(self.standard + offset, SIM_DECIMALS);
        let sign = if value.is_negative() { "" } else { "+" };
        format!("{}{}\r\n", sign, value).into_bytes()
    }
}

/// Mantissa of `value` at the simulator's fixed number of decimals.
fn scaled_mantissa(value: Decimal) -> Option<i64> {
    let rounded = value.round_half_up(SIM_DECIMALS);
    let factor = 10i64.checked_pow(SIM_DECIMALS - rounded.scale())?;
    i64::try_from(rounded.mantissa()).ok()?.checked_mul(factor)
}

impl Read for SimulatedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            if self.remaining == Some(0) {
                return Ok(0);
            }

            let now = Instant::now();
            if now < self.next_due {
                let wait = self.next_due - now;
                if wait > self.read_timeout {
                    std::thread::sleep(self.read_timeout);
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no reading yet"));
                }
                std::thread::sleep(wait);
            }

            self.next_due += self.interval;
            self.pending = self.next_line();
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> SimulatorConfig {
        SimulatorConfig {
            interval_ms: 1,
            seed: Some(seed),
            ..SimulatorConfig::default()
        }
    }

    fn read_all(mut device: DeviceStream) -> String {
        let mut out = String::new();
        device.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_lines_stay_within_spread() {
        let opener = SimulatedOpener::new(config(7)).with_max_readings(50);
        let device = opener.open(SIMULATED_PORT, &LineSettings::default()).unwrap();
        let output = read_all(device);

        let lines: Vec<&str> = output.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 50);
        let low = Decimal::parse("0.098").unwrap();
        let high = Decimal::parse("0.122").unwrap();
        for line in lines {
            assert!(line.starts_with('+'), "line {:?}", line);
            let value = Decimal::parse(line).unwrap();
            assert_eq!(value.scale(), 5);
            assert!(value >= low && value <= high, "value {}", value);
        }
    }

    #[test]
    fn test_seed_makes_output_repeatable() {
        let a = SimulatedOpener::new(config(42)).with_max_readings(5);
        let b = SimulatedOpener::new(config(42)).with_max_readings(5);
        let line = LineSettings::default();
        assert_eq!(
            read_all(a.open(SIMULATED_PORT, &line).unwrap()),
            read_all(b.open(SIMULATED_PORT, &line).unwrap())
        );
    }

    #[test]
    fn test_read_times_out_between_readings() {
        let slow = SimulatorConfig {
            interval_ms: 10_000,
            seed: Some(1),
            ..SimulatorConfig::default()
        };
        let line = LineSettings {
            read_timeout: Duration::from_millis(5),
            ..LineSettings::default()
        };
        let mut device = SimulatedOpener::new(slow).open(SIMULATED_PORT, &line).unwrap();

        let mut buf = [0u8; 64];
        // first reading is due immediately
        assert!(device.read(&mut buf).unwrap() > 0);
        let err = device.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_unknown_port_is_not_found() {
        let opener = SimulatedOpener::new(config(1));
        assert!(matches!(
            opener.open("/dev/ttyUSB0", &LineSettings::default()),
            Err(PortError::NotFound { .. })
        ));
    }
}
