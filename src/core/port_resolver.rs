use crate::domain::model::PortDescriptor;
use crate::domain::ports::PortEnumerator;
use crate::utils::error::{ConfigError, PortError};
use regex::Regex;

/// Device names of USB-serial adapters and USB-modem style instruments, per platform.
pub fn default_port_patterns() -> Vec<String> {
    let patterns: &[&str] = if cfg!(target_os = "windows") {
        &[r"^COM\d+$"]
    } else if cfg!(target_os = "macos") {
        &[
            r"^/dev/cu\.usbserial",
            r"^/dev/cu\.usbmodem",
            r"^/dev/cu\.SLAB_USBtoUART",
            r"^/dev/cu\.wchusbserial",
        ]
    } else {
        &[r"^/dev/ttyUSB\d+$", r"^/dev/ttyACM\d+$"]
    };
    patterns.iter().map(|p| p.to_string()).collect()
}

/// Selects the serial endpoint for each connection attempt.
///
/// Nothing is cached: ports come and go with USB adapters, so every call enumerates again.
pub struct PortResolver<E: PortEnumerator> {
    enumerator: E,
    patterns: Vec<Regex>,
    force_hint: bool,
}

impl<E: PortEnumerator> PortResolver<E> {
    pub fn new(enumerator: E, patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidValue {
                    field: "serial.port_patterns".to_string(),
                    value: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enumerator,
            patterns,
            force_hint: false,
        })
    }

    /// Use an explicit hint even when enumeration does not list it (pseudo-terminals,
    /// socat bridges).
    pub fn force_hint(mut self, force: bool) -> Self {
        self.force_hint = force;
        self
    }

    /// All enumerable ports, sorted lexicographically.
    pub fn list_candidates(&self) -> Result<Vec<String>, PortError> {
        let mut names: Vec<String> = self
            .enumerator
            .available_ports()?
            .into_iter()
            .map(|p| p.name)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub fn describe_ports(&self) -> Result<Vec<PortDescriptor>, PortError> {
        let mut ports = self.enumerator.available_ports()?;
        ports.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ports)
    }

    pub fn resolve(&self, hint: Option<&str>) -> Result<String, PortError> {
        let candidates = match self.list_candidates() {
            Ok(c) => c,
            // a forced port does not depend on enumeration working
            Err(e) if self.force_hint && hint.is_some() => {
                tracing::debug!("Port enumeration failed ({}), using forced port", e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        if let Some(hint) = hint {
            if candidates.iter().any(|c| c == hint) {
                return Ok(hint.to_string());
            }
            if self.force_hint {
                return Ok(hint.to_string());
            }
            tracing::warn!(
                "Configured port {} is not available, falling back to auto-detection",
                hint
            );
        }

        candidates
            .into_iter()
            .find(|name| self.patterns.iter().any(|re| re.is_match(name)))
            .ok_or(PortError::NoPortFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeEnumerator {
        ports: Arc<Mutex<Vec<&'static str>>>,
        calls: Arc<Mutex<usize>>,
    }

    impl FakeEnumerator {
        fn with(ports: &[&'static str]) -> Self {
            let fake = Self::default();
            *fake.ports.lock().unwrap() = ports.to_vec();
            fake
        }
    }

    impl PortEnumerator for FakeEnumerator {
        fn available_ports(&self) -> Result<Vec<PortDescriptor>, PortError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self
                .ports
                .lock()
                .unwrap()
                .iter()
                .map(|p| PortDescriptor {
                    name: p.to_string(),
                    description: "test".to_string(),
                })
                .collect())
        }
    }

    fn linux_patterns() -> Vec<String> {
        vec![r"^/dev/ttyUSB\d+$".to_string(), r"^/dev/ttyACM\d+$".to_string()]
    }

    #[test]
    fn test_candidates_sorted_and_reenumerated() {
        let fake = FakeEnumerator::with(&["/dev/ttyUSB1", "/dev/ttyS0", "/dev/ttyACM0"]);
        let resolver = PortResolver::new(fake.clone(), &linux_patterns()).unwrap();

        assert_eq!(
            resolver.list_candidates().unwrap(),
            vec!["/dev/ttyACM0", "/dev/ttyS0", "/dev/ttyUSB1"]
        );

        fake.ports.lock().unwrap().push("/dev/ttyUSB0");
        assert_eq!(resolver.list_candidates().unwrap().len(), 4);
        assert_eq!(*fake.calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_auto_selects_first_matching_lexicographically() {
        let fake = FakeEnumerator::with(&["/dev/ttyUSB1", "/dev/ttyS0", "/dev/ttyUSB0"]);
        let resolver = PortResolver::new(fake, &linux_patterns()).unwrap();
        assert_eq!(resolver.resolve(None).unwrap(), "/dev/ttyUSB0");
    }

    #[test]
    fn test_enumerable_hint_wins_even_without_pattern_match() {
        let fake = FakeEnumerator::with(&["/dev/ttyS0", "/dev/ttyUSB0"]);
        let resolver = PortResolver::new(fake, &linux_patterns()).unwrap();
        assert_eq!(resolver.resolve(Some("/dev/ttyS0")).unwrap(), "/dev/ttyS0");
    }

    #[test]
    fn test_missing_hint_falls_back_unless_forced() {
        let fake = FakeEnumerator::with(&["/dev/ttyUSB3"]);
        let resolver = PortResolver::new(fake.clone(), &linux_patterns()).unwrap();
        assert_eq!(resolver.resolve(Some("/dev/pts/4")).unwrap(), "/dev/ttyUSB3");

        let forced = PortResolver::new(fake, &linux_patterns()).unwrap().force_hint(true);
        assert_eq!(forced.resolve(Some("/dev/pts/4")).unwrap(), "/dev/pts/4");
    }

    #[test]
    fn test_no_match_is_no_port_found() {
        let fake = FakeEnumerator::with(&["/dev/ttyS0", "/dev/ttyS1"]);
        let resolver = PortResolver::new(fake, &linux_patterns()).unwrap();
        assert_eq!(resolver.resolve(None), Err(PortError::NoPortFound));
        assert_eq!(resolver.resolve(Some("/dev/ttyUSB9")), Err(PortError::NoPortFound));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = PortResolver::new(FakeEnumerator::default(), &["(".to_string()]).err();
        assert!(matches!(err, Some(ConfigError::InvalidValue { .. })));
    }
}
