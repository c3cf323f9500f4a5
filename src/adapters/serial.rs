use crate::domain::model::{LineSettings, Parity, PortDescriptor};
use crate::domain::ports::{DeviceOpener, DeviceStream, PortEnumerator};
use crate::utils::error::PortError;
use serialport::{DataBits, SerialPort, SerialPortInfo, SerialPortType, StopBits};
use std::io::Read;

fn to_serialport_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn to_serialport_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

/// Human-readable summary of what sits behind a port (USB ids, manufacturer, product).
fn describe(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let mut desc = format!("USB (VID: 0x{:04x}, PID: 0x{:04x})", usb.vid, usb.pid);
            if let Some(manufacturer) = &usb.manufacturer {
                desc.push_str(&format!(" {}", manufacturer));
            }
            if let Some(product) = &usb.product {
                desc.push_str(&format!(" {}", product));
            }
            desc
        }
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::Unknown => "Unknown".to_string(),
    }
}

fn map_open_error(port: &str, error: serialport::Error) -> PortError {
    use std::io::ErrorKind as IoKind;

    match error.kind() {
        serialport::ErrorKind::NoDevice => PortError::NotFound {
            port: port.to_string(),
        },
        serialport::ErrorKind::Io(IoKind::NotFound) => PortError::NotFound {
            port: port.to_string(),
        },
        serialport::ErrorKind::Io(IoKind::PermissionDenied) => PortError::PermissionDenied {
            port: port.to_string(),
        },
        _ if error.description.to_ascii_lowercase().contains("busy") => PortError::Busy {
            port: port.to_string(),
        },
        _ => PortError::Open {
            port: port.to_string(),
            message: error.description,
        },
    }
}

/// Enumerates the host's serial ports through the `serialport` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortEnumerator;

impl PortEnumerator for SerialPortEnumerator {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, PortError> {
        let ports = serialport::available_ports().map_err(|e| PortError::Enumerate {
            message: e.to_string(),
        })?;

        Ok(ports
            .iter()
            .map(|info| PortDescriptor {
                name: info.port_name.clone(),
                description: describe(info),
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

impl DeviceOpener for SerialOpener {
    fn open(&self, port: &str, line: &LineSettings) -> Result<DeviceStream, PortError> {
        let handle = serialport::new(port, line.baud_rate)
            .data_bits(to_serialport_data_bits(line.data_bits))
            .parity(to_serialport_parity(line.parity))
            .stop_bits(to_serialport_stop_bits(line.stop_bits))
            .timeout(line.read_timeout)
            .open()
            .map_err(|e| map_open_error(port, e))?;

        // stale bytes from before this connection are not part of any frame we want
        if let Err(e) = handle.clear(serialport::ClearBuffer::Input) {
            tracing::debug!("Could not clear input buffer on {}: {}", port, e);
        }

        Ok(Box::new(SerialDevice { port: handle }))
    }
}

/// Open serial port as a plain byte stream. Closed on drop.
struct SerialDevice {
    port: Box<dyn SerialPort>,
}

impl Read for SerialDevice {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_setting_conversions() {
        assert!(matches!(to_serialport_parity(Parity::Even), serialport::Parity::Even));
        assert!(matches!(to_serialport_data_bits(7), DataBits::Seven));
        assert!(matches!(to_serialport_data_bits(9), DataBits::Eight));
        assert!(matches!(to_serialport_stop_bits(2), StopBits::Two));
    }

    #[test]
    fn test_open_error_mapping() {
        let err = map_open_error(
            "/dev/ttyUSB0",
            serialport::Error::new(serialport::ErrorKind::NoDevice, "gone"),
        );
        assert_eq!(
            err,
            PortError::NotFound {
                port: "/dev/ttyUSB0".to_string()
            }
        );

        let err = map_open_error(
            "/dev/ttyUSB0",
            serialport::Error::new(
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
                "Permission denied",
            ),
        );
        assert!(matches!(err, PortError::PermissionDenied { .. }));

        let err = map_open_error(
            "/dev/ttyUSB0",
            serialport::Error::new(serialport::ErrorKind::Unknown, "Device or resource busy"),
        );
        assert!(matches!(err, PortError::Busy { .. }));
    }

    #[test]
    fn test_describe_usb_port() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyUSB0".to_string(),
            port_type: SerialPortType::UsbPort(serialport::UsbPortInfo {
                vid: 0x0403,
                pid: 0x6001,
                serial_number: None,
                manufacturer: Some("FTDI".to_string()),
                product: Some("FT232R".to_string()),
            }),
        };
        assert_eq!(describe(&info), "USB (VID: 0x0403, PID: 0x6001) FTDI FT232R");
    }
}
