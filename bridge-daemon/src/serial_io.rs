//! Wired channel backends for the daemon

use std::io::{Read, Write};
use std::time::Duration;

use bridge_core::{TransportError, WiredChannel};
use serialport::SerialPort;
use tracing::{debug, info};

use crate::settings::WiredSettings;

/// The wired channel the daemon hands to the bridge
pub enum DaemonWired {
    /// A real serial port
    Serial(SerialWired),
    /// Standard output, no command input
    Stdout(std::io::Stdout),
}

impl DaemonWired {
    /// Open the configured port, or standard output when none is set
    pub fn open(settings: &WiredSettings) -> Result<Self, serialport::Error> {
        if settings.port.is_empty() {
            info!("No serial port configured, writing to standard output");
            return Ok(DaemonWired::Stdout(std::io::stdout()));
        }
        SerialWired::open(settings).map(DaemonWired::Serial)
    }
}

impl WiredChannel for DaemonWired {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match self {
            DaemonWired::Serial(serial) => serial.write_all(bytes),
            DaemonWired::Stdout(stdout) => {
                let mut lock = stdout.lock();
                lock.write_all(bytes)?;
                lock.flush()?;
                Ok(())
            }
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self {
            DaemonWired::Serial(serial) => serial.read_available(buf),
            DaemonWired::Stdout(_) => Ok(0),
        }
    }
}

/// Serial port connection
pub struct SerialWired {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialWired {
    /// Open a serial port
    pub fn open(settings: &WiredSettings) -> Result<Self, serialport::Error> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(Duration::from_millis(settings.read_timeout_ms))
            .open()?;
        info!("Opened {} at {} baud", settings.port, settings.baud_rate);
        Ok(Self {
            port,
            name: settings.port.clone(),
        })
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let pending = self
            .port
            .bytes_to_read()
            .map_err(|e| TransportError::Wired(e.into()))?;
        if pending == 0 {
            return Ok(0);
        }
        match self.port.read(buf) {
            Ok(n) => {
                debug!("Read {} bytes from {}", n, self.name);
                Ok(n)
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
