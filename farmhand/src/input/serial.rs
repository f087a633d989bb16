//! Serial input driver.
//!
//! The device speaks a newline-terminated ASCII protocol: one command per
//! line (`b`, `pageup`, `wheel_click`, `click 812 344`, …). The transport
//! is any `Read + Write`; the embedder opens the actual port (default
//! 115200 baud) and hands it over, which keeps this module testable
//! against in-memory pipes.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info};

use crate::errors::AgentError;
use crate::geometry::Point;
use crate::ports::InputDriver;

pub struct SerialInput<T: Read + Write + Send> {
    port: Mutex<BufReader<T>>,
}

impl<T: Read + Write + Send> SerialInput<T> {
    /// Wrap a transport and verify liveness with a `ping`/`pong`
    /// handshake. Steady-state commands do not wait for acknowledgement.
    pub fn connect(transport: T) -> Result<Self, AgentError> {
        let driver = Self {
            port: Mutex::new(BufReader::new(transport)),
        };
        driver.handshake()?;
        Ok(driver)
    }

    /// Wrap a transport without the handshake. For transports that are
    /// known-good or cannot answer (e.g. a command log in tests).
    pub fn connect_unchecked(transport: T) -> Self {
        Self {
            port: Mutex::new(BufReader::new(transport)),
        }
    }

    fn handshake(&self) -> Result<(), AgentError> {
        let mut port = self.port.lock().unwrap();
        port.get_mut().write_all(b"ping\n")?;
        port.get_mut().flush()?;

        let mut line = String::new();
        port.read_line(&mut line)?;
        if line.trim() != "pong" {
            return Err(AgentError::DriverIo(format!(
                "handshake failed: expected 'pong', got {:?}",
                line.trim()
            )));
        }
        info!("serial input driver handshake ok");
        Ok(())
    }
}

impl<T: Read + Write + Send> InputDriver for SerialInput<T> {
    fn send(&self, cmd: &str) -> Result<(), AgentError> {
        // One sender at a time; the lock serializes whole lines so
        // concurrent callers cannot interleave bytes.
        let mut port = self.port.lock().unwrap();
        debug!(cmd, "serial send");
        port.get_mut().write_all(cmd.as_bytes())?;
        port.get_mut().write_all(b"\n")?;
        port.get_mut().flush()?;
        Ok(())
    }

    fn click_at(&self, point: Point) -> Result<(), AgentError> {
        self.send(&format!("click {} {}", point.x, point.y))
    }
}

/// Default settle delay after pointing the mouse somewhere; exposed for
/// embedders that drive the device directly.
pub const CLICK_SETTLE: Duration = Duration::from_millis(30);
