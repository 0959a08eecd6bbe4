// src/notify/relay.rs
//! Flashlight on a serial USB relay board.

use super::RelayController;
use crate::error::{AlarmError, Result};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// "Set relay" opcode of the USB relay board
const SET_RELAY: u8 = 0xFF;
/// The board has a single relay
const RELAY_NUMBER: u8 = 0x01;

/// Command bytes that switch the relay on or off
pub fn relay_command(on: bool) -> [u8; 3] {
    [SET_RELAY, RELAY_NUMBER, u8::from(on)]
}

/// Flashlight wired to a serial USB relay.
///
/// Every switch opens the device node, writes one command and closes it
/// again, all under one lock so the escalation engine and manual overrides
/// never interleave on the serial line.
#[derive(Debug)]
pub struct SerialRelay {
    device_node: PathBuf,
    /// Last state written successfully; `None` until the first switch
    state: Mutex<Option<bool>>,
}

impl SerialRelay {
    /// Relay on `device_node`, e.g. `/dev/ttyUSB0`
    pub fn new(device_node: impl AsRef<Path>) -> Self {
        Self {
            device_node: device_node.as_ref().to_path_buf(),
            state: Mutex::new(None),
        }
    }

    /// Serial device node the commands are written to
    pub fn device_node(&self) -> &Path {
        &self.device_node
    }

    /// Last state applied to the relay, if any
    pub fn state(&self) -> Option<bool> {
        *self.state.lock()
    }

    fn switch(&self, on: bool) -> Result<()> {
        let mut state = self.state.lock();
        if *state == Some(on) {
            return Ok(());
        }

        let mut device = OpenOptions::new()
            .write(true)
            .open(&self.device_node)
            .map_err(|e| {
                AlarmError::Relay(format!(
                    "Cannot open serial interface {}: {}",
                    self.device_node.display(),
                    e
                ))
            })?;
        device
            .write_all(&relay_command(on))
            .map_err(|e| AlarmError::Relay(format!("Cannot write to serial interface: {}", e)))?;

        *state = Some(on);
        info!("Flash light {}", if on { "on" } else { "off" });
        Ok(())
    }
}

impl RelayController for SerialRelay {
    fn switch_on(&self) -> Result<()> {
        self.switch(true)
    }

    fn switch_off(&self) -> Result<()> {
        self.switch(false)
    }
}
