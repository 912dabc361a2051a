//! Turnstile controller link.
//!
//! The controller speaks single bytes over a serial device: `1` opens the
//! gate for one pass, `0` is a keepalive, and `i` asks it to identify itself
//! with a fixed line of text.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Request an identification line from the controller.
pub const IDENTIFY_BYTE: u8 = b'i';

/// One per-cycle command to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnstileSignal {
    Open,
    Keepalive,
}

impl TurnstileSignal {
    pub fn from_decision(should_open: bool) -> Self {
        if should_open {
            Self::Open
        } else {
            Self::Keepalive
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Open => b'1',
            Self::Keepalive => b'0',
        }
    }
}

#[derive(Debug, Error)]
pub enum TurnstileError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("turnstile I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected identify reply: expected {expected:?}, got {got:?}")]
    UnexpectedReply { expected: String, got: String },
}

/// Handle on the controller's serial device.
pub struct TurnstileLink {
    device_path: PathBuf,
    expected_reply: String,
    device: File,
}

impl TurnstileLink {
    /// Open the device read/write. Line settings are left as the system configured them.
    pub fn open(device_path: &Path, expected_reply: &str) -> Result<Self, TurnstileError> {
        let device = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(device_path)
            .map_err(|source| TurnstileError::Open {
                path: device_path.display().to_string(),
                source,
            })?;

        tracing::info!(device = %device_path.display(), "turnstile device opened");

        Ok(Self {
            device_path: device_path.to_path_buf(),
            expected_reply: expected_reply.to_string(),
            device,
        })
    }

    /// Ask the controller to identify and check the reply line.
    pub fn identify(&mut self) -> Result<(), TurnstileError> {
        self.device.write_all(&[IDENTIFY_BYTE])?;
        self.device.flush()?;

        let mut reply = String::new();
        BufReader::new(&self.device).read_line(&mut reply)?;
        let reply = reply.trim();

        if reply != self.expected_reply {
            return Err(TurnstileError::UnexpectedReply {
                expected: self.expected_reply.clone(),
                got: reply.to_string(),
            });
        }

        tracing::debug!(device = %self.device_path.display(), "turnstile identified");
        Ok(())
    }

    pub fn send(&mut self, signal: TurnstileSignal) -> Result<(), TurnstileError> {
        self.device.write_all(&[signal.as_byte()])?;
        self.device.flush()?;
        Ok(())
    }

    pub fn device_path(&self) -> &Path {
        &self.device_path
    }
}
