//! Bluetooth Module
//!
//! Provides the BLE link to the RFduino receiver on the vehicle.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Channel                           │
//! │  (Connection lifecycle - public API for the session)     │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │ Transport / Link
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌──────────────────┐     ┌───────────────────┐
//! │ RfduinoTransport │     │ LoopbackTransport │
//! │ - scan by name   │     │ - logs frames     │
//! │ - GATT write     │     │ - tests           │
//! └──────────────────┘     └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`channel`] - Connection state machine and best-effort send
//! - [`loopback`] - In-process transport
//! - `rfduino` - WinRT transport (Windows only)

pub mod channel;
pub mod loopback;
#[cfg(windows)]
pub mod rfduino;

use async_trait::async_trait;
use thiserror::Error;

pub use channel::Channel;

/// Name the RFduino advertises. It is burnt into the receiver firmware.
/// If two receivers with this name are in range, which one gets picked is
/// up to the BLE stack.
pub const DEFAULT_DEVICE_NAME: &str = "pfcontr";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The stack refused the connect request.
    #[error("{0}")]
    Rejected(String),
    #[error("device {0} not found")]
    NotFound(String),
    #[error("platform error: {0}")]
    Platform(String),
    #[error("write failed: {0}")]
    Write(String),
}

impl TransportError {
    /// Short code shown after "Disconnected: " on the status display.
    pub fn code(&self) -> String {
        self.to_string()
    }
}

/// An established link that frames can be written to.
pub trait Link: Send {
    fn write_data(&self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// The BLE stack, reduced to what the channel needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the peripheral advertising `device_name`. May never
    /// complete if the device does not show up.
    async fn connect(&self, device_name: &str) -> Result<Box<dyn Link>, TransportError>;

    /// Release whatever the stack holds for us. Safe to call repeatedly.
    fn close(&self);
}
