//! Remote control for a LEGO Power Functions vehicle driven through an
//! RFduino BLE receiver.
//!
//! Data flow:
//!
//! ```text
//! joystick ─▶ control mapping ─▶ dispatch loop ─▶ command encoder ─▶ channel ─▶ BLE
//!                                                                      │
//!                                               status display ◀──────┘
//! ```

pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod session;
