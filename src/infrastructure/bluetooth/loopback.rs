//! In-process transport.
//!
//! Stands in for the BLE stack on hosts without one: connect requests are
//! answered locally and written frames are logged and kept in a short
//! history.

use crate::infrastructure::bluetooth::{Link, Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Number of written frames remembered.
const HISTORY_LEN: usize = 256;

type FrameLog = Arc<Mutex<VecDeque<Vec<u8>>>>;

#[derive(Debug, Clone)]
enum ConnectBehaviour {
    Accept,
    Reject(String),
    Hang,
}

pub struct LoopbackTransport {
    behaviour: ConnectBehaviour,
    frames: FrameLog,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl LoopbackTransport {
    /// Accepts every connect request.
    pub fn new() -> Self {
        Self::with_behaviour(ConnectBehaviour::Accept)
    }

    /// Rejects every connect request with `code`.
    pub fn rejecting(code: impl Into<String>) -> Self {
        Self::with_behaviour(ConnectBehaviour::Reject(code.into()))
    }

    /// Never answers a connect request.
    pub fn hanging() -> Self {
        Self::with_behaviour(ConnectBehaviour::Hang)
    }

    fn with_behaviour(behaviour: ConnectBehaviour) -> Self {
        Self {
            behaviour,
            frames: Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_LEN))),
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// Most recent frames written through any link, oldest first.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames
            .lock()
            .map(|frames| frames.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::Relaxed)
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&self, device_name: &str) -> Result<Box<dyn Link>, TransportError> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        match &self.behaviour {
            ConnectBehaviour::Accept => {
                info!("Loopback link to {} established", device_name);
                Ok(Box::new(LoopbackLink {
                    frames: Arc::clone(&self.frames),
                }))
            }
            ConnectBehaviour::Reject(code) => Err(TransportError::Rejected(code.clone())),
            ConnectBehaviour::Hang => std::future::pending().await,
        }
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }
}

struct LoopbackLink {
    frames: FrameLog,
}

impl Link for LoopbackLink {
    fn write_data(&self, bytes: &[u8]) -> Result<(), TransportError> {
        debug!("TX {:02X?}", bytes);
        let mut frames = self
            .frames
            .lock()
            .map_err(|_| TransportError::Write("frame log poisoned".to_string()))?;
        if frames.len() == HISTORY_LEN {
            frames.pop_front();
        }
        frames.push_back(bytes.to_vec());
        Ok(())
    }
}
