//! BLE Connection Channel
//!
//! Owns the link to the RFduino and reports every state change as an
//! [`AppEvent::ConnectionState`].
//!
//! The channel does not detect connection losses. [`Channel::is_connected`]
//! only tells whether a link handle was obtained, there is no heartbeat and
//! no automatic reconnect. A connect attempt that never completes leaves
//! the channel in `Connecting` until it is closed.

use crate::domain::models::{AppEvent, ConnectionState};
use crate::domain::protocol::CommandSink;
use crate::infrastructure::bluetooth::{Link, Transport, DEFAULT_DEVICE_NAME};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Link handle plus the number of the attempt allowed to install one.
///
/// Every release bumps `attempt` under the same lock the connect task takes
/// to store its handle, so an attempt that finishes after a close finds a
/// stale number and backs off.
#[derive(Default)]
struct LinkSlot {
    link: Option<Box<dyn Link>>,
    attempt: u64,
}

type SharedSlot = Arc<Mutex<LinkSlot>>;

fn lock_slot(slot: &Mutex<LinkSlot>) -> MutexGuard<'_, LinkSlot> {
    // The slot holds no invariant a panicking writer could break.
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Channel {
    transport: Arc<dyn Transport>,
    slot: SharedSlot,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    pending: Option<JoinHandle<()>>,
}

impl Channel {
    /// Create a channel and immediately start connecting.
    ///
    /// The connect request is issued after `settle_delay`. Must be called
    /// from within a tokio runtime.
    pub fn open(
        transport: Arc<dyn Transport>,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        settle_delay: Duration,
    ) -> Self {
        let mut channel = Self {
            transport,
            slot: Arc::new(Mutex::new(LinkSlot::default())),
            event_sender,
            pending: None,
        };
        channel.connect(settle_delay);
        channel
    }

    fn connect(&mut self, settle_delay: Duration) {
        let attempt = self.release();
        self.notify(ConnectionState::Connecting);
        info!("Connecting to {}...", DEFAULT_DEVICE_NAME);

        let transport = Arc::clone(&self.transport);
        let slot = Arc::clone(&self.slot);
        let sender = self.event_sender.clone();

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(settle_delay).await;
            let result = transport.connect(DEFAULT_DEVICE_NAME).await;

            // Notify while holding the slot so a concurrent close() can only
            // report Disconnected after this outcome, never before it.
            let mut guard = lock_slot(&slot);
            if guard.attempt != attempt {
                debug!("Connect attempt {} finished after close, discarding", attempt);
                return;
            }
            let state = match result {
                Ok(handle) => {
                    guard.link = Some(handle);
                    info!("Connected to {}", DEFAULT_DEVICE_NAME);
                    ConnectionState::Connected
                }
                Err(e) => {
                    warn!("Connection to {} failed: {}", DEFAULT_DEVICE_NAME, e);
                    ConnectionState::Disconnected(Some(e.code()))
                }
            };
            let _ = sender.send(AppEvent::ConnectionState(state));
        }));
    }

    /// Disconnect from the receiver. Safe to call when already closed, the
    /// listener is told `Disconnected` every time.
    pub fn close(&mut self) {
        self.release();
        info!("Disconnected from {}", DEFAULT_DEVICE_NAME);
        self.notify(ConnectionState::Disconnected(None));
    }

    /// Cancel a pending attempt and drop the link handle, without notifying.
    /// Returns the number of the next attempt.
    fn release(&mut self) -> u64 {
        let attempt = self.invalidate();
        self.transport.close();
        attempt
    }

    /// Abort the pending task and retire its attempt number. A task that is
    /// already past its last await is stopped by the number, not the abort.
    fn invalidate(&mut self) -> u64 {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        let mut guard = lock_slot(&self.slot);
        guard.link = None;
        guard.attempt = guard.attempt.wrapping_add(1);
        guard.attempt
    }

    /// True iff a link handle is held. Says nothing about whether the radio
    /// link is still alive.
    pub fn is_connected(&self) -> bool {
        lock_slot(&self.slot).link.is_some()
    }

    /// Write `bytes` to the link. Silently dropped while not connected.
    pub fn send(&self, bytes: &[u8]) {
        let guard = lock_slot(&self.slot);
        match guard.link.as_ref() {
            Some(link) => match link.write_data(bytes) {
                Ok(()) => trace!("Sent {:02X?}", bytes),
                Err(e) => debug!("Dropped {:02X?}: {}", bytes, e),
            },
            None => trace!("Dropped {:02X?}, not connected", bytes),
        }
    }

    fn notify(&self, state: ConnectionState) {
        let _ = self.event_sender.send(AppEvent::ConnectionState(state));
    }
}

impl CommandSink for Channel {
    fn is_connected(&self) -> bool {
        Channel::is_connected(self)
    }

    fn send(&self, bytes: &[u8]) {
        Channel::send(self, bytes)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::loopback::LoopbackTransport;
    use crate::infrastructure::bluetooth::TransportError;
    use async_trait::async_trait;
    use tokio::sync::oneshot;
    use tokio::time::sleep;

    const SETTLE: Duration = Duration::from_millis(500);

    fn drain(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<ConnectionState> {
        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::ConnectionState(state) = event {
                states.push(state);
            }
        }
        states
    }

    fn open(transport: &Arc<LoopbackTransport>) -> (Channel, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport: Arc<dyn Transport> = transport.clone();
        (Channel::open(transport, tx, SETTLE), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_success_order() {
        let transport = Arc::new(LoopbackTransport::new());
        let (channel, mut rx) = open(&transport);

        assert_eq!(drain(&mut rx), vec![ConnectionState::Connecting]);
        assert!(!channel.is_connected());

        sleep(SETTLE + Duration::from_millis(1)).await;

        assert_eq!(drain(&mut rx), vec![ConnectionState::Connected]);
        assert!(channel.is_connected());
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_connect_request_before_settle_delay() {
        let transport = Arc::new(LoopbackTransport::new());
        let (channel, mut rx) = open(&transport);

        sleep(SETTLE - Duration::from_millis(10)).await;
        assert_eq!(transport.connect_count(), 0);
        assert!(!channel.is_connected());
        assert_eq!(drain(&mut rx), vec![ConnectionState::Connecting]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_reports_code() {
        let transport = Arc::new(LoopbackTransport::rejecting("133"));
        let (channel, mut rx) = open(&transport);

        sleep(SETTLE * 2).await;

        let states = drain(&mut rx);
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Disconnected(Some("133".to_string())),
            ]
        );
        assert_eq!(states[1].to_string(), "Disconnected: 133");
        assert!(!channel.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let transport = Arc::new(LoopbackTransport::new());
        let (mut channel, mut rx) = open(&transport);
        sleep(SETTLE * 2).await;
        drain(&mut rx);

        channel.close();
        assert_eq!(drain(&mut rx), vec![ConnectionState::Disconnected(None)]);
        assert!(!channel.is_connected());

        channel.close();
        assert_eq!(drain(&mut rx), vec![ConnectionState::Disconnected(None)]);
        assert!(!channel.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_only_while_connected() {
        let transport = Arc::new(LoopbackTransport::new());
        let (mut channel, _rx) = open(&transport);

        channel.send(&[0x06, 0x00]);
        assert!(transport.frames().is_empty());

        sleep(SETTLE * 2).await;
        channel.send(&[0x04, 0x07]);
        assert_eq!(transport.frames(), vec![vec![0x04, 0x07]]);

        channel.close();
        channel.send(&[0x03, 0x00]);
        assert_eq!(transport.frames(), vec![vec![0x04, 0x07]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_connect_stays_connecting() {
        let transport = Arc::new(LoopbackTransport::hanging());
        let (mut channel, mut rx) = open(&transport);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(drain(&mut rx), vec![ConnectionState::Connecting]);
        assert!(!channel.is_connected());

        channel.close();
        assert_eq!(drain(&mut rx), vec![ConnectionState::Disconnected(None)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_attempt() {
        let transport = Arc::new(LoopbackTransport::new());
        let (mut channel, mut rx) = open(&transport);

        channel.close();
        sleep(SETTLE * 2).await;

        assert_eq!(
            drain(&mut rx),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Disconnected(None),
            ]
        );
        assert!(!channel.is_connected());
        assert_eq!(transport.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_releases_transport() {
        let transport = Arc::new(LoopbackTransport::new());
        let (mut channel, _rx) = open(&transport);
        let opened = transport.close_count();

        channel.close();
        channel.close();
        assert_eq!(transport.close_count(), opened + 2);
    }

    struct NullLink;

    impl Link for NullLink {
        fn write_data(&self, _bytes: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
    }

    /// Holds its worker thread inside `connect` until the gate opens, so the
    /// attempt can't be cancelled at an await point.
    struct GatedTransport {
        entered: Mutex<Option<oneshot::Sender<()>>>,
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn connect(&self, _device_name: &str) -> Result<Box<dyn Link>, TransportError> {
            if let Some(entered) = self.entered.lock().unwrap().take() {
                let _ = entered.send(());
            }
            let _ = self.gate.lock().unwrap().recv();
            Ok(Box::new(NullLink))
        }

        fn close(&self) {}
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_wins_over_connect_finishing_late() {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel();
        let transport: Arc<dyn Transport> = Arc::new(GatedTransport {
            entered: Mutex::new(Some(entered_tx)),
            gate: Mutex::new(gate_rx),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut channel = Channel::open(transport, tx, Duration::ZERO);

        entered_rx.await.unwrap();
        channel.close();
        gate_tx.send(()).unwrap();
        sleep(Duration::from_millis(100)).await;

        assert!(!channel.is_connected());
        assert_eq!(
            drain(&mut rx),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Disconnected(None),
            ]
        );
    }
}
