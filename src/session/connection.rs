//! # Connection Controller
//!
//! Owns the one live serial link and its frame subscription.
//!
//! ## State Machine
//!
//! ```text
//! Idle -> Discovering -> Connecting -> Connected
//!   ^         |              |            |
//!   |         +--------------+            v
//!   +---------------------------- Disconnecting
//! ```
//!
//! `Connecting -> Idle` on failure, `Discovering -> Idle` when no device is
//! resolved, and any state may go through `Disconnecting -> Idle`.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::device::DeviceIdentity;
use crate::error::PrinterError;
use crate::telemetry::{TelemetryState, reduce};
use crate::transport::{BluetoothAdapter, FrameStream, SerialLink};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Discovering,
    Connecting,
    Connected(DeviceIdentity),
    Disconnecting,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn permits(&self, next: &ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (_, Disconnecting)
                | (Idle, Discovering)
                | (Idle, Connecting)
                | (Discovering, Connecting)
                | (Discovering, Idle)
                | (Connecting, Connected(_))
                | (Connecting, Idle)
                | (Disconnecting, Idle)
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => f.write_str("idle"),
            ConnectionState::Discovering => f.write_str("discovering"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected(device) => write!(f, "connected to {}", device),
            ConnectionState::Disconnecting => f.write_str("disconnecting"),
        }
    }
}

/// The frame pump of the active link.
struct Subscription {
    device: DeviceIdentity,
    pump: JoinHandle<()>,
}

pub struct ConnectionController {
    adapter: Arc<dyn BluetoothAdapter>,
    link: Option<Box<dyn SerialLink>>,
    subscription: Option<Subscription>,
    state: watch::Sender<ConnectionState>,
    telemetry: Arc<watch::Sender<TelemetryState>>,
}

impl ConnectionController {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (telemetry, _) = watch::channel(TelemetryState::new());
        Self {
            adapter,
            link: None,
            subscription: None,
            state,
            telemetry: Arc::new(telemetry),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn watch_telemetry(&self) -> watch::Receiver<TelemetryState> {
        self.telemetry.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some() && self.state.borrow().is_connected()
    }

    /// Device the frame subscription is bound to, if any.
    pub fn subscribed_device(&self) -> Option<&DeviceIdentity> {
        self.subscription.as_ref().map(|s| &s.device)
    }

    fn transition(&self, next: ConnectionState) {
        let current = self.state();
        if !current.permits(&next) {
            warn!("Unexpected connection transition {} -> {}", current, next);
        }
        debug!("Connection state: {} -> {}", current, next);
        self.state.send_replace(next);
    }

    /// Enter `Discovering`, dropping any live connection first.
    pub async fn begin_discovery(&mut self) {
        if self.link.is_some() || self.subscription.is_some() {
            self.disconnect().await;
        }
        self.transition(ConnectionState::Discovering);
    }

    /// Leave `Discovering` after the resolver came back empty-handed.
    pub fn end_discovery(&mut self) {
        if self.state() == ConnectionState::Discovering {
            self.transition(ConnectionState::Idle);
        }
    }

    /// Connect to `device`, replacing any previous connection.
    ///
    /// The previous subscription is torn down and its link closed before
    /// the new attempt. Telemetry restarts from an empty window.
    pub async fn connect(&mut self, device: &DeviceIdentity) -> Result<DeviceIdentity, PrinterError> {
        if self.link.is_some() || self.subscription.is_some() {
            self.disconnect().await;
        }

        self.transition(ConnectionState::Connecting);
        info!("Connecting to {}", device);

        let mut link = match self.adapter.connect(device).await {
            Ok(link) => link,
            Err(e) => {
                warn!("Connection to {} failed: {}", device, e);
                self.transition(ConnectionState::Idle);
                return Err(connection_error(device, e));
            }
        };

        let stream = match link.subscribe() {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Subscribing to {} failed: {}", device, e);
                if let Err(close_err) = link.close().await {
                    debug!("Closing failed link: {}", close_err);
                }
                self.transition(ConnectionState::Idle);
                return Err(connection_error(device, e));
            }
        };

        self.telemetry.send_replace(TelemetryState::new());
        let pump = tokio::spawn(pump_frames(stream, Arc::clone(&self.telemetry)));

        let connected = link.device().clone();
        self.subscription = Some(Subscription {
            device: connected.clone(),
            pump,
        });
        self.link = Some(link);
        self.transition(ConnectionState::Connected(connected.clone()));
        info!("Connected to {}", connected);

        Ok(connected)
    }

    /// Unsubscribe, close the link and return to `Idle`.
    ///
    /// Safe to call in any state, any number of times.
    pub async fn disconnect(&mut self) {
        self.transition(ConnectionState::Disconnecting);

        if let Some(subscription) = self.subscription.take() {
            subscription.pump.abort();
            // Resolves once the pump and its stream are dropped
            let _ = subscription.pump.await;
            debug!("Unsubscribed from {}", subscription.device);
        }

        if let Some(mut link) = self.link.take() {
            let device = link.device().clone();
            match link.close().await {
                Ok(()) => info!("Disconnected from {}", device),
                Err(e) => warn!("Closing link to {} failed: {}", device, e),
            }
        }

        self.transition(ConnectionState::Idle);
    }

    /// Write one blob to the connected device.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), PrinterError> {
        let link = self.link.as_mut().ok_or(PrinterError::NotConnected)?;
        debug!("Writing {} bytes to {}", data.len(), link.device());
        link.write(data).await
    }
}

impl Drop for ConnectionController {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.pump.abort();
        }
    }
}

fn connection_error(device: &DeviceIdentity, err: PrinterError) -> PrinterError {
    match err {
        PrinterError::Connection { .. } => err,
        other => PrinterError::Connection {
            address: device.address.clone(),
            message: other.to_string(),
        },
    }
}

/// Apply every inbound frame to the telemetry state, in arrival order.
///
/// Subscribers are notified once per extracted reading; frames without one
/// leave the state untouched and notify nobody.
async fn pump_frames(mut stream: FrameStream, telemetry: Arc<watch::Sender<TelemetryState>>) {
    while let Some(frame) = stream.next().await {
        telemetry.send_if_modified(|state| {
            let next = reduce(state, &frame);
            if next == *state {
                return false;
            }
            if next.stability.is_stable != state.stability.is_stable {
                match &next.stability.stable_value {
                    Some(value) => info!("Reading stable at {}", value),
                    None => debug!("Reading no longer stable"),
                }
            }
            *state = next;
            true
        });
    }
    debug!("Frame stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::telemetry::{Reading, WINDOW_CAPACITY};
    use crate::transport::memory::MemoryAdapter;
    use pretty_assertions::assert_eq;

    fn printer_a() -> DeviceIdentity {
        DeviceIdentity::new("DC:0D:30:8A:41:7C", "PT-210")
    }

    fn printer_b() -> DeviceIdentity {
        DeviceIdentity::new("66:32:B1:D0:0E:5F", "Scale")
    }

    #[test]
    fn test_permits() {
        use ConnectionState::*;
        assert!(Idle.permits(&Discovering));
        assert!(Discovering.permits(&Connecting));
        assert!(Connecting.permits(&Connected(printer_a())));
        assert!(Connected(printer_a()).permits(&Disconnecting));
        assert!(Disconnecting.permits(&Idle));
        assert!(Connecting.permits(&Idle));

        assert!(!Idle.permits(&Connected(printer_a())));
        assert!(!Connected(printer_a()).permits(&Connecting));
        assert!(!Disconnecting.permits(&Connected(printer_a())));
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let adapter = MemoryAdapter::new();
        let mut controller = ConnectionController::new(Arc::new(adapter.clone()));

        let device = controller.connect(&printer_a()).await.unwrap();
        assert_eq!(device, printer_a());
        assert!(controller.is_connected());
        assert_eq!(controller.state(), ConnectionState::Connected(printer_a()));

        let handle = adapter.device(&printer_a().address);
        assert_eq!(handle.open_links(), 1);
        assert_eq!(handle.active_subscriptions(), 1);

        controller.disconnect().await;
        assert_eq!(controller.state(), ConnectionState::Idle);
        assert_eq!(handle.open_links(), 0);
        assert_eq!(handle.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_subscription() {
        let adapter = MemoryAdapter::new();
        let mut controller = ConnectionController::new(Arc::new(adapter.clone()));

        controller.connect(&printer_a()).await.unwrap();
        controller.connect(&printer_b()).await.unwrap();

        let a = adapter.device(&printer_a().address);
        let b = adapter.device(&printer_b().address);
        assert_eq!(a.active_subscriptions(), 0);
        assert_eq!(a.open_links(), 0);
        assert_eq!(b.active_subscriptions(), 1);
        assert_eq!(controller.subscribed_device(), Some(&printer_b()));
    }

    #[tokio::test]
    async fn test_failed_connect_returns_to_idle() {
        let adapter = MemoryAdapter::new().unreachable(printer_a().address);
        let mut controller = ConnectionController::new(Arc::new(adapter));
        let mut states = controller.watch_state();

        let err = controller.connect(&printer_a()).await.unwrap_err();
        assert!(matches!(err, PrinterError::Connection { .. }));
        assert_eq!(*states.borrow_and_update(), ConnectionState::Idle);
        assert!(!controller.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut controller = ConnectionController::new(Arc::new(MemoryAdapter::new()));
        controller.disconnect().await;
        controller.disconnect().await;
        assert_eq!(controller.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_write_without_link() {
        let mut controller = ConnectionController::new(Arc::new(MemoryAdapter::new()));
        let err = controller.write(b"x").await.unwrap_err();
        assert!(matches!(err, PrinterError::NotConnected));
    }

    #[tokio::test]
    async fn test_frames_update_telemetry() {
        let adapter = MemoryAdapter::new();
        let mut controller = ConnectionController::new(Arc::new(adapter.clone()));
        let mut telemetry = controller.watch_telemetry();
        controller.connect(&printer_a()).await.unwrap();

        let handle = adapter.device(&printer_a().address);
        for frame in ["12.5 kg", "12.5 kg", "12.5 kg"] {
            handle.push_frame(frame);
        }

        let state = telemetry
            .wait_for(|s| s.window.len() == 3)
            .await
            .unwrap()
            .clone();
        assert!(state.stability.is_stable);
        assert_eq!(state.stability.stable_value, Some(Reading::new("12.5 kg")));
    }

    #[tokio::test]
    async fn test_every_reading_is_published_after_settling() {
        let adapter = MemoryAdapter::new();
        let mut controller = ConnectionController::new(Arc::new(adapter.clone()));
        let mut telemetry = controller.watch_telemetry();
        controller.connect(&printer_a()).await.unwrap();
        telemetry.borrow_and_update();

        let handle = adapter.device(&printer_a().address);
        let mut notifications = 0;
        for _ in 0..15 {
            handle.push_frame("12.5 kg");
            tokio::time::timeout(Duration::from_secs(1), telemetry.changed())
                .await
                .expect("reading was not published")
                .unwrap();
            telemetry.borrow_and_update();
            notifications += 1;
        }

        assert_eq!(notifications, 15);
        let state = telemetry.borrow().clone();
        assert_eq!(state.samples_seen, 15);
        assert_eq!(state.window.len(), WINDOW_CAPACITY);
        assert!(state.stability.is_stable);
    }

    #[tokio::test]
    async fn test_reconnect_resets_telemetry() {
        let adapter = MemoryAdapter::new();
        let mut controller = ConnectionController::new(Arc::new(adapter.clone()));
        let mut telemetry = controller.watch_telemetry();
        controller.connect(&printer_a()).await.unwrap();

        adapter.device(&printer_a().address).push_frame("3 kg");
        telemetry.wait_for(|s| s.latest.is_some()).await.unwrap();

        controller.connect(&printer_b()).await.unwrap();
        assert_eq!(*telemetry.borrow(), TelemetryState::new());
    }
}
