//! # In-Memory Transport
//!
//! A scripted Bluetooth host: fixed discovery and bonded lists, devices that
//! record every write and accept injected inbound frames. Used by the test
//! suite and by simulators that drive a session without hardware.
//!
//! ## Example
//!
//! ```
//! use agentprint::device::DeviceIdentity;
//! use agentprint::transport::memory::MemoryAdapter;
//!
//! let printer = DeviceIdentity::new("DC:0D:30:8A:41:7C", "PT-210");
//! let adapter = MemoryAdapter::new().bond(printer.clone());
//! let handle = adapter.device(&printer.address);
//! assert!(handle.writes().is_empty());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{BluetoothAdapter, FrameSender, FrameStream, Permission, PermissionGate, SerialLink};
use crate::device::DeviceIdentity;
use crate::error::PrinterError;

/// One call made against a [`MemoryAdapter`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    IsEnabled,
    RequestEnable,
    StartDiscovery,
    CancelDiscovery,
    BondedDevices,
    Connect(String),
}

#[derive(Debug, Default)]
struct DeviceBus {
    writes: Vec<Vec<u8>>,
    subscribers: Vec<FrameSender>,
    open_links: usize,
}

#[derive(Debug)]
struct AdapterState {
    powered: bool,
    allow_enable: bool,
    discovered: Vec<DeviceIdentity>,
    bonded: Vec<DeviceIdentity>,
    discovery_error: Option<String>,
    radio_error: Option<String>,
    unreachable: Vec<String>,
    calls: Vec<AdapterCall>,
    buses: HashMap<String, Arc<Mutex<DeviceBus>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test thread must not wedge the others
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted Bluetooth adapter.
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    state: Arc<Mutex<AdapterState>>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    /// A powered adapter with nothing around it.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AdapterState {
                powered: true,
                allow_enable: true,
                discovered: Vec::new(),
                bonded: Vec::new(),
                discovery_error: None,
                radio_error: None,
                unreachable: Vec::new(),
                calls: Vec::new(),
                buses: HashMap::new(),
            })),
        }
    }

    /// Start with the radio off. `allow_enable` decides how the user answers
    /// the power-on prompt.
    pub fn powered_off(self, allow_enable: bool) -> Self {
        {
            let mut state = lock(&self.state);
            state.powered = false;
            state.allow_enable = allow_enable;
        }
        self
    }

    /// Add a device to every discovery pass.
    pub fn discover(self, device: DeviceIdentity) -> Self {
        lock(&self.state).discovered.push(device);
        self
    }

    /// Add a device to the bonded list.
    pub fn bond(self, device: DeviceIdentity) -> Self {
        lock(&self.state).bonded.push(device);
        self
    }

    /// Make discovery fail with `message`.
    pub fn failing_discovery(self, message: impl Into<String>) -> Self {
        lock(&self.state).discovery_error = Some(message.into());
        self
    }

    /// Make every radio power query fail with `message`.
    pub fn failing_radio(self, message: impl Into<String>) -> Self {
        lock(&self.state).radio_error = Some(message.into());
        self
    }

    /// Make connecting to `address` fail.
    pub fn unreachable(self, address: impl Into<String>) -> Self {
        lock(&self.state).unreachable.push(address.into().to_uppercase());
        self
    }

    /// Handle on the simulated device at `address`.
    pub fn device(&self, address: &str) -> MemoryDevice {
        MemoryDevice {
            bus: self.bus(address),
        }
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<AdapterCall> {
        lock(&self.state).calls.clone()
    }

    fn bus(&self, address: &str) -> Arc<Mutex<DeviceBus>> {
        lock(&self.state)
            .buses
            .entry(address.to_uppercase())
            .or_default()
            .clone()
    }

    fn record(&self, call: AdapterCall) {
        lock(&self.state).calls.push(call);
    }
}

#[async_trait]
impl BluetoothAdapter for MemoryAdapter {
    async fn is_enabled(&self) -> Result<bool, PrinterError> {
        self.record(AdapterCall::IsEnabled);
        let state = lock(&self.state);
        match &state.radio_error {
            Some(message) => Err(PrinterError::Transport(message.clone())),
            None => Ok(state.powered),
        }
    }

    async fn request_enable(&self) -> Result<bool, PrinterError> {
        self.record(AdapterCall::RequestEnable);
        let mut state = lock(&self.state);
        if state.allow_enable {
            state.powered = true;
        }
        Ok(state.powered)
    }

    async fn start_discovery(&self) -> Result<Vec<DeviceIdentity>, PrinterError> {
        self.record(AdapterCall::StartDiscovery);
        let state = lock(&self.state);
        match &state.discovery_error {
            Some(message) => Err(PrinterError::Transport(message.clone())),
            None => Ok(state.discovered.clone()),
        }
    }

    async fn cancel_discovery(&self) -> Result<(), PrinterError> {
        self.record(AdapterCall::CancelDiscovery);
        Ok(())
    }

    async fn bonded_devices(&self) -> Result<Vec<DeviceIdentity>, PrinterError> {
        self.record(AdapterCall::BondedDevices);
        Ok(lock(&self.state).bonded.clone())
    }

    async fn connect(&self, device: &DeviceIdentity) -> Result<Box<dyn SerialLink>, PrinterError> {
        let address = device.address.to_uppercase();
        self.record(AdapterCall::Connect(address.clone()));

        if lock(&self.state).unreachable.contains(&address) {
            return Err(PrinterError::Connection {
                address,
                message: "device unreachable".to_string(),
            });
        }

        let bus = self.bus(&address);
        lock(&bus).open_links += 1;
        Ok(Box::new(MemoryLink {
            device: device.clone(),
            bus,
            closed: false,
        }))
    }
}

/// Test-side handle on one simulated device.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    bus: Arc<Mutex<DeviceBus>>,
}

impl MemoryDevice {
    /// Deliver a frame to every live subscription. Returns how many got it.
    pub fn push_frame(&self, frame: impl AsRef<[u8]>) -> usize {
        let mut bus = lock(&self.bus);
        bus.subscribers.retain(|tx| !tx.is_closed());
        bus.subscribers
            .iter()
            .filter(|tx| tx.send(frame.as_ref().to_vec()).is_ok())
            .count()
    }

    /// Every blob written to the device, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.bus).writes.clone()
    }

    /// Subscriptions whose receiving side is still alive.
    pub fn active_subscriptions(&self) -> usize {
        lock(&self.bus)
            .subscribers
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Links opened and not yet closed.
    pub fn open_links(&self) -> usize {
        lock(&self.bus).open_links
    }
}

/// Serial link to a simulated device.
#[derive(Debug)]
pub struct MemoryLink {
    device: DeviceIdentity,
    bus: Arc<Mutex<DeviceBus>>,
    closed: bool,
}

impl MemoryLink {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut bus = lock(&self.bus);
            bus.open_links = bus.open_links.saturating_sub(1);
        }
    }
}

#[async_trait]
impl SerialLink for MemoryLink {
    fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    fn subscribe(&mut self) -> Result<FrameStream, PrinterError> {
        if self.closed {
            return Err(PrinterError::Transport("Link is closed".to_string()));
        }
        let (tx, stream) = FrameStream::channel();
        lock(&self.bus).subscribers.push(tx);
        Ok(stream)
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), PrinterError> {
        if self.closed {
            return Err(PrinterError::Transport("Link is closed".to_string()));
        }
        lock(&self.bus).writes.push(data.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PrinterError> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.release();
    }
}

/// Scripted permission gate.
#[derive(Debug, Clone, Default)]
pub struct MemoryPermissions {
    denied: Vec<Permission>,
    requests: Arc<Mutex<Vec<Vec<Permission>>>>,
}

impl MemoryPermissions {
    pub fn granting_all() -> Self {
        Self::default()
    }

    pub fn denying(denied: &[Permission]) -> Self {
        Self {
            denied: denied.to_vec(),
            requests: Arc::default(),
        }
    }

    /// Every batch of permissions requested so far.
    pub fn requests(&self) -> Vec<Vec<Permission>> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl PermissionGate for MemoryPermissions {
    async fn request(&self, permissions: &[Permission]) -> Result<Vec<Permission>, PrinterError> {
        lock(&self.requests).push(permissions.to_vec());
        Ok(permissions
            .iter()
            .filter(|p| self.denied.contains(p))
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printer() -> DeviceIdentity {
        DeviceIdentity::new("DC:0D:30:8A:41:7C", "PT-210")
    }

    #[tokio::test]
    async fn test_link_records_writes() {
        let adapter = MemoryAdapter::new();
        let mut link = adapter.connect(&printer()).await.unwrap();
        link.write(b"hello").await.unwrap();

        let handle = adapter.device("dc:0d:30:8a:41:7c");
        assert_eq!(handle.writes(), vec![b"hello".to_vec()]);
        assert_eq!(handle.open_links(), 1);
    }

    #[tokio::test]
    async fn test_closed_link_rejects_writes() {
        let adapter = MemoryAdapter::new();
        let mut link = adapter.connect(&printer()).await.unwrap();
        link.close().await.unwrap();
        link.close().await.unwrap();

        assert!(link.write(b"x").await.is_err());
        assert_eq!(adapter.device(&printer().address).open_links(), 0);
    }

    #[tokio::test]
    async fn test_frames_reach_subscriber() {
        let adapter = MemoryAdapter::new();
        let mut link = adapter.connect(&printer()).await.unwrap();
        let mut stream = link.subscribe().unwrap();

        let handle = adapter.device(&printer().address);
        assert_eq!(handle.push_frame("12.5 kg"), 1);
        assert_eq!(stream.next().await, Some(b"12.5 kg".to_vec()));

        drop(stream);
        assert_eq!(handle.active_subscriptions(), 0);
        assert_eq!(handle.push_frame("12.5 kg"), 0);
    }

    #[tokio::test]
    async fn test_unreachable_device() {
        let adapter = MemoryAdapter::new().unreachable("dc:0d:30:8a:41:7c");
        let err = adapter.connect(&printer()).await.err().unwrap();
        assert!(matches!(err, PrinterError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_permissions_report_denials() {
        let gate = MemoryPermissions::denying(&[Permission::BluetoothScan]);
        let denied = gate.request(Permission::REQUIRED).await.unwrap();
        assert_eq!(denied, vec![Permission::BluetoothScan]);
        assert_eq!(gate.requests().len(), 1);
    }
}
