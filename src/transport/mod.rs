//! # Printer Transport Layer
//!
//! This module defines the host services the printer session depends on and
//! provides communication backends for them.
//!
//! ## Host Services
//!
//! - [`PermissionGate`]: runtime permission grants (location, Bluetooth scan/connect)
//! - [`BluetoothAdapter`]: radio power, discovery, bonded devices, connect
//! - [`SerialLink`]: one classic Bluetooth serial connection (write, subscribe, close)
//!
//! ## Available Transports
//!
//! - [`bluetooth`]: BlueZ + RFCOMM on Linux
//! - [`memory`]: in-memory devices for tests and simulators

pub mod bluetooth;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::device::DeviceIdentity;
use crate::error::PrinterError;

pub use bluetooth::{BluezAdapter, HostPermissions};

/// Runtime permissions the resolver must hold before scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    AccessFineLocation,
    BluetoothScan,
    BluetoothConnect,
}

impl Permission {
    /// Every permission requested before discovery.
    pub const REQUIRED: &'static [Permission] = &[
        Permission::AccessFineLocation,
        Permission::BluetoothScan,
        Permission::BluetoothConnect,
    ];
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Permission::AccessFineLocation => "ACCESS_FINE_LOCATION",
            Permission::BluetoothScan => "BLUETOOTH_SCAN",
            Permission::BluetoothConnect => "BLUETOOTH_CONNECT",
        };
        f.write_str(name)
    }
}

/// Host permission-request API.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Request `permissions` and return the ones that were *not* granted.
    async fn request(&self, permissions: &[Permission]) -> Result<Vec<Permission>, PrinterError>;
}

/// Host classic-Bluetooth API.
#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    /// Whether the radio is powered on.
    async fn is_enabled(&self) -> Result<bool, PrinterError>;

    /// Ask the user/host to power the radio. Returns whether it is now on.
    async fn request_enable(&self) -> Result<bool, PrinterError>;

    /// Run one discovery pass and return the devices it found.
    async fn start_discovery(&self) -> Result<Vec<DeviceIdentity>, PrinterError>;

    /// Cancel discovery. Must succeed when no discovery is running.
    async fn cancel_discovery(&self) -> Result<(), PrinterError>;

    /// Devices already bonded (paired) with this host.
    async fn bonded_devices(&self) -> Result<Vec<DeviceIdentity>, PrinterError>;

    /// Open a serial link to `device`.
    async fn connect(&self, device: &DeviceIdentity) -> Result<Box<dyn SerialLink>, PrinterError>;
}

/// One live serial connection.
#[async_trait]
pub trait SerialLink: Send {
    /// The device this link is connected to.
    fn device(&self) -> &DeviceIdentity;

    /// Register a data-received subscription.
    ///
    /// Frames are delivered in the order they arrive. Dropping the returned
    /// stream unsubscribes.
    fn subscribe(&mut self) -> Result<FrameStream, PrinterError>;

    /// Write one blob to the device.
    async fn write(&mut self, data: &[u8]) -> Result<(), PrinterError>;

    /// Close the link. Calling it twice is not an error.
    async fn close(&mut self) -> Result<(), PrinterError>;
}

/// Sending half of a frame subscription, held by the transport.
pub type FrameSender = mpsc::UnboundedSender<Vec<u8>>;

/// Receiving half of a frame subscription.
#[derive(Debug)]
pub struct FrameStream {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl FrameStream {
    /// Create a connected sender/stream pair.
    pub fn channel() -> (FrameSender, FrameStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, FrameStream { rx })
    }

    /// Next inbound frame, or `None` once the transport side is gone.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

// ============================================================================
// LINE FRAMING
// ============================================================================

/// Longest frame kept pending while waiting for a line terminator.
pub const MAX_FRAME_LEN: usize = 256;

/// Split a raw serial byte stream into line frames.
///
/// Scales stream readings as text lines terminated by CR, LF or CRLF.
/// Empty lines are dropped. A run longer than [`MAX_FRAME_LEN`] without a
/// terminator is emitted as a frame of its own.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every frame they complete.
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &byte in data {
            if byte == b'\n' || byte == b'\r' {
                if !self.pending.is_empty() {
                    frames.push(std::mem::take(&mut self.pending));
                }
            } else {
                self.pending.push(byte);
                if self.pending.len() >= MAX_FRAME_LEN {
                    frames.push(std::mem::take(&mut self.pending));
                }
            }
        }
        frames
    }
}
