//! # Error Types
//!
//! This module defines error types used throughout the agentprint library.

use thiserror::Error;

use crate::transport::Permission;

/// Main error type for printer session operations
#[derive(Debug, Error)]
pub enum PrinterError {
    /// A required runtime permission was not granted by the host
    #[error("Permission denied: {}", join_permissions(.0))]
    PermissionDenied(Vec<Permission>),

    /// The user declined to power on the Bluetooth radio
    #[error("Bluetooth is turned off")]
    BluetoothDisabled,

    /// Neither discovery nor the bonded list matched the allow-list
    #[error("No known printer found. Pair the printer in Bluetooth settings and try again")]
    DeviceNotFound,

    /// The host permission or Bluetooth service failed while resolving a device
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),

    /// The serial link could not be established
    #[error("Failed to connect to {address}: {message}")]
    Connection { address: String, message: String },

    /// A print was attempted without an active connection
    #[error("Printer is not connected")]
    NotConnected,

    /// Transport-level errors on an established link (write, close)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_permissions(permissions: &[Permission]) -> String {
    permissions
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
