//! # Device Resolver
//!
//! Picks the printer to connect to:
//!
//! 1. request location and Bluetooth scan/connect permissions
//! 2. power the radio on, prompting if it is off
//! 3. cancel any running discovery, then run one discovery pass
//! 4. take the first discovered device on the allow-list, else the first
//!    bonded device on the allow-list
//! 5. cancel discovery again before handing the device to the connection
//!    controller

use std::sync::Arc;

use log::{debug, info, warn};

use crate::device::{AllowList, DeviceIdentity};
use crate::error::PrinterError;
use crate::transport::{BluetoothAdapter, Permission, PermissionGate};

/// Where a resolved device came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Discovery,
    Bonded,
}

pub struct DeviceResolver {
    permissions: Arc<dyn PermissionGate>,
    adapter: Arc<dyn BluetoothAdapter>,
    allow_list: AllowList,
}

impl DeviceResolver {
    pub fn new(
        permissions: Arc<dyn PermissionGate>,
        adapter: Arc<dyn BluetoothAdapter>,
        allow_list: AllowList,
    ) -> Self {
        Self {
            permissions,
            adapter,
            allow_list,
        }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Resolve the device to connect to.
    pub async fn resolve(&self) -> Result<DeviceIdentity, PrinterError> {
        self.resolve_with_source().await.map(|(device, _)| device)
    }

    /// Resolve the device and report whether it was discovered or bonded.
    ///
    /// Failures of the host services themselves surface as
    /// [`PrinterError::Bluetooth`].
    pub async fn resolve_with_source(&self) -> Result<(DeviceIdentity, Source), PrinterError> {
        self.resolve_inner().await.map_err(host_error)
    }

    async fn resolve_inner(&self) -> Result<(DeviceIdentity, Source), PrinterError> {
        self.ensure_permissions().await?;
        self.ensure_radio().await?;

        self.adapter.cancel_discovery().await?;
        let discovered = match self.adapter.start_discovery().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Discovery failed, checking bonded devices: {}", e);
                Vec::new()
            }
        };
        debug!("Discovery found {} device(s)", discovered.len());

        let found = match self.allow_list.first_match(&discovered) {
            Some(device) => Some((device.clone(), Source::Discovery)),
            None => self
                .first_bonded()
                .await
                .map(|device| (device, Source::Bonded)),
        };

        let Some((device, source)) = found else {
            self.adapter.cancel_discovery().await?;
            info!("No allow-listed device among discovered or bonded devices");
            return Err(PrinterError::DeviceNotFound);
        };

        // Discovery slows down or breaks the RFCOMM connect that follows
        self.adapter.cancel_discovery().await?;
        info!("Resolved {} from {:?}", device, source);
        Ok((device, source))
    }

    async fn ensure_permissions(&self) -> Result<(), PrinterError> {
        let denied = self.permissions.request(Permission::REQUIRED).await?;
        if denied.is_empty() {
            Ok(())
        } else {
            warn!("Permissions denied: {:?}", denied);
            Err(PrinterError::PermissionDenied(denied))
        }
    }

    async fn ensure_radio(&self) -> Result<(), PrinterError> {
        if self.adapter.is_enabled().await? {
            return Ok(());
        }
        info!("Bluetooth is off, requesting enable");
        if self.adapter.request_enable().await? {
            Ok(())
        } else {
            Err(PrinterError::BluetoothDisabled)
        }
    }

    async fn first_bonded(&self) -> Option<DeviceIdentity> {
        let bonded = match self.adapter.bonded_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Could not list bonded devices: {}", e);
                return None;
            }
        };
        self.allow_list.first_match(&bonded).cloned()
    }
}

/// Keep the resolver's own outcomes, fold raw transport failures into
/// `Bluetooth`.
fn host_error(err: PrinterError) -> PrinterError {
    match err {
        PrinterError::Transport(message) => PrinterError::Bluetooth(message),
        PrinterError::Io(e) => PrinterError::Bluetooth(e.to_string()),
        other => other,
    }
}
