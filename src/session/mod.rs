//! # Printer Session
//!
//! The object the application shell opens once and hands to every screen
//! that prints or reads the scale. It ties together the
//! [`resolver::DeviceResolver`], the [`connection::ConnectionController`],
//! the telemetry reducer and the receipt renderers.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use agentprint::printer::SessionConfig;
//! use agentprint::session::PrinterSession;
//! use agentprint::transport::{BluezAdapter, HostPermissions};
//!
//! # async fn run() -> Result<(), agentprint::PrinterError> {
//! let session = PrinterSession::open(
//!     SessionConfig::default(),
//!     Arc::new(HostPermissions),
//!     Arc::new(BluezAdapter::default()),
//! );
//! let printer = session.request_scan_and_connect().await?;
//! println!("Connected to {}", printer);
//! session.print_text("Hello").await?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Discovery, connect, disconnect and print all take the controller lock,
//! so no two of them overlap. Connection state and telemetry are published
//! on `watch` channels and can be read without it.

pub mod connection;
pub mod resolver;

pub use connection::{ConnectionController, ConnectionState};
pub use resolver::{DeviceResolver, Source};

use std::sync::Arc;

use log::info;
use tokio::sync::{Mutex, watch};

use crate::device::DeviceIdentity;
use crate::error::PrinterError;
use crate::printer::{PrinterConfig, SessionConfig};
use crate::protocol::commands;
use crate::receipt::{self, ReceiptContext};
use crate::telemetry::TelemetryState;
use crate::transport::{BluetoothAdapter, PermissionGate};

pub struct PrinterSession {
    config: SessionConfig,
    printer: PrinterConfig,
    resolver: DeviceResolver,
    controller: Mutex<ConnectionController>,
    state: watch::Receiver<ConnectionState>,
    telemetry: watch::Receiver<TelemetryState>,
}

impl PrinterSession {
    /// Open a session on the given host services. Nothing is connected yet.
    pub fn open(
        config: SessionConfig,
        permissions: Arc<dyn PermissionGate>,
        adapter: Arc<dyn BluetoothAdapter>,
    ) -> Self {
        let printer = config.printer_config();
        let resolver = DeviceResolver::new(permissions, Arc::clone(&adapter), config.allow_list());
        let controller = ConnectionController::new(adapter);
        let state = controller.watch_state();
        let telemetry = controller.watch_telemetry();

        info!(
            "Printer session opened ({}, {} allowed device(s))",
            printer.name,
            resolver.allow_list().addresses().len()
        );

        Self {
            config,
            printer,
            resolver,
            controller: Mutex::new(controller),
            state,
            telemetry,
        }
    }

    /// Disconnect and release the session.
    pub async fn close(self) {
        self.controller.lock().await.disconnect().await;
        info!("Printer session closed");
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn printer(&self) -> &PrinterConfig {
        &self.printer
    }

    /// Resolve the printer and connect to it.
    ///
    /// Resolves exactly once with the connected device, or fails with the
    /// resolver or connection error. Nothing is retried.
    pub async fn request_scan_and_connect(&self) -> Result<DeviceIdentity, PrinterError> {
        let mut controller = self.controller.lock().await;
        controller.begin_discovery().await;

        let device = match self.resolver.resolve().await {
            Ok(device) => device,
            Err(e) => {
                controller.end_discovery();
                return Err(e);
            }
        };

        controller.connect(&device).await
    }

    /// Resolve the printer without connecting. Drops any live connection.
    pub async fn scan(&self) -> Result<DeviceIdentity, PrinterError> {
        let mut controller = self.controller.lock().await;
        controller.begin_discovery().await;
        let result = self.resolver.resolve().await;
        controller.end_discovery();
        result
    }

    /// Connect to a known device, skipping discovery.
    pub async fn connect(&self, device: &DeviceIdentity) -> Result<DeviceIdentity, PrinterError> {
        self.controller.lock().await.connect(device).await
    }

    pub async fn disconnect(&self) {
        self.controller.lock().await.disconnect().await;
    }

    /// Print plain text, framed as one print job.
    pub async fn print_text(&self, text: &str) -> Result<(), PrinterError> {
        let mut controller = self.controller.lock().await;
        if !controller.is_connected() {
            return Err(PrinterError::NotConnected);
        }
        controller.write(&commands::text_job(text)).await
    }

    /// Print the collection receipt for `ctx`.
    pub async fn print_formatted_receipt(&self, ctx: &ReceiptContext) -> Result<(), PrinterError> {
        let text = receipt::render_text(ctx, &self.config.header, &self.printer);
        self.print_text(&text).await
    }

    pub async fn print_test_page(&self) -> Result<(), PrinterError> {
        let text = receipt::test_page(&self.config.header, &self.printer);
        self.print_text(&text).await
    }

    /// HTML rendering of the receipt for the platform print service.
    /// Works whether or not a printer is connected.
    pub fn render_html(&self, ctx: &ReceiptContext) -> String {
        receipt::html::render(ctx, &self.config.header, &self.printer)
    }

    /// Stream of connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stream of telemetry updates from the connected device.
    pub fn telemetry(&self) -> watch::Receiver<TelemetryState> {
        self.telemetry.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }
}
