//! # Agentprint - Field Agent Printer Client
//!
//! Agentprint drives the portable Bluetooth thermal printers (and serial
//! scales) carried by collection agents. It provides:
//!
//! - **Device resolution**: permissions, radio power, discovery and an
//!   allow-list of issued hardware, with a bonded-device fallback
//! - **Connection control**: one live serial link at a time, one frame
//!   subscription bound to it
//! - **Telemetry**: reading extraction and stability detection over the
//!   last ten samples
//! - **Receipts**: fixed-width collection receipts for the printer and an
//!   HTML rendering for the platform print service
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use agentprint::{
//!     PrinterSession,
//!     printer::SessionConfig,
//!     receipt::ReceiptContext,
//!     transport::{BluezAdapter, HostPermissions},
//! };
//!
//! # async fn run(json: &str) -> Result<(), agentprint::PrinterError> {
//! let config = SessionConfig::default();
//! let session = PrinterSession::open(
//!     config,
//!     Arc::new(HostPermissions),
//!     Arc::new(BluezAdapter::default()),
//! );
//!
//! session.request_scan_and_connect().await?;
//!
//! let ctx = ReceiptContext::from_json(json).map_err(|e| {
//!     agentprint::PrinterError::Config(e.to_string())
//! })?;
//! session.print_formatted_receipt(&ctx).await?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | Printer session, device resolver, connection controller |
//! | [`telemetry`] | Reading extraction and stability window |
//! | [`receipt`] | Collection receipts (text and HTML) |
//! | [`components`] | Fixed-width layout components |
//! | [`protocol`] | Printer control bytes and text encoding |
//! | [`transport`] | Host Bluetooth services (BlueZ, in-memory) |
//! | [`printer`] | Printer profiles and session configuration |
//! | [`device`] | Device identities and the allow-list |
//! | [`error`] | Error types |

pub mod components;
pub mod device;
pub mod error;
pub mod printer;
pub mod protocol;
pub mod receipt;
pub mod session;
pub mod telemetry;
pub mod transport;

// Re-exports for convenience
pub use device::DeviceIdentity;
pub use error::PrinterError;
pub use printer::{PrinterConfig, SessionConfig};
pub use session::{ConnectionState, PrinterSession};
