//! # Printer Module
//!
//! This module provides printer profiles and session configuration.
//!
//! ## Modules
//!
//! - [`config`]: Printer profiles, receipt header, startup configuration

pub mod config;

pub use config::{CENTER_DIVISOR, PrinterConfig, ReceiptHeader, SessionConfig};
