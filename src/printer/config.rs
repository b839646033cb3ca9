//! # Printer and Session Configuration
//!
//! Hardware profiles for the portable thermal printers issued to agents, and
//! the startup configuration of a printer session.
//!
//! ## Supported Printers
//!
//! | Profile | Paper | Columns (Font A) |
//! |---------|-------|------------------|
//! | THERMAL_58MM | 58mm | 40 |
//! | THERMAL_80MM | 80mm | 48 |
//!
//! ## Configuration File
//!
//! Every field is optional:
//!
//! ```json
//! {
//!   "allowed_devices": ["DC:0D:30:8A:41:7C"],
//!   "printer": "thermal_58mm",
//!   "header": {
//!     "company": "SRI LAKSHMI CHITS",
//!     "address_lines": ["Main Road, Guntur"],
//!     "footer": "Thank you!"
//!   },
//!   "discovery_secs": 8,
//!   "rfcomm_channel": 0
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::device::{ALLOWED_DEVICES, AllowList};
use crate::error::PrinterError;
use crate::transport::bluetooth::{DEFAULT_CHANNEL, DEFAULT_DISCOVERY_SECS};

/// Divisor applied to the free space of a line when centering.
///
/// `padding = (line_width - text_len) / CENTER_DIVISOR`
pub const CENTER_DIVISOR: usize = 2;

/// # Printer Configuration
///
/// Defines the text layout characteristics of a thermal printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterConfig {
    /// Profile name as used in configuration files
    pub name: &'static str,

    /// Characters per line in the default font
    pub line_width: usize,

    /// Paper width in millimeters (HTML rendering)
    pub paper_width_mm: u16,

    /// Maximum bytes per transport write
    pub chunk_size: usize,
}

impl PrinterConfig {
    /// 58mm portable printer, the unit most agents carry.
    pub const THERMAL_58MM: Self = Self {
        name: "thermal_58mm",
        line_width: 40,
        paper_width_mm: 58,
        chunk_size: 512,
    };

    /// 80mm desk printer used at branch counters.
    pub const THERMAL_80MM: Self = Self {
        name: "thermal_80mm",
        line_width: 48,
        paper_width_mm: 80,
        chunk_size: 1024,
    };

    /// Look up a built-in profile by name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::built_in()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// List all built-in profiles.
    pub fn built_in() -> Vec<Self> {
        vec![Self::THERMAL_58MM, Self::THERMAL_80MM]
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::THERMAL_58MM
    }
}

// ============================================================================
// SESSION CONFIG
// ============================================================================

/// Company details printed at the top and bottom of every receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptHeader {
    pub company: String,
    pub address_lines: Vec<String>,
    pub footer: String,
}

impl Default for ReceiptHeader {
    fn default() -> Self {
        Self {
            company: "COLLECTION RECEIPT".to_string(),
            address_lines: Vec::new(),
            footer: "Thank you!".to_string(),
        }
    }
}

/// Startup configuration of a printer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Addresses that may be selected automatically
    pub allowed_devices: Vec<String>,
    /// Printer profile name (see [`PrinterConfig::built_in`])
    pub printer: String,
    pub header: ReceiptHeader,
    /// Length of one discovery pass
    pub discovery_secs: u64,
    /// RFCOMM device index to bind (`/dev/rfcommN`)
    pub rfcomm_channel: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allowed_devices: ALLOWED_DEVICES.iter().map(|a| a.to_string()).collect(),
            printer: PrinterConfig::THERMAL_58MM.name.to_string(),
            header: ReceiptHeader::default(),
            discovery_secs: DEFAULT_DISCOVERY_SECS,
            rfcomm_channel: DEFAULT_CHANNEL,
        }
    }
}

impl SessionConfig {
    /// Read a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PrinterError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PrinterError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, PrinterError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PrinterError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PrinterError> {
        if PrinterConfig::by_name(&self.printer).is_none() {
            return Err(PrinterError::Config(format!(
                "Unknown printer '{}'. Use one of: {}",
                self.printer,
                PrinterConfig::built_in()
                    .iter()
                    .map(|p| p.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        if self.allow_list().is_empty() {
            return Err(PrinterError::Config(
                "allowed_devices has no valid address".to_string(),
            ));
        }
        Ok(())
    }

    pub fn allow_list(&self) -> AllowList {
        AllowList::new(&self.allowed_devices)
    }

    /// The configured printer profile, falling back to the default.
    pub fn printer_config(&self) -> PrinterConfig {
        PrinterConfig::by_name(&self.printer).unwrap_or_default()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_58mm() {
        let default = PrinterConfig::default();
        assert_eq!(default.line_width, 40);
        assert_eq!(default.paper_width_mm, 58);
    }

    #[test]
    fn test_by_name_ignores_case() {
        assert_eq!(
            PrinterConfig::by_name("THERMAL_80MM"),
            Some(PrinterConfig::THERMAL_80MM)
        );
        assert_eq!(PrinterConfig::by_name("tsp650"), None);
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = SessionConfig::from_json("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.allow_list(), AllowList::default());
    }

    #[test]
    fn test_partial_json() {
        let config = SessionConfig::from_json(
            r#"{"printer": "thermal_80mm", "header": {"company": "SRI LAKSHMI CHITS"}}"#,
        )
        .unwrap();
        assert_eq!(config.printer_config(), PrinterConfig::THERMAL_80MM);
        assert_eq!(config.header.company, "SRI LAKSHMI CHITS");
        assert_eq!(config.header.footer, "Thank you!");
    }

    #[test]
    fn test_unknown_printer_rejected() {
        let err = SessionConfig::from_json(r#"{"printer": "laser"}"#).unwrap_err();
        assert!(matches!(err, PrinterError::Config(_)));
    }

    #[test]
    fn test_empty_allow_list_rejected() {
        let err = SessionConfig::from_json(r#"{"allowed_devices": ["nope"]}"#).unwrap_err();
        assert!(err.to_string().contains("allowed_devices"));
    }
}
