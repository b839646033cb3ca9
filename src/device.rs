//! # Device Identity and Allow-List
//!
//! Printers and scales are identified by their Bluetooth hardware address.
//! Only addresses on the allow-list are ever picked automatically during
//! discovery or from the bonded-device list.

use serde::{Deserialize, Serialize};

/// Hardware addresses of the printer/scale units issued to agents.
pub const ALLOWED_DEVICES: &[&str] = &[
    "DC:0D:30:8A:41:7C",
    "DC:0D:30:8A:42:19",
    "66:32:B1:D0:0E:5F",
    "86:67:7A:13:C4:02",
];

/// A device reported by the platform Bluetooth stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Colon-separated hex octets, e.g. `DC:0D:30:8A:41:7C`
    pub address: String,
    /// Human-readable name as advertised, may be empty
    pub name: String,
}

impl DeviceIdentity {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    /// True if both identities refer to the same hardware address.
    pub fn same_address(&self, other: &DeviceIdentity) -> bool {
        self.address.eq_ignore_ascii_case(&other.address)
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} ({})", self.name, self.address)
        }
    }
}

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Fixed set of accepted hardware addresses.
///
/// Built once at startup, either from [`ALLOWED_DEVICES`] or from the
/// configuration file. There is no way to add or remove entries afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    addresses: Vec<String>,
}

impl AllowList {
    /// Build an allow-list, normalizing addresses to upper case.
    ///
    /// Entries that are not valid MAC addresses are skipped with a warning.
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses = addresses
            .into_iter()
            .filter_map(|a| {
                let a = a.as_ref().trim();
                if is_valid_mac(a) {
                    Some(a.to_uppercase())
                } else {
                    log::warn!("Ignoring invalid allow-list address '{}'", a);
                    None
                }
            })
            .collect();
        Self { addresses }
    }

    pub fn contains(&self, device: &DeviceIdentity) -> bool {
        self.addresses
            .iter()
            .any(|a| a.eq_ignore_ascii_case(device.address.trim()))
    }

    /// First device of `candidates` that is on the allow-list.
    pub fn first_match<'a>(&self, candidates: &'a [DeviceIdentity]) -> Option<&'a DeviceIdentity> {
        candidates.iter().find(|d| self.contains(d))
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(ALLOWED_DEVICES.iter().copied())
    }
}

// ============================================================================
// TESTS
// ============================================================================
