//! Device records and static address overrides.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Local credential used by the device client to authenticate with one appliance.
///
/// The value is opaque to the agent. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the raw secret for handing to a protocol client.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

/// Vendor product type code, e.g. `"438"` or `"527"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductType(String);

impl ProductType {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The subset of a record the discovery subsystem needs to find a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub serial: String,
    pub product_type: ProductType,
}

/// Static identity and credential data for one physical appliance.
///
/// `serial` is the unique key across the whole fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Human-readable name, e.g. `"Living Room"`.
    pub name: String,
    /// Serial number, e.g. `"AB1-UK-0001A"`.
    pub serial: String,
    pub credentials: Credentials,
    pub product_type: ProductType,
}

impl DeviceRecord {
    pub fn new(
        name: impl Into<String>,
        serial: impl Into<String>,
        credentials: Credentials,
        product_type: ProductType,
    ) -> Self {
        Self {
            name: name.into(),
            serial: serial.into(),
            credentials,
            product_type,
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            serial: self.serial.clone(),
            product_type: self.product_type.clone(),
        }
    }
}

/// Serial → address map used to bypass discovery for specific devices.
///
/// Keys are stored upper-cased and lookups upper-case the query, so
/// `ab1-uk-0001a` and `AB1-UK-0001A` refer to the same device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOverrides {
    hosts: HashMap<String, String>,
}

impl HostOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the address for `serial`.
    pub fn insert(&mut self, serial: &str, address: impl Into<String>) {
        self.hosts.insert(serial.to_uppercase(), address.into());
    }

    /// Returns the configured address for `serial`, if any.
    pub fn get(&self, serial: &str) -> Option<&str> {
        self.hosts.get(&serial.to_uppercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Iterates over `(SERIAL, address)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.hosts.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for HostOverrides {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut hosts = HostOverrides::new();
        for (serial, address) in iter {
            hosts.insert(serial.as_ref(), address);
        }
        hosts
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
