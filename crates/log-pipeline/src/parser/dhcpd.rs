//! `dhcpd` lease record decoder.

use std::sync::LazyLock;

use pfnotify_core::pipeline::VendorLookup;
use regex::Regex;
use tracing::debug;

use crate::entry::DhcpLeaseEntry;

/// Six colon- or hyphen-separated hex octets.
static MAC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}").expect("MAC pattern is a valid regex")
});

/// Lease subtypes worth reporting; every other subtype is suppressed.
pub const REPORTED_SUBTYPES: [&str; 2] = ["DHCPACK", "DHCPREQUEST"];

/// Returns the first MAC address in `text`.
pub fn find_mac(text: &str) -> Option<&str> {
    MAC_PATTERN.find(text).map(|m| m.as_str())
}

/// Builds a lease entry from the text after the `dhcpd:` marker.
///
/// `line` is searched for a MAC address. When one is found and a vendor lookup
/// is supplied, the vendor name is appended; lookup failures become
/// `" (unknown vendor)"`.
pub fn decode(line: &str, text: &str, vendor_lookup: Option<&dyn VendorLookup>) -> DhcpLeaseEntry {
    let mut text = text.trim().to_owned();
    let mac = find_mac(line).map(str::to_owned);

    if let (Some(mac), Some(lookup)) = (mac.as_deref(), vendor_lookup) {
        match lookup.vendor(mac) {
            Ok(vendor) => {
                text.push_str(" (");
                text.push_str(&vendor);
                text.push(')');
            }
            Err(e) => {
                debug!(mac, error = %e, "vendor lookup failed");
                text.push_str(" (unknown vendor)");
            }
        }
    }

    DhcpLeaseEntry { text, mac }
}

/// Returns `true` if the rendered entry is a subtype worth reporting.
pub fn is_reported(entry: &DhcpLeaseEntry) -> bool {
    REPORTED_SUBTYPES
        .iter()
        .any(|subtype| entry.text.contains(subtype))
}
