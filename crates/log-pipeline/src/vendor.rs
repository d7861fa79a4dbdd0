//! MAC OUI vendor lookup backed by the bundled `mac_oui` database.

use std::sync::OnceLock;

use mac_oui::Oui;
use pfnotify_core::error::VendorLookupError;
use pfnotify_core::pipeline::VendorLookup;

/// [`VendorLookup`] over the IEEE OUI registry shipped with `mac_oui`.
///
/// The database is loaded on first use. A load failure is remembered and
/// reported as [`VendorLookupError::Unavailable`] on every call.
#[derive(Default)]
pub struct OuiVendorLookup {
    db: OnceLock<Result<Oui, String>>,
}

impl OuiVendorLookup {
    pub fn new() -> Self {
        Self::default()
    }

    fn db(&self) -> Result<&Oui, VendorLookupError> {
        self.db
            .get_or_init(|| Oui::default().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| VendorLookupError::Unavailable(e.clone()))
    }
}

impl VendorLookup for OuiVendorLookup {
    fn vendor(&self, mac: &str) -> Result<String, VendorLookupError> {
        let normalized = normalize_mac(mac).ok_or_else(|| VendorLookupError::InvalidMac {
            mac: mac.to_owned(),
        })?;

        match self.db()?.lookup_by_mac(&normalized) {
            Ok(Some(entry)) => Ok(entry.company_name.clone()),
            Ok(None) => Err(VendorLookupError::NotFound {
                mac: mac.to_owned(),
            }),
            Err(e) => Err(VendorLookupError::Unavailable(e.to_string())),
        }
    }
}

/// Rewrites `aa-bb-cc-dd-ee-ff` / `AA:BB:...` as lowercase colon form.
///
/// Returns `None` unless the input is six two-digit hex octets.
pub fn normalize_mac(mac: &str) -> Option<String> {
    let octets: Vec<&str> = mac.split([':', '-']).collect();
    if octets.len() != 6
        || !octets
            .iter()
            .all(|o| o.len() == 2 && o.bytes().all(|b| b.is_ascii_hexdigit()))
    {
        return None;
    }
    Some(octets.join(":").to_ascii_lowercase())
}
