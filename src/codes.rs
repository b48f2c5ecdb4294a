use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ChargeKind;

const BUILTIN_CODES: &[(&str, &str)] = &[
    ("AU", "Passenger Movement Charge"),
    ("AY", "US Security Fee"),
    ("CA", "Air Travellers Security Charge"),
    ("DE", "German Airport Security Charge"),
    ("FR", "French Civil Aviation Tax"),
    ("GB", "UK Air Passenger Duty"),
    ("NZ", "New Zealand Border Clearance Levy"),
    ("OB", "Ticketing Fee"),
    ("QR", "Safety and Security Charge"),
    ("RA", "German Air Transport Tax"),
    ("UB", "UK Passenger Service Charge"),
    ("UO", "Australian Goods and Services Tax"),
    ("US", "US Transportation Tax"),
    ("WG", "Australian Goods and Services Tax (Domestic)"),
    ("WY", "Passenger Services Charge"),
    ("XA", "US Animal and Plant Health Inspection Fee"),
    ("XF", "US Passenger Facility Charge"),
    ("XY", "US Immigration Fee"),
    ("YC", "US Customs Fee"),
    ("YQ", "Fuel Surcharge"),
    ("YR", "Carrier Imposed Fee"),
    ("ZP", "US Flight Segment Tax"),
    ("BKG", "Booking Fee"),
    ("CCF", "Credit Card Fee"),
    ("SVC", "Service Fee"),
];

/// Short tax/fee code to display name. Injected through `EngineConfig` so
/// alternate tables can be supplied per provider or per test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeTable {
    names: BTreeMap<String, String>,
}

impl Default for CodeTable {
    fn default() -> Self {
        Self::with_entries(BUILTIN_CODES.iter().copied())
    }
}

impl CodeTable {
    pub fn empty() -> Self {
        Self {
            names: BTreeMap::new(),
        }
    }

    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: entries
                .into_iter()
                .map(|(code, name)| (code.into().to_uppercase(), name.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, code: impl Into<String>, name: impl Into<String>) {
        self.names.insert(code.into().to_uppercase(), name.into());
    }

    pub fn lookup(&self, code: &str) -> Option<&str> {
        self.names
            .get(&code.trim().to_uppercase())
            .map(String::as_str)
    }

    /// Display name for a code, `"<Kind> <code>"` when the code is unknown.
    pub fn describe(&self, kind: ChargeKind, code: &str) -> String {
        match self.lookup(code) {
            Some(name) => name.to_string(),
            None => format!("{} {}", kind, code.trim()),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
