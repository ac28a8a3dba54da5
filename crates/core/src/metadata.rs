//! Operator-supplied details captured after a session is stopped.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Vehicle and owner details attached to a saved test.
///
/// Every field is required; the wire names follow the stored test record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMetadata {
    #[serde(rename = "nama", default)]
    pub owner_name: String,
    #[serde(rename = "merk_motor", default)]
    pub vehicle_brand: String,
    #[serde(rename = "nama_motor", default)]
    pub vehicle_model: String,
    #[serde(rename = "cc_motor", default)]
    pub engine_cc: String,
    #[serde(rename = "nomor_wa", default)]
    pub whatsapp_number: String,
}

impl TestMetadata {
    /// Wire names of the fields that are empty after trimming, in declaration order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("nama", &self.owner_name),
            ("merk_motor", &self.vehicle_brand),
            ("nama_motor", &self.vehicle_model),
            ("cc_motor", &self.engine_cc),
            ("nomor_wa", &self.whatsapp_number),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SessionError::MissingMetadata(missing))
        }
    }
}
