// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use serde::{Deserialize, Serialize};

use hid_ioctls::HID_MAX_DESCRIPTOR_SIZE;

use crate::error::{Result, VuhidError};
use crate::event::{CreateRequest, BUS_VIRTUAL, UHID_NAME_LEN};

/// What a physical device tells about itself, as needed to mirror it through uhid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    /// bcdHID of the device
    #[serde(default)]
    pub version: u16,
    #[serde(default)]
    pub country_code: u8,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(with = "base64_bytes")]
    pub descriptor: Vec<u8>,
}

impl DeviceIdentity {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VuhidError::InvalidArgument(format!("device identity: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.descriptor.is_empty() {
            return Err(VuhidError::InvalidArgument(
                "report descriptor is empty".to_string(),
            ));
        }
        if self.descriptor.len() > HID_MAX_DESCRIPTOR_SIZE {
            return Err(VuhidError::InvalidArgument(format!(
                "report descriptor has {} bytes, at most {} are allowed",
                self.descriptor.len(),
                HID_MAX_DESCRIPTOR_SIZE
            )));
        }
        Ok(())
    }

    /// "Manufacturer Product", whichever parts exist, or "HID vvvv:pppp".
    /// Cut to fit the uhid name field.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.manufacturer.as_deref(), self.product.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();

        let name = if parts.is_empty() {
            format!("HID {:04x}:{:04x}", self.vendor_id, self.product_id)
        } else {
            parts.join(" ")
        };
        truncate_at_char_boundary(name, UHID_NAME_LEN - 1)
    }

    pub(crate) fn create_request(&self, uniq: &str) -> CreateRequest {
        CreateRequest {
            name: self.display_name(),
            phys: String::new(),
            uniq: uniq.to_string(),
            bus: BUS_VIRTUAL,
            vendor: self.vendor_id.into(),
            product: self.product_id.into(),
            version: self.version.into(),
            country: self.country_code.into(),
            rd_data: self.descriptor.clone(),
        }
    }
}

fn truncate_at_char_boundary(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

mod base64_bytes {
    use base64::prelude::BASE64_STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
