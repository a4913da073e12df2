use crate::{Result, TransportError};
use core::fmt;
use serde::{Deserialize, Serialize};

/// Service, class and attribute codes used by parameter acquisition.
pub mod consts {
    pub const GET_ATTRIBUTES_ALL: u8 = 0x01;
    pub const GET_ATTRIBUTE_SINGLE: u8 = 0x0E;
    /// Vendor-specific batched parameter read.
    pub const SCATTERED_READ: u8 = 0x4B;

    pub const CLASS_IDENTITY: u16 = 0x01;
    pub const CLASS_PARAMETER: u16 = 0x0F;
    pub const CLASS_DPI_PARAMETER: u16 = 0x93;

    // Parameter Object instance attributes
    pub const ATTR_VALUE: u16 = 1;
    pub const ATTR_DATA_TYPE: u16 = 5;
    pub const ATTR_DATA_SIZE: u16 = 6;
    pub const ATTR_NAME: u16 = 7;
    pub const ATTR_DEFAULT: u16 = 12;

    // Class attribute (instance 0)
    pub const ATTR_MAX_INSTANCE: u16 = 2;
}

/// Logical path of a request: class, instance and optional attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct EPath {
    pub class: u16,
    pub instance: u16,
    pub attribute: Option<u16>,
}

impl EPath {
    pub fn instance(class: u16, instance: u16) -> Self {
        Self {
            class,
            instance,
            attribute: None,
        }
    }

    pub fn attribute(class: u16, instance: u16, attribute: u16) -> Self {
        Self {
            class,
            instance,
            attribute: Some(attribute),
        }
    }
}

impl fmt::Display for EPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}/{}", self.class, self.instance)?;
        if let Some(attr) = self.attribute {
            write!(f, "/{attr}")?;
        }
        Ok(())
    }
}

/// One explicit message: service code, target path and request data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExplicitRequest {
    pub service: u8,
    pub path: EPath,
    pub payload: Vec<u8>,
}

impl ExplicitRequest {
    pub fn new(service: u8, path: EPath, payload: Vec<u8>) -> Self {
        Self {
            service,
            path,
            payload,
        }
    }

    /// Get_Attribute_Single on `class/instance/attribute` with no payload.
    pub fn get_attribute(class: u16, instance: u16, attribute: u16) -> Self {
        Self::new(
            consts::GET_ATTRIBUTE_SINGLE,
            EPath::attribute(class, instance, attribute),
            Vec::new(),
        )
    }
}

/// Identity Object contents reported by a device at connect time.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub major_revision: u8,
    pub minor_revision: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

impl DeviceIdentity {
    pub fn new(
        vendor_id: u16,
        device_type: u16,
        product_code: u16,
        major_revision: u8,
        minor_revision: u8,
    ) -> Self {
        Self {
            vendor_id,
            device_type,
            product_code,
            major_revision,
            minor_revision,
            serial_number: None,
            product_name: None,
        }
    }

    /// Decode a Get_Attributes_All reply of the Identity Object.
    ///
    /// Layout (little-endian): vendor u16, device type u16, product code u16,
    /// major u8, minor u8, status u16, serial u32, product name SHORT_STRING.
    /// Only the first 8 bytes are mandatory.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(TransportError::InvalidResponse("identity too short"));
        }
        let le16 = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);
        let mut id = Self::new(le16(0), le16(2), le16(4), data[6], data[7]);
        if data.len() >= 14 {
            id.serial_number = Some(u32::from_le_bytes([
                data[10], data[11], data[12], data[13],
            ]));
        }
        if let Some(&len) = data.get(14) {
            let end = 15 + len as usize;
            if end > data.len() {
                return Err(TransportError::InvalidResponse("identity name truncated"));
            }
            id.product_name = Some(String::from_utf8_lossy(&data[15..end]).into_owned());
        }
        Ok(id)
    }

    /// Encode as a Get_Attributes_All reply (status word reported as zero).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.extend_from_slice(&self.vendor_id.to_le_bytes());
        out.extend_from_slice(&self.device_type.to_le_bytes());
        out.extend_from_slice(&self.product_code.to_le_bytes());
        out.push(self.major_revision);
        out.push(self.minor_revision);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.serial_number.unwrap_or(0).to_le_bytes());
        if let Some(name) = &self.product_name {
            let bytes = name.as_bytes();
            let len = bytes.len().min(u8::MAX as usize);
            out.push(len as u8);
            out.extend_from_slice(&bytes[..len]);
        }
        out
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vendor={} type={} product={} rev={}.{:03}",
            self.vendor_id,
            self.device_type,
            self.product_code,
            self.major_revision,
            self.minor_revision
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_identity() {
        let raw = [0x01, 0x00, 0x8E, 0x00, 0x0A, 0x00, 0x09, 0x08];
        let id = DeviceIdentity::parse(&raw).unwrap();
        assert_eq!(id, DeviceIdentity::new(1, 0x8E, 10, 9, 8));
        assert!(id.product_name.is_none());
    }

    #[test]
    fn test_parse_full_identity() {
        let raw = [
            0x01, 0x00, 0x7B, 0x00, 0x96, 0x00, 0x05, 0x01, 0x60, 0x00, 0x78, 0x56, 0x34, 0x12,
            0x04, b'P', b'F', b'5', b'2',
        ];
        let id = DeviceIdentity::parse(&raw).unwrap();
        assert_eq!(id.product_code, 150);
        assert_eq!(id.serial_number, Some(0x1234_5678));
        assert_eq!(id.product_name.as_deref(), Some("PF52"));
    }

    #[test]
    fn test_parse_short_identity_fails() {
        assert!(matches!(
            DeviceIdentity::parse(&[1, 0, 2, 0]),
            Err(TransportError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_truncated_name_fails() {
        let mut raw = DeviceIdentity::new(1, 2, 3, 4, 5).to_bytes();
        raw.push(10);
        raw.extend_from_slice(b"abc");
        assert!(DeviceIdentity::parse(&raw).is_err());
    }

    #[test]
    fn test_path_display() {
        assert_eq!(EPath::attribute(0x0F, 12, 1).to_string(), "0x0F/12/1");
        assert_eq!(EPath::instance(0x93, 0).to_string(), "0x93/0");
    }
}
