use crate::{decode, AcquisitionStrategy, DataType, DecodeError, ParameterValue};
use serde::{Deserialize, Serialize};

/// On-disk layout of one model catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct CatalogFile {
    pub model: String,
    #[serde(rename = "match")]
    pub r#match: MatchSpec,
    #[serde(default)]
    pub strategy: AcquisitionStrategy,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct MatchSpec {
    pub vendor_id: u16,
    pub product_code: u16,
    pub major_revision: u8,
    pub minor_revision: u8,
    /// Accept any minor revision at or above `minor_revision`.
    #[serde(default)]
    pub compatible: bool,
}

/// One catalog entry. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ParameterDefinition {
    pub number: u16,
    pub name: String,
    /// Acquire on every run; otherwise only when all records are requested.
    #[serde(default = "default_acquire")]
    pub acquire: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    /// Raw default as an integer; read from the device when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<i64>,
}

fn default_acquire() -> bool {
    true
}

impl ParameterDefinition {
    pub fn new(number: u16, name: &str) -> Self {
        Self {
            number,
            name: name.to_string(),
            acquire: true,
            data_type: None,
            default: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.acquire = false;
        self
    }

    pub fn typed(mut self, dtype: DataType) -> Self {
        self.data_type = Some(dtype);
        self
    }

    pub fn with_default(mut self, raw: i64) -> Self {
        self.default = Some(raw);
        self
    }

    /// Decode the pinned default, if the catalog carries one.
    pub fn default_value(&self, dtype: DataType) -> Option<Result<ParameterValue, DecodeError>> {
        self.default.map(|raw| decode(&raw.to_le_bytes(), dtype))
    }
}
