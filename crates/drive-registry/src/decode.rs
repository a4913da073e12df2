use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Elementary data types a Parameter Object can report (attribute 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Bool,
    Sint,
    Int,
    Dint,
    Lint,
    Usint,
    Uint,
    Udint,
    Ulint,
    Real,
    Byte,
    Word,
    Dword,
    Lword,
}

impl DataType {
    pub const ALL: [DataType; 14] = [
        DataType::Bool,
        DataType::Sint,
        DataType::Int,
        DataType::Dint,
        DataType::Lint,
        DataType::Usint,
        DataType::Uint,
        DataType::Udint,
        DataType::Ulint,
        DataType::Real,
        DataType::Byte,
        DataType::Word,
        DataType::Dword,
        DataType::Lword,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    pub fn code(self) -> u8 {
        match self {
            DataType::Bool => 0xC1,
            DataType::Sint => 0xC2,
            DataType::Int => 0xC3,
            DataType::Dint => 0xC4,
            DataType::Lint => 0xC5,
            DataType::Usint => 0xC6,
            DataType::Uint => 0xC7,
            DataType::Udint => 0xC8,
            DataType::Ulint => 0xC9,
            DataType::Real => 0xCA,
            DataType::Byte => 0xD1,
            DataType::Word => 0xD2,
            DataType::Dword => 0xD3,
            DataType::Lword => 0xD4,
        }
    }

    /// Encoded width in bytes.
    pub fn width(self) -> usize {
        match self {
            DataType::Bool | DataType::Sint | DataType::Usint | DataType::Byte => 1,
            DataType::Int | DataType::Uint | DataType::Word => 2,
            DataType::Dint | DataType::Udint | DataType::Real | DataType::Dword => 4,
            DataType::Lint | DataType::Ulint | DataType::Lword => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::Sint | DataType::Int | DataType::Dint | DataType::Lint
        )
    }

    pub fn is_bit_string(self) -> bool {
        matches!(
            self,
            DataType::Byte | DataType::Word | DataType::Dword | DataType::Lword
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Bool => "BOOL",
            DataType::Sint => "SINT",
            DataType::Int => "INT",
            DataType::Dint => "DINT",
            DataType::Lint => "LINT",
            DataType::Usint => "USINT",
            DataType::Uint => "UINT",
            DataType::Udint => "UDINT",
            DataType::Ulint => "ULINT",
            DataType::Real => "REAL",
            DataType::Byte => "BYTE",
            DataType::Word => "WORD",
            DataType::Dword => "DWORD",
            DataType::Lword => "LWORD",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str().eq_ignore_ascii_case(t))
            .ok_or_else(|| DecodeError::UnknownTypeName(t.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no bytes to decode")]
    Empty,
    #[error("unsupported data type code 0x{0:02X}")]
    UnsupportedType(u8),
    #[error("unknown data type name: {0}")]
    UnknownTypeName(String),
    #[error("{dtype} needs {need} bytes, got {got}")]
    TooShort {
        dtype: DataType,
        need: usize,
        got: usize,
    },
}

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Real(f64),
    /// Fixed-length bit string, most significant bit first.
    Bits(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(b) => write!(f, "{b}"),
            ParameterValue::Int(v) => write!(f, "{v}"),
            ParameterValue::UInt(v) => write!(f, "{v}"),
            ParameterValue::Real(v) => write!(f, "{v}"),
            ParameterValue::Bits(s) => f.write_str(s),
        }
    }
}

/// Interpret little-endian `raw` bytes as `dtype`.
///
/// Integer and bit-string inputs shorter than the type width are widened
/// (sign-extended for signed types); bytes past the width are ignored.
pub fn decode(raw: &[u8], dtype: DataType) -> Result<ParameterValue, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    let value = match dtype {
        DataType::Bool => ParameterValue::Bool(raw[0] != 0),
        DataType::Real => {
            if raw.len() < 4 {
                return Err(DecodeError::TooShort {
                    dtype,
                    need: 4,
                    got: raw.len(),
                });
            }
            let v = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            ParameterValue::Real(v as f64)
        }
        t if t.is_signed() => ParameterValue::Int(i64::from_le_bytes(widen(raw, t.width(), true))),
        t if t.is_bit_string() => {
            let v = u64::from_le_bytes(widen(raw, t.width(), false));
            ParameterValue::Bits(format!("{v:0bits$b}", bits = t.width() * 8))
        }
        t => ParameterValue::UInt(u64::from_le_bytes(widen(raw, t.width(), false))),
    };
    Ok(value)
}

fn widen(raw: &[u8], width: usize, signed: bool) -> [u8; 8] {
    let n = raw.len().min(width);
    let negative = signed && raw[n - 1] & 0x80 != 0;
    let mut buf = if negative { [0xFF; 8] } else { [0u8; 8] };
    buf[..n].copy_from_slice(&raw[..n]);
    buf
}
