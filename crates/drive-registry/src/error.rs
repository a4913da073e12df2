use crate::{CatalogError, DecodeError};
use cip_transport::{DeviceIdentity, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("unsupported device: {0}")]
    UnsupportedDevice(DeviceIdentity),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("data type of parameter {0} is unavailable")]
    TypeUnavailable(u16),
}
