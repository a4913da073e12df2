use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timeout")]
    Timeout,
    #[error("service error: general status 0x{general:02X}, extended {extended:?}")]
    ServiceError { general: u8, extended: Option<u16> },
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),
}
