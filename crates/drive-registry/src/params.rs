//! Single-parameter reads against the standard Parameter Object (class 0x0F).

use crate::{AcquireError, DataType, DecodeError};
use cip_transport::{consts, EPath, ExplicitMessaging, ExplicitRequest};

/// Current value (attribute 1) as raw bytes.
pub fn read_parameter<T: ExplicitMessaging + ?Sized>(
    session: &mut T,
    number: u16,
) -> Result<Vec<u8>, AcquireError> {
    read_attribute(session, number, consts::ATTR_VALUE)
}

/// Default value (attribute 12) as raw bytes.
pub fn read_parameter_default<T: ExplicitMessaging + ?Sized>(
    session: &mut T,
    number: u16,
) -> Result<Vec<u8>, AcquireError> {
    read_attribute(session, number, consts::ATTR_DEFAULT)
}

/// Data type code (attribute 5) mapped onto [`DataType`].
pub fn read_parameter_type<T: ExplicitMessaging + ?Sized>(
    session: &mut T,
    number: u16,
) -> Result<DataType, AcquireError> {
    let raw = read_attribute(session, number, consts::ATTR_DATA_TYPE)?;
    let code = *raw
        .first()
        .ok_or(AcquireError::MalformedResponse("empty data type reply"))?;
    DataType::from_code(code).ok_or(AcquireError::Decode(DecodeError::UnsupportedType(code)))
}

/// Parameter name (attribute 7), a SHORT_STRING.
pub fn read_parameter_name<T: ExplicitMessaging + ?Sized>(
    session: &mut T,
    number: u16,
) -> Result<String, AcquireError> {
    let raw = read_attribute(session, number, consts::ATTR_NAME)?;
    let len = *raw
        .first()
        .ok_or(AcquireError::MalformedResponse("empty name reply"))? as usize;
    let bytes = raw
        .get(1..1 + len)
        .ok_or(AcquireError::MalformedResponse("name truncated"))?;
    Ok(String::from_utf8_lossy(bytes).trim_end().to_string())
}

/// Highest instance number of the Parameter Object (class attribute 2).
pub fn read_max_parameter_number<T: ExplicitMessaging + ?Sized>(
    session: &mut T,
) -> Result<u16, AcquireError> {
    let req = ExplicitRequest::get_attribute(consts::CLASS_PARAMETER, 0, consts::ATTR_MAX_INSTANCE);
    let raw = session.send_explicit(&req)?;
    match raw.as_slice() {
        [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
        _ => Err(AcquireError::MalformedResponse("max instance reply too short")),
    }
}

/// Generic escape hatch for model-specific services.
pub fn send_explicit_message<T: ExplicitMessaging + ?Sized>(
    session: &mut T,
    service: u8,
    class: u16,
    instance: u16,
    payload: &[u8],
) -> Result<Vec<u8>, AcquireError> {
    let req = ExplicitRequest::new(service, EPath::instance(class, instance), payload.to_vec());
    Ok(session.send_explicit(&req)?)
}

fn read_attribute<T: ExplicitMessaging + ?Sized>(
    session: &mut T,
    number: u16,
    attribute: u16,
) -> Result<Vec<u8>, AcquireError> {
    let req = ExplicitRequest::get_attribute(consts::CLASS_PARAMETER, number, attribute);
    Ok(session.send_explicit(&req)?)
}
