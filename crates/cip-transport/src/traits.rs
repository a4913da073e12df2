use crate::{consts, DeviceIdentity, EPath, ExplicitRequest, Result};

/// A minimal blocking explicit-messaging session.
///
/// One request is in flight at a time; implementations are not expected to be
/// shared between threads. Timeouts are the implementation's concern and
/// surface as [`crate::TransportError::Timeout`].
pub trait ExplicitMessaging {
    /// Send one request and return the raw service response data.
    fn send_explicit(&mut self, req: &ExplicitRequest) -> Result<Vec<u8>>;

    /// Read the Identity Object (class 0x01, instance 1) of the connected device.
    fn identity(&mut self) -> Result<DeviceIdentity> {
        let req = ExplicitRequest::new(
            consts::GET_ATTRIBUTES_ALL,
            EPath::instance(consts::CLASS_IDENTITY, 1),
            Vec::new(),
        );
        let raw = self.send_explicit(&req)?;
        DeviceIdentity::parse(&raw)
    }
}

impl<T: ExplicitMessaging + ?Sized> ExplicitMessaging for Box<T> {
    fn send_explicit(&mut self, req: &ExplicitRequest) -> Result<Vec<u8>> {
        (**self).send_explicit(req)
    }

    fn identity(&mut self) -> Result<DeviceIdentity> {
        (**self).identity()
    }
}
