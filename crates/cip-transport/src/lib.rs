//! cip-transport: explicit-messaging seam for CIP devices
//!
//! This crate defines the request/response primitive that parameter acquisition
//! is built on: send service X to class Y / instance Z with a payload, get raw
//! bytes back. Session registration and encapsulation live behind the
//! [`ExplicitMessaging`] trait. The default build enables a `mock` backend that
//! simulates a drive in-process so binaries and tests run without hardware.

mod types;
pub use types::{consts, DeviceIdentity, EPath, ExplicitRequest};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::ExplicitMessaging;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockFaults, MockParameter, MockSession};
