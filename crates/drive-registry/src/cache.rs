use crate::{decode, params, AcquireError, DataType, ParameterDefinition, ParameterValue};
use cip_transport::ExplicitMessaging;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Per-session runtime annotations: resolved data types and default values.
///
/// Each parameter costs at most one type round-trip and one default round-trip
/// per session; failures are remembered so they are not retried.
#[derive(Debug, Default, Clone)]
pub struct TypeCache {
    types: HashMap<u16, Option<DataType>>,
    defaults: HashMap<u16, Option<ParameterValue>>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data type already known for `number`, without touching the device.
    pub fn known_type(&self, number: u16) -> Option<DataType> {
        self.types.get(&number).copied().flatten()
    }

    pub fn resolve_type<T: ExplicitMessaging + ?Sized>(
        &mut self,
        session: &mut T,
        def: &ParameterDefinition,
    ) -> Result<DataType, AcquireError> {
        if let Some(t) = def.data_type {
            return Ok(t);
        }
        if let Some(cached) = self.types.get(&def.number) {
            return cached.ok_or(AcquireError::TypeUnavailable(def.number));
        }
        match params::read_parameter_type(session, def.number) {
            Ok(t) => {
                debug!(param = def.number, dtype = %t, "resolved data type");
                self.types.insert(def.number, Some(t));
                Ok(t)
            }
            Err(e) => {
                warn!(param = def.number, error = %e, "data type read failed");
                self.types.insert(def.number, None);
                Err(e)
            }
        }
    }

    /// Default value of `def`; never fails, a missing default is `None`.
    pub fn resolve_default<T: ExplicitMessaging + ?Sized>(
        &mut self,
        session: &mut T,
        def: &ParameterDefinition,
        dtype: DataType,
    ) -> Option<ParameterValue> {
        if let Some(pinned) = def.default_value(dtype) {
            return pinned.ok();
        }
        if let Some(cached) = self.defaults.get(&def.number) {
            return cached.clone();
        }
        let value = params::read_parameter_default(session, def.number)
            .and_then(|raw| decode(&raw, dtype).map_err(AcquireError::from));
        let value = match value {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(param = def.number, error = %e, "default value unavailable");
                None
            }
        };
        self.defaults.insert(def.number, value.clone());
        value
    }
}
