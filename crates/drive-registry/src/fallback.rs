use crate::{
    decode, params, AcquireError, AcquisitionMetrics, ParameterCatalog, ParameterDefinition,
    ParameterResult, TypeCache,
};
use cip_transport::ExplicitMessaging;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Reads parameters one at a time when a batch cannot be trusted.
pub struct FallbackReader<'a, T: ExplicitMessaging + ?Sized> {
    session: &'a mut T,
    cache: &'a mut TypeCache,
    catalog: &'a ParameterCatalog,
    metrics: Option<&'a AcquisitionMetrics>,
}

impl<'a, T: ExplicitMessaging + ?Sized> FallbackReader<'a, T> {
    pub fn new(session: &'a mut T, cache: &'a mut TypeCache, catalog: &'a ParameterCatalog) -> Self {
        Self {
            session,
            cache,
            catalog,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<&'a AcquisitionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Best-effort read of every number; a failed parameter is left out.
    pub fn read_individually(&mut self, numbers: &[u16]) -> BTreeMap<u16, ParameterResult> {
        let mut out = BTreeMap::new();
        for &number in numbers {
            if let Some(m) = self.metrics {
                m.fallback_reads.inc();
            }
            match self.read_one(number) {
                Ok(result) => {
                    out.insert(number, result);
                }
                Err(e) => {
                    if let Some(m) = self.metrics {
                        m.fallback_failures.inc();
                    }
                    warn!(param = number, error = %e, "individual read failed");
                }
            }
        }
        debug!(
            requested = numbers.len(),
            recovered = out.len(),
            "individual reads done"
        );
        out
    }

    /// Value, type and (if unknown) default of a single parameter.
    pub fn read_one(&mut self, number: u16) -> Result<ParameterResult, AcquireError> {
        let def = match self.catalog.get(number) {
            Some(def) => def.clone(),
            None => ParameterDefinition::new(number, &format!("Parameter {number}")),
        };
        let dtype = self.cache.resolve_type(&mut *self.session, &def)?;
        let raw = params::read_parameter(&mut *self.session, number)?;
        let value = decode(&raw, dtype)?;
        let default = self.cache.resolve_default(&mut *self.session, &def, dtype);
        Ok(ParameterResult {
            number,
            name: def.name,
            data_type: dtype,
            value,
            default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataType, ParameterValue};
    use cip_transport::{consts, DeviceIdentity, MockParameter, MockSession};

    fn setup() -> (MockSession, ParameterCatalog) {
        let bus = MockSession::new(DeviceIdentity::new(1, 0x8E, 10, 9, 8))
            .with_parameter(
                1,
                MockParameter::new("Output Freq", 0xC7, &[0x0A, 0x00]).with_default(&[0x00, 0x00]),
            )
            .with_parameter(2, MockParameter::new("Output Current", 0xC3, &[0xFF, 0xFF]))
            .with_parameter(3, MockParameter::new("Drive Status", 0xD2, &[0x05, 0x00]));
        let catalog = ParameterCatalog::new(
            "test",
            vec![
                ParameterDefinition::new(1, "Output Freq"),
                ParameterDefinition::new(2, "Output Current"),
                ParameterDefinition::new(3, "Drive Status").typed(DataType::Word),
            ],
        )
        .unwrap();
        (bus, catalog)
    }

    #[test]
    fn test_reads_each_parameter() {
        let (mut bus, catalog) = setup();
        let mut cache = TypeCache::new();
        let out = FallbackReader::new(&mut bus, &mut cache, &catalog).read_individually(&[1, 2, 3]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[&1].value, ParameterValue::UInt(10));
        assert_eq!(out[&1].default, Some(ParameterValue::UInt(0)));
        assert_eq!(out[&2].value, ParameterValue::Int(-1));
        assert_eq!(out[&2].default, None);
        assert_eq!(out[&3].value, ParameterValue::Bits("0000000000000101".into()));
        assert_eq!(bus.count_attribute_reads(consts::ATTR_VALUE), 3);
    }

    #[test]
    fn test_failures_do_not_abort() {
        let (mut bus, catalog) = setup();
        bus.faults_mut().fail_values.insert(2);
        let mut cache = TypeCache::new();
        let out = FallbackReader::new(&mut bus, &mut cache, &catalog).read_individually(&[1, 2, 3, 9]);
        assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_failing_default_read_keeps_value() {
        let (mut bus, catalog) = setup();
        bus.faults_mut().fail_defaults = true;
        let mut cache = TypeCache::new();
        let out = FallbackReader::new(&mut bus, &mut cache, &catalog).read_individually(&[1]);
        assert_eq!(out[&1].value, ParameterValue::UInt(10));
        assert_eq!(out[&1].default, None);
        assert_eq!(bus.count_attribute_reads(consts::ATTR_DEFAULT), 1);
    }

    #[test]
    fn test_unknown_parameter_gets_placeholder_name() {
        let (mut bus, _) = setup();
        let empty = ParameterCatalog::new("empty", Vec::new()).unwrap();
        let mut cache = TypeCache::new();
        let r = FallbackReader::new(&mut bus, &mut cache, &empty)
            .read_one(1)
            .unwrap();
        assert_eq!(r.name, "Parameter 1");
    }
}
