use crate::{
    chunk_batches, decode, params, AcquireError, AcquisitionMetrics, AcquisitionStrategy,
    DataType, DeviceModelDescriptor, FallbackReader, ParameterCatalog, ParameterValue,
    ScatteredRead, TypeCache,
};
use cip_transport::ExplicitMessaging;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Caller-supplied switches for one acquisition run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireOptions {
    /// Also read parameters not flagged for acquisition.
    #[serde(default)]
    pub acquire_all_records: bool,
    /// Log per-batch progress at info level.
    #[serde(default)]
    pub verbose: bool,
}

/// One acquired parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterResult {
    pub number: u16,
    pub name: String,
    pub data_type: DataType,
    pub value: ParameterValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParameterValue>,
}

/// Progress handed to the caller after every batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress {
    pub batch: usize,
    pub batches: usize,
    pub acquired: usize,
    pub fell_back: bool,
}

/// Outcome of an acquisition run, keyed by parameter number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionReport {
    pub run_id: Uuid,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    pub results: BTreeMap<u16, ParameterResult>,
    /// Selected parameters for which no value was obtained.
    pub missing: Vec<u16>,
    pub batches: usize,
    pub failed_batches: usize,
    pub fallback_reads: usize,
    /// False when the caller stopped the run between batches.
    pub completed: bool,
}

/// Acquisition driver for one connected device.
///
/// Owns the device's session; every read is issued sequentially on it. The
/// catalog is shared and never written; resolved types, defaults and values
/// live in this driver.
pub struct DriveSession<T: ExplicitMessaging> {
    model: String,
    catalog: Arc<ParameterCatalog>,
    strategy: AcquisitionStrategy,
    options: AcquireOptions,
    session: T,
    cache: TypeCache,
    metrics: Option<AcquisitionMetrics>,
}

impl<T: ExplicitMessaging> DriveSession<T> {
    pub fn new(model: &DeviceModelDescriptor, session: T, options: AcquireOptions) -> Self {
        Self {
            model: model.name.clone(),
            catalog: Arc::clone(&model.catalog),
            strategy: model.strategy,
            options,
            session,
            cache: TypeCache::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: AcquisitionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn catalog(&self) -> &ParameterCatalog {
        &self.catalog
    }

    pub fn transport(&self) -> &T {
        &self.session
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.session
    }

    pub fn into_inner(self) -> T {
        self.session
    }

    pub fn read_parameter(&mut self, number: u16) -> Result<Vec<u8>, AcquireError> {
        params::read_parameter(&mut self.session, number)
    }

    pub fn read_parameter_default(&mut self, number: u16) -> Result<Vec<u8>, AcquireError> {
        params::read_parameter_default(&mut self.session, number)
    }

    pub fn read_parameter_type(&mut self, number: u16) -> Result<DataType, AcquireError> {
        params::read_parameter_type(&mut self.session, number)
    }

    pub fn read_parameter_name(&mut self, number: u16) -> Result<String, AcquireError> {
        params::read_parameter_name(&mut self.session, number)
    }

    pub fn read_max_parameter_number(&mut self) -> Result<u16, AcquireError> {
        params::read_max_parameter_number(&mut self.session)
    }

    pub fn send_explicit_message(
        &mut self,
        service: u8,
        class: u16,
        instance: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>, AcquireError> {
        params::send_explicit_message(&mut self.session, service, class, instance, payload)
    }

    /// Read every selected parameter of the model.
    pub fn acquire_all(&mut self) -> AcquisitionReport {
        self.acquire_with(|_| ControlFlow::Continue(()))
    }

    /// Like [`Self::acquire_all`], calling `on_batch` after each batch; returning
    /// `Break` stops the run before the next batch starts.
    pub fn acquire_with<F>(&mut self, mut on_batch: F) -> AcquisitionReport
    where
        F: FnMut(&BatchProgress) -> ControlFlow<()>,
    {
        let mut report = AcquisitionReport {
            run_id: Uuid::new_v4(),
            model: self.model.clone(),
            started_at: OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .ok(),
            results: BTreeMap::new(),
            missing: Vec::new(),
            batches: 0,
            failed_batches: 0,
            fallback_reads: 0,
            completed: true,
        };
        info!(
            run = %report.run_id,
            model = %self.model,
            all_records = self.options.acquire_all_records,
            "acquisition started"
        );

        let selected = self.select_parameters(&mut report);
        let batch_limit = self.strategy.batch_limit();
        let batches = chunk_batches(&selected, batch_limit);
        let total = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            report.batches += 1;
            let fell_back = match self.strategy {
                AcquisitionStrategy::Standard => {
                    self.read_each(batch, &mut report);
                    false
                }
                AcquisitionStrategy::Scattered(sr) => self.run_batch(&sr, batch, &mut report),
            };
            let progress = BatchProgress {
                batch: i + 1,
                batches: total,
                acquired: report.results.len(),
                fell_back,
            };
            if self.options.verbose {
                info!(
                    batch = progress.batch,
                    of = total,
                    acquired = progress.acquired,
                    fell_back,
                    "batch complete"
                );
            }
            if on_batch(&progress).is_break() && i + 1 < total {
                info!(batch = i + 1, of = total, "acquisition stopped by caller");
                report.completed = false;
                break;
            }
        }

        let unread: Vec<u16> = selected
            .iter()
            .copied()
            .filter(|n| !report.results.contains_key(n))
            .collect();
        report.missing.extend(unread);
        report.missing.sort_unstable();
        if let Some(m) = &self.metrics {
            m.parameters_acquired.inc_by(report.results.len() as u64);
        }
        info!(
            run = %report.run_id,
            acquired = report.results.len(),
            missing = report.missing.len(),
            failed_batches = report.failed_batches,
            "acquisition finished"
        );
        report
    }

    // Parameters to read, with their data types resolved. Parameters whose
    // type cannot be resolved are reported missing straight away.
    fn select_parameters(&mut self, report: &mut AcquisitionReport) -> Vec<u16> {
        let catalog = Arc::clone(&self.catalog);
        let wanted = catalog.parameters_to_acquire(self.options.acquire_all_records);
        let mut selected = Vec::with_capacity(wanted.len());
        for def in wanted {
            match self.cache.resolve_type(&mut self.session, def) {
                Ok(_) => selected.push(def.number),
                Err(e) => {
                    warn!(param = def.number, error = %e, "skipping parameter without data type");
                    report.missing.push(def.number);
                }
            }
        }
        debug!(
            selected = selected.len(),
            skipped = report.missing.len(),
            "parameters selected"
        );
        selected
    }

    // Returns true when any part of the batch went through individual reads.
    fn run_batch(
        &mut self,
        sr: &ScatteredRead,
        batch: &[u16],
        report: &mut AcquisitionReport,
    ) -> bool {
        if let Some(m) = &self.metrics {
            m.batches_sent.inc();
        }
        let raw = match sr.read_batch(&mut self.session, batch) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    first = batch.first().copied(),
                    len = batch.len(),
                    error = %e,
                    "scattered read failed, reading individually"
                );
                if let Some(m) = &self.metrics {
                    m.batches_failed.inc();
                }
                report.failed_batches += 1;
                self.read_individually(batch, report);
                return true;
            }
        };
        if let Some(m) = &self.metrics {
            m.record_warnings.inc_by(raw.warnings() as u64);
        }

        let catalog = Arc::clone(&self.catalog);
        let mut leftover = Vec::new();
        for &number in batch {
            let Some(bytes) = raw.get(number) else {
                leftover.push(number);
                continue;
            };
            let Some(def) = catalog.get(number) else {
                continue;
            };
            let Some(dtype) = def.data_type.or_else(|| self.cache.known_type(number)) else {
                leftover.push(number);
                continue;
            };
            match decode(&bytes, dtype) {
                Ok(value) => {
                    let default = self.cache.resolve_default(&mut self.session, def, dtype);
                    report.results.insert(
                        number,
                        ParameterResult {
                            number,
                            name: def.name.clone(),
                            data_type: dtype,
                            value,
                            default,
                        },
                    );
                }
                Err(e) => {
                    debug!(param = number, error = %e, "batch value not decodable");
                    leftover.push(number);
                }
            }
        }
        if leftover.is_empty() {
            return false;
        }
        debug!(count = leftover.len(), "reading batch leftovers individually");
        self.read_individually(&leftover, report);
        true
    }

    // Recovery reads after a failed or partial batch; counted as fallback.
    fn read_individually(&mut self, numbers: &[u16], report: &mut AcquisitionReport) {
        report.fallback_reads += numbers.len();
        let recovered = FallbackReader::new(&mut self.session, &mut self.cache, &self.catalog)
            .with_metrics(self.metrics.as_ref())
            .read_individually(numbers);
        report.results.extend(recovered);
    }

    // Plain per-parameter reads of the standard strategy.
    fn read_each(&mut self, numbers: &[u16], report: &mut AcquisitionReport) {
        let read = FallbackReader::new(&mut self.session, &mut self.cache, &self.catalog)
            .read_individually(numbers);
        report.results.extend(read);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MatchRule, ParameterDefinition};
    use cip_transport::{consts, DeviceIdentity, MockParameter, MockSession};

    const UINT: u8 = 0xC7;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new(1, 0x8E, 10, 9, 8)
    }

    fn rule() -> MatchRule {
        MatchRule::Exact {
            vendor_id: 1,
            product_code: 10,
            major_revision: 9,
            minor_revision: 8,
        }
    }

    // Parameters 1..=count, value = number * 10, every third one optional.
    fn model(count: u16, strategy: AcquisitionStrategy) -> DeviceModelDescriptor {
        let params = (1..=count)
            .map(|n| {
                let p = ParameterDefinition::new(n, &format!("P{n}"));
                if n % 3 == 0 {
                    p.optional()
                } else {
                    p
                }
            })
            .collect();
        let catalog = ParameterCatalog::new("test-drive", params).unwrap();
        DeviceModelDescriptor::new("test-drive", rule(), catalog, strategy).unwrap()
    }

    fn drive(count: u16) -> MockSession {
        let mut bus = MockSession::new(identity()).with_scattered_read(consts::CLASS_DPI_PARAMETER, 0);
        for n in 1..=count {
            bus.insert_parameter(
                n,
                MockParameter::new(&format!("P{n}"), UINT, &(n * 10).to_le_bytes())
                    .with_default(&[0x00, 0x00]),
            );
        }
        bus
    }

    fn scattered(limit: usize) -> AcquisitionStrategy {
        AcquisitionStrategy::Scattered(ScatteredRead {
            batch_limit: limit,
            ..Default::default()
        })
    }

    fn all_records() -> AcquireOptions {
        AcquireOptions {
            acquire_all_records: true,
            verbose: false,
        }
    }

    #[test]
    fn test_scattered_happy_path() {
        let m = model(130, scattered(60));
        let mut drv = m.open(drive(130), all_records());
        let report = drv.acquire_all();
        assert!(report.completed);
        assert_eq!(report.results.len(), 130);
        assert_eq!(report.batches, 3);
        assert_eq!(report.failed_batches, 0);
        assert_eq!(report.fallback_reads, 0);
        assert!(report.missing.is_empty());
        assert_eq!(report.results[&77].value, ParameterValue::UInt(770));
        let bus = drv.transport();
        assert_eq!(bus.count_service(consts::SCATTERED_READ), 3);
        assert_eq!(bus.count_attribute_reads(consts::ATTR_VALUE), 0);
        // types resolved once each during selection
        assert_eq!(bus.count_attribute_reads(consts::ATTR_DATA_TYPE), 130);
    }

    #[test]
    fn test_flagged_subset_only() {
        let m = model(9, scattered(60));
        let report = m.open(drive(9), AcquireOptions::default()).acquire_all();
        assert_eq!(
            report.results.keys().copied().collect::<Vec<_>>(),
            vec![1, 2, 4, 5, 7, 8]
        );
    }

    #[test]
    fn test_failed_batch_falls_back_per_parameter() {
        let m = model(10, scattered(4));
        let mut bus = drive(10);
        bus.faults_mut().fail_scattered = true;
        bus.faults_mut().fail_values.insert(6);
        let mut drv = m.open(bus, all_records());
        let report = drv.acquire_all();
        assert_eq!(report.batches, 3);
        assert_eq!(report.failed_batches, 3);
        assert_eq!(report.fallback_reads, 10);
        assert_eq!(drv.transport().count_attribute_reads(consts::ATTR_VALUE), 10);
        assert_eq!(report.results.len(), 9);
        assert!(!report.results.contains_key(&6));
        assert_eq!(report.missing, vec![6]);
        assert_eq!(report.results[&2].default, Some(ParameterValue::UInt(0)));
    }

    #[test]
    fn test_error_flag_keeps_value() {
        let m = model(4, scattered(60));
        let mut bus = drive(4);
        bus.faults_mut().error_flagged.insert(2);
        let report = m.open(bus, all_records()).acquire_all();
        assert_eq!(report.results[&2].value, ParameterValue::UInt(20));
        assert_eq!(report.fallback_reads, 0);
    }

    #[test]
    fn test_truncated_reply_reads_rest_individually() {
        let m = model(5, scattered(60));
        let mut bus = drive(5);
        bus.faults_mut().truncate_scattered = Some(9);
        let mut drv = m.open(bus, all_records());
        let report = drv.acquire_all();
        assert_eq!(report.results.len(), 5);
        assert_eq!(report.failed_batches, 0);
        assert_eq!(report.fallback_reads, 3);
        assert_eq!(drv.transport().count_attribute_reads(consts::ATTR_VALUE), 3);
    }

    #[test]
    fn test_reordered_reply_keeps_positional_values() {
        let m = model(3, scattered(60));
        let mut bus = drive(3);
        bus.faults_mut().reverse_scattered = true;
        let report = m.open(bus, all_records()).acquire_all();
        // values land on the requested numbers in order, whatever the device echoed
        assert_eq!(report.results[&1].value, ParameterValue::UInt(30));
        assert_eq!(report.results[&2].value, ParameterValue::UInt(20));
        assert_eq!(report.results[&3].value, ParameterValue::UInt(10));
        assert_eq!(report.fallback_reads, 0);
    }

    #[test]
    fn test_standard_strategy_reads_each_parameter() {
        let m = model(6, AcquisitionStrategy::Standard);
        let mut drv = m.open(drive(6), all_records());
        let report = drv.acquire_all();
        assert_eq!(report.results.len(), 6);
        assert_eq!(report.batches, 6);
        assert_eq!(report.fallback_reads, 0);
        assert_eq!(report.failed_batches, 0);
        let bus = drv.transport();
        assert_eq!(bus.count_service(consts::SCATTERED_READ), 0);
        assert_eq!(bus.count_attribute_reads(consts::ATTR_VALUE), 6);
    }

    #[test]
    fn test_standard_strategy_metrics_not_fallback() {
        let hub = crate::MetricsHub::new().unwrap();
        let m = model(3, AcquisitionStrategy::Standard);
        let report = m
            .open(drive(3), all_records())
            .with_metrics(hub.acq.clone())
            .acquire_all();
        assert_eq!(report.results.len(), 3);
        assert_eq!(hub.acq.fallback_reads.get(), 0);
        assert_eq!(hub.acq.batches_sent.get(), 0);
        assert_eq!(hub.acq.parameters_acquired.get(), 3);
    }

    #[test]
    fn test_default_same_on_batch_and_fallback_paths() {
        let build = || {
            MockSession::new(identity())
                .with_scattered_read(consts::CLASS_DPI_PARAMETER, 0)
                .with_parameter(
                    1,
                    MockParameter::new("P1", UINT, &[0x0A, 0x00]).with_default(&[0x07, 0x00]),
                )
                .with_parameter(
                    2,
                    MockParameter::new("P2", UINT, &[0x14, 0x00]).with_default(&[0x09, 0x00]),
                )
        };
        let m = model(2, scattered(60));

        let mut drv = m.open(build(), all_records());
        let batch = drv.acquire_all();
        assert_eq!(batch.fallback_reads, 0);
        assert_eq!(drv.transport().count_attribute_reads(consts::ATTR_DEFAULT), 2);

        let mut bus = build();
        bus.faults_mut().fail_scattered = true;
        let fallback = m.open(bus, all_records()).acquire_all();
        assert_eq!(fallback.failed_batches, 1);

        for n in [1, 2] {
            assert_eq!(batch.results[&n].default, fallback.results[&n].default);
        }
        assert_eq!(batch.results[&1].default, Some(ParameterValue::UInt(7)));
        assert_eq!(batch.results[&2].default, Some(ParameterValue::UInt(9)));
    }

    #[test]
    fn test_batch_default_failure_keeps_value() {
        let m = model(2, scattered(60));
        let mut bus = drive(2);
        bus.faults_mut().fail_defaults = true;
        let report = m.open(bus, all_records()).acquire_all();
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[&1].value, ParameterValue::UInt(10));
        assert_eq!(report.results[&1].default, None);
        assert_eq!(report.fallback_reads, 0);
    }

    #[test]
    fn test_type_failure_skips_only_that_parameter() {
        let m = model(4, scattered(60));
        let mut bus = drive(4);
        bus.faults_mut().fail_types.insert(3);
        let report = m.open(bus, all_records()).acquire_all();
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.missing, vec![3]);
    }

    #[test]
    fn test_stop_between_batches() {
        let m = model(20, scattered(5));
        let mut drv = m.open(drive(20), all_records());
        let report = drv.acquire_with(|p| {
            if p.batch == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert!(!report.completed);
        assert_eq!(report.batches, 2);
        assert_eq!(report.results.len(), 10);
        assert_eq!(report.missing.len(), 10);
    }

    #[test]
    fn test_undecodable_batch_value_read_individually() {
        let params = vec![
            ParameterDefinition::new(1, "Speed"),
            ParameterDefinition::new(2, "Gain").typed(DataType::Real),
        ];
        let catalog = ParameterCatalog::new("real-drive", params).unwrap();
        let m = DeviceModelDescriptor::new("real-drive", rule(), catalog, scattered(60)).unwrap();
        let bus = MockSession::new(identity())
            .with_scattered_read(consts::CLASS_DPI_PARAMETER, 0)
            .with_parameter(1, MockParameter::new("Speed", UINT, &[0x10, 0x00]))
            .with_parameter(2, MockParameter::new("Gain", 0xCA, &2.5f32.to_le_bytes()));
        let report = m.open(bus, all_records()).acquire_all();
        assert_eq!(report.results[&2].value, ParameterValue::Real(2.5));
        assert_eq!(report.fallback_reads, 1);
    }

    #[test]
    fn test_metrics_counted() {
        let hub = crate::MetricsHub::new().unwrap();
        let m = model(8, scattered(4));
        let mut bus = drive(8);
        bus.faults_mut().fail_scattered = true;
        let report = m
            .open(bus, all_records())
            .with_metrics(hub.acq.clone())
            .acquire_all();
        assert_eq!(report.results.len(), 8);
        assert_eq!(hub.acq.batches_sent.get(), 2);
        assert_eq!(hub.acq.batches_failed.get(), 2);
        assert_eq!(hub.acq.fallback_reads.get(), 8);
        assert_eq!(hub.acq.parameters_acquired.get(), 8);
    }

    #[test]
    fn test_direct_reads() {
        let m = model(4, scattered(60));
        let mut drv = m.open(drive(4), AcquireOptions::default());
        assert_eq!(drv.read_parameter(2).unwrap(), vec![20, 0]);
        assert_eq!(drv.read_parameter_type(2).unwrap(), DataType::Uint);
        assert_eq!(drv.read_parameter_default(2).unwrap(), vec![0, 0]);
        assert_eq!(drv.read_parameter_name(4).unwrap(), "P4");
        assert_eq!(drv.read_max_parameter_number().unwrap(), 4);
        let raw = drv
            .send_explicit_message(consts::SCATTERED_READ, consts::CLASS_DPI_PARAMETER, 0, &[1, 0, 0, 0])
            .unwrap();
        assert_eq!(raw, vec![1, 0, 10, 0]);
    }

    #[test]
    fn test_report_serializes() {
        let m = model(2, AcquisitionStrategy::Standard);
        let report = m.open(drive(2), all_records()).acquire_all();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["model"], "test-drive");
        assert_eq!(json["results"]["1"]["value"], 10);
        assert_eq!(json["results"]["1"]["data_type"], "UINT");
    }
}
