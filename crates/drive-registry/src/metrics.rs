use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct AcquisitionMetrics {
    pub batches_sent: IntCounter,
    pub batches_failed: IntCounter,
    pub fallback_reads: IntCounter,
    pub fallback_failures: IntCounter,
    pub record_warnings: IntCounter,
    pub parameters_acquired: IntCounter,
    pub models_loaded: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub acq: AcquisitionMetrics,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, String> {
    IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let acq = AcquisitionMetrics {
            batches_sent: counter("drv_scattered_batches", "Scattered read batches sent")?,
            batches_failed: counter(
                "drv_scattered_batches_failed",
                "Scattered read batches that fell back to individual reads",
            )?,
            fallback_reads: counter("drv_fallback_reads", "Individual parameter reads attempted")?,
            fallback_failures: counter(
                "drv_fallback_failures",
                "Individual parameter reads that failed",
            )?,
            record_warnings: counter(
                "drv_record_warnings",
                "Scattered records with error flag or number mismatch",
            )?,
            parameters_acquired: counter("drv_parameters_acquired", "Parameters acquired")?,
            models_loaded: IntGauge::new("drv_models_loaded", "Number of device models registered")
                .map_err(|e| format!("metrics init error: {e}"))?,
        };
        let _ = registry.register(Box::new(acq.batches_sent.clone()));
        let _ = registry.register(Box::new(acq.batches_failed.clone()));
        let _ = registry.register(Box::new(acq.fallback_reads.clone()));
        let _ = registry.register(Box::new(acq.fallback_failures.clone()));
        let _ = registry.register(Box::new(acq.record_warnings.clone()));
        let _ = registry.register(Box::new(acq.parameters_acquired.clone()));
        let _ = registry.register(Box::new(acq.models_loaded.clone()));
        Ok(Self { registry, acq })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
