use crate::{
    AcquireError, AcquireOptions, AcquisitionStrategy, CatalogError, CatalogFile, DriveSession,
    MatchSpec, ParameterCatalog, MAX_SCATTERED_BATCH,
};
use cip_transport::{DeviceIdentity, ExplicitMessaging};
use std::sync::Arc;
use tracing::{debug, info};

/// How a descriptor claims a device identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Vendor, product, major and minor revision all equal.
    Exact {
        vendor_id: u16,
        product_code: u16,
        major_revision: u8,
        minor_revision: u8,
    },
    /// Vendor, product and major equal; any minor at or above `min_minor`.
    Compatible {
        vendor_id: u16,
        product_code: u16,
        major_revision: u8,
        min_minor: u8,
    },
}

impl MatchRule {
    /// Match strength against `id`: 2 for exact, 1 for compatible.
    pub fn specificity(&self, id: &DeviceIdentity) -> Option<u8> {
        match *self {
            MatchRule::Exact {
                vendor_id,
                product_code,
                major_revision,
                minor_revision,
            } => (id.vendor_id == vendor_id
                && id.product_code == product_code
                && id.major_revision == major_revision
                && id.minor_revision == minor_revision)
                .then_some(2),
            MatchRule::Compatible {
                vendor_id,
                product_code,
                major_revision,
                min_minor,
            } => (id.vendor_id == vendor_id
                && id.product_code == product_code
                && id.major_revision == major_revision
                && id.minor_revision >= min_minor)
                .then_some(1),
        }
    }
}

impl From<&MatchSpec> for MatchRule {
    fn from(m: &MatchSpec) -> Self {
        if m.compatible {
            MatchRule::Compatible {
                vendor_id: m.vendor_id,
                product_code: m.product_code,
                major_revision: m.major_revision,
                min_minor: m.minor_revision,
            }
        } else {
            MatchRule::Exact {
                vendor_id: m.vendor_id,
                product_code: m.product_code,
                major_revision: m.major_revision,
                minor_revision: m.minor_revision,
            }
        }
    }
}

/// A supported drive model: its matching rule, catalog and read strategy.
#[derive(Debug, Clone)]
pub struct DeviceModelDescriptor {
    pub name: String,
    pub rule: MatchRule,
    pub catalog: Arc<ParameterCatalog>,
    pub strategy: AcquisitionStrategy,
}

impl DeviceModelDescriptor {
    pub fn new(
        name: impl Into<String>,
        rule: MatchRule,
        catalog: ParameterCatalog,
        strategy: AcquisitionStrategy,
    ) -> Result<Self, CatalogError> {
        if let AcquisitionStrategy::Scattered(sr) = &strategy {
            if sr.batch_limit == 0 || sr.batch_limit > MAX_SCATTERED_BATCH {
                return Err(CatalogError::InvalidBatchLimit {
                    limit: sr.batch_limit,
                    max: MAX_SCATTERED_BATCH,
                });
            }
        }
        Ok(Self {
            name: name.into(),
            rule,
            catalog: Arc::new(catalog),
            strategy,
        })
    }

    pub fn from_catalog_file(file: CatalogFile) -> Result<Self, CatalogError> {
        let rule = MatchRule::from(&file.r#match);
        let catalog = ParameterCatalog::new(file.model.clone(), file.parameters)?;
        Self::new(file.model, rule, catalog, file.strategy)
    }

    /// Build the acquisition driver for a connected device of this model.
    pub fn open<T: ExplicitMessaging>(&self, session: T, options: AcquireOptions) -> DriveSession<T> {
        DriveSession::new(self, session, options)
    }
}

/// Supported models in registration order.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    models: Vec<DeviceModelDescriptor>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, desc: DeviceModelDescriptor) {
        debug!(model = %desc.name, rule = ?desc.rule, "registered model");
        self.models.push(desc);
    }

    pub fn models(&self) -> &[DeviceModelDescriptor] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DeviceModelDescriptor> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Pick the model for `id`: exact matches beat compatible ones; among
    /// equals the first registered wins.
    pub fn resolve(&self, id: &DeviceIdentity) -> Result<&DeviceModelDescriptor, AcquireError> {
        let mut best: Option<(u8, &DeviceModelDescriptor)> = None;
        for m in &self.models {
            if let Some(score) = m.rule.specificity(id) {
                if best.map_or(true, |(s, _)| score > s) {
                    best = Some((score, m));
                }
            }
        }
        match best {
            Some((_, m)) => {
                info!(model = %m.name, identity = %id, "resolved device model");
                Ok(m)
            }
            None => Err(AcquireError::UnsupportedDevice(id.clone())),
        }
    }
}
