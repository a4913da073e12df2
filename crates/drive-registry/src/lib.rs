//! drive-registry: model registry and parameter acquisition for CIP drives
//!
//! A device's reported identity selects a model descriptor; the descriptor's
//! catalog lists the parameters to back up and its strategy decides how they
//! are read: one Get_Attribute_Single per parameter, or batched scattered reads
//! that fall back to individual reads when a batch fails.

mod error;
pub use error::AcquireError;

mod types;
pub use types::{CatalogFile, MatchSpec, ParameterDefinition};

mod decode;
pub use decode::{decode, DataType, DecodeError, ParameterValue};

mod catalog;
pub use catalog::{CatalogError, ParameterCatalog};

mod loader;
pub use loader::{load_catalog_file, load_catalogs_dir, parse_catalog_str};

mod registry;
pub use registry::{DeviceModelDescriptor, DeviceRegistry, MatchRule};

mod strategy;
pub use strategy::{AcquisitionStrategy, DEFAULT_BATCH_LIMIT, MAX_SCATTERED_BATCH};

pub mod params;

mod cache;
pub use cache::TypeCache;

mod scattered;
pub use scattered::{
    build_request, chunk_batches, parse_response, BatchError, ReadBatchResult, ScatteredRead,
};

mod fallback;
pub use fallback::FallbackReader;

mod session;
pub use session::{AcquireOptions, AcquisitionReport, BatchProgress, DriveSession, ParameterResult};

mod metrics;
pub use metrics::{AcquisitionMetrics, MetricsHub};
