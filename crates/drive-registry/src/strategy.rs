use crate::ScatteredRead;
use serde::{Deserialize, Serialize};

/// Largest batch a scattered read request may carry.
pub const MAX_SCATTERED_BATCH: usize = 64;

/// Batch size used when a catalog does not state one.
pub const DEFAULT_BATCH_LIMIT: usize = 60;

/// How a model's parameters are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AcquisitionStrategy {
    /// One Get_Attribute_Single per parameter.
    #[default]
    Standard,
    /// Batched scattered reads with per-parameter fallback.
    Scattered(ScatteredRead),
}

impl AcquisitionStrategy {
    pub fn batch_limit(&self) -> usize {
        match self {
            AcquisitionStrategy::Standard => 1,
            AcquisitionStrategy::Scattered(s) => s.batch_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_yaml() {
        let s: AcquisitionStrategy = serde_yaml::from_str("kind: standard").unwrap();
        assert_eq!(s, AcquisitionStrategy::Standard);

        let s: AcquisitionStrategy =
            serde_yaml::from_str("kind: scattered\nclass: 147\nbatch_limit: 32").unwrap();
        match s {
            AcquisitionStrategy::Scattered(sr) => {
                assert_eq!(sr.service, 0x4B);
                assert_eq!(sr.class, 0x93);
                assert_eq!(sr.instance, 0);
                assert_eq!(sr.batch_limit, 32);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(s.batch_limit(), 32);
    }
}
