use anyhow::Context;
use drive_registry::AcquireOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Run configuration: acquisition switches plus the devices to back up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub options: AcquireOptions,
    /// Extra catalogs registered after the built-in models.
    #[serde(default)]
    pub catalog_dir: Option<String>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// One simulated device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    /// Model whose identity and catalog the simulated drive reports.
    pub model: String,
    /// Overrides the minor revision reported by the simulated drive.
    #[serde(default)]
    pub minor_revision: Option<u8>,
    #[serde(default)]
    pub faults: FaultConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaultConfig {
    #[serde(default)]
    pub fail_scattered: bool,
    #[serde(default)]
    pub truncate_scattered: Option<usize>,
    #[serde(default)]
    pub error_flagged: Vec<u16>,
    #[serde(default)]
    pub fail_values: Vec<u16>,
    #[serde(default)]
    pub fail_defaults: bool,
}

pub fn load_run_config(path: impl AsRef<Path>) -> anyhow::Result<RunConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_config() {
        let cfg: RunConfig = serde_yaml::from_str(
            r#"
options:
  acquire_all_records: true
devices:
  - name: pump-1
    model: powerflex-525
  - name: fan-2
    model: powerflex-525
    minor_revision: 9
    faults: { fail_scattered: true, fail_values: [41] }
"#,
        )
        .unwrap();
        assert!(cfg.options.acquire_all_records);
        assert!(!cfg.options.verbose);
        assert_eq!(cfg.devices.len(), 2);
        assert_eq!(cfg.devices[1].minor_revision, Some(9));
        assert!(cfg.devices[1].faults.fail_scattered);
        assert_eq!(cfg.devices[1].faults.fail_values, vec![41]);
        assert!(cfg.catalog_dir.is_none());
    }
}
