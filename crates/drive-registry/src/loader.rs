use crate::types::CatalogFile;
use crate::{DeviceModelDescriptor, DeviceRegistry};
use anyhow::Context;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Catalogs compiled into the binary, in registration order. Exact-match
/// models come before the compatible-minor families that would also claim them.
const BUILTIN_CATALOGS: &[(&str, &str)] = &[
    (
        "powerflex-525.yaml",
        include_str!("../catalogs/powerflex-525.yaml"),
    ),
    (
        "powerflex-523.yaml",
        include_str!("../catalogs/powerflex-523.yaml"),
    ),
    (
        "powerflex-40.yaml",
        include_str!("../catalogs/powerflex-40.yaml"),
    ),
];

impl DeviceRegistry {
    /// Registry of the built-in models.
    pub fn builtin() -> anyhow::Result<Self> {
        let mut reg = DeviceRegistry::new();
        for (origin, raw) in BUILTIN_CATALOGS {
            reg.register(parse_catalog_str(raw, origin)?);
        }
        Ok(reg)
    }
}

pub fn parse_catalog_str(raw: &str, origin: &str) -> anyhow::Result<DeviceModelDescriptor> {
    let val: Value =
        serde_yaml::from_str(raw).with_context(|| format!("parsing yaml: {origin}"))?;
    let file: CatalogFile = serde_yaml::from_value(val)
        .with_context(|| format!("decoding catalog: {origin}"))?;
    DeviceModelDescriptor::from_catalog_file(file)
        .with_context(|| format!("validating catalog: {origin}"))
}

pub fn load_catalog_file(path: impl AsRef<Path>) -> anyhow::Result<DeviceModelDescriptor> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading catalog: {}", path.display()))?;
    parse_catalog_str(&raw, &path.display().to_string())
}

/// Load every `*.yml`/`*.yaml` catalog in `dir`, registered in file name order.
pub fn load_catalogs_dir(dir: impl AsRef<Path>) -> anyhow::Result<DeviceRegistry> {
    let mut reg = DeviceRegistry::new();
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir.as_ref())
        .with_context(|| format!("reading catalog dir: {}", dir.as_ref().display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if let Some(ext) = path.extension() {
            if ext == "yml" || ext == "yaml" {
                entries.push(path);
            }
        }
    }
    entries.sort();
    for p in entries {
        reg.register(load_catalog_file(&p)?);
    }
    Ok(reg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AcquisitionStrategy, MatchRule};
    use cip_transport::DeviceIdentity;

    const SAMPLE: &str = r#"
model: sample-drive
match:
  vendor_id: 1
  product_code: 10
  major_revision: 9
  minor_revision: 1
  compatible: true
strategy:
  kind: scattered
  class: 147
  batch_limit: 2
parameters:
  - { number: 3, name: Motor NP Volts, data_type: UINT, default: 460 }
  - { number: 1, name: Output Freq }
  - { number: 7, name: Fault Code, acquire: false, data_type: WORD }
"#;

    #[test]
    fn test_parse_sample_catalog() {
        let d = parse_catalog_str(SAMPLE, "sample").unwrap();
        assert_eq!(d.name, "sample-drive");
        assert!(matches!(d.rule, MatchRule::Compatible { min_minor: 1, .. }));
        assert_eq!(d.strategy.batch_limit(), 2);
        let numbers: Vec<u16> = d.catalog.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 3, 7]);
        assert_eq!(d.catalog.get(3).and_then(|p| p.default), Some(460));
        assert!(!d.catalog.get(7).map(|p| p.acquire).unwrap_or(true));
    }

    #[test]
    fn test_rejects_duplicates_and_bad_types() {
        let dup = SAMPLE.replace("number: 7", "number: 3");
        let err = parse_catalog_str(&dup, "dup").unwrap_err();
        assert!(format!("{err:#}").contains("duplicate parameter number 3"));

        let bad = SAMPLE.replace("WORD", "FLOAT");
        assert!(parse_catalog_str(&bad, "bad").is_err());
    }

    #[test]
    fn test_builtin_registry() {
        let reg = DeviceRegistry::builtin().unwrap();
        assert_eq!(reg.len(), BUILTIN_CATALOGS.len());
        for m in reg.models() {
            assert!(!m.catalog.is_empty(), "{} has no parameters", m.name);
        }
        let pf525 = reg.get("powerflex-525").unwrap();
        assert!(matches!(pf525.strategy, AcquisitionStrategy::Scattered(_)));
        let pf40 = reg.get("powerflex-40").unwrap();
        assert_eq!(pf40.strategy, AcquisitionStrategy::Standard);
    }

    #[test]
    fn test_builtin_resolution() {
        let reg = DeviceRegistry::builtin().unwrap();
        let id = DeviceIdentity::new(1, 0x8E, 0x0096, 5, 1);
        assert_eq!(reg.resolve(&id).unwrap().name, "powerflex-525");
        let id = DeviceIdentity::new(1, 0x8E, 0x0096, 5, 7);
        assert_eq!(reg.resolve(&id).unwrap().name, "powerflex-525");
        let id = DeviceIdentity::new(1, 0x7B, 0x0028, 3, 1);
        assert_eq!(reg.resolve(&id).unwrap().name, "powerflex-40");
        let id = DeviceIdentity::new(1, 0x7B, 0x0028, 3, 2);
        assert!(reg.resolve(&id).is_err());
    }

    #[test]
    fn test_load_dir_sorted() {
        let dir = std::env::temp_dir().join(format!("drive-registry-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("b.yaml"), SAMPLE.replace("sample-drive", "b-drive")).unwrap();
        fs::write(dir.join("a.yml"), SAMPLE.replace("sample-drive", "a-drive")).unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();
        let reg = load_catalogs_dir(&dir).unwrap();
        let names: Vec<&str> = reg.models().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a-drive", "b-drive"]);
        fs::remove_dir_all(&dir).unwrap();
    }
}
