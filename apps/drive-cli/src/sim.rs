use crate::config::FaultConfig;
use cip_transport::{DeviceIdentity, MockFaults, MockParameter, MockSession};
use drive_registry::{AcquisitionStrategy, DataType, DeviceModelDescriptor, MatchRule};

// CIP device type of an AC drive.
const DEVICE_TYPE_AC_DRIVE: u16 = 0x02;

/// Identity a drive of `model` would report.
pub fn identity_for(model: &DeviceModelDescriptor, minor: Option<u8>) -> DeviceIdentity {
    let (vendor, product, major, declared_minor) = match model.rule {
        MatchRule::Exact {
            vendor_id,
            product_code,
            major_revision,
            minor_revision,
        } => (vendor_id, product_code, major_revision, minor_revision),
        MatchRule::Compatible {
            vendor_id,
            product_code,
            major_revision,
            min_minor,
        } => (vendor_id, product_code, major_revision, min_minor),
    };
    let mut id = DeviceIdentity::new(
        vendor,
        DEVICE_TYPE_AC_DRIVE,
        product,
        major,
        minor.unwrap_or(declared_minor),
    );
    id.product_name = Some(model.name.clone());
    id
}

/// A simulated drive populated from the model's catalog.
pub fn simulated_drive(
    model: &DeviceModelDescriptor,
    minor: Option<u8>,
    faults: &FaultConfig,
) -> MockSession {
    let mut bus = MockSession::new(identity_for(model, minor)).with_faults(MockFaults {
        fail_scattered: faults.fail_scattered,
        truncate_scattered: faults.truncate_scattered,
        error_flagged: faults.error_flagged.iter().copied().collect(),
        reverse_scattered: false,
        fail_values: faults.fail_values.iter().copied().collect(),
        fail_types: Default::default(),
        fail_defaults: faults.fail_defaults,
    });
    if let AcquisitionStrategy::Scattered(sr) = model.strategy {
        bus = bus.with_scattered_read(sr.class, sr.instance);
    }
    for def in model.catalog.iter() {
        let dtype = def.data_type.unwrap_or(DataType::Uint);
        let default = def.default.unwrap_or(0);
        // arbitrary but stable value distinct from the default
        let value = default.wrapping_add(i64::from(def.number) * 7);
        let mut p = MockParameter::new(&def.name, dtype.code(), &sized(value, dtype))
            .with_default(&sized(default, dtype));
        if dtype == DataType::Real {
            p.value = (value as f32).to_le_bytes().to_vec();
            p.default = Some((default as f32).to_le_bytes().to_vec());
        }
        bus.insert_parameter(def.number, p);
    }
    bus
}

fn sized(raw: i64, dtype: DataType) -> Vec<u8> {
    raw.to_le_bytes()[..dtype.width()].to_vec()
}
