use crate::{
    consts, DeviceIdentity, EPath, ExplicitMessaging, ExplicitRequest, Result, TransportError,
};
use std::collections::{BTreeMap, BTreeSet};

// CIP general status codes returned by the simulated drive.
const STATUS_SERVICE_NOT_SUPPORTED: u8 = 0x08;
const STATUS_ATTRIBUTE_NOT_SUPPORTED: u8 = 0x14;
const STATUS_OBJECT_DOES_NOT_EXIST: u8 = 0x16;

/// One simulated Parameter Object instance.
#[derive(Clone, Debug)]
pub struct MockParameter {
    pub name: String,
    pub data_type: u8,
    pub value: Vec<u8>,
    pub default: Option<Vec<u8>>,
}

impl MockParameter {
    pub fn new(name: &str, data_type: u8, value: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            value: value.to_vec(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: &[u8]) -> Self {
        self.default = Some(default.to_vec());
        self
    }
}

/// Fault injection switches for the simulated drive.
#[derive(Clone, Debug, Default)]
pub struct MockFaults {
    /// Every scattered read times out.
    pub fail_scattered: bool,
    /// Scattered replies are cut to this many bytes.
    pub truncate_scattered: Option<usize>,
    /// Scattered records for these parameters carry the error flag.
    pub error_flagged: BTreeSet<u16>,
    /// Scattered replies list records in reverse order.
    pub reverse_scattered: bool,
    /// Individual value reads of these parameters time out.
    pub fail_values: BTreeSet<u16>,
    /// Data type reads of these parameters are rejected.
    pub fail_types: BTreeSet<u16>,
    /// Every default value read is rejected.
    pub fail_defaults: bool,
}

/// An in-process simulated drive. Each session instance is independent.
pub struct MockSession {
    identity: DeviceIdentity,
    params: BTreeMap<u16, MockParameter>,
    scattered: Option<(u16, u16)>,
    faults: MockFaults,
    log: Vec<ExplicitRequest>,
}

impl MockSession {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            params: BTreeMap::new(),
            scattered: None,
            faults: MockFaults::default(),
            log: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, number: u16, param: MockParameter) -> Self {
        self.params.insert(number, param);
        self
    }

    /// Answer scattered reads addressed to `class/instance`.
    pub fn with_scattered_read(mut self, class: u16, instance: u16) -> Self {
        self.scattered = Some((class, instance));
        self
    }

    pub fn with_faults(mut self, faults: MockFaults) -> Self {
        self.faults = faults;
        self
    }

    pub fn faults_mut(&mut self) -> &mut MockFaults {
        &mut self.faults
    }

    pub fn insert_parameter(&mut self, number: u16, param: MockParameter) {
        self.params.insert(number, param);
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> &[ExplicitRequest] {
        &self.log
    }

    pub fn count_service(&self, service: u8) -> usize {
        self.log.iter().filter(|r| r.service == service).count()
    }

    /// Number of Get_Attribute_Single requests for `attribute` on any parameter.
    pub fn count_attribute_reads(&self, attribute: u16) -> usize {
        self.log
            .iter()
            .filter(|r| {
                r.service == consts::GET_ATTRIBUTE_SINGLE
                    && r.path.class == consts::CLASS_PARAMETER
                    && r.path.instance != 0
                    && r.path.attribute == Some(attribute)
            })
            .count()
    }

    fn param(&self, number: u16) -> Result<&MockParameter> {
        self.params.get(&number).ok_or(TransportError::ServiceError {
            general: STATUS_OBJECT_DOES_NOT_EXIST,
            extended: None,
        })
    }

    fn get_parameter_attribute(&self, path: &EPath) -> Result<Vec<u8>> {
        let attribute = path.attribute.ok_or(TransportError::ServiceError {
            general: STATUS_ATTRIBUTE_NOT_SUPPORTED,
            extended: None,
        })?;
        if path.instance == 0 {
            return match attribute {
                consts::ATTR_MAX_INSTANCE => {
                    let max = self.params.keys().next_back().copied().unwrap_or(0);
                    Ok(max.to_le_bytes().to_vec())
                }
                _ => Err(attribute_not_supported()),
            };
        }
        let number = path.instance;
        let param = self.param(number)?;
        match attribute {
            consts::ATTR_VALUE => {
                if self.faults.fail_values.contains(&number) {
                    return Err(TransportError::Timeout);
                }
                Ok(param.value.clone())
            }
            consts::ATTR_DATA_TYPE => {
                if self.faults.fail_types.contains(&number) {
                    return Err(attribute_not_supported());
                }
                Ok(vec![param.data_type])
            }
            consts::ATTR_DATA_SIZE => Ok(vec![param.value.len() as u8]),
            consts::ATTR_NAME => {
                let bytes = param.name.as_bytes();
                let len = bytes.len().min(u8::MAX as usize);
                let mut out = Vec::with_capacity(len + 1);
                out.push(len as u8);
                out.extend_from_slice(&bytes[..len]);
                Ok(out)
            }
            consts::ATTR_DEFAULT => {
                if self.faults.fail_defaults {
                    return Err(attribute_not_supported());
                }
                param.default.clone().ok_or_else(attribute_not_supported)
            }
            _ => Err(attribute_not_supported()),
        }
    }

    fn scattered_read(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if self.faults.fail_scattered {
            return Err(TransportError::Timeout);
        }
        let mut records: Vec<[u8; 4]> = Vec::with_capacity(payload.len() / 4);
        for chunk in payload.chunks_exact(4) {
            let number = u16::from_le_bytes([chunk[0], chunk[1]]);
            let mut value = [0u8; 2];
            if let Some(p) = self.params.get(&number) {
                for (dst, src) in value.iter_mut().zip(p.value.iter()) {
                    *dst = *src;
                }
            }
            let key = if self.faults.error_flagged.contains(&number) {
                number | 0x8000
            } else {
                number
            };
            let k = key.to_le_bytes();
            records.push([k[0], k[1], value[0], value[1]]);
        }
        if self.faults.reverse_scattered {
            records.reverse();
        }
        let mut out: Vec<u8> = records.into_iter().flatten().collect();
        if let Some(n) = self.faults.truncate_scattered {
            out.truncate(n);
        }
        Ok(out)
    }
}

fn attribute_not_supported() -> TransportError {
    TransportError::ServiceError {
        general: STATUS_ATTRIBUTE_NOT_SUPPORTED,
        extended: None,
    }
}

impl ExplicitMessaging for MockSession {
    fn send_explicit(&mut self, req: &ExplicitRequest) -> Result<Vec<u8>> {
        self.log.push(req.clone());
        tracing::trace!(service = req.service, path = %req.path, "mock request");
        match (req.service, req.path.class) {
            (consts::GET_ATTRIBUTES_ALL, consts::CLASS_IDENTITY) if req.path.instance == 1 => {
                Ok(self.identity.to_bytes())
            }
            (consts::GET_ATTRIBUTE_SINGLE, consts::CLASS_PARAMETER) => {
                self.get_parameter_attribute(&req.path)
            }
            (consts::SCATTERED_READ, class)
                if self.scattered == Some((class, req.path.instance)) =>
            {
                self.scattered_read(&req.payload)
            }
            _ => Err(TransportError::ServiceError {
                general: STATUS_SERVICE_NOT_SUPPORTED,
                extended: None,
            }),
        }
    }
}
