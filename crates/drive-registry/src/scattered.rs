use crate::{DEFAULT_BATCH_LIMIT, MAX_SCATTERED_BATCH};
use cip_transport::{consts, EPath, ExplicitMessaging, ExplicitRequest, TransportError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const RECORD_LEN: usize = 4;
const ERROR_FLAG: u16 = 0x8000;

/// Addressing and batch ceiling of a model's scattered read service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ScatteredRead {
    #[serde(default = "default_service")]
    pub service: u8,
    #[serde(default = "default_class")]
    pub class: u16,
    #[serde(default)]
    pub instance: u16,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

fn default_service() -> u8 {
    consts::SCATTERED_READ
}

fn default_class() -> u16 {
    consts::CLASS_DPI_PARAMETER
}

fn default_batch_limit() -> usize {
    DEFAULT_BATCH_LIMIT
}

impl Default for ScatteredRead {
    fn default() -> Self {
        Self {
            service: default_service(),
            class: default_class(),
            instance: 0,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("malformed reply: {0}")]
    Malformed(&'static str),
}

/// Raw values returned by one scattered read, in reply order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadBatchResult {
    records: Vec<(u16, [u8; 2])>,
    warnings: usize,
}

impl ReadBatchResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Raw value recorded for `number`; the first record wins on repeats.
    pub fn get(&self, number: u16) -> Option<[u8; 2]> {
        self.records
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, v)| *v)
    }

    /// Records that carried an error flag or an unexpected number.
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    pub fn numbers(&self) -> Vec<u16> {
        self.records.iter().map(|(n, _)| *n).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, [u8; 2])> + '_ {
        self.records.iter().copied()
    }
}

/// Encode a scattered read request: per parameter, number u16 LE then two
/// reserved zero bytes. No length prefix; the transport frames the message.
pub fn build_request(numbers: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(numbers.len() * RECORD_LEN);
    for n in numbers {
        out.extend_from_slice(&n.to_le_bytes());
        out.extend_from_slice(&[0x00, 0x00]);
    }
    out
}

/// Decode a scattered read reply against the requested numbers.
///
/// Records are matched by position only. A short reply keeps the complete
/// records. A record whose number has the high bit set carries the device's
/// error flag; its value is still kept under the masked number. Any other
/// record is stored under the number requested at its position, even when the
/// device reported a different one; the stream is never resynchronized.
pub fn parse_response(resp: &[u8], expected: &[u16]) -> ReadBatchResult {
    let mut records = Vec::with_capacity(expected.len());
    let mut warnings = 0;
    for (i, &want) in expected.iter().enumerate() {
        let off = i * RECORD_LEN;
        let Some(rec) = resp.get(off..off + RECORD_LEN) else {
            warn!(
                parsed = records.len(),
                expected = expected.len(),
                bytes = resp.len(),
                "scattered reply shorter than request"
            );
            break;
        };
        let key = i16::from_le_bytes([rec[0], rec[1]]);
        let number = if key < 0 {
            let masked = (key as u16) & !ERROR_FLAG;
            warn!(param = masked, "device flagged parameter error");
            warnings += 1;
            masked
        } else {
            if key as u16 != want {
                warn!(
                    position = i,
                    expected = want,
                    got = key,
                    "scattered reply parameter mismatch"
                );
                warnings += 1;
            }
            want
        };
        records.push((number, [rec[2], rec[3]]));
    }
    ReadBatchResult { records, warnings }
}

/// Split `numbers` into consecutive batches of at most `limit`, order kept.
pub fn chunk_batches(numbers: &[u16], limit: usize) -> Vec<&[u16]> {
    numbers.chunks(limit.clamp(1, MAX_SCATTERED_BATCH)).collect()
}

impl ScatteredRead {
    pub fn path(&self) -> EPath {
        EPath::instance(self.class, self.instance)
    }

    /// One request/response cycle for `numbers`.
    ///
    /// A reply with no complete record for a non-empty batch is malformed.
    pub fn read_batch<T: ExplicitMessaging + ?Sized>(
        &self,
        session: &mut T,
        numbers: &[u16],
    ) -> Result<ReadBatchResult, BatchError> {
        if numbers.is_empty() {
            return Ok(ReadBatchResult::default());
        }
        let req = ExplicitRequest::new(self.service, self.path(), build_request(numbers));
        let resp = session.send_explicit(&req)?;
        let result = parse_response(&resp, numbers);
        if result.is_empty() {
            return Err(BatchError::Malformed("no complete record in reply"));
        }
        debug!(
            requested = numbers.len(),
            received = result.len(),
            "scattered read done"
        );
        Ok(result)
    }
}
