use thiserror::Error;

/// Fixed header: seconds, nanoseconds and ncpu, each a big-endian u64.
pub const HEADER_LEN: usize = 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("datagram too short for header: {len} < {HEADER_LEN} bytes")]
    TruncatedHeader { len: usize },
    #[error("datagram length {len} does not match declared cpu count {ncpu} (expected {expected})")]
    LengthMismatch {
        len: usize,
        ncpu: u64,
        expected: usize,
    },
}

/// One sample on the wire: a capture timestamp plus the utilization fraction
/// of every CPU slot. Slot 0 is the aggregate across all CPUs, slots 1..N are
/// the physical CPUs in /proc/stat order.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub seconds: u64,
    pub nanoseconds: u64,
    pub loads: Vec<f64>,
}

impl Measurement {
    pub fn new(seconds: u64, nanoseconds: u64, loads: Vec<f64>) -> Self {
        Measurement {
            seconds,
            nanoseconds,
            loads,
        }
    }

    pub fn ncpu(&self) -> u64 {
        self.loads.len() as u64
    }

    /// Timestamp as fractional seconds since the Unix epoch.
    pub fn timestamp(&self) -> f64 {
        self.seconds as f64 + self.nanoseconds as f64 / 1_000_000_000.0
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 8 * self.loads.len());
        buf.extend_from_slice(&self.seconds.to_be_bytes());
        buf.extend_from_slice(&self.nanoseconds.to_be_bytes());
        buf.extend_from_slice(&self.ncpu().to_be_bytes());
        for load in &self.loads {
            buf.extend_from_slice(&load.to_be_bytes());
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_LEN {
            return Err(WireError::TruncatedHeader { len: buf.len() });
        }

        let seconds = read_u64(buf, 0);
        let nanoseconds = read_u64(buf, 8);
        let ncpu = read_u64(buf, 16);

        // Validate before trusting ncpu: a forged count must never cause an
        // out-of-bounds read.
        let expected = HEADER_LEN
            .checked_add((ncpu as usize).checked_mul(8).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        if buf.len() != expected {
            return Err(WireError::LengthMismatch {
                len: buf.len(),
                ncpu,
                expected,
            });
        }

        let loads = buf[HEADER_LEN..]
            .chunks_exact(8)
            .map(|chunk| f64::from_be_bytes(chunk.try_into().unwrap()))
            .collect();

        Ok(Measurement {
            seconds,
            nanoseconds,
            loads,
        })
    }
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_be_bytes(buf[offset..offset + 8].try_into().unwrap())
}
