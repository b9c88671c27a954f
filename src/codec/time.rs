use chrono::{DateTime, Utc};

use super::fixed;
use crate::errors::CodecError;
use crate::traits::codec::{Codec, CodecResult};

const SIGN: u64 = 1 << 63;

impl Codec for DateTime<Utc> {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        let secs = (self.timestamp() as u64) ^ SIGN;
        let mut out = Vec::with_capacity(12);
        out.extend_from_slice(&secs.to_be_bytes());
        out.extend_from_slice(&self.timestamp_subsec_nanos().to_be_bytes());
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let raw: [u8; 12] = fixed(bytes)?;
        let (secs, nanos) = raw.split_at(8);
        let secs = (u64::from_be_bytes(fixed(secs)?) ^ SIGN) as i64;
        let nanos = u32::from_be_bytes(fixed(nanos)?);
        DateTime::from_timestamp(secs, nanos).ok_or(CodecError::InvalidTimestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_pre_epoch_dates_sort_first() {
        let old = parse("1200-01-01T09:00:00Z");
        let later = parse("1200-01-01T10:00:00Z");
        let modern = parse("2024-05-01T00:00:00.5Z");
        assert!(old.encode().unwrap() < later.encode().unwrap());
        assert!(later.encode().unwrap() < modern.encode().unwrap());
    }

    #[test]
    fn test_subsecond_precision_survives() {
        let t = parse("1623-01-01T10:00:00.123456789Z");
        assert_eq!(DateTime::<Utc>::decode(&t.encode().unwrap()).unwrap(), t);
    }

    #[test]
    fn test_out_of_range_nanos_rejected() {
        let mut bytes = parse("2000-01-01T00:00:00Z").encode().unwrap();
        bytes[8..].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            DateTime::<Utc>::decode(&bytes),
            Err(CodecError::InvalidTimestamp)
        ));
    }
}
