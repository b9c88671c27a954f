//! Stateless encode/decode functions behind the [`Codec`] trait.
//!
//! Scalars use fixed-width big-endian layouts arranged so that byte order
//! matches value order:
//!
//! | Type                        | Width | Layout                                   |
//! |-----------------------------|-------|------------------------------------------|
//! | `u8`..`u64`                 | 1..8  | big-endian                               |
//! | `i8`..`i64`                 | 1..8  | big-endian, sign bit flipped             |
//! | `f32`, `f64`                | 4, 8  | IEEE bits, sign-flipped / inverted       |
//! | `bool`                      | 1     | `0x00` / `0x01`                          |
//! | `DateTime<Utc>`             | 12    | flipped `i64` seconds, `u32` nanoseconds |
//! | `String`, `Vec<u8>`         | var   | raw UTF-8 / raw bytes                    |
//!
//! Structured types go through bincode, either with its native derive
//! ([`encode_bincode`]) or through serde ([`encode_serde`]).

mod time;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::CodecError;
use crate::traits::codec::{Codec, CodecResult};

pub(crate) fn fixed<const N: usize>(bytes: &[u8]) -> CodecResult<[u8; N]> {
    bytes.try_into().map_err(|_| CodecError::InvalidLength {
        expected: N,
        found: bytes.len(),
    })
}

macro_rules! unsigned_codec {
    ($($t:ty),*) => {
        $(
            impl Codec for $t {
                fn encode(&self) -> CodecResult<Vec<u8>> {
                    Ok(self.to_be_bytes().to_vec())
                }

                fn decode(bytes: &[u8]) -> CodecResult<Self> {
                    Ok(<$t>::from_be_bytes(fixed(bytes)?))
                }
            }
        )*
    };
}

macro_rules! signed_codec {
    ($($t:ty => $u:ty),*) => {
        $(
            impl Codec for $t {
                fn encode(&self) -> CodecResult<Vec<u8>> {
                    let flipped = (*self as $u) ^ (1 << (<$u>::BITS - 1));
                    Ok(flipped.to_be_bytes().to_vec())
                }

                fn decode(bytes: &[u8]) -> CodecResult<Self> {
                    let raw = <$u>::from_be_bytes(fixed(bytes)?);
                    Ok((raw ^ (1 << (<$u>::BITS - 1))) as $t)
                }
            }
        )*
    };
}

macro_rules! float_codec {
    ($($t:ty => $u:ty),*) => {
        $(
            impl Codec for $t {
                fn encode(&self) -> CodecResult<Vec<u8>> {
                    let sign: $u = 1 << (<$u>::BITS - 1);
                    let bits = self.to_bits();
                    let ordered = if bits & sign != 0 { !bits } else { bits | sign };
                    Ok(ordered.to_be_bytes().to_vec())
                }

                fn decode(bytes: &[u8]) -> CodecResult<Self> {
                    let sign: $u = 1 << (<$u>::BITS - 1);
                    let ordered = <$u>::from_be_bytes(fixed(bytes)?);
                    let bits = if ordered & sign != 0 { ordered & !sign } else { !ordered };
                    Ok(<$t>::from_bits(bits))
                }
            }
        )*
    };
}

unsigned_codec!(u8, u16, u32, u64);
signed_codec!(i8 => u8, i16 => u16, i32 => u32, i64 => u64);
float_codec!(f32 => u32, f64 => u64);

impl Codec for bool {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        Ok(vec![u8::from(*self)])
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        match fixed::<1>(bytes)? {
            [0] => Ok(false),
            [1] => Ok(true),
            [other] => Err(CodecError::InvalidBool(other)),
        }
    }
}

impl Codec for String {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

impl Codec for Vec<u8> {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        Ok(self.clone())
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        Ok(bytes.to_vec())
    }
}

/// Marker value for key-only buckets.
impl Codec for () {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        fixed::<0>(bytes).map(|_| ())
    }
}

pub fn encode_bincode<T: bincode::Encode>(value: &T) -> CodecResult<Vec<u8>> {
    Ok(bincode::encode_to_vec(value, bincode::config::standard())?)
}

pub fn decode_bincode<T: bincode::Decode<()>>(bytes: &[u8]) -> CodecResult<T> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}

pub fn encode_serde<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(
        value,
        bincode::config::standard(),
    )?)
}

pub fn decode_serde<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}

/// Implement [`Codec`] for types deriving `bincode::Encode` and `bincode::Decode`.
#[macro_export]
macro_rules! bincode_codec {
    ($($t:ty),+ $(,)?) => {
        $(
            impl $crate::traits::Codec for $t {
                fn encode(&self) -> $crate::traits::CodecResult<::std::vec::Vec<u8>> {
                    $crate::codec::encode_bincode(self)
                }

                fn decode(bytes: &[u8]) -> $crate::traits::CodecResult<Self> {
                    $crate::codec::decode_bincode(bytes)
                }
            }
        )+
    };
}

/// Implement [`Codec`] for types deriving `serde::Serialize` and `serde::Deserialize`.
#[macro_export]
macro_rules! serde_codec {
    ($($t:ty),+ $(,)?) => {
        $(
            impl $crate::traits::Codec for $t {
                fn encode(&self) -> $crate::traits::CodecResult<::std::vec::Vec<u8>> {
                    $crate::codec::encode_serde(self)
                }

                fn decode(bytes: &[u8]) -> $crate::traits::CodecResult<Self> {
                    $crate::codec::decode_serde(bytes)
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, bincode::Encode, bincode::Decode)]
    struct Point {
        x: i32,
        label: String,
    }

    crate::bincode_codec!(Point);

    #[test]
    fn test_signed_order_matches_numeric_order() {
        let values = [i64::MIN, -1_000, -1, 0, 1, 42, i64::MAX];
        let encoded: Vec<Vec<u8>> = values.iter().map(|v| v.encode().unwrap()).collect();
        assert!(encoded.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_float_order_matches_numeric_order() {
        let values = [f64::NEG_INFINITY, -2.5, -0.0, 0.0, 1e-9, 12.34, f64::INFINITY];
        let encoded: Vec<Vec<u8>> = values.iter().map(|v| v.encode().unwrap()).collect();
        assert!(encoded.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(f64::decode(&(-0.0f64).encode().unwrap()).unwrap().to_bits(), (-0.0f64).to_bits());
    }

    #[test]
    fn test_u64_is_plain_big_endian() {
        assert_eq!(1u64.encode().unwrap(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let err = u32::decode(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidLength {
                expected: 4,
                found: 3
            }
        ));
    }

    #[test]
    fn test_bool_rejects_other_bytes() {
        assert!(bool::decode(&[1]).unwrap());
        assert!(!bool::decode(&[0]).unwrap());
        assert!(matches!(bool::decode(&[2]), Err(CodecError::InvalidBool(2))));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        assert!(matches!(
            String::decode(&[0xff, 0xfe]),
            Err(CodecError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_bincode_structured_roundtrip() {
        let p = Point {
            x: -7,
            label: "seven".to_string(),
        };
        let bytes = p.encode().unwrap();
        assert_eq!(Point::decode(&bytes).unwrap(), p);
    }
}
