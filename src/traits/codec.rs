use crate::errors::CodecError;

pub type CodecResult<T> = Result<T, CodecError>;

/// Type-directed conversion between values and the byte strings stored in a bucket.
///
/// Scalar implementations live in [`crate::codec`] and are order preserving: for
/// any two values `a < b` of the same scalar type, `a.encode() < b.encode()`
/// byte-wise. Index range queries rely on this.
///
/// Structured types usually implement this through [`crate::bincode_codec!`] or
/// [`crate::serde_codec!`] rather than by hand.
pub trait Codec: Sized {
    fn encode(&self) -> CodecResult<Vec<u8>>;

    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}
