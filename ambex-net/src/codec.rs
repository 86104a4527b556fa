use bincode::Options;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("wire codec failure: {0}")]
    Codec(#[from] bincode::Error),
    #[error("peer endpoint is gone")]
    Disconnected,
}

/// Explicit little-endian + fixed-width encoding, so both processes agree
/// on the byte layout regardless of host defaults.
#[inline]
pub fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_little_endian()
        .with_fixint_encoding()
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    Ok(wire_options().serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    Ok(wire_options().deserialize(bytes)?)
}
