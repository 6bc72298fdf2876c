//! Payload encoding. Values are written as MessagePack; the wire format is
//! private to this crate and only needs to round trip between processes
//! running the same build.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Values that can travel between processes. Any owned serde type
/// qualifies.
pub trait Payload: Serialize + DeserializeOwned + 'static {}

impl<T: Serialize + DeserializeOwned + 'static> Payload for T {}

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::encode::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::decode::from_slice(bytes)?)
}

// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn decoding_the_wrong_type_fails() {
        let bytes = encode(&"forty two".to_string()).unwrap();
        assert!(decode::<Vec<f64>>(&bytes).is_err());
        assert_eq!(decode::<String>(&bytes).unwrap(), "forty two");
    }
}
