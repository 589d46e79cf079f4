//! Binary codec for the wire envelopes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Encodes request and response envelopes with bincode.
///
/// The format is not self-describing: both ends must agree on the key and
/// value types of a region.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardSerializer;

impl StandardSerializer {
    pub fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    pub fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheElement, ElementAttributes};
    use crate::error::CacheError;
    use crate::models::RemoteCacheRequest;

    #[test]
    fn test_request_survives_encoding() {
        let serializer = StandardSerializer;
        let element = CacheElement::new(
            "region",
            "k".to_string(),
            vec![1u8, 2, 3],
            ElementAttributes::new().with_max_life(30),
        );
        let request = RemoteCacheRequest::update(element, 9);

        let bytes = serializer.serialize(&request).unwrap();
        let decoded: RemoteCacheRequest<String, Vec<u8>> = serializer.deserialize(&bytes).unwrap();

        assert_eq!(decoded, request);
    }

    #[test]
    fn test_garbage_is_a_serialization_error() {
        let result: Result<RemoteCacheRequest<String, String>> =
            StandardSerializer.deserialize(&[0xff, 0x01]);
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }
}
