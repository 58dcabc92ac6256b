//! Row encoding shared by every component: bincode over serde.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::StoreError;

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}
