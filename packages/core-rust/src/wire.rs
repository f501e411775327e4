//! `MsgPack` envelope for shipping a sealed transaction to the backend.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WireError;
use crate::mutation::PendingMutation;
use crate::types::Value;

/// All mutations of one transaction, in merge order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(
    serialize = "K: Serialize, C: Serialize",
    deserialize = "K: DeserializeOwned, C: DeserializeOwned"
))]
pub struct MutationBatch<K, C> {
    /// Identifier of the transaction the batch was taken from.
    pub transaction_id: Uuid,
    /// Transaction-level caller metadata.
    pub metadata: Option<Value>,
    /// The merged mutation records.
    pub mutations: Vec<PendingMutation<K, C>>,
}

impl<K, C> MutationBatch<K, C>
where
    K: Serialize + DeserializeOwned,
    C: Serialize + DeserializeOwned,
{
    /// Encodes the batch as named-field `MsgPack`.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Encode`] if a key or payload cannot be serialized.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, WireError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Decodes a batch produced by [`to_msgpack`](Self::to_msgpack).
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Decode`] on malformed input.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
