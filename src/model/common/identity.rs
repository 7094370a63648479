use std::fmt::{Display, Formatter};
use std::string::FromUtf8Error;

use data_encoding::{DecodeError, BASE64URL_NOPAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A group member's identity: the email address the surrounding system
/// authenticated them with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode this identity as a string that is safe to use as a document
    /// field name: no `.`, no leading `$`, never empty.
    ///
    /// The encoding is lossless; see [`Identity::from_storage_key`].
    pub fn storage_key(&self) -> String {
        // The prefix keeps the key non-empty for an empty identity.
        format!("k{}", BASE64URL_NOPAD.encode(self.0.as_bytes()))
    }

    /// Recover the identity a storage key was produced from.
    pub fn from_storage_key(key: &str) -> Result<Self, StorageKeyError> {
        let encoded = key
            .strip_prefix('k')
            .ok_or_else(|| StorageKeyError::MissingPrefix(key.to_string()))?;
        let bytes = BASE64URL_NOPAD.decode(encoded.as_bytes())?;
        Ok(Self(String::from_utf8(bytes)?))
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(identity: &str) -> Self {
        Self(identity.to_string())
    }
}

impl From<String> for Identity {
    fn from(identity: String) -> Self {
        Self(identity)
    }
}

#[derive(Debug, Error)]
pub enum StorageKeyError {
    #[error("Storage key {0:?} is missing its prefix")]
    MissingPrefix(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Utf8(#[from] FromUtf8Error),
}

/// De/serialise a map keyed by [`Identity`] using storage keys, so that
/// arbitrary identities survive as document field names.
pub mod serde_identity_map {
    use std::collections::BTreeMap;

    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

    use super::Identity;

    pub fn serialize<S, V>(map: &BTreeMap<Identity, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_map(map.iter().map(|(k, v)| (k.storage_key(), v)))
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<BTreeMap<Identity, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        BTreeMap::<String, V>::deserialize(deserializer)?
            .into_iter()
            .map(|(key, value)| {
                Identity::from_storage_key(&key)
                    .map(|identity| (identity, value))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}
