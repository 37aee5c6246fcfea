//! Item: непрозрачная пара (key, value) и её JSON-форма.
//!
//! JSON (строки архива и элементы GetIterator): {"Key":"<base64>","Value":"<base64>"}.
//! При чтении принимаются и имена в нижнем регистре (key/value).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "Key", alias = "key", with = "b64")]
    pub key: Vec<u8>,
    #[serde(rename = "Value", alias = "value", with = "b64")]
    pub value: Vec<u8>,
}

impl Item {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Одна строка архива (без перевода строки).
    pub fn to_json_line(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::decode(format!("encode item: {e}")))
    }

    pub fn from_json_line(line: &[u8]) -> Result<Self> {
        serde_json::from_slice(line).map_err(|e| Error::decode(format!("parse item: {e}")))
    }
}

/// serde-хелпер: Vec<u8> <-> base64 (standard, с паддингом).
pub mod b64 {
    use super::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// То же для Option<Vec<u8>> (null <-> None).
pub mod opt_b64 {
    use super::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let s: Option<String> = Option::deserialize(d)?;
        match s {
            Some(s) => STANDARD
                .decode(s.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// base64 для логов (курсоры, префиксы).
pub fn b64_display(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
