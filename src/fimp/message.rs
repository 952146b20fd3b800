use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::FimpError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Int,
    Float,
    Bool,
    Null,
    StrArray,
    Object,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FimpMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub serv: String,
    pub val_t: ValueType,
    #[serde(default)]
    pub val: Value,
    #[serde(default)]
    pub props: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub ctime: String,
    #[serde(default)]
    pub uid: String,
}

impl FimpMessage {
    pub fn new(msg_type: &str, service: &str, val_t: ValueType, val: Value) -> FimpMessage {
        FimpMessage {
            msg_type: msg_type.to_string(),
            serv: service.to_string(),
            val_t,
            val,
            props: None,
            tags: None,
            ctime: chrono::Local::now().to_rfc3339(),
            uid: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_prop(mut self, key: &str, value: &str) -> FimpMessage {
        self.props
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn prop(&self, key: &str) -> Option<&str> {
        self.props.as_ref()?.get(key).map(String::as_str)
    }

    pub fn string_value(&self) -> Option<&str> {
        match self.val_t {
            ValueType::String => self.val.as_str(),
            _ => None,
        }
    }

    pub fn from_slice(payload: &[u8]) -> Result<FimpMessage, FimpError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, FimpError> {
        Ok(serde_json::to_vec(self)?)
    }
}
