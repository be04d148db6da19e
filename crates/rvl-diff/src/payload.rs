use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque diff payload.
///
/// The shape is owned by the strategy that produced it and must be read back
/// through that strategy's identifier, never assumed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffPayload(Value);

impl DiffPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for DiffPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
