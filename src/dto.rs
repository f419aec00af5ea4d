use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ProcessingError;

/// A field of an inbound message. Whether the key exists and whether it
/// holds `null` are tracked separately.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Slot<T> {
    #[default]
    Absent,
    Null,
    Present(T),
}

impl<T> Slot<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Slot::Absent)
    }

    /// The contained value, if the key was there and not `null`.
    pub fn value(&self) -> Option<&T> {
        match self {
            Slot::Present(v) => Some(v),
            _ => None,
        }
    }

    /// A copy that keeps only a present value; `Null` becomes `Absent`.
    pub fn present(&self) -> Slot<T>
    where
        T: Clone,
    {
        self.value().cloned().map_or(Slot::Absent, Slot::Present)
    }
}

// Only reached when the key exists; a missing key falls back to `Default`.
impl<'de, T> Deserialize<'de> for Slot<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Slot::Present(v),
            None => Slot::Null,
        })
    }
}

impl<T> Serialize for Slot<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Slot::Present(v) => v.serialize(serializer),
            _ => serializer.serialize_none(),
        }
    }
}

/// One sensor message as it travels through the relay. Keys other than the
/// five below are dropped on decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(default, skip_serializing_if = "Slot::is_absent")]
    pub time: Slot<Value>,
    #[serde(default, skip_serializing_if = "Slot::is_absent")]
    pub profile_name: Slot<Value>,
    /// Passed through as sent, whatever its JSON type.
    #[serde(default, skip_serializing_if = "Slot::is_absent")]
    pub humidity: Slot<Value>,
    /// Degrees Celsius inbound, Fahrenheit once converted.
    #[serde(default, skip_serializing_if = "Slot::is_absent")]
    pub temperature: Slot<f64>,
    /// Kilopascal inbound, psi once converted.
    #[serde(default, skip_serializing_if = "Slot::is_absent")]
    pub pressure: Slot<f64>,
}

impl Reading {
    ///
    /// Decodes a message payload. The payload has to be a JSON object and
    /// temperature and pressure, where set, have to be numbers.
    ///
    pub fn from_slice(payload: &[u8]) -> Result<Reading, ProcessingError> {
        let object: Map<String, Value> =
            serde_json::from_slice(payload).map_err(ProcessingError::Decode)?;
        Reading::deserialize(Value::Object(object)).map_err(ProcessingError::Decode)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, ProcessingError> {
        serde_json::to_vec(self).map_err(ProcessingError::Encode)
    }
}
