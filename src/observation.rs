//! Vehicle observation record and its log wire format
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Feed-native wheelchair code that means "accessible"
pub const WHEELCHAIR_ACCESSIBLE_CODE: i64 = 2;

/// Factor converting feed-native m/s into km/h
pub const MPS_TO_KMH: f64 = 3.6;

/// One reading of a vehicle's state. Stored rows are identified by
/// (`vehicle_id`, `timestamp`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleObservation {
    pub trip_id: String,
    pub route_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub bearing: f64,
    /// km/h
    pub speed: f64,
    pub current_stop_sequence: u32,
    pub current_status: i32,
    #[serde(with = "wire_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub stop_id: String,
    pub vehicle_id: String,
    pub vehicle_label: String,
    pub license_plate: String,
    #[serde(deserialize_with = "wheelchair::deserialize")]
    pub wheelchair_accessible: bool,
}

impl VehicleObservation {
    /// JSON value of a single log message
    pub fn to_message(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Maps the feed's tri-state wheelchair code to a flag
pub fn wheelchair_from_code(code: i64) -> bool {
    code == WHEELCHAIR_ACCESSIBLE_CODE
}

/// Parses a log message value. A message carries either a single observation
/// or a list of them; both are returned as a list.
pub fn from_message(payload: &[u8]) -> Result<Vec<VehicleObservation>, Error> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    match value {
        serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
        serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(value)?]),
        other => Err(Error::Deserialize(format!(
            "expected object or array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// `YYYY-MM-DD HH:MM:SS` in UTC, no zone suffix
pub mod wire_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|e| de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }
}

// legacy producers ship the raw tri-state code instead of a flag
mod wheelchair {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Code(i64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Raw::deserialize(d)? {
            Raw::Flag(flag) => flag,
            Raw::Code(code) => super::wheelchair_from_code(code),
        })
    }
}
