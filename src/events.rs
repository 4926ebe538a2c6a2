//! Typed device events.
//!
//! Events arrive, from the stream and from history endpoints alike, as
//! `{"eventId", "targetName", "eventType", "data": {<type>: {…}}, "timestamp"}`
//! where the payload object is keyed by the event type name. The payloads
//! form a tagged union: [`EventData`] is one enum over the payload structs,
//! built by a single [`EventData::from_raw`] dispatch.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A single event emitted by a device or its cloud connector.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Server-assigned unique event ID.
    pub event_id: String,
    /// Resource name of the device that produced the event.
    pub target_name: String,
    /// RFC 3339 timestamp of when the event was received server-side.
    pub timestamp: String,
    /// The typed payload.
    pub data: EventData,
}

impl Event {
    /// Builds a typed event from one raw stream frame or history entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] when a required field is missing or a known
    /// payload does not match its expected shape.
    pub fn from_raw(raw: Value) -> Result<Self> {
        let obj = match raw.as_object() {
            Some(obj) => obj,
            None => return Err(format_error(&raw, "event is not a JSON object")),
        };

        let event_id = str_field(obj, "eventId")?;
        let target_name = str_field(obj, "targetName")?;
        let event_type = str_field(obj, "eventType")?;
        let timestamp = str_field(obj, "timestamp")?;

        // The payload object is keyed by the event type name.
        let payload = obj
            .get("data")
            .and_then(|data| data.get(&event_type))
            .cloned()
            .unwrap_or(Value::Null);
        let data = EventData::from_raw(&event_type, payload)?;

        Ok(Event {
            event_id,
            target_name,
            timestamp,
            data,
        })
    }

    /// Serializes back to the raw wire shape. `to_raw` is the inverse of
    /// [`Event::from_raw`].
    pub fn to_raw(&self) -> Value {
        let mut data = Map::new();
        data.insert(self.data.event_type().to_string(), self.data.to_raw());

        let mut obj = Map::new();
        obj.insert("eventId".into(), Value::String(self.event_id.clone()));
        obj.insert("targetName".into(), Value::String(self.target_name.clone()));
        obj.insert(
            "eventType".into(),
            Value::String(self.data.event_type().to_string()),
        );
        obj.insert("data".into(), Value::Object(data));
        obj.insert("timestamp".into(), Value::String(self.timestamp.clone()));
        Value::Object(obj)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Event::from_raw(value).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_raw().serialize(serializer)
    }
}

/// The payload of an event, discriminated by its wire `eventType` name.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Touch(Touch),
    Temperature(Temperature),
    ObjectPresent(ObjectPresent),
    Humidity(Humidity),
    ObjectPresentCount(ObjectPresentCount),
    TouchCount(TouchCount),
    WaterPresent(WaterPresent),
    BatteryStatus(BatteryStatus),
    NetworkStatus(NetworkStatus),
    ConnectionStatus(ConnectionStatus),
    LabelsChanged(LabelsChanged),
    /// An event type this crate has no dedicated shape for. The payload is
    /// preserved verbatim.
    Other { event_type: String, data: Value },
}

impl EventData {
    /// Dispatches a raw `eventType` plus payload into the matching variant.
    pub fn from_raw(event_type: &str, data: Value) -> Result<Self> {
        Ok(match event_type {
            "touch" => EventData::Touch(parse_payload(data)?),
            "temperature" => EventData::Temperature(parse_payload(data)?),
            "objectPresent" => EventData::ObjectPresent(parse_payload(data)?),
            "humidity" => EventData::Humidity(parse_payload(data)?),
            "objectPresentCount" => EventData::ObjectPresentCount(parse_payload(data)?),
            "touchCount" => EventData::TouchCount(parse_payload(data)?),
            "waterPresent" => EventData::WaterPresent(parse_payload(data)?),
            "batteryStatus" => EventData::BatteryStatus(parse_payload(data)?),
            "networkStatus" => EventData::NetworkStatus(parse_payload(data)?),
            "connectionStatus" => EventData::ConnectionStatus(parse_payload(data)?),
            "labelsChanged" => EventData::LabelsChanged(parse_payload(data)?),
            other => EventData::Other {
                event_type: other.to_string(),
                data,
            },
        })
    }

    /// The wire name of this payload's event type.
    pub fn event_type(&self) -> &str {
        match self {
            EventData::Touch(_) => "touch",
            EventData::Temperature(_) => "temperature",
            EventData::ObjectPresent(_) => "objectPresent",
            EventData::Humidity(_) => "humidity",
            EventData::ObjectPresentCount(_) => "objectPresentCount",
            EventData::TouchCount(_) => "touchCount",
            EventData::WaterPresent(_) => "waterPresent",
            EventData::BatteryStatus(_) => "batteryStatus",
            EventData::NetworkStatus(_) => "networkStatus",
            EventData::ConnectionStatus(_) => "connectionStatus",
            EventData::LabelsChanged(_) => "labelsChanged",
            EventData::Other { event_type, .. } => event_type,
        }
    }

    /// Serializes back to the raw payload object.
    pub fn to_raw(&self) -> Value {
        match self {
            EventData::Touch(data) => to_value(data),
            EventData::Temperature(data) => to_value(data),
            EventData::ObjectPresent(data) => to_value(data),
            EventData::Humidity(data) => to_value(data),
            EventData::ObjectPresentCount(data) => to_value(data),
            EventData::TouchCount(data) => to_value(data),
            EventData::WaterPresent(data) => to_value(data),
            EventData::BatteryStatus(data) => to_value(data),
            EventData::NetworkStatus(data) => to_value(data),
            EventData::ConnectionStatus(data) => to_value(data),
            EventData::LabelsChanged(data) => to_value(data),
            EventData::Other { data, .. } => data.clone(),
        }
    }
}

/// The sensor was tapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Touch {
    pub update_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Temperature {
    pub celsius: f64,
    pub update_time: String,
}

/// Proximity state: `PRESENT` or `NOT_PRESENT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPresent {
    pub state: String,
    pub update_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Humidity {
    pub celsius: f64,
    pub relative_humidity: f64,
    pub update_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPresentCount {
    pub total: u64,
    pub update_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouchCount {
    pub total: u64,
    pub update_time: String,
}

/// Water presence state: `PRESENT` or `NOT_PRESENT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterPresent {
    pub state: String,
    pub update_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryStatus {
    pub percentage: u8,
    pub update_time: String,
}

/// Radio health as seen by the cloud connector that relayed the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub signal_strength: u8,
    pub rssi: i32,
    pub transmission_mode: String,
    pub update_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// The connection currently in use, e.g. `ETHERNET` or `CELLULAR`.
    pub connection: String,
    pub available: Vec<String>,
    pub update_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelsChanged {
    pub added: HashMap<String, String>,
    pub modified: HashMap<String, String>,
    pub removed: Vec<String>,
}

fn parse_payload<T: DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data.clone()).map_err(|e| Error::Format {
        raw_response: data.to_string(),
        serde_error: e.to_string(),
    })
}

fn to_value<T: Serialize>(data: &T) -> Value {
    serde_json::to_value(data).unwrap_or(Value::Null)
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Result<String> {
    match obj.get(key).and_then(Value::as_str) {
        Some(value) => Ok(value.to_string()),
        None => Err(Error::Format {
            raw_response: Value::Object(obj.clone()).to_string(),
            serde_error: format!("missing or non-string field {key}"),
        }),
    }
}

fn format_error(raw: &Value, message: &str) -> Error {
    Error::Format {
        raw_response: raw.to_string(),
        serde_error: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_event(event_type: &str, payload: Value) -> Value {
        json!({
            "eventId": "bjehn6sdm92f9pd7f4s0",
            "targetName": "projects/p1/devices/d1",
            "eventType": event_type,
            "data": { (event_type.to_string()): payload },
            "timestamp": "2026-08-05T09:00:00.123456Z",
        })
    }

    #[test]
    fn round_trips_every_supported_event_type() {
        let samples = vec![
            raw_event("touch", json!({"updateTime": "2026-08-05T09:00:00Z"})),
            raw_event(
                "temperature",
                json!({"celsius": 24.5, "updateTime": "2026-08-05T09:00:00Z"}),
            ),
            raw_event(
                "objectPresent",
                json!({"state": "PRESENT", "updateTime": "2026-08-05T09:00:00Z"}),
            ),
            raw_event(
                "humidity",
                json!({"celsius": 22.0, "relativeHumidity": 40.5, "updateTime": "2026-08-05T09:00:00Z"}),
            ),
            raw_event(
                "objectPresentCount",
                json!({"total": 4176, "updateTime": "2026-08-05T09:00:00Z"}),
            ),
            raw_event(
                "touchCount",
                json!({"total": 469, "updateTime": "2026-08-05T09:00:00Z"}),
            ),
            raw_event(
                "waterPresent",
                json!({"state": "NOT_PRESENT", "updateTime": "2026-08-05T09:00:00Z"}),
            ),
            raw_event(
                "batteryStatus",
                json!({"percentage": 87, "updateTime": "2026-08-05T09:00:00Z"}),
            ),
            raw_event(
                "networkStatus",
                json!({
                    "signalStrength": 99,
                    "rssi": -61,
                    "transmissionMode": "LOW_POWER_STANDARD_MODE",
                    "updateTime": "2026-08-05T09:00:00Z",
                }),
            ),
            raw_event(
                "connectionStatus",
                json!({
                    "connection": "ETHERNET",
                    "available": ["ETHERNET", "CELLULAR"],
                    "updateTime": "2026-08-05T09:00:00Z",
                }),
            ),
            raw_event(
                "labelsChanged",
                json!({
                    "added": {"floor": "2"},
                    "modified": {"name": "Meeting room"},
                    "removed": ["decommissioned"],
                }),
            ),
        ];

        for raw in samples {
            let event_type = raw["eventType"].as_str().unwrap().to_string();
            let event = Event::from_raw(raw.clone())
                .unwrap_or_else(|e| panic!("{event_type} failed to parse: {e}"));
            assert_eq!(event.data.event_type(), event_type);
            assert_eq!(event.to_raw(), raw, "{event_type} did not round-trip");
        }
    }

    #[test]
    fn unknown_event_type_is_preserved_verbatim() {
        let payload = json!({"pressure": 101.3, "updateTime": "2026-08-05T09:00:00Z"});
        let raw = raw_event("barometricPressure", payload.clone());

        let event = Event::from_raw(raw.clone()).unwrap();
        match &event.data {
            EventData::Other { event_type, data } => {
                assert_eq!(event_type, "barometricPressure");
                assert_eq!(data, &payload);
            }
            other => panic!("expected Other, got {other:?}"),
        }
        assert_eq!(event.to_raw(), raw);
    }

    #[test]
    fn missing_field_is_a_format_error() {
        let raw = json!({"eventType": "touch", "data": {}});
        assert!(matches!(
            Event::from_raw(raw),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn malformed_known_payload_is_a_format_error() {
        let raw = raw_event("temperature", json!({"celsius": "not-a-number"}));
        assert!(matches!(Event::from_raw(raw), Err(Error::Format { .. })));
    }

    #[test]
    fn deserialize_impl_goes_through_from_raw() {
        let raw = raw_event("touch", json!({"updateTime": "2026-08-05T09:00:00Z"}));
        let event: Event = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(event.data, EventData::Touch(_)));
        assert_eq!(serde_json::to_value(&event).unwrap(), raw);
    }
}
