//! Conversion of decoded payloads into readings
//!
//! The default [`PayloadSchema::AssetMap`] layout is a map of asset name to
//! a map of datapoints:
//!
//! ```text
//! {
//!   "tempSensor": {"temperature": 21.5, "humidity": 55, "timestamp": "2024-05-01T10:00:00Z"},
//!   "door":       {"open": false}
//! }
//! ```
//!
//! [`PayloadSchema::Envelope`] carries a single asset:
//!
//! ```text
//! {"asset": "sensor1", "timestamp": ..., "key": ..., "readings": {"velocity": "500"}}
//! ```
//!
//! Nested maps and arrays stay nested; nothing is flattened.

use std::fmt;

use coapum_cbor::CborValue;
use serde::{ser::SerializeMap, Serialize, Serializer};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::warn;

use crate::config::{ListenerConfig, PayloadSchema};
use crate::error::MappingError;

/// Value of a single datapoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DatapointValue {
    /// Any CBOR integer, -2^64 ..= 2^64 - 1
    Integer(i128),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
    Null,
    Array(Vec<DatapointValue>),
    Object(Datapoints),
}

impl DatapointValue {
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Datapoints> {
        match self {
            Self::Object(d) => Some(d),
            _ => None,
        }
    }
}

impl From<i64> for DatapointValue {
    fn from(n: i64) -> Self {
        Self::Integer(i128::from(n))
    }
}

impl From<f64> for DatapointValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for DatapointValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for DatapointValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Named datapoints in encounter order. Inserting an existing name replaces
/// its value in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Datapoints(Vec<(String, DatapointValue)>);

impl Datapoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: DatapointValue) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DatapointValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatapointValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }
}

impl FromIterator<(String, DatapointValue)> for Datapoints {
    fn from_iter<T: IntoIterator<Item = (String, DatapointValue)>>(iter: T) -> Self {
        let mut datapoints = Self::new();
        for (name, value) in iter {
            datapoints.insert(name, value);
        }
        datapoints
    }
}

impl Serialize for Datapoints {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// One asset's reading, handed over to ingestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub asset: String,
    /// From the payload when present and parseable, otherwise receipt time
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub datapoints: Datapoints,
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} datapoints)",
            self.asset,
            self.datapoints.len()
        )
    }
}

/// Schema expectation applied by [`map_readings`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapperOptions {
    pub schema: PayloadSchema,
    pub timestamp_key: String,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self::from_config(&ListenerConfig::default())
    }
}

impl MapperOptions {
    pub fn from_config(config: &ListenerConfig) -> Self {
        Self {
            schema: config.schema,
            timestamp_key: config.timestamp_key.clone(),
        }
    }
}

/// Convert a decoded payload into readings.
///
/// `received_at` is used for any reading without a usable timestamp.
pub fn map_readings(
    root: &CborValue,
    options: &MapperOptions,
    received_at: OffsetDateTime,
) -> Result<Vec<Reading>, MappingError> {
    match options.schema {
        PayloadSchema::AssetMap => map_asset_map(root, options, received_at),
        PayloadSchema::Envelope => map_envelope(root, options, received_at).map(|r| vec![r]),
    }
}

fn map_asset_map(
    root: &CborValue,
    options: &MapperOptions,
    received_at: OffsetDateTime,
) -> Result<Vec<Reading>, MappingError> {
    let entries = root
        .untagged()
        .as_map()
        .ok_or(MappingError::RootNotMap { found: root.kind() })?;

    let mut readings: Vec<Reading> = Vec::with_capacity(entries.len());
    for (index, (key, value)) in entries.iter().enumerate() {
        let asset = key
            .untagged()
            .as_text()
            .ok_or(MappingError::AssetNameNotText { found: key.kind() })?;

        let fields = value
            .untagged()
            .as_map()
            .ok_or(MappingError::AssetNotMap {
                index,
                found: value.kind(),
            })?;

        let mut timestamp = received_at;
        let mut datapoints = Datapoints::new();
        for (name, value) in fields {
            let name = datapoint_key(name)?;
            if name == options.timestamp_key {
                timestamp = timestamp_or(value, received_at);
            } else {
                datapoints.insert(name, to_datapoint(value)?);
            }
        }

        let reading = Reading {
            asset: asset.to_string(),
            timestamp,
            datapoints,
        };

        // Repeated asset keys: the last one wins
        match readings.iter_mut().find(|r| r.asset == reading.asset) {
            Some(existing) => *existing = reading,
            None => readings.push(reading),
        }
    }

    Ok(readings)
}

fn map_envelope(
    root: &CborValue,
    options: &MapperOptions,
    received_at: OffsetDateTime,
) -> Result<Reading, MappingError> {
    let root = root.untagged();
    if !root.is_map() {
        return Err(MappingError::RootNotMap { found: root.kind() });
    }

    let asset = root
        .get("asset")
        .ok_or(MappingError::MissingField { field: "asset" })?;
    let asset = asset
        .untagged()
        .as_text()
        .ok_or(MappingError::InvalidField {
            field: "asset",
            expected: "text string",
            found: asset.kind(),
        })?;

    let readings = root
        .get("readings")
        .or_else(|| root.get("sensor_values"))
        .ok_or(MappingError::MissingField { field: "readings" })?;
    let fields = readings
        .untagged()
        .as_map()
        .ok_or(MappingError::InvalidField {
            field: "readings",
            expected: "map",
            found: readings.kind(),
        })?;

    let timestamp = root
        .get(&options.timestamp_key)
        .map(|value| timestamp_or(value, received_at))
        .unwrap_or(received_at);

    let datapoints = fields
        .iter()
        .map(|(name, value)| Ok((datapoint_key(name)?, to_datapoint(value)?)))
        .collect::<Result<Datapoints, MappingError>>()?;

    Ok(Reading {
        asset: asset.to_string(),
        timestamp,
        datapoints,
    })
}

fn datapoint_key(key: &CborValue) -> Result<String, MappingError> {
    let key = key.untagged();
    match key {
        CborValue::TextString(s) => Ok(s.clone()),
        CborValue::Unsigned(_) | CborValue::Negative(_) => key
            .as_integer()
            .map(|n| n.to_string())
            .ok_or(MappingError::InvalidDatapointKey { found: key.kind() }),
        other => Err(MappingError::InvalidDatapointKey {
            found: other.kind(),
        }),
    }
}

fn to_datapoint(value: &CborValue) -> Result<DatapointValue, MappingError> {
    Ok(match value {
        CborValue::Unsigned(_) | CborValue::Negative(_) => {
            DatapointValue::Integer(value.as_integer().unwrap_or_default())
        }
        CborValue::Float(f) => DatapointValue::Float(*f),
        CborValue::TextString(s) => DatapointValue::Text(s.clone()),
        CborValue::ByteString(b) => DatapointValue::Bytes(b.clone()),
        CborValue::Bool(b) => DatapointValue::Bool(*b),
        CborValue::Null | CborValue::Undefined => DatapointValue::Null,
        CborValue::Array(items) => DatapointValue::Array(
            items
                .iter()
                .map(to_datapoint)
                .collect::<Result<_, _>>()?,
        ),
        CborValue::Map(entries) => DatapointValue::Object(
            entries
                .iter()
                .map(|(k, v)| Ok((datapoint_key(k)?, to_datapoint(v)?)))
                .collect::<Result<Datapoints, MappingError>>()?,
        ),
        CborValue::Tag(_, inner) => to_datapoint(inner)?,
    })
}

fn timestamp_or(value: &CborValue, received_at: OffsetDateTime) -> OffsetDateTime {
    parse_timestamp(value).unwrap_or_else(|| {
        warn!("Unusable {} timestamp, using receipt time", value.kind());
        received_at
    })
}

/// RFC 3339 text (optionally tag 0) or epoch seconds (optionally tag 1)
pub fn parse_timestamp(value: &CborValue) -> Option<OffsetDateTime> {
    match value {
        CborValue::TextString(s) => OffsetDateTime::parse(s, &Rfc3339).ok(),
        CborValue::Unsigned(_) | CborValue::Negative(_) => {
            let seconds = i64::try_from(value.as_integer()?).ok()?;
            OffsetDateTime::from_unix_timestamp(seconds).ok()
        }
        CborValue::Float(f) if f.is_finite() => {
            OffsetDateTime::from_unix_timestamp_nanos((f * 1e9) as i128).ok()
        }
        CborValue::Tag(0, inner) if matches!(**inner, CborValue::TextString(_)) => {
            parse_timestamp(inner)
        }
        CborValue::Tag(1, inner) if !matches!(**inner, CborValue::TextString(_)) => {
            parse_timestamp(inner)
        }
        _ => None,
    }
}
