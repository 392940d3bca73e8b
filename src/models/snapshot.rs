//! Transport view model for the latest-state snapshot.
//!
//! Serialized by the HTTP server and decoded by the snapshot client, so the
//! field names are the wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sensor with its newest reading, or `reading: null` when it has never
/// reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorView {
    pub id: i32,
    pub device_id: String,
    pub site: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub reading: Option<ReadingView>,
}

/// Measurement fields are independently nullable because not every sensor
/// model reports every quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingView {
    pub pm1: Option<f64>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub co2: Option<f64>,
    pub voc: Option<f64>,
    pub temp: Option<f64>,
    pub hum: Option<f64>,
    pub ch2o: Option<f64>,
    pub co: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}
