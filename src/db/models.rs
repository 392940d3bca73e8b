//! Diesel model structs for the sensor registry and its readings.
//!
//! `sensors` is owned by fleet provisioning and `sensor_readings` by
//! ingestion; this crate only reads them.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Bool, Double, Integer, Nullable, Text, Timestamptz};
use serde::{Deserialize, Serialize};

use crate::schema;

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::sensors)]
pub struct Sensor {
    pub id: i32,
    pub device_id: String,
    pub site: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::sensor_readings)]
#[diesel(belongs_to(Sensor))]
pub struct Reading {
    pub id: i64,
    pub sensor_id: i32,
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

/// One sensor joined with its newest reading, as returned by the lateral
/// latest-state query. Every reading column is `NULL` when the sensor has
/// never reported; `recorded_at` is the column that tells the two apart.
#[derive(Debug, Clone, PartialEq, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SnapshotRow {
    #[diesel(sql_type = Integer)]
    pub id: i32,
    #[diesel(sql_type = Text)]
    pub device_id: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub site: Option<String>,
    #[diesel(sql_type = Double)]
    pub lat: f64,
    #[diesel(sql_type = Double)]
    pub lng: f64,
    #[diesel(sql_type = Bool)]
    pub is_active: bool,
    #[diesel(sql_type = Timestamptz)]
    pub created_at: DateTime<Utc>,
    #[diesel(sql_type = Nullable<Double>)]
    pub pm1: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub pm25: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub pm10: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub co2: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub voc: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub temp: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub hum: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub ch2o: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub co: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub o3: Option<f64>,
    #[diesel(sql_type = Nullable<Double>)]
    pub no2: Option<f64>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub recorded_at: Option<DateTime<Utc>>,
}

// Insert-side structs exist only to seed store-backed tests.
#[cfg(test)]
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::sensors)]
pub struct NewSensor {
    pub device_id: String,
    pub site: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

#[cfg(test)]
#[derive(Debug, Clone, Default, Insertable)]
#[diesel(table_name = schema::sensor_readings)]
pub struct NewReading {
    pub sensor_id: i32,
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

#[cfg(test)]
impl NewReading {
    pub fn at(sensor_id: i32, recorded_at: DateTime<Utc>) -> Self {
        NewReading {
            sensor_id,
            recorded_at,
            ..Default::default()
        }
    }
}
