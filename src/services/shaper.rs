//! Flat resolver rows to nested transport views.

use crate::db::models::SnapshotRow;
use crate::models::snapshot::{ReadingView, SensorView};

/// Shape every row. Pure and infallible; output order follows input order.
pub fn shape(rows: Vec<SnapshotRow>) -> Vec<SensorView> {
    rows.into_iter().map(SensorView::from).collect()
}

impl From<SnapshotRow> for SensorView {
    fn from(row: SnapshotRow) -> Self {
        // `recorded_at` is NOT NULL in the readings table, so its absence
        // means the lateral join found nothing.
        let reading = row.recorded_at.map(|recorded_at| ReadingView {
            pm1: row.pm1,
            pm25: row.pm25,
            pm10: row.pm10,
            co2: row.co2,
            voc: row.voc,
            temp: row.temp,
            hum: row.hum,
            ch2o: row.ch2o,
            co: row.co,
            o3: row.o3,
            no2: row.no2,
            recorded_at,
        });

        SensorView {
            id: row.id,
            device_id: row.device_id,
            site: row.site,
            lat: row.lat,
            lng: row.lng,
            is_active: row.is_active,
            created_at: row.created_at,
            reading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(device_id: &str, recorded_at: Option<i64>, pm25: Option<f64>) -> SnapshotRow {
        SnapshotRow {
            id: 7,
            device_id: device_id.to_string(),
            site: Some("School 12".into()),
            lat: 43.2567,
            lng: 76.9286,
            is_active: true,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            pm1: None,
            pm25,
            pm10: None,
            co2: None,
            voc: None,
            temp: Some(21.5),
            hum: None,
            ch2o: None,
            co: None,
            o3: None,
            no2: None,
            recorded_at: recorded_at.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        }
    }

    #[test]
    fn row_without_recorded_at_becomes_null_reading() {
        // Measurement columns are ignored when there is no reading at all.
        let view = SensorView::from(row("B", None, Some(99.0)));
        assert_eq!(view.reading, None);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["reading"], serde_json::Value::Null);
        assert_eq!(json["device_id"], "B");
    }

    #[test]
    fn row_with_reading_nests_every_measurement() {
        let view = SensorView::from(row("A", Some(100), Some(12.0)));
        let reading = view.reading.expect("reading present");
        assert_eq!(reading.pm25, Some(12.0));
        assert_eq!(reading.temp, Some(21.5));
        assert_eq!(reading.pm1, None);
        assert_eq!(reading.recorded_at, Utc.timestamp_opt(100, 0).unwrap());
    }

    #[test]
    fn sensor_fields_pass_through_unchanged() {
        let source = row("A", None, None);
        let view = SensorView::from(source.clone());
        assert_eq!(view.id, source.id);
        assert_eq!(view.site, source.site);
        assert_eq!((view.lat, view.lng), (source.lat, source.lng));
        assert_eq!(view.is_active, source.is_active);
        assert_eq!(view.created_at, source.created_at);
    }

    #[test]
    fn shape_is_one_to_one_and_order_preserving() {
        let rows = vec![row("A", Some(100), Some(12.0)), row("B", None, None), row("C", Some(200), Some(5.0))];
        let views = shape(rows);
        let ids: Vec<_> = views.iter().map(|v| v.device_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert!(views[1].reading.is_none());
        assert_eq!(views[2].reading.as_ref().and_then(|r| r.pm25), Some(5.0));
    }
}
