//! Latest-state resolver: one row per sensor with its newest reading.
//!
//! The newest reading is found by a `LEFT JOIN LATERAL` subquery correlated to
//! each sensor row. With the `(sensor_id, recorded_at DESC, id DESC)` index
//! that subquery is a single index descent per sensor, so cost follows fleet
//! size rather than reading volume. Sensors without readings survive the
//! left join with every reading column `NULL`.

use diesel::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Array, Text};
use log::debug;

use crate::db::models::{Sensor, SnapshotRow};
use crate::db::store::StoreError;
use crate::filter::DeviceFilter;
use crate::schema;

const LATEST_SELECT: &str = r#"
    SELECT
      s.id, s.device_id, s.site, s.lat, s.lng, s.is_active, s.created_at,
      latest.pm1, latest.pm25, latest.pm10, latest.co2, latest.voc,
      latest.temp, latest.hum, latest.ch2o, latest.co, latest.o3, latest.no2,
      latest.recorded_at
    FROM sensors s
    LEFT JOIN LATERAL (
      SELECT
        sr.pm1, sr.pm25, sr.pm10, sr.co2, sr.voc,
        sr.temp, sr.hum, sr.ch2o, sr.co, sr.o3, sr.no2,
        sr.recorded_at
      FROM sensor_readings sr
      WHERE sr.sensor_id = s.id
      ORDER BY sr.recorded_at DESC, sr.id DESC
      LIMIT 1
    ) AS latest ON TRUE
"#;

const BY_DEVICE: &str = "WHERE s.device_id = ANY($1)";
const ORDER: &str = "ORDER BY s.device_id ASC";

fn latest_sql(by_device: bool) -> String {
    if by_device {
        format!("{LATEST_SELECT} {BY_DEVICE} {ORDER}")
    } else {
        format!("{LATEST_SELECT} {ORDER}")
    }
}

/// Resolve the latest reading of every sensor matching `filter`, ordered by
/// `device_id`. An empty filter selects the whole fleet.
pub fn resolve(conn: &mut PgConnection, filter: &DeviceFilter) -> Result<Vec<SnapshotRow>, StoreError> {
    let sql = latest_sql(!filter.is_empty());
    let rows = if filter.is_empty() {
        diesel::sql_query(sql).load::<SnapshotRow>(conn)?
    } else {
        diesel::sql_query(sql)
            .bind::<Array<Text>, _>(filter.ids())
            .load::<SnapshotRow>(conn)?
    };
    debug!(
        "Resolved latest state for {} sensor(s) (filter={}, without readings={})",
        rows.len(),
        filter,
        rows.iter().filter(|r| r.recorded_at.is_none()).count()
    );
    Ok(rows)
}

/// Registry rows for the same filter and ordering, without readings.
pub fn list_sensors(conn: &mut PgConnection, filter: &DeviceFilter) -> Result<Vec<Sensor>, StoreError> {
    use schema::sensors::dsl as S;

    let mut query = S::sensors.select(Sensor::as_select()).order(S::device_id.asc()).into_boxed();
    if !filter.is_empty() {
        query = query.filter(S::device_id.eq_any(filter.ids()));
    }
    let sensors: Vec<Sensor> = query.load(conn)?;
    if !filter.is_empty() && sensors.len() < filter.len() {
        debug!(
            "{} of {} requested device id(s) are not registered",
            filter.len() - sensors.len(),
            filter.len()
        );
    }
    Ok(sensors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewReading, NewSensor, Reading};
    use crate::services::shaper;
    use chrono::{DateTime, TimeZone, Utc};
    use diesel_migrations::MigrationHarness;
    use rand::seq::SliceRandom;
    use std::sync::Once;

    static MIGRATE: Once = Once::new();

    fn squash(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn latest_query_takes_one_reading_per_sensor() {
        let sql = squash(&latest_sql(false));
        assert!(sql.contains("FROM sensors s LEFT JOIN LATERAL ("), "{sql}");
        assert!(sql.contains("WHERE sr.sensor_id = s.id"), "{sql}");
        assert!(sql.contains("ORDER BY sr.recorded_at DESC, sr.id DESC LIMIT 1 ) AS latest ON TRUE"), "{sql}");
        assert!(sql.ends_with("ORDER BY s.device_id ASC"), "{sql}");
        assert!(!sql.contains("ANY($1)"), "{sql}");
    }

    #[test]
    fn filtered_query_restricts_before_ordering() {
        let sql = squash(&latest_sql(true));
        assert!(sql.ends_with("ON TRUE WHERE s.device_id = ANY($1) ORDER BY s.device_id ASC"), "{sql}");
    }

    /// Store-backed tests need `TEST_DATABASE_URL`; without it they skip.
    fn test_conn() -> Option<PgConnection> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping store-backed test");
            return None;
        };
        let mut conn = PgConnection::establish(&url).expect("connect to TEST_DATABASE_URL");
        MIGRATE.call_once(|| {
            let mut migrate_conn = PgConnection::establish(&url).expect("connect for migrations");
            migrate_conn
                .run_pending_migrations(crate::MIGRATIONS)
                .expect("apply migrations");
        });
        conn.begin_test_transaction().expect("begin test transaction");
        Some(conn)
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn add_sensor(conn: &mut PgConnection, device_id: &str, lat: f64, lng: f64) -> i32 {
        use schema::sensors::dsl as S;
        diesel::insert_into(S::sensors)
            .values(&NewSensor {
                device_id: device_id.to_string(),
                site: Some(format!("site of {device_id}")),
                lat,
                lng,
            })
            .returning(S::id)
            .get_result(conn)
            .expect("insert sensor")
    }

    fn add_reading(conn: &mut PgConnection, reading: NewReading) {
        diesel::insert_into(schema::sensor_readings::table)
            .values(&reading)
            .execute(conn)
            .expect("insert reading");
    }

    /// Sensors A (pm25=12 at t=100), B (never reported), C (pm25=5 at t=200),
    /// with device ids prefixed so rows already in the database don't interfere.
    fn seed_abc(conn: &mut PgConnection, prefix: &str) -> [String; 3] {
        let [a, b, c] = ["A", "B", "C"].map(|s| format!("{prefix}-{s}"));
        let a_id = add_sensor(conn, &a, 43.20, 76.85);
        add_sensor(conn, &b, 43.25, 76.90);
        let c_id = add_sensor(conn, &c, 43.30, 76.95);

        add_reading(conn, NewReading { pm25: Some(40.0), ..NewReading::at(a_id, ts(50)) });
        add_reading(conn, NewReading { pm25: Some(12.0), ..NewReading::at(a_id, ts(100)) });
        add_reading(conn, NewReading { pm25: Some(5.0), ..NewReading::at(c_id, ts(200)) });
        [a, b, c]
    }

    fn only_prefixed(rows: Vec<SnapshotRow>, prefix: &str) -> Vec<SnapshotRow> {
        rows.into_iter().filter(|r| r.device_id.starts_with(prefix)).collect()
    }

    #[test]
    fn resolves_abc_scenario() {
        let Some(mut conn) = test_conn() else { return };
        let [a, b, c] = seed_abc(&mut conn, "abc");

        let rows = only_prefixed(resolve(&mut conn, &DeviceFilter::all()).unwrap(), "abc-");
        let ids: Vec<_> = rows.iter().map(|r| r.device_id.clone()).collect();
        assert_eq!(ids, vec![a.clone(), b.clone(), c.clone()]);

        assert_eq!(rows[0].pm25, Some(12.0));
        assert_eq!(rows[0].recorded_at, Some(ts(100)));
        assert_eq!(rows[1].recorded_at, None);
        assert_eq!(rows[2].pm25, Some(5.0));
        assert_eq!(rows[2].recorded_at, Some(ts(200)));

        let subset = resolve(&mut conn, &DeviceFilter::from_ids([&c, &a])).unwrap();
        assert_eq!(subset, vec![rows[0].clone(), rows[2].clone()]);

        let views = shaper::shape(rows);
        assert!(views[1].reading.is_none());
        assert_eq!(views[1].device_id, b);
    }

    #[test]
    fn sensor_without_readings_has_null_reading_not_null_fields() {
        let Some(mut conn) = test_conn() else { return };
        add_sensor(&mut conn, "nulls-quiet", 1.0, 1.0);
        let sparse = add_sensor(&mut conn, "nulls-sparse", 2.0, 2.0);
        // A reading whose measurements are all NULL is still a reading.
        add_reading(&mut conn, NewReading::at(sparse, ts(10)));

        let rows = resolve(&mut conn, &DeviceFilter::parse("nulls-quiet,nulls-sparse")).unwrap();
        let views = shaper::shape(rows);
        assert!(views[0].reading.is_none());
        let sparse_reading = views[1].reading.as_ref().expect("all-null reading is still present");
        assert_eq!(sparse_reading.recorded_at, ts(10));
        assert_eq!(sparse_reading.pm25, None);
    }

    #[test]
    fn latest_reading_is_max_recorded_at_per_sensor() {
        let Some(mut conn) = test_conn() else { return };
        for (i, name) in ["max-1", "max-2", "max-3"].iter().enumerate() {
            let id = add_sensor(&mut conn, name, i as f64, i as f64);
            // Inserted out of timestamp order to catch "last inserted wins".
            for (offset, secs) in [300, 100, 500, 200].iter().enumerate() {
                add_reading(
                    &mut conn,
                    NewReading { temp: Some((i * 10 + offset) as f64), ..NewReading::at(id, ts(secs + i as i64)) },
                );
            }
        }

        let registry: Vec<Sensor> = list_sensors(&mut conn, &DeviceFilter::parse("max-1,max-2,max-3")).unwrap();
        let readings: Vec<Reading> = Reading::belonging_to(&registry)
            .select(Reading::as_select())
            .load(&mut conn)
            .unwrap();

        let rows = resolve(&mut conn, &DeviceFilter::parse("max-1,max-2,max-3")).unwrap();
        assert_eq!(rows.len(), 3);
        for row in rows {
            let newest = readings
                .iter()
                .filter(|r| r.sensor_id == row.id)
                .max_by_key(|r| r.recorded_at)
                .unwrap();
            assert_eq!(row.recorded_at, Some(newest.recorded_at));
            assert_eq!(row.temp, newest.temp);
        }
    }

    #[test]
    fn timestamp_ties_resolve_to_the_newest_row_every_time() {
        let Some(mut conn) = test_conn() else { return };
        let id = add_sensor(&mut conn, "tie-1", 0.0, 0.0);
        add_reading(&mut conn, NewReading { co2: Some(400.0), ..NewReading::at(id, ts(100)) });
        add_reading(&mut conn, NewReading { co2: Some(401.0), ..NewReading::at(id, ts(100)) });

        let filter = DeviceFilter::parse("tie-1");
        let first = resolve(&mut conn, &filter).unwrap();
        let second = resolve(&mut conn, &filter).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].co2, Some(401.0));
    }

    #[test]
    fn filter_is_a_subset_of_the_wider_query() {
        let Some(mut conn) = test_conn() else { return };
        let [a, b, c] = seed_abc(&mut conn, "subset");

        let wide = resolve(&mut conn, &DeviceFilter::from_ids([&a, &b, &c])).unwrap();
        let narrow = resolve(&mut conn, &DeviceFilter::from_ids([&a, &b])).unwrap();
        let expected: Vec<_> = wide.into_iter().filter(|r| r.device_id == a || r.device_id == b).collect();
        assert_eq!(narrow, expected);
    }

    #[test]
    fn output_order_ignores_filter_order() {
        let Some(mut conn) = test_conn() else { return };
        let mut names: Vec<String> = (0..8).map(|i| format!("order-{i:02}")).collect();
        for (i, name) in names.iter().enumerate() {
            let id = add_sensor(&mut conn, name, 0.0, 0.0);
            if i % 2 == 0 {
                add_reading(&mut conn, NewReading::at(id, ts(i as i64)));
            }
        }

        let mut rng = rand::rng();
        names.shuffle(&mut rng);
        let rows = resolve(&mut conn, &DeviceFilter::from_ids(&names)).unwrap();
        let got: Vec<_> = rows.iter().map(|r| r.device_id.clone()).collect();
        let mut sorted = got.clone();
        sorted.sort();
        assert_eq!(got, sorted);
        assert_eq!(got.len(), 8);
    }

    #[test]
    fn unknown_devices_yield_no_rows() {
        let Some(mut conn) = test_conn() else { return };
        let rows = resolve(&mut conn, &DeviceFilter::parse("does-not-exist")).unwrap();
        assert!(rows.is_empty());
        assert!(list_sensors(&mut conn, &DeviceFilter::parse("does-not-exist")).unwrap().is_empty());
    }
}
