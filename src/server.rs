//! Read-only HTTP surface for the snapshot.
//!
//! Resolver calls are blocking diesel calls, so each handler moves its store
//! work onto tokio's blocking pool. Handlers share nothing but the source.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::db::models::Sensor;
use crate::db::store::{Store, StoreError};
use crate::filter::{DEVICE_IDS_PARAM, DeviceFilter};
use crate::models::snapshot::SensorView;
use crate::services::{resolver, shaper};

pub const LATEST_PATH: &str = "/api/sensors/latest";
pub const SENSORS_PATH: &str = "/api/sensors";

/// Where the handlers get their data.
pub trait SnapshotSource: Send + Sync + 'static {
    fn latest(&self, filter: &DeviceFilter) -> Result<Vec<SensorView>, StoreError>;
    fn sensors(&self, filter: &DeviceFilter) -> Result<Vec<Sensor>, StoreError>;
}

impl SnapshotSource for Store {
    fn latest(&self, filter: &DeviceFilter) -> Result<Vec<SensorView>, StoreError> {
        let mut conn = self.connection()?;
        let rows = resolver::resolve(&mut conn, filter)?;
        Ok(shaper::shape(rows))
    }

    fn sensors(&self, filter: &DeviceFilter) -> Result<Vec<Sensor>, StoreError> {
        let mut conn = self.connection()?;
        resolver::list_sensors(&mut conn, filter)
    }
}

type AppState = Arc<dyn SnapshotSource>;

/// Raw query pairs. Taken as a list so a repeated `deviceIds` merges
/// instead of failing extraction; unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct SnapshotQuery(Vec<(String, String)>);

impl SnapshotQuery {
    fn filter(&self) -> DeviceFilter {
        DeviceFilter::from_query(
            self.0
                .iter()
                .filter(|(key, _)| key == DEVICE_IDS_PARAM)
                .map(|(_, value)| value.as_str()),
        )
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn router(source: AppState) -> Router {
    Router::new()
        .route(LATEST_PATH, get(latest_handler))
        .route(SENSORS_PATH, get(sensors_handler))
        .with_state(source)
}

async fn latest_handler(State(source): State<AppState>, Query(query): Query<SnapshotQuery>) -> Response {
    let filter = query.filter();
    debug!("GET {} filter={}", LATEST_PATH, filter);
    let result = tokio::task::spawn_blocking(move || source.latest(&filter)).await;
    respond(LATEST_PATH, result)
}

async fn sensors_handler(State(source): State<AppState>, Query(query): Query<SnapshotQuery>) -> Response {
    let filter = query.filter();
    debug!("GET {} filter={}", SENSORS_PATH, filter);
    let result = tokio::task::spawn_blocking(move || source.sensors(&filter)).await;
    respond(SENSORS_PATH, result)
}

fn respond<T: Serialize>(path: &str, result: Result<Result<T, StoreError>, tokio::task::JoinError>) -> Response {
    match result {
        Ok(Ok(body)) => Json(body).into_response(),
        Ok(Err(e)) => {
            error!("{} failed: {}", path, e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e) => {
            error!("{} worker join failed: {}", path, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorBody { error })).into_response()
}

/// Serve until Ctrl-C. Owns its own tokio runtime so the rest of the binary
/// stays synchronous.
pub fn run(source: AppState, bind_addr: &str) -> Result<(), String> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("BIND_ADDR {} is not a socket address: {}", bind_addr, e))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("snapshot-http")
        .build()
        .map_err(|e| format!("tokio runtime setup failed: {}", e))?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| format!("binding {} failed: {}", addr, e))?;
        info!("Serving snapshot API on http://{}{}", addr, LATEST_PATH);
        axum::serve(listener, router(source))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| format!("HTTP server failed: {}", e))
    })?;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Listening for Ctrl-C failed: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
