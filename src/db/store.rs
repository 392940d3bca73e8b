//! Explicitly owned connection pool for the reading store.
//!
//! Constructed once in `main`, cloned into whoever needs it and torn down
//! with `close()` on shutdown; nothing here is a process-wide global.

use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;
use std::time::Duration;

use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use log::info;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgPooled = PooledConnection<ConnectionManager<PgConnection>>;

/// The store could not answer. Callers treat every variant as a single
/// data-unavailable condition; the split only matters for logs.
#[derive(Debug)]
pub enum StoreError {
    /// No connection could be checked out of the pool in time.
    Pool(String),
    /// The query itself failed.
    Query(diesel::result::Error),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Pool(e) => write!(f, "data unavailable: no store connection: {}", e),
            StoreError::Query(e) => write!(f, "data unavailable: query failed: {}", e),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Query(e) => Some(e),
            StoreError::Pool(_) => None,
        }
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(value: diesel::result::Error) -> Self {
        StoreError::Query(value)
    }
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Build the pool. Connections are opened lazily, so an unreachable
    /// database only fails here if the first connection cannot be made
    /// within `connect_timeout`.
    pub fn connect(database_url: &str, max_size: NonZeroU32, connect_timeout: Duration) -> Result<Self, String> {
        // r2d2 asserts on a zero timeout.
        if connect_timeout.is_zero() {
            return Err("DB connect timeout must be greater than zero".to_string());
        }
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(max_size.get())
            .connection_timeout(connect_timeout)
            .build(manager)
            .map_err(|e| format!("DB pool setup failed: {}", e))?;
        info!("Store pool ready (max_size={})", max_size.get());
        Ok(Store { pool })
    }

    /// Check out a connection, or fail with a data-unavailable error.
    pub fn connection(&self) -> Result<PgPooled, StoreError> {
        self.pool.get().map_err(|e| StoreError::Pool(e.to_string()))
    }

    /// Release the pool. Idle connections close when the last clone drops.
    pub fn close(self) {
        let state = self.pool.state();
        info!(
            "Closing store pool (connections={}, idle={})",
            state.connections, state.idle_connections
        );
        drop(self.pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_read_as_data_unavailable() {
        let pool = StoreError::Pool("timed out".into());
        assert_eq!(pool.to_string(), "data unavailable: no store connection: timed out");
        assert!(pool.source().is_none());

        let query = StoreError::from(diesel::result::Error::NotFound);
        assert!(query.to_string().starts_with("data unavailable: query failed"));
        assert!(query.source().is_some());
    }

    #[test]
    fn zero_connect_timeout_is_an_error_not_a_panic() {
        let one = NonZeroU32::new(1).unwrap();
        let err = Store::connect("postgres://nobody@127.0.0.1:9/none", one, Duration::ZERO).err();
        assert!(err.is_some_and(|e| e.contains("timeout")));
    }
}
