//! HTTP request handlers for the REST API.

pub mod auth;
pub mod users;

use sqlx::{PgPool, Postgres, pool::PoolConnection};

use crate::{
    AppState,
    errors::{Error, Result},
};

/// Check out a connection from the (lazily established) pool.
///
/// The first call per process dials the database and runs migrations;
/// establishment failures surface as 500s on whatever request hit them.
pub(crate) async fn db_conn(state: &AppState) -> Result<PoolConnection<Postgres>> {
    let pool: PgPool = state.db.acquire().await?;
    pool.acquire().await.map_err(|e| Error::Database(e.into()))
}
