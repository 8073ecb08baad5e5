mod analytics;
mod cfg;
mod channel;
mod error;
mod sent_message;

use crate::prelude::*;
use sqlx::postgres::PgPoolOptions;

pub(crate) use analytics::*;
pub(crate) use cfg::*;
pub(crate) use channel::*;
pub use error::*;
pub(crate) use sent_message::*;

pub(crate) async fn init(config: Config) -> Result<sqlx::PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        // Verify that the connection is working early.
        // The connection created here can also be reused by the migrations down the road.
        .connect(config.url.as_str())
        .await
        .map_err(err_ctx!(DbError::Connect))?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(err_ctx!(DbError::Migrate))?;

    Ok(pool)
}
