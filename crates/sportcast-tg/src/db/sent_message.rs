use crate::distribution::{MessageId, RateKey, RateLock, RateRecord, RateStore};
use crate::prelude::*;
use async_trait::async_trait;
use chrono::prelude::*;
use sea_query::{DeleteStatement, Expr, Query};
use sqlx_bat::prelude::*;

#[sea_query::enum_def(table_name = "sent_messages")]
#[allow(dead_code)]
struct SentMessage {
    id: i64,
    channel_id: i64,
    content_kind: String,

    /// Empty string when the send had no bucket, so that the key columns
    /// are never null
    bucket: String,
    provider_message_id: i32,
    sent_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RateRecordRow {
    last_sent_at: Option<DateTime<Utc>>,
    sent_in_window: i64,
}

pub(crate) struct SentMessageRepo {
    db: sqlx::PgPool,
}

impl SentMessageRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RateStore for SentMessageRepo {
    /// The lock is a transaction-level advisory lock, so it occupies a
    /// connection of the pool until the permit is recorded or dropped.
    #[instrument(skip(self))]
    async fn lock(&self, key: &RateKey) -> Result<Box<dyn RateLock>> {
        let mut tx = self.db.begin().await?;

        sqlx::query("select pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(advisory_lock_key(key))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgRateLock {
            key: key.clone(),
            tx,
        }))
    }
}

fn advisory_lock_key(key: &RateKey) -> String {
    format!(
        "sent_messages:{}:{}:{}",
        key.channel,
        key.kind,
        key.bucket.as_deref().unwrap_or_default()
    )
}

/// Rollback of the transaction on drop releases the advisory lock
struct PgRateLock {
    key: RateKey,
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl PgRateLock {
    /// Deletes the sends of the key that are too old to affect the gate.
    /// The latest send is never deleted, because it's inside the window.
    fn prune(key: &RateKey, sent_at: DateTime<Utc>) -> Result<DeleteStatement> {
        use SentMessageIden as S;

        let retain_since = sent_at.saturating_sub_std(key.kind.config().window);

        Ok(Query::delete()
            .from_table(S::Table)
            .and_where(Expr::col(S::ChannelId).eq(key.channel.try_into_db()?))
            .and_where(Expr::col(S::ContentKind).eq(key.kind.try_into_db()?))
            .and_where(Expr::col(S::Bucket).eq(key.bucket.clone().unwrap_or_default()))
            .and_where(Expr::col(S::SentAt).lt(retain_since))
            .to_owned())
    }
}

#[async_trait]
impl RateLock for PgRateLock {
    #[instrument(skip(self))]
    async fn load(&mut self, window_start: DateTime<Utc>) -> Result<RateRecord> {
        let key = &self.key;

        let row: RateRecordRow = sqlx::query_as(
            "select
                max(sent_at) as last_sent_at,
                count(*) filter (where sent_at >= $4) as sent_in_window
            from sent_messages
            where channel_id = $1 and content_kind = $2 and bucket = $3",
        )
        .bind(key.channel.try_into_db()?)
        .bind(key.kind.try_into_db()?)
        .bind(key.bucket.clone().unwrap_or_default())
        .bind(window_start)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(RateRecord {
            last_sent_at: row.last_sent_at,
            sent_in_window: u32::try_from(row.sent_in_window).unwrap_or(u32::MAX),
        })
    }

    #[instrument(skip(self))]
    async fn record(self: Box<Self>, message_id: MessageId, sent_at: DateTime<Utc>) -> Result {
        use SentMessageIden as S;

        let Self { key, mut tx } = *self;

        Query::insert()
            .into_table(S::Table)
            .columns([
                S::ChannelId,
                S::ContentKind,
                S::Bucket,
                S::ProviderMessageId,
                S::SentAt,
            ])
            .values_panic(sqlx_bat::simple_expr_vec![
                key.channel.try_into_db()?,
                key.kind.try_into_db()?,
                key.bucket.clone().unwrap_or_default(),
                message_id,
                sent_at,
            ])
            .into_sqlx()
            .query()
            .execute(&mut *tx)
            .await?;

        let pruned = Self::prune(&key, sent_at)?
            .into_sqlx()
            .query()
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if pruned > 0 {
            debug!(pruned, "Pruned the sends that are out of the window");
        }

        tx.commit().await?;

        Ok(())
    }
}
