use crate::content::{AffiliateCodes, BotCredential, Channel, ChannelButtonOverrides, ChannelId, PostingSettings};
use crate::distribution::ChannelStore;
use crate::prelude::*;
use async_trait::async_trait;
use chrono::prelude::*;
use sea_query::{Alias, Expr, Func, Order, Query, SelectStatement};
use sqlx::types::Json;
use sqlx_bat::prelude::*;

#[sea_query::enum_def(table_name = "channels")]
#[allow(dead_code)]
struct ChannelRow {
    id: i64,
    name: String,
    chat: String,
    language: String,
    is_active: bool,
    bot_id: i64,
    buttons: Json<ChannelButtonOverrides>,
    affiliate: Json<AffiliateCodes>,
    posting: Json<PostingSettings>,
    created_at: DateTime<Utc>,
}

#[sea_query::enum_def(table_name = "bots")]
#[allow(dead_code)]
struct BotRow {
    id: i64,
    token: String,
    is_active: bool,
}

/// Channel joined with the bot that owns it
#[derive(sqlx::FromRow)]
struct ChannelRecord {
    id: i64,
    name: String,
    chat: String,
    language: String,
    is_active: bool,
    bot_id: i64,
    bot_token: String,
    bot_is_active: bool,
    buttons: Json<ChannelButtonOverrides>,
    affiliate: Json<AffiliateCodes>,
    posting: Json<PostingSettings>,
    created_at: DateTime<Utc>,
}

impl ChannelRecord {
    fn into_channel(self) -> Result<Channel> {
        Ok(Channel {
            id: self.id.try_into_app()?,
            name: self.name,
            chat: self.chat,
            language: self.language,
            is_active: self.is_active,
            bot: BotCredential {
                id: self.bot_id,
                token: self.bot_token,
                is_active: self.bot_is_active,
            },
            buttons: self.buttons.0,
            affiliate: self.affiliate.0,
            posting: self.posting.0,
            created_at: self.created_at,
        })
    }
}

pub(crate) struct ChannelRepo {
    db: sqlx::PgPool,
}

impl ChannelRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }

    /// Active channels of active bots in the order of their creation
    fn select_active() -> SelectStatement {
        use ChannelRowIden as C;

        Query::select()
            .columns([
                (C::Table, C::Id),
                (C::Table, C::Name),
                (C::Table, C::Chat),
                (C::Table, C::Language),
                (C::Table, C::IsActive),
                (C::Table, C::BotId),
                (C::Table, C::Buttons),
                (C::Table, C::Affiliate),
                (C::Table, C::Posting),
                (C::Table, C::CreatedAt),
            ])
            .expr_as(
                Expr::col((BotRowIden::Table, BotRowIden::Token)),
                Alias::new("bot_token"),
            )
            .expr_as(
                Expr::col((BotRowIden::Table, BotRowIden::IsActive)),
                Alias::new("bot_is_active"),
            )
            .from(C::Table)
            .inner_join(
                BotRowIden::Table,
                Expr::col((BotRowIden::Table, BotRowIden::Id)).equals((C::Table, C::BotId)),
            )
            .and_where(Expr::col((C::Table, C::IsActive)).eq(true))
            .and_where(Expr::col((BotRowIden::Table, BotRowIden::IsActive)).eq(true))
            .order_by((C::Table, C::CreatedAt), Order::Asc)
            .order_by((C::Table, C::Id), Order::Asc)
            .to_owned()
    }

    async fn fetch_all(&self, select: &SelectStatement) -> Result<Vec<Channel>> {
        select
            .into_sqlx()
            .query_as::<ChannelRecord>()
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(ChannelRecord::into_channel)
            .collect()
    }
}

#[async_trait]
impl ChannelStore for ChannelRepo {
    #[instrument(skip(self))]
    async fn active_channels_by_ids(&self, ids: &[ChannelId]) -> Result<Vec<Channel>> {
        let ids = ids
            .iter()
            .map(|id| id.try_into_db())
            .collect::<Result<Vec<_>, _>>()?;

        let select = Self::select_active()
            .and_where(Expr::col((ChannelRowIden::Table, ChannelRowIden::Id)).is_in(ids))
            .to_owned();

        self.fetch_all(&select).await
    }

    #[instrument(skip(self))]
    async fn active_channels_by_language(&self, language: &str) -> Result<Vec<Channel>> {
        // Channels may store the language with a region subtag, e.g. `pt-BR`
        let stored = || Expr::expr(Func::lower(Expr::col((ChannelRowIden::Table, ChannelRowIden::Language))));

        let select = Self::select_active()
            .and_where(
                stored()
                    .eq(language)
                    .or(stored().like(format!("{language}-%")))
                    .or(stored().like(format!("{language}\\_%"))),
            )
            .to_owned();

        self.fetch_all(&select).await
    }

    #[instrument(skip(self))]
    async fn active_channels(&self) -> Result<Vec<Channel>> {
        self.fetch_all(&Self::select_active()).await
    }

    #[instrument(skip(self))]
    async fn any_active_channel(&self) -> Result<Option<Channel>> {
        let select = Self::select_active().limit(1).to_owned();
        Ok(self.fetch_all(&select).await?.into_iter().next())
    }
}
