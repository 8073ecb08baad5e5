use crate::distribution::{DistributionReport, QualityLogEntry, UsageSink};
use crate::prelude::*;
use async_trait::async_trait;
use chrono::prelude::*;
use sea_query::Query;
use sqlx::types::Json;
use sqlx_bat::prelude::*;

#[sea_query::enum_def(table_name = "content_quality_log")]
#[allow(dead_code)]
struct ContentQualityLog {
    id: i64,
    envelope_id: String,
    content_kind: String,
    issue: String,
    language: String,
    detected_language: Option<String>,
    created_at: DateTime<Utc>,
}

pub(crate) struct AnalyticsRepo {
    db: sqlx::PgPool,
}

impl AnalyticsRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

fn count(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl UsageSink for AnalyticsRepo {
    #[instrument(skip_all, fields(envelope_id = %report.envelope_id))]
    async fn record_distribution(&self, report: &DistributionReport) -> Result {
        let status: &'static str = report.status.into();
        let trigger: &'static str = report.trigger.into();

        sqlx::query(
            "insert into content_distributions (
                envelope_id, content_kind, status, language, trigger,
                channels_attempted, success_count, blocked_count, report
            )
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&report.envelope_id)
        .bind(report.kind.try_into_db()?)
        .bind(status)
        .bind(report.language.code())
        .bind(trigger)
        .bind(count(report.channels_attempted))
        .bind(count(report.success_count))
        .bind(count(report.blocked.len()))
        .bind(Json(report))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip_all, fields(envelope_id = %entry.envelope_id))]
    async fn record_quality(&self, entry: &QualityLogEntry) -> Result {
        use ContentQualityLogIden as Q;

        let issue: &'static str = entry.issue.into();

        Query::insert()
            .into_table(Q::Table)
            .columns([
                Q::EnvelopeId,
                Q::ContentKind,
                Q::Issue,
                Q::Language,
                Q::DetectedLanguage,
            ])
            .values_panic(sqlx_bat::simple_expr_vec![
                entry.envelope_id.clone(),
                entry.kind.try_into_db()?,
                issue,
                entry.language.code(),
                entry.detected_language.map(|language| language.code()),
            ])
            .into_sqlx()
            .query()
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
