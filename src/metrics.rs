//! Aggregate pipeline metrics for the observability endpoint.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::{PgPool, Row};

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct BusinessTotals {
    pub total: i64,
    pub no_website: i64,
    pub scored: i64,
    pub no_website_scored: i64,
    pub exported: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineMetrics {
    pub businesses: BusinessTotals,
    /// Businesses per current confidence level.
    pub confidence: BTreeMap<String, i64>,
    /// Verification records per (source, verdict).
    pub verification: BTreeMap<String, BTreeMap<String, i64>>,
}

pub async fn collect_metrics(pool: &PgPool) -> Result<PipelineMetrics, AppError> {
    let totals = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(CASE WHEN website_url IS NULL OR website_url = '' THEN 1 ELSE 0 END), 0) AS no_website,
            COALESCE(SUM(CASE WHEN lead_score IS NOT NULL THEN 1 ELSE 0 END), 0) AS scored,
            COALESCE(SUM(CASE WHEN (website_url IS NULL OR website_url = '') AND lead_score IS NOT NULL THEN 1 ELSE 0 END), 0) AS no_website_scored,
            COALESCE(SUM(CASE WHEN exported THEN 1 ELSE 0 END), 0) AS exported
        FROM businesses
        "#,
    )
    .fetch_one(pool)
    .await?;

    let businesses = BusinessTotals {
        total: totals.try_get("total").unwrap_or(0),
        no_website: totals.try_get("no_website").unwrap_or(0),
        scored: totals.try_get("scored").unwrap_or(0),
        no_website_scored: totals.try_get("no_website_scored").unwrap_or(0),
        exported: totals.try_get("exported").unwrap_or(0),
    };

    let confidence_rows = sqlx::query(
        r#"
        SELECT COALESCE(confidence, 'unverified') AS confidence, COUNT(*) AS count
        FROM businesses
        GROUP BY 1
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut confidence = BTreeMap::new();
    for row in confidence_rows {
        let level: String = row.try_get("confidence").unwrap_or_default();
        let count: i64 = row.try_get("count").unwrap_or(0);
        confidence.insert(level, count);
    }

    let verification_rows = sqlx::query(
        r#"
        SELECT source, verdict, COUNT(*) AS count
        FROM verification_records
        GROUP BY 1, 2
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut verification: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for row in verification_rows {
        let source: String = row.try_get("source").unwrap_or_default();
        let verdict: String = row.try_get("verdict").unwrap_or_default();
        let count: i64 = row.try_get("count").unwrap_or(0);
        verification.entry(source).or_default().insert(verdict, count);
    }

    Ok(PipelineMetrics {
        businesses,
        confidence,
        verification,
    })
}
