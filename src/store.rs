//! Persistence seam for the verification core.
//!
//! Verification records are append-only; score and confidence writes are
//! last-writer-wins, which is safe because scoring is deterministic and a
//! stale overwrite is corrected on the next pass.

use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    Business, BusinessContact, BusinessDomain, ConfidenceLevel, VerificationRecord,
    VerificationSource, Verdict,
};
use crate::sources::RawOutcome;

const BUSINESS_COLUMNS: &str = "id, source, source_id, name, category, address, city, country, \
     website_url, lead_score, score_reasons, confidence, scored_at, exported, created_at";

pub struct VerificationStore {
    pool: PgPool,
}

impl VerificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Select up to `limit` businesses this source should check next:
    /// no claimed website, not exported, not checked by this source within
    /// the retry horizon, optionally gated on a minimum score. Highest
    /// scores first so paid sources spend budget on the best leads.
    pub async fn select_for_source(
        &self,
        source: VerificationSource,
        limit: i64,
        min_score: Option<f64>,
        retry_horizon_days: i32,
    ) -> Result<Vec<Business>, AppError> {
        let query = format!(
            r#"
            SELECT {BUSINESS_COLUMNS}
            FROM businesses b
            WHERE COALESCE(b.name, '') <> ''
              AND (b.website_url IS NULL OR b.website_url = '')
              AND NOT b.exported
              AND NOT EXISTS (
                    SELECT 1 FROM verification_records vr
                    WHERE vr.business_id = b.id
                      AND vr.source = $1
                      AND vr.checked_at > NOW() - ($2 * INTERVAL '1 day')
              )
              AND ($3::float8 IS NULL OR b.lead_score >= $3)
            ORDER BY b.lead_score DESC NULLS LAST, b.created_at
            LIMIT $4
            "#
        );

        let businesses = sqlx::query_as::<_, Business>(&query)
            .bind(source.as_str())
            .bind(retry_horizon_days)
            .bind(min_score)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(businesses)
    }

    /// Append one verification record. Records are never updated in place.
    pub async fn append_record(
        &self,
        business_id: Uuid,
        source: VerificationSource,
        raw: &RawOutcome,
        verdict: Verdict,
    ) -> Result<VerificationRecord, AppError> {
        let record = VerificationRecord {
            id: Uuid::new_v4(),
            business_id,
            source: source.as_str().to_string(),
            outcome: raw.code.clone(),
            verdict: verdict.as_str().to_string(),
            website_url: raw.website_url.clone(),
            detail: raw.detail.clone(),
            checked_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO verification_records
                (id, business_id, source, outcome, verdict, website_url, detail, checked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.business_id)
        .bind(&record.source)
        .bind(&record.outcome)
        .bind(&record.verdict)
        .bind(&record.website_url)
        .bind(&record.detail)
        .bind(record.checked_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    /// One consistent snapshot of a business's full verification history,
    /// oldest first. Fusion always reads through this.
    pub async fn history(&self, business_id: Uuid) -> Result<Vec<VerificationRecord>, AppError> {
        let records = sqlx::query_as::<_, VerificationRecord>(
            r#"
            SELECT id, business_id, source, outcome, verdict, website_url, detail, checked_at
            FROM verification_records
            WHERE business_id = $1
            ORDER BY checked_at ASC, id
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get_business(&self, id: Uuid) -> Result<Option<Business>, AppError> {
        let query = format!("SELECT {BUSINESS_COLUMNS} FROM businesses b WHERE b.id = $1");
        let business = sqlx::query_as::<_, Business>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(business)
    }

    pub async fn contacts(&self, business_id: Uuid) -> Result<Vec<BusinessContact>, AppError> {
        let contacts = sqlx::query_as::<_, BusinessContact>(
            r#"
            SELECT id, business_id, contact_type, value, source, created_at
            FROM business_contacts
            WHERE business_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }

    /// Linked candidate domains with their validation status, read-only.
    pub async fn domains(&self, business_id: Uuid) -> Result<Vec<BusinessDomain>, AppError> {
        let domains = sqlx::query_as::<_, BusinessDomain>(
            r#"
            SELECT bdl.business_id, d.domain, d.status
            FROM business_domain_links bdl
            JOIN domains d ON d.id = bdl.domain_id
            WHERE bdl.business_id = $1
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(domains)
    }

    /// Upsert score + confidence + scored-at. Last writer wins.
    pub async fn save_score(
        &self,
        business_id: Uuid,
        score: f64,
        confidence: ConfidenceLevel,
        reasons: &Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE businesses
            SET lead_score = $2, confidence = $3, score_reasons = $4, scored_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(business_id)
        .bind(score)
        .bind(confidence.as_str())
        .bind(reasons)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a discovered website on the business row itself, which
    /// disqualifies it from lead selection on the next pass.
    pub async fn set_website(&self, business_id: Uuid, website_url: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE businesses
            SET website_url = $2
            WHERE id = $1 AND (website_url IS NULL OR website_url = '')
            "#,
        )
        .bind(business_id)
        .bind(website_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
